//! 物体検出モジュール
//!
//! 学習済みモデルをラップし、画像から検出されたクラス名の集合を返す。
//! 信頼度やバウンディングボックスは呼び出し側に公開しない。

mod yolo;

pub use yolo::{decode_predictions, load_labels, YoloDetector};

use crate::error::Result;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

/// 1件分の検出結果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_index: usize,
    pub confidence: f32,
    /// 中心x, 中心y, 幅, 高さ（入力画像座標）
    pub bbox: [f32; 4],
}

/// 検出モデルの抽象
///
/// モデルと語彙は起動時に1度だけ読み込み、リクエスト間で共有する。
pub trait ObjectDetector: Send + Sync {
    /// クラス番号 → クラス名
    fn labels(&self) -> &[String];

    /// 画像ファイルに対して推論を実行
    fn predict(&self, image_path: &Path) -> Result<Vec<Detection>>;
}

/// 画像から検出されたクラス名を重複なしで返す
///
/// 同じクラスの複数検出は1つにまとめる。語彙外のクラス番号は読み飛ばす。
pub fn detect(detector: &dyn ObjectDetector, image_path: &Path) -> Result<BTreeSet<String>> {
    let detections = detector.predict(image_path)?;
    let labels = detector.labels();

    let mut detected = BTreeSet::new();
    for det in &detections {
        match labels.get(det.class_index) {
            Some(label) => {
                detected.insert(label.clone());
            }
            None => warn!("語彙にないクラス番号を無視します: {}", det.class_index),
        }
    }

    debug!(
        "検出数 {} 件 → ラベル {:?} ({})",
        detections.len(),
        detected,
        image_path.display()
    );
    Ok(detected)
}
