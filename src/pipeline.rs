//! 検出 → 栄養成分照合 → 履歴保存 の処理

use crate::detector::{self, ObjectDetector};
use crate::error::Result;
use crate::history::HistoryRecorder;
use food_ai_common::{NutrientRecord, ReferenceTable};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// 起動時に構築し、全リクエストで共有する
#[derive(Clone)]
pub struct NutritionPipeline {
    detector: Arc<dyn ObjectDetector>,
    table: Arc<ReferenceTable>,
    history: HistoryRecorder,
}

impl NutritionPipeline {
    pub fn new(
        detector: Arc<dyn ObjectDetector>,
        table: Arc<ReferenceTable>,
        history: HistoryRecorder,
    ) -> Self {
        Self {
            detector,
            table,
            history,
        }
    }

    pub fn detector(&self) -> &dyn ObjectDetector {
        self.detector.as_ref()
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    /// ラベルごとに参照テーブルを引く（見つからないラベルは読み飛ばす）
    pub fn enrich(&self, labels: &BTreeSet<String>) -> Vec<NutrientRecord> {
        labels
            .iter()
            .filter_map(|label| {
                let record = self.table.lookup(label);
                if record.is_none() {
                    debug!("参照テーブルに該当なし: {}", label);
                }
                record
            })
            .collect()
    }

    /// 検出と照合のみ（履歴には書かない）
    pub fn detect_nutrients(&self, image_path: &Path) -> Result<Vec<NutrientRecord>> {
        let labels = detector::detect(self.detector.as_ref(), image_path)?;
        Ok(self.enrich(&labels))
    }

    /// 検出・照合し、見つかった分を履歴に追記
    pub fn analyze(&self, image_path: &Path) -> Result<Vec<NutrientRecord>> {
        let nutrients = self.detect_nutrients(image_path)?;
        for record in &nutrients {
            self.history.append(record);
        }
        Ok(nutrients)
    }
}
