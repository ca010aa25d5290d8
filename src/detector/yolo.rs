//! YOLO (ONNX) 検出器
//!
//! tract-onnx でモデルを実行する。出力は `[1, 4+クラス数, 候補数]`
//! （転置された `[1, 候補数, 4+クラス数]` も可）を想定。

use super::{Detection, ObjectDetector};
use crate::error::{FoodAiError, Result};
use anyhow::Context;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::info;

pub struct YoloDetector {
    model: TypedRunnableModel<TypedModel>,
    labels: Vec<String>,
    input_size: u32,
    conf_threshold: f32,
}

impl YoloDetector {
    /// モデルとクラス名を読み込み
    pub fn load(
        model_path: &Path,
        labels_path: &Path,
        input_size: u32,
        conf_threshold: f32,
    ) -> Result<Self> {
        if !model_path.exists() {
            return Err(FoodAiError::FileNotFound(model_path.display().to_string()));
        }

        let labels = load_labels(labels_path)?;
        let size = input_size as usize;

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| {
                m.with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)))
            })
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| FoodAiError::ModelLoad(format!("{}: {:#}", model_path.display(), e)))?;

        info!(
            "モデルを読み込みました: {} ({}クラス, 入力 {}px)",
            model_path.display(),
            labels.len(),
            input_size
        );

        Ok(Self {
            model,
            labels,
            input_size,
            conf_threshold,
        })
    }

    /// 画像を `1x3xSxS` の入力テンソルに変換
    fn preprocess(&self, image_path: &Path) -> Result<Tensor> {
        let img = image::open(image_path)
            .map_err(|e| FoodAiError::ImageLoad(format!("{}: {}", image_path.display(), e)))?;

        let size = self.input_size;
        let boxed = letterbox(&img.to_rgb8(), size);

        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, c, y, x)| boxed.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        );
        Ok(input.into())
    }

    fn run(&self, input: Tensor) -> anyhow::Result<Vec<Detection>> {
        let outputs = self.model.run(tvec!(input.into())).context("推論の実行に失敗")?;
        let output = outputs
            .first()
            .context("モデルの出力がありません")?
            .to_array_view::<f32>()?;

        decode_predictions(output, self.labels.len(), self.conf_threshold)
    }
}

impl ObjectDetector for YoloDetector {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, image_path: &Path) -> Result<Vec<Detection>> {
        let input = self.preprocess(image_path)?;
        self.run(input)
            .map_err(|e| FoodAiError::Inference(format!("{:#}", e)))
    }
}

/// 縦横比を保って `size`×`size` に収め、余白を灰色 (114) で埋める
pub fn letterbox(img: &RgbImage, size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(img, new_width, new_height, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([114, 114, 114]));
    imageops::overlay(
        &mut canvas,
        &resized,
        ((size - new_width) / 2) as i64,
        ((size - new_height) / 2) as i64,
    );
    canvas
}

/// 生の出力テンソルを検出結果に変換
///
/// 各候補の最大スコアのクラスを採用し、閾値以下は捨てる。
/// ラベル抽出のみが目的のためNMSは行わない（クラス集合は変わらない）。
pub fn decode_predictions(
    output: tract_ndarray::ArrayViewD<f32>,
    num_classes: usize,
    conf_threshold: f32,
) -> anyhow::Result<Vec<Detection>> {
    let shape = output.shape().to_vec();
    let channels = 4 + num_classes;

    if shape.len() != 3 || shape[0] != 1 {
        anyhow::bail!("想定外の出力形状: {:?}", shape);
    }

    let channels_first = if shape[1] == channels {
        true
    } else if shape[2] == channels {
        false
    } else {
        anyhow::bail!("出力形状 {:?} がクラス数 {} と一致しません", shape, num_classes);
    };
    let candidates = if channels_first { shape[2] } else { shape[1] };

    let value = |ch: usize, i: usize| {
        if channels_first {
            output[[0, ch, i]]
        } else {
            output[[0, i, ch]]
        }
    };

    let mut detections = Vec::new();
    for i in 0..candidates {
        let (class_index, confidence) = (0..num_classes)
            .map(|c| (c, value(4 + c, i)))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if num_classes == 0 || confidence <= conf_threshold {
            continue;
        }

        detections.push(Detection {
            class_index,
            confidence,
            bbox: [value(0, i), value(1, i), value(2, i), value(3, i)],
        });
    }

    Ok(detections)
}

/// クラス名ファイルを読み込み（1行1クラス、空行は無視）
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(FoodAiError::FileNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    let labels: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    if labels.is_empty() {
        return Err(FoodAiError::ModelLoad(format!(
            "クラス名が空です: {}",
            path.display()
        )));
    }

    Ok(labels)
}
