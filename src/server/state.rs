use crate::config::Config;
use crate::detector::{ObjectDetector, YoloDetector};
use crate::error::Result;
use crate::history::HistoryRecorder;
use crate::pipeline::NutritionPipeline;
use crate::workspace::UploadWorkspace;
use food_ai_common::ReferenceTable;
use std::sync::Arc;
use tracing::info;

pub struct AppState {
    pub pipeline: NutritionPipeline,
    pub workspace: UploadWorkspace,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(pipeline: NutritionPipeline, workspace: UploadWorkspace, max_upload_bytes: usize) -> Self {
        Self {
            pipeline,
            workspace,
            max_upload_bytes,
        }
    }

    /// 設定からモデル・参照テーブルを読み込んで構築
    ///
    /// どちらかの読み込みに失敗した場合はサーバーを起動しない。
    pub fn from_config(config: &Config) -> Result<Self> {
        let pipeline = build_pipeline(config)?;
        Ok(Self::new(
            pipeline,
            UploadWorkspace::new(&config.upload_dir),
            config.max_upload_bytes,
        ))
    }
}

/// CLIの単発検出でも使う
pub fn build_pipeline(config: &Config) -> Result<NutritionPipeline> {
    info!("参照テーブルを読み込み中: {}", config.reference_path.display());
    let table = ReferenceTable::from_csv(&config.reference_path)?;
    info!("{}件の食品を読み込みました", table.len());

    let detector: Arc<dyn ObjectDetector> = Arc::new(YoloDetector::load(
        &config.model_path,
        &config.labels_path,
        config.input_size,
        config.conf_threshold,
    )?);

    Ok(NutritionPipeline::new(
        detector,
        Arc::new(table),
        HistoryRecorder::new(&config.history_path),
    ))
}
