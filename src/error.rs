use thiserror::Error;

#[derive(Error, Debug)]
pub enum FoodAiError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("モデル読み込みエラー: {0}")]
    ModelLoad(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("推論エラー: {0}")]
    Inference(String),

    #[error("対応していないファイル形式: {0}")]
    InvalidFileType(String),

    #[error("履歴ファイルが不正: {0}")]
    InvalidHistory(String),

    #[error("参照テーブルエラー: {0}")]
    Reference(#[from] food_ai_common::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FoodAiError>;
