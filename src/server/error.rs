use crate::error::FoodAiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// HTTP境界のエラー（本文は `{"error": "..."}`）
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No image uploaded.")]
    NoImage,

    #[error("No file selected.")]
    NoFileSelected,

    #[error("Invalid file type.")]
    InvalidFileType,

    #[error("Malformed upload: {1}")]
    Multipart(StatusCode, String),

    #[error("Detection failed.")]
    Detection(#[source] FoodAiError),

    #[error("Internal server error.")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoImage | ApiError::NoFileSelected | ApiError::InvalidFileType => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Multipart(status, _) => *status,
            ApiError::Detection(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FoodAiError> for ApiError {
    fn from(e: FoodAiError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Detection(source) => error!("検出処理に失敗: {}", source),
            ApiError::Internal(detail) => error!("内部エラー: {}", detail),
            _ => {}
        }

        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
