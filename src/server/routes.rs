use super::error::ApiError;
use super::state::AppState;
use crate::workspace::is_allowed_file;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use food_ai_common::{DetectResponse, NutrientRecord};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// 画像のフォーム項目名
pub const IMAGE_FIELD: &str = "image";

/// `POST /api/detect`
///
/// 検証 → ステージング → 検出 → 照合・履歴追記 → レスポンス
pub async fn detect_handler(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    // multipartでないリクエストは画像なしとして扱う
    let mut multipart = multipart.map_err(|e| {
        debug!("multipartとして読めません: {}", e);
        ApiError::NoImage
    })?;

    let (file_name, bytes) = read_image_field(&mut multipart).await?;

    // スロットは clear() より先に確保し、検出が終わるまで保持する
    let slot = state.workspace.begin();
    let workspace = state.workspace.clone();
    let pipeline = state.pipeline.clone();
    let staged_name = file_name.clone();

    let nutrients = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        workspace.clear();
        let image_path = slot.stage(&staged_name, &bytes)?;
        let nutrients = pipeline.analyze(&image_path).map_err(ApiError::Detection)?;
        drop(slot);
        Ok(nutrients)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("検出タスクが異常終了: {}", e)))??;

    info!("{}: {}件の栄養成分を返却", file_name, nutrients.len());
    Ok(Json(DetectResponse { nutrients }))
}

/// `image` 項目を探して検証し、ファイル名と中身を返す
///
/// ファイル名属性のない `image` 項目はファイルとして扱わない。
async fn read_image_field(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Multipart(e.status(), e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        if file_name.is_empty() {
            return Err(ApiError::NoFileSelected);
        }

        if !is_allowed_file(&file_name) {
            return Err(ApiError::InvalidFileType);
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Multipart(e.status(), e.body_text()))?;
        return Ok((file_name, bytes));
    }

    Err(ApiError::NoImage)
}

/// `GET /api/history`
pub async fn history_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<NutrientRecord>>, ApiError> {
    let history = state.pipeline.history().clone();
    let records = tokio::task::spawn_blocking(move || history.load())
        .await
        .map_err(|e| ApiError::Internal(format!("履歴タスクが異常終了: {}", e)))??;

    Ok(Json(records))
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "foods": state.pipeline.table().len(),
        "labels": state.pipeline.detector().labels().len(),
    }))
}
