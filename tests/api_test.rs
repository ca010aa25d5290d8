//! HTTP APIテスト
//!
//! ルーターをプロセス内で直接呼び出し、検出器は固定結果を返す偽物に差し替える。

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use food_ai_common::ReferenceTable;
use food_ai_rust::detector::{Detection, ObjectDetector};
use food_ai_rust::error::{FoodAiError, Result};
use food_ai_rust::history::HistoryRecorder;
use food_ai_rust::pipeline::NutritionPipeline;
use food_ai_rust::server::{router, AppState};
use food_ai_rust::workspace::UploadWorkspace;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const REFERENCE_CSV: &str = "Food_Name,Calories_per_100g,Carbs_g,Fat_g,Protein_g,Category
Apple,52,14,0.2,0.3,Fruit
Banana,89,22.8,0.3,1.1,Fruit
";

const BOUNDARY: &str = "food-ai-test-boundary";

struct FakeDetector {
    labels: Vec<String>,
    classes: Vec<usize>,
    fail: bool,
}

impl ObjectDetector for FakeDetector {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, image_path: &Path) -> Result<Vec<Detection>> {
        if self.fail {
            return Err(FoodAiError::ImageLoad(image_path.display().to_string()));
        }
        Ok(self
            .classes
            .iter()
            .map(|&class_index| Detection {
                class_index,
                confidence: 0.01,
                bbox: [0.0; 4],
            })
            .collect())
    }
}

/// 2件のリクエストが揃うまで待ち、その時点で自分の画像が残っているか確認する
struct RendezvousDetector {
    labels: Vec<String>,
    barrier: Barrier,
}

impl ObjectDetector for RendezvousDetector {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, image_path: &Path) -> Result<Vec<Detection>> {
        self.barrier.wait();
        if !image_path.exists() {
            return Err(FoodAiError::FileNotFound(image_path.display().to_string()));
        }
        Ok(vec![Detection {
            class_index: 0,
            confidence: 0.9,
            bbox: [0.0; 4],
        }])
    }
}

struct TestApp {
    _dir: TempDir,
    history_path: PathBuf,
    upload_dir: PathBuf,
    app: Router,
}

fn test_labels() -> Vec<String> {
    vec!["apple".into(), "banana".into(), "pizza".into()]
}

/// クラス番号: 0=apple, 1=banana, 2=pizza（参照テーブルにない）
fn test_app(classes: Vec<usize>, fail: bool) -> TestApp {
    test_app_with(FakeDetector {
        labels: test_labels(),
        classes,
        fail,
    })
}

fn test_app_with<D: ObjectDetector + 'static>(detector: D) -> TestApp {
    let dir = tempdir().expect("Failed to create temp dir");
    let history_path = dir.path().join("nutrition_data.json");
    let upload_dir = dir.path().join("static").join("uploads");

    let pipeline = NutritionPipeline::new(
        Arc::new(detector),
        Arc::new(ReferenceTable::from_csv_str(REFERENCE_CSV).unwrap()),
        HistoryRecorder::new(&history_path),
    );
    let state = AppState::new(pipeline, UploadWorkspace::new(&upload_dir), 1024 * 1024);

    TestApp {
        _dir: dir,
        history_path,
        upload_dir,
        app: router(Arc::new(state)),
    }
}

/// multipart本文を組み立てる（file_name が None ならファイル名属性なし）
fn multipart_request(field: &str, file_name: Option<&str>, data: &[u8]) -> Request<Body> {
    let disposition = match file_name {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };

    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: {}\r\nContent-Type: application/octet-stream\r\n\r\n",
            BOUNDARY, disposition
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/detect")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn history_entries(path: &Path) -> Vec<Value> {
    let content = std::fs::read_to_string(path).expect("履歴ファイルがない");
    serde_json::from_str(&content).expect("履歴がJSON配列ではない")
}

fn file_count(dir: &Path) -> usize {
    if !dir.exists() {
        return 0;
    }
    walk_files(dir)
}

fn walk_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| {
            let path = e.path();
            if path.is_dir() {
                walk_files(&path)
            } else {
                1
            }
        })
        .sum()
}

#[tokio::test]
async fn test_missing_image_field() {
    let t = test_app(vec![0], false);
    let (status, body) = send(&t.app, multipart_request("photo", Some("lunch.jpg"), b"x")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No image uploaded."}));
}

#[tokio::test]
async fn test_image_field_without_filename() {
    let t = test_app(vec![0], false);
    let (status, body) = send(&t.app, multipart_request("image", None, b"x")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image uploaded.");
}

#[tokio::test]
async fn test_not_multipart_request() {
    let t = test_app(vec![0], false);
    let request = Request::builder()
        .method("POST")
        .uri("/api/detect")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image uploaded.");
}

#[tokio::test]
async fn test_empty_filename() {
    let t = test_app(vec![0], false);
    let (status, body) = send(&t.app, multipart_request("image", Some(""), b"x")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "No file selected."}));
}

#[tokio::test]
async fn test_invalid_file_type_has_no_side_effects() {
    let t = test_app(vec![0], false);

    for name in ["menu.pdf", "lunch", "image.jpg.exe", "photo.bmp"] {
        let (status, body) = send(&t.app, multipart_request("image", Some(name), b"x")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);
        assert_eq!(body, json!({"error": "Invalid file type."}));
    }

    assert_eq!(file_count(&t.upload_dir), 0);
    assert!(!t.history_path.exists());
}

#[tokio::test]
async fn test_detect_apple() {
    let t = test_app(vec![0], false);
    let (status, body) = send(&t.app, multipart_request("image", Some("apple.jpg"), b"img")).await;

    let expected = json!({
        "Food_Name": "Apple",
        "Calories_per_100g": 52,
        "Carbs_g": 14,
        "Fat_g": 0.2,
        "Protein_g": 0.3
    });

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "nutrients": [expected.clone()] }));
    assert_eq!(history_entries(&t.history_path), vec![expected]);
}

#[tokio::test]
async fn test_extension_is_case_insensitive() {
    let t = test_app(vec![1], false);
    let (status, body) = send(&t.app, multipart_request("image", Some("LUNCH.JPEG"), b"img")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nutrients"][0]["Food_Name"], "Banana");
}

#[tokio::test]
async fn test_unmatched_label_is_skipped() {
    let t = test_app(vec![2], false);
    let (status, body) = send(&t.app, multipart_request("image", Some("pizza.png"), b"img")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"nutrients": []}));
    assert!(!t.history_path.exists());
}

#[tokio::test]
async fn test_duplicate_detections_collapse() {
    let t = test_app(vec![0, 0, 0, 1, 1, 2], false);
    let (status, body) = send(&t.app, multipart_request("image", Some("fruit.gif"), b"img")).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["nutrients"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["Food_Name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Apple", "Banana"]);
    assert_eq!(history_entries(&t.history_path).len(), 2);
}

#[tokio::test]
async fn test_corrupt_history_does_not_break_request() {
    let t = test_app(vec![0], false);
    std::fs::write(&t.history_path, "{ broken").unwrap();

    let (status, body) = send(&t.app, multipart_request("image", Some("apple.jpg"), b"img")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nutrients"].as_array().unwrap().len(), 1);
    assert_eq!(std::fs::read_to_string(&t.history_path).unwrap(), "{ broken");
}

#[tokio::test]
async fn test_detection_failure_is_server_error() {
    let t = test_app(vec![0], true);
    let (status, body) = send(&t.app, multipart_request("image", Some("broken.png"), b"not an image")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Detection failed."}));
    assert!(!t.history_path.exists());
}

#[tokio::test]
async fn test_previous_upload_is_cleared() {
    let t = test_app(vec![0], false);

    send(&t.app, multipart_request("image", Some("first.jpg"), b"1")).await;
    assert_eq!(file_count(&t.upload_dir), 1);

    send(&t.app, multipart_request("image", Some("second.jpg"), b"2")).await;
    assert_eq!(file_count(&t.upload_dir), 1);
    assert_eq!(history_entries(&t.history_path).len(), 2);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let t = test_app(vec![0], false);
    let mut request = multipart_request("image", Some("apple.jpg"), b"img");
    request
        .headers_mut()
        .insert(header::ORIGIN, "http://example.com".parse().unwrap());

    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "*"
    );
}

#[tokio::test]
async fn test_history_endpoint() {
    let t = test_app(vec![1], false);
    send(&t.app, multipart_request("image", Some("banana.jpg"), b"img")).await;

    let request = Request::builder()
        .uri("/api/history")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["Food_Name"], "Banana");
}

#[tokio::test]
async fn test_health_endpoint() {
    let t = test_app(vec![], false);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "foods": 2, "labels": 3}));
}

#[tokio::test]
async fn test_history_endpoint_corrupt_file() {
    let t = test_app(vec![0], false);
    std::fs::write(&t.history_path, "{ broken").unwrap();

    let request = Request::builder()
        .uri("/api/history")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_history_endpoint_non_array_file() {
    let t = test_app(vec![0], false);
    std::fs::write(&t.history_path, r#"{"Food_Name": "Apple"}"#).unwrap();

    let request = Request::builder()
        .uri("/api/history")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].is_string());
}

/// 同時に処理中のリクエストは互いのステージング画像を消さない
#[tokio::test]
async fn test_concurrent_requests_keep_their_uploads() {
    let t = test_app_with(RendezvousDetector {
        labels: test_labels(),
        barrier: Barrier::new(2),
    });

    let (first, second) = tokio::join!(
        send(&t.app, multipart_request("image", Some("first.jpg"), b"1")),
        send(&t.app, multipart_request("image", Some("second.jpg"), b"2")),
    );

    for (status, body) in [first, second] {
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["nutrients"][0]["Food_Name"], "Apple");
    }
    assert_eq!(history_entries(&t.history_path).len(), 2);
}
