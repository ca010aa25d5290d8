use crate::error::{FoodAiError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// ONNX形式の検出モデル
    pub model_path: PathBuf,
    /// クラス名一覧（1行1クラス）
    pub labels_path: PathBuf,
    /// 栄養成分CSV
    pub reference_path: PathBuf,
    pub history_path: PathBuf,
    pub upload_dir: PathBuf,
    /// モデル入力サイズ（正方形）
    pub input_size: u32,
    pub conf_threshold: f32,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            model_path: PathBuf::from("best.onnx"),
            labels_path: PathBuf::from("labels.txt"),
            reference_path: PathBuf::from("food_cleaned.csv"),
            history_path: PathBuf::from("nutrition_data.json"),
            upload_dir: PathBuf::from("static/uploads"),
            input_size: 640,
            conf_threshold: 0.25, // YOLO標準の閾値
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Config {
    /// 設定を読み込み
    ///
    /// `path` 指定時はそのファイル、未指定時は既定パスを使う。
    /// ファイルがなければデフォルト値。最後に環境変数で上書きする。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(FoodAiError::FileNotFound(p.display().to_string()));
                }
                p.to_path_buf()
            }
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(config_path)
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| FoodAiError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("food-ai").join("config.json"))
    }

    /// 環境変数を優先
    fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("FOOD_AI_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("FOOD_AI_PORT") {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(e) => warn!("FOOD_AI_PORT が不正なため無視します ({}): {}", port, e),
            }
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
