//! 栄養成分履歴モジュール
//!
//! 検出・照合できた NutrientRecord をJSON配列としてファイルに追記する。
//! 追記のたびに配列全体を書き直す。書き込みはプロセス内で直列化される。
//!
//! 壊れた履歴ファイルがあっても検出処理は止めない。
//! その場合は追記をスキップしてログに出すだけにする。

use crate::error::{FoodAiError, Result};
use food_ai_common::NutrientRecord;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// 追記結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// 追記後の件数
    Appended(usize),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct HistoryRecorder {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl HistoryRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1件追記（失敗はログのみ）
    pub fn append(&self, record: &NutrientRecord) -> AppendOutcome {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        match self.try_append(record) {
            Ok(Some(total)) => {
                info!("履歴に追加: {} (計{}件)", record.food_name, total);
                AppendOutcome::Appended(total)
            }
            Ok(None) => AppendOutcome::Skipped,
            Err(e) => {
                warn!("履歴の書き込みに失敗 {}: {}", self.path.display(), e);
                AppendOutcome::Skipped
            }
        }
    }

    /// 既存の配列を読み、末尾に追加して書き戻す
    ///
    /// 既存ファイルが配列として読めない場合は `Ok(None)`。
    fn try_append(&self, record: &NutrientRecord) -> Result<Option<usize>> {
        let mut entries = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Array(items)) => items,
                Ok(_) => {
                    warn!("履歴ファイルが配列ではありません: {}", self.path.display());
                    return Ok(None);
                }
                Err(e) => {
                    warn!("履歴ファイルが空または不正です {}: {}", self.path.display(), e);
                    return Ok(None);
                }
            }
        } else {
            Vec::new()
        };

        entries.push(serde_json::to_value(record)?);
        self.write_entries(&entries)?;
        Ok(Some(entries.len()))
    }

    /// 一時ファイルに書いてから置き換える
    fn write_entries(&self, entries: &[Value]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            let mut ser = serde_json::Serializer::with_formatter(&mut writer, PrettyFormatter::with_indent(b"    "));
            entries.serialize(&mut ser)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// 履歴全体を読み込み
    pub fn load(&self) -> Result<Vec<NutrientRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let value: Value = serde_json::from_str(&content)?;
        if !value.is_array() {
            return Err(FoodAiError::InvalidHistory(self.path.display().to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// 件数（読めない場合は0）
    pub fn len(&self) -> usize {
        self.load().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 履歴ファイルを削除
    pub fn clear(&self) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
