//! アップロード作業領域モジュール
//!
//! 受信した画像を一時的に置くディレクトリを管理する。
//! リクエストごとに専用のスロット（UUID名のサブディレクトリ）を割り当て、
//! 処理中のスロットは `clear()` の削除対象から外す。

use crate::error::{FoodAiError, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// 受け付ける拡張子（大文字小文字は区別しない）
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Clone)]
pub struct UploadWorkspace {
    root: PathBuf,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl UploadWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// ルートディレクトリを作成
    pub fn ensure_root(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// 前回までの内容を削除（処理中のスロットは残す）
    ///
    /// 個々の削除失敗はログに出して続行する。戻り値は削除できた件数。
    pub fn clear(&self) -> usize {
        if !self.root.exists() {
            return 0;
        }

        let active: HashSet<String> = self
            .lock_in_flight()
            .iter()
            .map(|id| id.to_string())
            .collect();

        let mut removed = 0;
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1) // 直下のみ
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("作業領域の走査エラー {}: {}", self.root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy();
            if active.contains(name.as_ref()) {
                continue;
            }

            let result = if entry.file_type().is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };

            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("ファイル削除エラー {}: {}", path.display(), e),
            }
        }

        if removed > 0 {
            debug!("作業領域から {} 件を削除", removed);
        }
        removed
    }

    /// このリクエスト専用のスロットを確保
    ///
    /// スロットは `UploadSlot` が破棄されるまで処理中として扱う。
    pub fn begin(&self) -> UploadSlot {
        let id = Uuid::new_v4();
        self.lock_in_flight().insert(id);

        UploadSlot {
            id,
            dir: self.root.join(id.to_string()),
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        // ロック保持中にパニックしても集合自体は壊れない
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 1リクエスト分のステージング領域
#[derive(Debug)]
pub struct UploadSlot {
    id: Uuid,
    dir: PathBuf,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl UploadSlot {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// アップロードされたファイルを書き込み、保存先を返す
    pub fn stage(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(safe_file_name(file_name)?);
        std::fs::write(&path, bytes)?;

        debug!("ステージング: {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }
}

impl Drop for UploadSlot {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.id);
    }
}

/// 拡張子が許可リストに含まれるか
pub fn is_allowed_file(file_name: &str) -> bool {
    extension_of(file_name)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn extension_of(file_name: &str) -> Option<&str> {
    file_name.rsplit_once('.').map(|(_, ext)| ext)
}

/// ファイル名を安全な形に変換
///
/// - パス区切りと空白は単語の区切りとして `_` で連結
/// - 英数字と `_` `.` `-` 以外は除去
/// - 先頭・末尾の `.` と `_` は除去
pub fn sanitize_file_name(file_name: &str) -> String {
    lazy_static::lazy_static! {
        static ref UNSAFE_RE: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
    }

    let replaced = file_name.replace(['/', '\\'], " ");
    let joined = replaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_RE.replace_all(&joined, "");

    cleaned.trim_matches(|c: char| c == '.' || c == '_').to_string()
}

/// サニタイズ後のファイル名（空になった場合は拡張子だけ残す）
fn safe_file_name(file_name: &str) -> Result<String> {
    let sanitized = sanitize_file_name(file_name);
    if is_allowed_file(&sanitized) {
        return Ok(sanitized);
    }

    match extension_of(file_name) {
        Some(ext) if is_allowed_file(file_name) => Ok(format!("upload.{}", ext.to_lowercase())),
        _ => Err(FoodAiError::InvalidFileType(file_name.to_string())),
    }
}
