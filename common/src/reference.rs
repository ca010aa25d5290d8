//! 栄養成分参照テーブルモジュール
//!
//! 食品名 → 栄養成分の静的テーブル。起動時にCSVから1度だけ読み込み、
//! 以降は読み取り専用で共有する。

use crate::error::{Error, Result};
use crate::types::{NutrientRecord, ReferenceRow};
use serde_json::Number;
use std::collections::HashMap;
use std::path::Path;

/// 必須列
pub const FOOD_NAME: &str = "Food_Name";
pub const CALORIES: &str = "Calories_per_100g";
pub const CARBS: &str = "Carbs_g";
pub const FAT: &str = "Fat_g";
pub const PROTEIN: &str = "Protein_g";

const REQUIRED_COLUMNS: [&str; 5] = [FOOD_NAME, CALORIES, CARBS, FAT, PROTEIN];

/// 参照テーブル全体
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    /// 全行データ（CSVの順序）
    rows: Vec<ReferenceRow>,
    /// 小文字化した食品名 → 最初に出現した行のインデックス
    index: HashMap<String, usize>,
}

impl ReferenceTable {
    /// CSVファイルから読み込み
    pub fn from_csv(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_csv_str(&content)
    }

    /// CSV文字列から読み込み
    pub fn from_csv_str(content: &str) -> Result<Self> {
        let mut lines = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header_line) = lines
            .next()
            .ok_or_else(|| Error::Parse("ヘッダー行がありません".into()))?;
        let header = parse_csv_line(header_line.trim_start_matches('\u{feff}'));

        let columns = ColumnMap::new(&header)?;

        let mut rows = Vec::new();
        let mut index = HashMap::new();

        for (line_idx, line) in lines {
            let fields = parse_csv_line(line);
            let row = columns.build_row(&header, &fields, line_idx + 1)?;

            // 同名の行は最初の1件のみ照合対象
            if !row.food_name.is_empty() {
                index
                    .entry(row.food_name.to_lowercase())
                    .or_insert(rows.len());
            }
            rows.push(row);
        }

        Ok(Self { rows, index })
    }

    /// 食品名で検索（大文字小文字を区別しない完全一致）
    pub fn lookup(&self, label: &str) -> Option<NutrientRecord> {
        self.find_row(label).map(ReferenceRow::to_record)
    }

    /// 一致した最初の行を取得
    pub fn find_row(&self, label: &str) -> Option<&ReferenceRow> {
        self.index
            .get(&label.to_lowercase())
            .and_then(|&i| self.rows.get(i))
    }

    pub fn rows(&self) -> &[ReferenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// 必須列の位置
struct ColumnMap {
    food_name: usize,
    calories: usize,
    carbs: usize,
    fat: usize,
    protein: usize,
}

impl ColumnMap {
    fn new(header: &[String]) -> Result<Self> {
        let position = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::MissingColumn(name.to_string()))
        };

        Ok(Self {
            food_name: position(FOOD_NAME)?,
            calories: position(CALORIES)?,
            carbs: position(CARBS)?,
            fat: position(FAT)?,
            protein: position(PROTEIN)?,
        })
    }

    fn build_row(&self, header: &[String], fields: &[String], line_no: usize) -> Result<ReferenceRow> {
        let cell = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");

        let number = |i: usize, column: &str| -> Result<Option<Number>> {
            parse_number(cell(i)).map_err(|_| {
                Error::Parse(format!("{}行目: {} の値が数値ではありません: {:?}", line_no, column, cell(i)))
            })
        };

        let extra = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !REQUIRED_COLUMNS.contains(&name.as_str()))
            .map(|(i, name)| (name.clone(), cell(i).to_string()))
            .collect();

        Ok(ReferenceRow {
            food_name: cell(self.food_name).to_string(),
            calories_per_100g: number(self.calories, CALORIES)?,
            carbs_g: number(self.carbs, CARBS)?,
            fat_g: number(self.fat, FAT)?,
            protein_g: number(self.protein, PROTEIN)?,
            extra,
        })
    }
}

/// 数値セルをパース（整数表記は整数のまま保持）
fn parse_number(cell: &str) -> std::result::Result<Option<Number>, serde_json::Error> {
    if cell.is_empty() {
        return Ok(None);
    }
    cell.parse::<Number>().map(Some)
}

/// CSVの1行をフィールドに分割
///
/// - 引用符はフィールド先頭にあるときだけ引用の開始とみなす
/// - 引用中の `""` は `"` 1文字
/// - 引用されていないフィールドは前後の空白を除去
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c != '"' {
                field.push(c);
            } else if chars.peek() == Some(&'"') {
                chars.next();
                field.push('"');
            } else {
                in_quotes = false;
            }
        } else if c == ',' {
            fields.push(finish_field(&field, quoted));
            field.clear();
            quoted = false;
        } else if c == '"' && !quoted && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
            quoted = true;
        } else if quoted && c.is_whitespace() {
            // 閉じ引用符の後ろの空白
        } else {
            field.push(c);
        }
    }

    // 最後のフィールド
    fields.push(finish_field(&field, quoted));

    fields
}

fn finish_field(field: &str, quoted: bool) -> String {
    if quoted {
        field.to_string()
    } else {
        field.trim().to_string()
    }
}
