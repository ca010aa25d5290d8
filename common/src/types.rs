//! 栄養成分の型定義
//!
//! サーバーとCLIで共有される型:
//! - ReferenceRow: 参照テーブル（CSV）の1行
//! - NutrientRecord: レスポンスと履歴に出力される射影

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// 参照テーブルの1行
///
/// 数値セルは元の表記（整数/小数）を保ったまま保持する。空セルは `None`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRow {
    #[serde(rename = "Food_Name")]
    pub food_name: String,

    #[serde(rename = "Calories_per_100g")]
    pub calories_per_100g: Option<Number>,

    #[serde(rename = "Carbs_g")]
    pub carbs_g: Option<Number>,

    #[serde(rename = "Fat_g")]
    pub fat_g: Option<Number>,

    #[serde(rename = "Protein_g")]
    pub protein_g: Option<Number>,

    /// 必須列以外の列（ヘッダー順）
    #[serde(skip)]
    pub extra: Vec<(String, String)>,
}

impl ReferenceRow {
    /// 必須5項目のみを取り出す
    pub fn to_record(&self) -> NutrientRecord {
        NutrientRecord {
            food_name: self.food_name.clone(),
            calories_per_100g: self.calories_per_100g.clone(),
            carbs_g: self.carbs_g.clone(),
            fat_g: self.fat_g.clone(),
            protein_g: self.protein_g.clone(),
        }
    }

    /// 追加列の値を取得
    pub fn extra(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }
}

/// 検出された食品1件分の栄養成分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutrientRecord {
    #[serde(rename = "Food_Name")]
    pub food_name: String,

    #[serde(rename = "Calories_per_100g")]
    pub calories_per_100g: Option<Number>,

    #[serde(rename = "Carbs_g")]
    pub carbs_g: Option<Number>,

    #[serde(rename = "Fat_g")]
    pub fat_g: Option<Number>,

    #[serde(rename = "Protein_g")]
    pub protein_g: Option<Number>,
}

/// `POST /api/detect` のレスポンス本体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectResponse {
    pub nutrients: Vec<NutrientRecord>,
}
