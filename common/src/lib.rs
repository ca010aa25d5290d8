//! Food AI Common Library
//!
//! サーバーとCLIで共有される型と参照テーブル

pub mod error;
pub mod reference;
pub mod types;

pub use error::{Error, Result};
pub use reference::ReferenceTable;
pub use types::{DetectResponse, NutrientRecord, ReferenceRow};
