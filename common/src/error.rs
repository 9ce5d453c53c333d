//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid prediction: {0}")]
    InvalidPrediction(String),

    #[error("Image {width}x{height} is smaller than a {grid_size}x{grid_size} grid")]
    ImageTooSmall {
        width: u32,
        height: u32,
        grid_size: u32,
    },
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
