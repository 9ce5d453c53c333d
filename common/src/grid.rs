//! 画像のグリッド分割
//!
//! 画像を g×g の重なりのない矩形に分割する。最終行・最終列は
//! 割り切れない余りを吸収するため、全体を隙間なく覆う。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// 元画像のピクセル座標での矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }
}

/// グリッドの1領域
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// `R01C01` 形式のID（行・列とも1始まり）
    pub id: String,
    pub rect: RegionRect,
    /// 0始まり
    pub row: u32,
    pub col: u32,
}

impl Region {
    /// 位置ラベル（例: `top-left`, `upper-middle-right-middle`）
    pub fn position_label(&self, grid_size: u32) -> String {
        position_label(self.row, self.col, grid_size)
    }
}

/// 画像サイズがグリッドに対して十分か検証
pub fn validate_dimensions(width: u32, height: u32, grid_size: u32) -> Result<()> {
    if grid_size == 0 {
        return Err(Error::Config("grid size must be at least 1".into()));
    }
    if width < grid_size || height < grid_size {
        return Err(Error::ImageTooSmall { width, height, grid_size });
    }
    Ok(())
}

/// g×g 領域を行優先で生成
pub fn build_grid(width: u32, height: u32, grid_size: u32) -> Result<Vec<Region>> {
    validate_dimensions(width, height, grid_size)?;

    let region_width = width / grid_size;
    let region_height = height / grid_size;
    let last = grid_size - 1;

    let mut regions = Vec::with_capacity((grid_size * grid_size) as usize);
    for row in 0..grid_size {
        for col in 0..grid_size {
            let x = col * region_width;
            let y = row * region_height;
            let w = if col == last { width - x } else { region_width };
            let h = if row == last { height - y } else { region_height };

            regions.push(Region {
                id: region_id(row, col, grid_size),
                rect: RegionRect { x, y, width: w, height: h },
                row,
                col,
            });
        }
    }

    Ok(regions)
}

/// 領域ID（ゼロ埋め幅は grid_size の桁数）
pub fn region_id(row: u32, col: u32, grid_size: u32) -> String {
    let pad = grid_size.max(1).to_string().len();
    format!("R{:0pad$}C{:0pad$}", row + 1, col + 1, pad = pad)
}

/// 行・列から位置ラベルを作る
pub fn position_label(row: u32, col: u32, grid_size: u32) -> String {
    if grid_size <= 1 {
        return "whole".to_string();
    }
    let last = grid_size - 1;
    // row < g/2 を整数で比較
    let vertical = if row == 0 {
        "top"
    } else if row == last {
        "bottom"
    } else if row * 2 < grid_size {
        "upper-middle"
    } else {
        "lower-middle"
    };
    let horizontal = if col == 0 {
        "left"
    } else if col == last {
        "right"
    } else if col * 2 < grid_size {
        "left-middle"
    } else {
        "right-middle"
    };
    format!("{}-{}", vertical, horizontal)
}
