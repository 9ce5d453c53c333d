//! 分類器インターフェース
//!
//! 分類器は固定サイズのRGB画像を受け取り、確率順の (ラベル, 確率) を返す
//! 外部の能力として扱う。パイプラインは実装を差し替えてテストできる。
//! 物体検出器は画像全体を受け取り、ボックス付きの検出結果を返す。

use crate::error::Result;
use aerial_classify_common::{Detection, Prediction, RegionRect, CLASSIFIER_INPUT_SIZE};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};

/// 画像分類器
///
/// 呼び出しは1件ずつ順番に行う（同時呼び出しは想定しない）。
#[allow(async_fn_in_trait)]
pub trait Classifier {
    /// 上位 `top_k` 件の予測を確率の高い順に返す
    async fn classify(&mut self, input: &RgbImage, top_k: usize) -> Result<Vec<Prediction>>;
}

/// 物体検出器
#[allow(async_fn_in_trait)]
pub trait Detector {
    /// 画像全体の検出結果を返す（ボックスは画像のピクセル座標）
    async fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

/// 検出器を使わない場合の型
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetector;

impl Detector for NoDetector {
    async fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(Vec::new())
    }
}

/// 領域を切り出して分類器の入力サイズ（224x224）へ変換
///
/// 縦横比は保持しない。
pub fn prepare_input(image: &DynamicImage, rect: RegionRect) -> RgbImage {
    image
        .crop_imm(rect.x, rect.y, rect.width, rect.height)
        .resize_exact(CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE, FilterType::Triangle)
        .to_rgb8()
}
