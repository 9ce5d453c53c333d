//! 物体検出の結果処理
//!
//! 検出器（COCO-SSD等）が画像全体から返したボックスのうち、
//! スコアが閾値を超え、かつクラス対応表にあるものだけを残す。
//! 検出結果は領域カテゴリとは別に記録し、領域数には数えない。

use crate::error::{Error, Result};
use crate::taxonomy::parse_hex_color;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// 検出器が返す1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// 検出クラス（例: `car`）
    pub label: String,
    pub score: f64,
    /// `[x, y, width, height]`（元画像のピクセル座標）
    pub bbox: [f64; 4],
}

impl Detection {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.score) || self.score.is_nan() {
            return Err(Error::InvalidPrediction(format!(
                "detection score {} for {} is outside [0, 1]",
                self.score, self.label
            )));
        }
        if self.bbox.iter().any(|v| !v.is_finite()) || self.bbox[2] < 0.0 || self.bbox[3] < 0.0 {
            return Err(Error::InvalidPrediction(format!(
                "invalid bounding box for {}: {:?}",
                self.label, self.bbox
            )));
        }
        Ok(())
    }
}

/// 検出クラス → 追加カテゴリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectClass {
    pub label: String,
    pub category: String,
    pub color: String,
}

impl ObjectClass {
    pub fn new(label: &str, category: &str, color: &str) -> Self {
        Self {
            label: label.to_string(),
            category: category.to_string(),
            color: color.to_string(),
        }
    }
}

/// 物体検出の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionConfig {
    /// この値を超えるスコアのみ採用
    pub score_threshold: f64,
    pub classes: Vec<ObjectClass>,
}

impl DetectionConfig {
    /// 人・車両・航空機・船（3x3グリッド版の追加検出）
    pub fn traffic() -> Self {
        Self {
            score_threshold: 0.4,
            classes: vec![
                ObjectClass::new("person", "People", "#FF6B6B"),
                ObjectClass::new("car", "Vehicles", "#4ECDC4"),
                ObjectClass::new("truck", "Vehicles", "#4ECDC4"),
                ObjectClass::new("bus", "Vehicles", "#4ECDC4"),
                ObjectClass::new("motorcycle", "Vehicles", "#4ECDC4"),
                ObjectClass::new("bicycle", "Vehicles", "#4ECDC4"),
                ObjectClass::new("airplane", "Aircraft", "#9B59B6"),
                ObjectClass::new("boat", "Boats", "#3498DB"),
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.score_threshold) {
            return Err(Error::Config(format!(
                "detection score threshold must be in [0, 1), got {}",
                self.score_threshold
            )));
        }
        if self.classes.is_empty() {
            return Err(Error::Config("detection has no object classes".into()));
        }

        let mut seen = HashSet::new();
        for class in &self.classes {
            if class.label.trim().is_empty() || class.category.trim().is_empty() {
                return Err(Error::Config("object class label or category is empty".into()));
            }
            if !seen.insert(class.label.as_str()) {
                return Err(Error::Config(format!("duplicate object class: {}", class.label)));
            }
            if parse_hex_color(&class.color).is_none() {
                return Err(Error::Config(format!(
                    "invalid color for object class {}: {}",
                    class.label, class.color
                )));
            }
        }
        Ok(())
    }

    pub fn class(&self, label: &str) -> Option<&ObjectClass> {
        self.classes.iter().find(|c| c.label == label)
    }

    /// 追加カテゴリ名（定義順、重複なし）
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for class in &self.classes {
            if !categories.contains(&class.category.as_str()) {
                categories.push(&class.category);
            }
        }
        categories
    }

    /// 閾値と対応表で絞り込む（検出器の順序を保つ）
    pub fn filter(&self, detections: &[Detection]) -> Vec<DetectedObject> {
        detections
            .iter()
            .filter(|d| d.score > self.score_threshold)
            .filter_map(|d| {
                self.class(&d.label).map(|class| DetectedObject {
                    label: d.label.clone(),
                    category: class.category.clone(),
                    score: d.score,
                    x: d.bbox[0],
                    y: d.bbox[1],
                    width: d.bbox[2],
                    height: d.bbox[3],
                })
            })
            .collect()
    }
}

/// 採用された検出物
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub label: String,
    pub category: String,
    pub score: f64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}
