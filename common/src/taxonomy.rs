//! 分類カテゴリ（タクソノミー）定義
//!
//! カテゴリ名 → 表示情報（色・アイコン）とキーワード一覧の対応表。
//! 実行中は不変で、パイプライン設定と一緒に渡される。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const VEGETATION: &str = "Vegetation";
pub const SOLAR_TECHNICAL: &str = "Solar/Technical";
pub const BUILDINGS_INFRASTRUCTURE: &str = "Buildings/Infrastructure";
pub const BUILDINGS_CONCRETE: &str = "Buildings/Concrete";

/// 1カテゴリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    /// 部分一致で照合するキーワード（順序保持）
    pub keywords: Vec<String>,
    /// 表示色 `#RRGGBB`
    pub color: String,
    #[serde(default)]
    pub icon: String,
}

impl Category {
    pub fn new(name: &str, color: &str, icon: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            color: color.to_string(),
            icon: icon.to_string(),
        }
    }

    /// ラベル（小文字化済み）に含まれるキーワードを返す
    pub fn matching_keywords<'a>(&'a self, lowered_label: &str) -> Vec<&'a str> {
        self.keywords
            .iter()
            .filter(|k| lowered_label.contains(k.to_lowercase().as_str()))
            .map(|k| k.as_str())
            .collect()
    }

    /// 表示色をRGBに変換
    pub fn rgb(&self) -> Option<[u8; 3]> {
        parse_hex_color(&self.color)
    }
}

/// 検証済みカテゴリ集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Category>", into = "Vec<Category>")]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    /// カテゴリ一覧から構築（空・重複名・空キーワードは設定エラー）
    pub fn new(categories: Vec<Category>) -> Result<Self> {
        if categories.is_empty() {
            return Err(Error::Config("taxonomy has no categories".into()));
        }

        let mut seen = HashSet::new();
        for category in &categories {
            if category.name.trim().is_empty() {
                return Err(Error::Config("category name is empty".into()));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate category name: {}",
                    category.name
                )));
            }
            if category.keywords.is_empty() {
                return Err(Error::Config(format!(
                    "category {} has no keywords",
                    category.name
                )));
            }
            if category.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "category {} has an empty keyword",
                    category.name
                )));
            }
            if category.rgb().is_none() {
                return Err(Error::Config(format!(
                    "category {} has invalid color {:?}",
                    category.name, category.color
                )));
            }
        }

        Ok(Self { categories })
    }

    /// JSON文字列から読み込み
    pub fn from_json(json: &str) -> Result<Self> {
        let categories: Vec<Category> = serde_json::from_str(json)?;
        Self::new(categories)
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// 3カテゴリ（2x2グリッド版のキーワード）
    pub fn base_three() -> Self {
        Self {
            categories: vec![
                Category::new(VEGETATION, "#228B22", "🌳", &[
                    "broccoli", "artichoke", "cauliflower", "corn", "acorn", "leaf",
                    "maze, labyrinth", "alp", "cliff, drop, drop-off", "lakeside, lakeshore",
                    "volcano", "mountain", "hill", "forest", "tree", "plant", "grass",
                    "jungle", "field", "garden", "park", "nature",
                ]),
                Category::new(SOLAR_TECHNICAL, "#FFD700", "☀️", &[
                    "solar dish, solar collector, solar furnace", "spotlight, spot",
                    "radar, microwave radar", "satellite dish", "radio telescope",
                    "antenna", "panel", "dish", "solar", "technical", "machinery",
                    "equipment", "installation", "technology",
                ]),
                Category::new(BUILDINGS_INFRASTRUCTURE, "#DC143C", "🏢", &[
                    "castle", "palace", "monastery", "church, church building",
                    "viaduct", "suspension bridge", "steel arch bridge",
                    "container ship, containership, container vessel",
                    "parking lot", "residential area", "street sign", "tile roof",
                    "jigsaw puzzle", "envelope", "honeycomb", "roof", "building",
                    "house", "structure", "architecture", "urban", "city",
                    "construction", "infrastructure", "bridge", "road",
                ]),
            ],
        }
    }

    /// 3カテゴリ（3x3グリッド版の短いキーワード）
    pub fn short_three() -> Self {
        Self {
            categories: vec![
                Category::new(VEGETATION, "#228B22", "🌳", &[
                    "broccoli", "artichoke", "cauliflower", "corn", "acorn", "leaf",
                    "maze, labyrinth", "alp", "cliff, drop, drop-off", "lakeside, lakeshore",
                    "volcano", "mountain", "hill",
                ]),
                Category::new(SOLAR_TECHNICAL, "#FFD700", "☀️", &[
                    "solar dish, solar collector, solar furnace", "spotlight, spot",
                    "radar, microwave radar", "satellite dish", "radio telescope",
                ]),
                Category::new(BUILDINGS_INFRASTRUCTURE, "#DC143C", "🏢", &[
                    "castle", "palace", "monastery", "church, church building",
                    "viaduct", "suspension bridge", "steel arch bridge",
                    "container ship, containership, container vessel",
                    "parking lot", "residential area", "street sign", "tile roof",
                    "jigsaw puzzle", "envelope", "honeycomb", "roof", "building", "house",
                ]),
            ],
        }
    }

    /// 3カテゴリ（4x4グリッド版の拡張キーワード）
    pub fn extended_three() -> Self {
        let mut taxonomy = Self::base_three();
        let extras: [(&str, &[&str]); 3] = [
            (VEGETATION, &["coral reef"]),
            (SOLAR_TECHNICAL, &["crane"]),
            (BUILDINGS_INFRASTRUCTURE, &["birdhouse"]),
        ];
        for (name, keywords) in extras {
            if let Some(category) = taxonomy.categories.iter_mut().find(|c| c.name == name) {
                category.keywords.extend(keywords.iter().map(|k| k.to_string()));
            }
        }
        taxonomy
    }

    /// 2カテゴリ（植生 vs. 建物/コンクリート、8x8グリッド版）
    pub fn vegetation_vs_concrete() -> Self {
        Self {
            categories: vec![
                Category::new(VEGETATION, "#228B22", "🌳", &[
                    "broccoli", "artichoke", "cauliflower", "corn", "acorn", "leaf",
                    "maze, labyrinth", "alp", "cliff, drop, drop-off", "lakeside, lakeshore",
                    "volcano", "mountain", "hill", "forest", "tree", "plant", "grass",
                    "jungle", "field", "garden", "park", "nature", "coral reef",
                    "moss", "fern", "bush", "shrub", "meadow", "woodland", "grove",
                ]),
                Category::new(BUILDINGS_CONCRETE, "#DC143C", "🏢", &[
                    "castle", "palace", "monastery", "church, church building",
                    "viaduct", "suspension bridge", "steel arch bridge",
                    "container ship, containership, container vessel",
                    "parking lot", "residential area", "street sign", "tile roof",
                    "jigsaw puzzle", "envelope", "honeycomb", "roof", "building",
                    "house", "structure", "architecture", "urban", "city",
                    "construction", "infrastructure", "bridge", "road", "birdhouse",
                    "concrete", "asphalt", "pavement", "sidewalk", "wall", "tower",
                    "skyscraper", "factory", "warehouse", "stadium", "airport",
                ]),
            ],
        }
    }
}

impl TryFrom<Vec<Category>> for Taxonomy {
    type Error = Error;

    fn try_from(categories: Vec<Category>) -> Result<Self> {
        Self::new(categories)
    }
}

impl From<Taxonomy> for Vec<Category> {
    fn from(taxonomy: Taxonomy) -> Self {
        taxonomy.categories
    }
}

/// `#RRGGBB` を [r, g, b] に変換
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some([r, g, b])
}
