//! 領域 → 画像の集計
//!
//! 領域ごとの判定を画像単位に集計する。入力だけで決まる純粋関数。

use crate::taxonomy::Taxonomy;
use crate::types::{ImageAggregate, RegionCategorization};
use std::collections::BTreeMap;

/// 支配カテゴリの集計結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dominance {
    pub category: Option<String>,
    pub percent: f64,
    pub tally: BTreeMap<String, u32>,
}

/// 画像単位の集計
///
/// `all_categories` はタクソノミー定義順で並べる。
/// タクソノミーにないカテゴリ名が入っていても末尾に出現順で残す。
pub fn aggregate_regions(
    regions: &[RegionCategorization],
    taxonomy: &Taxonomy,
    with_dominance: bool,
) -> ImageAggregate {
    let mut region_count_per_category: BTreeMap<String, u32> = BTreeMap::new();
    let mut seen_order: Vec<String> = Vec::new();
    let mut active_region_count = 0u32;

    for region in regions {
        if region.is_active() {
            active_region_count += 1;
        }
        for category in &region.categories {
            let count = region_count_per_category.entry(category.clone()).or_insert(0);
            if *count == 0 {
                seen_order.push(category.clone());
            }
            *count += 1;
        }
    }

    let mut all_categories: Vec<String> = taxonomy
        .names()
        .filter(|name| region_count_per_category.contains_key(*name))
        .map(str::to_string)
        .collect();
    for name in seen_order {
        if !taxonomy.contains(&name) {
            all_categories.push(name);
        }
    }

    let dominance = if with_dominance {
        dominance(regions)
    } else {
        Dominance::default()
    };

    ImageAggregate {
        all_categories,
        region_count_per_category,
        active_region_count,
        total_region_count: regions.len() as u32,
        dominant_category: dominance.category,
        dominance_percent: dominance.percent,
        dominance_tally: dominance.tally,
    }
}

/// 領域の支配カテゴリを集計し、最多のものを画像の支配カテゴリとする
///
/// 同数の場合は行優先の走査で先にその件数へ達したカテゴリが残る。
/// 特別な優先規則ではなく走査順による結果。
pub fn dominance(regions: &[RegionCategorization]) -> Dominance {
    let mut tally: BTreeMap<String, u32> = BTreeMap::new();
    let mut winner: Option<String> = None;
    let mut max_count = 0u32;

    for region in regions {
        let Some(category) = region.dominant_category.as_ref() else {
            continue;
        };
        let count = tally.entry(category.clone()).or_insert(0);
        *count += 1;
        if *count > max_count {
            max_count = *count;
            winner = Some(category.clone());
        }
    }

    let percent = if winner.is_some() && !regions.is_empty() {
        100.0 * max_count as f64 / regions.len() as f64
    } else {
        0.0
    };

    Dominance {
        category: winner,
        percent,
        tally,
    }
}
