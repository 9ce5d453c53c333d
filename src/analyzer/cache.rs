//! 予測結果キャッシュモジュール
//!
//! 画像のSHA-256ハッシュ + 切り出し矩形 + top_k をキーにして分類器の予測を保存し、
//! 閾値や加点係数だけを変えた再実行で分類をスキップする。
//! 矩形をキーに含めるため、グリッドサイズを変えた実行同士は衝突しない。

use crate::error::Result;
use aerial_classify_common::{Prediction, RegionRect};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

const CACHE_FILE_NAME: &str = ".region-cache.json";

/// キャッシュファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionCache {
    /// バージョン（互換性チェック用）
    version: u32,
    /// キー → 予測
    entries: HashMap<String, CacheEntry>,
}

/// キャッシュエントリ
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub image_id: String,
    pub predictions: Vec<Prediction>,
}

impl PredictionCache {
    const CURRENT_VERSION: u32 = 2;

    pub fn cache_path(folder: &Path) -> PathBuf {
        folder.join(CACHE_FILE_NAME)
    }

    /// キャッシュファイルを読み込み（読めない場合は空）
    pub fn load(folder: &Path) -> Self {
        let cache_path = Self::cache_path(folder);
        if !cache_path.exists() {
            return Self::default();
        }

        let file = match File::open(&cache_path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("キャッシュを開けません ({}): {}", cache_path.display(), e);
                return Self::default();
            }
        };

        let reader = BufReader::new(file);
        match serde_json::from_reader::<_, PredictionCache>(reader) {
            Ok(cache) => {
                if cache.version != Self::CURRENT_VERSION {
                    log::warn!("キャッシュバージョン不一致、再生成します");
                    return Self::default();
                }
                cache
            }
            Err(e) => {
                log::warn!("キャッシュが壊れています、再生成します: {}", e);
                Self::default()
            }
        }
    }

    /// キャッシュファイルを保存
    pub fn save(&self, folder: &Path) -> Result<()> {
        let file = File::create(Self::cache_path(folder))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// キャッシュファイルを削除（存在しなければ false）
    pub fn clear(folder: &Path) -> Result<bool> {
        let cache_path = Self::cache_path(folder);
        if cache_path.exists() {
            std::fs::remove_file(cache_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// `<hash>:<x>,<y>,<w>x<h>:<top_k>`
    pub fn key(image_hash: &str, rect: RegionRect, top_k: usize) -> String {
        format!(
            "{}:{},{},{}x{}:{}",
            image_hash, rect.x, rect.y, rect.width, rect.height, top_k
        )
    }

    pub fn get(&self, key: &str) -> Option<&[Prediction]> {
        self.entries.get(key).map(|e| e.predictions.as_slice())
    }

    pub fn insert(&mut self, key: String, image_id: &str, predictions: Vec<Prediction>) {
        self.entries.insert(
            key,
            CacheEntry {
                image_id: image_id.to_string(),
                predictions,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// キャッシュに含まれる画像数
    pub fn image_count(&self) -> usize {
        let mut ids: Vec<&str> = self.entries.values().map(|e| e.image_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

impl Default for PredictionCache {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// 画像ファイルのハッシュを計算（SHA-256）
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
