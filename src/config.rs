use crate::error::{AerialError, Result};
use aerial_classify_common::Preset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 分類器コマンドの環境変数（設定ファイルより優先）
pub const CLASSIFIER_ENV: &str = "AERIAL_CLASSIFIER_CMD";

/// 物体検出器コマンドの環境変数
pub const DETECTOR_ENV: &str = "AERIAL_DETECTOR_CMD";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// 分類器プロセスのコマンド（プログラム + 引数）
    pub classifier_command: Vec<String>,
    /// 物体検出プロセスのコマンド（空なら検出しない）
    pub detector_command: Vec<String>,
    pub default_preset: Preset,
    /// 分類器の準備完了を待つ秒数
    pub init_timeout_seconds: u64,
    /// 1領域あたりのタイムアウト秒数
    pub classify_timeout_seconds: u64,
    /// オーバーレイの文字に使うフォント（未設定なら既知の場所を探す）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_font: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_json::from_str(&content)?;
            log::debug!("設定を読み込み: {}", config_path.display());
            Ok(config)
        } else {
            Ok(Self::default_config())
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| AerialError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("aerial-classify").join("config.json"))
    }

    pub fn default_config() -> Self {
        Self {
            classifier_command: Vec::new(),
            detector_command: Vec::new(),
            default_preset: Preset::Detail,
            init_timeout_seconds: 120,
            classify_timeout_seconds: 30,
            overlay_font: None,
        }
    }

    /// 分類器コマンドを取得（環境変数を優先）
    pub fn classifier_command(&self) -> Result<Vec<String>> {
        resolve_command(CLASSIFIER_ENV, &self.classifier_command)?
            .ok_or(AerialError::MissingClassifier)
    }

    /// 物体検出器コマンドを取得（未設定なら None）
    pub fn detector_command(&self) -> Result<Option<Vec<String>>> {
        resolve_command(DETECTOR_ENV, &self.detector_command)
    }

    pub fn set_classifier(&mut self, command: &str) -> Result<()> {
        self.classifier_command = non_empty_command(command)?;
        self.save()
    }

    pub fn set_detector(&mut self, command: &str) -> Result<()> {
        self.detector_command = non_empty_command(command)?;
        self.save()
    }

    pub fn set_overlay_font(&mut self, path: PathBuf) -> Result<()> {
        if !path.is_file() {
            return Err(AerialError::Config(format!("フォントファイルがありません: {}", path.display())));
        }
        self.overlay_font = Some(path);
        self.save()
    }

    pub fn set_default_preset(&mut self, preset: Preset) -> Result<()> {
        self.default_preset = preset;
        self.save()
    }
}

fn resolve_command(env: &str, configured: &[String]) -> Result<Option<Vec<String>>> {
    if let Ok(value) = std::env::var(env) {
        let parts = split_command(&value)?;
        if !parts.is_empty() {
            return Ok(Some(parts));
        }
    }

    if configured.is_empty() {
        Ok(None)
    } else {
        Ok(Some(configured.to_vec()))
    }
}

fn non_empty_command(command: &str) -> Result<Vec<String>> {
    let parts = split_command(command)?;
    if parts.is_empty() {
        return Err(AerialError::Config("コマンドが空です".into()));
    }
    Ok(parts)
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// シェルと同じ規則でコマンドを分割（引用符・エスケープ対応）
pub fn split_command(value: &str) -> Result<Vec<String>> {
    shlex::split(value)
        .ok_or_else(|| AerialError::Config(format!("コマンドの引用符が閉じていません: {}", value)))
}
