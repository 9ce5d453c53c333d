use crate::error::{AerialError, Result};
use crate::export::ExportFormat;
use aerial_classify_common::{DetectionConfig, PipelineConfig, Preset, Taxonomy};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "aerial-classify")]
#[command(about = "航空写真のグリッド領域マルチラベル分類ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像フォルダを解析してCSV/JSONとオーバーレイを出力
    Analyze {
        /// 画像フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        /// 出力先ディレクトリまたはファイル（デフォルト: 入力フォルダ）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// プリセット (quadrant/multi/detail/ultra、省略時は設定ファイルの値)
        #[arg(short, long)]
        preset: Option<Preset>,

        #[command(flatten)]
        overrides: PipelineOverrides,

        /// 出力形式 (csv/json/both)
        #[arg(short, long, default_value = "both")]
        format: ExportFormat,

        /// キャッシュを使用（分類済みの領域をスキップ）
        #[arg(long)]
        use_cache: bool,

        /// オーバーレイ画像を出力しない
        #[arg(long)]
        no_overlay: bool,
    },

    /// プリセット一覧を表示
    Presets,

    /// 設定を表示/編集
    Config {
        /// 分類器コマンドを設定（例: "python3 classify_server.py"）
        #[arg(long)]
        set_classifier: Option<String>,

        /// 物体検出器コマンドを設定（例: "python3 detect_server.py"）
        #[arg(long)]
        set_detector: Option<String>,

        /// オーバーレイの文字に使うフォント（TTF/OTF）を設定
        #[arg(long)]
        set_font: Option<PathBuf>,

        /// 既定のプリセットを設定
        #[arg(long)]
        set_preset: Option<Preset>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },

    /// キャッシュ管理
    Cache {
        /// キャッシュを削除
        #[arg(long)]
        clear: bool,

        /// 対象フォルダ（省略時はカレント）
        #[arg(short, long)]
        folder: Option<PathBuf>,

        /// キャッシュ情報を表示
        #[arg(long)]
        info: bool,
    },
}

/// プリセット値の個別上書き
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineOverrides {
    /// グリッドの分割数（g x g）
    #[arg(short, long)]
    pub grid_size: Option<u32>,

    /// 領域ごとの予測件数
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// 採用する予測確率の閾値（この値を超えるもののみ）
    #[arg(short, long)]
    pub threshold: Option<f64>,

    /// キーワード一致数あたりの加点係数
    #[arg(short, long)]
    pub bonus: Option<f64>,

    /// 支配カテゴリ解析を有効化
    #[arg(long, conflicts_with = "no_dominance")]
    pub dominance: bool,

    /// 支配カテゴリ解析を無効化
    #[arg(long)]
    pub no_dominance: bool,

    /// 画像全体パスの予測件数（0で無効）
    #[arg(long)]
    pub whole_image_top_k: Option<usize>,

    /// カテゴリ定義JSONファイル
    #[arg(long)]
    pub taxonomy: Option<PathBuf>,

    /// 物体検出（人・車両・航空機・船）を有効化
    #[arg(long, conflicts_with = "no_detection")]
    pub detect: bool,

    /// 物体検出を無効化
    #[arg(long)]
    pub no_detection: bool,

    /// 採用する検出スコアの閾値（この値を超えるもののみ）
    #[arg(long, conflicts_with = "no_detection")]
    pub detection_threshold: Option<f64>,
}

impl PipelineOverrides {
    /// プリセットの設定に上書きを適用して検証する
    pub fn apply(&self, mut config: PipelineConfig) -> Result<PipelineConfig> {
        if let Some(grid_size) = self.grid_size {
            config.grid_size = grid_size;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(threshold) = self.threshold {
            config.scoring.threshold = threshold;
        }
        if let Some(bonus) = self.bonus {
            config.scoring.bonus_factor = bonus;
        }
        if self.dominance {
            config.dominance = true;
        }
        if self.no_dominance {
            config.dominance = false;
        }
        if let Some(top_k) = self.whole_image_top_k {
            config.whole_image_top_k = (top_k > 0).then_some(top_k);
        }
        if let Some(path) = &self.taxonomy {
            config.taxonomy = load_taxonomy(path)?;
        }
        if self.detect && config.detection.is_none() {
            config.detection = Some(DetectionConfig::traffic());
        }
        if self.no_detection {
            config.detection = None;
        }
        if let Some(threshold) = self.detection_threshold {
            let detection = config.detection.as_mut().ok_or_else(|| {
                AerialError::Config("--detection-threshold は物体検出が有効な場合のみ指定できます".into())
            })?;
            detection.score_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn load_taxonomy(path: &Path) -> Result<Taxonomy> {
    let content = std::fs::read_to_string(path)?;
    Ok(Taxonomy::from_json(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_analyze() {
        let cli = Cli::try_parse_from([
            "aerial-classify", "analyze", "photos", "--preset", "8x8", "-g", "6",
            "--threshold", "0.05", "--no-dominance", "--format", "csv", "--no-overlay",
        ])
        .unwrap();

        match cli.command {
            Commands::Analyze { folder, preset, overrides, format, no_overlay, use_cache, .. } => {
                assert_eq!(folder, PathBuf::from("photos"));
                assert_eq!(preset, Some(Preset::Ultra));
                assert_eq!(overrides.grid_size, Some(6));
                assert_eq!(overrides.threshold, Some(0.05));
                assert!(overrides.no_dominance);
                assert_eq!(format, ExportFormat::Csv);
                assert!(no_overlay);
                assert!(!use_cache);
            }
            _ => panic!("analyze expected"),
        }
    }

    #[test]
    fn test_dominance_flags_conflict() {
        let result = Cli::try_parse_from([
            "aerial-classify", "analyze", "photos", "--dominance", "--no-dominance",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let overrides = PipelineOverrides {
            grid_size: Some(6),
            top_k: Some(3),
            bonus: Some(0.0),
            dominance: true,
            whole_image_top_k: Some(0),
            ..Default::default()
        };

        let config = overrides.apply(Preset::Quadrant.config()).unwrap();
        assert_eq!(config.grid_size, 6);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.scoring.threshold, 0.03);
        assert_eq!(config.scoring.bonus_factor, 0.0);
        assert!(config.dominance);
        assert_eq!(config.whole_image_top_k, None);
    }

    #[test]
    fn test_overrides_apply_rejects_invalid() {
        let overrides = PipelineOverrides {
            threshold: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            overrides.apply(Preset::Detail.config()),
            Err(AerialError::Core(_))
        ));

        let overrides = PipelineOverrides {
            grid_size: Some(0),
            ..Default::default()
        };
        assert!(overrides.apply(Preset::Detail.config()).is_err());
    }

    #[test]
    fn test_overrides_detection() {
        let config = PipelineOverrides::default().apply(Preset::Multi.config()).unwrap();
        assert_eq!(config.detection.as_ref().map(|d| d.score_threshold), Some(0.4));

        let overrides = PipelineOverrides {
            no_detection: true,
            ..Default::default()
        };
        assert!(overrides.apply(Preset::Multi.config()).unwrap().detection.is_none());

        let overrides = PipelineOverrides {
            detect: true,
            detection_threshold: Some(0.6),
            ..Default::default()
        };
        let config = overrides.apply(Preset::Detail.config()).unwrap();
        assert_eq!(config.detection.map(|d| d.score_threshold), Some(0.6));
    }

    #[test]
    fn test_detection_threshold_requires_detection() {
        let overrides = PipelineOverrides {
            detection_threshold: Some(0.5),
            ..Default::default()
        };
        assert!(matches!(
            overrides.apply(Preset::Detail.config()),
            Err(AerialError::Config(_))
        ));

        let overrides = PipelineOverrides {
            detection_threshold: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            overrides.apply(Preset::Multi.config()),
            Err(AerialError::Core(_))
        ));
    }

    #[test]
    fn test_parse_detection_flags() {
        let cli = Cli::try_parse_from([
            "aerial-classify", "analyze", "photos", "--preset", "multi", "--detection-threshold", "0.55",
        ])
        .unwrap();
        match cli.command {
            Commands::Analyze { overrides, .. } => {
                assert_eq!(overrides.detection_threshold, Some(0.55));
                assert!(!overrides.no_detection);
            }
            _ => panic!("analyze expected"),
        }

        let result = Cli::try_parse_from([
            "aerial-classify", "analyze", "photos", "--detect", "--no-detection",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_taxonomy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(
            &path,
            r##"[{"name": "Water", "keywords": ["lake", "sea"], "color": "#1E90FF"}]"##,
        )
        .unwrap();

        let overrides = PipelineOverrides {
            taxonomy: Some(path),
            ..Default::default()
        };
        let config = overrides.apply(Preset::Detail.config()).unwrap();
        assert_eq!(config.taxonomy.len(), 1);
        assert!(config.taxonomy.contains("Water"));
    }
}
