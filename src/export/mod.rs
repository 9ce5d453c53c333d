pub mod csv;
pub mod json;
pub mod overlay;

use crate::error::Result;
use aerial_classify_common::{PipelineConfig, Preset, RunReport};
use std::fmt;
use std::path::{Path, PathBuf};

/// 結果ファイルの既定名（拡張子なし）
pub const DEFAULT_OUTPUT_NAME: &str = "results";

/// オーバーレイ画像の出力サブフォルダ
pub const OVERLAY_DIR_NAME: &str = "annotated";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    #[default]
    Both,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "both" => Ok(ExportFormat::Both),
            _ => Err(format!("Unknown format: {}. Use csv, json, or both", s)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Both => write!(f, "both"),
        }
    }
}

/// 出力先がディレクトリなら `<dir>/<name>.<ext>`、ファイルならそのまま
pub fn output_path_for_format(output: &Path, name: &str, extension: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", name, extension))
    } else {
        output.to_path_buf()
    }
}

/// CSVとJSONを両方出す場合のパス（ファイル指定時は拡張子だけ変える）
pub fn output_paths_for_both(output: &Path, name: &str) -> (PathBuf, PathBuf) {
    if output.is_dir() || output.extension().is_none() {
        (
            output.join(format!("{}.csv", name)),
            output.join(format!("{}.json", name)),
        )
    } else {
        (output.with_extension("csv"), output.with_extension("json"))
    }
}

/// 出力先のディレクトリ部分（オーバーレイの置き場所の基準）
pub fn output_base_dir(output: &Path) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.to_path_buf()
    } else {
        output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// レポートを指定形式で書き出し、書いたファイルを返す
///
/// 結果が空でもファイルは必ず書く。
pub fn export_report(
    report: &RunReport,
    config: &PipelineConfig,
    preset: Preset,
    format: &ExportFormat,
    output: &Path,
) -> Result<Vec<PathBuf>> {
    let base_dir = output_base_dir(output);
    std::fs::create_dir_all(&base_dir)?;

    let (csv_path, json_path) = match format {
        ExportFormat::Csv => (Some(output_path_for_format(output, DEFAULT_OUTPUT_NAME, "csv")), None),
        ExportFormat::Json => (None, Some(output_path_for_format(output, DEFAULT_OUTPUT_NAME, "json"))),
        ExportFormat::Both => {
            let (csv_path, json_path) = output_paths_for_both(output, DEFAULT_OUTPUT_NAME);
            (Some(csv_path), Some(json_path))
        }
    };

    let mut written = Vec::new();

    if let Some(path) = csv_path {
        println!("- CSVを生成中...");
        csv::write_csv(&report.results, config, &path)?;
        println!("✔ CSV出力: {}", path.display());
        written.push(path);
    }

    if let Some(path) = json_path {
        println!("- JSONレポートを生成中...");
        json::write_report(report, config, preset, &path)?;
        println!("✔ JSON出力: {}", path.display());
        written.push(path);
    }

    Ok(written)
}
