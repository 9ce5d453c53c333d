use thiserror::Error;

#[derive(Error, Debug)]
pub enum AerialError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("分類器が設定されていません。`aerial-classify config --set-classifier <コマンド>` で設定してください")]
    MissingClassifier,

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("画像読み込みエラー: {0}")]
    ImageLoad(String),

    #[error("分類器の初期化に失敗: {0}")]
    ClassifierInit(String),

    #[error("分類器の呼び出しエラー: {0}")]
    Classify(String),

    #[error("分類器レスポンスのパースに失敗: {0}")]
    ClassifierResponse(String),

    #[error("オーバーレイ生成エラー: {0}")]
    Overlay(String),

    #[error("{0}")]
    Core(#[from] aerial_classify_common::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AerialError>;
