//! 外部モデルプロセス連携モジュール
//!
//! 分類器（MobileNet等）や物体検出器（COCO-SSD等）を子プロセスとして
//! 1回だけ起動し、JSON Lines で1件ずつ問い合わせる。
//!
//! - 起動後1行目: `{"ready":true,"model":"..."}`（モデル読み込み完了）
//! - 分類要求: `{"id":1,"task":"classify","topK":10,"image":"<base64 PNG>"}`
//! - 分類応答: `{"id":1,"predictions":[{"label":"...","probability":0.9}]}`
//! - 検出要求: `{"id":2,"task":"detect","image":"<base64 PNG>"}`
//! - 検出応答: `{"id":2,"detections":[{"label":"car","score":0.87,"bbox":[x,y,w,h]}]}`
//! - 失敗時: `{"id":1,"error":"..."}`
//!
//! 応答には要求と同じ `id` が必須。

use super::classifier::{Classifier, Detector};
use crate::error::{AerialError, Result};
use aerial_classify_common::{Detection, Prediction};
use base64::Engine;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

#[derive(Debug, Deserialize)]
struct ReadyMessage {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Task {
    Classify,
    Detect,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelRequest<'a> {
    id: u64,
    task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModelResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    predictions: Option<Vec<Prediction>>,
    #[serde(default)]
    detections: Option<Vec<Detection>>,
    #[serde(default)]
    error: Option<String>,
}

/// 常駐するモデルプロセス（分類器・検出器とも）
pub struct ProcessClassifier {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    model: String,
    next_id: u64,
    timeout: Duration,
}

impl ProcessClassifier {
    /// プロセスを起動し、モデル読み込み完了を待つ
    pub async fn spawn(
        command: &[String],
        init_timeout: Duration,
        classify_timeout: Duration,
    ) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| AerialError::ClassifierInit("コマンドが空です".into()))?;

        log::info!("分類器を起動: {}", command.join(" "));

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AerialError::ClassifierInit(format!("{}: {}", program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AerialError::ClassifierInit("stdinを取得できません".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AerialError::ClassifierInit("stdoutを取得できません".into()))?;
        let mut stdout = BufReader::new(stdout).lines();

        let line = tokio::time::timeout(init_timeout, stdout.next_line())
            .await
            .map_err(|_| {
                AerialError::ClassifierInit(format!(
                    "{}秒以内に準備完了しませんでした",
                    init_timeout.as_secs()
                ))
            })??
            .ok_or_else(|| AerialError::ClassifierInit("準備完了前にプロセスが終了しました".into()))?;

        let model = parse_ready_line(&line)?;
        log::info!("分類器の準備完了: {}", model);

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
            model,
            next_id: 1,
            timeout: classify_timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// stdinを閉じてプロセス終了を待つ（応答がなければ強制終了）
    pub async fn shutdown(mut self) -> Result<()> {
        drop(self.stdin.take());
        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(status) => {
                log::debug!("分類器プロセス終了: {:?}", status?);
            }
            Err(_) => {
                log::warn!("分類器プロセスが終了しないため強制終了します");
                self.child.kill().await?;
            }
        }
        Ok(())
    }

    async fn request(&mut self, id: u64, line: String) -> Result<ModelResponse> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AerialError::Classify("モデルプロセスは終了済みです".into()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        // タイムアウトした過去の要求への応答は読み飛ばす
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| AerialError::Classify("モデルプロセスが終了しました".into()))?;
            if let Some(response) = parse_response_line(&line, id)? {
                return Ok(response);
            }
            log::debug!("古い応答を破棄: {}", line);
        }
    }

    /// 1件問い合わせて応答を待つ（タイムアウト付き）
    async fn call(&mut self, task: Task, input: &RgbImage, top_k: Option<usize>) -> Result<ModelResponse> {
        let id = self.next_id;
        self.next_id += 1;

        // 要求ごとのエンコード済みバッファはこの呼び出しの終わりで解放される
        let line = encode_request(id, task, input, top_k)?;
        let timeout = self.timeout;

        tokio::time::timeout(timeout, self.request(id, line))
            .await
            .map_err(|_| {
                AerialError::Classify(format!("{}秒以内に応答がありません", timeout.as_secs()))
            })?
    }
}

impl Classifier for ProcessClassifier {
    async fn classify(&mut self, input: &RgbImage, top_k: usize) -> Result<Vec<Prediction>> {
        let response = self.call(Task::Classify, input, Some(top_k)).await?;
        let mut predictions = response
            .predictions
            .ok_or_else(|| AerialError::ClassifierResponse("predictionsがありません".into()))?;
        for prediction in &predictions {
            prediction.validate()?;
        }
        predictions.truncate(top_k);
        Ok(predictions)
    }
}

impl Detector for ProcessClassifier {
    async fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let response = self.call(Task::Detect, image, None).await?;
        let detections = response
            .detections
            .ok_or_else(|| AerialError::ClassifierResponse("detectionsがありません".into()))?;
        for detection in &detections {
            detection.validate()?;
        }
        Ok(detections)
    }
}

/// 画像をPNG+base64にして1行の要求JSONを作る
fn encode_request(id: u64, task: Task, input: &RgbImage, top_k: Option<usize>) -> Result<String> {
    let mut png = Vec::new();
    input
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| AerialError::Classify(format!("PNGエンコード失敗: {}", e)))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let request = ModelRequest {
        id,
        task,
        top_k,
        image: &encoded,
    };
    Ok(serde_json::to_string(&request)?)
}

fn parse_ready_line(line: &str) -> Result<String> {
    let message: ReadyMessage = serde_json::from_str(line.trim()).map_err(|e| {
        AerialError::ClassifierInit(format!("準備完了メッセージが不正: {} ({})", e, line))
    })?;

    if let Some(error) = message.error {
        return Err(AerialError::ClassifierInit(error));
    }
    if !message.ready {
        return Err(AerialError::ClassifierInit("ready=false".into()));
    }
    Ok(message.model.unwrap_or_else(|| "unknown".into()))
}

/// 応答行を解釈する。別の要求への応答なら `None`
fn parse_response_line(line: &str, expected_id: u64) -> Result<Option<ModelResponse>> {
    let response: ModelResponse = serde_json::from_str(line.trim())
        .map_err(|e| AerialError::ClassifierResponse(format!("{} ({})", e, line)))?;

    let id = response
        .id
        .ok_or_else(|| AerialError::ClassifierResponse(format!("idがありません ({})", line)))?;
    if id != expected_id {
        return Ok(None);
    }

    if let Some(error) = response.error {
        return Err(AerialError::Classify(error));
    }
    Ok(Some(response))
}
