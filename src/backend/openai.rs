#![cfg(feature = "openai")]

use super::{Backend, BackendError, Chunk, ChunkStream, CompletionParams};
use futures_core::Stream;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/";

const DONE_SENTINEL: &str = "[DONE]";

/// Streaming chat-completions backend for OpenAI-compatible services.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
}

impl OpenAiBackend {
    pub fn new(http: reqwest::Client, api_key: &str, api_base: Option<&str>) -> anyhow::Result<Self> {
        let base = Url::parse(api_base.unwrap_or(DEFAULT_API_BASE))?;
        let endpoint = base.join("v1/chat/completions")?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| anyhow::anyhow!("API key is not a valid header value: {e}"))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        Ok(Self { http, endpoint, headers })
    }
}

impl Backend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete(
        &self,
        params: CompletionParams,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, BackendError>> + Send>>
    {
        let this = self.clone();

        Box::pin(async move {
            let body = ChatCompletionRequest {
                model: params.model,
                messages: vec![Message {
                    role: "user",
                    content: params.prompt,
                }],
                temperature: 0.6,
                max_tokens: 2000,
                top_p: 1.0,
                stream: true,
            };

            let resp = this
                .http
                .post(this.endpoint.clone())
                .headers(this.headers.clone())
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(api_error(status, &text));
            }

            let (tx, rx) = mpsc::channel::<Result<Chunk, BackendError>>(64);
            let frames = Box::pin(
                resp.bytes_stream()
                    .map(|item| item.map_err(BackendError::from)),
            );
            tokio::spawn(pump(frames, tx));

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

/// Drain the response body, decode frames, accumulate deltas and publish a
/// snapshot after each one. A `[DONE]` payload ends the stream; a transport
/// error fails it; a malformed frame is logged and skipped.
async fn pump<S, B>(mut frames: S, tx: mpsc::Sender<Result<Chunk, BackendError>>)
where
    S: Stream<Item = Result<B, BackendError>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut decoder = FrameDecoder::new();
    let mut accumulated = String::new();

    while let Some(item) = frames.next().await {
        let bytes = match item {
            Ok(b) => b,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        for payload in decoder.push(bytes.as_ref()) {
            if payload == DONE_SENTINEL {
                return;
            }

            let frame: StreamFrame = match serde_json::from_str(&payload) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed stream frame");
                    continue;
                }
            };

            let Some(delta) = frame.delta_text() else {
                continue;
            };
            if delta.is_empty() {
                continue;
            }

            accumulated.push_str(delta);
            if tx.send(Ok(Chunk { text: accumulated.clone() })).await.is_err() {
                return;
            }
        }
    }
}

fn api_error(status: reqwest::StatusCode, body: &str) -> BackendError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(env) => BackendError::Api(env.error.message),
        Err(_) => BackendError::Api(format!("HTTP {status}: {body}")),
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl StreamFrame {
    // The delta text lives in a nested optional field; a frame without it is
    // valid and contributes nothing.
    fn delta_text(&self) -> Option<&str> {
        self.choices.first()?.delta.content.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Incremental decoder for a blank-line-delimited event stream.
///
/// Bytes go in as they arrive off the wire; complete frame payloads come out.
/// Only lines carrying the `data:` prefix contribute to a payload (joined
/// with `\n` when a payload spans several); every other line is skipped.
struct FrameDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl FrameDecoder {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            data_lines: Vec::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(nl) = self.pending.iter().position(|&b| b == b'\n') {
            let mut raw: Vec<u8> = self.pending.drain(..=nl).collect();
            raw.pop();
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            let line = String::from_utf8_lossy(&raw);

            if line.is_empty() {
                if !self.data_lines.is_empty() {
                    payloads.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
                continue;
            }

            if let Some(rest) = line.strip_prefix("data:") {
                let rest = rest.strip_prefix(' ').unwrap_or(rest);
                self.data_lines.push(rest.to_string());
            }
        }

        payloads
    }
}
