pub mod local;
#[cfg(feature = "openai")]
pub mod openai;

use futures_core::stream::BoxStream;

/// One unit of work handed to a backend.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    pub model: String,
    pub prompt: String,
}

/// A partial snapshot of the completion.
///
/// `text` is the full accumulated text so far, not a delta. Snapshots for one
/// request arrive in order and never shrink.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The host ask capability failed or produced no content.
    #[error("host assistant unavailable: {0}")]
    HostUnavailable(String),

    /// Network or connection failure, including mid-stream.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service returned a structured error payload; the message is
    /// surfaced verbatim.
    #[error("{0}")]
    Api(String),

    /// The backend completed without producing any content.
    #[error("backend returned no content")]
    EmptyResponse,

    /// The request was aborted before it resolved. Never produced by a
    /// backend itself.
    #[error("request cancelled")]
    Cancelled,
}

pub type ChunkStream = BoxStream<'static, Result<Chunk, BackendError>>;

pub type SharedBackend = std::sync::Arc<dyn Backend + Send + Sync>;

/// Completion backend interface.
///
/// `complete` starts one request and resolves to a stream of accumulated-text
/// snapshots; the stream ending cleanly means the last snapshot is the final
/// text.
pub trait Backend {
    fn name(&self) -> &'static str;

    fn complete(
        &self,
        params: CompletionParams,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, BackendError>> + Send>>;
}
