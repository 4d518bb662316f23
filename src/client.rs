use crate::backend::{BackendError, CompletionParams, SharedBackend};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::StreamExt;

/// Where a request is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Streaming,
    Succeeded,
    Failed,
    Cancelled,
}

type ObserverSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

/// Completion client. Routes each submission to the remote backend when one
/// is configured, otherwise to the local one. The route is picked once per
/// submit and never reevaluated mid-flight.
pub struct Client {
    remote: Option<SharedBackend>,
    local: SharedBackend,
    model: String,
}

impl Client {
    pub fn new(remote: Option<SharedBackend>, local: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            remote,
            local,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn submit(&self, prompt: &str) -> RequestHandle {
        let backend = match &self.remote {
            Some(b) => b.clone(),
            None => self.local.clone(),
        };

        RequestHandle::spawn(
            backend,
            CompletionParams {
                model: self.model.clone(),
                prompt: prompt.to_string(),
            },
        )
    }
}

/// One in-flight completion.
///
/// Two ways out: `observe` for partial snapshots as they arrive (nothing is
/// replayed; at most one observer, a later registration replaces the earlier
/// one), and `join` for the final text.
pub struct RequestHandle {
    prompt: String,
    backend_name: &'static str,
    aborted: AtomicBool,
    status_rx: watch::Receiver<RequestStatus>,
    observer: ObserverSlot,
    result_rx: oneshot::Receiver<Result<String, BackendError>>,
    task: tokio::task::JoinHandle<()>,
}

impl RequestHandle {
    fn spawn(backend: SharedBackend, params: CompletionParams) -> Self {
        let (status_tx, status_rx) = watch::channel(RequestStatus::Pending);
        let (result_tx, result_rx) = oneshot::channel();
        let observer: ObserverSlot = Arc::new(Mutex::new(None));

        let prompt = params.prompt.clone();
        let backend_name = backend.name();
        let slot = observer.clone();

        let task = tokio::spawn(async move {
            let outcome = drive(backend, params, &status_tx, &slot).await;
            let _ = status_tx.send(if outcome.is_ok() {
                RequestStatus::Succeeded
            } else {
                RequestStatus::Failed
            });
            let _ = result_tx.send(outcome);
        });

        Self {
            prompt,
            backend_name,
            aborted: AtomicBool::new(false),
            status_rx,
            observer,
            result_rx,
            task,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn backend(&self) -> &'static str {
        self.backend_name
    }

    pub fn status(&self) -> RequestStatus {
        if self.aborted.load(Ordering::Relaxed) {
            return RequestStatus::Cancelled;
        }
        *self.status_rx.borrow()
    }

    /// Register the partial-snapshot observer. Only future snapshots are
    /// delivered; a previously registered observer's channel closes.
    pub fn observe(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.observer.lock() = Some(tx);
        rx
    }

    /// Actively cancel the in-flight work. `join` afterwards reports
    /// `Cancelled`. No-op once the request has resolved.
    pub fn abort(&self) {
        let in_flight = matches!(
            *self.status_rx.borrow(),
            RequestStatus::Pending | RequestStatus::Streaming
        );
        if in_flight {
            self.aborted.store(true, Ordering::Relaxed);
            self.task.abort();
        }
    }

    /// Await the final text. On success the last partial snapshot was made
    /// observable strictly before this resolves.
    pub async fn join(self) -> Result<String, BackendError> {
        match self.result_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(BackendError::Cancelled),
        }
    }
}

async fn drive(
    backend: SharedBackend,
    params: CompletionParams,
    status: &watch::Sender<RequestStatus>,
    observer: &ObserverSlot,
) -> Result<String, BackendError> {
    let mut chunks = backend.complete(params).await?;
    let mut last: Option<String> = None;

    while let Some(item) = chunks.next().await {
        let chunk = item?;
        if last.is_none() {
            let _ = status.send(RequestStatus::Streaming);
        }
        if let Some(tx) = observer.lock().as_ref() {
            // An observer that went away is fine; the handle can still be joined.
            let _ = tx.send(chunk.text.clone());
        }
        last = Some(chunk.text);
    }

    // One tick so an observer reacting to the last snapshot runs before the
    // join side sees the final value.
    tokio::task::yield_now().await;

    last.ok_or(BackendError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, Chunk, ChunkStream};
    use tokio_stream::wrappers::ReceiverStream;

    /// Feeds a fixed script of snapshots/errors, optionally never finishing.
    struct ScriptedBackend {
        label: &'static str,
        script: Vec<Result<String, String>>,
        hang: bool,
    }

    impl ScriptedBackend {
        fn snapshots(label: &'static str, texts: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                label,
                script: texts.iter().map(|t| Ok(t.to_string())).collect(),
                hang: false,
            })
        }
    }

    impl Backend for ScriptedBackend {
        fn name(&self) -> &'static str {
            self.label
        }

        fn complete(
            &self,
            _params: CompletionParams,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<ChunkStream, BackendError>> + Send>,
        > {
            let script = self.script.clone();
            let hang = self.hang;

            Box::pin(async move {
                let (tx, rx) = mpsc::channel(8);
                tokio::spawn(async move {
                    for item in script {
                        let item = match item {
                            Ok(text) => Ok(Chunk { text }),
                            Err(message) => Err(BackendError::Api(message)),
                        };
                        if tx.send(item).await.is_err() {
                            return;
                        }
                    }
                    if hang {
                        std::future::pending::<()>().await;
                    }
                });
                Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
            })
        }
    }

    fn client_with(remote: Option<Arc<ScriptedBackend>>, local: Arc<ScriptedBackend>) -> Client {
        Client::new(
            remote.map(|b| b as SharedBackend),
            local as SharedBackend,
            "test-model",
        )
    }

    #[tokio::test]
    async fn snapshots_arrive_in_order_before_the_final_value() {
        let client = client_with(None, ScriptedBackend::snapshots("local", &["Hel", "Hello"]));

        let handle = client.submit("hi");
        let mut partials = handle.observe();

        let final_text = handle.join().await.expect("final");
        assert_eq!(final_text, "Hello");

        // Both snapshots were published before join resolved.
        assert_eq!(partials.try_recv().expect("first"), "Hel");
        assert_eq!(partials.try_recv().expect("second"), "Hello");
        assert!(partials.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_stream_fails_with_empty_response() {
        let client = client_with(None, ScriptedBackend::snapshots("local", &[]));

        let err = client.submit("hi").join().await.expect_err("error");
        assert!(matches!(err, BackendError::EmptyResponse));
    }

    #[tokio::test]
    async fn backend_error_fails_the_request() {
        let backend = Arc::new(ScriptedBackend {
            label: "local",
            script: vec![Ok("par".to_string()), Err("rate limited".to_string())],
            hang: false,
        });
        let client = client_with(None, backend);

        let handle = client.submit("hi");
        let err = handle.join().await.expect_err("error");
        assert_eq!(err.to_string(), "rate limited");
    }

    #[tokio::test]
    async fn route_is_remote_exactly_when_a_remote_backend_exists() {
        let remote = ScriptedBackend::snapshots("remote", &["x"]);
        let local = ScriptedBackend::snapshots("local", &["x"]);

        let with_key = client_with(Some(remote), local.clone());
        assert_eq!(with_key.submit("q").backend(), "remote");

        let without_key = client_with(None, local);
        assert_eq!(without_key.submit("q").backend(), "local");
    }

    #[tokio::test]
    async fn later_observer_registration_wins() {
        let client = client_with(None, ScriptedBackend::snapshots("local", &["a", "ab"]));

        let handle = client.submit("hi");
        let mut first = handle.observe();
        let mut second = handle.observe();

        handle.join().await.expect("final");

        assert!(first.recv().await.is_none());
        assert_eq!(second.recv().await.as_deref(), Some("a"));
        assert_eq!(second.recv().await.as_deref(), Some("ab"));
    }

    #[tokio::test]
    async fn abort_cancels_an_in_flight_request() {
        let backend = Arc::new(ScriptedBackend {
            label: "local",
            script: vec![Ok("part".to_string())],
            hang: true,
        });
        let client = client_with(None, backend);

        let handle = client.submit("hi");
        let mut partials = handle.observe();
        assert_eq!(partials.recv().await.as_deref(), Some("part"));

        handle.abort();
        assert_eq!(handle.status(), RequestStatus::Cancelled);

        let err = handle.join().await.expect_err("cancelled");
        assert!(matches!(err, BackendError::Cancelled));
    }

    #[tokio::test]
    async fn status_moves_to_streaming_on_first_snapshot() {
        let backend = Arc::new(ScriptedBackend {
            label: "local",
            script: vec![Ok("part".to_string())],
            hang: true,
        });
        let client = client_with(None, backend);

        let handle = client.submit("hi");
        assert_eq!(handle.status(), RequestStatus::Pending);

        let mut partials = handle.observe();
        partials.recv().await.expect("snapshot");
        assert_eq!(handle.status(), RequestStatus::Streaming);

        handle.abort();
    }
}
