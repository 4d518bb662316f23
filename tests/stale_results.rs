//! A superseded request may finish whenever it likes; its result must never
//! overwrite the result of a newer settled query.

use llman::backend::{Backend, BackendError, Chunk, ChunkStream, CompletionParams, SharedBackend};
use llman::client::Client;
use llman::debounce::QueryDebouncer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::ReceiverStream;

/// Emits one snapshot, optionally only after being released.
struct GatedBackend {
    reply: &'static str,
    gate: Option<Arc<Notify>>,
}

impl Backend for GatedBackend {
    fn name(&self) -> &'static str {
        "gated"
    }

    fn complete(
        &self,
        _params: CompletionParams,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, BackendError>> + Send>>
    {
        let reply = self.reply;
        let gate = self.gate.clone();

        Box::pin(async move {
            let (tx, rx) = mpsc::channel(1);
            tokio::spawn(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                let _ = tx
                    .send(Ok(Chunk {
                        text: reply.to_string(),
                    }))
                    .await;
            });
            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

fn client_over(backend: GatedBackend) -> Client {
    Client::new(None, Arc::new(backend) as SharedBackend, "test-model")
}

#[tokio::test(start_paused = true)]
async fn stale_resolution_does_not_overwrite_a_newer_result() {
    let mut debouncer = QueryDebouncer::new(Duration::from_millis(100));
    let gate = Arc::new(Notify::new());

    let slow = client_over(GatedBackend {
        reply: "result for A",
        gate: Some(gate.clone()),
    });
    let fast = client_over(GatedBackend {
        reply: "result for B",
        gate: None,
    });

    // Query A settles and its request goes out.
    debouncer.push("a");
    let settle_a = debouncer.settled().await.expect("settle A");
    let handle_a = slow.submit("prompt for a");

    // Query B settles before A has resolved.
    debouncer.push("b");
    let settle_b = debouncer.settled().await.expect("settle B");
    let handle_b = fast.submit("prompt for b");

    let mut displayed: Option<String> = None;

    // B resolves first and is applied.
    let b = handle_b.join().await.expect("B resolves");
    if debouncer.is_current(settle_b.generation) {
        displayed = Some(b);
    }

    // A resolves later; it ran to completion but its generation is stale.
    gate.notify_one();
    let a = handle_a.join().await.expect("A still resolves");
    assert_eq!(a, "result for A");
    if debouncer.is_current(settle_a.generation) {
        displayed = Some(a);
    }

    assert_eq!(displayed.as_deref(), Some("result for B"));
}
