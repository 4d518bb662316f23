use super::{Backend, BackendError, Chunk, ChunkStream, CompletionParams};
use anyhow::Context;
use futures_core::future::BoxFuture;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Host-provided single-shot ask capability.
///
/// No partial results; the whole completion arrives at once.
pub trait HostAsk: Send + Sync {
    fn ask(&self, prompt: String, model: String) -> BoxFuture<'static, anyhow::Result<String>>;
}

/// Backend over the host ask capability.
///
/// Degenerate stream: zero-or-one snapshot, emitted at completion. A missing
/// or failing host, or blank host output, surfaces as `HostUnavailable`.
pub struct LocalBackend {
    host: Option<Arc<dyn HostAsk>>,
}

impl LocalBackend {
    pub fn new(host: Option<Arc<dyn HostAsk>>) -> Self {
        Self { host }
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn complete(
        &self,
        params: CompletionParams,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ChunkStream, BackendError>> + Send>>
    {
        let host = self.host.clone();

        Box::pin(async move {
            let Some(host) = host else {
                return Err(BackendError::HostUnavailable(
                    "no host assistant configured (set host_command in config.toml or configure an API key)"
                        .to_string(),
                ));
            };

            let (tx, rx) = mpsc::channel::<Result<Chunk, BackendError>>(1);
            let fut = host.ask(params.prompt, params.model);

            tokio::spawn(async move {
                let outcome = match fut.await {
                    Ok(text) if text.trim().is_empty() => Err(BackendError::HostUnavailable(
                        "host assistant returned no content".to_string(),
                    )),
                    Ok(text) => Ok(Chunk { text }),
                    Err(e) => Err(BackendError::HostUnavailable(format!("{e:#}"))),
                };
                let _ = tx.send(outcome).await;
            });

            Ok(Box::pin(ReceiverStream::new(rx)) as ChunkStream)
        })
    }
}

/// Bridges `HostAsk` to an external assistant command.
///
/// Spawns the configured argv with the prompt on stdin and reads the
/// completion from stdout; the model name is exported as `LLMAN_MODEL`.
#[derive(Debug, Clone)]
pub struct CommandHost {
    command: String,
    args: Vec<String>,
}

impl CommandHost {
    pub fn new(argv: &[String]) -> anyhow::Result<Self> {
        let (command, args) = argv.split_first().context("host_command is empty")?;
        Ok(Self {
            command: command.clone(),
            args: args.to_vec(),
        })
    }
}

impl HostAsk for CommandHost {
    fn ask(&self, prompt: String, model: String) -> BoxFuture<'static, anyhow::Result<String>> {
        let command = self.command.clone();
        let args = self.args.clone();

        Box::pin(async move {
            let mut cmd = tokio::process::Command::new(&command);
            cmd.args(&args)
                .env("LLMAN_MODEL", &model)
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .stderr(std::process::Stdio::inherit());

            let mut child = cmd
                .spawn()
                .with_context(|| format!("failed to spawn host command: {command} {args:?}"))?;

            let mut stdin = child.stdin.take().context("child stdin missing")?;
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("failed to write prompt to host command")?;
            drop(stdin);

            let out = child
                .wait_with_output()
                .await
                .context("failed to wait for host command")?;
            if !out.status.success() {
                anyhow::bail!("host command exited with {}", out.status);
            }

            Ok(String::from_utf8_lossy(&out.stdout).into_owned())
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::StubHost;
    use super::*;
    use tokio_stream::StreamExt;

    fn params() -> CompletionParams {
        CompletionParams {
            model: "test-model".to_string(),
            prompt: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn emits_exactly_one_snapshot() {
        let backend = LocalBackend::new(Some(StubHost::ok("full text")));
        let mut chunks = backend.complete(params()).await.expect("stream");

        let first = chunks.next().await.expect("one chunk").expect("ok");
        assert_eq!(first.text, "full text");
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn blank_host_output_is_host_unavailable() {
        let backend = LocalBackend::new(Some(StubHost::ok("   \n")));
        let mut chunks = backend.complete(params()).await.expect("stream");

        let err = chunks.next().await.expect("one item").expect_err("error");
        assert!(matches!(err, BackendError::HostUnavailable(_)));
    }

    #[tokio::test]
    async fn host_failure_is_host_unavailable() {
        let backend = LocalBackend::new(Some(StubHost::failing("boom")));
        let mut chunks = backend.complete(params()).await.expect("stream");

        let err = chunks.next().await.expect("one item").expect_err("error");
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn missing_host_fails_at_start() {
        let backend = LocalBackend::new(None);
        let err = backend.complete(params()).await.err().expect("error");
        assert!(matches!(err, BackendError::HostUnavailable(_)));
    }
}
