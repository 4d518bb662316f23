use crate::backend::local::{CommandHost, HostAsk, LocalBackend};
use crate::backend::SharedBackend;
use crate::client::Client;
use crate::{config, extract, suggest};
use anyhow::Context;
use std::sync::Arc;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Resolve the remote credential. Its presence is the backend-selection
/// signal; the environment beats the config file.
pub fn resolve_api_key(cfg: Option<&config::Config>) -> Option<String> {
    std::env::var("LLMAN_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .ok()
        .or_else(|| cfg.and_then(|c| c.api_key.clone()))
}

pub fn build_client(
    http: &reqwest::Client,
    cfg: Option<&config::Config>,
    model_override: Option<String>,
) -> anyhow::Result<Client> {
    let model = model_override
        .or_else(|| cfg.and_then(|c| c.model.clone()))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let api_key = resolve_api_key(cfg);
    let host_command = cfg.and_then(|c| c.host_command.clone());

    if api_key.is_none() && host_command.is_none() {
        anyhow::bail!(
            "No API key or host command configured. Set LLMAN_API_KEY (or OPENAI_API_KEY), or add host_command to config.toml."
        );
    }

    let remote: Option<SharedBackend> = match api_key {
        Some(key) => {
            #[cfg(feature = "openai")]
            {
                let api_base = cfg.and_then(|c| c.api_base.as_deref());
                let backend =
                    crate::backend::openai::OpenAiBackend::new(http.clone(), &key, api_base)?;
                Some(Arc::new(backend) as SharedBackend)
            }
            #[cfg(not(feature = "openai"))]
            {
                let _ = key;
                tracing::warn!(
                    "API key configured but the openai feature is disabled; using the local backend"
                );
                None
            }
        }
        None => None,
    };

    let host = match host_command {
        Some(argv) => {
            let host: Arc<dyn HostAsk> = Arc::new(CommandHost::new(&argv)?);
            Some(host)
        }
        None => None,
    };
    let local = Arc::new(LocalBackend::new(host)) as SharedBackend;

    Ok(Client::new(remote, local, model))
}

/// One-shot ask: stream partial snapshots to stdout, newline after the final
/// value. With `code_only`, stay quiet and print just the first fenced block
/// of the result (falling back to the whole trimmed text).
pub async fn cmd_ask(client: &Client, prompt: &str, code_only: bool) -> anyhow::Result<()> {
    let handle = client.submit(prompt);

    if code_only {
        let text = handle.join().await.context("completion failed")?;
        let out = extract::first_code_block(&text).unwrap_or_else(|| text.trim().to_string());
        println!("{out}");
        return Ok(());
    }

    let mut partials = handle.observe();
    let printer = tokio::spawn(async move {
        use std::io::Write;
        let mut printed = 0usize;
        while let Some(snapshot) = partials.recv().await {
            // Snapshots only ever grow; print the new suffix.
            if let Some(new) = snapshot.get(printed..) {
                print!("{new}");
                std::io::stdout().flush().ok();
                printed = snapshot.len();
            }
        }
    });

    let outcome = handle.join().await;
    printer.await.ok();
    outcome.context("completion failed")?;
    println!();
    Ok(())
}

/// Print the parsed suggestion listing for a piece of text, one per line.
pub async fn cmd_suggest(client: &Client, text: Option<String>, query: &str) -> anyhow::Result<()> {
    let selected = resolve_selected_text(text).await?;

    let handle = client.submit(&suggest::suggestion_prompt(&selected, query));
    let listing = handle.join().await.context("suggestion request failed")?;

    for entry in suggest::parse_suggestions(&listing) {
        println!("{entry}");
    }
    Ok(())
}

pub async fn cmd_extract() -> anyhow::Result<()> {
    let text = read_stdin().await?;
    if let Some(block) = extract::first_code_block(&text) {
        println!("{block}");
    }
    Ok(())
}

/// The text being transformed: the flag value, or whatever was piped in.
pub async fn resolve_selected_text(text: Option<String>) -> anyhow::Result<String> {
    let raw = match text {
        Some(t) => t,
        None => read_stdin().await?,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        anyhow::bail!("No text to transform. Pipe it on stdin or pass --text.");
    }
    Ok(trimmed.to_string())
}

async fn read_stdin() -> anyhow::Result<String> {
    use tokio::io::AsyncReadExt;
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("failed to read stdin")?;
    Ok(text)
}
