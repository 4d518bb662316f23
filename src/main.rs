use anyhow::Context;
use clap::Parser;
#[cfg(feature = "tui")]
use llman::tui;
use llman::{app, cli, config, paths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = cli::Args::parse();

    let config_dir = paths::config_dir()?;
    let cfg = config::Config::load_optional(config_dir.join("config.toml"))?;
    tracing::debug!(?config_dir, ?cfg, "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    match args.cmd {
        Some(cli::Command::Extract) => {
            return app::cmd_extract().await;
        }
        Some(cli::Command::Suggest { text, query }) => {
            let client = app::build_client(&http, cfg.as_ref(), args.model.clone())?;
            return app::cmd_suggest(&client, text, &query).await;
        }
        #[cfg(feature = "tui")]
        Some(cli::Command::Pick { text }) => {
            return tui::run_picker(&http, cfg.as_ref(), args.model.clone(), text).await;
        }
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: llman \"Fix grammar: ...\" or `llman suggest`");
    }

    let client = app::build_client(&http, cfg.as_ref(), args.model.clone())?;
    app::cmd_ask(&client, &prompt, args.code).await
}
