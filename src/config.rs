use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default model (optional)
    pub model: Option<String>,

    /// API key for the remote completion service. Its presence is what
    /// selects the streaming backend.
    pub api_key: Option<String>,

    /// Base URL override for the remote completion service.
    pub api_base: Option<String>,

    /// Host assistant command used when no API key is configured. The prompt
    /// goes to its stdin; the completion is read from its stdout.
    pub host_command: Option<Vec<String>>,

    /// Quiet period for live query input, in milliseconds.
    pub debounce_ms: Option<u64>,
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    pub fn debounce_window(&self) -> std::time::Duration {
        self.debounce_ms
            .map(std::time::Duration::from_millis)
            .unwrap_or(crate::debounce::DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let cfg: Config = toml::from_str(
            r#"
            model = "gpt-3.5-turbo"
            api_key = "sk-test"
            host_command = ["assistant", "--oneshot"]
            debounce_ms = 250
            "#,
        )
        .expect("valid toml");

        assert_eq!(cfg.model.as_deref(), Some("gpt-3.5-turbo"));
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        assert_eq!(
            cfg.host_command.as_deref(),
            Some(&["assistant".to_string(), "--oneshot".to_string()][..])
        );
        assert_eq!(cfg.debounce_window(), std::time::Duration::from_millis(250));
    }

    #[test]
    fn all_fields_are_optional() {
        let cfg: Config = toml::from_str("").expect("valid toml");
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.debounce_window(), crate::debounce::DEFAULT_WINDOW);
    }

    #[test]
    fn missing_file_is_none() {
        let loaded = Config::load_optional("/definitely/not/here/config.toml").expect("ok");
        assert!(loaded.is_none());
    }
}
