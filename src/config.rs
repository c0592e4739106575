//! Narrator connection settings.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! file (or no file) is valid. The API key may live in the file or in the
//! provider's environment variable.
//!
//! ```toml
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//! history_window = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{FableError, Result};
use crate::providers::Provider;
use crate::session::DEFAULT_HISTORY_WINDOW;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NarratorConfig {
    /// Accepts the same aliases as the command line (`claude`, `proxy`).
    #[serde(deserialize_with = "provider_by_name")]
    pub provider: Provider,
    /// Overrides the provider's default endpoint.
    pub endpoint: Option<String>,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub history_window: usize,
    pub connect_timeout_secs: u64,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        NarratorConfig {
            provider: Provider::default(),
            endpoint: None,
            model: None,
            api_key: None,
            temperature: 0.8,
            max_tokens: 400,
            history_window: DEFAULT_HISTORY_WINDOW,
            connect_timeout_secs: 10,
        }
    }
}

fn provider_by_name<'de, D>(deserializer: D) -> std::result::Result<Provider, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Provider::from_str_loose(&name).map_err(serde::de::Error::custom)
}

impl NarratorConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| FableError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.provider.default_endpoint())
    }

    pub fn model(&self) -> String {
        resolve_model(self.provider, self.model.as_deref())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    /// API key from the config file, else from the provider's environment
    /// variable. Relays may run without one.
    pub fn resolve_api_key(&self) -> Result<Option<String>> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(Some(key.clone()));
        }
        let var = self.provider.api_key_var();
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Some(key)),
            _ if self.provider.requires_api_key() => Err(FableError::MissingApiKey { var }),
            _ => Ok(None),
        }
    }
}

/// The configured model, or the provider's default when none is set.
pub fn resolve_model(provider: Provider, model: Option<&str>) -> String {
    match model.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => provider.default_model().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_toml_is_default() {
        let cfg = NarratorConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, NarratorConfig::default());
        assert_eq!(cfg.history_window, DEFAULT_HISTORY_WINDOW);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let cfg = NarratorConfig::from_toml_str(
            "provider = \"openai\"\nmodel = \"gpt-4o\"\nhistory_window = 12\n",
        )
        .unwrap();
        assert_eq!(cfg.provider, Provider::Openai);
        assert_eq!(cfg.model(), "gpt-4o");
        assert_eq!(cfg.history_window, 12);
        assert_eq!(cfg.max_tokens, 400);
    }

    #[test]
    fn test_provider_alias_in_file() {
        let cfg = NarratorConfig::from_toml_str("provider = \"Claude\"\n").unwrap();
        assert_eq!(cfg.provider, Provider::Anthropic);
    }

    #[test]
    fn test_unknown_provider_in_file() {
        let err = NarratorConfig::from_toml_str("provider = \"mystery\"\n").unwrap_err();
        assert!(matches!(err, FableError::ConfigParse(_)));
        assert!(err.to_string().contains("unknown provider: mystery"), "got {err}");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = NarratorConfig::from_toml_str("provider = 3").unwrap_err();
        assert!(matches!(err, FableError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "provider = \"anthropic\"\nendpoint = \"http://127.0.0.1:9/x\"").unwrap();
        let cfg = NarratorConfig::load(file.path()).unwrap();
        assert_eq!(cfg.provider, Provider::Anthropic);
        assert_eq!(cfg.endpoint(), "http://127.0.0.1:9/x");
    }

    #[test]
    fn test_load_missing_file() {
        let err = NarratorConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, FableError::ConfigRead { .. }));
    }

    #[test]
    fn test_endpoint_defaults_to_provider() {
        let cfg = NarratorConfig { provider: Provider::Openai, ..Default::default() };
        assert_eq!(cfg.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_resolve_model_default_swap() {
        assert_eq!(resolve_model(Provider::Anthropic, None), "claude-sonnet-4-20250514");
        assert_eq!(resolve_model(Provider::Anthropic, Some("  ")), "claude-sonnet-4-20250514");
        assert_eq!(resolve_model(Provider::Openai, Some("gpt-4")), "gpt-4");
    }

    #[test]
    fn test_api_key_from_config_wins() {
        let cfg = NarratorConfig {
            provider: Provider::Openai,
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_api_key().unwrap().as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_relay_without_key_is_fine() {
        std::env::remove_var("FABLE_RELAY_KEY");
        let cfg = NarratorConfig::default();
        assert_eq!(cfg.resolve_api_key().unwrap(), None);
    }

    #[test]
    fn test_anthropic_requires_key() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let cfg = NarratorConfig { provider: Provider::Anthropic, ..Default::default() };
        assert!(matches!(
            cfg.resolve_api_key(),
            Err(FableError::MissingApiKey { var: "ANTHROPIC_API_KEY" })
        ));
    }
}
