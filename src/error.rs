//! Crate-level error type.
//!
//! Only configuration and setup paths produce a `FableError`. Failures that
//! happen during a turn (upstream status, transport faults, cancellation) are
//! never raised to the caller: the turn client turns them into a transcript
//! line instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FableError {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("{var} not set. Export it or put `api_key` in the config file.")]
    MissingApiKey { var: &'static str },

    #[error("unknown mode: {0}")]
    UnknownMode(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_names_the_variable() {
        let err = FableError::MissingApiKey { var: "OPENAI_API_KEY" };
        assert!(err.to_string().starts_with("OPENAI_API_KEY not set"));
    }

    #[test]
    fn test_unknown_mode_display() {
        let err = FableError::UnknownMode("shout".to_string());
        assert_eq!(err.to_string(), "unknown mode: shout");
    }

    #[test]
    fn test_toml_error_converts() {
        let parse_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: FableError = parse_err.into();
        assert!(err.to_string().starts_with("invalid config:"));
    }
}
