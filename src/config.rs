//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the [`RecommenderConfig`] struct, which holds every knob the
//! pipeline reads (API endpoint and credentials, model identifiers, retry and
//! concurrency limits, artifact locations), and a [`load_config`] function to
//! load it from a YAML file.
//!
//! Nothing in the library reads the environment on its own: the CLI resolves
//! overrides (such as `OPENAI_API_KEY`) and hands a finished config to the
//! clients that need it.
//!
//! # Examples
//!
//! ```no_run
//! use std::path::Path;
//! use vetrina::config::load_config;
//!
//! let config = load_config(Path::new("/path/to/config.yaml")).unwrap();
//! println!("{:?}", config.chat_model);
//! ```

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::*;

use crate::error::{RecommendError, Result};

/// Represents the application's configuration.
///
/// Every field has a default, so a file holding just `api_key` works; the
/// defaults target the hosted OpenAI setup (OpenAI, `text-embedding-3-small`,
/// `gpt-4o-mini` at temperature 0.3, three results per query).
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct RecommenderConfig {
    /// The API key used to authenticate requests to the API.
    pub api_key: String,

    /// The base URL of the OpenAI-compatible API.
    pub api_base: String,

    /// Model used for both catalog and query embeddings.
    pub embedding_model: String,

    /// Model used to write the recommendation.
    pub chat_model: String,

    /// Sampling temperature for the recommendation.
    pub temperature: f32,

    /// Per-request timeout for embedding and generation calls.
    pub request_timeout_secs: u64,

    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,

    /// Base delay of the exponential backoff between retries.
    pub retry_backoff_ms: u64,

    /// Maximum embedding requests in flight while building.
    pub build_concurrency: usize,

    /// Results per query when the caller does not pass `k`.
    pub default_k: usize,

    // Prompt size above which a warning is logged.
    pub context_max_tokens: usize,

    // Vector index artifact.
    pub index_path: PathBuf,

    // Text store artifact, paired with `index_path`.
    pub store_path: PathBuf,

    /// Name of the template under `<config_dir>/templates/`.
    pub template: String,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
            build_concurrency: 8,
            default_k: 3,
            context_max_tokens: 8192,
            index_path: PathBuf::from("prodotti_index.vidx"),
            store_path: PathBuf::from("prodotti_texts.vtxt"),
            template: "product_recommendation".to_string(),
        }
    }
}

impl RecommenderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Reject values the pipeline can't work with.
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(RecommendError::Config("api_base is empty".into()));
        }
        if self.embedding_model.trim().is_empty() || self.chat_model.trim().is_empty() {
            return Err(RecommendError::Config("model identifiers must be set".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RecommendError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.build_concurrency == 0 {
            return Err(RecommendError::Config(
                "build_concurrency must be at least 1".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(RecommendError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.index_path == self.store_path {
            return Err(RecommendError::Config(
                "index_path and store_path must differ".into(),
            ));
        }
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Errors
/// - [`RecommendError::Io`] when the file cannot be read.
/// - [`RecommendError::Config`] when the YAML is malformed or fails
///   [`RecommenderConfig::validate`].
pub fn load_config(file: &Path) -> Result<RecommenderConfig> {
    debug!("Loading config: {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: RecommenderConfig = serde_yaml::from_str(&content)
        .map_err(|e| RecommendError::Config(format!("{}: {e}", file.display())))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_valid_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
api_key: "example_api_key"
api_base: "http://example.com/v1"
chat_model: "example_model"
temperature: 0.5
default_k: 5
index_path: "/tmp/catalog.vidx"
store_path: "/tmp/catalog.vtxt"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path());

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.api_key, "example_api_key");
        assert_eq!(config.api_base, "http://example.com/v1");
        assert_eq!(config.chat_model, "example_model");
        assert_eq!(config.default_k, 5);
        assert_eq!(config.index_path, PathBuf::from("/tmp/catalog.vidx"));
        // unspecified fields fall back to defaults
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_load_config_invalid_file() {
        let config = load_config(Path::new("non/existent/path"));
        assert!(matches!(config, Err(RecommendError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_format() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, r#"invalid: config: format"#).unwrap();

        let config = load_config(temp_file.path());
        assert!(matches!(config, Err(RecommendError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut config = RecommenderConfig {
            temperature: 3.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.temperature = 0.3;
        config.build_concurrency = 0;
        assert!(config.validate().is_err());

        config.build_concurrency = 4;
        config.store_path = config.index_path.clone();
        assert!(config.validate().is_err());

        config.store_path = PathBuf::from("other.vtxt");
        assert!(config.validate().is_ok());
    }
}
