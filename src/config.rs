//! Runtime configuration.
//!
//! Values come from the process environment (after `.env` discovery) or from
//! any key lookup, so tests never have to mutate the environment.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_MODEL: &str = "OPENAI_MODEL";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_API_BASE: &str = "GITHUB_API_BASE";
pub const ENV_PROMPTS_DIR: &str = "VULNFIX_PROMPTS_DIR";

/// How many directory levels above the start directory are searched for `.env`.
const DOTENV_SEARCH_DEPTH: usize = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} is not set. Add it to your .env or environment ({purpose}).")]
    MissingCredential {
        key: &'static str,
        purpose: &'static str,
    },

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Failed to load {path}: {reason}")]
    Dotenv { path: PathBuf, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub github_token: Option<String>,
    pub github_api_base: String,
    pub prompts_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            github_token: None,
            github_api_base: DEFAULT_GITHUB_API_BASE.to_string(),
            prompts_dir: PathBuf::from(DEFAULT_PROMPTS_DIR),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            openai_api_key: get(ENV_OPENAI_API_KEY),
            openai_base_url: get(ENV_OPENAI_BASE_URL).unwrap_or(defaults.openai_base_url),
            model: get(ENV_OPENAI_MODEL).unwrap_or(defaults.model),
            github_token: get(ENV_GITHUB_TOKEN),
            github_api_base: get(ENV_GITHUB_API_BASE).unwrap_or(defaults.github_api_base),
            prompts_dir: get(ENV_PROMPTS_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.prompts_dir),
        }
    }

    pub fn require_openai_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                key: ENV_OPENAI_API_KEY,
                purpose: "required for analysis",
            })
    }

    pub fn require_github_token(&self) -> Result<&str, ConfigError> {
        self.github_token
            .as_deref()
            .ok_or(ConfigError::MissingCredential {
                key: ENV_GITHUB_TOKEN,
                purpose: "required for GitHub mode",
            })
    }
}

/// Loads the first `.env` found in `start` or up to two parents above it.
///
/// Variables already set in the environment are left alone. Returns the file
/// that was loaded, if any.
pub fn load_dotenv(start: &Path) -> Result<Option<PathBuf>, ConfigError> {
    for dir in start.ancestors().take(DOTENV_SEARCH_DEPTH + 1) {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            dotenvy::from_path(&candidate).map_err(|e| ConfigError::Dotenv {
                path: candidate.clone(),
                reason: e.to_string(),
            })?;
            debug!(path = %candidate.display(), "Loaded .env");
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Parses a `KEY=VALUE` placeholder argument.
pub fn parse_var(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidValue {
            name: "--var".to_string(),
            reason: format!("expected KEY=VALUE, got '{raw}'"),
        }),
    }
}
