use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::reconcile::ReconcileOptions;

pub const CONFIG_FILE: &str = ".mr-anchor.toml";
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .mr-anchor.toml.
/// All fields are optional; the defaults work with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitLab connection settings
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// How unaddressable or ambiguous comments are handled
    #[serde(default)]
    pub positioning: ReconcileOptions,

    /// Comment submission limits
    #[serde(default)]
    pub submit: SubmitConfig,

    /// What the reviewer gets to see
    #[serde(default)]
    pub review: ReviewConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitLabConfig {
    /// API base URL. If None, falls back to GITLAB_API_URL, then gitlab.com.
    pub api_url: Option<String>,
    /// API token. If None, falls back to GITLAB_API_TOKEN env var.
    pub token: Option<String>,
}

impl GitLabConfig {
    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .or_else(|| std::env::var("GITLAB_API_URL").ok())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve the token: config file value takes precedence,
    /// falls back to GITLAB_API_TOKEN env var.
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var("GITLAB_API_TOKEN").ok())
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubmitConfig {
    /// Maximum number of comments posted at the same time
    pub max_concurrent: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            timeout_secs: 30,
        }
    }
}

impl SubmitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Regexes for file paths that are never sent to the reviewer
    pub ignore_patterns: Vec<String>,
    /// Maximum number of files sent to the reviewer
    pub max_files: usize,
    /// Diff lines per file sent to the reviewer; positioning always uses the full diff
    pub max_lines_per_file: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                r".*\.lock$".to_string(),
                r".*package-lock\.json$".to_string(),
                r".*\.min\.(js|css)$".to_string(),
                r"(^|.*/)dist/.*".to_string(),
                r"(^|.*/)build/.*".to_string(),
            ],
            max_files: 10,
            max_lines_per_file: 300,
        }
    }
}

impl Config {
    /// Load configuration from .mr-anchor.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}
