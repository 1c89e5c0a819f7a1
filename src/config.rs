//! Global configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::models::violation::ViolationKind;
use crate::{AppError, Result};

/// Keychain service name used for credential lookup.
pub const KEYRING_SERVICE: &str = "interview-proctor";

/// Risk scoring configuration.
///
/// The threshold and weights are product calibration values; they are
/// configurable but their defaults match the values the proctoring
/// client has always used.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RiskConfig {
    /// Score at or above which a session is terminated.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Default weight per violation kind, keyed by the kind's wire name.
    #[serde(default = "default_weights")]
    pub weights: HashMap<String, u32>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            weights: default_weights(),
        }
    }
}

impl RiskConfig {
    /// Configured weight for a violation kind, if any.
    #[must_use]
    pub fn weight_for(&self, kind: &ViolationKind) -> Option<u32> {
        self.weights.get(kind.as_str()).copied()
    }
}

fn default_threshold() -> u32 {
    100
}

fn default_weights() -> HashMap<String, u32> {
    ViolationKind::known()
        .iter()
        .filter_map(|kind| kind.default_weight().map(|w| (kind.as_str().to_owned(), w)))
        .collect()
}

/// Interview countdown configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DeadlineConfig {
    /// Interview length from start to automatic completion.
    #[serde(default = "default_duration_seconds")]
    pub duration_seconds: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            duration_seconds: default_duration_seconds(),
        }
    }
}

fn default_duration_seconds() -> u64 {
    25 * 60
}

/// Text-generation capability configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    /// Base URL of the `generateContent` API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout.
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: u64,
    /// Number of most recent transcript turns sent as context.
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    /// Maximum characters of reference material included in reply prompts.
    #[serde(default = "default_reference_excerpt_chars")]
    pub reference_excerpt_chars: usize,
    /// Maximum characters of reference material included in report prompts.
    #[serde(default = "default_report_excerpt_chars")]
    pub report_excerpt_chars: usize,
    /// API key (populated at runtime, never read from the file).
    #[serde(skip)]
    pub api_key: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_seconds: default_generation_timeout(),
            context_turns: default_context_turns(),
            reference_excerpt_chars: default_reference_excerpt_chars(),
            report_excerpt_chars: default_report_excerpt_chars(),
            api_key: String::new(),
        }
    }
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".into()
}

fn default_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_context_turns() -> usize {
    10
}

fn default_reference_excerpt_chars() -> usize {
    2000
}

fn default_report_excerpt_chars() -> usize {
    1000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data").join("interviews.db")
}

fn default_http_port() -> u16 {
    5000
}

fn default_retention_days() -> u32 {
    30
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// HTTP port for the session API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Days after session closure before data is purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Directory for JSONL audit logs; auditing is off when absent.
    #[serde(default)]
    pub audit_log_dir: Option<PathBuf>,
    /// Risk threshold and weights.
    #[serde(default)]
    pub risk: RiskConfig,
    /// Interview countdown.
    #[serde(default)]
    pub deadline: DeadlineConfig,
    /// Reply generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the generation API key from OS keychain with env-var fallback.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither keychain nor env var provide
    /// the key.
    pub async fn load_credentials(&mut self) -> Result<()> {
        self.generation.api_key =
            load_credential("generation_api_key", "GENERATION_API_KEY").await?;
        Ok(())
    }

    /// Interview length as a [`Duration`].
    #[must_use]
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline.duration_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.risk.threshold == 0 {
            return Err(AppError::Config(
                "risk.threshold must be greater than zero".into(),
            ));
        }

        if self.deadline.duration_seconds == 0 {
            return Err(AppError::Config(
                "deadline.duration_seconds must be greater than zero".into(),
            ));
        }

        if self.generation.context_turns == 0 {
            return Err(AppError::Config(
                "generation.context_turns must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Load a single credential from OS keychain with env-var fallback.
async fn load_credential(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            warn!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    env::var(env_key)
        .ok()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            AppError::Config(format!(
                "credential {keyring_key} not found in keychain or {env_key} env var"
            ))
        })
}
