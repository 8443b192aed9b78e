//! Configuration types, resolved from the environment before the loop starts.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default poll interval between cycles.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default number of unread messages fetched per cycle.
const DEFAULT_BATCH_SIZE: usize = 5;

const DEFAULT_AUDIT_PATH: &str = "./memory.json";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Triage loop configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Sleep between cycles.
    pub poll_interval: Duration,
    /// Maximum unread messages processed per cycle.
    pub batch_size: usize,
    /// Location of the JSON audit store.
    pub audit_path: PathBuf,
    /// Directory for rolling log files. Stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            audit_path: PathBuf::from(DEFAULT_AUDIT_PATH),
            log_dir: None,
        }
    }
}

impl TriageConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_interval = parse_env::<u64>("TRIAGE_POLL_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let batch_size = parse_env::<usize>("TRIAGE_BATCH_SIZE")?.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TRIAGE_BATCH_SIZE".into(),
                message: "must be at least 1".into(),
            });
        }

        let audit_path = std::env::var("TRIAGE_AUDIT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.audit_path);

        let log_dir = std::env::var("TRIAGE_LOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            poll_interval,
            batch_size,
            audit_path,
            log_dir,
        })
    }
}

/// Classifier and verifier model settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub classifier: LlmConfig,
    pub verifier: LlmConfig,
}

impl ModelConfig {
    /// Build from `TRIAGE_LLM_BACKEND`, `TRIAGE_MODEL`, `TRIAGE_VERIFIER_MODEL`,
    /// `TRIAGE_LLM_BASE_URL` and the backend's API key variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("TRIAGE_LLM_BACKEND") {
            Ok(raw) => LlmBackend::parse(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "TRIAGE_LLM_BACKEND".into(),
                message: format!("unknown backend '{raw}' (expected openai or anthropic)"),
            })?,
            Err(_) => LlmBackend::OpenAi,
        };

        let key_var = backend.api_key_var();
        let api_key = std::env::var(key_var)
            .map_err(|_| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model = std::env::var("TRIAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let verifier_model = std::env::var("TRIAGE_VERIFIER_MODEL").unwrap_or_else(|_| model.clone());
        let base_url = std::env::var("TRIAGE_LLM_BASE_URL").ok();

        Ok(Self {
            classifier: LlmConfig {
                backend,
                api_key: SecretString::from(api_key.clone()),
                model,
                base_url: base_url.clone(),
            },
            verifier: LlmConfig {
                backend,
                api_key: SecretString::from(api_key),
                model: verifier_model,
                base_url,
            },
        })
    }
}

/// Parse an optional environment variable, rejecting present-but-garbage values.
fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
