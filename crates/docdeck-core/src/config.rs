//! Configuration loading and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_MODEL: &str = "Fast";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Top-level docdeck configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChatConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Where the chat backend lives and how to authenticate against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_env: Option<String>,

    /// Whole-request timeout for non-streaming calls.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl BackendConfig {
    /// Resolve the bearer token: `access_token` first, then `access_token_env`.
    pub fn resolve_access_token(&self) -> Option<String> {
        resolve_secret_field(&self.access_token, &self.access_token_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// Ask the backend to search the NAS index as well.
    #[serde(default)]
    pub use_nas: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "docdeck_stream=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_VAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid")
});

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_RE.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::DocdeckError::Config(e.to_string()))?;

        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Backend base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        self.backend
            .as_ref()
            .map(|b| b.base_url.as_str())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn access_token(&self) -> Option<String> {
        self.backend.as_ref().and_then(|b| b.resolve_access_token())
    }

    pub fn timeout_secs(&self) -> u64 {
        self.backend
            .as_ref()
            .map(|b| b.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    pub fn default_model(&self) -> String {
        self.chat
            .as_ref()
            .and_then(|c| c.default_model.clone())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string())
    }

    pub fn use_nas(&self) -> bool {
        self.chat.as_ref().is_some_and(|c| c.use_nas)
    }

    /// Get a config value by dotted path (e.g. "backend.base_url").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(backend) = &self.backend {
            let url = backend.base_url.trim();
            if url.is_empty() {
                errors.push("Backend base_url cannot be empty".to_string());
            } else if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("Backend base_url must be http(s): {url}"));
            }
            if backend.timeout_secs == 0 {
                errors.push("Backend timeout_secs cannot be 0".to_string());
            }
        }

        if self.access_token().is_none() {
            warnings.push("No backend access token configured".to_string());
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                warnings.push(format!(
                    "Unknown logging format '{}', falling back to plain",
                    logging.format
                ));
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for docdeck data: `~/.docdeck/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docdeck")
}
