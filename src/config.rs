use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::infra::llm::DEFAULT_MAX_DIFF_CHARS;

const CONFIG_DIR_NAME: &str = "aicommit";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_KEY: &str = "AICOMMIT_API_KEY";
pub const ENV_ENDPOINT: &str = "AICOMMIT_ENDPOINT";
pub const ENV_MODEL: &str = "AICOMMIT_MODEL";
pub const ENV_REQUEST_TIMEOUT: &str = "AICOMMIT_REQUEST_TIMEOUT";
pub const ENV_GIT_TIMEOUT: &str = "AICOMMIT_GIT_TIMEOUT";

/// Effective settings: defaults, then the stored file, then the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_diff_chars: usize,
    /// `None` leaves HTTP requests to the transport defaults.
    pub request_timeout: Option<Duration>,
    /// `None` lets git commands run without a deadline.
    pub git_timeout: Option<Duration>,
    pub workspace_root: PathBuf,
}

impl AppConfig {
    pub fn load(workspace_hint: &Path) -> AppResult<Self> {
        let stored = StoredConfig::load()?;
        Ok(Self::from_lookup(stored, workspace_hint, |key| env::var(key).ok()))
    }

    pub fn from_lookup<F>(stored: StoredConfig, workspace_hint: &Path, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let api_key = var(ENV_API_KEY).or(stored.api_key);
        let endpoint = var(ENV_ENDPOINT)
            .or(stored.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = var(ENV_MODEL)
            .or(stored.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let request_timeout_secs = var(ENV_REQUEST_TIMEOUT)
            .and_then(|value| parse_secs(ENV_REQUEST_TIMEOUT, &value))
            .or(stored.request_timeout_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let git_timeout_secs = var(ENV_GIT_TIMEOUT)
            .and_then(|value| parse_secs(ENV_GIT_TIMEOUT, &value))
            .or(stored.git_timeout_secs)
            .unwrap_or(DEFAULT_GIT_TIMEOUT_SECS);

        Self {
            api_key,
            endpoint,
            model,
            temperature: stored.temperature,
            max_tokens: stored.max_tokens,
            max_diff_chars: stored
                .max_diff_chars
                .filter(|chars| *chars > 0)
                .unwrap_or(DEFAULT_MAX_DIFF_CHARS),
            request_timeout: seconds(request_timeout_secs),
            git_timeout: seconds(git_timeout_secs),
            workspace_root: workspace_hint.to_path_buf(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

fn parse_secs(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!("Invalid {key} value '{value}', ignoring it");
            None
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// On-disk settings written by `aicommit config init`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_diff_chars: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_timeout_secs: Option<u64>,
}

impl StoredConfig {
    pub fn load() -> AppResult<Self> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> AppResult<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|err| {
                AppError::Configuration(format!("invalid config file {}: {err}", path.display()))
            }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(AppError::Io(err)),
        }
    }

    pub fn save(&self) -> AppResult<()> {
        self.save_to(&config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| AppError::Configuration(format!("failed to write config: {err}")))?;
        fs::write(path, data)?;
        restrict_permissions(path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> AppResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> AppResult<()> {
    Ok(())
}

pub fn config_directory() -> AppResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or_else(|| {
            AppError::Configuration("unable to determine the user config directory".to_string())
        })
}

pub fn config_file_path() -> AppResult<PathBuf> {
    Ok(config_directory()?.join(CONFIG_FILE_NAME))
}
