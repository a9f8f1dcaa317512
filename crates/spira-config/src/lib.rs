use serde::{Deserialize, Serialize};
use spira_domain::{ArtifactType, CredentialProvider, SettingsProvider};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

pub const ENV_SPIRA_CONFIG: &str = "SPIRA_CONFIG";

const DEFAULT_REFRESH_TIME_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpiraConfig {
    #[serde(default)]
    pub credentials: CredentialsToml,
    #[serde(default)]
    pub settings: SettingsToml,
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialsToml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// RSS token, sent as the `api-key` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl fmt::Debug for CredentialsToml {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CredentialsToml")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsToml {
    #[serde(default = "default_show_category")]
    pub show_requirements: bool,
    #[serde(default = "default_show_category")]
    pub show_tasks: bool,
    #[serde(default = "default_show_category")]
    pub show_incidents: bool,
    /// Seconds between automatic refreshes; missing or `<= 0` disables them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<i64>,
}

impl Default for SettingsToml {
    fn default() -> Self {
        Self {
            show_requirements: default_show_category(),
            show_tasks: default_show_category(),
            show_incidents: default_show_category(),
            refresh_time: Some(DEFAULT_REFRESH_TIME_SECS),
        }
    }
}

impl SettingsToml {
    pub fn shows(&self, category: ArtifactType) -> bool {
        match category {
            ArtifactType::Requirement => self.show_requirements,
            ArtifactType::Task => self.show_tasks,
            ArtifactType::Incident => self.show_incidents,
        }
    }
}

fn default_show_category() -> bool {
    true
}

pub fn load_from_env() -> Result<SpiraConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<SpiraConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("spira").join("config.toml"))
}

pub fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_SPIRA_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration("SPIRA_CONFIG contained invalid UTF-8")),
    }
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

pub fn persist_config(path: &Path, config: &SpiraConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize SPIRA_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write SPIRA_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<SpiraConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for SPIRA_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = SpiraConfig::default();
            persist_config(path, &default_config)?;
            return Ok(default_config);
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read SPIRA_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: SpiraConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse SPIRA_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    if normalize_config(&mut config) {
        persist_config(path, &config)?;
    }

    Ok(config)
}

/// Drops blank credential values so they read as "not configured".
fn normalize_config(config: &mut SpiraConfig) -> bool {
    let mut changed = false;
    for value in [
        &mut config.credentials.url,
        &mut config.credentials.username,
        &mut config.credentials.token,
    ] {
        let Some(raw) = value.as_ref() else {
            continue;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            *value = None;
            changed = true;
        } else if trimmed.len() != raw.len() {
            *value = Some(trimmed.to_owned());
            changed = true;
        }
    }
    changed
}

/// Config file plus its in-memory copy; serves as credential and settings
/// provider for the aggregation core.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<SpiraConfig>,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = load_from_path(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(config),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> SpiraConfig {
        self.current
            .read()
            .expect("config store read lock")
            .clone()
    }

    /// Re-reads the file, picking up edits made outside the process.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = load_from_path(&self.path)?;
        *self.current.write().expect("config store write lock") = config;
        Ok(())
    }

    pub fn update_credentials(
        &self,
        url: &str,
        username: &str,
        token: &str,
    ) -> Result<(), ConfigError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::configuration(format!(
                "Spira URL `{url}` must start with http:// or https://"
            )));
        }
        let username = username.trim();
        let token = token.trim();
        if username.is_empty() || token.is_empty() {
            return Err(ConfigError::configuration(
                "Spira username and RSS token cannot be empty.",
            ));
        }

        let mut current = self.current.write().expect("config store write lock");
        let mut updated = current.clone();
        updated.credentials = CredentialsToml {
            url: Some(url.trim_end_matches('/').to_owned()),
            username: Some(username.to_owned()),
            token: Some(token.to_owned()),
        };
        persist_config(&self.path, &updated)?;
        *current = updated;
        Ok(())
    }
}

impl CredentialProvider for ConfigStore {
    fn url(&self) -> Option<String> {
        self.snapshot().credentials.url
    }

    fn username(&self) -> Option<String> {
        self.snapshot().credentials.username
    }

    fn token(&self) -> Option<String> {
        self.snapshot().credentials.token
    }
}

impl SettingsProvider for ConfigStore {
    fn show_category(&self, category: ArtifactType) -> bool {
        self.current
            .read()
            .expect("config store read lock")
            .settings
            .shows(category)
    }

    fn refresh_interval_secs(&self) -> Option<i64> {
        self.current
            .read()
            .expect("config store read lock")
            .settings
            .refresh_time
    }
}
