//! Provisioned device configuration.
//!
//! A flat TOML key/value file (`api_url`, `websocket_url`, `verify_tls`,
//! `token`) written by `zymbit provision` and read by every other command.
//! `ZYMBIT_*` environment variables override values from the file.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

// ── Defaults ────────────────────────────────────────────────────────

pub const DEFAULT_API_URL: &str = "https://api.zymbit.com/zymbit/v2";
pub const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.zymbit.com/";

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "ZYMBIT_";

const CONFIG_KEYS: [&str; 4] = ["api_url", "websocket_url", "verify_tls", "token"];

const FILE_HEADER: &str = "# Written by `zymbit provision`. Re-run provisioning to change.\n";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("device is not provisioned (no config at {})", path.display())]
    NotProvisioned { path: PathBuf },

    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── ProvisionConfig ─────────────────────────────────────────────────

/// Everything a provisioned device needs to talk to the control plane.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProvisionConfig {
    pub api_url: String,
    pub websocket_url: String,
    pub verify_tls: bool,
    pub token: String,
}

impl ProvisionConfig {
    /// Build a config from provisioning arguments, filling URL defaults.
    pub fn new(
        token: impl Into<String>,
        api_url: Option<String>,
        websocket_url: Option<String>,
        verify_tls: bool,
    ) -> Self {
        Self {
            api_url: api_url.unwrap_or_else(|| DEFAULT_API_URL.into()),
            websocket_url: websocket_url.unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.into()),
            verify_tls,
            token: token.into(),
        }
    }

    pub fn token(&self) -> SecretString {
        SecretString::from(self.token.clone())
    }

    pub fn api_url(&self) -> Result<Url, ConfigError> {
        parse_url("api_url", &self.api_url)
    }

    pub fn websocket_url(&self) -> Result<Url, ConfigError> {
        parse_url("websocket_url", &self.websocket_url)
    }

    /// Check that both URLs parse and the token is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_url()?;
        self.websocket_url()?;
        if self.token.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "token".into(),
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for ProvisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisionConfig")
            .field("api_url", &self.api_url)
            .field("websocket_url", &self.websocket_url)
            .field("verify_tls", &self.verify_tls)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e: url::ParseError| ConfigError::Validation {
        field: field.into(),
        reason: format!("{e}: {raw}"),
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "zymbit", "zymbit").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("zymbit");
    p
}

// ── ConfigStore ─────────────────────────────────────────────────────

/// The on-disk home of a [`ProvisionConfig`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform config path.
    pub fn at_default_path() -> Self {
        Self::new(config_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the config from file + environment.
    ///
    /// A missing file is [`ConfigError::NotProvisioned`] even when the
    /// environment supplies every key: other commands must not run on an
    /// unprovisioned device.
    pub fn load(&self) -> Result<ProvisionConfig, ConfigError> {
        if !self.exists() {
            return Err(ConfigError::NotProvisioned {
                path: self.path.clone(),
            });
        }

        let config: ProvisionConfig = Figment::new()
            .merge(Serialized::default("api_url", DEFAULT_API_URL))
            .merge(Serialized::default("websocket_url", DEFAULT_WEBSOCKET_URL))
            .merge(Serialized::default("verify_tls", true))
            .merge(Toml::file(&self.path))
            .merge(Env::prefixed(ENV_PREFIX).only(&CONFIG_KEYS))
            .extract()?;

        config.validate()?;
        tracing::debug!(path = %self.path.display(), "loaded config");
        Ok(config)
    }

    /// Serialize to TOML and replace the file atomically.
    pub fn save(&self, config: &ProvisionConfig) -> Result<(), ConfigError> {
        config.validate()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut contents = String::from(FILE_HEADER);
        contents.push_str(&toml::to_string_pretty(config)?);

        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, contents)?;
        restrict_permissions(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;

        tracing::info!(path = %self.path.display(), "config written");
        Ok(())
    }

    /// Delete the config file. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool, ConfigError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "config removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// The file holds the API token: keep it owner-readable only.
#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("zymbit").join("config.toml"));
        (dir, store)
    }

    #[test]
    fn new_fills_default_urls() {
        let cfg = ProvisionConfig::new("abc", None, None, true);
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.websocket_url, DEFAULT_WEBSOCKET_URL);
        assert!(cfg.verify_tls);
    }

    #[test]
    fn save_then_load_returns_same_values() {
        let (_dir, store) = store();
        let cfg = ProvisionConfig::new(
            "abc",
            Some("http://localhost:8000/api".into()),
            Some("ws://localhost:8001/".into()),
            false,
        );

        store.save(&cfg).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), cfg);
    }

    #[test]
    fn saved_file_is_flat_key_value() {
        let (_dir, store) = store();
        store
            .save(&ProvisionConfig::new("abc", None, None, true))
            .unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        let table: toml::Table = text.parse().unwrap();
        let mut keys: Vec<_> = table.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["api_url", "token", "verify_tls", "websocket_url"]);
        assert!(table.values().all(|v| !v.is_table()));
    }

    #[test]
    fn save_overwrites_previous_config() {
        let (_dir, store) = store();
        store
            .save(&ProvisionConfig::new("first", None, None, true))
            .unwrap();
        store
            .save(&ProvisionConfig::new("second", None, None, false))
            .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.token, "second");
        assert!(!loaded.verify_tls);
    }

    #[test]
    fn missing_file_is_not_provisioned() {
        let (_dir, store) = store();
        assert!(matches!(
            store.load(),
            Err(ConfigError::NotProvisioned { .. })
        ));
    }

    #[test]
    fn partial_file_gets_defaults() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "token = \"abc\"\n").unwrap();

        let cfg = store.load().unwrap();
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert!(cfg.verify_tls);
    }

    #[test]
    fn remove_reports_whether_file_existed() {
        let (_dir, store) = store();
        assert!(!store.remove().unwrap());

        store
            .save(&ProvisionConfig::new("abc", None, None, true))
            .unwrap();
        assert!(store.remove().unwrap());
        assert!(!store.exists());
    }

    #[test]
    fn invalid_url_is_rejected_on_save() {
        let (_dir, store) = store();
        let cfg = ProvisionConfig::new("abc", Some("not a url".into()), None, true);
        assert!(matches!(
            store.save(&cfg),
            Err(ConfigError::Validation { ref field, .. }) if field == "api_url"
        ));
        assert!(!store.exists());
    }

    #[test]
    fn debug_output_redacts_token() {
        let cfg = ProvisionConfig::new("super-secret", None, None, true);
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, store) = store();
        store
            .save(&ProvisionConfig::new("abc", None, None, true))
            .unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
