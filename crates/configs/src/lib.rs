//! # configs
//!
//! Layered settings for the moderation tooling.
//!
//! Sources, later ones win:
//! 1. `.env` (loaded into the process environment when present)
//! 2. built-in defaults
//! 3. `board-admin.toml`, or the file named by `BOARD_ADMIN_CONFIG`
//! 4. `BOARD_ADMIN__SECTION__KEY` environment variables

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

pub const CONFIG_PATH_VAR: &str = "BOARD_ADMIN_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "board-admin.toml";
pub const ENV_PREFIX: &str = "BOARD_ADMIN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: SecretString,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: SecretString::from("postgres://localhost/board"), max_connections: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: SecretString,
    pub max_connections: usize,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self { url: SecretString::from("redis://127.0.0.1:6379"), max_connections: 16 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub bucket: String,
    pub region: String,
    /// S3-compatible endpoint; AWS when unset
    pub endpoint: Option<String>,
    pub source_prefix: String,
    pub thumbnail_prefix: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: "board-media".into(),
            region: "us-east-1".into(),
            endpoint: None,
            source_prefix: "src".into(),
            thumbnail_prefix: "thumb".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectorySettings {
    pub image_dir: PathBuf,
    pub thumbnail_dir: PathBuf,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("/tmp/board/src/"),
            thumbnail_dir: PathBuf::from("/tmp/board/thumb/"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub tag_min_length: usize,
    pub tag_max_length: usize,
    pub audit_per_page: i64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self { tag_min_length: 3, tag_max_length: 128, audit_per_page: 25 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    pub max_concurrency: usize,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self { max_concurrency: 8 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudflareSettings {
    pub enabled: bool,
    pub email: String,
    pub api_key: SecretString,
}

impl Default for CloudflareSettings {
    fn default() -> Self {
        Self { enabled: false, email: String::new(), api_key: SecretString::from("") }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub storage: StorageSettings,
    pub directories: DirectorySettings,
    pub limits: LimitSettings,
    pub background: BackgroundSettings,
    pub cloudflare: CloudflareSettings,
    pub log: LogSettings,
}

impl Settings {
    /// Loads from `.env`, the config file and the environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }

        let (path, required) = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => (PathBuf::from(path), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        Self::from_sources(Some((&path, required)), true)
    }

    /// Loads from one explicit file plus the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_sources(Some((path, true)), true)
    }

    fn from_sources(file: Option<(&Path, bool)>, with_env: bool) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some((path, required)) = file {
            builder = builder.add_source(File::from(path).required(required));
        }
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            );
        }

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.background.max_concurrency == 0 {
            return Err(ConfigError::Invalid("background.max_concurrency must be at least 1".into()));
        }
        if self.limits.tag_min_length > self.limits.tag_max_length {
            return Err(ConfigError::Invalid(
                "limits.tag_min_length must not exceed limits.tag_max_length".into(),
            ));
        }
        if self.limits.audit_per_page <= 0 {
            return Err(ConfigError::Invalid("limits.audit_per_page must be positive".into()));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.bucket must not be empty".into()));
        }
        if self.cloudflare.enabled && self.cloudflare.email.trim().is_empty() {
            return Err(ConfigError::Invalid("cloudflare.email is required when enabled".into()));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    fn write_toml(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default().validate().unwrap();
        assert_eq!(settings.storage.source_prefix, "src");
        assert_eq!(settings.limits.audit_per_page, 25);
        assert_eq!(settings.background.max_concurrency, 8);
        assert!(!settings.cloudflare.enabled);
    }

    #[test]
    fn file_overrides_only_what_it_names() {
        let file = write_toml(
            r#"
            [database]
            url = "postgres://db.internal/board"

            [limits]
            tag_max_length = 64
            "#,
        );
        let settings = Settings::from_sources(Some((file.path(), true)), false).unwrap();
        assert_eq!(settings.database.url.expose_secret(), "postgres://db.internal/board");
        assert_eq!(settings.database.max_connections, 10);
        assert_eq!(settings.limits.tag_max_length, 64);
        assert_eq!(settings.limits.tag_min_length, 3);
    }

    #[test]
    fn inverted_tag_limits_are_rejected() {
        let file = write_toml("[limits]\ntag_min_length = 10\ntag_max_length = 5\n");
        let err = Settings::from_sources(Some((file.path(), true)), false).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut settings = Settings::default();
        settings.background.max_concurrency = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn explicit_file_must_exist() {
        let err = Settings::from_file(Path::new("/nonexistent/board-admin.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));

        let file = write_toml("[storage]\nbucket = \"media-staging\"\n");
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.storage.bucket, "media-staging");
    }

    #[test]
    fn missing_optional_file_falls_back_to_defaults() {
        let settings =
            Settings::from_sources(Some((Path::new("/nonexistent/board-admin.toml"), false)), false)
                .unwrap();
        assert_eq!(settings.storage.bucket, "board-media");
    }
}
