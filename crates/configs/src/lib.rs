//! capsulr/crates/configs/src/lib.rs
//!
//! Layered settings: built-in defaults, then an optional `capsulr.toml`
//! (or any format `config` understands), then `CAPSULR__SECTION__KEY`
//! environment variables. A `.env` file is loaded first if present.

use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Base of the links put into notification mail.
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            public_base_url: "http://localhost:3000".into(),
            cors_origins: vec!["http://localhost:3000".into()],
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self { enabled: true, interval_secs: 60 }
    }
}

impl SweepSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(deserialize_with = "optional_secret")]
    pub jwt_secret: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Without a URL the in-memory store is used.
    #[serde(deserialize_with = "optional_secret")]
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { url: None, max_connections: 5 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".into(), format: LogFormat::Text }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub from: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self { from: "\"Capsulr\" <noreply@capsulr.local>".into() }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub sweep: SweepSettings,
    pub auth: AuthSettings,
    pub database: DatabaseSettings,
    pub log: LogSettings,
    pub mail: MailSettings,
}

fn optional_secret<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

impl Settings {
    /// Reads `.env`, `capsulr.*` in the working directory and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "loaded .env"),
            Err(err) if err.not_found() => {}
            Err(err) => return Err(ConfigError::Invalid { key: ".env", reason: err.to_string() }),
        }
        let builder = Config::builder()
            .add_source(File::with_name("capsulr").required(false))
            .add_source(environment());
        Self::build(builder)
    }

    /// Parses settings from a TOML document, with the environment on top.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .add_source(environment());
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.auth.jwt_secret {
            None => return Err(ConfigError::Missing("auth.jwt_secret")),
            Some(secret) if secret.expose_secret().len() < 16 => {
                return Err(ConfigError::Invalid {
                    key: "auth.jwt_secret",
                    reason: "must be at least 16 bytes".into(),
                })
            }
            Some(_) => {}
        }
        if self.sweep.enabled && self.sweep.interval_secs == 0 {
            return Err(ConfigError::Invalid { key: "sweep.interval_secs", reason: "must be positive".into() });
        }
        let base = &self.server.public_base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "server.public_base_url",
                reason: format!("{base:?} is not an http(s) URL"),
            });
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid { key: "database.max_connections", reason: "must be positive".into() });
        }
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix("CAPSULR")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.cors_origins")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "auth.jwt_secret = \"0123456789abcdef\"\n";

    #[test]
    fn test_defaults_fill_missing_sections() {
        let settings = Settings::from_toml("[auth]\njwt_secret = \"0123456789abcdef\"\n").unwrap();
        assert_eq!(settings.server.bind_addr(), "0.0.0.0:5000");
        assert_eq!(settings.server.public_base_url, "http://localhost:3000");
        assert!(settings.sweep.enabled);
        assert_eq!(settings.sweep.interval(), Duration::from_secs(60));
        assert!(settings.database.url.is_none());
        assert_eq!(settings.log.format, LogFormat::Text);
    }

    #[test]
    fn test_overrides_are_applied() {
        let toml = format!(
            "{SECRET}[server]\nport = 8080\npublic_base_url = \"https://capsulr.example\"\n\
             [sweep]\ninterval_secs = 5\n[log]\nformat = \"json\"\n\
             [database]\nurl = \"postgres://localhost/capsulr\"\nmax_connections = 10\n"
        );
        let settings = Settings::from_toml(&toml).unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.sweep.interval_secs, 5);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(
            settings.database.url.as_ref().map(|u| u.expose_secret().to_string()),
            Some("postgres://localhost/capsulr".to_string())
        );
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let err = Settings::from_toml("[server]\nport = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Missing("auth.jwt_secret")));
    }

    #[test]
    fn test_short_secret_and_bad_base_url_are_rejected() {
        let err = Settings::from_toml("[auth]\njwt_secret = \"short\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "auth.jwt_secret", .. }));

        let toml = format!("{SECRET}[server]\npublic_base_url = \"localhost:3000\"\n");
        let err = Settings::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "server.public_base_url", .. }));
    }

    #[test]
    fn test_secret_is_not_printed() {
        let settings = Settings::from_toml(SECRET).unwrap();
        assert!(!format!("{settings:?}").contains("0123456789abcdef"));
    }
}
