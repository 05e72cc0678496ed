use serde::Deserialize;
use starplay_shared::{auth::Role, domain::ShopItem};
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Slug identifying this family in the URL namespace.
    pub tenant_id: String,
    pub jwt_secret: String,
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub shop_items: Vec<ShopItem>,
    /// IANA timezone name used for day boundaries; UTC when absent.
    pub timezone: Option<String>,
    /// Seconds between play-minute ticks; defaults to 60.
    pub heartbeat_interval_secs: Option<u64>,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
    pub child_id: Option<String>, // required when role == child
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Timezone(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Timezone(name) => write!(f, "unknown timezone: {}", name),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        ConfigError::Yaml(value)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        Ok(cfg)
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz, ConfigError> {
        match &self.timezone {
            None => Ok(chrono_tz::UTC),
            Some(name) => name
                .parse()
                .map_err(|_| ConfigError::Timezone(name.clone())),
        }
    }

    pub fn heartbeat_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.heartbeat_interval_secs.unwrap_or(60))
    }
}
