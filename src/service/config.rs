use std::{env, sync::Arc, time::Duration};

use crate::config::{Config, LogFormat};

const DEFAULT_DATABASE_URL: &str = "sqlite::memory:";
const DEFAULT_WECHAT_API_BASE: &str = "https://api.weixin.qq.com";
/// Ten years.
const MAX_JWT_EXPIRES_IN_HOURS: i64 = 24 * 366 * 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

pub trait ConfigService: Send + Sync {
    fn port(&self) -> u16;
    fn values(&self) -> &Config;
}

pub struct ConfigServiceImpl {
    config: Arc<Config>,
}

/// Trimmed, quote-stripped environment view. Empty values count as unset.
struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn strip_wrapping_quotes(value: &str) -> &str {
        if value.len() >= 2 {
            let bytes = value.as_bytes();
            let first = bytes[0];
            let last = bytes[value.len() - 1];
            if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
                return &value[1..value.len() - 1];
            }
        }
        value
    }

    fn nonempty(&self, key: &str) -> Option<String> {
        (self.lookup)(key).and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            let normalized = Self::strip_wrapping_quotes(trimmed).trim();
            if normalized.is_empty() {
                None
            } else {
                Some(normalized.to_string())
            }
        })
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.nonempty(key) {
            Some(value) => value
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::Invalid { key, value }),
            None => Ok(None),
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.nonempty(key)
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}

impl ConfigServiceImpl {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let port = env.parsed::<u16>("PORT")?.unwrap_or(3333);
        let database_url = env
            .nonempty("DATABASE_URL")
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let database_max_connections = env.parsed::<u32>("DATABASE_MAX_CONNECTIONS")?.unwrap_or(10);
        let redis_url = env.nonempty("REDIS_URL");
        let cache_key_prefix = env
            .nonempty("CACHE_KEY_PREFIX")
            .unwrap_or_else(|| "identity-api".to_string());

        let jwt_secret = env.nonempty("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let jwt_issuer = env
            .nonempty("JWT_ISSUER")
            .unwrap_or_else(|| "identity-api".to_string());
        let jwt_expires_in_hours = env.parsed::<i64>("JWT_EXPIRES_IN_HOURS")?.unwrap_or(24 * 7);
        if !(1..=MAX_JWT_EXPIRES_IN_HOURS).contains(&jwt_expires_in_hours) {
            return Err(ConfigError::Invalid {
                key: "JWT_EXPIRES_IN_HOURS",
                value: jwt_expires_in_hours.to_string(),
            });
        }

        let last_active_window = Duration::from_secs(
            env.parsed::<u64>("LAST_ACTIVE_WINDOW_SECONDS")?
                .unwrap_or(300)
                .max(1),
        );
        let last_active_queue_capacity = env
            .parsed::<usize>("LAST_ACTIVE_QUEUE_CAPACITY")?
            .unwrap_or(1024);

        let wechat_app_id = env.nonempty("WECHAT_APP_ID");
        let wechat_app_secret = env.nonempty("WECHAT_APP_SECRET");
        let wechat_api_base = env
            .nonempty("WECHAT_API_BASE")
            .unwrap_or_else(|| DEFAULT_WECHAT_API_BASE.to_string());
        let wechat_mock_enabled = env.bool("AUTH_WECHAT_MOCK_ENABLED", false);

        let log_level = env
            .nonempty("LOG_LEVEL")
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_else(|| "info".to_string());
        let log_format = env.parsed::<LogFormat>("LOG_FORMAT")?.unwrap_or_default();

        Ok(Self {
            config: Arc::new(Config {
                port,
                database_url,
                database_max_connections,
                redis_url,
                cache_key_prefix,
                jwt_secret,
                jwt_issuer,
                jwt_expires_in_hours,
                last_active_window,
                last_active_queue_capacity,
                wechat_app_id,
                wechat_app_secret,
                wechat_api_base,
                wechat_mock_enabled,
                log_level,
                log_format,
            }),
        })
    }
}

impl ConfigService for ConfigServiceImpl {
    fn port(&self) -> u16 {
        self.config.port
    }

    fn values(&self) -> &Config {
        &self.config
    }
}
