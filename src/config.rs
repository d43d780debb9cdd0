use std::{str::FromStr, time::Duration};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub cache_key_prefix: String,

    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_expires_in_hours: i64,

    // Activity debounce: one durable last-active write per account per window.
    pub last_active_window: Duration,
    pub last_active_queue_capacity: usize,

    pub wechat_app_id: Option<String>,
    pub wechat_app_secret: Option<String>,
    pub wechat_api_base: String,
    pub wechat_mock_enabled: bool,

    pub log_level: String,
    pub log_format: LogFormat,
}
