use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenWeather,
    Mock,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub app_name: String,
    pub app_version: String,
    pub debug: bool,
    pub bind_addr: String,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub openweather_forecast3h_path: String,
    pub openweather_units: String,
    pub openweather_lang: String,
    pub upstream_timeout_secs: u64,
    pub weather_provider: ProviderKind,
    pub store_backend: StoreBackend,
    pub redis_url: Option<String>,
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,
    pub rate_limit_requests: u64,
    pub rate_limit_window: u64,
    pub cache_ttl: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            app_name: env::var("APP_NAME").unwrap_or_else(|_| "Weather API".to_string()),
            app_version: env::var("APP_VERSION").unwrap_or_else(|_| "1.0.0".to_string()),
            debug: parse_var("DEBUG", false)?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            openweather_api_key: env::var("OPENWEATHER_API_KEY").ok(),
            openweather_base_url: env::var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openweathermap.org".to_string()),
            openweather_forecast3h_path: env::var("OPENWEATHER_FORECAST3H_PATH")
                .unwrap_or_else(|_| "/data/2.5/forecast".to_string()),
            openweather_units: env::var("OPENWEATHER_UNITS")
                .unwrap_or_else(|_| "metric".to_string()),
            openweather_lang: env::var("OPENWEATHER_LANG").unwrap_or_else(|_| "ru".to_string()),
            upstream_timeout_secs: parse_var("UPSTREAM_TIMEOUT_SECS", 10)?,
            weather_provider: match env::var("WEATHER_PROVIDER").as_deref() {
                Ok("mock") => ProviderKind::Mock,
                Ok("openweather") | Err(_) => ProviderKind::OpenWeather,
                Ok(other) => anyhow::bail!("WEATHER_PROVIDER must be `openweather` or `mock`, got `{}`", other),
            },
            store_backend: match env::var("STORE_BACKEND").as_deref() {
                Ok("memory") => StoreBackend::Memory,
                Ok("redis") | Err(_) => StoreBackend::Redis,
                Ok(other) => anyhow::bail!("STORE_BACKEND must be `redis` or `memory`, got `{}`", other),
            },
            redis_url: env::var("REDIS_URL").ok(),
            redis_host: env::var("REDIS_HOST").unwrap_or_else(|_| "redis".to_string()),
            redis_port: parse_var("REDIS_PORT", 6379)?,
            redis_db: parse_var("REDIS_DB", 0)?,
            rate_limit_requests: parse_var("RATE_LIMIT_REQUESTS", 60)?,
            rate_limit_window: require_positive(
                "RATE_LIMIT_WINDOW",
                parse_var("RATE_LIMIT_WINDOW", 60)?,
            )?,
            cache_ttl: require_positive("CACHE_TTL", parse_var("CACHE_TTL", 3600)?)?,
        })
    }

    /// Connection string for the shared store, `REDIS_URL` taking precedence
    /// over the host/port/db triple.
    pub fn redis_connection_url(&self) -> String {
        match &self.redis_url {
            Some(url) => url.clone(),
            None => format!(
                "redis://{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
        }
    }

    /// The provider credential, unless it is missing, blank or still the
    /// placeholder from the sample `.env`.
    pub fn usable_api_key(&self) -> Option<&str> {
        self.openweather_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Weather API".to_string(),
            app_version: "1.0.0".to_string(),
            debug: false,
            bind_addr: "0.0.0.0:8000".to_string(),
            openweather_api_key: None,
            openweather_base_url: "https://api.openweathermap.org".to_string(),
            openweather_forecast3h_path: "/data/2.5/forecast".to_string(),
            openweather_units: "metric".to_string(),
            openweather_lang: "ru".to_string(),
            upstream_timeout_secs: 10,
            weather_provider: ProviderKind::OpenWeather,
            store_backend: StoreBackend::Redis,
            redis_url: None,
            redis_host: "redis".to_string(),
            redis_port: 6379,
            redis_db: 0,
            rate_limit_requests: 60,
            rate_limit_window: 60,
            cache_ttl: 3600,
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value `{}`: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

/// Redis rejects `SETEX` with a zero TTL and `EXPIRE 0` drops the key, so
/// both durations must be at least one second.
fn require_positive(name: &str, value: u64) -> anyhow::Result<u64> {
    if value == 0 {
        anyhow::bail!("{} must be at least 1 second, got 0", name);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_api_key_rejects_placeholder() {
        let mut config = Config::default();
        assert_eq!(config.usable_api_key(), None);

        config.openweather_api_key = Some(PLACEHOLDER_API_KEY.to_string());
        assert_eq!(config.usable_api_key(), None);

        config.openweather_api_key = Some("   ".to_string());
        assert_eq!(config.usable_api_key(), None);

        config.openweather_api_key = Some("abc123".to_string());
        assert_eq!(config.usable_api_key(), Some("abc123"));
    }

    #[test]
    fn test_redis_connection_url() {
        let mut config = Config::default();
        assert_eq!(config.redis_connection_url(), "redis://redis:6379/0");

        config.redis_url = Some("redis://127.0.0.1:6380/2".to_string());
        assert_eq!(config.redis_connection_url(), "redis://127.0.0.1:6380/2");
    }

    #[test]
    fn test_zero_durations_rejected() {
        assert_eq!(require_positive("CACHE_TTL", 3600).unwrap(), 3600);

        let err = require_positive("CACHE_TTL", 0).unwrap_err();
        assert!(err.to_string().contains("CACHE_TTL"));
    }

    #[test]
    fn test_from_env_rejects_zero_cache_ttl() {
        env::set_var("CACHE_TTL", "0");
        let result = Config::from_env();
        env::remove_var("CACHE_TTL");

        let err = result.unwrap_err();
        assert!(err.to_string().contains("CACHE_TTL"), "{}", err);
    }
}
