use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::forecast::{
    filter::filter_today,
    openweather::OpenWeatherError,
    types::{decode_forecast, encode_forecast, ForecastPoint, ForecastResult},
    ForecastProvider,
};
use crate::metrics::Metrics;
use crate::store::{SharedStore, StoreError};

#[derive(Error, Debug)]
pub enum WeatherError {
    /// Missing or placeholder credential.
    #[error("{0}")]
    Config(String),
    /// The provider rejected the configured credential.
    #[error("{0}")]
    UpstreamAuth(String),
    /// Any other provider failure, timeouts included.
    #[error("External API error: {0}")]
    Upstream(String),
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error("Failed to encode forecast for cache: {0}")]
    CacheCodec(#[from] serde_json::Error),
}

impl From<OpenWeatherError> for WeatherError {
    fn from(err: OpenWeatherError) -> Self {
        match err {
            OpenWeatherError::MissingApiKey => WeatherError::Config(err.to_string()),
            OpenWeatherError::Unauthorized => WeatherError::UpstreamAuth(err.to_string()),
            OpenWeatherError::Timeout
            | OpenWeatherError::RequestFailed(_)
            | OpenWeatherError::JsonParsing(_)
            | OpenWeatherError::ApiError { .. } => WeatherError::Upstream(err.to_string()),
        }
    }
}

pub fn cache_key(city: &str, date: NaiveDate) -> String {
    format!("weather:{}:{}", city.to_lowercase(), date.format("%Y-%m-%d"))
}

/// Read-through cache in front of the forecast provider, keyed by city and
/// UTC calendar day.
pub struct WeatherService {
    provider: Arc<dyn ForecastProvider>,
    store: Arc<dyn SharedStore>,
    metrics: Arc<Metrics>,
    cache_ttl: Duration,
}

impl WeatherService {
    pub fn new(
        provider: Arc<dyn ForecastProvider>,
        store: Arc<dyn SharedStore>,
        metrics: Arc<Metrics>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            metrics,
            cache_ttl,
        }
    }

    pub async fn get_weather(&self, city: &str) -> Result<ForecastResult, WeatherError> {
        self.get_weather_at(city, Utc::now()).await
    }

    pub async fn get_weather_at(
        &self,
        city: &str,
        now: DateTime<Utc>,
    ) -> Result<ForecastResult, WeatherError> {
        if !self.provider.is_configured() {
            return Err(OpenWeatherError::MissingApiKey.into());
        }

        let today = now.date_naive();
        let key = cache_key(city, today);

        if let Some(forecast) = self.get_from_cache(&key).await? {
            self.metrics.record_cache_hit();
            tracing::debug!(city, key = %key, "Cache hit");
            return Ok(ForecastResult {
                city: city.to_string(),
                country: None,
                date: today,
                forecast,
                cached: true,
            });
        }

        self.metrics.record_cache_miss();
        tracing::debug!(city, key = %key, "Cache miss, fetching from provider");

        let response = self.provider.fetch_forecast(city).await.map_err(|e| {
            tracing::error!(city, "Forecast fetch failed: {}", e);
            WeatherError::from(e)
        })?;
        let forecast = filter_today(&response.list, now);

        if !forecast.is_empty() {
            let payload = encode_forecast(&forecast)?;
            self.store
                .set_ex(&key, &payload, self.cache_ttl.as_secs())
                .await?;
        }

        Ok(ForecastResult {
            city: response.city_name().unwrap_or(city).to_string(),
            country: response.country().map(str::to_string),
            date: today,
            forecast,
            cached: false,
        })
    }

    async fn get_from_cache(&self, key: &str) -> Result<Option<Vec<ForecastPoint>>, WeatherError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };

        match decode_forecast(&raw) {
            Ok(points) if !points.is_empty() => Ok(Some(points)),
            Ok(_) => Ok(None),
            Err(e) => {
                // Unreadable entries are refetched and overwritten.
                tracing::warn!(key, "Discarding unreadable cache entry: {}", e);
                Ok(None)
            }
        }
    }
}
