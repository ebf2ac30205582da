pub mod filter;
pub mod mock;
pub mod openweather;
pub mod types;

use async_trait::async_trait;
use openweather::OpenWeatherError;
use types::Forecast3hResponse;

/// Upstream source of 3-hour forecast series.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Whether a usable credential is present. Checked before any cache or
    /// network traffic so misconfiguration is reported immediately.
    fn is_configured(&self) -> bool;

    async fn fetch_forecast(&self, city: &str) -> Result<Forecast3hResponse, OpenWeatherError>;
}
