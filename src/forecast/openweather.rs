use super::types::*;
use super::ForecastProvider;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

const API_KEY_HELP: &str = "Please set OPENWEATHER_API_KEY in your .env file. \
     Get your API key at: https://openweathermap.org/api";

#[derive(Error, Debug)]
pub enum OpenWeatherError {
    #[error("OpenWeatherMap API key is not configured. {}", API_KEY_HELP)]
    MissingApiKey,
    #[error("Invalid OpenWeatherMap API key. {}", API_KEY_HELP)]
    Unauthorized,
    #[error("OpenWeatherMap request timed out")]
    Timeout,
    #[error("HTTP request failed: {0}")]
    RequestFailed(reqwest::Error),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("API error: HTTP {status}: {body}")]
    ApiError { status: u16, body: String },
}

impl From<reqwest::Error> for OpenWeatherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OpenWeatherError::Timeout
        } else {
            OpenWeatherError::RequestFailed(err)
        }
    }
}

pub struct OpenWeatherClient {
    client: Client,
    config: Config,
}

impl OpenWeatherClient {
    pub fn new(config: Config) -> Result<Self, OpenWeatherError> {
        let client = Client::builder()
            .user_agent(concat!("WeatherGateway/", env!("CARGO_PKG_VERSION")))
            .timeout(config.upstream_timeout())
            .build()?;

        Ok(Self { client, config })
    }

    pub async fn get_forecast3h(&self, city: &str) -> Result<Forecast3hResponse, OpenWeatherError> {
        let api_key = self
            .config
            .usable_api_key()
            .ok_or(OpenWeatherError::MissingApiKey)?;

        let url = format!(
            "{}{}",
            self.config.openweather_base_url, self.config.openweather_forecast3h_path
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", city),
                ("appid", api_key),
                ("units", self.config.openweather_units.as_str()),
                ("lang", self.config.openweather_lang.as_str()),
            ])
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let body = response.text().await?;
                let forecast: Forecast3hResponse = serde_json::from_str(&body)?;
                tracing::debug!(city, slots = forecast.list.len(), "Fetched 3h forecast");
                Ok(forecast)
            }
            reqwest::StatusCode::UNAUTHORIZED => {
                tracing::error!("OpenWeatherMap rejected the configured API key");
                Err(OpenWeatherError::Unauthorized)
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                tracing::warn!(city, status = status.as_u16(), "OpenWeatherMap request failed");
                Err(OpenWeatherError::ApiError {
                    status: status.as_u16(),
                    body: error_text,
                })
            }
        }
    }
}

#[async_trait]
impl ForecastProvider for OpenWeatherClient {
    fn is_configured(&self) -> bool {
        self.config.usable_api_key().is_some()
    }

    async fn fetch_forecast(&self, city: &str) -> Result<Forecast3hResponse, OpenWeatherError> {
        self.get_forecast3h(city).await
    }
}
