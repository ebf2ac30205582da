use super::openweather::OpenWeatherError;
use super::types::*;
use super::ForecastProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

const SLOT_SECS: i64 = 3 * 3600;
const SLOTS: i64 = 40;

/// Offline provider producing a synthetic five-day 3-hour series, aligned
/// to the 3-hour UTC grid the real API uses.
pub struct MockWeatherClient {
    anchor: Option<DateTime<Utc>>,
}

impl MockWeatherClient {
    pub fn new() -> Self {
        Self { anchor: None }
    }

    /// Pins the series to start at the slot containing `anchor` instead of
    /// the current time.
    #[cfg(test)]
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor: Some(anchor),
        }
    }

    pub fn get_forecast3h(&self, city: &str) -> Forecast3hResponse {
        let anchor = self.anchor.unwrap_or_else(Utc::now).timestamp();
        let first_slot = anchor - anchor.rem_euclid(SLOT_SECS);

        let list = (0..SLOTS)
            .map(|slot| {
                let dt = first_slot + slot * SLOT_SECS;
                let hour = (dt.rem_euclid(86_400) / 3600) as f64;
                // Diurnal curve peaking mid-afternoon.
                let temp = 12.0 + 6.0 * ((hour - 9.0) * std::f64::consts::PI / 12.0).sin();
                let humidity = (70.0 - 15.0 * ((hour - 9.0) * std::f64::consts::PI / 12.0).sin())
                    .clamp(30.0, 95.0);
                let clouds = ((slot * 17) % 100) as f64;
                let description = match clouds as i64 {
                    0..=10 => "clear sky",
                    11..=50 => "scattered clouds",
                    51..=84 => "broken clouds",
                    _ => "overcast clouds",
                };

                Forecast3hItem {
                    dt,
                    main: Forecast3hMain {
                        temp,
                        feels_like: temp - 1.5,
                        pressure: 1013.0 + (slot % 5) as f64,
                        humidity: humidity.round(),
                        temp_min: None,
                        temp_max: None,
                    },
                    weather: vec![Forecast3hWeather {
                        id: None,
                        main: None,
                        description: description.to_string(),
                        icon: None,
                    }],
                    clouds: Some(Forecast3hClouds { all: clouds }),
                    wind: Some(Forecast3hWind {
                        speed: 1.5 + (slot % 4) as f64,
                        deg: None,
                        gust: None,
                    }),
                    visibility: Some(10_000),
                    pop: Some(0.0),
                    rain: None,
                    dt_txt: None,
                }
            })
            .collect();

        Forecast3hResponse {
            cod: Some(serde_json::Value::String("200".to_string())),
            cnt: Some(SLOTS as i32),
            list,
            city: Some(Forecast3hCity {
                id: None,
                name: Some(city.to_string()),
                country: None,
                timezone: Some(0),
            }),
        }
    }
}

impl Default for MockWeatherClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ForecastProvider for MockWeatherClient {
    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_forecast(&self, city: &str) -> Result<Forecast3hResponse, OpenWeatherError> {
        Ok(self.get_forecast3h(city))
    }
}
