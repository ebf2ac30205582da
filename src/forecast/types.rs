use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// One forecast slot as served to clients and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastPoint {
    #[serde(rename = "datetime")]
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: i64,
    pub pressure: i64,
    pub description: String,
    #[serde(default)]
    pub wind_speed: f64,
    #[serde(rename = "clouds", default)]
    pub cloud_cover: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ForecastResult {
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[schema(value_type = String, example = "2024-05-01")]
    pub date: NaiveDate,
    pub forecast: Vec<ForecastPoint>,
    pub cached: bool,
}

// Raw `/data/2.5/forecast` payload. Only the fields the gateway reads are
// required; everything else is tolerated when absent.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hResponse {
    #[serde(default)]
    pub cod: Option<serde_json::Value>,
    #[serde(default)]
    pub cnt: Option<i32>,
    #[serde(default)]
    pub list: Vec<Forecast3hItem>,
    #[serde(default)]
    pub city: Option<Forecast3hCity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hItem {
    pub dt: i64,
    pub main: Forecast3hMain,
    #[serde(default)]
    pub weather: Vec<Forecast3hWeather>,
    #[serde(default)]
    pub clouds: Option<Forecast3hClouds>,
    #[serde(default)]
    pub wind: Option<Forecast3hWind>,
    #[serde(default)]
    pub visibility: Option<i32>,
    #[serde(default)]
    pub pop: Option<f64>,
    #[serde(default)]
    pub rain: Option<HashMap<String, f64>>,
    #[serde(default)]
    pub dt_txt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hMain {
    pub temp: f64,
    pub feels_like: f64,
    pub pressure: f64,
    pub humidity: f64,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hWeather {
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub main: Option<String>,
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hClouds {
    #[serde(default)]
    pub all: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hWind {
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
    #[serde(default)]
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast3hCity {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub timezone: Option<i32>,
}

impl Forecast3hResponse {
    /// Provider-resolved city name, when the payload carries one.
    pub fn city_name(&self) -> Option<&str> {
        self.city
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .filter(|name| !name.is_empty())
    }

    pub fn country(&self) -> Option<&str> {
        self.city
            .as_ref()
            .and_then(|c| c.country.as_deref())
            .filter(|country| !country.is_empty())
    }
}

impl ForecastPoint {
    /// Field-by-field conversion of a provider slot. Returns `None` only
    /// when the slot timestamp is outside chrono's representable range.
    pub fn from_forecast3h_item(item: &Forecast3hItem) -> Option<Self> {
        let timestamp = DateTime::from_timestamp(item.dt, 0)?;

        Some(Self {
            timestamp,
            temperature: item.main.temp,
            feels_like: item.main.feels_like,
            humidity: item.main.humidity.round() as i64,
            pressure: item.main.pressure.round() as i64,
            description: item
                .weather
                .first()
                .map(|w| w.description.clone())
                .unwrap_or_default(),
            wind_speed: item.wind.as_ref().map_or(0.0, |w| w.speed),
            cloud_cover: item.clouds.as_ref().map_or(0, |c| c.all.round() as i64),
        })
    }
}

/// Serializes a forecast sequence into the cached JSON representation.
pub fn encode_forecast(points: &[ForecastPoint]) -> Result<String, serde_json::Error> {
    serde_json::to_string(points)
}

pub fn decode_forecast(raw: &str) -> Result<Vec<ForecastPoint>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_without_wind_and_clouds_defaults_to_zero() {
        let item: Forecast3hItem = serde_json::from_value(serde_json::json!({
            "dt": 1714554000,
            "main": {"temp": 12.5, "feels_like": 11.0, "pressure": 1012, "humidity": 71},
            "weather": [{"description": "overcast clouds"}]
        }))
        .unwrap();

        let point = ForecastPoint::from_forecast3h_item(&item).unwrap();
        assert_eq!(point.wind_speed, 0.0);
        assert_eq!(point.cloud_cover, 0);
        assert_eq!(point.humidity, 71);
        assert_eq!(point.pressure, 1012);
        assert_eq!(point.description, "overcast clouds");
        assert_eq!(point.timestamp.to_rfc3339(), "2024-05-01T09:00:00+00:00");
    }

    #[test]
    fn test_cached_payload_uses_wire_field_names() {
        let item: Forecast3hItem = serde_json::from_value(serde_json::json!({
            "dt": 1714554000,
            "main": {"temp": 12.5, "feels_like": 11.0, "pressure": 1012, "humidity": 71},
            "weather": [{"description": "rain"}],
            "wind": {"speed": 4.2},
            "clouds": {"all": 90}
        }))
        .unwrap();
        let point = ForecastPoint::from_forecast3h_item(&item).unwrap();

        let encoded = encode_forecast(std::slice::from_ref(&point)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value[0]["clouds"], 90);
        assert_eq!(value[0]["wind_speed"], 4.2);
        assert!(value[0].get("datetime").is_some());

        assert_eq!(decode_forecast(&encoded).unwrap(), vec![point]);
    }

    #[test]
    fn test_decode_fills_missing_optional_fields() {
        let raw = r#"[{"datetime":"2024-05-01T09:00:00Z","temperature":1.0,"feels_like":0.0,
            "humidity":50,"pressure":1000,"description":"snow"}]"#;
        let points = decode_forecast(raw).unwrap();
        assert_eq!(points[0].wind_speed, 0.0);
        assert_eq!(points[0].cloud_cover, 0);
    }

    #[test]
    fn test_city_accessors_ignore_empty_values() {
        let response: Forecast3hResponse = serde_json::from_value(serde_json::json!({
            "list": [],
            "city": {"name": "Moscow", "country": ""}
        }))
        .unwrap();
        assert_eq!(response.city_name(), Some("Moscow"));
        assert_eq!(response.country(), None);
    }
}
