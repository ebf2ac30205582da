use super::types::{Forecast3hItem, ForecastPoint};
use chrono::{DateTime, NaiveTime, Utc};

/// Number of 3-hour slots returned when nothing is left for today,
/// roughly the next 24 hours.
pub const FALLBACK_SLOTS: usize = 8;

/// Derives today's hourly forecast from the provider's 3-hour series.
///
/// Every slot dated on `now`'s UTC calendar day is kept, including slots
/// that already elapsed. When the series holds no slot for today the first
/// [`FALLBACK_SLOTS`] entries are returned instead, so a non-empty series
/// never produces an empty forecast. Upstream order is preserved.
pub fn filter_today(series: &[Forecast3hItem], now: DateTime<Utc>) -> Vec<ForecastPoint> {
    let today = now.date_naive();
    let day_start = today.and_time(NaiveTime::MIN).and_utc();

    let hourly: Vec<ForecastPoint> = series
        .iter()
        .filter_map(ForecastPoint::from_forecast3h_item)
        .filter(|point| point.timestamp.date_naive() == today && point.timestamp >= day_start)
        .collect();

    if !hourly.is_empty() {
        return hourly;
    }

    series
        .iter()
        .take(FALLBACK_SLOTS)
        .filter_map(ForecastPoint::from_forecast3h_item)
        .collect()
}
