use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    forecast::types::{ForecastPoint, ForecastResult},
    metrics::{self, Metrics},
    rate_limiter::RateLimiter,
    store::{SharedStore, StoreError},
    weather::{WeatherError, WeatherService},
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn SharedStore>,
    pub weather_service: Arc<WeatherService>,
    pub rate_limiter: Arc<RateLimiter>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub docs: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub redis: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Rate limit exceeded. Maximum {max_requests} requests per {window_seconds} seconds.")]
    RateLimited {
        max_requests: u64,
        window_seconds: u64,
    },
    #[error(transparent)]
    Weather(#[from] WeatherError),
    #[error("Error checking rate limit: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Weather(WeatherError::Config(_)) => StatusCode::BAD_REQUEST,
            ApiError::Weather(WeatherError::UpstreamAuth(_))
            | ApiError::Weather(WeatherError::Upstream(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Weather(WeatherError::StoreUnavailable(_))
            | ApiError::Weather(WeatherError::CacheCodec(_))
            | ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let detail = match &self {
            ApiError::Weather(WeatherError::StoreUnavailable(_))
            | ApiError::Weather(WeatherError::CacheCodec(_)) => {
                format!("Error fetching weather data: {}", self)
            }
            _ => self.to_string(),
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

#[utoipa::path(get, path = "/", responses((status = 200, body = RootResponse)))]
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: state.config.app_name.clone(),
        version: state.config.app_version.clone(),
        docs: "/docs".to_string(),
    })
}

#[utoipa::path(get, path = "/health", responses((status = 200, body = HealthResponse)))]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis = match state.store.ping().await {
        Ok(()) => {
            state.metrics.set_store_connected(true);
            "ok"
        }
        Err(e) => {
            tracing::warn!("Health check ping failed: {}", e);
            state.metrics.set_store_connected(false);
            "error"
        }
    };

    Json(HealthResponse {
        status: if redis == "ok" { "healthy" } else { "degraded" }.to_string(),
        redis: redis.to_string(),
    })
}

/// Hourly forecast for the current UTC day.
#[utoipa::path(
    get,
    path = "/weather/{city}",
    params(("city" = String, Path, description = "City name, e.g. Moscow, London, New York")),
    responses(
        (status = 200, body = ForecastResult),
        (status = 400, description = "API key missing", body = ErrorResponse),
        (status = 429, description = "Global rate limit exceeded", body = ErrorResponse),
        (status = 502, description = "Weather provider error", body = ErrorResponse),
        (status = 500, body = ErrorResponse),
    )
)]
pub async fn get_weather(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> Result<Json<ForecastResult>, ApiError> {
    if !state.rate_limiter.check().await? {
        state.metrics.record_rate_limit_hit();
        tracing::warn!(city = %city, "Rate limit exceeded");
        return Err(ApiError::RateLimited {
            max_requests: state.rate_limiter.max_requests(),
            window_seconds: state.rate_limiter.window_seconds(),
        });
    }

    let result = state.weather_service.get_weather(&city).await?;
    Ok(Json(result))
}

pub async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            detail: "Not Found".to_string(),
        }),
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(root, health, get_weather),
    components(schemas(ForecastResult, ForecastPoint, RootResponse, HealthResponse, ErrorResponse)),
    info(description = "Hourly weather forecast for the current day")
)]
pub struct ApiDoc;

// Create the router
pub fn create_router(state: AppState) -> Router {
    let request_metrics = state.metrics.clone();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/weather/:city", get(get_weather))
        .route("/metrics", get(get_metrics))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            request_metrics,
            metrics::track_requests,
        ))
        .with_state(state)
}
