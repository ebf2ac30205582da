use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod forecast;
mod metrics;
mod rate_limiter;
mod routes;
mod store;
mod weather;

use config::{Config, ProviderKind, StoreBackend};
use forecast::{mock::MockWeatherClient, openweather::OpenWeatherClient, ForecastProvider};
use metrics::Metrics;
use rate_limiter::RateLimiter;
use routes::{create_router, AppState};
use store::{MemoryStore, RedisStore, SharedStore};
use weather::WeatherService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    let default_filter = if config.debug {
        "weather_gateway=debug,tower_http=debug"
    } else {
        "weather_gateway=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = Arc::new(Metrics::new());

    // Connect the shared store; the gateway does not start without it
    let store: Arc<dyn SharedStore> = match config.store_backend {
        StoreBackend::Redis => {
            let url = config.redis_connection_url();
            match RedisStore::connect(&url).await {
                Ok(store) => Arc::new(store),
                Err(e) => anyhow::bail!("failed to connect to Redis at {}: {}", url, e),
            }
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-process store; cache and rate limit are not shared");
            Arc::new(MemoryStore::new())
        }
    };
    metrics.set_store_connected(true);

    let provider: Arc<dyn ForecastProvider> = match config.weather_provider {
        ProviderKind::OpenWeather => Arc::new(OpenWeatherClient::new(config.clone())?),
        ProviderKind::Mock => {
            tracing::warn!("Serving synthetic forecasts from the mock provider");
            Arc::new(MockWeatherClient::new())
        }
    };
    if !provider.is_configured() {
        tracing::warn!("OPENWEATHER_API_KEY is not set; /weather requests will fail until it is");
    }

    let weather_service = Arc::new(WeatherService::new(
        provider,
        store.clone(),
        metrics.clone(),
        config.cache_ttl(),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(
        store.clone(),
        config.rate_limit_requests,
        config.rate_limit_window,
    ));

    let bind_addr = config.bind_addr.clone();
    let config = Arc::new(config);

    // Create application state
    let state = AppState {
        config,
        store,
        weather_service,
        rate_limiter,
        metrics,
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server starting on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
