use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub const WEATHER_CACHE: &str = "weather";
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

#[derive(Default)]
struct RequestStats {
    // (method, endpoint, status) -> count
    counts: BTreeMap<(String, String, u16), u64>,
    // (method, endpoint) -> (sum seconds, count)
    durations: BTreeMap<(String, String), (f64, u64)>,
}

/// Process-wide counters, rendered in Prometheus text format on `/metrics`.
#[derive(Default)]
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    rate_limit_hits: AtomicU64,
    redis_connection: AtomicI64,
    active_requests: AtomicI64,
    requests: Mutex<RequestStats>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_store_connected(&self, connected: bool) {
        self.redis_connection
            .store(i64::from(connected), Ordering::Relaxed);
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn rate_limit_hits(&self) -> u64 {
        self.rate_limit_hits.load(Ordering::Relaxed)
    }

    pub fn active_requests(&self) -> i64 {
        self.active_requests.load(Ordering::Relaxed)
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, seconds: f64) {
        let Ok(mut stats) = self.requests.lock() else {
            return;
        };
        *stats
            .counts
            .entry((method.to_string(), endpoint.to_string(), status))
            .or_insert(0) += 1;
        let duration = stats
            .durations
            .entry((method.to_string(), endpoint.to_string()))
            .or_insert((0.0, 0));
        duration.0 += seconds;
        duration.1 += 1;
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "# HELP cache_hits_total Total cache hits");
        let _ = writeln!(out, "# TYPE cache_hits_total counter");
        let _ = writeln!(
            out,
            "cache_hits_total{{cache_type=\"{}\"}} {}",
            WEATHER_CACHE,
            self.cache_hits()
        );

        let _ = writeln!(out, "# HELP cache_misses_total Total cache misses");
        let _ = writeln!(out, "# TYPE cache_misses_total counter");
        let _ = writeln!(
            out,
            "cache_misses_total{{cache_type=\"{}\"}} {}",
            WEATHER_CACHE,
            self.cache_misses()
        );

        let _ = writeln!(out, "# HELP rate_limit_hits_total Total rate limit hits");
        let _ = writeln!(out, "# TYPE rate_limit_hits_total counter");
        let _ = writeln!(out, "rate_limit_hits_total {}", self.rate_limit_hits());

        let _ = writeln!(
            out,
            "# HELP redis_connection_status Redis connection status (1=connected, 0=disconnected)"
        );
        let _ = writeln!(out, "# TYPE redis_connection_status gauge");
        let _ = writeln!(
            out,
            "redis_connection_status {}",
            self.redis_connection.load(Ordering::Relaxed)
        );

        let _ = writeln!(out, "# HELP http_active_requests Active HTTP requests");
        let _ = writeln!(out, "# TYPE http_active_requests gauge");
        let _ = writeln!(
            out,
            "http_active_requests {}",
            self.active_requests()
        );

        if let Ok(stats) = self.requests.lock() {
            let _ = writeln!(out, "# HELP http_requests_total Total HTTP requests");
            let _ = writeln!(out, "# TYPE http_requests_total counter");
            for ((method, endpoint, status), count) in &stats.counts {
                let _ = writeln!(
                    out,
                    "http_requests_total{{method=\"{}\",endpoint=\"{}\",status=\"{}\"}} {}",
                    method, endpoint, status, count
                );
            }

            let _ = writeln!(out, "# HELP http_request_duration_seconds HTTP request duration");
            let _ = writeln!(out, "# TYPE http_request_duration_seconds summary");
            for ((method, endpoint), (sum, count)) in &stats.durations {
                let _ = writeln!(
                    out,
                    "http_request_duration_seconds_sum{{method=\"{}\",endpoint=\"{}\"}} {}",
                    method, endpoint, sum
                );
                let _ = writeln!(
                    out,
                    "http_request_duration_seconds_count{{method=\"{}\",endpoint=\"{}\"}} {}",
                    method, endpoint, count
                );
            }
        }

        out
    }
}

/// Holds one slot of the `http_active_requests` gauge until dropped, so a
/// request future cancelled mid-flight still releases it.
struct ActiveRequest(Arc<Metrics>);

impl ActiveRequest {
    fn enter(metrics: &Arc<Metrics>) -> Self {
        metrics.active_requests.fetch_add(1, Ordering::Relaxed);
        Self(metrics.clone())
    }
}

impl Drop for ActiveRequest {
    fn drop(&mut self) {
        self.0.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Middleware counting requests per route template and status.
pub async fn track_requests(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());

    let active = ActiveRequest::enter(&metrics);
    let started = Instant::now();
    let response = next.run(request).await;
    drop(active);

    metrics.record_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_render_counters() {
        let metrics = Metrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_rate_limit_hit();
        metrics.set_store_connected(true);
        metrics.record_request("GET", "/weather/:city", 200, 0.25);
        metrics.record_request("GET", "/weather/:city", 200, 0.5);

        let text = metrics.render();
        assert!(text.contains("cache_hits_total{cache_type=\"weather\"} 1"));
        assert!(text.contains("cache_misses_total{cache_type=\"weather\"} 2"));
        assert!(text.contains("rate_limit_hits_total 1"));
        assert!(text.contains("redis_connection_status 1"));
        assert!(text.contains(
            "http_requests_total{method=\"GET\",endpoint=\"/weather/:city\",status=\"200\"} 2"
        ));
        assert!(text.contains(
            "http_request_duration_seconds_count{method=\"GET\",endpoint=\"/weather/:city\"} 2"
        ));
    }

    #[test]
    fn test_active_request_slot_released_on_drop() {
        let metrics = Arc::new(Metrics::new());
        let first = ActiveRequest::enter(&metrics);
        let second = ActiveRequest::enter(&metrics);
        assert_eq!(metrics.active_requests(), 2);

        drop(first);
        drop(second);
        assert_eq!(metrics.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_releases_active_slot() {
        let metrics = Arc::new(Metrics::new());
        let in_flight = {
            let metrics = metrics.clone();
            async move {
                let _active = ActiveRequest::enter(&metrics);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        };

        let result = tokio::time::timeout(Duration::from_millis(50), in_flight).await;
        assert!(result.is_err());
        assert_eq!(metrics.active_requests(), 0);
        assert!(metrics.render().contains("http_active_requests 0"));
    }

    #[tokio::test]
    async fn test_disconnected_client_releases_active_slot() {
        use axum::{middleware, routing::get, Router};

        let metrics = Arc::new(Metrics::new());
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(middleware::from_fn_with_state(metrics.clone(), track_requests));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let result = client.get(format!("http://{}/slow", addr)).send().await;
        assert!(result.is_err());
        drop(client);

        let mut active = metrics.active_requests();
        for _ in 0..40 {
            if active == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            active = metrics.active_requests();
        }
        assert_eq!(active, 0);
    }
}
