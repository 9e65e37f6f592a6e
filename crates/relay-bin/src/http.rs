//! HTTP intake.
//!
//! ## Routes
//!
//! - `POST /msg` - relay the raw request body. Always `202 Accepted` once the
//!   message has an id; `400` for an empty body.
//! - `GET /statistic` - relay counters.
//! - `GET /processed-statistic` - processed messages per window.
//! - `GET /metrics` - Prometheus scrape endpoint.
//!
//! Every request is bounded by the request timeout (`408` when exceeded) and
//! counted per matched route.

use axum::body::Bytes;
use axum::extract::{FromRef, MatchedPath, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_core::{Acceptance, RelayError, RelayService};
use relay_metrics::{RelayMetrics, NON_EXISTENT_PATH};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error};

pub const STATUS_SAVED: &str = "saved, sent to the broker";
pub const STATUS_DEFERRED: &str = "temporary problem to save";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
struct AppState {
    service: RelayService,
    metrics: Arc<RelayMetrics>,
}

impl FromRef<AppState> for RelayService {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

impl FromRef<AppState> for Arc<RelayMetrics> {
    fn from_ref(state: &AppState) -> Self {
        state.metrics.clone()
    }
}

pub fn router(service: RelayService, metrics: Arc<RelayMetrics>, request_timeout: Duration) -> Router {
    let state = AppState {
        service,
        metrics: metrics.clone(),
    };

    Router::new()
        .route("/msg", post(process_message))
        .route("/statistic", get(statistic))
        .route("/processed-statistic", get(processed_statistic))
        .route("/metrics", get(export_metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn_with_state(metrics, track_requests))
}

async fn track_requests(State(metrics): State<Arc<RelayMetrics>>, request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| NON_EXISTENT_PATH.to_string());

    let started = Instant::now();
    let response = next.run(request).await;
    metrics.record_http_request(&path, started.elapsed());
    response
}

async fn process_message(State(service): State<RelayService>, body: Bytes) -> Response {
    match service.process_message(body.to_vec()).await {
        Ok(Acceptance::Saved { id }) => {
            debug!(id = %id, "Message accepted");
            (StatusCode::ACCEPTED, Json(json!({ "status": STATUS_SAVED, "msg_id": id }))).into_response()
        }
        Ok(Acceptance::Deferred { id, error }) => {
            debug!(id = %id, error = %error, "Message accepted with deferred save");
            (StatusCode::ACCEPTED, Json(json!({ "status": STATUS_DEFERRED, "msg_id": id }))).into_response()
        }
        Err(RelayError::EmptyPayload) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "problem": "can't read message from body" })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Message intake failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "problem": e.to_string() }))).into_response()
        }
    }
}

async fn statistic(State(service): State<RelayService>) -> impl IntoResponse {
    Json(service.statistic())
}

async fn processed_statistic(State(service): State<RelayService>) -> Response {
    match service.processed_count_statistic().await {
        Ok(counts) => Json(counts).into_response(),
        Err(e) => {
            error!(error = %e, "Processed statistic query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "problem": "can't get statistic" })),
            )
                .into_response()
        }
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "problem": "not found" }))).into_response()
}

async fn export_metrics(State(metrics): State<Arc<RelayMetrics>>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Metrics export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::{
        MemoryOutbox, MessageRecord, ProcessedCounts, RelayConfig, Repository, RepositoryResult,
    };
    use relay_store::SqliteRepository;
    use uuid::Uuid;

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct TestServer {
        base: String,
        service: RelayService,
    }

    async fn serve(repository: Arc<dyn Repository>, request_timeout: Duration) -> TestServer {
        let metrics = Arc::new(RelayMetrics::new().unwrap());
        let service = RelayService::new(
            repository,
            Arc::new(MemoryOutbox::new("brokerOutbox")),
            Arc::new(MemoryOutbox::new("repoOutbox")),
            metrics.clone(),
            &RelayConfig::default().with_instance("http-test"),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(service.clone(), metrics, request_timeout);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{addr}"),
            service,
        }
    }

    async fn start_server() -> (String, RelayService, Arc<SqliteRepository>) {
        let repository = Arc::new(SqliteRepository::open_in_memory().await.unwrap());
        let server = serve(repository.clone(), TIMEOUT).await;
        (server.base, server.service, repository)
    }

    /// Repository whose queries take longer than any test timeout.
    struct SlowRepository;

    #[async_trait]
    impl Repository for SlowRepository {
        async fn save_message(&self, _record: &MessageRecord) -> RepositoryResult<()> {
            Ok(())
        }

        async fn update_status(&self, _id: Uuid) -> RepositoryResult<()> {
            Ok(())
        }

        async fn processed_count(&self) -> RepositoryResult<ProcessedCounts> {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(ProcessedCounts::default())
        }
    }

    fn metric_line<'a>(text: &'a str, name: &str, label: &str) -> Option<&'a str> {
        text.lines()
            .filter(|line| !line.starts_with('#'))
            .find(|line| line.starts_with(name) && line.contains(label))
    }

    #[tokio::test]
    async fn post_message_is_accepted() {
        let (base, service, repository) = start_server().await;
        let _receiver = service.take_message_receiver();

        let resp = reqwest::Client::new()
            .post(format!("{base}/msg"))
            .body("hello")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], STATUS_SAVED);
        let id: Uuid = body["msg_id"].as_str().unwrap().parse().unwrap();
        assert!(repository.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_body_is_rejected() {
        let (base, _service, _repository) = start_server().await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/msg"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    #[tokio::test]
    async fn statistic_reports_counters() {
        let (base, service, _repository) = start_server().await;
        let _receiver = service.take_message_receiver();
        let client = reqwest::Client::new();

        client.post(format!("{base}/msg")).body("one").send().await.unwrap();

        let body: serde_json::Value = client
            .get(format!("{base}/statistic"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["total"], 1);
        assert_eq!(body["messages_sent_to_outbox"], 0);
    }

    #[tokio::test]
    async fn processed_statistic_counts_confirmed_messages() {
        let (base, service, repository) = start_server().await;
        let _receiver = service.take_message_receiver();

        let id = service.process_message("done").await.unwrap().id();
        repository.update_status(id).await.unwrap();

        let resp = reqwest::get(format!("{base}/processed-statistic")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["in_hour"], 1);
        assert_eq!(body["in_month"], 1);
    }

    #[tokio::test]
    async fn metrics_expose_message_and_request_counters() {
        let (base, service, _repository) = start_server().await;
        let _receiver = service.take_message_receiver();
        let client = reqwest::Client::new();

        client.post(format!("{base}/msg")).body("one").send().await.unwrap();
        let missing = client.get(format!("{base}/nowhere")).send().await.unwrap();
        assert_eq!(missing.status(), 404);

        let resp = client.get(format!("{base}/metrics")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        let text = resp.text().await.unwrap();

        assert!(metric_line(&text, "relay_incoming_messages_total", "")
            .unwrap()
            .ends_with(" 1"));
        assert!(metric_line(&text, "relay_http_requests_total", r#"path="/msg""#)
            .unwrap()
            .ends_with(" 1"));
        assert!(
            metric_line(&text, "relay_http_requests_total", r#"path="non-existent path""#)
                .unwrap()
                .ends_with(" 1")
        );
        assert!(metric_line(&text, "relay_http_request_duration_seconds_count", "").is_some());
    }

    #[tokio::test]
    async fn slow_request_times_out() {
        let server = serve(Arc::new(SlowRepository), Duration::from_millis(50)).await;

        let resp = reqwest::get(format!("{}/processed-statistic", server.base))
            .await
            .unwrap();
        assert_eq!(resp.status(), 408);
    }
}
