//! Route definitions for web server.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::api;
use super::middleware::QueueMiddleware;
use crate::worker::QueueWorker;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub middleware: QueueMiddleware,
    pub worker: Arc<QueueWorker>,
}

impl AppState {
    pub fn new(worker: Arc<QueueWorker>) -> Self {
        Self {
            middleware: QueueMiddleware::new(worker.service().clone()),
            worker,
        }
    }
}

/// Create the API router.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/messages", post(api::post_message))
        .route("/queue/stats", get(api::queue_stats))
        .route("/queue/customers/:customer_id", get(api::customer_status))
}

/// Create the full app router.
pub fn create_app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_api_router())
        .route("/health", get(api::health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MessageQueueService, QueueConfig};
    use crate::processors::echo::EchoProcessor;
    use crate::worker::WorkerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app(max_queue_size: usize) -> Router {
        let service = MessageQueueService::new(QueueConfig {
            max_queue_size,
            ..QueueConfig::default()
        });
        let worker = Arc::new(QueueWorker::new(
            service,
            Arc::new(EchoProcessor::new()),
            WorkerConfig::default(),
        ));
        create_app_router(AppState::new(worker))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_message_is_accepted() {
        let app = app(10);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/messages",
                serde_json::json!({"customer_id": "c1", "content": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "queued");
        assert_eq!(body["queued"], true);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/queue/customers/c1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["queue_size"], 1);
        assert_eq!(body["messages"][0]["channel"], "web");
    }

    #[tokio::test]
    async fn test_full_queue_maps_to_429() {
        let app = app(1);

        app.clone()
            .oneshot(post_json(
                "/api/messages",
                serde_json::json!({"customer_id": "c2", "content": "first"}),
            ))
            .await
            .unwrap();
        let response = app
            .oneshot(post_json(
                "/api/messages",
                serde_json::json!({"customer_id": "c3", "content": "second"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json_body(response).await["status"], "rejected");
    }

    #[tokio::test]
    async fn test_empty_content_is_bad_request() {
        let response = app(10)
            .oneshot(post_json(
                "/api/messages",
                serde_json::json!({"customer_id": "c1", "content": "   "}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_stats() {
        let app = app(10);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["state"], "stopped");
        assert_eq!(body["running"], false);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/queue/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["queued"], 0);
    }
}
