//! API endpoints for message intake and queue introspection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::core::{CustomerQueueStatus, QueueStats};
use crate::worker::WorkerHealth;

use crate::web::middleware::{AckStatus, Acknowledgement, InboundMessage};
use crate::web::router::AppState;

/// Accept a message and acknowledge immediately.
///
/// `202` when queued, `200` for a duplicate resubmission, `429` when the
/// queue is full, `400` for an empty customer id or message.
pub async fn post_message(
    State(state): State<AppState>,
    Json(payload): Json<InboundMessage>,
) -> Result<(StatusCode, Json<Acknowledgement>), StatusCode> {
    if payload.customer_id.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if !payload.is_typing && payload.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let ack = state.middleware.enqueue_and_acknowledge(payload).await;
    let code = match ack.status {
        AckStatus::Queued => StatusCode::ACCEPTED,
        AckStatus::Duplicate => StatusCode::OK,
        AckStatus::Rejected => StatusCode::TOO_MANY_REQUESTS,
    };

    Ok((code, Json(ack)))
}

/// Queue statistics.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.middleware.service().stats().await)
}

/// One customer's queue.
pub async fn customer_status(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> Json<CustomerQueueStatus> {
    Json(
        state
            .middleware
            .service()
            .get_customer_queue_status(&customer_id)
            .await,
    )
}

/// Worker health.
pub async fn health(State(state): State<AppState>) -> Json<WorkerHealth> {
    Json(state.worker.health().await)
}
