//! Web module: HTTP intake (Axum) and the queue middleware.

pub mod api;
pub mod middleware;
pub mod router;
pub mod server;

pub use middleware::{Acknowledgement, InboundMessage, QueueMiddleware};
pub use router::{create_app_router, AppState};
pub use server::run_server;
