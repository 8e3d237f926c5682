//! Provisioning HTTP API
//!
//! axum routers over a shared [`Engine`]:
//!
//! - `node`: boot scripts, microkernel register/checkin, installer callbacks
//! - `admin`: policy, model, broker, tag, node, active model, BMC and image management
//!
//! Every error response is `{ "error": kind, "message": msg }` with a status
//! derived from the kind.

pub mod admin;
pub mod error;
pub mod node;

use std::sync::Arc;

use axum::Router;
use provision_engine::Engine;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorBody};

/// Endpoints used by booting nodes and installers
pub fn api_router(engine: Arc<Engine>) -> Router {
    node::router(engine).layer(TraceLayer::new_for_http())
}

/// Administrative endpoints, open to browser-based consoles
pub fn admin_router(engine: Arc<Engine>) -> Router {
    admin::router(engine)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Both surfaces on one router
pub fn router(engine: Arc<Engine>) -> Router {
    node::router(Arc::clone(&engine))
        .merge(admin::router(engine))
        .layer(TraceLayer::new_for_http())
}
