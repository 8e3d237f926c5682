//! Node-facing endpoints
//!
//! - `GET  /razor/api/boot?hw_id=..`: iPXE script (always 200; failures
//!   become a script that reboots)
//! - `POST /razor/api/node/register`: microkernel facts
//! - `POST /razor/api/node/checkin`: heartbeat, answered with a command
//! - `GET  /razor/api/policy/callback/{uuid}/{namespace}/{*args}`: installer callbacks

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use provision_engine::engine::{BootRequest, CheckinRequest, RegisterRequest};
use provision_engine::{CheckinResponse, Engine, MkClientConfig};
use provision_model::Node;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct RegisterReply {
    pub node: Node,
    pub client_config: MkClientConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckinReply {
    #[serde(flatten)]
    pub response: CheckinResponse,
    pub client_config: MkClientConfig,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/razor/api/boot", get(boot))
        .route("/razor/api/node/register", post(register))
        .route("/razor/api/node/checkin", post(checkin))
        .route("/razor/api/policy/callback/{uuid}/{namespace}", get(callback))
        .route(
            "/razor/api/policy/callback/{uuid}/{namespace}/{*args}",
            get(callback_with_args),
        )
        .with_state(engine)
}

async fn boot(State(engine): State<Arc<Engine>>, Query(req): Query<BootRequest>) -> String {
    engine.boot(req).await
}

async fn register(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<RegisterReply>, ApiError> {
    let node = engine.register(req).await?;
    Ok(Json(RegisterReply {
        node,
        client_config: engine.config().client_config(),
    }))
}

async fn checkin(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<CheckinReply>, ApiError> {
    let response = engine.checkin(req).await?;
    Ok(Json(CheckinReply {
        response,
        client_config: engine.config().client_config(),
    }))
}

async fn callback(
    State(engine): State<Arc<Engine>>,
    Path((uuid, namespace)): Path<(String, String)>,
) -> Result<String, ApiError> {
    Ok(engine.callback(&uuid, &namespace, &[]).await?)
}

async fn callback_with_args(
    State(engine): State<Arc<Engine>>,
    Path((uuid, namespace, args)): Path<(String, String, String)>,
) -> Result<String, ApiError> {
    let args: Vec<String> = args
        .split('/')
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    debug!("Callback {}/{} args {:?}", uuid, namespace, args);
    Ok(engine.callback(&uuid, &namespace, &args).await?)
}
