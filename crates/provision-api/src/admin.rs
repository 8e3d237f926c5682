//! Administrative endpoints under `/razor/api`
//!
//! Collections follow one layout: `GET` lists, `POST` creates, `DELETE`
//! removes everything; `/{uuid}` gets, updates (`PUT`) or removes one.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use provision_engine::Engine;
use provision_engine::admin::{
    BmcRegistration, BrokerOptions, BrokerUpdate, ImageOptions, LogViewEntry, MatcherOptions,
    ModelOptions, ModelUpdate, PolicyOptions, PolicyUpdate, TagRuleOptions, TemplateInfo,
};
use provision_model::{
    ActiveModel, Bmc, Broker, ImageRecord, LogEntry, ModelInstance, Node, Policy, TagMatcher, TagRule,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

type Shared = State<Arc<Engine>>;
type Reply<T> = Result<Json<T>, ApiError>;

/// Body of delete responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Removed {
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl Removed {
    fn one(uuid: String) -> Json<Self> {
        Json(Self {
            result: "removed",
            uuid: Some(uuid),
        })
    }

    fn all() -> Json<Self> {
        Json(Self {
            result: "removed",
            uuid: None,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PowerRequest {
    #[serde(default)]
    pub new_state: String,
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/razor/api/policy", get(list_policies).post(add_policy).delete(remove_all_policies))
        .route("/razor/api/policy/templates", get(policy_templates))
        .route(
            "/razor/api/policy/{uuid}",
            get(get_policy).put(update_policy).delete(remove_policy),
        )
        .route("/razor/api/model", get(list_models).post(add_model).delete(remove_all_models))
        .route("/razor/api/model/templates", get(model_templates))
        .route(
            "/razor/api/model/{uuid}",
            get(get_model).put(update_model).delete(remove_model),
        )
        .route("/razor/api/broker", get(list_brokers).post(add_broker).delete(remove_all_brokers))
        .route("/razor/api/broker/plugins", get(broker_plugins))
        .route(
            "/razor/api/broker/{uuid}",
            get(get_broker).put(update_broker).delete(remove_broker),
        )
        .route("/razor/api/tag", get(list_tag_rules).post(add_tag_rule).delete(remove_all_tag_rules))
        .route(
            "/razor/api/tag/{uuid}",
            get(get_tag_rule).put(update_tag_rule).delete(remove_tag_rule),
        )
        .route("/razor/api/tag/{uuid}/matcher", post(add_matcher))
        .route(
            "/razor/api/tag/{uuid}/matcher/{matcher}",
            get(get_matcher).put(update_matcher).delete(remove_matcher),
        )
        .route("/razor/api/node", get(list_nodes))
        .route("/razor/api/node/{uuid}", get(get_node).delete(remove_node))
        .route(
            "/razor/api/active_model",
            get(list_active_models).delete(remove_all_active_models),
        )
        .route("/razor/api/active_model/logview", get(logview))
        .route(
            "/razor/api/active_model/{uuid}",
            get(get_active_model).delete(remove_active_model),
        )
        .route("/razor/api/active_model/{uuid}/log", get(active_model_log))
        .route("/razor/api/bmc", get(list_bmcs).post(register_bmc))
        .route("/razor/api/bmc/{uuid}", get(get_bmc).delete(remove_bmc))
        .route("/razor/api/bmc/{uuid}/power", post(change_power_state))
        .route("/razor/api/bmc/{uuid}/{sub_command}/{action}", get(query_bmc))
        .route("/razor/api/image", get(list_images).post(add_image))
        .route("/razor/api/image/{uuid}", get(get_image).delete(remove_image))
        .with_state(engine)
}

// policies

async fn list_policies(State(engine): Shared) -> Reply<Vec<Policy>> {
    Ok(Json(engine.list_policies().await?))
}

async fn add_policy(State(engine): Shared, Json(opts): Json<PolicyOptions>) -> Reply<Policy> {
    Ok(Json(engine.add_policy(opts).await?))
}

async fn policy_templates(State(engine): Shared) -> Json<Vec<TemplateInfo>> {
    Json(engine.policy_templates())
}

async fn get_policy(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Policy> {
    Ok(Json(engine.get_policy(&uuid).await?))
}

async fn update_policy(
    State(engine): Shared,
    Path(uuid): Path<String>,
    Json(opts): Json<PolicyUpdate>,
) -> Reply<Policy> {
    Ok(Json(engine.update_policy(&uuid, opts).await?))
}

async fn remove_policy(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_policy(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn remove_all_policies(State(engine): Shared) -> Reply<Removed> {
    engine.remove_all_policies().await?;
    Ok(Removed::all())
}

// models

async fn list_models(State(engine): Shared) -> Reply<Vec<ModelInstance>> {
    Ok(Json(engine.list_models().await?))
}

async fn add_model(State(engine): Shared, Json(opts): Json<ModelOptions>) -> Reply<ModelInstance> {
    Ok(Json(engine.add_model(opts).await?))
}

async fn model_templates(State(engine): Shared) -> Json<Vec<TemplateInfo>> {
    Json(engine.model_templates())
}

async fn get_model(State(engine): Shared, Path(uuid): Path<String>) -> Reply<ModelInstance> {
    Ok(Json(engine.get_model(&uuid).await?))
}

async fn update_model(
    State(engine): Shared,
    Path(uuid): Path<String>,
    Json(opts): Json<ModelUpdate>,
) -> Reply<ModelInstance> {
    Ok(Json(engine.update_model(&uuid, opts).await?))
}

async fn remove_model(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_model(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn remove_all_models(State(engine): Shared) -> Reply<Removed> {
    engine.remove_all_models().await?;
    Ok(Removed::all())
}

// brokers

async fn list_brokers(State(engine): Shared) -> Reply<Vec<Broker>> {
    Ok(Json(engine.list_brokers().await?))
}

async fn add_broker(State(engine): Shared, Json(opts): Json<BrokerOptions>) -> Reply<Broker> {
    Ok(Json(engine.add_broker(opts).await?))
}

async fn broker_plugins(State(engine): Shared) -> Json<Vec<TemplateInfo>> {
    Json(engine.broker_plugins())
}

async fn get_broker(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Broker> {
    Ok(Json(engine.get_broker(&uuid).await?))
}

async fn update_broker(
    State(engine): Shared,
    Path(uuid): Path<String>,
    Json(opts): Json<BrokerUpdate>,
) -> Reply<Broker> {
    Ok(Json(engine.update_broker(&uuid, opts).await?))
}

async fn remove_broker(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_broker(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn remove_all_brokers(State(engine): Shared) -> Reply<Removed> {
    engine.remove_all_brokers().await?;
    Ok(Removed::all())
}

// tag rules

async fn list_tag_rules(State(engine): Shared) -> Reply<Vec<TagRule>> {
    Ok(Json(engine.list_tag_rules().await?))
}

async fn add_tag_rule(State(engine): Shared, Json(opts): Json<TagRuleOptions>) -> Reply<TagRule> {
    Ok(Json(engine.add_tag_rule(opts).await?))
}

async fn get_tag_rule(State(engine): Shared, Path(uuid): Path<String>) -> Reply<TagRule> {
    Ok(Json(engine.get_tag_rule(&uuid).await?))
}

async fn update_tag_rule(
    State(engine): Shared,
    Path(uuid): Path<String>,
    Json(opts): Json<TagRuleOptions>,
) -> Reply<TagRule> {
    Ok(Json(engine.update_tag_rule(&uuid, opts).await?))
}

async fn remove_tag_rule(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_tag_rule(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn remove_all_tag_rules(State(engine): Shared) -> Reply<Removed> {
    engine.remove_all_tag_rules().await?;
    Ok(Removed::all())
}

async fn add_matcher(
    State(engine): Shared,
    Path(uuid): Path<String>,
    Json(opts): Json<MatcherOptions>,
) -> Reply<TagMatcher> {
    Ok(Json(engine.add_matcher(&uuid, opts).await?))
}

async fn get_matcher(
    State(engine): Shared,
    Path((uuid, matcher)): Path<(String, String)>,
) -> Reply<TagMatcher> {
    Ok(Json(engine.get_matcher(&uuid, &matcher).await?))
}

async fn update_matcher(
    State(engine): Shared,
    Path((uuid, matcher)): Path<(String, String)>,
    Json(opts): Json<MatcherOptions>,
) -> Reply<TagMatcher> {
    Ok(Json(engine.update_matcher(&uuid, &matcher, opts).await?))
}

async fn remove_matcher(
    State(engine): Shared,
    Path((uuid, matcher)): Path<(String, String)>,
) -> Reply<TagRule> {
    Ok(Json(engine.remove_matcher(&uuid, &matcher).await?))
}

// nodes and active models

async fn list_nodes(State(engine): Shared) -> Reply<Vec<Node>> {
    Ok(Json(engine.list_nodes().await?))
}

async fn get_node(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Node> {
    Ok(Json(engine.get_node(&uuid).await?))
}

async fn remove_node(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_node(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn list_active_models(State(engine): Shared) -> Reply<Vec<ActiveModel>> {
    Ok(Json(engine.list_active_models().await?))
}

async fn get_active_model(State(engine): Shared, Path(uuid): Path<String>) -> Reply<ActiveModel> {
    Ok(Json(engine.get_active_model(&uuid).await?))
}

async fn active_model_log(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Vec<LogEntry>> {
    Ok(Json(engine.active_model_log(&uuid).await?))
}

async fn logview(State(engine): Shared) -> Reply<Vec<LogViewEntry>> {
    Ok(Json(engine.logview().await?))
}

async fn remove_active_model(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_active_model(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn remove_all_active_models(State(engine): Shared) -> Reply<Removed> {
    engine.remove_all_active_models().await?;
    Ok(Removed::all())
}

// BMCs

async fn list_bmcs(State(engine): Shared) -> Reply<Vec<Bmc>> {
    Ok(Json(engine.list_bmcs().await?))
}

async fn register_bmc(State(engine): Shared, Json(opts): Json<BmcRegistration>) -> Reply<Bmc> {
    Ok(Json(engine.register_bmc(opts).await?))
}

async fn get_bmc(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Bmc> {
    Ok(Json(engine.get_bmc(&uuid).await?))
}

async fn remove_bmc(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_bmc(&uuid).await?;
    Ok(Removed::one(uuid))
}

async fn query_bmc(
    State(engine): Shared,
    Path((uuid, sub_command, action)): Path<(String, String, String)>,
) -> Reply<BTreeMap<String, String>> {
    Ok(Json(engine.query_bmc(&uuid, &sub_command, &action).await?))
}

async fn change_power_state(
    State(engine): Shared,
    Path(uuid): Path<String>,
    Json(req): Json<PowerRequest>,
) -> Result<String, ApiError> {
    Ok(engine.change_bmc_power_state(&uuid, &req.new_state).await?)
}

// images

async fn list_images(State(engine): Shared) -> Reply<Vec<ImageRecord>> {
    Ok(Json(engine.list_images().await?))
}

async fn add_image(State(engine): Shared, Json(opts): Json<ImageOptions>) -> Reply<ImageRecord> {
    Ok(Json(engine.add_image(opts).await?))
}

async fn get_image(State(engine): Shared, Path(uuid): Path<String>) -> Reply<ImageRecord> {
    Ok(Json(engine.get_image(&uuid).await?))
}

async fn remove_image(State(engine): Shared, Path(uuid): Path<String>) -> Reply<Removed> {
    engine.remove_image(&uuid).await?;
    Ok(Removed::one(uuid))
}
