//! Provisioning Domain Model
//!
//! Plain serde types for everything the orchestrator persists, plus the
//! closed registry that turns stored documents back into typed objects.
//!
//! - `Node`: hardware identity and reported facts
//! - `TagRule` / `TagMatcher`: boolean conditions over node attributes
//! - `Policy` / `PolicyTable`: tag-to-model bindings and their precedence
//! - `ModelInstance` / `ActiveModel`: install workflows and their per-node state
//! - `Broker`: configuration-management hand-off target
//! - `Bmc`: out-of-band management controller record
//! - `ImageRecord`: registered boot images

pub mod active_model;
pub mod bmc;
pub mod broker;
pub mod error;
pub mod image;
pub mod metadata;
pub mod model;
pub mod node;
pub mod policy;
pub mod registry;
pub mod tag;

pub use active_model::{ActiveModel, LogEntry};
pub use bmc::{Bmc, UNKNOWN_POWER_STATE, bmc_uuid_from_mac};
pub use broker::{Broker, BrokerPluginKind};
pub use error::ModelError;
pub use image::{ImageKind, ImageRecord};
pub use metadata::{MetadataField, apply_metadata, broker_fields, model_fields};
pub use model::{ModelInstance, ModelKind, State};
pub use node::{Node, normalize_hw_id};
pub use policy::{NO_BROKER, POLICY_TABLE_UUID, Policy, PolicyTable, PolicyTemplate};
pub use registry::{Constructor, Persist, ProvisionObject, Registry, TYPE_FIELD};
pub use tag::{Comparator, TagMatcher, TagRule};

/// Generates a new object identifier
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Current time as unix seconds
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod registry_test;
#[cfg(test)]
mod policy_test;
