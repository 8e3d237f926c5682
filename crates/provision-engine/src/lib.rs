//! Provisioning Engine
//!
//! The request-driven core: every register, checkin, boot or installer
//! callback runs one resolve-and-transition cycle against the object store
//! and returns a directive or script text.
//!
//! - `data`: typed repository over the versioned object store
//! - `tagging`: tag rule evaluation against node attributes
//! - `policies`: policy table precedence, compaction and binding counters
//! - `fsm` / `models`: validated transition tables and per-family behavior
//! - `broker`: configuration-management hand-off plugins
//! - `bmc`: out-of-band power control
//! - `engine` / `admin`: the inbound operations

pub mod admin;
pub mod backoff;
pub mod bmc;
pub mod boot_mk;
pub mod broker;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod fsm;
pub mod models;
pub mod policies;
pub mod render;
pub mod tagging;

pub use config::{MkClientConfig, ProvisionConfig};
pub use data::Data;
pub use engine::{CheckinResponse, Engine, MkCommand};
pub use error::EngineError;
pub use policies::Policies;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod data_test;
#[cfg(test)]
mod engine_test;
