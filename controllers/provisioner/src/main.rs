//! Provisioning Server
//!
//! Single binary hosting the provisioning engine:
//! - API listener: iPXE boot scripts, microkernel register/checkin, installer callbacks
//! - Admin listener: policy, model, broker, tag, node, active model, BMC and image management
//! - Expiry sweeper: forgets nodes that stopped checking in
//!
//! Configuration comes from the YAML file named by `PROVISION_CONFIG`
//! plus `PROVISION_*` environment overrides.

mod controller;
mod error;
mod sweeper;

use controller::Controller;
use crate::error::ControllerError;
use provision_engine::ProvisionConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting provisioning server");

    let config = ProvisionConfig::load()?;
    if config.api_port == config.admin_port {
        return Err(ControllerError::InvalidConfig(format!(
            "api_port and admin_port must differ (both {})",
            config.api_port
        )));
    }

    info!("Configuration:");
    info!("  API port: {}", config.api_port);
    info!("  Admin port: {}", config.admin_port);
    info!("  Image service: {}:{}", config.image_svc_host, config.image_svc_port);
    info!("  Persistence: {:?} at {}", config.persist_mode, config.persist_path.display());
    info!(
        "  Node expiry: {}s, swept every {}s",
        config.node_expire_timeout, config.daemon_min_cycle_time
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
