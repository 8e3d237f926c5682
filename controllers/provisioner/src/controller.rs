//! Main controller implementation.
//!
//! The `Controller` owns the engine and the three long-running tasks:
//! - API server on `api_port` (boot, register/checkin, callbacks)
//! - Admin server on `admin_port`
//! - Node expiry sweeper
//!
//! `run` returns when ctrl-c arrives or when any task ends, and then
//! drains the others.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use provision_api::{admin_router, api_router};
use provision_engine::{Engine, ProvisionConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::ControllerError;
use crate::sweeper::Sweeper;

/// Main controller for the provisioning server.
pub struct Controller {
    api_server: JoinHandle<Result<(), ControllerError>>,
    admin_server: JoinHandle<Result<(), ControllerError>>,
    sweeper: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Controller {
    /// Opens the store, binds both listeners and starts every task.
    pub async fn new(config: ProvisionConfig) -> Result<Self, ControllerError> {
        info!("Initializing provisioning engine");
        let api_addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
        let admin_addr = SocketAddr::from(([0, 0, 0, 0], config.admin_port));

        let engine = Arc::new(Engine::from_config(config).await?);
        engine.data().ensure_connected().await?;
        info!("Object store connected");

        let (shutdown, shutdown_rx) = watch::channel(false);

        let api_listener = TcpListener::bind(api_addr).await?;
        info!("API listening on {}", api_addr);
        let admin_listener = TcpListener::bind(admin_addr).await?;
        info!("Admin API listening on {}", admin_addr);

        let api_server = tokio::spawn(serve(
            "API",
            api_listener,
            api_router(Arc::clone(&engine)),
            shutdown_rx.clone(),
        ));
        let admin_server = tokio::spawn(serve(
            "Admin",
            admin_listener,
            admin_router(Arc::clone(&engine)),
            shutdown_rx.clone(),
        ));
        let sweeper = tokio::spawn(
            Sweeper::new(Arc::clone(engine.data()), engine.config()).run(shutdown_rx),
        );

        Ok(Self {
            api_server,
            admin_server,
            sweeper,
            shutdown,
        })
    }

    /// Runs until ctrl-c or until a task stops.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Provisioning server running");

        let outcome = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                signal.map_err(ControllerError::from)
            }
            result = &mut self.api_server => task_outcome("API server", result),
            result = &mut self.admin_server => task_outcome("Admin server", result),
            result = &mut self.sweeper => Err(match result {
                Ok(()) => ControllerError::Task("sweeper exited".to_string()),
                Err(e) => ControllerError::Task(format!("sweeper panicked: {}", e)),
            }),
        };

        // Receivers may already be gone if every task ended
        let _ = self.shutdown.send(true);
        for (name, handle) in [("API server", self.api_server), ("Admin server", self.admin_server)] {
            if handle.is_finished() {
                continue;
            }
            if let Err(e) = task_outcome(name, handle.await) {
                error!("{} did not stop cleanly: {}", name, e);
            }
        }
        if !self.sweeper.is_finished() {
            let _ = self.sweeper.await;
        }

        info!("Provisioning server stopped");
        outcome
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

async fn serve(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ControllerError> {
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("{} server draining", name);
        })
        .await?;
    Ok(())
}

fn task_outcome(
    name: &str,
    joined: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    joined.map_err(|e| ControllerError::Task(format!("{} panicked: {}", name, e)))?
}
