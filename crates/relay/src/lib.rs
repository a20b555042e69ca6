pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod workflows;

use std::future::Future;
use std::sync::Arc;

use eyre::{Result, eyre};
use relay_core::coordinator::CoordinatorService;
use relay_core::engine::EventBus;
use relay_core::workflow::{WorkflowRegistry, WorkflowRunner};

use crate::config::RelayConfig;
use crate::http::AppState;

/// Coordinator and runner wired to the configured store.
pub struct Host {
    pub service: CoordinatorService,
    pub runner: WorkflowRunner,
}

impl Host {
    pub fn app_state(&self) -> AppState {
        AppState::new(self.runner.clone())
    }

    pub async fn shutdown(self) {
        self.service.shutdown().await;
    }

    /// Serves the HTTP API on `listener` until `signal` resolves.
    ///
    /// Live run streams only end when their runs close, so the coordinator
    /// is stopped before the server waits on open connections.
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let coordinator = self.service.handle();

        axum::serve(listener, http::router(self.app_state()))
            .with_graceful_shutdown(async move {
                signal.await;
                tracing::info!("Closing live runs");
                coordinator.shutdown();
            })
            .await
            .map_err(|e| eyre!("Server error: {}", e))?;

        self.shutdown().await;
        Ok(())
    }
}

pub struct HostBuilder {
    config: RelayConfig,
    registry: WorkflowRegistry,
}

impl HostBuilder {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            registry: workflows::builtin_registry(),
        }
    }

    pub fn with_registry(mut self, registry: WorkflowRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub async fn build(self) -> Result<Host> {
        let storage = self
            .config
            .store
            .open()
            .await
            .map_err(|e| eyre!("Failed to open run store: {}", e))?;

        let service = CoordinatorService::spawn(storage.messages);
        let runner = WorkflowRunner::new(
            Arc::new(self.registry),
            service.handle(),
            storage.journal,
            EventBus::new(),
            self.config.runs.runner_config(),
        );

        Ok(Host { service, runner })
    }
}
