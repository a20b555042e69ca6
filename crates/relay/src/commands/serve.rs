use std::io::Write;
use std::net::SocketAddr;

use async_trait::async_trait;
use eyre::{Result, eyre};
use tracing::info;

use super::Command;
use crate::HostBuilder;
use crate::config::RelayConfig;

pub struct ServeCommand {
    pub config: RelayConfig,
}

#[async_trait]
impl Command for ServeCommand {
    async fn execute(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.server.bind, self.config.server.port)
            .parse()
            .map_err(|e| eyre!("Invalid bind address: {}", e))?;

        let host = HostBuilder::new(self.config.clone()).build().await?;

        let resumed = host
            .runner
            .resume_incomplete()
            .await
            .map_err(|e| eyre!("Failed to resume stored runs: {}", e))?;
        if !resumed.is_empty() {
            info!(count = resumed.len(), "Resumed incomplete runs");
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;

        info!("Starting HTTP server on {}", addr);
        let mut stdout = std::io::stdout();
        writeln!(stdout, "Server listening on http://{addr}")?;
        writeln!(stdout, "Press Ctrl+C to shutdown")?;

        host.serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

        info!("Server shutdown complete");

        Ok(())
    }
}
