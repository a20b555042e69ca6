use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use eyre::{Result, eyre};

use super::Command;
use crate::cli::ConfigCommands;
use crate::config::RelayConfig;

pub struct ConfigCommand {
    pub action: ConfigCommands,
    pub config: RelayConfig,
    pub path: Option<PathBuf>,
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => RelayConfig::default_path()?,
        };
        let mut stdout = std::io::stdout();

        match self.action {
            ConfigCommands::Show => {
                let rendered = toml::to_string_pretty(&self.config)
                    .map_err(|e| eyre!("Failed to render configuration: {}", e))?;
                writeln!(stdout, "# {}", path.display())?;
                write!(stdout, "{rendered}")?;
            }
            ConfigCommands::Init => {
                if path.exists() {
                    writeln!(stdout, "Configuration already exists at {}", path.display())?;
                } else {
                    RelayConfig::default().save(&path)?;
                    writeln!(stdout, "Wrote default configuration to {}", path.display())?;
                }
            }
        }

        Ok(())
    }
}
