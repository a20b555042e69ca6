pub mod args;

pub use args::{Cli, Commands, ConfigCommands, RunsCommands};

use dotenvy::dotenv;
use eyre::Result;

pub fn load_env() -> Result<()> {
    dotenv().ok();
    Ok(())
}
