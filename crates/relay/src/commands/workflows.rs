use std::io::Write;

use async_trait::async_trait;
use eyre::Result;

use super::Command;
use crate::workflows::builtin_registry;

pub struct WorkflowsCommand;

#[async_trait]
impl Command for WorkflowsCommand {
    async fn execute(&self) -> Result<()> {
        let workflows = builtin_registry().list();

        let mut stdout = std::io::stdout();
        writeln!(stdout, "{:<24} {:<24} {}", "Slug", "Title", "Description")?;
        writeln!(stdout, "{}", "-".repeat(80))?;

        for workflow in workflows {
            writeln!(
                stdout,
                "{:<24} {:<24} {}",
                workflow.slug,
                workflow.title,
                workflow.description.unwrap_or_default()
            )?;
        }

        Ok(())
    }
}
