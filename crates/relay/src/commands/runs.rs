use std::io::Write;

use async_trait::async_trait;
use chrono::Local;
use eyre::{Result, eyre};

use super::Command;
use crate::cli::RunsCommands;
use relay_core::pairing::{PairedEntry, pair_messages};
use relay_core::protocol::Message;
use relay_core::coordinator::MessageStoreError;
use relay_core::storage::{StoreConfig, Storage};
use relay_core::types::RunId;

pub struct RunsCommand {
    pub command: RunsCommands,
    pub store: StoreConfig,
}

#[async_trait]
impl Command for RunsCommand {
    async fn execute(&self) -> Result<()> {
        let storage = self
            .store
            .open()
            .await
            .map_err(|e| eyre!("Failed to open run store: {}", e))?;

        match &self.command {
            RunsCommands::List { limit } => list_runs(&storage, *limit).await,
            RunsCommands::Show { run_id } => show_run(&storage, parse_run_id(run_id)?).await,
            RunsCommands::Delete { run_id } => delete_run(&storage, parse_run_id(run_id)?).await,
        }
    }
}

fn parse_run_id(run_id: &str) -> Result<RunId> {
    run_id
        .parse()
        .map_err(|e| eyre!("Invalid run ID '{}': {}", run_id, e))
}

async fn list_runs(storage: &Storage, limit: usize) -> Result<()> {
    let runs = storage
        .messages
        .list_runs()
        .await
        .map_err(|e| eyre!("Failed to list runs: {}", e))?;

    let mut stdout = std::io::stdout();
    if runs.is_empty() {
        writeln!(stdout, "No runs found.")?;
        return Ok(());
    }

    writeln!(stdout, "{:<36} {:<20} {:<10}", "ID", "Created", "Messages")?;
    writeln!(stdout, "{}", "-".repeat(68))?;
    for run in runs.into_iter().take(limit) {
        writeln!(
            stdout,
            "{:<36} {:<20} {:<10}",
            run.run_id,
            run.created_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            run.message_count
        )?;
    }

    Ok(())
}

async fn show_run(storage: &Storage, run_id: RunId) -> Result<()> {
    let messages: Vec<Message> = storage
        .messages
        .load_messages(run_id)
        .await
        .map_err(|e| match e {
            MessageStoreError::RunNotFound { .. } => eyre!("Run not found: {}", run_id),
            other => eyre!("Failed to load run {}: {}", run_id, other),
        })?
        .into_iter()
        .map(|(_, message)| message)
        .collect();

    let view = pair_messages(&messages);
    let mut stdout = std::io::stdout();
    writeln!(stdout, "Run {run_id}")?;

    for entry in &view.entries {
        writeln!(stdout, "{}", render_entry(entry))?;
    }

    let status = if view.complete {
        "complete".to_string()
    } else if let Some(request) = view.awaiting_response() {
        format!("waiting on {}", request.id())
    } else {
        "running".to_string()
    };
    writeln!(stdout, "Status: {status}")?;

    Ok(())
}

async fn delete_run(storage: &Storage, run_id: RunId) -> Result<()> {
    storage
        .messages
        .delete_run(run_id)
        .await
        .map_err(|e| match e {
            MessageStoreError::RunNotFound { .. } => eyre!("Run not found: {}", run_id),
            other => eyre!("Failed to delete run {}: {}", run_id, other),
        })?;
    storage
        .journal
        .clear_run(run_id)
        .await
        .map_err(|e| eyre!("Failed to clear journal for {}: {}", run_id, e))?;

    let mut stdout = std::io::stdout();
    writeln!(stdout, "Deleted run {run_id}")?;
    Ok(())
}

fn render_message(message: &Message) -> String {
    match message {
        Message::Log { text, .. } => text.clone(),
        Message::InputRequest { prompt, .. } => format!("? {prompt}"),
        Message::InputReceived { value, .. } => {
            format!("> {}", serde_json::Value::Object(value.clone()))
        }
        Message::ConfirmRequest { message, .. } => format!("? {message} [y/n]"),
        Message::ConfirmReceived { approved, .. } => {
            format!("> {}", if *approved { "yes" } else { "no" })
        }
        Message::Loading { text, complete, .. } => {
            format!("{} {text}", if *complete { "[done]" } else { "[...]" })
        }
        Message::WorkflowComplete { .. } => "-- complete --".to_string(),
    }
}

fn render_entry(entry: &PairedEntry) -> String {
    match entry {
        PairedEntry::Message(message) => render_message(message),
        PairedEntry::Interaction { request, answer } => match answer {
            Some(answer) => format!("{}\n{}", render_message(request), render_message(answer)),
            None => format!("{}\n  (awaiting answer)", render_message(request)),
        },
        PairedEntry::Loading { text, complete, .. } => {
            format!("{} {text}", if *complete { "[done]" } else { "[...]" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanswered_interaction_is_marked() {
        let entry = PairedEntry::Interaction {
            request: Message::confirm_request("relay-confirm-0", "Ship it?"),
            answer: None,
        };
        assert_eq!(render_entry(&entry), "? Ship it? [y/n]\n  (awaiting answer)");
    }

    #[test]
    fn answered_confirm_renders_both_lines() {
        let entry = PairedEntry::Interaction {
            request: Message::confirm_request("relay-confirm-0", "Ship it?"),
            answer: Some(Message::confirm_received("relay-confirm-0", true)),
        };
        assert_eq!(render_entry(&entry), "? Ship it? [y/n]\n> yes");
    }

    #[tokio::test]
    async fn delete_removes_stored_run() {
        let storage = StoreConfig::Memory.open().await.unwrap();
        let run_id = RunId::new();
        storage.messages.create_run(run_id).await.unwrap();

        delete_run(&storage, run_id).await.unwrap();

        assert!(!storage.messages.run_exists(run_id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_run_is_reported() {
        let storage = StoreConfig::Memory.open().await.unwrap();
        let run_id = RunId::new();

        let shown = show_run(&storage, run_id).await.unwrap_err();
        assert_eq!(shown.to_string(), format!("Run not found: {run_id}"));

        let deleted = delete_run(&storage, run_id).await.unwrap_err();
        assert_eq!(deleted.to_string(), format!("Run not found: {run_id}"));
    }
}
