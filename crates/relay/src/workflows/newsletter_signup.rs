use std::time::Duration;

use relay_core::engine::RunError;
use relay_core::protocol::{FieldDefinition, InputSchema};
use relay_core::sdk::RunContext;
use relay_core::workflow::WorkflowDefinition;
use serde_json::Value;

const SUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Newsletter Signup", run)
}

async fn run(ctx: RunContext) -> Result<(), RunError> {
    let name = ctx.input_text("What is your name?").await?;

    let info = ctx
        .input(
            "Enter more info",
            Some(
                InputSchema::new()
                    .field("email", FieldDefinition::text("Email address"))
                    .field("newsletter", FieldDefinition::checkbox("Subscribe to updates?")),
            ),
            None,
        )
        .await?;
    let email = info
        .field("email")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let newsletter = info
        .field("newsletter")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if newsletter {
        let step_ctx = ctx.clone();
        ctx.loading("Subscribing to newsletter...", |loading| async move {
            step_ctx
                .step("subscribe", || async {
                    tokio::time::sleep(SUBSCRIBE_DELAY).await;
                    Ok(true)
                })
                .await?;
            loading.complete("Subscribed to newsletter!");
            Ok(())
        })
        .await?;
    }

    ctx.output(format!("Thanks, {name}! Check {email} for next steps."))
        .await
}
