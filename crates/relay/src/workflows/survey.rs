use relay_core::engine::RunError;
use relay_core::protocol::{Button, ButtonIntent, FieldDefinition, InputSchema, SelectOption};
use relay_core::sdk::{InputOptions, RunContext};
use relay_core::workflow::WorkflowDefinition;
use serde_json::Value;

pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Survey Demo", run)
        .with_description("Tour of prompts, buttons, and forms.")
}

fn text_field(response: &relay_core::sdk::InputResponse, name: &str) -> String {
    response
        .field(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn run(ctx: RunContext) -> Result<(), RunError> {
    let name = ctx.input_text("What's your name?").await?;
    ctx.output(format!("Hey {name}!")).await?;

    let proceed = ctx
        .input_with(
            "Want to continue?",
            InputOptions::new().buttons(["Let's go!", "No thanks"]),
        )
        .await?;
    if proceed.choice() == Some("No thanks") {
        return ctx.output("No worries, come back anytime!").await;
    }

    let profile = ctx
        .input(
            "Tell us about yourself",
            Some(
                InputSchema::new()
                    .field("role", FieldDefinition::text("What's your role?"))
                    .field(
                        "experience",
                        FieldDefinition::select(
                            "Years of experience",
                            vec![
                                SelectOption::new("0-2", "0-2 years"),
                                SelectOption::new("3-5", "3-5 years"),
                                SelectOption::new("5+", "5+ years"),
                            ],
                        ),
                    ),
            ),
            None,
        )
        .await?;
    ctx.output(format!(
        "Got it, you're a {} with {} years of experience.",
        text_field(&profile, "role"),
        text_field(&profile, "experience"),
    ))
    .await?;

    let feedback = ctx
        .input(
            "One last thing",
            Some(InputSchema::new().field("comments", FieldDefinition::text("Any feedback for us?"))),
            Some(vec![
                Button::new("Submit"),
                Button::new("Skip").with_intent(ButtonIntent::Secondary),
            ]),
        )
        .await?;

    if feedback.choice() == Some("Skip") {
        ctx.output("Thanks for participating!").await
    } else {
        ctx.output(format!(
            "Thanks for the feedback: \"{}\"",
            text_field(&feedback, "comments")
        ))
        .await
    }
}
