use relay_core::engine::RunError;
use relay_core::sdk::RunContext;
use relay_core::workflow::WorkflowDefinition;

pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Ask Name", run).with_description("Say hello and ask for a name.")
}

async fn run(ctx: RunContext) -> Result<(), RunError> {
    ctx.output("Hello! I'd like to get to know you.").await?;
    let name = ctx.input_text("What's your name?").await?;
    ctx.output(format!("Nice to meet you, {name}!")).await
}
