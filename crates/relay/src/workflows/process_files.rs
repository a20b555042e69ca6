use std::time::Duration;

use relay_core::engine::RunError;
use relay_core::sdk::RunContext;
use relay_core::workflow::WorkflowDefinition;

const PROCESS_DELAY: Duration = Duration::from_millis(500);

pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new("Process Files", run)
        .with_description("Fetch a batch of files and process them one by one.")
}

async fn run(ctx: RunContext) -> Result<(), RunError> {
    ctx.output("Workflow started").await?;
    ctx.output("Fetching files from API...").await?;

    let files: Vec<String> = ctx
        .step("fetch-files", || async {
            Ok([
                "doc_7392_rev3.pdf",
                "report_x29_final.pdf",
                "memo_2024_05_12.pdf",
                "file_089_update.pdf",
                "proj_alpha_v2.pdf",
                "data_analysis_q2.pdf",
                "notes_meeting_52.pdf",
                "summary_fy24_draft.pdf",
            ]
            .into_iter()
            .map(str::to_string)
            .collect())
        })
        .await?;

    ctx.output(format!("Found {} files", files.len())).await?;
    ctx.output("Starting file processing...").await?;

    for (i, file) in files.iter().enumerate() {
        ctx.step(&format!("process-file-{i}"), || async {
            tokio::time::sleep(PROCESS_DELAY).await;
            Ok(())
        })
        .await?;
        ctx.output(format!("Processing {file}...")).await?;
        ctx.output(format!("Completed {file}")).await?;
    }

    ctx.output("Workflow completed successfully!").await
}
