use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use strata_client::WorkflowFilter;

use super::{Context, print_header, state_label, truncate};

#[derive(Args, Debug)]
pub struct WorkflowsArgs {
    #[command(subcommand)]
    pub command: WorkflowsCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkflowsCommand {
    /// List workflows
    List {
        /// Full-text search filter
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

pub async fn run(args: WorkflowsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    match args.command {
        WorkflowsCommand::List { search, limit } => {
            let workflows = client
                .workflows()
                .query(WorkflowFilter {
                    search,
                    limit: Some(limit),
                })
                .await?;
            if ctx.json_output {
                return ctx.print_json(&workflows);
            }

            let dim = Style::new().dim();
            if workflows.is_empty() {
                println!("{}", dim.apply_to("No workflows found."));
                return Ok(());
            }
            print_header(&format!("Workflows ({})", workflows.len()));
            for workflow in &workflows {
                let stages: Vec<&str> = [
                    ("ingestion", &workflow.ingestion),
                    ("preparation", &workflow.preparation),
                    ("extraction", &workflow.extraction),
                    ("enrichment", &workflow.enrichment),
                ]
                .into_iter()
                .filter(|(_, stage)| stage.as_ref().is_some_and(|v| !v.is_null()))
                .map(|(name, _)| name)
                .collect();
                println!(
                    "{}  {}  {}  {}",
                    dim.apply_to(&workflow.id),
                    truncate(&workflow.name, 40),
                    state_label(workflow.state),
                    dim.apply_to(stages.join(","))
                );
            }
        }
    }

    Ok(())
}
