//! Contents command - inspect and ingest content.

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use strata_client::{Content, ContentFilter, EntityReference};

use super::{Context, print_deleted, print_header, state_label, truncate};

/// Arguments for the contents command.
#[derive(Args, Debug)]
pub struct ContentsArgs {
    #[command(subcommand)]
    pub command: ContentsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ContentsCommand {
    /// List contents
    List {
        /// Full-text search filter
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show a content item
    Get {
        /// Content ID
        id: String,

        /// Print the extracted markdown
        #[arg(long)]
        markdown: bool,
    },

    /// Ingest a URI
    Ingest {
        /// Web page or file URI
        uri: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Workflow to apply
        #[arg(short, long)]
        workflow: Option<String>,

        /// Wait for ingestion to finish
        #[arg(long)]
        wait: bool,

        /// Seconds to wait with --wait
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Delete a content item
    Delete {
        /// Content ID
        id: String,
    },
}

/// Run the contents command.
pub async fn run(args: ContentsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let contents = client.contents();

    match args.command {
        ContentsCommand::List { search, limit } => {
            let filter = ContentFilter {
                search,
                limit: Some(limit),
                ..Default::default()
            };
            let items = contents.query(filter).await?;
            if ctx.json_output {
                return ctx.print_json(&items);
            }
            print_list(&items);
        }
        ContentsCommand::Get { id, markdown } => {
            let content = contents.get(&id).await?;
            if ctx.json_output {
                return ctx.print_json(&content);
            }
            print_content(&content, markdown);
        }
        ContentsCommand::Ingest {
            uri,
            name,
            workflow,
            wait,
            timeout,
        } => {
            let workflow = workflow.map(EntityReference::new);
            let mut content = contents
                .ingest_uri(&uri, name.as_deref(), workflow, false)
                .await?;
            tracing::info!(content_id = %content.id, %uri, "Ingestion started");

            if wait {
                if !ctx.json_output {
                    println!("{}", Style::new().dim().apply_to("Waiting for ingestion..."));
                }
                content = contents
                    .wait_until_done(&content.id, Duration::from_secs(2), Duration::from_secs(timeout))
                    .await?;
            }

            if ctx.json_output {
                return ctx.print_json(&content);
            }
            println!(
                "{} Ingested {} {}",
                Style::new().green().apply_to("✓"),
                uri,
                Style::new().dim().apply_to(&content.id)
            );
            if wait {
                println!("State: {}", state_label(content.state));
            }
        }
        ContentsCommand::Delete { id } => {
            let deleted = contents.delete(&id).await?;
            print_deleted(ctx, "content", &deleted)?;
        }
    }

    Ok(())
}

fn print_list(items: &[Content]) {
    let dim = Style::new().dim();
    if items.is_empty() {
        println!("{}", dim.apply_to("No contents found."));
        return;
    }

    print_header(&format!("Contents ({})", items.len()));
    for item in items {
        let name = item.name.as_deref().unwrap_or("(unnamed)");
        println!(
            "{}  {}  {}",
            dim.apply_to(&item.id),
            truncate(name, 48),
            state_label(item.state)
        );
    }
}

fn print_content(content: &Content, markdown: bool) {
    let dim = Style::new().dim();
    print_header(content.name.as_deref().unwrap_or("(unnamed)"));
    println!("ID:       {}", content.id);
    println!("State:    {}", state_label(content.state));
    if let Some(kind) = content.content_type {
        println!("Type:     {:?}", kind);
    }
    if let Some(ref uri) = content.uri {
        println!("URI:      {}", uri);
    }
    if let Some(ref mime) = content.mime_type {
        println!("MIME:     {}", mime);
    }
    if let Some(created) = content.creation_date {
        println!("Created:  {}", dim.apply_to(created.format("%Y-%m-%d %H:%M")));
    }
    if let Some(ref error) = content.error {
        println!("Error:    {}", Style::new().red().apply_to(error));
    }

    if markdown && let Some(ref text) = content.markdown {
        println!();
        println!("{}", text);
    }
}
