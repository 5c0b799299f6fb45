//! Feeds command.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use strata_client::FeedFilter;

use super::{Context, print_deleted, print_header, state_label, truncate};

#[derive(Args, Debug)]
pub struct FeedsArgs {
    #[command(subcommand)]
    pub command: FeedsCommand,
}

#[derive(Subcommand, Debug)]
pub enum FeedsCommand {
    /// List feeds
    List {
        /// Full-text search filter
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Delete a feed
    Delete {
        /// Feed ID
        id: String,
    },
}

pub async fn run(args: FeedsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    match args.command {
        FeedsCommand::List { search, limit } => {
            let feeds = client
                .feeds()
                .query(FeedFilter {
                    search,
                    limit: Some(limit),
                    ..Default::default()
                })
                .await?;
            if ctx.json_output {
                return ctx.print_json(&feeds);
            }

            let dim = Style::new().dim();
            if feeds.is_empty() {
                println!("{}", dim.apply_to("No feeds found."));
                return Ok(());
            }
            print_header(&format!("Feeds ({})", feeds.len()));
            for feed in &feeds {
                let kind = feed
                    .feed_type
                    .map(|t| format!("{:?}", t).to_lowercase())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {}  {}  {}",
                    dim.apply_to(&feed.id),
                    truncate(&feed.name, 40),
                    dim.apply_to(kind),
                    state_label(feed.state)
                );
            }
        }
        FeedsCommand::Delete { id } => {
            let deleted = client.feeds().delete(&id).await?;
            print_deleted(ctx, "feed", &deleted)?;
        }
    }

    Ok(())
}
