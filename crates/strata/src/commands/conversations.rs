//! Conversations command.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use strata_client::{Conversation, ConversationFilter, ConversationRole};

use super::{Context, print_deleted, print_header, state_label, truncate};

#[derive(Args, Debug)]
pub struct ConversationsArgs {
    #[command(subcommand)]
    pub command: ConversationsCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConversationsCommand {
    /// List conversations
    List {
        /// Full-text search filter
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show a conversation transcript
    Get {
        /// Conversation ID
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: String,
    },
}

pub async fn run(args: ConversationsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    match args.command {
        ConversationsCommand::List { search, limit } => {
            let conversations = client
                .conversations()
                .query(ConversationFilter {
                    search,
                    limit: Some(limit),
                    ..Default::default()
                })
                .await?;
            if ctx.json_output {
                return ctx.print_json(&conversations);
            }

            let dim = Style::new().dim();
            if conversations.is_empty() {
                println!("{}", dim.apply_to("No conversations found."));
                return Ok(());
            }
            print_header(&format!("Conversations ({})", conversations.len()));
            for conversation in &conversations {
                let name = conversation.name.as_deref().unwrap_or("(untitled)");
                let created = conversation
                    .creation_date
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}  {}",
                    dim.apply_to(&conversation.id),
                    truncate(name, 40),
                    state_label(conversation.state),
                    dim.apply_to(created)
                );
            }
        }
        ConversationsCommand::Get { id } => {
            let conversation = client.conversations().get(&id).await?;
            if ctx.json_output {
                return ctx.print_json(&conversation);
            }
            print_transcript(&conversation);
        }
        ConversationsCommand::Delete { id } => {
            let deleted = client.conversations().delete(&id).await?;
            print_deleted(ctx, "conversation", &deleted)?;
        }
    }

    Ok(())
}

fn print_transcript(conversation: &Conversation) {
    let dim = Style::new().dim();
    let cyan = Style::new().cyan().bold();
    let green = Style::new().green().bold();

    print_header(conversation.name.as_deref().unwrap_or(&conversation.id));
    for message in &conversation.messages {
        match message.role {
            ConversationRole::User => println!("{} {}", cyan.apply_to("You:"), message.text()),
            ConversationRole::Assistant => {
                println!("{} {}", green.apply_to("Assistant:"), message.text());
                for call in &message.tool_calls {
                    println!("  {}", dim.apply_to(format!("[tool: {}]", call.name)));
                }
            }
            ConversationRole::Tool => {
                println!("  {}", dim.apply_to(format!("[result] {}", truncate(message.text(), 80))));
            }
            ConversationRole::System | ConversationRole::Unknown => {}
        }
        println!();
    }
}
