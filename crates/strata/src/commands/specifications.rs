//! Specifications command.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::Style;

use strata_client::{Specification, SpecificationFilter};

use super::{Context, print_header, state_label, truncate};

#[derive(Args, Debug)]
pub struct SpecificationsArgs {
    #[command(subcommand)]
    pub command: SpecificationsCommand,
}

#[derive(Subcommand, Debug)]
pub enum SpecificationsCommand {
    /// List specifications
    List {
        /// Full-text search filter
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Show a specification
    Get {
        /// Specification ID
        id: String,
    },
}

pub async fn run(args: SpecificationsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    match args.command {
        SpecificationsCommand::List { search, limit } => {
            let specs = client
                .specifications()
                .query(SpecificationFilter {
                    search,
                    limit: Some(limit),
                    ..Default::default()
                })
                .await?;
            if ctx.json_output {
                return ctx.print_json(&specs);
            }

            let dim = Style::new().dim();
            if specs.is_empty() {
                println!("{}", dim.apply_to("No specifications found."));
                return Ok(());
            }
            print_header(&format!("Specifications ({})", specs.len()));
            for spec in &specs {
                println!(
                    "{}  {}  {}",
                    dim.apply_to(&spec.id),
                    truncate(&spec.name, 40),
                    dim.apply_to(model_label(spec))
                );
            }
        }
        SpecificationsCommand::Get { id } => {
            let spec = client.specifications().get(&id).await?;
            if ctx.json_output {
                return ctx.print_json(&spec);
            }
            print_specification(&spec);
        }
    }

    Ok(())
}

/// `service/model` for display.
fn model_label(spec: &Specification) -> String {
    let service = spec
        .service_type
        .map(|s| format!("{:?}", s).to_lowercase())
        .unwrap_or_else(|| "-".to_string());
    match spec.model_properties().and_then(|p| p.model.as_deref()) {
        Some(model) => format!("{}/{}", service, model),
        None => service,
    }
}

fn print_specification(spec: &Specification) {
    let dim = Style::new().dim();
    print_header(&spec.name);
    println!("ID:       {}", spec.id);
    println!("State:    {}", state_label(spec.state));
    println!("Model:    {}", model_label(spec));

    if let Some(props) = spec.model_properties() {
        if let Some(t) = props.temperature {
            println!("Temp:     {}", t);
        }
        if let Some(limit) = props.completion_token_limit {
            println!("Tokens:   {}", limit);
        }
        if props.enable_thinking == Some(true) {
            let budget = props
                .thinking_token_limit
                .map(|b| b.to_string())
                .unwrap_or_else(|| "default".to_string());
            println!("Thinking: {}", budget);
        }
    }

    if let Some(ref prompt) = spec.system_prompt {
        println!();
        println!("{}", dim.apply_to("System prompt:"));
        println!("{}", prompt);
    }
}
