//! Ask command - one-shot question to the agent.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use console::Style;
use futures::StreamExt;
use serde_json::json;

use strata_agent::{
    Agent, AgentEvent, AgentOptions, AgentRequest, CancellationToken, ChunkingStrategy, FnTool,
    ParamExt, SmoothingOptions, ToolRegistry, ToolResult, ToolStatus,
};
use strata_client::{ContentFilter, StrataClient};
use strata_config::{AgentSection, ChunkingSetting, StrataConfig};
use strata_llm::{Provider, ProviderRegistry, ProviderSettings};

use super::Context;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question or prompt to send
    #[arg(required = true)]
    pub prompt: String,

    /// Continue an existing conversation
    #[arg(short, long)]
    pub conversation: Option<String>,

    /// Specification to run the prompt with
    #[arg(short, long)]
    pub specification: Option<String>,

    /// Override the maximum number of tool rounds
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Do not offer the content search tool
    #[arg(long)]
    pub no_tools: bool,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let client = Arc::new(ctx.client()?);
    let providers = provider_registry(&ctx.config)?;
    let dim = Style::new().dim();

    if ctx.verbose && !ctx.json_output {
        println!("{}", dim.apply_to(format!("Platform: {}", client.api_uri())));
        let mut names = providers.providers();
        names.sort();
        if !names.is_empty() {
            let names: Vec<&str> = names.iter().map(|p| p.as_str()).collect();
            println!("{}", dim.apply_to(format!("Providers: {}", names.join(", "))));
        }
        println!();
    }

    let mut tools = ToolRegistry::new();
    if !args.no_tools {
        tools.register(search_contents_tool(client.as_ref().clone()));
    }

    let agent = Agent::new(client, Arc::new(providers))
        .with_tools(tools)
        .with_options(agent_options(&ctx.config.agent(), args.max_rounds));

    let mut request = AgentRequest::new(&args.prompt);
    if let Some(id) = args.conversation {
        request = request.with_conversation(id);
    }
    if let Some(id) = args.specification {
        request = request.with_specification(id);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling run");
            on_interrupt.cancel();
        }
    });

    let mut events = agent.stream_agent(request, cancel);
    let mut printer = Printer::new(ctx.verbose);

    while let Some(event) = events.next().await {
        if ctx.json_output {
            println!("{}", serde_json::to_string(&event)?);
            if let AgentEvent::Error { message, .. } = event {
                return Err(anyhow::anyhow!(message));
            }
            continue;
        }
        printer.handle(event)?;
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

/// Build backends for every configured provider with an API key.
pub fn provider_registry(config: &StrataConfig) -> Result<ProviderRegistry> {
    let mut settings = Vec::new();
    for (name, section) in &config.providers {
        let provider: Provider = match name.parse() {
            Ok(p) => p,
            Err(_) => {
                tracing::warn!(provider = %name, "Ignoring unknown provider section");
                continue;
            }
        };
        let Some(key) = section.api_key.as_deref().filter(|k| !k.is_empty()) else {
            continue;
        };

        let mut s = ProviderSettings::new(provider, key);
        if let Some(ref url) = section.base_url {
            s = s.with_base_url(url);
        }
        if let Some(ref region) = section.region {
            s = s.with_region(region);
        }
        if let Some(secs) = section.timeout_secs {
            s = s.with_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = section.max_retries {
            s = s.with_max_retries(retries);
        }
        if let Some(strip) = section.strip_think_tags {
            s = s.with_strip_think_tags(strip);
        }
        if let Some(budget) = section.thinking_budget {
            s = s.with_thinking_budget(budget);
        }
        settings.push(s);
    }
    Ok(ProviderRegistry::from_settings(settings)?)
}

/// Agent options from the `[agent]` section.
pub fn agent_options(section: &AgentSection, max_rounds: Option<u32>) -> AgentOptions {
    let strategy = match section.chunking {
        ChunkingSetting::Character => ChunkingStrategy::Character,
        ChunkingSetting::Word => ChunkingStrategy::Word,
        ChunkingSetting::Sentence => ChunkingStrategy::Sentence,
    };
    let smoothing = if section.smoothing {
        SmoothingOptions::enabled(strategy, Duration::from_millis(section.smoothing_delay_ms))
    } else {
        SmoothingOptions {
            strategy,
            ..Default::default()
        }
    };

    AgentOptions::new()
        .with_max_tool_rounds(max_rounds.unwrap_or(section.max_tool_rounds))
        .with_max_tokens(section.max_tokens)
        .with_smoothing(smoothing)
        .with_token_stream(section.show_token_stream)
}

/// Full-text search over ingested contents.
fn search_contents_tool(client: StrataClient) -> FnTool {
    FnTool::new(
        "search_contents",
        "Search ingested contents by keyword. Returns matching content names, ids and URIs.",
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search text" },
                "limit": { "type": "integer", "description": "Maximum results (default 10)" }
            },
            "required": ["query"]
        }),
        move |params, _ctx| {
            let client = client.clone();
            async move {
                let query = params.required_str("query", "text to search for")?;
                let limit = params.optional_i64("limit", 10).clamp(1, 50) as u32;
                let contents = client
                    .contents()
                    .query(ContentFilter {
                        search: Some(query.to_string()),
                        limit: Some(limit),
                        ..Default::default()
                    })
                    .await?;
                let results: Vec<_> = contents
                    .iter()
                    .map(|c| json!({ "id": c.id, "name": c.name, "uri": c.uri }))
                    .collect();
                Ok(ToolResult::json(json!({ "results": results })))
            }
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Prints events as terminal text, writing only what is new since the last
/// update.
struct Printer {
    verbose: bool,
    printed: String,
    reasoning: String,
    line_open: bool,
}

impl Printer {
    fn new(verbose: bool) -> Self {
        Self {
            verbose,
            printed: String::new(),
            reasoning: String::new(),
            line_open: false,
        }
    }

    fn handle(&mut self, event: AgentEvent) -> Result<()> {
        let dim = Style::new().dim();
        let red = Style::new().red();

        match event {
            AgentEvent::ConversationStarted {
                conversation_id,
                model,
                ..
            } => {
                if self.verbose {
                    let model = model.unwrap_or_else(|| "platform".to_string());
                    println!(
                        "{}",
                        dim.apply_to(format!("Conversation {} ({})", conversation_id, model))
                    );
                }
            }
            AgentEvent::MessageUpdate { message, .. } => {
                self.write_text(&message)?;
            }
            AgentEvent::ReasoningUpdate {
                content,
                is_complete,
                ..
            } => {
                if self.verbose {
                    let new = suffix(&self.reasoning, &content);
                    print!("{}", dim.apply_to(new));
                    std::io::stdout().flush()?;
                    self.line_open = true;
                    self.reasoning = content;
                    if is_complete {
                        self.reasoning.clear();
                        self.end_line();
                    }
                }
            }
            AgentEvent::ToolUpdate {
                tool_call,
                status,
                error,
                ..
            } => match status {
                ToolStatus::Preparing => {}
                ToolStatus::Executing => {
                    self.end_line();
                    println!("{}", dim.apply_to(format!("[Running: {}]", tool_call.name)));
                }
                ToolStatus::Completed => println!("{}", dim.apply_to("[done]")),
                ToolStatus::Failed => {
                    let reason = error.unwrap_or_else(|| "failed".to_string());
                    println!("{}", red.apply_to(format!("[failed: {}]", reason)));
                }
            },
            AgentEvent::ConversationCompleted {
                message,
                usage,
                rounds,
            } => {
                self.write_text(&message)?;
                self.end_line();
                if self.verbose {
                    println!(
                        "{}",
                        dim.apply_to(format!(
                            "{} rounds, {} input / {} output tokens",
                            rounds, usage.input_tokens, usage.output_tokens
                        ))
                    );
                }
            }
            AgentEvent::Error { message, code, .. } => {
                self.end_line();
                let label = match code {
                    Some(code) => format!("Error ({}):", code),
                    None => "Error:".to_string(),
                };
                eprintln!("{} {}", red.apply_to(label), message);
                return Err(anyhow::anyhow!(message));
            }
        }
        Ok(())
    }

    fn write_text(&mut self, message: &str) -> Result<()> {
        let new = suffix(&self.printed, message);
        if !new.is_empty() {
            print!("{}", new);
            std::io::stdout().flush()?;
            self.line_open = true;
        }
        self.printed = message.to_string();
        Ok(())
    }

    fn end_line(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

/// The part of `current` not yet shown, given `shown` was printed before.
fn suffix<'a>(shown: &str, current: &'a str) -> &'a str {
    match current.strip_prefix(shown) {
        Some(rest) => rest,
        None => current,
    }
}
