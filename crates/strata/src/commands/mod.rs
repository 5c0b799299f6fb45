//! CLI command handlers.

pub mod ask;
pub mod contents;
pub mod conversations;
pub mod feeds;
pub mod specifications;
pub mod workflows;

use anyhow::Result;
use console::{Style, style};
use serde::Serialize;
use std::time::Duration;

use strata_client::{DeletedEntity, EntityState, RetryConfig, StrataClient};
use strata_config::StrataConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration with environment overrides applied.
    pub config: StrataConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build a platform client from the `[platform]` and `[retry]` sections.
    pub fn client(&self) -> Result<StrataClient> {
        let platform = self.config.platform();
        let retry = self.config.retry();

        let mut builder = StrataClient::builder()
            .api_uri(platform.require_api_uri()?)
            .retry(RetryConfig {
                max_attempts: retry.max_attempts,
                initial_delay: Duration::from_millis(retry.initial_delay_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
                jitter: retry.jitter,
                retryable_status_codes: retry.retryable_status_codes,
            });

        if let Some(token) = platform.token {
            builder = builder.token(token);
        }
        if let Some(id) = platform.organization_id {
            builder = builder.organization_id(id);
        }
        if let Some(id) = platform.environment_id {
            builder = builder.environment_id(id);
        }
        if let Some(secret) = platform.jwt_secret {
            builder = builder.jwt_secret(secret);
        }
        if let Some(id) = platform.owner_id {
            builder = builder.owner_id(id);
        }
        if let Some(id) = platform.user_id {
            builder = builder.user_id(id);
        }
        if let Some(secs) = platform.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(builder.build()?)
    }

    /// Print `value` as pretty JSON.
    pub fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

pub fn print_header(title: &str) {
    println!("{}", style(title).bold());
    println!("{}", Style::new().dim().apply_to("─".repeat(50)));
}

pub fn print_deleted(ctx: &Context, kind: &str, deleted: &DeletedEntity) -> Result<()> {
    if ctx.json_output {
        return ctx.print_json(deleted);
    }
    println!(
        "{} Deleted {} {}",
        Style::new().green().apply_to("✓"),
        kind,
        Style::new().dim().apply_to(&deleted.id)
    );
    Ok(())
}

pub fn state_label(state: Option<EntityState>) -> String {
    let label = match state {
        Some(state) => format!("{:?}", state).to_lowercase(),
        None => "-".to_string(),
    };
    match state {
        Some(EntityState::Errored) => Style::new().red().apply_to(label).to_string(),
        Some(EntityState::Finished | EntityState::Enabled) => {
            Style::new().green().apply_to(label).to_string()
        }
        _ => Style::new().dim().apply_to(label).to_string(),
    }
}

pub fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 8), "line ...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn test_client_requires_api_uri() {
        let ctx = Context {
            config: StrataConfig::new(),
            json_output: false,
            verbose: false,
        };
        let err = ctx.client().unwrap_err();
        assert!(err.to_string().contains("api_uri"));
    }

    #[test]
    fn test_client_from_config() {
        let config = StrataConfig::from_toml(
            r#"
[platform]
api_uri = "https://data.strata.dev/api/v1/graphql"
token = "pre-minted"

[retry]
max_attempts = 2
"#,
        )
        .unwrap();
        let ctx = Context {
            config,
            json_output: false,
            verbose: false,
        };
        let client = ctx.client().unwrap();
        assert_eq!(client.retry_config().max_attempts, 2);
        assert_eq!(client.api_uri().host_str(), Some("data.strata.dev"));
    }
}
