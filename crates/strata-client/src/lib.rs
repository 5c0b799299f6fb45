//! GraphQL client SDK for the Strata knowledge platform.
//!
//! # Example
//!
//! ```no_run
//! use strata_client::{ContentFilter, StrataClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = StrataClient::builder()
//!     .api_uri("https://data-scus.strata.dev/api/v1/graphql")
//!     .organization_id("org")
//!     .environment_id("env")
//!     .jwt_secret("secret")
//!     .build()?;
//!
//! let content = client
//!     .contents()
//!     .ingest_uri("https://example.com/report.pdf", None, None, true)
//!     .await?;
//! println!("Ingested {}", content.id);
//!
//! let recent = client.contents().query(ContentFilter {
//!     limit: Some(10),
//!     ..Default::default()
//! }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # API Coverage
//!
//! - **Contents**: ingest, query, update, delete, completion polling
//! - **Feeds**: CRUD and read status
//! - **Workflows**: CRUD
//! - **Specifications**: CRUD and per-provider model settings
//! - **Conversations**: CRUD, server-side prompting, tool continuation,
//!   prompt formatting and completion recording

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod graphql;
pub mod retry;
pub mod types;

pub use api::PromptRequest;
pub use auth::{Credentials, JwtSigner};
pub use client::{ClientBuilder, StrataClient};
pub use error::{Error, Result};
pub use graphql::GraphQlError;
pub use retry::RetryConfig;
pub use types::*;
