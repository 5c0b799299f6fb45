//! Configuration system for the Strata SDK.
//!
//! Provides TOML-based configuration with:
//! - Platform credentials (`[platform]`): API endpoint, organization, environment, JWT secret
//! - Transport retry policy (`[retry]`)
//! - Streaming agent defaults (`[agent]`)
//! - Direct LLM provider credentials (`[providers.<name>]`)
//! - Config file layering (user config dir + project-local overrides)
//! - Environment variable overrides applied last

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    user_config_dir, user_config_path,
};
pub use env::{apply_env, apply_env_with, provider_env_var};
pub use error::{ConfigError, Result};
pub use types::*;
