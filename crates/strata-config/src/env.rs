//! Environment variable overrides.
//!
//! Applied after all file layers, so the environment always wins.

use crate::{PlatformConfig, ProviderSection, StrataConfig};

/// Provider names and the environment variable holding their API key.
const PROVIDER_KEYS: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("google", "GOOGLE_API_KEY"),
    ("groq", "GROQ_API_KEY"),
    ("cerebras", "CEREBRAS_API_KEY"),
    ("cohere", "COHERE_API_KEY"),
    ("mistral", "MISTRAL_API_KEY"),
    ("bedrock", "AWS_BEARER_TOKEN_BEDROCK"),
    ("deepseek", "DEEPSEEK_API_KEY"),
];

/// The API key environment variable for a provider name.
pub fn provider_env_var(provider: &str) -> Option<&'static str> {
    PROVIDER_KEYS
        .iter()
        .find(|(name, _)| *name == provider)
        .map(|(_, var)| *var)
}

/// Apply overrides from the process environment.
pub fn apply_env(config: &mut StrataConfig) {
    apply_env_with(config, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    });
}

/// Apply overrides using a custom lookup (used by tests).
pub fn apply_env_with(config: &mut StrataConfig, lookup: impl Fn(&str) -> Option<String>) {
    let platform = config.platform.get_or_insert_with(PlatformConfig::default);
    let fields: [(&str, &mut Option<String>); 7] = [
        ("STRATA_API_URI", &mut platform.api_uri),
        ("STRATA_ORGANIZATION_ID", &mut platform.organization_id),
        ("STRATA_ENVIRONMENT_ID", &mut platform.environment_id),
        ("STRATA_JWT_SECRET", &mut platform.jwt_secret),
        ("STRATA_OWNER_ID", &mut platform.owner_id),
        ("STRATA_USER_ID", &mut platform.user_id),
        ("STRATA_TOKEN", &mut platform.token),
    ];
    for (var, slot) in fields {
        if let Some(value) = lookup(var) {
            tracing::debug!(var, "config override from environment");
            *slot = Some(value);
        }
    }

    for (name, var) in PROVIDER_KEYS {
        if let Some(key) = lookup(var) {
            config
                .providers
                .entry((*name).to_string())
                .or_insert_with(ProviderSection::default)
                .api_key = Some(key);
        }
    }

    if let Some(region) = lookup("AWS_REGION")
        && let Some(bedrock) = config.providers.get_mut("bedrock")
        && bedrock.region.is_none()
    {
        bedrock.region = Some(region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_platform_overrides() {
        let mut config = StrataConfig::from_toml(
            r#"
[platform]
api_uri = "https://file/graphql"
organization_id = "org-file"
"#,
        )
        .unwrap();

        apply_env_with(
            &mut config,
            lookup_from(&[
                ("STRATA_ORGANIZATION_ID", "org-env"),
                ("STRATA_JWT_SECRET", "shh"),
            ]),
        );

        let platform = config.platform();
        assert_eq!(platform.api_uri.as_deref(), Some("https://file/graphql"));
        assert_eq!(platform.organization_id.as_deref(), Some("org-env"));
        assert_eq!(platform.jwt_secret.as_deref(), Some("shh"));
    }

    #[test]
    fn test_provider_keys_create_sections() {
        let mut config = StrataConfig::new();
        apply_env_with(
            &mut config,
            lookup_from(&[
                ("GROQ_API_KEY", "gsk"),
                ("AWS_BEARER_TOKEN_BEDROCK", "bedrock-key"),
                ("AWS_REGION", "eu-west-1"),
            ]),
        );

        assert_eq!(
            config.provider("groq").unwrap().api_key.as_deref(),
            Some("gsk")
        );
        let bedrock = config.provider("bedrock").unwrap();
        assert_eq!(bedrock.api_key.as_deref(), Some("bedrock-key"));
        assert_eq!(bedrock.region.as_deref(), Some("eu-west-1"));
        assert!(config.provider("openai").is_none());
    }

    #[test]
    fn test_region_does_not_override_file() {
        let mut config = StrataConfig::from_toml(
            r#"
[providers.bedrock]
region = "us-east-2"
"#,
        )
        .unwrap();
        apply_env_with(&mut config, lookup_from(&[("AWS_REGION", "eu-west-1")]));
        assert_eq!(
            config.provider("bedrock").unwrap().region.as_deref(),
            Some("us-east-2")
        );
    }

    #[test]
    fn test_provider_env_var() {
        assert_eq!(provider_env_var("cohere"), Some("COHERE_API_KEY"));
        assert_eq!(provider_env_var("unknown"), None);
    }
}
