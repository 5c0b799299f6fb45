//! Bearer token construction.
//!
//! The platform accepts HS256 JWTs signed with the environment's secret. The
//! tenant scoping lives in a namespaced private claim.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Namespace of the private claim block.
pub const CLAIMS_NAMESPACE: &str = "https://strata.dev/jwt/claims";

/// Token issuer.
pub const TOKEN_ISSUER: &str = "strata";

/// Token audience.
pub const TOKEN_AUDIENCE: &str = "https://portal.strata.dev";

/// How long a freshly signed token is valid.
const TOKEN_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Re-sign when the cached token is this close to expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Tenant-scoping claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformClaims {
    #[serde(rename = "x-strata-environment-id")]
    pub environment_id: String,
    #[serde(rename = "x-strata-organization-id")]
    pub organization_id: String,
    #[serde(rename = "x-strata-role")]
    pub role: String,
    #[serde(rename = "x-strata-owner-id", skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(rename = "x-strata-user-id", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Full JWT claim set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "https://strata.dev/jwt/claims")]
    pub platform: PlatformClaims,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Signs and caches platform tokens.
pub struct JwtSigner {
    claims: PlatformClaims,
    key: EncodingKey,
    cached: Mutex<Option<(String, i64)>>,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("claims", &self.claims)
            .finish_non_exhaustive()
    }
}

impl JwtSigner {
    /// Create a signer for the given tenant.
    pub fn new(
        organization_id: impl Into<String>,
        environment_id: impl Into<String>,
        secret: &str,
    ) -> Self {
        Self {
            claims: PlatformClaims {
                environment_id: environment_id.into(),
                organization_id: organization_id.into(),
                role: "Owner".to_string(),
                owner_id: None,
                user_id: None,
            },
            key: EncodingKey::from_secret(secret.as_bytes()),
            cached: Mutex::new(None),
        }
    }

    /// Scope tokens to an owner.
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.claims.owner_id = Some(owner_id.into());
        self
    }

    /// Scope tokens to an end user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.claims.user_id = Some(user_id.into());
        self
    }

    /// The tenant claims this signer embeds.
    pub fn claims(&self) -> &PlatformClaims {
        &self.claims
    }

    /// Return a valid token, re-signing if the cached one is near expiry.
    pub fn token(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let mut cached = self.cached.lock();

        if let Some((token, exp)) = cached.as_ref()
            && *exp - now > REFRESH_MARGIN.as_secs() as i64
        {
            return Ok(token.clone());
        }

        let exp = now + TOKEN_LIFETIME.as_secs() as i64;
        let token = self.sign(exp)?;
        tracing::debug!(
            organization_id = %self.claims.organization_id,
            environment_id = %self.claims.environment_id,
            exp,
            "Signed platform JWT"
        );
        *cached = Some((token.clone(), exp));
        Ok(token)
    }

    fn sign(&self, exp: i64) -> Result<String> {
        let claims = Claims {
            platform: self.claims.clone(),
            exp,
            iss: TOKEN_ISSUER.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.key)?)
    }

    #[cfg(test)]
    fn force_cached(&self, token: &str, exp: i64) {
        *self.cached.lock() = Some((token.to_string(), exp));
    }
}

/// How the client authenticates.
#[derive(Debug)]
pub enum Credentials {
    /// A pre-minted token used verbatim.
    Token(String),
    /// Locally signed, auto-refreshing JWTs.
    Signed(JwtSigner),
}

impl Credentials {
    /// The bearer token to send.
    pub fn bearer(&self) -> Result<String> {
        match self {
            Credentials::Token(token) => Ok(token.clone()),
            Credentials::Signed(signer) => signer.token(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    fn decode_claims(token: &str, secret: &str) -> Claims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_ISSUER]);
        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn test_signed_token_claims() {
        let signer = JwtSigner::new("org-1", "env-1", "secret").with_owner("owner-9");
        let token = signer.token().unwrap();

        let claims = decode_claims(&token, "secret");
        assert_eq!(claims.platform.organization_id, "org-1");
        assert_eq!(claims.platform.environment_id, "env-1");
        assert_eq!(claims.platform.role, "Owner");
        assert_eq!(claims.platform.owner_id.as_deref(), Some("owner-9"));
        assert!(claims.platform.user_id.is_none());

        let lifetime = claims.exp - Utc::now().timestamp();
        assert!(lifetime > 55 * 60 && lifetime <= 60 * 60);
    }

    #[test]
    fn test_claims_namespace_in_payload() {
        let signer = JwtSigner::new("o", "e", "s").with_user("u-1");
        let token = signer.token().unwrap();
        let claims = decode_claims(&token, "s");
        let json = serde_json::to_value(&claims).unwrap();
        let block = json.get(CLAIMS_NAMESPACE).unwrap();
        assert_eq!(block["x-strata-user-id"], "u-1");
        assert!(block.get("x-strata-owner-id").is_none());
    }

    #[test]
    fn test_token_is_cached() {
        let signer = JwtSigner::new("o", "e", "s");
        let first = signer.token().unwrap();
        let second = signer.token().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_token_refreshes_near_expiry() {
        let signer = JwtSigner::new("o", "e", "s");
        let soon = Utc::now().timestamp() + 60;
        signer.force_cached("stale-token", soon);
        let token = signer.token().unwrap();
        assert_ne!(token, "stale-token");
    }

    #[test]
    fn test_wrong_secret_fails_validation() {
        let signer = JwtSigner::new("o", "e", "right");
        let token = signer.token().unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[TOKEN_AUDIENCE]);
        let result = decode::<Claims>(&token, &DecodingKey::from_secret(b"wrong"), &validation);
        assert!(result.is_err());
    }

    #[test]
    fn test_pre_minted_token_verbatim() {
        let creds = Credentials::Token("abc.def.ghi".into());
        assert_eq!(creds.bearer().unwrap(), "abc.def.ghi");
    }
}
