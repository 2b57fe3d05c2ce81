//! Client-side validation of the bearer token used for the realtime socket.
//!
//! The client cannot verify the signature (it does not hold the key), but it
//! can refuse tokens that are structurally broken, expired, or lack an
//! identity before opening a socket the server would reject anyway.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rentline_shared::EntityId;
use serde::Deserialize;

use crate::error::CredentialError;

/// Claims the backend puts the user identity under, in lookup order.
const IDENTITY_CLAIMS: [&str; 4] = ["sub", "id", "userId", "user_id"];

#[derive(Debug, Deserialize)]
struct Claims {
    // Optional here so a missing `exp` surfaces as a missing claim rather
    // than a decode failure.
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    sub: Option<EntityId>,
    #[serde(default)]
    id: Option<EntityId>,
    #[serde(default, rename = "userId")]
    user_id_camel: Option<EntityId>,
    #[serde(default)]
    user_id: Option<EntityId>,
}

impl Claims {
    fn identity(self) -> Option<EntityId> {
        [self.sub, self.id, self.user_id_camel, self.user_id]
            .into_iter()
            .flatten()
            .find(|id| !id.as_str().is_empty())
    }
}

/// A token that passed structural and temporal checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    identity: EntityId,
    expires_at: DateTime<Utc>,
}

impl Credential {
    /// Validate `raw`, accepting an optional `Bearer ` prefix.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let token = raw.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(CredentialError::Malformed("token is empty".to_string()));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
        let exp = data
            .claims
            .exp
            .ok_or_else(|| CredentialError::MissingClaim("exp".to_string()))?;
        let identity = data
            .claims
            .identity()
            .ok_or_else(|| CredentialError::MissingClaim(IDENTITY_CLAIMS[0].to_string()))?;
        let expires_at = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| CredentialError::Malformed(format!("exp {exp} is out of range")))?;

        Ok(Self {
            token: token.to_string(),
            identity,
            expires_at,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn identity(&self) -> &EntityId {
        &self.identity
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
