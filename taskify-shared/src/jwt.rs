use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{Actor, Role};

/// Claims minted by the credential service.
///
/// `sub` is the parent id for parent tokens and the child id for child
/// tokens; `family` is always the owning parent's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub role: Role,
    pub family: String,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("inconsistent claims: {0}")]
    Claims(&'static str),
    #[error("encoding failed: {0}")]
    Encode(String),
}

impl JwtClaims {
    pub fn actor(&self) -> Result<Actor, JwtError> {
        if self.sub.trim().is_empty() || self.family.trim().is_empty() {
            return Err(JwtError::Claims("empty subject or family"));
        }
        match self.role {
            Role::Parent => {
                if self.sub != self.family {
                    return Err(JwtError::Claims("parent token must be its own family"));
                }
                Ok(Actor::Parent(self.sub.as_str().into()))
            }
            Role::Child => Ok(Actor::Child {
                child: self.sub.as_str().into(),
                family: self.family.as_str().into(),
            }),
        }
    }
}

pub fn decode_unverified(token: &str) -> Result<JwtClaims, JwtError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() < 2 {
        return Err(JwtError::Decode("invalid JWT format".into()));
    }
    let payload_b64 = parts[1];
    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|e| JwtError::Decode(format!("invalid base64 payload: {e}")))?;
    serde_json::from_slice::<JwtClaims>(&payload_bytes)
        .map_err(|e| JwtError::Decode(format!("invalid json payload: {e}")))
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(claims: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}
