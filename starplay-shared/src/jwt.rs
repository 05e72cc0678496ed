use jsonwebtoken::{self, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub jti: String,
    pub exp: i64,
    pub role: Role,
    /// Bound child profile, present for child-role tokens only.
    pub child_id: Option<String>,
    pub tenant_id: String,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token: {0}")]
    Decode(String),
    #[error("encoding failed: {0}")]
    Encode(String),
}

pub fn decode_and_verify(token: &str, secret: &[u8]) -> Result<JwtClaims, JwtError> {
    let key = DecodingKey::from_secret(secret);
    let validation = Validation::new(Algorithm::HS256);
    jsonwebtoken::decode::<JwtClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::Decode(e.to_string()))
}

pub fn encode(token: &JwtClaims, secret: &[u8]) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        token,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| JwtError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_verify_round_trips_claims() {
        let claims = JwtClaims {
            sub: "parent".into(),
            jti: "abc-123".into(),
            exp: i64::MAX,
            role: Role::Parent,
            child_id: None,
            tenant_id: "fam".into(),
        };
        let token = encode(&claims, b"secret").unwrap();
        let decoded = decode_and_verify(&token, b"secret").unwrap();
        assert_eq!(decoded.sub, "parent");
        assert_eq!(decoded.tenant_id, "fam");
        assert!(decode_and_verify(&token, b"wrong").is_err());
    }
}
