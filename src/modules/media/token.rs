use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize};

use super::model::SourceToken;
use crate::common::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
struct SourceClaims {
    src: SourceToken,
    iat: u64,
    exp: u64,
}

/// Signs and verifies [`SourceToken`]s. Holds no per-request state; the
/// token itself is the only carrier of resolution results.
#[derive(Clone)]
pub struct SourceTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl SourceTokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 5;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn encode(&self, token: &SourceToken) -> Result<String, AppError> {
        let now = get_current_timestamp();
        let claims = SourceClaims {
            src: token.clone(),
            iat: now,
            exp: now + self.ttl.as_secs(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to sign source token: {}", e)))
    }

    /// Any string that was not produced by [`Self::encode`] with the same
    /// secret is rejected as a client error.
    pub fn decode(&self, raw: &str) -> Result<SourceToken, AppError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(AppError::MissingSource);
        }

        match decode::<SourceClaims>(raw, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims.src),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AppError::SourceExpired),
                kind => {
                    tracing::debug!("rejected source token: {:?}", kind);
                    Err(AppError::InvalidSource)
                }
            },
        }
    }
}
