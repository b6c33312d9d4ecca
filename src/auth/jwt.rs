use std::sync::Arc;

use base64ct::{Base64, Base64Unpadded, Encoding};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::Claims;
use crate::config::{ConfigError, JwtConfig};

/// HS256 needs at least 256 bits of key material.
const MIN_SECRET_BYTES: usize = 32;
const MAX_TTL_MINUTES: i64 = 24 * 60;
const BEARER_PREFIX: &str = "Bearer ";

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues and checks signed bearer tokens. The key is fixed at construction.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<Keys>,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn from_config(cfg: &JwtConfig) -> Result<Self, ConfigError> {
        let secret = cfg.secret.trim();
        if secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        // padding is optional, as with the JDK decoder
        let bytes = Base64::decode_vec(secret)
            .or_else(|_| Base64Unpadded::decode_vec(secret))
            .map_err(|e| ConfigError::InvalidSecret(format!("not valid base64: {e}")))?;
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::InvalidSecret(format!(
                "decoded key is {} bytes, need at least {MIN_SECRET_BYTES}",
                bytes.len()
            )));
        }

        if !(1..=MAX_TTL_MINUTES).contains(&cfg.ttl_minutes) {
            return Err(ConfigError::InvalidTtl {
                minutes: cfg.ttl_minutes,
                max: MAX_TTL_MINUTES,
            });
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against our own clock in validate_at
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            keys: Arc::new(Keys {
                encoding: EncodingKey::from_secret(&bytes),
                decoding: DecodingKey::from_secret(&bytes),
            }),
            validation,
            ttl: Duration::minutes(cfg.ttl_minutes),
        })
    }

    pub fn issue(&self, subject: &str) -> anyhow::Result<String> {
        self.issue_at(subject, OffsetDateTime::now_utc())
    }

    pub fn issue_at(&self, subject: &str, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now
            .checked_add(self.ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range"))?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)?;
        debug!(exp = claims.exp, "jwt signed");
        Ok(token)
    }

    pub fn validate(&self, token: &str) -> bool {
        self.validate_at(token, OffsetDateTime::now_utc())
    }

    /// True iff the signature verifies and `now` is strictly before `exp`.
    pub fn validate_at(&self, token: &str, now: OffsetDateTime) -> bool {
        let claims = match self.decode_claims(token) {
            Some(c) => c,
            None => return false,
        };
        if now.unix_timestamp() >= claims.exp {
            debug!(exp = claims.exp, "jwt expired");
            return false;
        }
        true
    }

    /// Subject of a token whose signature verifies. Expiry is not rechecked.
    pub fn subject_of(&self, token: &str) -> Option<String> {
        self.decode_claims(token).map(|c| c.sub)
    }

    fn decode_claims(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.keys.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                warn!(error = %e, "invalid jwt");
                None
            }
        }
    }
}

/// Token part of an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: &str) -> Option<&str> {
    header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
}
