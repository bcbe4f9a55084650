use std::fmt;

use chrono::{TimeDelta, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, TokenError};

const ALGORITHM: Algorithm = Algorithm::HS256;

/// Lifetime of verification and password reset tokens, seconds
pub const TOKEN_LIFETIME_SECS: i64 = 60 * 60 * 24;

/// Flow a token is bound to. Stored in the `aud` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAudience {
    /// Login token presented on authenticated requests
    Access,
    /// Email verification
    Verify,
    /// Password reset
    ResetPassword,
}

impl TokenAudience {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenAudience::Access => "access",
            TokenAudience::Verify => "verify",
            TokenAudience::ResetPassword => "reset_password",
        }
    }
}

impl fmt::Display for TokenAudience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login token returned by the JWT auth backend
#[derive(Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"***")
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Token's claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub aud: String,
}

impl Claims {
    /// Parses the subject as a user id
    pub fn user_id(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::Invalid("subject is not a user id".to_string()))
    }
}

pub(crate) fn generate_token(user_id: Uuid, aud: TokenAudience, expiration: TimeDelta, key: &[u8]) -> Result<String, AuthError> {
    let exp = Utc::now()
        .checked_add_signed(expiration)
        .ok_or_else(|| AuthError::Internal("token expiration is out of range".to_string()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp,
        aud: aud.as_str().to_string(),
    };

    encode(&Header::new(ALGORITHM), &claims, &EncodingKey::from_secret(key))
        .map_err(|err| AuthError::Internal(format!("couldn't generate jwt: {err}")))
}

pub(crate) fn decode_token(token: &str, aud: TokenAudience, key: &[u8]) -> Result<Claims, TokenError> {
    const BEARER_START: &str = "Bearer ";
    let token = token.strip_prefix(BEARER_START).unwrap_or(token);

    let mut validation = Validation::new(ALGORITHM);
    validation.set_audience(&[aud.as_str()]);
    validation.set_required_spec_claims(&["exp", "sub", "aud"]);

    decode::<Claims>(token, &DecodingKey::from_secret(key), &validation)
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidAudience => TokenError::Invalid(format!("aud value must be {aud}")),
            _ => TokenError::Invalid(err.to_string()),
        })
}
