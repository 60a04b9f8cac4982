use jsonwebtoken::errors::ErrorKind;
use uuid::Uuid;

use crate::auth::jwt::{JwtKeys, TokenKind};
use crate::users::error::TokenError;

/// Token collaborator: issues and validates email-verification tokens.
pub trait VerificationTokens: Send + Sync {
    fn issue(&self, user_id: Uuid) -> anyhow::Result<String>;

    /// The user the token was issued for.
    fn validate(&self, token: &str) -> Result<Uuid, TokenError>;
}

/// Signed, expiring JWTs of kind `email_verification`, sharing the
/// access-token keys. Access tokens are not accepted here.
#[derive(Clone)]
pub struct JwtVerificationTokens {
    keys: JwtKeys,
}

impl JwtVerificationTokens {
    pub fn new(keys: JwtKeys) -> Self {
        Self { keys }
    }
}

impl VerificationTokens for JwtVerificationTokens {
    fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.keys.sign_verification(user_id)
    }

    fn validate(&self, token: &str) -> Result<Uuid, TokenError> {
        let claims = self.keys.verify(token).map_err(|e| {
            match e
                .downcast_ref::<jsonwebtoken::errors::Error>()
                .map(|e| e.kind())
            {
                Some(ErrorKind::ExpiredSignature) => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;
        if claims.kind != TokenKind::EmailVerification {
            return Err(TokenError::Invalid);
        }
        Ok(claims.sub)
    }
}
