use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyViolation {
    #[error("password must be at least {min} characters")]
    TooShort { min: usize },
    #[error("password cannot exceed {max} characters")]
    TooLong { max: usize },
    #[error("password must contain an uppercase letter")]
    MissingUppercase,
    #[error("password must contain a lowercase letter")]
    MissingLowercase,
    #[error("password must contain a digit")]
    MissingDigit,
    #[error("password must contain a special character")]
    MissingSpecial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Nickname,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::Email => f.write_str("email"),
            UniqueField::Nickname => f.write_str("nickname"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{field} already exists")]
pub struct UniquenessConflict {
    pub field: UniqueField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid verification token")]
    Invalid,
    #[error("verification token expired")]
    Expired,
}

/// Persistence failures. A conflict here is authoritative: it comes from
/// the storage constraint, or from a pre-check against the same data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Conflict(#[from] UniquenessConflict),
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("no fields to update")]
    NoChanges,
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error("invalid {field}")]
    InvalidField { field: &'static str },
    #[error(transparent)]
    Conflict(UniquenessConflict),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for UpdateError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(c) => UpdateError::Conflict(c),
            StoreError::NotFound(id) => UpdateError::NotFound(id),
            other => UpdateError::Store(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for VerifyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => VerifyError::NotFound(id),
            other => VerifyError::Store(other),
        }
    }
}

/// HTTP-facing error for every account operation.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Password(#[from] PasswordPolicyViolation),
    #[error(transparent)]
    Conflict(#[from] UniquenessConflict),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("email address not verified")]
    EmailNotVerified,
    #[error("account locked due to too many failed login attempts")]
    AccountLocked,
    #[error("email address already verified")]
    AlreadyVerified,
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("internal error: {0}")]
    Internal(String),
}

pub type UserResult<T> = Result<T, UserError>;

impl From<StoreError> for UserError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(c) => UserError::Conflict(c),
            StoreError::NotFound(id) => UserError::NotFound(id),
            other => UserError::Internal(other.to_string()),
        }
    }
}

impl From<UpdateError> for UserError {
    fn from(e: UpdateError) -> Self {
        match e {
            UpdateError::NoChanges => UserError::Validation("no fields to update".into()),
            UpdateError::InvalidField { field } => {
                UserError::Validation(format!("invalid {}", field))
            }
            UpdateError::NotFound(id) => UserError::NotFound(id),
            UpdateError::Conflict(c) => UserError::Conflict(c),
            UpdateError::Store(s) => s.into(),
        }
    }
}

impl From<VerifyError> for UserError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Token(t) => UserError::Token(t),
            VerifyError::NotFound(id) => UserError::NotFound(id),
            VerifyError::Store(s) => s.into(),
        }
    }
}

impl From<anyhow::Error> for UserError {
    fn from(e: anyhow::Error) -> Self {
        UserError::Internal(e.to_string())
    }
}

impl UserError {
    pub fn status(&self) -> StatusCode {
        match self {
            UserError::NotFound(_) => StatusCode::NOT_FOUND,
            UserError::Password(_) | UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::Conflict(_) => StatusCode::CONFLICT,
            UserError::Token(_) | UserError::AlreadyVerified => StatusCode::BAD_REQUEST,
            UserError::InvalidCredentials
            | UserError::EmailNotVerified
            | UserError::Unauthorized => StatusCode::UNAUTHORIZED,
            UserError::AccountLocked => StatusCode::BAD_REQUEST,
            UserError::Forbidden => StatusCode::FORBIDDEN,
            UserError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            UserError::NotFound(_) => "not_found",
            UserError::Password(_) => "password_policy",
            UserError::Conflict(_) => "duplicate",
            UserError::Token(TokenError::Invalid) => "invalid_token",
            UserError::Token(TokenError::Expired) => "expired_token",
            UserError::Validation(_) => "validation_error",
            UserError::InvalidCredentials => "invalid_credentials",
            UserError::EmailNotVerified => "email_not_verified",
            UserError::AccountLocked => "account_locked",
            UserError::AlreadyVerified => "email_already_verified",
            UserError::Unauthorized => "unauthorized",
            UserError::Forbidden => "forbidden",
            UserError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for UserError {
    fn into_response(self) -> Response {
        let message = match &self {
            UserError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        (
            self.status(),
            Json(json!({
                "error": {
                    "type": self.kind(),
                    "message": message
                }
            })),
        )
            .into_response()
    }
}
