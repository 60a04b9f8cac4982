use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::{
    repo_types::{AccountStatus, Role, User, UserFilter},
    services::{Registration, VerificationOutcome, DEFAULT_PAGE_SIZE},
};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<RegisterRequest> for Registration {
    fn from(r: RegisterRequest) -> Self {
        Self {
            email: r.email,
            nickname: r.nickname,
            password: r.password,
            first_name: r.first_name,
            last_name: r.last_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct VerificationResponse {
    pub status: VerificationOutcome,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub unlocked: bool,
}

/// Public view of a user returned to clients.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub linkedin_profile_url: Option<String>,
    pub github_profile_url: Option<String>,
    pub role: Role,
    pub email_verified: bool,
    pub account_status: &'static str,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub registration_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        let email_verified = u.is_verified();
        Self {
            id: u.id,
            email: u.email,
            nickname: u.nickname,
            first_name: u.first_name,
            last_name: u.last_name,
            bio: u.bio,
            profile_picture_url: u.profile_picture_url,
            linkedin_profile_url: u.linkedin_profile_url,
            github_profile_url: u.github_profile_url,
            role: u.role,
            email_verified,
            account_status: if u.is_locked { "Locked" } else { "Active" },
            last_login_at: u.last_login_at,
            registration_date: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub items: Vec<UserResponse>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub account_status: Option<AccountStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub registration_date_from: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub registration_date_to: Option<OffsetDateTime>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

impl From<SearchQuery> for UserFilter {
    fn from(q: SearchQuery) -> Self {
        Self {
            nickname: q.username,
            email: q.email,
            first_name: q.first_name,
            last_name: q.last_name,
            role: q.role,
            account_status: q.account_status,
            registered_from: q.registration_date_from,
            registered_to: q.registration_date_to,
            skip: q.skip,
            limit: q.limit,
        }
    }
}
