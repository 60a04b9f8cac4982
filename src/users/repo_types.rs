use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. Stored as the Postgres enum `user_role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Anonymous,
    Authenticated,
    Manager,
    Admin,
}

impl Role {
    /// Role held after the first successful email verification.
    pub fn after_verification(self) -> Role {
        match self {
            Role::Anonymous => Role::Authenticated,
            other => other,
        }
    }

    /// Whether this role may list, search and administer other accounts.
    pub fn can_manage_users(self) -> bool {
        matches!(self, Role::Manager | Role::Admin)
    }

    /// May an actor holding `self` change the account of a user holding
    /// `target` (profile, password, lock, verification mail)?
    pub fn may_administer(self, target: Role) -> bool {
        match self {
            Role::Admin => true,
            Role::Manager => matches!(target, Role::Anonymous | Role::Authenticated),
            Role::Anonymous | Role::Authenticated => false,
        }
    }

    /// Role assignment table: may an actor holding `self` move a user
    /// currently holding `from` to `to`?
    pub fn may_assign(self, from: Role, to: Role) -> bool {
        self.may_administer(from) && self.may_administer(to)
    }

    /// Only admins create accounts on someone else's behalf.
    pub fn may_create_users(self) -> bool {
        self == Role::Admin
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Anonymous => "ANONYMOUS",
            Role::Authenticated => "AUTHENTICATED",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANONYMOUS" => Ok(Role::Anonymous),
            "AUTHENTICATED" => Ok(Role::Authenticated),
            "MANAGER" => Ok(Role::Manager),
            "ADMIN" => Ok(Role::Admin),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "verification_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Unverified,
    Verified,
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub nickname: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub linkedin_profile_url: Option<String>,
    pub github_profile_url: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string
    pub role: Role,
    pub verification_status: VerificationStatus,
    pub is_locked: bool,
    pub failed_login_attempts: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }
}

/// Insert payload. The hash must come from `password::hash_password`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub nickname: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: String,
    pub role: Role,
}

/// Partial profile update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileChanges {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub linkedin_profile_url: Option<String>,
    pub github_profile_url: Option<String>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        *self == ProfileChanges::default()
    }

    /// Copy every present field onto `user`.
    pub fn apply_to(&self, user: &mut User) {
        fn set(target: &mut String, v: &Option<String>) {
            if let Some(v) = v {
                *target = v.clone();
            }
        }
        fn set_opt(target: &mut Option<String>, v: &Option<String>) {
            if v.is_some() {
                *target = v.clone();
            }
        }
        set(&mut user.email, &self.email);
        set(&mut user.nickname, &self.nickname);
        set_opt(&mut user.first_name, &self.first_name);
        set_opt(&mut user.last_name, &self.last_name);
        set_opt(&mut user.bio, &self.bio);
        set_opt(&mut user.profile_picture_url, &self.profile_picture_url);
        set_opt(&mut user.linkedin_profile_url, &self.linkedin_profile_url);
        set_opt(&mut user.github_profile_url, &self.github_profile_url);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Locked,
}

/// Search filters. String filters are case-insensitive exact matches.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub account_status: Option<AccountStatus>,
    pub registered_from: Option<OffsetDateTime>,
    pub registered_to: Option<OffsetDateTime>,
    pub skip: i64,
    pub limit: i64,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        fn eq_ci(want: &Option<String>, have: Option<&str>) -> bool {
            match want {
                None => true,
                Some(w) => have.map_or(false, |h| h.to_lowercase() == w.to_lowercase()),
            }
        }
        eq_ci(&self.nickname, Some(&user.nickname))
            && eq_ci(&self.email, Some(&user.email))
            && eq_ci(&self.first_name, user.first_name.as_deref())
            && eq_ci(&self.last_name, user.last_name.as_deref())
            && self.role.map_or(true, |r| r == user.role)
            && self.account_status.map_or(true, |s| match s {
                AccountStatus::Active => !user.is_locked,
                AccountStatus::Locked => user.is_locked,
            })
            && self.registered_from.map_or(true, |from| user.created_at >= from)
            && self.registered_to.map_or(true, |to| user.created_at <= to)
    }
}
