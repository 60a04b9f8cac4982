use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::password::{hash_password, verify_dummy, verify_password},
    state::AppState,
    users::{
        error::{
            PasswordPolicyViolation, StoreError, TokenError, UpdateError, UserError, UserResult,
            VerifyError,
        },
        notify::VerificationMailer,
        policy::{
            generate_nickname, is_valid_email, is_valid_name, is_valid_nickname, is_valid_url,
            normalize_email, PasswordPolicy,
        },
        repo::{first_conflict, UserStore},
        repo_types::{NewUser, ProfileChanges, Role, User, UserFilter},
        tokens::VerificationTokens,
    },
};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;
const NICKNAME_ATTEMPTS: usize = 5;

/// Clamps client paging: negative skip becomes 0, a non-positive limit the
/// default, and limits above `MAX_PAGE_SIZE` are capped.
pub fn page_bounds(skip: i64, limit: i64) -> (i64, i64) {
    let limit = match limit {
        l if l <= 0 => DEFAULT_PAGE_SIZE,
        l => l.min(MAX_PAGE_SIZE),
    };
    (skip.max(0), limit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
}

/// Input for `register`. `nickname` is generated when absent.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub nickname: Option<String>,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Account rules and lifecycle transitions.
///
/// Holds no state of its own; build one per request from the collaborators.
pub struct AccountService<'a> {
    store: &'a dyn UserStore,
    tokens: &'a dyn VerificationTokens,
    mailer: &'a dyn VerificationMailer,
    policy: &'a PasswordPolicy,
    max_login_attempts: i32,
    base_url: &'a str,
}

impl<'a> AccountService<'a> {
    pub fn new(
        store: &'a dyn UserStore,
        tokens: &'a dyn VerificationTokens,
        mailer: &'a dyn VerificationMailer,
        policy: &'a PasswordPolicy,
        max_login_attempts: i32,
        base_url: &'a str,
    ) -> Self {
        Self {
            store,
            tokens,
            mailer,
            policy,
            max_login_attempts,
            base_url,
        }
    }

    pub fn from_state(state: &'a AppState) -> Self {
        Self::new(
            state.users.as_ref(),
            state.tokens.as_ref(),
            state.mailer.as_ref(),
            &state.config.password_policy,
            state.config.max_login_attempts,
            &state.config.server_base_url,
        )
    }

    pub fn validate_password(&self, candidate: &str) -> Result<(), PasswordPolicyViolation> {
        self.policy.validate_password(candidate)
    }

    /// Fails when another record (not `excluding`) holds `email` or
    /// `nickname`. This is a pre-check; the store's write is authoritative.
    pub async fn check_uniqueness(
        &self,
        email: Option<&str>,
        nickname: Option<&str>,
        excluding: Option<Uuid>,
    ) -> Result<(), StoreError> {
        if email.is_none() && nickname.is_none() {
            return Ok(());
        }
        let others: Vec<User> = self
            .store
            .find_by_email_or_nickname(email, nickname)
            .await?
            .into_iter()
            .filter(|u| Some(u.id) != excluding)
            .collect();
        match first_conflict(&others, email, nickname) {
            Some(conflict) => Err(conflict.into()),
            None => Ok(()),
        }
    }

    async fn pick_nickname(&self, requested: Option<String>) -> UserResult<String> {
        if let Some(nickname) = requested {
            let nickname = nickname.trim().to_string();
            if !is_valid_nickname(&nickname) {
                return Err(UserError::Validation("invalid nickname".into()));
            }
            return Ok(nickname);
        }
        for _ in 0..NICKNAME_ATTEMPTS {
            let candidate = generate_nickname();
            if self.check_uniqueness(None, Some(&candidate), None).await.is_ok() {
                return Ok(candidate);
            }
        }
        Err(UserError::Internal("could not generate a free nickname".into()))
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: Registration) -> UserResult<User> {
        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            warn!("invalid email");
            return Err(UserError::Validation("invalid email".into()));
        }
        for (field, name) in [("first_name", &input.first_name), ("last_name", &input.last_name)] {
            if name.as_deref().is_some_and(|n| !is_valid_name(n)) {
                return Err(UserError::Validation(format!("invalid {}", field)));
            }
        }
        let nickname = self.pick_nickname(input.nickname).await?;
        let password = self.policy.accept(&input.password)?;

        self.check_uniqueness(Some(&email), Some(&nickname), None)
            .await?;

        let password_hash = hash_password(password)?;
        let user = self
            .store
            .create(NewUser {
                email,
                nickname,
                first_name: input.first_name,
                last_name: input.last_name,
                password_hash,
                role: Role::Anonymous,
            })
            .await?;
        info!(user_id = %user.id, nickname = %user.nickname, "user registered");

        self.send_verification(&user).await;
        Ok(user)
    }

    /// Account created by an admin on someone's behalf. Goes through the
    /// same checks and verification mail as `register`.
    #[instrument(skip(self, input))]
    pub async fn create_user(&self, actor: Role, input: Registration) -> UserResult<User> {
        if !actor.may_create_users() {
            warn!(%actor, "user creation denied");
            return Err(UserError::Forbidden);
        }
        self.register(input).await
    }

    /// Loads `user_id` and fails with `Forbidden` unless `actor` may act on it.
    async fn administered(&self, actor: Role, user_id: Uuid) -> UserResult<User> {
        let user = self.get(user_id).await?;
        if !actor.may_administer(user.role) {
            warn!(%actor, target = %user.role, user_id = %user.id, "account administration denied");
            return Err(UserError::Forbidden);
        }
        Ok(user)
    }

    /// Delivery failures are logged; the user can ask for a resend.
    async fn send_verification(&self, user: &User) {
        let token = match self.tokens.issue(user.id) {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, user_id = %user.id, "issue verification token failed");
                return;
            }
        };
        let link = format!(
            "{}/api/v1/verify-email/{}/{}",
            self.base_url.trim_end_matches('/'),
            user.id,
            token
        );
        if let Err(e) = self.mailer.send_verification(user, &link).await {
            error!(error = %e, user_id = %user.id, "send verification failed");
        }
    }

    #[instrument(skip(self))]
    pub async fn resend_verification(&self, actor: Role, user_id: Uuid) -> UserResult<()> {
        let user = self.administered(actor, user_id).await?;
        if user.is_verified() {
            return Err(UserError::AlreadyVerified);
        }
        self.send_verification(&user).await;
        Ok(())
    }

    /// UNVERIFIED -> VERIFIED exactly once. Replays return
    /// `AlreadyVerified` and write nothing.
    #[instrument(skip(self, token))]
    pub async fn verify_email_with_token(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<VerificationOutcome, VerifyError> {
        let token_user = self.tokens.validate(token).map_err(|e| {
            warn!(error = %e, "verification token rejected");
            e
        })?;
        if token_user != user_id {
            warn!(%token_user, "verification token issued for another user");
            return Err(TokenError::Invalid.into());
        }

        let user = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(VerifyError::NotFound(user_id))?;
        if user.is_verified() {
            return Ok(VerificationOutcome::AlreadyVerified);
        }

        match self.store.mark_verified(user_id).await? {
            Some(verified) => {
                info!(role = %verified.role, "email verified");
                Ok(VerificationOutcome::Verified)
            }
            // lost a race with a concurrent verification
            None => match self.store.find_by_id(user_id).await? {
                Some(u) if u.is_verified() => Ok(VerificationOutcome::AlreadyVerified),
                _ => Err(VerifyError::NotFound(user_id)),
            },
        }
    }

    fn normalize_changes(mut changes: ProfileChanges) -> Result<ProfileChanges, UpdateError> {
        if let Some(email) = changes.email.as_mut() {
            *email = normalize_email(email);
            if !is_valid_email(email) {
                return Err(UpdateError::InvalidField { field: "email" });
            }
        }
        if let Some(nickname) = changes.nickname.as_mut() {
            *nickname = nickname.trim().to_string();
            if !is_valid_nickname(nickname) {
                return Err(UpdateError::InvalidField { field: "nickname" });
            }
        }
        let names = [("first_name", &changes.first_name), ("last_name", &changes.last_name)];
        for (field, name) in names {
            if name.as_deref().is_some_and(|n| !is_valid_name(n)) {
                return Err(UpdateError::InvalidField { field });
            }
        }
        let urls = [
            ("profile_picture_url", &changes.profile_picture_url),
            ("linkedin_profile_url", &changes.linkedin_profile_url),
            ("github_profile_url", &changes.github_profile_url),
        ];
        for (field, url) in urls {
            if let Some(url) = url {
                if !is_valid_url(url) {
                    return Err(UpdateError::InvalidField { field });
                }
            }
        }
        Ok(changes)
    }

    /// Uniqueness is re-checked only for an email/nickname that differs
    /// from the stored value.
    #[instrument(skip(self, changes))]
    pub async fn apply_profile_update(
        &self,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, UpdateError> {
        if changes.is_empty() {
            return Err(UpdateError::NoChanges);
        }
        let mut changes = Self::normalize_changes(changes)?;

        let current = self
            .store
            .find_by_id(user_id)
            .await?
            .ok_or(UpdateError::NotFound(user_id))?;

        if changes.email.as_deref() == Some(current.email.as_str()) {
            changes.email = None;
        }
        if changes.nickname.as_deref() == Some(current.nickname.as_str()) {
            changes.nickname = None;
        }
        if changes.is_empty() {
            return Ok(current);
        }

        self.check_uniqueness(
            changes.email.as_deref(),
            changes.nickname.as_deref(),
            Some(user_id),
        )
        .await?;

        let updated = self.store.update_profile(user_id, &changes).await?;
        info!("profile updated");
        Ok(updated)
    }

    /// Profile update on another user's account.
    #[instrument(skip(self, changes))]
    pub async fn update_user(
        &self,
        actor: Role,
        user_id: Uuid,
        changes: ProfileChanges,
    ) -> UserResult<User> {
        self.administered(actor, user_id).await?;
        Ok(self.apply_profile_update(user_id, changes).await?)
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> UserResult<User> {
        let email = normalize_email(email);
        let user = match self.store.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                verify_dummy(password);
                warn!(%email, "login unknown email");
                return Err(UserError::InvalidCredentials);
            }
        };

        if !user.is_verified() {
            warn!(user_id = %user.id, "login before verification");
            return Err(UserError::EmailNotVerified);
        }
        if user.is_locked {
            warn!(user_id = %user.id, "login on locked account");
            return Err(UserError::AccountLocked);
        }

        if !verify_password(password, &user.password_hash)? {
            let after = self
                .store
                .record_login_failure(user.id, self.max_login_attempts)
                .await?;
            if after.is_locked {
                warn!(user_id = %user.id, attempts = after.failed_login_attempts, "account locked");
            } else {
                warn!(user_id = %user.id, "login invalid password");
            }
            return Err(UserError::InvalidCredentials);
        }

        let user = self.store.record_login_success(user.id).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(user)
    }

    pub async fn get(&self, user_id: Uuid) -> UserResult<User> {
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound(user_id))
    }

    /// Returns `false` when the account was not locked.
    #[instrument(skip(self))]
    pub async fn unlock_account(&self, actor: Role, user_id: Uuid) -> UserResult<bool> {
        self.administered(actor, user_id).await?;
        let unlocked = self.store.unlock(user_id).await?;
        if unlocked {
            info!("account unlocked");
        }
        Ok(unlocked)
    }

    #[instrument(skip(self, new_password))]
    pub async fn reset_password(
        &self,
        actor: Role,
        user_id: Uuid,
        new_password: &str,
    ) -> UserResult<()> {
        self.administered(actor, user_id).await?;
        let password = self.policy.accept(new_password)?;
        let hash = hash_password(password)?;
        self.store.reset_password(user_id, &hash).await?;
        info!("password reset");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn change_role(&self, actor: Role, user_id: Uuid, new_role: Role) -> UserResult<User> {
        let user = self.get(user_id).await?;
        if !actor.may_assign(user.role, new_role) {
            warn!(%actor, from = %user.role, to = %new_role, "role change denied");
            return Err(UserError::Forbidden);
        }
        let updated = self.store.set_role(user_id, new_role).await?;
        info!(from = %user.role, to = %new_role, "role changed");
        Ok(updated)
    }

    /// Returns the page and the total number of matches.
    pub async fn search(&self, mut filter: UserFilter) -> UserResult<(Vec<User>, i64)> {
        (filter.skip, filter.limit) = page_bounds(filter.skip, filter.limit);
        let total = self.store.count(&filter).await?;
        let users = self.store.search(&filter).await?;
        Ok((users, total))
    }

    pub async fn list(&self, skip: i64, limit: i64) -> UserResult<(Vec<User>, i64)> {
        self.search(UserFilter {
            skip,
            limit,
            ..Default::default()
        })
        .await
    }
}
