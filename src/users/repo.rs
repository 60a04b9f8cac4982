use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::users::error::{StoreError, UniqueField, UniquenessConflict};
use crate::users::repo_types::{NewUser, ProfileChanges, Role, User, UserFilter};

/// Persistence collaborator for user records.
///
/// Implementations must enforce email and nickname uniqueness at write
/// time and report a violation as `StoreError::Conflict`, regardless of
/// any pre-check the caller made.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Every record whose email equals `email` or whose nickname equals
    /// `nickname` (case-insensitive).
    async fn find_by_email_or_nickname(
        &self,
        email: Option<&str>,
        nickname: Option<&str>,
    ) -> Result<Vec<User>, StoreError>;

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Applies `changes` in one transaction, re-checking uniqueness of any
    /// email/nickname in `changes` against other records.
    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> Result<User, StoreError>;

    /// UNVERIFIED -> VERIFIED, promoting the role per
    /// `Role::after_verification` in the same write. `None` when the user
    /// was already verified (or does not exist); nothing is written then.
    async fn mark_verified(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn record_login_failure(&self, id: Uuid, max_attempts: i32) -> Result<User, StoreError>;

    async fn record_login_success(&self, id: Uuid) -> Result<User, StoreError>;

    /// `false` when the account was not locked.
    async fn unlock(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Replaces the hash and clears any lock.
    async fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError>;

    async fn set_role(&self, id: Uuid, role: Role) -> Result<User, StoreError>;

    async fn search(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError>;

    async fn count(&self, filter: &UserFilter) -> Result<i64, StoreError>;
}

const USER_COLUMNS: &str = "id, email, nickname, first_name, last_name, bio, \
    profile_picture_url, linkedin_profile_url, github_profile_url, password_hash, \
    role, verification_status, is_locked, failed_login_attempts, last_login_at, \
    created_at, updated_at";

/// Maps a unique index name from the migrations to the field it guards.
fn conflict_field(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "users_email_key" => Some(UniqueField::Email),
        "users_nickname_lower_key" => Some(UniqueField::Nickname),
        _ => None,
    }
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.code().as_deref() == Some("23505") {
            if let Some(field) = db.constraint().and_then(conflict_field) {
                return StoreError::Conflict(UniquenessConflict { field });
            }
        }
    }
    StoreError::Database(e)
}

/// Email wins over nickname when both collide.
pub(crate) fn first_conflict(
    others: &[User],
    email: Option<&str>,
    nickname: Option<&str>,
) -> Option<UniquenessConflict> {
    if let Some(email) = email {
        if others.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Some(UniquenessConflict {
                field: UniqueField::Email,
            });
        }
    }
    if let Some(nickname) = nickname {
        let nickname = nickname.to_lowercase();
        if others.iter().any(|u| u.nickname.to_lowercase() == nickname) {
            return Some(UniquenessConflict {
                field: UniqueField::Nickname,
            });
        }
    }
    None
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, f: &UserFilter) {
    if let Some(nickname) = &f.nickname {
        qb.push(" AND lower(nickname) = lower(").push_bind(nickname.clone()).push(")");
    }
    if let Some(email) = &f.email {
        qb.push(" AND lower(email) = lower(").push_bind(email.clone()).push(")");
    }
    if let Some(first_name) = &f.first_name {
        qb.push(" AND lower(first_name) = lower(").push_bind(first_name.clone()).push(")");
    }
    if let Some(last_name) = &f.last_name {
        qb.push(" AND lower(last_name) = lower(").push_bind(last_name.clone()).push(")");
    }
    if let Some(role) = f.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(status) = f.account_status {
        let locked = status == crate::users::repo_types::AccountStatus::Locked;
        qb.push(" AND is_locked = ").push_bind(locked);
    }
    if let Some(from) = f.registered_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = f.registered_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

/// PostgreSQL implementation backed by the `users` table.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email_or_nickname(
        &self,
        email: Option<&str>,
        nickname: Option<&str>,
    ) -> Result<Vec<User>, StoreError> {
        if email.is_none() && nickname.is_none() {
            return Ok(Vec::new());
        }
        let users = sqlx::query_as::<_, User>(&format!(
            r#"
            SELECT {}
            FROM users
            WHERE ($1::text IS NOT NULL AND email = $1)
               OR ($2::text IS NOT NULL AND lower(nickname) = lower($2))
            "#,
            USER_COLUMNS
        ))
        .bind(email)
        .bind(nickname)
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, nickname, first_name, last_name, password_hash, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.nickname)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.password_hash)
        .bind(new_user.role)
        .fetch_one(&self.db)
        .await
        .map_err(map_write_error)?;
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> Result<User, StoreError> {
        let mut tx = self.db.begin().await?;

        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            return Err(StoreError::NotFound(id));
        }

        if changes.email.is_some() || changes.nickname.is_some() {
            let others = sqlx::query_as::<_, User>(&format!(
                r#"
                SELECT {}
                FROM users
                WHERE id <> $1
                  AND (($2::text IS NOT NULL AND email = $2)
                    OR ($3::text IS NOT NULL AND lower(nickname) = lower($3)))
                "#,
                USER_COLUMNS
            ))
            .bind(id)
            .bind(&changes.email)
            .bind(&changes.nickname)
            .fetch_all(&mut *tx)
            .await?;
            if let Some(conflict) =
                first_conflict(&others, changes.email.as_deref(), changes.nickname.as_deref())
            {
                return Err(conflict.into());
            }
        }

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                nickname = COALESCE($3, nickname),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                bio = COALESCE($6, bio),
                profile_picture_url = COALESCE($7, profile_picture_url),
                linkedin_profile_url = COALESCE($8, linkedin_profile_url),
                github_profile_url = COALESCE($9, github_profile_url),
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&changes.email)
        .bind(&changes.nickname)
        .bind(&changes.first_name)
        .bind(&changes.last_name)
        .bind(&changes.bio)
        .bind(&changes.profile_picture_url)
        .bind(&changes.linkedin_profile_url)
        .bind(&changes.github_profile_url)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        tx.commit().await?;
        Ok(user)
    }

    async fn mark_verified(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET verification_status = 'VERIFIED',
                role = CASE WHEN role = $2 THEN $3 ELSE role END,
                updated_at = now()
            WHERE id = $1 AND verification_status = 'UNVERIFIED'
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(Role::Anonymous)
        .bind(Role::Anonymous.after_verification())
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn record_login_failure(&self, id: Uuid, max_attempts: i32) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET failed_login_attempts = failed_login_attempts + 1,
                is_locked = is_locked OR failed_login_attempts + 1 >= $2,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(max_attempts)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn record_login_success(&self, id: Uuid) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET failed_login_attempts = 0, last_login_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn unlock(&self, id: Uuid) -> Result<bool, StoreError> {
        let row: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET is_locked = FALSE, failed_login_attempts = 0, updated_at = now()
            WHERE id = $1 AND is_locked
            RETURNING id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.is_some())
    }

    async fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, is_locked = FALSE, failed_login_attempts = 0,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.db)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(role)
        .fetch_optional(&self.db)
        .await?
        .ok_or(StoreError::NotFound(id))
    }

    async fn search(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM users WHERE TRUE",
            USER_COLUMNS
        ));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.skip);
        let users = qb.build_query_as::<User>().fetch_all(&self.db).await?;
        Ok(users)
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users WHERE TRUE");
        push_filters(&mut qb, filter);
        let total = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok(total)
    }
}
