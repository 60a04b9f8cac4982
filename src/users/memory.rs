use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::error::StoreError;
use crate::users::repo::{first_conflict, UserStore};
use crate::users::repo_types::{
    NewUser, ProfileChanges, Role, User, UserFilter, VerificationStatus,
};

/// In-memory `UserStore` used by the test suites.
/// Uniqueness checks and writes happen under a single write lock.
#[derive(Debug, Default, Clone)]
pub struct MemoryUserStore {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_matches(users: &HashMap<Uuid, User>, filter: &UserFilter) -> Vec<User> {
        let mut found: Vec<User> = users.values().filter(|u| filter.matches(u)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        found
    }

    async fn modify<F>(&self, id: Uuid, f: F) -> Result<User, StoreError>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        let user = users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_email_or_nickname(
        &self,
        email: Option<&str>,
        nickname: Option<&str>,
    ) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        let nickname = nickname.map(str::to_lowercase);
        Ok(users
            .values()
            .filter(|u| {
                email.map_or(false, |e| u.email == e)
                    || nickname
                        .as_deref()
                        .map_or(false, |n| u.nickname.to_lowercase() == n)
            })
            .cloned()
            .collect())
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        let existing: Vec<User> = users.values().cloned().collect();
        if let Some(conflict) =
            first_conflict(&existing, Some(&new_user.email), Some(&new_user.nickname))
        {
            return Err(conflict.into());
        }

        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            nickname: new_user.nickname,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            bio: None,
            profile_picture_url: None,
            linkedin_profile_url: None,
            github_profile_url: None,
            password_hash: new_user.password_hash,
            role: new_user.role,
            verification_status: VerificationStatus::Unverified,
            is_locked: false,
            failed_login_attempts: 0,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, changes: &ProfileChanges) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if !users.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let others: Vec<User> = users.values().filter(|u| u.id != id).cloned().collect();
        if let Some(conflict) =
            first_conflict(&others, changes.email.as_deref(), changes.nickname.as_deref())
        {
            return Err(conflict.into());
        }
        let user = users.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        changes.apply_to(user);
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn mark_verified(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if !user.is_verified() => {
                user.verification_status = VerificationStatus::Verified;
                user.role = user.role.after_verification();
                user.updated_at = OffsetDateTime::now_utc();
                Ok(Some(user.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn record_login_failure(&self, id: Uuid, max_attempts: i32) -> Result<User, StoreError> {
        self.modify(id, |u| {
            u.failed_login_attempts += 1;
            if u.failed_login_attempts >= max_attempts {
                u.is_locked = true;
            }
        })
        .await
    }

    async fn record_login_success(&self, id: Uuid) -> Result<User, StoreError> {
        self.modify(id, |u| {
            u.failed_login_attempts = 0;
            u.last_login_at = Some(OffsetDateTime::now_utc());
        })
        .await
    }

    async fn unlock(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.is_locked => {
                user.is_locked = false;
                user.failed_login_attempts = 0;
                user.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let hash = password_hash.to_string();
        self.modify(id, move |u| {
            u.password_hash = hash;
            u.is_locked = false;
            u.failed_login_attempts = 0;
        })
        .await
        .map(|_| ())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<User, StoreError> {
        self.modify(id, |u| u.role = role).await
    }

    async fn search(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        Ok(Self::sorted_matches(&users, filter)
            .into_iter()
            .skip(filter.skip.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn count(&self, filter: &UserFilter) -> Result<i64, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| filter.matches(u)).count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::error::{UniqueField, UniquenessConflict};

    fn new_user(email: &str, nickname: &str) -> NewUser {
        NewUser {
            email: email.into(),
            nickname: nickname.into(),
            first_name: None,
            last_name: None,
            password_hash: "hash".into(),
            role: Role::Anonymous,
        }
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = MemoryUserStore::new();
        let created = store.create(new_user("a@example.com", "alpha")).await.unwrap();
        assert_eq!(created.verification_status, VerificationStatus::Unverified);

        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "a@example.com");
        let by_email = store.find_by_email("a@example.com").await.unwrap();
        assert!(by_email.is_some());
        let hits = store
            .find_by_email_or_nickname(None, Some("ALPHA"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_duplicates() {
        let store = MemoryUserStore::new();
        store.create(new_user("a@example.com", "alpha")).await.unwrap();

        let err = store.create(new_user("a@example.com", "other")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(UniquenessConflict {
                field: UniqueField::Email
            })
        ));
        let err = store.create(new_user("b@example.com", "Alpha")).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict(UniquenessConflict {
                field: UniqueField::Nickname
            })
        ));
    }

    #[tokio::test]
    async fn mark_verified_only_once() {
        let store = MemoryUserStore::new();
        let u = store.create(new_user("a@example.com", "alpha")).await.unwrap();
        let first = store.mark_verified(u.id).await.unwrap();
        assert_eq!(first.map(|u| u.role), Some(Role::Authenticated));
        let second = store.mark_verified(u.id).await.unwrap();
        assert!(second.is_none());
        let stored = store.find_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Authenticated);
    }

    #[tokio::test]
    async fn mark_verified_keeps_a_granted_role() {
        let store = MemoryUserStore::new();
        let u = store.create(new_user("m@example.com", "manager")).await.unwrap();
        store.set_role(u.id, Role::Manager).await.unwrap();
        let verified = store.mark_verified(u.id).await.unwrap().unwrap();
        assert_eq!(verified.role, Role::Manager);
    }

    #[tokio::test]
    async fn login_failures_lock_and_unlock_clears() {
        let store = MemoryUserStore::new();
        let u = store.create(new_user("a@example.com", "alpha")).await.unwrap();
        store.record_login_failure(u.id, 2).await.unwrap();
        let locked = store.record_login_failure(u.id, 2).await.unwrap();
        assert!(locked.is_locked);
        assert!(store.unlock(u.id).await.unwrap());
        assert!(!store.unlock(u.id).await.unwrap());
        let after = store.find_by_id(u.id).await.unwrap().unwrap();
        assert_eq!(after.failed_login_attempts, 0);
    }

    #[tokio::test]
    async fn search_paginates_newest_first() {
        let store = MemoryUserStore::new();
        for i in 0..5 {
            store
                .create(new_user(&format!("u{}@example.com", i), &format!("user{}", i)))
                .await
                .unwrap();
        }
        let filter = UserFilter {
            skip: 1,
            limit: 2,
            ..Default::default()
        };
        assert_eq!(store.search(&filter).await.unwrap().len(), 2);
        assert_eq!(store.count(&filter).await.unwrap(), 5);
    }
}
