use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::repo_types::{NewUser, User};

const EMAIL_CONSTRAINT: &str = "users_email_key";
const NICKNAME_CONSTRAINT: &str = "users_nickname_key";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("nickname already taken")]
    DuplicateNickname,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Persistence for user records. `save` must enforce email and nickname
/// uniqueness atomically; callers only pre-check as a fast path.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn save(&self, user: NewUser) -> Result<User, StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
}

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
    /// Find a user by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, nickname, organization, bio, is_public, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    /// Insert a new user; unique constraints decide duplicates.
    async fn save(&self, user: NewUser) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, nickname, organization, bio, is_public)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, nickname, organization, bio, is_public, created_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(&user.organization)
        .bind(&user.bio)
        .bind(user.is_public)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await
            .context("count users")?;
        Ok(n as usize)
    }
}

fn map_insert_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(NICKNAME_CONSTRAINT) => StoreError::DuplicateNickname,
                Some(EMAIL_CONSTRAINT) | None => StoreError::DuplicateEmail,
                Some(other) => StoreError::Backend(anyhow::anyhow!(
                    "unexpected unique violation on {other}"
                )),
            };
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context("insert user"))
}

/// Process-local store keyed by email. Used when no database is configured.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn save(&self, user: NewUser) -> Result<User, StoreError> {
        // check and insert under one write lock
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(StoreError::DuplicateEmail);
        }
        if users.values().any(|u| u.nickname == user.nickname) {
            return Err(StoreError::DuplicateNickname);
        }
        let saved = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            nickname: user.nickname,
            organization: user.organization,
            bio: user.bio,
            is_public: user.is_public,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(saved.email.clone(), saved.clone());
        Ok(saved)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.users.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_user(email: &str, nickname: &str) -> NewUser {
        NewUser::new(email.into(), "$argon2id$fake".into(), nickname.into())
    }

    #[tokio::test]
    async fn save_assigns_id_and_defaults() {
        let store = MemoryUserStore::new();
        let saved = store.save(new_user("a@x.com", "nick")).await.expect("save");
        assert!(saved.is_public);
        assert!(saved.organization.is_none());

        let found = store
            .find_by_email("a@x.com")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(found.id, saved.id);
        assert_eq!(found.created_at, saved.created_at);
    }

    #[tokio::test]
    async fn save_rejects_duplicate_email_and_nickname() {
        let store = MemoryUserStore::new();
        store.save(new_user("a@x.com", "nick")).await.expect("save");

        let err = store.save(new_user("a@x.com", "other")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
        let err = store.save(new_user("b@x.com", "nick")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateNickname));
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn concurrent_saves_of_same_email_admit_one() {
        let store = Arc::new(MemoryUserStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save(new_user("race@x.com", &format!("nick{i}"))).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            match h.await.expect("join") {
                Ok(_) => ok += 1,
                Err(e) => assert!(matches!(e, StoreError::DuplicateEmail)),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn find_unknown_email_is_none() {
        let store = MemoryUserStore::new();
        assert!(store.find_by_email("nobody@x.com").await.expect("lookup").is_none());
    }
}
