use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                   // unique user ID
    pub email: String,              // unique login email
    pub password_hash: String,      // Argon2 PHC string
    pub nickname: String,           // unique display name
    pub organization: Option<String>,
    pub bio: Option<String>,
    pub is_public: bool,
    pub created_at: OffsetDateTime, // set by the store, never updated
}

/// A user that has not been persisted yet; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub nickname: String,
    pub organization: Option<String>,
    pub bio: Option<String>,
    pub is_public: bool,
}

impl NewUser {
    pub fn new(email: String, password_hash: String, nickname: String) -> Self {
        Self {
            email,
            password_hash,
            nickname,
            organization: None,
            bio: None,
            is_public: true,
        }
    }
}
