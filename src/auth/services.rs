use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use super::{
    error::AuthError,
    jwt::TokenService,
    password::{hash_password, verify_password},
    repo::UserStore,
    repo_types::{NewUser, User},
};

const MAX_NICKNAME_CHARS: usize = 30;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // verified against when the email is unknown so both login failures cost the same
    static ref DUMMY_HASH: Option<String> = hash_password("not-a-real-password").ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Signup and login on top of a user store and a token service.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    /// Registers a user. Issues no token.
    #[instrument(skip(self, raw_password))]
    pub async fn signup(
        &self,
        email: &str,
        raw_password: &str,
        nickname: &str,
    ) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let nickname = nickname.trim();

        if !is_valid_email(&email) {
            warn!("invalid email");
            return Err(AuthError::Validation("invalid email".into()));
        }
        if raw_password.is_empty() {
            return Err(AuthError::Validation("password is required".into()));
        }
        if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_CHARS {
            return Err(AuthError::Validation(format!(
                "nickname must be 1 to {MAX_NICKNAME_CHARS} characters"
            )));
        }

        // fast path; the store's unique constraint is authoritative
        if self.users.find_by_email(&email).await?.is_some() {
            warn!("email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let hash = hash_password(raw_password)?;
        let user = self
            .users
            .save(NewUser::new(email, hash, nickname.to_string()))
            .await?;

        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    /// Returns a signed token for valid credentials.
    #[instrument(skip(self, raw_password))]
    pub async fn login(&self, email: &str, raw_password: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);

        let user = match self.users.find_by_email(&email).await? {
            Some(u) => u,
            None => {
                if let Some(hash) = DUMMY_HASH.as_ref() {
                    let _ = verify_password(raw_password, hash);
                }
                warn!("login unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if !verify_password(raw_password, &user.password_hash) {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user.email)?;
        debug!(user_id = %user.id, "user logged in");
        Ok(token)
    }
}
