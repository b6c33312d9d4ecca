//! Per-request authentication.
//!
//! [`authenticate`] never rejects a request: it resolves an [`AuthContext`] from the
//! `Authorization` header and stores it in the request extensions. Rejection belongs to
//! [`require_auth`], which applies the public-path allow-list.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    jwt::{extract_bearer, TokenService},
    repo::UserStore,
};
use crate::state::AppState;

/// Paths reachable without an authenticated context.
pub const PUBLIC_PATHS: &[&str] = &["/users/signup", "/users/login", "/health"];

/// Who the caller is, as far as this request is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthContext {
    #[default]
    Anonymous,
    Authenticated(Identity),
}

impl AuthContext {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthContext::Authenticated(identity) => Some(identity),
            AuthContext::Anonymous => None,
        }
    }
}

/// Resolves a raw `Authorization` header value to an [`AuthContext`].
/// Every failure, including a user deleted after the token was issued, is `Anonymous`.
pub async fn resolve_context(
    tokens: &TokenService,
    users: &dyn UserStore,
    header: Option<&str>,
) -> AuthContext {
    let Some(token) = header.and_then(extract_bearer) else {
        return AuthContext::Anonymous;
    };
    if !tokens.validate(token) {
        return AuthContext::Anonymous;
    }
    let Some(email) = tokens.subject_of(token) else {
        return AuthContext::Anonymous;
    };

    match users.find_by_email(&email).await {
        Ok(Some(user)) => AuthContext::Authenticated(Identity {
            user_id: user.id,
            email: user.email,
            nickname: user.nickname,
        }),
        Ok(None) => {
            debug!("token subject has no user");
            AuthContext::Anonymous
        }
        Err(e) => {
            warn!(error = %e, "user lookup failed during authentication");
            AuthContext::Anonymous
        }
    }
}

pub async fn authenticate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let ctx = resolve_context(&state.tokens, state.users.as_ref(), header.as_deref()).await;
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path)
}

/// Access policy: public paths pass, everything else needs an authenticated context.
pub async fn require_auth(req: Request, next: Next) -> Response {
    if is_public_path(req.uri().path()) {
        return next.run(req).await;
    }
    let authenticated = req
        .extensions()
        .get::<AuthContext>()
        .and_then(AuthContext::identity)
        .is_some();
    if !authenticated {
        debug!(path = %req.uri().path(), "rejecting unauthenticated request");
        return AuthError::Unauthenticated.into_response();
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::auth::{
        jwt::tests::{make_service, TEST_SECRET},
        repo::MemoryUserStore,
        repo_types::NewUser,
    };

    async fn setup() -> (TokenService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        store
            .save(NewUser::new("a@x.com".into(), "hash".into(), "nick".into()))
            .await
            .expect("save");
        (make_service(TEST_SECRET), store)
    }

    #[tokio::test]
    async fn valid_token_for_known_user_authenticates() {
        let (tokens, store) = setup().await;
        let header = format!("Bearer {}", tokens.issue("a@x.com").expect("sign"));

        let ctx = resolve_context(&tokens, store.as_ref(), Some(header.as_str())).await;
        let identity = ctx.identity().expect("authenticated");
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.nickname, "nick");
    }

    #[tokio::test]
    async fn missing_or_malformed_header_is_anonymous() {
        let (tokens, store) = setup().await;
        assert_eq!(
            resolve_context(&tokens, store.as_ref(), None).await,
            AuthContext::Anonymous
        );
        assert_eq!(
            resolve_context(&tokens, store.as_ref(), Some("Basic xyz")).await,
            AuthContext::Anonymous
        );
        assert_eq!(
            resolve_context(&tokens, store.as_ref(), Some("Bearer not.a.jwt")).await,
            AuthContext::Anonymous
        );
    }

    #[tokio::test]
    async fn expired_token_is_anonymous() {
        let (tokens, store) = setup().await;
        let old = tokens
            .issue_at("a@x.com", OffsetDateTime::now_utc() - Duration::hours(2))
            .expect("sign");
        let header = format!("Bearer {old}");
        assert_eq!(
            resolve_context(&tokens, store.as_ref(), Some(header.as_str())).await,
            AuthContext::Anonymous
        );
    }

    #[tokio::test]
    async fn unknown_subject_is_anonymous() {
        let (tokens, store) = setup().await;
        let header = format!("Bearer {}", tokens.issue("ghost@x.com").expect("sign"));
        assert_eq!(
            resolve_context(&tokens, store.as_ref(), Some(header.as_str())).await,
            AuthContext::Anonymous
        );
    }

    #[test]
    fn public_paths() {
        assert!(is_public_path("/users/signup"));
        assert!(is_public_path("/users/login"));
        assert!(!is_public_path("/users/me"));
    }
}
