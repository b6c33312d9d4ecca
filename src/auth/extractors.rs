use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::{
    error::AuthError,
    middleware::{AuthContext, Identity},
};

/// The authenticated caller, read from the context attached by the auth middleware.
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(AuthContext::Authenticated(identity)) => Ok(CurrentUser(identity.clone())),
            _ => Err(AuthError::Unauthenticated),
        }
    }
}
