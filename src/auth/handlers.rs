use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, info, instrument};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, SignupRequest},
        error::AuthError,
        extractors::CurrentUser,
    },
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, &'static str), AuthError> {
    state
        .auth
        .signup(&payload.email, &payload.password, &payload.nickname)
        .await?;
    Ok((StatusCode::CREATED, "signup completed"))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<([(axum::http::HeaderName, HeaderValue); 1], &'static str), AuthError> {
    let token = state.auth.login(&payload.email, &payload.password).await?;
    let value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| AuthError::Internal(e.into()))?;
    info!("login succeeded");
    Ok(([(AUTHORIZATION, value)], "login succeeded"))
}

#[instrument(skip(state, identity))]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<Json<PublicUser>, AuthError> {
    debug!(user_id = %identity.user_id, "profile lookup");
    let user = state
        .users
        .find_by_email(&identity.email)
        .await?
        .ok_or(AuthError::Unauthenticated)?;
    Ok(Json(PublicUser::from(user)))
}
