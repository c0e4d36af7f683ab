use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::security::{self, CallerRole};
use crate::core::state::AppState;

/// Caller identity from a verified bearer token. Users live in the
/// identity service; nothing is looked up here.
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser {
    pub(crate) id: String,
    pub(crate) role: CallerRole,
}

pub(crate) struct CurrentLearner(pub(crate) CurrentUser);
pub(crate) struct CurrentTeacher(pub(crate) CurrentUser);
pub(crate) struct CurrentManager(pub(crate) CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        Ok(CurrentUser { id: claims.sub, role: claims.role })
    }
}

async fn require_role(
    parts: &mut Parts,
    state: &AppState,
    role: CallerRole,
    message: &str,
) -> Result<CurrentUser, ApiError> {
    let user = CurrentUser::from_request_parts(parts, state).await?;
    if user.role == role {
        Ok(user)
    } else {
        Err(ApiError::Forbidden(message.to_string()))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentLearner {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, CallerRole::Learner, "Learner access required").await.map(Self)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentTeacher {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, CallerRole::Teacher, "Teacher access required").await.map(Self)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentManager {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        require_role(parts, state, CallerRole::Manager, "Manager access required").await.map(Self)
    }
}
