//! Request extractors: the bearer-token [`Principal`], and `Json`/`Path`/`Query`
//! wrappers whose rejections are reported as [`Error`] like every other failure.

use crate::{
    core::access::{self, Principal},
    errors::Error,
    web::AppState,
};
use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

/// Path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Error))]
pub struct ApiPath<T>(pub T);

/// Query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Error))]
pub struct ApiQuery<T>(pub T);

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Resolved principal, profile ensured
    pub principal: Principal,
    /// Session token the request carried
    pub token: String,
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(Error::Unauthenticated)?;
        let session = state
            .sessions
            .get(token)
            .await
            .ok_or(Error::Unauthenticated)?;
        let principal =
            access::principal_for(&state.db, session.user_id, session.phone.as_deref()).await?;
        Ok(Self {
            principal,
            token: token.to_string(),
        })
    }
}
