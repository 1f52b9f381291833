//! Authentication middleware for fan meeting routes.
//!
//! Extracts the Bearer token, resolves it into a [`Caller`] and stores the
//! caller in request extensions for handlers to pick up.

use crate::auth::IdentityResolver;
use crate::errors::EntryError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub resolver: Arc<dyn IdentityResolver>,
}

fn extract_bearer_token(req: &Request) -> Result<&str, EntryError> {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "fm.middleware.auth", "Missing Authorization header");
            EntryError::Unauthenticated("Missing Authorization header".to_string())
        })?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::debug!(target: "fm.middleware.auth", "Invalid Authorization header format");
        EntryError::Unauthenticated("Invalid Authorization header format".to_string())
    })
}

/// Resolve the caller or reject the request.
///
/// - 401 if the token is missing or invalid
/// - 403 if the token carries an unknown role
#[instrument(skip_all, name = "fm.middleware.auth")]
pub async fn require_caller(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, EntryError> {
    let token = extract_bearer_token(&req)?;
    let caller = state.resolver.resolve(token)?;

    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}
