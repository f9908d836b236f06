//! Authentication middleware
//!
//! Extracts and validates the bearer token, then stores the caller's
//! [`Identity`] in request extensions.

use crate::auth::{decode_token, Identity};
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use tracing::debug;

const LOGIN_HINT: &str = "Authentication required. Run \"dbv login\" first.";

/// Require a valid bearer token
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized(LOGIN_HINT.to_string()))?;

    let claims = decode_token(bearer.token(), &state.jwt_secret)?;
    let identity = Identity::from(claims);
    debug!("Authenticated request from {}", identity.author());

    // Insert identity into request extensions for handlers to use
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}
