//! Authentication module
//!
//! Verifies bearer tokens issued by the login flow and exposes the caller's
//! identity to handlers. Tokens are issued by the login flow; the server only
//! signs one itself for local development.

mod jwt;
mod middleware;

pub use jwt::{create_token, decode_token, Claims};
pub use middleware::auth_middleware;

/// Authenticated caller, inserted into request extensions by [`auth_middleware`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: Option<String>,
}

impl Identity {
    /// Name recorded as commit author and project owner
    pub fn author(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.user_id)
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            username: claims.username.filter(|u| !u.is_empty()),
        }
    }
}
