//! Authentication
//!
//! Handles:
//! - Bearer token validation against the hosted auth provider
//! - Admin user deletion at the provider
//! - Shared-secret checks for webhooks

mod middleware;
mod provider;
mod secret;

pub use middleware::CurrentUser;
pub use provider::{AuthProvider, AuthUser};
pub use secret::verify_shared_secret;
