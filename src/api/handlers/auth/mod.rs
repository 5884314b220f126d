//! Session, MFA, and device-session endpoints plus shared auth state.

pub mod mfa;
pub mod principal;
pub mod session;
pub mod sessions;
pub mod state;
pub mod types;
pub(crate) mod utils;

pub use principal::{Principal, require_auth};
pub use state::{AuthConfig, AuthState, Environment};
