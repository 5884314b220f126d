pub mod auth;
pub mod health;
pub mod oauth;

pub use auth::{AuthConfig, AuthState, Environment};
