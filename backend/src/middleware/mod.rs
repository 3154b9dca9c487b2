pub mod auth;

pub use auth::{AuthState, api_key_middleware};
