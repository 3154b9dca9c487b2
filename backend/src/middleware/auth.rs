use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::utils::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Auth is disabled when no key is configured or the key is left at the
/// "dev-key" placeholder.
#[derive(Clone, Default)]
pub struct AuthState {
    pub api_key: Option<String>,
}

impl AuthState {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    fn required_key(&self) -> Option<&str> {
        match self.api_key.as_deref() {
            None | Some("dev-key") => None,
            Some(key) => Some(key),
        }
    }
}

/// Check `X-API-Key` against the configured key.
pub async fn api_key_middleware(
    State(state): State<AuthState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(required) = state.required_key() else {
        return Ok(next.run(req).await);
    };

    let provided = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if key == required => Ok(next.run(req).await),
        _ => {
            tracing::warn!("Rejected request with invalid or missing API key: {}", req.uri());
            Err(ApiError::unauthorized("Invalid or missing API key"))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_key_disables_auth() {
        assert!(AuthState::new(None).required_key().is_none());
        assert!(AuthState::new(Some("dev-key".to_string())).required_key().is_none());
        assert_eq!(
            AuthState::new(Some("secret".to_string())).required_key(),
            Some("secret")
        );
    }
}
