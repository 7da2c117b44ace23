//! Authentication middleware.
//!
//! Requests carry a Bearer token naming the owner they act for. With no
//! AUTH_SECRET configured the server runs in anonymous development mode
//! and any owner may be addressed.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};

use crate::error::AppError;
use crate::AppState;

/// The anonymous principal used in development mode.
const ANONYMOUS: &str = "anonymous";

/// Authenticated owner extracted from the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The bearer token; in this reference setup the token IS the owner id
    token: String,
}

impl AuthUser {
    /// Whether this principal may act for the given owner.
    pub fn authorize(&self, owner_id: &str) -> Result<(), AppError> {
        if self.token == ANONYMOUS || self.token == owner_id {
            Ok(())
        } else {
            Err(AppError::Unauthorized)
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match auth_header {
            Some(header) if header.starts_with("Bearer ") => {
                let token = header.trim_start_matches("Bearer ").to_string();
                if token.is_empty() {
                    return Err((StatusCode::UNAUTHORIZED, "Empty bearer token"));
                }
                Ok(AuthUser { token })
            }
            Some(_) => Err((
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header format",
            )),
            None => {
                // Anonymous access is only for development setups without
                // an AUTH_SECRET.
                if state.config.auth_secret.is_none() {
                    Ok(AuthUser {
                        token: ANONYMOUS.to_string(),
                    })
                } else {
                    Err((StatusCode::UNAUTHORIZED, "Missing authorization header"))
                }
            }
        }
    }
}
