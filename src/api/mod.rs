//! API handlers for BiblioDesk endpoints

pub mod chats;
pub mod health;
pub mod openapi;
pub mod ws;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = claims_from_bearer(&parts.headers, &state.config.auth.jwt_secret)?;
        Ok(AuthenticatedUser(claims))
    }
}

/// Resolve claims from an `Authorization: Bearer …` header
pub(crate) fn claims_from_bearer(headers: &HeaderMap, secret: &str) -> Result<UserClaims, AppError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

    if !auth_header.starts_with("Bearer ") {
        return Err(AppError::Authentication(
            "Invalid authorization header format".to_string(),
        ));
    }

    let token = &auth_header[7..];

    UserClaims::from_token(token, secret).map_err(|e| AppError::Authentication(e.to_string()))
}

/// Resolve claims for a WebSocket handshake. Browsers cannot set headers
/// on upgrade requests, so the token may also arrive as a query parameter.
pub(crate) fn claims_for_handshake(
    headers: &HeaderMap,
    query_token: Option<&str>,
    secret: &str,
) -> Result<UserClaims, AppError> {
    if headers.contains_key(AUTHORIZATION) {
        return claims_from_bearer(headers, secret);
    }

    let token = query_token
        .ok_or_else(|| AppError::Authentication("Missing authentication token".to_string()))?;

    UserClaims::from_token(token, secret).map_err(|e| AppError::Authentication(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn token() -> String {
        UserClaims::new("anna", 10, "Anna", Role::User, 1)
            .create_token(SECRET)
            .unwrap()
    }

    #[test]
    fn bearer_header_resolves_claims() {
        let mut headers = HeaderMap::new();
        let value = format!("Bearer {}", token());
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());

        let claims = claims_from_bearer(&headers, SECRET).unwrap();
        assert_eq!(claims.user_id, 10);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(claims_from_bearer(&headers, SECRET).is_err());
    }

    #[test]
    fn handshake_falls_back_to_query_token() {
        let headers = HeaderMap::new();
        let token = token();
        let claims = claims_for_handshake(&headers, Some(&token), SECRET).unwrap();
        assert_eq!(claims.name, "Anna");
    }

    #[test]
    fn handshake_without_credentials_is_rejected() {
        let headers = HeaderMap::new();
        assert!(claims_for_handshake(&headers, None, SECRET).is_err());
    }
}
