//! Authentication extractors
//!
//! Bearer access tokens are checked against the live session and the user
//! row, so revoked sessions, deactivated accounts and demoted admins lose
//! access immediately.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Serialize;
use std::sync::Arc;

use crate::auth::{verify_token, AuthService, JwtError};

/// Authenticated user extracted from the access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub username: String,
    pub jti: String,
    pub is_admin: bool,
}

/// Error response for authentication failures
#[derive(Debug, Serialize)]
struct AuthError {
    #[serde(skip)]
    status: StatusCode,
    error: AuthErrorDetails,
}

#[derive(Debug, Serialize)]
struct AuthErrorDetails {
    code: String,
    message: String,
}

impl AuthError {
    fn new(code: &str, message: &str) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, code, message)
    }

    fn with_status(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            error: AuthErrorDetails {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Extractor for authenticated users
///
/// ```rust,ignore
/// async fn my_orders(user: AuthenticatedUser) -> impl IntoResponse {
///     format!("Orders for {}", user.username)
/// }
/// ```
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AuthError::new(
                        "MISSING_TOKEN",
                        "Authorization header with Bearer token required",
                    )
                    .into_response()
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);

        let claims = verify_token(bearer.token(), auth_service.jwt_secret()).map_err(|e| {
            match e {
                JwtError::TokenExpired => AuthError::new("TOKEN_EXPIRED", "Token has expired"),
                _ => AuthError::new("INVALID_TOKEN", "Invalid token"),
            }
            .into_response()
        })?;

        if claims.token_type != "access" {
            return Err(
                AuthError::new("INVALID_TOKEN_TYPE", "Expected access token").into_response(),
            );
        }

        auth_service
            .verify_session(&claims.jti)
            .await
            .map_err(|_| {
                AuthError::new("SESSION_REVOKED", "Session has been revoked").into_response()
            })?;

        let user = match auth_service.users().find(&claims.sub).await {
            Ok(Some(user)) if user.is_active => user,
            Ok(_) => {
                return Err(
                    AuthError::new("ACCOUNT_DISABLED", "Account is missing or deactivated")
                        .into_response(),
                )
            }
            Err(e) => {
                tracing::error!(error = %e, "User lookup failed during authentication");
                return Err(crate::error::ApiError::from(e).into_response());
            }
        };

        Ok(AuthenticatedUser {
            username: user.username,
            jti: claims.jti,
            is_admin: user.is_admin,
        })
    }
}

/// Authenticates when a token is present, anonymous otherwise
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for OptionalUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalUser(Some(user))),
            Err(_) => Ok(OptionalUser(None)),
        }
    }
}

/// Requires the admin flag, as currently stored for the account
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            tracing::warn!(username = %user.username, path = %parts.uri.path(), "Admin access denied");
            return Err(AuthError::with_status(
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Admin access required",
            )
            .into_response());
        }

        Ok(AdminUser(user))
    }
}
