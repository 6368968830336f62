use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::credentials::{Claims, CredentialService};
use crate::error::AppError;
use crate::types::{Role, TokenKind};

/// Raw bearer token from the `Authorization` header.
pub fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn verified<S>(parts: &Parts, state: &S) -> Result<(Claims, String), AppError>
where
    Arc<CredentialService>: FromRef<S>,
{
    let token = bearer_token(parts).ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;
    let creds = Arc::<CredentialService>::from_ref(state);
    let claims = creds.verify(token, TokenKind::Access)?;
    Ok((claims, token.to_string()))
}

/// Any authenticated caller, user or admin.
#[derive(Debug, Clone)]
pub struct UserClaims {
    pub claims: Claims,
    pub token: String,
}

/// Caller holding an admin access token.
#[derive(Debug, Clone)]
pub struct AdminClaims {
    pub claims: Claims,
    pub token: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserClaims
where
    Arc<CredentialService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let (claims, token) = verified(parts, state)?;
        Ok(Self { claims, token })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminClaims
where
    Arc<CredentialService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let (claims, token) = verified(parts, state)?;
        if claims.role != Role::Admin {
            return Err(AppError::Forbidden("Admin privileges required".to_string()));
        }
        Ok(Self { claims, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[derive(Clone)]
    struct TestState(Arc<CredentialService>);

    impl FromRef<TestState> for Arc<CredentialService> {
        fn from_ref(state: &TestState) -> Self {
            state.0.clone()
        }
    }

    fn parts(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn state() -> TestState {
        TestState(Arc::new(CredentialService::new("test-secret", 30, 7)))
    }

    #[tokio::test]
    async fn missing_header_is_not_authenticated() {
        let state = state();
        let err = UserClaims::from_request_parts(&mut parts(None), &state).await.unwrap_err();
        assert_eq!(err.to_string(), "Not authenticated");

        let err = UserClaims::from_request_parts(&mut parts(Some("Basic abc")), &state).await.unwrap_err();
        assert_eq!(err.to_string(), "Not authenticated");
    }

    #[tokio::test]
    async fn user_token_is_not_admin() {
        let state = state();
        let token = state.0.issue(1, "user1", Role::User, TokenKind::Access).unwrap();
        let header = format!("Bearer {token}");

        let user = UserClaims::from_request_parts(&mut parts(Some(&header)), &state).await.unwrap();
        assert_eq!(user.claims.sub, 1);

        let err = AdminClaims::from_request_parts(&mut parts(Some(&header)), &state).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn refresh_token_cannot_authenticate() {
        let state = state();
        let token = state.0.issue(1, "admin", Role::Admin, TokenKind::Refresh).unwrap();
        let header = format!("Bearer {token}");
        let err = AdminClaims::from_request_parts(&mut parts(Some(&header)), &state).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }
}
