//! Caller identity as asserted by the upstream auth layer.

use crate::error::{AppError, ValidationError};
use axum::extract::FromRequestParts;
use http::request::Parts;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated user id, taken from `x-user-id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Principal(v.to_string()))
            .ok_or_else(|| AppError::validation(ValidationError::MissingPrincipal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    #[tokio::test]
    async fn reads_user_id_header() {
        let (mut parts, _) = Request::builder()
            .header(USER_ID_HEADER, " user-42 ")
            .body(())
            .unwrap()
            .into_parts();

        let principal = Principal::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(principal.user_id(), "user-42");
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let err = Principal::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }
}
