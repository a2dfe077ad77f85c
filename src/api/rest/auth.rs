use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::principal::{Principal, Role};

/// Set by the auth gateway after it has verified the caller.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthorized(format!("{USER_ID_HEADER} is not a uuid")))?;
        let role = header(parts, USER_ROLE_HEADER)?.parse::<Role>()?;

        Ok(Principal::new(id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}
