//! Caller identity extracted from headers set by the authentication gateway.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::{Caller, Role, UserId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The verified caller of a request.
///
/// `x-user-id` must hold a UUID. `x-user-role` is optional and defaults to
/// `user`. The headers are trusted as-is.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_value(parts, USER_ID_HEADER)?
            .ok_or_else(|| ApiError::Unauthorized(format!("missing {USER_ID_HEADER} header")))?;
        let user_id = uuid::Uuid::parse_str(user_id.trim())
            .map(UserId::from_uuid)
            .map_err(|e| ApiError::Unauthorized(format!("invalid {USER_ID_HEADER}: {e}")))?;

        let role = match header_value(parts, USER_ROLE_HEADER)? {
            Some(role) => role.parse::<Role>().map_err(ApiError::Unauthorized)?,
            None => Role::User,
        };

        Ok(Identity(Caller::new(user_id, role)))
    }
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, ApiError> {
    parts
        .headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::Unauthorized(format!("{name} is not valid text")))
        })
        .transpose()
}
