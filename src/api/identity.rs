/// Acting-user extractor
///
/// Authentication happens upstream; the authenticated user's id arrives in
/// the `x-user-id` header. Requests without it are rejected with 401.

use crate::ids::UserId;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

pub const USER_HEADER: &str = "x-user-id";

/// The user on whose behalf a request acts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActingUser(pub UserId);

/// Rejection for requests that carry no usable identity
#[derive(Debug)]
pub struct MissingIdentity;

impl IntoResponse for MissingIdentity {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "unauthenticated",
                "message": format!("missing {} header", USER_HEADER)
            })),
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = MissingIdentity;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| ActingUser(UserId::from(value)))
            .ok_or(MissingIdentity)
    }
}
