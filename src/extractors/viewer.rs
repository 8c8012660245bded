//! Extract the current viewer from the request (`X-User-ID` header, set by
//! the upstream auth gateway).

use crate::context::CurrentUser;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Header carrying the authenticated user id. Default: `X-User-ID`.
pub const USER_ID_HEADER: &str = "X-User-ID";

/// Extractor for the optional viewer. A missing or unparsable header is an
/// anonymous request, never a rejection.
#[derive(Clone, Debug)]
pub struct Viewer(pub Option<CurrentUser>);

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .map(|id| CurrentUser { id });
        Ok(Viewer(user))
    }
}
