//! Role checks run as route middleware, before the handler.

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::auth::{Principal, Role};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

pub const CREATE_BOOK_DENIED: &str = "You do not have sufficient rights to create a book";

/// Principal behind the request's bearer token.
///
/// No `Authorization` header means anonymous. A header that is not a
/// bearer token, or a token the authenticator rejects, is an error.
pub fn principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(Principal::anonymous());
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    state
        .authenticator
        .authenticate(token)
        .ok_or(ApiError::Unauthorized)
}

fn require(
    state: &AppState,
    headers: &HeaderMap,
    role: Role,
    message: &str,
) -> Result<Principal, ApiError> {
    let principal = principal(state, headers)?;
    if principal.has_role(role) {
        Ok(principal)
    } else {
        warn!("{} lacks {}: {}", principal.subject, role, message);
        Err(ApiError::Forbidden(message.to_string()))
    }
}

/// `POST /api/books` is reserved to `ROLE_ADMIN`.
pub async fn can_create_book(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = require(&state, request.headers(), Role::Admin, CREATE_BOOK_DENIED)?;
    debug!("{} may create books", principal.subject);
    Ok(next.run(request).await)
}
