use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use uuid::Uuid;

use crate::auth::decode_token;
use crate::error::ApiError;
use crate::state::AppState;

/// The signed-in user for the current request, inserted by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
}

/// Extract and validate the session token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;

    let claims =
        decode_token(&state.jwt_secret, bearer.token()).map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(CurrentUser {
        id: claims.sub,
        email: claims.email,
    });
    Ok(next.run(req).await)
}
