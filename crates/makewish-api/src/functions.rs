use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use makewish_types::api::{ErrorBody, MessageResponse, ThankYouEmailRequest};

use crate::mail;

/// POST /functions/v1/send-thank-you-email
///
/// Callable without a session. The body is validated here so a malformed
/// request gets the same `{"error": ...}` shape as every other route.
pub async fn send_thank_you_email(
    payload: Result<Json<ThankYouEmailRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            warn!("Rejected thank-you email request: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    if req.recipient_email.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "recipientEmail is required".into(),
            }),
        )
            .into_response();
    }

    mail::deliver(&mail::thank_you(&req));

    Json(MessageResponse {
        message: format!("Simulated email sent successfully to {}", req.recipient_email),
    })
    .into_response()
}
