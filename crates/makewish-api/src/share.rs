use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use rand::Rng;
use tracing::info;
use uuid::Uuid;

use makewish_db::queries::HoldOutcome;
use makewish_types::api::{HoldRequest, SharedItem, SharedWishlist, SubscribeRequest};
use makewish_types::lifecycle::HoldClaim;
use makewish_types::models::{EventSubscriber, Item};

use crate::auth::validate_email;
use crate::error::ApiError;
use crate::state::{AppState, with_db};

const SHARE_TOKEN_LEN: usize = 12;
const SHARE_TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric token for a wishlist's public link.
pub fn generate_share_token() -> String {
    let mut rng = rand::rng();
    (0..SHARE_TOKEN_LEN)
        .map(|_| SHARE_TOKEN_ALPHABET[rng.random_range(0..SHARE_TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// GET /share/{token}
///
/// The wishlist and its items, each with its current state.
/// No authentication.
pub async fn get_shared_wishlist(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SharedWishlist>, ApiError> {
    let shared = with_db(&state, move |db| {
        let Some(wishlist) = db.get_wishlist_by_share_token(&token)? else {
            return Ok(None);
        };
        let items = db.list_items(wishlist.id)?;
        Ok(Some((wishlist, items)))
    })
    .await?
    .ok_or(ApiError::NotFound("wishlist"))?;

    let (wishlist, items) = shared;
    let now = Utc::now();
    let items = items
        .into_iter()
        .map(|item| SharedItem {
            state: item.state_at(now),
            item,
        })
        .collect();

    Ok(Json(SharedWishlist { wishlist, items }))
}

/// POST /share/{token}/items/{item_id}/hold
pub async fn place_hold(
    State(state): State<AppState>,
    Path((token, item_id)): Path<(String, Uuid)>,
    Json(req): Json<HoldRequest>,
) -> Result<Json<Item>, ApiError> {
    let claim = HoldClaim::new(&req.name, &req.email)?;
    validate_email(claim.email())?;

    let now = Utc::now();
    let until = claim.expires_at(now);
    let outcome = with_db(&state, move |db| {
        let Some(wishlist) = db.get_wishlist_by_share_token(&token)? else {
            return Ok(HoldOutcome::NotFound);
        };
        db.claim_hold(item_id, wishlist.id, claim.name(), claim.email(), until, now)
    })
    .await?;

    match outcome {
        HoldOutcome::Held(item) => {
            info!("Item {} held until {}", item.id, until);
            Ok(Json(item))
        }
        HoldOutcome::Unavailable => Err(ApiError::Conflict(
            "this item is already held or fulfilled".into(),
        )),
        HoldOutcome::NotFound => Err(ApiError::NotFound("item")),
    }
}

/// POST /share/{token}/subscribe
///
/// Registers a visitor for event reminders.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?.to_lowercase();

    let subscriber: EventSubscriber = with_db(&state, move |db| {
        let Some(wishlist) = db.get_wishlist_by_share_token(&token)? else {
            return Ok(None);
        };
        db.add_subscriber(Uuid::new_v4(), wishlist.id, &email, Utc::now())
            .map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound("wishlist"))?;

    Ok((StatusCode::CREATED, Json(subscriber)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_token_shape() {
        for _ in 0..100 {
            let token = generate_share_token();
            assert_eq!(token.len(), SHARE_TOKEN_LEN);
            assert!(token.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_share_tokens_differ() {
        assert_ne!(generate_share_token(), generate_share_token());
    }
}
