use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use makewish_db::queries::{NewWishlist, WishlistChanges};
use makewish_types::api::{CreateWishlistRequest, UpdateWishlistRequest};
use makewish_types::models::{EventSubscriber, Wishlist};

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::share::generate_share_token;
use crate::state::{AppState, with_db};

/// GET /wishlists
///
/// The caller's wishlists, newest first.
pub async fn list_wishlists(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Wishlist>>, ApiError> {
    let user_id = current.id;
    let wishlists = with_db(&state, move |db| db.list_wishlists(user_id)).await?;
    Ok(Json(wishlists))
}

pub async fn create_wishlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateWishlistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = required_title(&req.title)?;

    let user_id = current.id;
    let wishlist = with_db(&state, move |db| {
        db.create_wishlist(
            &NewWishlist {
                id: Uuid::new_v4(),
                user_id,
                title: &title,
                event_date: req.event_date,
                created_at: Utc::now(),
            },
            generate_share_token,
        )
    })
    .await?;

    info!("User {} created wishlist {}", user_id, wishlist.id);
    Ok((StatusCode::CREATED, Json(wishlist)))
}

pub async fn get_wishlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Wishlist>, ApiError> {
    Ok(Json(owned_wishlist(&state, &current, id).await?))
}

/// PATCH /wishlists/{id}
pub async fn update_wishlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateWishlistRequest>,
) -> Result<Json<Wishlist>, ApiError> {
    let title = req.title.as_deref().map(required_title).transpose()?;
    owned_wishlist(&state, &current, id).await?;

    let updated = with_db(&state, move |db| {
        db.update_wishlist(
            id,
            &WishlistChanges {
                title: title.as_deref(),
                event_date: req.event_date,
            },
        )
    })
    .await?
    .ok_or(ApiError::NotFound("wishlist"))?;

    Ok(Json(updated))
}

/// DELETE /wishlists/{id}
///
/// Removes the wishlist with its items and subscribers.
pub async fn delete_wishlist(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    owned_wishlist(&state, &current, id).await?;

    let (deleted, images) = with_db(&state, move |db| {
        let images: Vec<String> = db
            .list_items(id)?
            .into_iter()
            .filter_map(|item| item.image_url)
            .collect();
        Ok((db.delete_wishlist(id)?, images))
    })
    .await?;
    if !deleted {
        return Err(ApiError::NotFound("wishlist"));
    }

    for url in &images {
        crate::items::discard_image(&state, current.id, url).await;
    }
    info!("User {} deleted wishlist {}", current.id, id);
    Ok(StatusCode::NO_CONTENT)
}

/// GET /wishlists/{id}/subscribers
///
/// Who asked to be reminded of the event.
pub async fn list_subscribers(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EventSubscriber>>, ApiError> {
    owned_wishlist(&state, &current, id).await?;
    let subscribers = with_db(&state, move |db| db.list_subscribers(id)).await?;
    Ok(Json(subscribers))
}

/// Someone else's wishlist is reported as missing rather than forbidden.
pub(crate) async fn owned_wishlist(
    state: &AppState,
    current: &CurrentUser,
    id: Uuid,
) -> Result<Wishlist, ApiError> {
    with_db(state, move |db| db.get_wishlist(id))
        .await?
        .filter(|w| w.user_id == current.id)
        .ok_or(ApiError::NotFound("wishlist"))
}

fn required_title(raw: &str) -> Result<String, ApiError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("wishlist title is required".into()));
    }
    Ok(title.to_string())
}
