use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use makewish_db::queries::{ItemChanges, NewItem};
use makewish_types::api::{CreateItemRequest, FulfillResponse, UpdateItemRequest};
use makewish_types::models::Item;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, with_db};
use crate::uploads::stored_image_name;
use crate::wishlists::owned_wishlist;

/// GET /wishlists/{id}/items
///
/// Every item regardless of state, newest first.
pub async fn list_items(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(wishlist_id): Path<Uuid>,
) -> Result<Json<Vec<Item>>, ApiError> {
    owned_wishlist(&state, &current, wishlist_id).await?;
    let items = with_db(&state, move |db| db.list_items(wishlist_id)).await?;
    Ok(Json(items))
}

pub async fn create_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(wishlist_id): Path<Uuid>,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let product_name = required_name(&req.product_name)?;
    owned_wishlist(&state, &current, wishlist_id).await?;

    let item = with_db(&state, move |db| {
        db.insert_item(&NewItem {
            id: Uuid::new_v4(),
            wishlist_id,
            product_name: &product_name,
            product_url: req.product_url.trim(),
            price: req.price.trim(),
            image_url: req.image_url.as_deref().filter(|u| !u.is_empty()),
            created_at: Utc::now(),
        })
    })
    .await?;

    info!("Item {} added to wishlist {}", item.id, wishlist_id);
    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /items/{id}
///
/// Edits product fields only; hold and fulfillment have
/// their own routes.
pub async fn update_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<Item>, ApiError> {
    let product_name = req.product_name.as_deref().map(required_name).transpose()?;
    let before = owned_item(&state, &current, id).await?;

    let image_url = req
        .image_url
        .map(|url| url.filter(|u| !u.is_empty()));
    let replaced_image = match &image_url {
        Some(new) if *new != before.image_url => before.image_url.clone(),
        _ => None,
    };

    let updated = with_db(&state, move |db| {
        db.update_item(
            id,
            &ItemChanges {
                product_name: product_name.as_deref(),
                product_url: req.product_url.as_deref().map(str::trim),
                price: req.price.as_deref().map(str::trim),
                image_url: image_url.as_ref().map(|u| u.as_deref()),
            },
        )
    })
    .await?
    .ok_or(ApiError::NotFound("item"))?;

    if let Some(url) = replaced_image {
        discard_image(&state, current.id, &url).await;
    }
    Ok(Json(updated))
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let item = owned_item(&state, &current, id).await?;

    if !with_db(&state, move |db| db.delete_item(id)).await? {
        return Err(ApiError::NotFound("item"));
    }
    if let Some(url) = &item.image_url {
        discard_image(&state, current.id, url).await;
    }

    info!("Item {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// POST /items/{id}/fulfill
///
/// Allowed from any state. Holder fields are kept
/// so the thank-you notification can still address the giver.
/// Only the call that flips the flag reports `newly_fulfilled`.
pub async fn fulfill_item(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<FulfillResponse>, ApiError> {
    owned_item(&state, &current, id).await?;

    let (item, newly_fulfilled) = with_db(&state, move |db| db.set_fulfilled(id))
        .await?
        .ok_or(ApiError::NotFound("item"))?;

    if newly_fulfilled {
        info!("Item {} marked fulfilled", id);
    }
    Ok(Json(FulfillResponse {
        item,
        newly_fulfilled,
    }))
}

/// DELETE /items/{id}/hold
pub async fn remove_hold(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Item>, ApiError> {
    owned_item(&state, &current, id).await?;

    let item = with_db(&state, move |db| db.clear_hold(id))
        .await?
        .ok_or(ApiError::NotFound("item"))?;

    info!("Hold removed from item {}", id);
    Ok(Json(item))
}

async fn owned_item(state: &AppState, current: &CurrentUser, id: Uuid) -> Result<Item, ApiError> {
    with_db(state, move |db| db.get_item_with_owner(id))
        .await?
        .filter(|(_, owner)| *owner == current.id)
        .map(|(item, _)| item)
        .ok_or(ApiError::NotFound("item"))
}

/// Removes an image from the bucket once nothing references it, provided
/// `owner` uploaded it. Call after the item change is committed. Failures
/// are only logged.
pub(crate) async fn discard_image(state: &AppState, owner: Uuid, url: &str) {
    let Some(name) = stored_image_name(&state.public_url, url).map(str::to_string) else {
        return;
    };

    let url = url.to_string();
    let released = {
        let name = name.clone();
        with_db(state, move |db| db.release_image(&name, &url, owner)).await
    };
    match released {
        Ok(true) => {
            if let Err(e) = state.storage.delete(&name).await {
                warn!("Failed to delete image {}: {}", name, e);
            }
        }
        Ok(false) => {}
        Err(e) => warn!("Failed to release image {}: {}", name, e),
    }
}

fn required_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("product name is required".into()));
    }
    Ok(name.to_string())
}
