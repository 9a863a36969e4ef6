use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::lifecycle::ItemState;
use crate::models::{Item, User, Wishlist};

// -- JWT Claims --

/// Session token claims, shared by the REST middleware and the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: User,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecoverRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyRecoveryRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Wishlists --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWishlistRequest {
    pub title: String,
    #[serde(default)]
    pub event_date: Option<NaiveDate>,
}

/// Partial update. `event_date: null` clears the date, an absent field leaves it.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateWishlistRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub event_date: Option<Option<NaiveDate>>,
}

// -- Items --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateItemRequest {
    pub product_name: String,
    #[serde(default)]
    pub product_url: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateItemRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub image_url: Option<Option<String>>,
}

/// Result of `POST /items/{id}/fulfill`. `newly_fulfilled` is false when the
/// item was already fulfilled and nothing changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillResponse {
    #[serde(flatten)]
    pub item: Item,
    pub newly_fulfilled: bool,
}

// -- Public share page --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HoldRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeRequest {
    pub email: String,
}

/// An item as a visitor sees it, with its state derived at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedItem {
    #[serde(flatten)]
    pub item: Item,
    pub state: ItemState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedWishlist {
    pub wishlist: Wishlist,
    pub items: Vec<SharedItem>,
}

// -- Functions --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThankYouEmailRequest {
    pub recipient_email: String,
    pub recipient_name: String,
    pub item_name: String,
    pub wishlist_title: String,
}

// -- Storage --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub path: String,
    pub public_url: String,
}

/// Distinguishes an explicit `null` from an absent field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
