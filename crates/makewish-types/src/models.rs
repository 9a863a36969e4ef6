use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wishlist {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub event_date: Option<NaiveDate>,
    /// Opaque token that grants read access to the public share page.
    pub share_token: String,
}

/// A wished-for product. The hold fields are written by anonymous visitors,
/// `is_fulfilled` only by the wishlist owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub wishlist_id: Uuid,
    pub product_name: String,
    pub product_url: String,
    /// Free text as typed by the owner ("$20", "about 15 EUR").
    pub price: String,
    pub image_url: Option<String>,
    pub held_by: Option<String>,
    pub held_by_email: Option<String>,
    pub held_until: Option<DateTime<Utc>>,
    pub is_fulfilled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubscriber {
    pub id: Uuid,
    pub wishlist_id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub reminded_at: Option<DateTime<Utc>>,
}
