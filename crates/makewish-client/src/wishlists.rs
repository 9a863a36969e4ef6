use std::sync::Arc;

use chrono::NaiveDate;
use reqwest::Method;
use uuid::Uuid;

use makewish_types::api::{CreateWishlistRequest, UpdateWishlistRequest};
use makewish_types::models::{EventSubscriber, Wishlist};

use crate::Result;
use crate::session::SessionManager;

/// The signed-in owner's wishlists.
#[derive(Clone)]
pub struct WishlistRepository {
    session: Arc<SessionManager>,
}

impl WishlistRepository {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<Wishlist>> {
        self.session.call(Method::GET, "/wishlists", None::<&()>).await
    }

    pub async fn create(&self, title: &str, event_date: Option<NaiveDate>) -> Result<Wishlist> {
        let req = CreateWishlistRequest {
            title: title.to_string(),
            event_date,
        };
        self.session.call(Method::POST, "/wishlists", Some(&req)).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Wishlist> {
        let path = format!("/wishlists/{}", id);
        self.session.call(Method::GET, &path, None::<&()>).await
    }

    pub async fn update(&self, id: Uuid, changes: &UpdateWishlistRequest) -> Result<Wishlist> {
        let path = format!("/wishlists/{}", id);
        self.session.call(Method::PATCH, &path, Some(changes)).await
    }

    /// Deletes the wishlist along with its items.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.session.call_empty(Method::DELETE, &format!("/wishlists/{}", id)).await
    }

    pub async fn subscribers(&self, id: Uuid) -> Result<Vec<EventSubscriber>> {
        let path = format!("/wishlists/{}/subscribers", id);
        self.session.call(Method::GET, &path, None::<&()>).await
    }
}
