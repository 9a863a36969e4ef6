use std::sync::Arc;

use reqwest::Method;
use uuid::Uuid;

use makewish_types::api::{CreateItemRequest, FulfillResponse, UpdateItemRequest};
use makewish_types::models::Item;

use crate::Result;
use crate::notify::NotificationTrigger;
use crate::session::SessionManager;

/// Items of the signed-in owner's wishlists.
#[derive(Clone)]
pub struct ItemRepository {
    session: Arc<SessionManager>,
    trigger: NotificationTrigger,
}

impl ItemRepository {
    pub fn new(session: Arc<SessionManager>) -> Self {
        let trigger = NotificationTrigger::new(session.platform().clone());
        Self { session, trigger }
    }

    pub async fn list(&self, wishlist_id: Uuid) -> Result<Vec<Item>> {
        let path = format!("/wishlists/{}/items", wishlist_id);
        self.session.call(Method::GET, &path, None::<&()>).await
    }

    pub async fn create(&self, wishlist_id: Uuid, req: &CreateItemRequest) -> Result<Item> {
        let path = format!("/wishlists/{}/items", wishlist_id);
        self.session.call(Method::POST, &path, Some(req)).await
    }

    pub async fn update(&self, id: Uuid, changes: &UpdateItemRequest) -> Result<Item> {
        let path = format!("/items/{}", id);
        self.session.call(Method::PATCH, &path, Some(changes)).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.session.call_empty(Method::DELETE, &format!("/items/{}", id)).await
    }

    /// Clears the hold. Fulfillment is left as it was.
    pub async fn remove_hold(&self, id: Uuid) -> Result<Item> {
        let path = format!("/items/{}/hold", id);
        self.session.call(Method::DELETE, &path, None::<&()>).await
    }

    /// Marks `item` fulfilled and, if someone held it, sends them a thank-you
    /// in the background. Only the call the platform reports as the actual
    /// transition sends one, however stale `item` is.
    pub async fn mark_fulfilled(&self, item: &Item, wishlist_title: &str) -> Result<Item> {
        let path = format!("/items/{}/fulfill", item.id);
        let resp: FulfillResponse = self.session.call(Method::POST, &path, None::<&()>).await?;

        if resp.newly_fulfilled {
            if let Some(req) = NotificationTrigger::payload_for(&resp.item, wishlist_title) {
                self.trigger.fire(req);
            }
        }
        Ok(resp.item)
    }
}
