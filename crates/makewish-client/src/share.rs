use reqwest::Method;
use uuid::Uuid;

use makewish_types::api::{HoldRequest, SharedWishlist, SubscribeRequest};
use makewish_types::lifecycle::HoldClaim;
use makewish_types::models::{EventSubscriber, Item};

use crate::{Platform, Result};

/// Anonymous visitor access through a wishlist's share token.
#[derive(Debug, Clone)]
pub struct ShareResolver {
    platform: Platform,
}

impl ShareResolver {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// The wishlist behind `token` with every item and its current state.
    /// An unknown token is [`ClientError::NotFound`](crate::ClientError::NotFound).
    pub async fn resolve(&self, token: &str) -> Result<SharedWishlist> {
        self.platform
            .send(self.platform.request(Method::GET, &format!("/share/{}", token), None))
            .await
    }

    /// Holds an item for three days. Blank name or email fails before any
    /// request is made.
    pub async fn hold(&self, token: &str, item_id: Uuid, name: &str, email: &str) -> Result<Item> {
        let claim = HoldClaim::new(name, email)?;
        let req = HoldRequest {
            name: claim.name().to_string(),
            email: claim.email().to_string(),
        };
        self.platform
            .send(
                self.platform
                    .request(
                        Method::POST,
                        &format!("/share/{}/items/{}/hold", token, item_id),
                        None,
                    )
                    .json(&req),
            )
            .await
    }

    /// Asks for a reminder mail shortly before the wishlist's event.
    pub async fn subscribe(&self, token: &str, email: &str) -> Result<EventSubscriber> {
        self.platform
            .send(
                self.platform
                    .request(Method::POST, &format!("/share/{}/subscribe", token), None)
                    .json(&SubscribeRequest {
                        email: email.to_string(),
                    }),
            )
            .await
    }

    /// The link a visitor opens for `token`.
    pub fn share_url(&self, token: &str) -> String {
        format!("{}/share/{}", self.platform.base_url(), token)
    }
}
