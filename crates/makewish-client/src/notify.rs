use reqwest::Method;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use makewish_types::api::{MessageResponse, ThankYouEmailRequest};
use makewish_types::models::Item;

use crate::{Platform, Result};

const FUNCTION_PATH: &str = "/functions/v1/send-thank-you-email";

/// Fire-and-forget thank-you mail after a fulfillment.
#[derive(Debug, Clone)]
pub struct NotificationTrigger {
    platform: Platform,
}

impl NotificationTrigger {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// The thank-you payload for a fulfilled item, if someone held it.
    pub fn payload_for(item: &Item, wishlist_title: &str) -> Option<ThankYouEmailRequest> {
        let (name, email) = item.holder()?;
        Some(ThankYouEmailRequest {
            recipient_email: email.to_string(),
            recipient_name: name.to_string(),
            item_name: item.product_name.clone(),
            wishlist_title: wishlist_title.to_string(),
        })
    }

    /// Sends in the background. A failure is logged and dropped; the
    /// fulfillment that triggered it stands either way.
    pub fn fire(&self, req: ThankYouEmailRequest) -> JoinHandle<()> {
        let trigger = self.clone();
        tokio::spawn(async move {
            match trigger.invoke(&req).await {
                Ok(resp) => info!("{}", resp.message),
                Err(e) => warn!("Thank-you email to {} failed: {}", req.recipient_email, e),
            }
        })
    }

    pub async fn invoke(&self, req: &ThankYouEmailRequest) -> Result<MessageResponse> {
        self.platform
            .send(self.platform.request(Method::POST, FUNCTION_PATH, None).json(req))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn item() -> Item {
        Item {
            id: Uuid::new_v4(),
            wishlist_id: Uuid::new_v4(),
            product_name: "Lamp".into(),
            product_url: String::new(),
            price: "40".into(),
            image_url: None,
            held_by: None,
            held_by_email: None,
            held_until: None,
            is_fulfilled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_payload_without_holder() {
        assert!(NotificationTrigger::payload_for(&item(), "Birthday").is_none());
    }

    #[test]
    fn test_payload_from_holder() {
        let mut item = item();
        item.held_by = Some("Ann".into());
        item.held_by_email = Some("a@x.com".into());

        let req = NotificationTrigger::payload_for(&item, "Birthday").unwrap();
        assert_eq!(req.recipient_email, "a@x.com");
        assert_eq!(req.recipient_name, "Ann");
        assert_eq!(req.item_name, "Lamp");
        assert_eq!(req.wishlist_title, "Birthday");
    }

    #[tokio::test]
    async fn test_fire_swallows_failures() {
        let trigger = NotificationTrigger::new(Platform::new("http://127.0.0.1:9"));
        let mut item = item();
        item.held_by = Some("Ann".into());
        item.held_by_email = Some("a@x.com".into());

        let handle = trigger.fire(NotificationTrigger::payload_for(&item, "Birthday").unwrap());
        assert!(handle.await.is_ok());
    }
}
