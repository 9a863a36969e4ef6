use std::sync::Arc;

use reqwest::Method;

use makewish_types::api::UploadResponse;

use crate::Result;
use crate::session::SessionManager;

/// The public image bucket items point their `image_url` at.
#[derive(Clone)]
pub struct ImageBucket {
    session: Arc<SessionManager>,
}

impl ImageBucket {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    /// Uploads raw image bytes; `content_type` must be png, jpeg, gif or webp.
    pub async fn upload(&self, content_type: &str, data: Vec<u8>) -> Result<UploadResponse> {
        let token = self.session.access_token().await?;
        let platform = self.session.platform();
        platform
            .send(
                platform
                    .request(Method::POST, "/storage/v1/object/images", Some(&token))
                    .header("Content-Type", content_type)
                    .body(data),
            )
            .await
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/images/{}",
            self.session.platform().base_url(),
            path
        )
    }
}
