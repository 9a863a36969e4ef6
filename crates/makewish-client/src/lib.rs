//! Typed client for the Make Wish platform.
//!
//! Each repository maps one UI action to one HTTP call and hands back the
//! platform's answer. Nothing is cached or retried.

pub mod items;
pub mod notify;
pub mod session;
pub mod share;
pub mod storage;
pub mod wishlists;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use makewish_types::api::ErrorBody;
use makewish_types::lifecycle::HoldError;

pub use items::ItemRepository;
pub use notify::NotificationTrigger;
pub use session::{Session, SessionManager};
pub use share::ShareResolver;
pub use storage::ImageBucket;
pub use wishlists::WishlistRepository;

/// Any failure a UI action can surface. None of them is retried.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message} ({status})")]
    Api { status: u16, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Validation(#[from] HoldError),

    #[error("not signed in")]
    NotSignedIn,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Connection to one platform instance.
#[derive(Debug, Clone)]
pub struct Platform {
    http: Client,
    base_url: String,
}

impl Platform {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    pub(crate) async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = check(builder.send().await?).await?;
        Ok(resp.json().await?)
    }

    pub(crate) async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        check(builder.send().await?).await?;
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or(body);

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        _ => ClientError::Api {
            status: status.as_u16(),
            message,
        },
    })
}
