use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};

use makewish_types::api::UploadResponse;

use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::state::{AppState, with_db};

/// 5 MB upload limit for item images
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

/// Route prefix the image bucket is served under.
pub const PUBLIC_IMAGE_PATH: &str = "/storage/v1/object/public/images";

/// POST /storage/v1/object/images
///
/// Accepts the raw image body and returns
/// the public URL to store on an item.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let extension = image_extension(content_type).ok_or(ApiError::UnsupportedMediaType)?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("image is empty".into()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::PayloadTooLarge { max: MAX_IMAGE_SIZE });
    }

    let name = state.storage.save(extension, &bytes).await?;

    // The uploader is recorded so only they can ever remove the object.
    let user_id = current.id;
    let recorded = {
        let name = name.clone();
        with_db(&state, move |db| db.record_image(&name, user_id, Utc::now())).await
    };
    if let Err(e) = recorded {
        if let Err(cleanup) = state.storage.delete(&name).await {
            warn!("Failed to remove unrecorded image {}: {}", name, cleanup);
        }
        return Err(e);
    }
    info!("User {} uploaded image {}", current.id, name);

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            public_url: public_image_url(&state.public_url, &name),
            path: name,
        }),
    ))
}

pub fn public_image_url(base: &str, name: &str) -> String {
    format!("{}{}/{}", base.trim_end_matches('/'), PUBLIC_IMAGE_PATH, name)
}

/// The stored object name behind a public URL, if it points into our bucket.
pub fn stored_image_name<'a>(base: &str, url: &'a str) -> Option<&'a str> {
    let prefix = format!("{}{}/", base.trim_end_matches('/'), PUBLIC_IMAGE_PATH);
    url.strip_prefix(prefix.as_str())
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

fn image_extension(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim();
    match mime.to_ascii_lowercase().as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("image/png"), Some("png"));
        assert_eq!(image_extension("IMAGE/JPEG; charset=binary"), Some("jpg"));
        assert_eq!(image_extension("text/html"), None);
        assert_eq!(image_extension(""), None);
    }

    #[test]
    fn test_public_url_round_trip() {
        let url = public_image_url("http://localhost:3000/", "abc.png");
        assert_eq!(url, "http://localhost:3000/storage/v1/object/public/images/abc.png");
        assert_eq!(stored_image_name("http://localhost:3000", &url), Some("abc.png"));
        assert_eq!(stored_image_name("http://localhost:3000", "https://cdn.example/abc.png"), None);
    }
}
