use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::uploads::{MAX_IMAGE_SIZE, PUBLIC_IMAGE_PATH};
use crate::{auth, functions, items, share, uploads, wishlists};

/// The whole platform API. Tracing is layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::sign_up))
        .route("/auth/login", post(auth::login))
        .route("/auth/recover", post(auth::recover))
        .route("/auth/recover/verify", post(auth::verify_recovery))
        .route("/share/{token}", get(share::get_shared_wishlist))
        .route("/share/{token}/items/{item_id}/hold", post(share::place_hold))
        .route("/share/{token}/subscribe", post(share::subscribe))
        .route(
            "/functions/v1/send-thank-you-email",
            post(functions::send_thank_you_email),
        )
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/user", get(auth::current_user).put(auth::update_user))
        .route(
            "/wishlists",
            get(wishlists::list_wishlists).post(wishlists::create_wishlist),
        )
        .route(
            "/wishlists/{id}",
            get(wishlists::get_wishlist)
                .patch(wishlists::update_wishlist)
                .delete(wishlists::delete_wishlist),
        )
        .route(
            "/wishlists/{id}/items",
            get(items::list_items).post(items::create_item),
        )
        .route("/wishlists/{id}/subscribers", get(wishlists::list_subscribers))
        .route("/items/{id}", patch(items::update_item).delete(items::delete_item))
        .route("/items/{id}/fulfill", post(items::fulfill_item))
        .route("/items/{id}/hold", delete(items::remove_hold))
        .route(
            "/storage/v1/object/images",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_SIZE)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(PUBLIC_IMAGE_PATH, ServeDir::new(state.storage.dir()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
