use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use axum::extract::Request;
use axum::middleware::{self, Next};
use chrono::{Duration, NaiveDate, Utc};
use tempfile::TempDir;
use uuid::Uuid;

use makewish_api::routes::router;
use makewish_api::state::{AppState, AppStateInner};
use makewish_api::storage::Storage;
use makewish_client::{
    ClientError, ImageBucket, ItemRepository, NotificationTrigger, Platform, SessionManager,
    ShareResolver, WishlistRepository,
};
use makewish_db::Database;
use makewish_types::api::{CreateItemRequest, UpdateItemRequest, UpdateWishlistRequest};
use makewish_types::events::AuthEvent;
use makewish_types::lifecycle::{ItemState, HOLD_WINDOW_DAYS};
use makewish_types::models::Wishlist;

const THANK_YOU_PATH: &str = "/functions/v1/send-thank-you-email";

struct TestPlatform {
    base_url: String,
    thank_yous: Arc<AtomicUsize>,
    _storage: TempDir,
}

impl TestPlatform {
    /// Thank-you calls are fired in the background, so wait for `expected`
    /// of them, then a little longer to catch any extra one.
    async fn settled_thank_yous(&self, expected: usize) -> usize {
        for _ in 0..100 {
            if self.thank_yous.load(Ordering::SeqCst) >= expected {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        self.thank_yous.load(Ordering::SeqCst)
    }
}

async fn spawn_platform() -> TestPlatform {
    let storage_dir = tempfile::tempdir().unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let state: AppState = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        storage: Storage::new(storage_dir.path().join("images")).await.unwrap(),
        jwt_secret: "test-secret".into(),
        public_url: base_url.clone(),
    });

    let thank_yous = Arc::new(AtomicUsize::new(0));
    let counter = thank_yous.clone();
    let app = router(state).layer(middleware::from_fn(move |req: Request, next: Next| {
        let counter = counter.clone();
        async move {
            if req.uri().path() == THANK_YOU_PATH {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            next.run(req).await
        }
    }));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestPlatform {
        base_url,
        thank_yous,
        _storage: storage_dir,
    }
}

struct Owner {
    session: Arc<SessionManager>,
    wishlists: WishlistRepository,
    items: ItemRepository,
}

async fn sign_up(platform: &TestPlatform, email: &str) -> Owner {
    let session = Arc::new(SessionManager::new(Platform::new(&platform.base_url)));
    session.sign_up(email, "correct horse").await.unwrap();
    Owner {
        wishlists: WishlistRepository::new(session.clone()),
        items: ItemRepository::new(session.clone()),
        session,
    }
}

fn lamp() -> CreateItemRequest {
    CreateItemRequest {
        product_name: "Lamp".into(),
        product_url: "https://shop.example/lamp".into(),
        price: "$40".into(),
        image_url: None,
    }
}

async fn birthday_with_lamp(owner: &Owner) -> (Wishlist, Uuid) {
    let wishlist = owner.wishlists.create("Birthday", None).await.unwrap();
    let item = owner.items.create(wishlist.id, &lamp()).await.unwrap();
    (wishlist, item.id)
}

#[tokio::test]
async fn test_lamp_hold_then_fulfill() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let (wishlist, lamp_id) = birthday_with_lamp(&owner).await;
    let visitor = ShareResolver::new(Platform::new(&platform.base_url));

    let shared = visitor.resolve(&wishlist.share_token).await.unwrap();
    assert_eq!(shared.wishlist.id, wishlist.id);
    assert_eq!(shared.items.len(), 1);
    assert_eq!(shared.items[0].state, ItemState::Available);

    let before = Utc::now();
    let held = visitor
        .hold(&wishlist.share_token, lamp_id, " Ann ", "a@x.com")
        .await
        .unwrap();
    let after = Utc::now();

    assert_eq!(held.held_by.as_deref(), Some("Ann"));
    assert_eq!(held.held_by_email.as_deref(), Some("a@x.com"));
    let until = held.held_until.unwrap();
    assert!(until >= before + Duration::days(HOLD_WINDOW_DAYS));
    assert!(until <= after + Duration::days(HOLD_WINDOW_DAYS));
    assert!(!held.is_fulfilled);

    let shared = visitor.resolve(&wishlist.share_token).await.unwrap();
    assert_eq!(shared.items[0].state, ItemState::Held);

    // A second visitor cannot take over an active hold.
    let err = visitor
        .hold(&wishlist.share_token, lamp_id, "Bob", "b@x.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));

    let fulfilled = owner.items.mark_fulfilled(&held, &wishlist.title).await.unwrap();
    assert!(fulfilled.is_fulfilled);
    assert_eq!(fulfilled.held_by.as_deref(), Some("Ann"));
    assert_eq!(fulfilled.held_until, held.held_until);
    // Held-ness is still read from the timestamp alone.
    assert!(fulfilled.is_held());

    let shared = visitor.resolve(&wishlist.share_token).await.unwrap();
    assert_eq!(shared.items[0].state, ItemState::Fulfilled);

    let err = visitor
        .hold(&wishlist.share_token, lamp_id, "Bob", "b@x.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));
}

#[tokio::test]
async fn test_remove_hold_keeps_fulfillment() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let (wishlist, lamp_id) = birthday_with_lamp(&owner).await;
    let visitor = ShareResolver::new(Platform::new(&platform.base_url));

    let held = visitor
        .hold(&wishlist.share_token, lamp_id, "Ann", "a@x.com")
        .await
        .unwrap();
    owner.items.mark_fulfilled(&held, &wishlist.title).await.unwrap();

    let cleared = owner.items.remove_hold(lamp_id).await.unwrap();
    assert_eq!(cleared.held_by, None);
    assert_eq!(cleared.held_by_email, None);
    assert_eq!(cleared.held_until, None);
    assert!(cleared.is_fulfilled);
    assert_eq!(cleared.state(), ItemState::Fulfilled);
}

#[tokio::test]
async fn test_fulfill_without_hold() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let (wishlist, _) = birthday_with_lamp(&owner).await;

    let item = owner.items.list(wishlist.id).await.unwrap().remove(0);
    let fulfilled = owner.items.mark_fulfilled(&item, &wishlist.title).await.unwrap();
    assert!(fulfilled.is_fulfilled);
    assert_eq!(fulfilled.held_by, None);

    // Marking again is a no-op.
    let again = owner.items.mark_fulfilled(&fulfilled, &wishlist.title).await.unwrap();
    assert_eq!(again, fulfilled);

    assert_eq!(platform.settled_thank_yous(0).await, 0);
}

#[tokio::test]
async fn test_thank_you_sent_once_per_fulfillment() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let (wishlist, lamp_id) = birthday_with_lamp(&owner).await;
    let visitor = ShareResolver::new(Platform::new(&platform.base_url));

    let held = visitor
        .hold(&wishlist.share_token, lamp_id, "Ann", "a@x.com")
        .await
        .unwrap();
    owner.items.mark_fulfilled(&held, &wishlist.title).await.unwrap();
    assert_eq!(platform.settled_thank_yous(1).await, 1);

    // A second tab still showing the unfulfilled copy must not thank Ann twice.
    assert!(!held.is_fulfilled);
    let again = owner.items.mark_fulfilled(&held, &wishlist.title).await.unwrap();
    assert!(again.is_fulfilled);
    assert_eq!(platform.settled_thank_yous(2).await, 1);
}

#[tokio::test]
async fn test_unknown_token_is_not_found() {
    let platform = spawn_platform().await;
    let visitor = ShareResolver::new(Platform::new(&platform.base_url));

    let err = visitor.resolve("nosuchtoken0").await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(ref msg) if msg == "wishlist not found"));
}

#[tokio::test]
async fn test_item_from_another_wishlist_is_not_found() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let (_, lamp_id) = birthday_with_lamp(&owner).await;
    let other = owner.wishlists.create("Wedding", None).await.unwrap();
    let visitor = ShareResolver::new(Platform::new(&platform.base_url));

    let err = visitor
        .hold(&other.share_token, lamp_id, "Ann", "a@x.com")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_wishlists_are_private_to_their_owner() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let stranger = sign_up(&platform, "stranger@x.com").await;
    let (wishlist, lamp_id) = birthday_with_lamp(&owner).await;

    assert!(stranger.wishlists.list().await.unwrap().is_empty());
    assert!(matches!(
        stranger.wishlists.get(wishlist.id).await,
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        stranger.items.remove_hold(lamp_id).await,
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        stranger.wishlists.delete(wishlist.id).await,
        Err(ClientError::NotFound(_))
    ));
    assert_eq!(owner.wishlists.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_and_delete_wishlist() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let date = NaiveDate::from_ymd_opt(2026, 12, 24).unwrap();
    let wishlist = owner.wishlists.create("  Xmas ", Some(date)).await.unwrap();
    assert_eq!(wishlist.title, "Xmas");
    assert_eq!(wishlist.share_token.len(), 12);

    let renamed = owner
        .wishlists
        .update(
            wishlist.id,
            &UpdateWishlistRequest {
                title: Some("Christmas".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.title, "Christmas");
    assert_eq!(renamed.event_date, Some(date));

    let cleared = owner
        .wishlists
        .update(
            wishlist.id,
            &UpdateWishlistRequest {
                title: None,
                event_date: Some(None),
            },
        )
        .await
        .unwrap();
    assert_eq!(cleared.event_date, None);

    owner.items.create(wishlist.id, &lamp()).await.unwrap();
    owner.wishlists.delete(wishlist.id).await.unwrap();

    let visitor = ShareResolver::new(Platform::new(&platform.base_url));
    assert!(matches!(
        visitor.resolve(&wishlist.share_token).await,
        Err(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_blank_wishlist_title_rejected() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;

    let err = owner.wishlists.create("   ", None).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_session_events() {
    let platform = spawn_platform().await;
    let session = Arc::new(SessionManager::new(Platform::new(&platform.base_url)));
    let mut events = session.subscribe();

    let signed_in = session.sign_up("ann@x.com", "correct horse").await.unwrap();
    let user_id = signed_in.user.id;
    assert_eq!(
        events.recv().await.unwrap(),
        AuthEvent::SignedIn {
            user_id,
            email: "ann@x.com".into()
        }
    );

    session.refresh().await.unwrap();
    assert_eq!(events.recv().await.unwrap(), AuthEvent::TokenRefreshed { user_id });

    session.update_password("battery staple").await.unwrap();
    assert_eq!(events.recv().await.unwrap(), AuthEvent::UserUpdated { user_id });

    session.sign_out().await;
    assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
    assert!(session.session().await.is_none());

    let wishlists = WishlistRepository::new(session.clone());
    assert!(matches!(wishlists.list().await, Err(ClientError::NotSignedIn)));

    let err = session.sign_in("ann@x.com", "correct horse").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }));

    session.sign_in("ann@x.com", "battery staple").await.unwrap();
    assert_eq!(session.user_id().await, Some(user_id));
}

#[tokio::test]
async fn test_duplicate_sign_up_conflicts() {
    let platform = spawn_platform().await;
    sign_up(&platform, "ann@x.com").await;

    let session = SessionManager::new(Platform::new(&platform.base_url));
    let err = session.sign_up("ANN@x.com", "correct horse").await.unwrap_err();
    assert!(matches!(err, ClientError::Conflict(_)));
}

#[tokio::test]
async fn test_password_reset_request_is_always_accepted() {
    let platform = spawn_platform().await;
    sign_up(&platform, "ann@x.com").await;
    let session = SessionManager::new(Platform::new(&platform.base_url));

    let known = session.request_password_reset("ann@x.com").await.unwrap();
    let unknown = session.request_password_reset("nobody@x.com").await.unwrap();
    assert_eq!(known.message, unknown.message);

    let err = session.verify_recovery("bogus").await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
}

#[tokio::test]
async fn test_subscribe_is_idempotent() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let (wishlist, _) = birthday_with_lamp(&owner).await;
    let visitor = ShareResolver::new(Platform::new(&platform.base_url));

    let first = visitor.subscribe(&wishlist.share_token, "g@x.com").await.unwrap();
    let second = visitor.subscribe(&wishlist.share_token, " G@x.com ").await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.reminded_at, None);

    let subscribers = owner.wishlists.subscribers(wishlist.id).await.unwrap();
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].email, "g@x.com");
}

#[tokio::test]
async fn test_image_upload_and_cleanup() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let bucket = ImageBucket::new(owner.session.clone());
    let wishlist = owner.wishlists.create("Birthday", None).await.unwrap();

    let png = b"\x89PNG\r\n\x1a\n not really a png".to_vec();
    let uploaded = bucket.upload("image/png", png.clone()).await.unwrap();
    assert!(uploaded.path.ends_with(".png"));
    assert_eq!(uploaded.public_url, bucket.public_url(&uploaded.path));

    let fetched = reqwest::get(&uploaded.public_url).await.unwrap();
    assert!(fetched.status().is_success());
    assert_eq!(fetched.bytes().await.unwrap().to_vec(), png);

    let item = owner
        .items
        .create(
            wishlist.id,
            &CreateItemRequest {
                image_url: Some(uploaded.public_url.clone()),
                ..lamp()
            },
        )
        .await
        .unwrap();
    owner.items.delete(item.id).await.unwrap();

    let gone = reqwest::get(&uploaded.public_url).await.unwrap();
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

    let err = bucket.upload("text/plain", b"hello".to_vec()).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 415, .. }));
}

#[tokio::test]
async fn test_image_kept_while_another_item_uses_it() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let bucket = ImageBucket::new(owner.session.clone());
    let wishlist = owner.wishlists.create("Birthday", None).await.unwrap();

    let uploaded = bucket.upload("image/png", b"png bytes".to_vec()).await.unwrap();
    let with_image = CreateItemRequest {
        image_url: Some(uploaded.public_url.clone()),
        ..lamp()
    };
    let first = owner.items.create(wishlist.id, &with_image).await.unwrap();
    owner.items.create(wishlist.id, &with_image).await.unwrap();

    owner.items.delete(first.id).await.unwrap();
    let kept = reqwest::get(&uploaded.public_url).await.unwrap();
    assert!(kept.status().is_success());

    // Deleting the wishlist drops the last reference.
    owner.wishlists.delete(wishlist.id).await.unwrap();
    let gone = reqwest::get(&uploaded.public_url).await.unwrap();
    assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_uploader_can_discard_image() {
    let platform = spawn_platform().await;
    let owner = sign_up(&platform, "owner@x.com").await;
    let stranger = sign_up(&platform, "stranger@x.com").await;
    let bucket = ImageBucket::new(owner.session.clone());

    let uploaded = bucket.upload("image/png", b"png bytes".to_vec()).await.unwrap();
    let with_image = CreateItemRequest {
        image_url: Some(uploaded.public_url.clone()),
        ..lamp()
    };
    let wishlist = owner.wishlists.create("Birthday", None).await.unwrap();
    let mine = owner.items.create(wishlist.id, &with_image).await.unwrap();

    // The stranger's item keeps the file alive through the owner's delete.
    // Dropping that reference later must still leave the file alone.
    let theirs = stranger.wishlists.create("Heist", None).await.unwrap();
    let borrowed = stranger.items.create(theirs.id, &with_image).await.unwrap();
    owner.items.delete(mine.id).await.unwrap();
    stranger
        .items
        .update(
            borrowed.id,
            &UpdateItemRequest {
                image_url: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let second = stranger.items.create(theirs.id, &with_image).await.unwrap();
    stranger.items.delete(second.id).await.unwrap();

    let fetched = reqwest::get(&uploaded.public_url).await.unwrap();
    assert!(fetched.status().is_success());
}

#[tokio::test]
async fn test_thank_you_function() {
    let platform = spawn_platform().await;
    let trigger = NotificationTrigger::new(Platform::new(&platform.base_url));

    let resp = trigger
        .invoke(&makewish_types::api::ThankYouEmailRequest {
            recipient_email: "a@x.com".into(),
            recipient_name: "Ann".into(),
            item_name: "Lamp".into(),
            wishlist_title: "Birthday".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.message, "Simulated email sent successfully to a@x.com");

    let resp = reqwest::Client::new()
        .post(format!("{}/functions/v1/send-thank-you-email", platform.base_url))
        .header("Content-Type", "application/json")
        .body(r#"{"recipientEmail": 42}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}
