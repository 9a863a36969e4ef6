use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use makewish_types::api::{
    LoginRequest, MessageResponse, RecoverRequest, SessionResponse, SignUpRequest,
    UpdateUserRequest, VerifyRecoveryRequest,
};
use makewish_types::events::AuthEvent;
use makewish_types::models::User;

use crate::{ClientError, Platform, Result};

const EVENT_CAPACITY: usize = 16;

/// A signed-in user and the token that proves it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<SessionResponse> for Session {
    fn from(resp: SessionResponse) -> Self {
        Self {
            user: resp.user,
            access_token: resp.access_token,
            expires_at: resp.expires_at,
        }
    }
}

/// Owns the current session and announces every change to it.
///
/// Repositories read the token from here per call; the manager is the only
/// place a session is stored.
pub struct SessionManager {
    platform: Platform,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionManager {
    pub fn new(platform: Platform) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            platform,
            current: RwLock::new(None),
            events,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Receives every auth event from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    pub async fn access_token(&self) -> Result<String> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(ClientError::NotSignedIn)
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let resp: SessionResponse = self
            .platform
            .send(self.platform.request(Method::POST, "/auth/signup", None).json(&SignUpRequest {
                email: email.to_string(),
                password: password.to_string(),
            }))
            .await?;
        Ok(self.establish(resp, SignIn::Credentials).await)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let resp: SessionResponse = self
            .platform
            .send(self.platform.request(Method::POST, "/auth/login", None).json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            }))
            .await?;
        Ok(self.establish(resp, SignIn::Credentials).await)
    }

    /// Drops the local session. Tokens are stateless, so the platform is not called.
    pub async fn sign_out(&self) {
        let previous = self.current.write().await.take();
        if let Some(session) = previous {
            info!("User {} signed out", session.user.id);
            self.publish(AuthEvent::SignedOut);
        }
    }

    pub async fn refresh(&self) -> Result<Session> {
        let token = self.access_token().await?;
        let resp: SessionResponse = self
            .platform
            .send(self.platform.request(Method::POST, "/auth/refresh", Some(&token)))
            .await?;
        let session = Session::from(resp);
        let user_id = session.user.id;
        *self.current.write().await = Some(session.clone());
        self.publish(AuthEvent::TokenRefreshed { user_id });
        Ok(session)
    }

    pub async fn update_password(&self, password: &str) -> Result<User> {
        let token = self.access_token().await?;
        let user: User = self
            .platform
            .send(
                self.platform
                    .request(Method::PUT, "/auth/user", Some(&token))
                    .json(&UpdateUserRequest {
                        password: password.to_string(),
                    }),
            )
            .await?;
        self.publish(AuthEvent::UserUpdated { user_id: user.id });
        Ok(user)
    }

    /// Asks the platform to mail a reset link. Succeeds whether or not the
    /// email has an account.
    pub async fn request_password_reset(&self, email: &str) -> Result<MessageResponse> {
        self.platform
            .send(self.platform.request(Method::POST, "/auth/recover", None).json(&RecoverRequest {
                email: email.to_string(),
            }))
            .await
    }

    /// Signs in with the token from a reset link.
    pub async fn verify_recovery(&self, token: &str) -> Result<Session> {
        let resp: SessionResponse = self
            .platform
            .send(
                self.platform
                    .request(Method::POST, "/auth/recover/verify", None)
                    .json(&VerifyRecoveryRequest {
                        token: token.to_string(),
                    }),
            )
            .await?;
        Ok(self.establish(resp, SignIn::Recovery).await)
    }

    pub async fn user_id(&self) -> Option<Uuid> {
        self.current.read().await.as_ref().map(|s| s.user.id)
    }

    /// One authenticated request with an optional JSON body.
    pub(crate) async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let token = self.access_token().await?;
        let mut builder = self.platform.request(method, path, Some(&token));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.platform.send(builder).await
    }

    pub(crate) async fn call_empty(&self, method: Method, path: &str) -> Result<()> {
        let token = self.access_token().await?;
        self.platform
            .send_empty(self.platform.request(method, path, Some(&token)))
            .await
    }

    async fn establish(&self, resp: SessionResponse, how: SignIn) -> Session {
        let session = Session::from(resp);
        let user_id = session.user.id;
        let email = session.user.email.clone();
        *self.current.write().await = Some(session.clone());

        self.publish(match how {
            SignIn::Credentials => AuthEvent::SignedIn { user_id, email },
            SignIn::Recovery => AuthEvent::PasswordRecovery { user_id, email },
        });
        session
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers is fine.
        if self.events.send(event).is_err() {
            debug!("Auth event dropped, no subscribers");
        }
    }
}

enum SignIn {
    Credentials,
    Recovery,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signed_out_without_session() {
        let manager = SessionManager::new(Platform::new("http://127.0.0.1:9"));
        let mut events = manager.subscribe();

        assert!(manager.session().await.is_none());
        assert!(matches!(manager.access_token().await, Err(ClientError::NotSignedIn)));
        assert!(matches!(manager.refresh().await, Err(ClientError::NotSignedIn)));

        // Signing out with nothing to drop emits nothing.
        manager.sign_out().await;
        assert!(events.try_recv().is_err());
    }
}
