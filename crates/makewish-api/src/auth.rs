use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use makewish_types::api::{
    Claims, LoginRequest, MessageResponse, RecoverRequest, SessionResponse, SignUpRequest,
    UpdateUserRequest, VerifyRecoveryRequest,
};
use makewish_types::models::User;

use crate::error::ApiError;
use crate::mail;
use crate::middleware::CurrentUser;
use crate::state::{AppState, with_db};

const SESSION_TTL_DAYS: i64 = 30;
const RECOVERY_TTL_MINUTES: i64 = 60;
const MIN_PASSWORD_LEN: usize = 8;

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let user = with_db(&state, move |db| {
        if db.get_user_by_email(&email)?.is_some() {
            return Ok(None);
        }
        let password_hash = hash_password(&req.password)?;
        // A concurrent signup for the same email can still win the insert.
        db.create_user(Uuid::new_v4(), &email, &password_hash, Utc::now())
    })
    .await?
    .ok_or_else(|| ApiError::Conflict("an account with this email already exists".into()))?;

    info!("User {} signed up", user.id);
    let session = create_session(&state.jwt_secret, user)?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let email = req.email.trim().to_string();
    let user = with_db(&state, move |db| {
        let Some(row) = db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        if !verify_password(&req.password, &row.password)? {
            return Ok(None);
        }
        User::try_from(row).map(Some)
    })
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    Ok(Json(create_session(&state.jwt_secret, user)?))
}

/// Issues a fresh token for a still-valid session.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<SessionResponse>, ApiError> {
    let user = load_user(&state, current.id).await?;
    Ok(Json(create_session(&state.jwt_secret, user)?))
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(load_user(&state, current.id).await?))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    validate_password(&req.password)?;

    let user_id = current.id;
    let updated = with_db(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        db.update_user_password(user_id, &password_hash)
    })
    .await?;
    if !updated {
        return Err(ApiError::Unauthorized);
    }

    info!("User {} changed their password", user_id);
    Ok(Json(load_user(&state, user_id).await?))
}

/// Sends a simulated password-reset mail. Always answers 202 so the
/// endpoint does not reveal which emails have accounts.
pub async fn recover(
    State(state): State<AppState>,
    Json(req): Json<RecoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    let token = generate_recovery_token();
    let token_hash = hash_token(&token);

    let user_email = with_db(&state, move |db| {
        let Some(row) = db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        let expires_at = Utc::now() + Duration::minutes(RECOVERY_TTL_MINUTES);
        db.insert_password_reset(&token_hash, row.id.parse()?, expires_at)?;
        Ok(Some(row.email))
    })
    .await?;

    match user_email {
        Some(to) => {
            let link = format!("{}/update-password#token={}", state.public_url, token);
            mail::deliver(&mail::password_reset(&to, &link));
        }
        None => warn!("Password reset requested for unknown email"),
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "If an account exists, a password reset link has been sent".into(),
        }),
    ))
}

/// Exchanges a reset token for a session.
pub async fn verify_recovery(
    State(state): State<AppState>,
    Json(req): Json<VerifyRecoveryRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let token_hash = hash_token(req.token.trim());
    let user_id = with_db(&state, move |db| db.consume_password_reset(&token_hash, Utc::now()))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let user = load_user(&state, user_id).await?;
    Ok(Json(create_session(&state.jwt_secret, user)?))
}

async fn load_user(state: &AppState, id: Uuid) -> Result<User, ApiError> {
    with_db(state, move |db| db.get_user_by_id(id)?.map(User::try_from).transpose())
        .await?
        .ok_or(ApiError::Unauthorized)
}

pub fn create_session(secret: &str, user: User) -> anyhow::Result<SessionResponse> {
    let exp = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).timestamp();
    let expires_at = DateTime::<Utc>::from_timestamp(exp, 0)
        .ok_or_else(|| anyhow::anyhow!("session expiry out of range"))?;
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: exp as usize,
    };

    let access_token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(SessionResponse {
        user,
        access_token,
        expires_at,
    })
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed =
        PasswordHash::new(stored).map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub(crate) fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim();
    let valid = email.len() <= 254
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !valid {
        return Err(ApiError::BadRequest("please enter a valid email address".into()));
    }
    Ok(email.to_string())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

fn generate_recovery_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    B64.encode(bytes)
}

/// Only the digest is stored, so a leaked table cannot be replayed.
fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
