use axum::{
    extract::{FromRef, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, AvatarResponse, LoginRequest, MessageResponse, PublicUser,
            RegisterRequest, RegisterResponse, ResendVerificationRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::User,
    },
    error::ApiError,
    mailer::verification_email,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/verify/:token", get(verify))
        .route("/auth/verify", post(resend_verification))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/current", get(current))
        .route("/users/logout", post(logout))
        .route("/users/subscription", patch(update_subscription))
        .route("/users/avatar", patch(update_avatar))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Single-use opaque token mailed out at registration.
fn new_verification_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(21)
        .map(char::from)
        .collect()
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::BadRequest("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::BadRequest("Password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already in use".into()));
    }

    let hash = hash_password(&payload.password)?;
    let token = new_verification_token();
    let user = User::create(&state.db, &payload.email, &payload.name, &hash, &token).await?;

    let (subject, html) = verification_email(&state.config.base_url, &token);
    state.mailer.send_html(&user.email, &subject, html).await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: PublicUser::from(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    // Unknown email and wrong password produce the same message so the
    // response does not reveal which one failed.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Email or password is wrong".into()))?;

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Unauthorized("Email or password is wrong".into()));
    }

    if !user.verified {
        warn!(user_id = %user.id, "login before verification");
        return Err(ApiError::Unauthorized("Email not verified".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    User::set_session_token(&state.db, user.id, Some(&token)).await?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: PublicUser::from(&user),
    }))
}

#[instrument(skip_all)]
async fn current(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[instrument(skip_all)]
async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<StatusCode, ApiError> {
    User::set_session_token(&state.db, user.id, None).await?;
    info!(user_id = %user.id, "user logged out");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip_all)]
async fn update_subscription(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    if user.subscribed {
        return Err(ApiError::Conflict("You have already subscribed".into()));
    }
    User::set_subscribed(&state.db, user.id).await?;
    Ok(Json(MessageResponse::new(
        "You successfully subscribed to newsletter",
    )))
}

#[instrument(skip_all)]
async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let mut upload: Option<(bytes::Bytes, String)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("avatar") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|_| ApiError::BadRequest("invalid multipart body".into()))?;
            upload = Some((data, content_type));
            break;
        }
    }
    let (data, content_type) =
        upload.ok_or_else(|| ApiError::BadRequest("avatar file is required".into()))?;

    let ext = ext_from_mime(&content_type).unwrap_or("bin");
    let key = format!("avatars/{}/{}.{}", user.id, Uuid::new_v4(), ext);
    state.storage.put_object(&key, data, &content_type).await?;

    let avatar_url = state.storage.object_url(&key);
    User::set_avatar_url(&state.db, user.id, &avatar_url).await?;

    info!(user_id = %user.id, %key, "avatar updated");
    Ok(Json(AvatarResponse { avatar_url }))
}

#[instrument(skip(state))]
async fn verify(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = User::find_by_verification_token(&state.db, &token)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    // Find-then-update, not atomic; a concurrent redemption of the same
    // token can slip through between the two statements.
    User::mark_verified(&state.db, user.id).await?;

    info!(user_id = %user.id, "email verified");
    Ok(Json(MessageResponse::new("Verification successful")))
}

#[instrument(skip(state, payload))]
async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if user.verified {
        return Err(ApiError::BadRequest(
            "Verification has already been passed".into(),
        ));
    }

    let token = user
        .verification_token
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("unverified user without verification token"))?;
    let (subject, html) = verification_email(&state.config.base_url, token);
    state.mailer.send_html(&user.email, &subject, html).await?;

    Ok(Json(MessageResponse::new("Verification email sent")))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_regex_accepts_plain_addresses() {
        assert!(is_valid_email("cook@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
    }

    #[test]
    fn email_regex_rejects_garbage() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn verification_token_is_21_alphanumeric_chars() {
        let token = new_verification_token();
        assert_eq!(token.len(), 21);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn verification_tokens_are_unique_enough() {
        let a = new_verification_token();
        let b = new_verification_token();
        assert_ne!(a, b);
    }

    #[test]
    fn ext_from_mime_covers_known_image_types() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }
}
