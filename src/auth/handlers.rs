use std::fmt::Write as _;

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            LoginRequest, MessageResponse, RefreshRequest, RequestEmail, SignupRequest,
            SignupResponse, TokenPair,
        },
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::User,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/confirm/:token", get(confirm_email))
        .route("/auth/request-confirm", post(request_confirm))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Deterministic default avatar for a fresh account (Gravatar address hash).
pub(crate) fn gravatar_url(email: &str) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    let mut hash = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hash, "{:02x}", byte);
    }
    format!("https://www.gravatar.com/avatar/{}?d=identicon", hash)
}

fn send_confirmation_in_background(state: &AppState, user: &User) {
    let keys = JwtKeys::from_ref(state);
    let token = match keys.sign_confirm(user.id) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, user_id = %user.id, "jwt sign confirm failed");
            return;
        }
    };
    let confirm_url = format!("{}/api/v1/auth/confirm/{}", state.config.base_url, token);
    let mailer = state.mailer.clone();
    let to = user.email.clone();
    let username = user.username.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send_confirmation(&to, &username, &confirm_url).await {
            error!(error = %e, to = %to, "confirmation email failed");
        }
    });
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();
    payload.username = payload.username.trim().to_string();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    if payload.username.len() < 5 || payload.username.len() > 16 {
        warn!("invalid username length");
        return Err((
            StatusCode::BAD_REQUEST,
            "Username must be 5 to 16 characters".into(),
        ));
    }

    if payload.password.len() < 6 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    // Ensure email is not taken
    if let Ok(Some(_)) = User::find_by_email(&state.db, &payload.email).await {
        warn!(email = %payload.email, "email already registered");
        return Err((StatusCode::CONFLICT, "Account already exists".into()));
    }

    let hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            error!(error = %e, "hash_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    let avatar = gravatar_url(&payload.email);
    let user = match User::create(
        &state.db,
        &payload.username,
        &payload.email,
        &hash,
        Some(&avatar),
    )
    .await
    {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    send_confirmation_in_background(&state, &user);

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: user.into(),
            detail: "User successfully created. Check your email for confirmation.".into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    let user = match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(email = %payload.email, "login unknown email");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if !user.confirmed {
        warn!(user_id = %user.id, "login before email confirmation");
        return Err((StatusCode::UNAUTHORIZED, "Email not confirmed".into()));
    }

    let ok = match verify_password(&payload.password, &user.password_hash) {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "verify_password failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
    }

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys
        .sign_access(user.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let refresh_token = keys
        .sign_refresh(user.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    User::update_refresh_token(&state.db, user.id, Some(&refresh_token))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(TokenPair::bearer(access_token, refresh_token)))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    let user = match User::find_by_id(&state.db, claims.sub).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        Err(e) => {
            error!(error = %e, "find_by_id failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    // A token that verified but is not the one on record means it was
    // rotated out or stolen; revoke the stored one.
    if user.refresh_token.as_deref() != Some(payload.refresh_token.as_str()) {
        warn!(user_id = %user.id, "refresh token mismatch, revoking");
        if let Err(e) = User::update_refresh_token(&state.db, user.id, None).await {
            error!(error = %e, "revoke refresh token failed");
        }
        return Err((StatusCode::UNAUTHORIZED, "Invalid refresh token".into()));
    }

    let access_token = keys
        .sign_access(user.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    let refresh_token = keys
        .sign_refresh(user.id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    User::update_refresh_token(&state.db, user.id, Some(&refresh_token))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, "token pair refreshed");
    Ok(Json(TokenPair::bearer(access_token, refresh_token)))
}

#[instrument(skip(state, token))]
pub async fn confirm_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_confirm(&token).map_err(|e| {
        warn!(error = %e, "invalid confirmation token");
        (StatusCode::BAD_REQUEST, "Verification error".to_string())
    })?;

    let user = match User::find_by_id(&state.db, claims.sub).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err((StatusCode::BAD_REQUEST, "Verification error".into())),
        Err(e) => {
            error!(error = %e, "find_by_id failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    if user.confirmed {
        return Ok(Json(MessageResponse {
            message: "Your email is already confirmed".into(),
        }));
    }

    User::confirm_email(&state.db, user.id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user.id, "email confirmed");
    Ok(Json(MessageResponse {
        message: "Email confirmed".into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn request_confirm(
    State(state): State<AppState>,
    Json(mut payload): Json<RequestEmail>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    match User::find_by_email(&state.db, &payload.email).await {
        Ok(Some(user)) if user.confirmed => {
            return Ok(Json(MessageResponse {
                message: "Your email is already confirmed".into(),
            }));
        }
        Ok(Some(user)) => send_confirmation_in_background(&state, &user),
        // Answer identically for unknown addresses.
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "find_by_email failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    }

    Ok(Json(MessageResponse {
        message: "Check your email for confirmation.".into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn gravatar_url_is_case_insensitive_and_hex() {
        let a = gravatar_url("User@Example.com");
        let b = gravatar_url("  user@example.com ");
        assert_eq!(a, b);
        assert!(a.starts_with("https://www.gravatar.com/avatar/"));
        let hash = a
            .trim_start_matches("https://www.gravatar.com/avatar/")
            .trim_end_matches("?d=identicon");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
