use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use bytes::Bytes;
use tracing::{error, info, instrument};

use crate::{
    auth::{dto::PublicUser, jwt::AuthUser, repo::User},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(get_me))
        .route("/users/avatar", patch(update_avatar))
        .layer(DefaultBodyLimit::max(5 * 1024 * 1024)) // 5MB
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let user = match User::find_by_id(&state.db, user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            error!(user_id = %user_id, "user not found");
            return Err((StatusCode::UNAUTHORIZED, "User not found".into()));
        }
        Err(e) => {
            error!(error = %e, "find_by_id failed");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    Ok(Json(user.into()))
}

/// PATCH /users/avatar (multipart, single `file` field)
#[instrument(skip(state, mp))]
pub async fn update_avatar(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<PublicUser>, (StatusCode, String)> {
    let mut upload: Option<(Bytes, String)> = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            upload = Some((data, content_type));
        }
    }

    let Some((body, content_type)) = upload else {
        return Err((StatusCode::BAD_REQUEST, "file is required".into()));
    };

    let Some(ext) = ext_from_mime(&content_type) else {
        return Err((StatusCode::BAD_REQUEST, "unsupported image type".into()));
    };

    let user = match User::find_by_id(&state.db, user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err((StatusCode::UNAUTHORIZED, "User not found".into())),
        Err(e) => return Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    let key = format!("avatars/{}.{}", user_id, ext);
    state
        .storage
        .upload(&key, body, &content_type)
        .await
        .map_err(|e| {
            error!(error = %e, user_id = %user_id, "avatar upload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    // Re-uploading with a new extension leaves the old object behind;
    // drop it if the previous avatar was one of ours.
    let prefix = state.storage.public_url("");
    if let Some(old_key) = user.avatar.as_deref().and_then(|url| url.strip_prefix(&prefix)) {
        if old_key != key {
            if let Err(e) = state.storage.delete(old_key).await {
                error!(error = %e, key = %old_key, "stale avatar delete failed");
            }
        }
    }

    let url = state.storage.public_url(&key);
    let user = User::update_avatar(&state.db, user_id, &url)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    info!(user_id = %user_id, avatar = %url, "avatar updated");
    Ok(Json(user.into()))
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
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
        assert_eq!(ext_from_mime("whatever/else"), None);
    }

    #[tokio::test]
    async fn fake_store_urls_are_stable() {
        let state = crate::state::AppState::fake();
        let url = state.storage.public_url("avatars/u.png");
        assert!(url.ends_with("avatars/u.png"));
        assert_eq!(url, state.storage.public_url("avatars/u.png"));
    }
}
