use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for re-sending the confirmation email.
#[derive(Debug, Deserialize)]
pub struct RequestEmail {
    pub email: String,
}

/// Token pair returned by login and refresh.
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer",
        }
    }
}

/// Public part of the user returned to clients.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: OffsetDateTime,
    pub avatar: Option<String>,
}

impl From<crate::auth::repo::User> for PublicUser {
    fn from(u: crate::auth::repo::User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            created_at: u.created_at,
            avatar: u.avatar,
        }
    }
}

/// Response returned after signup.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: PublicUser,
    pub detail: String,
}

/// Generic message payload for the confirmation endpoints.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_hides_nothing_it_should_show() {
        let user = PublicUser {
            id: Uuid::new_v4(),
            username: "testuser".into(),
            email: "test@example.com".into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            avatar: Some("https://example.com/a.png".into()),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("testuser"));
        assert!(json.contains("https://example.com/a.png"));
    }

    #[test]
    fn token_pair_is_bearer() {
        let pair = TokenPair::bearer("a".into(), "r".into());
        let json = serde_json::to_string(&pair).unwrap();
        assert!(json.contains(r#""token_type":"bearer""#));
    }
}
