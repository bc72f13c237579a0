use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use scribe_types::api::Claims;
use scribe_types::models::{Identity, SessionIdentity};

use crate::error::ApiError;
use crate::state::AppState;

/// Who is making the request. `None` means anonymous.
#[derive(Debug, Clone, Default)]
pub struct Viewer(pub Option<SessionIdentity>);

impl Viewer {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|identity| identity.id)
    }

    /// The authenticated identity, or `LoginRequired`.
    pub fn require(&self) -> Result<&SessionIdentity, ApiError> {
        self.0.as_ref().ok_or(ApiError::LoginRequired)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolve a session token to its identity. Invalid or expired tokens resolve to nothing.
pub fn decode_session(secret: &str, token: &str) -> Option<SessionIdentity> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims.into())
}

pub fn create_session_token(secret: &str, identity: &Identity, lifetime_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        sub: identity.id,
        username: identity.username.clone(),
        avatar: identity.avatar.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(lifetime_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Attach the requesting `Viewer` to every request.
pub async fn resolve_viewer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let identity = bearer_token(req.headers()).and_then(|token| decode_session(&state.jwt_secret, token));

    req.extensions_mut().insert(Viewer(identity));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "alice".into(),
            avatar: "https://gravatar.com/avatar/x?s=128".into(),
        }
    }

    #[test]
    fn token_round_trips_identity() {
        let identity = alice();
        let token = create_session_token("secret", &identity, 1).unwrap();
        let session = decode_session("secret", &token).unwrap();
        assert_eq!(session.id, identity.id);
        assert_eq!(session.username, "alice");
        assert_eq!(session.avatar, identity.avatar);
    }

    #[test]
    fn wrong_secret_is_anonymous() {
        let token = create_session_token("secret", &alice(), 1).unwrap();
        assert!(decode_session("other", &token).is_none());
    }

    #[test]
    fn expired_token_is_anonymous() {
        let token = create_session_token("secret", &alice(), -2).unwrap();
        assert!(decode_session("secret", &token).is_none());
    }

    #[test]
    fn bearer_prefix_required() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Token abc".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
    }
}
