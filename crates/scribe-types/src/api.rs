use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AuthorSummary, PostView, ProfileCounts, SessionIdentity};

// -- JWT Claims --

/// Session token claims, shared by the REST layer and the chat gateway
/// handshake. Decoding a token yields the requester's `SessionIdentity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub avatar: String,
    pub exp: usize,
}

impl From<Claims> for SessionIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            avatar: claims.avatar,
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub username: String,
    pub avatar: String,
    pub token: String,
}

// -- Posts --

#[derive(Debug, Deserialize)]
pub struct PostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedPostResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SinglePostResponse {
    #[serde(flatten)]
    pub post: PostView,
    pub body_html: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub search_term: String,
}

// -- Profiles --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileHeader {
    pub username: String,
    pub avatar: String,
    pub is_visitors_profile: bool,
    pub is_following: bool,
    pub counts: ProfileCounts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfilePostsResponse {
    #[serde(flatten)]
    pub profile: ProfileHeader,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileAccountsResponse {
    #[serde(flatten)]
    pub profile: ProfileHeader,
    pub accounts: Vec<AuthorSummary>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<String>,
}
