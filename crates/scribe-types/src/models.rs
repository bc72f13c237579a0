use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of an account. Never carries the password hash or email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub avatar: String,
}

/// Author projection attached to every post and follow listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub username: String,
    pub avatar: String,
}

/// A post as returned by every read path. The raw author id is not exposed;
/// `is_visitor_owner` is computed against whoever asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub created_date: DateTime<Utc>,
    pub author: AuthorSummary,
    pub is_visitor_owner: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounts {
    pub post_count: u64,
    pub follower_count: u64,
    pub following_count: u64,
}

/// The identity a request or websocket was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub id: Uuid,
    pub username: String,
    pub avatar: String,
}
