//! Raw rows as they come out of SQLite. Ids and timestamps stay strings here;
//! the api crate parses them when it builds views.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

/// Which unique column rejected a new user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserConflict {
    Username,
    Email,
}

/// The other party of a follow edge, joined from `users`.
pub struct FollowRow {
    pub username: String,
    pub email: String,
}

/// A post joined with its author. Every post read returns this shape.
pub struct PostRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub author_username: String,
    pub author_email: String,
    pub created_at: String,
}
