use anyhow::anyhow;
use md5::{Digest, Md5};
use uuid::Uuid;

use scribe_db::models::UserRow;
use scribe_types::models::{AuthorSummary, Identity};

use crate::error::ApiError;
use crate::store::Store;

/// Stored usernames are trimmed and lower-cased; lookups fold the same way.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Gravatar URL for an email address. Recomputed on every read, never stored.
pub fn avatar_url(email: &str) -> String {
    let digest = Md5::digest(email.trim().to_lowercase().as_bytes());
    format!("https://gravatar.com/avatar/{}?s=128", hex::encode(digest))
}

pub(crate) fn author_summary(username: String, email: &str) -> AuthorSummary {
    AuthorSummary {
        avatar: avatar_url(email),
        username,
    }
}

pub(crate) fn identity_from_row(row: UserRow) -> Result<Identity, ApiError> {
    let id = row
        .id
        .parse::<Uuid>()
        .map_err(|e| anyhow!("Corrupt user id '{}': {}", row.id, e))?;

    Ok(Identity {
        id,
        avatar: avatar_url(&row.email),
        username: row.username,
    })
}

/// Read-only resolution of usernames to public identities.
#[derive(Clone)]
pub struct IdentityLookup {
    store: Store,
}

impl IdentityLookup {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Identity, ApiError> {
        let username = normalize_username(username);
        if username.is_empty() {
            return Err(ApiError::NotFound);
        }

        let row = self
            .store
            .run(move |db| db.get_user_by_username(&username))
            .await?
            .ok_or(ApiError::NotFound)?;

        identity_from_row(row)
    }
}
