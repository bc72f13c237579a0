use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{debug, info};
use uuid::Uuid;

use scribe_types::models::AuthorSummary;

use crate::error::{ApiError, FollowViolation};
use crate::identity::{IdentityLookup, author_summary};
use crate::middleware::Viewer;
use crate::state::AppState;
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowAction {
    Create,
    Delete,
}

/// Directed "follows" edges between accounts.
///
/// Validation is check-then-act against the store with no extra locking.
/// A duplicate insert or a double delete that slips through a race is a no-op.
#[derive(Clone)]
pub struct FollowGraph {
    store: Store,
    identities: IdentityLookup,
}

impl FollowGraph {
    pub fn new(store: Store, identities: IdentityLookup) -> Self {
        Self { store, identities }
    }

    pub async fn create(&self, followed_username: &str, follower_id: Uuid) -> Result<(), ApiError> {
        let followed_id = self
            .validate(followed_username, follower_id, FollowAction::Create)
            .await?;

        let (follower, followed) = (follower_id.to_string(), followed_id.to_string());
        let inserted = self
            .store
            .run(move |db| db.insert_follow(&follower, &followed))
            .await?;
        if !inserted {
            debug!("Follow {} -> {} already stored", follower_id, followed_id);
        }
        Ok(())
    }

    pub async fn delete(&self, followed_username: &str, follower_id: Uuid) -> Result<(), ApiError> {
        let followed_id = self
            .validate(followed_username, follower_id, FollowAction::Delete)
            .await?;

        let (follower, followed) = (follower_id.to_string(), followed_id.to_string());
        let removed = self
            .store
            .run(move |db| db.delete_follow(&follower, &followed))
            .await?;
        if !removed {
            debug!("Follow {} -> {} already gone", follower_id, followed_id);
        }
        Ok(())
    }

    /// Collects every violation for the transition. An unknown target stops
    /// validation early since there is no id left to check against.
    async fn validate(
        &self,
        followed_username: &str,
        follower_id: Uuid,
        action: FollowAction,
    ) -> Result<Uuid, ApiError> {
        let followed_id = match self.identities.find_by_username(followed_username).await {
            Ok(identity) => identity.id,
            Err(ApiError::NotFound) => {
                return Err(ApiError::InvalidFollow(vec![FollowViolation::UnknownTarget]));
            }
            Err(e) => return Err(e),
        };

        let mut violations = Vec::new();
        let exists = self.is_following(followed_id, follower_id).await?;

        match action {
            FollowAction::Create if exists => violations.push(FollowViolation::AlreadyFollowing),
            FollowAction::Delete if !exists => violations.push(FollowViolation::NotFollowingYet),
            _ => {}
        }

        if followed_id == follower_id {
            violations.push(FollowViolation::SelfFollow);
        }

        if violations.is_empty() {
            Ok(followed_id)
        } else {
            Err(ApiError::InvalidFollow(violations))
        }
    }

    pub async fn is_following(&self, followed_id: Uuid, follower_id: Uuid) -> Result<bool, ApiError> {
        let (follower, followed) = (follower_id.to_string(), followed_id.to_string());
        self.store
            .run(move |db| db.follow_exists(&follower, &followed))
            .await
    }

    pub async fn get_followers(&self, user_id: Uuid) -> Result<Vec<AuthorSummary>, ApiError> {
        let id = user_id.to_string();
        let rows = self.store.run(move |db| db.get_followers(&id)).await?;
        Ok(rows
            .into_iter()
            .map(|row| author_summary(row.username, &row.email))
            .collect())
    }

    pub async fn get_following(&self, user_id: Uuid) -> Result<Vec<AuthorSummary>, ApiError> {
        let id = user_id.to_string();
        let rows = self.store.run(move |db| db.get_following(&id)).await?;
        Ok(rows
            .into_iter()
            .map(|row| author_summary(row.username, &row.email))
            .collect())
    }

    /// Ids of every account `user_id` follows.
    pub async fn following_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, ApiError> {
        let id = user_id.to_string();
        let raw = self.store.run(move |db| db.get_followed_ids(&id)).await?;
        raw.iter()
            .map(|id| {
                id.parse::<Uuid>()
                    .map_err(|e| ApiError::Internal(anyhow::anyhow!("Corrupt followed_id '{}': {}", id, e)))
            })
            .collect()
    }

    pub async fn count_followers(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let id = user_id.to_string();
        self.store.run(move |db| db.count_followers(&id)).await
    }

    pub async fn count_following(&self, user_id: Uuid) -> Result<u64, ApiError> {
        let id = user_id.to_string();
        self.store.run(move |db| db.count_following(&id)).await
    }
}

// -- Handlers --

pub async fn add_follow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<StatusCode, ApiError> {
    let identity = viewer.require()?;
    state.follows.create(&username, identity.id).await?;

    info!("{} started following {}", identity.username, username);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_follow(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<StatusCode, ApiError> {
    let identity = viewer.require()?;
    state.follows.delete(&username, identity.id).await?;

    info!("{} stopped following {}", identity.username, username);
    Ok(StatusCode::NO_CONTENT)
}
