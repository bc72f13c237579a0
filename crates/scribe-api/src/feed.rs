use axum::{Extension, Json, extract::State};
use tracing::warn;
use uuid::Uuid;

use scribe_types::models::PostView;

use crate::error::ApiError;
use crate::follows::FollowGraph;
use crate::middleware::Viewer;
use crate::posts::PostStore;
use crate::state::AppState;

/// Home feed: posts by everyone the viewer follows, newest first.
#[derive(Clone)]
pub struct FeedAggregator {
    follows: FollowGraph,
    posts: PostStore,
}

impl FeedAggregator {
    pub fn new(follows: FollowGraph, posts: PostStore) -> Self {
        Self { follows, posts }
    }

    /// An empty feed is always a valid answer, so failures degrade to `[]`.
    pub async fn get_feed(&self, viewer_id: Uuid) -> Vec<PostView> {
        match self.try_feed(viewer_id).await {
            Ok(posts) => posts,
            Err(e) => {
                warn!("Feed for {} failed, returning empty: {}", viewer_id, e);
                vec![]
            }
        }
    }

    async fn try_feed(&self, viewer_id: Uuid) -> Result<Vec<PostView>, ApiError> {
        let followed = self.follows.following_ids(viewer_id).await?;
        if followed.is_empty() {
            return Ok(vec![]);
        }
        self.posts.find_by_authors(&followed, Some(viewer_id)).await
    }
}

pub async fn home_feed(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<Vec<PostView>>, ApiError> {
    let identity = viewer.require()?;
    Ok(Json(state.feed.get_feed(identity.id).await))
}
