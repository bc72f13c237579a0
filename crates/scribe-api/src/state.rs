use std::sync::Arc;

use scribe_db::Database;

use crate::feed::FeedAggregator;
use crate::follows::FollowGraph;
use crate::identity::IdentityLookup;
use crate::posts::PostStore;
use crate::store::Store;

pub type AppState = Arc<AppStateInner>;

/// Everything a request handler can reach. Components share one `Store`.
pub struct AppStateInner {
    pub store: Store,
    pub identities: IdentityLookup,
    pub follows: FollowGraph,
    pub posts: PostStore,
    pub feed: FeedAggregator,
    pub jwt_secret: String,
    pub session_days: i64,
}

impl AppStateInner {
    pub fn new(db: Arc<Database>, jwt_secret: String, session_days: i64) -> Self {
        let store = Store::new(db);
        let identities = IdentityLookup::new(store.clone());
        let follows = FollowGraph::new(store.clone(), identities.clone());
        let posts = PostStore::new(store.clone());
        let feed = FeedAggregator::new(follows.clone(), posts.clone());

        Self {
            store,
            identities,
            follows,
            posts,
            feed,
            jwt_secret,
            session_days,
        }
    }
}
