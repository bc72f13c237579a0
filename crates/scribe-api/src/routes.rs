use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::resolve_viewer;
use crate::state::AppState;
use crate::{auth, feed, follows, posts, profile};

/// Every REST route. Handlers that need a login check `Viewer::require` themselves,
/// so a single layer resolves the viewer for all of them.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/feed", get(feed::home_feed))
        .route("/posts", post(posts::create))
        .route(
            "/posts/{post_id}",
            get(posts::view_single).put(posts::edit).delete(posts::delete),
        )
        .route("/search", post(posts::search))
        .route("/profile/{username}", get(profile::posts_screen))
        .route("/profile/{username}/followers", get(profile::followers_screen))
        .route("/profile/{username}/following", get(profile::following_screen))
        .route(
            "/follow/{username}",
            post(follows::add_follow).delete(follows::remove_follow),
        )
        .layer(middleware::from_fn_with_state(state.clone(), resolve_viewer))
        .with_state(state)
}
