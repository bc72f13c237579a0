use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use scribe_types::api::{ProfileAccountsResponse, ProfileHeader, ProfilePostsResponse};
use scribe_types::models::{Identity, ProfileCounts};

use crate::error::ApiError;
use crate::middleware::Viewer;
use crate::state::{AppState, AppStateInner};

/// The three statistics are independent, so they are fetched together.
async fn profile_counts(state: &AppStateInner, user_id: Uuid) -> Result<ProfileCounts, ApiError> {
    let (post_count, follower_count, following_count) = tokio::try_join!(
        state.posts.count_by_author(user_id),
        state.follows.count_followers(user_id),
        state.follows.count_following(user_id),
    )?;

    Ok(ProfileCounts {
        post_count,
        follower_count,
        following_count,
    })
}

/// Header shown on every profile tab.
pub async fn shared_profile_data(
    state: &AppStateInner,
    profile: &Identity,
    viewer: &Viewer,
) -> Result<ProfileHeader, ApiError> {
    let (is_visitors_profile, is_following) = match viewer.id() {
        Some(viewer_id) => (
            viewer_id == profile.id,
            state.follows.is_following(profile.id, viewer_id).await?,
        ),
        None => (false, false),
    };

    Ok(ProfileHeader {
        username: profile.username.clone(),
        avatar: profile.avatar.clone(),
        is_visitors_profile,
        is_following,
        counts: profile_counts(state, profile.id).await?,
    })
}

pub async fn posts_screen(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<ProfilePostsResponse>, ApiError> {
    let profile = state.identities.find_by_username(&username).await?;
    let header = shared_profile_data(&state, &profile, &viewer).await?;
    let posts = state.posts.find_by_author(profile.id, viewer.id()).await?;

    Ok(Json(ProfilePostsResponse {
        profile: header,
        posts,
    }))
}

pub async fn followers_screen(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<ProfileAccountsResponse>, ApiError> {
    let profile = state.identities.find_by_username(&username).await?;
    let header = shared_profile_data(&state, &profile, &viewer).await?;
    let accounts = state.follows.get_followers(profile.id).await?;

    Ok(Json(ProfileAccountsResponse {
        profile: header,
        accounts,
    }))
}

pub async fn following_screen(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<ProfileAccountsResponse>, ApiError> {
    let profile = state.identities.find_by_username(&username).await?;
    let header = shared_profile_data(&state, &profile, &viewer).await?;
    let accounts = state.follows.get_following(profile.id).await?;

    Ok(Json(ProfileAccountsResponse {
        profile: header,
        accounts,
    }))
}
