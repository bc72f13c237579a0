use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use scribe_db::models::PostRow;
use scribe_markup::{render_body, strip_all};
use scribe_types::api::{CreatedPostResponse, PostRequest, SearchRequest, SinglePostResponse};
use scribe_types::models::PostView;

use crate::error::{ApiError, PostViolation};
use crate::identity::author_summary;
use crate::middleware::Viewer;
use crate::state::AppState;
use crate::store::Store;

/// Result of an edit by the post's owner. Content problems are not errors:
/// the edit is abandoned and the author can fix and resubmit.
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(PostView),
    Rejected(Vec<PostViolation>),
}

struct CleanPost {
    title: String,
    body: String,
}

fn clean_field(raw: &str) -> String {
    strip_all(raw.trim()).trim().to_string()
}

fn clean_up(raw_title: &str, raw_body: &str) -> Result<CleanPost, Vec<PostViolation>> {
    let title = clean_field(raw_title);
    let body = clean_field(raw_body);

    let mut violations = Vec::new();
    if title.is_empty() {
        violations.push(PostViolation::MissingTitle);
    }
    if body.is_empty() {
        violations.push(PostViolation::MissingBody);
    }

    if violations.is_empty() {
        Ok(CleanPost { title, body })
    } else {
        Err(violations)
    }
}

/// RFC 3339 with fixed microsecond precision, so string order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Turn a search term into an FTS5 expression matching any of its words.
fn match_expression(term: &str) -> Option<String> {
    let words: Vec<String> = term
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{}\"", word))
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" OR "))
    }
}

/// Shape a joined post row for the viewer. Every post read goes through here,
/// so all of them carry the same author projection and ownership flag.
fn compose(row: PostRow, viewer: Option<Uuid>) -> Result<PostView, ApiError> {
    let id = row
        .id
        .parse::<Uuid>()
        .map_err(|e| anyhow!("Corrupt post id '{}': {}", row.id, e))?;
    let author_id = row
        .author_id
        .parse::<Uuid>()
        .map_err(|e| anyhow!("Corrupt author_id '{}' on post '{}': {}", row.author_id, row.id, e))?;
    let created_date = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|e| anyhow!("Corrupt created_at '{}' on post '{}': {}", row.created_at, row.id, e))?
        .with_timezone(&Utc);

    Ok(PostView {
        id,
        title: row.title,
        body: row.body,
        created_date,
        author: author_summary(row.author_username, &row.author_email),
        is_visitor_owner: viewer == Some(author_id),
    })
}

fn compose_all(rows: Vec<PostRow>, viewer: Option<Uuid>) -> Result<Vec<PostView>, ApiError> {
    rows.into_iter().map(|row| compose(row, viewer)).collect()
}

/// Posts and their ownership rules.
#[derive(Clone)]
pub struct PostStore {
    store: Store,
}

impl PostStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create(&self, raw_title: &str, raw_body: &str, author_id: Uuid) -> Result<Uuid, ApiError> {
        let post = clean_up(raw_title, raw_body).map_err(ApiError::InvalidPost)?;

        let id = Uuid::new_v4();
        let created_at = timestamp(Utc::now());
        let (post_id, author) = (id.to_string(), author_id.to_string());
        self.store
            .run(move |db| db.insert_post(&post_id, &post.title, &post.body, &author, &created_at))
            .await?;

        Ok(id)
    }

    /// `NotFound` covers both a malformed id and a missing post.
    pub async fn find_single_by_id(&self, id: &str, viewer: Option<Uuid>) -> Result<PostView, ApiError> {
        let post_id = id.parse::<Uuid>().map_err(|_| ApiError::NotFound)?;

        let key = post_id.to_string();
        let row = self
            .store
            .run(move |db| db.get_post(&key))
            .await?
            .ok_or(ApiError::NotFound)?;

        compose(row, viewer)
    }

    /// An author's posts, newest first.
    pub async fn find_by_author(&self, author_id: Uuid, viewer: Option<Uuid>) -> Result<Vec<PostView>, ApiError> {
        let author = author_id.to_string();
        let rows = self.store.run(move |db| db.get_posts_by_author(&author)).await?;
        compose_all(rows, viewer)
    }

    /// Posts by any of `author_ids`, newest first.
    pub async fn find_by_authors(&self, author_ids: &[Uuid], viewer: Option<Uuid>) -> Result<Vec<PostView>, ApiError> {
        let authors: Vec<String> = author_ids.iter().map(Uuid::to_string).collect();
        let rows = self.store.run(move |db| db.get_posts_by_authors(&authors)).await?;
        compose_all(rows, viewer)
    }

    /// Ownership is checked before content, so a non-owner never learns
    /// whether their submission would have validated.
    pub async fn update(
        &self,
        id: &str,
        raw_title: &str,
        raw_body: &str,
        requester_id: Uuid,
    ) -> Result<UpdateOutcome, ApiError> {
        let existing = self.owned_post(id, requester_id).await?;

        let post = match clean_up(raw_title, raw_body) {
            Ok(post) => post,
            Err(violations) => return Ok(UpdateOutcome::Rejected(violations)),
        };

        self.write_update(existing.id.to_string(), post.title.clone(), post.body.clone())
            .await?;

        Ok(UpdateOutcome::Updated(PostView {
            title: post.title,
            body: post.body,
            ..existing
        }))
    }

    /// A row that vanished after the ownership check reads as `Forbidden`, like a missing post.
    async fn write_update(&self, key: String, title: String, body: String) -> Result<(), ApiError> {
        let written = self
            .store
            .run(move |db| db.update_post(&key, &title, &body))
            .await?;
        if written { Ok(()) } else { Err(ApiError::Forbidden) }
    }

    pub async fn delete(&self, id: &str, requester_id: Uuid) -> Result<(), ApiError> {
        let existing = self.owned_post(id, requester_id).await?;

        let key = existing.id.to_string();
        self.store.run(move |db| db.delete_post(&key)).await?;
        Ok(())
    }

    /// Fetch a post the requester owns. Missing and not-yours are both `Forbidden`.
    async fn owned_post(&self, id: &str, requester_id: Uuid) -> Result<PostView, ApiError> {
        match self.find_single_by_id(id, Some(requester_id)).await {
            Ok(post) if post.is_visitor_owner => Ok(post),
            Ok(_) | Err(ApiError::NotFound) => Err(ApiError::Forbidden),
            Err(e) => Err(e),
        }
    }

    /// Relevance-ordered full-text search. Never fails: any problem is an empty result.
    pub async fn search(&self, term: &str, viewer: Option<Uuid>) -> Vec<PostView> {
        let Some(expr) = match_expression(term) else {
            return vec![];
        };

        let result = self.store.run(move |db| db.search_posts(&expr)).await;
        match result.and_then(|rows| compose_all(rows, viewer)) {
            Ok(posts) => posts,
            Err(e) => {
                warn!("Search for {:?} failed, returning no results: {}", term, e);
                vec![]
            }
        }
    }

    pub async fn count_by_author(&self, author_id: Uuid) -> Result<u64, ApiError> {
        let author = author_id.to_string();
        self.store.run(move |db| db.count_posts_by_author(&author)).await
    }
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identity = viewer.require()?;
    let id = state.posts.create(&req.title, &req.body, identity.id).await?;

    info!("{} created post {}", identity.username, id);
    Ok((StatusCode::CREATED, Json(CreatedPostResponse { id })))
}

pub async fn view_single(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<Json<SinglePostResponse>, ApiError> {
    let post = state.posts.find_single_by_id(&post_id, viewer.id()).await?;
    let body_html = render_body(&post.body);

    Ok(Json(SinglePostResponse { post, body_html }))
}

pub async fn edit(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<PostRequest>,
) -> Result<Json<PostView>, ApiError> {
    let identity = viewer.require()?;

    match state
        .posts
        .update(&post_id, &req.title, &req.body, identity.id)
        .await?
    {
        UpdateOutcome::Updated(post) => {
            info!("{} updated post {}", identity.username, post.id);
            Ok(Json(post))
        }
        UpdateOutcome::Rejected(violations) => Err(ApiError::InvalidPost(violations)),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Extension(viewer): Extension<Viewer>,
) -> Result<StatusCode, ApiError> {
    let identity = viewer.require()?;
    state.posts.delete(&post_id, identity.id).await?;

    info!("{} deleted post {}", identity.username, post_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn search(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Json(req): Json<SearchRequest>,
) -> Json<Vec<PostView>> {
    Json(state.posts.search(&req.search_term, viewer.id()).await)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use scribe_db::Database;

    use super::*;

    #[tokio::test]
    async fn writing_to_a_vanished_post_is_forbidden() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let posts = PostStore::new(Store::new(db));

        let result = posts
            .write_update(Uuid::new_v4().to_string(), "Title".into(), "Body".into())
            .await;
        assert!(matches!(result, Err(ApiError::Forbidden)));
    }

    #[test]
    fn both_missing_fields_are_reported() {
        let violations = clean_up("   ", "<p></p>").err().unwrap();
        assert_eq!(
            violations,
            vec![PostViolation::MissingTitle, PostViolation::MissingBody]
        );
    }

    #[test]
    fn fields_are_trimmed_and_stripped() {
        let post = clean_up("  <h1>Hello</h1> ", " <b>World</b>").ok().unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.body, "World");
    }

    #[test]
    fn search_words_are_quoted_and_ored() {
        assert_eq!(
            match_expression("rust \"async\"*"),
            Some("\"rust\" OR \"async\"".to_string())
        );
        assert_eq!(match_expression("  ?! "), None);
        assert_eq!(match_expression(""), None);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let earlier = timestamp(DateTime::from_timestamp(1_700_000_000, 5_000).unwrap());
        let later = timestamp(DateTime::from_timestamp(1_700_000_000, 50_000).unwrap());
        assert!(earlier < later);
    }
}
