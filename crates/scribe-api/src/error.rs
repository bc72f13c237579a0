use std::fmt::Display;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use scribe_types::api::ErrorResponse;

/// Why a post's title/body was refused. Both are reported when both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PostViolation {
    #[error("You must provide a title.")]
    MissingTitle,
    #[error("You must provide post content.")]
    MissingBody,
}

/// Why a follow or unfollow was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FollowViolation {
    #[error("You cannot follow a user that does not exist.")]
    UnknownTarget,
    #[error("You are already following this user.")]
    AlreadyFollowing,
    #[error("You cannot stop following someone you do not already follow.")]
    NotFollowingYet,
    #[error("You cannot follow yourself.")]
    SelfFollow,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{}", join_reasons(.0))]
    InvalidPost(Vec<PostViolation>),

    #[error("{}", join_reasons(.0))]
    InvalidFollow(Vec<FollowViolation>),

    #[error("{}", .0.join(" "))]
    InvalidRegistration(Vec<String>),

    /// Absent entity or malformed id. The two are deliberately indistinguishable.
    #[error("Not found.")]
    NotFound,

    /// Ownership check failed, or the target does not exist.
    #[error("You do not have permission to perform that action.")]
    Forbidden,

    #[error("You must be logged in to perform that action.")]
    LoginRequired,

    #[error("Invalid username / password")]
    InvalidCredentials,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPost(_) | Self::InvalidRegistration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidFollow(violations) => {
                if violations.contains(&FollowViolation::UnknownTarget) {
                    StatusCode::NOT_FOUND
                } else {
                    StatusCode::CONFLICT
                }
            }
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::LoginRequired | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Every human-readable reason, in the order they were found.
    pub fn reasons(&self) -> Vec<String> {
        match self {
            Self::InvalidPost(violations) => violations.iter().map(ToString::to_string).collect(),
            Self::InvalidFollow(violations) => violations.iter().map(ToString::to_string).collect(),
            Self::InvalidRegistration(reasons) => reasons.clone(),
            Self::Internal(_) => vec!["Please try again later.".to_string()],
            other => vec![other.to_string()],
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(e) = &self {
            error!("Internal error: {:#}", e);
        }

        let body = ErrorResponse {
            errors: self.reasons(),
        };
        (self.status(), Json(body)).into_response()
    }
}

fn join_reasons<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_post_violation_is_reported() {
        let err = ApiError::InvalidPost(vec![PostViolation::MissingTitle, PostViolation::MissingBody]);
        assert_eq!(
            err.reasons(),
            vec!["You must provide a title.", "You must provide post content."]
        );
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn unknown_follow_target_is_not_found() {
        let err = ApiError::InvalidFollow(vec![FollowViolation::UnknownTarget]);
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = ApiError::InvalidFollow(vec![FollowViolation::AlreadyFollowing]);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_details_stay_private() {
        let err = ApiError::Internal(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.reasons(), vec!["Please try again later."]);
    }
}
