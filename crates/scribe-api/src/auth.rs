use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use email_address::EmailAddress;
use tracing::{info, warn};
use uuid::Uuid;

use scribe_db::models::UserConflict;
use scribe_types::api::{LoginRequest, RegisterRequest, SessionResponse};
use scribe_types::models::Identity;

use crate::error::ApiError;
use crate::identity::{avatar_url, identity_from_row, normalize_username};
use crate::middleware::create_session_token;
use crate::state::{AppState, AppStateInner};

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 30;
const PASSWORD_MIN: usize = 12;
const PASSWORD_MAX: usize = 50;

/// A bare RFC 5322 address (no display name, no domain literal) with a dotted domain.
fn looks_like_email(email: &str) -> bool {
    let Ok(address) = email.parse::<EmailAddress>() else {
        return false;
    };
    let domain = address.domain();
    address.email() == email
        && domain.contains('.')
        && !domain.starts_with(['.', '['])
        && !domain.ends_with('.')
}

fn conflict_reason(conflict: UserConflict) -> &'static str {
    match conflict {
        UserConflict::Username => "That username is already taken.",
        UserConflict::Email => "That email is already being used.",
    }
}

/// Shape checks on already-normalized input. Every failing rule is reported.
pub fn validate_registration(username: &str, email: &str, password: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if username.is_empty() {
        errors.push("You must provide a username.".to_string());
    } else {
        if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push("Username can only contain letters and numbers.".to_string());
        }
        let len = username.chars().count();
        if len < USERNAME_MIN {
            errors.push(format!("Username must be at least {} characters.", USERNAME_MIN));
        }
        if len > USERNAME_MAX {
            errors.push(format!("Username cannot exceed {} characters.", USERNAME_MAX));
        }
    }

    if !looks_like_email(email) {
        errors.push("You must provide a valid email address.".to_string());
    }

    if password.is_empty() {
        errors.push("You must provide a password.".to_string());
    } else {
        let len = password.chars().count();
        if len < PASSWORD_MIN {
            errors.push(format!("Password must be at least {} characters.", PASSWORD_MIN));
        }
        if len > PASSWORD_MAX {
            errors.push(format!("Password cannot exceed {} characters.", PASSWORD_MAX));
        }
    }

    errors
}

fn session_response(state: &AppStateInner, identity: Identity) -> Result<SessionResponse, ApiError> {
    let token = create_session_token(&state.jwt_secret, &identity, state.session_days)?;

    Ok(SessionResponse {
        user_id: identity.id,
        username: identity.username,
        avatar: identity.avatar,
        token,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = normalize_username(&req.username);
    let email = req.email.trim().to_lowercase();

    let mut errors = validate_registration(&username, &email, &req.password);

    // Uniqueness only matters for values that passed the shape checks.
    if errors.is_empty() {
        let (u, e) = (username.clone(), email.clone());
        let (name_taken, email_taken) = state
            .store
            .run(move |db| {
                Ok((
                    db.get_user_by_username(&u)?.is_some(),
                    db.get_user_by_email(&e)?.is_some(),
                ))
            })
            .await?;

        if name_taken {
            errors.push(conflict_reason(UserConflict::Username).to_string());
        }
        if email_taken {
            errors.push(conflict_reason(UserConflict::Email).to_string());
        }
    }

    if !errors.is_empty() {
        return Err(ApiError::InvalidRegistration(errors));
    }

    let user_id = Uuid::new_v4();
    let (u, mail, password) = (username.clone(), email.clone(), req.password);
    let conflict = state
        .store
        .run(move |db| {
            // Hash with Argon2id
            let salt = SaltString::generate(&mut OsRng);
            let password_hash = Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map_err(|e| anyhow!("password hashing failed: {}", e))?
                .to_string();

            db.create_user(&user_id.to_string(), &u, &mail, &password_hash)
        })
        .await?;

    // A concurrent registration claimed the name or email after the checks above.
    if let Some(conflict) = conflict {
        warn!("Registration for {} lost a race on {:?}", username, conflict);
        return Err(ApiError::InvalidRegistration(vec![conflict_reason(conflict).to_string()]));
    }

    info!("Registered {} ({})", username, user_id);

    let identity = Identity {
        id: user_id,
        avatar: avatar_url(&email),
        username,
    };
    Ok((StatusCode::CREATED, Json(session_response(&state, identity)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let username = normalize_username(&req.username);
    if username.is_empty() {
        return Err(ApiError::InvalidCredentials);
    }

    let password = req.password;
    let user = state
        .store
        .run(move |db| {
            let Some(user) = db.get_user_by_username(&username)? else {
                return Ok(None);
            };

            let verified = PasswordHash::new(&user.password)
                .map(|parsed| {
                    Argon2::default()
                        .verify_password(password.as_bytes(), &parsed)
                        .is_ok()
                })
                .map_err(|e| anyhow!("stored hash for '{}' is unreadable: {}", user.username, e))?;

            Ok(verified.then_some(user))
        })
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let identity = identity_from_row(user)?;
    info!("{} logged in", identity.username);

    Ok(Json(session_response(&state, identity)?))
}
