#![allow(dead_code)]

use std::sync::Arc;

use uuid::Uuid;

use scribe_api::identity::avatar_url;
use scribe_api::middleware::create_session_token;
use scribe_api::state::{AppState, AppStateInner};
use scribe_db::Database;
use scribe_types::models::Identity;

pub const SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub state: AppState,
    pub db: Arc<Database>,
}

impl TestApp {
    pub fn new() -> Self {
        let db = Arc::new(Database::open_in_memory().expect("in-memory database"));
        let state = Arc::new(AppStateInner::new(db.clone(), SECRET.to_string(), 1));
        Self { state, db }
    }

    /// Insert an account directly, skipping password hashing.
    pub fn add_user(&self, username: &str) -> Identity {
        let id = Uuid::new_v4();
        let email = format!("{}@example.com", username);
        self.db
            .create_user(&id.to_string(), username, &email, "not-a-real-hash")
            .expect("insert user");

        Identity {
            id,
            username: username.to_string(),
            avatar: avatar_url(&email),
        }
    }
}

pub fn token_for(identity: &Identity) -> String {
    create_session_token(SECRET, identity, 1).expect("token")
}
