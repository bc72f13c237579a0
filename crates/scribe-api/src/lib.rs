pub mod auth;
pub mod error;
pub mod feed;
pub mod follows;
pub mod identity;
pub mod middleware;
pub mod posts;
pub mod profile;
pub mod routes;
pub mod state;
pub mod store;
