// src/handlers/mod.rs
use std::sync::Arc;

use crate::services::client::LendingClubClient;
use crate::services::db::DbStore;

pub mod accounts;
pub mod error;
pub mod login;

/// Shared by every route.
pub struct AppState {
    pub db: Arc<DbStore>,
    pub client: LendingClubClient,
}
