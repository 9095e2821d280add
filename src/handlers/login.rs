// src/handlers/login.rs
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use super::AppState;
use crate::models::{AccountOverview, Credentials, UserData};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    /// Left out to log in with the stored password for `email`.
    pub password: Option<String>,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub overview: AccountOverview,
    pub persisted: bool,
    pub store_error: Option<String>,
}

async fn resolve_credentials(request: &LoginRequest, state: &AppState) -> Result<Credentials, ApiError> {
    let email = request.email.trim();
    if email.is_empty() {
        return Err(ApiError::bad_request("please enter a username and password"));
    }

    match request.password.as_deref() {
        Some(password) if !password.trim().is_empty() => Ok(Credentials::new(email, password)),
        Some(_) => Err(ApiError::bad_request("please enter a username and password")),
        None => {
            let stored = state.db.get_user(email).await?;
            stored
                .map(Credentials::from)
                .ok_or_else(|| ApiError::bad_request(format!("no stored password for {}", email)))
        }
    }
}

/// Logs in, scrapes both pages, then saves what was scraped.
///
/// A failed save still returns the fresh data, flagged with `persisted: false`.
pub async fn login(request: LoginRequest, state: Arc<AppState>) -> Result<Json, Rejection> {
    let credentials = resolve_credentials(&request, &state)
        .await
        .map_err(warp::reject::custom)?;
    info!("Handling login for {}", credentials.email);

    let overview = state.client.login_and_fetch(&credentials).await.map_err(|e| {
        warn!("Login retrieval for {} failed: {}", credentials.email, e);
        warp::reject::custom(ApiError::from(e))
    })?;

    let remember = request.remember.then(|| UserData::from(&credentials));
    let saved = state.db.save_login_result(&overview, remember.as_ref()).await;
    if let Err(e) = &saved {
        error!("Retrieved data for {} but could not save it: {}", credentials.email, e);
    }

    Ok(warp::reply::json(&LoginResponse {
        overview,
        persisted: saved.is_ok(),
        store_error: saved.err().map(|e| e.to_string()),
    }))
}
