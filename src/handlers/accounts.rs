// src/handlers/accounts.rs
use log::{error, info};
use std::sync::Arc;
use warp::reply::Json;
use warp::Rejection;

use super::error::ApiError;
use super::AppState;

/// Remembered emails for the login form. Passwords never leave the store here.
pub async fn get_users(state: Arc<AppState>) -> Result<Json, Rejection> {
    let users = state.db.get_users().await.map_err(|e| {
        error!("Failed to read users: {}", e);
        warp::reject::custom(ApiError::from(e))
    })?;

    let emails: Vec<String> = users.into_iter().map(|u| u.user_email).collect();
    Ok(warp::reply::json(&emails))
}

/// Last-known account summary, without touching the marketplace.
pub async fn get_account_summary(email: String, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!("Serving cached account summary for {}", email);

    match state.db.get_account_summary(&email).await {
        Ok(Some(cached)) => Ok(warp::reply::json(&cached)),
        Ok(None) => Err(warp::reject::custom(ApiError::not_found(format!(
            "no account summary stored for {}",
            email
        )))),
        Err(e) => {
            error!("Failed to read account summary for {}: {}", email, e);
            Err(warp::reject::custom(ApiError::from(e)))
        }
    }
}

pub async fn get_nar_calculation(email: String, state: Arc<AppState>) -> Result<Json, Rejection> {
    info!("Serving cached NAR calculation for {}", email);

    match state.db.get_nar_calculation(&email).await {
        Ok(Some(cached)) => Ok(warp::reply::json(&cached)),
        Ok(None) => Err(warp::reject::custom(ApiError::not_found(format!(
            "no net annualized return stored for {}",
            email
        )))),
        Err(e) => {
            error!("Failed to read NAR calculation for {}: {}", email, e);
            Err(warp::reject::custom(ApiError::from(e)))
        }
    }
}
