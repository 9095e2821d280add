// src/routes.rs
use log::info;
use std::convert::Infallible;
use std::sync::Arc;
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::Rejection;
use warp::{Filter, Reply};

use crate::handlers::accounts::{get_account_summary, get_nar_calculation, get_users};
use crate::handlers::error::ApiError;
use crate::handlers::login::login;
use crate::handlers::AppState;

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let kind;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        kind = "not_found";
        message = "Not Found".to_string();
    } else if let Some(api_error) = err.find::<ApiError>() {
        code = api_error.status;
        kind = api_error.kind;
        message = api_error.message.clone();
    } else if let Some(body_error) = err.find::<BodyDeserializeError>() {
        code = StatusCode::BAD_REQUEST;
        kind = "bad_request";
        message = body_error.to_string();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        kind = "bad_request";
        message = "Method Not Allowed".to_string();
    } else {
        code = StatusCode::INTERNAL_SERVER_ERROR;
        kind = "internal";
        message = "Internal Server Error".to_string();
    }

    Ok(warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": message,
            "kind": kind,
        })),
        code,
    ))
}

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    info!("Configuring routes...");

    let state_filter = warp::any().map(move || state.clone());

    let users_route = warp::path!("api" / "v1" / "users")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_users);

    let summary_route = warp::path!("api" / "v1" / "accounts" / String / "summary")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_account_summary);

    let nar_route = warp::path!("api" / "v1" / "accounts" / String / "nar")
        .and(warp::get())
        .and(state_filter.clone())
        .and_then(get_nar_calculation);

    let login_route = warp::path!("api" / "v1" / "login")
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(state_filter.clone())
        .and_then(login);

    info!("All routes configured successfully.");

    users_route
        .or(summary_route)
        .or(nar_route)
        .or(login_route)
        .recover(handle_rejection)
}
