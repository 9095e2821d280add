use dotenv::dotenv;
use lending_club_scraper::config::AppConfig;
use lending_club_scraper::handlers::AppState;
use lending_club_scraper::routes;
use lending_club_scraper::services::client::LendingClubClient;
use lending_club_scraper::services::db::DbStore;
use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env()?;
    info!("Using PORT: {}", config.port);
    info!("Marketplace login URL: {}", config.marketplace.login_url);

    let db = Arc::new(DbStore::new(&config.database_url).await?);
    let client = LendingClubClient::from_config(config.marketplace.clone(), config.admission);
    let state = Arc::new(AppState { db, client });

    // the login route can log in with stored passwords; listen locally only
    let addr: SocketAddr = ([127, 0, 0, 1], config.port).into();

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST"]);

    let api = routes::routes(state).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
    Ok(())
}
