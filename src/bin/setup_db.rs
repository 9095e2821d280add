// src/bin/setup_db.rs
use dotenv::dotenv;
use lending_club_scraper::services::db::DbStore;
use log::info;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://lending_club.db".to_string());

    // opening the store creates the file and runs the schema
    let db = DbStore::new(&database_url).await?;
    let users = db.get_users().await?;
    info!("Remembered users: {}", users.len());
    db.close().await;

    println!("Database setup complete at {}", database_url);
    Ok(())
}
