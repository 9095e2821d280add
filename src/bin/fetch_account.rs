// src/bin/fetch_account.rs
use anyhow::Context;
use dotenv::dotenv;
use lending_club_scraper::config::MarketplaceConfig;
use lending_club_scraper::models::{Credentials, UserData};
use lending_club_scraper::services::client::{Admission, LendingClubClient};
use lending_club_scraper::services::db::DbStore;
use log::{error, info};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let email = env::var("LC_EMAIL").context("LC_EMAIL must be set")?;
    let password = env::var("LC_PASSWORD").context("LC_PASSWORD must be set")?;
    let remember = env::var("LC_REMEMBER").map(|v| v == "1" || v == "true").unwrap_or(false);
    let credentials = Credentials::new(email, password);

    let client = LendingClubClient::from_config(MarketplaceConfig::from_env()?, Admission::Reject);

    info!("Fetching account overview for {}", credentials.email);
    let overview = match client.login_and_fetch(&credentials).await {
        Ok(overview) => overview,
        Err(e) => {
            error!("Retrieval failed ({}): {}", e.kind().as_str(), e);
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&overview)?);

    if let Ok(database_url) = env::var("DATABASE_URL") {
        let db = DbStore::new(&database_url).await?;
        let user = remember.then(|| UserData::from(&credentials));
        db.save_login_result(&overview, user.as_ref()).await?;
        info!("Saved overview to {}", database_url);
        db.close().await;
    }

    Ok(())
}
