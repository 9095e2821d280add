// src/services/session.rs
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode, Url};
use std::fmt;
use std::sync::Arc;

use crate::config::MarketplaceConfig;
use crate::error::{AuthError, FetchError};
use crate::models::Credentials;
use crate::services::parser::{self, PageKind};

/// Authenticated access to the marketplace.
///
/// A session is plain data handed back by `authenticate` and passed into every
/// `fetch`; implementations keep no per-user state of their own.
#[async_trait]
pub trait SessionClient: Send + Sync + 'static {
    type Session: Send + Sync;

    async fn authenticate(&self, credentials: &Credentials) -> Result<Self::Session, AuthError>;

    async fn fetch(&self, session: &Self::Session, page: PageKind) -> Result<String, FetchError>;
}

/// One login's worth of cookies, bound to a single user.
pub struct Session {
    user_email: String,
    client: Client,
    jar: Arc<Jar>,
}

impl Session {
    pub fn user_email(&self) -> &str {
        &self.user_email
    }

    fn has_cookie_for(&self, url: &Url) -> bool {
        self.jar.cookies(url).is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_email", &self.user_email)
            .finish_non_exhaustive()
    }
}

/// Talks to the real site over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionClient {
    config: MarketplaceConfig,
}

impl HttpSessionClient {
    pub fn new(config: MarketplaceConfig) -> Self {
        HttpSessionClient { config }
    }

    fn page_url(&self, page: PageKind) -> &Url {
        match page {
            PageKind::AccountSummary => &self.config.summary_url,
            PageKind::NetAnnualizedReturn => &self.config.nar_url,
        }
    }

    fn is_login_url(&self, url: &Url) -> bool {
        url.path() == self.config.login_url.path()
    }
}

#[async_trait]
impl SessionClient for HttpSessionClient {
    type Session = Session;

    async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        info!("Logging in as {}", credentials.email);

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(&self.config.user_agent)
            .timeout(self.config.timeout)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let response = client
            .post(self.config.login_url.clone())
            .form(&[
                ("login_email", credentials.email.as_str()),
                ("login_password", credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let final_url = response.url().clone();
        debug!("Login response {} from {}", status, final_url);

        if status.is_client_error() {
            warn!("Login for {} rejected with {}", credentials.email, status);
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::UnexpectedResponse(format!("status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        if parser::is_login_page(&body) {
            warn!("Login for {} bounced back to the login form", credentials.email);
            return Err(AuthError::InvalidCredentials);
        }
        if self.is_login_url(&final_url) {
            return Err(AuthError::UnexpectedResponse(
                "login page returned without a login form".to_string(),
            ));
        }

        let session = Session {
            user_email: credentials.email.clone(),
            client,
            jar,
        };
        if !session.has_cookie_for(&self.config.login_url) {
            return Err(AuthError::UnexpectedResponse(
                "no session cookie was issued".to_string(),
            ));
        }

        info!("Logged in as {}", credentials.email);
        Ok(session)
    }

    async fn fetch(&self, session: &Session, page: PageKind) -> Result<String, FetchError> {
        let url = self.page_url(page);
        debug!("Fetching {} page for {} from {}", page.name(), session.user_email, url);

        let response = session
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::SessionExpired);
        }
        if !status.is_success() {
            warn!("Fetching {} page returned {}", page.name(), status);
            return Err(FetchError::UnexpectedStatus(status.as_u16()));
        }

        let landed_on_login = self.is_login_url(response.url());
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        if landed_on_login || parser::is_login_page(&body) {
            warn!("Session for {} expired while fetching {} page", session.user_email, page.name());
            return Err(FetchError::SessionExpired);
        }

        Ok(body)
    }
}
