// src/services/client.rs
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::config::MarketplaceConfig;
use crate::error::RetrievalError;
use crate::models::{AccountOverview, AccountSummaryData, Credentials, NARCalculationData};
use crate::services::locks::{KeyPermit, KeyedLocks};
use crate::services::session::{HttpSessionClient, SessionClient};
use crate::services::task::{self, Operation, Request, RetrievalOutput, TaskCallback, TaskHandle};

/// What to do when a user already has a retrieval running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Admission {
    #[default]
    Reject,
    Queue,
}

type UserPermit = KeyPermit<String>;

/// Entry point for consumers. Cheap to clone; clones share the in-flight registry.
pub struct LendingClubClient<S: SessionClient = HttpSessionClient> {
    sessions: Arc<S>,
    in_flight: KeyedLocks<String>,
    admission: Admission,
}

impl<S: SessionClient> Clone for LendingClubClient<S> {
    fn clone(&self) -> Self {
        LendingClubClient {
            sessions: self.sessions.clone(),
            in_flight: self.in_flight.clone(),
            admission: self.admission,
        }
    }
}

impl LendingClubClient<HttpSessionClient> {
    pub fn from_config(config: MarketplaceConfig, admission: Admission) -> Self {
        Self::new(HttpSessionClient::new(config), admission)
    }
}

impl<S: SessionClient> LendingClubClient<S> {
    pub fn new(sessions: S, admission: Admission) -> Self {
        LendingClubClient {
            sessions: Arc::new(sessions),
            in_flight: KeyedLocks::new(),
            admission,
        }
    }

    /// Claims the user's slot without waiting.
    fn try_admit(&self, email: &str) -> Result<UserPermit, RetrievalError> {
        self.in_flight.try_acquire(email.to_string()).ok_or_else(|| {
            warn!("Rejecting retrieval for {}: one is already running", email);
            RetrievalError::AlreadyInFlight(email.to_string())
        })
    }

    async fn admit(&self, email: &str) -> Result<UserPermit, RetrievalError> {
        match self.admission {
            Admission::Reject => self.try_admit(email),
            Admission::Queue => Ok(self.in_flight.acquire(email.to_string()).await),
        }
    }

    pub async fn get_account_summary(
        &self,
        credentials: &Credentials,
    ) -> Result<AccountSummaryData, RetrievalError> {
        let _permit = self.admit(&credentials.email).await?;
        task::fetch_account_summary(self.sessions.as_ref(), credentials).await
    }

    pub async fn get_net_annualized_return(
        &self,
        credentials: &Credentials,
    ) -> Result<NARCalculationData, RetrievalError> {
        let _permit = self.admit(&credentials.email).await?;
        task::fetch_net_annualized_return(self.sessions.as_ref(), credentials).await
    }

    pub async fn login_and_fetch(
        &self,
        credentials: &Credentials,
    ) -> Result<AccountOverview, RetrievalError> {
        let _permit = self.admit(&credentials.email).await?;
        task::login_and_fetch(self.sessions.as_ref(), credentials).await
    }

    /// Starts `operation` in the background. The callback fires exactly once
    /// with the outcome unless the returned handle is cancelled first.
    ///
    /// With `Admission::Reject` a second submit for a user whose task is still
    /// running fails here, before anything is spawned.
    pub fn submit<C>(
        &self,
        operation: Operation,
        credentials: Credentials,
        callback: C,
    ) -> Result<TaskHandle, RetrievalError>
    where
        C: TaskCallback<RetrievalOutput>,
    {
        let early_permit = match self.admission {
            Admission::Reject => Some(self.try_admit(&credentials.email)?),
            Admission::Queue => None,
        };
        let in_flight = self.in_flight.clone();
        let sessions = self.sessions.clone();

        info!("Submitting {:?} for {}", operation, credentials.email);
        let request = Request { operation, credentials };

        let work = async move {
            let _permit = match early_permit {
                Some(permit) => permit,
                None => in_flight.acquire(request.credentials.email.clone()).await,
            };
            task::run(sessions.as_ref(), &request).await
        };

        Ok(task::spawn(work, callback))
    }

    /// Awaitable form of `submit` built on the same single-fire delivery.
    pub async fn execute(
        &self,
        operation: Operation,
        credentials: Credentials,
    ) -> Result<RetrievalOutput, RetrievalError> {
        let (tx, rx) = oneshot::channel::<Result<RetrievalOutput, RetrievalError>>();
        let _handle = self.submit(operation, credentials, tx)?;
        rx.await
            .unwrap_or_else(|_| Err(RetrievalError::Interrupted("task ended without a result".to_string())))
    }
}
