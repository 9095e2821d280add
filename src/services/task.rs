// src/services/task.rs
use log::{debug, error, info};
use std::future::Future;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RetrievalError;
use crate::models::{AccountOverview, AccountSummaryData, Credentials, NARCalculationData};
use crate::services::parser::{self, PageKind};
use crate::services::session::SessionClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    AccountSummary,
    NetAnnualizedReturn,
    /// Log in once and fetch both pages with that session.
    LoginAndFetchAll,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub operation: Operation,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutput {
    AccountSummary(AccountSummaryData),
    NetAnnualizedReturn(NARCalculationData),
    Overview(AccountOverview),
}

/// Receives the outcome of a submitted task.
///
/// Both methods take `self`, so at most one of them can ever run.
pub trait TaskCallback<T>: Send + 'static {
    fn on_success(self, result: T);

    fn on_error(self, error: RetrievalError);

    /// Checked right before delivery; a dead callback is skipped.
    fn is_live(&self) -> bool {
        true
    }
}

impl<T: Send + 'static> TaskCallback<T> for oneshot::Sender<Result<T, RetrievalError>> {
    fn on_success(self, result: T) {
        let _ = self.send(Ok(result));
    }

    fn on_error(self, error: RetrievalError) {
        let _ = self.send(Err(error));
    }

    fn is_live(&self) -> bool {
        !self.is_closed()
    }
}

/// A running task. Dropping the handle detaches the task; it does not cancel it.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: JoinHandle<bool>,
}

impl TaskHandle {
    /// Stops the work at its next await point. Cancellation is checked
    /// immediately before delivery, so a result that has not been handed over
    /// yet is dropped; a delivery already under way still completes.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the task to end. True if the callback was invoked.
    pub async fn wait(self) -> bool {
        self.join.await.unwrap_or(false)
    }
}

/// Runs `work` on the runtime and hands its outcome to `callback` exactly once,
/// unless the task is cancelled first.
pub fn spawn<T, F, C>(work: F, callback: C) -> TaskHandle
where
    T: Send + 'static,
    F: Future<Output = Result<T, RetrievalError>> + Send + 'static,
    C: TaskCallback<T>,
{
    let token = CancellationToken::new();
    let task_token = token.clone();

    let join = tokio::spawn(async move {
        let inner = tokio::spawn(work);
        let abort = inner.abort_handle();

        let outcome = tokio::select! {
            _ = task_token.cancelled() => {
                abort.abort();
                debug!("Task cancelled before completion");
                return false;
            }
            joined = inner => match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Retrieval task failed to complete: {}", e);
                    Err(RetrievalError::Interrupted(e.to_string()))
                }
            }
        };

        deliver(outcome, callback, &task_token)
    });

    TaskHandle { token, join }
}

fn deliver<T, C: TaskCallback<T>>(
    outcome: Result<T, RetrievalError>,
    callback: C,
    token: &CancellationToken,
) -> bool {
    if token.is_cancelled() || !callback.is_live() {
        debug!("Dropping result for a consumer that went away");
        return false;
    }
    match outcome {
        Ok(result) => callback.on_success(result),
        Err(e) => callback.on_error(e),
    }
    true
}

async fn summary_with<S: SessionClient>(
    client: &S,
    session: &S::Session,
    user_email: &str,
) -> Result<AccountSummaryData, RetrievalError> {
    let doc = client.fetch(session, PageKind::AccountSummary).await?;
    Ok(parser::parse_account_summary(user_email, &doc)?)
}

async fn nar_with<S: SessionClient>(
    client: &S,
    session: &S::Session,
    user_email: &str,
) -> Result<NARCalculationData, RetrievalError> {
    let doc = client.fetch(session, PageKind::NetAnnualizedReturn).await?;
    Ok(parser::parse_net_annualized_return(user_email, &doc)?)
}

pub async fn fetch_account_summary<S: SessionClient>(
    client: &S,
    credentials: &Credentials,
) -> Result<AccountSummaryData, RetrievalError> {
    let session = client.authenticate(credentials).await?;
    summary_with(client, &session, &credentials.email).await
}

pub async fn fetch_net_annualized_return<S: SessionClient>(
    client: &S,
    credentials: &Credentials,
) -> Result<NARCalculationData, RetrievalError> {
    let session = client.authenticate(credentials).await?;
    nar_with(client, &session, &credentials.email).await
}

/// Authenticates once, then fetches both pages over that session.
/// Any failure fails the whole operation; there is no partial result.
pub async fn login_and_fetch<S: SessionClient>(
    client: &S,
    credentials: &Credentials,
) -> Result<AccountOverview, RetrievalError> {
    let session = client.authenticate(credentials).await?;
    let email = credentials.email.as_str();

    let (account_summary, net_annualized_return) = tokio::try_join!(
        summary_with(client, &session, email),
        nar_with(client, &session, email),
    )?;

    info!("Retrieved account overview for {}", email);
    Ok(AccountOverview {
        account_summary,
        net_annualized_return,
    })
}

pub async fn run<S: SessionClient>(
    client: &S,
    request: &Request,
) -> Result<RetrievalOutput, RetrievalError> {
    let creds = &request.credentials;
    match request.operation {
        Operation::AccountSummary => fetch_account_summary(client, creds)
            .await
            .map(RetrievalOutput::AccountSummary),
        Operation::NetAnnualizedReturn => fetch_net_annualized_return(client, creds)
            .await
            .map(RetrievalOutput::NetAnnualizedReturn),
        Operation::LoginAndFetchAll => login_and_fetch(client, creds)
            .await
            .map(RetrievalOutput::Overview),
    }
}
