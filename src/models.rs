// src/models.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Login details supplied by the caller for one retrieval.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A remembered login, keyed by `user_email`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserData {
    pub user_email: String,
    pub password: String,
}

impl From<&Credentials> for UserData {
    fn from(creds: &Credentials) -> Self {
        UserData {
            user_email: creds.email.clone(),
            password: creds.password.clone(),
        }
    }
}

impl From<UserData> for Credentials {
    fn from(user: UserData) -> Self {
        Credentials::new(user.user_email, user.password)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummaryData {
    pub user_email: String,
    pub total_payments: BigDecimal,
    pub account_value: BigDecimal,
    pub outstanding_principal: BigDecimal,
    pub available_cash: BigDecimal,
    pub in_funding_notes: BigDecimal,
    pub adjusted_account_value: BigDecimal,
    pub interest_received: BigDecimal,
    pub past_due_notes_adjustment: BigDecimal,
}

/// Net annualized return figures. Both values are ratios: 4.25% is 0.0425.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NARCalculationData {
    pub user_email: String,
    pub adjusted_net_annualized_return: BigDecimal,
    pub weighted_average_rate: BigDecimal,
}

/// Result of the combined login operation. Not persisted as a unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountOverview {
    pub account_summary: AccountSummaryData,
    pub net_annualized_return: NARCalculationData,
}

/// A stored record together with the time it was last written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached<T> {
    pub record: T,
    pub updated_at: DateTime<Utc>,
}
