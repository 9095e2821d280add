// src/services/db.rs
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StoreError;
use crate::models::{AccountOverview, AccountSummaryData, Cached, NARCalculationData, UserData};
use crate::services::locks::{KeyPermit, KeyedLocks};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS user_data (
        user_email TEXT PRIMARY KEY NOT NULL,
        password TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS account_summary_data (
        user_email TEXT PRIMARY KEY NOT NULL,
        total_payments TEXT NOT NULL,
        account_value TEXT NOT NULL,
        outstanding_principal TEXT NOT NULL,
        available_cash TEXT NOT NULL,
        in_funding_notes TEXT NOT NULL,
        adjusted_account_value TEXT NOT NULL,
        interest_received TEXT NOT NULL,
        past_due_notes_adjustment TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS nar_calculation_data (
        user_email TEXT PRIMARY KEY NOT NULL,
        adjusted_net_annualized_return TEXT NOT NULL,
        weighted_average_rate TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
];

/// Local cache of scraped records. Writes are upserts keyed by `user_email`.
///
/// Decimals are stored as their exact text form.
pub struct DbStore {
    pub(crate) pool: SqlitePool,
    key_locks: KeyedLocks<(&'static str, String)>,
}

impl DbStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!("Opened record store at {}", database_url);
        Self::with_pool(pool).await
    }

    /// Private in-memory database, mainly for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // one connection that never closes, or the database disappears with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = DbStore {
            pool,
            key_locks: KeyedLocks::new(),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Record store schema ready");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn lock_key(&self, table: &'static str, key: &str) -> KeyPermit<(&'static str, String)> {
        self.key_locks.acquire((table, key.to_string())).await
    }

    pub async fn upsert_user(&self, user: &UserData) -> Result<(), StoreError> {
        let _guard = self.lock_key("user_data", &user.user_email).await;

        sqlx::query(
            r#"
            INSERT INTO user_data (user_email, password, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (user_email) DO UPDATE SET
                password = excluded.password,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user.user_email.as_str())
        .bind(user.password.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Saved user {}", user.user_email);
        Ok(())
    }

    pub async fn upsert_account_summary(&self, summary: &AccountSummaryData) -> Result<(), StoreError> {
        let _guard = self.lock_key("account_summary_data", &summary.user_email).await;

        sqlx::query(
            r#"
            INSERT INTO account_summary_data (
                user_email, total_payments, account_value, outstanding_principal,
                available_cash, in_funding_notes, adjusted_account_value,
                interest_received, past_due_notes_adjustment, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (user_email) DO UPDATE SET
                total_payments = excluded.total_payments,
                account_value = excluded.account_value,
                outstanding_principal = excluded.outstanding_principal,
                available_cash = excluded.available_cash,
                in_funding_notes = excluded.in_funding_notes,
                adjusted_account_value = excluded.adjusted_account_value,
                interest_received = excluded.interest_received,
                past_due_notes_adjustment = excluded.past_due_notes_adjustment,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(summary.user_email.as_str())
        .bind(summary.total_payments.to_string())
        .bind(summary.account_value.to_string())
        .bind(summary.outstanding_principal.to_string())
        .bind(summary.available_cash.to_string())
        .bind(summary.in_funding_notes.to_string())
        .bind(summary.adjusted_account_value.to_string())
        .bind(summary.interest_received.to_string())
        .bind(summary.past_due_notes_adjustment.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Saved account summary for {}", summary.user_email);
        Ok(())
    }

    pub async fn upsert_nar_calculation(&self, nar: &NARCalculationData) -> Result<(), StoreError> {
        let _guard = self.lock_key("nar_calculation_data", &nar.user_email).await;

        sqlx::query(
            r#"
            INSERT INTO nar_calculation_data (
                user_email, adjusted_net_annualized_return, weighted_average_rate, updated_at
            )
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (user_email) DO UPDATE SET
                adjusted_net_annualized_return = excluded.adjusted_net_annualized_return,
                weighted_average_rate = excluded.weighted_average_rate,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(nar.user_email.as_str())
        .bind(nar.adjusted_net_annualized_return.to_string())
        .bind(nar.weighted_average_rate.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Saved NAR calculation for {}", nar.user_email);
        Ok(())
    }

    /// Stores both halves of a login result, and the user when `remember` is
    /// given. Every write is attempted; failures are logged and the first one
    /// is returned. Earlier successful writes are not rolled back.
    pub async fn save_login_result(
        &self,
        overview: &AccountOverview,
        remember: Option<&UserData>,
    ) -> Result<(), StoreError> {
        let mut first_error = None;

        if let Err(e) = self.upsert_account_summary(&overview.account_summary).await {
            error!("Failed to save account summary: {}", e);
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.upsert_nar_calculation(&overview.net_annualized_return).await {
            error!("Failed to save NAR calculation: {}", e);
            first_error.get_or_insert(e);
        }
        if let Some(user) = remember {
            if let Err(e) = self.upsert_user(user).await {
                error!("Failed to save user {}: {}", user.user_email, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// All remembered users, ordered by email.
    pub async fn get_users(&self) -> Result<Vec<UserData>, StoreError> {
        let rows = sqlx::query("SELECT user_email, password FROM user_data ORDER BY user_email")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<UserData, StoreError> {
                Ok(UserData {
                    user_email: row.try_get("user_email")?,
                    password: row.try_get("password")?,
                })
            })
            .collect()
    }

    pub async fn get_user(&self, user_email: &str) -> Result<Option<UserData>, StoreError> {
        let row = sqlx::query("SELECT user_email, password FROM user_data WHERE user_email = ?1")
            .bind(user_email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<UserData, StoreError> {
            Ok(UserData {
                user_email: r.try_get("user_email")?,
                password: r.try_get("password")?,
            })
        })
        .transpose()
    }

    pub async fn get_account_summary(
        &self,
        user_email: &str,
    ) -> Result<Option<Cached<AccountSummaryData>>, StoreError> {
        let row = sqlx::query("SELECT * FROM account_summary_data WHERE user_email = ?1")
            .bind(user_email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<Cached<AccountSummaryData>, StoreError> {
            Ok(Cached {
                record: AccountSummaryData {
                    user_email: r.try_get("user_email")?,
                    total_payments: decimal(&r, "total_payments")?,
                    account_value: decimal(&r, "account_value")?,
                    outstanding_principal: decimal(&r, "outstanding_principal")?,
                    available_cash: decimal(&r, "available_cash")?,
                    in_funding_notes: decimal(&r, "in_funding_notes")?,
                    adjusted_account_value: decimal(&r, "adjusted_account_value")?,
                    interest_received: decimal(&r, "interest_received")?,
                    past_due_notes_adjustment: decimal(&r, "past_due_notes_adjustment")?,
                },
                updated_at: timestamp(&r)?,
            })
        })
        .transpose()
    }

    pub async fn get_nar_calculation(
        &self,
        user_email: &str,
    ) -> Result<Option<Cached<NARCalculationData>>, StoreError> {
        let row = sqlx::query("SELECT * FROM nar_calculation_data WHERE user_email = ?1")
            .bind(user_email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<Cached<NARCalculationData>, StoreError> {
            Ok(Cached {
                record: NARCalculationData {
                    user_email: r.try_get("user_email")?,
                    adjusted_net_annualized_return: decimal(&r, "adjusted_net_annualized_return")?,
                    weighted_average_rate: decimal(&r, "weighted_average_rate")?,
                },
                updated_at: timestamp(&r)?,
            })
        })
        .transpose()
    }
}

fn decimal(row: &SqliteRow, column: &str) -> Result<BigDecimal, StoreError> {
    let raw: String = row.try_get(column)?;
    BigDecimal::from_str(&raw)
        .map_err(|e| StoreError::Corrupt(format!("{} = '{}': {}", column, raw, e)))
}

fn timestamp(row: &SqliteRow) -> Result<DateTime<Utc>, StoreError> {
    let raw: String = row.try_get("updated_at")?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("updated_at = '{}': {}", raw, e)))
}
