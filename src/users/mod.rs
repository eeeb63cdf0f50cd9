pub mod mapper;
pub mod table;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};

use crate::mixitup::MixItUpClient;
use crate::users::mapper::{map_profile, UserRecord};
use crate::users::table::TableClient;
use crate::validation::FieldViolation;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Validation error occurred")]
    Validation(Vec<FieldViolation>),
    #[error("{0:#}")]
    Upstream(#[from] anyhow::Error),
}

/// Result of a sync call, shaped for the HTTP response body. Failures are
/// reported here rather than raised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldViolation>>,
}

impl SyncOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            details: None,
        }
    }

    pub fn failed(err: SyncError) -> Self {
        let message = err.to_string();
        let details = match err {
            SyncError::Validation(violations) => Some(violations),
            SyncError::Upstream(_) => None,
        };
        Self {
            success: false,
            data: None,
            message: Some(message),
            details,
        }
    }

    fn from_result(result: Result<Value, SyncError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failed(err),
        }
    }
}

/// Keeps the user table in step with MixItUp profiles.
#[derive(Clone)]
pub struct UserSync {
    mixitup: MixItUpClient,
    table: TableClient,
    preferred_platform: Option<String>,
    page_size: u32,
}

impl UserSync {
    pub fn new(
        mixitup: MixItUpClient,
        table: TableClient,
        preferred_platform: Option<String>,
        page_size: u32,
    ) -> Self {
        Self {
            mixitup,
            table,
            preferred_platform,
            page_size,
        }
    }

    /// Fetch one profile, flatten it and upsert it. On success `data` holds
    /// the upserted row.
    pub async fn upsert_user(&self, mixitup_user_id: &str) -> SyncOutcome {
        info!("Fetching user data for mixitupUserId: {}", mixitup_user_id);
        let outcome = SyncOutcome::from_result(self.try_upsert_user(mixitup_user_id).await);
        log_outcome("upsert user", &outcome);
        outcome
    }

    async fn try_upsert_user(&self, mixitup_user_id: &str) -> Result<Value, SyncError> {
        let profile = self.mixitup.get_user(mixitup_user_id).await?;
        let record = map_profile(&profile, self.preferred_platform.as_deref())
            .map_err(SyncError::Validation)?;

        let response = self.table.upsert_rows(std::slice::from_ref(&record)).await?;
        info!("User data upserted successfully: {}", response);

        Ok(serde_json::to_value(&record).map_err(anyhow::Error::from)?)
    }

    /// Fetch every profile and upsert them in one call. A single invalid
    /// profile fails the whole batch and nothing is written.
    pub async fn sync_all_users(&self) -> SyncOutcome {
        info!("Fetching all users from {}", self.mixitup.base_url());
        let outcome = SyncOutcome::from_result(self.try_sync_all_users().await);
        log_outcome("sync all users", &outcome);
        outcome
    }

    async fn try_sync_all_users(&self) -> Result<Value, SyncError> {
        let profiles = self.mixitup.list_all_users(self.page_size).await?;

        let mut rows: Vec<UserRecord> = Vec::with_capacity(profiles.len());
        let mut problems = Vec::new();
        for profile in &profiles {
            match map_profile(profile, self.preferred_platform.as_deref()) {
                Ok(record) => rows.push(record),
                Err(violations) => {
                    problems.extend(violations.into_iter().map(|v| FieldViolation {
                        field: format!("users[{}].{}", profile.id, v.field),
                        ..v
                    }));
                }
            }
        }
        if !problems.is_empty() {
            return Err(SyncError::Validation(problems));
        }

        if rows.is_empty() {
            info!("No users to upsert");
            return Ok(Value::Null);
        }
        Ok(self.table.upsert_rows(&rows).await?)
    }

    /// Remove every row from the user table.
    pub async fn delete_all_users(&self) -> SyncOutcome {
        info!("Deleting all users...");
        let result = self.table.delete_all_rows().await.map_err(SyncError::from);
        let outcome = SyncOutcome::from_result(result);
        log_outcome("delete all users", &outcome);
        outcome
    }
}

fn log_outcome(operation: &str, outcome: &SyncOutcome) {
    if outcome.success {
        info!("{} succeeded", operation);
        return;
    }
    let message = outcome.message.as_deref().unwrap_or("unknown error");
    match &outcome.details {
        Some(details) => error!("{} failed: {} ({:?})", operation, message, details),
        None => error!("{} failed: {}", operation, message),
    }
}
