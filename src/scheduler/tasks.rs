use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::scheduler::{JobFuture, Scheduler};
use crate::users::UserSync;

/// Register the periodic full user sync when a schedule is configured.
/// Returns whether a job was added.
pub async fn register_sync_task(
    scheduler: &mut Scheduler,
    config: &SyncConfig,
    users: UserSync,
) -> anyhow::Result<bool> {
    let Some(schedule) = config.schedule.as_deref() else {
        info!("No sync schedule configured");
        return Ok(false);
    };

    scheduler
        .add_cron_job(schedule, "user-sync", move || {
            let users = users.clone();
            let job: JobFuture = Box::pin(async move {
                let outcome = users.sync_all_users().await;
                if !outcome.success {
                    warn!("Scheduled user sync did not complete");
                }
            });
            job
        })
        .await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::mixitup::MixItUpClient;
    use crate::users::table::TableClient;

    fn users() -> UserSync {
        let http = reqwest::Client::new();
        let table = TableClient::new(
            http.clone(),
            TableConfig {
                base_url: "http://127.0.0.1:9".into(),
                name: "UserTable".into(),
                key_column: "mixitupUserId".into(),
                token: String::new(),
                bot_id: String::new(),
            },
        );
        UserSync::new(MixItUpClient::new(http, "http://127.0.0.1:9"), table, None, 100)
    }

    #[tokio::test]
    async fn test_no_schedule_registers_nothing() {
        let mut scheduler = Scheduler::new().await.unwrap();
        let config = SyncConfig {
            schedule: None,
            page_size: 100,
        };
        assert!(!register_sync_task(&mut scheduler, &config, users()).await.unwrap());
    }

    #[tokio::test]
    async fn test_schedule_registers_job() {
        let mut scheduler = Scheduler::new().await.unwrap();
        let config = SyncConfig {
            schedule: Some("0 0 3 * * *".into()),
            page_size: 100,
        };
        assert!(register_sync_task(&mut scheduler, &config, users()).await.unwrap());
        assert_eq!(scheduler.job_names().collect::<Vec<_>>(), vec!["user-sync"]);
    }

    #[tokio::test]
    async fn test_bad_cron_expression_is_an_error() {
        let mut scheduler = Scheduler::new().await.unwrap();
        let config = SyncConfig {
            schedule: Some("every tuesday".into()),
            page_size: 100,
        };
        assert!(register_sync_task(&mut scheduler, &config, users()).await.is_err());
    }
}
