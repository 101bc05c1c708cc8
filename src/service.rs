//! Service wiring
//!
//! Connects configuration, appliance clients, the orchestrator, the webhook
//! notifier and the recurring schedule.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::sync::{Replicator, ScheduleRunner, SyncReport, SyncSchedule, Syncable};
use crate::webhook::{Notifier, SyncOutcome, WebhookClient};

/// A configured replica-sync instance
pub struct Service {
    config: Config,
    replicator: Replicator,
    notifier: Arc<dyn Notifier>,
}

impl Service {
    pub fn new(config: Config, replicator: Replicator, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            replicator,
            notifier,
        }
    }

    /// Validate the configuration and build every client
    pub fn from_config(config: Config) -> Result<Self, AppError> {
        config.validate()?;

        let http = config
            .client
            .build_http_client()
            .map_err(|e| AppError::HttpClient(e.to_string()))?;
        let replicator = Replicator::from_config(&config, http);

        let notifier = WebhookClient::from_settings(config.webhook.clone())
            .map_err(|e| AppError::HttpClient(e.to_string()))?;

        Ok(Self::new(config, replicator, Arc::new(notifier)))
    }

    /// Perform one sync run and send its notification
    ///
    /// A policy that fails to resolve is returned before any target is
    /// contacted and without a notification.
    pub async fn sync_once(&self) -> Result<SyncReport, AppError> {
        let policy = self.config.sync.resolve_policy()?;

        let result = self.replicator.run(&policy).await;
        let outcome = match &result {
            Ok(_) => SyncOutcome::Success,
            Err(err) => {
                error!(phase = %err.phase(), error = %err, "Sync run failed");
                SyncOutcome::Failure
            }
        };

        if let Err(err) = self.notifier.notify(outcome).await {
            warn!(outcome = %outcome, error = %err, "Failed to send webhook");
        }

        result.map_err(AppError::from)
    }

    /// Run once, then follow the schedule until shutdown
    ///
    /// A failed first run is returned even when a schedule is configured;
    /// only scheduled runs are allowed to fail without stopping the service.
    pub async fn run(
        &self,
        once: bool,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), AppError> {
        let schedule = match (&self.config.sync.cron, once) {
            (Some(expression), false) => Some(SyncSchedule::parse(expression)?),
            _ => None,
        };

        self.sync_once().await?;

        if let Some(schedule) = schedule {
            info!(cron = %schedule.expression(), "Following sync schedule");
            ScheduleRunner::new(schedule, shutdown_rx).run(self).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Syncable for Service {
    async fn sync(&self) -> Result<SyncReport, AppError> {
        self.sync_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockTargetClient, TargetClient};
    use crate::config::lookup_from;
    use crate::error::{SyncError, TargetError, WebhookError};
    use crate::models::ConfigDocument;
    use crate::webhook::MockNotifier;
    use bytes::Bytes;
    use serde_json::json;
    use std::time::Duration;

    fn config(extra: &[(&str, &str)]) -> Config {
        let mut vars = vec![
            ("PRIMARY", "http://primary.lan|secret"),
            ("REPLICAS", "http://replica.lan|secret"),
            ("FULL_SYNC", "true"),
        ];
        vars.extend_from_slice(extra);
        Config::from_lookup(lookup_from(&vars)).unwrap()
    }

    fn healthy(name: &str) -> MockTargetClient {
        let mut mock = MockTargetClient::new();
        mock.expect_name().return_const(name.to_string());
        mock.expect_authenticate().returning(|| Ok(()));
        mock.expect_fetch_bundle()
            .returning(|| Ok(Bytes::from_static(b"zip")));
        mock.expect_fetch_document().returning(|| {
            Ok(ConfigDocument::try_from(json!({"dns": {"upstreams": []}})).unwrap())
        });
        mock.expect_import_bundle().returning(|_, _| Ok(()));
        mock.expect_patch_document().returning(|_| Ok(()));
        mock.expect_trigger_rebuild().returning(|| Ok(()));
        mock.expect_close_session().returning(|| Ok(()));
        mock
    }

    fn service(
        config: Config,
        primary: MockTargetClient,
        replica: MockTargetClient,
        notifier: MockNotifier,
    ) -> Service {
        let replicator = Replicator::new(
            Arc::new(primary),
            vec![Arc::new(replica) as Arc<dyn TargetClient>],
            Duration::ZERO,
        );
        Service::new(config, replicator, Arc::new(notifier))
    }

    // Test 1: Successful run fires only the success notification
    #[tokio::test]
    async fn test_success_notifies_once() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|outcome| *outcome == SyncOutcome::Success)
            .times(1)
            .returning(|_| Ok(()));

        let service = service(
            config(&[]),
            healthy("http://primary.lan"),
            healthy("http://replica.lan"),
            notifier,
        );

        let report = service.sync_once().await.unwrap();
        assert_eq!(report.replicas, 1);
    }

    // Test 2: Failed run fires only the failure notification
    #[tokio::test]
    async fn test_failure_notifies_once() {
        let mut primary = MockTargetClient::new();
        primary.expect_name().return_const("http://primary.lan".to_string());
        primary
            .expect_authenticate()
            .times(1)
            .returning(|| Err(TargetError::Unauthorized));
        primary.expect_close_session().times(1).returning(|| Ok(()));

        let mut replica = MockTargetClient::new();
        replica.expect_name().return_const("http://replica.lan".to_string());
        replica.expect_close_session().times(1).returning(|| Ok(()));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .withf(|outcome| *outcome == SyncOutcome::Failure)
            .times(1)
            .returning(|_| Ok(()));

        let service = service(config(&[]), primary, replica, notifier);

        match service.sync_once().await {
            Err(AppError::Sync(SyncError::Authentication { target, .. })) => {
                assert_eq!(target, "http://primary.lan")
            }
            other => panic!("Expected authentication failure, got {:?}", other),
        }
    }

    // Test 3: Notification errors never change the run result
    #[tokio::test]
    async fn test_notifier_error_ignored() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .times(1)
            .returning(|_| Err(WebhookError::Status(503)));

        let service = service(
            config(&[]),
            healthy("http://primary.lan"),
            healthy("http://replica.lan"),
            notifier,
        );

        assert!(service.sync_once().await.is_ok());
    }

    // Test 4: Conflicting filters fail before any target call or notification
    #[tokio::test]
    async fn test_invalid_policy_makes_no_calls() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);

        let service = service(
            config(&[
                ("FULL_SYNC", "false"),
                ("SYNC_CONFIG_DNS_INCLUDE", "upstreams"),
                ("SYNC_CONFIG_DNS_EXCLUDE", "domain"),
            ]),
            MockTargetClient::new(),
            MockTargetClient::new(),
            notifier,
        );

        assert!(matches!(
            service.sync_once().await,
            Err(AppError::Config(_))
        ));
    }

    // Test 5: Once mode ignores the schedule
    #[tokio::test]
    async fn test_run_once_ignores_cron() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));

        let service = service(
            config(&[("CRON", "* * * * *")]),
            healthy("http://primary.lan"),
            healthy("http://replica.lan"),
            notifier,
        );
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        assert!(service.run(true, shutdown_rx).await.is_ok());
    }

    // Test 6: Without a schedule a failed run is returned
    #[tokio::test]
    async fn test_run_without_schedule_returns_error() {
        let mut primary = MockTargetClient::new();
        primary.expect_name().return_const("http://primary.lan".to_string());
        primary
            .expect_authenticate()
            .returning(|| Err(TargetError::ConnectionRefused));
        primary.expect_close_session().returning(|| Ok(()));

        let mut replica = MockTargetClient::new();
        replica.expect_name().return_const("http://replica.lan".to_string());
        replica.expect_close_session().returning(|| Ok(()));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));

        let service = service(config(&[]), primary, replica, notifier);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        assert!(matches!(
            service.run(false, shutdown_rx).await,
            Err(AppError::Sync(_))
        ));
    }

    // Test 7: With a schedule the service keeps running until shutdown
    #[tokio::test(start_paused = true)]
    async fn test_run_with_schedule_until_shutdown() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().returning(|_| Ok(()));

        let service = service(
            config(&[("CRON", "0 0 1 1 *")]),
            healthy("http://primary.lan"),
            healthy("http://replica.lan"),
            notifier,
        );
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        shutdown_tx.send(()).unwrap();

        assert!(service.run(false, shutdown_rx).await.is_ok());
    }

    // Test 8: A failed first run is returned even with a schedule
    #[tokio::test(start_paused = true)]
    async fn test_run_with_schedule_returns_first_error() {
        let mut primary = MockTargetClient::new();
        primary.expect_name().return_const("http://primary.lan".to_string());
        primary
            .expect_authenticate()
            .returning(|| Err(TargetError::ConnectionRefused));
        primary.expect_close_session().returning(|| Ok(()));

        let mut replica = MockTargetClient::new();
        replica.expect_name().return_const("http://replica.lan".to_string());
        replica.expect_close_session().returning(|| Ok(()));

        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));

        let service = service(config(&[("CRON", "* * * * *")]), primary, replica, notifier);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        assert!(matches!(
            service.run(false, shutdown_rx).await,
            Err(AppError::Sync(_))
        ));
    }

    // Test 9: from_config rejects invalid configuration
    #[test]
    fn test_from_config_validates() {
        let invalid = config(&[("CRON", "not a cron")]);
        assert!(matches!(
            Service::from_config(invalid),
            Err(AppError::Config(_))
        ));

        assert!(Service::from_config(config(&[])).is_ok());
    }
}
