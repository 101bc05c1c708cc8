//! Sync orchestrator
//!
//! One [`Replicator::run`] is one sync run: authenticate every target,
//! transfer the bundle, transfer the (optionally filtered) document, trigger
//! the rebuild, and release every session. Phases and replicas are processed
//! strictly in order; the first fatal error aborts the remaining phases.
//! Session release runs on every exit path and never changes the result.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::client::{PiHoleClient, TargetClient};
use crate::config::Config;
use crate::error::{SyncError, SyncPhase};
use crate::filter;
use crate::models::{ConfigDocument, Section, SyncMode, SyncPolicy};
use crate::sync::retry::{attempts, RetryPolicy};

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Number of replicas brought in line with the primary
    pub replicas: usize,
    /// Sections carried by the document patch
    pub sections: Vec<Section>,
    pub rebuild_triggered: bool,
}

/// Drives sync runs from one primary to an ordered list of replicas
pub struct Replicator {
    primary: Arc<dyn TargetClient>,
    replicas: Vec<Arc<dyn TargetClient>>,
    retry_delay: Duration,
}

impl Replicator {
    pub fn new(
        primary: Arc<dyn TargetClient>,
        replicas: Vec<Arc<dyn TargetClient>>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            primary,
            replicas,
            retry_delay,
        }
    }

    /// Build appliance clients for every configured target
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let primary: Arc<dyn TargetClient> =
            Arc::new(PiHoleClient::from_config(&config.primary, http.clone()));
        let replicas = config
            .replicas
            .iter()
            .map(|replica| {
                Arc::new(PiHoleClient::from_config(replica, http.clone())) as Arc<dyn TargetClient>
            })
            .collect();

        Self::new(primary, replicas, config.client.retry_delay())
    }

    /// Execute one sync run
    pub async fn run(&self, policy: &SyncPolicy) -> Result<SyncReport, SyncError> {
        info!(
            mode = %policy.mode,
            replicas = self.replicas.len(),
            "Starting sync run"
        );

        let result = self.run_phases(policy).await;
        self.close_sessions().await;

        if let Ok(report) = &result {
            info!(
                mode = %report.mode,
                replicas = report.replicas,
                sections = report.sections.len(),
                rebuild = report.rebuild_triggered,
                "Sync run completed"
            );
        }

        result
    }

    async fn run_phases(&self, policy: &SyncPolicy) -> Result<SyncReport, SyncError> {
        self.authenticate().await?;
        self.sync_bundle(policy).await?;
        let sections = self.sync_document(policy).await?;

        if policy.trigger_rebuild {
            self.trigger_rebuild().await?;
        }

        Ok(SyncReport {
            mode: policy.mode,
            replicas: self.replicas.len(),
            sections,
            rebuild_triggered: policy.trigger_rebuild,
        })
    }

    fn retry(&self, attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, self.retry_delay)
    }

    async fn authenticate(&self) -> Result<(), SyncError> {
        info!(phase = %SyncPhase::Authenticate, "Authenticating targets");

        self.primary
            .authenticate()
            .await
            .map_err(|source| SyncError::Authentication {
                target: self.primary.name().to_string(),
                source,
            })?;

        let retry = self.retry(attempts::AUTHENTICATE);
        for replica in &self.replicas {
            retry
                .execute(|| replica.authenticate())
                .await
                .map_err(|source| SyncError::Authentication {
                    target: replica.name().to_string(),
                    source,
                })?;
            debug!(appliance = replica.name(), "Replica authenticated");
        }

        Ok(())
    }

    async fn sync_bundle(&self, policy: &SyncPolicy) -> Result<(), SyncError> {
        info!(phase = %SyncPhase::SyncBundle, "Transferring configuration bundle");

        let bundle = self
            .primary
            .fetch_bundle()
            .await
            .map_err(|source| SyncError::BundleTransfer {
                target: self.primary.name().to_string(),
                source,
            })?;
        debug!(bytes = bundle.len(), "Fetched bundle from primary");

        let selection = policy.rebuild_selection;
        let retry = self.retry(attempts::IMPORT_BUNDLE);
        for replica in &self.replicas {
            retry
                .execute(|| replica.import_bundle(&bundle, &selection))
                .await
                .map_err(|source| SyncError::BundleTransfer {
                    target: replica.name().to_string(),
                    source,
                })?;
            debug!(appliance = replica.name(), "Bundle imported");
        }

        Ok(())
    }

    async fn sync_document(&self, policy: &SyncPolicy) -> Result<Vec<Section>, SyncError> {
        info!(phase = %SyncPhase::SyncDocument, "Transferring configuration document");

        let document = self
            .primary
            .fetch_document()
            .await
            .map_err(|source| SyncError::DocumentTransfer {
                target: self.primary.name().to_string(),
                source,
            })?;

        let partial = build_partial(policy, &document)?;
        let sections: Vec<Section> = Section::SYNCABLE
            .into_iter()
            .filter(|section| partial.contains(*section))
            .collect();

        let retry = self.retry(attempts::PATCH_DOCUMENT);
        for replica in &self.replicas {
            retry
                .execute(|| replica.patch_document(&partial))
                .await
                .map_err(|source| SyncError::DocumentTransfer {
                    target: replica.name().to_string(),
                    source,
                })?;
            debug!(appliance = replica.name(), "Document patched");
        }

        Ok(sections)
    }

    async fn trigger_rebuild(&self) -> Result<(), SyncError> {
        info!(phase = %SyncPhase::Rebuild, "Triggering rebuild");

        self.primary
            .trigger_rebuild()
            .await
            .map_err(|source| SyncError::Rebuild {
                target: self.primary.name().to_string(),
                source,
            })?;

        let retry = self.retry(attempts::TRIGGER_REBUILD);
        for replica in &self.replicas {
            retry
                .execute(|| replica.trigger_rebuild())
                .await
                .map_err(|source| SyncError::Rebuild {
                    target: replica.name().to_string(),
                    source,
                })?;
        }

        Ok(())
    }

    /// Best-effort release of every session
    async fn close_sessions(&self) {
        let retry = self.retry(attempts::CLOSE_SESSION);

        for target in std::iter::once(&self.primary).chain(self.replicas.iter()) {
            if let Err(err) = retry.execute(|| target.close_session()).await {
                warn!(
                    appliance = target.name(),
                    error = %err,
                    "Failed to close session"
                );
            }
        }
    }
}

/// Outgoing partial document for the run
///
/// Disabled sections and sections absent from the primary's document are
/// omitted; enabled sections pass through their filter, if any.
pub fn build_partial(
    policy: &SyncPolicy,
    document: &ConfigDocument,
) -> Result<ConfigDocument, SyncError> {
    let mut partial = ConfigDocument::new();

    for (section, section_policy) in policy.enabled_sections() {
        let Some(content) = document.section(*section) else {
            debug!(section = %section, "Section not present in primary document");
            continue;
        };

        let content = match &section_policy.filter {
            Some(section_filter) => {
                filter::apply(section_filter.mode, &section_filter.keys, content).map_err(
                    |source| SyncError::Filter {
                        section: section.to_string(),
                        source,
                    },
                )?
            }
            None => content.clone(),
        };

        partial.insert_section(*section, content);
    }

    Ok(partial)
}
