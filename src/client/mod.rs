//! Appliance clients
//!
//! [`TargetClient`] is the capability set every appliance exposes to the
//! orchestrator, primary and replicas alike. [`PiHoleClient`] implements it
//! over the appliance's REST API.

pub mod pihole;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TargetError;
use crate::models::{ConfigDocument, RebuildSelection};

pub use pihole::PiHoleClient;

/// Administrative API of one appliance
///
/// Each call is independently retryable. The session obtained by
/// `authenticate` is owned by the client and released by `close_session`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TargetClient: Send + Sync {
    /// Address used to identify the target in logs and errors
    fn name(&self) -> &str;

    /// Open a session
    async fn authenticate(&self) -> Result<(), TargetError>;

    /// Export the opaque configuration bundle
    async fn fetch_bundle(&self) -> Result<Bytes, TargetError>;

    /// Import a bundle, rebuilding the selected subsystems
    async fn import_bundle(
        &self,
        bundle: &Bytes,
        selection: &RebuildSelection,
    ) -> Result<(), TargetError>;

    /// Read the structured configuration document
    async fn fetch_document(&self) -> Result<ConfigDocument, TargetError>;

    /// Apply a partial configuration document
    async fn patch_document(&self, partial: &ConfigDocument) -> Result<(), TargetError>;

    /// Regenerate the active blocklist database
    async fn trigger_rebuild(&self) -> Result<(), TargetError>;

    /// Release the session
    async fn close_session(&self) -> Result<(), TargetError>;
}
