//! Application error types for replica-sync
//!
//! This module defines the error taxonomy shared by the filter engine,
//! the appliance client, the sync orchestrator and the notification hook.
//! All error types use `thiserror` for ergonomic error handling.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by a single call against one appliance
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TargetError {
    /// Network timeout
    #[error("Network timeout")]
    NetworkTimeout,

    /// Connection refused
    #[error("Connection refused")]
    ConnectionRefused,

    /// Credentials rejected by the appliance
    #[error("Unauthorized")]
    Unauthorized,

    /// An authenticated call was made without a live session
    #[error("No active session")]
    NotAuthenticated,

    /// Resource not found
    #[error("Resource not found")]
    NotFound,

    /// Rate limited by the appliance
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Non-success HTTP status
    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    /// Response body could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Generic network error
    #[error("Network error: {0}")]
    Network(String),
}

/// Key-path filtering errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilterError {
    /// Filter mode string is neither `include` nor `exclude`
    #[error("Unsupported filter mode: {0}")]
    UnsupportedMode(String),

    /// Key path is empty or contains an empty segment
    #[error("Invalid key path: '{0}'")]
    InvalidPath(String),
}

/// Phase of a sync run in which a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Authenticate,
    SyncBundle,
    SyncDocument,
    Rebuild,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Authenticate => "authenticate",
            SyncPhase::SyncBundle => "sync bundle",
            SyncPhase::SyncDocument => "sync document",
            SyncPhase::Rebuild => "rebuild",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal error of one sync run, tagged with the phase that produced it
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    /// A target rejected or failed authentication
    #[error("authenticate: {target}: {source}")]
    Authentication { target: String, source: TargetError },

    /// Reading the bundle from the primary or importing it on a replica failed
    #[error("sync bundle: {target}: {source}")]
    BundleTransfer { target: String, source: TargetError },

    /// Reading the document from the primary or patching a replica failed
    #[error("sync document: {target}: {source}")]
    DocumentTransfer { target: String, source: TargetError },

    /// A section filter could not be applied
    #[error("sync document: section {section}: {source}")]
    Filter { section: String, source: FilterError },

    /// Triggering the rebuild failed
    #[error("rebuild: {target}: {source}")]
    Rebuild { target: String, source: TargetError },
}

impl SyncError {
    /// The phase this error aborted
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncError::Authentication { .. } => SyncPhase::Authenticate,
            SyncError::BundleTransfer { .. } => SyncPhase::SyncBundle,
            SyncError::DocumentTransfer { .. } | SyncError::Filter { .. } => {
                SyncPhase::SyncDocument
            }
            SyncError::Rebuild { .. } => SyncPhase::Rebuild,
        }
    }
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Request could not be sent
    #[error("send webhook request: {0}")]
    Request(#[from] reqwest::Error),

    /// Endpoint answered with an error status
    #[error("webhook returned status {0}")]
    Status(u16),

    /// Configured HTTP method is not a valid token
    #[error("invalid webhook method: {0}")]
    InvalidMethod(String),

    /// Configured header name or value is not valid
    #[error("invalid webhook header: {0}")]
    InvalidHeader(String),
}

/// Recurring schedule errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScheduleError {
    /// Cron expression could not be parsed
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },
}

/// Application-level error type
///
/// Aggregates the domain errors surfaced to the binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Sync run failed
    #[error("Sync failed: {0}")]
    Sync(#[from] SyncError),

    /// Schedule error
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}
