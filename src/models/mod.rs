//! Domain models for replica-sync
//!
//! This module contains the configuration document and the sync policy
//! types shared by the filter engine, the appliance client and the orchestrator.

pub mod document;
pub mod policy;

// Re-export commonly used types
pub use document::ConfigDocument;
pub use policy::{
    FilterMode, RebuildSelection, Section, SectionFilter, SectionPolicy, SyncMode, SyncPolicy,
};
