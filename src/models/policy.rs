//! Sync policy models
//!
//! This module defines the sections of the configuration document, the
//! per-section include/exclude filters, the rebuild selection forwarded
//! with the bundle, and the resolved per-run [`SyncPolicy`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::FilterError;

/// Named top-level branch of the configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Dns,
    Dhcp,
    Ntp,
    Resolver,
    Database,
    Webserver,
    Files,
    Misc,
    Debug,
}

impl Section {
    /// Sections that may travel to replicas
    pub const SYNCABLE: [Section; 7] = [
        Section::Dns,
        Section::Dhcp,
        Section::Ntp,
        Section::Resolver,
        Section::Database,
        Section::Misc,
        Section::Debug,
    ];

    /// Key of the section inside the document
    pub fn key(&self) -> &'static str {
        match self {
            Section::Dns => "dns",
            Section::Dhcp => "dhcp",
            Section::Ntp => "ntp",
            Section::Resolver => "resolver",
            Section::Database => "database",
            Section::Webserver => "webserver",
            Section::Files => "files",
            Section::Misc => "misc",
            Section::Debug => "debug",
        }
    }

    /// Upper-case name used in environment variables
    pub fn env_name(&self) -> &'static str {
        match self {
            Section::Dns => "DNS",
            Section::Dhcp => "DHCP",
            Section::Ntp => "NTP",
            Section::Resolver => "RESOLVER",
            Section::Database => "DATABASE",
            Section::Webserver => "WEBSERVER",
            Section::Files => "FILES",
            Section::Misc => "MISC",
            Section::Debug => "DEBUG",
        }
    }

    /// `webserver` and `files` hold appliance-local state and are never synced
    pub fn is_syncable(&self) -> bool {
        !matches!(self, Section::Webserver | Section::Files)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// How a section filter selects key paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum FilterMode {
    /// Keep only the listed paths
    Include,
    /// Keep everything except the listed paths
    Exclude,
}

impl std::str::FromStr for FilterMode {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "include" => Ok(FilterMode::Include),
            "exclude" => Ok(FilterMode::Exclude),
            _ => Err(FilterError::UnsupportedMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for FilterMode {
    type Error = FilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterMode::Include => write!(f, "include"),
            FilterMode::Exclude => write!(f, "exclude"),
        }
    }
}

/// Include or exclude filter applied to one section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionFilter {
    pub mode: FilterMode,
    /// Dot-separated key paths, in configured order
    pub keys: Vec<String>,
}

/// Per-section sync policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionPolicy {
    pub enabled: bool,
    pub filter: Option<SectionFilter>,
}

impl SectionPolicy {
    /// Section travels unfiltered
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            filter: None,
        }
    }

    /// Section never travels
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Build a policy from optional include and exclude lists
    ///
    /// Supplying both lists is a validation error.
    pub fn from_lists(
        section: Section,
        enabled: bool,
        include: Option<Vec<String>>,
        exclude: Option<Vec<String>>,
    ) -> Result<Self, ConfigError> {
        let filter = match (include, exclude) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Validation(format!(
                    "{}: include and exclude filters are mutually exclusive",
                    section
                )))
            }
            (Some(keys), None) => Some(SectionFilter {
                mode: FilterMode::Include,
                keys,
            }),
            (None, Some(keys)) => Some(SectionFilter {
                mode: FilterMode::Exclude,
                keys,
            }),
            (None, None) => None,
        };

        Ok(Self { enabled, filter })
    }
}

/// Blocklist-database subsystems requested when importing the bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildSelection {
    pub dhcp_leases: bool,
    pub group: bool,
    pub adlist: bool,
    pub adlist_by_group: bool,
    pub domainlist: bool,
    pub domainlist_by_group: bool,
    pub client: bool,
    pub client_by_group: bool,
}

impl RebuildSelection {
    /// Every subsystem selected
    pub fn all() -> Self {
        Self {
            dhcp_leases: true,
            group: true,
            adlist: true,
            adlist_by_group: true,
            domainlist: true,
            domainlist_by_group: true,
            client: true,
            client_by_group: true,
        }
    }
}

/// Full or selective sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Selective,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Full => write!(f, "full"),
            SyncMode::Selective => write!(f, "selective"),
        }
    }
}

/// Resolved policy for one sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPolicy {
    pub mode: SyncMode,
    pub rebuild_selection: RebuildSelection,
    pub sections: BTreeMap<Section, SectionPolicy>,
    pub trigger_rebuild: bool,
}

impl SyncPolicy {
    /// Every syncable section unfiltered and every rebuild flag set
    pub fn full(trigger_rebuild: bool) -> Self {
        let sections = Section::SYNCABLE
            .iter()
            .map(|section| (*section, SectionPolicy::enabled()))
            .collect();

        Self {
            mode: SyncMode::Full,
            rebuild_selection: RebuildSelection::all(),
            sections,
            trigger_rebuild,
        }
    }

    /// Exactly the user-configured policy
    ///
    /// Sections that are not syncable are dropped.
    pub fn selective(
        rebuild_selection: RebuildSelection,
        sections: BTreeMap<Section, SectionPolicy>,
        trigger_rebuild: bool,
    ) -> Self {
        let sections = sections
            .into_iter()
            .filter(|(section, _)| section.is_syncable())
            .collect();

        Self {
            mode: SyncMode::Selective,
            rebuild_selection,
            sections,
            trigger_rebuild,
        }
    }

    /// Sections with `enabled = true`, in document order
    pub fn enabled_sections(&self) -> impl Iterator<Item = (&Section, &SectionPolicy)> {
        self.sections.iter().filter(|(_, policy)| policy.enabled)
    }
}
