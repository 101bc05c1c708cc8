//! Configuration management for replica-sync
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter;
use crate::models::{RebuildSelection, Section, SectionPolicy, SyncPolicy};
use crate::sync::schedule::SyncSchedule;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Authoritative appliance
    pub primary: TargetConfig,

    /// Appliances receiving the primary's state, in sync order
    pub replicas: Vec<TargetConfig>,

    /// HTTP client configuration for appliance calls
    #[serde(default)]
    pub client: ClientConfig,

    /// Sync behaviour
    #[serde(default)]
    pub sync: SyncConfig,

    /// Success/failure notifications
    #[serde(default)]
    pub webhook: WebhookSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // First, expand environment variables in the YAML string
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load variables from a dotenv file into the process environment
    ///
    /// Variables that are already set keep their value.
    pub fn load_env_file<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        dotenvy::from_path(path).map_err(|e| {
            ConfigError::FileRead(format!("env file '{}': {}", path.display(), e))
        })
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an environment-like lookup
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let primary = env.primary()?;
        let replicas = env.replicas()?;

        let client = ClientConfig {
            skip_tls_verification: env.bool_or("CLIENT_SKIP_TLS_VERIFICATION", false)?,
            timeout_secs: env.u64_or("CLIENT_TIMEOUT_SECONDS", default_timeout())?,
            retry_delay_secs: env.u64_or("CLIENT_RETRY_DELAY_SECONDS", default_retry_delay())?,
        };

        let sync = SyncConfig {
            full_sync: env
                .get("FULL_SYNC")
                .ok_or_else(|| ConfigError::MissingRequired("FULL_SYNC".to_string()))
                .and_then(|value| parse_bool("FULL_SYNC", &value))?,
            cron: env.get("CRON"),
            run_gravity: env.bool_or("RUN_GRAVITY", false)?,
            gravity: env.gravity()?,
            config: env.config_settings()?,
        };

        let webhook = WebhookSettings {
            success: env.webhook_event("SYNC_WEBHOOK_SUCCESS")?,
            failure: env.webhook_event("SYNC_WEBHOOK_FAILURE")?,
            client: ClientConfig {
                skip_tls_verification: env
                    .bool_or("SYNC_WEBHOOK_CLIENT_SKIP_TLS_VERIFICATION", false)?,
                timeout_secs: env.u64_or("SYNC_WEBHOOK_CLIENT_TIMEOUT_SECONDS", default_timeout())?,
                retry_delay_secs: default_retry_delay(),
            },
        };

        let mut logging = LoggingConfig::default();
        if let Some(level) = env.get("LOG_LEVEL") {
            logging.level = level;
        }
        if let Some(format) = env.get("LOG_FORMAT") {
            logging.format = format;
        }
        if env.bool_or("NS_DEBUG", false)? {
            logging.level = "debug".to_string();
        }

        Ok(Config {
            primary,
            replicas,
            client,
            sync,
            webhook,
            logging,
        })
    }

    /// Check the configuration before any network call is made
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.primary.validate("primary")?;

        if self.replicas.is_empty() {
            return Err(ConfigError::MissingRequired(
                "at least one replica".to_string(),
            ));
        }
        for (index, replica) in self.replicas.iter().enumerate() {
            replica.validate(&format!("replica {}", index + 1))?;
        }

        self.sync.config.validate()?;

        if let Some(expression) = &self.sync.cron {
            SyncSchedule::parse(expression)
                .map_err(|e| ConfigError::InvalidValue(format!("cron: {}", e)))?;
        }

        self.webhook.success.validate("success")?;
        self.webhook.failure.validate("failure")?;

        Ok(())
    }

    /// One-line description of the configuration without credentials
    pub fn summary(&self) -> String {
        let replicas: Vec<&str> = self.replicas.iter().map(|r| r.url.as_str()).collect();
        format!(
            "primary={}, replicas=[{}], full_sync={}, cron={}, run_gravity={}",
            self.primary.url,
            replicas.join(", "),
            self.sync.full_sync,
            self.sync.cron.as_deref().unwrap_or(""),
            self.sync.run_gravity,
        )
    }
}

/// Address and credential of one appliance
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// Base URL, e.g. `https://ph1.lan`
    pub url: String,

    /// Web interface password
    #[serde(default)]
    pub password: String,
}

impl TargetConfig {
    /// Parse `"<url>|<password>"`
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (url, password) = value.trim().split_once('|').ok_or_else(|| {
            ConfigError::InvalidValue(format!(
                "target must be formatted as '<url>|<password>': {}",
                redact(value)
            ))
        })?;

        Ok(Self {
            url: url.trim().to_string(),
            password: password.to_string(),
        })
    }

    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidValue(format!("{} url '{}': {}", label, self.url, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ConfigError::InvalidValue(format!(
                "{} url '{}': unsupported scheme '{}'",
                label, self.url, scheme
            ))),
        }
    }
}

impl std::fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetConfig")
            .field("url", &self.url)
            .field("password", &"***")
            .finish()
    }
}

fn redact(value: &str) -> String {
    match value.split_once('|') {
        Some((url, _)) => format!("{}|***", url),
        None => value.to_string(),
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Accept invalid TLS certificates
    #[serde(default)]
    pub skip_tls_verification: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Delay between retry attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            skip_tls_verification: false,
            timeout_secs: default_timeout(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Build the shared HTTP client
    pub fn build_http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .danger_accept_invalid_certs(self.skip_tls_verification)
            .user_agent(concat!("replica-sync/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

fn default_timeout() -> u64 {
    20
}

fn default_retry_delay() -> u64 {
    1
}

/// Sync behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Sync everything, ignoring `gravity` and `config`
    #[serde(default)]
    pub full_sync: bool,

    /// Cron expression for recurring runs
    #[serde(default)]
    pub cron: Option<String>,

    /// Trigger a rebuild after the document transfer
    #[serde(default)]
    pub run_gravity: bool,

    /// Rebuild selection for selective sync
    #[serde(default)]
    pub gravity: RebuildSelection,

    /// Section settings for selective sync
    #[serde(default)]
    pub config: ConfigSettings,
}

impl SyncConfig {
    /// Resolve the policy for one run
    ///
    /// Full sync ignores the selective settings entirely.
    pub fn resolve_policy(&self) -> Result<SyncPolicy, ConfigError> {
        if self.full_sync {
            return Ok(SyncPolicy::full(self.run_gravity));
        }

        let sections = self.config.policies()?;
        Ok(SyncPolicy::selective(
            self.gravity,
            sections,
            self.run_gravity,
        ))
    }
}

/// Settings of the syncable sections
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigSettings {
    pub dns: SectionSetting,
    pub dhcp: SectionSetting,
    pub ntp: SectionSetting,
    pub resolver: SectionSetting,
    pub database: SectionSetting,
    pub misc: SectionSetting,
    pub debug: SectionSetting,
}

impl ConfigSettings {
    /// Setting for a syncable section
    pub fn get(&self, section: Section) -> Option<&SectionSetting> {
        match section {
            Section::Dns => Some(&self.dns),
            Section::Dhcp => Some(&self.dhcp),
            Section::Ntp => Some(&self.ntp),
            Section::Resolver => Some(&self.resolver),
            Section::Database => Some(&self.database),
            Section::Misc => Some(&self.misc),
            Section::Debug => Some(&self.debug),
            Section::Webserver | Section::Files => None,
        }
    }

    fn get_mut(&mut self, section: Section) -> Option<&mut SectionSetting> {
        match section {
            Section::Dns => Some(&mut self.dns),
            Section::Dhcp => Some(&mut self.dhcp),
            Section::Ntp => Some(&mut self.ntp),
            Section::Resolver => Some(&mut self.resolver),
            Section::Database => Some(&mut self.database),
            Section::Misc => Some(&mut self.misc),
            Section::Debug => Some(&mut self.debug),
            Section::Webserver | Section::Files => None,
        }
    }

    /// Per-section policies; fails on conflicting or malformed filters
    pub fn policies(&self) -> Result<BTreeMap<Section, SectionPolicy>, ConfigError> {
        let mut policies = BTreeMap::new();
        for section in Section::SYNCABLE {
            if let Some(setting) = self.get(section) {
                policies.insert(section, setting.to_policy(section)?);
            }
        }
        Ok(policies)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policies().map(|_| ())
    }
}

/// Raw per-section setting
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SectionSetting {
    pub enabled: bool,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

impl SectionSetting {
    pub fn to_policy(&self, section: Section) -> Result<SectionPolicy, ConfigError> {
        let policy = SectionPolicy::from_lists(
            section,
            self.enabled,
            self.include.clone(),
            self.exclude.clone(),
        )?;

        if let Some(filter) = &policy.filter {
            for key in &filter.keys {
                filter::parse_path(key)
                    .map_err(|e| ConfigError::Validation(format!("{}: {}", section, e)))?;
            }
        }

        Ok(policy)
    }
}

/// Notification configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WebhookSettings {
    #[serde(default)]
    pub success: WebhookEvent,

    #[serde(default)]
    pub failure: WebhookEvent,

    /// HTTP client used for notifications
    #[serde(default)]
    pub client: ClientConfig,
}

/// Request fired for one outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookEvent {
    /// Endpoint; no URL disables the notification
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_webhook_method")]
    pub method: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for WebhookEvent {
    fn default() -> Self {
        Self {
            url: None,
            method: default_webhook_method(),
            body: String::new(),
            headers: BTreeMap::new(),
        }
    }
}

impl WebhookEvent {
    fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let Some(url) = &self.url else {
            return Ok(());
        };

        url::Url::parse(url).map_err(|e| {
            ConfigError::InvalidValue(format!("{} webhook url '{}': {}", label, url, e))
        })?;
        reqwest::Method::from_bytes(self.method.as_bytes()).map_err(|_| {
            ConfigError::InvalidValue(format!("{} webhook method '{}'", label, self.method))
        })?;

        Ok(())
    }
}

fn default_webhook_method() -> String {
    "POST".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`text`, `pretty` or `json`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Settings that contradict each other
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Typed access to environment-style variables
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(value) => parse_bool(key, &value),
            None => Ok(default),
        }
    }

    fn u64_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{}: '{}'", key, value))),
            None => Ok(default),
        }
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| split_list(&value))
    }

    /// `<KEY>_FILE` takes precedence over `<KEY>`
    fn value_or_file(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let file_key = format!("{}_FILE", key);
        if let Some(path) = self.get(&file_key) {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                ConfigError::FileRead(format!("{} '{}': {}", file_key, path, e))
            })?;
            return Ok(Some(content.trim().to_string()));
        }
        Ok(self.get(key))
    }

    fn primary(&self) -> Result<TargetConfig, ConfigError> {
        let value = self.value_or_file("PRIMARY")?.ok_or_else(|| {
            ConfigError::MissingRequired("PRIMARY/PRIMARY_FILE".to_string())
        })?;
        TargetConfig::parse(&value)
    }

    fn replicas(&self) -> Result<Vec<TargetConfig>, ConfigError> {
        let value = self.value_or_file("REPLICAS")?.ok_or_else(|| {
            ConfigError::MissingRequired("REPLICAS/REPLICAS_FILE".to_string())
        })?;
        split_list(&value)
            .iter()
            .map(|replica| TargetConfig::parse(replica))
            .collect()
    }

    fn gravity(&self) -> Result<RebuildSelection, ConfigError> {
        Ok(RebuildSelection {
            dhcp_leases: self.bool_or("SYNC_GRAVITY_DHCP_LEASES", false)?,
            group: self.bool_or("SYNC_GRAVITY_GROUP", false)?,
            adlist: self.bool_or("SYNC_GRAVITY_AD_LIST", false)?,
            adlist_by_group: self.bool_or("SYNC_GRAVITY_AD_LIST_BY_GROUP", false)?,
            domainlist: self.bool_or("SYNC_GRAVITY_DOMAIN_LIST", false)?,
            domainlist_by_group: self.bool_or("SYNC_GRAVITY_DOMAIN_LIST_BY_GROUP", false)?,
            client: self.bool_or("SYNC_GRAVITY_CLIENT", false)?,
            client_by_group: self.bool_or("SYNC_GRAVITY_CLIENT_BY_GROUP", false)?,
        })
    }

    fn config_settings(&self) -> Result<ConfigSettings, ConfigError> {
        let mut settings = ConfigSettings::default();

        for section in Section::SYNCABLE {
            let key = format!("SYNC_CONFIG_{}", section.env_name());
            let setting = SectionSetting {
                enabled: self.bool_or(&key, false)?,
                include: self.list(&format!("{}_INCLUDE", key)),
                exclude: self.list(&format!("{}_EXCLUDE", key)),
            };
            if let Some(slot) = settings.get_mut(section) {
                *slot = setting;
            }
        }

        Ok(settings)
    }

    fn webhook_event(&self, prefix: &str) -> Result<WebhookEvent, ConfigError> {
        let headers_key = format!("{}_HEADERS", prefix);
        let headers = match self.get(&headers_key) {
            Some(value) => parse_headers(&headers_key, &value)?,
            None => BTreeMap::new(),
        };

        Ok(WebhookEvent {
            url: self.get(&format!("{}_URL", prefix)),
            method: self
                .get(&format!("{}_METHOD", prefix))
                .map(|m| m.trim().to_uppercase())
                .unwrap_or_else(default_webhook_method),
            body: self.get(&format!("{}_BODY", prefix)).unwrap_or_default(),
            headers,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(format!(
            "{}: expected a boolean, got '{}'",
            key, value
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `"k1:v1,k2:v2"`
fn parse_headers(key: &str, value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    split_list(value)
        .iter()
        .map(|pair| {
            pair.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
                .filter(|(name, _)| !name.is_empty())
                .ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        "{}: header '{}' must be formatted as 'name:value'",
                        key, pair
                    ))
                })
        })
        .collect()
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

#[cfg(test)]
pub(crate) fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: std::collections::HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}
