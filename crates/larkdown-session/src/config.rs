//! Extractor configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! allowed_hosts = ["feishu.cn", "larksuite.com"]
//!
//! [readiness]
//! poll_interval_ms = 500
//! stable_samples = 3
//! timeout_secs = 180
//! # login_grace_secs = 30
//!
//! [images]
//! concurrency = 4
//! ```

use std::time::Duration;

use larkdown::{LarkdownOptions, SnapshotLimits};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration of an [`Extractor`](crate::Extractor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub snapshot: SnapshotConfig,

    #[serde(default)]
    pub images: ImagesConfig,

    #[serde(default)]
    pub markdown: MarkdownConfig,

    /// Hosts (and their subdomains) documents may be opened from
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Cookies whose domain contains this are returned after a capture
    #[serde(default = "default_cookie_domain")]
    pub cookie_domain: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            readiness: ReadinessConfig::default(),
            snapshot: SnapshotConfig::default(),
            images: ImagesConfig::default(),
            markdown: MarkdownConfig::default(),
            allowed_hosts: default_allowed_hosts(),
            cookie_domain: default_cookie_domain(),
        }
    }
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["feishu.cn".to_string(), "larksuite.com".to_string()]
}

fn default_cookie_domain() -> String {
    "feishu".to_string()
}

impl ExtractorConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExtractorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.readiness.poll_interval_ms == 0 {
            return Err(invalid("readiness.poll_interval_ms", "must be positive"));
        }
        if self.readiness.stable_samples == 0 {
            return Err(invalid("readiness.stable_samples", "must be at least 1"));
        }
        if self.readiness.timeout_secs == 0 {
            return Err(invalid("readiness.timeout_secs", "must be positive"));
        }
        if self.snapshot.max_depth == 0 {
            return Err(invalid("snapshot.max_depth", "must be positive"));
        }
        if self.images.concurrency == 0 {
            return Err(invalid("images.concurrency", "must be at least 1"));
        }
        if self.allowed_hosts.iter().any(|host| host.trim().is_empty()) {
            return Err(invalid("allowed_hosts", "hosts must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// How long and how often to poll the page before capturing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive samples without growth needed before capture
    #[serde(default = "default_stable_samples")]
    pub stable_samples: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Scroll passes over virtualized containers per session
    #[serde(default = "default_max_scroll_passes")]
    pub max_scroll_passes: u32,

    /// Close dialogs covering the document while content loads
    #[serde(default = "default_true")]
    pub dismiss_popups: bool,

    /// Give up on a login wall after this long instead of waiting out the
    /// whole timeout for someone to sign in. Unset waits the full timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_grace_secs: Option<u64>,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stable_samples: default_stable_samples(),
            timeout_secs: default_timeout_secs(),
            max_scroll_passes: default_max_scroll_passes(),
            dismiss_popups: true,
            login_grace_secs: None,
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn login_grace(&self) -> Option<Duration> {
        self.login_grace_secs.map(Duration::from_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_stable_samples() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_max_scroll_passes() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

/// Bounds applied when validating a capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_synced_depth")]
    pub synced_depth: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            synced_depth: default_synced_depth(),
            max_depth: default_max_depth(),
        }
    }
}

impl SnapshotConfig {
    pub fn limits(&self) -> SnapshotLimits {
        SnapshotLimits {
            synced_depth: self.synced_depth,
            max_depth: self.max_depth,
        }
    }
}

fn default_synced_depth() -> usize {
    SnapshotLimits::default().synced_depth
}

fn default_max_depth() -> usize {
    SnapshotLimits::default().max_depth
}

/// Image link resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Images resolved at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

/// Markdown output switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownConfig {
    /// Open the output with `# title` unless it already starts with a heading
    #[serde(default = "default_true")]
    pub title_heading: bool,

    /// Emit HTML color markup for colored text
    #[serde(default = "default_true")]
    pub color_markup: bool,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            title_heading: true,
            color_markup: true,
        }
    }
}

impl MarkdownConfig {
    pub fn options(&self) -> LarkdownOptions {
        LarkdownOptions {
            title_heading: self.title_heading,
            color_markup: self.color_markup,
            ..LarkdownOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_is_default() {
        let config = ExtractorConfig::from_toml_str("").unwrap();
        assert_eq!(config, ExtractorConfig::default());
        assert_eq!(config.readiness.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.readiness.timeout(), Duration::from_secs(180));
        assert_eq!(config.readiness.stable_samples, 3);
        assert_eq!(config.readiness.login_grace(), None);
        assert_eq!(config.images.concurrency, 4);
        assert_eq!(config.allowed_hosts, vec!["feishu.cn", "larksuite.com"]);
    }

    #[test]
    fn test_partial_sections() {
        let config = ExtractorConfig::from_toml_str(
            r#"
            cookie_domain = "larksuite"

            [readiness]
            timeout_secs = 30
            login_grace_secs = 20

            [markdown]
            color_markup = false
            "#,
        )
        .unwrap();
        assert_eq!(config.readiness.timeout_secs, 30);
        assert_eq!(config.readiness.poll_interval_ms, 500);
        assert_eq!(config.readiness.login_grace(), Some(Duration::from_secs(20)));
        assert_eq!(config.cookie_domain, "larksuite");
        assert!(!config.markdown.options().color_markup);
        assert!(config.markdown.options().title_heading);
    }

    #[test]
    fn test_rejects_zero_samples() {
        let err = ExtractorConfig::from_toml_str("[readiness]\nstable_samples = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref field, .. } if field == "readiness.stable_samples"
        ));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = ExtractorConfig::from_toml_str("[readiness\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_snapshot_limits() {
        let config = ExtractorConfig::from_toml_str("[snapshot]\nsynced_depth = 2").unwrap();
        assert_eq!(config.snapshot.limits().synced_depth, 2);
        assert_eq!(config.snapshot.limits().max_depth, 64);
    }
}
