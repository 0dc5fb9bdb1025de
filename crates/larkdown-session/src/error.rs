//! Session error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::readiness::ReadinessState;

/// Failures of the remote channel to the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The browser or page cannot be reached.
    #[error("Channel unreachable: {0}")]
    Unreachable(String),

    /// The remote side rejected a command.
    #[error("Protocol error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    /// A script threw inside the page. The channel itself is still usable.
    #[error("Script error: {0}")]
    Script(String),
}

impl TransportError {
    /// Whether the channel can no longer be used
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Script(_))
    }
}

/// Where the readiness wait stood when it gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDiagnostic {
    pub url: String,
    /// Last state before the session failed
    pub state: ReadinessState,
    pub elapsed: Duration,
    pub stable_samples: u32,
    /// Last content size observed, if the model was ever reachable
    pub content_size: Option<u64>,
    pub scroll_passes: u32,
    /// Page address reported by the last probe
    pub href: Option<String>,
    pub error_code: Option<String>,
}

impl fmt::Display for SessionDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} after {:.1}s, {} stable samples, {} scroll passes",
            self.state,
            self.elapsed.as_secs_f64(),
            self.stable_samples,
            self.scroll_passes
        )?;
        if let Some(size) = self.content_size {
            write!(f, ", content size {}", size)?;
        }
        if let Some(href) = &self.href {
            write!(f, ", at {}", href)?;
        }
        Ok(())
    }
}

/// Errors of one extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The address is not a supported document.
    #[error("Cannot open {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// The page stayed on a login wall.
    #[error("Login required for {url} ({diagnostic})")]
    LoginRequired {
        url: String,
        diagnostic: SessionDiagnostic,
    },

    /// The page stayed on an error page.
    #[error("Error page {code} for {url} ({diagnostic})")]
    ErrorPage {
        url: String,
        code: String,
        diagnostic: SessionDiagnostic,
    },

    /// The document model could not be captured.
    #[error("Document content unavailable: {0}")]
    Content(String),

    /// The page never reached the document.
    #[error("Session failed: {0}")]
    Failed(SessionDiagnostic),
}

impl ExtractError {
    /// Whether a batch should stop and wait for the browser to come back
    pub fn is_transport(&self) -> bool {
        matches!(self, ExtractError::Transport(e) if e.is_fatal())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_errors_are_not_fatal() {
        assert!(!TransportError::Script("boom".to_string()).is_fatal());
        assert!(TransportError::Unreachable("closed".to_string()).is_fatal());
        assert!(TransportError::Protocol {
            code: -32000,
            message: "no target".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = SessionDiagnostic {
            url: "https://acme.feishu.cn/docx/abc".to_string(),
            state: ReadinessState::ContentLoading,
            elapsed: Duration::from_millis(1500),
            stable_samples: 2,
            content_size: Some(40),
            scroll_passes: 1,
            href: None,
            error_code: None,
        };
        assert_eq!(
            diagnostic.to_string(),
            "content_loading after 1.5s, 2 stable samples, 1 scroll passes, content size 40"
        );
    }

    #[test]
    fn test_batch_stops_only_on_fatal_transport() {
        let err = ExtractError::from(TransportError::Unreachable("gone".to_string()));
        assert!(err.is_transport());
        let err = ExtractError::from(TransportError::Script("x".to_string()));
        assert!(!err.is_transport());
        let err = ExtractError::Content("empty".to_string());
        assert!(!err.is_transport());
    }
}
