//! The remote channel into a browser page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// A browser cookie, in the shape the DevTools protocol uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
    /// Seconds since the epoch; negative for session cookies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

fn default_path() -> String {
    "/".to_string()
}

impl Cookie {
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: default_path(),
            secure: false,
            http_only: false,
            same_site: None,
            expires: None,
        }
    }

    /// Whether the cookie's domain contains `needle`
    pub fn matches_domain(&self, needle: &str) -> bool {
        self.domain.contains(needle)
    }

    /// Copy suitable for seeding a fresh browser; session markers are dropped
    pub fn for_seeding(&self) -> Cookie {
        let mut cookie = self.clone();
        if cookie.expires.is_some_and(|expires| expires < 0.0) {
            cookie.expires = None;
        }
        cookie
    }
}

/// Everything the session needs from a browser page.
///
/// `evaluate` runs an expression in the page, awaits it when it is a promise
/// and returns the value by value. A script that throws reports
/// [`TransportError::Script`].
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    async fn evaluate(&self, script: &str) -> Result<Value, TransportError>;

    async fn navigate(&self, url: &str) -> Result<(), TransportError>;

    async fn get_cookies(&self) -> Result<Vec<Cookie>, TransportError>;

    async fn set_cookies(&self, cookies: &[Cookie]) -> Result<(), TransportError>;
}
