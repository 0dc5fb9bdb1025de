//! Document addresses.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::error::ExtractError;

static DOCUMENT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(docx|wiki|doc)/([A-Za-z0-9]+)/?$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Docx,
    Wiki,
    Doc,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentKind::Docx => "docx",
            DocumentKind::Wiki => "wiki",
            DocumentKind::Doc => "doc",
        })
    }
}

/// A validated document address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentTarget {
    url: Url,
    pub kind: DocumentKind,
    pub token: String,
}

impl DocumentTarget {
    /// Accept `http(s)://<host>/(docx|wiki|doc)/<token>` on an allowed host
    /// or one of its subdomains. Query and fragment are kept.
    pub fn parse(raw: &str, allowed_hosts: &[String]) -> Result<Self, ExtractError> {
        let reject = |reason: &str| ExtractError::Navigation {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw.trim()).map_err(|e| reject(&e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(reject("not an http(s) address"));
        }

        let host = url.host_str().ok_or_else(|| reject("no host"))?;
        let allowed = allowed_hosts.iter().any(|allowed| {
            let allowed = allowed.trim_start_matches('.');
            host == allowed || host.ends_with(&format!(".{}", allowed))
        });
        if !allowed {
            return Err(reject("host is not a document host"));
        }

        let captures = DOCUMENT_PATH
            .captures(url.path())
            .ok_or_else(|| reject("path is not a document"))?;
        let kind = match &captures[1] {
            "docx" => DocumentKind::Docx,
            "wiki" => DocumentKind::Wiki,
            _ => DocumentKind::Doc,
        };
        let token = captures[2].to_string();

        Ok(Self { url, kind, token })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

impl fmt::Display for DocumentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn hosts() -> Vec<String> {
        vec!["feishu.cn".to_string(), "larksuite.com".to_string()]
    }

    #[rstest]
    #[case("https://acme.feishu.cn/docx/AbC123", DocumentKind::Docx, "AbC123")]
    #[case("https://acme.feishu.cn/wiki/Wk9?from=share", DocumentKind::Wiki, "Wk9")]
    #[case("http://feishu.cn/doc/d1/", DocumentKind::Doc, "d1")]
    #[case("https://x.larksuite.com/docx/Z", DocumentKind::Docx, "Z")]
    fn test_accepts(#[case] raw: &str, #[case] kind: DocumentKind, #[case] token: &str) {
        let target = DocumentTarget::parse(raw, &hosts()).unwrap();
        assert_eq!(target.kind, kind);
        assert_eq!(target.token, token);
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://acme.feishu.cn/docx/AbC")]
    #[case("https://evilfeishu.cn/docx/AbC")]
    #[case("https://example.com/docx/AbC")]
    #[case("https://acme.feishu.cn/sheets/AbC")]
    #[case("https://acme.feishu.cn/docx/")]
    #[case("https://acme.feishu.cn/docx/AbC/extra")]
    fn test_rejects(#[case] raw: &str) {
        let err = DocumentTarget::parse(raw, &hosts()).unwrap_err();
        assert!(matches!(err, ExtractError::Navigation { ref url, .. } if url == raw));
    }

    #[test]
    fn test_keeps_query() {
        let target =
            DocumentTarget::parse("https://acme.feishu.cn/wiki/Wk9?from=share", &hosts()).unwrap();
        assert_eq!(target.url(), "https://acme.feishu.cn/wiki/Wk9?from=share");
        assert_eq!(target.host(), "acme.feishu.cn");
        assert_eq!(target.kind.to_string(), "wiki");
    }
}
