//! # larkdown-session
//!
//! Drive a browser page to a stable Feishu/Lark document, capture its block
//! tree and render it with [`larkdown`].
//!
//! ## Design
//!
//! The browser is reached through a [`RemoteChannel`] the caller implements
//! on top of whatever DevTools client it uses:
//!
//! - **Pure readiness logic**: [`ReadinessMachine`] decides from page probes;
//!   [`ExtractionSession`] only sleeps, probes and scrolls
//! - **One capture**: the document model is copied as JSON in a single
//!   evaluation and validated on this side
//! - **One document at a time**: an [`Extractor`] never runs two sessions
//!   against its browser concurrently
//!
//! ## Example
//!
//! ```rust,no_run
//! use larkdown_session::{Extractor, ExtractorConfig, RemoteChannel};
//!
//! async fn run(channel: &dyn RemoteChannel) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ExtractorConfig::from_toml_str("[readiness]\ntimeout_secs = 60")?;
//!     let extractor = Extractor::new(config);
//!
//!     let document = extractor
//!         .extract(channel, "https://acme.feishu.cn/docx/AbC123")
//!         .await?;
//!     std::fs::write(format!("{}.md", document.file_stem()), &document.markdown)?;
//!     Ok(())
//! }
//! ```

mod capture;
mod channel;
pub mod config;
mod error;
mod extractor;
pub mod images;
pub mod readiness;
pub mod scripts;
mod session;
mod target;

pub use capture::capture_snapshot;
pub use channel::{Cookie, RemoteChannel};
pub use config::{ExtractorConfig, ImagesConfig, MarkdownConfig, ReadinessConfig, SnapshotConfig};
pub use error::{ConfigError, ExtractError, SessionDiagnostic, TransportError};
pub use extractor::{file_stem, Document, Extractor};
pub use images::{resolve_images, rewrite_image_links};
pub use readiness::{Probe, ReadinessMachine, ReadinessState, Step};
pub use session::{ExtractionSession, Readiness};
pub use target::{DocumentKind, DocumentTarget};

pub type Result<T> = std::result::Result<T, ExtractError>;
