//! Extractor - the main entry point for one document, from address to Markdown.

use larkdown::{ImageReference, LarkdownService, RenderWarning};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capture::capture_snapshot;
use crate::channel::{Cookie, RemoteChannel};
use crate::config::ExtractorConfig;
use crate::error::ExtractError;
use crate::images::{resolve_images, rewrite_image_links};
use crate::session::ExtractionSession;
use crate::target::DocumentTarget;

static UNSAFE_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\s]+"#).expect("valid regex"));

const MAX_STEM_CHARS: usize = 80;

/// One extracted document
#[derive(Debug, Clone)]
pub struct Document {
    pub target: DocumentTarget,
    pub title: String,
    /// Markdown with resolved image placeholders rewritten to local paths
    pub markdown: String,
    pub images: Vec<ImageReference>,
    pub warnings: Vec<RenderWarning>,
    /// Captured before the content settled
    pub partial: bool,
    /// Platform cookies after a stable capture, for the next session
    pub cookies: Vec<Cookie>,
}

impl Document {
    /// The title made safe for use as a file name
    pub fn file_stem(&self) -> String {
        file_stem(&self.title)
    }

    /// Folder the image local paths point into
    pub fn images_folder(&self) -> String {
        images_folder(&self.title)
    }
}

pub fn file_stem(title: &str) -> String {
    let replaced = UNSAFE_FILENAME.replace_all(title, "_");
    let stem: String = replaced.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

fn images_folder(title: &str) -> String {
    format!("{}_imgs", file_stem(title))
}

/// Extracts documents through one browser, one at a time.
pub struct Extractor {
    config: ExtractorConfig,
    service: LarkdownService,
    cookies: Vec<Cookie>,
    active: Mutex<()>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let service = LarkdownService::with_options(config.markdown.options())
            .with_limits(config.snapshot.limits());
        Self {
            config,
            service,
            cookies: Vec::new(),
            active: Mutex::new(()),
        }
    }

    /// Cookies seeded into the browser before each navigation
    pub fn with_cookies(mut self, cookies: Vec<Cookie>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract one document. Sessions on the same extractor never overlap.
    pub async fn extract<C: RemoteChannel + ?Sized>(
        &self,
        channel: &C,
        url: &str,
    ) -> Result<Document, ExtractError> {
        let target = DocumentTarget::parse(url, &self.config.allowed_hosts)?;
        let _active = self.active.lock().await;
        info!("Extracting {} {} from {}", target.kind, target.token, target.host());

        if !self.cookies.is_empty() {
            let seeded: Vec<Cookie> = self.cookies.iter().map(Cookie::for_seeding).collect();
            channel.set_cookies(&seeded).await?;
            debug!("Seeded {} cookies", seeded.len());
        }

        channel.navigate(target.url()).await?;

        let mut session = ExtractionSession::new(channel, target.url(), &self.config.readiness);
        let readiness = session.wait_until_ready().await?;
        let partial = readiness.is_partial();

        let snapshot = capture_snapshot(channel, self.config.snapshot.limits()).await?;
        let rendered = self.service.render(&snapshot);
        for warning in &rendered.warnings {
            debug!("Render warning: {}", warning);
        }

        let images = if self.config.images.enabled {
            resolve_images(
                channel,
                rendered.images,
                &images_folder(&rendered.title),
                self.config.images.concurrency,
            )
            .await?
        } else {
            rendered.images
        };
        let markdown = rewrite_image_links(&rendered.markdown, &images);

        let cookies = if partial {
            Vec::new()
        } else {
            let domain = &self.config.cookie_domain;
            channel
                .get_cookies()
                .await?
                .into_iter()
                .filter(|cookie| cookie.matches_domain(domain))
                .collect()
        };

        if partial {
            warn!("Extracted {:?} before its content settled", rendered.title);
        }
        info!(
            "Extracted {:?}: {} bytes, {} images, {} warnings",
            rendered.title,
            markdown.len(),
            images.len(),
            rendered.warnings.len()
        );

        Ok(Document {
            target,
            title: rendered.title,
            markdown,
            images,
            warnings: rendered.warnings,
            partial,
            cookies,
        })
    }

    /// Extract documents in order. A failed document does not stop the
    /// batch; a transport failure does, and it is the last result returned.
    pub async fn extract_all<C: RemoteChannel + ?Sized>(
        &self,
        channel: &C,
        urls: &[String],
    ) -> Vec<(String, Result<Document, ExtractError>)> {
        let mut results = Vec::with_capacity(urls.len());
        for url in urls {
            let result = self.extract(channel, url).await;
            let stop = matches!(&result, Err(e) if e.is_transport());
            if let Err(e) = &result {
                warn!("Extraction of {} failed: {}", url, e);
            }
            results.push((url.clone(), result));
            if stop {
                warn!("Browser unreachable, stopping after {} documents", results.len());
                break;
            }
        }
        results
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}
