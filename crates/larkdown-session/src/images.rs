//! Image reference resolution.
//!
//! The renderer leaves `__IMAGE_TOKEN__<token>` placeholders in the Markdown.
//! Here each token is turned into a download address by asking the page, a
//! local file name is assigned, and the placeholders are rewritten. Fetching
//! and writing the bytes is up to the caller.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use larkdown::ImageReference;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::RemoteChannel;
use crate::error::TransportError;
use crate::scripts;

/// Resolve image addresses, at most `concurrency` at a time.
///
/// Images keep their order. Each distinct token is asked for once and gets
/// `<folder>/img_N.ext`, numbered in order of first appearance among the
/// resolved ones; repeats of a token share its address and path. Images
/// the page cannot resolve keep `url` and `local_path` empty.
pub async fn resolve_images<C: RemoteChannel + ?Sized>(
    channel: &C,
    images: Vec<ImageReference>,
    folder: &str,
    concurrency: usize,
) -> Result<Vec<ImageReference>, TransportError> {
    if images.is_empty() {
        return Ok(images);
    }

    let tokens: Vec<String> = {
        let mut seen = HashSet::new();
        images
            .iter()
            .filter(|image| seen.insert(image.token.as_str()))
            .map(|image| image.token.clone())
            .collect()
    };

    let urls = stream::iter(&tokens)
        .map(|token| resolve_url(channel, token))
        .buffered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, TransportError>>()?;

    let mut resolved: HashMap<&str, (String, String)> = HashMap::new();
    for (token, url) in tokens.iter().zip(urls) {
        if let Some(url) = url {
            let path = format!("{}/img_{}{}", folder, resolved.len(), extension_of(&url));
            resolved.insert(token.as_str(), (url, path));
        }
    }
    info!(
        "Resolved {}/{} images ({} references)",
        resolved.len(),
        tokens.len(),
        images.len()
    );

    Ok(images
        .into_iter()
        .map(|mut image| {
            if let Some((url, path)) = resolved.get(image.token.as_str()) {
                image.url = Some(url.clone());
                image.local_path = Some(path.clone());
            }
            image
        })
        .collect())
}

async fn resolve_url<C: RemoteChannel + ?Sized>(
    channel: &C,
    token: &str,
) -> Result<Option<String>, TransportError> {
    match channel.evaluate(&scripts::image_url(token)).await {
        Ok(Value::String(url)) if !url.is_empty() => {
            debug!("Image {} -> {}", token, url);
            Ok(Some(url))
        }
        Ok(_) => {
            warn!("Image {} could not be resolved", token);
            Ok(None)
        }
        Err(TransportError::Script(message)) => {
            warn!("Image {} failed to resolve: {}", token, message);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// File extension for an image address, `.png` unless the path says otherwise
pub fn extension_of(url: &str) -> &'static str {
    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    if path.contains(".jpg") || path.contains(".jpeg") {
        ".jpg"
    } else if path.contains(".gif") {
        ".gif"
    } else if path.contains(".webp") {
        ".webp"
    } else {
        ".png"
    }
}

/// Replace the placeholders of resolved images with their local paths
pub fn rewrite_image_links(markdown: &str, images: &[ImageReference]) -> String {
    let mut output = markdown.to_string();
    for image in images {
        if let Some(path) = &image.local_path {
            let placeholder = format!("({})", image.placeholder());
            output = output.replace(&placeholder, &format!("({})", path));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testing::ScriptedChannel;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn image(token: &str) -> ImageReference {
        ImageReference::new(token, format!("{}.png", token), format!("blk_{}", token))
    }

    #[tokio::test]
    async fn test_resolves_in_order_and_numbers_resolved_only() {
        let channel = ScriptedChannel::new()
            .with_image("boxA", "https://cdn.feishu.cn/a/photo.JPG?x=1")
            .with_image("boxC", "https://cdn.feishu.cn/c/anim.gif");
        let images = vec![image("boxA"), image("boxB"), image("boxC")];

        let resolved = resolve_images(&channel, images, "Weekly_imgs", 2)
            .await
            .unwrap();

        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].local_path.as_deref(), Some("Weekly_imgs/img_0.jpg"));
        assert_eq!(resolved[1].url, None);
        assert_eq!(resolved[1].local_path, None);
        assert_eq!(resolved[2].local_path.as_deref(), Some("Weekly_imgs/img_1.gif"));
        assert_eq!(
            resolved[2].url.as_deref(),
            Some("https://cdn.feishu.cn/c/anim.gif")
        );
    }

    #[tokio::test]
    async fn test_repeated_token_resolves_once() {
        let channel = ScriptedChannel::new()
            .with_image("boxA", "https://cdn.feishu.cn/a/one.png")
            .with_image("boxB", "https://cdn.feishu.cn/b/two.webp");
        let images = vec![image("boxA"), image("boxB"), image("boxA")];

        let resolved = resolve_images(&channel, images, "d", 4).await.unwrap();

        assert_eq!(channel.count("image:boxA"), 1);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].local_path.as_deref(), Some("d/img_0.png"));
        assert_eq!(resolved[1].local_path.as_deref(), Some("d/img_1.webp"));
        assert_eq!(resolved[2].local_path, resolved[0].local_path);
        assert_eq!(resolved[2].url, resolved[0].url);

        let markdown = "![a](__IMAGE_TOKEN__boxA)\n![b](__IMAGE_TOKEN__boxB)\n![a](__IMAGE_TOKEN__boxA)\n";
        assert_eq!(
            rewrite_image_links(markdown, &resolved),
            "![a](d/img_0.png)\n![b](d/img_1.webp)\n![a](d/img_0.png)\n"
        );
    }

    #[tokio::test]
    async fn test_no_images_no_calls() {
        let channel = ScriptedChannel::new();
        let resolved = resolve_images(&channel, Vec::new(), "x", 4).await.unwrap();
        assert!(resolved.is_empty());
        assert!(channel.calls().is_empty());
    }

    #[rstest]
    #[case("https://cdn/x/a.jpeg", ".jpg")]
    #[case("https://cdn/x/a.webp?size=2", ".webp")]
    #[case("https://cdn/x/stream?token=1", ".png")]
    #[case("not a url.gif", ".gif")]
    fn test_extension(#[case] url: &str, #[case] ext: &str) {
        assert_eq!(extension_of(url), ext);
    }

    #[test]
    fn test_rewrite_links() {
        let mut resolved = image("boxA");
        resolved.local_path = Some("Doc_imgs/img_0.png".to_string());
        let unresolved = image("boxB");

        let markdown = "![a](__IMAGE_TOKEN__boxA)\n\n![b](__IMAGE_TOKEN__boxB)\n\n![a](__IMAGE_TOKEN__boxA)\n";
        assert_eq!(
            rewrite_image_links(markdown, &[resolved, unresolved]),
            "![a](Doc_imgs/img_0.png)\n\n![b](__IMAGE_TOKEN__boxB)\n\n![a](Doc_imgs/img_0.png)\n"
        );
    }

    #[test]
    fn test_rewrite_does_not_touch_longer_tokens() {
        let mut short = image("box");
        short.local_path = Some("d/img_0.png".to_string());
        let markdown = "![x](__IMAGE_TOKEN__box)\n![y](__IMAGE_TOKEN__box2)\n";
        assert_eq!(
            rewrite_image_links(markdown, &[short]),
            "![x](d/img_0.png)\n![y](__IMAGE_TOKEN__box2)\n"
        );
    }
}
