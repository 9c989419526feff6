//! Image rewriting over a parsed fragment.
//!
//! Every `img` element is visited depth first. A placeholder `src` such as
//! `https://picsum.photos/320/240` donates its dimensions to `width` and
//! `height`, and a non-empty `alt` is sent to the synthesizer as the prompt.
//! Elements that paint a background image and carry an `aria-label` are
//! handled the same way.

use futures::future::join_all;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::tree::{Element, Fragment};
use crate::config::{ImageConfig, ImageFailurePolicy};
use crate::errors::{GenerationError, ImageSynthesisError};
use crate::images::ImageSynthesizer;

/// Default placeholder URL pattern: group 1 is the width, group 2 the height.
pub const DEFAULT_PLACEHOLDER_PATTERN: &str = r"picsum\.photos/(\d+)(?:/(\d+))?";

#[allow(clippy::unwrap_used)]
static STYLE_BACKGROUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"background-image\s*:\s*url\(\s*['"]?([^'")]*)['"]?\s*\)"#).unwrap()
});

/// Recognizes placeholder image URLs that encode their own dimensions.
#[derive(Debug, Clone)]
pub struct PlaceholderPattern {
    regex: Regex,
}

impl PlaceholderPattern {
    /// Compiles a pattern. Group 1 must capture the width; group 2, if it
    /// participates, the height.
    pub fn new(pattern: &str) -> Result<Self, GenerationError> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| GenerationError::Config(format!("invalid placeholder pattern: {e}")))
    }

    /// Returns `(width, height)` captured from `src`.
    #[must_use]
    pub fn dimensions<'a>(&self, src: &'a str) -> Option<(&'a str, Option<&'a str>)> {
        let captures = self.regex.captures(src)?;
        let width = captures.get(1)?.as_str();
        Some((width, captures.get(2).map(|m| m.as_str())))
    }
}

impl Default for PlaceholderPattern {
    #[allow(clippy::unwrap_used)]
    fn default() -> Self {
        Self {
            regex: Regex::new(DEFAULT_PLACEHOLDER_PATTERN).unwrap(),
        }
    }
}

/// Where an element's image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSlot {
    /// The `src` attribute of an `img`.
    Source,
    /// A `bg-[url(...)]` class token.
    BackgroundClass(String),
    /// A `background-image:url(...)` declaration in `style`.
    BackgroundStyle,
}

/// One image the rewriter could not synthesize.
#[derive(Debug, Clone)]
pub struct ImageFailure {
    /// Tag name of the element.
    pub element: String,
    /// The description that was sent.
    pub prompt: String,
    /// Why it failed.
    pub error: ImageSynthesisError,
}

/// Result of one rewrite.
#[derive(Debug, Clone, Default)]
pub struct RewriteOutcome {
    /// Serialized fragment after rewriting.
    pub html: String,
    /// Number of images replaced.
    pub synthesized: usize,
    /// Images left with their original source.
    pub failures: Vec<ImageFailure>,
}

#[derive(Debug)]
struct Target {
    path: Vec<usize>,
    element: String,
    prompt: String,
    current_src: Option<String>,
    slot: ImageSlot,
}

/// Rewrites image references in generated HTML.
#[derive(Debug, Clone)]
pub struct ImageRewriter {
    synthesizer: ImageSynthesizer,
    placeholder: PlaceholderPattern,
    policy: ImageFailurePolicy,
}

impl ImageRewriter {
    /// Creates a rewriter with the default placeholder pattern that keeps
    /// placeholders on failure.
    #[must_use]
    pub fn new(synthesizer: ImageSynthesizer) -> Self {
        Self {
            synthesizer,
            placeholder: PlaceholderPattern::default(),
            policy: ImageFailurePolicy::default(),
        }
    }

    /// Creates a rewriter with the pattern and policy from `config`.
    pub fn from_config(synthesizer: ImageSynthesizer, config: &ImageConfig) -> Result<Self, GenerationError> {
        Ok(Self::new(synthesizer)
            .with_placeholder(PlaceholderPattern::new(&config.placeholder_pattern)?)
            .with_policy(config.failure_policy))
    }

    /// Sets the placeholder pattern.
    #[must_use]
    pub fn with_placeholder(mut self, placeholder: PlaceholderPattern) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Sets the partial failure policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ImageFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the failure policy.
    #[must_use]
    pub fn policy(&self) -> ImageFailurePolicy {
        self.policy
    }

    /// Rewrites `html` and returns the serialized result.
    ///
    /// All synthesis calls run concurrently. Under
    /// [`ImageFailurePolicy::FailDocument`] every call still completes before
    /// the first error is returned.
    pub async fn rewrite(&self, html: &str) -> Result<RewriteOutcome, GenerationError> {
        let mut fragment = Fragment::parse(html);
        let targets = self.prepare(&mut fragment);

        if targets.is_empty() {
            return Ok(RewriteOutcome {
                html: fragment.to_html(),
                ..RewriteOutcome::default()
            });
        }

        info!(
            images = targets.len(),
            backend = self.synthesizer.backend_name(),
            "Synthesizing images"
        );

        let results = join_all(targets.iter().map(|target| {
            self.synthesizer
                .synthesize(&target.prompt, target.current_src.as_deref())
        }))
        .await;

        let mut outcome = RewriteOutcome::default();
        for (target, result) in targets.into_iter().zip(results) {
            match result {
                Ok(reference) => {
                    if let Some(element) = fragment.element_at_mut(&target.path) {
                        apply_reference(element, &target.slot, &reference);
                        outcome.synthesized += 1;
                    }
                }
                Err(error) => {
                    warn!(element = %target.element, error = %error, "Keeping original image source");
                    outcome.failures.push(ImageFailure {
                        element: target.element,
                        prompt: target.prompt,
                        error,
                    });
                }
            }
        }

        if self.policy == ImageFailurePolicy::FailDocument {
            if let Some(failure) = outcome.failures.first() {
                return Err(GenerationError::Image(failure.error.clone()));
            }
        }

        outcome.html = fragment.to_html();
        debug!(
            synthesized = outcome.synthesized,
            failed = outcome.failures.len(),
            "Image rewrite finished"
        );
        Ok(outcome)
    }

    /// Applies placeholder dimensions in place and collects synthesis targets.
    fn prepare(&self, fragment: &mut Fragment) -> Vec<Target> {
        let mut targets = Vec::new();
        fragment.walk_mut(|path, element| {
            if element.name() == "img" {
                self.apply_dimensions(element);
                if let Some(alt) = element.non_empty_attr("alt") {
                    targets.push(Target {
                        path: path.to_vec(),
                        element: element.name().to_string(),
                        prompt: alt.to_string(),
                        current_src: element.attr("src").map(str::to_string),
                        slot: ImageSlot::Source,
                    });
                }
                return;
            }

            let Some(label) = element.non_empty_attr("aria-label") else {
                return;
            };
            if let Some((slot, url)) = background_slot(element) {
                targets.push(Target {
                    path: path.to_vec(),
                    element: element.name().to_string(),
                    prompt: label.to_string(),
                    current_src: Some(url),
                    slot,
                });
            }
        });
        targets
    }

    fn apply_dimensions(&self, element: &mut Element) {
        let Some(src) = element.attr("src") else {
            return;
        };
        let Some((width, height)) = self.placeholder.dimensions(src) else {
            return;
        };
        let width = width.to_string();
        let height = height.map(str::to_string);

        element.set_attr("width", width);
        if let Some(height) = height {
            element.set_attr("height", height);
        }
    }
}

/// Finds a background image on an element: class token first, then style.
fn background_slot(element: &Element) -> Option<(ImageSlot, String)> {
    if let Some(class) = element.attr("class") {
        for token in class.split_whitespace() {
            if let Some(url) = class_token_url(token) {
                return Some((ImageSlot::BackgroundClass(token.to_string()), url));
            }
        }
    }
    let style = element.attr("style")?;
    let captures = STYLE_BACKGROUND.captures(style)?;
    Some((ImageSlot::BackgroundStyle, captures.get(1)?.as_str().to_string()))
}

fn class_token_url(token: &str) -> Option<String> {
    let inner = token.strip_prefix("bg-[url(")?.strip_suffix(")]")?;
    let url = inner.trim_matches(|c| c == '\'' || c == '"');
    Some(url.to_string())
}

fn apply_reference(element: &mut Element, slot: &ImageSlot, reference: &str) {
    match slot {
        ImageSlot::Source => element.set_attr("src", reference),
        ImageSlot::BackgroundStyle => {
            let style = element.attr("style").unwrap_or_default();
            let replaced = STYLE_BACKGROUND
                .replace(style, |_: &regex::Captures<'_>| format!("background-image:url('{reference}')"))
                .into_owned();
            element.set_attr("style", replaced);
        }
        ImageSlot::BackgroundClass(token) => {
            let remaining: Vec<&str> = element
                .attr("class")
                .unwrap_or_default()
                .split_whitespace()
                .filter(|t| *t != token.as_str())
                .collect();
            let remaining = remaining.join(" ");
            if remaining.is_empty() {
                element.remove_attr("class");
            } else {
                element.set_attr("class", remaining);
            }

            let declaration = format!("background-image:url('{reference}')");
            let style = match element.attr("style").map(str::trim) {
                None | Some("") => declaration,
                Some(existing) if existing.ends_with(';') => format!("{existing} {declaration}"),
                Some(existing) => format!("{existing}; {declaration}"),
            };
            element.set_attr("style", style);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{ImageBackend, MockImageBackend, PassthroughBackend};
    use crate::testing::{FailingImageBackend, StaticImageBackend};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn rewriter(backend: impl ImageBackend + 'static) -> ImageRewriter {
        ImageRewriter::new(ImageSynthesizer::new(Arc::new(backend)))
    }

    #[test]
    fn test_placeholder_dimensions() {
        let pattern = PlaceholderPattern::default();
        assert_eq!(
            pattern.dimensions("https://picsum.photos/320/240"),
            Some(("320", Some("240")))
        );
        assert_eq!(pattern.dimensions("https://picsum.photos/320"), Some(("320", None)));
        assert_eq!(pattern.dimensions("https://example.com/a.png"), None);
        assert!(PlaceholderPattern::new("(").is_err());
    }

    #[tokio::test]
    async fn test_width_and_height_from_placeholder() {
        let outcome = rewriter(PassthroughBackend)
            .rewrite(r#"<img src="https://picsum.photos/320/240" alt="">"#)
            .await
            .unwrap();
        assert_eq!(
            outcome.html,
            r#"<img src="https://picsum.photos/320/240" alt="" width="320" height="240">"#
        );
        assert_eq!(outcome.synthesized, 0);
    }

    #[tokio::test]
    async fn test_width_only_placeholder() {
        let outcome = rewriter(PassthroughBackend)
            .rewrite(r#"<img src="https://picsum.photos/320">"#)
            .await
            .unwrap();
        assert_eq!(outcome.html, r#"<img src="https://picsum.photos/320" width="320">"#);
    }

    #[tokio::test]
    async fn test_non_placeholder_src_untouched() {
        let html = r#"<img src="/static/logo.svg" alt="">"#;
        let outcome = rewriter(PassthroughBackend).rewrite(html).await.unwrap();
        assert_eq!(outcome.html, html);
    }

    #[tokio::test]
    async fn test_alt_drives_synthesis() {
        let outcome = rewriter(StaticImageBackend::new("data:image/png;base64,QUJD"))
            .rewrite(r#"<div><img src="https://picsum.photos/320/240" alt="A loaf of bread"></div>"#)
            .await
            .unwrap();

        assert_eq!(
            outcome.html,
            r#"<div><img src="data:image/png;base64,QUJD" alt="A loaf of bread" width="320" height="240"></div>"#
        );
        assert_eq!(outcome.synthesized, 1);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_empty_alt_is_not_synthesized() {
        let mut backend = MockImageBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_min_interval().return_const(None::<std::time::Duration>);
        backend.expect_generate().never();

        let outcome = rewriter(backend)
            .rewrite(r#"<img src="https://picsum.photos/100" alt="">"#)
            .await
            .unwrap();
        assert!(outcome.html.contains(r#"src="https://picsum.photos/100""#));
    }

    #[tokio::test]
    async fn test_whitespace_alt_is_still_a_prompt() {
        let backend = Arc::new(StaticImageBackend::new("data:image/png;base64,QUJD"));
        let outcome = ImageRewriter::new(ImageSynthesizer::new(backend.clone()))
            .rewrite(r#"<img src="https://picsum.photos/100" alt="  ">"#)
            .await
            .unwrap();

        assert_eq!(outcome.synthesized, 1);
        assert_eq!(backend.prompts(), vec!["  ".to_string()]);
    }

    #[tokio::test]
    async fn test_prompt_and_current_src_reach_backend() {
        let mut backend = MockImageBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_min_interval().return_const(None::<std::time::Duration>);
        backend
            .expect_generate()
            .withf(|req| {
                req.prompt == "Croissants"
                    && req.current_src.as_deref() == Some("https://picsum.photos/50/50")
            })
            .times(1)
            .returning(|_| Ok(crate::images::ImagePayload::Url("https://img/c".to_string())));

        let outcome = rewriter(backend)
            .rewrite(r#"<img alt="Croissants" src="https://picsum.photos/50/50">"#)
            .await
            .unwrap();
        assert!(outcome.html.contains(r#"src="https://img/c""#));
    }

    #[tokio::test]
    async fn test_keep_placeholder_on_failure() {
        let html = r#"<img src="https://picsum.photos/10/20" alt="Cake">"#;
        let outcome = rewriter(FailingImageBackend::with_status(500))
            .rewrite(html)
            .await
            .unwrap();

        assert_eq!(
            outcome.html,
            r#"<img src="https://picsum.photos/10/20" alt="Cake" width="10" height="20">"#
        );
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].prompt, "Cake");
    }

    #[tokio::test]
    async fn test_fail_document_policy() {
        let err = rewriter(FailingImageBackend::with_status(401))
            .with_policy(ImageFailurePolicy::FailDocument)
            .rewrite(r#"<img src="x" alt="a"><img src="y" alt="b">"#)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GenerationError::Image(ImageSynthesisError::Status { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_document_waits_for_every_call() {
        let mut backend = MockImageBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_min_interval().return_const(None::<std::time::Duration>);
        backend
            .expect_generate()
            .times(3)
            .returning(|req| {
                if req.prompt == "b" {
                    Err(ImageSynthesisError::status("mock", 500, "boom"))
                } else {
                    Ok(crate::images::ImagePayload::Url("u".to_string()))
                }
            });

        let result = rewriter(backend)
            .with_policy(ImageFailurePolicy::FailDocument)
            .rewrite(r#"<img alt="a"><img alt="b"><img alt="c">"#)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_background_class_is_replaced() {
        let outcome = rewriter(StaticImageBackend::new("https://img/hero"))
            .rewrite(
                r#"<section class="h-64 bg-[url('https://picsum.photos/1200/400')] bg-cover" aria-label="Bakery storefront"></section>"#,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.html,
            r#"<section class="h-64 bg-cover" aria-label="Bakery storefront" style="background-image:url('https://img/hero')"></section>"#
        );
    }

    #[tokio::test]
    async fn test_background_style_is_replaced() {
        let outcome = rewriter(StaticImageBackend::new("https://img/hero"))
            .rewrite(
                r#"<div style="color: red; background-image: url(https://picsum.photos/800)" aria-label="Ovens"></div>"#,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.html,
            r#"<div style="color: red; background-image:url('https://img/hero')" aria-label="Ovens"></div>"#
        );
    }

    #[tokio::test]
    async fn test_background_without_label_is_ignored() {
        let html = r#"<div class="bg-[url('/a.png')]"></div>"#;
        let outcome = rewriter(StaticImageBackend::new("https://img")).rewrite(html).await.unwrap();
        assert_eq!(outcome.html, html);
        assert_eq!(outcome.synthesized, 0);
    }

    #[tokio::test]
    async fn test_nested_targets() {
        let outcome = rewriter(StaticImageBackend::new("https://img"))
            .rewrite(
                r#"<div class="bg-[url(/bg.png)]" aria-label="Flour"><img src="/a.png" alt="Rye"></div>"#,
            )
            .await
            .unwrap();

        assert_eq!(
            outcome.html,
            r#"<div aria-label="Flour" style="background-image:url('https://img')"><img src="https://img" alt="Rye"></div>"#
        );
        assert_eq!(outcome.synthesized, 2);
    }

    #[tokio::test]
    async fn test_fragment_without_images_round_trips() {
        let html = r#"<header class="flex"><h1>Bakery</h1><nav><a href="/">Home</a></nav></header>"#;
        let outcome = rewriter(PassthroughBackend).rewrite(html).await.unwrap();
        assert_eq!(outcome.html, html);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = rewriter(PassthroughBackend).rewrite("").await.unwrap();
        assert_eq!(outcome.html, "");
    }
}
