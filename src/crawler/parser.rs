//! Link and text extraction
//!
//! Links are found with a lightweight anchor-tag pattern scan rather than a
//! full HTML parse. It misses links injected by scripts or hidden inside
//! badly malformed markup, which is accepted. Text for embeddings is taken
//! from a real parse with `scraper`.

use crate::url::normalize_parsed;
use regex::Regex;
use scraper::{Html, Node};
use std::sync::OnceLock;
use url::Url;

fn anchor_href_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<a(?:\s[^>]*?)?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("anchor pattern is valid")
    })
}

/// Extracts absolute `http`/`https` links from anchor tags
///
/// # Link Rules
///
/// - Only `<a ... href=...>` values are considered (quoted or bare)
/// - `javascript:` hrefs and pure-fragment hrefs (`#...`) are ignored
/// - Relative hrefs are resolved against `base_url`
/// - Results are normalized (fragment stripped, empty path becomes `/`)
/// - Order of first appearance is kept; duplicates are removed
///
/// # Example
///
/// ```
/// use sumi_harvest::crawler::extract_links;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/").unwrap();
/// let links = extract_links(r#"<a href="intro">Intro</a>"#, &base);
/// assert_eq!(links[0].as_str(), "https://example.com/docs/intro");
/// ```
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let mut links: Vec<Url> = Vec::new();

    for captures in anchor_href_pattern().captures_iter(html) {
        let href = captures
            .get(1)
            .or_else(|| captures.get(2))
            .or_else(|| captures.get(3))
            .map(|m| m.as_str().trim())
            .unwrap_or("");

        if let Some(url) = resolve_href(href, base_url) {
            if !links.contains(&url) {
                links.push(url);
            }
        }
    }

    links
}

fn resolve_href(href: &str, base_url: &Url) -> Option<Url> {
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let is_script = href
        .get(..11)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("javascript:"));
    if is_script {
        return None;
    }

    let joined = base_url.join(href).ok()?;
    normalize_parsed(joined).ok()
}

/// Returns the visible text of an HTML document
///
/// Text inside `script`, `style`, `noscript` and `template` is dropped.
/// Whitespace runs are collapsed to single spaces.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut pieces: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor.value().as_element().is_some_and(|element| {
                matches!(element.name(), "script" | "style" | "noscript" | "template")
            })
        });

        if !hidden {
            pieces.push(&**text);
        }
    }

    pieces
        .iter()
        .flat_map(|piece| piece.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derives the text submitted for embedding from a fetched body
///
/// HTML is reduced to its visible text; other `text/*` bodies are used as-is.
/// Returns `None` for non-text content types or empty text.
pub fn text_for_embedding(content_type: Option<&str>, body: &[u8]) -> Option<String> {
    let content_type = content_type?.to_ascii_lowercase();
    if !content_type.contains("text") {
        return None;
    }

    let raw = String::from_utf8_lossy(body);
    let text = if content_type.contains("text/html") {
        extract_text(&raw)
    } else {
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// True when a content type should be scanned for links
pub fn is_html(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
}
