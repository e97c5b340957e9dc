//! Reply classification.
//!
//! Decides from a single reply string whether the assistant answered with a
//! product image or plain prose. Only the first link in a reply is
//! considered: a Markdown link wins over a bare URL, and a reply with
//! several images is classified by its first one.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;

use cartwise_core::types::ContentType;

/// Text shown when the backend sent nothing usable.
pub const NO_REPLY_TEXT: &str = "No reply";

/// Path extensions recognised as images.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

static MARKDOWN_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]*)\]\((https?://[^\s)]+)\)").expect("valid markdown link regex")
});

static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("valid url regex"));

/// Structured display intent for one reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub content_type: ContentType,
    pub text: String,
    pub image_url: Option<String>,
}

impl Classification {
    fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: ContentType::Text,
            text: text.into(),
            image_url: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.content_type == ContentType::Image
    }
}

/// Classify a raw backend reply.
///
/// Absent, empty or whitespace-only input yields the `No reply` text.
pub fn classify(raw: Option<&str>) -> Classification {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Classification::text(NO_REPLY_TEXT),
    };

    let Some((span, url)) = first_link(raw) else {
        return Classification::text(raw);
    };

    if !is_image_url(url) {
        return Classification::text(raw);
    }

    let mut text = String::with_capacity(raw.len());
    text.push_str(&raw[..span.start]);
    text.push_str(&raw[span.end..]);

    Classification {
        content_type: ContentType::Image,
        text: text.trim().to_string(),
        image_url: Some(url.to_string()),
    }
}

/// Byte span of the first link candidate and the URL it points to.
fn first_link(raw: &str) -> Option<(Range<usize>, &str)> {
    if let Some(caps) = MARKDOWN_LINK_RE.captures(raw) {
        let whole = caps.get(0)?;
        let url = caps.get(2)?;
        return Some((whole.range(), url.as_str()));
    }
    BARE_URL_RE
        .find(raw)
        .map(|m| (m.range(), m.as_str()))
}

/// Whether the URL's path ends in a known image extension.
///
/// Query strings and fragments are ignored. Falls back to a plain string
/// check when the URL does not parse.
fn is_image_url(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or(url).to_string(),
    };
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    if ext.contains('/') {
        return false;
    }
    IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs_fall_back() {
        for raw in [None, Some(""), Some("   \n\t")] {
            let c = classify(raw);
            assert_eq!(c.content_type, ContentType::Text);
            assert_eq!(c.text, NO_REPLY_TEXT);
            assert!(c.image_url.is_none());
        }
    }

    #[test]
    fn test_markdown_image_link() {
        let c = classify(Some("Here you go: [Red Shoes](https://cdn.example.com/shoes.png) enjoy"));
        assert_eq!(c.content_type, ContentType::Image);
        assert_eq!(c.image_url.as_deref(), Some("https://cdn.example.com/shoes.png"));
        assert_eq!(c.text, "Here you go:  enjoy");
    }

    #[test]
    fn test_image_only_reply_has_empty_text() {
        let c = classify(Some("[Red Shoes](https://cdn.example.com/shoes.png)"));
        assert!(c.is_image());
        assert_eq!(c.text, "");
    }

    #[test]
    fn test_bare_image_url() {
        let c = classify(Some("Look http://shop.test/img/bag.JPEG"));
        assert!(c.is_image());
        assert_eq!(c.image_url.as_deref(), Some("http://shop.test/img/bag.JPEG"));
        assert_eq!(c.text, "Look");
    }

    #[test]
    fn test_non_image_url_is_verbatim_text() {
        let raw = "The manual is at https://docs.example.com/manual.pdf ok";
        let c = classify(Some(raw));
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.text, raw);
        assert!(c.image_url.is_none());
    }

    #[test]
    fn test_non_image_markdown_link_is_verbatim_text() {
        let raw = "  See [the shop](https://shop.example.com/catalog)  ";
        let c = classify(Some(raw));
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.text, raw);
    }

    #[test]
    fn test_markdown_link_wins_over_earlier_bare_url() {
        let raw = "https://a.example.com/one.png and [two](https://b.example.com/two.gif)";
        let c = classify(Some(raw));
        assert_eq!(c.image_url.as_deref(), Some("https://b.example.com/two.gif"));
        assert_eq!(c.text, "https://a.example.com/one.png and");
    }

    #[test]
    fn test_only_first_url_considered() {
        let raw = "https://x.example.com/doc.pdf then https://x.example.com/pic.png";
        let c = classify(Some(raw));
        assert_eq!(c.content_type, ContentType::Text);
        assert_eq!(c.text, raw);
    }

    #[test]
    fn test_query_string_ignored_for_extension() {
        let c = classify(Some("https://cdn.example.com/p.webp?w=200#top"));
        assert!(c.is_image());
        assert_eq!(c.image_url.as_deref(), Some("https://cdn.example.com/p.webp?w=200#top"));
    }

    #[test]
    fn test_extension_must_end_path() {
        assert!(!is_image_url("https://cdn.example.com/png"));
        assert!(!is_image_url("https://cdn.example.com/shoes.png/details"));
        assert!(!is_image_url("https://cdn.example.png/"));
        assert!(is_image_url("https://cdn.example.com/a/b.GIF"));
    }

    #[test]
    fn test_deterministic() {
        let raw = Some("[x](https://h.example.com/a.jpg)");
        assert_eq!(classify(raw), classify(raw));
    }

    #[test]
    fn test_plain_text_untouched() {
        let c = classify(Some("  We have 3 colours available. "));
        assert_eq!(c.text, "  We have 3 colours available. ");
    }
}
