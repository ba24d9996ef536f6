//! Recovers image URLs straight from page markup with a fixed set of regex
//! rules.
//!
//! The structured payload sometimes omits photos or encodes them differently
//! (thumbnail variants, lazy-load attributes), so the raw text is scanned as
//! well. Rules run in priority order; each contributes its matches in text
//! order and the results are concatenated, not merged.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::normalize_candidate;

/// Path tokens that mark non-photo assets. A path is split on `/`, `-`, `_`
/// and `.` and each piece compared whole, so `iconic-view.jpg` is kept.
pub const DENYLIST: &[&str] = &[
    "logo",
    "logos",
    "favicon",
    "icon",
    "icons",
    "sprite",
    "sprites",
    "pixel",
    "tracking",
    "beacon",
    "analytics",
    "spacer",
    "blank",
    "1x1",
    "avatar",
    "avatars",
    "badge",
    "badges",
];

/// Ad and tracking hosts, matched as a suffix of the host.
pub const HOST_DENYLIST: &[&str] = &[
    "doubleclick.net",
    "googletagmanager.com",
    "google-analytics.com",
    "facebook.com",
];

static IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#).unwrap()
});

static LAZY_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\sdata-(?:src|lazy-src|lazy|original|original-src|full|hires)\s*=\s*["']([^"']+)["']"#,
    )
    .unwrap()
});

static SRCSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s(?:data-)?srcset\s*=\s*["']([^"']+)["']"#).unwrap());

static BACKGROUND_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:&quot;|['"])?([^'"()\s]+?)(?:&quot;|['"])?\s*\)"#).unwrap()
});

// Matches plain, `\/`-escaped and `/`-escaped forms as they appear in
// attributes and inline scripts.
static PHOTO_CDN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"https?:(?:\\?/|\\u002[Ff]){2}photos\.zillowstatic\.com(?:\\?/|\\u002[Ff])(?:[A-Za-z0-9_.\-]|\\?/|\\u002[Ff])+?\.(?:jpe?g|png|webp)"#,
    )
    .unwrap()
});

/// One text-pattern rule, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupRule {
    /// `<img src="...">`
    ImgSrc,
    /// `data-src`, `data-lazy-src`, `data-original` and friends
    LazyAttribute,
    /// Every candidate of a `srcset` / `data-srcset` list
    Srcset,
    /// `background-image: url(...)` in inline styles
    BackgroundStyle,
    /// Listing photo CDN paths anywhere in the text, inline scripts included
    PhotoCdn,
}

impl MarkupRule {
    pub const ORDERED: [MarkupRule; 5] = [
        MarkupRule::ImgSrc,
        MarkupRule::LazyAttribute,
        MarkupRule::Srcset,
        MarkupRule::BackgroundStyle,
        MarkupRule::PhotoCdn,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            MarkupRule::ImgSrc => &*IMG_SRC,
            MarkupRule::LazyAttribute => &*LAZY_ATTRIBUTE,
            MarkupRule::Srcset => &*SRCSET,
            MarkupRule::BackgroundStyle => &*BACKGROUND_STYLE,
            MarkupRule::PhotoCdn => &*PHOTO_CDN,
        }
    }

    /// Raw matches in text order, before normalization and filtering.
    pub fn candidates(self, markup: &str) -> Vec<&str> {
        let regex = self.regex();
        match self {
            MarkupRule::PhotoCdn => regex.find_iter(markup).map(|m| m.as_str()).collect(),
            MarkupRule::Srcset => regex
                .captures_iter(markup)
                .filter_map(|caps| caps.get(1))
                .flat_map(|list| srcset_urls(list.as_str()))
                .collect(),
            _ => regex
                .captures_iter(markup)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                .collect(),
        }
    }
}

/// `"a.jpg 300w, b.jpg 2x"` -> `["a.jpg", "b.jpg"]`
fn srcset_urls(list: &str) -> impl Iterator<Item = &str> {
    list.split(',')
        .filter_map(|entry| entry.split_whitespace().next())
}

/// True when the URL points at a known non-photo asset.
pub fn is_denied(url: &str) -> bool {
    let (host, path) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or_default().to_ascii_lowercase(),
            parsed.path().to_ascii_lowercase(),
        ),
        Err(_) => (String::new(), url.to_ascii_lowercase()),
    };

    let bad_host = HOST_DENYLIST
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{h}")));
    bad_host
        || path
            .split(['/', '-', '_', '.'])
            .any(|token| DENYLIST.contains(&token))
}

/// Run every rule over `markup` and concatenate the accepted URLs.
pub fn extract_markup_images(markup: &str) -> Vec<String> {
    let mut out = Vec::new();

    for rule in MarkupRule::ORDERED {
        let before = out.len();
        out.extend(
            rule.candidates(markup)
                .into_iter()
                .filter_map(normalize_candidate)
                .filter(|url| !is_denied(url)),
        );
        debug!(?rule, matches = out.len() - before, "markup rule applied");
    }

    out
}
