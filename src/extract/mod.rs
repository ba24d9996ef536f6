//! Image URL extraction pipeline.
//!
//! ```text
//! markup ─┬─ payload::locate_payload ─ structured::extract_structured_images ─┐
//!         └─ markup::extract_markup_images ──────────────────────────────────┴─ canonical::merge_unique
//! ```
//!
//! Every stage is a pure function over borrowed text. The only shared state
//! is compiled patterns, so jobs can run the pipeline concurrently.

pub mod canonical;
pub mod markup;
pub mod payload;
pub mod structured;

use tracing::debug;
use url::Url;

pub use canonical::{CanonicalRules, ImageUrlSet, PathRule};
pub use payload::{locate_payload, EmbeddedPayload, PayloadSource};

use crate::error::ExtractError;

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif", ".avif"];

/// Hosts that only serve photos, whatever the path looks like.
const PHOTO_HOSTS: &[&str] = &["photos.zillowstatic.com"];

/// Extract the deduplicated image URLs of a listing page using the default
/// canonicalization rules.
pub fn extract_image_urls(markup: &str) -> Result<ImageUrlSet, ExtractError> {
    extract_image_urls_with(markup, CanonicalRules::builtin())
}

/// Extract the deduplicated image URLs of a listing page.
///
/// Structured payload results come first, markup results after; duplicates
/// by canonical key keep their first occurrence.
pub fn extract_image_urls_with(
    markup: &str,
    rules: &CanonicalRules,
) -> Result<ImageUrlSet, ExtractError> {
    if markup.trim().is_empty() {
        return Err(ExtractError::EmptyMarkup);
    }

    let structured = match locate_payload(markup) {
        Some(payload) => structured::extract_structured_images(&payload.tree),
        None => Vec::new(),
    };
    let from_markup = markup::extract_markup_images(markup);

    let set = canonical::merge_unique(&structured, &from_markup, rules);
    debug!(
        structured = structured.len(),
        markup = from_markup.len(),
        unique = set.len(),
        "image extraction finished"
    );
    Ok(set)
}

/// Turn a raw candidate string into an absolute http(s) image URL.
///
/// Rejects anything that is not recognizably an image; used for markup,
/// where most URLs are links rather than photos.
pub(crate) fn normalize_candidate(raw: &str) -> Option<String> {
    let absolute = normalize_photo_url(raw)?;
    let parsed = Url::parse(&absolute).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();

    let path = parsed.path().to_ascii_lowercase();
    let image_like = IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        || PHOTO_HOSTS.contains(&host.as_str());

    image_like.then_some(absolute)
}

/// Absolute http(s) URL for a value already known to name a photo.
///
/// Undoes the escaping commonly found in inline scripts and attributes and
/// upgrades protocol-relative URLs to https. The path may look like anything:
/// image CDNs often serve extensionless URLs.
pub(crate) fn normalize_photo_url(raw: &str) -> Option<String> {
    let unescaped = unescape_markup_url(raw.trim());
    let absolute = match unescaped.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => unescaped,
    };

    let parsed = Url::parse(&absolute).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str()?;
    Some(absolute)
}

fn unescape_markup_url(raw: &str) -> String {
    raw.replace("\\u002F", "/")
        .replace("\\u002f", "/")
        .replace("\\u0026", "&")
        .replace("\\/", "/")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHOTO_A: &str = "https://photos.zillowstatic.com/fp/aaa111-cc_ft_1536.jpg";
    const PHOTO_B: &str = "https://photos.zillowstatic.com/fp/bbb222-cc_ft_1536.jpg";
    const PHOTO_C: &str = "https://photos.zillowstatic.com/fp/ccc333-cc_ft_1536.jpg";

    fn listing_fixture() -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
  <title>123 Main St</title>
  <script id="__NEXT_DATA__" type="application/json">
  {{"props":{{"pageProps":{{"property":{{"photos":[
      {{"url":"{PHOTO_A}"}},
      {{"url":"{PHOTO_B}"}},
      {{"url":"{PHOTO_C}"}}
  ]}}}}}}}}
  </script>
</head>
<body>
  <img src="https://photos.zillowstatic.com/fp/aaa111-cc_ft_384.webp" alt="front">
  <img data-src="https://photos.zillowstatic.com/fp/bbb222-p_e.jpg?w=300" alt="kitchen">
  <img src="https://cdn.example.com/listing/extra-photo.jpg" alt="yard">
  <img src="https://www.zillow.com/static/logo.png" alt="logo">
</body>
</html>"#
        )
    }

    #[test]
    fn end_to_end_structured_then_markup_order() {
        let set = extract_image_urls(&listing_fixture()).unwrap();
        assert_eq!(
            set.as_slice(),
            &[
                PHOTO_A.to_string(),
                PHOTO_B.to_string(),
                PHOTO_C.to_string(),
                "https://cdn.example.com/listing/extra-photo.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn idempotent_and_deterministic() {
        let markup = listing_fixture();
        let first = extract_image_urls(&markup).unwrap();
        let second = extract_image_urls(&markup).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_two_entries_share_a_key() {
        let rules = CanonicalRules::default();
        let set = extract_image_urls_with(&listing_fixture(), &rules).unwrap();
        let mut keys: Vec<String> = set.iter().map(|u| rules.identity_key(u)).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn malformed_payload_falls_back_to_markup_only() {
        let markup = r#"<html><head>
            <script id="__NEXT_DATA__" type="application/json">{"props": [unterminated</script>
            </head><body>
            <img src="https://cdn.example.com/p/one.jpg">
            <img data-lazy-src="https://cdn.example.com/p/two.jpg">
            </body></html>"#;
        let rules = CanonicalRules::default();
        let set = extract_image_urls_with(markup, &rules).unwrap();
        let markup_only =
            canonical::merge_unique(&[], &markup::extract_markup_images(markup), &rules);
        assert_eq!(set, markup_only);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn zero_results_is_not_an_error() {
        let set = extract_image_urls("<html><body><p>No photos yet</p></body></html>").unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn empty_markup_is_rejected() {
        assert_eq!(extract_image_urls("  \n "), Err(ExtractError::EmptyMarkup));
    }

    #[test]
    fn normalize_candidate_unescapes_and_rejects_non_images() {
        assert_eq!(
            normalize_candidate("https:\\/\\/photos.zillowstatic.com\\/fp\\/abc-p_e.jpg").as_deref(),
            Some("https://photos.zillowstatic.com/fp/abc-p_e.jpg")
        );
        assert_eq!(
            normalize_candidate("//cdn.example.com/a.PNG").as_deref(),
            Some("https://cdn.example.com/a.PNG")
        );
        assert!(normalize_candidate("https://www.example.com/listing/123").is_none());
        assert!(normalize_candidate("data:image/gif;base64,R0lGOD").is_none());
        assert!(normalize_candidate("/relative/photo.jpg").is_none());
    }

    #[test]
    fn photo_urls_need_no_extension() {
        assert_eq!(
            normalize_photo_url("https:\\/\\/images.example-cdn.com\\/abc123?w=1200").as_deref(),
            Some("https://images.example-cdn.com/abc123?w=1200")
        );
        assert!(normalize_photo_url("data:image/gif;base64,R0lGOD").is_none());
        assert!(normalize_photo_url("not a url").is_none());
        assert!(normalize_photo_url("/relative/photo").is_none());
    }

    #[test]
    fn extensionless_payload_photo_survives_the_pipeline() {
        let markup = r#"<html><head>
            <script type="application/ld+json">{"@type":"Residence","image":["https://images.example-cdn.com/abc123?w=1200"]}</script>
            </head><body><a href="https://www.example.com/listing/123">details</a></body></html>"#;
        let set = extract_image_urls(markup).unwrap();
        assert_eq!(set.as_slice(), &["https://images.example-cdn.com/abc123?w=1200".to_string()]);
    }
}
