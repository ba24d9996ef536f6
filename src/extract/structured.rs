//! Walks a parsed payload tree and pulls out photo URLs.
//!
//! The payload schema is not stable, so nothing here deserializes into fixed
//! structs. Known image-bearing shapes are pattern-matched on the generic
//! `serde_json::Value` tree and everything else is traversed or ignored.

use serde_json::{Map, Value};
use tracing::debug;

use super::normalize_photo_url;

/// Keys whose value is a photo collection (array of URLs or photo records),
/// or a single photo given as a string or record.
const PHOTO_KEYS: &[&str] = &[
    "responsivePhotos",
    "originalPhotos",
    "hugePhotos",
    "photos",
    "photoUrls",
    "carouselPhotos",
    "galleryPhotos",
    "images",
    "image",
    "hiResImageLink",
    "desktopWebHdpImageLink",
    "mediumImageLink",
    "imageUrl",
    "imgSrc",
    "thumbnailUrl",
];

/// Fields that carry the URL inside a single photo record.
const RECORD_URL_KEYS: &[&str] = &["url", "fullUrl", "highResUrl", "contentUrl", "src", "href"];

/// Preferred formats inside a `mixedSources` record.
const MIXED_SOURCE_FORMATS: &[&str] = &["jpeg", "webp"];

/// Nested JSON strings are re-parsed, which can deepen the tree past what the
/// outer parser limited.
const MAX_DEPTH: usize = 96;

/// Extract photo URLs from a payload tree, depth-first in field order.
pub fn extract_structured_images(tree: &Value) -> Vec<String> {
    let mut out = Vec::new();
    walk(tree, &mut out, 0);
    out
}

fn walk(value: &Value, out: &mut Vec<String>, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if PHOTO_KEYS.contains(&key.as_str()) {
                    collect_photos(child, out, depth + 1);
                } else {
                    walk(child, out, depth + 1);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, out, depth + 1);
            }
        }
        // Some pages ship a cache blob as a JSON string inside the payload
        Value::String(s) => {
            if let Some(nested) = parse_nested_json(s) {
                walk(&nested, out, depth + 1);
            }
        }
        _ => {}
    }
}

/// Handle the value of a recognized photo key.
fn collect_photos(value: &Value, out: &mut Vec<String>, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }

    match value {
        Value::String(s) => {
            if let Some(url) = normalize_photo_url(s) {
                out.push(url);
            } else if let Some(nested) = parse_nested_json(s) {
                walk(&nested, out, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_photos(item, out, depth + 1);
            }
        }
        Value::Object(record) => {
            if let Some(url) = record_url(record) {
                out.push(url);
                return;
            }

            // Gallery wrappers and sectioned galleries nest further photo keys
            let before = out.len();
            walk(value, out, depth + 1);
            if out.len() == before {
                debug!(
                    fields = record.len(),
                    "photo record without a usable url, skipped"
                );
            }
        }
        _ => {}
    }
}

/// Best URL for a single photo record.
fn record_url(record: &Map<String, Value>) -> Option<String> {
    if let Some(Value::Object(sources)) = record.get("mixedSources") {
        for format in MIXED_SOURCE_FORMATS {
            if let Some(url) = sources.get(*format).and_then(widest_source) {
                return Some(url);
            }
        }
    }

    RECORD_URL_KEYS
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find_map(normalize_photo_url)
}

/// Largest-width entry of a `[{ "url": ..., "width": ... }]` list.
fn widest_source(list: &Value) -> Option<String> {
    list.as_array()?
        .iter()
        .filter_map(|entry| {
            let url = entry.get("url").and_then(Value::as_str)?;
            let width = entry.get("width").and_then(Value::as_u64).unwrap_or(0);
            Some((width, normalize_photo_url(url)?))
        })
        // max_by_key keeps the last maximum; reverse so ties resolve to the first
        .rev()
        .max_by_key(|(width, _)| *width)
        .map(|(_, url)| url)
}

fn parse_nested_json(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    let looks_structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !looks_structured || trimmed.len() < 2 {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
