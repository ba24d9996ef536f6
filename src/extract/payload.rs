//! Locates the embedded listing payload inside page markup.
//!
//! Listing pages ship their data to client-side scripts as a JSON blob in a
//! `<script>` tag. The exact tag varies between page generations, so a small
//! ordered list of selectors is tried and the first block that parses wins.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

/// Where a payload was found, in probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    /// `<script id="__NEXT_DATA__">`
    NextData,
    /// `<script data-zrr-shared-data-key=...>`, body wrapped in an HTML comment
    SharedDataKey,
    /// Any other `<script type="application/json">`
    ApplicationJson,
    /// `<script type="application/ld+json">`
    JsonLd,
}

const PROBES: &[(PayloadSource, &str)] = &[
    (PayloadSource::NextData, "script#__NEXT_DATA__"),
    (PayloadSource::SharedDataKey, "script[data-zrr-shared-data-key]"),
    (PayloadSource::ApplicationJson, "script[type='application/json']"),
    (PayloadSource::JsonLd, "script[type='application/ld+json']"),
];

/// A parsed embedded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedPayload {
    pub source: PayloadSource,
    pub tree: Value,
}

/// Find and parse the first embedded payload in `html`.
///
/// Returns `None` when no candidate tag exists or none of them holds valid
/// JSON. Never fails.
pub fn locate_payload(html: &str) -> Option<EmbeddedPayload> {
    let document = Html::parse_document(html);

    for (source, css) in PROBES {
        let Ok(selector) = Selector::parse(css) else {
            continue;
        };

        for element in document.select(&selector) {
            let raw = element.text().collect::<String>();
            let body = strip_comment_wrapper(raw.trim());
            if body.is_empty() {
                continue;
            }

            match serde_json::from_str::<Value>(body) {
                Ok(tree) if tree.is_object() || tree.is_array() => {
                    debug!(?source, bytes = body.len(), "embedded payload located");
                    return Some(EmbeddedPayload {
                        source: *source,
                        tree,
                    });
                }
                Ok(_) => debug!(?source, "embedded payload is a bare scalar, skipping"),
                Err(e) => debug!(?source, error = %e, "embedded payload did not parse"),
            }
        }
    }

    debug!("no embedded payload found");
    None
}

fn strip_comment_wrapper(body: &str) -> &str {
    body.strip_prefix("<!--")
        .and_then(|b| b.strip_suffix("-->"))
        .map(str::trim)
        .unwrap_or(body)
}
