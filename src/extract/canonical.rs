//! Canonical identity keys and first-seen deduplication.
//!
//! The same photo shows up under many URLs: different sizes, formats and
//! query strings. [`CanonicalRules`] maps each URL to an identity key by
//! dropping the parts that only select a rendition, and [`merge_unique`]
//! keeps the first URL seen for each key.

use std::borrow::Cow;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

/// Query parameters that select a rendition rather than an image.
pub const DEFAULT_STRIP_PARAMS: &[&str] = &[
    "w", "h", "width", "height", "q", "quality", "fit", "crop", "resize", "size", "dpr", "auto",
    "fm", "format",
];

/// A regex rewrite applied to the URL path when building the identity key.
#[derive(Debug, Clone)]
pub struct PathRule {
    host_suffix: Option<String>,
    pattern: Regex,
    replacement: String,
}

impl PathRule {
    pub fn new(pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            host_suffix: None,
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    /// Restrict the rule to hosts ending with `suffix`.
    pub fn for_host(mut self, suffix: &str) -> Self {
        self.host_suffix = Some(suffix.to_ascii_lowercase());
        self
    }

    fn applies_to(&self, host: &str) -> bool {
        match &self.host_suffix {
            Some(suffix) => host.ends_with(suffix.as_str()),
            None => true,
        }
    }
}

/// Rule table deciding which URL components carry image identity.
///
/// The defaults cover the listing photo CDN and the usual resizing
/// conventions; sites with other schemes extend the table rather than
/// changing code.
#[derive(Debug, Clone)]
pub struct CanonicalRules {
    strip_params: Vec<String>,
    path_rules: Vec<PathRule>,
}

static BUILTIN_RULES: Lazy<CanonicalRules> = Lazy::new(|| {
    let builtin = |pattern: &str, replacement: &str| PathRule {
        host_suffix: None,
        pattern: Regex::new(pattern).unwrap(),
        replacement: replacement.to_string(),
    };

    CanonicalRules {
        strip_params: DEFAULT_STRIP_PARAMS.iter().map(|p| p.to_string()).collect(),
        path_rules: vec![
            // /fp/<hash>-cc_ft_960.jpg, -p_e.jpg, -uncropped_scaled_within_1536_1152.webp
            builtin(
                r"^(/fp/[0-9A-Za-z]+)-[0-9A-Za-z_]+\.(?:jpe?g|png|webp|avif)$",
                "$1",
            )
            .for_host("zillowstatic.com"),
            // photo-1024x768.jpg
            builtin(r"-\d{2,4}x\d{2,4}(\.[A-Za-z0-9]+)$", "$1"),
            // /resize/640x480/photo.jpg, /thumbs/200x150/photo.jpg
            builtin(r"/(?:resize|resized|thumb|thumbs|thumbnails)/\d{2,4}x\d{2,4}/", "/"),
            // /640x480/photo.jpg
            builtin(r"/\d{2,4}x\d{2,4}/", "/"),
        ],
    }
});

impl Default for CanonicalRules {
    fn default() -> Self {
        BUILTIN_RULES.clone()
    }
}

impl CanonicalRules {
    /// The built-in table, compiled once per process.
    pub fn builtin() -> &'static CanonicalRules {
        &BUILTIN_RULES
    }

    /// A table with no rules at all: keys differ only by scheme and case of
    /// the host.
    pub fn empty() -> Self {
        Self {
            strip_params: Vec::new(),
            path_rules: Vec::new(),
        }
    }

    /// Replace the stripped query parameters.
    pub fn with_strip_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strip_params = params.into_iter().map(Into::into).collect();
        self
    }

    /// Append a path rewrite; rules run in insertion order.
    pub fn with_path_rule(mut self, rule: PathRule) -> Self {
        self.path_rules.push(rule);
        self
    }

    pub fn strip_params(&self) -> &[String] {
        &self.strip_params
    }

    fn strips(&self, param: &str) -> bool {
        self.strip_params
            .iter()
            .any(|p| p.eq_ignore_ascii_case(param))
    }

    /// Identity key for `url`.
    ///
    /// Scheme, fragment, host case and rendition components are dropped;
    /// everything else is kept in order and still percent-encoded, so `%2F`
    /// in a path or `%3D` in a query value never reads as a separator.
    /// Unparseable input keys to itself.
    pub fn identity_key(&self, url: &str) -> String {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return url.trim().to_string();
        };

        let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
        let mut path = parsed.path().to_string();
        for rule in self.path_rules.iter().filter(|r| r.applies_to(&host)) {
            path = rule
                .pattern
                .replace(&path, rule.replacement.as_str())
                .into_owned();
        }

        let mut key = host;
        if let Some(port) = parsed.port() {
            key.push_str(&format!(":{port}"));
        }
        key.push_str(&path);

        let kept: Vec<&str> = parsed
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let name = pair.split('=').next().unwrap_or_default();
                let name = urlencoding::decode(name).unwrap_or(Cow::Borrowed(name));
                !self.strips(&name)
            })
            .collect();
        if !kept.is_empty() {
            key.push('?');
            key.push_str(&kept.join("&"));
        }

        key
    }
}

/// Ordered image URLs with unique identity keys, in first-seen order.
///
/// Only produced by [`merge_unique`], so the invariant always holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageUrlSet(Vec<String>);

impl ImageUrlSet {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// The first `limit` URLs, the subset handed to analysis.
    pub fn head(&self, limit: usize) -> &[String] {
        &self.0[..limit.min(self.0.len())]
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl IntoIterator for ImageUrlSet {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Merge structured results, then markup results, keeping the first URL for
/// each identity key.
pub fn merge_unique(structured: &[String], markup: &[String], rules: &CanonicalRules) -> ImageUrlSet {
    let mut seen = HashSet::new();
    let urls = structured
        .iter()
        .chain(markup)
        .filter(|url| seen.insert(rules.identity_key(url)))
        .cloned()
        .collect();
    ImageUrlSet(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(urls: &[&str]) -> Vec<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn size_query_variants_collapse_to_first_seen() {
        let rules = CanonicalRules::default();
        let set = merge_unique(
            &[],
            &strings(&[
                "https://cdn.example.com/photo.jpg?w=300",
                "https://cdn.example.com/photo.jpg?w=1200",
            ]),
            &rules,
        );
        assert_eq!(set.as_slice(), &strings(&["https://cdn.example.com/photo.jpg?w=300"]));
    }

    #[test]
    fn structured_source_wins_over_markup() {
        let rules = CanonicalRules::default();
        let set = merge_unique(
            &strings(&["https://cdn.example.com/photo.jpg?w=1200"]),
            &strings(&["https://cdn.example.com/photo.jpg?w=300&q=80"]),
            &rules,
        );
        assert_eq!(set.as_slice(), &strings(&["https://cdn.example.com/photo.jpg?w=1200"]));
    }

    #[test]
    fn cdn_renditions_share_a_key() {
        let rules = CanonicalRules::default();
        let key = rules.identity_key("https://photos.zillowstatic.com/fp/abc123-cc_ft_1536.jpg");
        assert_eq!(key, "photos.zillowstatic.com/fp/abc123");
        for variant in [
            "https://photos.zillowstatic.com/fp/abc123-p_e.jpg",
            "http://PHOTOS.zillowstatic.com/fp/abc123-uncropped_scaled_within_1536_1152.webp",
            "https://photos.zillowstatic.com/fp/abc123-cc_ft_384.webp#gallery",
        ] {
            assert_eq!(rules.identity_key(variant), key, "{variant}");
        }
        assert_ne!(
            rules.identity_key("https://photos.zillowstatic.com/fp/def456-cc_ft_1536.jpg"),
            key
        );
    }

    #[test]
    fn resize_path_segments_are_dropped() {
        let rules = CanonicalRules::default();
        assert_eq!(
            rules.identity_key("https://img.example.com/uploads/house-1024x768.jpg"),
            rules.identity_key("https://img.example.com/uploads/house.jpg"),
        );
        assert_eq!(
            rules.identity_key("https://img.example.com/resize/640x480/house.jpg"),
            "img.example.com/house.jpg"
        );
    }

    #[test]
    fn identity_bearing_parts_are_kept() {
        let rules = CanonicalRules::default();
        assert_ne!(
            rules.identity_key("https://img.example.com/get?id=1&w=300"),
            rules.identity_key("https://img.example.com/get?id=2&w=300"),
        );
        assert_eq!(
            rules.identity_key("https://img.example.com/get?id=1&w=300&quality=80"),
            "img.example.com/get?id=1"
        );
    }

    #[test]
    fn rule_table_is_configurable() {
        let rules = CanonicalRules::empty().with_strip_params(["variant"]);
        assert_eq!(
            rules.identity_key("https://img.example.com/a.jpg?variant=small&w=300"),
            "img.example.com/a.jpg?w=300"
        );

        let rules = CanonicalRules::empty().with_path_rule(
            PathRule::new(r"_(?:sm|md|lg)(\.jpg)$", "$1")
                .unwrap()
                .for_host("example.com"),
        );
        assert_eq!(
            rules.identity_key("https://img.example.com/a_sm.jpg"),
            rules.identity_key("https://img.example.com/a_lg.jpg"),
        );
        assert_ne!(
            rules.identity_key("https://other.test/a_sm.jpg"),
            rules.identity_key("https://other.test/a_lg.jpg"),
        );
    }

    #[test]
    fn encoded_separators_do_not_collide() {
        let rules = CanonicalRules::default();
        let pairs = [
            ("https://img.example.com/get?a=b%3Dc", "https://img.example.com/get?a%3Db=c"),
            ("https://img.example.com/x.jpg%3Fid%3D1", "https://img.example.com/x.jpg?id=1"),
            ("https://img.example.com/a%2Fb.jpg", "https://img.example.com/a/b.jpg"),
        ];
        for (left, right) in pairs {
            assert_ne!(rules.identity_key(left), rules.identity_key(right), "{left} vs {right}");
            let set = merge_unique(&strings(&[left, right]), &[], &rules);
            assert_eq!(set.len(), 2, "{left} vs {right}");
        }
        assert_eq!(
            rules.identity_key("https://img.example.com/get?a=b%3Dc&%77=300"),
            "img.example.com/get?a=b%3Dc"
        );
    }

    #[test]
    fn default_table_is_shared() {
        assert!(std::ptr::eq(CanonicalRules::builtin(), CanonicalRules::builtin()));
        let cloned = CanonicalRules::default();
        assert_eq!(cloned.strip_params(), CanonicalRules::builtin().strip_params());
        assert_eq!(
            cloned.identity_key("https://photos.zillowstatic.com/fp/abc-p_e.jpg"),
            CanonicalRules::builtin().identity_key("https://photos.zillowstatic.com/fp/abc-cc_ft_384.webp"),
        );
    }

    #[test]
    fn unparseable_input_keys_to_itself() {
        let rules = CanonicalRules::default();
        assert_eq!(rules.identity_key(" not a url "), "not a url");
    }

    #[test]
    fn head_is_bounded() {
        let rules = CanonicalRules::default();
        let set = merge_unique(
            &strings(&["https://a.test/1.jpg", "https://a.test/2.jpg", "https://a.test/3.jpg"]),
            &[],
            &rules,
        );
        assert_eq!(set.head(2).len(), 2);
        assert_eq!(set.head(10).len(), 3);
    }
}
