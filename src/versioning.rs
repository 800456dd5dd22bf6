//! API version negotiation through the `Accept` header.
//!
//! Clients ask for a version with a media type parameter, for example
//! `Accept: application/json; version=2.0`.

use axum::http::header::ACCEPT;
use axum::http::HeaderMap;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone)]
pub struct VersionResolver {
    default_version: String,
}

impl VersionResolver {
    /// Create a resolver falling back to `default_version`.
    pub fn new(default_version: impl Into<String>) -> Self {
        VersionResolver {
            default_version: default_version.into(),
        }
    }

    pub fn default_version(&self) -> &str {
        &self.default_version
    }

    /// Effective version for a raw `Accept` value.
    ///
    /// The value is split on `;`; the first segment containing `version`
    /// and carrying a non-empty value after `=` wins. Segments without a
    /// usable value are skipped. Falls back to the default.
    ///
    /// ```
    /// use bookshelf_api::versioning::VersionResolver;
    ///
    /// let resolver = VersionResolver::new("1.0");
    /// assert_eq!(resolver.resolve(Some("application/json; version=2.0")), "2.0");
    /// assert_eq!(resolver.resolve(Some("application/json")), "1.0");
    /// assert_eq!(resolver.resolve(None), "1.0");
    /// ```
    pub fn resolve(&self, accept: Option<&str>) -> String {
        let Some(accept) = accept else {
            return self.default_version.clone();
        };

        for segment in accept.split(';') {
            if !segment.contains("version") {
                continue;
            }
            match segment.split('=').nth(1).map(str::trim) {
                Some(version) if !version.is_empty() => return version.to_string(),
                _ => debug!("Skipping version segment without value: {:?}", segment),
            }
        }

        self.default_version.clone()
    }

    /// [`resolve`](Self::resolve) applied to the request's `Accept` header.
    pub fn resolve_headers(&self, headers: &HeaderMap) -> String {
        let accept = headers
            .get(ACCEPT)
            .and_then(|value| value.to_str().ok());
        self.resolve(accept)
    }
}

/// Dotted numeric version, compared component by component.
///
/// Trailing zero components are insignificant, so `2`, `2.0` and `2.0.0`
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiVersion {
    parts: Vec<u64>,
}

impl ApiVersion {
    /// `None` unless every dot-separated component is a non-negative integer.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw
            .trim()
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        while parts.last() == Some(&0) {
            parts.pop();
        }
        Some(ApiVersion { parts })
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "0");
        }
        let parts: Vec<String> = self.parts.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}
