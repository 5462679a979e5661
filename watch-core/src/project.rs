use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::WatchError;
use crate::fingerprint::ContentDigest;

/// Longest display name kept verbatim; anything longer is replaced by a derived one.
pub const MAX_DISPLAY_NAME_LEN: usize = 64;

pub const DEFAULT_INTERVAL_SECONDS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identity of the conversation or user that owns a set of projects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for OwnerId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracked resource with its monitoring settings and last observed state.
///
/// Records are values: every change produces a new `Project` through one of the
/// `with_*` methods or a [`crate::detector::ProjectPatch`], and the store swaps
/// the whole record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: OwnerId,
    pub target: String,
    pub display_name: String,
    pub interval_seconds: u64,
    pub active: bool,
    pub content_fingerprint: Option<ContentDigest>,
    pub feed_identity: Option<Vec<String>>,
    pub feed_locator: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub notify_on_no_change: bool,
}

impl Project {
    pub fn new(owner_id: OwnerId, target: impl Into<String>, display_name: Option<&str>) -> Self {
        let target = target.into();
        let display_name = resolve_display_name(display_name, &target);
        Self {
            id: ProjectId::new(),
            owner_id,
            target,
            display_name,
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            active: true,
            content_fingerprint: None,
            feed_identity: None,
            feed_locator: None,
            last_checked_at: None,
            last_notified_at: None,
            notify_on_no_change: false,
        }
    }

    pub fn with_interval(self, interval_seconds: u64) -> Self {
        Self {
            interval_seconds,
            ..self
        }
    }

    pub fn with_active(self, active: bool) -> Self {
        Self { active, ..self }
    }

    pub fn with_notify_on_no_change(self, notify_on_no_change: bool) -> Self {
        Self {
            notify_on_no_change,
            ..self
        }
    }

    pub fn with_display_name(self, name: Option<&str>) -> Self {
        let display_name = resolve_display_name(name, &self.target);
        Self {
            display_name,
            ..self
        }
    }

    /// Whether any baseline (page digest or feed item set) has been recorded.
    pub fn is_baselined(&self) -> bool {
        self.content_fingerprint.is_some() || self.feed_identity.is_some()
    }
}

/// Accepts only locators starting with `http://` or `https://` (case-sensitive).
pub fn validate_locator(locator: &str) -> Result<String, WatchError> {
    let locator = locator.trim();
    if locator.starts_with("http://") || locator.starts_with("https://") {
        Ok(locator.to_owned())
    } else {
        Err(WatchError::InvalidLocator(locator.to_owned()))
    }
}

pub fn validate_interval(seconds: i64) -> Result<u64, WatchError> {
    if seconds < 1 {
        return Err(WatchError::InvalidInterval(seconds));
    }
    u64::try_from(seconds).map_err(|_| WatchError::InvalidInterval(seconds))
}

/// Keeps a usable explicit name, otherwise derives one from the locator.
pub fn resolve_display_name(name: Option<&str>, locator: &str) -> String {
    match name.map(str::trim) {
        Some(name) if !name.is_empty() && name.chars().count() <= MAX_DISPLAY_NAME_LEN => {
            name.to_owned()
        }
        _ => default_display_name(locator),
    }
}

/// Last non-empty path segment, then host, then the (truncated) locator.
pub fn default_display_name(locator: &str) -> String {
    if let Ok(url) = Url::parse(locator) {
        let segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .filter(|s| s.chars().count() <= MAX_DISPLAY_NAME_LEN)
            .map(ToOwned::to_owned);
        if let Some(segment) = segment {
            return segment;
        }
        if let Some(host) = url.host_str() {
            return host.to_owned();
        }
    }
    locator.chars().take(MAX_DISPLAY_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_scheme_is_case_sensitive() {
        assert!(validate_locator("https://example.com/a").is_ok());
        assert!(validate_locator("  http://example.com ").is_ok());
        assert_eq!(
            validate_locator("HTTPS://example.com"),
            Err(WatchError::InvalidLocator("HTTPS://example.com".into()))
        );
        assert!(validate_locator("ftp://example.com").is_err());
        assert!(validate_locator("example.com").is_err());
    }

    #[test]
    fn interval_must_be_positive() {
        assert_eq!(validate_interval(0), Err(WatchError::InvalidInterval(0)));
        assert_eq!(validate_interval(-5), Err(WatchError::InvalidInterval(-5)));
        assert_eq!(validate_interval(1), Ok(1));
        assert_eq!(validate_interval(900), Ok(900));
    }

    #[test]
    fn display_name_defaults_from_last_segment() {
        assert_eq!(default_display_name("https://example.com/news/today"), "today");
        assert_eq!(default_display_name("https://example.com/news/"), "news");
        assert_eq!(default_display_name("https://example.com"), "example.com");
        assert_eq!(default_display_name("not a url"), "not a url");
    }

    #[test]
    fn overlong_or_blank_names_are_replaced() {
        let long = "x".repeat(MAX_DISPLAY_NAME_LEN + 1);
        assert_eq!(resolve_display_name(Some(&long), "https://e.com/page"), "page");
        assert_eq!(resolve_display_name(Some("   "), "https://e.com/page"), "page");
        assert_eq!(resolve_display_name(Some("Prices"), "https://e.com/page"), "Prices");
        assert_eq!(resolve_display_name(None, "https://e.com/page"), "page");
    }

    #[test]
    fn new_project_defaults() {
        let project = Project::new(OwnerId::from(42), "https://example.com/a", None);
        assert_eq!(project.interval_seconds, DEFAULT_INTERVAL_SECONDS);
        assert!(project.active);
        assert!(!project.notify_on_no_change);
        assert!(!project.is_baselined());
        assert_eq!(project.display_name, "a");
        assert_eq!(project.owner_id.as_str(), "42");
    }
}
