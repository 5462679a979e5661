//! Change detection: one retrieval pass per cycle, then a pure verdict.
//!
//! [`observe`] performs the I/O for a cycle against the record read at the top
//! of the cycle. [`decide`] turns that observation into an [`Outcome`] and the
//! [`ProjectPatch`] to write back, without touching the store itself.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::RetrievalError;
use crate::feed::FeedItem;
use crate::fingerprint::{fingerprint_content, fingerprint_feed_items, new_feed_items, ContentDigest};
use crate::project::Project;
use crate::retrieval::Retriever;

#[derive(Debug)]
pub enum Observation {
    Feed {
        feed_locator: String,
        /// Found during this cycle rather than already recorded on the project.
        discovered: bool,
        result: Result<Vec<FeedItem>, RetrievalError>,
    },
    Page(Result<Bytes, RetrievalError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    FirstObservation,
    Changed,
    Unchanged,
    /// New items in feed order.
    FeedNewItems(Vec<FeedItem>),
    FetchFailed(String),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::FirstObservation => "first-observation",
            Outcome::Changed => "changed",
            Outcome::Unchanged => "unchanged",
            Outcome::FeedNewItems(_) => "feed-new-items",
            Outcome::FetchFailed(_) => "fetch-failed",
        }
    }
}

/// Fields a cycle writes back. `None` leaves the stored value untouched, so a
/// baseline is never cleared by detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectPatch {
    pub content_fingerprint: Option<ContentDigest>,
    pub feed_identity: Option<Vec<String>>,
    pub feed_locator: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ProjectPatch {
    pub fn apply(self, project: Project) -> Project {
        Project {
            content_fingerprint: self.content_fingerprint.or(project.content_fingerprint),
            feed_identity: self.feed_identity.or(project.feed_identity),
            feed_locator: self.feed_locator.or(project.feed_locator),
            last_checked_at: self.last_checked_at.or(project.last_checked_at),
            ..project
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub outcome: Outcome,
    pub patch: ProjectPatch,
}

/// Retrieval for one cycle.
///
/// A recorded feed locator is sticky: if fetching it fails the cycle fails,
/// with no fallback to the raw page.
pub async fn observe(project: &Project, retriever: &dyn Retriever) -> Observation {
    if let Some(feed_locator) = &project.feed_locator {
        let result = retriever.fetch_feed(feed_locator).await;
        return Observation::Feed {
            feed_locator: feed_locator.clone(),
            discovered: false,
            result,
        };
    }

    if let Some(feed_locator) = retriever.discover_feed(&project.target).await {
        let result = retriever.fetch_feed(&feed_locator).await;
        return Observation::Feed {
            feed_locator,
            discovered: true,
            result,
        };
    }

    Observation::Page(retriever.fetch_raw_content(&project.target).await)
}

pub fn decide(project: &Project, observation: Observation, started_at: DateTime<Utc>) -> Verdict {
    let mut patch = ProjectPatch {
        last_checked_at: Some(started_at),
        ..ProjectPatch::default()
    };

    let outcome = match observation {
        Observation::Feed {
            feed_locator,
            discovered,
            result,
        } => {
            if discovered {
                patch.feed_locator = Some(feed_locator);
            }
            match result {
                Err(err) => Outcome::FetchFailed(err.to_string()),
                Ok(items) => decide_feed(project, &items, &mut patch),
            }
        }
        Observation::Page(Err(err)) => Outcome::FetchFailed(err.to_string()),
        Observation::Page(Ok(content)) => {
            let digest = fingerprint_content(&content);
            match &project.content_fingerprint {
                None => {
                    patch.content_fingerprint = Some(digest);
                    Outcome::FirstObservation
                }
                Some(previous) if *previous != digest => {
                    patch.content_fingerprint = Some(digest);
                    Outcome::Changed
                }
                Some(_) => Outcome::Unchanged,
            }
        }
    };

    Verdict { outcome, patch }
}

fn decide_feed(project: &Project, items: &[FeedItem], patch: &mut ProjectPatch) -> Outcome {
    let current = fingerprint_feed_items(items);
    match &project.feed_identity {
        None => {
            patch.feed_identity = Some(current);
            Outcome::FirstObservation
        }
        Some(known) => {
            let fresh = new_feed_items(items, known);
            if fresh.is_empty() {
                Outcome::Unchanged
            } else {
                patch.feed_identity = Some(current);
                Outcome::FeedNewItems(fresh)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::project::OwnerId;

    fn project() -> Project {
        Project::new(OwnerId::from(1), "https://example.com/a", None)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 21, hour, 0, 0).unwrap()
    }

    fn page(body: &'static str) -> Observation {
        Observation::Page(Ok(Bytes::from_static(body.as_bytes())))
    }

    fn item(id: &str) -> FeedItem {
        FeedItem {
            id: Some(id.into()),
            title: id.to_uppercase(),
            link: Some(format!("https://example.com/{id}")),
            published_at: None,
        }
    }

    fn feed(locator: &str, discovered: bool, items: Vec<FeedItem>) -> Observation {
        Observation::Feed {
            feed_locator: locator.into(),
            discovered,
            result: Ok(items),
        }
    }

    #[test]
    fn first_page_check_is_first_observation_whatever_the_content() {
        for body in ["X", "", "<html>anything</html>"] {
            let verdict = decide(&project(), page(body), at(1));
            assert_eq!(verdict.outcome, Outcome::FirstObservation);
            assert!(verdict.patch.content_fingerprint.is_some());
        }
    }

    #[test]
    fn same_digest_is_unchanged_and_new_digest_is_changed() {
        let baseline = decide(&project(), page("X"), at(1)).patch.apply(project());

        let same = decide(&baseline, page("X"), at(2));
        assert_eq!(same.outcome, Outcome::Unchanged);
        assert_eq!(same.patch.content_fingerprint, None);

        let changed = decide(&baseline, page("Y"), at(3));
        assert_eq!(changed.outcome, Outcome::Changed);
        assert_eq!(changed.patch.content_fingerprint, Some(fingerprint_content(b"Y")));
    }

    #[test]
    fn fetch_failure_keeps_baseline_but_records_check_time() {
        let baseline = decide(&project(), page("X"), at(1)).patch.apply(project());
        let verdict = decide(&baseline, Observation::Page(Err(RetrievalError::Status(502))), at(2));

        assert!(matches!(verdict.outcome, Outcome::FetchFailed(_)));
        let after = verdict.patch.apply(baseline.clone());
        assert_eq!(after.content_fingerprint, baseline.content_fingerprint);
        assert_eq!(after.last_checked_at, Some(at(2)));
    }

    #[test]
    fn feed_reports_only_unseen_items() {
        let first = decide(&project(), feed("https://example.com/rss", true, vec![item("a1")]), at(1));
        assert_eq!(first.outcome, Outcome::FirstObservation);
        assert_eq!(first.patch.feed_locator.as_deref(), Some("https://example.com/rss"));
        let baselined = first.patch.apply(project());

        let second = decide(&baselined, feed("https://example.com/rss", false, vec![item("a2"), item("a1")]), at(2));
        assert_eq!(second.outcome, Outcome::FeedNewItems(vec![item("a2")]));
        assert_eq!(second.patch.feed_locator, None);
        let updated = second.patch.apply(baselined);
        assert_eq!(updated.feed_identity, Some(vec!["a2".to_string(), "a1".to_string()]));

        let third = decide(&updated, feed("https://example.com/rss", false, vec![item("a1"), item("a2")]), at(3));
        assert_eq!(third.outcome, Outcome::Unchanged);
    }

    #[test]
    fn discovered_feed_is_recorded_even_when_its_fetch_fails() {
        let observation = Observation::Feed {
            feed_locator: "https://example.com/rss".into(),
            discovered: true,
            result: Err(RetrievalError::Timeout(30)),
        };
        let verdict = decide(&project(), observation, at(1));
        assert!(matches!(verdict.outcome, Outcome::FetchFailed(_)));
        assert_eq!(verdict.patch.feed_locator.as_deref(), Some("https://example.com/rss"));
        assert_eq!(verdict.patch.feed_identity, None);
    }
}
