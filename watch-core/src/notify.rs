use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerSettings;
use crate::detector::Outcome;
use crate::feed::FeedItem;
use crate::project::{OwnerId, Project, ProjectId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    FirstObservation,
    ContentChanged,
    /// Oldest first.
    NewFeedItems(Vec<FeedItem>),
    FetchFailed { reason: String },
    UnchangedNotice,
}

/// Outbound message for the front-end, stamped in the owner's display offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub owner_id: OwnerId,
    pub project_id: ProjectId,
    pub display_name: String,
    pub target: String,
    pub at: DateTime<FixedOffset>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationPolicy {
    no_change_floor: Duration,
    display_offset: FixedOffset,
}

impl NotificationPolicy {
    pub fn new(no_change_floor_seconds: u64, display_offset: FixedOffset) -> Self {
        let seconds = i64::try_from(no_change_floor_seconds).unwrap_or(i64::MAX);
        Self {
            no_change_floor: Duration::try_seconds(seconds).unwrap_or(Duration::MAX),
            display_offset,
        }
    }

    pub fn from_settings(settings: &SchedulerSettings) -> Self {
        Self::new(settings.no_change_notify_floor_seconds, settings.display_offset())
    }

    pub fn should_notify(&self, outcome: &Outcome, project: &Project, now: DateTime<Utc>) -> bool {
        match outcome {
            Outcome::Unchanged => {
                project.notify_on_no_change
                    && project
                        .last_notified_at
                        .map_or(true, |last| now - last >= self.no_change_floor)
            }
            _ => true,
        }
    }

    /// Builds the event for `outcome`, if one is due, and returns the record
    /// with the no-change throttle stamp advanced when a notice goes out.
    pub fn apply(&self, outcome: &Outcome, project: Project, now: DateTime<Utc>) -> (Project, Option<WatchEvent>) {
        if !self.should_notify(outcome, &project, now) {
            return (project, None);
        }

        let kind = match outcome {
            Outcome::FirstObservation => EventKind::FirstObservation,
            Outcome::Changed => EventKind::ContentChanged,
            Outcome::FeedNewItems(items) => EventKind::NewFeedItems(oldest_first(items)),
            Outcome::FetchFailed(reason) => EventKind::FetchFailed {
                reason: reason.clone(),
            },
            Outcome::Unchanged => EventKind::UnchangedNotice,
        };

        let event = WatchEvent {
            owner_id: project.owner_id.clone(),
            project_id: project.id,
            display_name: project.display_name.clone(),
            target: project.target.clone(),
            at: now.with_timezone(&self.display_offset),
            kind,
        };

        let project = if matches!(outcome, Outcome::Unchanged) {
            Project {
                last_notified_at: Some(now),
                ..project
            }
        } else {
            project
        };
        (project, Some(event))
    }
}

/// Sorted by publication date when every item has one; otherwise feeds are
/// assumed to list newest first and the order is reversed.
fn oldest_first(items: &[FeedItem]) -> Vec<FeedItem> {
    let mut ordered = items.to_vec();
    if ordered.iter().all(|item| item.published_at.is_some()) {
        ordered.sort_by_key(|item| item.published_at);
    } else {
        ordered.reverse();
    }
    ordered
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn policy() -> NotificationPolicy {
        NotificationPolicy::from_settings(&SchedulerSettings::default())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 21, 9, 0, 0).unwrap()
    }

    fn quiet_project(notify: bool) -> Project {
        Project::new(OwnerId::from(7), "https://example.com/a", None).with_notify_on_no_change(notify)
    }

    #[test]
    fn unchanged_is_silent_by_default() {
        let (project, event) = policy().apply(&Outcome::Unchanged, quiet_project(false), t0());
        assert!(event.is_none());
        assert_eq!(project.last_notified_at, None);
    }

    #[test]
    fn unchanged_notices_are_throttled_to_the_floor() {
        let policy = policy();
        let (project, first) = policy.apply(&Outcome::Unchanged, quiet_project(true), t0());
        assert_eq!(first.map(|e| e.kind), Some(EventKind::UnchangedNotice));
        assert_eq!(project.last_notified_at, Some(t0()));

        let (project, second) = policy.apply(&Outcome::Unchanged, project, t0() + Duration::minutes(10));
        assert!(second.is_none());
        assert_eq!(project.last_notified_at, Some(t0()));

        let (project, third) = policy.apply(&Outcome::Unchanged, project, t0() + Duration::minutes(61));
        assert!(third.is_some());
        assert_eq!(project.last_notified_at, Some(t0() + Duration::minutes(61)));
    }

    #[test]
    fn changes_and_failures_always_notify_without_touching_throttle() {
        let policy = policy();
        let project = Project {
            last_notified_at: Some(t0()),
            ..quiet_project(false)
        };
        for outcome in [
            Outcome::FirstObservation,
            Outcome::Changed,
            Outcome::FetchFailed("HTTP 503".into()),
        ] {
            let (after, event) = policy.apply(&outcome, project.clone(), t0() + Duration::minutes(1));
            assert!(event.is_some(), "{} should notify", outcome.label());
            assert_eq!(after.last_notified_at, Some(t0()));
        }
    }

    #[test]
    fn event_timestamp_uses_display_offset() {
        let (_, event) = policy().apply(&Outcome::Changed, quiet_project(false), t0());
        let event = event.expect("changed notifies");
        assert_eq!(event.at.offset().local_minus_utc(), 3 * 3600);
        assert_eq!(event.at.naive_local().to_string(), "2024-10-21 12:00:00");
    }

    #[test]
    fn new_items_are_delivered_oldest_first() {
        let dated = |id: &str, hour: u32| FeedItem {
            id: Some(id.into()),
            title: id.into(),
            link: None,
            published_at: Some(Utc.with_ymd_and_hms(2024, 10, 21, hour, 0, 0).unwrap()),
        };
        let outcome = Outcome::FeedNewItems(vec![dated("c", 12), dated("a", 8), dated("b", 10)]);
        let (_, event) = policy().apply(&outcome, quiet_project(false), t0());
        match event.map(|e| e.kind) {
            Some(EventKind::NewFeedItems(items)) => {
                let ids: Vec<_> = items.iter().filter_map(|i| i.id.clone()).collect();
                assert_eq!(ids, vec!["a", "b", "c"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn undated_items_are_reversed_from_feed_order() {
        let undated = |id: &str| FeedItem {
            id: Some(id.into()),
            title: id.into(),
            link: None,
            published_at: None,
        };
        let ordered = oldest_first(&[undated("newest"), undated("older")]);
        assert_eq!(ordered[0].id.as_deref(), Some("older"));
    }
}
