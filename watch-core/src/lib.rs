pub mod config;
pub mod detector;
pub mod error;
pub mod feed;
pub mod fingerprint;
pub mod http;
pub mod monitor;
pub mod notify;
pub mod project;
pub mod retrieval;
pub mod scheduler;
pub mod store;

pub use config::{RetrievalSettings, SchedulerSettings, WatchConfig};
pub use detector::{decide, observe, Observation, Outcome, ProjectPatch, Verdict};
pub use error::{ConfigError, CycleError, RetrievalError, WatchError};
pub use feed::FeedItem;
pub use fingerprint::{fingerprint_content, fingerprint_feed_items, ContentDigest};
pub use http::HttpRetriever;
pub use monitor::{Monitor, ProjectStatus};
pub use notify::{EventKind, NotificationPolicy, WatchEvent};
pub use project::{OwnerId, Project, ProjectId};
pub use retrieval::{RetrievalChain, Retriever};
pub use scheduler::Scheduler;
pub use store::ProjectStore;
