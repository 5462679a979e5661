use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::RetrievalError;
use crate::feed::FeedItem;

/// Everything the engine needs from the network.
///
/// Implementations may retry internally but must report ordinary network or
/// anti-bot failures as values, never by panicking.
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_raw_content(&self, locator: &str) -> Result<Bytes, RetrievalError>;

    /// Locate a feed published for `locator`, if any.
    async fn discover_feed(&self, locator: &str) -> Option<String>;

    /// Items in the order the feed lists them.
    async fn fetch_feed(&self, feed_locator: &str) -> Result<Vec<FeedItem>, RetrievalError>;
}

/// Ordered fallback over several strategies.
///
/// The first strategy that succeeds answers; callers never learn which one it
/// was. When all fail the last error is returned.
#[derive(Clone, Default)]
pub struct RetrievalChain {
    strategies: Vec<Arc<dyn Retriever>>,
}

impl RetrievalChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Retriever>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[async_trait]
impl Retriever for RetrievalChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn fetch_raw_content(&self, locator: &str) -> Result<Bytes, RetrievalError> {
        let mut last_err = RetrievalError::NoStrategy;
        for strategy in &self.strategies {
            match strategy.fetch_raw_content(locator).await {
                Ok(content) => {
                    debug!(strategy = strategy.name(), url = %locator, "content fetched");
                    return Ok(content);
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), url = %locator, error = %err, "strategy failed to fetch content");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn discover_feed(&self, locator: &str) -> Option<String> {
        for strategy in &self.strategies {
            if let Some(feed) = strategy.discover_feed(locator).await {
                debug!(strategy = strategy.name(), url = %locator, feed = %feed, "feed discovered");
                return Some(feed);
            }
        }
        None
    }

    async fn fetch_feed(&self, feed_locator: &str) -> Result<Vec<FeedItem>, RetrievalError> {
        let mut last_err = RetrievalError::NoStrategy;
        for strategy in &self.strategies {
            match strategy.fetch_feed(feed_locator).await {
                Ok(items) => return Ok(items),
                Err(err) => {
                    warn!(strategy = strategy.name(), feed = %feed_locator, error = %err, "strategy failed to fetch feed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        content: Option<&'static str>,
        feed: Option<&'static str>,
    }

    #[async_trait]
    impl Retriever for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_raw_content(&self, _locator: &str) -> Result<Bytes, RetrievalError> {
            self.content
                .map(|s| Bytes::from_static(s.as_bytes()))
                .ok_or(RetrievalError::Status(403))
        }

        async fn discover_feed(&self, _locator: &str) -> Option<String> {
            self.feed.map(ToOwned::to_owned)
        }

        async fn fetch_feed(&self, _feed_locator: &str) -> Result<Vec<FeedItem>, RetrievalError> {
            Err(RetrievalError::Status(503))
        }
    }

    #[tokio::test]
    async fn chain_falls_through_to_next_strategy() {
        let chain = RetrievalChain::new()
            .with_strategy(Arc::new(Fixed { name: "plain", content: None, feed: None }))
            .with_strategy(Arc::new(Fixed { name: "bypass", content: Some("ok"), feed: Some("http://e/feed") }));

        let content = chain.fetch_raw_content("http://e/").await.expect("second strategy answers");
        assert_eq!(&content[..], b"ok");
        assert_eq!(chain.discover_feed("http://e/").await.as_deref(), Some("http://e/feed"));
    }

    #[tokio::test]
    async fn chain_reports_last_error_when_all_fail() {
        let chain = RetrievalChain::new()
            .with_strategy(Arc::new(Fixed { name: "plain", content: None, feed: None }));
        assert!(matches!(
            chain.fetch_feed("http://e/feed").await,
            Err(RetrievalError::Status(503))
        ));
        assert!(matches!(
            RetrievalChain::new().fetch_raw_content("http://e/").await,
            Err(RetrievalError::NoStrategy)
        ));
    }
}
