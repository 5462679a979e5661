use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{redirect, Client, ClientBuilder};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::config::RetrievalSettings;
use crate::error::RetrievalError;
use crate::feed::FeedItem;
use crate::retrieval::Retriever;

const FEED_MIME_TYPES: [&str; 3] = [
    "application/rss+xml",
    "application/atom+xml",
    "application/feed+xml",
];

/// Plain HTTP client strategy: bounded retries with linear backoff.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: Client,
    settings: RetrievalSettings,
}

impl HttpRetriever {
    pub fn new(settings: RetrievalSettings) -> Result<Self, RetrievalError> {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::limited(settings.max_redirects))
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn with_client(client: Client, settings: RetrievalSettings) -> Self {
        Self { client, settings }
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes, RetrievalError> {
        let attempts = u32::from(self.settings.retry_attempts.max(1));
        let mut attempt = 1;
        loop {
            match self.get_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) if attempt < attempts && is_retryable(&err) => {
                    let backoff = Duration::from_millis(self.settings.retry_backoff_ms * u64::from(attempt));
                    debug!(url = %url, attempt, error = %err, "retrying request");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<Bytes, RetrievalError> {
        let response = self.client.get(url).send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status(status.as_u16()));
        }
        response.bytes().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> RetrievalError {
        if err.is_timeout() {
            RetrievalError::Timeout(self.settings.request_timeout_seconds)
        } else {
            RetrievalError::Network(err)
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_raw_content(&self, locator: &str) -> Result<Bytes, RetrievalError> {
        self.get_bytes(locator).await
    }

    async fn discover_feed(&self, locator: &str) -> Option<String> {
        let body = match self.get_bytes(locator).await {
            Ok(body) => body,
            Err(err) => {
                debug!(url = %locator, error = %err, "feed discovery skipped");
                return None;
            }
        };
        // the locator may already be a feed
        if parse_feed(&body).is_ok() {
            return Some(locator.to_owned());
        }
        find_feed_link(&String::from_utf8_lossy(&body), locator)
    }

    async fn fetch_feed(&self, feed_locator: &str) -> Result<Vec<FeedItem>, RetrievalError> {
        let body = self.get_bytes(feed_locator).await?;
        parse_feed(&body).map_err(|err| {
            warn!(feed = %feed_locator, error = %err, "feed could not be parsed");
            err
        })
    }
}

fn is_retryable(err: &RetrievalError) -> bool {
    match err {
        RetrievalError::Status(code) => *code == 429 || *code >= 500,
        RetrievalError::Network(_) | RetrievalError::Timeout(_) => true,
        RetrievalError::Parse(_) | RetrievalError::NoStrategy => false,
    }
}

/// RSS 2.0 first, then Atom.
pub fn parse_feed(body: &[u8]) -> Result<Vec<FeedItem>, RetrievalError> {
    match rss::Channel::read_from(body) {
        Ok(channel) => Ok(channel.items().iter().map(FeedItem::from_rss_item).collect()),
        Err(rss_err) => match atom_syndication::Feed::read_from(body) {
            Ok(feed) => Ok(feed.entries().iter().map(FeedItem::from_atom_entry).collect()),
            Err(atom_err) => Err(RetrievalError::Parse(format!(
                "not RSS ({rss_err}) nor Atom ({atom_err})"
            ))),
        },
    }
}

/// First `<link rel="alternate">` advertising a feed type, resolved against `base`.
pub fn find_feed_link(html: &str, base: &str) -> Option<String> {
    let selector = Selector::parse(r#"link[rel~="alternate"][href]"#).ok()?;
    let document = Html::parse_document(html);
    let href = document.select(&selector).find_map(|element| {
        let kind = element.value().attr("type")?.trim().to_ascii_lowercase();
        if FEED_MIME_TYPES.contains(&kind.as_str()) {
            element.value().attr("href")
        } else {
            None
        }
    })?;
    let resolved = Url::parse(base).and_then(|base| base.join(href.trim())).ok()?;
    Some(resolved.to_string())
}
