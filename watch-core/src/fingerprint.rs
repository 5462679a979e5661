//! Content and feed fingerprints.
//!
//! A page is reduced to a SHA-256 digest of its raw bytes; a feed is reduced
//! to the ordered, de-duplicated list of its item identities.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::feed::FeedItem;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint_content(content: &[u8]) -> ContentDigest {
    let mut hasher = Sha256::new();
    hasher.update(content);
    ContentDigest(hex::encode(hasher.finalize()))
}

/// Identities of `items` in feed order, first occurrence wins.
///
/// Items without an id or link have no identity and are left out.
pub fn fingerprint_feed_items(items: &[FeedItem]) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(FeedItem::identity)
        .filter(|id| seen.insert(*id))
        .map(ToOwned::to_owned)
        .collect()
}

/// Items whose identity is absent from `known`, in feed order.
pub fn new_feed_items(items: &[FeedItem], known: &[String]) -> Vec<FeedItem> {
    let known: HashSet<&str> = known.iter().map(String::as_str).collect();
    let mut emitted = HashSet::new();
    items
        .iter()
        .filter(|item| match item.identity() {
            Some(id) => !known.contains(id) && emitted.insert(id),
            None => false,
        })
        .cloned()
        .collect()
}
