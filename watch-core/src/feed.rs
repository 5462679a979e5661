use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeedItem {
    /// Feed-declared unique id (RSS `guid`, Atom `id`).
    pub id: Option<String>,
    pub title: String,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl FeedItem {
    pub fn from_rss_item(item: &rss::Item) -> Self {
        let published_at = item
            .pub_date()
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            id: item.guid().map(|guid| guid.value().to_owned()),
            title: item.title().unwrap_or_default().to_owned(),
            link: item.link().map(ToOwned::to_owned),
            published_at,
        }
    }

    pub fn from_atom_entry(entry: &atom_syndication::Entry) -> Self {
        // Prefer rel="alternate" (or the implicit default) over self/edit links.
        let link = entry
            .links()
            .iter()
            .find(|link| link.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|link| link.href().to_owned());

        let published_at = entry
            .published()
            .copied()
            .unwrap_or_else(|| *entry.updated())
            .with_timezone(&Utc);

        Self {
            id: Some(entry.id().to_owned()),
            title: entry.title().value.clone(),
            link,
            published_at: Some(published_at),
        }
    }

    /// Stable identity: the declared id, else the link. Titles never count.
    pub fn identity(&self) -> Option<&str> {
        self.id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or_else(|| {
                self.link
                    .as_deref()
                    .map(str::trim)
                    .filter(|link| !link.is_empty())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: Option<&str>, link: Option<&str>) -> FeedItem {
        FeedItem {
            id: id.map(Into::into),
            title: "t".into(),
            link: link.map(Into::into),
            published_at: None,
        }
    }

    #[test]
    fn identity_prefers_id_then_link() {
        assert_eq!(item(Some("a1"), Some("http://e/1")).identity(), Some("a1"));
        assert_eq!(item(None, Some("http://e/1")).identity(), Some("http://e/1"));
        assert_eq!(item(Some("  "), Some("http://e/1")).identity(), Some("http://e/1"));
        assert_eq!(item(None, None).identity(), None);
    }

    #[test]
    fn rss_item_conversion_reads_guid_and_date() {
        let channel = rss::Channel::read_from(
            &br#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>T</title><link>http://e/</link><description>d</description>
<item><title>A</title><link>http://e/1</link><guid>g-1</guid><pubDate>Mon, 21 Oct 2024 07:28:00 GMT</pubDate></item>
</channel></rss>"#[..],
        )
        .expect("valid rss");
        let parsed = FeedItem::from_rss_item(&channel.items()[0]);
        assert_eq!(parsed.id.as_deref(), Some("g-1"));
        assert_eq!(parsed.title, "A");
        assert_eq!(parsed.link.as_deref(), Some("http://e/1"));
        assert!(parsed.published_at.is_some());
    }
}
