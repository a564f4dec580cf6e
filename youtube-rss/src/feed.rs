//! Feed records and the sets that get reconciled between tt-rss and YouTube.
//!
//! A feed is identified by its URL alone. Two records that share a URL but
//! carry different titles are the same feed, so a channel rename on YouTube
//! never causes an unsubscribe/subscribe round trip in the reader.

use std::collections::BTreeMap;
use std::fmt;

const CHANNEL_FEED_BASE: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";

/// The RSS feed YouTube publishes for the channel with the given id.
pub fn channel_feed_url(channel_id: &str) -> String {
    format!("{CHANNEL_FEED_BASE}{channel_id}")
}

/// One subscribable feed: its URL and a human-readable title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedRecord {
    pub url: String,
    pub title: String,
}

impl FeedRecord {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

impl fmt::Display for FeedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.title, self.url)
    }
}

/// A set of feeds keyed by URL, iterated in URL order.
///
/// Inserting a record whose URL is already present keeps the existing record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedSet {
    by_url: BTreeMap<String, FeedRecord>,
}

impl FeedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a feed with the same URL was already in the set.
    pub fn insert(&mut self, record: FeedRecord) -> bool {
        if self.by_url.contains_key(&record.url) {
            return false;
        }
        self.by_url.insert(record.url.clone(), record);
        true
    }

    pub fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedRecord> {
        self.by_url.values()
    }
}

impl FromIterator<FeedRecord> for FeedSet {
    fn from_iter<I: IntoIterator<Item = FeedRecord>>(iter: I) -> Self {
        let mut set = Self::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl<'a> IntoIterator for &'a FeedSet {
    type Item = &'a FeedRecord;
    type IntoIter = std::collections::btree_map::Values<'a, String, FeedRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.by_url.values()
    }
}

/// The feed reader's internal identifier for a subscribed feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedId(pub i64);

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A feed that is currently subscribed in the reader.
///
/// Unsubscribing needs the reader's id rather than the URL, and the only way
/// to get hold of a `TrackedFeed` is to list the reader's feeds first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFeed {
    pub id: FeedId,
    pub record: FeedRecord,
}

/// The feeds filed under the reader's category, keyed by URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedFeeds {
    by_url: BTreeMap<String, TrackedFeed>,
}

impl TrackedFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a feed with the same URL was already tracked.
    pub fn insert(&mut self, feed: TrackedFeed) -> bool {
        if self.by_url.contains_key(&feed.record.url) {
            return false;
        }
        self.by_url.insert(feed.record.url.clone(), feed);
        true
    }

    pub fn get(&self, url: &str) -> Option<&TrackedFeed> {
        self.by_url.get(url)
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedFeed> {
        self.by_url.values()
    }
}

impl FromIterator<TrackedFeed> for TrackedFeeds {
    fn from_iter<I: IntoIterator<Item = TrackedFeed>>(iter: I) -> Self {
        let mut feeds = Self::new();
        for feed in iter {
            feeds.insert(feed);
        }
        feeds
    }
}
