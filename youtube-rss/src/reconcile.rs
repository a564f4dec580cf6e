//! Bringing the reader's category in line with the subscription source.
//!
//! Both sides are read in full, the difference is computed by feed URL, and
//! the reader is then mutated: every missing feed is subscribed, then every
//! surplus feed is unsubscribed. Nothing is retried. Running the pass again
//! against unchanged remote state issues no mutations at all.

use crate::feed::{FeedRecord, FeedSet, TrackedFeed, TrackedFeeds};
use eyre::Context;

/// The feed reader side of a reconciliation.
#[allow(async_fn_in_trait)]
pub trait FeedReader {
    /// Lists every feed filed under the reader's category.
    async fn list_feeds(&mut self) -> eyre::Result<TrackedFeeds>;

    /// Subscribes to `feed` under the reader's category.
    async fn subscribe(&mut self, feed: &FeedRecord) -> eyre::Result<()>;

    /// Removes a feed previously returned by [`FeedReader::list_feeds`].
    async fn unsubscribe(&mut self, feed: &TrackedFeed) -> eyre::Result<()>;
}

/// The side whose subscriptions the reader should mirror.
#[allow(async_fn_in_trait)]
pub trait SubscriptionSource {
    async fn list_subscriptions(&mut self) -> eyre::Result<FeedSet>;
}

/// The mutations needed to make the reader match the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Feeds the source has but the reader does not, in URL order.
    pub to_add: Vec<FeedRecord>,
    /// Feeds the reader has but the source does not, in URL order.
    pub to_remove: Vec<TrackedFeed>,
    /// Number of feeds present on both sides.
    pub unchanged: usize,
}

impl Plan {
    pub fn between(current: &TrackedFeeds, desired: &FeedSet) -> Self {
        let mut plan = Plan::default();

        for record in desired {
            match current.get(&record.url) {
                Some(tracked) => {
                    plan.unchanged += 1;
                    if tracked.record.title != record.title {
                        tracing::debug!(
                            feed_url = %record.url,
                            reader_title = %tracked.record.title,
                            source_title = %record.title,
                            "feed title differs, leaving subscription as is"
                        );
                    }
                }
                None => plan.to_add.push(record.clone()),
            }
        }

        plan.to_remove = current
            .iter()
            .filter(|tracked| !desired.contains(&tracked.record.url))
            .cloned()
            .collect();

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// What a reconciliation pass did (or, for a dry run, would have done).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub dry_run: bool,
}

/// Runs one reconciliation pass.
///
/// The reader is listed before the source, and all subscribes happen before
/// any unsubscribe. The first error from either side aborts the pass.
/// With `dry_run` set the plan is only logged.
pub async fn reconcile<R, S>(reader: &mut R, source: &mut S, dry_run: bool) -> eyre::Result<Summary>
where
    R: FeedReader,
    S: SubscriptionSource,
{
    let current = reader.list_feeds().await.context("list feeds in reader")?;
    let desired = source
        .list_subscriptions()
        .await
        .context("list subscriptions")?;

    let plan = Plan::between(&current, &desired);
    tracing::info!(
        current = current.len(),
        desired = desired.len(),
        to_add = plan.to_add.len(),
        to_remove = plan.to_remove.len(),
        "computed subscription changes"
    );

    let summary = Summary {
        added: plan.to_add.len(),
        removed: plan.to_remove.len(),
        unchanged: plan.unchanged,
        dry_run,
    };

    if plan.is_empty() {
        tracing::info!("reader already matches subscriptions");
        return Ok(summary);
    }

    if dry_run {
        for record in &plan.to_add {
            tracing::info!(feed_url = %record.url, title = %record.title, "would subscribe");
        }
        for tracked in &plan.to_remove {
            tracing::info!(
                feed_url = %tracked.record.url,
                title = %tracked.record.title,
                feed_id = %tracked.id,
                "would unsubscribe"
            );
        }
        return Ok(summary);
    }

    for record in &plan.to_add {
        tracing::info!(feed_url = %record.url, title = %record.title, "subscribing");
        reader
            .subscribe(record)
            .await
            .with_context(|| format!("subscribe to {record}"))?;
    }
    for tracked in &plan.to_remove {
        tracing::info!(
            feed_url = %tracked.record.url,
            title = %tracked.record.title,
            feed_id = %tracked.id,
            "unsubscribing"
        );
        reader
            .unsubscribe(tracked)
            .await
            .with_context(|| format!("unsubscribe from {}", tracked.record))?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FeedId;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// In-memory reader that applies mutations to its own state.
    #[derive(Debug, Default)]
    struct FakeReader {
        feeds: TrackedFeeds,
        next_id: i64,
        subscribed: Vec<FeedRecord>,
        unsubscribed: Vec<FeedId>,
    }

    impl FakeReader {
        fn with(records: &[(&str, &str)]) -> Self {
            let mut reader = Self::default();
            for (url, title) in records {
                reader.track(FeedRecord::new(*url, *title));
            }
            reader
        }

        fn track(&mut self, record: FeedRecord) {
            self.next_id += 1;
            self.feeds.insert(TrackedFeed {
                id: FeedId(self.next_id),
                record,
            });
        }

        fn mutations(&self) -> usize {
            self.subscribed.len() + self.unsubscribed.len()
        }
    }

    impl FeedReader for FakeReader {
        async fn list_feeds(&mut self) -> eyre::Result<TrackedFeeds> {
            Ok(self.feeds.clone())
        }

        async fn subscribe(&mut self, feed: &FeedRecord) -> eyre::Result<()> {
            self.subscribed.push(feed.clone());
            self.track(feed.clone());
            Ok(())
        }

        async fn unsubscribe(&mut self, feed: &TrackedFeed) -> eyre::Result<()> {
            self.unsubscribed.push(feed.id);
            self.feeds = self
                .feeds
                .iter()
                .filter(|f| f.id != feed.id)
                .cloned()
                .collect();
            Ok(())
        }
    }

    struct FakeSource(eyre::Result<FeedSet>);

    impl FakeSource {
        fn with(records: &[(&str, &str)]) -> Self {
            Self(Ok(records
                .iter()
                .map(|(url, title)| FeedRecord::new(*url, *title))
                .collect()))
        }
    }

    impl SubscriptionSource for FakeSource {
        async fn list_subscriptions(&mut self) -> eyre::Result<FeedSet> {
            match &self.0 {
                Ok(set) => Ok(set.clone()),
                Err(e) => Err(eyre::eyre!("{e}")),
            }
        }
    }

    #[tokio::test]
    async fn adds_missing_and_removes_surplus() {
        let mut reader = FakeReader::with(&[("urlA", "A"), ("urlB", "B")]);
        let mut source = FakeSource::with(&[("urlB", "B"), ("urlC", "C")]);

        let summary = reconcile(&mut reader, &mut source, false).await.unwrap();

        assert_eq!(reader.subscribed, [FeedRecord::new("urlC", "C")]);
        assert_eq!(reader.unsubscribed, [FeedId(1)]);
        assert_eq!(
            summary,
            Summary {
                added: 1,
                removed: 1,
                unchanged: 1,
                dry_run: false
            }
        );
    }

    #[tokio::test]
    async fn empty_reader_gets_every_subscription() {
        let mut reader = FakeReader::default();
        let mut source = FakeSource::with(&[("urlX", "X")]);

        reconcile(&mut reader, &mut source, false).await.unwrap();

        assert_eq!(reader.subscribed, [FeedRecord::new("urlX", "X")]);
        assert!(reader.unsubscribed.is_empty());
    }

    #[tokio::test]
    async fn empty_source_removes_every_feed() {
        let mut reader = FakeReader::with(&[("urlX", "X")]);
        let mut source = FakeSource::with(&[]);

        reconcile(&mut reader, &mut source, false).await.unwrap();

        assert!(reader.subscribed.is_empty());
        assert_eq!(reader.unsubscribed, [FeedId(1)]);
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let mut reader = FakeReader::with(&[("urlA", "A"), ("urlB", "B")]);
        let mut source = FakeSource::with(&[("urlB", "B"), ("urlC", "C"), ("urlD", "D")]);

        reconcile(&mut reader, &mut source, false).await.unwrap();
        let before = reader.mutations();

        let summary = reconcile(&mut reader, &mut source, false).await.unwrap();
        assert_eq!(reader.mutations(), before);
        assert_eq!(summary.added + summary.removed, 0);
        assert_eq!(summary.unchanged, 3);
    }

    #[tokio::test]
    async fn title_change_alone_causes_no_churn() {
        let mut reader = FakeReader::with(&[("urlA", "Old name")]);
        let mut source = FakeSource::with(&[("urlA", "New name")]);

        let summary = reconcile(&mut reader, &mut source, false).await.unwrap();

        assert_eq!(reader.mutations(), 0);
        assert_eq!(summary.unchanged, 1);
    }

    #[test]
    fn plan_is_empty_only_when_nothing_changes() {
        let mut current = TrackedFeeds::new();
        current.insert(TrackedFeed {
            id: FeedId(1),
            record: FeedRecord::new("urlA", "A"),
        });

        let mut desired = FeedSet::new();
        desired.insert(FeedRecord::new("urlA", "A renamed"));
        assert!(Plan::between(&current, &desired).is_empty());

        desired.insert(FeedRecord::new("urlB", "B"));
        assert!(!Plan::between(&current, &desired).is_empty());
        assert!(!Plan::between(&current, &FeedSet::new()).is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let mut reader = FakeReader::with(&[("urlA", "A")]);
        let mut source = FakeSource::with(&[("urlB", "B")]);

        let summary = reconcile(&mut reader, &mut source, true).await.unwrap();

        assert_eq!(reader.mutations(), 0);
        assert_eq!((summary.added, summary.removed), (1, 1));
        assert!(summary.dry_run);
    }

    #[tokio::test]
    async fn source_failure_aborts_before_any_mutation() {
        let mut reader = FakeReader::with(&[("urlA", "A")]);
        let mut source = FakeSource(Err(eyre::eyre!("quota exceeded")));

        let err = reconcile(&mut reader, &mut source, false)
            .await
            .unwrap_err();

        assert_eq!(reader.mutations(), 0);
        assert!(format!("{err:#}").contains("quota exceeded"));
    }

    fn tracked(urls: &std::collections::BTreeSet<String>) -> TrackedFeeds {
        urls.iter()
            .enumerate()
            .map(|(i, url)| TrackedFeed {
                id: FeedId(i as i64),
                record: FeedRecord::new(url.clone(), url.to_uppercase()),
            })
            .collect()
    }

    proptest! {
        #[test]
        fn plan_is_the_symmetric_difference(
            current in proptest::collection::btree_set("[a-f]", 0..6),
            desired in proptest::collection::btree_set("[a-f]", 0..6),
        ) {
            let plan = Plan::between(
                &tracked(&current),
                &desired.iter().map(|url| FeedRecord::new(url.clone(), "t")).collect(),
            );

            let added: Vec<_> = plan.to_add.iter().map(|r| r.url.clone()).collect();
            let removed: Vec<_> = plan.to_remove.iter().map(|t| t.record.url.clone()).collect();
            let expect_added: Vec<_> = desired.difference(&current).cloned().collect();
            let expect_removed: Vec<_> = current.difference(&desired).cloned().collect();

            prop_assert_eq!(added, expect_added);
            prop_assert_eq!(removed, expect_removed);
            prop_assert_eq!(plan.unchanged, current.intersection(&desired).count());
        }
    }
}
