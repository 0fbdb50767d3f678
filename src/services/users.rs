//! Author metadata cache and the batching resolver stage that owns it.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::index::send;
use super::{RateLimitedFetcher, WikiApi};
use crate::error::{AppError, Result};
use crate::models::{ANONYMOUS_ID, AuthorData, ProcessContext, RevisionMeta, UserBatch};
use crate::pipeline::{Counter, Metrics};
use crate::storage::DumpStorage;

const STAGE: &str = "user_metadata";

/// Persistent mapping from author id to author metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMetadataCache {
    users: BTreeMap<u64, AuthorData>,
}

impl UserMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from storage; a missing or empty cache file starts empty.
    pub async fn load(storage: &DumpStorage) -> Result<Self> {
        let users = storage.load_users().await?;
        log::info!("Loaded {} cached authors", users.len());
        Ok(Self { users })
    }

    pub async fn save(&self, storage: &DumpStorage) -> Result<()> {
        storage.save_users(&self.users).await?;
        log::info!("Saved {} cached authors", self.users.len());
        Ok(())
    }

    pub fn get(&self, user_id: u64) -> Option<&AuthorData> {
        self.users.get(&user_id)
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn insert(&mut self, author: AuthorData) {
        self.users.insert(author.user_id, author);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// Resolves the author of every incoming revision, batching cache misses.
///
/// Sole writer of the cache while it runs. Revisions leave in the order
/// they arrived, each paired with an author already resident in the cache.
pub struct AuthorResolver {
    api: WikiApi,
    fetcher: Arc<RateLimitedFetcher>,
    cache: UserMetadataCache,
    batch_size: usize,
    /// Held revisions that force an early flush of a partial miss batch
    max_waiting: usize,
    /// Ids queued in the current miss batch
    in_flight: HashSet<u64>,
    /// Miss batch in first-seen order
    misses: Vec<u64>,
    /// Revisions waiting for their authors
    waiting: Vec<RevisionMeta>,
}

impl AuthorResolver {
    pub fn new(
        api: WikiApi,
        fetcher: Arc<RateLimitedFetcher>,
        cache: UserMetadataCache,
        batch_size: usize,
        max_waiting: usize,
    ) -> Self {
        Self {
            api,
            fetcher,
            cache,
            batch_size: batch_size.max(1),
            max_waiting: max_waiting.max(1),
            in_flight: HashSet::new(),
            misses: Vec::new(),
            waiting: Vec::new(),
        }
    }

    /// Note a revision's author, queueing it for lookup on a cache miss.
    ///
    /// Returns true once the miss batch is full, or once too many revisions
    /// are held behind a partial one.
    pub fn observe(&mut self, meta: RevisionMeta, metrics: &Metrics) -> bool {
        let user_id = meta.user_id;
        if user_id != ANONYMOUS_ID {
            if self.cache.contains(user_id) {
                metrics.incr(Counter::UserCacheHits);
            } else if self.in_flight.insert(user_id) {
                self.misses.push(user_id);
            }
        }
        self.waiting.push(meta);
        self.misses.len() >= self.batch_size
            || (!self.misses.is_empty() && self.waiting.len() >= self.max_waiting)
    }

    /// Number of revisions held back for their authors.
    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }

    /// Ids queued for the next lookup, in first-seen order.
    pub fn pending_misses(&self) -> &[u64] {
        &self.misses
    }

    /// Look up the queued misses in one request and cache the results.
    pub async fn flush_misses(&mut self, metrics: &Metrics) -> Result<()> {
        if self.misses.is_empty() {
            return Ok(());
        }

        let ids = std::mem::take(&mut self.misses);
        let batch: UserBatch = self.fetcher.get_json(STAGE, self.api.users_url(&ids)).await?;
        metrics.incr(Counter::UserRequests);

        let users = batch.into_users()?;
        log::debug!("Fetched {} authors for {} requested ids", users.len(), ids.len());
        metrics.add(Counter::UsersFetched, users.len() as u64);
        for author in users {
            self.cache.insert(author);
        }
        self.in_flight.clear();
        Ok(())
    }

    /// Drain waiting revisions whose authors are all resolved.
    fn take_resolved(&mut self) -> Result<Vec<ProcessContext>> {
        if !self.misses.is_empty() {
            return Ok(Vec::new());
        }
        let waiting = std::mem::take(&mut self.waiting);
        waiting
            .into_iter()
            .map(|meta| {
                let user = self.resolve(&meta)?;
                Ok(ProcessContext { meta, user })
            })
            .collect()
    }

    fn resolve(&self, meta: &RevisionMeta) -> Result<AuthorData> {
        if meta.user_id == ANONYMOUS_ID {
            return Ok(AuthorData::anonymous(meta.user.clone()));
        }
        self.cache.get(meta.user_id).cloned().ok_or_else(|| {
            AppError::invariant(format!(
                "author {} of revision {} is not cached",
                meta.user_id, meta.rev_id
            ))
        })
    }

    async fn forward(
        &mut self,
        output: &mpsc::Sender<ProcessContext>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for context in self.take_resolved()? {
            send(output, context, cancel).await?;
        }
        Ok(())
    }

    async fn resolve_all(
        &mut self,
        input: &mut mpsc::Receiver<RevisionMeta>,
        output: &mpsc::Sender<ProcessContext>,
        cancel: &CancellationToken,
        metrics: &Metrics,
    ) -> Result<()> {
        loop {
            let meta = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                meta = input.recv() => meta,
            };
            match meta {
                Some(meta) => {
                    if self.observe(meta, metrics) {
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(AppError::Cancelled),
                            flushed = self.flush_misses(metrics) => flushed?,
                        }
                    }
                }
                None => {
                    self.flush_misses(metrics).await?;
                    self.forward(output, cancel).await?;
                    return Ok(());
                }
            }
            self.forward(output, cancel).await?;
        }
    }

    /// Run the resolver stage until its input ends or cancellation fires.
    ///
    /// The cache is saved to storage on every exit path, then the resolver's
    /// own outcome is returned.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<RevisionMeta>,
        output: mpsc::Sender<ProcessContext>,
        storage: DumpStorage,
        cancel: CancellationToken,
        metrics: Arc<Metrics>,
    ) -> Result<()> {
        metrics.add(Counter::UsersCachedAtStart, self.cache.len() as u64);

        let outcome = self
            .resolve_all(&mut input, &output, &cancel, &metrics)
            .await;
        drop(output);

        self.cache.save(&storage).await?;
        log::info!("Author resolver stopped");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use url::Url;

    fn resolver(cache: UserMetadataCache, batch_size: usize) -> AuthorResolver {
        resolver_at("http://127.0.0.1:9/api.php", cache, batch_size, 100)
    }

    fn resolver_at(
        root: &str,
        cache: UserMetadataCache,
        batch_size: usize,
        max_waiting: usize,
    ) -> AuthorResolver {
        AuthorResolver::new(
            WikiApi::new(Url::parse(root).unwrap()),
            Arc::new(RateLimitedFetcher::new(
                reqwest::Client::new(),
                Duration::from_millis(1),
            )),
            cache,
            batch_size,
            max_waiting,
        )
    }

    fn meta(rev_id: u64, user_id: u64) -> RevisionMeta {
        serde_json::from_value(serde_json::json!({
            "revid": rev_id, "parentid": 0, "timestamp": "2005-05-05T00:00:00Z",
            "user": format!("u{user_id}"), "userid": user_id
        }))
        .unwrap()
    }

    fn author(user_id: u64) -> AuthorData {
        serde_json::from_value(serde_json::json!({"userid": user_id, "name": "c"})).unwrap()
    }

    #[test]
    fn test_misses_are_deduplicated_in_first_seen_order() {
        let metrics = Metrics::new();
        let mut cached = UserMetadataCache::new();
        cached.insert(author(7));
        let mut resolver = resolver(cached, 49);

        for (rev, user) in [(1, 5), (2, 3), (3, 5), (4, 9), (5, 7), (6, 3)] {
            resolver.observe(meta(rev, user), &metrics);
        }

        assert_eq!(resolver.pending_misses(), &[5, 3, 9]);
        assert_eq!(metrics.get(Counter::UserCacheHits), 1);
    }

    #[test]
    fn test_observe_reports_full_batch() {
        let metrics = Metrics::new();
        let mut resolver = resolver(UserMetadataCache::new(), 2);
        assert!(!resolver.observe(meta(1, 10), &metrics));
        assert!(!resolver.observe(meta(2, 10), &metrics));
        assert!(resolver.observe(meta(3, 11), &metrics));
    }

    #[test]
    fn test_anonymous_authors_need_no_lookup() {
        let metrics = Metrics::new();
        let mut resolver = resolver(UserMetadataCache::new(), 49);
        resolver.observe(meta(1, 0), &metrics);
        assert!(resolver.pending_misses().is_empty());

        let resolved = resolver.take_resolved().unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].user.groups.contains("*"));
        assert_eq!(resolved[0].user.name, "u0");
    }

    #[test]
    fn test_waiting_revisions_held_until_flush() {
        let metrics = Metrics::new();
        let mut cached = UserMetadataCache::new();
        cached.insert(author(1));
        let mut resolver = resolver(cached, 49);

        resolver.observe(meta(1, 1), &metrics);
        resolver.observe(meta(2, 2), &metrics);
        assert!(resolver.take_resolved().unwrap().is_empty());

        resolver.misses.clear();
        let err = resolver.take_resolved().unwrap_err();
        assert!(matches!(err, AppError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_held_revisions_stay_bounded_behind_one_miss() {
        use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"users": [{"userid": 2, "name": "New", "groups": ["user"]}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let metrics = Metrics::new();
        let mut cached = UserMetadataCache::new();
        cached.insert(author(1));
        let mut resolver = resolver_at(&format!("{}/api.php", server.uri()), cached, 49, 100);

        let mut released = 0;
        resolver.observe(meta(1, 2), &metrics);
        for rev in 2..=1000 {
            if resolver.observe(meta(rev, 1), &metrics) {
                resolver.flush_misses(&metrics).await.unwrap();
            }
            released += resolver.take_resolved().unwrap().len();
            assert!(resolver.waiting() <= 100);
        }

        assert_eq!(released, 1000);
        assert!(resolver.pending_misses().is_empty());
        assert!(resolver.cache.contains(2));
    }
}
