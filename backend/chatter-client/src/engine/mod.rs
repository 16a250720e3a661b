//! Feed synchronization engine
//!
//! Owns the in-memory feed and is the only component allowed to change it.
//! Two sources write to the feed: the periodic refresh (full replace from a
//! server snapshot) and optimistic local mutations confirmed by the gateway.
//!
//! Every write happens under one short, synchronous lock section that builds
//! the new state before publishing it, so readers never observe a partially
//! applied change. No lock is held across an `.await`.
//!
//! Ordering: results are applied in the order they *complete*, not the order
//! they were started. A refresh that started before a create and resolves
//! after it will replace the feed with a snapshot that may not contain the
//! new post; [`ReconcilePolicy`] decides how that race is handled.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{FeedError, GatewayError, Result};
use crate::gateway::FeedGateway;
use crate::identity::Identity;
use crate::models::transport::ContentRequest;
use crate::models::{Post, PostDraft};

mod pending;

pub use pending::ReconcilePolicy;
use pending::PendingMutations;

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reconcile_policy: ReconcilePolicy,
    /// Buffer size of the event channel; slow subscribers lag past this
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_policy: ReconcilePolicy::FullReplace,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// The feed as the UI sees it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    pub posts: Vec<Post>,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot applied; `count` posts are now in the feed
    Applied { count: usize },
    /// Another refresh was already in flight
    Skipped,
    /// Gateway failed; the feed is unchanged
    Failed(GatewayError),
    /// The engine was shut down, or a newer snapshot was already applied
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    NotFound,
    Discarded,
}

/// Change notifications for renderers and observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Refreshed {
        count: usize,
        at: DateTime<Utc>,
    },
    RefreshFailed {
        message: String,
    },
    Created {
        post_id: String,
    },
    Updated {
        post_id: String,
    },
    Deleted {
        post_id: String,
    },
    MutationFailed {
        operation: &'static str,
        message: String,
    },
}

pub type ErrorObserver = Arc<dyn Fn(&FeedError) + Send + Sync>;

struct Store {
    state: FeedState,
    pending: PendingMutations,
    /// Sequence number of the last snapshot applied
    applied_seq: u64,
}

struct EngineInner {
    gateway: Arc<dyn FeedGateway>,
    config: EngineConfig,
    store: RwLock<Store>,
    refresh_gate: Mutex<()>,
    refresh_seq: AtomicU64,
    live: AtomicBool,
    events: broadcast::Sender<FeedEvent>,
    observers: RwLock<Vec<ErrorObserver>>,
}

/// Handle to the feed engine; clones share the same feed
#[derive(Clone)]
pub struct FeedEngine {
    inner: Arc<EngineInner>,
}

impl FeedEngine {
    pub fn new(gateway: Arc<dyn FeedGateway>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(EngineInner {
                gateway,
                config,
                store: RwLock::new(Store {
                    state: FeedState::default(),
                    pending: PendingMutations::default(),
                    applied_seq: 0,
                }),
                refresh_gate: Mutex::new(()),
                refresh_seq: AtomicU64::new(0),
                live: AtomicBool::new(true),
                events,
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn gateway(&self) -> Arc<dyn FeedGateway> {
        Arc::clone(&self.inner.gateway)
    }

    pub fn reconcile_policy(&self) -> ReconcilePolicy {
        self.inner.config.reconcile_policy
    }

    /// Consistent copy of the whole feed state
    pub fn state(&self) -> FeedState {
        self.inner.store.read().state.clone()
    }

    pub fn snapshot(&self) -> Vec<Post> {
        self.inner.store.read().state.posts.clone()
    }

    pub fn get(&self, post_id: &str) -> Option<Post> {
        self.inner
            .store
            .read()
            .state
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.store.read().state.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.store.read().state.last_refresh
    }

    /// Number of optimistic mutations the server has not reflected yet
    pub fn pending_len(&self) -> usize {
        self.inner.store.read().pending.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.events.subscribe()
    }

    /// Register a callback for every failure the engine reports, including
    /// refresh failures that are otherwise swallowed.
    pub fn on_error<F>(&self, observer: F)
    where
        F: Fn(&FeedError) + Send + Sync + 'static,
    {
        self.inner.observers.write().push(Arc::new(observer));
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Stop accepting results. Operations still in flight complete against
    /// the gateway but their results are dropped.
    pub fn shutdown(&self) {
        if self.inner.live.swap(false, Ordering::AcqRel) {
            info!("Feed engine shut down");
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_live() {
            Ok(())
        } else {
            Err(FeedError::Closed)
        }
    }

    fn emit(&self, event: FeedEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn notify(&self, err: &FeedError) {
        let observers = self.inner.observers.read().clone();
        for observer in observers {
            observer(err);
        }
    }

    /// Report a failed mutation to observers and subscribers, then hand it back
    fn fail(&self, operation: &'static str, err: FeedError) -> FeedError {
        warn!(operation, error = %err, "Feed mutation failed");
        self.notify(&err);
        self.emit(FeedEvent::MutationFailed {
            operation,
            message: err.to_string(),
        });
        err
    }

    /// Fetch a snapshot and replace the feed with it.
    ///
    /// Never fails: gateway errors leave the feed untouched and are reported
    /// through logs, observers and a [`FeedEvent::RefreshFailed`] event.
    pub async fn refresh(&self) -> RefreshOutcome {
        if !self.is_live() {
            return RefreshOutcome::Discarded;
        }

        let _gate = match self.inner.refresh_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                debug!("Refresh already in flight, skipping");
                return RefreshOutcome::Skipped;
            }
        };

        let seq = self.inner.refresh_seq.fetch_add(1, Ordering::AcqRel) + 1;
        let result = self.inner.gateway.list_posts().await;

        if !self.is_live() {
            debug!(seq, "Discarding refresh result after shutdown");
            return RefreshOutcome::Discarded;
        }

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "Feed refresh failed");
                self.notify(&FeedError::Gateway(err.clone()));
                self.emit(FeedEvent::RefreshFailed {
                    message: err.to_string(),
                });
                return RefreshOutcome::Failed(err);
            }
        };

        let now = Utc::now();
        let count = {
            let mut store = self.inner.store.write();
            if seq <= store.applied_seq {
                debug!(seq, applied = store.applied_seq, "Discarding stale snapshot");
                return RefreshOutcome::Discarded;
            }
            let posts =
                store
                    .pending
                    .reconcile(snapshot, self.inner.config.reconcile_policy, Instant::now());
            let count = posts.len();
            store.state = FeedState {
                posts,
                last_refresh: Some(now),
            };
            store.applied_seq = seq;
            count
        };

        info!(count, refreshed_at = %now, "Feed refreshed");
        self.emit(FeedEvent::Refreshed { count, at: now });
        RefreshOutcome::Applied { count }
    }

    /// Create a post through the gateway and append the confirmed post.
    ///
    /// The feed is only touched after the gateway confirms; on failure it is
    /// exactly as before the call.
    pub async fn apply_create(&self, identity: &Identity, draft: PostDraft) -> Result<Post> {
        self.ensure_live()?;

        let session = match identity.session() {
            Some(session) => session,
            None => {
                return Err(self.fail(
                    "create",
                    FeedError::Unauthorized("log in to create a post".to_string()),
                ))
            }
        };
        if let Err(reason) = draft.validate() {
            return Err(self.fail("create", FeedError::Validation(reason)));
        }

        let request = ContentRequest {
            userinput: draft.body.clone(),
            category_id: draft.category_id.clone(),
            user_id: session.user_id().to_string(),
            username: session.username().to_string(),
        };

        let post_id = match self.inner.gateway.create_post(request).await {
            Ok(id) => id,
            Err(err) => return Err(self.fail("create", err.into())),
        };
        self.ensure_live()?;

        let post = Post {
            id: post_id,
            author_id: session.user_id().to_string(),
            author_username: session.username().to_string(),
            body: draft.body,
            category_id: draft.category_id,
            comments: Vec::new(),
        };

        {
            let mut store = self.inner.store.write();
            let posts = &mut store.state.posts;
            match posts.iter_mut().find(|p| p.id == post.id) {
                // a refresh already delivered it
                Some(existing) => *existing = post.clone(),
                None => posts.push(post.clone()),
            }
            if self.inner.config.reconcile_policy.preserves_pending() {
                store.pending.record_create(post.clone(), Instant::now());
            }
        }

        info!(post_id = %post.id, "Post created");
        self.emit(FeedEvent::Created {
            post_id: post.id.clone(),
        });
        Ok(post)
    }

    /// Replace the post with the same id, keeping its position.
    pub fn apply_update(&self, post: Post) -> MutationOutcome {
        if !self.is_live() {
            return MutationOutcome::Discarded;
        }

        let post_id = post.id.clone();
        {
            let mut store = self.inner.store.write();
            match store.state.posts.iter_mut().find(|p| p.id == post.id) {
                Some(existing) => *existing = post.clone(),
                None => {
                    debug!(post_id = %post_id, "Update target not in feed");
                    return MutationOutcome::NotFound;
                }
            }
            if self.inner.config.reconcile_policy.preserves_pending() {
                store.pending.record_update(post, Instant::now());
            }
        }

        debug!(post_id = %post_id, "Post updated");
        self.emit(FeedEvent::Updated { post_id });
        MutationOutcome::Applied
    }

    /// Remove the post with `post_id`. Removing an absent id is a no-op.
    pub fn apply_delete(&self, post_id: &str) -> MutationOutcome {
        if !self.is_live() {
            return MutationOutcome::Discarded;
        }

        {
            let mut store = self.inner.store.write();
            let before = store.state.posts.len();
            store.state.posts.retain(|p| p.id != post_id);
            if store.state.posts.len() == before {
                debug!(post_id, "Delete target not in feed");
                return MutationOutcome::NotFound;
            }
            if self.inner.config.reconcile_policy.preserves_pending() {
                store.pending.record_delete(post_id, Instant::now());
            }
        }

        debug!(post_id, "Post deleted");
        self.emit(FeedEvent::Deleted {
            post_id: post_id.to_string(),
        });
        MutationOutcome::Applied
    }

    /// Authorize against the held post, persist the edit, then apply it.
    pub async fn submit_update(&self, identity: &Identity, post: Post) -> Result<()> {
        self.ensure_live()?;

        let current = match self.get(&post.id) {
            Some(current) => current,
            None => return Err(self.fail("update", FeedError::NotFound(post.id))),
        };
        let session = match identity.session() {
            Some(session) if identity.can_modify(&current) && identity.can_modify(&post) => {
                session
            }
            _ => {
                return Err(self.fail(
                    "update",
                    FeedError::Unauthorized(format!("cannot modify post {}", post.id)),
                ))
            }
        };
        if post.body.trim().is_empty() {
            return Err(self.fail(
                "update",
                FeedError::Validation("post body must not be empty".to_string()),
            ));
        }

        let request = ContentRequest {
            userinput: post.body.clone(),
            category_id: post.category_id.clone(),
            user_id: session.user_id().to_string(),
            username: session.username().to_string(),
        };
        if let Err(err) = self.inner.gateway.update_post(&post.id, request).await {
            return Err(self.fail("update", err.into()));
        }

        let post_id = post.id.clone();
        match self.apply_update(post) {
            MutationOutcome::Applied => Ok(()),
            MutationOutcome::NotFound => Err(FeedError::NotFound(post_id)),
            MutationOutcome::Discarded => Err(FeedError::Closed),
        }
    }

    /// Authorize against the held post, delete it remotely, then locally.
    pub async fn submit_delete(&self, identity: &Identity, post_id: &str) -> Result<()> {
        self.ensure_live()?;

        let current = match self.get(post_id) {
            Some(current) => current,
            None => return Err(self.fail("delete", FeedError::NotFound(post_id.to_string()))),
        };
        if !identity.can_modify(&current) {
            return Err(self.fail(
                "delete",
                FeedError::Unauthorized(format!("cannot modify post {}", post_id)),
            ));
        }

        if let Err(err) = self.inner.gateway.delete_post(post_id).await {
            return Err(self.fail("delete", err.into()));
        }

        match self.apply_delete(post_id) {
            // a refresh may have dropped it while the request was in flight
            MutationOutcome::Applied | MutationOutcome::NotFound => Ok(()),
            MutationOutcome::Discarded => Err(FeedError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockFeedGateway;
    use crate::identity::Session;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn post(id: &str, author: &str, body: &str) -> Post {
        Post {
            id: id.into(),
            author_id: format!("id-{}", author),
            author_username: author.into(),
            body: body.into(),
            category_id: "c1".into(),
            comments: vec![],
        }
    }

    fn alice() -> Identity {
        Identity::logged_in(Session::new("id-alice", "alice").unwrap())
    }

    fn engine_with(mock: MockFeedGateway) -> FeedEngine {
        FeedEngine::new(Arc::new(mock), EngineConfig::default())
    }

    async fn seeded(mut mock: MockFeedGateway, posts: Vec<Post>) -> FeedEngine {
        mock.expect_list_posts()
            .times(1)
            .returning(move || Ok(posts.clone()));
        let engine = engine_with(mock);
        assert!(matches!(
            engine.refresh().await,
            RefreshOutcome::Applied { .. }
        ));
        engine
    }

    #[tokio::test]
    async fn test_refresh_replaces_feed() {
        let mut mock = MockFeedGateway::new();
        let mut calls = 0;
        mock.expect_list_posts().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![post("p1", "alice", "a"), post("p2", "bob", "b")])
            } else {
                Ok(vec![post("p3", "carol", "c")])
            }
        });
        let engine = engine_with(mock);

        assert_eq!(engine.refresh().await, RefreshOutcome::Applied { count: 2 });
        assert_eq!(engine.refresh().await, RefreshOutcome::Applied { count: 1 });
        assert_eq!(engine.snapshot(), vec![post("p3", "carol", "c")]);
        assert!(engine.last_refresh().is_some());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_feed_and_notifies() {
        let mut mock = MockFeedGateway::new();
        let mut calls = 0;
        mock.expect_list_posts().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![post("p1", "alice", "a")])
            } else {
                Err(GatewayError::Network("connection refused".into()))
            }
        });
        let engine = engine_with(mock);
        let reported = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reported);
        engine.on_error(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.refresh().await;
        let before = engine.state();
        let mut events = engine.subscribe();

        let outcome = engine.refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(GatewayError::Network(_))));
        assert_eq!(engine.state(), before);
        assert_eq!(reported.load(Ordering::SeqCst), 1);
        assert!(matches!(
            events.try_recv(),
            Ok(FeedEvent::RefreshFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_appends_confirmed_post() {
        let mut mock = MockFeedGateway::new();
        mock.expect_create_post()
            .withf(|req| {
                req.userinput == "hello"
                    && req.category_id == "c1"
                    && req.user_id == "id-alice"
                    && req.username == "alice"
            })
            .times(1)
            .returning(|_| Ok("p9".to_string()));
        let engine = seeded(mock, vec![post("p1", "bob", "a"), post("p2", "bob", "b")]).await;

        let created = engine
            .apply_create(&alice(), PostDraft::new("hello", "c1"))
            .await
            .unwrap();

        let feed = engine.snapshot();
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[2], created);
        assert_eq!(created.id, "p9");
        assert_eq!(created.body, "hello");
        assert_eq!(created.author_username, "alice");
        assert!(created.comments.is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_leaves_feed_untouched() {
        let mut mock = MockFeedGateway::new();
        mock.expect_create_post().times(1).returning(|_| {
            Err(GatewayError::Api {
                status: 500,
                message: "Failed to create chatter".into(),
            })
        });
        let engine = seeded(mock, vec![post("p1", "bob", "a")]).await;
        let before = engine.state();

        let err = engine
            .apply_create(&alice(), PostDraft::new("hello", "c1"))
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::Gateway(GatewayError::Api { .. })));
        assert_eq!(engine.state(), before);
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_drafts_without_calling_gateway() {
        let mut mock = MockFeedGateway::new();
        mock.expect_create_post().never();
        let engine = engine_with(mock);

        let err = engine
            .apply_create(&alice(), PostDraft::new("   ", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));

        let err = engine
            .apply_create(&Identity::anonymous(), PostDraft::new("hello", "c1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Unauthorized(_)));
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_update_targets_by_id() {
        let engine = seeded(
            MockFeedGateway::new(),
            vec![post("p1", "alice", "a"), post("p2", "alice", "b")],
        )
        .await;

        let outcome = engine.apply_update(post("p2", "alice", "B"));

        assert_eq!(outcome, MutationOutcome::Applied);
        assert_eq!(
            engine.snapshot(),
            vec![post("p1", "alice", "a"), post("p2", "alice", "B")]
        );
        assert_eq!(
            engine.apply_update(post("p7", "alice", "x")),
            MutationOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let engine = seeded(
            MockFeedGateway::new(),
            vec![post("p1", "alice", "a"), post("p2", "alice", "b")],
        )
        .await;

        assert_eq!(engine.apply_delete("p1"), MutationOutcome::Applied);
        let once = engine.state();
        assert_eq!(engine.apply_delete("p1"), MutationOutcome::NotFound);
        assert_eq!(engine.state(), once);
        assert_eq!(engine.snapshot(), vec![post("p2", "alice", "b")]);
    }

    #[tokio::test]
    async fn test_submit_update_requires_ownership() {
        let mut mock = MockFeedGateway::new();
        mock.expect_update_post().never();
        let engine = seeded(mock, vec![post("p1", "bob", "a")]).await;

        let err = engine
            .submit_update(&alice(), post("p1", "bob", "hijacked"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Unauthorized(_)));

        // claiming authorship in the edited copy does not help
        let err = engine
            .submit_update(&alice(), post("p1", "alice", "hijacked"))
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::Unauthorized(_)));
        assert_eq!(engine.snapshot(), vec![post("p1", "bob", "a")]);
    }

    #[tokio::test]
    async fn test_submit_update_and_delete() {
        let mut mock = MockFeedGateway::new();
        mock.expect_update_post()
            .withf(|id, req| id == "p1" && req.userinput == "edited")
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_delete_post()
            .withf(|id| id == "p1")
            .times(1)
            .returning(|_| Ok(()));
        let engine = seeded(mock, vec![post("p1", "alice", "a")]).await;

        engine
            .submit_update(&alice(), post("p1", "alice", "edited"))
            .await
            .unwrap();
        assert_eq!(engine.get("p1").unwrap().body, "edited");

        engine.submit_delete(&alice(), "p1").await.unwrap();
        assert!(engine.is_empty());
    }

    #[tokio::test]
    async fn test_submit_delete_failure_keeps_post() {
        let mut mock = MockFeedGateway::new();
        mock.expect_delete_post()
            .returning(|_| Err(GatewayError::Timeout(Duration::from_secs(10))));
        let engine = seeded(mock, vec![post("p1", "alice", "a")]).await;

        let err = engine.submit_delete(&alice(), "p1").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_discards_results() {
        let engine = seeded(MockFeedGateway::new(), vec![post("p1", "alice", "a")]).await;
        engine.shutdown();

        assert_eq!(engine.refresh().await, RefreshOutcome::Discarded);
        assert_eq!(engine.apply_delete("p1"), MutationOutcome::Discarded);
        assert_eq!(
            engine
                .apply_create(&alice(), PostDraft::new("hello", "c1"))
                .await
                .unwrap_err(),
            FeedError::Closed
        );
        assert_eq!(engine.len(), 1);
    }

    #[tokio::test]
    async fn test_preserve_pending_survives_lagging_snapshot() {
        let mut mock = MockFeedGateway::new();
        mock.expect_list_posts()
            .returning(|| Ok(vec![post("p1", "bob", "a")]));
        mock.expect_create_post()
            .returning(|_| Ok("p9".to_string()));
        let engine = FeedEngine::new(
            Arc::new(mock),
            EngineConfig {
                reconcile_policy: ReconcilePolicy::PreservePending {
                    ttl: Duration::from_secs(120),
                },
                ..Default::default()
            },
        );

        engine.refresh().await;
        engine
            .apply_create(&alice(), PostDraft::new("hello", "c1"))
            .await
            .unwrap();
        engine.refresh().await;

        let ids: Vec<_> = engine.snapshot().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p1", "p9"]);
        assert_eq!(engine.pending_len(), 1);
    }
}
