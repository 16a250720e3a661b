//! Reconciliation of optimistic mutations with full-replace refreshes
//!
//! A refresh replaces the whole feed with the server snapshot. If the server
//! has not indexed a mutation we already confirmed locally, the snapshot
//! would silently undo it until the next tick. [`ReconcilePolicy`] decides
//! whether that flicker is accepted or papered over.

use std::time::{Duration, Instant};

use crate::models::Post;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcilePolicy {
    /// The snapshot is the feed, exactly. Local optimistic entries the server
    /// has not caught up with disappear until it does.
    #[default]
    FullReplace,
    /// Locally confirmed mutations are re-applied on top of snapshots that do
    /// not reflect them yet, for at most `ttl` after they were made.
    PreservePending { ttl: Duration },
}

impl ReconcilePolicy {
    pub fn preserves_pending(&self) -> bool {
        matches!(self, ReconcilePolicy::PreservePending { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum PendingOp {
    /// Local version of the post; `created` marks posts the server may not list yet
    Upsert { post: Post, created: bool },
    Delete,
}

#[derive(Debug, Clone)]
struct PendingEntry {
    post_id: String,
    op: PendingOp,
    recorded_at: Instant,
}

/// Confirmed local mutations not yet observed in a snapshot, in the order
/// they were made.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingMutations {
    entries: Vec<PendingEntry>,
}

impl PendingMutations {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, post_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.post_id == post_id)
    }

    pub fn record_create(&mut self, post: Post, now: Instant) {
        if let Some(idx) = self.position(&post.id) {
            self.entries.remove(idx);
        }
        self.entries.push(PendingEntry {
            post_id: post.id.clone(),
            op: PendingOp::Upsert {
                post,
                created: true,
            },
            recorded_at: now,
        });
    }

    pub fn record_update(&mut self, post: Post, now: Instant) {
        if let Some(idx) = self.position(&post.id) {
            let entry = &mut self.entries[idx];
            if let PendingOp::Upsert { created, .. } = entry.op {
                entry.op = PendingOp::Upsert { post, created };
                entry.recorded_at = now;
                return;
            }
            self.entries.remove(idx);
        }
        self.entries.push(PendingEntry {
            post_id: post.id.clone(),
            op: PendingOp::Upsert {
                post,
                created: false,
            },
            recorded_at: now,
        });
    }

    pub fn record_delete(&mut self, post_id: &str, now: Instant) {
        if let Some(idx) = self.position(post_id) {
            self.entries.remove(idx);
        }
        self.entries.push(PendingEntry {
            post_id: post_id.to_string(),
            op: PendingOp::Delete,
            recorded_at: now,
        });
    }

    /// Build the feed for a fresh snapshot under `policy`.
    ///
    /// Entries the snapshot already reflects, and expired ones, are retired.
    pub fn reconcile(
        &mut self,
        mut snapshot: Vec<Post>,
        policy: ReconcilePolicy,
        now: Instant,
    ) -> Vec<Post> {
        let ttl = match policy {
            ReconcilePolicy::FullReplace => {
                self.entries.clear();
                return snapshot;
            }
            ReconcilePolicy::PreservePending { ttl } => ttl,
        };

        self.entries
            .retain(|e| now.saturating_duration_since(e.recorded_at) < ttl);

        let mut still_pending = Vec::with_capacity(self.entries.len());
        for entry in self.entries.drain(..) {
            let idx = snapshot.iter().position(|p| p.id == entry.post_id);
            let keep = match (&entry.op, idx) {
                (PendingOp::Upsert { post, created: true }, None) => {
                    snapshot.push(post.clone());
                    true
                }
                (PendingOp::Upsert { post, .. }, Some(i)) => {
                    let server = &mut snapshot[i];
                    if server.body == post.body && server.category_id == post.category_id {
                        false
                    } else {
                        // server comments are newer than ours
                        server.body = post.body.clone();
                        server.category_id = post.category_id.clone();
                        true
                    }
                }
                // updated locally but gone on the server: do not resurrect
                (PendingOp::Upsert { created: false, .. }, None) => false,
                (PendingOp::Delete, Some(i)) => {
                    snapshot.remove(i);
                    true
                }
                (PendingOp::Delete, None) => false,
            };
            if keep {
                still_pending.push(entry);
            }
        }
        self.entries = still_pending;

        snapshot
    }
}
