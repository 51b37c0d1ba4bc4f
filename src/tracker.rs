//! Post Tracker: a process-wide, two-indexed map from platform post ids to the session
//! and kind that own them.

use crate::SessionId;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// What role a tracked post plays in its session, used to answer `get-by-type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostKind {
    Content,
    TaskList,
    SessionHeader,
    Question,
    PlanApproval,
    MessageApproval,
    Permission,
    WorktreePrompt,
    UpdatePrompt,
    Subagent,
    Lifecycle,
    BugReport,
    System,
}

/// What a reactable post is waiting on, if anything. Distinct from [`PostKind`] since a
/// post's *kind* (what it displays) and its *interaction* (what a reaction on it means)
/// are independent — a `question` kind is always an interaction, but `content` never is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Question,
    PlanApproval,
    ActionApproval,
    MessageApproval,
    WorktreeExisting,
    UpdateNow,
    ToggleMinimize,
    Resume,
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub thread_id: String,
    pub session_id: SessionId,
    pub kind: PostKind,
    pub interaction_kind: Option<InteractionKind>,
    /// Correlates a tool-display post back to the assistant's `tool_use_id`.
    pub tool_use_id: Option<String>,
    pub metadata: Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl PostRecord {
    /// Build a bare record for a non-interactive post (the common case).
    pub fn new(thread_id: impl Into<String>, session_id: SessionId, kind: PostKind) -> Self {
        Self {
            thread_id: thread_id.into(),
            session_id,
            kind,
            interaction_kind: None,
            tool_use_id: None,
            metadata: Value::Null,
            created_at: chrono::Utc::now(),
        }
    }

    pub fn with_interaction(mut self, interaction_kind: InteractionKind) -> Self {
        self.interaction_kind = Some(interaction_kind);
        self
    }

    pub fn with_tool_use_id(mut self, tool_use_id: impl Into<String>) -> Self {
        self.tool_use_id = Some(tool_use_id.into());
        self
    }
}

#[derive(Debug, Default)]
struct Indices {
    by_post: HashMap<String, PostRecord>,
    by_session: HashMap<SessionId, HashSet<String>>,
}

/// Dual-indexed, `RwLock`-guarded post registry shared by every session's executors.
///
/// Invariant: `by_session` is exactly the transpose of `by_post` — every mutation
/// updates both indices together under one write-lock acquisition, so external callers
/// never observe one without the other.
#[derive(Debug, Default)]
pub struct PostTracker {
    inner: RwLock<Indices>,
}

impl PostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, post_id: impl Into<String>, record: PostRecord) {
        let post_id = post_id.into();
        let mut inner = self.inner.write().await;
        inner
            .by_session
            .entry(record.session_id.clone())
            .or_default()
            .insert(post_id.clone());
        inner.by_post.insert(post_id, record);
    }

    pub async fn unregister(&self, post_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(record) = inner.by_post.remove(post_id) {
            if let Some(bucket) = inner.by_session.get_mut(&record.session_id) {
                bucket.remove(post_id);
                if bucket.is_empty() {
                    inner.by_session.remove(&record.session_id);
                }
            }
        }
    }

    pub async fn get(&self, post_id: &str) -> Option<PostRecord> {
        self.inner.read().await.by_post.get(post_id).cloned()
    }

    pub async fn get_by_type(&self, session_id: &SessionId, kind: PostKind) -> Vec<String> {
        let inner = self.inner.read().await;
        let Some(bucket) = inner.by_session.get(session_id) else {
            return Vec::new();
        };
        bucket
            .iter()
            .filter(|post_id| {
                inner
                    .by_post
                    .get(post_id.as_str())
                    .is_some_and(|r| r.kind == kind)
            })
            .cloned()
            .collect()
    }

    pub async fn clear_session(&self, session_id: &SessionId) {
        let mut inner = self.inner.write().await;
        if let Some(post_ids) = inner.by_session.remove(session_id) {
            for post_id in post_ids {
                inner.by_post.remove(&post_id);
            }
        }
    }

    pub async fn find_session(&self, post_id: &str) -> Option<SessionId> {
        self.inner
            .read()
            .await
            .by_post
            .get(post_id)
            .map(|r| r.session_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> SessionId {
        SessionId::new("mm-test", s)
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let tracker = PostTracker::new();
        tracker
            .register(
                "p1",
                PostRecord::new("thread-1", sid("thread-1"), PostKind::Content),
            )
            .await;
        let record = tracker.get("p1").await.unwrap();
        assert_eq!(record.kind, PostKind::Content);
        assert_eq!(tracker.find_session("p1").await.unwrap(), sid("thread-1"));
    }

    #[tokio::test]
    async fn unregister_removes_from_both_indices() {
        let tracker = PostTracker::new();
        let session = sid("thread-2");
        tracker
            .register(
                "p2",
                PostRecord::new("thread-2", session.clone(), PostKind::TaskList),
            )
            .await;
        tracker.unregister("p2").await;
        assert!(tracker.get("p2").await.is_none());
        assert!(
            tracker
                .get_by_type(&session, PostKind::TaskList)
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn get_by_type_filters_within_a_session() {
        let tracker = PostTracker::new();
        let session = sid("thread-3");
        tracker
            .register(
                "content-post",
                PostRecord::new("thread-3", session.clone(), PostKind::Content),
            )
            .await;
        tracker
            .register(
                "tasks-post",
                PostRecord::new("thread-3", session.clone(), PostKind::TaskList),
            )
            .await;
        let tasks = tracker.get_by_type(&session, PostKind::TaskList).await;
        assert_eq!(tasks, vec!["tasks-post".to_string()]);
    }

    #[tokio::test]
    async fn clear_session_drops_every_post_it_owned() {
        let tracker = PostTracker::new();
        let session = sid("thread-4");
        tracker
            .register(
                "a",
                PostRecord::new("thread-4", session.clone(), PostKind::Content),
            )
            .await;
        tracker
            .register(
                "b",
                PostRecord::new("thread-4", session.clone(), PostKind::SessionHeader),
            )
            .await;
        tracker.clear_session(&session).await;
        assert!(tracker.get("a").await.is_none());
        assert!(tracker.get("b").await.is_none());
    }

    #[tokio::test]
    async fn find_session_returns_none_for_unknown_post() {
        let tracker = PostTracker::new();
        assert!(tracker.find_session("nope").await.is_none());
    }
}
