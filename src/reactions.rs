//! Reaction Router (spec §4.9): resolves an inbound `(post-id, emoji, user, action)` event
//! to the session that owns the post, then hands it to that session's worker inbox for the
//! owning executor to authorize and consume.
//!
//! The router itself does no executor dispatch — per §5, a session's mutable state (and
//! therefore its executors) is only ever touched from that session's single worker task, so
//! "dispatch to the owning executor" here means "enqueue onto that worker's channel".

use crate::platform::ReactionEvent;
use crate::session::manager::SessionManager;
use crate::tracker::PostTracker;
use std::sync::Arc;

/// Canonical reaction vocabulary (spec §6), already normalized to the `emojis` crate's
/// short-code form by the platform adapter before a [`ReactionEvent`] is constructed.
pub mod vocab {
    pub const APPROVE: &str = "+1";
    pub const DENY: &str = "-1";
    pub const APPROVE_ALL: &str = "white_check_mark";
    pub const APPROVE_ONCE: &str = "+1";
    pub const INVITE: &str = "wave";
    pub const MINIMIZE_TOGGLE: &str = "recycle";
    pub const BUG_REPORT: &str = "bug";

    const NUMBERS: [&str; 9] = [
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
    ];

    /// The number emoji (1-indexed) representing option `n` of a question (spec §4.5.3:
    /// "reactions are number emojis 1..N for each option"). Returns `None` past 9 options.
    pub fn number_emoji(n: usize) -> Option<&'static str> {
        NUMBERS.get(n.checked_sub(1)?).copied()
    }

    /// Inverse of [`number_emoji`]: the 1-indexed option number a reaction selects.
    pub fn option_index_from_emoji(emoji: &str) -> Option<usize> {
        NUMBERS.iter().position(|n| *n == emoji).map(|i| i + 1)
    }
}

/// Routes platform reaction events to the session that owns the reacted-on post.
pub struct ReactionRouter {
    tracker: Arc<PostTracker>,
    sessions: Arc<SessionManager>,
}

impl ReactionRouter {
    pub fn new(tracker: Arc<PostTracker>, sessions: Arc<SessionManager>) -> Self {
        Self { tracker, sessions }
    }

    /// Handle one reaction event end-to-end: find the session, fetch the post record,
    /// hand both to the session's worker. Silently drops events for posts we don't own
    /// (spec §4.9 step 1: "if none, drop") — most reactions on a busy channel are on
    /// messages this bot never created.
    pub async fn route(&self, event: ReactionEvent) {
        let Some(session_id) = self.tracker.find_session(&event.post_id).await else {
            return;
        };
        let Some(record) = self.tracker.get(&event.post_id).await else {
            return;
        };
        self.sessions.dispatch_reaction(&session_id, record, event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::vocab::*;

    #[test]
    fn number_emoji_round_trips_option_index() {
        for n in 1..=9 {
            let emoji = number_emoji(n).unwrap();
            assert_eq!(option_index_from_emoji(emoji), Some(n));
        }
    }

    #[test]
    fn number_emoji_out_of_range_is_none() {
        assert!(number_emoji(0).is_none());
        assert!(number_emoji(10).is_none());
    }
}
