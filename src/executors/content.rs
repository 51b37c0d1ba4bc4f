//! Content executor (spec §4.5.1): owns the current streaming-text post. Appends text and
//! tool-use/tool-result lines to `pending_content`, and on flush invokes the break
//! algorithm (`breaker::plan_flush`) to decide whether to create, update in place, or split.

use super::{ExecCtx, Executor};
use crate::breaker::{self, FlushAction};
use crate::session::types::Session;
use crate::sticky;
use crate::tracker::{PostKind, PostRecord};
use crate::Result;

#[derive(Default)]
pub struct ContentExecutor;

impl ContentExecutor {
    pub fn add_content(&mut self, session: &mut Session, text: &str) {
        session.pending_content.push_str(text);
    }

    /// Append a tool-invocation display line, tracking which post it lands in so a later
    /// `tool_result` can be correlated even if the content has since rolled to a new post.
    pub fn tool_started(&mut self, session: &mut Session, tool_use_id: &str, display: &str) {
        session.pending_content.push_str(display);
        session.pending_content.push('\n');
        if let Some(post_id) = session.current_post_id.clone() {
            session.tool_use_posts.insert(tool_use_id.to_string(), post_id);
        }
    }

    /// Append the result marker line for a tool use (spec §4.7: `  ↳ ✓ …` / `  ↳ ❌ …`).
    pub fn tool_result(&mut self, session: &mut Session, _tool_use_id: &str, content: &str, is_error: bool) {
        let icon = if is_error { "❌" } else { "✓" };
        let summary = content.lines().next().unwrap_or("");
        session.pending_content.push_str(&format!("  ↳ {icon} {summary}\n"));
    }

    /// Flush `pending_content` through the break algorithm, if there is anything to flush.
    pub async fn flush(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()> {
        if session.pending_content.is_empty() {
            return Ok(());
        }
        let delta = std::mem::take(&mut session.pending_content);
        let limits = ctx.platform.message_limits();
        let current = if session.current_post_id.is_some() {
            Some(session.current_post_content.as_str())
        } else {
            None
        };
        let action = breaker::plan_flush(current, &delta, &limits);

        match action {
            FlushAction::CreatePost { body } => self.create_continuation(ctx, session, body).await,
            FlushAction::UpdateInPlace { body } => {
                let post_id = session
                    .current_post_id
                    .clone()
                    .expect("UpdateInPlace only returned when a current post exists");
                match ctx.platform.update_post(&post_id, &body).await {
                    Ok(()) => {
                        session.current_post_content = body;
                        Ok(())
                    }
                    Err(_) => {
                        // post-gone recovery (spec §4.3 edge policy / §7): reset identity,
                        // keep the unacknowledged text so the next flush creates a fresh post.
                        session.current_post_id = None;
                        session.current_post_content.clear();
                        session.pending_content = body;
                        Ok(())
                    }
                }
            }
            FlushAction::Split { head, tail } => {
                let post_id = session
                    .current_post_id
                    .clone()
                    .expect("Split only returned when a current post exists");
                match ctx.platform.update_post(&post_id, &head).await {
                    Ok(()) => {
                        session.current_post_id = None;
                        session.current_post_content.clear();
                        session.pending_content = tail;
                        Ok(())
                    }
                    Err(_) => {
                        session.current_post_id = None;
                        session.current_post_content.clear();
                        session.pending_content = format!("{head}\n{tail}");
                        Ok(())
                    }
                }
            }
        }
    }

    /// Create the post that will hold a fresh buffer (spec §4.5.1 steps 1-2): place the
    /// continuation content first — either by repurposing the active task-list post or by
    /// creating a plain new post — then bump any pending plan approval, then (if a task
    /// list was repurposed) recreate it at the new bottom. That order is what leaves
    /// `[content …] [plan approval] [task list]` at the bottom (spec §3 invariant 3, §4.6
    /// ordering) instead of bumping the approval post out from under the new content.
    async fn create_continuation(&mut self, ctx: &ExecCtx<'_>, session: &mut Session, body: String) -> Result<()> {
        let had_active_tasks = session.tasks_post_id.is_some() && !session.tasks_completed;

        if had_active_tasks {
            match sticky::repurpose_task_post_for_content(session, ctx.tracker, ctx.platform, &body).await? {
                Some(post_id) => {
                    session.current_post_id = Some(post_id);
                    session.current_post_content = body;
                }
                None => self.create_plain_post(ctx, session, body).await?,
            }
        } else {
            self.create_plain_post(ctx, session, body).await?;
        }

        sticky::bump_plan_approval(session, ctx.tracker, ctx.platform).await?;
        if had_active_tasks {
            sticky::bump_task_list(session, ctx.tracker, ctx.platform).await?;
        }
        Ok(())
    }

    async fn create_plain_post(&mut self, ctx: &ExecCtx<'_>, session: &mut Session, body: String) -> Result<()> {
        let created = ctx.platform.create_post(ctx.thread_id, &body).await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::Content),
            )
            .await;
        session.current_post_id = Some(created.post_id);
        session.current_post_content = body;
        Ok(())
    }
}

impl Executor for ContentExecutor {
    async fn finalize(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()> {
        self.flush(ctx, session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::tests_support::FakePlatform;
    use crate::tracker::PostTracker;
    use crate::{PlatformId, SessionId, ThreadId, UserId};

    fn session() -> Session {
        Session::new(
            SessionId::new("mm-test", "thread-1"),
            PlatformId::from("mm-test"),
            ThreadId::from("thread-1"),
            UserId::from("alice"),
        )
    }

    #[tokio::test]
    async fn simple_prose_creates_one_post() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = ContentExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.add_content(&mut session, "Sure — here it is:\n```\nhello\n```\nDone.\n");
        exec.flush(&ctx, &mut session).await.unwrap();
        assert_eq!(platform.post_count().await, 1);
        let post_id = session.current_post_id.clone().unwrap();
        assert_eq!(
            platform.body_of(&post_id).await.unwrap(),
            "Sure — here it is:\n```\nhello\n```\nDone.\n"
        );
    }

    #[tokio::test]
    async fn second_flush_updates_the_same_post() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = ContentExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.add_content(&mut session, "Plan:\n");
        exec.flush(&ctx, &mut session).await.unwrap();
        let first_post = session.current_post_id.clone().unwrap();

        exec.add_content(&mut session, "Starting A.\n");
        exec.flush(&ctx, &mut session).await.unwrap();
        assert_eq!(session.current_post_id.as_deref(), Some(first_post.as_str()));
        assert_eq!(platform.post_count().await, 1);
        assert_eq!(platform.body_of(&first_post).await.unwrap(), "Plan:\nStarting A.\n");
    }
}
