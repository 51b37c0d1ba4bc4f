//! Task-list executor (spec §4.5.2): owns the sticky task-list post, rendering
//! `TodoWrite` snapshots and reacting to the minimize-toggle reaction.

use super::{ExecCtx, Executor, ReactionOutcome, render_task_list};
use crate::reactions::vocab;
use crate::session::types::{Session, TaskItem};
use crate::sticky;
use crate::tracker::{InteractionKind, PostKind, PostRecord};
use crate::{Result, platform::ReactionAction};

/// One mutation requested of the task-list executor (spec §4.5.2).
#[derive(Debug, Clone)]
pub enum TaskListOp {
    Update(Vec<TaskItem>),
    Complete,
    BumpToBottom,
    ToggleMinimize,
}

#[derive(Default)]
pub struct TaskListExecutor;

impl TaskListExecutor {
    pub async fn execute(&mut self, ctx: &ExecCtx<'_>, session: &mut Session, op: TaskListOp) -> Result<()> {
        match op {
            TaskListOp::Update(tasks) => self.update(ctx, session, tasks).await,
            TaskListOp::Complete => self.complete(ctx, session).await,
            TaskListOp::BumpToBottom => {
                sticky::bump_task_list(session, ctx.tracker, ctx.platform).await
            }
            TaskListOp::ToggleMinimize => self.toggle_minimize(ctx, session).await,
        }
    }

    async fn update(&mut self, ctx: &ExecCtx<'_>, session: &mut Session, tasks: Vec<TaskItem>) -> Result<()> {
        session.tasks = tasks;
        session.update_in_progress_start();
        let elapsed = session.in_progress_elapsed_secs();
        let body = render_task_list(&session.tasks, session.tasks_minimized, elapsed);
        session.last_tasks_content = Some(body.clone());

        if let Some(post_id) = session.tasks_post_id.clone() {
            ctx.platform.update_post(&post_id, &body).await?;
            return Ok(());
        }

        let created = ctx
            .platform
            .create_interactive_post(ctx.thread_id, &body, &[vocab::MINIMIZE_TOGGLE])
            .await?;
        let _ = ctx.platform.pin_post(&created.post_id).await;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::TaskList)
                    .with_interaction(InteractionKind::ToggleMinimize),
            )
            .await;
        session.tasks_post_id = Some(created.post_id);
        Ok(())
    }

    async fn complete(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()> {
        session.tasks_completed = true;
        let Some(post_id) = session.tasks_post_id.take() else {
            return Ok(());
        };
        let _ = ctx.platform.remove_reaction(&post_id, vocab::MINIMIZE_TOGGLE).await;
        let _ = ctx.platform.unpin_post(&post_id).await;
        let _ = ctx.platform.delete_post(&post_id).await;
        ctx.tracker.unregister(&post_id).await;
        Ok(())
    }

    async fn toggle_minimize(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()> {
        let Some(post_id) = session.tasks_post_id.clone() else {
            return Ok(());
        };
        session.tasks_minimized = !session.tasks_minimized;
        let body = render_task_list(
            &session.tasks,
            session.tasks_minimized,
            session.in_progress_elapsed_secs(),
        );
        session.last_tasks_content = Some(body.clone());
        ctx.platform.update_post(&post_id, &body).await?;
        Ok(())
    }

    /// Handle a reaction possibly aimed at the task-list post (spec §4.5.2).
    pub async fn handle_reaction(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        post_id: &str,
        emoji: &str,
        action: ReactionAction,
    ) -> Result<ReactionOutcome> {
        if session.tasks_post_id.as_deref() != Some(post_id)
            || emoji != vocab::MINIMIZE_TOGGLE
            || action != ReactionAction::Added
        {
            return Ok(ReactionOutcome::Ignored);
        }
        self.toggle_minimize(ctx, session).await?;
        Ok(ReactionOutcome::Handled)
    }
}

impl Executor for TaskListExecutor {
    async fn finalize(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()> {
        if session.tasks_post_id.is_some() && !session.tasks_completed {
            // A turn ending with an incomplete task list just leaves it sticky; only a
            // session teardown should remove it outright.
            let _ = ctx;
            let _ = session;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::tests_support::FakePlatform;
    use crate::tracker::PostTracker;
    use crate::{PlatformId, SessionId, ThreadId, UserId};
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(
            SessionId::new("mm-test", "thread-1"),
            PlatformId::from("mm-test"),
            ThreadId::from("thread-1"),
            UserId::from("alice"),
        )
    }

    #[tokio::test]
    async fn update_creates_then_updates_the_same_post() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = TaskListExecutor;

        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        let tasks = vec![TaskItem {
            content: "A".into(),
            active_form: None,
            status: crate::session::types::TaskStatus::InProgress,
        }];
        exec.execute(&ctx, &mut session, TaskListOp::Update(tasks.clone())).await.unwrap();
        let first_post = session.tasks_post_id.clone().unwrap();

        exec.execute(&ctx, &mut session, TaskListOp::Update(tasks)).await.unwrap();
        assert_eq!(session.tasks_post_id.as_deref(), Some(first_post.as_str()));
        assert_eq!(platform.post_count().await, 1);
    }

    #[tokio::test]
    async fn complete_removes_the_post_and_clears_state() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = TaskListExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.execute(&ctx, &mut session, TaskListOp::Update(vec![])).await.unwrap();
        exec.execute(&ctx, &mut session, TaskListOp::Complete).await.unwrap();
        assert!(session.tasks_post_id.is_none());
        assert!(session.tasks_completed);
    }

    #[tokio::test]
    async fn toggle_minimize_reaction_flips_display() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = TaskListExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.execute(&ctx, &mut session, TaskListOp::Update(vec![])).await.unwrap();
        let post_id = session.tasks_post_id.clone().unwrap();
        let outcome = exec
            .handle_reaction(&ctx, &mut session, &post_id, vocab::MINIMIZE_TOGGLE, ReactionAction::Added)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::Handled);
        assert!(session.tasks_minimized);
    }
}
