//! Subagent executor (spec §4.5.4): owns one post per nested-agent turn (a `Task` tool
//! invocation), created when the tool starts and edited once with its final result —
//! the assistant protocol carries no intermediate progress for a running subagent.

use super::{ExecCtx, Executor};
use crate::session::types::Session;
use crate::tracker::{PostKind, PostRecord};
use crate::Result;
use std::collections::HashMap;

#[derive(Default)]
pub struct SubagentExecutor {
    /// Maps the `Task` tool's `tool_use_id` to the post displaying its progress.
    posts: HashMap<String, String>,
}

impl SubagentExecutor {
    pub async fn started(&mut self, ctx: &ExecCtx<'_>, tool_use_id: &str, description: &str) -> Result<()> {
        let body = format!("🤖 subagent: {description}");
        let created = ctx.platform.create_post(ctx.thread_id, &body).await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::Subagent)
                    .with_tool_use_id(tool_use_id),
            )
            .await;
        self.posts.insert(tool_use_id.to_string(), created.post_id);
        Ok(())
    }

    pub async fn completed(&mut self, ctx: &ExecCtx<'_>, tool_use_id: &str, result_text: &str, is_error: bool) -> Result<()> {
        let Some(post_id) = self.posts.get(tool_use_id) else {
            return Ok(());
        };
        let icon = if is_error { "❌" } else { "✓" };
        let body = format!("🤖 subagent {icon}\n{result_text}");
        let _ = ctx.platform.update_post(post_id, &body).await;
        Ok(())
    }
}

impl Executor for SubagentExecutor {
    async fn finalize(&mut self, _ctx: &ExecCtx<'_>, _session: &mut Session) -> Result<()> {
        Ok(())
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
    async fn started_then_completed_updates_the_same_post() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let session = session();
        let mut exec = SubagentExecutor::default();
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.started(&ctx, "tool-1", "investigate bug").await.unwrap();
        assert_eq!(platform.post_count().await, 1);
        exec.completed(&ctx, "tool-1", "found it", false).await.unwrap();
        assert_eq!(platform.post_count().await, 1);
    }
}
