//! Session-header executor (spec §4.5.4): a single post created once per session start,
//! additionally used to post a resume banner when a session is respawned after an idle
//! timeout or crash (spec §11.2).

use super::{ExecCtx, Executor};
use crate::session::types::Session;
use crate::tracker::{PostKind, PostRecord};
use crate::Result;

#[derive(Default)]
pub struct HeaderExecutor {
    post_id: Option<String>,
}

impl HeaderExecutor {
    /// Post the initial session banner (spec §4.7: emitted on `system.init`).
    pub async fn session_started(&mut self, ctx: &ExecCtx<'_>, session: &mut Session, assistant_session_id: &str) -> Result<()> {
        session.assistant_session_id = Some(assistant_session_id.to_string());
        let body = format!("🟢 session started (`{assistant_session_id}`)");
        let created = ctx.platform.create_post(ctx.thread_id, &body).await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::SessionHeader),
            )
            .await;
        self.post_id = Some(created.post_id);
        Ok(())
    }

    /// Post a resume banner noting the gap since the previous turn (spec §11.2).
    pub async fn posted_resume_banner(&mut self, ctx: &ExecCtx<'_>, gap_description: &str) -> Result<()> {
        let body = format!("↩️ resuming session — {gap_description}");
        let created = ctx.platform.create_post(ctx.thread_id, &body).await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::Lifecycle)
                    .with_interaction(crate::tracker::InteractionKind::Resume),
            )
            .await;
        Ok(())
    }
}

impl Executor for HeaderExecutor {
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

    #[tokio::test]
    async fn session_started_creates_one_header_post() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = Session::new(
            SessionId::new("mm-test", "thread-1"),
            PlatformId::from("mm-test"),
            ThreadId::from("thread-1"),
            UserId::from("alice"),
        );
        let mut exec = HeaderExecutor::default();
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.session_started(&ctx, &mut session, "abc-123").await.unwrap();
        assert_eq!(platform.post_count().await, 1);
        assert_eq!(session.assistant_session_id.as_deref(), Some("abc-123"));
    }
}
