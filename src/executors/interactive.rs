//! Interactive executor (spec §4.5.3): the four prompt flavors that await exactly one
//! reaction — plan approval, numbered question, tool permission, and message approval.
//!
//! Every prompt enforces the same two checks: an authorization check (only the session
//! owner or a globally-allowed user may resolve it) and an idempotence check (the first
//! matching reaction wins; a post with no matching pending state is ignored).

use super::{is_authorized, ExecCtx, Executor, ReactionOutcome};
use crate::platform::ReactionAction;
use crate::reactions::vocab;
use crate::session::types::{
    PendingMessageApproval, PendingPermission, PendingPlanApproval, PendingQuestion, Session,
};
use crate::tracker::{InteractionKind, PostKind, PostRecord};
use crate::Result;

/// Resolution handed back to the caller (typically the session worker) so it can act on
/// whichever prompt a reaction just resolved — forward a question answer to the assistant,
/// unblock a queued prompt, invite a user, etc.
#[derive(Debug, Clone)]
pub enum InteractiveResolution {
    PlanApproved { tool_use_id: String },
    PlanDenied { tool_use_id: String },
    QuestionAnswered { tool_use_id: String, option_index: usize, option_text: String },
    PermissionApproved { tool_use_id: String, tool_name: String, description: String, allow_all: bool },
    PermissionDenied,
    MessageApproved { user: crate::UserId, buffered_text: String },
    MessageDenied,
    UserInvited { user: crate::UserId, buffered_text: String },
}

#[derive(Default)]
pub struct InteractiveExecutor;

impl InteractiveExecutor {
    pub async fn open_plan_approval(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        tool_use_id: String,
        plan: String,
    ) -> Result<()> {
        let created = ctx
            .platform
            .create_interactive_post(ctx.thread_id, &plan, &[vocab::APPROVE, vocab::DENY])
            .await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::PlanApproval)
                    .with_interaction(InteractionKind::PlanApproval),
            )
            .await;
        session.pending_plan_approval = Some(PendingPlanApproval { post_id: created.post_id, tool_use_id, plan });
        Ok(())
    }

    pub async fn open_question(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        tool_use_id: String,
        question: String,
        options: Vec<String>,
    ) -> Result<()> {
        let mut body = question.clone();
        for (i, option) in options.iter().enumerate() {
            body.push_str(&format!("\n{}. {option}", i + 1));
        }
        let reactions: Vec<&str> = (1..=options.len()).filter_map(vocab::number_emoji).collect();
        let created = ctx.platform.create_interactive_post(ctx.thread_id, &body, &reactions).await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::Question)
                    .with_interaction(InteractionKind::Question),
            )
            .await;
        session.pending_question = Some(PendingQuestion { post_id: created.post_id, tool_use_id, question, options });
        Ok(())
    }

    pub async fn open_permission(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        tool_use_id: String,
        tool_name: String,
        description: String,
    ) -> Result<()> {
        let created = ctx
            .platform
            .create_interactive_post(
                ctx.thread_id,
                &description,
                &[vocab::APPROVE, vocab::DENY, vocab::APPROVE_ALL],
            )
            .await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::Permission)
                    .with_interaction(InteractionKind::ActionApproval),
            )
            .await;
        session.pending_permission = Some(PendingPermission { post_id: created.post_id, tool_use_id, tool_name, description });
        Ok(())
    }

    pub async fn open_message_approval(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        user: crate::UserId,
        buffered_text: String,
    ) -> Result<()> {
        let body = format!("{user} wants to talk to this session — approve?");
        let created = ctx
            .platform
            .create_interactive_post(ctx.thread_id, &body, &[vocab::APPROVE_ONCE, vocab::INVITE, vocab::DENY])
            .await?;
        ctx.tracker
            .register(
                created.post_id.clone(),
                PostRecord::new(ctx.thread_id.to_string(), ctx.session_id.clone(), PostKind::MessageApproval)
                    .with_interaction(InteractionKind::MessageApproval),
            )
            .await;
        session.pending_message_approval = Some(PendingMessageApproval { post_id: created.post_id, user, buffered_text });
        Ok(())
    }

    /// Route one reaction to whichever pending prompt it resolves, if any (spec §4.9 step 3).
    pub async fn handle_reaction(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        post_id: &str,
        emoji: &str,
        user: &str,
        action: ReactionAction,
    ) -> Result<(ReactionOutcome, Option<InteractiveResolution>)> {
        if action != ReactionAction::Added {
            return Ok((ReactionOutcome::Ignored, None));
        }
        if !is_authorized(session, ctx.platform, user) {
            return Ok((ReactionOutcome::Ignored, None));
        }

        if session.pending_plan_approval.as_ref().map(|p| p.post_id.as_str()) == Some(post_id) {
            return self.resolve_plan_approval(ctx, session, emoji).await;
        }
        if session.pending_question.as_ref().map(|p| p.post_id.as_str()) == Some(post_id) {
            return self.resolve_question(ctx, session, emoji).await;
        }
        if session.pending_permission.as_ref().map(|p| p.post_id.as_str()) == Some(post_id) {
            return self.resolve_permission(ctx, session, emoji).await;
        }
        if session.pending_message_approval.as_ref().map(|p| p.post_id.as_str()) == Some(post_id) {
            return self.resolve_message_approval(ctx, session, emoji).await;
        }
        Ok((ReactionOutcome::Ignored, None))
    }

    async fn resolve_plan_approval(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        emoji: &str,
    ) -> Result<(ReactionOutcome, Option<InteractiveResolution>)> {
        let Some(pending) = session.pending_plan_approval.take() else {
            return Ok((ReactionOutcome::Ignored, None));
        };
        let resolution = match emoji {
            vocab::APPROVE => InteractiveResolution::PlanApproved { tool_use_id: pending.tool_use_id.clone() },
            vocab::DENY => InteractiveResolution::PlanDenied { tool_use_id: pending.tool_use_id.clone() },
            _ => {
                session.pending_plan_approval = Some(pending);
                return Ok((ReactionOutcome::Ignored, None));
            }
        };
        let label = if matches!(resolution, InteractiveResolution::PlanApproved { .. }) { "approved" } else { "denied" };
        let _ = ctx.platform.update_post(&pending.post_id, &format!("{}\n\n— {label}", pending.plan)).await;
        ctx.tracker.unregister(&pending.post_id).await;
        Ok((ReactionOutcome::Handled, Some(resolution)))
    }

    async fn resolve_question(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        emoji: &str,
    ) -> Result<(ReactionOutcome, Option<InteractiveResolution>)> {
        let Some(pending) = session.pending_question.take() else {
            return Ok((ReactionOutcome::Ignored, None));
        };
        let Some(index) = vocab::option_index_from_emoji(emoji) else {
            session.pending_question = Some(pending);
            return Ok((ReactionOutcome::Ignored, None));
        };
        let Some(option_text) = pending.options.get(index - 1).cloned() else {
            session.pending_question = Some(pending);
            return Ok((ReactionOutcome::Ignored, None));
        };
        let _ = ctx
            .platform
            .update_post(&pending.post_id, &format!("{}\n\nSelected: {option_text}", pending.question))
            .await;
        ctx.tracker.unregister(&pending.post_id).await;
        Ok((
            ReactionOutcome::Handled,
            Some(InteractiveResolution::QuestionAnswered { tool_use_id: pending.tool_use_id.clone(), option_index: index, option_text }),
        ))
    }

    async fn resolve_permission(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        emoji: &str,
    ) -> Result<(ReactionOutcome, Option<InteractiveResolution>)> {
        let Some(pending) = session.pending_permission.take() else {
            return Ok((ReactionOutcome::Ignored, None));
        };
        let resolution = match emoji {
            vocab::DENY => InteractiveResolution::PermissionDenied,
            vocab::APPROVE_ALL => {
                session.allowed_tools.insert(pending.tool_name.clone());
                InteractiveResolution::PermissionApproved {
                    tool_use_id: pending.tool_use_id.clone(),
                    tool_name: pending.tool_name.clone(),
                    description: pending.description.clone(),
                    allow_all: true,
                }
            }
            vocab::APPROVE => InteractiveResolution::PermissionApproved {
                tool_use_id: pending.tool_use_id.clone(),
                tool_name: pending.tool_name.clone(),
                description: pending.description.clone(),
                allow_all: false,
            },
            _ => {
                session.pending_permission = Some(pending);
                return Ok((ReactionOutcome::Ignored, None));
            }
        };
        let verdict = if matches!(resolution, InteractiveResolution::PermissionDenied) { "denied" } else { "approved" };
        let _ = ctx.platform.update_post(&pending.post_id, &format!("{}\n\n— {verdict}", pending.description)).await;
        ctx.tracker.unregister(&pending.post_id).await;
        Ok((ReactionOutcome::Handled, Some(resolution)))
    }

    async fn resolve_message_approval(
        &mut self,
        ctx: &ExecCtx<'_>,
        session: &mut Session,
        emoji: &str,
    ) -> Result<(ReactionOutcome, Option<InteractiveResolution>)> {
        let Some(pending) = session.pending_message_approval.take() else {
            return Ok((ReactionOutcome::Ignored, None));
        };
        let resolution = match emoji {
            vocab::DENY => InteractiveResolution::MessageDenied,
            vocab::INVITE => {
                session.allowed_users.insert(pending.user.clone());
                InteractiveResolution::UserInvited { user: pending.user.clone(), buffered_text: pending.buffered_text.clone() }
            }
            vocab::APPROVE_ONCE => InteractiveResolution::MessageApproved {
                user: pending.user.clone(),
                buffered_text: pending.buffered_text.clone(),
            },
            _ => {
                session.pending_message_approval = Some(pending);
                return Ok((ReactionOutcome::Ignored, None));
            }
        };
        ctx.tracker.unregister(&pending.post_id).await;
        let _ = ctx.platform.delete_post(&pending.post_id).await;
        Ok((ReactionOutcome::Handled, Some(resolution)))
    }
}

impl Executor for InteractiveExecutor {
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
    async fn plan_approval_round_trip() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = InteractiveExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.open_plan_approval(&ctx, &mut session, "tool-1".into(), "do the thing".into()).await.unwrap();
        let post_id = session.pending_plan_approval.as_ref().unwrap().post_id.clone();

        let (outcome, resolution) = exec
            .handle_reaction(&ctx, &mut session, &post_id, vocab::APPROVE, "alice", ReactionAction::Added)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::Handled);
        assert!(matches!(resolution, Some(InteractiveResolution::PlanApproved { .. })));
        assert!(session.pending_plan_approval.is_none());
    }

    #[tokio::test]
    async fn question_answer_resolves_to_chosen_option() {
        let platform = FakePlatform::new();
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = InteractiveExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.open_question(
            &ctx,
            &mut session,
            "tool-1".into(),
            "Choose:".into(),
            vec!["Red".into(), "Green".into(), "Blue".into()],
        )
        .await
        .unwrap();
        let post_id = session.pending_question.as_ref().unwrap().post_id.clone();

        let (outcome, resolution) = exec
            .handle_reaction(&ctx, &mut session, &post_id, "two", "alice", ReactionAction::Added)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::Handled);
        match resolution {
            Some(InteractiveResolution::QuestionAnswered { option_index, option_text, .. }) => {
                assert_eq!(option_index, 2);
                assert_eq!(option_text, "Green");
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_user_cannot_resolve_a_prompt() {
        let platform = FakePlatform::new();
        platform.allow_all.store(false, std::sync::atomic::Ordering::SeqCst);
        let tracker = PostTracker::new();
        let mut session = session();
        let mut exec = InteractiveExecutor;
        let ctx = ExecCtx {
            platform: &platform,
            tracker: &tracker,
            thread_id: "thread-1",
            session_id: &session.session_id.clone(),
        };
        exec.open_plan_approval(&ctx, &mut session, "tool-1".into(), "plan".into()).await.unwrap();
        let post_id = session.pending_plan_approval.as_ref().unwrap().post_id.clone();
        let (outcome, resolution) = exec
            .handle_reaction(&ctx, &mut session, &post_id, vocab::APPROVE, "mallory", ReactionAction::Added)
            .await
            .unwrap();
        assert_eq!(outcome, ReactionOutcome::Ignored);
        assert!(resolution.is_none());
        assert!(session.pending_plan_approval.is_some());
    }
}
