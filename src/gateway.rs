//! Chat Gateway (spec §4.10): the dispatcher task that turns raw platform events into
//! calls against the [`SessionManager`] and [`ReactionRouter`] — the only place that
//! decides *whether* a message starts or continues a session, as opposed to *what*
//! happens once it does (that's the session worker's job).

use crate::platform::{Attachment, InboundEvent, PlatformDyn, PlatformEvent};
use crate::reactions::ReactionRouter;
use crate::session::manager::{Command, InboundMessage, SessionManager};
use crate::{PlatformId, Result, SessionId, ThreadId, UserId};
use futures::StreamExt;
use std::sync::Arc;

/// Runs one platform's event stream to completion, routing messages and reactions.
/// One `ChatGateway::run` call per configured platform adapter (spec §5: "inbound chat
/// events arrive on a separate dispatcher task").
pub struct ChatGateway {
    sessions: Arc<SessionManager>,
    reactions: Arc<ReactionRouter>,
}

impl ChatGateway {
    pub fn new(sessions: Arc<SessionManager>, reactions: Arc<ReactionRouter>) -> Self {
        Self { sessions, reactions }
    }

    /// Drive a single platform's events until its stream ends (disconnect, fatal error).
    /// Callers run one of these per platform as its own task; a platform dying doesn't
    /// take down the others.
    pub async fn run(&self, platform: Arc<dyn PlatformDyn>) -> Result<()> {
        let mut events = platform.start().await?;
        while let Some(event) = events.next().await {
            match event {
                PlatformEvent::Message(inbound) => self.handle_message(&platform, inbound).await,
                PlatformEvent::Reaction(reaction) => self.reactions.route(reaction).await,
            }
        }
        Ok(())
    }

    async fn handle_message(&self, platform: &Arc<dyn PlatformDyn>, event: InboundEvent) {
        if event.is_bot {
            return;
        }

        if let Some(rest) = event.text.strip_prefix('!') {
            self.handle_command(platform, &event, rest.trim()).await;
            return;
        }

        let platform_id: PlatformId = Arc::from(platform.id());
        let thread_id: ThreadId = Arc::from(event.thread_id.as_str());
        let session_id = SessionId::new(&platform_id, &thread_id);
        let is_reply = event.parent_post_id.is_some();

        if !self.sessions.has_session(&session_id).await {
            // Spec §4.10: "if there is no session and the message does not mention the
            // bot, ignore" — covers both a fresh root post and a reply into a thread we
            // never started a session for.
            if !event.is_mention {
                return;
            }
            // Starting a session is gated the same way any other message would be once
            // one exists: a global allow-list check. There's no `session.allowed-users`
            // yet to fall back on, and no approval post makes sense for a session that
            // doesn't exist, so an unauthorized mention to start one is simply dropped
            // rather than buffered (Open Question, recorded in DESIGN.md).
            if !platform.is_user_allowed(&event.user) {
                return;
            }
        } else if !is_reply && !event.is_mention {
            // A root-level post in a thread that already has a session, but this one
            // doesn't mention the bot — not part of the conversation.
            return;
        }

        let image_attachments = self.download_attachments(platform, &event.files).await;
        let message = InboundMessage {
            user: UserId::from(event.user.as_str()),
            text: event.text,
            image_attachments,
        };

        if let Err(error) = self
            .sessions
            .submit(platform_id, thread_id, UserId::from(event.user.as_str()), message)
            .await
        {
            tracing::warn!(%error, thread = %event.thread_id, "failed to submit message to session");
        }
    }

    /// Download and base64-encode every attachment that looks like an image (spec §4.10:
    /// "`[{type: image, ...}, ..., {type: text, text}]` if files are attached and
    /// supported"); anything else is silently dropped rather than sent as an opaque blob
    /// the assistant process has no way to interpret.
    async fn download_attachments(
        &self,
        platform: &Arc<dyn PlatformDyn>,
        files: &[Attachment],
    ) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for file in files {
            if !file.mime_type.starts_with("image/") {
                continue;
            }
            match platform.download_file(&file.id).await {
                Ok(bytes) => {
                    use base64::Engine as _;
                    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                    out.push((file.mime_type.clone(), encoded));
                }
                Err(error) => {
                    tracing::warn!(%error, file = %file.filename, "failed to download attachment");
                }
            }
        }
        out
    }

    async fn handle_command(&self, platform: &Arc<dyn PlatformDyn>, event: &InboundEvent, rest: &str) {
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_ascii_lowercase();
        let arg = parts.next().unwrap_or("").trim();

        let platform_id: PlatformId = Arc::from(platform.id());
        let thread_id: ThreadId = Arc::from(event.thread_id.as_str());
        let session_id = SessionId::new(&platform_id, &thread_id);

        // `!help` answers straight from the Gateway: it's a static reply that doesn't
        // need a live session (or any session state) behind it.
        if name == "help" {
            let body = "Commands: !help, !cd <path>, !permissions, !stop, !invite @user, \
                        !kick @user, !escape, !update [now]";
            if let Err(error) = platform.create_post(&event.thread_id, body).await {
                tracing::warn!(%error, "failed to post help text");
            }
            return;
        }

        let command = match name.as_str() {
            "cd" => Command::Cd(arg.to_string()),
            "permissions" => Command::Permissions,
            "stop" => Command::Stop,
            "invite" => Command::Invite(UserId::from(strip_mention(arg))),
            "kick" => Command::Kick(UserId::from(strip_mention(arg))),
            "escape" => Command::Escape,
            "update" => Command::Update { now: arg.eq_ignore_ascii_case("now") },
            _ => {
                let _ = platform
                    .create_post(&event.thread_id, &format!("unknown command: !{name}"))
                    .await;
                return;
            }
        };

        if let Err(error) = self.sessions.submit_command(&session_id, command).await {
            tracing::debug!(%error, thread = %event.thread_id, "command had no session to act on");
        }
    }
}

/// Strip a leading `@` from a platform mention token, so `!invite @alice` and
/// `!invite alice` both resolve to the same user id.
fn strip_mention(token: &str) -> &str {
    token.strip_prefix('@').unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_mention_removes_at_sign() {
        assert_eq!(strip_mention("@alice"), "alice");
        assert_eq!(strip_mention("alice"), "alice");
    }
}
