//! Slack platform adapter using slack-morphism: Socket Mode ingestion, Web API publishing.

use super::{
    Attachment, CreatedPost, EventStream, Formatter, InboundEvent, InitialReactions,
    MessageLimits, Platform, PlatformEvent, ReactionAction, ReactionEvent, canonical_emoji,
};
use crate::error::{PlatformError, Result};
use anyhow::Context as _;
use slack_morphism::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;

const MAX_LENGTH: usize = 40_000;
const HARD_THRESHOLD: usize = 39_000;
const SOFT_THRESHOLD: usize = 3_500;
const MAX_LINES: usize = 200;

#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub id: String,
    pub display_name: String,
    pub bot_token: String,
    pub app_token: String,
    pub channel_id: String,
    pub bot_name: String,
    pub allowed_users: HashSet<String>,
}

/// State shared with socket-mode callbacks via `SlackClientEventsUserState`.
struct SlackAdapterState {
    inbound_tx: mpsc::Sender<PlatformEvent>,
    channel_id: String,
    bot_user_id: String,
}

pub struct SlackPlatform {
    config: SlackConfig,
    client: Arc<SlackHyperClient>,
    token: SlackApiToken,
    shutdown_tx: RwLock<Option<mpsc::Sender<()>>>,
    formatter: SlackFormatter,
}

impl SlackPlatform {
    pub fn new(config: SlackConfig) -> Result<Self> {
        let client = Arc::new(SlackClient::new(
            SlackClientHyperConnector::new().context("failed to create slack HTTP connector")?,
        ));
        let token = SlackApiToken::new(SlackApiTokenValue(config.bot_token.clone()));
        Ok(Self {
            config,
            client,
            token,
            shutdown_tx: RwLock::new(None),
            formatter: SlackFormatter,
        })
    }

    fn session(&self) -> SlackClientSession<'_, SlackClientHyperHttpsConnector> {
        self.client.open_session(&self.token)
    }

    fn channel(&self) -> SlackChannelId {
        SlackChannelId(self.config.channel_id.clone())
    }
}

async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> UserCallbackResult<()> {
    if let SlackEventCallbackBody::Message(msg) = event.event {
        handle_message_event(msg, states).await?;
    }
    Ok(())
}

async fn handle_message_event(
    msg_event: SlackMessageEvent,
    states: SlackClientEventsUserState,
) -> UserCallbackResult<()> {
    // Edits/deletes/bot_message subtypes are not new session turns.
    if msg_event.subtype.is_some() {
        return Ok(());
    }

    let state_guard = states.read().await;
    let adapter_state = state_guard
        .get_user_state::<Arc<SlackAdapterState>>()
        .expect("SlackAdapterState must be in user_state");

    let channel_id = msg_event
        .origin
        .channel
        .as_ref()
        .map(|c| c.0.clone())
        .unwrap_or_default();
    if channel_id != adapter_state.channel_id {
        return Ok(());
    }

    let user_id = match msg_event.sender.user.as_ref() {
        Some(u) if u.0 != adapter_state.bot_user_id => u.0.clone(),
        _ => return Ok(()),
    };

    let ts = msg_event.origin.ts.0.clone();
    let thread_id = msg_event
        .origin
        .thread_ts
        .as_ref()
        .map(|t| t.0.clone())
        .unwrap_or_else(|| ts.clone());
    let parent_post_id = msg_event.origin.thread_ts.as_ref().map(|_| ts.clone());

    let raw_text = msg_event.content.as_ref().and_then(|c| c.text.clone()).unwrap_or_default();
    let is_mention = raw_text.contains(&format!("<@{}>", adapter_state.bot_user_id));
    let text = strip_bot_mention(&raw_text, &adapter_state.bot_user_id);

    let event = InboundEvent {
        post_id: ts,
        thread_id,
        parent_post_id,
        user: user_id,
        text,
        files: Vec::new(),
        is_mention,
        is_bot: false,
        ts: chrono::Utc::now(),
    };

    if let Err(error) = adapter_state.inbound_tx.send(PlatformEvent::Message(event)).await {
        tracing::warn!(%error, "failed to enqueue slack message");
    }

    Ok(())
}

async fn handle_interaction_event(
    event: SlackInteractionEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> UserCallbackResult<()> {
    // Reaction clicks come through the events API, not interactions; block actions
    // (e.g. button-based approvals) are out of scope for this port — the reaction
    // vocabulary (spec §6) is the interaction surface.
    let _ = event;
    let _ = states;
    Ok(())
}

fn slack_error_handler(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> HttpStatusCode {
    tracing::warn!(error = %err, "slack socket mode error");
    HttpStatusCode::OK
}

impl Platform for SlackPlatform {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn start(&self) -> Result<EventStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let auth_response = self
            .session()
            .auth_test()
            .await
            .map_err(|e| PlatformError::Auth(e.to_string()))?;
        let bot_user_id = auth_response.user_id.0.clone();

        let adapter_state = Arc::new(SlackAdapterState {
            inbound_tx,
            channel_id: self.config.channel_id.clone(),
            bot_user_id,
        });

        let callbacks = SlackSocketModeListenerCallbacks::new()
            .with_push_events(handle_push_event)
            .with_interaction_events(handle_interaction_event);

        let listener_client = Arc::new(
            SlackClient::new(
                SlackClientHyperConnector::new()
                    .context("failed to create slack socket mode connector")
                    .map_err(|e| PlatformError::Transport(e.to_string()))?,
            ),
        );

        let listener_environment = Arc::new(
            SlackClientEventsListenerEnvironment::new(listener_client)
                .with_error_handler(slack_error_handler)
                .with_user_state(adapter_state),
        );

        let listener = SlackClientSocketModeListener::new(
            &SlackClientSocketModeConfig::new(),
            listener_environment,
            callbacks,
        );

        let app_token = SlackApiToken::new(SlackApiTokenValue(self.config.app_token.clone()));

        listener
            .listen_for(&app_token)
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        tokio::spawn(async move {
            tracing::info!("slack socket mode connected");
            tokio::select! {
                exit_code = listener.serve() => {
                    tracing::info!(exit_code, "slack socket mode listener stopped");
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("slack socket mode shutting down");
                    listener.shutdown().await;
                }
            }
        });

        let events = ReceiverStream::new(inbound_rx);
        Ok(Box::pin(events))
    }

    async fn create_post(&self, thread_id: &str, body: &str) -> Result<CreatedPost> {
        let session = self.session();
        let mut req = SlackApiChatPostMessageRequest::new(
            self.channel(),
            SlackMessageContent::new().with_text(body.to_string()),
        );
        if !thread_id.is_empty() {
            req = req.opt_thread_ts(Some(SlackTs(thread_id.to_string())));
        }
        let resp = session
            .chat_post_message(&req)
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(CreatedPost {
            post_id: resp.ts.0,
            thread_id: thread_id.to_string(),
        })
    }

    async fn create_interactive_post(
        &self,
        thread_id: &str,
        body: &str,
        initial_reactions: InitialReactions<'_>,
    ) -> Result<CreatedPost> {
        let post = self.create_post(thread_id, body).await?;
        for emoji in initial_reactions {
            if let Err(error) = self.add_reaction(&post.post_id, emoji).await {
                tracing::warn!(%error, post_id = %post.post_id, emoji, "failed to attach initial reaction");
            }
        }
        Ok(post)
    }

    async fn update_post(&self, post_id: &str, body: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiChatUpdateRequest::new(
            self.channel(),
            SlackMessageContent::new().with_text(body.to_string()),
            SlackTs(post_id.to_string()),
        );
        session.chat_update(&req).await.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("message_not_found") {
                PlatformError::PostGone(post_id.to_string())
            } else {
                PlatformError::Transport(msg)
            }
        })?;
        Ok(())
    }

    async fn delete_post(&self, post_id: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiChatDeleteRequest::new(self.channel(), SlackTs(post_id.to_string()));
        match session.chat_delete(&req).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("message_not_found") => Ok(()),
            Err(e) => Err(PlatformError::Transport(e.to_string()).into()),
        }
    }

    async fn pin_post(&self, post_id: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiPinsAddRequest::new(self.channel(), SlackTs(post_id.to_string()));
        let _ = session.pins_add(&req).await;
        Ok(())
    }

    async fn unpin_post(&self, post_id: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiPinsRemoveRequest::new(self.channel(), SlackTs(post_id.to_string()));
        let _ = session.pins_remove(&req).await;
        Ok(())
    }

    async fn add_reaction(&self, post_id: &str, emoji: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiReactionsAddRequest::new(
            self.channel(),
            SlackReactionName(sanitize_reaction_name(emoji)),
            SlackTs(post_id.to_string()),
        );
        match session.reactions_add(&req).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already_reacted") => Ok(()),
            Err(e) => Err(PlatformError::Transport(e.to_string()).into()),
        }
    }

    async fn remove_reaction(&self, post_id: &str, emoji: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiReactionsRemoveRequest::new(SlackReactionName(sanitize_reaction_name(
            emoji,
        )))
        .with_channel(self.channel())
        .with_timestamp(SlackTs(post_id.to_string()));
        let _ = session.reactions_remove(&req).await;
        Ok(())
    }

    async fn send_typing(&self, thread_id: &str) -> Result<()> {
        let session = self.session();
        let req = SlackApiAssistantThreadsSetStatusRequest {
            channel_id: self.channel(),
            thread_ts: SlackTs(thread_id.to_string()),
            status: "Thinking…".to_string(),
        };
        // Only meaningful inside Slack Assistant threads; best-effort elsewhere.
        let _ = session.assistant_threads_set_status(&req).await;
        Ok(())
    }

    fn message_limits(&self) -> MessageLimits {
        MessageLimits {
            max_length: MAX_LENGTH,
            soft_threshold: SOFT_THRESHOLD,
            hard_threshold: HARD_THRESHOLD,
            max_lines: MAX_LINES,
        }
    }

    fn formatter(&self) -> &dyn Formatter {
        &self.formatter
    }

    fn is_user_allowed(&self, user: &str) -> bool {
        self.config.allowed_users.is_empty() || self.config.allowed_users.contains(user)
    }
}

fn strip_bot_mention(text: &str, bot_user_id: &str) -> String {
    let mention = format!("<@{bot_user_id}>");
    text.replace(&mention, "").trim().to_string()
}

fn sanitize_reaction_name(emoji: &str) -> String {
    emoji.trim().trim_matches(':').to_lowercase()
}

/// `mrkdwn`-flavored formatter. Slack has no heading syntax; `heading` degrades to bold.
struct SlackFormatter;

impl Formatter for SlackFormatter {
    fn bold(&self, text: &str) -> String {
        format!("*{text}*")
    }

    fn italic(&self, text: &str) -> String {
        format!("_{text}_")
    }

    fn code(&self, text: &str) -> String {
        format!("`{text}`")
    }

    fn code_block(&self, text: &str, _language: Option<&str>) -> String {
        format!("```{text}```")
    }

    fn link(&self, text: &str, url: &str) -> String {
        format!("<{url}|{text}>")
    }

    fn strikethrough(&self, text: &str) -> String {
        format!("~{text}~")
    }

    fn user_mention(&self, user_id: &str) -> String {
        format!("<@{user_id}>")
    }

    fn horizontal_rule(&self) -> String {
        "──────────".to_string()
    }

    fn heading(&self, _level: u8, text: &str) -> String {
        format!("*{text}*\n")
    }

    fn markdown_to_native(&self, text: &str) -> String {
        // GFM bold/italic/strikethrough happen to collide with mrkdwn's own syntax for
        // bold and strikethrough; only double-asterisk bold and double-tilde strikethrough
        // need rewriting to single-character mrkdwn form.
        text.replace("**", "*").replace("~~", "~")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatter_degrades_headings_to_bold() {
        let fmt = SlackFormatter;
        assert_eq!(fmt.heading(1, "Title"), "*Title*\n");
    }

    #[test]
    fn formatter_rewrites_gfm_emphasis_to_mrkdwn() {
        let fmt = SlackFormatter;
        assert_eq!(fmt.markdown_to_native("**bold** and ~~gone~~"), "*bold* and ~gone~");
    }

    #[test]
    fn strip_bot_mention_removes_all_occurrences() {
        assert_eq!(strip_bot_mention("<@U123> hello <@U123>", "U123"), "hello");
    }

    #[test]
    fn sanitize_reaction_name_strips_colons() {
        assert_eq!(sanitize_reaction_name(":thumbsup:"), "thumbsup");
    }
}
