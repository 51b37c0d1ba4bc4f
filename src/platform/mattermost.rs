//! Mattermost platform adapter: REST publishing, websocket ingestion.

use super::{
    Attachment, CreatedPost, EventStream, Formatter, InboundEvent, InitialReactions,
    MessageLimits, Platform, PlatformEvent, ReactionAction, ReactionEvent, canonical_emoji,
};
use crate::error::{PlatformError, Result};
use async_stream::stream;
use futures::{SinkExt, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

const DEFAULT_MAX_LENGTH: usize = 16_383;
const DEFAULT_HARD_THRESHOLD: usize = 15_500;
const DEFAULT_SOFT_THRESHOLD: usize = 12_000;
const DEFAULT_MAX_LINES: usize = 200;
const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Configuration for one Mattermost platform entry (spec §6).
#[derive(Debug, Clone)]
pub struct MattermostConfig {
    pub id: String,
    pub display_name: String,
    pub url: String,
    pub token: String,
    pub channel_id: String,
    pub bot_name: String,
    pub allowed_users: HashSet<String>,
}

pub struct MattermostPlatform {
    config: MattermostConfig,
    http: Client,
    formatter: MattermostFormatter,
}

impl MattermostPlatform {
    pub fn new(config: MattermostConfig) -> Self {
        let http = Client::builder()
            .user_agent("threadbot/0.1")
            .build()
            .expect("reqwest client build");
        Self {
            config,
            http,
            formatter: MattermostFormatter,
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.config.url.trim_end_matches('/'))
    }

    fn ws_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("wss://{base}")
        };
        format!("{ws_base}/api/v4/websocket")
    }

    async fn handle_transport(resp: reqwest::Response) -> Result<reqwest::Response> {
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                Err(PlatformError::PostGone(resp.url().to_string()).into())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(PlatformError::Auth(format!("status {}", resp.status())).into())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                Err(PlatformError::RateLimited { retry_after_secs }.into())
            }
            s if s.is_server_error() => Err(PlatformError::Transport(format!("status {s}")).into()),
            s if s.is_success() => Ok(resp),
            s => Err(PlatformError::Transport(format!("status {s}")).into()),
        }
    }
}

impl Platform for MattermostPlatform {
    fn id(&self) -> &str {
        &self.config.id
    }

    async fn start(&self) -> Result<EventStream> {
        let ws_url = self.ws_url();
        let token = self.config.token.clone();
        let channel_id = self.config.channel_id.clone();

        let stream = stream! {
            let mut backoff = RECONNECT_BASE;
            loop {
                let connect = tokio_tungstenite::connect_async(&ws_url).await;
                let (mut socket, _) = match connect {
                    Ok(pair) => pair,
                    Err(error) => {
                        tracing::warn!(%error, url = %ws_url, backoff_ms = backoff.as_millis(), "mattermost websocket connect failed, retrying");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(RECONNECT_CAP);
                        continue;
                    }
                };

                let auth = json!({
                    "seq": 1,
                    "action": "authentication_challenge",
                    "data": { "token": token },
                });
                if socket.send(WsMessage::text(auth.to_string())).await.is_err() {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RECONNECT_CAP);
                    continue;
                }

                backoff = RECONNECT_BASE;

                loop {
                    match socket.next().await {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(event) = parse_ws_event(&text, &channel_id) {
                                yield event;
                            }
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(error)) => {
                            tracing::warn!(%error, "mattermost websocket error, reconnecting");
                            break;
                        }
                        None => {
                            tracing::warn!("mattermost websocket closed, reconnecting");
                            break;
                        }
                    }
                }

                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_CAP);
            }
        };

        Ok(Box::pin(stream))
    }

    async fn create_post(&self, thread_id: &str, body: &str) -> Result<CreatedPost> {
        let resp = self
            .http
            .post(self.api("/posts"))
            .bearer_auth(&self.config.token)
            .json(&json!({
                "channel_id": self.config.channel_id,
                "root_id": thread_id,
                "message": body,
            }))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let resp = Self::handle_transport(resp).await?;
        let post: MmPost = resp
            .json()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(CreatedPost {
            post_id: post.id,
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
            // Best-effort: a single failed reaction shouldn't unwind the whole post creation.
            if let Err(error) = self.add_reaction(&post.post_id, emoji).await {
                tracing::warn!(%error, post_id = %post.post_id, emoji, "failed to attach initial reaction");
            }
        }
        Ok(post)
    }

    async fn update_post(&self, post_id: &str, body: &str) -> Result<()> {
        let resp = self
            .http
            .put(self.api(&format!("/posts/{post_id}/patch")))
            .bearer_auth(&self.config.token)
            .json(&json!({ "message": body }))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Self::handle_transport(resp).await?;
        Ok(())
    }

    async fn delete_post(&self, post_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.api(&format!("/posts/{post_id}")))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        // Deleting an already-gone post is idempotent, per spec §4.1.
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(()),
            _ => {
                Self::handle_transport(resp).await?;
                Ok(())
            }
        }
    }

    async fn pin_post(&self, post_id: &str) -> Result<()> {
        let _ = self
            .http
            .post(self.api(&format!("/posts/{post_id}/pin")))
            .bearer_auth(&self.config.token)
            .send()
            .await;
        Ok(())
    }

    async fn unpin_post(&self, post_id: &str) -> Result<()> {
        let _ = self
            .http
            .post(self.api(&format!("/posts/{post_id}/unpin")))
            .bearer_auth(&self.config.token)
            .send()
            .await;
        Ok(())
    }

    async fn add_reaction(&self, post_id: &str, emoji: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.api("/reactions"))
            .bearer_auth(&self.config.token)
            .json(&json!({ "post_id": post_id, "emoji_name": emoji }))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        // Adding a reaction that already exists is idempotent per spec §4.1.
        if resp.status() == StatusCode::BAD_REQUEST {
            return Ok(());
        }
        Self::handle_transport(resp).await?;
        Ok(())
    }

    async fn remove_reaction(&self, post_id: &str, emoji: &str) -> Result<()> {
        // user_id path segment is required by the API but Mattermost resolves "me" server-side
        // for bot tokens in recent versions; fall back to a best-effort no-op on failure.
        let _ = self
            .http
            .delete(self.api(&format!("/users/me/posts/{post_id}/reactions/{emoji}")))
            .bearer_auth(&self.config.token)
            .send()
            .await;
        Ok(())
    }

    async fn send_typing(&self, thread_id: &str) -> Result<()> {
        let _ = self
            .http
            .post(self.api("/users/me/typing"))
            .bearer_auth(&self.config.token)
            .json(&json!({ "channel_id": self.config.channel_id, "parent_id": thread_id }))
            .send()
            .await;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.api(&format!("/files/{file_id}")))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let resp = Self::handle_transport(resp).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn message_limits(&self) -> MessageLimits {
        MessageLimits {
            max_length: DEFAULT_MAX_LENGTH,
            soft_threshold: DEFAULT_SOFT_THRESHOLD,
            hard_threshold: DEFAULT_HARD_THRESHOLD,
            max_lines: DEFAULT_MAX_LINES,
        }
    }

    fn formatter(&self) -> &dyn Formatter {
        &self.formatter
    }

    fn is_user_allowed(&self, user: &str) -> bool {
        self.config.allowed_users.is_empty() || self.config.allowed_users.contains(user)
    }
}

#[derive(Debug, Deserialize)]
struct MmPost {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MmWsEnvelope {
    event: String,
    data: serde_json::Value,
    broadcast: Option<MmBroadcast>,
}

#[derive(Debug, Deserialize)]
struct MmBroadcast {
    channel_id: Option<String>,
}

fn parse_ws_event(text: &str, channel_id: &str) -> Option<PlatformEvent> {
    let envelope: MmWsEnvelope = serde_json::from_str(text).ok()?;
    if let Some(broadcast) = &envelope.broadcast {
        if let Some(ch) = &broadcast.channel_id {
            if ch != channel_id {
                return None;
            }
        }
    }

    match envelope.event.as_str() {
        "posted" => {
            let post_json = envelope.data.get("post")?.as_str()?;
            let post: MmWsPost = serde_json::from_str(post_json).ok()?;
            let sender = envelope
                .data
                .get("sender_name")
                .and_then(|v| v.as_str())
                .unwrap_or(&post.user_id)
                .to_string();
            let is_mention = envelope
                .data
                .get("mentions")
                .and_then(|m| m.as_str())
                .map(|m| m.contains(&post.user_id))
                .unwrap_or(false);
            Some(PlatformEvent::Message(InboundEvent {
                post_id: post.id,
                thread_id: if post.root_id.is_empty() {
                    post.channel_id.clone()
                } else {
                    post.root_id
                },
                parent_post_id: None,
                user: sender,
                text: post.message,
                files: Vec::new(),
                is_mention,
                is_bot: false,
                ts: chrono::Utc::now(),
            }))
        }
        "reaction_added" | "reaction_removed" => {
            let reaction_json = envelope.data.get("reaction")?.as_str()?;
            let reaction: MmWsReaction = serde_json::from_str(reaction_json).ok()?;
            Some(PlatformEvent::Reaction(ReactionEvent {
                post_id: reaction.post_id,
                thread_id: channel_id.to_string(),
                emoji: canonical_emoji(&reaction.emoji_name),
                user: reaction.user_id,
                action: if envelope.event == "reaction_added" {
                    ReactionAction::Added
                } else {
                    ReactionAction::Removed
                },
                ts: chrono::Utc::now(),
            }))
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct MmWsPost {
    id: String,
    root_id: String,
    channel_id: String,
    user_id: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct MmWsReaction {
    post_id: String,
    user_id: String,
    emoji_name: String,
}

/// GFM-flavored formatter (Mattermost's default markdown dialect).
struct MattermostFormatter;

impl Formatter for MattermostFormatter {
    fn bold(&self, text: &str) -> String {
        format!("**{text}**")
    }

    fn italic(&self, text: &str) -> String {
        format!("_{text}_")
    }

    fn code(&self, text: &str) -> String {
        format!("`{text}`")
    }

    fn code_block(&self, text: &str, language: Option<&str>) -> String {
        format!("```{}\n{text}\n```", language.unwrap_or(""))
    }

    fn link(&self, text: &str, url: &str) -> String {
        format!("[{text}]({url})")
    }

    fn strikethrough(&self, text: &str) -> String {
        format!("~~{text}~~")
    }

    fn user_mention(&self, user_id: &str) -> String {
        format!("@{user_id}")
    }

    fn horizontal_rule(&self) -> String {
        "---".to_string()
    }

    fn heading(&self, level: u8, text: &str) -> String {
        format!("{} {text}", "#".repeat(level.clamp(1, 6) as usize))
    }

    fn markdown_to_native(&self, text: &str) -> String {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_rewrites_https_to_wss() {
        let platform = MattermostPlatform::new(MattermostConfig {
            id: "mm".into(),
            display_name: "Mattermost".into(),
            url: "https://chat.example.com".into(),
            token: "tok".into(),
            channel_id: "chan".into(),
            bot_name: "bot".into(),
            allowed_users: HashSet::new(),
        });
        assert_eq!(
            platform.ws_url(),
            "wss://chat.example.com/api/v4/websocket"
        );
    }

    #[test]
    fn formatter_matches_gfm_conventions() {
        let fmt = MattermostFormatter;
        assert_eq!(fmt.bold("x"), "**x**");
        assert_eq!(fmt.heading(2, "Title"), "## Title");
    }

    #[test]
    fn is_user_allowed_empty_acl_allows_all() {
        let platform = MattermostPlatform::new(MattermostConfig {
            id: "mm".into(),
            display_name: "Mattermost".into(),
            url: "https://chat.example.com".into(),
            token: "tok".into(),
            channel_id: "chan".into(),
            bot_name: "bot".into(),
            allowed_users: HashSet::new(),
        });
        assert!(platform.is_user_allowed("anyone"));
    }
}
