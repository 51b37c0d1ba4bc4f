//! Platform Port: the abstract contract every chat backend implements.
//!
//! Mirrors the static-trait/object-safe-companion split the messaging layer this evolved
//! from used (`Messaging` / `MessagingDyn`): adapters implement the ergonomic `Platform`
//! trait directly; the runtime stores them as `Arc<dyn PlatformDyn>` via the blanket impl
//! below, so no platform-specific type ever leaks past this module.

pub mod mattermost;
pub mod slack;

use crate::error::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Stream of ingested platform events (messages and reactions interleaved in arrival order).
pub type EventStream = Pin<Box<dyn Stream<Item = PlatformEvent> + Send>>;

/// A message or reaction observed on the platform.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Message(InboundEvent),
    Reaction(ReactionEvent),
}

/// An inbound chat message, normalized across platforms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub post_id: String,
    pub thread_id: String,
    /// The post this one is a reply to, if any. `None` for a thread root.
    pub parent_post_id: Option<String>,
    pub user: String,
    pub text: String,
    #[serde(default)]
    pub files: Vec<Attachment>,
    pub is_mention: bool,
    pub is_bot: bool,
    pub ts: chrono::DateTime<chrono::Utc>,
}

/// A reaction add/remove event, normalized across platforms.
///
/// `emoji` is already canonicalized to the `emojis` crate's short-code form
/// (`+1`, `-1`, `one`, …) by the adapter before this event is constructed, so the
/// Reaction Router and executors never see platform-native spellings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub post_id: String,
    pub thread_id: String,
    pub emoji: String,
    pub user: String,
    pub action: ReactionAction,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Added,
    Removed,
}

/// A file attachment on an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: Option<u64>,
}

/// A created post, as returned by `create_post`/`create_interactive_post`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPost {
    pub post_id: String,
    pub thread_id: String,
}

/// Platform-specific size and pacing constants driving the Content Breaker (spec §4.3).
#[derive(Debug, Clone, Copy)]
pub struct MessageLimits {
    /// Hard byte/char cap the platform itself enforces; exceeding it is rejected outright.
    pub max_length: usize,
    /// Soft threshold: crossing it triggers an early flush even if `max_length` is far off.
    pub soft_threshold: usize,
    /// Hard threshold below `max_length` used as the upper edge of the hard-break search
    /// window (spec §4.3 step 3: `[0.7 * hard, hard]`).
    pub hard_threshold: usize,
    /// Soft cap on line count, the other `should-flush-early` trigger.
    pub max_lines: usize,
}

/// Markdown/native-formatting operations, since platforms disagree on dialect
/// (GFM vs Slack `mrkdwn`).
pub trait Formatter: Send + Sync {
    fn bold(&self, text: &str) -> String;
    fn italic(&self, text: &str) -> String;
    fn code(&self, text: &str) -> String;
    fn code_block(&self, text: &str, language: Option<&str>) -> String;
    fn link(&self, text: &str, url: &str) -> String;
    fn strikethrough(&self, text: &str) -> String;
    fn user_mention(&self, user_id: &str) -> String;
    fn horizontal_rule(&self) -> String;
    fn heading(&self, level: u8, text: &str) -> String;
    /// Best-effort rewrite of generic GFM-ish markdown into this platform's native dialect.
    /// Used when a body was assembled with generic markdown helpers before a
    /// platform-specific formatter was available (e.g. error cards).
    fn markdown_to_native(&self, text: &str) -> String;
}

/// Initial reactions to attach to an interactive post, created atomically with the post
/// (spec §4.1: some platforms need reactions attached in the same call as creation so they
/// don't race a just-deleted ghost message).
pub type InitialReactions<'a> = &'a [&'a str];

/// The narrow, ergonomic trait platform adapters implement directly.
///
/// Every method mirrors one bullet of spec §4.1. Default no-op/best-effort bodies are
/// provided for operations that are optional on some platforms (pin/unpin, download).
pub trait Platform: Send + Sync + 'static {
    /// Slug identifying this configured platform connection (`platforms[].id`).
    fn id(&self) -> &str;

    fn start(&self) -> impl std::future::Future<Output = Result<EventStream>> + Send;

    fn create_post(
        &self,
        thread_id: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<CreatedPost>> + Send;

    fn create_interactive_post(
        &self,
        thread_id: &str,
        body: &str,
        initial_reactions: InitialReactions<'_>,
    ) -> impl std::future::Future<Output = Result<CreatedPost>> + Send;

    fn update_post(
        &self,
        post_id: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn delete_post(&self, post_id: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    fn pin_post(&self, post_id: &str) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            let _ = post_id;
            Ok(())
        }
    }

    fn unpin_post(&self, post_id: &str) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            let _ = post_id;
            Ok(())
        }
    }

    fn add_reaction(
        &self,
        post_id: &str,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn remove_reaction(
        &self,
        post_id: &str,
        emoji: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    fn send_typing(&self, thread_id: &str) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            let _ = thread_id;
            Ok(())
        }
    }

    fn download_file(
        &self,
        file_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send {
        async move {
            let _ = file_id;
            Err(crate::error::PlatformError::Unsupported("download_file".into()).into())
        }
    }

    fn message_limits(&self) -> MessageLimits;

    fn formatter(&self) -> &dyn Formatter;

    fn is_user_allowed(&self, user: &str) -> bool;
}

/// Object-safe companion to [`Platform`], obtained automatically via the blanket impl below.
/// The runtime stores adapters as `Arc<dyn PlatformDyn>` so the Session Manager and Gateway
/// never need to be generic over a concrete platform type.
pub trait PlatformDyn: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn start<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<EventStream>> + Send + 'a>>;

    fn create_post<'a>(
        &'a self,
        thread_id: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<CreatedPost>> + Send + 'a>>;

    fn create_interactive_post<'a>(
        &'a self,
        thread_id: &'a str,
        body: &'a str,
        initial_reactions: InitialReactions<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<CreatedPost>> + Send + 'a>>;

    fn update_post<'a>(
        &'a self,
        post_id: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn delete_post<'a>(
        &'a self,
        post_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn pin_post<'a>(
        &'a self,
        post_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn unpin_post<'a>(
        &'a self,
        post_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn add_reaction<'a>(
        &'a self,
        post_id: &'a str,
        emoji: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn remove_reaction<'a>(
        &'a self,
        post_id: &'a str,
        emoji: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn send_typing<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

    fn download_file<'a>(
        &'a self,
        file_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>>> + Send + 'a>>;

    fn message_limits(&self) -> MessageLimits;

    fn formatter(&self) -> &dyn Formatter;

    fn is_user_allowed(&self, user: &str) -> bool;
}

impl<T: Platform> PlatformDyn for T {
    fn id(&self) -> &str {
        Platform::id(self)
    }

    fn start<'a>(
        &'a self,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<EventStream>> + Send + 'a>> {
        Box::pin(Platform::start(self))
    }

    fn create_post<'a>(
        &'a self,
        thread_id: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<CreatedPost>> + Send + 'a>> {
        Box::pin(Platform::create_post(self, thread_id, body))
    }

    fn create_interactive_post<'a>(
        &'a self,
        thread_id: &'a str,
        body: &'a str,
        initial_reactions: InitialReactions<'a>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<CreatedPost>> + Send + 'a>> {
        Box::pin(Platform::create_interactive_post(
            self,
            thread_id,
            body,
            initial_reactions,
        ))
    }

    fn update_post<'a>(
        &'a self,
        post_id: &'a str,
        body: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::update_post(self, post_id, body))
    }

    fn delete_post<'a>(
        &'a self,
        post_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::delete_post(self, post_id))
    }

    fn pin_post<'a>(
        &'a self,
        post_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::pin_post(self, post_id))
    }

    fn unpin_post<'a>(
        &'a self,
        post_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::unpin_post(self, post_id))
    }

    fn add_reaction<'a>(
        &'a self,
        post_id: &'a str,
        emoji: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::add_reaction(self, post_id, emoji))
    }

    fn remove_reaction<'a>(
        &'a self,
        post_id: &'a str,
        emoji: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::remove_reaction(self, post_id, emoji))
    }

    fn send_typing<'a>(
        &'a self,
        thread_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(Platform::send_typing(self, thread_id))
    }

    fn download_file<'a>(
        &'a self,
        file_id: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(Platform::download_file(self, file_id))
    }

    fn message_limits(&self) -> MessageLimits {
        Platform::message_limits(self)
    }

    fn formatter(&self) -> &dyn Formatter {
        Platform::formatter(self)
    }

    fn is_user_allowed(&self, user: &str) -> bool {
        Platform::is_user_allowed(self, user)
    }
}

/// Canonicalize a platform-native emoji name to the `emojis` crate's short-code form,
/// falling back to the input unchanged if it's not a recognized alias (custom emoji).
pub fn canonical_emoji(native_name: &str) -> String {
    emojis::get_by_shortcode(native_name)
        .and_then(|e| e.shortcode())
        .map(str::to_string)
        .unwrap_or_else(|| native_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_emoji_passes_through_unknown_names() {
        assert_eq!(canonical_emoji("my_custom_emoji"), "my_custom_emoji");
    }

    #[test]
    fn canonical_emoji_normalizes_known_aliases() {
        // "thumbsup" is a common Slack-native alias for the same emoji as "+1".
        let canon = canonical_emoji("thumbsup");
        assert!(!canon.is_empty());
    }
}

/// An in-memory [`Platform`] fake shared by executor/dispatcher/sticky-layout unit tests,
/// so those modules don't each hand-roll a post-store double.
#[cfg(test)]
pub mod tests_support {
    use super::*;
    use crate::error::PlatformError;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::RwLock;

    #[derive(Debug, Clone)]
    pub struct FakePost {
        pub body: String,
        pub reactions: HashSet<String>,
        pub pinned: bool,
    }

    pub struct FakePlatform {
        posts: RwLock<HashMap<String, FakePost>>,
        next_id: AtomicU64,
        formatter: FakeFormatter,
        pub allow_all: std::sync::atomic::AtomicBool,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            Self {
                posts: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                formatter: FakeFormatter,
                allow_all: std::sync::atomic::AtomicBool::new(true),
            }
        }

        pub async fn post_count(&self) -> usize {
            self.posts.read().await.len()
        }

        pub async fn body_of(&self, post_id: &str) -> Option<String> {
            self.posts.read().await.get(post_id).map(|p| p.body.clone())
        }

        pub async fn reactions_of(&self, post_id: &str) -> HashSet<String> {
            self.posts
                .read()
                .await
                .get(post_id)
                .map(|p| p.reactions.clone())
                .unwrap_or_default()
        }

        pub async fn is_pinned(&self, post_id: &str) -> bool {
            self.posts
                .read()
                .await
                .get(post_id)
                .map(|p| p.pinned)
                .unwrap_or(false)
        }

        fn alloc_id(&self) -> String {
            format!("p{}", self.next_id.fetch_add(1, Ordering::SeqCst))
        }
    }

    impl Default for FakePlatform {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Platform for FakePlatform {
        fn id(&self) -> &str {
            "fake"
        }

        async fn start(&self) -> Result<EventStream> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn create_post(&self, thread_id: &str, body: &str) -> Result<CreatedPost> {
            let id = self.alloc_id();
            self.posts.write().await.insert(
                id.clone(),
                FakePost {
                    body: body.to_string(),
                    reactions: HashSet::new(),
                    pinned: false,
                },
            );
            Ok(CreatedPost {
                post_id: id,
                thread_id: thread_id.to_string(),
            })
        }

        async fn create_interactive_post(
            &self,
            thread_id: &str,
            body: &str,
            initial_reactions: InitialReactions<'_>,
        ) -> Result<CreatedPost> {
            let created = self.create_post(thread_id, body).await?;
            for emoji in initial_reactions {
                self.add_reaction(&created.post_id, emoji).await?;
            }
            Ok(created)
        }

        async fn update_post(&self, post_id: &str, body: &str) -> Result<()> {
            let mut posts = self.posts.write().await;
            match posts.get_mut(post_id) {
                Some(p) => {
                    p.body = body.to_string();
                    Ok(())
                }
                None => Err(PlatformError::PostGone(post_id.to_string()).into()),
            }
        }

        async fn delete_post(&self, post_id: &str) -> Result<()> {
            self.posts.write().await.remove(post_id);
            Ok(())
        }

        async fn pin_post(&self, post_id: &str) -> Result<()> {
            if let Some(p) = self.posts.write().await.get_mut(post_id) {
                p.pinned = true;
            }
            Ok(())
        }

        async fn unpin_post(&self, post_id: &str) -> Result<()> {
            if let Some(p) = self.posts.write().await.get_mut(post_id) {
                p.pinned = false;
            }
            Ok(())
        }

        async fn add_reaction(&self, post_id: &str, emoji: &str) -> Result<()> {
            if let Some(p) = self.posts.write().await.get_mut(post_id) {
                p.reactions.insert(emoji.to_string());
            }
            Ok(())
        }

        async fn remove_reaction(&self, post_id: &str, emoji: &str) -> Result<()> {
            if let Some(p) = self.posts.write().await.get_mut(post_id) {
                p.reactions.remove(emoji);
            }
            Ok(())
        }

        fn message_limits(&self) -> MessageLimits {
            MessageLimits {
                max_length: 16_383,
                soft_threshold: 12_000,
                hard_threshold: 15_500,
                max_lines: 200,
            }
        }

        fn formatter(&self) -> &dyn Formatter {
            &self.formatter
        }

        fn is_user_allowed(&self, _user: &str) -> bool {
            self.allow_all.load(Ordering::SeqCst)
        }
    }

    struct FakeFormatter;

    impl Formatter for FakeFormatter {
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
}
