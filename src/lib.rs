//! threadbot: a chat-platform mediator that turns a thread in Mattermost or Slack into
//! an interactive programming-assistant session.

pub mod assistant;
pub mod breaker;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executors;
pub mod formatter;
pub mod gateway;
pub mod logging;
pub mod platform;
pub mod reactions;
pub mod session;
pub mod sticky;
pub mod threadlog;
pub mod tracker;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identifies one configured platform connection (one entry under `platforms:` in config).
pub type PlatformId = Arc<str>;

/// A platform-native thread identifier (opaque to the session runtime).
pub type ThreadId = Arc<str>;

/// `session-id = platform-id + ":" + thread-id`, the primary key for the Session Manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn new(platform_id: &str, thread_id: &str) -> Self {
        Self(Arc::from(format!("{platform_id}:{thread_id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque post identifier as returned by a platform port.
pub type PostId = Arc<str>;

/// A chat user identifier, platform-native (Slack `U...`/Mattermost user id).
pub type UserId = Arc<str>;
