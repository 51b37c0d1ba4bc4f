//! Runtime configuration (spec §6, §10.2): the YAML file an operator hand-edits before
//! ever starting this process. Loaded once at startup via the `config` crate (YAML file
//! layered under `THREADBOT_*` environment overrides), validated exhaustively, then held
//! behind an `arc_swap::ArcSwap` so the hot-reloadable parts (tool-formatter templates,
//! ACLs) can change without a restart while connection fields stay fixed for the process's
//! lifetime.

use crate::error::{ConfigError, Result};
use anyhow::Context as _;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Top-level configuration (spec §6).
#[derive(Clone, Deserialize, Serialize)]
pub struct RuntimeConfig {
    pub version: u32,
    #[serde(rename = "workingDir")]
    pub working_dir: PathBuf,
    #[serde(default)]
    pub chrome: bool,
    #[serde(rename = "worktreeMode", default)]
    pub worktree_mode: WorktreeMode,
    /// Command used to spawn the assistant subprocess (spec §4.2). Defaults to the
    /// `claude` CLI's stream-json mode, the only assistant this build has been exercised
    /// against; anything implementing the same NDJSON protocol works.
    #[serde(rename = "assistantCommand", default = "default_assistant_command")]
    pub assistant_command: String,
    #[serde(rename = "assistantArgs", default = "default_assistant_args")]
    pub assistant_args: Vec<String>,
    /// How long a session may sit in `Idle` before the Session Manager tears it down
    /// (spec §4.8).
    #[serde(rename = "idleTimeoutSecs", default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Days a thread-log file is kept before the retention sweep deletes it (spec §11.4).
    #[serde(rename = "threadLogRetentionDays", default = "default_thread_log_retention_days")]
    pub thread_log_retention_days: u64,
    /// Extra/overriding `minijinja` templates for the tool formatter registry, keyed by
    /// tool name (spec §11.3). Hot-reloadable the same way ACLs are: picked up by
    /// [`ConfigWatcher`] with no restart. Unlisted tools keep the registry's built-in
    /// templates or its generic fallback.
    #[serde(rename = "toolFormatters", default)]
    pub tool_formatters: std::collections::HashMap<String, String>,
    pub platforms: Vec<PlatformConfig>,
}

fn default_assistant_command() -> String {
    "claude".to_string()
}

fn default_assistant_args() -> Vec<String> {
    vec![
        "--print".to_string(),
        "--output-format".to_string(),
        "stream-json".to_string(),
        "--input-format".to_string(),
        "stream-json".to_string(),
        "--verbose".to_string(),
    ]
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_thread_log_retention_days() -> u64 {
    30
}

impl std::fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("version", &self.version)
            .field("working_dir", &self.working_dir)
            .field("chrome", &self.chrome)
            .field("worktree_mode", &self.worktree_mode)
            .field("assistant_command", &self.assistant_command)
            .field("assistant_args", &self.assistant_args)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("thread_log_retention_days", &self.thread_log_retention_days)
            .field("tool_formatters", &self.tool_formatters)
            .field("platforms", &self.platforms)
            .finish()
    }
}

impl RuntimeConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorktreeMode {
    #[default]
    Prompt,
    Off,
    Require,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlatformConfig {
    Mattermost(MattermostPlatformConfig),
    Slack(SlackPlatformConfig),
}

/// Hand-written so a `Debug`-printed config (common in an error-context chain) never
/// leaks a bot/app token (spec §10.2).
impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformConfig::Mattermost(c) => f
                .debug_struct("Mattermost")
                .field("id", &c.id)
                .field("display_name", &c.display_name)
                .field("url", &c.url)
                .field("token", &"[REDACTED]")
                .field("channel_id", &c.channel_id)
                .field("allowed_users", &c.allowed_users)
                .field("skip_permissions", &c.skip_permissions)
                .finish(),
            PlatformConfig::Slack(c) => f
                .debug_struct("Slack")
                .field("id", &c.id)
                .field("display_name", &c.display_name)
                .field("bot_token", &"[REDACTED]")
                .field("app_token", &"[REDACTED]")
                .field("channel_id", &c.channel_id)
                .field("allowed_users", &c.allowed_users)
                .field("skip_permissions", &c.skip_permissions)
                .finish(),
        }
    }
}

impl PlatformConfig {
    pub fn id(&self) -> &str {
        match self {
            PlatformConfig::Mattermost(c) => &c.id,
            PlatformConfig::Slack(c) => &c.id,
        }
    }

    pub fn allowed_users(&self) -> &[String] {
        match self {
            PlatformConfig::Mattermost(c) => &c.allowed_users,
            PlatformConfig::Slack(c) => &c.allowed_users,
        }
    }

    pub fn skip_permissions(&self) -> bool {
        match self {
            PlatformConfig::Mattermost(c) => c.skip_permissions,
            PlatformConfig::Slack(c) => c.skip_permissions,
        }
    }

    pub fn bot_name(&self) -> &str {
        match self {
            PlatformConfig::Mattermost(c) => &c.bot_name,
            PlatformConfig::Slack(c) => &c.bot_name,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct MattermostPlatformConfig {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub url: String,
    pub token: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
    #[serde(rename = "botName")]
    pub bot_name: String,
    #[serde(rename = "allowedUsers", default)]
    pub allowed_users: Vec<String>,
    #[serde(rename = "skipPermissions", default)]
    pub skip_permissions: bool,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct SlackPlatformConfig {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "botToken")]
    pub bot_token: String,
    #[serde(rename = "appToken")]
    pub app_token: String,
    #[serde(rename = "channelId")]
    pub channel_id: String,
    #[serde(rename = "botName")]
    pub bot_name: String,
    #[serde(rename = "allowedUsers", default)]
    pub allowed_users: Vec<String>,
    #[serde(rename = "skipPermissions", default)]
    pub skip_permissions: bool,
}

static SLUG_RE: std::sync::LazyLock<regex::Regex> =
    std::sync::LazyLock::new(|| regex::Regex::new(r"^[a-z0-9-]+$").unwrap());

/// Load, deserialize, and validate the config at `path`. Environment variables prefixed
/// `THREADBOT_` override individual keys (e.g. `THREADBOT_WORKING_DIR`).
pub fn load(path: &Path) -> Result<RuntimeConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("THREADBOT").separator("_"))
        .build()
        .map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(std::io::Error::other(e.to_string())),
        })?;

    let parsed: RuntimeConfig = settings
        .try_deserialize()
        .with_context(|| format!("failed to parse config at {}", path.display()))?;

    let problems = validate(&parsed);
    if !problems.is_empty() {
        return Err(ConfigError::Invalid(problems).into());
    }

    Ok(parsed)
}

/// Validate every constraint spec §10.2 names, collecting all violations rather than
/// bailing out on the first — a misconfigured deployment gets one actionable report.
pub fn validate(config: &RuntimeConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if config.version != 2 {
        problems.push(format!("version: must be 2, got {}", config.version));
    }

    if config.platforms.is_empty() {
        problems.push("platforms: at least one platform entry is required".to_string());
    }

    let mut seen_ids = std::collections::HashSet::new();
    for platform in &config.platforms {
        let id = platform.id();
        if !SLUG_RE.is_match(id) {
            problems.push(format!("platforms[{id}].id: must match [a-z0-9-]+"));
        }
        if !seen_ids.insert(id.to_string()) {
            problems.push(format!("platforms[{id}].id: duplicate platform id"));
        }

        match platform {
            PlatformConfig::Mattermost(c) => {
                if !(c.url.starts_with("http://") || c.url.starts_with("https://")) {
                    problems.push(format!("platforms[{id}].url: must be an http(s) URL"));
                }
                if c.token.is_empty() {
                    problems.push(format!("platforms[{id}].token: must not be empty"));
                }
                if c.channel_id.is_empty() {
                    problems.push(format!("platforms[{id}].channelId: must not be empty"));
                }
            }
            PlatformConfig::Slack(c) => {
                if !c.bot_token.starts_with("xoxb-") {
                    problems.push(format!("platforms[{id}].botToken: must start with \"xoxb-\""));
                }
                if !c.app_token.starts_with("xapp-") {
                    problems.push(format!("platforms[{id}].appToken: must start with \"xapp-\""));
                }
                if !(c.channel_id.starts_with('C') || c.channel_id.starts_with('G')) {
                    problems.push(format!("platforms[{id}].channelId: must start with \"C\" or \"G\""));
                }
            }
        }
    }

    problems
}

/// Watches the config file for changes and swaps a validated reparse into `current`.
/// Connection fields (url/token/channelId) are part of the swapped value but callers must
/// not act on a changed connection field without a restart (spec §10.2) — this watcher
/// only feeds downstream consumers (tool-formatter templates, ACL checks) that are safe
/// to read live.
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn spawn(path: PathBuf, current: Arc<ArcSwap<RuntimeConfig>>) -> Result<Self> {
        use notify::Watcher;

        let (tx, mut rx) = mpsc::channel(16);
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
            if let Ok(event) = event {
                let _ = tx.try_send(event);
            }
        })
        .context("failed to create config file watcher")?;
        watcher
            .watch(&path, notify::RecursiveMode::NonRecursive)
            .context("failed to watch config file")?;

        tokio::spawn(async move {
            // Debounce: collapse a burst of filesystem events (editors often write via a
            // temp file + rename) into one reload attempt.
            while rx.recv().await.is_some() {
                while tokio::time::timeout(Duration::from_millis(250), rx.recv()).await.is_ok() {}
                match load(&path) {
                    Ok(fresh) => {
                        tracing::info!(path = %path.display(), "config reloaded");
                        current.store(Arc::new(fresh));
                    }
                    Err(error) => {
                        tracing::warn!(%error, path = %path.display(), "config reload failed, keeping previous config");
                    }
                }
            }
        });

        Ok(Self { _watcher: watcher })
    }
}

/// Default config file location (spec §10.4: `dirs::config_dir()`-rooted).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("threadbot")
        .join("config.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mattermost() -> PlatformConfig {
        PlatformConfig::Mattermost(MattermostPlatformConfig {
            id: "mm-main".into(),
            display_name: "Main".into(),
            url: "https://chat.example.com".into(),
            token: "tok".into(),
            channel_id: "abc123".into(),
            bot_name: "threadbot".into(),
            allowed_users: vec![],
            skip_permissions: false,
        })
    }

    #[test]
    fn valid_config_has_no_problems() {
        let config = RuntimeConfig {
            version: 2,
            working_dir: PathBuf::from("/tmp"),
            chrome: false,
            worktree_mode: WorktreeMode::Prompt,
            assistant_command: default_assistant_command(),
            assistant_args: default_assistant_args(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_log_retention_days: default_thread_log_retention_days(),
            tool_formatters: std::collections::HashMap::new(),
            platforms: vec![sample_mattermost()],
        };
        assert!(validate(&config).is_empty());
    }

    #[test]
    fn empty_platforms_is_a_problem() {
        let config = RuntimeConfig {
            version: 2,
            working_dir: PathBuf::from("/tmp"),
            chrome: false,
            worktree_mode: WorktreeMode::Prompt,
            assistant_command: default_assistant_command(),
            assistant_args: default_assistant_args(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_log_retention_days: default_thread_log_retention_days(),
            tool_formatters: std::collections::HashMap::new(),
            platforms: vec![],
        };
        assert_eq!(validate(&config).len(), 1);
    }

    #[test]
    fn slack_tokens_must_have_the_right_prefixes() {
        let config = RuntimeConfig {
            version: 2,
            working_dir: PathBuf::from("/tmp"),
            chrome: false,
            worktree_mode: WorktreeMode::Prompt,
            assistant_command: default_assistant_command(),
            assistant_args: default_assistant_args(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_log_retention_days: default_thread_log_retention_days(),
            tool_formatters: std::collections::HashMap::new(),
            platforms: vec![PlatformConfig::Slack(SlackPlatformConfig {
                id: "sl-main".into(),
                display_name: "Main".into(),
                bot_token: "wrong-prefix".into(),
                app_token: "xapp-1".into(),
                channel_id: "C123".into(),
                bot_name: "threadbot".into(),
                allowed_users: vec![],
                skip_permissions: false,
            })],
        };
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.contains("botToken")));
    }

    #[test]
    fn duplicate_platform_ids_are_rejected() {
        let config = RuntimeConfig {
            version: 2,
            working_dir: PathBuf::from("/tmp"),
            chrome: false,
            worktree_mode: WorktreeMode::Prompt,
            assistant_command: default_assistant_command(),
            assistant_args: default_assistant_args(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_log_retention_days: default_thread_log_retention_days(),
            tool_formatters: std::collections::HashMap::new(),
            platforms: vec![sample_mattermost(), sample_mattermost()],
        };
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.contains("duplicate")));
    }

    #[test]
    fn wrong_schema_version_is_a_problem() {
        let config = RuntimeConfig {
            version: 1,
            working_dir: PathBuf::from("/tmp"),
            chrome: false,
            worktree_mode: WorktreeMode::Prompt,
            assistant_command: default_assistant_command(),
            assistant_args: default_assistant_args(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_log_retention_days: default_thread_log_retention_days(),
            tool_formatters: std::collections::HashMap::new(),
            platforms: vec![sample_mattermost()],
        };
        let problems = validate(&config);
        assert!(problems.iter().any(|p| p.contains("version")));
    }
}
