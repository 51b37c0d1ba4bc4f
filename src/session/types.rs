//! Per-session state: the record held by the Session Manager for one chat thread with
//! an active assistant.

use crate::{PlatformId, SessionId, ThreadId, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// A pending interactive prompt awaiting exactly one reaction.
#[derive(Debug, Clone)]
pub struct PendingPlanApproval {
    pub post_id: String,
    pub tool_use_id: String,
    pub plan: String,
}

#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub post_id: String,
    pub tool_use_id: String,
    pub question: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PendingPermission {
    pub post_id: String,
    pub tool_use_id: String,
    pub tool_name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct PendingMessageApproval {
    pub post_id: String,
    pub user: UserId,
    pub buffered_text: String,
}

/// A queued user prompt awaiting the current turn's `result` event.
#[derive(Debug, Clone)]
pub struct QueuedPrompt {
    pub text: String,
    /// `(media_type, base64 data)` pairs, ready for `UserMessage::with_images`.
    pub image_attachments: Vec<(String, String)>,
}

/// Task-list state mirrored from the most recent `TodoWrite` tool call.
#[derive(Debug, Clone)]
pub struct TaskItem {
    pub content: String,
    pub active_form: Option<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// One chat thread with an assistant process attached: a session.
///
/// Invariants (enforced by the Session Manager and executors, not this struct alone):
/// at most one `tasks_post_id` and at most one `pending_*` of each kind; while a task
/// list is active and incomplete it is the last post in the thread; `current_post_content`
/// always matches what is actually live on the platform.
pub struct Session {
    pub session_id: SessionId,
    pub platform_id: PlatformId,
    pub thread_id: ThreadId,
    pub started_by: UserId,
    pub allowed_users: HashSet<UserId>,

    /// Opaque token handed back by the assistant process's `system.init` event, used to
    /// `--resume` a respawned process after an idle timeout or crash.
    pub assistant_session_id: Option<String>,
    pub prompt_queue: std::collections::VecDeque<QueuedPrompt>,

    pub current_post_id: Option<String>,
    pub current_post_content: String,
    pub pending_content: String,

    pub tasks_post_id: Option<String>,
    pub last_tasks_content: Option<String>,
    pub tasks: Vec<TaskItem>,
    pub tasks_completed: bool,
    pub tasks_minimized: bool,
    pub in_progress_task_start: Option<Instant>,

    pub pending_plan_approval: Option<PendingPlanApproval>,
    pub pending_question: Option<PendingQuestion>,
    pub pending_permission: Option<PendingPermission>,
    pub pending_message_approval: Option<PendingMessageApproval>,
    pub allowed_tools: HashSet<String>,

    /// Maps an assistant `tool_use_id` to the post id displaying its line, so a later
    /// `tool_result` knows which post to annotate.
    pub tool_use_posts: std::collections::HashMap<String, String>,

    pub last_activity_at: chrono::DateTime<chrono::Utc>,
    pub working_dir_override: Option<std::path::PathBuf>,

    /// Serializes the sticky-mutation class of operations (bump-task-list,
    /// bump-plan-approval, bump-and-repurpose-task-post) per spec §4.6. A plain FIFO
    /// `Mutex` gives the same ordering guarantee as the source's promise-chain mutex:
    /// whichever caller calls `.lock()` next queues behind whoever holds it now.
    pub sticky_lock: Arc<Mutex<()>>,

    pub phase: SessionPhase,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        platform_id: PlatformId,
        thread_id: ThreadId,
        started_by: UserId,
    ) -> Self {
        Self {
            session_id,
            platform_id,
            thread_id,
            started_by,
            allowed_users: HashSet::new(),
            assistant_session_id: None,
            prompt_queue: std::collections::VecDeque::new(),
            current_post_id: None,
            current_post_content: String::new(),
            pending_content: String::new(),
            tasks_post_id: None,
            last_tasks_content: None,
            tasks: Vec::new(),
            tasks_completed: false,
            tasks_minimized: false,
            in_progress_task_start: None,
            pending_plan_approval: None,
            pending_question: None,
            pending_permission: None,
            pending_message_approval: None,
            allowed_tools: HashSet::new(),
            tool_use_posts: std::collections::HashMap::new(),
            last_activity_at: chrono::Utc::now(),
            working_dir_override: None,
            sticky_lock: Arc::new(Mutex::new(())),
            phase: SessionPhase::Spawning,
        }
    }

    pub fn is_allowed(&self, user: &str) -> bool {
        self.started_by.as_ref() == user || self.allowed_users.iter().any(|u| u.as_ref() == user)
    }

    pub fn touch(&mut self) {
        self.last_activity_at = chrono::Utc::now();
    }

    /// Start or clear the in-progress task timer to match whether any task is currently
    /// `InProgress` (spec §3 `in-progress-task-start?`). Called whenever the task list is
    /// replaced by a fresh `TodoWrite` snapshot.
    pub fn update_in_progress_start(&mut self) {
        let in_progress = self
            .tasks
            .iter()
            .any(|t| t.status == TaskStatus::InProgress);
        if !in_progress {
            self.in_progress_task_start = None;
        } else if self.in_progress_task_start.is_none() {
            self.in_progress_task_start = Some(Instant::now());
        }
    }

    pub fn in_progress_elapsed_secs(&self) -> Option<u64> {
        self.in_progress_task_start
            .map(|start| start.elapsed().as_secs())
    }
}

/// State machine phase of a [`Session`]: `Spawning` while the assistant process starts,
/// `Running` mid-turn, `Idle` between turns with state retained, `Terminating` while
/// being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Spawning,
    Running,
    Idle,
    Terminating,
}
