//! Executors: the session-side objects that own one class of post and turn typed [`Op`]s
//! into platform calls.

pub mod content;
pub mod header;
pub mod interactive;
pub mod subagent;
pub mod tasklist;

pub use content::ContentExecutor;
pub use header::HeaderExecutor;
pub use interactive::InteractiveExecutor;
pub use subagent::SubagentExecutor;
pub use tasklist::{TaskListExecutor, TaskListOp};

use crate::platform::{PlatformDyn, ReactionAction};
use crate::session::types::{Session, TaskItem};
use crate::tracker::PostTracker;
use crate::{Result, SessionId};

/// A typed operation emitted by the Stream Dispatcher for an executor to carry out.
#[derive(Debug, Clone)]
pub enum Op {
    AddContent(String),
    ToolStart {
        tool_use_id: String,
        display: String,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    TaskList(TaskListOp),
    PlanApproval {
        tool_use_id: String,
        plan: String,
    },
    Question {
        tool_use_id: String,
        question: String,
        options: Vec<String>,
    },
    SubagentStart {
        tool_use_id: String,
        description: String,
    },
    SessionStarted {
        assistant_session_id: String,
    },
    TurnEnd,
}

/// Everything an executor needs to act: the platform port, the shared post tracker, and
/// which thread/session it's acting on. Borrowed for the duration of one call; the
/// session itself is passed in separately since most operations need to read or mutate it.
pub struct ExecCtx<'a> {
    pub platform: &'a dyn PlatformDyn,
    pub tracker: &'a PostTracker,
    pub thread_id: &'a str,
    pub session_id: &'a SessionId,
}

/// Common shape every executor follows: write-through registration with the tracker and
/// a `finalize` called at turn-end or session teardown. Not object-safe by design — the
/// dispatcher holds each executor's concrete type directly, so `async fn` is fine here.
#[allow(async_fn_in_trait)]
pub trait Executor {
    async fn finalize(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()>;
}

/// Shared outcome of a reaction dispatched to an interactive-capable executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOutcome {
    /// The reaction was consumed by this executor.
    Handled,
    /// The reaction wasn't for this executor (wrong post, wrong emoji, or already resolved).
    Ignored,
}

pub(crate) fn is_authorized(session: &Session, platform: &dyn PlatformDyn, user: &str) -> bool {
    platform.is_user_allowed(user) || session.is_allowed(user)
}

/// Render a task-list body (spec §4.5.2). `elapsed_secs` is the age of the currently
/// in-progress task, if any (`Session::in_progress_elapsed_secs`), shown next to it in
/// both the full and minimized forms.
pub(crate) fn render_task_list(
    tasks: &[TaskItem],
    minimized: bool,
    elapsed_secs: Option<u64>,
) -> String {
    let completed = tasks
        .iter()
        .filter(|t| t.status == crate::session::types::TaskStatus::Completed)
        .count();
    let total = tasks.len();
    let pct = if total == 0 {
        0
    } else {
        completed * 100 / total
    };
    let header = format!("📋 Tasks ({completed}/{total} · {pct}%)");

    if minimized {
        let current = tasks
            .iter()
            .find(|t| t.status == crate::session::types::TaskStatus::InProgress)
            .map(|t| t.active_form.clone().unwrap_or_else(|| t.content.clone()));
        return match current {
            Some(label) => {
                let elapsed = elapsed_secs.unwrap_or(0);
                format!("{header} · 🔄 {label} ({elapsed}s) 🔽")
            }
            None => format!("{header} 🔽"),
        };
    }

    let mut lines = vec![header];
    for task in tasks {
        let line = match task.status {
            crate::session::types::TaskStatus::Completed => format!("~~{}~~", task.content),
            crate::session::types::TaskStatus::InProgress => {
                let label = task.active_form.as_deref().unwrap_or(&task.content);
                let elapsed = elapsed_secs.unwrap_or(0);
                format!("🔄 **{label}** ({elapsed}s)")
            }
            crate::session::types::TaskStatus::Pending => format!("⬜ {}", task.content),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Normalize a platform reaction event's action into the executor-facing enum, re-exported
/// so executor modules don't need to reach into `platform` directly.
pub type Action = ReactionAction;
