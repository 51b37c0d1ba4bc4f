//! Session Manager (spec §4.8): owns the lifecycle of every per-thread session. Each
//! session runs as its own worker task, the sole writer of that session's state, reached
//! by everyone else through a bounded inbox — the single-threaded-reactor pattern the
//! assistant-process read loop already uses, lifted one level up.

use crate::assistant::protocol::UserMessage;
use crate::assistant::{AssistantEvent, AssistantProcess, SpawnConfig, StreamItem};
use crate::config::RuntimeConfig;
use crate::dispatcher::{self, DispatchOp};
use crate::error::SessionError;
use crate::executors::interactive::InteractiveResolution;
use crate::executors::{
    ContentExecutor, ExecCtx, Executor, HeaderExecutor, InteractiveExecutor, Op, ReactionOutcome,
    SubagentExecutor, TaskListExecutor,
};
use crate::formatter::ToolFormatterRegistry;
use crate::platform::{PlatformDyn, ReactionEvent};
use crate::session::types::{QueuedPrompt, Session, SessionPhase};
use crate::threadlog::ThreadLogEntry;
use crate::threadlog::ThreadLog;
use crate::tracker::{PostKind, PostRecord, PostTracker};
use crate::{PlatformId, Result, SessionId, ThreadId, UserId};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// A chat message forwarded from the Gateway into a session's worker.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub user: UserId,
    pub text: String,
    /// `(media_type, base64 data)` pairs, already downloaded and encoded by the Gateway.
    pub image_attachments: Vec<(String, String)>,
}

/// A bang-command forwarded from the Gateway (spec §6: `!help`, `!cd`, `!permissions`,
/// `!stop`, `!invite`, `!kick`, `!escape`, `!update [now]`).
#[derive(Debug, Clone)]
pub enum Command {
    Help,
    Cd(String),
    Permissions,
    Stop,
    Invite(UserId),
    Kick(UserId),
    Escape,
    Update { now: bool },
}

/// One event delivered to a running session's worker.
enum WorkerEvent {
    Message(InboundMessage),
    Command(Command),
    Reaction { record: PostRecord, event: ReactionEvent },
    Stop,
}

/// A live session's externally-visible handle: the channel into its worker and the
/// cancellation token used to unwind it from the outside (idle-timeout watchdog, `!stop`).
struct SessionHandle {
    inbox: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
}

/// Owns every live [`Session`] and the collaborators shared across all of them: the post
/// tracker, the platform ports, the tool formatter registry, the thread logger, and the
/// live config (so a respawned session worker always reads the current idle timeout and
/// assistant command rather than one captured at startup).
pub struct SessionManager {
    tracker: Arc<PostTracker>,
    platforms: HashMap<PlatformId, Arc<dyn PlatformDyn>>,
    formatters: Arc<dyn ToolFormatterRegistry>,
    threadlog: Arc<ThreadLog>,
    config: Arc<ArcSwap<RuntimeConfig>>,
    handles: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        platforms: HashMap<PlatformId, Arc<dyn PlatformDyn>>,
        formatters: Arc<dyn ToolFormatterRegistry>,
        threadlog: Arc<ThreadLog>,
        config: Arc<ArcSwap<RuntimeConfig>>,
    ) -> Self {
        Self {
            tracker: Arc::new(PostTracker::new()),
            platforms,
            formatters,
            threadlog,
            config,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<PostTracker> {
        &self.tracker
    }

    pub fn platform(&self, platform_id: &str) -> Option<Arc<dyn PlatformDyn>> {
        self.platforms.get(platform_id).cloned()
    }

    pub async fn has_session(&self, session_id: &SessionId) -> bool {
        self.handles.read().await.contains_key(session_id)
    }

    /// Deliver a chat message to a session, spawning a new one if none exists yet. Used by
    /// the Gateway for both fresh mentions and replies in a known thread.
    pub async fn submit(
        self: &Arc<Self>,
        platform_id: PlatformId,
        thread_id: ThreadId,
        started_by: UserId,
        message: InboundMessage,
    ) -> Result<()> {
        let session_id = SessionId::new(&platform_id, &thread_id);
        self.ensure_spawned(session_id.clone(), platform_id, thread_id, started_by)
            .await?;
        self.send(&session_id, WorkerEvent::Message(message)).await
    }

    pub async fn submit_command(&self, session_id: &SessionId, command: Command) -> Result<()> {
        self.send(session_id, WorkerEvent::Command(command)).await
    }

    /// Forward a reaction event to the session that owns the reacted-on post (spec §4.9
    /// step 2). Silently drops the event if the session's worker has already exited —
    /// a reaction landing just after teardown is not an error.
    pub async fn dispatch_reaction(&self, session_id: &SessionId, record: PostRecord, event: ReactionEvent) {
        let _ = self.send(session_id, WorkerEvent::Reaction { record, event }).await;
    }

    /// Ask a session to stop (spec §4.8 `!stop`): closes its worker after finalizing.
    pub async fn stop(&self, session_id: &SessionId) -> Result<()> {
        self.send(session_id, WorkerEvent::Stop).await
    }

    /// Ask every live session to terminate and wait (up to `grace`) for their workers to
    /// finish tearing down — flush, finalize sticky posts, close the assistant process
    /// (spec §10.4: graceful `SIGINT`/`SIGTERM` shutdown). Sessions still running past the
    /// grace period are left to their own `CancellationToken`-triggered cleanup; the
    /// process exits either way.
    pub async fn shutdown_all(&self, grace: std::time::Duration) {
        let session_ids: Vec<SessionId> = self.handles.read().await.keys().cloned().collect();
        for session_id in &session_ids {
            let _ = self.stop(session_id).await;
        }

        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if self.handles.read().await.is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        let remaining = self.handles.read().await.len();
        if remaining > 0 {
            tracing::warn!(remaining, "shutdown grace period elapsed with sessions still tearing down");
        }
    }

    async fn send(&self, session_id: &SessionId, event: WorkerEvent) -> Result<()> {
        let inbox = {
            let handles = self.handles.read().await;
            handles
                .get(session_id)
                .map(|h| h.inbox.clone())
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?
        };
        inbox
            .send(event)
            .await
            .map_err(|_| SessionError::Terminating(session_id.to_string()).into())
    }

    async fn ensure_spawned(
        self: &Arc<Self>,
        session_id: SessionId,
        platform_id: PlatformId,
        thread_id: ThreadId,
        started_by: UserId,
    ) -> Result<()> {
        if self.has_session(&session_id).await {
            return Ok(());
        }
        let Some(platform) = self.platform(&platform_id) else {
            return Err(SessionError::Other(anyhow::anyhow!("unknown platform {platform_id}")).into());
        };

        let mut handles = self.handles.write().await;
        if handles.contains_key(&session_id) {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let session = Session::new(session_id.clone(), platform_id.clone(), thread_id, started_by);

        let manager = Arc::clone(self);
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            run_session_worker(manager, session, platform, rx, worker_cancel).await;
        });

        handles.insert(session_id, SessionHandle { inbox: tx, cancel });
        Ok(())
    }

    async fn remove(&self, session_id: &SessionId) {
        self.handles.write().await.remove(session_id);
    }
}

/// Everything the reactor loop mutates across iterations, threaded as plain locals rather
/// than smuggled into `Session` itself since it's worker-local, not session state proper.
struct Executors {
    content: ContentExecutor,
    tasklist: TaskListExecutor,
    interactive: InteractiveExecutor,
    subagent: SubagentExecutor,
    header: HeaderExecutor,
    /// `tool_use_id`s of `Task` invocations, so a later untyped `ToolResult` event knows
    /// to route to the subagent executor instead of the content executor.
    subagent_tool_uses: std::collections::HashSet<String>,
}

impl Executors {
    fn new() -> Self {
        Self {
            content: ContentExecutor::default(),
            tasklist: TaskListExecutor::default(),
            interactive: InteractiveExecutor::default(),
            subagent: SubagentExecutor::default(),
            header: HeaderExecutor::default(),
            subagent_tool_uses: std::collections::HashSet::new(),
        }
    }

    async fn finalize_all(&mut self, ctx: &ExecCtx<'_>, session: &mut Session) -> Result<()> {
        self.content.finalize(ctx, session).await?;
        self.tasklist.finalize(ctx, session).await?;
        self.interactive.finalize(ctx, session).await?;
        self.subagent.finalize(ctx, session).await?;
        self.header.finalize(ctx, session).await?;
        Ok(())
    }
}

/// One session's reactor: drives the assistant subprocess and the worker inbox against a
/// single `Session` and its executors until a teardown condition fires.
async fn run_session_worker(
    manager: Arc<SessionManager>,
    mut session: Session,
    platform: Arc<dyn PlatformDyn>,
    mut inbox: mpsc::Receiver<WorkerEvent>,
    cancel: CancellationToken,
) {
    let session_id = session.session_id.clone();
    let mut executors = Executors::new();

    let (mut process, mut stream) = match spawn_process(&manager, &session).await {
        Ok(pair) => pair,
        Err(error) => {
            tracing::error!(session = %session_id, %error, "failed to spawn assistant process");
            manager.remove(&session_id).await;
            return;
        }
    };
    session.phase = SessionPhase::Running;

    'reactor: loop {
        let idle_timeout = manager.config.load().idle_timeout();
        let idle_sleep = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle_sleep);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                break 'reactor;
            }

            item = stream.recv() => {
                let Some(item) = item else { break 'reactor; };
                match item {
                    StreamItem::Event(event) => {
                        session.touch();
                        handle_assistant_event(&manager, &platform, &mut session, &mut executors, &mut process, &event).await;
                    }
                    StreamItem::Exited { clean } => {
                        if !clean {
                            let stderr_tail = process.stderr_tail().await;
                            tracing::warn!(session = %session_id, stderr_tail, "assistant process exited unexpectedly");
                            let _ = manager.threadlog.append(
                                session.platform_id.as_ref(),
                                session_id.as_str(),
                                session.assistant_session_id.as_deref().unwrap_or("unknown"),
                                ThreadLogEntry::Lifecycle { detail: "assistant crashed".to_string() },
                            ).await;
                        }
                        // Spec §7: an assistant crash keeps the session alive for a resume on
                        // the next user message; only `!stop`/idle-timeout tear the whole thing
                        // down. A prompt already waiting in queue gets another spawn attempt.
                        session.phase = SessionPhase::Idle;
                        if let Some(next) = session.prompt_queue.pop_front() {
                            match spawn_process(&manager, &session).await {
                                Ok((new_process, new_stream)) => {
                                    process = new_process;
                                    stream = new_stream;
                                    session.phase = SessionPhase::Running;
                                    if let Err(error) = send_prompt(&mut process, &next).await {
                                        tracing::warn!(session = %session_id, %error, "failed to resend queued prompt after respawn");
                                    }
                                }
                                Err(error) => {
                                    tracing::error!(session = %session_id, %error, "failed to respawn assistant process");
                                }
                            }
                        }
                    }
                }
            }

            event = inbox.recv() => {
                let Some(event) = event else { break 'reactor; };
                match event {
                    WorkerEvent::Stop => break 'reactor,
                    WorkerEvent::Message(message) => {
                        handle_inbound_message(&manager, &platform, &mut session, &mut executors, &mut process, message).await;
                    }
                    WorkerEvent::Command(command) => {
                        if handle_command(&manager, &platform, &mut session, &mut executors, &mut process, command).await {
                            break 'reactor;
                        }
                    }
                    WorkerEvent::Reaction { record, event } => {
                        handle_reaction(&manager, &platform, &mut session, &mut executors, &mut process, record, event).await;
                    }
                }
            }

            _ = &mut idle_sleep, if session.phase == SessionPhase::Idle => {
                tracing::info!(session = %session_id, "session idle timeout elapsed, tearing down");
                break 'reactor;
            }
        }
    }

    session.phase = SessionPhase::Terminating;
    let ctx = ExecCtx {
        platform: platform.as_ref(),
        tracker: manager.tracker(),
        thread_id: session.thread_id.as_ref(),
        session_id: &session_id,
    };
    if let Err(error) = executors.finalize_all(&ctx, &mut session).await {
        tracing::warn!(session = %session_id, %error, "error finalizing session executors during teardown");
    }
    manager.tracker().clear_session(&session_id).await;
    process.kill().await;
    manager.remove(&session_id).await;
}

async fn spawn_process(
    manager: &SessionManager,
    session: &Session,
) -> Result<(AssistantProcess, mpsc::Receiver<StreamItem>)> {
    let config = manager.config.load();
    let working_dir = session
        .working_dir_override
        .clone()
        .unwrap_or_else(|| config.working_dir.clone());
    let spawn_config = SpawnConfig {
        command: config.assistant_command.clone(),
        args: config.assistant_args.clone(),
        env: Vec::new(),
        working_dir,
        resume_session_id: session.assistant_session_id.clone(),
    };
    AssistantProcess::spawn(spawn_config)
}

async fn send_prompt(process: &mut AssistantProcess, prompt: &QueuedPrompt) -> Result<()> {
    let message = if prompt.image_attachments.is_empty() {
        UserMessage::text(prompt.text.clone())
    } else {
        UserMessage::with_images(prompt.text.clone(), &prompt.image_attachments)
    };
    process.send(&message).await
}

/// Translate and apply one assistant stream event. Turn-end either dequeues the next
/// prompt or transitions the session to `Idle`.
async fn handle_assistant_event(
    manager: &Arc<SessionManager>,
    platform: &Arc<dyn PlatformDyn>,
    session: &mut Session,
    executors: &mut Executors,
    process: &mut AssistantProcess,
    event: &AssistantEvent,
) {
    let config = manager.config.load();
    let skip_permissions = manager
        .platform_config_skip_permissions(&session.platform_id, &config)
        .unwrap_or(false);
    let ops = dispatcher::translate(event, manager.formatters.as_ref(), skip_permissions, &session.allowed_tools);

    let ctx = ExecCtx {
        platform: platform.as_ref(),
        tracker: manager.tracker(),
        thread_id: session.thread_id.as_ref(),
        session_id: &session.session_id.clone(),
    };

    for op in ops {
        match op {
            DispatchOp::NeedsPermission { tool_use_id, tool_name, display } => {
                if let Err(error) = executors.interactive.open_permission(&ctx, session, tool_use_id, tool_name, display).await {
                    tracing::warn!(session = %session.session_id, %error, "failed to open permission prompt");
                }
            }
            DispatchOp::Exec(op) => {
                if let Err(error) = apply_op(manager, &ctx, session, executors, process, op).await {
                    tracing::warn!(session = %session.session_id, %error, "failed to apply op");
                }
            }
        }
    }
}

async fn apply_op(
    manager: &Arc<SessionManager>,
    ctx: &ExecCtx<'_>,
    session: &mut Session,
    executors: &mut Executors,
    process: &mut AssistantProcess,
    op: Op,
) -> Result<()> {
    match op {
        Op::AddContent(text) => {
            executors.content.add_content(session, &text);
            Ok(())
        }
        Op::ToolStart { tool_use_id, display } => {
            executors.content.tool_started(session, &tool_use_id, &display);
            Ok(())
        }
        Op::ToolResult { tool_use_id, content, is_error } => {
            if executors.subagent_tool_uses.contains(&tool_use_id) {
                executors.subagent.completed(ctx, &tool_use_id, &content, is_error).await
            } else {
                executors.content.tool_result(session, &tool_use_id, &content, is_error);
                Ok(())
            }
        }
        Op::TaskList(task_op) => executors.tasklist.execute(ctx, session, task_op).await,
        Op::PlanApproval { tool_use_id, plan } => {
            executors.content.flush(ctx, session).await?;
            executors.interactive.open_plan_approval(ctx, session, tool_use_id, plan).await
        }
        Op::Question { tool_use_id, question, options } => {
            executors.content.flush(ctx, session).await?;
            executors.interactive.open_question(ctx, session, tool_use_id, question, options).await
        }
        Op::SubagentStart { tool_use_id, description } => {
            executors.subagent_tool_uses.insert(tool_use_id.clone());
            executors.subagent.started(ctx, &tool_use_id, &description).await
        }
        Op::SessionStarted { assistant_session_id } => {
            let is_resume = session.assistant_session_id.is_some();
            executors.header.session_started(ctx, session, &assistant_session_id).await?;
            if is_resume {
                executors.header.posted_resume_banner(ctx, "resumed after a gap").await?;
            }
            let _ = manager
                .threadlog
                .append(
                    session.platform_id.as_ref(),
                    session.session_id.as_str(),
                    &assistant_session_id,
                    ThreadLogEntry::Lifecycle { detail: "session started".to_string() },
                )
                .await;
            Ok(())
        }
        Op::TurnEnd => {
            executors.content.flush(ctx, session).await?;
            if let Some(next) = session.prompt_queue.pop_front() {
                if let Err(error) = send_prompt(process, &next).await {
                    // The process may have exited right after its last `result` event; let
                    // the worker's `StreamItem::Exited` branch respawn and resend. Put the
                    // prompt back so it isn't lost in the meantime.
                    session.prompt_queue.push_front(next);
                    return Err(error);
                }
                Ok(())
            } else {
                session.phase = SessionPhase::Idle;
                Ok(())
            }
        }
    }
}

async fn handle_inbound_message(
    manager: &Arc<SessionManager>,
    platform: &Arc<dyn PlatformDyn>,
    session: &mut Session,
    executors: &mut Executors,
    process: &mut AssistantProcess,
    message: InboundMessage,
) {
    session.touch();

    // ACL check (spec §4.10): anyone not globally allowed, not invited, and not the
    // session's own starter gets parked behind a message-approval post instead of being
    // queued straight to the assistant. Image attachments aren't carried through this
    // buffered path — `PendingMessageApproval` only stores text.
    if !crate::executors::is_authorized(session, platform.as_ref(), message.user.as_ref()) {
        let ctx = ExecCtx {
            platform: platform.as_ref(),
            tracker: manager.tracker(),
            thread_id: session.thread_id.as_ref(),
            session_id: &session.session_id,
        };
        if let Err(error) = executors
            .interactive
            .open_message_approval(&ctx, session, message.user.clone(), message.text.clone())
            .await
        {
            tracing::warn!(session = %session.session_id, %error, "failed to open message-approval post");
        }
        return;
    }

    let _ = manager
        .threadlog
        .append(
            session.platform_id.as_ref(),
            session.session_id.as_str(),
            session.assistant_session_id.as_deref().unwrap_or("unknown"),
            ThreadLogEntry::UserMessage { text: message.text.clone() },
        )
        .await;

    let prompt = QueuedPrompt { text: message.text, image_attachments: message.image_attachments };
    if session.phase == SessionPhase::Running {
        session.prompt_queue.push_back(prompt);
        return;
    }

    session.phase = SessionPhase::Running;
    if let Err(error) = send_prompt(process, &prompt).await {
        tracing::warn!(session = %session.session_id, %error, "failed to send prompt to assistant");
        session.prompt_queue.push_front(prompt);
    }
}

/// Handle a bang-command. Returns `true` if the worker should now stop (spec §6 `!stop`).
async fn handle_command(
    manager: &Arc<SessionManager>,
    platform: &Arc<dyn PlatformDyn>,
    session: &mut Session,
    executors: &mut Executors,
    process: &mut AssistantProcess,
    command: Command,
) -> bool {
    let ctx = ExecCtx {
        platform: platform.as_ref(),
        tracker: manager.tracker(),
        thread_id: session.thread_id.as_ref(),
        session_id: &session.session_id.clone(),
    };
    let _ = manager
        .threadlog
        .append(
            session.platform_id.as_ref(),
            session.session_id.as_str(),
            session.assistant_session_id.as_deref().unwrap_or("unknown"),
            ThreadLogEntry::Command { text: format!("{command:?}") },
        )
        .await;

    match command {
        Command::Stop => {
            let _ = executors;
            let _ = process;
            return true;
        }
        Command::Invite(user) => {
            session.allowed_users.insert(user);
        }
        Command::Kick(user) => {
            session.allowed_users.remove(&user);
        }
        Command::Cd(path) => {
            session.working_dir_override = Some(std::path::PathBuf::from(path));
        }
        Command::Escape => {
            session.allowed_tools.clear();
        }
        Command::Permissions | Command::Help | Command::Update { .. } => {
            // Surfaced by the Gateway posting a reply directly; the worker only needs to
            // record these in the thread log, already done above.
            let _ = &ctx;
        }
    }
    false
}

async fn handle_reaction(
    manager: &Arc<SessionManager>,
    platform: &Arc<dyn PlatformDyn>,
    session: &mut Session,
    executors: &mut Executors,
    process: &mut AssistantProcess,
    record: PostRecord,
    event: ReactionEvent,
) {
    let ctx = ExecCtx {
        platform: platform.as_ref(),
        tracker: manager.tracker(),
        thread_id: session.thread_id.as_ref(),
        session_id: &session.session_id.clone(),
    };

    let outcome_and_resolution = match record.kind {
        PostKind::TaskList => {
            let outcome = executors
                .tasklist
                .handle_reaction(&ctx, session, &event.post_id, &event.emoji, event.action)
                .await;
            (outcome, None)
        }
        PostKind::PlanApproval | PostKind::Question | PostKind::Permission | PostKind::MessageApproval => {
            let result = executors
                .interactive
                .handle_reaction(&ctx, session, &event.post_id, &event.emoji, &event.user, event.action)
                .await;
            match result {
                Ok((outcome, resolution)) => (Ok(outcome), resolution),
                Err(error) => (Err(error), None),
            }
        }
        _ => (Ok(ReactionOutcome::Ignored), None),
    };

    match outcome_and_resolution {
        (Err(error), _) => {
            tracing::warn!(session = %session.session_id, %error, "error handling reaction");
        }
        (Ok(ReactionOutcome::Ignored), _) => {}
        (Ok(ReactionOutcome::Handled), resolution) => {
            let _ = manager
                .threadlog
                .append(
                    session.platform_id.as_ref(),
                    session.session_id.as_str(),
                    session.assistant_session_id.as_deref().unwrap_or("unknown"),
                    ThreadLogEntry::Reaction { emoji: event.emoji.clone(), user: event.user.clone() },
                )
                .await;
            if let Some(resolution) = resolution {
                apply_resolution(manager, session, process, resolution).await;
            }
        }
    }
}

/// Act on an [`InteractiveResolution`] by forwarding the appropriate reply to the
/// assistant's stdin (spec §4.5.3 / §7): approvals and denials go back as `tool_result`
/// blocks correlated by `tool_use_id`, since the assistant is blocked on that tool call
/// until it sees a reply; a question answer is forwarded the same way.
async fn apply_resolution(
    manager: &Arc<SessionManager>,
    session: &mut Session,
    process: &mut AssistantProcess,
    resolution: InteractiveResolution,
) {
    let message = match resolution {
        InteractiveResolution::PlanApproved { tool_use_id } => {
            Some(UserMessage::tool_result(tool_use_id, "approved"))
        }
        InteractiveResolution::PlanDenied { tool_use_id } => {
            Some(UserMessage::tool_result(tool_use_id, "denied"))
        }
        InteractiveResolution::QuestionAnswered { tool_use_id, option_text, .. } => {
            Some(UserMessage::tool_result(tool_use_id, option_text))
        }
        InteractiveResolution::PermissionApproved { tool_use_id, tool_name, allow_all, .. } => {
            if allow_all {
                session.allowed_tools.insert(tool_name);
            }
            Some(UserMessage::tool_result(tool_use_id, "approved"))
        }
        InteractiveResolution::PermissionDenied => None,
        InteractiveResolution::MessageApproved { user: _, buffered_text } => {
            let prompt = QueuedPrompt { text: buffered_text, image_attachments: Vec::new() };
            if session.phase == SessionPhase::Running {
                session.prompt_queue.push_back(prompt);
            } else {
                session.phase = SessionPhase::Running;
                let _ = send_prompt(process, &prompt).await;
            }
            None
        }
        InteractiveResolution::UserInvited { user, buffered_text } => {
            session.allowed_users.insert(user);
            let prompt = QueuedPrompt { text: buffered_text, image_attachments: Vec::new() };
            if session.phase == SessionPhase::Running {
                session.prompt_queue.push_back(prompt);
            } else {
                session.phase = SessionPhase::Running;
                let _ = send_prompt(process, &prompt).await;
            }
            None
        }
        InteractiveResolution::MessageDenied => None,
    };
    let _ = manager;
    if let Some(message) = message {
        if let Err(error) = process.send(&message).await {
            tracing::warn!(%error, "failed to forward interactive resolution to assistant");
        }
    }
}

impl SessionManager {
    fn platform_config_skip_permissions(&self, platform_id: &str, config: &RuntimeConfig) -> Option<bool> {
        config.platforms.iter().find(|p| p.id() == platform_id).map(|p| p.skip_permissions())
    }
}
