//! Stream Dispatcher (spec §4.7): a pure translation from one assistant event into zero or
//! more typed [`Op`]s. Permission gating (spec §4.5.3) happens here too, since it only needs
//! the tool's name and the session's already-known allow-list — no I/O, no executor access.

use crate::assistant::protocol::{AssistantEvent, ContentBlock};
use crate::executors::tasklist::TaskListOp;
use crate::executors::Op;
use crate::formatter::ToolFormatterRegistry;
use crate::session::types::{TaskItem, TaskStatus};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

/// What the dispatcher wants done with one assistant event: either an [`Op`] ready to
/// execute, or a tool invocation that must clear a permission prompt first.
#[derive(Debug, Clone)]
pub enum DispatchOp {
    Exec(Op),
    NeedsPermission {
        tool_use_id: String,
        tool_name: String,
        display: String,
    },
}

/// Translate one assistant event into the ops its content should produce.
///
/// `skip_permissions` mirrors a platform entry's `skipPermissions` config; `allowed_tools`
/// is the session's per-turn allow-list built up by `approve-all` permission resolutions.
pub fn translate(
    event: &AssistantEvent,
    formatter: &dyn ToolFormatterRegistry,
    skip_permissions: bool,
    allowed_tools: &HashSet<String>,
) -> Vec<DispatchOp> {
    match event {
        AssistantEvent::System(sys) => {
            if sys.subtype == "init" {
                if let Some(session_id) = &sys.session_id {
                    return vec![DispatchOp::Exec(Op::SessionStarted {
                        assistant_session_id: session_id.clone(),
                    })];
                }
            }
            Vec::new()
        }
        AssistantEvent::Assistant(msg) => msg
            .message
            .content
            .iter()
            .flat_map(|block| translate_block(block, formatter, skip_permissions, allowed_tools))
            .collect(),
        AssistantEvent::ToolUse(tool_use) => {
            translate_tool_use(&tool_use.id, &tool_use.name, &tool_use.input, formatter, skip_permissions, allowed_tools)
        }
        AssistantEvent::ToolResult(result) => vec![DispatchOp::Exec(Op::ToolResult {
            tool_use_id: result.tool_use_id.clone(),
            content: render_result_content(&result.content),
            is_error: result.is_error,
        })],
        AssistantEvent::Result(_) => vec![DispatchOp::Exec(Op::TurnEnd)],
        AssistantEvent::Unknown => {
            tracing::debug!("unrecognized assistant event type, ignoring");
            Vec::new()
        }
    }
}

fn translate_block(
    block: &ContentBlock,
    formatter: &dyn ToolFormatterRegistry,
    skip_permissions: bool,
    allowed_tools: &HashSet<String>,
) -> Vec<DispatchOp> {
    match block {
        ContentBlock::Text { text } => vec![DispatchOp::Exec(Op::AddContent(text.clone()))],
        ContentBlock::ToolUse { id, name, input } => {
            translate_tool_use(id, name, input, formatter, skip_permissions, allowed_tools)
        }
        ContentBlock::ToolResult { tool_use_id, content, is_error } => vec![DispatchOp::Exec(Op::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: render_result_content(content),
            is_error: *is_error,
        })],
        ContentBlock::Unknown => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
struct TodoInput {
    #[serde(default)]
    tasks: Vec<TodoItemRaw>,
}

#[derive(Debug, Deserialize)]
struct TodoItemRaw {
    content: String,
    #[serde(default, rename = "activeForm")]
    active_form: Option<String>,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct ExitPlanInput {
    plan: String,
}

#[derive(Debug, Deserialize)]
struct QuestionInput {
    question: String,
    #[serde(default)]
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskInput {
    #[serde(default)]
    description: String,
}

fn translate_tool_use(
    tool_use_id: &str,
    name: &str,
    input: &Value,
    formatter: &dyn ToolFormatterRegistry,
    skip_permissions: bool,
    allowed_tools: &HashSet<String>,
) -> Vec<DispatchOp> {
    match name {
        "TodoWrite" => {
            let tasks = serde_json::from_value::<TodoInput>(input.clone())
                .map(|parsed| parsed.tasks.into_iter().map(task_item_from_raw).collect())
                .unwrap_or_default();
            vec![DispatchOp::Exec(Op::TaskList(TaskListOp::Update(tasks)))]
        }
        "ExitPlanMode" => match serde_json::from_value::<ExitPlanInput>(input.clone()) {
            Ok(parsed) => vec![DispatchOp::Exec(Op::PlanApproval {
                tool_use_id: tool_use_id.to_string(),
                plan: parsed.plan,
            })],
            Err(error) => {
                tracing::warn!(%error, "malformed ExitPlanMode input");
                Vec::new()
            }
        },
        "AskUserQuestion" => match serde_json::from_value::<QuestionInput>(input.clone()) {
            Ok(parsed) => vec![DispatchOp::Exec(Op::Question {
                tool_use_id: tool_use_id.to_string(),
                question: parsed.question,
                options: parsed.options,
            })],
            Err(error) => {
                tracing::warn!(%error, "malformed AskUserQuestion input");
                Vec::new()
            }
        },
        "Task" => {
            let description = serde_json::from_value::<TaskInput>(input.clone())
                .map(|parsed| parsed.description)
                .unwrap_or_default();
            vec![DispatchOp::Exec(Op::SubagentStart { tool_use_id: tool_use_id.to_string(), description })]
        }
        _ => {
            let display = formatter.format_call(name, input);
            if !skip_permissions && formatter.requires_permission(name) && !allowed_tools.contains(name) {
                vec![DispatchOp::NeedsPermission {
                    tool_use_id: tool_use_id.to_string(),
                    tool_name: name.to_string(),
                    display,
                }]
            } else {
                vec![DispatchOp::Exec(Op::ToolStart { tool_use_id: tool_use_id.to_string(), display })]
            }
        }
    }
}

fn task_item_from_raw(raw: TodoItemRaw) -> TaskItem {
    let status = match raw.status.as_str() {
        "in_progress" => TaskStatus::InProgress,
        "completed" => TaskStatus::Completed,
        _ => TaskStatus::Pending,
    };
    TaskItem { content: raw.content, active_form: raw.active_form, status }
}

fn render_result_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::TemplateFormatterRegistry;
    use serde_json::json;

    fn formatter() -> TemplateFormatterRegistry {
        TemplateFormatterRegistry::new()
    }

    #[test]
    fn text_block_becomes_add_content() {
        let event = AssistantEvent::Assistant(crate::assistant::protocol::AssistantMessageEvent {
            message: crate::assistant::protocol::AssistantMessageBody {
                content: vec![ContentBlock::Text { text: "hi".into() }],
            },
        });
        let ops = translate(&event, &formatter(), false, &HashSet::new());
        assert!(matches!(ops.as_slice(), [DispatchOp::Exec(Op::AddContent(t))] if t == "hi"));
    }

    #[test]
    fn todo_write_parses_into_task_list_update() {
        let input = json!({"tasks": [{"content": "A", "status": "in_progress"}, {"content": "B", "status": "pending"}]});
        let ops = translate_tool_use("t1", "TodoWrite", &input, &formatter(), false, &HashSet::new());
        match ops.as_slice() {
            [DispatchOp::Exec(Op::TaskList(TaskListOp::Update(tasks)))] => {
                assert_eq!(tasks.len(), 2);
                assert_eq!(tasks[0].status, TaskStatus::InProgress);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_without_skip_permissions_requires_approval() {
        let ops = translate_tool_use("t1", "Bash", &json!({"command": "ls"}), &formatter(), false, &HashSet::new());
        assert!(matches!(ops.as_slice(), [DispatchOp::NeedsPermission { tool_name, .. }] if tool_name == "Bash"));
    }

    #[test]
    fn allowed_tool_skips_the_permission_prompt() {
        let mut allowed = HashSet::new();
        allowed.insert("Bash".to_string());
        let ops = translate_tool_use("t1", "Bash", &json!({"command": "ls"}), &formatter(), false, &allowed);
        assert!(matches!(ops.as_slice(), [DispatchOp::Exec(Op::ToolStart { .. })]));
    }

    #[test]
    fn skip_permissions_config_bypasses_the_prompt_entirely() {
        let ops = translate_tool_use("t1", "Bash", &json!({"command": "ls"}), &formatter(), true, &HashSet::new());
        assert!(matches!(ops.as_slice(), [DispatchOp::Exec(Op::ToolStart { .. })]));
    }

    #[test]
    fn structural_tools_never_need_permission() {
        let ops = translate_tool_use("t1", "TodoWrite", &json!({"tasks": []}), &formatter(), false, &HashSet::new());
        assert!(matches!(ops.as_slice(), [DispatchOp::Exec(Op::TaskList(_))]));
    }

    #[test]
    fn result_event_ends_the_turn() {
        let event = AssistantEvent::Result(crate::assistant::protocol::ResultEvent {
            subtype: "success".into(),
            duration_ms: None,
            total_cost_usd: None,
        });
        let ops = translate(&event, &formatter(), false, &HashSet::new());
        assert!(matches!(ops.as_slice(), [DispatchOp::Exec(Op::TurnEnd)]));
    }
}
