//! Tool formatter registry (spec §1, §4.7): an injectable mapping from a tool's `name`
//! and `input` to the one-line display shown when its use starts.
//!
//! The spec deliberately scopes detailed per-tool display rules out ("tool-specific
//! display formatting... abstracted as an injectable tool formatter registry") — this
//! module owns the narrow registry interface plus a reasonable default set of templates,
//! grounded in the teacher's `minijinja` prompt-templating use, repurposed here for
//! per-tool display lines instead of system prompts.

use crate::config::RuntimeConfig;
use arc_swap::ArcSwap;
use minijinja::{Environment, context};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps a tool's `name` to the one-line display rendered for a `ToolStart` op (spec §4.7).
pub trait ToolFormatterRegistry: Send + Sync {
    /// Render the display line for a tool invocation, e.g. `"Bash: ls -la"`.
    fn format_call(&self, name: &str, input: &Value) -> String;

    /// Whether this tool's invocation should require a permission prompt (spec §4.5.3)
    /// before it is shown, absent a session-level allow-all for it. `TodoWrite`,
    /// `ExitPlanMode`, and `AskUserQuestion` are structural tools the dispatcher always
    /// intercepts before display and never need a permission gate of their own.
    fn requires_permission(&self, name: &str) -> bool {
        !matches!(name, "TodoWrite" | "ExitPlanMode" | "AskUserQuestion")
    }
}

/// `minijinja`-backed registry: one short template string per known tool name, falling
/// back to a generic `name(key: value, …)` rendering for anything unregistered.
pub struct TemplateFormatterRegistry {
    env: Environment<'static>,
    templates: HashMap<&'static str, &'static str>,
}

impl TemplateFormatterRegistry {
    pub fn new() -> Self {
        let mut templates = HashMap::new();
        templates.insert("Bash", "Bash: `{{ input.command }}`");
        templates.insert("Read", "Read {{ input.file_path }}");
        templates.insert("Write", "Write {{ input.file_path }}");
        templates.insert("Edit", "Edit {{ input.file_path }}");
        templates.insert("Grep", "Grep `{{ input.pattern }}`");
        templates.insert("Glob", "Glob `{{ input.pattern }}`");
        templates.insert("WebFetch", "Fetch {{ input.url }}");
        templates.insert("WebSearch", "Search: {{ input.query }}");
        templates.insert("Task", "Subagent: {{ input.description }}");
        Self {
            env: Environment::new(),
            templates,
        }
    }

    fn generic(name: &str, input: &Value) -> String {
        let Value::Object(map) = input else {
            return format!("{name}(…)");
        };
        let mut parts: Vec<String> = map
            .iter()
            .take(3)
            .map(|(k, v)| {
                let rendered = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let rendered = if rendered.len() > 60 {
                    format!("{}…", &rendered[..rendered.floor_char_boundary(60)])
                } else {
                    rendered
                };
                format!("{k}: {rendered}")
            })
            .collect();
        if map.len() > 3 {
            parts.push("…".to_string());
        }
        format!("{name}({})", parts.join(", "))
    }
}

trait FloorCharBoundary {
    fn floor_char_boundary(&self, index: usize) -> usize;
}

impl FloorCharBoundary for str {
    fn floor_char_boundary(&self, index: usize) -> usize {
        let mut i = index.min(self.len());
        while i > 0 && !self.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

impl Default for TemplateFormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolFormatterRegistry for TemplateFormatterRegistry {
    fn format_call(&self, name: &str, input: &Value) -> String {
        self.templates
            .get(name)
            .and_then(|tpl| self.env.render_str(tpl, context! { input => input }).ok())
            .unwrap_or_else(|| Self::generic(name, input))
    }
}

/// Wraps [`TemplateFormatterRegistry`] with a live view of `RuntimeConfig.tool_formatters`
/// (spec §11.3): a config-supplied template for a tool name overrides the built-in one on
/// every render, and [`ConfigWatcher`](crate::config::ConfigWatcher) swapping in a fresh
/// config takes effect on the next tool call with no restart.
pub struct ConfigDrivenFormatterRegistry {
    config: Arc<ArcSwap<RuntimeConfig>>,
    env: Environment<'static>,
    defaults: TemplateFormatterRegistry,
}

impl ConfigDrivenFormatterRegistry {
    pub fn new(config: Arc<ArcSwap<RuntimeConfig>>) -> Self {
        Self { config, env: Environment::new(), defaults: TemplateFormatterRegistry::new() }
    }
}

impl ToolFormatterRegistry for ConfigDrivenFormatterRegistry {
    fn format_call(&self, name: &str, input: &Value) -> String {
        let config = self.config.load();
        if let Some(template) = config.tool_formatters.get(name) {
            if let Ok(rendered) = self.env.render_str(template, context! { input => input }) {
                return rendered;
            }
            tracing::warn!(tool = name, "configured tool formatter template failed to render, using built-in");
        }
        self.defaults.format_call(name, input)
    }

    fn requires_permission(&self, name: &str) -> bool {
        self.defaults.requires_permission(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_a_known_tool_from_its_template() {
        let registry = TemplateFormatterRegistry::new();
        let line = registry.format_call("Bash", &json!({ "command": "ls -la" }));
        assert_eq!(line, "Bash: `ls -la`");
    }

    #[test]
    fn falls_back_to_generic_rendering_for_unknown_tools() {
        let registry = TemplateFormatterRegistry::new();
        let line = registry.format_call("MysteryTool", &json!({ "foo": "bar" }));
        assert_eq!(line, "MysteryTool(foo: bar)");
    }

    #[test]
    fn structural_tools_never_require_permission() {
        let registry = TemplateFormatterRegistry::new();
        assert!(!registry.requires_permission("TodoWrite"));
        assert!(!registry.requires_permission("ExitPlanMode"));
        assert!(!registry.requires_permission("AskUserQuestion"));
        assert!(registry.requires_permission("Bash"));
    }

    fn sample_config(tool_formatters: HashMap<String, String>) -> RuntimeConfig {
        RuntimeConfig {
            version: 2,
            working_dir: "/tmp".into(),
            chrome: false,
            worktree_mode: Default::default(),
            assistant_command: "claude".into(),
            assistant_args: vec![],
            idle_timeout_secs: 1800,
            thread_log_retention_days: 30,
            tool_formatters,
            platforms: vec![],
        }
    }

    #[test]
    fn config_template_overrides_the_built_in_one() {
        let mut overrides = HashMap::new();
        overrides.insert("Bash".to_string(), "$ {{ input.command }}".to_string());
        let config = Arc::new(ArcSwap::new(Arc::new(sample_config(overrides))));
        let registry = ConfigDrivenFormatterRegistry::new(config);
        let line = registry.format_call("Bash", &json!({ "command": "ls -la" }));
        assert_eq!(line, "$ ls -la");
    }

    #[test]
    fn config_falls_back_to_built_in_templates_for_unlisted_tools() {
        let config = Arc::new(ArcSwap::new(Arc::new(sample_config(HashMap::new()))));
        let registry = ConfigDrivenFormatterRegistry::new(config);
        let line = registry.format_call("Read", &json!({ "file_path": "src/main.rs" }));
        assert_eq!(line, "Read src/main.rs");
    }
}
