//! Content Breaker: pure functions deciding how to split a growing text buffer across
//! chat posts without cutting a code fence, heading, or tool marker in half (spec §4.3).
//!
//! Everything here is a pure function over `&str` — no I/O, no shared state — so it can
//! be unit-tested exhaustively and reused unchanged by any platform port.

use crate::platform::MessageLimits;
use regex::Regex;
use std::sync::LazyLock;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^```").unwrap());
static TOOL_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^  ↳ (✓|❌).*\n").unwrap());
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(#{2,3}) .*$").unwrap());

/// Whether position `p` in buffer `B` sits inside an open fenced code block, per the
/// fence-marker parity rule (an odd number of line-start `` ``` `` markers before `p`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockState {
    pub inside: bool,
    pub language: Option<String>,
    pub open_position: Option<usize>,
}

pub fn code_block_state(buf: &str, p: usize) -> CodeBlockState {
    let p = p.min(buf.len());
    let scanned = &buf[..p];
    let positions: Vec<usize> = FENCE_RE.find_iter(scanned).map(|m| m.start()).collect();
    let inside = positions.len() % 2 == 1;
    if !inside {
        return CodeBlockState {
            inside: false,
            language: None,
            open_position: None,
        };
    }
    let open_position = *positions.last().unwrap();
    let line_end = buf[open_position..]
        .find('\n')
        .map(|i| open_position + i)
        .unwrap_or(buf.len());
    let language = buf[open_position + 3..line_end]
        .trim()
        .to_string()
        .and_then_non_empty();
    CodeBlockState {
        inside: true,
        language,
        open_position: Some(open_position),
    }
}

trait NonEmptyString {
    fn and_then_non_empty(self) -> Option<String>;
}

impl NonEmptyString for String {
    fn and_then_non_empty(self) -> Option<String> {
        if self.is_empty() { None } else { Some(self) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    ToolMarker,
    Heading,
    CodeBlockEnd,
    ParagraphBreak,
    LineBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub position: usize,
    pub kind: BreakpointKind,
}

/// Find the highest-priority safe breakpoint in `B[start .. start+lookahead]`.
///
/// When `start` is inside a code block, only a closing fence counts — splitting
/// mid-fence-content would break the block across two posts with no visual seam.
pub fn find_logical_breakpoint(buf: &str, start: usize, lookahead: usize) -> Option<Breakpoint> {
    let start = start.min(buf.len());
    let end = (start + lookahead).min(buf.len());
    if start >= end {
        return None;
    }
    let window = &buf[start..end];

    if code_block_state(buf, start).inside {
        let fences: Vec<_> = FENCE_RE.find_iter(window).collect();
        let m = fences.first()?;
        let position = start + m.end();
        return Some(Breakpoint {
            position,
            kind: BreakpointKind::CodeBlockEnd,
        });
    }

    if let Some(m) = TOOL_MARKER_RE.find(window) {
        let position = start + m.end();
        if !code_block_state(buf, position).inside {
            return Some(Breakpoint {
                position,
                kind: BreakpointKind::ToolMarker,
            });
        }
    }

    if let Some(m) = HEADING_RE.find(window) {
        let position = start + m.start();
        if !code_block_state(buf, position).inside {
            return Some(Breakpoint {
                position,
                kind: BreakpointKind::Heading,
            });
        }
    }

    let fences: Vec<_> = FENCE_RE.find_iter(window).collect();
    if fences.len() >= 2 {
        let position = start + fences[1].end();
        if !code_block_state(buf, position).inside {
            return Some(Breakpoint {
                position,
                kind: BreakpointKind::CodeBlockEnd,
            });
        }
    }

    if let Some(idx) = window.find("\n\n") {
        let position = start + idx + 2;
        if !code_block_state(buf, position).inside {
            return Some(Breakpoint {
                position,
                kind: BreakpointKind::ParagraphBreak,
            });
        }
    }

    if let Some(idx) = window.find('\n') {
        let position = start + idx + 1;
        if !code_block_state(buf, position).inside {
            return Some(Breakpoint {
                position,
                kind: BreakpointKind::LineBreak,
            });
        }
    }

    None
}

pub fn should_flush_early(buf: &str, soft_threshold: usize, max_lines: usize) -> bool {
    buf.len() >= soft_threshold || buf.lines().count() >= max_lines
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailKind {
    ToolMarker,
    CodeBlockEnd,
    Paragraph,
    None,
}

pub fn ends_at_breakpoint(buf: &str) -> TailKind {
    if TOOL_MARKER_RE.is_match(buf) && buf.ends_with('\n') {
        let last_line_start = buf[..buf.len() - 1].rfind('\n').map(|i| i + 1).unwrap_or(0);
        if TOOL_MARKER_RE.is_match(&buf[last_line_start..]) {
            return TailKind::ToolMarker;
        }
    }
    let fence_count = FENCE_RE.find_iter(buf).count();
    if fence_count > 0 && fence_count % 2 == 0 && buf.trim_end().ends_with("```") {
        return TailKind::CodeBlockEnd;
    }
    if buf.ends_with("\n\n") {
        return TailKind::Paragraph;
    }
    TailKind::None
}

/// The action the content executor should take at a flush point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushAction {
    /// No post exists yet; create one from the whole buffer (truncated if it exceeds
    /// the platform's hard `max_length`).
    CreatePost { body: String },
    /// Update the existing post in place with the full buffer.
    UpdateInPlace { body: String },
    /// Split the buffer: `head` replaces the existing post, `tail` becomes pending
    /// content for the next post.
    Split { head: String, tail: String },
}

const TRUNCATION_SUFFIX: &str = "\n… (truncated)";

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Decide what to do with the current post content plus a freshly-arrived delta.
///
/// `current` is `None` for a not-yet-created post, `Some(existing body)` otherwise.
pub fn plan_flush(current: Option<&str>, delta: &str, limits: &MessageLimits) -> FlushAction {
    let buf = match current {
        Some(c) => format!("{c}{delta}"),
        None => delta.to_string(),
    };

    if current.is_none() {
        if buf.len() > limits.max_length {
            let cut = floor_char_boundary(&buf, limits.max_length - TRUNCATION_SUFFIX.len());
            let mut body = buf[..cut].to_string();
            body.push_str(TRUNCATION_SUFFIX);
            return FlushAction::CreatePost { body };
        }
        return FlushAction::CreatePost { body: buf };
    }

    let over_hard = buf.len() > limits.hard_threshold;
    if over_hard || should_flush_early(&buf, limits.soft_threshold, limits.max_lines) {
        let (search_start, lookahead) = if over_hard {
            let lo = ((limits.hard_threshold as f64) * 0.7) as usize;
            (lo, limits.hard_threshold.saturating_sub(lo))
        } else {
            (
                limits.soft_threshold,
                buf.len().saturating_sub(limits.soft_threshold),
            )
        };
        let search_start = search_start.min(buf.len());

        if let Some(bp) = find_logical_breakpoint(&buf, search_start, lookahead) {
            let head = buf[..bp.position].trim_end().to_string();
            let tail = buf[bp.position..].trim_start().to_string();
            return FlushAction::Split { head, tail };
        }

        let state = code_block_state(&buf, search_start);
        if state.inside {
            if let Some(open) = state.open_position {
                let head_end = buf[..open].rfind('\n').unwrap_or(0);
                if head_end > 0 {
                    let head = buf[..head_end].trim_end().to_string();
                    let tail = buf[head_end..].trim_start().to_string();
                    return FlushAction::Split { head, tail };
                }
            }
        }

        return FlushAction::UpdateInPlace { body: buf };
    }

    FlushAction::UpdateInPlace { body: buf }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> MessageLimits {
        MessageLimits {
            max_length: 100,
            soft_threshold: 40,
            hard_threshold: 80,
            max_lines: 10,
        }
    }

    #[test]
    fn code_block_state_detects_open_fence_with_language() {
        let buf = "text\n```rust\nfn main() {}\n";
        let state = code_block_state(buf, buf.len());
        assert!(state.inside);
        assert_eq!(state.language.as_deref(), Some("rust"));
    }

    #[test]
    fn code_block_state_closed_block_is_not_inside() {
        let buf = "text\n```\ncode\n```\nmore text";
        let state = code_block_state(buf, buf.len());
        assert!(!state.inside);
    }

    #[test]
    fn fresh_post_under_max_length_is_created_whole() {
        let action = plan_flush(None, "hello world", &limits());
        assert_eq!(
            action,
            FlushAction::CreatePost {
                body: "hello world".to_string()
            }
        );
    }

    #[test]
    fn fresh_post_over_max_length_is_truncated() {
        let long = "x".repeat(150);
        let action = plan_flush(None, &long, &limits());
        match action {
            FlushAction::CreatePost { body } => {
                assert!(body.len() <= 100);
                assert!(body.ends_with("(truncated)"));
            }
            other => panic!("expected CreatePost, got {other:?}"),
        }
    }

    #[test]
    fn small_update_stays_in_place() {
        let action = plan_flush(Some("existing "), "more", &limits());
        assert_eq!(
            action,
            FlushAction::UpdateInPlace {
                body: "existing more".to_string()
            }
        );
    }

    #[test]
    fn paragraph_break_is_used_as_a_split_point_when_over_soft_threshold() {
        let current = "a".repeat(35);
        let delta = format!("{}\n\nnext paragraph", "b".repeat(10));
        let action = plan_flush(Some(&current), &delta, &limits());
        match action {
            FlushAction::Split { head, tail } => {
                assert!(head.starts_with(&current));
                assert_eq!(tail, "next paragraph");
            }
            other => panic!("expected Split, got {other:?}"),
        }
    }

    #[test]
    fn open_code_block_with_no_closing_fence_in_window_splits_before_opening_fence() {
        let current = "intro line\n".to_string() + &"filler ".repeat(10);
        let delta = "\n```diff\n".to_string() + &"+added line\n".repeat(10);
        let action = plan_flush(Some(&current), &delta, &limits());
        match action {
            FlushAction::Split { head, tail } => {
                assert!(!head.contains("```"));
                assert!(tail.starts_with("```diff"));
            }
            FlushAction::UpdateInPlace { .. } => {
                // also acceptable: no safe split position existed yet
            }
            other => panic!("expected Split or UpdateInPlace, got {other:?}"),
        }
    }

    #[test]
    fn tool_marker_line_end_is_a_valid_breakpoint() {
        let buf = "doing work\n  ↳ ✓ done\nmore text after";
        let bp = find_logical_breakpoint(buf, 0, buf.len()).unwrap();
        assert_eq!(bp.kind, BreakpointKind::ToolMarker);
        assert_eq!(&buf[bp.position..], "more text after");
    }

    #[test]
    fn heading_level_two_is_a_valid_breakpoint() {
        let buf = "some prose\n## Section\nmore";
        let bp = find_logical_breakpoint(buf, 0, buf.len()).unwrap();
        assert_eq!(bp.kind, BreakpointKind::Heading);
    }

    #[test]
    fn inside_code_block_only_closing_fence_is_eligible() {
        let buf = "```\ncode line\nmore code\n```\ntrailing";
        // start=4 is just after the opening fence+newline, i.e. inside the block.
        let bp = find_logical_breakpoint(buf, 4, buf.len());
        assert_eq!(bp.unwrap().kind, BreakpointKind::CodeBlockEnd);
    }

    #[test]
    fn inside_code_block_with_no_closing_fence_in_lookahead_has_no_candidate() {
        let buf = "```\nopen forever with no closing fence";
        let bp = find_logical_breakpoint(buf, 4, buf.len());
        assert!(bp.is_none());
    }

    #[test]
    fn empty_buffer_round_trips_as_create_post() {
        let action = plan_flush(None, "", &limits());
        assert_eq!(
            action,
            FlushAction::CreatePost {
                body: String::new()
            }
        );
    }

    #[test]
    fn buffer_exactly_at_hard_threshold_does_not_force_a_split() {
        let current = "a".repeat(limits().hard_threshold - 5);
        let delta = "b".repeat(5);
        let action = plan_flush(Some(&current), &delta, &limits());
        assert_eq!(
            action,
            FlushAction::UpdateInPlace {
                body: format!("{current}{delta}")
            }
        );
    }

    #[test]
    fn should_flush_early_triggers_on_line_count_alone() {
        let buf = "a\n".repeat(20);
        assert!(should_flush_early(&buf, 10_000, 10));
    }

    #[test]
    fn ends_at_breakpoint_recognizes_tool_marker_tail() {
        let buf = "step one\n  ↳ ✓ finished\n";
        assert_eq!(ends_at_breakpoint(buf), TailKind::ToolMarker);
    }

    #[test]
    fn ends_at_breakpoint_recognizes_closed_code_block_tail() {
        let buf = "text\n```\ncode\n```";
        assert_eq!(ends_at_breakpoint(buf), TailKind::CodeBlockEnd);
    }
}
