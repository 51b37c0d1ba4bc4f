//! Ambient logging stack (spec §10.1): a single `tracing-subscriber` `Registry` built once
//! at startup, writing to a daily-rolling file under `<data-dir>/logs/` and, when running in
//! the foreground, to stderr as well. Secret-shaped field values are redacted at the
//! formatting boundary rather than trusted to callers (spec §7/§9).

use std::path::Path;
use std::sync::LazyLock;
use tracing_subscriber::fmt::format;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::EnvFilter;

/// Patterns matching the secret shapes named in spec §7/§9: `Bearer <token>`, `token=...`,
/// `password=...`, `secret=...`. Compiled once; applied to every formatted field value.
static REDACT_PATTERNS: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r#"(?i)(Bearer\s+[A-Za-z0-9\-._~+/]+=*|(?:token|password|secret|authorization)\s*[=:]\s*\S+)"#,
    )
    .expect("static redaction pattern is valid")
});

fn redact(text: &str) -> std::borrow::Cow<'_, str> {
    REDACT_PATTERNS.replace_all(text, "[REDACTED]")
}

/// A `fmt_fields` formatter that redacts secret-shaped values before they reach the sink.
/// Grounded in the teacher's `daemon::init_*_tracing` field formatter, minus the OTel
/// span-field suppression that doesn't apply here.
fn redacting_field_formatter()
-> impl for<'writer> Fn(format::Writer<'writer>, &tracing::field::Field, &dyn std::fmt::Debug) -> std::fmt::Result
       + Clone {
    move |mut writer: format::Writer<'_>, field: &tracing::field::Field, value: &dyn std::fmt::Debug| {
        let formatted = format!("{value:?}");
        write!(writer, "{}={}", field.name(), redact(&formatted))
    }
}

fn build_env_filter(debug: bool) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        return EnvFilter::from_default_env();
    }
    EnvFilter::new(if debug { "debug" } else { "info" })
}

/// Guard that must be held for the process lifetime so the non-blocking file writer keeps
/// flushing; dropping it silently stops log output.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize the global tracing subscriber (spec §10.1). `log_dir` holds the daily-rolling
/// file appender; `foreground` additionally mirrors output to stderr, matching how an
/// operator running this interactively expects to see what's happening.
pub fn init(log_dir: &Path, debug: bool, foreground: bool) -> std::io::Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "threadbot.log");
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let filter = build_env_filter(debug);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .fmt_fields(redacting_field_formatter())
        .compact();

    if foreground {
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .fmt_fields(redacting_field_formatter())
            .compact();
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stderr_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(file_layer).init();
    }

    Ok(LoggingGuard { _file_guard: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_tokens() {
        let line = "Authorization: Bearer abc123.def-456_ghi";
        assert_eq!(redact(line), "Authorization: [REDACTED]");
    }

    #[test]
    fn redacts_key_value_secrets() {
        assert_eq!(redact("token=sk-abcdef"), "[REDACTED]");
        assert_eq!(redact("password: hunter2"), "[REDACTED]");
    }

    #[test]
    fn leaves_ordinary_text_alone() {
        assert_eq!(redact("hello world"), "hello world");
    }
}
