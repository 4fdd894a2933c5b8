//! Output layer shared by every `wt` command.
//!
//! Each handler receives an [`OutputMode`] resolved once in `main` (see
//! [`witrack_core::config::resolve_output`]) and renders through the helpers
//! here, so pretty, text and JSON stay in step.

use anyhow::Result;
use serde::Serialize;
use std::io::{self, Write};
use witrack_core::ErrorCode;

/// Shared width for pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Sections and aligned key/value lines for terminals.
    Pretty,
    /// One tab-separated line per record for pipes and scripts.
    Text,
    /// Stable JSON documents.
    Json,
}

impl OutputMode {
    /// Map a resolved output name onto a mode; unknown names are pretty.
    #[must_use]
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }

    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Left-aligned `key: value` line.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<14} {}", format!("{key}:"), value.as_ref())
}

/// Serialize `value` as pretty JSON on stdout.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Render `value` as JSON, or hand stdout to `human` for pretty/text.
///
/// # Errors
///
/// Propagates serialization and write failures.
pub fn render<T, F>(mode: OutputMode, value: &T, human: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T, OutputMode, &mut dyn Write) -> io::Result<()>,
{
    if mode.is_json() {
        return print_json(value);
    }
    let stdout = io::stdout();
    let mut out = stdout.lock();
    human(value, mode, &mut out)?;
    Ok(())
}

/// Machine-readable failure document used by `--json` error output.
#[derive(Debug, Serialize)]
pub struct ErrorReport<'a> {
    pub code: &'static str,
    pub error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

/// Write a failure to stderr, with its stable code when one is known.
pub fn render_error(mode: OutputMode, err: &anyhow::Error) {
    let code = error_code(err);
    let message = format!("{err:#}");
    let mut stderr = io::stderr().lock();

    if mode.is_json() {
        let report = ErrorReport {
            code: code.code(),
            error: &message,
            hint: code.hint(),
        };
        if let Ok(json) = serde_json::to_string(&report) {
            let _ = writeln!(stderr, "{json}");
        }
        return;
    }

    let _ = writeln!(stderr, "error[{}]: {message}", code.code());
    if let Some(hint) = code.hint() {
        let _ = writeln!(stderr, "  hint: {hint}");
    }
}

/// Stable code for an error chain: the first typed error found wins.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<witrack_core::Error>() {
            return core.code();
        }
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return cli.code();
        }
    }
    ErrorCode::InternalUnexpected
}

/// Failures raised by the CLI layer itself rather than the store.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("no {} directory found in this directory or any parent", witrack_core::config::PROJECT_DIR)]
    NotInitialized,
    #[error("{0}")]
    ConfigParse(String),
}

impl CliError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::ConfigParse(_) => ErrorCode::ConfigParseError,
        }
    }
}
