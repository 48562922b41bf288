//! Shared output layer for pretty/text/JSON parity across all commands.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `FORMAT` env var: `"pretty"` | `"text"` | `"json"`
//! 3. `output` in the project or user config file
//! 4. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use std::io::{self, IsTerminal, Write};

use clap::ValueEnum;
use serde::Serialize;
use tangle_graph::{ErrorCode, GraphError};
use tangle_load::LoadError;
use tangle_model::ModelError;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (sections, aligned columns).
    Pretty,
    /// Tab-separated plain text for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    config_output: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }
    if json_flag {
        return OutputMode::Json;
    }
    if let Some(mode) = format_env.and_then(OutputMode::parse) {
        return mode;
    }
    if let Some(mode) = config_output.and_then(OutputMode::parse) {
        return mode;
    }
    if is_tty { OutputMode::Pretty } else { OutputMode::Text }
}

/// Resolve the output mode from flags, environment, config and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool, config_output: Option<&str>) -> OutputMode {
    let env_val = std::env::var("FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), config_output, is_tty)
}

/// Render a serializable value with explicit text and pretty renderers.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text_fn(value, &mut out)?,
        OutputMode::Pretty => pretty_fn(value, &mut out)?,
    }
    Ok(())
}

/// Render a serializable value; pretty and text share `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => human_fn(value, &mut out)?,
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Stable `E####` code when the failure came from a typed library error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            error_code: None,
        }
    }

    fn with_code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code.code().to_string());
        self.suggestion = code.hint().map(str::to_string);
        self
    }
}

/// First typed library error in the chain, if any.
fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<LoadError>()
            .map(LoadError::code)
            .or_else(|| cause.downcast_ref::<ModelError>().map(ModelError::code))
            .or_else(|| cause.downcast_ref::<GraphError>().map(GraphError::code))
    })
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        let base = Self::new(format!("{err:#}"));
        match error_code(err) {
            Some(code) => base.with_code(code),
            None => base,
        }
    }
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(out, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_flag_wins_over_everything() {
        let mode = resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), Some("json"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn env_beats_config_and_tty() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("JSON"), Some("text"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("bogus"), Some("text"), true),
            OutputMode::Text
        );
    }

    #[test]
    fn tty_picks_default() {
        assert_eq!(resolve_output_mode_inner(None, false, None, None, true), OutputMode::Pretty);
        assert_eq!(resolve_output_mode_inner(None, false, None, None, false), OutputMode::Text);
        assert_eq!(resolve_output_mode_inner(None, true, None, None, false), OutputMode::Json);
    }

    #[test]
    fn typed_errors_carry_codes_through_context() {
        let err = anyhow::Error::new(LoadError::MissingNaturalKey("orders".into())).context("building load plan");
        let cli = CliError::from(&err);
        assert_eq!(cli.error_code.as_deref(), Some("E3003"));
        assert!(cli.message.contains("building load plan"));
        assert!(cli.message.contains("orders"));
        assert!(cli.suggestion.is_some());
    }

    #[test]
    fn untyped_errors_have_no_code() {
        let cli = CliError::from(&anyhow::anyhow!("plain failure"));
        assert!(cli.error_code.is_none());
        assert_eq!(cli.message, "plain failure");
    }

    #[test]
    fn pretty_kv_aligns_keys() {
        let mut out = Vec::new();
        pretty_kv(&mut out, "root", "Customer").expect("write");
        assert_eq!(String::from_utf8(out).expect("utf8"), "root:        Customer\n");
    }
}
