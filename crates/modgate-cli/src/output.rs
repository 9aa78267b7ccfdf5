//! Colored report output
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects the `NO_COLOR` environment variable and the `--color` flag.

use crate::runner::{CheckOutcome, Report};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Styled output writer for terminal.
pub struct StyledOutput {
    stdout: StandardStream,
    stderr: StandardStream,
}

impl StyledOutput {
    /// Create a new styled output with the given color choice.
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
            stderr: StandardStream::stderr(choice),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// One line per check: `ok` or `FAIL`, the label, and on failure both decisions.
    pub fn check(&mut self, outcome: &CheckOutcome) {
        if outcome.passed() {
            self.write_styled("ok  ", Some(Color::Green), true);
            let _ = writeln!(self.stdout, " {}", outcome.label);
        } else {
            self.write_styled("FAIL", Some(Color::Red), true);
            let _ = write!(self.stdout, " {} ", outcome.label);
            self.write_styled(
                &format!("(expected {}, got {})", outcome.expected, decision_text(outcome)),
                Some(Color::Yellow),
                false,
            );
            let _ = writeln!(self.stdout);
        }
    }

    /// Closing summary line.
    pub fn summary(&mut self, report: &Report) {
        let failures = report.failures();
        let passed = report.checks.len() - failures;
        let _ = writeln!(self.stdout);
        if failures == 0 {
            self.write_styled("All checks passed", Some(Color::Green), true);
        } else {
            self.write_styled(&format!("{} failed", failures), Some(Color::Red), true);
        }
        let _ = writeln!(
            self.stdout,
            " ({} passed, {} mutations applied)",
            passed, report.mutations
        );
    }

    /// Green bold status line.
    pub fn success(&mut self, text: &str) {
        self.write_styled(text, Some(Color::Green), true);
        let _ = writeln!(self.stdout);
    }

    /// Yellow `warning:` line on stderr.
    pub fn warning(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Yellow)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "warning");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, ": {}", text);
    }

    /// Write error message to stderr.
    pub fn stderr_error(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Red)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "error");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, ": {}", text);
    }

    /// Flush stdout.
    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}

fn decision_text(outcome: &CheckOutcome) -> String {
    match outcome.actual {
        modgate_core::AccessDecision::Allow => "allow".to_string(),
        modgate_core::AccessDecision::Deny(reason) => reason.to_string(),
    }
}
