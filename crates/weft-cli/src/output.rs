//! Shared colored output for CLI commands.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects `NO_COLOR` and the `--color` flag.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use weft_engine::{Registry, TraceEvent};

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

/// Styled writer for stdout and stderr.
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

    /// Write a line with a specific color and weight.
    pub fn line(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Green bold line.
    pub fn success(&mut self, text: &str) {
        self.line(text, Some(Color::Green), true);
    }

    /// Cyan line.
    pub fn info(&mut self, text: &str) {
        self.line(text, Some(Color::Cyan), false);
    }

    /// Dimmed line.
    pub fn dim(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_dimmed(true);
        let _ = self.stdout.set_color(&spec);
        let _ = writeln!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Plain line.
    pub fn plain(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "{}", text);
    }

    /// Red `error:` prefix plus message, on stderr.
    pub fn error(&mut self, text: &str) {
        let _ = self
            .stderr
            .set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true));
        let _ = write!(self.stderr, "error");
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, ": {}", text);
    }

    /// Trace event, colored by kind.
    pub fn trace_event(&mut self, registry: &Registry, event: &TraceEvent) {
        let text = format!("  {}", event.describe(registry));
        match event {
            TraceEvent::Enter { .. } | TraceEvent::Exit { .. } => self.dim(&text),
            TraceEvent::Advice { .. } => self.line(&text, Some(Color::Cyan), false),
            TraceEvent::Masked { .. } | TraceEvent::ShortCircuit { .. } => {
                self.line(&text, Some(Color::Yellow), false)
            }
            TraceEvent::Fault { .. } => self.line(&text, Some(Color::Red), false),
        }
    }

    /// Flush stdout.
    pub fn flush(&mut self) {
        let _ = self.stdout.flush();
    }
}
