//! Console output for keg commands.

use console::{style, Term};
use keg_pm::{ErrorKind, Stage};
use std::io::Write;

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    VeryVerbose,
    Debug,
}

impl Verbosity {
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Verbosity::Quiet;
        }
        match verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            2 => Verbosity::VeryVerbose,
            _ => Verbosity::Debug,
        }
    }

    /// `log` filter matching this verbosity
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
            Verbosity::Debug => "trace",
        }
    }
}

/// Messages go to stderr; stdout is reserved for command results
pub struct Output {
    term: Term,
    verbosity: Verbosity,
    json_mode: bool,
}

impl Output {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            term: Term::stderr(),
            verbosity,
            json_mode: false,
        }
    }

    pub fn set_json_mode(&mut self, json: bool) {
        self.json_mode = json;
    }

    fn should_output(&self, min_verbosity: Verbosity) -> bool {
        !self.json_mode && self.verbosity >= min_verbosity
    }

    pub fn writeln(&self, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "{}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "{}", style(message).cyan());
        }
    }

    pub fn success(&self, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "{} {}", style("✓").green().bold(), message);
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_output(Verbosity::Quiet) {
            let _ = writeln!(&self.term, "{} {}", style("Warning:").yellow().bold(), message);
        }
    }

    pub fn verbose(&self, message: &str) {
        if self.should_output(Verbosity::Verbose) {
            let _ = writeln!(&self.term, "{}", style(message).dim());
        }
    }

    pub fn list_item(&self, prefix: &str, message: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "  {} {}", style(prefix).green(), message);
        }
    }

    /// `label: value` line with an aligned label
    pub fn field(&self, label: &str, value: &str) {
        if self.should_output(Verbosity::Normal) {
            let _ = writeln!(&self.term, "{:<12} {}", style(format!("{}:", label)).bold(), value);
        }
    }

    /// The one-line failure report, printed even in quiet mode
    pub fn stage_failure(&self, stage: Option<Stage>, kind: ErrorKind, message: &str) {
        let _ = writeln!(
            &self.term,
            "{} {}",
            style("Error:").red().bold(),
            failure_line(stage, kind, message)
        );
    }

    /// Pretty JSON on stdout, only in JSON mode
    pub fn json<T: serde::Serialize>(&self, data: &T) {
        if self.json_mode {
            if let Ok(json) = serde_json::to_string_pretty(data) {
                println!("{}", json);
            }
        }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    pub fn is_json(&self) -> bool {
        self.json_mode
    }
}

/// `<stage> failed (<kind>): <message>`
pub fn failure_line(stage: Option<Stage>, kind: ErrorKind, message: &str) -> String {
    let stage = stage.map(|s| s.name()).unwrap_or("install");
    // Details beyond the first line are in the warn-level log
    let first_line = message.lines().next().unwrap_or_default();
    format!("{} failed ({}): {}", stage, kind, first_line)
}
