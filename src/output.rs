//! Build progress and diagnostic output.
//!
//! Everything goes to the error stream so standard output stays free for
//! commands that print data (`config`, `defaults`).
//!
//! # Output Format
//!
//! ```text
//! Checking ./index.lex ... done.
//! Checking ./about.lex ...  [FILE CHANGE]: Building ... done.
//! Checking ./blog/post.lex ...  [NEW FILE]: Building ...
//! ./blog/post.lex:3: warning: unclosed <em>
//! done.
//! 2 built, 1 up to date (3 total)
//! ```
//!
//! Diagnostics print as `path:line: level: message`, or as one JSON object
//! per line with `--log json`:
//!
//! ```text
//! {"path":"./blog/post.lex","line":3,"severity":"warning","message":"unclosed <em>"}
//! ```
//!
//! # Architecture
//!
//! `format_*` functions are pure and return the exact text; [`Reporter`]
//! decides what to show (`--no-display`, `--quiet`) and writes it.

use crate::engine::{Diagnostic, Log, Severity};
use crate::freshness::{BuildStats, Decision};
use clap::ValueEnum;
use std::io::{self, Stderr, Write};
use std::path::Path;

/// Diagnostic output style, `--log`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogStyle {
    #[default]
    Plain,
    Json,
}

// ============================================================================
// Formatting
// ============================================================================

pub fn format_checking(path: &Path) -> String {
    format!("Checking {} ... ", path.display())
}

/// The rebuild annotation, `None` when the file is left alone.
pub fn format_annotation(decision: Decision) -> Option<String> {
    decision
        .label()
        .map(|label| format!(" [{label}]: Building ... "))
}

pub fn format_diagnostic(diagnostic: &Diagnostic, style: LogStyle) -> String {
    match style {
        LogStyle::Plain => format!(
            "{}:{}: {}: {}",
            diagnostic.path.display(),
            diagnostic.line,
            diagnostic.severity,
            diagnostic.message
        ),
        LogStyle::Json => serde_json::to_string(diagnostic).unwrap_or_else(|_| {
            format!("{{\"message\":{:?}}}", diagnostic.message)
        }),
    }
}

pub fn format_summary(stats: &BuildStats) -> String {
    stats.to_string()
}

// ============================================================================
// Reporter
// ============================================================================

/// Writes build progress and diagnostics. Write failures on the error
/// stream are ignored.
pub struct Reporter<W: Write = Stderr> {
    out: W,
    /// Show progress and the summary (`--no-display` clears it).
    pub display: bool,
    /// Drop warnings, keep errors.
    pub quiet: bool,
    pub style: LogStyle,
    /// A progress line is open and needs a newline before other output.
    pending_line: bool,
}

impl Reporter<Stderr> {
    pub fn stderr(display: bool, quiet: bool, style: LogStyle) -> Self {
        Self::new(io::stderr(), display, quiet, style)
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W, display: bool, quiet: bool, style: LogStyle) -> Self {
        Self {
            out,
            display,
            quiet,
            style,
            pending_line: false,
        }
    }

    pub fn checking(&mut self, path: &Path) {
        if self.display {
            let _ = write!(self.out, "{}", format_checking(path));
            self.pending_line = true;
        }
    }

    pub fn building(&mut self, decision: Decision) {
        if let (true, Some(text)) = (self.display, format_annotation(decision)) {
            let _ = write!(self.out, "{text}");
            let _ = self.out.flush();
        }
    }

    pub fn done(&mut self) {
        self.finish_line("done.");
    }

    pub fn failed(&mut self) {
        self.finish_line("failed.");
    }

    fn finish_line(&mut self, word: &str) {
        if self.display {
            let _ = writeln!(self.out, "{word}");
            self.pending_line = false;
        }
    }

    pub fn diagnostics(&mut self, log: &Log) {
        let shown: Vec<&Diagnostic> = log
            .iter()
            .filter(|d| !(self.quiet && d.severity == Severity::Warning))
            .collect();
        if shown.is_empty() {
            return;
        }
        if self.pending_line {
            let _ = writeln!(self.out);
            self.pending_line = false;
        }
        for diagnostic in shown {
            let _ = writeln!(self.out, "{}", format_diagnostic(diagnostic, self.style));
        }
    }

    pub fn summary(&mut self, stats: &BuildStats) {
        if self.display {
            let _ = writeln!(self.out, "{}", format_summary(stats));
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn reporter(display: bool, quiet: bool) -> Reporter<Vec<u8>> {
        Reporter::new(Vec::new(), display, quiet, LogStyle::Plain)
    }

    fn text(r: Reporter<Vec<u8>>) -> String {
        String::from_utf8(r.into_inner()).unwrap()
    }

    fn log_with_both() -> Log {
        let mut log = Log::default();
        log.warning(Path::new("a.lex"), 3, "unclosed <em>");
        log.error(Path::new("a.lex"), 0, "cannot read");
        log
    }

    #[test]
    fn annotation_labels() {
        assert_eq!(
            format_annotation(Decision::ThemeChange).unwrap(),
            " [THEME CHANGE]: Building ... "
        );
        assert_eq!(
            format_annotation(Decision::FileChange).unwrap(),
            " [FILE CHANGE]: Building ... "
        );
        assert_eq!(format_annotation(Decision::UpToDate), None);
    }

    #[test]
    fn plain_diagnostic_format() {
        let d = Diagnostic {
            path: PathBuf::from("site/a.lex"),
            line: 7,
            severity: Severity::Error,
            message: "bad".into(),
        };
        assert_eq!(format_diagnostic(&d, LogStyle::Plain), "site/a.lex:7: error: bad");
    }

    #[test]
    fn json_diagnostic_format() {
        let d = Diagnostic {
            path: PathBuf::from("a.lex"),
            line: 1,
            severity: Severity::Warning,
            message: "w".into(),
        };
        assert_eq!(
            format_diagnostic(&d, LogStyle::Json),
            r#"{"path":"a.lex","line":1,"severity":"warning","message":"w"}"#
        );
    }

    #[test]
    fn progress_for_skipped_and_built_files() {
        let mut r = reporter(true, false);
        r.checking(Path::new("a.lex"));
        r.building(Decision::UpToDate);
        r.done();
        r.checking(Path::new("b.lex"));
        r.building(Decision::Force);
        r.done();
        assert_eq!(
            text(r),
            "Checking a.lex ... done.\nChecking b.lex ...  [FORCE]: Building ... done.\n"
        );
    }

    #[test]
    fn no_display_suppresses_progress_not_errors() {
        let mut r = reporter(false, false);
        r.checking(Path::new("a.lex"));
        r.building(Decision::NewFile);
        r.diagnostics(&log_with_both());
        r.done();
        r.summary(&BuildStats::default());
        assert_eq!(
            text(r),
            "a.lex:3: warning: unclosed <em>\na.lex:0: error: cannot read\n"
        );
    }

    #[test]
    fn quiet_drops_warnings_only() {
        let mut r = reporter(false, true);
        r.diagnostics(&log_with_both());
        assert_eq!(text(r), "a.lex:0: error: cannot read\n");
    }

    #[test]
    fn diagnostics_break_open_progress_line() {
        let mut r = reporter(true, false);
        r.checking(Path::new("a.lex"));
        r.building(Decision::NewFile);
        r.diagnostics(&log_with_both());
        r.done();
        let out = text(r);
        assert!(out.starts_with("Checking a.lex ...  [NEW FILE]: Building ... \na.lex:3:"));
        assert!(out.ends_with("cannot read\ndone.\n"));
    }
}
