//! Templating engine boundary.
//!
//! The build core never parses or converts documents itself. It goes
//! through the [`Engine`] trait, which has exactly the two operations the
//! core needs:
//!
//! - **parse**: source text + path → document tree and diagnostic log
//! - **convert**: document tree (with zone metadata attached) → output text
//!   and diagnostic log
//!
//! Diagnostics never abort a build. They are collected into a [`Log`] and
//! flushed to the error stream by the caller.
//!
//! The production implementation is [`LexEngine`](lex::LexEngine), which
//! reads front matter plus HTML-like markup and renders CommonMark text.

pub mod document;
pub mod lex;
pub mod markup;

pub use document::{Document, Element, Node};
pub use lex::LexEngine;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// One engine message, tied to a source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: PathBuf,
    /// 1-based line, 0 when the message concerns the whole file.
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

/// Diagnostics collected while parsing or converting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Log {
    entries: Vec<Diagnostic>,
}

impl Log {
    pub fn warning(&mut self, path: &Path, line: usize, message: impl Into<String>) {
        self.push(path, line, Severity::Warning, message.into());
    }

    pub fn error(&mut self, path: &Path, line: usize, message: impl Into<String>) {
        self.push(path, line, Severity::Error, message.into());
    }

    fn push(&mut self, path: &Path, line: usize, severity: Severity, message: String) {
        self.entries.push(Diagnostic {
            path: path.to_path_buf(),
            line,
            severity,
            message,
        });
    }

    pub fn append(&mut self, other: Log) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }
}

/// Settings the converter needs besides the document itself.
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions<'a> {
    /// Name of the theme the document selected.
    pub theme: &'a str,
    /// Theme name first, then the document's own packages.
    pub packages: &'a [String],
    /// Directories searched for package partials, in priority order.
    pub module_path: &'a [PathBuf],
}

/// A templating engine the build core delegates parsing and conversion to.
pub trait Engine {
    /// Parse source text. Problems are reported in the log; the returned
    /// tree is always usable (best effort).
    fn parse(&self, text: &str, path: &Path) -> (Document, Log);

    /// Convert a document to its output representation.
    fn convert(&self, doc: &Document, options: &ConvertOptions<'_>) -> (String, Log);
}
