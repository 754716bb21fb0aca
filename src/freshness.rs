//! Rebuild decisions from modification times.
//!
//! There is no manifest or hash store. A source document `page.lex` is paired
//! with its output `page.html` in the same directory, and the output's
//! modification time is the only record of when it was last built.
//!
//! ## Decision order
//!
//! The first matching rule wins:
//!
//! 1. the zone's theme set is stale → [`Decision::ThemeChange`]
//! 2. `--force` was given → [`Decision::Force`]
//! 3. no output exists → [`Decision::NewFile`]
//! 4. output older than source → [`Decision::FileChange`]
//! 5. otherwise → [`Decision::UpToDate`]
//!
//! An output with exactly the source's timestamp counts as up to date.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::scan::OUTPUT_EXT;

/// Modification time of `path`, or `None` when it does not exist.
pub fn modified(path: &Path) -> io::Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => meta.modified().map(Some),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// `page.lex` → `page.html`, same directory.
pub fn output_path(source: &Path) -> PathBuf {
    source.with_extension(OUTPUT_EXT)
}

/// Whether `output` predates `source`. A missing output is stale.
pub fn is_stale(source: &Path, output: &Path) -> io::Result<bool> {
    Ok(match (modified(output)?, modified(source)?) {
        (None, _) => true,
        (Some(out), Some(src)) => out < src,
        (Some(_), None) => false,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ThemeChange,
    Force,
    NewFile,
    FileChange,
    UpToDate,
}

impl Decision {
    pub fn needs_build(self) -> bool {
        self != Decision::UpToDate
    }

    /// Progress annotation, `None` for files left alone.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Decision::ThemeChange => Some("THEME CHANGE"),
            Decision::Force => Some("FORCE"),
            Decision::NewFile => Some("NEW FILE"),
            Decision::FileChange => Some("FILE CHANGE"),
            Decision::UpToDate => None,
        }
    }
}

pub fn decide(source: &Path, theme_stale: bool, force: bool) -> io::Result<Decision> {
    if theme_stale {
        return Ok(Decision::ThemeChange);
    }
    if force {
        return Ok(Decision::Force);
    }
    let output = output_path(source);
    if modified(&output)?.is_none() {
        return Ok(Decision::NewFile);
    }
    if is_stale(source, &output)? {
        return Ok(Decision::FileChange);
    }
    Ok(Decision::UpToDate)
}

/// Counts for the end-of-build summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub built: u32,
    pub skipped: u32,
    pub failed: u32,
}

impl BuildStats {
    pub fn record(&mut self, decision: Decision) {
        if decision.needs_build() {
            self.built += 1;
        } else {
            self.skipped += 1;
        }
    }

    pub fn fail(&mut self) {
        self.failed += 1;
    }

    pub fn total(&self) -> u32 {
        self.built + self.skipped + self.failed
    }
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed > 0 {
            write!(
                f,
                "{} built, {} up to date, {} failed ({} total)",
                self.built,
                self.skipped,
                self.failed,
                self.total()
            )
        } else {
            write!(
                f,
                "{} built, {} up to date ({} total)",
                self.built,
                self.skipped,
                self.total()
            )
        }
    }
}
