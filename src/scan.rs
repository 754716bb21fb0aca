//! Zone discovery.
//!
//! Walks a site tree and splits it into zones. A zone is a directory holding
//! a marker configuration file ([`config::CONFIG_FILE`] or its legacy name)
//! together with everything below it that is not itself inside a deeper zone:
//!
//! ```text
//! site/                    # zone 1 (the directory the build starts from)
//! ├── esmero.json
//! ├── index.lex            # zone 1
//! ├── _drafts/             # skipped: matches `skip-dir`
//! │   └── wip.lex
//! ├── notes/
//! │   └── a.lex            # zone 1
//! └── blog/                # zone 2: has its own marker
//!     ├── esmero.json
//!     ├── _partial.lex     # ignored: matches `ignore-file`
//!     └── post.lex         # zone 2
//! ```
//!
//! Discovery returns a flat queue. A zone always precedes the zones found
//! inside it; sibling zones keep the order they were encountered in, which is
//! sorted by file name so that repeated runs see the same order.
//!
//! Skip and ignore patterns come from each zone's own `build` settings and
//! are anchored at the start of the name.

use crate::config::{self, Context, SettingsRecord, keys};
use log::debug;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Source document extension.
pub const TEMPLATE_EXT: &str = "lex";
/// Output artifact extension.
pub const OUTPUT_EXT: &str = "html";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

/// A directory subtree with its own settings and source documents.
#[derive(Debug, Clone)]
pub struct Zone {
    pub root: PathBuf,
    pub settings: SettingsRecord,
    /// Candidate source documents, in traversal order.
    pub files: Vec<PathBuf>,
}

/// Compiled `skip-dir` / `ignore-file` patterns of one zone.
#[derive(Debug, Clone)]
pub struct Patterns {
    skip: Regex,
    ignore: Regex,
}

impl Patterns {
    pub fn new(skip_dir: &str, ignore_file: &str) -> Result<Self, config::ConfigError> {
        Ok(Self {
            skip: anchored(keys::SKIP_DIR, skip_dir)?,
            ignore: anchored(keys::IGNORE_FILE, ignore_file)?,
        })
    }

    pub fn from_settings(settings: &SettingsRecord) -> Result<Self, config::ConfigError> {
        Self::new(settings.build(keys::SKIP_DIR), settings.build(keys::IGNORE_FILE))
    }

    pub fn skips_dir(&self, name: &str) -> bool {
        self.skip.is_match(name)
    }

    pub fn ignores_file(&self, name: &str) -> bool {
        self.ignore.is_match(name)
    }
}

fn anchored(key: &str, pattern: &str) -> Result<Regex, config::ConfigError> {
    Regex::new(&format!("^(?:{pattern})")).map_err(|source| config::ConfigError::Pattern {
        key: key.to_string(),
        source,
    })
}

/// Result of walking one zone.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Gathered {
    pub files: Vec<PathBuf>,
    /// Subdirectories holding a marker file, in encounter order.
    pub zones: Vec<PathBuf>,
}

/// Walk the zone rooted at `root` without descending into child zones.
///
/// Each directory's entries are classified before any of its
/// subdirectories is visited. A subdirectory with a marker file is reported
/// as a child zone even when its name matches the skip pattern. A missing
/// `root` yields nothing. Symbolic links to directories are not followed.
pub fn gather(root: &Path, patterns: &Patterns, filters: &[String]) -> Result<Gathered, ScanError> {
    let mut gathered = Gathered::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match collect_entries(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound && dir == root => {
                debug!("{} does not exist, nothing to build", root.display());
                return Ok(gathered);
            }
            Err(err) => return Err(err.into()),
        };

        let mut subdirs = Vec::new();
        for (path, file_type) in entries {
            let name = file_name(&path);
            if file_type.is_symlink() && path.is_dir() {
                debug!("not following directory link {}", path.display());
            } else if file_type.is_dir() {
                if config::is_zone_root(&path) {
                    debug!("found zone {}", path.display());
                    gathered.zones.push(path);
                } else if patterns.skips_dir(&name) {
                    debug!("skipping directory {}", path.display());
                } else {
                    subdirs.push(path);
                }
            } else if is_candidate(&path, &name, patterns, filters) {
                gathered.files.push(path);
            }
        }
        // Reversed so the stack pops them in sorted order.
        pending.extend(subdirs.into_iter().rev());
    }

    Ok(gathered)
}

fn is_candidate(path: &Path, name: &str, patterns: &Patterns, filters: &[String]) -> bool {
    if patterns.ignores_file(name) || !has_template_ext(path) {
        return false;
    }
    if filters.is_empty() {
        return true;
    }
    let full = path.to_string_lossy();
    filters.iter().any(|f| full.contains(f.as_str()))
}

pub fn has_template_ext(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMPLATE_EXT)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn collect_entries(dir: &Path) -> io::Result<Vec<(PathBuf, fs::FileType)>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.and_then(|e| Ok((e.path(), e.file_type()?))))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Discover every zone under `root`, parent zones first.
///
/// `root` is always the first zone, whether or not it holds a marker file;
/// its settings come from the full configuration search in `context`.
pub fn discover(root: &Path, filters: &[String], context: &Context) -> Result<Vec<Zone>, ScanError> {
    let mut zones = Vec::new();
    let mut pending = vec![(root.to_path_buf(), true)];

    while let Some((dir, top_level)) = pending.pop() {
        let settings = context.zone_settings(&dir, top_level)?;
        let patterns = Patterns::from_settings(&settings)?;
        let gathered = gather(&dir, &patterns, filters)?;
        debug!(
            "zone {}: {} files, {} child zones",
            dir.display(),
            gathered.files.len(),
            gathered.zones.len()
        );
        pending.extend(gathered.zones.into_iter().rev().map(|z| (z, false)));
        zones.push(Zone {
            root: dir,
            settings,
            files: gathered.files,
        });
    }

    Ok(zones)
}
