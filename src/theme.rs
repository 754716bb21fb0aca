//! Theme loading, include resolution and theme staleness.
//!
//! A zone's theme directory (`build.theme-path`, default `_theme`) holds one
//! document per theme plus an optional same-named directory of parts:
//!
//! ```text
//! _theme/
//! ├── default.lex          # theme "default"
//! ├── default.html         # baseline marker, only its mtime matters
//! ├── default/
//! │   ├── head.lex         # referenced as <default:include>head.lex</default:include>
//! │   └── footer.lex
//! └── print.lex            # theme "print"
//! ```
//!
//! ## Staleness
//!
//! The baseline marker `X.html` records when theme `X` was last taken into
//! account. Theme `X` is stale when the marker is missing or older than
//! `X.lex` or any file in `X/`. When it is stale the marker is truncated so
//! its mtime becomes the new baseline.
//!
//! One stale theme makes the whole set stale, and a stale set rebuilds every
//! document in the zone.
//!
//! ## Includes
//!
//! `<X:include>name.lex</X:include>` anywhere in theme `X` is replaced by the
//! body of `X/name.lex`. Unknown names are left in place with a warning.
//! Parts are spliced as parsed; includes inside a part are not expanded.

use crate::engine::{Document, Engine, Log, Node};
use crate::freshness::modified;
use crate::scan::{OUTPUT_EXT, has_template_ext};
use log::debug;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThemeError {
    #[error("IO error reading theme {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ThemeError + '_ {
    move |source| ThemeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Loaded themes of one zone.
#[derive(Debug, Default)]
pub struct ThemeSet {
    /// Theme name → include-resolved theme document.
    pub themes: BTreeMap<String, Document>,
    /// True when any theme changed since its baseline.
    pub stale: bool,
    /// Engine diagnostics from every theme file and part.
    pub log: Log,
}

impl ThemeSet {
    /// A copy of theme `name`'s tree, ready to attach to a document.
    pub fn tree(&self, name: &str) -> Option<Vec<Node>> {
        self.themes.get(name).map(|doc| doc.body.clone())
    }
}

/// Load every theme in `dir`. A missing directory is an empty, fresh set.
pub fn load_themes(dir: &Path, engine: &dyn Engine) -> Result<ThemeSet, ThemeError> {
    let mut set = ThemeSet::default();
    if !dir.is_dir() {
        debug!("no theme directory at {}", dir.display());
        return Ok(set);
    }

    for source in template_files(dir)? {
        let Some(name) = source.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(mut doc) = parse_file(&source, engine, &mut set.log)? else {
            continue;
        };

        let marker = source.with_extension(OUTPUT_EXT);
        let baseline = modified(&marker).map_err(io_err(&marker))?;
        let mut stale = newer_than(&source, baseline)?;

        let parts_dir = dir.join(&name);
        let mut parts = BTreeMap::new();
        if parts_dir.is_dir() {
            for part in template_files(&parts_dir)? {
                stale |= newer_than(&part, baseline)?;
                if let Some(part_doc) = parse_file(&part, engine, &mut set.log)? {
                    let key = part
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    parts.insert(key, part_doc.body);
                }
            }
        }

        if stale {
            debug!("theme {name} changed, resetting {}", marker.display());
            File::create(&marker)
                .and_then(|f| f.set_modified(SystemTime::now()))
                .map_err(io_err(&marker))?;
            set.stale = true;
        }

        let tag = format!("{name}:include");
        doc.body = resolve_includes(doc.body, &tag, &parts, &doc.path, &mut set.log);
        set.themes.insert(name, doc);
    }

    debug!(
        "loaded {} theme(s) from {}, stale: {}",
        set.themes.len(),
        dir.display(),
        set.stale
    );
    Ok(set)
}

fn template_files(dir: &Path) -> Result<Vec<PathBuf>, ThemeError> {
    let mut files = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()
        .map_err(io_err(dir))?;
    files.retain(|p| p.is_file() && has_template_ext(p));
    files.sort();
    Ok(files)
}

/// Parse one theme file. Unreadable files are reported in the log and
/// skipped.
fn parse_file(path: &Path, engine: &dyn Engine, log: &mut Log) -> Result<Option<Document>, ThemeError> {
    match fs::read_to_string(path) {
        Ok(text) => {
            let (doc, parse_log) = engine.parse(&text, path);
            log.append(parse_log);
            Ok(Some(doc))
        }
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            log.error(path, 0, format!("cannot read theme file: {err}"));
            Ok(None)
        }
        Err(err) => Err(io_err(path)(err)),
    }
}

fn newer_than(path: &Path, baseline: Option<SystemTime>) -> Result<bool, ThemeError> {
    let Some(baseline) = baseline else {
        return Ok(true);
    };
    let changed = modified(path).map_err(io_err(path))?;
    Ok(changed.is_some_and(|t| baseline < t))
}

fn resolve_includes(
    nodes: Vec<Node>,
    tag: &str,
    parts: &BTreeMap<String, Vec<Node>>,
    path: &Path,
    log: &mut Log,
) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut el = match node {
            Node::Element(el) => el,
            text => {
                out.push(text);
                continue;
            }
        };
        if el.name != tag {
            el.children = resolve_includes(el.children, tag, parts, path, log);
            out.push(el.into());
            continue;
        }
        let target = el
            .children
            .first()
            .map(|first| first.text_content().trim().to_string())
            .unwrap_or_default();
        match parts.get(&target) {
            Some(part) => out.extend(part.iter().cloned()),
            None => {
                log.warning(path, el.line, format!("<{tag}> target '{target}' not found"));
                out.push(el.into());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LexEngine;
    use crate::engine::document::to_markup;
    use crate::engine::tests::{MockEngine, RecordedOp};
    use crate::test_helpers::{mtime, set_age, write_file};
    use tempfile::TempDir;

    fn theme_dir() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(
            &tmp.path().join("default.lex"),
            "<html><default:include>head.lex</default:include><body><default:content/></body></html>",
        );
        write_file(&tmp.path().join("default/head.lex"), "<head><title>T</title></head>");
        tmp
    }

    /// Age sources and make the markers newer so the set is fresh.
    fn settle(dir: &Path) {
        set_age(&dir.join("default.lex"), 1000);
        set_age(&dir.join("default/head.lex"), 1000);
        set_age(&dir.join("default.html"), 500);
    }

    #[test]
    fn missing_dir_is_empty_and_fresh() {
        let tmp = TempDir::new().unwrap();
        let set = load_themes(&tmp.path().join("_theme"), &LexEngine).unwrap();
        assert!(set.themes.is_empty());
        assert!(!set.stale);
    }

    #[test]
    fn includes_spliced_in_place() {
        let tmp = theme_dir();
        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        let tree = set.tree("default").unwrap();
        assert_eq!(
            to_markup(&tree),
            "<html><head><title>T</title></head><body><default:content></default:content></body></html>"
        );
        assert!(set.log.is_empty());
    }

    #[test]
    fn include_target_whitespace_trimmed() {
        let tmp = TempDir::new().unwrap();
        write_file(
            &tmp.path().join("t.lex"),
            "<t:include>\n  part.lex\n</t:include>",
        );
        write_file(&tmp.path().join("t/part.lex"), "<p>part</p>");
        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        assert_eq!(to_markup(&set.tree("t").unwrap()), "<p>part</p>");
    }

    #[test]
    fn unknown_include_left_with_warning() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("t.lex"), "<t:include>gone.lex</t:include>");
        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        assert!(to_markup(&set.tree("t").unwrap()).contains("<t:include>gone.lex</t:include>"));
        assert_eq!(set.log.len(), 1);
    }

    #[test]
    fn other_themes_include_tags_untouched() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a.lex"), "<b:include>x.lex</b:include>");
        write_file(&tmp.path().join("a/x.lex"), "<p>x</p>");
        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        assert!(to_markup(&set.tree("a").unwrap()).contains("<b:include>"));
    }

    // =========================================================================
    // Staleness
    // =========================================================================

    #[test]
    fn new_theme_is_stale_and_creates_marker() {
        let tmp = theme_dir();
        let marker = tmp.path().join("default.html");
        assert!(!marker.exists());

        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        assert!(set.stale);
        assert!(marker.exists());
    }

    #[test]
    fn settled_theme_is_fresh_and_marker_untouched() {
        let tmp = theme_dir();
        load_themes(tmp.path(), &LexEngine).unwrap();
        settle(tmp.path());
        let before = mtime(&tmp.path().join("default.html"));

        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        assert!(!set.stale);
        assert_eq!(mtime(&tmp.path().join("default.html")), before);
    }

    #[test]
    fn edited_theme_source_is_stale() {
        let tmp = theme_dir();
        load_themes(tmp.path(), &LexEngine).unwrap();
        settle(tmp.path());
        set_age(&tmp.path().join("default.lex"), 10);

        assert!(load_themes(tmp.path(), &LexEngine).unwrap().stale);
        // marker reset: next load is fresh again
        set_age(&tmp.path().join("default.lex"), 1000);
        assert!(!load_themes(tmp.path(), &LexEngine).unwrap().stale);
    }

    #[test]
    fn edited_part_is_stale() {
        let tmp = theme_dir();
        load_themes(tmp.path(), &LexEngine).unwrap();
        settle(tmp.path());
        set_age(&tmp.path().join("default/head.lex"), 10);
        assert!(load_themes(tmp.path(), &LexEngine).unwrap().stale);
    }

    #[test]
    fn one_stale_theme_makes_set_stale() {
        let tmp = theme_dir();
        load_themes(tmp.path(), &LexEngine).unwrap();
        settle(tmp.path());
        write_file(&tmp.path().join("print.lex"), "<print:content/>");

        let set = load_themes(tmp.path(), &LexEngine).unwrap();
        assert!(set.stale);
        assert_eq!(set.themes.len(), 2);
    }

    #[test]
    fn parse_diagnostics_collected_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("t.lex"), "!warn\n");
        let engine = MockEngine::new();
        let set = load_themes(tmp.path(), &engine).unwrap();
        assert_eq!(set.log.len(), 1);
        assert!(set.themes.contains_key("t"));
        assert_eq!(
            engine.get_operations(),
            vec![RecordedOp::Parse(tmp.path().join("t.lex"))]
        );
    }
}
