//! Shared test utilities: site fixtures on disk and modification-time control.
//!
//! Staleness is decided from modification times alone, so tests that care
//! about rebuild decisions pin times explicitly with [`set_age`] instead of
//! sleeping.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = setup_site();
//! let page = site.path().join("index.lex");
//! set_age(&page, 100);
//! set_age(&page.with_extension("html"), 50); // output newer: up to date
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

use crate::config::CONFIG_FILE;

// =========================================================================
// Files
// =========================================================================

/// Write `content` to `path`, creating parent directories.
pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Create an empty file (and its parents).
pub fn touch(path: &Path) {
    write_file(path, "");
}

/// Create `dir/esmero.json` holding `json`, making `dir` a zone.
pub fn write_marker(dir: &Path, json: &str) -> PathBuf {
    let path = dir.join(CONFIG_FILE);
    write_file(&path, json);
    path
}

// =========================================================================
// Modification times
// =========================================================================

pub fn set_mtime(path: &Path, time: SystemTime) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(time).unwrap();
}

/// Set `path`'s modification time to `secs` seconds ago.
pub fn set_age(path: &Path, secs: u64) {
    set_mtime(path, SystemTime::now() - Duration::from_secs(secs));
}

pub fn mtime(path: &Path) -> SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}

// =========================================================================
// Site fixture
// =========================================================================

/// A small site: root zone with a theme and two pages, plus a `blog` child
/// zone with its own page. No outputs exist yet.
///
/// ```text
/// esmero.json
/// index.lex
/// about.lex
/// _theme/default.lex
/// blog/esmero.json
/// blog/post.lex
/// ```
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    write_marker(root, "{}");
    write_file(&root.join("index.lex"), "---\ntitle: Home\n---\nWelcome\n");
    write_file(&root.join("about.lex"), "About us\n");
    write_file(
        &root.join("_theme/default.lex"),
        "<html><body><default:content/></body></html>",
    );
    write_marker(&root.join("blog"), "{}");
    write_file(&root.join("blog/post.lex"), "A post\n");
    tmp
}

/// Give every `.lex` file under `root` an older time than its sibling
/// `.html` (and theme markers) so nothing is stale.
pub fn settle(root: &Path) {
    for entry in fs::read_dir(root).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            settle(&path);
        } else if path.extension().is_some_and(|e| e == "lex") {
            set_age(&path, 1000);
        } else if path.extension().is_some_and(|e| e == "html") {
            set_age(&path, 500);
        }
    }
}
