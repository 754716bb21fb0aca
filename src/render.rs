//! Rendering one source document to its sibling output file.
//!
//! The renderer is a thin layer over the [`Engine`]: read, parse, attach the
//! zone's metadata, convert, write. Engine diagnostics come back in the
//! returned [`Log`]; only IO failures are errors.
//!
//! Metadata attached before conversion:
//!
//! | key | value |
//! |-----|-------|
//! | `theme` | the document's own `theme`, else the zone's `build.theme` |
//! | `packages` | the theme name followed by the document's own packages |
//! | `root` | the zone's configuration directory |
//!
//! The selected theme's tree is cloned onto [`Document::theme`]; a theme name
//! with no loaded theme leaves it empty and the engine falls back.

use crate::engine::{ConvertOptions, Engine, Log};
use crate::freshness::output_path;
use crate::theme::ThemeSet;
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Zone-wide inputs shared by every document rendered in one zone.
pub struct RenderContext<'a> {
    pub themes: &'a ThemeSet,
    /// `build.theme` of the zone.
    pub default_theme: &'a str,
    /// `esmero.root` of the zone.
    pub root: &'a Path,
    pub module_path: &'a [PathBuf],
}

/// Render `source` and write the result next to it. Returns the engine's
/// diagnostics from parsing and conversion.
pub fn render_file(
    source: &Path,
    ctx: &RenderContext<'_>,
    engine: &dyn Engine,
) -> Result<Log, RenderError> {
    let text = fs::read_to_string(source).map_err(|e| RenderError::Read {
        path: source.to_path_buf(),
        source: e,
    })?;
    let (mut doc, mut log) = engine.parse(&text, source);

    let theme = doc
        .meta
        .get("theme")
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| ctx.default_theme.to_string());
    let packages: Vec<String> = std::iter::once(theme.clone())
        .chain(doc.packages().into_iter().filter(|p| *p != theme))
        .collect();

    doc.meta.insert("theme".into(), theme.clone());
    doc.meta.insert("packages".into(), packages.join(","));
    doc.meta
        .insert("root".into(), ctx.root.to_string_lossy().into_owned());
    doc.theme = ctx.themes.tree(&theme);

    let (html, convert_log) = engine.convert(
        &doc,
        &ConvertOptions {
            theme: &theme,
            packages: &packages,
            module_path: ctx.module_path,
        },
    );
    log.append(convert_log);

    let output = output_path(source);
    fs::write(&output, html).map_err(|e| RenderError::Write {
        path: output.clone(),
        source: e,
    })?;
    debug!("wrote {}", output.display());
    Ok(log)
}
