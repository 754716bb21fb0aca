//! # esmero
//!
//! An incremental static site builder. Source documents (`.lex`) are rendered
//! to sibling `.html` files, and only documents whose output is missing or
//! older than the source are rendered again.
//!
//! # Architecture: Zones
//!
//! A site tree is split into zones. A zone is a directory holding a marker
//! configuration file (`esmero.json`); it owns every document below it that
//! is not inside a deeper zone, and it has its own settings and theme.
//!
//! ```text
//! 1. Discover  site/  →  [zone, zone, …]      (filesystem → ordered queue)
//! 2. Themes    zone   →  ThemeSet + stale?    (theme dir → resolved trees)
//! 3. Schedule  file   →  Decision             (mtimes, theme, --force)
//! 4. Render    file   →  file.html            (engine parse + convert)
//! ```
//!
//! Parent zones are built before their children. Nothing is persisted
//! besides the outputs themselves: an output's modification time is the
//! only record of when it was built, and each theme has an empty
//! `<theme>.html` marker whose modification time records the same for the
//! theme.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Zone discovery: walks the tree, honours skip/ignore patterns, finds child zones |
//! | [`config`] | JSON configuration files, file location search, per-zone settings layering |
//! | [`theme`] | Theme loading, `<theme>:include` splicing, theme staleness |
//! | [`freshness`] | Rebuild decisions from modification times, build counters |
//! | [`render`] | One document: parse, attach zone metadata, convert, write |
//! | [`build`] | The build command: runs every zone through themes, decisions and rendering |
//! | [`engine`] | The `Engine` trait and the built-in `LexEngine` (markup, CommonMark, themes) |
//! | [`output`] | Progress lines, diagnostics and the summary on the error stream |
//!
//! # Design Decisions
//!
//! ## The Engine Is a Trait
//!
//! The build core never parses or converts documents itself; it goes through
//! [`engine::Engine`]. Staleness, zones and themes are therefore testable
//! with a recording mock, and the shipped [`engine::LexEngine`] is one
//! implementation among possible others.
//!
//! ## Explicit Context Instead of Process State
//!
//! Command-line overrides and the configuration source live in a
//! [`config::Context`] built once in `main` and passed down. The module search
//! path for package partials is computed per zone and handed to the engine
//! as a parameter; the process environment is never written to.
//!
//! ## Diagnostics Never Abort
//!
//! Engine diagnostics are collected into an [`engine::Log`] and printed.
//! A document that cannot be read or written is counted as failed and the
//! build moves on. The only error that stops a run with a non-zero exit code
//! is an explicit `--cfg` directory without a configuration file.

pub mod build;
pub mod config;
pub mod engine;
pub mod freshness;
pub mod output;
pub mod render;
pub mod scan;
pub mod theme;

#[cfg(test)]
pub(crate) mod test_helpers;
