//! The build command: discover zones, then bring every zone's outputs up to
//! date.
//!
//! ```text
//! discover(root) ──► [zone, zone, …]        parent zones first
//!                      │
//!                      ├─ load_themes(esmero.root / build.theme-path)
//!                      │     └─ stale? → every file in the zone rebuilds
//!                      └─ for each file: decide → render_file (if needed)
//! ```
//!
//! Each zone is independent: its own settings, theme set and module path.
//! Zone-relative settings resolve against the directory of the zone's
//! configuration file (`esmero.root`), which is the zone directory unless
//! the top-level zone read its configuration from elsewhere.
//! A file that fails to render is reported and counted; the rest of the
//! build carries on.

use crate::config::{ConfigError, Context, SettingsRecord, keys};
use crate::engine::Engine;
use crate::freshness::{BuildStats, Decision, decide};
use crate::output::Reporter;
use crate::render::{RenderContext, render_file};
use crate::scan::{self, ScanError, Zone};
use crate::theme::{ThemeError, load_themes};
use log::{debug, error, info};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Inherited module search path, consulted after each zone's `lexor-path`.
pub const MODULE_PATH_ENV: &str = "LEXORINPUTS";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Theme(#[from] ThemeError),
}

impl BuildError {
    /// Errors that abort with a non-zero exit code.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BuildError::Scan(ScanError::Config(ConfigError::MissingExplicit(_)))
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Only files whose path contains one of these substrings.
    pub files: Vec<String>,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub decision: Decision,
    pub failed: bool,
}

#[derive(Debug, Default)]
pub struct BuildReport {
    /// Zone roots in processing order.
    pub zones: Vec<PathBuf>,
    pub outcomes: Vec<FileOutcome>,
    pub stats: BuildStats,
}

impl BuildReport {
    /// Files that were rendered successfully.
    pub fn built(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter(|o| o.decision.needs_build() && !o.failed)
            .map(|o| o.path.as_path())
            .collect()
    }
}

/// Build every zone under `root`.
pub fn run<W: Write>(
    root: &Path,
    options: &BuildOptions,
    context: &Context,
    engine: &dyn Engine,
    reporter: &mut Reporter<W>,
) -> Result<BuildReport, BuildError> {
    let zones = scan::discover(root, &options.files, context)?;
    info!("{} zone(s) queued under {}", zones.len(), root.display());

    let inherited = std::env::var_os(MODULE_PATH_ENV);
    let mut report = BuildReport::default();
    for zone in &zones {
        let module_path = module_path(&zone.settings, inherited.as_deref());
        build_zone(zone, &module_path, options, engine, reporter, &mut report)?;
    }
    reporter.summary(&report.stats);
    Ok(report)
}

fn build_zone<W: Write>(
    zone: &Zone,
    module_path: &[PathBuf],
    options: &BuildOptions,
    engine: &dyn Engine,
    reporter: &mut Reporter<W>,
    report: &mut BuildReport,
) -> Result<(), BuildError> {
    debug!(
        "building zone {} with module path {:?}",
        zone.root.display(),
        module_path
    );
    report.zones.push(zone.root.clone());

    let theme_dir = zone.settings.root().join(zone.settings.build(keys::THEME_PATH));
    let themes = load_themes(&theme_dir, engine)?;
    reporter.diagnostics(&themes.log);

    let ctx = RenderContext {
        themes: &themes,
        default_theme: zone.settings.build(keys::THEME),
        root: zone.settings.root(),
        module_path,
    };

    for file in &zone.files {
        reporter.checking(file);
        let decision = match decide(file, themes.stale, options.force) {
            Ok(decision) => decision,
            Err(err) => {
                reporter.failed();
                error!("{}: {err}", file.display());
                report.stats.fail();
                continue;
            }
        };
        reporter.building(decision);

        let mut failed = false;
        if decision.needs_build() {
            match render_file(file, &ctx, engine) {
                Ok(log) => reporter.diagnostics(&log),
                Err(err) => {
                    error!("{err}");
                    failed = true;
                }
            }
        }
        if failed {
            reporter.failed();
            report.stats.fail();
        } else {
            reporter.done();
            report.stats.record(decision);
        }
        report.outcomes.push(FileOutcome {
            path: file.clone(),
            decision,
            failed,
        });
    }
    Ok(())
}

/// Module search path for a zone: its `build.lexor-path` entries (relative
/// ones resolved against `esmero.root`), then the inherited entries.
pub fn module_path(settings: &SettingsRecord, inherited: Option<&OsStr>) -> Vec<PathBuf> {
    let root = settings.root();
    let own = std::env::split_paths(settings.build(keys::LEXOR_PATH))
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| root.join(p));
    let inherited = inherited
        .into_iter()
        .flat_map(std::env::split_paths)
        .filter(|p| !p.as_os_str().is_empty());
    own.chain(inherited).collect()
}
