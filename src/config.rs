//! Configuration files and per-zone settings resolution.
//!
//! A site is configured by JSON files. The file at a directory's root both
//! configures that directory and marks it as a zone (see [`crate::scan`]):
//!
//! ```text
//! site/
//! ├── esmero.json           # root zone
//! ├── index.lex
//! ├── _theme/
//! │   └── default.lex
//! └── blog/
//!     ├── esmero.json       # child zone, configured independently
//!     └── post.lex
//! ```
//!
//! ## File format
//!
//! Top-level keys are sections, each an object of string settings:
//!
//! ```json
//! {
//!     "build": {
//!         "theme": "default",
//!         "theme-path": "_theme"
//!     },
//!     "esmero": {
//!         "path": ""
//!     }
//! }
//! ```
//!
//! Files are written back with a 4-space indent and sorted keys. Sections and
//! keys esmero does not know are kept as they are.
//!
//! ## Resolution
//!
//! Each section of a [`SettingsRecord`] is layered, later layers winning:
//!
//! 1. built-in defaults ([`Section::defaults`])
//! 2. the configuration file's section
//! 3. command-line [`Overrides`]
//!
//! Values from layers 1 and 2 get `$VAR` / `${VAR}` expansion. The `esmero`
//! section always ends up with `root`, the directory the configuration file
//! lives in; zone-relative paths (like `build.theme-path`) resolve from it.

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

/// Marker file name. Its presence makes a directory a zone.
pub const CONFIG_FILE: &str = "esmero.json";
/// Older marker name, still read and still a zone marker.
pub const LEGACY_CONFIG_FILE: &str = "esmero.config";
/// Per-user configuration in the home directory.
pub const USER_CONFIG_FILE: &str = ".esmero.json";
/// Directory searched when the target directory has no configuration file.
pub const CONFIG_PATH_ENV: &str = "ESMERO_CONFIG_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0} does not exist")]
    MissingExplicit(PathBuf),
    #[error("{0} must contain a JSON object")]
    NotAnObject(PathBuf),
    #[error("invalid pattern for {key}: {source}")]
    Pattern { key: String, source: regex::Error },
    #[error("invalid key path '{0}', expected something like 'build.theme'")]
    KeyPath(String),
    #[error("cannot determine the home directory")]
    NoHome,
}

// =============================================================================
// Sections and defaults
// =============================================================================

/// Sections esmero reads. Anything else in a file is passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Esmero,
    Build,
}

impl Section {
    pub const ALL: [Section; 2] = [Section::Esmero, Section::Build];

    pub fn name(self) -> &'static str {
        match self {
            Section::Esmero => "esmero",
            Section::Build => "build",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Built-in defaults. Every key listed here is present after resolution.
    pub fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Section::Esmero => &[("path", "")],
            Section::Build => &[
                ("ignore-file", DEFAULT_EXCLUDE),
                ("lexor-path", ""),
                ("skip-dir", DEFAULT_EXCLUDE),
                ("theme", "default"),
                ("theme-path", "_theme"),
            ],
        }
    }
}

/// Names starting with `_` or `.` are neither traversed nor built.
pub const DEFAULT_EXCLUDE: &str = "_.*|[.].*";

/// Keys of the `build` section.
pub mod keys {
    pub const THEME: &str = "theme";
    pub const THEME_PATH: &str = "theme-path";
    pub const LEXOR_PATH: &str = "lexor-path";
    pub const SKIP_DIR: &str = "skip-dir";
    pub const IGNORE_FILE: &str = "ignore-file";
    /// Injected into the `esmero` section; not user settable.
    pub const ROOT: &str = "root";
}

// =============================================================================
// Configuration files
// =============================================================================

/// A configuration file and its parsed content.
///
/// A file that does not exist loads as an empty object; saving it creates
/// the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub value: Map<String, Value>,
    pub exists: bool,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::empty(path));
            }
            Err(err) => return Err(err.into()),
        };
        let value: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        match value {
            Value::Object(map) => Ok(Self {
                path: path.to_path_buf(),
                value: map,
                exists: true,
            }),
            _ => Err(ConfigError::NotAnObject(path.to_path_buf())),
        }
    }

    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            value: Map::new(),
            exists: false,
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, to_pretty_json(&Value::Object(self.value.clone())))?;
        Ok(())
    }

    /// Directory holding the file; the zone root for zone-relative paths.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn section(&self, section: Section) -> Option<&Map<String, Value>> {
        self.value.get(section.name()).and_then(Value::as_object)
    }

    /// Look up a dotted key path such as `build.theme`.
    pub fn get(&self, key_path: &str) -> Result<Option<&Value>, ConfigError> {
        let keys = split_key_path(key_path)?;
        let (first, rest) = keys.split_first().ok_or_else(|| ConfigError::KeyPath(key_path.into()))?;
        let mut current = self.value.get(*first);
        for key in rest {
            current = current.and_then(Value::as_object).and_then(|m| m.get(*key));
        }
        Ok(current)
    }

    /// Set a dotted key path, creating sections on the way.
    ///
    /// A non-object value met along the path is replaced by a fresh object,
    /// so `a.b.c = x` works even when `a.b` currently holds a string.
    pub fn set(&mut self, key_path: &str, value: Value) -> Result<(), ConfigError> {
        let keys = split_key_path(key_path)?;
        let Some((last, parents)) = keys.split_last() else {
            return Err(ConfigError::KeyPath(key_path.into()));
        };
        let mut current = &mut self.value;
        for key in parents {
            let slot = current
                .entry((*key).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                log::debug!("replacing scalar at '{key}' with a section");
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return Err(ConfigError::KeyPath(key_path.to_string()));
            };
            current = map;
        }
        current.insert((*last).to_string(), value);
        Ok(())
    }
}

fn split_key_path(key_path: &str) -> Result<Vec<&str>, ConfigError> {
    let keys: Vec<&str> = key_path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(ConfigError::KeyPath(key_path.to_string()));
    }
    Ok(keys)
}

/// JSON with a 4-space indent and a trailing newline. Object keys come out
/// sorted because `serde_json::Map` is ordered.
pub fn to_pretty_json(value: &Value) -> String {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    if value.serialize(&mut ser).is_err() {
        return String::new();
    }
    let mut out = String::from_utf8_lossy(&buf).into_owned();
    out.push('\n');
    out
}

/// The marker file in `dir`, if any.
pub fn find_marker(dir: &Path) -> Option<PathBuf> {
    [CONFIG_FILE, LEGACY_CONFIG_FILE]
        .into_iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

pub fn is_zone_root(dir: &Path) -> bool {
    find_marker(dir).is_some()
}

// =============================================================================
// Locating files
// =============================================================================

/// Where configuration is read from, fixed once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSource {
    /// `--cfg DIR`: the file must exist there.
    pub explicit_dir: Option<PathBuf>,
    /// Use the home dotfile regardless of directory.
    pub user: bool,
}

impl ConfigSource {
    /// Resolve the configuration file path for `dir`.
    ///
    /// Search order: explicit directory (must contain a file), home dotfile
    /// when `user` is set, `dir`'s marker, `$ESMERO_CONFIG_PATH`, the home
    /// dotfile. When nothing exists the result is `dir/esmero.json`.
    pub fn locate(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        if self.user {
            return user_config_path().ok_or(ConfigError::NoHome);
        }
        if let Some(explicit) = &self.explicit_dir {
            return find_marker(explicit)
                .ok_or_else(|| ConfigError::MissingExplicit(explicit.join(CONFIG_FILE)));
        }
        if let Some(marker) = find_marker(dir) {
            return Ok(marker);
        }
        let fallbacks = [
            std::env::var_os(CONFIG_PATH_ENV).map(|d| PathBuf::from(d).join(CONFIG_FILE)),
            user_config_path(),
        ];
        Ok(fallbacks
            .into_iter()
            .flatten()
            .find(|p| p.is_file())
            .unwrap_or_else(|| dir.join(CONFIG_FILE)))
    }

    pub fn read(&self, dir: &Path) -> Result<ConfigFile, ConfigError> {
        let path = self.locate(dir)?;
        log::debug!("reading configuration from {}", path.display());
        ConfigFile::load(&path)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_CONFIG_FILE))
}

// =============================================================================
// Settings
// =============================================================================

/// Command-line values that override configuration keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    values: BTreeMap<(Section, String), String>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an override when the argument was actually supplied.
    pub fn set(&mut self, section: Section, key: &str, value: Option<impl Into<String>>) {
        if let Some(value) = value {
            self.values.insert((section, key.to_string()), value.into());
        }
    }

    fn for_section(&self, section: Section) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .filter(move |((s, _), _)| *s == section)
            .map(|((_, k), v)| (k.as_str(), v.as_str()))
    }
}

/// Everything a command needs to know about configuration, built once in
/// `main` and passed down.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub source: ConfigSource,
    pub overrides: Overrides,
}

impl Context {
    /// Settings for the zone rooted at `dir`.
    ///
    /// The top-level zone goes through the full [`ConfigSource`] search;
    /// nested zones always read their own marker file.
    pub fn zone_settings(&self, dir: &Path, top_level: bool) -> Result<SettingsRecord, ConfigError> {
        let file = if top_level {
            self.source.read(dir)?
        } else {
            match find_marker(dir) {
                Some(marker) => ConfigFile::load(&marker)?,
                None => ConfigFile::empty(&dir.join(CONFIG_FILE)),
            }
        };
        Ok(SettingsRecord::resolve(&file, &[Section::Build], &self.overrides))
    }
}

/// Effective settings for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsRecord {
    sections: BTreeMap<Section, BTreeMap<String, String>>,
    passthrough: Map<String, Value>,
}

impl SettingsRecord {
    /// Layer defaults, file content and overrides for `sections`. The
    /// `esmero` section is always resolved.
    pub fn resolve(file: &ConfigFile, sections: &[Section], overrides: &Overrides) -> Self {
        let mut resolved = BTreeMap::new();
        let wanted = std::iter::once(Section::Esmero).chain(sections.iter().copied());
        for section in wanted {
            if resolved.contains_key(&section) {
                continue;
            }
            let mut values: BTreeMap<String, String> = section
                .defaults()
                .iter()
                .map(|(k, v)| (k.to_string(), expand_vars(v)))
                .collect();
            if let Some(from_file) = file.section(section) {
                for (key, value) in from_file {
                    match scalar_string(value) {
                        Some(s) => {
                            values.insert(key.clone(), expand_vars(&s));
                        }
                        None => log::warn!(
                            "{}: ignoring non-scalar value for {}.{}",
                            file.path.display(),
                            section.name(),
                            key
                        ),
                    }
                }
            }
            for (key, value) in overrides.for_section(section) {
                values.insert(key.to_string(), value.to_string());
            }
            if section == Section::Esmero {
                values.insert(keys::ROOT.into(), file.dir().to_string_lossy().into_owned());
            }
            resolved.insert(section, values);
        }

        let passthrough = file
            .value
            .iter()
            .filter(|(k, _)| Section::from_name(k).is_none())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            sections: resolved,
            passthrough,
        }
    }

    pub fn get(&self, section: Section, key: &str) -> Option<&str> {
        self.sections
            .get(&section)
            .and_then(|s| s.get(key))
            .map(String::as_str)
    }

    /// A `build` setting, empty when the section was not resolved.
    pub fn build(&self, key: &str) -> &str {
        self.get(Section::Build, key).unwrap_or("")
    }

    /// The configuration directory; zone-relative paths resolve from here.
    pub fn root(&self) -> &Path {
        Path::new(self.get(Section::Esmero, keys::ROOT).unwrap_or("."))
    }

    /// Unknown top-level sections, untouched.
    pub fn passthrough(&self) -> &Map<String, Value> {
        &self.passthrough
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

static VAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:([A-Za-z_][A-Za-z0-9_]*)|\{([^}]*)\})").expect("variable pattern is valid")
});

/// Expand `$VAR` and `${VAR}` from the environment. Unknown variables are
/// left as written.
pub fn expand_vars(value: &str) -> String {
    VAR.replace_all(value, |caps: &Captures| {
        let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}

/// Defaults of one section as a JSON object, for the `defaults` command.
pub fn defaults_value(section: Section) -> Value {
    Value::Object(
        section
            .defaults()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect(),
    )
}
