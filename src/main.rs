use clap::{Args, Parser, Subcommand};
use esmero::build::{self, BuildError, BuildOptions};
use esmero::config::{
    self, ConfigError, ConfigSource, Context, Overrides, Section, keys, to_pretty_json,
};
use esmero::engine::LexEngine;
use esmero::output::{LogStyle, Reporter};
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;

/// Log filter variable, `env_logger` syntax.
const LOG_ENV: &str = "ESMERO_LOG";
/// File written inside `--debug-path`.
const DEBUG_LOG_FILE: &str = "esmero.debug";

const SUBCOMMANDS: &[&str] = &["build", "config", "defaults"];

#[derive(Parser)]
#[command(name = "esmero")]
#[command(version)]
#[command(about = "Incremental static site builder")]
#[command(long_about = "\
Incremental static site builder

esmero walks a site tree, renders every .lex document to a sibling .html
file and skips documents whose output is already newer than the source.

A directory holding an esmero.json file is a zone: it is configured on its
own and built after its parent zone.

  site/
  ├── esmero.json              # root zone configuration
  ├── index.lex                # → index.html
  ├── _theme/                  # names starting with _ or . are skipped
  │   ├── default.lex          # theme \"default\"
  │   └── default/
  │       └── head.lex         # <default:include>head.lex</default:include>
  └── blog/
      ├── esmero.json          # child zone
      └── post.lex

shortcut:

    esmero . <==> esmero build .")]
struct Cli {
    /// Input path to build
    #[arg(default_value = ".")]
    inputpath: PathBuf,

    /// Log events at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Directory to write the debug log to
    #[arg(long, value_name = "PATH", global = true)]
    debug_path: Option<PathBuf>,

    /// Configuration file directory; the file must exist there
    #[arg(long = "cfg", value_name = "CFG_PATH", global = true)]
    cfg: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the website
    Build(BuildArgs),
    /// View and edit a configuration file
    Config(ConfigArgs),
    /// Print the settings a configuration file can override
    Defaults {
        /// Only this section
        section: Option<String>,
    },
}

#[derive(Args)]
struct BuildArgs {
    /// Only build files whose path contains one of these
    files: Vec<String>,

    /// Diagnostic output style
    #[arg(long, value_enum, default_value_t)]
    log: LogStyle,

    /// Suppress warning messages
    #[arg(long, short)]
    quiet: bool,

    /// Suppress progress output
    #[arg(long, short = 'n')]
    no_display: bool,

    /// Rebuild every file
    #[arg(long, short)]
    force: bool,

    /// Theme used by documents that do not pick one
    #[arg(long)]
    theme: Option<String>,

    /// Theme directory, relative to each zone
    #[arg(long)]
    theme_path: Option<String>,
}

#[derive(Args)]
struct ConfigArgs {
    /// Key in the form section.key
    #[arg(required_unless_present = "display")]
    var: Option<String>,

    /// New value; prints the current one when omitted
    value: Option<String>,

    /// Print the configuration file location
    #[arg(short = 'v')]
    location: bool,

    /// Print the configuration file and exit
    #[arg(long)]
    display: bool,

    /// Use the configuration file in the home directory
    #[arg(long, short)]
    user: bool,
}

#[derive(Error, Debug)]
enum CommandError {
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown section '{0}'")]
    UnknownSection(String),
}

impl CommandError {
    fn is_fatal(&self) -> bool {
        match self {
            CommandError::Build(err) => err.is_fatal(),
            CommandError::Config(err) => matches!(err, ConfigError::MissingExplicit(_)),
            CommandError::UnknownSection(_) => false,
        }
    }
}

fn main() -> ExitCode {
    let argv = std::env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    let cli = Cli::parse_from(preparse(argv));
    init_logging(cli.debug, cli.debug_path.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_fatal() => {
            eprintln!("esmero: {err}");
            ExitCode::from(2)
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::SUCCESS
        }
    }
}

fn run(cli: Cli) -> Result<(), CommandError> {
    let source = ConfigSource {
        explicit_dir: cli.cfg,
        user: false,
    };
    log::debug!("running esmero v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Build(args) => {
            let mut overrides = Overrides::new();
            overrides.set(Section::Build, keys::THEME, args.theme);
            overrides.set(Section::Build, keys::THEME_PATH, args.theme_path);
            let context = Context { source, overrides };
            let options = BuildOptions {
                files: args.files,
                force: args.force,
            };
            let mut reporter = Reporter::stderr(!args.no_display, args.quiet, args.log);
            build::run(&cli.inputpath, &options, &context, &LexEngine, &mut reporter)?;
        }
        Command::Config(args) => {
            let source = ConfigSource {
                user: args.user,
                ..source
            };
            config_command(args, &source, &cli.inputpath)?;
        }
        Command::Defaults { section } => {
            let value = match section {
                Some(name) => {
                    let section = Section::from_name(&name)
                        .ok_or(CommandError::UnknownSection(name))?;
                    config::defaults_value(section)
                }
                None => Value::Object(
                    Section::ALL
                        .into_iter()
                        .map(|s| (s.name().to_string(), config::defaults_value(s)))
                        .collect(),
                ),
            };
            print!("{}", to_pretty_json(&value));
        }
    }
    Ok(())
}

fn config_command(args: ConfigArgs, source: &ConfigSource, dir: &Path) -> Result<(), CommandError> {
    let mut file = source.read(dir)?;
    if args.display {
        println!("esmero configuration file: {}", file.path.display());
        print!("{}", to_pretty_json(&Value::Object(file.value)));
        return Ok(());
    }
    if args.location {
        println!("esmero configuration file: {}", file.path.display());
    }
    let Some(var) = args.var else {
        return Ok(());
    };
    match args.value {
        None => {
            if let Some(value) = file.get(&var)? {
                print!("{}", to_pretty_json(value));
            }
        }
        Some(value) => {
            file.set(&var, Value::String(value))?;
            file.save()?;
            log::info!("updated {} in {}", var, file.path.display());
        }
    }
    Ok(())
}

fn init_logging(debug: bool, debug_path: Option<&Path>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "warn"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let mut target_error = None;
    if let Some(dir) = debug_path {
        match File::create(dir.join(DEBUG_LOG_FILE)) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(err) => target_error = Some(err),
        }
    }
    builder.init();
    if let Some(err) = target_error {
        log::error!("invalid debug log directory: {err}");
    }
}

/// Rewrite the raw arguments so that a bare path (or nothing at all) means
/// `build`.
///
/// ```text
/// esmero                  → esmero . build
/// esmero site             → esmero site build
/// esmero -f               → esmero . build -f
/// esmero config build.x   → esmero . config build.x
/// esmero site config ...  → unchanged
/// ```
///
/// Leading global options are stepped over first.
fn preparse(mut argv: Vec<String>) -> Vec<String> {
    let mut index = 1;
    while let Some(arg) = argv.get(index) {
        match arg.as_str() {
            "--debug" => index += 1,
            "--debug-path" | "--cfg" => index += 2,
            a if a.starts_with("--debug-path=") || a.starts_with("--cfg=") => index += 1,
            _ => break,
        }
    }
    let index = index.min(argv.len());

    let Some(arg) = argv.get(index).cloned() else {
        argv.extend([".".to_string(), "build".to_string()]);
        return argv;
    };
    match arg.as_str() {
        "-h" | "--help" | "-V" | "--version" => {}
        a if a.starts_with('-') => {
            argv.splice(index..index, [".".to_string(), "build".to_string()]);
        }
        a if SUBCOMMANDS.contains(&a) => argv.insert(index, ".".to_string()),
        _ => {
            let followed_by_command = argv
                .get(index + 1)
                .is_some_and(|next| SUBCOMMANDS.contains(&next.as_str()));
            if !followed_by_command {
                argv.insert(index + 1, "build".to_string());
            }
        }
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pre(args: &[&str]) -> Vec<String> {
        let argv = std::iter::once("esmero")
            .chain(args.iter().copied())
            .map(String::from)
            .collect();
        preparse(argv)[1..].to_vec()
    }

    #[test]
    fn nothing_means_build_here() {
        assert_eq!(pre(&[]), vec![".", "build"]);
        assert_eq!(pre(&["--debug"]), vec!["--debug", ".", "build"]);
    }

    #[test]
    fn bare_path_means_build() {
        assert_eq!(pre(&["site"]), vec!["site", "build"]);
        assert_eq!(pre(&["site", "index"]), vec!["site", "build", "index"]);
    }

    #[test]
    fn leading_flag_means_build_here() {
        assert_eq!(pre(&["-f"]), vec![".", "build", "-f"]);
    }

    #[test]
    fn subcommand_gets_default_path() {
        assert_eq!(pre(&["config", "build.theme"]), vec![".", "config", "build.theme"]);
        assert_eq!(pre(&["defaults"]), vec![".", "defaults"]);
        assert_eq!(
            pre(&["--cfg", "conf", "build", "-n"]),
            vec!["--cfg", "conf", ".", "build", "-n"]
        );
    }

    #[test]
    fn explicit_path_and_subcommand_untouched() {
        assert_eq!(pre(&["site", "build", "-f"]), vec!["site", "build", "-f"]);
        assert_eq!(pre(&["--cfg=conf", "site", "config", "x.y"]), vec!["--cfg=conf", "site", "config", "x.y"]);
    }

    #[test]
    fn help_and_version_untouched() {
        assert_eq!(pre(&["--help"]), vec!["--help"]);
        assert_eq!(pre(&["-V"]), vec!["-V"]);
    }

    #[test]
    fn rewritten_args_parse() {
        let cli = Cli::parse_from(preparse(vec!["esmero".into(), "-f".into(), "-n".into()]));
        assert_eq!(cli.inputpath, PathBuf::from("."));
        match cli.command {
            Command::Build(args) => {
                assert!(args.force);
                assert!(args.no_display);
                assert_eq!(args.log, LogStyle::Plain);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn config_args_parse() {
        let cli = Cli::parse_from(preparse(
            ["esmero", "config", "build.theme", "blog", "-v", "-u"]
                .map(String::from)
                .to_vec(),
        ));
        match cli.command {
            Command::Config(args) => {
                assert_eq!(args.var.as_deref(), Some("build.theme"));
                assert_eq!(args.value.as_deref(), Some("blog"));
                assert!(args.location);
                assert!(args.user);
            }
            _ => panic!("expected config"),
        }
    }

    #[test]
    fn missing_explicit_config_is_fatal() {
        let err = CommandError::Config(ConfigError::MissingExplicit(PathBuf::from("x")));
        assert!(err.is_fatal());
        assert!(!CommandError::UnknownSection("x".into()).is_fatal());
    }
}
