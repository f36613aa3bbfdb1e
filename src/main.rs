//! # Clang-Format Style Detector (cfdetect)
//!
//! A CLI tool that infers a `.clang-format` configuration from existing
//! C/C++ sources by formatting them under candidate configurations and
//! keeping whatever reproduces the samples most closely.
//!
//! ## Key Components
//!
//! - **Option Model**: typed options over four variants (toggle, input,
//!   multi-toggle, multi-line input).
//! - **Catalog**: per-style defaults and the probe values searched for each
//!   option.
//! - **Formatter Adapter**: stages a sample plus configuration in a private
//!   temp directory and runs `clang-format` with a timeout.
//! - **Diff Engine**: character-level Myers diff with semantic cleanup,
//!   reduced to an integer edit score.
//! - **Detector**: picks the closest base style, then greedily tries every
//!   option value and keeps strict improvements.
//!
//! ## Algorithm Flow
//!
//! ```text
//! Samples → Base Style Scores → Best Style → Greedy Option Pass → .clang-format
//!                                   ↓
//!                     For each option, for each candidate value:
//!                       - Render configuration
//!                       - clang-format every sample
//!                       - Sum diff scores
//!                       - Keep if strictly lower
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Success |
//! | 1 | General error (file not found, formatter unavailable, I/O error) |
//! | 2 | Invalid command-line arguments |
//! | 3 | `check`: the formatter rejected the configuration |
//! | 4 | Parse error (invalid UTF-8, binary input or malformed configuration) |
//! | 130 | Canceled (Ctrl+C) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod catalog;
mod detector;
mod diff;
mod format_file;
mod formatter;
mod options;

use anyhow::{Context, Result};
use cancel::CancelToken;
use catalog::{Catalog, FormatStyle};
use clap::ValueEnum;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use detector::{DetectError, DetectEvent, DetectionResult, Detector, DetectorOptions, StyleScore};
use format_file::ImportError;
use formatter::{
    CandidateConfiguration, ClangFormatter, FormatError, StyleFormatter, Validation,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use log::{debug, info};
use options::FormatOption;
use rich_rust::terminal;
use rich_rust::{ColorSystem, Console};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

// ─────────────────────────────────────────────────────────────────────────────
// Exit Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic exit codes for scripting and CI integration
mod exit_codes {
    /// Success - completed without errors
    pub const SUCCESS: i32 = 0;
    /// General error (file not found, formatter unavailable, I/O error)
    pub const ERROR: i32 = 1;
    /// Invalid command-line arguments
    pub const INVALID_ARGS: i32 = 2;
    /// `check`: configuration rejected by the formatter
    pub const INVALID_CONFIG: i32 = 3;
    /// Parse error (invalid UTF-8, binary file or malformed configuration)
    pub const PARSE_ERROR: i32 = 4;
    /// Interrupted by Ctrl+C
    pub const CANCELED: i32 = 130;
}

#[derive(Debug)]
struct ArgError(String);

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ArgError {}

#[derive(Debug)]
struct ParseError(String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
struct ConfigRejected(String);

impl fmt::Display for ConfigRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration rejected: {}", self.0)
    }
}

impl std::error::Error for ConfigRejected {}

fn error_chain_has<T: std::error::Error + 'static>(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<T>())
}

fn is_canceled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(cause.downcast_ref::<DetectError>(), Some(DetectError::Canceled))
            || matches!(cause.downcast_ref::<FormatError>(), Some(FormatError::Canceled))
    })
}

fn exit_code_for_error(err: &anyhow::Error) -> i32 {
    if is_canceled(err) {
        exit_codes::CANCELED
    } else if error_chain_has::<ArgError>(err) {
        exit_codes::INVALID_ARGS
    } else if error_chain_has::<ConfigRejected>(err) {
        exit_codes::INVALID_CONFIG
    } else if error_chain_has::<ParseError>(err) || error_chain_has::<ImportError>(err) {
        exit_codes::PARSE_ERROR
    } else {
        exit_codes::ERROR
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CLI Arguments
// ─────────────────────────────────────────────────────────────────────────────

/// Default sample patterns when recursing
const DEFAULT_GLOB: &str = "*.c,*.cc,*.cpp,*.cxx,*.h,*.hh,*.hpp,*.hxx";

const DEFAULT_FORMATTER: &str = "clang-format";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Total sample size above which detection is announced as slow
const DEFAULT_SIZE_WARNING_KB: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ColorMode {
    /// Auto-detect color support
    Auto,
    /// Always emit colors (even when not a TTY)
    Always,
    /// Never emit colors
    Never,
}

/// Clang-Format style detector: infers a .clang-format file from C/C++ samples
#[derive(Parser, Debug)]
#[command(
    name = "cfdetect",
    version,
    about,
    long_about = None,
    after_help = "EXIT CODES:\n  0    Success\n  1    General error (file not found, formatter unavailable, I/O error)\n  2    Invalid command-line arguments\n  3    check: configuration rejected by the formatter\n  4    Parse error (invalid UTF-8, binary input or malformed configuration)\n  130  Canceled\n"
)]
struct Args {
    /// Sample file(s). Reads one sample from stdin if not provided.
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Path to config file (default: search for .cfdetectrc)
    #[arg(long = "config", value_name = "FILE", global = true)]
    config_file: Option<PathBuf>,

    /// Ignore config files
    #[arg(long = "no-config", global = true)]
    no_config: bool,

    /// Collect samples recursively from directories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Glob pattern to match files when recursing (comma-separated)
    #[arg(long, default_value = DEFAULT_GLOB, requires = "recursive")]
    glob: String,

    /// Do not respect .gitignore when recursing
    #[arg(long = "no-gitignore", requires = "recursive")]
    no_gitignore: bool,

    /// Maximum directory depth (0 = unlimited)
    #[arg(long, default_value = "0", requires = "recursive")]
    max_depth: usize,

    /// clang-format executable
    #[arg(long, value_name = "EXE", default_value = DEFAULT_FORMATTER, global = true)]
    formatter: String,

    /// Per-invocation formatter timeout in milliseconds
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_TIMEOUT_MS, global = true)]
    timeout_ms: u64,

    /// Directory for the formatter's temporary files (default: system temp)
    #[arg(long, value_name = "DIR", global = true)]
    scratch_dir: Option<PathBuf>,

    /// Candidates evaluated in parallel
    #[arg(short = 'j', long, default_value = "1")]
    jobs: usize,

    /// Base styles to consider, in tie-break order (comma-separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    styles: Vec<FormatStyle>,

    /// Write the detected configuration to FILE instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Show a unified diff of each sample against its detected formatting
    #[arg(short = 'd', long)]
    diff: bool,

    /// Verbose output showing detection progress
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Color output: auto, always, or never
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    /// Output results as JSON for programmatic processing
    #[arg(long, conflicts_with_all = ["verbose", "diff"])]
    json: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Format a file with a base style or an existing configuration
    Format {
        /// Base style to format with (default: llvm)
        #[arg(long, value_enum, conflicts_with = "import")]
        style: Option<FormatStyle>,

        /// .clang-format file to format with
        #[arg(long, value_name = "FILE")]
        import: Option<PathBuf>,

        /// Show a unified diff instead of the formatted text
        #[arg(short = 'd', long)]
        diff: bool,

        /// File to format
        file: PathBuf,
    },
    /// Check that the formatter accepts a .clang-format file
    Check {
        /// Configuration to check
        config: PathBuf,

        /// Source to format while checking (default: built-in snippet)
        #[arg(long, value_name = "FILE")]
        sample: Option<PathBuf>,
    },
    /// Print the diff score between two files
    Score {
        /// Text before formatting
        original: PathBuf,
        /// Text after formatting
        formatted: PathBuf,

        /// Print the score and diff chunks as JSON
        #[arg(long)]
        json: bool,
    },
    /// List catalog options with their defaults
    Options {
        /// Style whose defaults are shown
        #[arg(long, value_enum, default_value = "llvm")]
        style: FormatStyle,

        /// Only show options whose name contains TEXT (case-insensitive)
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config management actions
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Initialize a new .cfdetectrc config file
    Init {
        /// Create in home directory instead of current
        #[arg(long)]
        global: bool,
    },
    /// Show effective configuration (merged file + CLI)
    Show,
    /// Show path to active config file
    Path,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration derived from CLI args
#[derive(Debug)]
struct Config {
    formatter: String,
    timeout_ms: u64,
    scratch_dir: Option<PathBuf>,
    jobs: usize,
    styles: Vec<FormatStyle>,
    recursive: bool,
    glob: String,
    gitignore: bool,
    max_depth: usize,
    color: ColorMode,
    verbose: bool,
    diff: bool,
    json: bool,
    output: Option<PathBuf>,
    size_warning_kb: u64,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            formatter: args.formatter.clone(),
            timeout_ms: args.timeout_ms,
            scratch_dir: args.scratch_dir.clone(),
            jobs: args.jobs,
            styles: args.styles.clone(),
            recursive: args.recursive,
            glob: args.glob.clone(),
            gitignore: !args.no_gitignore,
            max_depth: args.max_depth,
            color: args.color,
            verbose: args.verbose,
            diff: args.diff,
            json: args.json,
            output: args.output.clone(),
            size_warning_kb: DEFAULT_SIZE_WARNING_KB,
        }
    }
}

impl Config {
    fn formatter(&self) -> ClangFormatter {
        let formatter = ClangFormatter::new(&self.formatter)
            .with_timeout(Duration::from_millis(self.timeout_ms));
        match &self.scratch_dir {
            Some(dir) => formatter.with_scratch_root(dir.clone()),
            None => formatter,
        }
    }

    fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            styles: if self.styles.is_empty() {
                FormatStyle::ALL.to_vec()
            } else {
                self.styles.clone()
            },
            jobs: self.jobs.max(1),
        }
    }
}

struct VerboseStyle {
    use_color: bool,
}

impl VerboseStyle {
    fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn wrap(&self, tag: &str, text: impl fmt::Display) -> String {
        if self.use_color {
            format!("[{}]{}[/]", tag, text)
        } else {
            text.to_string()
        }
    }

    fn header(&self, text: impl fmt::Display) -> String {
        self.wrap("bold cyan", text)
    }

    fn option(&self, text: impl fmt::Display) -> String {
        self.wrap("yellow", text)
    }

    fn success(&self, text: impl fmt::Display) -> String {
        self.wrap("bold green", text)
    }

    fn dim(&self, text: impl fmt::Display) -> String {
        self.wrap("dim", text)
    }

    fn stat_label(&self, text: impl fmt::Display) -> String {
        self.wrap("bold blue", text)
    }

    fn separator(&self) -> String {
        self.wrap("dim", "───")
    }
}

fn build_console(color: ColorMode) -> (Console, VerboseStyle) {
    match color {
        ColorMode::Never => (Console::new(), VerboseStyle::new(false)),
        ColorMode::Always => {
            let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
            let console = Console::builder()
                .force_terminal(true)
                .color_system(system)
                .build();
            (console, VerboseStyle::new(true))
        }
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                return (Console::new(), VerboseStyle::new(false));
            }

            if std::env::var("FORCE_COLOR").is_ok() {
                let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
                let console = Console::builder()
                    .force_terminal(true)
                    .color_system(system)
                    .build();
                return (console, VerboseStyle::new(true));
            }

            let console = Console::new();
            let use_color = console.is_color_enabled();
            (console, VerboseStyle::new(use_color))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config File Support
// ─────────────────────────────────────────────────────────────────────────────

/// Config file names searched in order
const CONFIG_FILENAMES: &[&str] = &[".cfdetectrc", ".cfdetectrc.toml", "cfdetectrc.toml"];

/// Configuration loaded from a .cfdetectrc file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    /// clang-format executable
    formatter: Option<String>,
    /// Per-invocation timeout in milliseconds
    timeout_ms: Option<u64>,
    /// Parallel candidate evaluations
    jobs: Option<usize>,
    /// Base styles to consider
    styles: Option<Vec<FormatStyle>>,
    /// Show verbose output
    verbose: Option<bool>,
    /// Color mode: auto, always, never
    color: Option<ColorMode>,
    /// Output as JSON
    json: Option<bool>,
    /// Enable recursive mode
    recursive: Option<bool>,
    /// Glob patterns for recursive mode
    glob: Option<String>,
    /// Respect .gitignore
    gitignore: Option<bool>,
    /// Maximum directory depth
    max_depth: Option<usize>,
    /// Large-sample warning threshold in KiB
    size_warning_kb: Option<u64>,
}

/// Search for a config file starting from the given directory
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        for filename in CONFIG_FILENAMES {
            let config_path = current.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(home) = dirs::home_dir() {
        for filename in CONFIG_FILENAMES {
            let config_path = home.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }
    }

    None
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Create Config by merging file config with CLI args (CLI wins)
fn create_config(args: &Args) -> Result<Config> {
    let mut config = Config::from(args);

    if args.no_config {
        return Ok(config);
    }

    let config_path = if let Some(ref path) = args.config_file {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        Some(path.clone())
    } else {
        let start_dir = args
            .inputs
            .first()
            .and_then(|p| {
                if p.is_dir() {
                    Some(p.clone())
                } else {
                    p.parent().map(|p| p.to_path_buf())
                }
            })
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

        find_config_file(&start_dir)
    };

    let Some(path) = config_path else {
        return Ok(config);
    };
    debug!("loading config file {}", path.display());
    let file_config = load_config_file(&path)?;

    // File values only replace CLI defaults.
    if args.formatter == DEFAULT_FORMATTER {
        if let Some(formatter) = file_config.formatter {
            config.formatter = formatter;
        }
    }

    if args.timeout_ms == DEFAULT_TIMEOUT_MS {
        if let Some(timeout) = file_config.timeout_ms {
            config.timeout_ms = timeout;
        }
    }

    if args.jobs == 1 {
        if let Some(jobs) = file_config.jobs {
            config.jobs = jobs;
        }
    }

    if args.styles.is_empty() {
        if let Some(styles) = file_config.styles {
            config.styles = styles;
        }
    }

    if !args.verbose {
        if let Some(v) = file_config.verbose {
            config.verbose = v;
        }
    }

    if args.color == ColorMode::Auto {
        if let Some(c) = file_config.color {
            config.color = c;
        }
    }

    if !args.json {
        if let Some(j) = file_config.json {
            config.json = j;
        }
    }

    if !args.recursive {
        if let Some(r) = file_config.recursive {
            config.recursive = r;
        }
    }

    if args.glob == DEFAULT_GLOB {
        if let Some(g) = file_config.glob {
            config.glob = g;
        }
    }

    if !args.no_gitignore {
        if let Some(gi) = file_config.gitignore {
            config.gitignore = gi;
        }
    }

    if args.max_depth == 0 {
        if let Some(d) = file_config.max_depth {
            config.max_depth = d;
        }
    }

    if let Some(kb) = file_config.size_warning_kb {
        config.size_warning_kb = kb;
    }

    Ok(config)
}

/// Default config file content
const DEFAULT_CONFIG: &str = r#"# .cfdetectrc - cfdetect configuration file

# clang-format executable and per-call timeout
formatter = "clang-format"
timeout_ms = 30000

# Candidates evaluated in parallel
jobs = 1

# Base styles to consider, in tie-break order
# styles = ["llvm", "google", "chromium", "mozilla", "webkit", "microsoft", "custom"]

# Warn when the samples exceed this size (KiB)
size_warning_kb = 300

# Output options
# verbose = false
# color = "auto"
# json = false

# Recursive mode defaults
# recursive = false
# glob = "*.c,*.cc,*.cpp,*.cxx,*.h,*.hh,*.hpp,*.hxx"
# gitignore = true
# max_depth = 0
"#;

/// Handle the config subcommand
fn run_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { global } => {
            let path = if *global {
                dirs::home_dir()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                    .join(".cfdetectrc")
            } else {
                PathBuf::from(".cfdetectrc")
            };

            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file already exists: {}",
                    path.display()
                ));
            }

            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to create config file: {}", path.display()))?;

            eprintln!("Created config file: {}", path.display());
            Ok(())
        }

        ConfigAction::Show => {
            let args = Args::parse_from(["cfdetect"]);
            let config = create_config(&args)?;
            let styles: Vec<String> = config
                .detector_options()
                .styles
                .iter()
                .map(|style| style.to_string())
                .collect();

            eprintln!("Effective configuration:");
            eprintln!("  formatter: {}", config.formatter);
            eprintln!("  timeout_ms: {}", config.timeout_ms);
            eprintln!("  jobs: {}", config.jobs);
            eprintln!("  styles: {}", styles.join(", "));
            eprintln!("  verbose: {}", config.verbose);
            eprintln!("  color: {:?}", config.color);
            eprintln!("  json: {}", config.json);
            eprintln!("  recursive: {}", config.recursive);
            eprintln!("  glob: {}", config.glob);
            eprintln!("  gitignore: {}", config.gitignore);
            eprintln!("  max_depth: {}", config.max_depth);
            eprintln!("  size_warning_kb: {}", config.size_warning_kb);

            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                eprintln!();
                eprintln!("Config file: {}", path.display());
            }

            Ok(())
        }

        ConfigAction::Path => {
            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                println!("{}", path.display());
                Ok(())
            } else {
                eprintln!("No config file found");
                std::process::exit(exit_codes::ERROR);
            }
        }
    }
}

fn validate_args(args: &Args) -> Result<()> {
    if args.jobs == 0 {
        return Err(ArgError("--jobs must be at least 1".to_string()).into());
    }

    if args.timeout_ms == 0 {
        return Err(ArgError("--timeout-ms must be at least 1".to_string()).into());
    }

    if args.recursive && args.inputs.is_empty() {
        return Err(ArgError("--recursive requires at least one input path".to_string()).into());
    }

    if args.diff && args.output.is_none() {
        // Diff and configuration would interleave on stdout.
        return Err(ArgError("--diff requires --output".to_string()).into());
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Sample Discovery
// ─────────────────────────────────────────────────────────────────────────────

fn build_globset(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = 0;

    for raw in patterns.split(',') {
        let pattern = raw.trim();
        if pattern.is_empty() {
            continue;
        }

        let glob = Glob::new(pattern)
            .map_err(|err| ArgError(format!("Invalid glob pattern '{}': {}", pattern, err)))?;
        builder.add(glob);
        added += 1;
    }

    if added == 0 {
        return Err(ArgError("--glob must include at least one pattern".to_string()).into());
    }

    builder
        .build()
        .map_err(|err| ArgError(format!("Invalid glob set: {}", err)).into())
}

fn discover_recursive_files(
    paths: &[PathBuf],
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<Vec<PathBuf>> {
    let globs = build_globset(&config.glob)?;
    let mut files = std::collections::BTreeSet::new();

    for path in paths {
        if path.is_file() {
            files.insert(path.clone());
            continue;
        }

        if !path.is_dir() {
            if config.verbose {
                console.print(
                    &styles.dim(format!("Warning: path does not exist: {}", path.display())),
                );
            }
            continue;
        }

        let mut walker = WalkBuilder::new(path);
        walker.git_ignore(config.gitignore);
        walker.git_exclude(config.gitignore);
        walker.git_global(config.gitignore);
        walker.ignore(config.gitignore);
        walker.hidden(false);

        if config.max_depth > 0 {
            walker.max_depth(Some(config.max_depth));
        }

        for entry in walker.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if config.verbose {
                        console.print(&styles.dim(format!("Warning: {}", err)));
                    }
                    continue;
                }
            };

            let entry_path = entry.path();
            if entry_path.is_file() {
                if let Some(name) = entry_path.file_name() {
                    if globs.is_match(name) {
                        files.insert(entry_path.to_path_buf());
                    }
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}

/// Maximum file size (100 MB) - reject larger files to prevent memory issues
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// A sample and where it came from.
#[derive(Debug, Clone)]
struct Sample {
    name: String,
    text: String,
}

/// Read a file as text, rejecting oversized and binary input
fn read_file(path: &Path) -> Result<String> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read file metadata: {}", path.display()))?;

    if metadata.len() > MAX_FILE_SIZE {
        return Err(ParseError(format!(
            "File too large: {} ({} MB). Maximum supported size is {} MB.",
            path.display(),
            metadata.len() / (1024 * 1024),
            MAX_FILE_SIZE / (1024 * 1024)
        ))
        .into());
    }

    let source_label = path.display().to_string();
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    parse_bytes_to_text(bytes, &source_label)
}

fn read_stdin_content() -> Result<String> {
    let mut buf = Vec::new();
    io::stdin()
        .read_to_end(&mut buf)
        .context("Failed to read stdin")?;
    parse_bytes_to_text(buf, "stdin")
}

/// Convert raw bytes to text, checking for binary content and valid UTF-8
fn parse_bytes_to_text(bytes: Vec<u8>, source_label: &str) -> Result<String> {
    if bytes.contains(&0) {
        return Err(ParseError(format!("Input appears to be binary: {}", source_label)).into());
    }

    String::from_utf8(bytes).map_err(|err| {
        let utf8_err = err.utf8_error();
        let valid_up_to = utf8_err.valid_up_to();
        let byte = err.as_bytes().get(valid_up_to).copied();
        let detail = match byte {
            Some(b) => format!(
                "Invalid UTF-8 at byte position {} (byte value: 0x{:02X}) in {}",
                valid_up_to, b, source_label
            ),
            None => format!("Invalid UTF-8 in {}", source_label),
        };
        ParseError(detail).into()
    })
}

fn collect_samples(
    args: &Args,
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<Vec<Sample>> {
    let paths = if config.recursive {
        let files = discover_recursive_files(&args.inputs, config, console, styles)?;
        if files.is_empty() {
            return Err(anyhow::anyhow!(
                "No files matched pattern '{}' in provided paths",
                config.glob
            ));
        }
        files
    } else {
        args.inputs.clone()
    };

    if paths.is_empty() {
        return Ok(vec![Sample {
            name: "stdin".to_string(),
            text: read_stdin_content()?,
        }]);
    }

    paths
        .iter()
        .map(|path| {
            Ok(Sample {
                name: path.display().to_string(),
                text: read_file(path)?,
            })
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Detection
// ─────────────────────────────────────────────────────────────────────────────

fn install_cancel_handler(cancel: &CancelToken) -> Result<()> {
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        token.cancel();
    })
    .context("Failed to set Ctrl+C handler")
}

fn report_event(event: &DetectEvent, console: &Console, styles: &VerboseStyle) {
    match event {
        DetectEvent::BaseStyleScored { style, score } => {
            console.print(&format!("  {:<10} {}", style.to_string(), styles.dim(score)));
        }
        DetectEvent::BaseStyleSelected { style, score } => {
            console.print(&styles.header(format!("Base style: {} (score {})", style, score)));
        }
        DetectEvent::PerfectMatch { style } => {
            console.print(&styles.success(format!("{} reproduces every sample", style)));
        }
        DetectEvent::OptionDecided {
            option,
            value,
            changed,
            score,
            position,
            total,
        } => {
            if *changed {
                console.print(&format!(
                    "  [{}/{}] {} = {} {}",
                    position,
                    total,
                    styles.option(option),
                    value,
                    styles.dim(format!("(score {})", score))
                ));
            }
        }
    }
}

/// Run detection on a worker thread while the main thread reports progress.
fn detect_in_background<F: StyleFormatter>(
    catalog: &Catalog,
    formatter: &F,
    samples: &[Sample],
    config: &Config,
    cancel: &CancelToken,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<DetectionResult> {
    let (tx, rx) = mpsc::channel::<DetectEvent>();
    let texts: Vec<&str> = samples.iter().map(|sample| sample.text.as_str()).collect();

    thread::scope(|scope| {
        let detector = Detector::new(catalog, formatter)
            .with_options(config.detector_options())
            .on_event(move |event| {
                let _ = tx.send(event.clone());
            });
        let worker = scope.spawn(move || detector.detect(&texts, cancel));

        let mut announced = false;
        loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(event) => {
                    if config.verbose {
                        report_event(&event, console, styles);
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if cancel.is_canceled() && !announced {
                eprintln!("Canceling...");
                announced = true;
            }
        }

        match worker.join() {
            Ok(result) => result.context("Style detection failed"),
            Err(payload) => std::panic::resume_unwind(payload),
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON Output Structures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonOutput<'a> {
    version: &'static str,
    status: &'static str,
    samples: Vec<SampleStats<'a>>,
    style: FormatStyle,
    score: u64,
    perfect_match: bool,
    base_scores: &'a [StyleScore],
    options: Vec<&'a FormatOption>,
    configuration: String,
}

#[derive(Serialize)]
struct SampleStats<'a> {
    file: &'a str,
    lines: usize,
    bytes: usize,
}

#[derive(Serialize)]
struct JsonScore {
    score: u64,
    chunks: Vec<diff::Chunk>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::INVALID_ARGS,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let result = match &args.command {
        Some(command) => run_command(&args, command),
        None => run(&args),
    };

    let exit_code = match result {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            exit_code_for_error(&err)
        }
    };

    std::process::exit(exit_code);
}

fn run(args: &Args) -> Result<()> {
    validate_args(args)?;

    let config = create_config(args)?;
    let (console, styles) = build_console(config.color);
    let start = Instant::now();

    let samples = collect_samples(args, &config, &console, &styles)?;
    let total_bytes: usize = samples.iter().map(|sample| sample.text.len()).sum();
    if total_bytes as u64 > config.size_warning_kb * 1024 {
        eprintln!(
            "Warning: samples total {} KiB; detection may take several minutes",
            total_bytes / 1024
        );
    }

    let formatter = config.formatter();
    if config.verbose {
        match formatter.version() {
            Ok(version) => console.print(&styles.dim(format!("Using {}", version))),
            Err(err) => console.print(&styles.dim(format!("Warning: {}", err))),
        }
        console.print(&styles.header(format!(
            "Detecting style from {} sample(s), {} bytes",
            samples.len(),
            total_bytes
        )));
    }

    let catalog = Catalog::builtin();
    let cancel = CancelToken::new();
    install_cancel_handler(&cancel)?;

    let result = detect_in_background(
        &catalog, &formatter, &samples, &config, &cancel, &console, &styles,
    )?;
    info!(
        "detected {} with {} override(s), score {}",
        result.style,
        result.enabled_options().count(),
        result.score
    );

    let candidate = result.candidate(&catalog);
    let rendered = candidate.render();

    if config.json {
        let output = JsonOutput {
            version: "1.0",
            status: "success",
            samples: samples
                .iter()
                .map(|sample| SampleStats {
                    file: &sample.name,
                    lines: sample.text.lines().count(),
                    bytes: sample.text.len(),
                })
                .collect(),
            style: result.style,
            score: result.score.value(),
            perfect_match: result.perfect_match,
            base_scores: &result.base_scores,
            options: result.enabled_options().collect(),
            configuration: rendered.clone(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize JSON output")?
        );
    }

    match &config.output {
        Some(path) => {
            format_file::export(path, &candidate)
                .with_context(|| format!("Failed to write configuration: {}", path.display()))?;
            if !config.json {
                eprintln!("Wrote {}", path.display());
            }
        }
        None if !config.json => print!("{}", rendered),
        None => {}
    }

    if config.diff {
        for sample in &samples {
            let formatted = formatter
                .format(&sample.text, &candidate, &cancel)
                .with_context(|| format!("Failed to format {}", sample.name))?;
            print!("{}", diff::unified(&sample.text, &formatted, &sample.name));
        }
    }

    if config.verbose {
        print_summary(&result, start.elapsed(), &console, &styles);
    }

    Ok(())
}

/// Print a detection summary to stderr
fn print_summary(
    result: &DetectionResult,
    elapsed: Duration,
    console: &Console,
    styles: &VerboseStyle,
) {
    console.print("");
    console.print(&format!(
        "{} Summary {}",
        styles.separator(),
        styles.separator()
    ));
    console.print(&format!("  {} {}", styles.stat_label("Style:"), result.style));
    console.print(&format!(
        "  {} {}{}",
        styles.stat_label("Score:"),
        result.score,
        if result.perfect_match {
            " (perfect match)"
        } else {
            ""
        }
    ));
    console.print(&format!(
        "  {} {} enabled, {} decisions",
        styles.stat_label("Options:"),
        result.enabled_options().count(),
        result.decisions.len()
    ));
    console.print(&format!(
        "  {} {:.2}s",
        styles.stat_label("Time:"),
        elapsed.as_secs_f64()
    ));
    console.print("");
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommand Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Snippet formatted by `check` when no sample is given
const CHECK_SNIPPET: &str = "int main(int argc, char **argv) {\n  return argc > 1 ? 0 : 1;\n}\n";

fn run_command(args: &Args, command: &Commands) -> Result<()> {
    match command {
        Commands::Format {
            style,
            import,
            diff,
            file,
        } => run_format(args, *style, import.as_deref(), *diff, file),
        Commands::Check { config, sample } => run_check(args, config, sample.as_deref()),
        Commands::Score {
            original,
            formatted,
            json,
        } => run_score(original, formatted, *json),
        Commands::Options { style, search } => run_options(*style, search.as_deref()),
        Commands::Config { action } => run_config_command(action),
    }
}

fn import_file(path: &Path, catalog: &Catalog) -> Result<CandidateConfiguration> {
    let text = read_file(path)?;
    let imported = format_file::import(&text, catalog)
        .with_context(|| format!("Malformed configuration: {}", path.display()))?;
    Ok(imported.candidate(catalog))
}

fn run_format(
    args: &Args,
    style: Option<FormatStyle>,
    import: Option<&Path>,
    show_diff: bool,
    file: &Path,
) -> Result<()> {
    let config = create_config(args)?;
    let catalog = Catalog::builtin();
    let candidate = match import {
        Some(path) => import_file(path, &catalog)?,
        None => CandidateConfiguration::base(style.unwrap_or(FormatStyle::Llvm)),
    };

    let source = read_file(file)?;
    let cancel = CancelToken::new();
    install_cancel_handler(&cancel)?;

    let formatted = config
        .formatter()
        .format(&source, &candidate, &cancel)
        .with_context(|| format!("Failed to format {}", file.display()))?;

    if show_diff {
        print!("{}", diff::unified(&source, &formatted, &file.display().to_string()));
    } else {
        print!("{}", formatted);
    }

    if config.verbose {
        let (console, styles) = build_console(config.color);
        console.print(&styles.dim(format!(
            "Score against input: {}",
            diff::score(&source, &formatted)
        )));
    }
    Ok(())
}

fn run_check(args: &Args, path: &Path, sample: Option<&Path>) -> Result<()> {
    let config = create_config(args)?;
    let catalog = Catalog::builtin();
    let candidate = import_file(path, &catalog)?;
    let source = match sample {
        Some(sample) => read_file(sample)?,
        None => CHECK_SNIPPET.to_string(),
    };

    let cancel = CancelToken::new();
    install_cancel_handler(&cancel)?;

    match config
        .formatter()
        .validate(&source, &candidate, &cancel)
        .context("Failed to run formatter")?
    {
        Validation::Valid => {
            println!("{}: valid", path.display());
            Ok(())
        }
        Validation::Invalid { diagnostic } => Err(ConfigRejected(diagnostic).into()),
    }
}

fn run_score(original: &Path, formatted: &Path, json: bool) -> Result<()> {
    let original = read_file(original)?;
    let formatted = read_file(formatted)?;
    let score = diff::score(&original, &formatted);

    if json {
        let output = JsonScore {
            score: score.value(),
            chunks: diff::chunks(&original, &formatted),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialize JSON output")?
        );
    } else {
        println!("{}", score);
    }
    Ok(())
}

fn run_options(style: FormatStyle, search: Option<&str>) -> Result<()> {
    let catalog = Catalog::builtin();
    let needle = search.map(str::to_lowercase);

    let matching: Vec<&FormatOption> = catalog
        .templates(style)
        .iter()
        .filter(|option| {
            needle
                .as_deref()
                .is_none_or(|needle| option.name.to_lowercase().contains(needle))
        })
        .collect();

    if matching.is_empty() {
        return Err(anyhow::anyhow!(
            "No option matches '{}'",
            search.unwrap_or_default()
        ));
    }

    for option in matching {
        println!(
            "{:<42} {:<16} {}",
            option.name,
            option.value.kind(),
            option.value.summary()
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
