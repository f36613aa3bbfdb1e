//! Runs clang-format against a synthesized configuration.
//!
//! ## Staging
//!
//! ```text
//! <scratch root>/cfdetect-XXXXXX/      (fresh per call, removed on drop)
//!   ├── FormatTemp.cpp                 the sample
//!   └── .clang-format                  CandidateConfiguration::render()
//!
//! $ clang-format -style=file FormatTemp.cpp     (cwd = staging dir)
//! ```
//!
//! Every call gets its own directory, so calls may run concurrently.

use crate::cancel::CancelToken;
use crate::catalog::{Catalog, FormatStyle};
use crate::options::{FormatOption, OptionValue};
use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// File name the sample is staged under; the extension selects C++ parsing.
pub const SOURCE_FILE: &str = "FormatTemp.cpp";

/// Configuration file clang-format discovers with `-style=file`.
pub const CONFIG_FILE: &str = ".clang-format";

/// Tokens clang-format puts in front of configuration parse errors: older
/// releases report `YAML:<line>:<col>`, newer ones the config file path.
pub const INVALID_CONFIG_MARKERS: &[&str] = &["YAML", CONFIG_FILE];

const HEADER: &str = "# Format Style Options - Created with cfdetect";

/// Default upper bound for a single formatter invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

// ─────────────────────────────────────────────────────────────────────────────
// Candidate Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// A base style plus the enabled overrides submitted for one trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateConfiguration {
    pub style: FormatStyle,
    pub options: Vec<FormatOption>,
}

impl CandidateConfiguration {
    /// The style alone, no overrides.
    pub fn base(style: FormatStyle) -> Self {
        Self {
            style,
            options: Vec::new(),
        }
    }

    /// Build a candidate from a working set.
    ///
    /// For a named style only enabled options that differ from the style's
    /// template are kept (multi-toggles keep only their changed flags). For
    /// `Custom` every enabled option is kept as is.
    pub fn from_working_set(
        style: FormatStyle,
        options: &[FormatOption],
        catalog: &Catalog,
    ) -> Self {
        let options = options
            .iter()
            .filter(|option| option.enabled)
            .filter_map(|option| {
                if style == FormatStyle::Custom {
                    return Some(option.clone());
                }
                match catalog.find(style, &option.name) {
                    Some(default) => option.changed_against(default),
                    None => Some(option.clone()),
                }
            })
            .collect();

        Self { style, options }
    }

    /// Render as a `.clang-format` document.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push_str("\n---\nLanguage: Cpp\n");
        if let Some(base) = self.style.based_on() {
            out.push_str(&format!("BasedOnStyle: {}\n", base));
        }

        for option in self.options.iter().filter(|option| option.enabled) {
            match &option.value {
                OptionValue::Toggle(value) => {
                    out.push_str(&format!("{}: {}\n", option.name, value));
                }
                OptionValue::Input(value) => {
                    if !value.is_empty() {
                        out.push_str(&format!("{}: {}\n", option.name, value));
                    }
                }
                OptionValue::MultipleToggle(flags) => {
                    out.push_str(&format!("{}:\n", option.name));
                    for flag in flags {
                        out.push_str(&format!("  {}: {}\n", flag.name, flag.value));
                    }
                }
                OptionValue::MultipleInput(text) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    out.push_str(&format!("{}:\n", option.name));
                    for line in text.lines() {
                        if line.starts_with([' ', '\t']) {
                            out.push_str(line);
                        } else {
                            out.push_str("  ");
                            out.push_str(line);
                        }
                        out.push('\n');
                    }
                }
            }
        }

        out.push_str("...\n");
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Why a single formatter invocation produced no output.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The tool rejected the configuration file.
    #[error("formatter rejected the configuration: {diagnostic}")]
    InvalidConfiguration { diagnostic: String },

    #[error("failed to launch formatter `{executable}`")]
    Launch {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("formatter exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("formatter timed out after {0:?}")]
    Timeout(Duration),

    #[error("formatting was canceled")]
    Canceled,

    #[error("failed to stage formatter input")]
    Io(#[from] io::Error),
}

impl FormatError {
    /// Failures of the tool itself, as opposed to a rejected configuration
    /// or a cancellation.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::Launch { .. } | Self::Failed { .. } | Self::Timeout(_) | Self::Io(_)
        )
    }
}

/// Outcome of [`StyleFormatter::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Valid,
    Invalid { diagnostic: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Formatter
// ─────────────────────────────────────────────────────────────────────────────

/// Something that can reformat a sample under a candidate configuration.
pub trait StyleFormatter: Sync {
    fn format(
        &self,
        source: &str,
        candidate: &CandidateConfiguration,
        cancel: &CancelToken,
    ) -> Result<String, FormatError>;

    /// Check whether the tool accepts `candidate`, without failing on a
    /// rejected configuration.
    fn validate(
        &self,
        source: &str,
        candidate: &CandidateConfiguration,
        cancel: &CancelToken,
    ) -> Result<Validation, FormatError> {
        match self.format(source, candidate, cancel) {
            Ok(_) => Ok(Validation::Valid),
            Err(FormatError::InvalidConfiguration { diagnostic }) => {
                Ok(Validation::Invalid { diagnostic })
            }
            Err(err) => Err(err),
        }
    }
}

/// The external clang-format binary.
#[derive(Debug, Clone)]
pub struct ClangFormatter {
    executable: PathBuf,
    timeout: Duration,
    scratch_root: PathBuf,
}

impl ClangFormatter {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: DEFAULT_TIMEOUT,
            scratch_root: std::env::temp_dir(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory under which per-call staging directories are created.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// First line of `--version`, to fail fast when the tool is missing.
    pub fn version(&self) -> Result<String, FormatError> {
        let output = Command::new(&self.executable)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|source| self.launch_error(source))?;

        if !output.status.success() {
            return Err(FormatError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }

    fn launch_error(&self, source: io::Error) -> FormatError {
        FormatError::Launch {
            executable: self.executable.display().to_string(),
            source,
        }
    }

    /// Wait for the child, killing it on timeout or cancellation.
    fn wait(&self, child: &mut Child, cancel: &CancelToken) -> Result<ExitStatus, FormatError> {
        let start = Instant::now();
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if cancel.is_canceled() {
                kill(child);
                return Err(FormatError::Canceled);
            }
            if start.elapsed() > self.timeout {
                kill(child);
                return Err(FormatError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Read a pipe to the end on a helper thread so the child never blocks on a
/// full pipe while we poll it.
fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(handle: thread::JoinHandle<Vec<u8>>) -> String {
    let bytes = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl StyleFormatter for ClangFormatter {
    fn format(
        &self,
        source: &str,
        candidate: &CandidateConfiguration,
        cancel: &CancelToken,
    ) -> Result<String, FormatError> {
        if cancel.is_canceled() {
            return Err(FormatError::Canceled);
        }

        let staging = tempfile::Builder::new()
            .prefix("cfdetect-")
            .tempdir_in(&self.scratch_root)?;
        fs::write(staging.path().join(SOURCE_FILE), source)?;
        fs::write(staging.path().join(CONFIG_FILE), candidate.render())?;
        debug!(
            "formatting {} bytes as {} with {} override(s) in {}",
            source.len(),
            candidate.style,
            candidate.options.len(),
            staging.path().display()
        );

        let mut child = Command::new(&self.executable)
            .arg("-style=file")
            .arg(SOURCE_FILE)
            .current_dir(staging.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| self.launch_error(source))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = self.wait(&mut child, cancel)?;
        let stdout = collect(stdout);
        let stderr = collect(stderr);

        if !status.success() {
            let diagnostic = stderr.trim().to_string();
            if INVALID_CONFIG_MARKERS
                .iter()
                .any(|marker| diagnostic.contains(marker))
            {
                warn!("configuration rejected: {}", diagnostic);
                return Err(FormatError::InvalidConfiguration { diagnostic });
            }
            return Err(FormatError::Failed {
                status: status.to_string(),
                stderr: diagnostic,
            });
        }

        if !stderr.trim().is_empty() {
            debug!("formatter warnings: {}", stderr.trim());
        }
        Ok(stdout)
    }
}
