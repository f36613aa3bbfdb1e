//! E2E Integration tests for cfdetect
//!
//! Run with: cargo test --test integration
//! Verbose:  TEST_VERBOSE=1 cargo test --test integration -- --nocapture
//!
//! Most tests drive the binary with small shell scripts standing in for
//! clang-format. Tests that need the real tool skip when it is not installed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;

/// Test logging macro - prints when TEST_VERBOSE is set
macro_rules! test_log {
    ($level:expr, $($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            eprintln!("[{}] [integration:{}] {}",
                $level,
                line!(),
                format!($($arg)*)
            );
        }
    };
}

fn get_binary_path() -> PathBuf {
    if let Ok(bin_path) = std::env::var("CARGO_BIN_EXE_cfdetect") {
        let path = PathBuf::from(bin_path);
        if path.exists() {
            return path;
        }
    }

    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let release_path = PathBuf::from(manifest_dir).join("target/release/cfdetect");
    let debug_path = PathBuf::from(manifest_dir).join("target/debug/cfdetect");

    if let Ok(target_dir) = std::env::var("CARGO_TARGET_DIR") {
        let custom_release = PathBuf::from(&target_dir).join("release/cfdetect");
        let custom_debug = PathBuf::from(&target_dir).join("debug/cfdetect");
        if custom_release.exists() {
            return custom_release;
        }
        if custom_debug.exists() {
            return custom_debug;
        }
    }

    if release_path.exists() {
        release_path
    } else if debug_path.exists() {
        debug_path
    } else {
        panic!(
            "cfdetect binary not found. Run 'cargo build' or 'cargo build --release' first.\n\
             Looked in:\n  - {}\n  - {}",
            release_path.display(),
            debug_path.display()
        );
    }
}

fn run_cfdetect_stdin(input: &str, args: &[&str]) -> (String, String, i32) {
    test_log!("RUN", "cfdetect with args: {:?}", args);
    test_log!("INPUT", "Input length: {} bytes", input.len());

    let mut child = Command::new(get_binary_path())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn cfdetect");

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(input.as_bytes())
            .expect("Failed to write to stdin");
    }

    let output = child.wait_with_output().expect("Failed to wait on cfdetect");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    test_log!("OUTPUT", "Exit code: {}", code);
    if !stderr.is_empty() {
        test_log!("STDERR", "{}", stderr);
    }

    (stdout, stderr, code)
}

fn run_cfdetect_args(args: &[&str]) -> (String, String, i32) {
    test_log!("RUN", "cfdetect with args: {:?}", args);

    let output = Command::new(get_binary_path())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run cfdetect");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    test_log!("OUTPUT", "Exit code: {}", code);
    if !stderr.is_empty() {
        test_log!("STDERR", "{}", stderr);
    }

    (stdout, stderr, code)
}

const SAMPLE: &str = "int main() {\n  return 0;\n}\n";

fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).expect("Failed to write fixture");
    path
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// A stand-in formatter: answers `--version`, then runs `body` in the
/// staging directory with the source file at `FormatTemp.cpp`.
#[cfg(unix)]
fn fake_formatter(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then\n  echo \"fake clang-format version 0.0\"\n  exit 0\nfi\n{}\n",
        body
    );
    fs::write(&path, script).expect("Failed to write fake formatter");
    let mut permissions = fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).unwrap();
    path
}

#[cfg(unix)]
fn identity_formatter(dir: &Path) -> PathBuf {
    fake_formatter(dir, "identity-format", "cat FormatTemp.cpp")
}

fn real_clang_format() -> bool {
    let available = Command::new("clang-format")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !available {
        test_log!("SKIP", "clang-format not installed");
    }
    available
}

// ============================================================================
// Detection Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_e2e_identity_formatter_is_perfect_llvm() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (stdout, _stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "--formatter",
        path_str(&formatter),
        path_str(&sample),
    ]);

    assert_eq!(code, 0);
    assert!(stdout.starts_with("# Format Style Options"));
    assert!(stdout.contains("---\nLanguage: Cpp\nBasedOnStyle: LLVM\n...\n"));
}

#[cfg(unix)]
#[test]
fn test_e2e_json_output_from_stdin() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());

    let (stdout, _stderr, code) = run_cfdetect_stdin(
        SAMPLE,
        &["--no-config", "--json", "--formatter", path_str(&formatter)],
    );

    assert_eq!(code, 0);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["version"], "1.0");
    assert_eq!(json["status"], "success");
    assert_eq!(json["style"], "llvm");
    assert_eq!(json["score"], 0);
    assert_eq!(json["perfect_match"], true);
    assert_eq!(json["samples"][0]["file"], "stdin");
    assert_eq!(json["samples"][0]["lines"], 3);
    assert_eq!(json["base_scores"].as_array().map(Vec::len), Some(7));
    assert_eq!(json["options"].as_array().map(Vec::len), Some(0));
}

#[cfg(unix)]
#[test]
fn test_e2e_only_reproducing_style_wins() {
    let temp = TempDir::new().unwrap();
    let formatter = fake_formatter(
        temp.path(),
        "webkit-only",
        "if grep -q 'BasedOnStyle: WebKit' .clang-format; then\n  cat FormatTemp.cpp\nelse\n  echo 'int main() { return 0; }'\nfi",
    );
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (stdout, _stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "--json",
        "--formatter",
        path_str(&formatter),
        path_str(&sample),
    ]);

    assert_eq!(code, 0);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["style"], "webkit");
    assert_eq!(json["perfect_match"], true);
}

#[cfg(unix)]
#[test]
fn test_e2e_styles_restrict_candidates() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (stdout, _stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "--styles",
        "mozilla,google",
        "--formatter",
        path_str(&formatter),
        path_str(&sample),
    ]);

    assert_eq!(code, 0);
    assert!(stdout.contains("BasedOnStyle: Mozilla"));
}

#[cfg(unix)]
#[test]
fn test_e2e_output_file_and_diff() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);
    let output = temp.path().join(".clang-format");

    let (stdout, stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "-d",
        "-o",
        path_str(&output),
        "--formatter",
        path_str(&formatter),
        path_str(&sample),
    ]);

    assert_eq!(code, 0);
    assert!(stderr.contains("Wrote"));
    // Identity formatting leaves nothing to diff.
    assert!(stdout.is_empty());
    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("BasedOnStyle: LLVM"));
}

#[cfg(unix)]
#[test]
fn test_e2e_recursive_collects_sources() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());
    let src = temp.path().join("src");
    fs::create_dir(&src).unwrap();
    write_file(&src, "a.cpp", SAMPLE);
    write_file(&src, "b.h", "#pragma once\nint b();\n");
    write_file(&src, "notes.txt", "not code\n");

    let (stdout, _stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "--json",
        "-r",
        "--formatter",
        path_str(&formatter),
        path_str(&src),
    ]);

    assert_eq!(code, 0);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["samples"].as_array().map(Vec::len), Some(2));
}

#[cfg(unix)]
#[test]
fn test_e2e_verbose_reports_progress() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (stdout, stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "-v",
        "--color",
        "never",
        "--formatter",
        path_str(&formatter),
        path_str(&sample),
    ]);

    assert_eq!(code, 0);
    // Progress goes through the console; check both streams.
    let combined = format!("{}{}", stdout, stderr);
    assert!(combined.contains("fake clang-format version 0.0"));
    assert!(combined.contains("Base style: LLVM"));
    assert!(combined.contains("Summary"));
}

// ============================================================================
// Failure Modes
// ============================================================================

#[test]
fn test_e2e_missing_formatter() {
    let temp = TempDir::new().unwrap();
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (_stdout, stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "--formatter",
        "/nonexistent/clang-format",
        path_str(&sample),
    ]);

    assert_eq!(code, 1);
    assert!(stderr.contains("formatter is unavailable"));
}

#[cfg(unix)]
#[test]
fn test_e2e_timeout_leaves_no_scratch_files() {
    let temp = TempDir::new().unwrap();
    let formatter = fake_formatter(temp.path(), "slow-format", "exec sleep 5");
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);
    let scratch = temp.path().join("scratch");
    fs::create_dir(&scratch).unwrap();

    let (_stdout, stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "--timeout-ms",
        "100",
        "--scratch-dir",
        path_str(&scratch),
        "--styles",
        "llvm,google",
        "--formatter",
        path_str(&formatter),
        path_str(&sample),
    ]);

    assert_eq!(code, 1);
    assert!(stderr.contains("timed out"));
    assert!(is_empty_dir(&scratch));
}

#[cfg(unix)]
#[test]
fn test_e2e_interrupt_cancels_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let formatter = fake_formatter(temp.path(), "slow-format", "exec sleep 30");
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);
    let scratch = temp.path().join("scratch");
    fs::create_dir(&scratch).unwrap();

    let mut child = Command::new(get_binary_path())
        .args([
            "--no-config",
            "--scratch-dir",
            path_str(&scratch),
            "--formatter",
            path_str(&formatter),
            path_str(&sample),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn cfdetect");

    std::thread::sleep(Duration::from_millis(500));
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("Failed to run kill");
    assert!(status.success());

    let output = child.wait_with_output().expect("Failed to wait on cfdetect");
    let stderr = String::from_utf8_lossy(&output.stderr);
    test_log!("STDERR", "{}", stderr);

    assert_eq!(output.status.code(), Some(130));
    assert!(stderr.contains("canceled"));
    assert!(is_empty_dir(&scratch));
}

#[test]
fn test_e2e_nonexistent_file() {
    let (_stdout, stderr, code) =
        run_cfdetect_args(&["--no-config", "/nonexistent/path/sample.cpp"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Error"));
}

#[test]
fn test_e2e_binary_input_is_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("blob.cpp");
    fs::write(&path, [0x7f, b'E', b'L', b'F', 0, 1]).unwrap();

    let (_stdout, stderr, code) = run_cfdetect_args(&["--no-config", path_str(&path)]);
    assert_eq!(code, 4);
    assert!(stderr.contains("binary"));
}

#[test]
fn test_e2e_invalid_arguments() {
    let (_stdout, _stderr, code) = run_cfdetect_args(&["--styles", "gnu", "a.cpp"]);
    assert_eq!(code, 2);

    let (_stdout, stderr, code) = run_cfdetect_args(&["--no-config", "-j", "0", "a.cpp"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("--jobs"));

    let (_stdout, stderr, code) = run_cfdetect_args(&["--no-config", "-d", "a.cpp"]);
    assert_eq!(code, 2);
    assert!(stderr.contains("--output"));
}

#[test]
fn test_e2e_help_and_version() {
    let (stdout, _stderr, code) = run_cfdetect_args(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("EXIT CODES"));

    let (stdout, _stderr, code) = run_cfdetect_args(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("cfdetect"));
}

// ============================================================================
// Subcommand Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_e2e_check_accepts_and_rejects() {
    let temp = TempDir::new().unwrap();
    let formatter = fake_formatter(
        temp.path(),
        "strict-format",
        "if grep -qx 'ColumnLimit: 7' .clang-format; then\n  echo 'YAML:4:14: error: invalid number' >&2\n  exit 1\nfi\ncat FormatTemp.cpp",
    );
    let good = write_file(temp.path(), "good.clang-format", "BasedOnStyle: LLVM\nColumnLimit: 100\n");
    let bad = write_file(temp.path(), "bad.clang-format", "BasedOnStyle: LLVM\nColumnLimit: 7\n");

    let (stdout, _stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "check",
        path_str(&good),
        "--formatter",
        path_str(&formatter),
    ]);
    assert_eq!(code, 0);
    assert!(stdout.contains("valid"));

    let (_stdout, stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "check",
        path_str(&bad),
        "--formatter",
        path_str(&formatter),
    ]);
    assert_eq!(code, 3);
    assert!(stderr.contains("YAML:4:14"));
}

#[test]
fn test_e2e_check_malformed_configuration() {
    let temp = TempDir::new().unwrap();
    let config = write_file(temp.path(), "bad.clang-format", "NoSuchOption: 1\n");

    let (_stdout, stderr, code) = run_cfdetect_args(&["--no-config", "check", path_str(&config)]);
    assert_eq!(code, 4);
    assert!(stderr.contains("line 1"));
    assert!(stderr.contains("NoSuchOption"));
}

#[cfg(unix)]
#[test]
fn test_e2e_format_with_import() {
    let temp = TempDir::new().unwrap();
    let formatter = fake_formatter(
        temp.path(),
        "echo-config",
        "cat .clang-format",
    );
    let config = write_file(temp.path(), "custom.clang-format", "IndentWidth: 3\n");
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (stdout, _stderr, code) = run_cfdetect_args(&[
        "--no-config",
        "format",
        "--import",
        path_str(&config),
        path_str(&sample),
        "--formatter",
        path_str(&formatter),
    ]);

    assert_eq!(code, 0);
    assert!(stdout.contains("IndentWidth: 3"));
    assert!(!stdout.contains("BasedOnStyle"));
}

#[test]
fn test_e2e_score() {
    let temp = TempDir::new().unwrap();
    let original = write_file(temp.path(), "a.cpp", "int x;\n");
    let formatted = write_file(temp.path(), "b.cpp", "int  x;\n");

    let (stdout, _stderr, code) =
        run_cfdetect_args(&["score", path_str(&original), path_str(&original)]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "0");

    let (stdout, _stderr, code) =
        run_cfdetect_args(&["score", path_str(&original), path_str(&formatted)]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "1");

    let (stdout, _stderr, code) =
        run_cfdetect_args(&["score", "--json", path_str(&original), path_str(&formatted)]);
    assert_eq!(code, 0);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["score"], 1);
    let tags: Vec<&str> = json["chunks"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|chunk| chunk["tag"].as_str())
        .collect();
    assert_eq!(tags, vec!["equal", "insert", "equal"]);
}

#[test]
fn test_e2e_options_listing() {
    let (stdout, _stderr, code) =
        run_cfdetect_args(&["options", "--style", "webkit", "--search", "columnlimit"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("ColumnLimit"));
    assert!(stdout.contains("input"));
    assert!(stdout.trim_end().ends_with('0'));

    let (stdout, _stderr, code) = run_cfdetect_args(&["options"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("BraceWrapping"));
    assert!(stdout.contains("multiple-toggle"));

    let (_stdout, _stderr, code) = run_cfdetect_args(&["options", "--search", "nothing-like-this"]);
    assert_eq!(code, 1);
}

// ============================================================================
// Config File Tests
// ============================================================================

#[cfg(unix)]
#[test]
fn test_e2e_config_file_sets_formatter() {
    let temp = TempDir::new().unwrap();
    let formatter = identity_formatter(temp.path());
    write_file(
        temp.path(),
        ".cfdetectrc",
        &format!("formatter = \"{}\"\nstyles = [\"chromium\"]\n", path_str(&formatter)),
    );
    let sample = write_file(temp.path(), "main.cpp", SAMPLE);

    let (stdout, _stderr, code) = run_cfdetect_args(&[path_str(&sample)]);
    assert_eq!(code, 0);
    assert!(stdout.contains("BasedOnStyle: Chromium"));
}

#[test]
fn test_e2e_invalid_config_file() {
    let temp = TempDir::new().unwrap();
    let config = write_file(temp.path(), "bad.toml", "jobs = \"many\"\n");

    let (_stdout, stderr, code) =
        run_cfdetect_args(&["--config", path_str(&config), "/nonexistent/a.cpp"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Failed to parse config file"));
}

#[test]
fn test_e2e_config_init_and_path() {
    let temp = TempDir::new().unwrap();
    let binary = get_binary_path();

    let init = Command::new(&binary)
        .args(["config", "init"])
        .current_dir(temp.path())
        .output()
        .expect("Failed to run cfdetect");
    assert!(init.status.success());
    assert!(temp.path().join(".cfdetectrc").exists());

    let again = Command::new(&binary)
        .args(["config", "init"])
        .current_dir(temp.path())
        .output()
        .expect("Failed to run cfdetect");
    assert_eq!(again.status.code(), Some(1));

    let path = Command::new(&binary)
        .args(["config", "path"])
        .current_dir(temp.path())
        .output()
        .expect("Failed to run cfdetect");
    assert!(path.status.success());
    assert!(String::from_utf8_lossy(&path.stdout).contains(".cfdetectrc"));
}

// ============================================================================
// Real clang-format
// ============================================================================

#[test]
fn test_e2e_real_formatter_fixed_point_and_perfect_match() {
    if !real_clang_format() {
        return;
    }

    let temp = TempDir::new().unwrap();
    let raw = write_file(
        temp.path(),
        "raw.cpp",
        "int   main( int argc,char**argv ){if(argc>1){return 1;}return 0;}\n",
    );

    let (formatted, _stderr, code) =
        run_cfdetect_args(&["--no-config", "format", "--style", "llvm", path_str(&raw)]);
    assert_eq!(code, 0);
    let once = write_file(temp.path(), "once.cpp", &formatted);

    let (twice, _stderr, code) =
        run_cfdetect_args(&["--no-config", "format", "--style", "llvm", path_str(&once)]);
    assert_eq!(code, 0);
    assert_eq!(twice, formatted);

    let (stdout, _stderr, code) = run_cfdetect_args(&["--no-config", "--json", path_str(&once)]);
    assert_eq!(code, 0);
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(json["score"], 0);
    assert_eq!(json["perfect_match"], true);
    assert_eq!(json["options"].as_array().map(Vec::len), Some(0));
}
