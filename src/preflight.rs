//! Pre-flight Runner: an optional dirty-tree guard followed by auxiliary
//! builds, `cargo check`, and `cargo test`, all executed in the live
//! workspace with an isolated `CARGO_TARGET_DIR`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::PreflightConfig;
use crate::error::LadingError;
use crate::ops::{cmd, git};

pub fn run(
    workspace_root: &Path,
    config: &PreflightConfig,
    forbid_dirty: bool,
) -> Result<(), LadingError> {
    if forbid_dirty {
        let dirty = git::dirty_lines(workspace_root)?;
        if !dirty.is_empty() {
            return Err(LadingError::DirtyWorkspace(dirty.join("\n")));
        }
    }

    for argv in &config.aux_build {
        run_checked(workspace_root, "cargo", argv, &config.env)?;
    }

    let target_dir = tempfile::Builder::new()
        .prefix("lading-target-")
        .tempdir()
        .map_err(LadingError::Io)?;

    let mut env = config.env.clone();
    env.insert(
        "CARGO_TARGET_DIR".to_string(),
        target_dir.path().display().to_string(),
    );

    run_checked(
        workspace_root,
        "cargo",
        &["check".to_string(), "--workspace".to_string(), "--all-targets".to_string()],
        &env,
    )?;

    let mut test_argv = vec!["test".to_string(), "--workspace".to_string(), "--all-targets".to_string()];
    for excluded in &config.test_exclude {
        test_argv.push("--exclude".to_string());
        test_argv.push(excluded.clone());
    }
    if config.unit_tests_only {
        test_argv.push("--lib".to_string());
        test_argv.push("--bins".to_string());
    }

    if !config.compiletest_extern.is_empty() {
        let mut rustflags = env.get("RUSTFLAGS").cloned().unwrap_or_default();
        for (name, path) in &config.compiletest_extern {
            if !rustflags.is_empty() {
                rustflags.push(' ');
            }
            rustflags.push_str(&format!("--extern {name}={}", path.display()));
        }
        env.insert("RUSTFLAGS".to_string(), rustflags);
    }

    let test_result = run_checked_with_tail(
        workspace_root,
        "cargo",
        &test_argv,
        &env,
        config.stderr_tail_lines,
    );

    // `target_dir` is removed once it goes out of scope, regardless of the
    // test outcome.
    drop(target_dir);

    test_result
}

fn run_checked(
    cwd: &Path,
    program: &str,
    argv: &[String],
    env: &BTreeMap<String, String>,
) -> Result<(), LadingError> {
    let output = cmd::run(program, argv, cwd, env)?;
    if output.success() {
        return Ok(());
    }
    Err(LadingError::Preflight {
        argv: format!("{program} {}", argv.join(" ")),
        exit_code: output.exit_code,
        stderr_tail: output.stderr,
    })
}

fn run_checked_with_tail(
    cwd: &Path,
    program: &str,
    argv: &[String],
    env: &BTreeMap<String, String>,
    stderr_tail_lines: usize,
) -> Result<(), LadingError> {
    let output = cmd::run(program, argv, cwd, env)?;
    if output.success() {
        return Ok(());
    }

    let mut stderr_tail = tail_stderr_files(&output.stderr, stderr_tail_lines);
    if stderr_tail.is_empty() {
        stderr_tail = output.stderr.clone();
    }

    Err(LadingError::Preflight {
        argv: format!("{program} {}", argv.join(" ")),
        exit_code: output.exit_code,
        stderr_tail,
    })
}

/// Scan `stderr` for filenames ending in `.stderr` (compiletest-style
/// fixtures), tail up to `max_lines` lines from each, and concatenate them
/// for use as diagnostic context.
fn tail_stderr_files(stderr: &str, max_lines: usize) -> String {
    let mut collected = String::new();
    for token in stderr.split_whitespace() {
        let trimmed = token.trim_matches(|c: char| "\"'(),:".contains(c));
        if !trimmed.ends_with(".stderr") {
            continue;
        }
        let path = Path::new(trimmed);
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        let tail: Vec<&str> = contents.lines().rev().take(max_lines).collect();
        if tail.is_empty() {
            continue;
        }
        collected.push_str(&format!("--- {trimmed} (tail) ---\n"));
        for line in tail.into_iter().rev() {
            collected.push_str(line);
            collected.push('\n');
        }
    }
    collected
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tail_stderr_files_ignores_unreferenced_paths() {
        let stderr = "error in tests/ui/missing.stderr: no such file\n";
        let tail = tail_stderr_files(stderr, 40);
        assert!(tail.is_empty());
    }

    #[test]
    fn tail_stderr_files_reads_referenced_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        let fixture = temp.path().join("case.stderr");
        std::fs::write(&fixture, "line1\nline2\nline3\n").unwrap();
        let stderr = format!("mismatch: {}\n", fixture.display());

        let tail = tail_stderr_files(&stderr, 2);
        assert!(tail.contains("line2"));
        assert!(tail.contains("line3"));
        assert!(!tail.contains("line1"));

        temp.close().unwrap();
    }
}
