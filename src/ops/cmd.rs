//! Allowlisted external command runner. The core never spawns an arbitrary
//! program: only `cargo` and `git` are registered, matched against
//! `argv[0]` before anything is spawned.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;

use crate::error::LadingError;

const ALLOWED_PROGRAMS: &[&str] = &["cargo", "git"];

#[derive(Debug, Clone)]
pub struct Output {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl Output {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execute `program` with `argv` in `cwd`, relaying stdout/stderr lines to
/// the shell output sink in real time while also collecting them for the
/// caller. Fails fast with [`LadingError::UnknownProgram`] before spawning
/// anything not on the allowlist.
pub fn run(
    program: &str,
    argv: &[String],
    cwd: &Path,
    env_overrides: &BTreeMap<String, String>,
) -> Result<Output, LadingError> {
    if !ALLOWED_PROGRAMS.contains(&program) {
        return Err(LadingError::UnknownProgram(program.to_string()));
    }

    let mut cmd = Command::new(program);
    cmd.args(argv)
        .current_dir(cwd)
        .envs(env_overrides)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    log::debug!("+ {program} {} (cwd: {})", argv.join(" "), cwd.display());

    let mut child = cmd.spawn().map_err(LadingError::Io)?;
    let stdout_pipe = child.stdout.take().expect("stdout was piped");
    let stderr_pipe = child.stderr.take().expect("stderr was piped");

    let (tx, rx) = mpsc::channel::<(bool, String)>();

    let stdout_tx = tx.clone();
    let stdout_thread = thread::spawn(move || relay(stdout_pipe, false, stdout_tx));
    let stderr_thread = thread::spawn(move || relay(stderr_pipe, true, tx));

    let mut stdout = String::new();
    let mut stderr = String::new();
    for (is_stderr, line) in rx {
        if is_stderr {
            let _ = crate::ops::shell::write_stderr(
                format_args!("{line}\n"),
                termcolor::ColorSpec::new().set_dimmed(true),
            );
            stderr.push_str(&line);
            stderr.push('\n');
        } else {
            stdout.push_str(&line);
            stdout.push('\n');
        }
    }
    let _ = stdout_thread.join();
    let _ = stderr_thread.join();

    let status = child.wait().map_err(LadingError::Io)?;
    Ok(Output {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn relay(pipe: impl Read, is_stderr: bool, tx: mpsc::Sender<(bool, String)>) {
    let reader = BufReader::new(pipe);
    for line in reader.lines().map_while(Result::ok) {
        if tx.send((is_stderr, line)).is_err() {
            break;
        }
    }
}
