//! Bounded subprocess execution and program lookup.
//!
//! External tools (the inference command, the OCR engine) are run with
//! piped output drained on helper threads while the parent polls for
//! exit. A process still running at the deadline is killed and reported
//! as [`ProcessError::Timeout`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

/// How often a running child is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Everything written to stdout.
    pub stdout: Vec<u8>,
    /// Everything written to stderr.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Stderr as trimmed lossy UTF-8, for error messages.
    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Failure to run a subprocess to completion.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The program ran past its deadline and was killed.
    #[error("{program} did not finish within {seconds}s")]
    Timeout {
        /// Program that was killed.
        program: String,
        /// Configured limit.
        seconds: u64,
    },

    /// Waiting on the program failed.
    #[error("failed waiting for {program}: {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Run `command` to completion or until `timeout` elapses.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] if the program cannot start,
/// [`ProcessError::Timeout`] if it had to be killed, or
/// [`ProcessError::Wait`] if polling fails.
pub fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();
    debug!(%program, timeout_secs = timeout.as_secs(), "spawning");

    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Timeout {
                    program,
                    seconds: timeout.as_secs(),
                });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => return Err(ProcessError::Wait { program, source }),
        }
    };

    Ok(ProcessOutput {
        status,
        stdout: stdout.join().unwrap_or_default(),
        stderr: stderr.join().unwrap_or_default(),
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

/// Locate `program` the way a shell would.
///
/// Names containing a path separator are checked as given; bare names
/// are looked up in each directory of `search_path` in order.
#[must_use]
pub fn find_program(program: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }
    search_path.iter().find_map(|dir| {
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{program}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn find_program_walks_search_path_in_order() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        std::fs::write(b.path().join("tool"), b"").unwrap();
        let search = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        assert_eq!(find_program("tool", &search), Some(b.path().join("tool")));
        assert_eq!(find_program("missing", &search), None);
    }

    #[test]
    fn find_program_accepts_explicit_paths() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        std::fs::write(&tool, b"").unwrap();
        let explicit = tool.to_string_lossy().into_owned();
        assert_eq!(find_program(&explicit, &[]), Some(tool));
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = run_with_timeout(
            Command::new("/nonexistent/definitely-not-a-program"),
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello; printf oops >&2"]);
        let out = run_with_timeout(cmd, Duration::from_secs(10)).unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout, b"hello");
        assert_eq!(out.stderr_text(), "oops");
    }

    #[cfg(unix)]
    #[test]
    fn slow_process_is_killed() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let err = run_with_timeout(cmd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ProcessError::Timeout { .. }));
    }
}
