/*!
 * External tool invocation
 *
 * The encoder, the reordering utility and umount are all spawned through
 * the `ToolRunner` capability so the pipeline's failure handling stays
 * uniform and tests can script outcomes without real processes.
 */

use std::ffi::{OsStr, OsString};
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

/// Errors from launching or supervising an external process.
///
/// A non-zero exit status is not an error at this layer; callers read it
/// from [`ToolOutput`] and decide what it means for their stage.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: io::Error,
    },

    #[error("{program} exceeded the {timeout_secs}s timeout and was killed")]
    TimedOut { program: String, timeout_secs: u64 },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("I/O error while supervising {program}: {source}")]
    Io {
        program: String,
        source: io::Error,
    },
}

/// One fully-specified external command
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    program: String,
    args: Vec<OsString>,
    timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Render the command line for logs and error messages
    pub fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured result of a finished invocation
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Exit code; None when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Trimmed stderr tail for error messages (stderr can be huge for
    /// encoders; only the end is ever informative)
    pub fn stderr_tail(&self) -> String {
        const TAIL: usize = 400;
        let trimmed = self.stderr.trim();
        if trimmed.len() <= TAIL {
            trimmed.to_string()
        } else {
            let cut = trimmed.len() - TAIL;
            let mut at = cut;
            while at < trimmed.len() && !trimmed.is_char_boundary(at) {
                at += 1;
            }
            format!("...{}", &trimmed[at..])
        }
    }
}

/// Capability interface over process execution
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Real implementation: spawns the process, drains its pipes on reader
/// threads and polls for exit, killing on timeout or cancellation.
pub struct SystemRunner {
    cancel: Arc<AtomicBool>,
}

impl SystemRunner {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(25);

impl ToolRunner for SystemRunner {
    fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!(command = %invocation.describe(), "spawning external tool");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolError::Launch {
                program: invocation.program.clone(),
                source: e,
            })?;

        // Pipes must be drained while polling or a chatty child
        // (ffmpeg on stderr) deadlocks on a full pipe buffer.
        let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
        let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::Io {
                        program: invocation.program.clone(),
                        source: e,
                    });
                }
            }

            if self.cancel.load(Ordering::SeqCst) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::Cancelled {
                    program: invocation.program.clone(),
                });
            }

            if let Some(timeout) = invocation.timeout {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::TimedOut {
                        program: invocation.program.clone(),
                        timeout_secs: timeout.as_secs(),
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        };

        let stdout = join_pipe_reader(stdout_reader);
        let stderr = join_pipe_reader(stderr_reader);

        debug!(
            program = %invocation.program,
            code = ?status.code(),
            "external tool finished"
        );

        Ok(ToolOutput {
            status: status.code(),
            stdout,
            stderr,
        })
    }
}

fn spawn_pipe_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn join_pipe_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
