use std::{
    ffi::OsString,
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};

use tokio::{io::AsyncReadExt, process::Command, sync::oneshot};

use crate::{error::SupervisorError, sandbox::env::CommandEnv};

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: PathBuf,
    pub env: CommandEnv,
}

impl CommandSpec {
    pub fn new(
        program: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        env: CommandEnv,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// A command with the explicit environment applied and nothing else.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.current_dir(&self.working_dir);
        self.env.apply(&mut cmd);
        cmd
    }
}

#[derive(Debug)]
pub enum SupervisedOutcome {
    Completed {
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        deadline: Duration,
    },
}

struct Completion {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Runs one command against a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    deadline: Duration,
    max_output_bytes: usize,
}

impl ProcessSupervisor {
    pub fn new(deadline: Duration, max_output_bytes: usize) -> Self {
        Self {
            deadline,
            max_output_bytes,
        }
    }

    pub async fn run(&self, spec: CommandSpec) -> Result<SupervisedOutcome, SupervisorError> {
        let mut cmd = spec.command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(SupervisorError::Spawn)?;
        let pid = child.id();
        let stdout = child.stdout.take().ok_or(SupervisorError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(SupervisorError::MissingPipe("stderr"))?;
        tracing::debug!(pid = ?pid, program = %spec.program.display(), "process started");

        let limit = self.max_output_bytes;
        let (done_tx, done_rx) = oneshot::channel();
        let waiter = tokio::spawn(async move {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_limited(stdout, limit),
                read_limited(stderr, limit)
            );
            let _ = done_tx.send(status.map(|status| Completion {
                status,
                stdout,
                stderr,
            }));
        });

        tokio::select! {
            completion = done_rx => {
                let completion = match completion {
                    Ok(result) => result.map_err(SupervisorError::Wait)?,
                    Err(_) => {
                        return Err(SupervisorError::Wait(std::io::Error::other(
                            "process waiter ended without reporting",
                        )));
                    }
                };
                tracing::debug!(
                    pid = ?pid,
                    status = %completion.status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "process exited"
                );
                Ok(SupervisedOutcome::Completed {
                    status: completion.status,
                    stdout: String::from_utf8_lossy(&completion.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&completion.stderr).into_owned(),
                })
            }
            _ = tokio::time::sleep(self.deadline) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                // Dropping the waiter drops the child, which kill_on_drop reaps.
                waiter.abort();
                let _ = waiter.await;
                tracing::warn!(
                    pid = ?pid,
                    deadline_secs = self.deadline.as_secs(),
                    "process killed at deadline"
                );
                Ok(SupervisedOutcome::TimedOut { deadline: self.deadline })
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::{
        sys::signal::{Signal, killpg},
        unistd::Pid,
    };

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::debug!(pid, error = %err, "process group kill failed");
    }
}

// Only the direct child is killed here; see DESIGN.md.
#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn read_limited<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(limit.min(8192));
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if out.len() < limit {
                    let remaining = limit - out.len();
                    out.extend_from_slice(&chunk[..remaining.min(n)]);
                }
            }
            Err(_) => break,
        }
    }
    out
}
