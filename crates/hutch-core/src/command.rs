//! Subprocess invocation as explicit values.
//!
//! Archive and build tools (`tar`, `make`, `configure`) run through one
//! `CommandRunner` seam so tests can substitute a scripted runner.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One subprocess invocation, fully described up front.
#[derive(Debug, Clone)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            workdir: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("`{program}` not found on PATH")]
    NotFound { program: String },

    #[error("`{program}` exited with status {status}: {stderr}")]
    Failed {
        program: String,
        status: i32,
        stderr: String,
    },

    #[error("`{program}` timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("failed to run `{program}`: {source}")]
    Io { program: String, source: io::Error },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion, capturing output. A non-zero exit
    /// status is an error.
    async fn run(&self, cmd: &Command) -> Result<CommandOutput, CommandError>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioRunner;

#[async_trait]
impl CommandRunner for TokioRunner {
    async fn run(&self, cmd: &Command) -> Result<CommandOutput, CommandError> {
        let mut proc = tokio::process::Command::new(&cmd.program);
        proc.args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.workdir {
            proc.current_dir(dir);
        }
        for (key, value) in &cmd.env {
            proc.env(key, value);
        }

        let fut = proc.output();
        let output = match cmd.timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| CommandError::TimedOut {
                    program: cmd.program.clone(),
                    timeout,
                })?,
            None => fut.await,
        };
        let output = output.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                CommandError::NotFound {
                    program: cmd.program.clone(),
                }
            } else {
                CommandError::Io {
                    program: cmd.program.clone(),
                    source: err,
                }
            }
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(CommandError::Failed {
                program: cmd.program.clone(),
                status: output.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

/// Scripted runner for deterministic tests: records every invocation and
/// replies with queued results in order.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    invocations: Mutex<Vec<Command>>,
    replies: Mutex<Vec<Result<CommandOutput, CommandError>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for the next invocation.
    pub fn push_ok(&self, stdout: &str) {
        self.replies.lock().expect("runner lock").push(Ok(CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
        }));
    }

    /// Queue a failure reply for the next invocation.
    pub fn push_err(&self, err: CommandError) {
        self.replies.lock().expect("runner lock").push(Err(err));
    }

    /// Commands seen so far, oldest first.
    pub fn invocations(&self) -> Vec<Command> {
        self.invocations.lock().expect("runner lock").clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, cmd: &Command) -> Result<CommandOutput, CommandError> {
        self.invocations.lock().expect("runner lock").push(cmd.clone());
        let mut replies = self.replies.lock().expect("runner lock");
        if replies.is_empty() {
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
            })
        } else {
            replies.remove(0)
        }
    }
}
