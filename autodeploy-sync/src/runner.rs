//! Command runner — the single seam through which every external tool runs.
//!
//! Each invocation is logged before it returns (`Running: …`, then
//! `Output: …` when stdout is non-empty). With `must_succeed` a non-zero exit
//! becomes [`CommandError::Exit`]; without it the captured output is returned
//! whatever the exit status, and the caller decides what a failure means.
//! There is no retry logic here.

use std::fmt;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::CommandError;

/// A command line to execute: program, arguments and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Build from an argv-style vector, e.g. a configured `build_command`.
    /// Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Build a git invocation with interactive prompts disabled, so a missing
/// credential fails the command instead of hanging the agent.
pub fn git_command<I, S>(args: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new("git", args).env("GIT_TERMINAL_PROMPT", "0")
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Trimmed stdout, the usual shape for single-value git queries.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        }
    }
}

/// Executes external commands. Implemented by [`SystemRunner`] in production
/// and by a scripted fake in tests.
pub trait CommandRunner {
    fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        must_succeed: bool,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as real child processes, blocking until they exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        must_succeed: bool,
    ) -> Result<CommandOutput, CommandError> {
        tracing::info!("Running: {command}");

        let output = Command::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            });

        let output = match output {
            Ok(output) => CommandOutput::from(output),
            Err(err) => {
                if must_succeed {
                    tracing::error!("Command failed: {err}");
                } else {
                    tracing::warn!("Command failed: {err}");
                }
                return Err(err);
            }
        };

        if !output.stdout_trimmed().is_empty() {
            tracing::info!("Output: {}", output.stdout_trimmed());
        }

        if must_succeed && !output.success() {
            let err = CommandError::Exit {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.clone(),
            };
            tracing::error!("Command failed: {command}");
            tracing::error!("Error output: {}", output.stderr.trim());
            return Err(err);
        }

        Ok(output)
    }
}
