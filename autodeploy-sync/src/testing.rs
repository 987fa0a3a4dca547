//! Deterministic in-memory [`CommandRunner`] for tests.
//!
//! Replies are matched on the rendered command line: the longest registered
//! prefix wins. A rule holding several replies hands them out in order and
//! then keeps repeating the last one. Unmatched commands succeed with empty
//! output. Every call is recorded so tests can assert on exactly which
//! commands ran.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::CommandError;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

type Effect = Box<dyn Fn(&Path) + Send + Sync>;

/// A scripted answer to one command invocation.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    /// Simulate the program not being runnable at all.
    SpawnFailure,
}

impl Reply {
    /// Exit 0 with the given stdout.
    pub fn ok(stdout: &str) -> Self {
        Self::Output(CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    /// Non-zero exit with the given stderr.
    pub fn fail(code: i32, stderr: &str) -> Self {
        Self::Output(CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
        })
    }

    /// Arbitrary exit code with both streams.
    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        Self::Output(CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
        })
    }
}

struct Rule {
    prefix: String,
    replies: VecDeque<Reply>,
    last: Reply,
    effect: Option<Effect>,
}

/// A call the runner received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub command: String,
    pub working_dir: PathBuf,
    pub must_succeed: bool,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `reply`.
    pub fn reply(self, prefix: &str, reply: Reply) -> Self {
        self.replies(prefix, vec![reply])
    }

    /// Answer successive matching commands with `replies` in order.
    pub fn replies(self, prefix: &str, replies: Vec<Reply>) -> Self {
        self.push_rule(prefix, replies, None)
    }

    /// Like [`reply`](Self::reply), and also run `effect` with the working
    /// directory each time the rule matches (e.g. rewrite a file as a pull would).
    pub fn reply_with_effect(
        self,
        prefix: &str,
        reply: Reply,
        effect: impl Fn(&Path) + Send + Sync + 'static,
    ) -> Self {
        self.push_rule(prefix, vec![reply], Some(Box::new(effect)))
    }

    fn push_rule(self, prefix: &str, replies: Vec<Reply>, effect: Option<Effect>) -> Self {
        let mut replies: VecDeque<Reply> = replies.into();
        let last = replies.back().cloned().unwrap_or_else(|| Reply::ok(""));
        if replies.len() == 1 {
            replies.clear();
        }
        self.rules
            .lock()
            .expect("rules mutex poisoned")
            .push(Rule {
                prefix: prefix.to_string(),
                replies,
                last,
                effect,
            });
        self
    }

    /// Snapshot of all calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    /// Rendered command lines received so far.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.command).collect()
    }

    /// Whether any received command starts with `prefix`.
    pub fn ran(&self, prefix: &str) -> bool {
        self.count(prefix) > 0
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        command: &CommandSpec,
        working_dir: &Path,
        must_succeed: bool,
    ) -> Result<CommandOutput, CommandError> {
        let line = command.to_string();
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .push(RecordedCall {
                command: line.clone(),
                working_dir: working_dir.to_path_buf(),
                must_succeed,
            });

        let reply = {
            let mut rules = self.rules.lock().expect("rules mutex poisoned");
            let best = rules
                .iter_mut()
                .filter(|rule| line.starts_with(&rule.prefix))
                .max_by_key(|rule| rule.prefix.len());
            match best {
                Some(rule) => {
                    if let Some(effect) = &rule.effect {
                        effect(working_dir);
                    }
                    rule.replies.pop_front().unwrap_or_else(|| rule.last.clone())
                }
                None => Reply::ok(""),
            }
        };

        match reply {
            Reply::SpawnFailure => Err(CommandError::Spawn {
                command: line,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
            Reply::Output(output) => {
                if must_succeed && !output.success() {
                    return Err(CommandError::Exit {
                        command: line,
                        exit_code: output.exit_code,
                        stderr: output.stderr,
                    });
                }
                Ok(output)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins_and_sequences_repeat_last() {
        let runner = ScriptedRunner::new()
            .reply("git", Reply::ok("generic"))
            .replies("git rev-parse HEAD", vec![Reply::ok("a\n"), Reply::ok("b\n")]);
        let dir = Path::new("/tmp");
        let head = CommandSpec::new("git", ["rev-parse", "HEAD"]);

        assert_eq!(runner.run(&head, dir, true).unwrap().stdout, "a\n");
        assert_eq!(runner.run(&head, dir, true).unwrap().stdout, "b\n");
        assert_eq!(runner.run(&head, dir, true).unwrap().stdout, "b\n");
        let other = CommandSpec::new("git", ["status"]);
        assert_eq!(runner.run(&other, dir, true).unwrap().stdout, "generic");
        assert_eq!(runner.count("git rev-parse HEAD"), 3);
    }

    #[test]
    fn failure_respects_must_succeed() {
        let runner = ScriptedRunner::new().reply("git pull", Reply::fail(1, "boom"));
        let pull = CommandSpec::new("git", ["pull"]);
        let dir = Path::new("/tmp");
        assert_eq!(runner.run(&pull, dir, false).unwrap().exit_code, Some(1));
        assert!(matches!(
            runner.run(&pull, dir, true),
            Err(CommandError::Exit { .. })
        ));
    }
}
