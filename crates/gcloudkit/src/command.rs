//! SDK command invocations and the runners that execute them.
//!
//! Every provider call is expressed as an [`Invocation`] first and handed
//! to a [`CommandRunner`]. Keeping the command as data is what makes dry
//! runs and recorded test runs possible.

use crate::error::{Error, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Mutex;

/// A single SDK command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Executable (`gcloud`, `gsutil` or `bq`)
    pub program: String,
    /// Arguments, unquoted
    pub args: Vec<String>,
    /// Data piped to stdin; never shown in previews
    pub stdin: Option<String>,
    /// Whether this command changes provider state
    pub mutating: bool,
}

impl Invocation {
    /// A read-only command.
    pub fn read<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            mutating: false,
        }
    }

    /// A state-changing command.
    pub fn mutate<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mutating: true,
            ..Self::read(program, args)
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Pipe `data` to the command's stdin.
    pub fn with_stdin(mut self, data: impl Into<String>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    /// Command line as a shell would display it.
    pub fn command_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote an argument for display when it contains shell metacharacters.
fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+')
        });
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }

    /// Everything the command reported, stderr first.
    ///
    /// `bq` prints its errors on stdout, so failures are classified from
    /// both streams.
    pub fn diagnostics(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        match (stderr.is_empty(), stdout.is_empty()) {
            (false, false) => format!("{stderr}\n{stdout}"),
            (false, true) => stderr.to_string(),
            (true, _) => stdout.to_string(),
        }
    }
}

/// Executes invocations.
pub trait CommandRunner: Send + Sync {
    /// Run the command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`CommandOutput::success`].
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runner that spawns real processes.
#[derive(Debug, Default)]
pub struct SystemRunner {
    log_file: Option<PathBuf>,
}

impl SystemRunner {
    /// Create a runner that only captures output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that also appends every command and its output to `path`.
    pub fn logging_to(path: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(path.into()),
        }
    }

    /// Log file in use, if any.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    fn append_log(&self, invocation: &Invocation, output: &CommandOutput) -> Result<()> {
        let Some(path) = &self.log_file else {
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "$ {invocation}")?;
        file.write_all(output.stdout.as_bytes())?;
        file.write_all(output.stderr.as_bytes())?;
        writeln!(
            file,
            "# exit: {}",
            if output.success { "ok" } else { "failed" }
        )?;
        Ok(())
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        log::debug!("exec: {invocation}");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ToolNotFound {
                    tool: invocation.program.clone(),
                }
            } else {
                Error::Io(e)
            }
        })?;

        if let Some(data) = &invocation.stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin.write_all(data.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        let output = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        };

        self.append_log(invocation, &output)?;
        Ok(output)
    }
}

/// Runner that records invocations and replies with scripted output.
///
/// Replies are matched by substring against the displayed command line;
/// the first matching reply wins. Unmatched commands succeed with empty
/// output.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    replies: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl RecordingRunner {
    /// Create a runner with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `output` to commands whose line contains `pattern`.
    pub fn reply(self, pattern: &str, output: CommandOutput) -> Self {
        lock(&self.replies).push((pattern.to_string(), output));
        self
    }

    /// Every invocation seen so far.
    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    /// Only the state-changing invocations.
    pub fn mutating_calls(&self) -> Vec<Invocation> {
        self.calls().into_iter().filter(|i| i.mutating).collect()
    }

    /// Displayed command lines, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        lock(&self.calls).push(invocation.clone());
        let line = invocation.command_line();
        let reply = lock(&self.replies)
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone());
        Ok(reply.unwrap_or_else(|| CommandOutput::ok("")))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_special_args() {
        let inv = Invocation::mutate(
            "gcloud",
            ["scheduler", "jobs", "create", "pubsub", "report2bq-job-monitor"],
        )
        .arg("--schedule=*/5 * * * *");
        assert_eq!(
            inv.command_line(),
            "gcloud scheduler jobs create pubsub report2bq-job-monitor '--schedule=*/5 * * * *'"
        );
    }

    #[test]
    fn test_stdin_not_displayed() {
        let inv = Invocation::mutate("gsutil", ["cp", "-", "gs://p-report2bq-tokens/api.key"])
            .with_stdin("secret-key");
        assert!(!inv.command_line().contains("secret-key"));
    }

    #[test]
    fn test_recording_runner_replies_and_records() {
        let runner = RecordingRunner::new()
            .reply("topics delete", CommandOutput::failed("NOT_FOUND"));

        let deleted = runner
            .run(&Invocation::mutate("gcloud", ["pubsub", "topics", "delete", "t"]))
            .unwrap();
        let listed = runner
            .run(&Invocation::read("gcloud", ["pubsub", "topics", "list"]))
            .unwrap();

        assert!(!deleted.success);
        assert!(listed.success);
        assert_eq!(runner.calls().len(), 2);
        assert_eq!(runner.mutating_calls().len(), 1);
    }

    #[test]
    fn test_system_runner_missing_tool() {
        let runner = SystemRunner::new();
        let err = runner
            .run(&Invocation::read("report2bq-no-such-tool", ["--version"]))
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("report2bq-fetcher.log");
        let runner = SystemRunner::logging_to(&log);

        let output = runner
            .run(&Invocation::read("echo", ["deployed"]))
            .unwrap();

        assert!(output.success);
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("$ echo deployed"));
        assert!(content.contains("# exit: ok"));
    }
}
