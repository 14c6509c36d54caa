//! Pipeline execution: pipe splitting, dry-run transformation, and
//! per-segment process spawning with chained stdio.
//!
//! An expanded command is split on the textual ` | ` sequence, each segment
//! is tokenized and spawned through the platform shell, and stdout of each
//! segment feeds the stdin of the next. The whole run settles as a race:
//! the first failing segment rejects immediately; otherwise success waits
//! only for the final segment.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

use log::debug;
use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinSet;

use crate::args::{RunConfig, DRY_RUN_FLAG};
use crate::template::FallbackRunner;
use crate::tokenize::tokenize;

const NO_OP: &str = "echo";

/// Name lookup used by the dry-run transform to recognize nested alias
/// invocations. Implemented by the alias table and injected here so the
/// runner stays decoupled from it.
pub trait AliasLookup: Send + Sync {
    fn is_alias(&self, name: &str) -> bool;
}

/// Rejection values for a pipeline run.
///
/// These propagate verbatim: a spawn failure carries the underlying OS
/// error, a non-zero exit carries the code, a signal death carries the
/// signal description.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Spawn(#[from] std::io::Error),
    #[error("{0}")]
    Exit(i32),
    #[error("{0}")]
    Signal(String),
}

fn pipe_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s\|\s").expect("static pipe pattern"))
}

/// Splits an expanded command on whitespace-pipe-whitespace.
///
/// This is a textual split: a `|` inside quotes is not protected.
pub fn split_pipeline(expanded: &str) -> Vec<&str> {
    pipe_pattern().split(expanded).collect()
}

// Rewrites segment tokens so a dry run prints the command instead of
// running it. The no-op goes at the segment start and after each standalone
// `&&`/`||`, stepping over `(` so grouped sub-expressions stay valid shell.
// A recognized alias instead gets the reserved dry-run flag injected after
// it, propagating the simulation one level deeper.
fn apply_dry_run(tokens: &mut Vec<String>, aliases: &dyn AliasLookup) {
    let mut points = vec![0usize];
    for (i, token) in tokens.iter().enumerate() {
        if token == "&&" || token == "||" {
            points.push(i + 1);
        }
    }
    // Back to front so earlier insertion points stay valid.
    for point in points.into_iter().rev() {
        let mut at = point;
        while tokens.get(at).map(|t| t == "(").unwrap_or(false) {
            at += 1;
        }
        match tokens.get(at) {
            Some(next) if next == NO_OP => {}
            Some(next) if aliases.is_alias(next) => {
                tokens.insert(at + 1, DRY_RUN_FLAG.to_string());
            }
            _ => tokens.insert(at, NO_OP.to_string()),
        }
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

/// Runs a fully expanded command as a pipeline.
///
/// Segments are spawned in order and wired stdout-to-stdin as they are
/// created; the first segment inherits stdin, stderr always inherits. With
/// `return_output` on, the final segment's stdout is accumulated and
/// returned; otherwise the result is an empty string.
///
/// Resolves once the final segment exits 0. Rejects the first time any
/// segment fails to spawn, exits non-zero, or dies to a signal; sibling
/// segments are left running and never killed.
pub async fn spawn_pipeline(
    expanded: &str,
    config: &RunConfig,
    aliases: &dyn AliasLookup,
) -> Result<String, PipelineError> {
    let mut segments: Vec<Vec<String>> = split_pipeline(expanded)
        .into_iter()
        .map(|segment| tokenize(segment).into_vec())
        .collect();
    if config.dryrun {
        for tokens in &mut segments {
            apply_dry_run(tokens, aliases);
        }
    }

    let last = segments.len() - 1;
    let capture = config.return_output.is_on();

    let mut children = Vec::with_capacity(segments.len());
    let mut prev_stdout: Option<ChildStdout> = None;
    for (ordinal, tokens) in segments.iter().enumerate() {
        let pipe_out = ordinal < last || capture;
        let mut command = shell_command(&tokens.join(" "));
        let piped_in = prev_stdout.is_some();
        match prev_stdout.take() {
            Some(out) => {
                let stdio: Stdio = out.try_into()?;
                command.stdin(stdio);
            }
            None => {
                command.stdin(Stdio::inherit());
            }
        }
        command.stdout(if pipe_out {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        command.stderr(Stdio::inherit());

        debug!(
            "segment {}: exe={} args={:?} stdin={} stdout={}",
            ordinal,
            tokens.first().map(String::as_str).unwrap_or(""),
            tokens.get(1..).unwrap_or(&[]),
            if piped_in { "piped" } else { "inherit" },
            if pipe_out { "piped" } else { "inherit" },
        );

        let mut child = command.spawn()?;
        if pipe_out {
            prev_stdout = child.stdout.take();
        }
        children.push(child);
    }

    // With capture on, `prev_stdout` still holds the final segment's stdout.
    let collector = prev_stdout.take().map(|mut out| {
        tokio::spawn(async move {
            let mut buffer = String::new();
            out.read_to_string(&mut buffer).await.map(|_| buffer)
        })
    });

    let mut waits: JoinSet<(usize, std::io::Result<std::process::ExitStatus>)> = JoinSet::new();
    for (ordinal, mut child) in children.into_iter().enumerate() {
        waits.spawn(async move { (ordinal, child.wait().await) });
    }

    let mut finished_last = false;
    while let Some(joined) = waits.join_next().await {
        let (ordinal, waited) =
            joined.map_err(|err| PipelineError::Spawn(std::io::Error::other(err)))?;
        let status = waited?;
        if !status.success() {
            return Err(exit_error(status));
        }
        if ordinal == last {
            finished_last = true;
            break;
        }
    }
    // Leave any still-running earlier segments to finish on their own.
    waits.detach_all();

    if !finished_last {
        return Err(PipelineError::Spawn(std::io::Error::other(
            "pipeline settled without the final segment's status",
        )));
    }

    match collector {
        Some(task) => match task.await {
            Ok(collected) => Ok(collected?),
            Err(err) => Err(PipelineError::Spawn(std::io::Error::other(err))),
        },
        None => Ok(String::new()),
    }
}

fn exit_error(status: std::process::ExitStatus) -> PipelineError {
    match status.code() {
        Some(code) => PipelineError::Exit(code),
        None => PipelineError::Signal(signal_description(&status)),
    }
}

#[cfg(unix)]
fn signal_description(status: &std::process::ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(1) => "SIGHUP".to_string(),
        Some(2) => "SIGINT".to_string(),
        Some(6) => "SIGABRT".to_string(),
        Some(9) => "SIGKILL".to_string(),
        Some(13) => "SIGPIPE".to_string(),
        Some(15) => "SIGTERM".to_string(),
        Some(n) => format!("signal {}", n),
        None => "killed by signal".to_string(),
    }
}

#[cfg(not(unix))]
fn signal_description(_status: &std::process::ExitStatus) -> String {
    "terminated abnormally".to_string()
}

/// Process-runner-backed fallback execution for the template expander.
pub struct ShellFallback {
    aliases: Arc<dyn AliasLookup>,
}

impl ShellFallback {
    pub fn new(aliases: Arc<dyn AliasLookup>) -> Self {
        Self { aliases }
    }
}

impl FallbackRunner for ShellFallback {
    fn run(
        &self,
        command: String,
        config: RunConfig,
    ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>> {
        let aliases = Arc::clone(&self.aliases);
        Box::pin(async move { spawn_pipeline(&command, &config, aliases.as_ref()).await })
    }
}
