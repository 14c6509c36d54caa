//! Command template parsing and expansion.
//!
//! A template is scanned into a flat node sequence (literals and
//! placeholders) in one pass, then substituted in a second pass. Fallback
//! sub-commands run through the process runner: identical fallback text
//! executes once per expansion call and distinct fallbacks run concurrently.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use log::debug;
use tokio::task::JoinSet;

use crate::args::RunConfig;
use crate::pipeline::PipelineError;

/// How a placeholder selects runtime arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Select {
    /// `$*` / `${*}`: every argument, space-joined.
    All,
    /// `$n` / `${n}`: the nth argument, 1-based.
    Index(usize),
    /// `$n*` / `${n*}`: arguments from n onward, space-joined.
    From(usize),
    /// `$0` / `${0}`: parses, but never binds to an argument.
    Zero,
}

/// Applied when a placeholder has no bound value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Substituted verbatim.
    Literal(String),
    /// A nested command template; its trimmed output is substituted.
    Command(String),
}

/// One unit of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Literal(String),
    Placeholder {
        select: Select,
        fallback: Option<Fallback>,
    },
}

/// Executes a fallback sub-command on behalf of the expander.
///
/// The process runner provides the real implementation; tests substitute
/// recording stubs.
pub trait FallbackRunner: Send + Sync {
    fn run(
        &self,
        command: String,
        config: RunConfig,
    ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>>;
}

/// Scans a template into literal and placeholder nodes.
///
/// Anything that does not match the placeholder grammar stays literal text,
/// including the deliberate `$0*` / `${0*}` gap and unclosed `${`.
pub fn parse(template: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let bytes = template.as_bytes();
    let mut lit_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            if let Some((node, len)) = match_placeholder(&template[i..]) {
                if lit_start < i {
                    nodes.push(Node::Literal(template[lit_start..i].to_string()));
                }
                nodes.push(node);
                i += len;
                lit_start = i;
                continue;
            }
        }
        i += 1;
    }
    if lit_start < bytes.len() {
        nodes.push(Node::Literal(template[lit_start..].to_string()));
    }
    nodes
}

// `s` starts with '$'. Returns the parsed node and the matched length.
fn match_placeholder(s: &str) -> Option<(Node, usize)> {
    let rest = &s[1..];
    if rest.starts_with('{') {
        let close = find_brace_close(rest)?;
        let node = parse_braced(&rest[1..close])?;
        return Some((node, 1 + close + 1));
    }
    if rest.starts_with('*') {
        return Some((
            Node::Placeholder {
                select: Select::All,
                fallback: None,
            },
            2,
        ));
    }
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let n: usize = rest[..digits].parse().ok()?;
    let starred = rest[digits..].starts_with('*');
    let select = match (n, starred) {
        // `$0*` is not a placeholder; it passes through unchanged.
        (0, true) => return None,
        (0, false) => Select::Zero,
        (_, true) => Select::From(n),
        (_, false) => Select::Index(n),
    };
    let len = 1 + digits + usize::from(starred);
    Some((
        Node::Placeholder {
            select,
            fallback: None,
        },
        len,
    ))
}

// `rest` starts with '{'. Returns the index of the matching '}', skipping
// any '}' inside a backticked fallback command.
fn find_brace_close(rest: &str) -> Option<usize> {
    let mut in_backticks = false;
    for (i, b) in rest.bytes().enumerate().skip(1) {
        match b {
            b'`' => in_backticks = !in_backticks,
            b'}' if !in_backticks => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_braced(body: &str) -> Option<Node> {
    let (head, fallback) = split_fallback(body);
    let select = if head == "*" {
        Select::All
    } else if let Some(digits) = head.strip_suffix('*') {
        let n = parse_index(digits)?;
        if n == 0 {
            // `${0*}` mirrors the bare-form gap.
            return None;
        }
        Select::From(n)
    } else {
        match parse_index(head)? {
            0 => Select::Zero,
            n => Select::Index(n),
        }
    };
    let fallback = fallback.map(|text| {
        if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
            Fallback::Command(text[1..text.len() - 1].to_string())
        } else {
            Fallback::Literal(text.to_string())
        }
    });
    Some(Node::Placeholder { select, fallback })
}

fn parse_index(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// Splits `n:fallback` at the first ':' outside backticks.
fn split_fallback(body: &str) -> (&str, Option<&str>) {
    let mut in_backticks = false;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'`' => in_backticks = !in_backticks,
            b':' if !in_backticks => return (&body[..i], Some(&body[i + 1..])),
            _ => {}
        }
    }
    (body, None)
}

// A bound value that is empty counts as absent: fallbacks still apply.
fn bind(select: Select, args: &[String]) -> Option<String> {
    let value = match select {
        Select::All => args.join(" "),
        Select::Index(n) => args.get(n - 1).cloned().unwrap_or_default(),
        Select::From(n) => {
            if n - 1 < args.len() {
                args[n - 1..].join(" ")
            } else {
                String::new()
            }
        }
        Select::Zero => String::new(),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

enum Slot {
    Text(String),
    /// A fallback sub-command awaiting execution, keyed by its expanded text.
    Pending(String),
}

/// Expands a template against runtime arguments.
///
/// Fallback sub-commands may reference the same runtime arguments and are
/// expanded recursively before execution. Each distinct fallback command
/// executes exactly once per call; its result is shared by every occurrence.
/// Any failed fallback rejects the whole expansion.
pub async fn expand(
    template: &str,
    args: &[String],
    config: &RunConfig,
    runner: &Arc<dyn FallbackRunner>,
) -> Result<String, PipelineError> {
    expand_boxed(
        template.to_string(),
        Arc::new(args.to_vec()),
        config.clone(),
        Arc::clone(runner),
    )
    .await
}

fn expand_boxed(
    template: String,
    args: Arc<Vec<String>>,
    config: RunConfig,
    runner: Arc<dyn FallbackRunner>,
) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>> {
    Box::pin(async move {
        let mut slots = Vec::new();
        for node in parse(&template) {
            match node {
                Node::Literal(text) => slots.push(Slot::Text(text)),
                Node::Placeholder { select, fallback } => {
                    if let Some(value) = bind(select, &args) {
                        slots.push(Slot::Text(value));
                        continue;
                    }
                    match fallback {
                        None => slots.push(Slot::Text(String::new())),
                        Some(Fallback::Literal(text)) => slots.push(Slot::Text(text)),
                        Some(Fallback::Command(command)) => {
                            // The fallback command may itself reference the
                            // runtime arguments.
                            let expanded = expand_boxed(
                                command,
                                Arc::clone(&args),
                                config.clone(),
                                Arc::clone(&runner),
                            )
                            .await?;
                            slots.push(Slot::Pending(expanded));
                        }
                    }
                }
            }
        }

        let results = run_fallbacks(&slots, &config, &runner).await?;

        let mut out = String::new();
        for slot in slots {
            match slot {
                Slot::Text(text) => out.push_str(&text),
                Slot::Pending(command) => {
                    let value = results.get(&command).cloned().unwrap_or_default();
                    if config.dryrun {
                        out.push_str("{{");
                        out.push_str(&value.replace(' ', "_"));
                        out.push_str("}}");
                    } else {
                        out.push_str(&value);
                    }
                }
            }
        }
        Ok(out)
    })
}

// Runs each distinct pending fallback command once, concurrently. All
// in-flight executions are drained before the first error is returned.
async fn run_fallbacks(
    slots: &[Slot],
    config: &RunConfig,
    runner: &Arc<dyn FallbackRunner>,
) -> Result<HashMap<String, String>, PipelineError> {
    let mut spawned: HashSet<String> = HashSet::new();
    let mut set: JoinSet<(String, Result<String, PipelineError>)> = JoinSet::new();
    for slot in slots {
        if let Slot::Pending(command) = slot {
            if spawned.insert(command.clone()) {
                let runner = Arc::clone(runner);
                let sub = config.for_fallback();
                let command = command.clone();
                set.spawn(async move {
                    let result = runner.run(command.clone(), sub).await;
                    (command, result)
                });
            }
        }
    }

    let mut results = HashMap::new();
    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((command, Ok(output))) => {
                let trimmed = output.trim().to_string();
                debug!("fallback `{}` resolved to `{}`", command, trimmed);
                results.insert(command, trimmed);
            }
            Ok((command, Err(err))) => {
                debug!("fallback `{}` failed: {}", command, err);
                first_err.get_or_insert(err);
            }
            Err(join_err) => {
                first_err.get_or_insert(PipelineError::Spawn(std::io::Error::other(join_err)));
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{preprocess, ReturnOutput};
    use std::sync::Mutex;

    struct Recorder {
        calls: Mutex<Vec<(String, RunConfig)>>,
        reply: String,
    }

    impl Recorder {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Recorder {
                calls: Mutex::new(Vec::new()),
                reply: reply.to_string(),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
        }
    }

    impl FallbackRunner for Recorder {
        fn run(
            &self,
            command: String,
            config: RunConfig,
        ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>> {
            self.calls.lock().unwrap().push((command, config));
            let reply: Result<String, PipelineError> = Ok(self.reply.clone());
            Box::pin(std::future::ready(reply))
        }
    }

    fn runner_of(recorder: &Arc<Recorder>) -> Arc<dyn FallbackRunner> {
        recorder.clone()
    }

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_each_placeholder_kind() {
        assert_eq!(
            parse("$* ${*} $2 ${3} $2* ${4*} $0 ${0}"),
            vec![
                Node::Placeholder { select: Select::All, fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::All, fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::Index(2), fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::Index(3), fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::From(2), fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::From(4), fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::Zero, fallback: None },
                Node::Literal(" ".into()),
                Node::Placeholder { select: Select::Zero, fallback: None },
            ]
        );
    }

    #[test]
    fn zero_star_is_not_a_placeholder() {
        assert_eq!(parse("$0*"), vec![Node::Literal("$0*".into())]);
        assert_eq!(parse("${0*}"), vec![Node::Literal("${0*}".into())]);
        assert_eq!(parse("a ${0*:x} b"), vec![Node::Literal("a ${0*:x} b".into())]);
    }

    #[test]
    fn matches_without_word_boundaries() {
        assert_eq!(
            parse("foo$1bar"),
            vec![
                Node::Literal("foo".into()),
                Node::Placeholder { select: Select::Index(1), fallback: None },
                Node::Literal("bar".into()),
            ]
        );
    }

    #[test]
    fn parses_fallbacks() {
        assert_eq!(
            parse("${1:def}"),
            vec![Node::Placeholder {
                select: Select::Index(1),
                fallback: Some(Fallback::Literal("def".into())),
            }]
        );
        assert_eq!(
            parse("${2:`git branch`}"),
            vec![Node::Placeholder {
                select: Select::Index(2),
                fallback: Some(Fallback::Command("git branch".into())),
            }]
        );
    }

    #[test]
    fn unclosed_brace_stays_literal() {
        assert_eq!(parse("x ${1"), vec![Node::Literal("x ${1".into())]);
        assert_eq!(parse("${name}"), vec![Node::Literal("${name}".into())]);
    }

    #[tokio::test]
    async fn returns_templates_without_placeholders_unchanged() {
        let recorder = Recorder::replying("");
        let out = expand("git status", &[], &RunConfig::default(), &runner_of(&recorder))
            .await
            .unwrap();
        assert_eq!(out, "git status");
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn joins_all_args_with_preprocessor_quoting() {
        let recorder = Recorder::replying("");
        let (args, config) = preprocess(&owned(&["a", "b c"]));
        let out = expand("echo $* end", &args, &config, &runner_of(&recorder))
            .await
            .unwrap();
        assert_eq!(out, "echo a \"b c\" end");
    }

    #[tokio::test]
    async fn literal_fallback_applies_only_when_unbound() {
        let recorder = Recorder::replying("");
        let runner = runner_of(&recorder);
        let config = RunConfig::default();
        let out = expand("x ${1:def}", &[], &config, &runner).await.unwrap();
        assert_eq!(out, "x def");
        let out = expand("x ${1:def}", &owned(&["val"]), &config, &runner)
            .await
            .unwrap();
        assert_eq!(out, "x val");
    }

    #[tokio::test]
    async fn zero_index_never_binds() {
        let recorder = Recorder::replying("");
        let out = expand(
            "x $0 $1",
            &owned(&["only"]),
            &RunConfig::default(),
            &runner_of(&recorder),
        )
        .await
        .unwrap();
        assert_eq!(out, "x  only");
    }

    #[tokio::test]
    async fn spread_from_joins_the_tail() {
        let recorder = Recorder::replying("");
        let out = expand(
            "take $2*",
            &owned(&["a", "b", "c"]),
            &RunConfig::default(),
            &runner_of(&recorder),
        )
        .await
        .unwrap();
        assert_eq!(out, "take b c");
    }

    #[tokio::test]
    async fn identical_fallback_commands_execute_once() {
        let recorder = Recorder::replying("main\n");
        let out = expand(
            "diff ${3:`git branch --show-current`}..${3:`git branch --show-current`}",
            &[],
            &RunConfig::default(),
            &runner_of(&recorder),
        )
        .await
        .unwrap();
        assert_eq!(out, "diff main..main");
        assert_eq!(recorder.calls().len(), 1);
    }

    #[tokio::test]
    async fn fallback_commands_see_the_runtime_args() {
        let recorder = Recorder::replying("ok");
        let recorder_runner = runner_of(&recorder);
        let out = expand(
            "x ${3:`probe $1`}",
            &owned(&["alpha"]),
            &RunConfig::default(),
            &recorder_runner,
        )
        .await
        .unwrap();
        assert_eq!(out, "x ok");
        assert_eq!(recorder.calls(), vec!["probe alpha"]);
    }

    #[tokio::test]
    async fn fallback_runs_force_capture() {
        let recorder = Recorder::replying("v");
        expand(
            "x ${1:`cmd`}",
            &[],
            &RunConfig::default(),
            &runner_of(&recorder),
        )
        .await
        .unwrap();
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].1.return_output, ReturnOutput::Capture);
    }

    #[tokio::test]
    async fn dry_run_marks_resolved_fallbacks() {
        let recorder = Recorder::replying("feature branch\n");
        let config = RunConfig {
            dryrun: true,
            ..RunConfig::default()
        };
        let out = expand("co ${1:`git pick`}", &[], &config, &runner_of(&recorder))
            .await
            .unwrap();
        assert_eq!(out, "co {{feature_branch}}");
    }

    #[tokio::test]
    async fn failed_fallback_rejects_the_expansion() {
        struct Failing;
        impl FallbackRunner for Failing {
            fn run(
                &self,
                _command: String,
                _config: RunConfig,
            ) -> Pin<Box<dyn Future<Output = Result<String, PipelineError>> + Send>>
            {
                let result: Result<String, PipelineError> = Err(PipelineError::Exit(3));
                Box::pin(std::future::ready(result))
            }
        }
        let runner: Arc<dyn FallbackRunner> = Arc::new(Failing);
        let err = expand("x ${1:`boom`}", &[], &RunConfig::default(), &runner)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Exit(3)));
    }
}
