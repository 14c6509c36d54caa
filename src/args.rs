//! Separation of framework-reserved flags from alias runtime arguments.
//!
//! Reserved flags carry the `--al-` prefix, are stripped before template
//! substitution, and never reach the expanded command. Everything else is a
//! positional argument destined for placeholder substitution.

use std::collections::BTreeMap;

/// Prefix marking a flag as belonging to aliasrack rather than the alias.
pub const RESERVED_PREFIX: &str = "--al-";

/// The reserved flag injected into nested alias invocations during dry runs.
pub const DRY_RUN_FLAG: &str = "--al-dryrun";

/// Output-capture behavior for the final pipeline segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnOutput {
    /// Stream to the real stdout.
    #[default]
    Off,
    /// Accumulate the final segment's stdout into a string.
    Capture,
    /// Capture, with a numeric mode carried opaquely for downstream
    /// interpretation. The engine only treats this as "truthy".
    Mode(i64),
}

impl ReturnOutput {
    pub fn is_on(&self) -> bool {
        !matches!(self, ReturnOutput::Off)
    }
}

/// Behavior toggles recognized by the expansion and execution engine.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Verbose per-segment tracing.
    pub debug: bool,
    /// Simulate the pipeline through no-op prints instead of running it.
    pub dryrun: bool,
    /// Capture the final segment's stdout instead of inheriting it.
    pub return_output: ReturnOutput,
    /// Reserved flags this engine does not interpret, stripped but recorded.
    pub extras: BTreeMap<String, bool>,
}

impl RunConfig {
    /// Configuration for a fallback sub-command: output capture is forced
    /// on, everything else (including `debug`/`dryrun`) is preserved.
    pub fn for_fallback(&self) -> RunConfig {
        let mut config = self.clone();
        if !config.return_output.is_on() {
            config.return_output = ReturnOutput::Capture;
        }
        config
    }
}

/// Partitions raw invocation arguments into substitution arguments and the
/// derived [`RunConfig`].
///
/// Positional arguments containing whitespace are wrapped in double quotes
/// so they survive substitution as one token.
pub fn preprocess(raw: &[String]) -> (Vec<String>, RunConfig) {
    let mut config = RunConfig::default();
    let mut args = Vec::with_capacity(raw.len());
    for arg in raw {
        match arg.strip_prefix(RESERVED_PREFIX) {
            Some(name) if !name.is_empty() => apply_reserved(name, &mut config),
            _ => args.push(quote_if_spaced(arg)),
        }
    }
    (args, config)
}

// First occurrence wins for every recognized option.
fn apply_reserved(name: &str, config: &mut RunConfig) {
    let (name, value) = match name.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (name, None),
    };
    match name {
        "debug" => config.debug = true,
        "dryrun" => config.dryrun = true,
        "return-output" => {
            if config.return_output.is_on() {
                return;
            }
            config.return_output = match value.and_then(|v| v.parse::<i64>().ok()) {
                Some(mode) => ReturnOutput::Mode(mode),
                None => ReturnOutput::Capture,
            };
        }
        other => {
            config.extras.entry(other.to_string()).or_insert(true);
        }
    }
}

fn quote_if_spaced(arg: &str) -> String {
    if arg.chars().any(char::is_whitespace) {
        format!("\"{}\"", arg)
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strips_reserved_flags() {
        let (args, config) = preprocess(&owned(&["foo", "--al-debug", "bar"]));
        assert_eq!(args, vec!["foo", "bar"]);
        assert!(config.debug);
        assert!(!config.dryrun);
    }

    #[test]
    fn quotes_whitespace_arguments() {
        let (args, _) = preprocess(&owned(&["a", "b c"]));
        assert_eq!(args, vec!["a", "\"b c\""]);
    }

    #[test]
    fn return_output_accepts_numeric_mode() {
        let (_, config) = preprocess(&owned(&["--al-return-output=2"]));
        assert_eq!(config.return_output, ReturnOutput::Mode(2));
        assert!(config.return_output.is_on());
    }

    #[test]
    fn first_occurrence_wins() {
        let (_, config) = preprocess(&owned(&[
            "--al-return-output=2",
            "--al-return-output",
        ]));
        assert_eq!(config.return_output, ReturnOutput::Mode(2));
    }

    #[test]
    fn unknown_reserved_flags_land_in_extras() {
        let (args, config) = preprocess(&owned(&["--al-suppress-banner", "x"]));
        assert_eq!(args, vec!["x"]);
        assert_eq!(config.extras.get("suppress-banner"), Some(&true));
    }

    #[test]
    fn bare_prefix_is_a_positional_argument() {
        let (args, config) = preprocess(&owned(&["--al-"]));
        assert_eq!(args, vec!["--al-"]);
        assert!(config.extras.is_empty());
    }

    #[test]
    fn fallback_config_forces_capture_but_keeps_mode() {
        let base = RunConfig {
            dryrun: true,
            ..RunConfig::default()
        };
        let sub = base.for_fallback();
        assert!(sub.dryrun);
        assert_eq!(sub.return_output, ReturnOutput::Capture);

        let moded = RunConfig {
            return_output: ReturnOutput::Mode(7),
            ..RunConfig::default()
        };
        assert_eq!(moded.for_fallback().return_output, ReturnOutput::Mode(7));
    }
}
