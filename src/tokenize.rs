//! Quoting-aware splitting of a single pipeline segment.
//!
//! This is intentionally not a shell grammar: the segment is split on double
//! quotes, quoted spans survive as one token (quotes included), and spans
//! that abut without whitespace are re-attached so `--flag="a b"` stays one
//! token. An opening `(` is isolated as its own token so the dry-run
//! transform can step inside grouped sub-expressions.

/// A tokenized pipeline segment: the executable followed by its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokens {
    pub executable: String,
    pub args: Vec<String>,
}

impl Tokens {
    /// Flattens back into a plain token list (executable first).
    pub fn into_vec(self) -> Vec<String> {
        if self.executable.is_empty() && self.args.is_empty() {
            return Vec::new();
        }
        let mut tokens = Vec::with_capacity(1 + self.args.len());
        tokens.push(self.executable);
        tokens.extend(self.args);
        tokens
    }

    fn from_vec(mut tokens: Vec<String>) -> Self {
        if tokens.is_empty() {
            return Tokens {
                executable: String::new(),
                args: Vec::new(),
            };
        }
        let executable = tokens.remove(0);
        Tokens {
            executable,
            args: tokens,
        }
    }
}

/// Splits one (non-piped) segment into an executable and arguments.
///
/// Alternates between outside-quote spans (split on single spaces) and
/// inside-quote spans (kept whole, re-wrapped in literal quotes). Empty
/// tokens are dropped.
pub fn tokenize(segment: &str) -> Tokens {
    let mut tokens: Vec<String> = Vec::new();
    // True while the last token abuts the next span with no space between.
    let mut glued = false;

    for (idx, span) in segment.split('"').enumerate() {
        if idx % 2 == 1 {
            let quoted = format!("\"{}\"", span);
            if glued {
                if let Some(last) = tokens.last_mut() {
                    last.push_str(&quoted);
                } else {
                    tokens.push(quoted);
                }
            } else {
                tokens.push(quoted);
            }
            glued = true;
            continue;
        }

        if span.is_empty() {
            // Nothing between two quoted spans: adjacency holds.
            continue;
        }

        let mut pieces = span.split(' ');
        if let Some(first) = pieces.next() {
            if first.is_empty() {
                glued = false;
            } else if glued {
                if let Some(last) = tokens.last_mut() {
                    last.push_str(first);
                } else {
                    tokens.push(first.to_string());
                }
            } else {
                tokens.push(first.to_string());
            }
        }
        for piece in pieces {
            if !piece.is_empty() {
                tokens.push(piece.to_string());
            }
        }
        glued = !span.ends_with(' ');
    }

    Tokens::from_vec(split_group_openers(tokens))
}

// `(cmd` becomes `(` + `cmd` so grouped sub-expressions stay addressable.
fn split_group_openers(tokens: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    for token in tokens {
        if token.len() > 1 && token.starts_with('(') {
            out.push("(".to_string());
            out.push(token[1..].to_string());
        } else {
            out.push(token);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_plain_segment() {
        let tokens = tokenize("git checkout main");
        assert_eq!(tokens.executable, "git");
        assert_eq!(tokens.args, vec!["checkout", "main"]);
    }

    #[test]
    fn keeps_quoted_spans_whole() {
        let tokens = tokenize("foo --bar=\"a b\" \"c d\"");
        assert_eq!(tokens.executable, "foo");
        assert_eq!(tokens.args, vec!["--bar=\"a b\"", "\"c d\""]);
    }

    #[test]
    fn glues_text_after_a_closing_quote() {
        let tokens = tokenize("echo \"a b\"tail");
        assert_eq!(tokens.args, vec!["\"a b\"tail"]);
    }

    #[test]
    fn adjacent_quoted_spans_stay_one_token() {
        let tokens = tokenize("echo \"a\"\"b\"");
        assert_eq!(tokens.args, vec!["\"a\"\"b\""]);
    }

    #[test]
    fn drops_empty_tokens() {
        let tokens = tokenize("  ls   -la  ");
        assert_eq!(tokens.executable, "ls");
        assert_eq!(tokens.args, vec!["-la"]);
    }

    #[test]
    fn isolates_group_opener() {
        let tokens = tokenize("(cd /tmp && ls)");
        assert_eq!(tokens.executable, "(");
        assert_eq!(tokens.args, vec!["cd", "/tmp", "&&", "ls)"]);
    }

    #[test]
    fn empty_segment_has_no_tokens() {
        let tokens = tokenize("");
        assert_eq!(tokens.executable, "");
        assert!(tokens.args.is_empty());
        assert!(tokens.into_vec().is_empty());
    }

    #[test]
    fn round_trips_through_vec() {
        let tokens = tokenize("grep -n \"fn main\" src");
        let rejoined = tokens.into_vec().join(" ");
        assert_eq!(rejoined, "grep -n \"fn main\" src");
    }
}
