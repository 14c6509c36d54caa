//! Interactive list pickers over captured git output.
//!
//! Each picker runs a git command through the pipeline's capture mode,
//! strips ANSI noise, and offers the lines through a minimal inline list
//! prompt (arrows or j/k to move, Enter to accept, Esc/q to cancel).

use std::io::{self, Write};

use anyhow::{Context, Result};
use crossterm::cursor::{Hide, MoveToColumn, MoveUp, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};

use crate::args::{ReturnOutput, RunConfig};
use crate::pipeline::{spawn_pipeline, AliasLookup};

/// Prompts for a local git branch; `Ok(None)` when cancelled.
pub async fn pick_branch(aliases: &dyn AliasLookup) -> Result<Option<String>> {
    let raw = capture(
        "git branch --list --format=\"%(refname:short)\"",
        aliases,
    )
    .await?;
    let branches: Vec<String> = raw
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if branches.is_empty() {
        println!("no local branches");
        return Ok(None);
    }
    println!("pick a branch:");
    Ok(pick_from_list(&branches)?.map(|idx| branches[idx].clone()))
}

/// Prompts for a recent commit and returns its hash; `Ok(None)` when
/// cancelled.
pub async fn pick_commit(aliases: &dyn AliasLookup) -> Result<Option<String>> {
    let raw = capture("git log --oneline -n 30", aliases).await?;
    let commits: Vec<String> = raw
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    if commits.is_empty() {
        println!("no commits");
        return Ok(None);
    }
    println!("pick a commit:");
    let Some(idx) = pick_from_list(&commits)? else {
        return Ok(None);
    };
    Ok(commit_hash(&commits[idx]).map(str::to_string))
}

pub(crate) async fn capture(command: &str, aliases: &dyn AliasLookup) -> Result<String> {
    let config = RunConfig {
        return_output: ReturnOutput::Capture,
        ..RunConfig::default()
    };
    let out = spawn_pipeline(command, &config, aliases)
        .await
        .with_context(|| format!("`{}` failed", command))?;
    Ok(sanitize(&out))
}

fn sanitize(text: &str) -> String {
    String::from_utf8_lossy(&strip_ansi_escapes::strip(text.as_bytes())).to_string()
}

fn commit_hash(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

/// Renders an inline list prompt and returns the chosen index.
///
/// Returns `Ok(None)` when the user cancels; cancellation is not an error.
pub fn pick_from_list(items: &[String]) -> Result<Option<usize>> {
    if items.is_empty() {
        return Ok(None);
    }
    let mut stdout = io::stdout();
    enable_raw_mode().context("failed to enable raw mode")?;
    let result = execute!(stdout, Hide)
        .context("failed to hide cursor")
        .and_then(|_| run_prompt(&mut stdout, items));
    // Restore the terminal regardless of how the prompt ended.
    let _ = execute!(stdout, Show);
    let _ = disable_raw_mode();
    result
}

fn run_prompt(stdout: &mut io::Stdout, items: &[String]) -> Result<Option<usize>> {
    let mut selected = 0usize;
    draw_list(stdout, items, selected)?;
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read().context("failed to read terminal event")?
        else {
            continue;
        };
        match code {
            KeyCode::Up | KeyCode::Char('k') => {
                selected = selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                selected = (selected + 1).min(items.len() - 1);
            }
            KeyCode::Enter => return Ok(Some(selected)),
            KeyCode::Esc | KeyCode::Char('q') => return Ok(None),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(None);
            }
            _ => continue,
        }
        execute!(stdout, MoveUp(items.len() as u16))?;
        draw_list(stdout, items, selected)?;
    }
}

fn draw_list(stdout: &mut io::Stdout, items: &[String], selected: usize) -> Result<()> {
    for (idx, item) in items.iter().enumerate() {
        let marker = if idx == selected { ">" } else { " " };
        execute!(stdout, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        // Raw mode: explicit carriage return.
        write!(stdout, "{} {}\r\n", marker, item)?;
    }
    stdout.flush()?;
    Ok(())
}
