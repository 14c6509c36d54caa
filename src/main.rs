//! aliasrack: a personal command-line alias manager.
//!
//! An alias binds a short name to a command template. Invoking the alias
//! expands the template against runtime arguments (with literal and
//! command-substitution fallbacks) and runs the result as a process
//! pipeline. Secondary subcommands offer interactive git pickers and a
//! GitHub PR checkout workflow.

mod aliases;
mod args;
mod github;
mod picker;
mod pipeline;
mod template;
mod tokenize;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use log::debug;

use crate::aliases::AliasTable;
use crate::args::preprocess;
use crate::pipeline::{spawn_pipeline, AliasLookup, PipelineError, ShellFallback};
use crate::template::{expand, FallbackRunner};

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "aliasrack",
    version,
    about = "Personal command-line alias manager",
    styles = help_styles(),
    color = clap::ColorChoice::Always,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Path to the alias table (overrides the config-dir lookup).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Alias invocation: <alias> [args...]. Reserved --al-* flags may
    /// appear anywhere among the args.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    invocation: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List all aliases by category.
    List,
    /// Show one alias's template and description.
    Show { alias: String },
    /// Pick a local git branch interactively and print it.
    Branch,
    /// Pick a recent commit interactively and print its hash.
    Commit,
    /// Pick an open GitHub pull request and check out its head branch.
    CheckoutPr,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        // An exit-code rejection becomes this process's exit code; every
        // other failure prints and exits 1.
        if let Some(PipelineError::Exit(code)) = err.downcast_ref::<PipelineError>() {
            eprintln!("aliasrack: command exited with code {}", code);
            std::process::exit(*code);
        }
        eprintln!("aliasrack: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Some(Commands::List) => {
            init_logging(false);
            list(&AliasTable::load(cli.config.as_deref())?);
            Ok(())
        }
        Some(Commands::Show { alias }) => {
            init_logging(false);
            let table = AliasTable::load(cli.config.as_deref())?;
            let Some(alias) = table.resolve(alias) else {
                bail!("unknown alias {:?} (try `aliasrack list`)", alias);
            };
            println!("{} ({})", alias.name, alias.category);
            println!("  template:    {}", alias.template);
            if !alias.description.is_empty() {
                println!("  description: {}", alias.description);
            }
            Ok(())
        }
        Some(Commands::Branch) => {
            init_logging(false);
            let table = AliasTable::load(cli.config.as_deref())?;
            if let Some(branch) = picker::pick_branch(&table).await? {
                println!("{}", branch);
            }
            Ok(())
        }
        Some(Commands::Commit) => {
            init_logging(false);
            let table = AliasTable::load(cli.config.as_deref())?;
            if let Some(hash) = picker::pick_commit(&table).await? {
                println!("{}", hash);
            }
            Ok(())
        }
        Some(Commands::CheckoutPr) => {
            init_logging(false);
            let table = AliasTable::load(cli.config.as_deref())?;
            github::checkout_pr(&table).await
        }
        None => run_alias(&cli).await,
    }
}

async fn run_alias(cli: &Cli) -> Result<()> {
    let Some((name, raw_args)) = cli.invocation.split_first() else {
        bail!("no alias given (try `aliasrack list`)");
    };
    let (runtime_args, config) = preprocess(raw_args);
    init_logging(config.debug);

    let table = Arc::new(AliasTable::load(cli.config.as_deref())?);
    let Some(alias) = table.resolve(name) else {
        bail!("unknown alias {:?} (try `aliasrack list`)", name);
    };
    debug!("alias {} -> {}", alias.name, alias.template);
    let template = alias.template.clone();

    let lookup: Arc<dyn AliasLookup> = table.clone();
    let runner: Arc<dyn FallbackRunner> = Arc::new(ShellFallback::new(lookup));
    let expanded = expand(&template, &runtime_args, &config, &runner).await?;
    debug!("expanded: {}", expanded);

    let output = spawn_pipeline(&expanded, &config, table.as_ref()).await?;
    if config.return_output.is_on() {
        print!("{}", output);
    }
    Ok(())
}

fn list(table: &AliasTable) {
    if table.is_empty() {
        println!("no aliases defined");
        return;
    }
    for (category, aliases) in table.by_category() {
        println!("{}", category);
        for alias in aliases {
            println!("  {:<12} {}", alias.name, alias.description);
        }
    }
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    let _ = builder.try_init();
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}
