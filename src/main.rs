//! # `planc` — policy query planner CLI
//!
//! A thin binary over the [`policy_planner`] library: reads an already
//! parsed and type-checked AST (modules + named queries) from a JSON file
//! and either plans it into the IR or reports the symbolic runtime
//! complexity of a named query.
//!
//! ## Usage
//!
//! ```bash
//! planc plan --input policy.json
//! planc plan --input policy.json --format json
//! planc complexity --input policy.json --query q0
//! ```
//!
//! `policy.json` has the shape `{"modules": [...], "queries": [...]}`,
//! matching [`policy_planner::ast::Module`] and
//! [`policy_planner::ast::QuerySet`]'s `Deserialize` impls. There is no
//! parser in this crate: an upstream tool (or a hand-written fixture) is
//! expected to produce this JSON from source text.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use policy_planner::ast::{Module, QuerySet};
use policy_planner::complexity::Analyzer;
use policy_planner::config::PlannerConfig;
use policy_planner::planner::{PlanInput, Planner};

#[derive(Parser)]
#[command(name = "planc", about = "Policy query planner")]
struct Cli {
    /// Config file to load instead of the default search locations (see
    /// `PlannerConfig::from_file`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan every rule set and query set into the IR and print the result.
    Plan {
        /// JSON file with `{"modules": [...], "queries": [...]}`.
        #[arg(long)]
        input: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Analyze the symbolic runtime complexity of one named query.
    Complexity {
        #[arg(long)]
        input: PathBuf,

        /// Name of the query set to analyze (its disjuncts are combined
        /// into one body, the way the planner treats them).
        #[arg(long)]
        query: String,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// The on-disk shape of an `--input` file: a module set plus the named
/// top-level query sets to plan or analyze. Not part of the IR — just
/// this binary's serialization of a [`PlanInput`]'s AST fields.
#[derive(Deserialize)]
struct CliInput {
    #[serde(default)]
    modules: Vec<Module>,
    #[serde(default)]
    queries: Vec<QuerySet>,
}

fn init_logging(config: &PlannerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if config.logging.format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

fn load_config(path: Option<&PathBuf>) -> PlannerConfig {
    let result = match path {
        Some(path) => PlannerConfig::from_file(&path.to_string_lossy()),
        None => PlannerConfig::load(),
    };
    result.unwrap_or_else(|err| {
        eprintln!("warning: using default configuration ({err})");
        PlannerConfig::default()
    })
}

fn load_input(path: &PathBuf) -> Result<CliInput> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_logging(&config);

    match cli.command {
        Command::Plan { input, format } => {
            let parsed = load_input(&input)?;
            let mut plan_input = PlanInput::new(parsed.queries, parsed.modules);
            plan_input.config = config;
            let planner = Planner::new(plan_input).context("building planner")?;
            let policy = planner.plan().context("planning policy")?;
            match format {
                OutputFormat::Text => println!("{policy}"),
                OutputFormat::Json => {
                    let rendered = serde_json::to_string_pretty(&policy).context("rendering policy as JSON")?;
                    println!("{rendered}");
                }
            }
            Ok(())
        }
        Command::Complexity { input, query, format } => {
            let parsed = load_input(&input)?;
            let Some(query_set) = parsed.queries.iter().find(|qs| qs.name == query) else {
                bail!("no query set named {query:?} in input");
            };
            let analyzer = Analyzer::new(&parsed.modules).context("building complexity analyzer")?;
            let combined: Vec<_> = query_set.bodies.iter().flatten().cloned().collect();
            let report = analyzer.calculate(query_set.name.clone(), &combined);
            match format {
                OutputFormat::Text => println!("{report}"),
                OutputFormat::Json => {
                    let rendered = serde_json::to_string_pretty(&report).context("rendering report as JSON")?;
                    println!("{rendered}");
                }
            }
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::FAILURE
        }
    }
}
