//! eventrace CLI: analyze recorded traces and plan reordered schedules.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::json;

use eventrace::analysis::RaceAnalysis;
use eventrace::config::{AnalysisConfig, Connectivity};
use eventrace::reorder::{PlannerOptions, Schedule};

#[derive(Parser, Debug)]
#[command(name = "eventrace", version, about = "Happens-before race analysis for event traces")]
struct Cli {
    /// Connectivity algorithm: CD, BVC or BFS
    #[arg(long = "connectivity", global = true)]
    connectivity: Option<String>,

    /// Race-detection timeout in seconds (0 disables)
    #[arg(long = "timeout-seconds", global = true)]
    timeout_seconds: Option<u64>,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbosity: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a trace file and report races and tags
    Analyze(AnalyzeArgs),
    /// Plan a schedule that reverses selected races
    Reorder(ReorderArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// The binary trace file
    trace: PathBuf,

    /// Emit JSON instead of text
    #[arg(long = "json", action = ArgAction::SetTrue)]
    json: bool,

    /// Only report uncovered races
    #[arg(long = "uncovered-only", action = ArgAction::SetTrue)]
    uncovered_only: bool,
}

#[derive(Args, Debug)]
struct ReorderArgs {
    /// The binary trace file
    trace: PathBuf,

    /// The input schedule whose payloads are carried over
    #[arg(long = "schedule")]
    schedule: PathBuf,

    /// Output schedule path
    #[arg(long = "out")]
    out: PathBuf,

    /// Race ids to reverse
    #[arg(long = "reverse", required = true)]
    reverse: Vec<usize>,

    /// Emit the <change> marker
    #[arg(long = "change-marker", action = ArgAction::SetTrue)]
    change_marker: bool,

    /// Emit the <relax> marker after all reversals
    #[arg(long = "relax-marker", action = ArgAction::SetTrue)]
    relax_marker: bool,

    /// Do not rewind the scan to minimize drift from the original order
    #[arg(long = "no-minimize-variation", action = ArgAction::SetTrue)]
    no_minimize_variation: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("eventrace: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AnalysisConfig::new().from_env()?;
    if let Some(connectivity) = &cli.connectivity {
        config.connectivity = Connectivity::parse(connectivity.as_str())?;
    }
    if let Some(seconds) = cli.timeout_seconds {
        config = config.with_timeout_seconds(seconds);
    }

    match cli.command {
        Command::Analyze(args) => analyze(&args, &config),
        Command::Reorder(args) => reorder(&args, &config),
    }
}

fn analyze(args: &AnalyzeArgs, config: &AnalysisConfig) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = RaceAnalysis::load_path(&args.trace, config)?;
    let tags = analysis.tags();

    if args.json {
        let races: Vec<_> = analysis
            .races()
            .iter()
            .enumerate()
            .filter(|(_, r)| !args.uncovered_only || r.is_uncovered())
            .map(|(id, r)| {
                json!({
                    "id": id,
                    "kind": r.kind_str(),
                    "event1": r.event1,
                    "event2": r.event2,
                    "cmd1": r.cmd1,
                    "cmd2": r.cmd2,
                    "var": analysis.var_names().get(r.var),
                    "covered_by": r.covered_by,
                    "multi_parent_races": &r.multi_parent_races,
                })
            })
            .collect();
        let variables: Vec<_> = analysis
            .racing_variables()
            .into_iter()
            .map(|var| {
                let summary = analysis.var_summary(var);
                json!({
                    "var": analysis.var_names().get(var),
                    "tags": summary.tags.tags().iter().map(|t| t.name()).collect::<Vec<_>>(),
                    "undefined_init_race": summary.has_undefined_init_race,
                    "network_response_race": tags.has_network_response_race(var, false),
                })
            })
            .collect();
        let report = json!({
            "stats": analysis.detector().stats(),
            "timed_out": analysis.detector().timed_out(),
            "races": races,
            "variables": variables,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stats = analysis.detector().stats();
    println!(
        "graph: {} nodes, {} arcs, {} chains",
        stats.num_nodes, stats.num_arcs, stats.num_chains
    );
    println!("races: {} total", analysis.races().len());
    for (id, race) in analysis.races().iter().enumerate() {
        if args.uncovered_only && !race.is_uncovered() {
            continue;
        }
        let var = analysis.var_names().get(race.var).unwrap_or("<unknown>");
        let cover = match race.covered_by {
            Some(parent) => format!(" covered-by {parent}"),
            None if !race.multi_parent_races.is_empty() => {
                format!(" multi-covered-by {:?}", race.multi_parent_races)
            }
            None => String::new(),
        };
        println!(
            "  #{id} {} {} in ({}:{}) x ({}:{}){}",
            race.kind_str(),
            var,
            race.event1,
            race.cmd1,
            race.event2,
            race.cmd2,
            cover
        );
    }
    for var in analysis.racing_variables() {
        let name = analysis.var_names().get(var).unwrap_or("<unknown>");
        let tag_set = analysis.variable_tags(var);
        let mut notes = Vec::new();
        if !tag_set.is_empty() {
            notes.push(tag_set.to_string());
        }
        if tags.has_undefined_initialization_race(var) {
            notes.push("UNDEFINED_INIT".to_owned());
        }
        if !notes.is_empty() {
            println!("  var {name}: {}", notes.join(" "));
        }
    }
    if analysis.detector().timed_out() {
        println!("warning: detection timed out; results are partial");
    }
    Ok(())
}

fn reorder(args: &ReorderArgs, config: &AnalysisConfig) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = RaceAnalysis::load_path(&args.trace, config)?;
    let schedule = Schedule::load_path(&args.schedule)?;
    let options = PlannerOptions {
        include_change_marker: args.change_marker,
        relax_after_all_reverses: args.relax_marker,
        minimize_variation_from_original: !args.no_minimize_variation,
    };
    match analysis.plan_schedule(&args.reverse, &options) {
        Some(entries) => {
            schedule.save_path(&args.out, &entries)?;
            println!("schedule with {} entries written to {}", entries.len(), args.out.display());
            Ok(())
        }
        None => Err("no feasible schedule for the requested reversals".into()),
    }
}
