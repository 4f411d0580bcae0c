//! BracketLab CLI.
//!
//! Commands:
//! - `run`: load config, build or read bars, drive the bracket controller
//!   against the simulated broker, print the order log and a summary

use anyhow::{bail, Context, Result};
use bracketlab_core::config::RunConfig;
use bracketlab_core::controller::StepAction;
use bracketlab_core::data::{filter_range, load_json_bars, synthetic_bars};
use bracketlab_core::domain::Bar;
use bracketlab_core::engine::{run, RunReport};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Synthetic data range when neither the command line nor the config sets one.
const DEFAULT_FROM: &str = "2005-01-01";
const DEFAULT_TO: &str = "2006-12-31";

#[derive(Parser)]
#[command(
    name = "bracketlab",
    about = "BracketLab CLI: bracket-order lifecycle on a simulated broker"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the moving-average bracket strategy over a bar series.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON file holding an array of daily bars.
        #[arg(long, conflicts_with = "synthetic")]
        bars: Option<PathBuf>,

        /// Generate a deterministic random-walk series instead of reading bars.
        #[arg(long, default_value_t = false)]
        synthetic: bool,

        /// Symbol seeding the synthetic series.
        #[arg(long, default_value = "SPY")]
        symbol: String,

        /// First date to include (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        from: Option<String>,

        /// Last date to include (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS).
        #[arg(long)]
        to: Option<String>,

        /// Strategy overrides, e.g. `p1=5,p2=15,limit=0.005,hold=10`.
        #[arg(long, default_value = "")]
        strat: String,

        /// Broker overrides, e.g. `cash=50000,commission=0.001`.
        #[arg(long, default_value = "")]
        broker: String,

        /// Sizer overrides, e.g. `stake=10`.
        #[arg(long, default_value = "")]
        sizer: String,

        /// Print the full report as JSON instead of the order log.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

struct RunArgs {
    config: Option<PathBuf>,
    bars: Option<PathBuf>,
    synthetic: bool,
    symbol: String,
    from: Option<String>,
    to: Option<String>,
    strat: String,
    broker: String,
    sizer: String,
    json: bool,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            bars,
            synthetic,
            symbol,
            from,
            to,
            strat,
            broker,
            sizer,
            json,
        } => run_cmd(RunArgs {
            config,
            bars,
            synthetic,
            symbol,
            from,
            to,
            strat,
            broker,
            sizer,
            json,
        }),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_cmd(args: RunArgs) -> Result<()> {
    let config = build_config(&args)?;

    let bars = if let Some(path) = &args.bars {
        let bars = load_json_bars(path)
            .with_context(|| format!("loading bars from {}", path.display()))?;
        filter_range(bars, config.from_date, config.to_date)
    } else if args.synthetic {
        let from = config.from_date.map_or_else(|| parse_date(DEFAULT_FROM), Ok)?;
        let to = config.to_date.map_or_else(|| parse_date(DEFAULT_TO), Ok)?;
        synthetic_bars(&args.symbol, from, to)
    } else {
        bail!("one of --bars or --synthetic is required");
    };

    if bars.is_empty() {
        bail!("no bars in the selected date range");
    }

    tracing::info!(
        bars = bars.len(),
        fingerprint = %config.strategy.fingerprint(),
        "starting run"
    );
    let report = run(&bars, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_order_log(&bars, &report);
        print_summary(&config, &report);
    }
    Ok(())
}

/// File (or defaults), then command-line overrides, then validation.
fn build_config(args: &RunArgs) -> Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => RunConfig::default(),
    };

    config.strategy.apply_overrides(&args.strat)?;
    config.broker.apply_overrides(&args.broker)?;
    config.sizer.apply_overrides(&args.sizer)?;

    if let Some(from) = &args.from {
        config.from_date = Some(parse_date(from)?);
    }
    if let Some(to) = &args.to {
        config.to_date = Some(parse_date(to)?);
    }

    config.validate()?;
    Ok(config)
}

/// Accepts `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`; the time part is dropped.
fn parse_date(s: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }
    match NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        Ok(dt) => Ok(dt.date()),
        Err(_) => bail!("invalid date '{s}' (expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)"),
    }
}

fn print_order_log(bars: &[Bar], report: &RunReport) {
    let mut notes = report.notifications.iter().peekable();
    let mut actions = report.actions.iter().peekable();

    for (step, bar) in bars.iter().enumerate() {
        while let Some(n) = notes.next_if(|n| n.step == step) {
            println!(
                "{}: Order ref: {} / Type {} / Status {}",
                n.date, n.order_id, n.side, n.status
            );
        }
        while let Some(record) = actions.next_if(|a| a.step == step) {
            match &record.action {
                StepAction::Submitted {
                    entry,
                    stop,
                    target,
                    prices,
                } => {
                    println!("{}: Oref {} / Buy at {:.4}", bar.date, entry, prices.entry);
                    println!("{}: Oref {} / Sell Stop at {:.4}", bar.date, stop, prices.stop);
                    println!(
                        "{}: Oref {} / Sell Limit at {:.4}",
                        bar.date, target, prices.target
                    );
                }
                StepAction::HoldExpired { steps_held, .. } => {
                    println!("{}: hold period expired after {} bars", bar.date, steps_held);
                }
                StepAction::Flattening { exit, steps_held } => {
                    println!(
                        "{}: hold period expired after {} bars, Oref {} / Sell Market",
                        bar.date, steps_held, exit
                    );
                }
                StepAction::SubmissionFailed { reason } => {
                    println!("{}: submission failed: {}", bar.date, reason);
                }
            }
        }
    }
}

fn print_summary(config: &RunConfig, report: &RunReport) {
    let cash = config.broker.cash;
    println!();
    println!("=== Run Result ===");
    println!("Fingerprint:    {}", report.fingerprint);
    println!("Bars:           {}", report.bars);
    println!("Brackets:       {}", report.groups_closed);
    println!("Never filled:   {}", report.groups_unfilled);
    println!("Ignored notes:  {}", report.ignored_notifications);
    println!();
    println!("--- Portfolio ---");
    println!("Starting cash:  {cash:.2}");
    println!("Final cash:     {:.2}", report.final_cash);
    println!("Final value:    {:.2}", report.final_value);
    println!("Position:       {}", report.final_position);
    println!(
        "Return:         {:.2}%",
        (report.final_value / cash - 1.0) * 100.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        let Commands::Run {
            config,
            bars,
            synthetic,
            symbol,
            from,
            to,
            strat,
            broker,
            sizer,
            json,
        } = cli.command;
        RunArgs {
            config,
            bars,
            synthetic,
            symbol,
            from,
            to,
            strat,
            broker,
            sizer,
            json,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_plain_and_timestamped_dates() {
        let d = NaiveDate::from_ymd_opt(2005, 3, 1).unwrap();
        assert_eq!(parse_date("2005-03-01").unwrap(), d);
        assert_eq!(parse_date("2005-03-01T15:30:00").unwrap(), d);
        assert!(parse_date("03/01/2005").is_err());
        assert!(parse_date("2005-13-01").is_err());
    }

    #[test]
    fn bars_and_synthetic_conflict() {
        let result = Cli::try_parse_from([
            "bracketlab",
            "run",
            "--bars",
            "bars.json",
            "--synthetic",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn overrides_reach_the_config() {
        let args = run_args(&[
            "bracketlab",
            "run",
            "--synthetic",
            "--strat",
            "p1=3,p2=8,hold=4,usebracket=true",
            "--broker",
            "cash=500",
            "--sizer",
            "stake=2",
            "--from",
            "2005-01-01",
            "--to",
            "2005-06-30T00:00:00",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.strategy.fast_period, 3);
        assert_eq!(config.strategy.slow_period, 8);
        assert_eq!(config.strategy.max_hold_steps, 4);
        assert_eq!(
            config.strategy.submission_mode,
            bracketlab_core::config::SubmissionMode::Bracket
        );
        assert_eq!(config.broker.cash, 500.0);
        assert_eq!(config.sizer.stake, 2.0);
        assert_eq!(config.to_date, NaiveDate::from_ymd_opt(2005, 6, 30));
    }

    #[test]
    fn invalid_override_fails_fast() {
        let args = run_args(&["bracketlab", "run", "--synthetic", "--strat", "p1=20,p2=10"]);
        assert!(build_config(&args).is_err());

        let args = run_args(&["bracketlab", "run", "--synthetic", "--strat", "nope=1"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let args = run_args(&[
            "bracketlab",
            "run",
            "--synthetic",
            "--from",
            "2006-01-01",
            "--to",
            "2005-01-01",
        ]);
        assert!(build_config(&args).is_err());
    }
}
