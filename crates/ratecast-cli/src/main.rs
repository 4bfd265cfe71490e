//! `ratecast`: select a SARIMA specification for a monthly rate series and
//! forecast it to a target month.

mod commands;
mod error_handling;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use ratecast_core::{InformationCriterion, BEST_SPEC_FILE, FORECAST_FILE};
use tracing_subscriber::EnvFilter;

use crate::commands::Overrides;
use crate::error_handling::guarded;

#[derive(Debug, Parser)]
#[command(name = "ratecast", version, about = "Monthly rate model selection and forecasting")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rank the candidate grid and write the report and best specification
    Select {
        #[command(flatten)]
        shared: SharedArgs,

        /// Directory receiving the selection artifacts
        #[arg(long, default_value = "OUTPUT")]
        out_dir: PathBuf,
    },
    /// Fit the best specification (or the fallback) and write the forecast
    Forecast {
        #[command(flatten)]
        shared: SharedArgs,

        /// Best specification JSON [default: OUTPUT/best_model.json]
        #[arg(long)]
        best: Option<PathBuf>,

        /// Forecast CSV [default: OUTPUT/forecast.csv]
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Select, then forecast with the winner
    Run {
        #[command(flatten)]
        shared: SharedArgs,

        /// Directory receiving all artifacts
        #[arg(long, default_value = "OUTPUT")]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Args)]
struct SharedArgs {
    /// Tidy monthly series CSV
    #[arg(long)]
    input: PathBuf,

    /// JSON pipeline configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// First training year (inclusive)
    #[arg(long)]
    train_start: Option<i32>,

    /// Last training year (inclusive)
    #[arg(long)]
    train_end: Option<i32>,

    /// Last forecast month, YYYY-MM-DD
    #[arg(long)]
    horizon_end: Option<NaiveDate>,

    /// Ranking criterion: aic, bic or aicc
    #[arg(long)]
    criterion: Option<InformationCriterion>,

    /// Prediction interval level, e.g. 0.95
    #[arg(long)]
    confidence_level: Option<f64>,

    /// Score candidates one at a time
    #[arg(long)]
    sequential: bool,

    /// Fail instead of keeping a degenerate best when no candidate fits
    #[arg(long)]
    reject_all_unfit: bool,
}

impl SharedArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            config: self.config.clone(),
            train_start: self.train_start,
            train_end: self.train_end,
            horizon_end: self.horizon_end,
            criterion: self.criterion,
            confidence_level: self.confidence_level,
            sequential: self.sequential,
            reject_all_unfit: self.reject_all_unfit,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn dispatch(command: Command) -> u8 {
    match command {
        Command::Select { shared, out_dir } => guarded("select", || {
            let config = shared.overrides().resolve()?;
            commands::select(&shared.input, &out_dir, &config).map(|_| ())
        }),
        Command::Forecast {
            shared,
            best,
            output,
        } => guarded("forecast", || {
            let config = shared.overrides().resolve()?;
            let out_dir = PathBuf::from("OUTPUT");
            let best = best.unwrap_or_else(|| out_dir.join(BEST_SPEC_FILE));
            let output = output.unwrap_or_else(|| out_dir.join(FORECAST_FILE));
            commands::forecast(&shared.input, &best, &output, &config).map(|_| ())
        }),
        Command::Run { shared, out_dir } => guarded("run", || {
            let config = shared.overrides().resolve()?;
            commands::run(&shared.input, &out_dir, &config).map(|_| ())
        }),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    ExitCode::from(dispatch(cli.command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select_defaults() {
        let cli = Cli::try_parse_from(["ratecast", "select", "--input", "rates.csv"]).unwrap();
        assert_eq!(cli.verbose, 0);
        match cli.command {
            Command::Select { shared, out_dir } => {
                assert_eq!(shared.input, PathBuf::from("rates.csv"));
                assert_eq!(out_dir, PathBuf::from("OUTPUT"));
                assert_eq!(shared.overrides(), Overrides::default());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_forecast_options() {
        let cli = Cli::try_parse_from([
            "ratecast",
            "-vv",
            "forecast",
            "--input",
            "rates.csv",
            "--best",
            "out/best.json",
            "--horizon-end",
            "2020-12-01",
            "--criterion",
            "bic",
            "--confidence-level",
            "0.9",
            "--sequential",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Forecast {
                shared,
                best,
                output,
            } => {
                assert_eq!(best, Some(PathBuf::from("out/best.json")));
                assert_eq!(output, None);
                assert_eq!(shared.horizon_end, NaiveDate::from_ymd_opt(2020, 12, 1));
                assert_eq!(shared.criterion, Some(InformationCriterion::Bic));
                assert_eq!(shared.confidence_level, Some(0.9));
                assert!(shared.sequential);
                assert!(!shared.reject_all_unfit);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        assert!(Cli::try_parse_from([
            "ratecast", "run", "--input", "x.csv", "--criterion", "hqic"
        ])
        .is_err());
        assert!(Cli::try_parse_from([
            "ratecast", "run", "--input", "x.csv", "--horizon-end", "2023-13-01"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["ratecast", "select"]).is_err());
    }

    #[test]
    fn test_missing_input_maps_to_invalid_input_code() {
        let dir = tempfile::tempdir().unwrap();
        let status = dispatch(Command::Run {
            shared: SharedArgs {
                input: dir.path().join("absent.csv"),
                config: None,
                train_start: None,
                train_end: None,
                horizon_end: None,
                criterion: None,
                confidence_level: None,
                sequential: true,
                reject_all_unfit: false,
            },
            out_dir: dir.path().join("OUTPUT"),
        });
        assert_eq!(status, 2);
    }
}
