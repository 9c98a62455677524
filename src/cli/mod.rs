//! Command-line parsing for the emigrant forecaster.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{ModelKind, Purpose};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ef", version, about = "Filipino emigrant forecaster")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Train total, male and female models from a CSV/JSON file and save them.
    Train(TrainArgs),
    /// Forecast the next N years from saved models.
    Forecast(ForecastArgs),
    /// Export one saved model to a portable JSON artifact.
    Export(ExportArgs),
    /// Import a JSON artifact into the store.
    Import(ImportArgs),
    /// Delete every saved model of one architecture.
    Delete(StoreArgs),
}

/// Where models live and which architecture family is addressed.
#[derive(Debug, Args, Clone)]
pub struct StoreArgs {
    /// Model store directory.
    #[arg(long, env = "EF_STORE_DIR", default_value = "models")]
    pub store: PathBuf,

    /// Model architecture.
    #[arg(short = 'a', long, value_enum, default_value_t = ModelKind::Recurrent)]
    pub arch: ModelKind,
}

#[derive(Debug, Args, Clone)]
pub struct TrainArgs {
    /// Raw yearly records (`.csv` or `.json`).
    #[arg(short = 'd', long, value_name = "FILE")]
    pub data: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Years of history per training window.
    #[arg(short = 'l', long, default_value_t = 3)]
    pub lookback: usize,

    /// Training epochs.
    #[arg(short = 'e', long, default_value_t = 100)]
    pub epochs: usize,

    /// Share of the latest windows held out for validation loss.
    #[arg(long, default_value_t = 0.2)]
    pub validation_split: f64,

    /// Print progress every N epochs.
    #[arg(long, default_value_t = 20)]
    pub progress_every: usize,

    /// Seed for weight initialization, shuffling and dropout.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Train only these purposes (default: every purpose the data supports).
    #[arg(short = 'p', long, value_enum)]
    pub purpose: Vec<Purpose>,
}

#[derive(Debug, Args, Clone)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Number of years to project.
    #[arg(short = 'y', long, default_value_t = 5)]
    pub years: usize,

    /// Write the forecast tables to CSV (`<stem>-total.csv`, `<stem>-sex.csv`).
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Which saved model to export.
    #[arg(short = 'p', long, value_enum, default_value_t = Purpose::Total)]
    pub purpose: Purpose,

    /// Artifact path.
    #[arg(short = 'o', long, value_name = "JSON")]
    pub out: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ImportArgs {
    /// Store directory; the architecture is taken from the artifact.
    #[arg(long, env = "EF_STORE_DIR", default_value = "models")]
    pub store: PathBuf,

    /// Slot to import into.
    #[arg(short = 'p', long, value_enum, default_value_t = Purpose::Total)]
    pub purpose: Purpose,

    /// Artifact produced by `ef export`.
    #[arg(short = 'f', long, value_name = "JSON")]
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn train_accepts_legacy_arch_alias() {
        let cli = Cli::parse_from(["ef", "train", "--data", "x.csv", "--arch", "mlp", "-p", "male"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        assert_eq!(args.store.arch, ModelKind::FeedForward);
        assert_eq!(args.purpose, vec![Purpose::Male]);
        assert_eq!(args.lookback, 3);
    }
}
