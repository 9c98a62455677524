//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads raw records and trains the per-purpose models
//! - restores saved models and forecasts
//! - moves models in and out of the store as portable artifacts

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{Command, ExportArgs, ForecastArgs, ImportArgs, StoreArgs, TrainArgs};
use crate::domain::{EpochLog, Purpose, TrainConfig};
use crate::error::AppError;
use crate::fit::SingleFlight;
use crate::store::{FileStore, LifecycleManager, StoreKeys};

pub mod pipeline;

/// Entry point for the `ef` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Train(args) => handle_train(args),
        Command::Forecast(args) => handle_forecast(args),
        Command::Export(args) => handle_export(args),
        Command::Import(args) => handle_import(args),
        Command::Delete(args) => handle_delete(args),
    }
}

fn handle_train(args: TrainArgs) -> Result<(), AppError> {
    let config = train_config_from_args(&args);
    let raw = crate::io::load_records(&args.data)?;

    let mut manager = open_manager(&args.store)?;
    let guard = SingleFlight::new();
    let mut progress = |purpose: Purpose, log: &EpochLog| {
        println!("[{purpose}] {}", crate::report::format_epoch(log));
    };
    let run = pipeline::run_training(raw, &args.purpose, &config, &mut manager, &guard, &mut progress)?;

    for (purpose, outcome) in &run.outcomes {
        println!();
        println!("{}", crate::report::format_training_summary(*purpose, outcome));
        if !outcome.validation.is_empty() {
            println!("{}", crate::report::format_validation(&outcome.validation));
        }
    }
    println!(
        "Saved {} model(s) to {}",
        run.outcomes.len(),
        args.store.store.display()
    );
    Ok(())
}

fn handle_forecast(args: ForecastArgs) -> Result<(), AppError> {
    let manager = open_manager(&args.store)?;
    let run = pipeline::run_forecast(&manager, args.years)?;

    if let Some((metadata, points)) = &run.total {
        println!("{}", crate::report::format_forecast(metadata, points));
    }
    if let Some(points) = &run.by_sex {
        println!("{}", crate::report::format_paired_forecast(points));
    }

    if let Some(path) = &args.export {
        if let Some((metadata, points)) = &run.total {
            let out = suffixed(path, "total");
            crate::io::write_forecast_csv(&out, &metadata.targets, points)?;
            println!("Wrote {}", out.display());
        }
        if let Some(points) = &run.by_sex {
            let out = suffixed(path, "sex");
            crate::io::write_paired_csv(&out, points)?;
            println!("Wrote {}", out.display());
        }
    }
    Ok(())
}

fn handle_export(args: ExportArgs) -> Result<(), AppError> {
    let manager = open_manager(&args.store)?;
    let artifact = manager.export(args.purpose)?;
    crate::io::write_artifact(&args.out, &artifact)?;
    println!(
        "Exported {} {} model to {}",
        args.purpose,
        artifact.model_type.display_name(),
        args.out.display()
    );
    Ok(())
}

fn handle_import(args: ImportArgs) -> Result<(), AppError> {
    let artifact = crate::io::read_artifact(&args.file)?;
    let kind = artifact.model_type;
    let store = FileStore::open(&args.store)?;
    let mut manager = LifecycleManager::new(store, StoreKeys::for_kind(kind));
    let loaded = manager.import(args.purpose, artifact)?;
    println!(
        "Imported {} model into slot '{}' (lookback {}, last year {})",
        kind.display_name(),
        args.purpose,
        loaded.metadata.lookback,
        loaded.metadata.last_year
    );
    Ok(())
}

fn handle_delete(args: StoreArgs) -> Result<(), AppError> {
    let mut manager = open_manager(&args)?;
    let removed = manager.delete_all()?;
    println!(
        "Deleted {removed} stored entr{} for {}",
        if removed == 1 { "y" } else { "ies" },
        args.arch.display_name()
    );
    Ok(())
}

fn open_manager(args: &StoreArgs) -> Result<LifecycleManager<FileStore>, AppError> {
    let store = FileStore::open(&args.store)?;
    Ok(LifecycleManager::new(store, StoreKeys::for_kind(args.arch)))
}

pub fn train_config_from_args(args: &TrainArgs) -> TrainConfig {
    TrainConfig {
        model_kind: args.store.arch,
        lookback: args.lookback,
        epochs: args.epochs,
        validation_fraction: args.validation_split,
        progress_every: args.progress_every,
        seed: args.seed,
    }
}

/// `out/forecast.csv` + `total` -> `out/forecast-total.csv`.
fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "forecast".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "csv".to_string());
    path.with_file_name(format!("{stem}-{suffix}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_paths_get_a_suffix() {
        assert_eq!(
            suffixed(Path::new("out/forecast.csv"), "total"),
            PathBuf::from("out/forecast-total.csv")
        );
        assert_eq!(suffixed(Path::new("plain"), "sex"), PathBuf::from("plain-sex.csv"));
    }

    #[test]
    fn train_args_map_onto_config() {
        let cli = crate::cli::Cli::parse_from(["ef", "train", "-d", "d.csv", "-e", "7", "--seed", "9"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = train_config_from_args(&args);
        assert_eq!(config.epochs, 7);
        assert_eq!(config.seed, 9);
        assert_eq!(config.lookback, TrainConfig::default().lookback);
    }
}
