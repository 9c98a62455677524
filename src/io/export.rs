//! Export forecasts to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use crate::domain::{ForecastPoint, PairedForecastPoint};
use crate::error::AppError;

/// Write single-model forecast points: `year,<targets...>,is_forecast`.
pub fn write_forecast_csv(path: &Path, targets: &[String], points: &[ForecastPoint]) -> Result<(), AppError> {
    let mut writer = open(path)?;

    let mut header = vec!["year".to_string()];
    header.extend(targets.iter().cloned());
    header.push("is_forecast".to_string());
    writer.write_record(&header).map_err(write_err)?;

    for p in points {
        let mut row = vec![p.year.to_string()];
        for t in targets {
            row.push(p.value(t).map(|v| format!("{v:.2}")).unwrap_or_default());
        }
        row.push(p.is_forecast.to_string());
        writer.write_record(&row).map_err(write_err)?;
    }

    writer.flush().map_err(|e| write_err(e.into()))
}

/// Write the lockstep male/female forecast: `year,male,female,total,is_forecast`.
pub fn write_paired_csv(path: &Path, points: &[PairedForecastPoint]) -> Result<(), AppError> {
    let mut writer = open(path)?;
    writer
        .write_record(["year", "male", "female", "total", "is_forecast"])
        .map_err(write_err)?;
    for p in points {
        writer
            .write_record([
                p.year.to_string(),
                format!("{:.2}", p.male),
                format!("{:.2}", p.female),
                format!("{:.2}", p.total),
                p.is_forecast.to_string(),
            ])
            .map_err(write_err)?;
    }
    writer.flush().map_err(|e| write_err(e.into()))
}

fn open(path: &Path) -> Result<csv::Writer<std::fs::File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))
}

fn write_err(e: csv::Error) -> AppError {
    AppError::io(format!("Failed to write export CSV: {e}"))
}
