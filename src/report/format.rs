//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the math/training code stays clean and testable
//! - output changes are localized

use std::collections::BTreeMap;

use crate::domain::{EpochLog, ForecastPoint, Metrics, ModelMetadata, PairedForecastPoint, Purpose, ValidationRow};
use crate::fit::TrainOutcome;

/// Summary of one training session: data, epochs, metrics.
pub fn format_training_summary(purpose: Purpose, outcome: &TrainOutcome) -> String {
    let md = &outcome.metadata;
    let mut out = String::new();

    out.push_str(&format!(
        "=== ef - {} model ({}) ===\n",
        purpose,
        md.model_type.display_name()
    ));
    let report = &outcome.clean_report;
    out.push_str(&format!(
        "Records: read={} kept={} dropped={} | windows={} | lookback={}\n",
        report.records_read,
        report.records_kept,
        report.dropped(),
        outcome.window_count,
        md.lookback
    ));
    if let (Some(first), Some(last)) = (md.last_window.first(), md.last_window.last()) {
        out.push_str(&format!(
            "Seed window: {}..={} | last year {}\n",
            first.year, last.year, md.last_year
        ));
    }
    if let Some(last) = outcome.history.last() {
        out.push_str(&format!("Final epoch: {}\n", format_epoch(last)));
    }
    out.push('\n');
    out.push_str(&format_metrics(&md.metrics));
    out
}

/// One progress line, as printed by the epoch callback.
pub fn format_epoch(log: &EpochLog) -> String {
    let mut s = format!(
        "epoch {:>4}  loss={:.6}  mae={:.6}",
        log.epoch + 1,
        log.loss,
        log.mae
    );
    if let (Some(vl), Some(vm)) = (log.val_loss, log.val_mae) {
        s.push_str(&format!("  val_loss={vl:.6}  val_mae={vm:.6}"));
    }
    s
}

/// Metrics block, one line per target.
pub fn format_metrics(metrics: &BTreeMap<String, Metrics>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<12} {:>12} {:>12} {:>10} {:>8} {:>9}\n",
        "target", "MAE", "RMSE", "MAPE%", "R2", "accuracy"
    ));
    for (name, m) in metrics {
        out.push_str(&format!(
            "{:<12} {:>12.2} {:>12.2} {:>10.2} {:>8.4} {:>8.2}%\n",
            name, m.mae, m.rmse, m.mape, m.r2, m.accuracy
        ));
    }
    out
}

/// Held-out validation table (last 20% of targets).
pub fn format_validation(rows: &[ValidationRow]) -> String {
    if rows.is_empty() {
        return "Validation: (no rows)\n".to_string();
    }
    let mut out = String::new();
    out.push_str("Validation (last 20%):\n");
    out.push_str(&format!(
        "{:<6} {:>14} {:>14} {:>14}\n",
        "year", "actual", "predicted", "error"
    ));
    for r in rows {
        out.push_str(&format!(
            "{:<6} {:>14.2} {:>14.2} {:>+14.2}\n",
            r.year, r.actual, r.predicted, r.error
        ));
    }
    out
}

/// Forecast table of a single model.
pub fn format_forecast(metadata: &ModelMetadata, points: &[ForecastPoint]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Forecast from {} ({} years):\n",
        metadata.last_year,
        points.len()
    ));
    out.push_str(&format!("{:<6}", "year"));
    for t in &metadata.targets {
        out.push_str(&format!(" {t:>14}"));
    }
    out.push('\n');
    for p in points {
        out.push_str(&format!("{:<6}", p.year));
        for t in &metadata.targets {
            match p.value(t) {
                Some(v) => out.push_str(&format!(" {v:>14.0}")),
                None => out.push_str(&format!(" {:>14}", "-")),
            }
        }
        out.push('\n');
    }
    out
}

/// Forecast table of the male/female lockstep run.
pub fn format_paired_forecast(points: &[PairedForecastPoint]) -> String {
    let mut out = String::new();
    out.push_str("Forecast by sex:\n");
    out.push_str(&format!(
        "{:<6} {:>14} {:>14} {:>14}\n",
        "year", "male", "female", "total"
    ));
    for p in points {
        out.push_str(&format!(
            "{:<6} {:>14.0} {:>14.0} {:>14.0}\n",
            p.year, p.male, p.female, p.total
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_line_includes_validation_when_present() {
        let log = EpochLog {
            epoch: 19,
            loss: 0.5,
            mae: 0.25,
            val_loss: Some(0.125),
            val_mae: None,
        };
        let line = format_epoch(&log);
        assert!(line.starts_with("epoch   20"));
        assert!(!line.contains("val_loss"));
    }

    #[test]
    fn validation_table_lists_rows() {
        let rows = [ValidationRow {
            year: 2020,
            actual: 10.0,
            predicted: 12.0,
            error: 2.0,
        }];
        let text = format_validation(&rows);
        assert!(text.contains("2020"));
        assert!(text.contains("+2.00"));
    }

    #[test]
    fn paired_forecast_prints_total() {
        let text = format_paired_forecast(&[PairedForecastPoint {
            year: 2030,
            male: 100.0,
            female: 250.0,
            total: 350.0,
            is_forecast: true,
        }]);
        assert!(text.lines().nth(2).unwrap().ends_with("350"));
    }
}
