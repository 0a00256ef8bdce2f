//! CSV ingest and normalization.
//!
//! The input is a "wide" CSV: the first column is the shared flow rate and
//! every further column is one pressure-drop series. This module turns that
//! into clean per-series `(x, y)` pairs that are safe to fit.
//!
//! Design goals:
//! - **Row-level validation**: skip bad cells, but report what happened
//! - **Per-series alignment**: a blank cell drops the point from that series
//!   only, not from its siblings
//! - **Deterministic behavior** and no fitting logic here

use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{DatasetStats, Series, SeriesPoint};
use crate::error::AppError;

/// A cell-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    /// 1-based CSV line number.
    pub line: usize,
    /// Series (column) name, when the error is attributable to one.
    pub series: Option<String>,
    pub message: String,
}

/// Ingest output: normalized series + stats + row errors.
#[derive(Debug, Clone)]
pub struct SeriesTable {
    /// Header of the shared flow column.
    pub x_label: String,
    pub series: Vec<Series>,
    pub stats: DatasetStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load and normalize a wide CSV into per-series points.
pub fn load_series_table(path: &Path) -> Result<SeriesTable, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();

    if headers.len() < 2 {
        return Err(AppError::new(
            2,
            format!(
                "Expected at least two columns (flow + one series), found {}.",
                headers.len()
            ),
        ));
    }

    let x_label = clean_header(headers.get(0).unwrap_or(""));
    let mut series: Vec<Series> = headers
        .iter()
        .skip(1)
        .enumerate()
        .map(|(i, name)| {
            let name = clean_header(name);
            Series {
                name: if name.is_empty() { format!("series{}", i + 1) } else { name },
                points: Vec::new(),
            }
        })
        .collect();

    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header row, and CSV line numbers
        // are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    series: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let x = match parse_x(&record, line) {
            Ok(x) => x,
            Err(e) => {
                row_errors.push(e);
                continue;
            }
        };

        for (i, s) in series.iter_mut().enumerate() {
            let raw = record.get(i + 1).unwrap_or("").trim();
            if raw.is_empty() {
                // Ragged columns are expected: series may have different
                // lengths.
                continue;
            }
            match raw.parse::<f64>() {
                Ok(y) if y.is_finite() => s.points.push(SeriesPoint { x, y }),
                Ok(y) => row_errors.push(RowError {
                    line,
                    series: Some(s.name.clone()),
                    message: format!("Non-finite value '{y}'."),
                }),
                Err(e) => row_errors.push(RowError {
                    line,
                    series: Some(s.name.clone()),
                    message: format!("Invalid number '{raw}': {e}"),
                }),
            }
        }
    }

    let stats = compute_stats(&series).ok_or_else(|| {
        AppError::new(3, "No valid data points remain after validation.")
    })?;

    Ok(SeriesTable {
        x_label,
        series,
        stats,
        row_errors,
        rows_read,
    })
}

/// Build a table directly from in-memory series (synthetic samples).
pub fn table_from_series(x_label: impl Into<String>, series: Vec<Series>) -> Result<SeriesTable, AppError> {
    let stats = compute_stats(&series)
        .ok_or_else(|| AppError::new(3, "No valid data points in generated sample."))?;
    Ok(SeriesTable {
        x_label: x_label.into(),
        series,
        stats,
        row_errors: Vec::new(),
        rows_read: 0,
    })
}

fn parse_x(record: &StringRecord, line: usize) -> Result<f64, RowError> {
    let raw = record.get(0).unwrap_or("").trim();
    if raw.is_empty() {
        return Err(RowError {
            line,
            series: None,
            message: "Missing flow value in first column.".to_string(),
        });
    }
    match raw.parse::<f64>() {
        Ok(x) if x.is_finite() => Ok(x),
        Ok(x) => Err(RowError {
            line,
            series: None,
            message: format!("Non-finite flow value '{x}'."),
        }),
        Err(e) => Err(RowError {
            line,
            series: None,
            message: format!("Invalid flow value '{raw}': {e}"),
        }),
    }
}

fn clean_header(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on
    // the first header. If we don't strip it, the flow column gets a mangled
    // label.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

/// Summary stats over every parsed point. `None` when nothing parsed.
pub fn compute_stats(series: &[Series]) -> Option<DatasetStats> {
    let mut n_points = 0usize;
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;

    for s in series {
        for p in &s.points {
            n_points += 1;
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }
    }

    if n_points == 0 {
        return None;
    }

    Some(DatasetStats {
        n_series: series.len(),
        n_points,
        x_min,
        x_max,
        y_min,
        y_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(content: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "cv_ingest_test_{}_{}.csv",
            std::process::id(),
            content.len()
        ));
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_wide_csv_with_two_series() {
        let path = write_temp_csv(
            "gpm,valve_a,valve_b\n\
             1.0,0.25,0.5\n\
             2.0,1.0,2.0\n\
             3.0,2.25,4.5\n",
        );
        let table = load_series_table(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.x_label, "gpm");
        assert_eq!(table.series.len(), 2);
        assert_eq!(table.series[0].name, "valve_a");
        assert_eq!(table.series[0].points.len(), 3);
        assert_eq!(table.series[1].points[2], SeriesPoint { x: 3.0, y: 4.5 });
        assert!(table.row_errors.is_empty());
        assert_eq!(table.stats.n_points, 6);
    }

    #[test]
    fn blank_cells_drop_points_per_series_only() {
        let path = write_temp_csv(
            "gpm,a,b\n\
             1.0,0.25,\n\
             2.0,,2.0\n",
        );
        let table = load_series_table(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.series[0].points.len(), 1);
        assert_eq!(table.series[1].points.len(), 1);
        assert!(table.row_errors.is_empty());
    }

    #[test]
    fn bad_cells_are_reported_not_fatal() {
        let path = write_temp_csv(
            "gpm,a\n\
             1.0,0.25\n\
             oops,1.0\n\
             3.0,not_a_number\n",
        );
        let table = load_series_table(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(table.series[0].points.len(), 1);
        assert_eq!(table.row_errors.len(), 2);
        assert_eq!(table.row_errors[0].line, 3);
        assert_eq!(table.row_errors[1].series.as_deref(), Some("a"));
    }

    #[test]
    fn all_invalid_rows_is_an_error() {
        let path = write_temp_csv("gpm,a\nx,y\n");
        let err = load_series_table(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.exit_code(), 3);
    }
}
