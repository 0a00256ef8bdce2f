//! Export per-point results to CSV.
//!
//! The export is meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::PointFit;
use crate::error::AppError;

/// Write per-point results for every series to a CSV file.
///
/// One row per observation, tagged with its series name and whether it
/// survived outlier rejection.
pub fn write_results_csv(path: &Path, results: &[(String, Vec<PointFit>)]) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    // Header
    writeln!(file, "series,flow,dp_obs,dp_fit,residual,inlier")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for (name, points) in results {
        // Series names come verbatim from user CSV headers and may contain
        // commas or quotes.
        let name = quote_field(name);
        for p in points {
            writeln!(
                file,
                "{},{:.10},{:.10},{:.10},{:.10},{}",
                name, p.x, p.y_obs, p.y_fit, p.residual, p.inlier
            )
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
        }
    }

    Ok(())
}

/// Quote a CSV field when it needs it (RFC 4180 style).
fn quote_field(s: &str) -> String {
    if s.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_row_per_point_with_inlier_flag() {
        let mut path = std::env::temp_dir();
        path.push(format!("cv_export_test_{}.csv", std::process::id()));

        let results = vec![(
            "valve_a".to_string(),
            vec![
                PointFit { x: 1.0, y_obs: 0.25, y_fit: 0.25, residual: 0.0, inlier: true },
                PointFit { x: 2.0, y_obs: 9.0, y_fit: 1.0, residual: 8.0, inlier: false },
            ],
        )];
        write_results_csv(&path, &results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "series,flow,dp_obs,dp_fit,residual,inlier");
        assert!(lines[1].starts_with("valve_a,1.00"));
        assert!(lines[1].ends_with(",true"));
        assert!(lines[2].ends_with(",false"));
    }

    #[test]
    fn series_names_with_commas_are_quoted() {
        let mut path = std::env::temp_dir();
        path.push(format!("cv_export_quote_test_{}.csv", std::process::id()));

        let results = vec![(
            "valve \"A\", bypass".to_string(),
            vec![PointFit { x: 1.0, y_obs: 0.25, y_fit: 0.25, residual: 0.0, inlier: true }],
        )];
        write_results_csv(&path, &results).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("\"valve \"\"A\"\", bypass\",1.00"));
        // Still exactly six fields once the quoted name is parsed back.
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(row.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.len(), 6);
        assert_eq!(record.get(0), Some("valve \"A\", bypass"));
    }
}
