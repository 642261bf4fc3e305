use crate::config::{AnalysisConfig, OutputConfig};
use crate::error::Result;
use crate::pipeline::SubjectReport;
use crate::taxonomy::{Band, IndexPairing};
use crate::types::ResultRow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

/// Means of the three indices, skipping undefined values
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndexSummary {
    pub rows: usize,
    pub engagement_mean: Option<f64>,
    pub task_load_mean: Option<f64>,
    pub fatigue_mean: Option<f64>,
}

impl IndexSummary {
    pub fn from_rows<'r>(rows: impl IntoIterator<Item = &'r ResultRow>) -> Self {
        let mut acc = [(0.0, 0usize); 3];
        let mut count = 0;
        for row in rows {
            count += 1;
            for (slot, v) in acc
                .iter_mut()
                .zip([row.engagement_index, row.task_load_index, row.fatigue_index])
            {
                if v.is_finite() {
                    slot.0 += v;
                    slot.1 += 1;
                }
            }
        }
        let mean = |(sum, n): (f64, usize)| (n > 0).then(|| sum / n as f64);
        Self {
            rows: count,
            engagement_mean: mean(acc[0]),
            task_load_mean: mean(acc[1]),
            fatigue_mean: mean(acc[2]),
        }
    }
}

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub config: AnalysisConfig,
    pub subjects: Vec<SubjectReport>,
    pub summary: IndexSummary,
}

impl RunReport {
    pub fn new(config: AnalysisConfig, subjects: Vec<SubjectReport>) -> Self {
        let summary = IndexSummary::from_rows(subjects.iter().flat_map(|s| s.outcome.rows()));
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            config,
            subjects,
            summary,
        }
    }

    /// All rows, subject by subject, in window order.
    pub fn rows(&self) -> impl Iterator<Item = &ResultRow> + '_ {
        self.subjects.iter().flat_map(|s| s.outcome.rows())
    }

    pub fn processed_count(&self) -> usize {
        self.subjects.iter().filter(|s| s.outcome.is_processed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.subjects.len() - self.processed_count()
    }
}

/// Column names; the band columns carry the region they are measured over.
pub fn csv_header(pairing: &IndexPairing) -> Vec<String> {
    let mut header = vec![
        "subject_id".to_string(),
        "condition".to_string(),
        "window".to_string(),
        "start_s".to_string(),
        "end_s".to_string(),
    ];
    header.extend(
        Band::ALL
            .iter()
            .map(|&band| format!("{}_{}_norm", band, pairing.region_for(band))),
    );
    header.extend(
        ["engagement_index", "task_load_index", "fatigue_index"]
            .iter()
            .map(|s| s.to_string()),
    );
    header
}

/// Render a float for the CSV, `na_rep` for NaN. Whole numbers keep a
/// trailing `.0`.
pub fn format_value(value: f64, na_rep: &str) -> String {
    if value.is_nan() {
        return na_rep.to_string();
    }
    let s = value.to_string();
    if value.is_finite() && !s.contains('.') {
        format!("{}.0", s)
    } else {
        s
    }
}

pub fn write_csv<'r, W: Write>(
    writer: W,
    rows: impl IntoIterator<Item = &'r ResultRow>,
    output: &OutputConfig,
    pairing: &IndexPairing,
) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    if output.header {
        csv.write_record(csv_header(pairing))?;
    }
    let na = output.na_rep.as_str();
    for row in rows {
        csv.write_record([
            row.subject_id.to_string(),
            output.condition.clone(),
            row.window.to_string(),
            format_value(row.start_s, na),
            format_value(row.end_s, na),
            format_value(row.theta_norm, na),
            format_value(row.alpha_norm, na),
            format_value(row.beta_norm, na),
            format_value(row.engagement_index, na),
            format_value(row.task_load_index, na),
            format_value(row.fatigue_index, na),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn write_csv_file(path: &Path, report: &RunReport) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_csv(
        std::io::BufWriter::new(file),
        report.rows(),
        &report.config.output,
        &report.config.pairing,
    )?;
    log::info!("Wrote {} rows to {}", report.summary.rows, path.display());
    Ok(())
}

pub fn write_json_report(path: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    log::info!("Wrote run report to {}", path.display());
    Ok(())
}

/// Console summary printed after a run.
pub fn render_summary(report: &RunReport) -> String {
    let fmt_mean = |m: Option<f64>| m.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string());
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Subjects: {} processed, {} skipped",
        report.processed_count(),
        report.skipped_count()
    );
    let _ = writeln!(out, "Total windows: {}", report.summary.rows);
    let _ = writeln!(out, "Mean task load index:  {}", fmt_mean(report.summary.task_load_mean));
    let _ = writeln!(out, "Mean engagement index: {}", fmt_mean(report.summary.engagement_mean));
    let _ = write!(out, "Mean fatigue index:     {}", fmt_mean(report.summary.fatigue_mean));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WindowStats;
    use crate::pipeline::{SkipReason, SubjectOutcome};
    use crate::taxonomy::Region;

    fn row(subject_id: usize, window: usize, engagement: f64) -> ResultRow {
        ResultRow {
            subject_id,
            window,
            start_s: (window - 1) as f64 * 2.0,
            end_s: window as f64 * 2.0,
            theta_norm: 1.0,
            alpha_norm: 1.0,
            beta_norm: f64::NAN,
            engagement_index: engagement,
            task_load_index: 1.0,
            fatigue_index: 1.0,
        }
    }

    fn report() -> RunReport {
        let rows = vec![row(1, 1, 0.5), row(1, 2, f64::NAN), row(1, 3, 1.5)];
        let subjects = vec![
            SubjectReport {
                id: 1,
                name: "S01".to_string(),
                outcome: SubjectOutcome::Processed {
                    summary: IndexSummary::from_rows(&rows),
                    rows,
                    windows: WindowStats {
                        total: 3,
                        emitted: 3,
                        ..Default::default()
                    },
                },
            },
            SubjectReport {
                id: 2,
                name: "S02".to_string(),
                outcome: SubjectOutcome::Skipped {
                    reason: SkipReason::MissingBaseline,
                },
            },
        ];
        RunReport::new(AnalysisConfig::default(), subjects)
    }

    #[test]
    fn test_summary_skips_nan() {
        let report = report();
        assert_eq!(report.summary.rows, 3);
        assert_eq!(report.summary.engagement_mean, Some(1.0));
        assert_eq!(report.summary.task_load_mean, Some(1.0));
        assert_eq!(report.processed_count(), 1);
        assert_eq!(report.skipped_count(), 1);
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = IndexSummary::from_rows(&[]);
        assert_eq!(summary.rows, 0);
        assert_eq!(summary.fatigue_mean, None);
    }

    #[test]
    fn test_header_follows_pairing() {
        let header = csv_header(&IndexPairing::default());
        assert_eq!(
            header,
            vec![
                "subject_id",
                "condition",
                "window",
                "start_s",
                "end_s",
                "theta_frontal_norm",
                "alpha_parietal_norm",
                "beta_prefrontal_norm",
                "engagement_index",
                "task_load_index",
                "fatigue_index",
            ]
        );
        let swapped = IndexPairing {
            beta: Region::Frontal,
            ..IndexPairing::default()
        };
        assert_eq!(csv_header(&swapped)[7], "beta_frontal_norm");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.0, "NaN"), "1.0");
        assert_eq!(format_value(0.5, "NaN"), "0.5");
        assert_eq!(format_value(f64::NAN, "NA"), "NA");
        assert_eq!(format_value(12.25, ""), "12.25");
    }

    #[test]
    fn test_write_csv() {
        let report = report();
        let mut buf = Vec::new();
        write_csv(&mut buf, report.rows(), &report.config.output, &report.config.pairing).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("subject_id,condition,window"));
        assert_eq!(lines[1], "1,Experimental,1,0.0,2.0,1.0,1.0,NaN,0.5,1.0,1.0");
        assert_eq!(lines[2], "1,Experimental,2,2.0,4.0,1.0,1.0,NaN,NaN,1.0,1.0");
    }

    #[test]
    fn test_write_csv_without_header() {
        let report = report();
        let output = OutputConfig {
            header: false,
            na_rep: "".to_string(),
            ..OutputConfig::default()
        };
        let mut buf = Vec::new();
        write_csv(&mut buf, report.rows(), &output, &report.config.pairing).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("1,Experimental,1,0.0,2.0,1.0,1.0,,0.5"));
    }

    #[test]
    fn test_json_report_hides_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        write_json_report(&path, &report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["subjects"][0]["outcome"]["status"], "processed");
        assert!(value["subjects"][0]["outcome"].get("rows").is_none());
        assert_eq!(value["subjects"][1]["outcome"]["reason"]["kind"], "missing_baseline");
        assert_eq!(value["summary"]["rows"], 3);
        assert!(value["run_id"].as_str().unwrap().len() == 36);
    }
}
