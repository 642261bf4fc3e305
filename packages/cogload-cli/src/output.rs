use cogload_rs::report::{write_csv, write_json_report};
use cogload_rs::RunReport;
use std::io::Write;
use std::path::Path;

/// Write a JSON or text document to stdout or a file.
pub fn write_output(text: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), text)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Write the index table of a run to stdout or a CSV file.
pub fn write_rows(report: &RunReport, output_path: Option<&str>) -> Result<(), String> {
    let output = &report.config.output;
    let pairing = &report.config.pairing;
    match output_path {
        Some(path) => {
            let file = std::fs::File::create(path)
                .map_err(|e| format!("Failed to write output file '{}': {}", path, e))?;
            write_csv(std::io::BufWriter::new(file), report.rows(), output, pairing)
                .map_err(|e| format!("Failed to write output file '{}': {}", path, e))
        }
        None => write_csv(std::io::stdout().lock(), report.rows(), output, pairing)
            .map_err(|e| format!("Failed to write to stdout: {}", e)),
    }
}

/// Write the JSON run report if a path was given.
pub fn write_report(report: &RunReport, report_path: Option<&str>) -> Result<(), String> {
    match report_path {
        Some(path) => write_json_report(Path::new(path), report)
            .map_err(|e| format!("Failed to write report '{}': {}", path, e)),
        None => Ok(()),
    }
}
