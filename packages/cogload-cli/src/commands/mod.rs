pub mod config;
pub mod inspect;
pub mod run;
pub mod subject;

use crate::exit_codes;
use crate::output;
use cogload_rs::report::render_summary;
use cogload_rs::RunReport;

/// Write the outputs of a finished run and map its outcome to an exit code.
pub(crate) fn finish_run(
    report: &RunReport,
    output_path: Option<&str>,
    report_path: Option<&str>,
    quiet: bool,
) -> i32 {
    if let Err(e) = output::write_rows(report, output_path) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if let Err(e) = output::write_report(report, report_path) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if !quiet {
        for subject in &report.subjects {
            if let cogload_rs::SubjectOutcome::Skipped { reason } = &subject.outcome {
                eprintln!("Skipped {} (subject {}): {}", subject.name, subject.id, reason);
            }
        }
        eprintln!("{}", render_summary(report));
        if let Some(path) = output_path {
            eprintln!("Results written to {}", path);
        }
    }

    exit_code_for(report)
}

fn exit_code_for(report: &RunReport) -> i32 {
    match (report.processed_count(), report.skipped_count()) {
        (0, _) => exit_codes::EXECUTION_ERROR,
        (_, 0) => exit_codes::SUCCESS,
        _ => exit_codes::PARTIAL_FAILURE,
    }
}
