use crate::cli::RunArgs;
use crate::exit_codes;
use crate::settings;
use cogload_rs::{FileRecordingSource, SubjectPipeline, WelchEstimator};
use std::path::Path;

pub fn execute(args: RunArgs) -> i32 {
    let config = match settings::resolve(&args.analysis) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let root = Path::new(&args.data_dir);
    if !root.is_dir() {
        eprintln!("Error: Data directory not found: {}", args.data_dir);
        return exit_codes::INPUT_ERROR;
    }

    if !args.quiet {
        eprintln!("Analyzing subjects in {}...", args.data_dir);
        eprintln!(
            "  Window: {} s, baseline: {:?}",
            config.window_secs, config.baseline.source
        );
    }

    let estimator = WelchEstimator::new().parallel(config.parallel);
    let source = FileRecordingSource::for_config(&config);
    let pipeline = SubjectPipeline::new(&config, &estimator, &source);
    let report = match pipeline.run_dir(root) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if report.subjects.is_empty() {
        eprintln!("Error: No subject directories found in {}", args.data_dir);
        return exit_codes::INPUT_ERROR;
    }

    super::finish_run(
        &report,
        args.output.as_deref(),
        args.report.as_deref(),
        args.quiet,
    )
}
