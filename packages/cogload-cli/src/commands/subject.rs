use crate::cli::SubjectArgs;
use crate::exit_codes;
use crate::settings;
use cogload_rs::{
    BaselineSource, FileRecordingSource, RunReport, SubjectPipeline, WelchEstimator,
};
use std::path::Path;

pub fn execute(args: SubjectArgs) -> i32 {
    let config = match settings::resolve(&args.analysis) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if let Err(msg) = validate_inputs(&args, config.baseline.source) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let task = Path::new(&args.task);
    let name = match &args.name {
        Some(name) => name.clone(),
        None => task
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| args.task.clone()),
    };

    let estimator = WelchEstimator::new().parallel(config.parallel);
    let source = FileRecordingSource::for_config(&config);
    let pipeline = SubjectPipeline::new(&config, &estimator, &source);
    let subject = pipeline.process_files(args.id, &name, task, args.baseline.as_deref().map(Path::new));
    let report = RunReport::new(config, vec![subject]);

    super::finish_run(
        &report,
        args.output.as_deref(),
        args.report.as_deref(),
        args.quiet,
    )
}

fn validate_inputs(args: &SubjectArgs, source: BaselineSource) -> Result<(), String> {
    if !Path::new(&args.task).is_file() {
        return Err(format!("Task recording not found: {}", args.task));
    }
    match (&args.baseline, source) {
        (Some(path), BaselineSource::SeparateFile) if !Path::new(path).is_file() => {
            Err(format!("Baseline recording not found: {}", path))
        }
        (None, BaselineSource::SeparateFile) => Err(
            "A baseline recording is required (--baseline), or use --baseline-from-task"
                .to_string(),
        ),
        _ => Ok(()),
    }
}
