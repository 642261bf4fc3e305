use cogload_rs::report::{render_summary, write_csv_file, write_json_report};
use cogload_rs::{
    discover_subjects, AnalysisConfig, FileRecordingSource, SkipReason, SubjectOutcome,
    SubjectPipeline, WelchEstimator,
};
use std::f64::consts::PI;
use std::fs;
use std::path::Path;

const CHANNELS: [&str; 8] = ["Fz", "F3", "F4", "Pz", "P3", "P4", "FP1", "FP2"];

/// Write a CSV recording with a header row and `seconds` of samples at `fs`.
fn write_recording(path: &Path, fs: f64, seconds: f64, alpha_gain: f64) {
    let n = (fs * seconds) as usize;
    let mut text = CHANNELS.join(",");
    text.push('\n');
    for i in 0..n {
        let t = i as f64 / fs;
        let row: Vec<String> = (0..CHANNELS.len())
            .map(|c| {
                let v = (2.0 * PI * 6.0 * t + c as f64).sin()
                    + alpha_gain * (2.0 * PI * 10.0 * t).sin()
                    + 0.5 * (2.0 * PI * 20.0 * t).sin();
                format!("{:.6}", v)
            })
            .collect();
        text.push_str(&row.join(","));
        text.push('\n');
    }
    fs::write(path, text).unwrap();
}

fn data_dir() -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let s1 = root.path().join("S01");
    let s2 = root.path().join("S02");
    let s3 = root.path().join("S03");
    for dir in [&s1, &s2, &s3] {
        fs::create_dir(dir).unwrap();
    }
    write_recording(&s1.join("S01_baseline.csv"), 100.0, 20.0, 1.0);
    write_recording(&s1.join("S01_PostExperimental.csv"), 100.0, 21.0, 0.5);
    write_recording(&s2.join("S02_Experimental.csv"), 100.0, 10.0, 0.5);
    write_recording(&s3.join("S03_baseline.csv"), 100.0, 10.0, 1.0);
    fs::write(s3.join("S03_experimental.csv"), "Fz,Pz\n1.0,2.0\nbad,3.0\n").unwrap();
    root
}

fn config() -> AnalysisConfig {
    AnalysisConfig {
        sampling_rate_hz: Some(100.0),
        ..AnalysisConfig::default()
    }
}

#[test]
fn test_run_dir_collects_outcomes_in_order() {
    let root = data_dir();
    let config = config();
    let estimator = WelchEstimator::new();
    let source = FileRecordingSource::for_config(&config);
    let report = SubjectPipeline::new(&config, &estimator, &source)
        .run_dir(root.path())
        .unwrap();

    assert_eq!(report.subjects.len(), 3);
    assert_eq!(report.processed_count(), 1);
    assert_eq!(report.skipped_count(), 2);

    let s1 = &report.subjects[0];
    assert_eq!((s1.id, s1.name.as_str()), (1, "S01"));
    match &s1.outcome {
        SubjectOutcome::Processed { rows, windows, .. } => {
            // 21 s in 2 s windows: ten full windows plus a 1 s tail
            assert_eq!(windows.total, 11);
            assert_eq!(rows.len(), 11);
            // alpha halved in amplitude relative to baseline
            assert!(rows.iter().all(|r| (r.alpha_norm - 0.25).abs() < 0.05));
            assert!(rows.iter().all(|r| r.task_load_index > 1.0));
        }
        other => panic!("S01 should be processed, got {:?}", other),
    }

    assert_eq!(
        report.subjects[1].outcome,
        SubjectOutcome::Skipped {
            reason: SkipReason::MissingBaseline
        }
    );
    assert!(matches!(
        &report.subjects[2].outcome,
        SubjectOutcome::Skipped {
            reason: SkipReason::ReadFailed { file, .. }
        } if file.ends_with("S03_experimental.csv")
    ));

    assert_eq!(report.summary.rows, 11);
    let summary = render_summary(&report);
    assert!(summary.contains("1 processed, 2 skipped"));
    assert!(summary.contains("Total windows: 11"));
}

#[test]
fn test_outputs_written() {
    let root = data_dir();
    let config = config();
    let estimator = WelchEstimator::new();
    let source = FileRecordingSource::for_config(&config);
    let report = SubjectPipeline::new(&config, &estimator, &source)
        .run_dir(root.path())
        .unwrap();

    let out = tempfile::tempdir().unwrap();
    let csv_path = out.path().join("indices.csv");
    let json_path = out.path().join("report.json");
    write_csv_file(&csv_path, &report).unwrap();
    write_json_report(&json_path, &report).unwrap();

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 12);
    assert_eq!(
        lines[0],
        "subject_id,condition,window,start_s,end_s,theta_frontal_norm,alpha_parietal_norm,\
         beta_prefrontal_norm,engagement_index,task_load_index,fatigue_index"
    );
    assert!(lines[1].starts_with("1,Experimental,1,0.0,2.0,"));
    assert!(lines[11].starts_with("1,Experimental,11,20.0,21.0,"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["subjects"].as_array().unwrap().len(), 3);
    assert_eq!(json["subjects"][2]["outcome"]["reason"]["kind"], "read_failed");
    assert_eq!(json["config"]["sampling_rate_hz"], 100.0);
}

#[test]
fn test_task_prefix_needs_no_baseline_file() {
    let root = data_dir();
    let mut config = config();
    config.baseline.source = cogload_rs::BaselineSource::TaskPrefix;
    config.baseline.span = cogload_rs::BaselineSpan::FirstSeconds { seconds: 4.0 };
    let estimator = WelchEstimator::new();
    let source = FileRecordingSource::for_config(&config);

    let report = SubjectPipeline::new(&config, &estimator, &source)
        .run_dir(root.path())
        .unwrap();
    assert!(report.subjects[0].outcome.is_processed());
    assert!(report.subjects[1].outcome.is_processed());
    assert_eq!(report.subjects[1].outcome.rows().len(), 5);
    assert!(!report.subjects[2].outcome.is_processed());
}

#[test]
fn test_parallel_subjects_match_sequential() {
    let root = data_dir();
    let sequential = config();
    let parallel = AnalysisConfig {
        parallel: true,
        ..config()
    };
    let estimator = WelchEstimator::new();
    let source = FileRecordingSource::for_config(&sequential);

    let a = SubjectPipeline::new(&sequential, &estimator, &source)
        .run_dir(root.path())
        .unwrap();
    let b = SubjectPipeline::new(&parallel, &estimator, &source)
        .run_dir(root.path())
        .unwrap();
    assert_eq!(a.subjects, b.subjects);
}

#[test]
fn test_text_recording_without_rate_is_read_failure() {
    let root = data_dir();
    let config = AnalysisConfig::default();
    let estimator = WelchEstimator::new();
    let source = FileRecordingSource::for_config(&config);
    let entries = discover_subjects(root.path(), &config.discovery).unwrap();

    let report = SubjectPipeline::new(&config, &estimator, &source).process_subject(&entries[0]);
    assert!(matches!(
        report.outcome,
        SubjectOutcome::Skipped {
            reason: SkipReason::ReadFailed { .. }
        }
    ));
}
