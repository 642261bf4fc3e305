//! Layered analysis configuration: preset, then JSON file, then flags.

use crate::cli::{AnalysisArgs, EstimatorArg, InsufficientArg};
use cogload_rs::{
    AnalysisConfig, BaselineSource, BaselineSpan, CentralTendency, InsufficientBaselinePolicy,
};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Build the effective configuration for a command.
pub fn resolve(args: &AnalysisArgs) -> Result<AnalysisConfig, String> {
    let base = match &args.preset {
        Some(name) => AnalysisConfig::preset(name).map_err(|e| e.to_string())?,
        None => AnalysisConfig::default(),
    };

    let mut config = match config_file(args) {
        Some(path) => layer_file(&base, &path)?,
        None => base,
    };
    apply_flags(&mut config, args);
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn config_file(args: &AnalysisArgs) -> Option<PathBuf> {
    match &args.config {
        Some(path) => Some(PathBuf::from(path)),
        None => AnalysisConfig::user_config_path(),
    }
}

/// Fields present in the file replace the matching fields of `base`;
/// nested objects are merged key by key.
fn layer_file(base: &AnalysisConfig, path: &Path) -> Result<AnalysisConfig, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
    let overlay: Value = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))?;
    let mut merged =
        serde_json::to_value(base).map_err(|e| format!("JSON serialization failed: {}", e))?;
    merge(&mut merged, overlay);
    log::info!("Loaded configuration from {}", path.display());
    serde_json::from_value(merged)
        .map_err(|e| format!("Invalid config file '{}': {}", path.display(), e))
}

fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    // tagged enums like the baseline span are replaced whole
                    Some(existing) if existing.is_object() && value.get("mode").is_none() => {
                        merge(existing, value)
                    }
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_flags(config: &mut AnalysisConfig, args: &AnalysisArgs) {
    if let Some(sr) = args.sr {
        config.sampling_rate_hz = Some(sr);
    }
    if let Some(window) = args.window {
        config.window_secs = window;
    }
    if let Some(seconds) = args.baseline_seconds {
        config.baseline.span = BaselineSpan::FirstSeconds { seconds };
    }
    if args.baseline_from_task {
        config.baseline.source = BaselineSource::TaskPrefix;
    }
    if let Some(estimator) = args.estimator {
        config.baseline.estimator = match estimator {
            EstimatorArg::Mean => CentralTendency::Mean,
            EstimatorArg::P75 => CentralTendency::Percentile75,
        };
    }
    if let Some(policy) = args.on_insufficient {
        config.baseline.on_insufficient = match policy {
            InsufficientArg::Nan => InsufficientBaselinePolicy::NanPair,
            InsufficientArg::Skip => InsufficientBaselinePolicy::SkipSubject,
        };
    }
    if let Some(n) = args.max_channels {
        config.max_channels = Some(n);
    }
    if let Some(labels) = &args.channel_labels {
        config.channel_labels = Some(labels.clone());
    }
    if args.case_insensitive {
        config.match_case_insensitive = true;
    }
    if args.parallel {
        config.parallel = true;
    }
    if let Some(glob) = &args.subject_glob {
        config.discovery.subject_glob = Some(glob.clone());
    }
    if let Some(na) = &args.na_rep {
        config.output.na_rep = na.clone();
    }
    if args.no_header {
        config.output.header = false;
    }
}
