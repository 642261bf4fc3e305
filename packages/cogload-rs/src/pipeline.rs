//! Subject Pipeline.
//!
//! Discovers subject directories, loads each subject's recordings, computes
//! the baseline reference and runs the window engine. Per-subject failures
//! never abort the run; they become [`SubjectOutcome::Skipped`] entries.

use crate::baseline::{compute_baseline, Insufficiency, ReferenceValue};
use crate::config::{AnalysisConfig, BaselineSource, DiscoveryConfig, InsufficientBaselinePolicy};
use crate::engine::{WindowIndexEngine, WindowStats};
use crate::error::{CogLoadError, Result};
use crate::readers::{ReaderFactory, ReaderOptions};
use crate::report::{IndexSummary, RunReport};
use crate::spectral::SpectralEstimator;
use crate::taxonomy::{Band, Region};
use crate::types::{Recording, ResultRow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Result of looking for one role (baseline or task) in a subject directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMatch {
    Found(PathBuf),
    Missing,
    Ambiguous(Vec<PathBuf>),
}

impl FileMatch {
    fn from_candidates(mut candidates: Vec<PathBuf>) -> Self {
        match candidates.len() {
            0 => FileMatch::Missing,
            1 => FileMatch::Found(candidates.remove(0)),
            _ => FileMatch::Ambiguous(candidates),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectEntry {
    /// 1-based, assigned in sorted directory order
    pub id: usize,
    pub name: String,
    pub dir: PathBuf,
    pub baseline: FileMatch,
    pub task: FileMatch,
}

/// List subject directories under `root` and classify their recordings.
///
/// Only files with a supported recording extension take part. A file whose
/// lowercased name contains a baseline keyword is a baseline candidate and
/// never a task candidate.
pub fn discover_subjects(root: &Path, discovery: &DiscoveryConfig) -> Result<Vec<SubjectEntry>> {
    if !root.is_dir() {
        return Err(CogLoadError::FileNotFound(root.display().to_string()));
    }
    let pattern = discovery
        .subject_glob
        .as_deref()
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| CogLoadError::InvalidParameter(format!("Invalid subject glob: {}", e)))?;

    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .filter(|path| match (&pattern, path.file_name().and_then(|n| n.to_str())) {
            (Some(pattern), Some(name)) => pattern.matches(name),
            (None, _) => true,
            (Some(_), None) => false,
        })
        .collect();
    dirs.sort();

    let baseline_keys = lowercase(&discovery.baseline_keywords);
    let task_keys = lowercase(&discovery.task_keywords);

    let mut subjects = Vec::with_capacity(dirs.len());
    for (i, dir) in dirs.into_iter().enumerate() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && ReaderFactory::is_supported(path))
            .collect();
        files.sort();

        let mut baseline = Vec::new();
        let mut task = Vec::new();
        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            if baseline_keys.iter().any(|k| name.contains(k.as_str())) {
                baseline.push(file);
            } else if task_keys.iter().any(|k| name.contains(k.as_str())) {
                task.push(file);
            }
        }

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        log::debug!(
            "Subject {} ({}): {} baseline, {} task candidates",
            i + 1,
            name,
            baseline.len(),
            task.len()
        );
        subjects.push(SubjectEntry {
            id: i + 1,
            name,
            dir,
            baseline: FileMatch::from_candidates(baseline),
            task: FileMatch::from_candidates(task),
        });
    }
    Ok(subjects)
}

fn lowercase(keywords: &[String]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}

/// Why a subject produced no rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingBaseline,
    MissingTask,
    AmbiguousBaseline { candidates: Vec<String> },
    AmbiguousTask { candidates: Vec<String> },
    ReadFailed { file: String, message: String },
    InsufficientBaseline { region: Region, band: Band, reason: Insufficiency },
    AnalysisFailed { message: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingBaseline => write!(f, "no baseline recording found"),
            SkipReason::MissingTask => write!(f, "no task recording found"),
            SkipReason::AmbiguousBaseline { candidates } => {
                write!(f, "several baseline recordings: {}", candidates.join(", "))
            }
            SkipReason::AmbiguousTask { candidates } => {
                write!(f, "several task recordings: {}", candidates.join(", "))
            }
            SkipReason::ReadFailed { file, message } => write!(f, "failed to read {}: {}", file, message),
            SkipReason::InsufficientBaseline {
                region,
                band,
                reason,
            } => write!(f, "insufficient baseline for {}/{}: {}", region, band, reason),
            SkipReason::AnalysisFailed { message } => write!(f, "analysis failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubjectOutcome {
    Processed {
        #[serde(skip)]
        rows: Vec<ResultRow>,
        windows: WindowStats,
        summary: IndexSummary,
    },
    Skipped {
        reason: SkipReason,
    },
}

impl SubjectOutcome {
    fn processed(rows: Vec<ResultRow>, windows: WindowStats) -> Self {
        let summary = IndexSummary::from_rows(&rows);
        SubjectOutcome::Processed {
            rows,
            windows,
            summary,
        }
    }

    pub fn rows(&self) -> &[ResultRow] {
        match self {
            SubjectOutcome::Processed { rows, .. } => rows,
            SubjectOutcome::Skipped { .. } => &[],
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, SubjectOutcome::Processed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectReport {
    pub id: usize,
    pub name: String,
    pub outcome: SubjectOutcome,
}

/// Where recordings come from
pub trait RecordingSource: Send + Sync {
    fn load(&self, path: &Path) -> Result<Recording>;
}

/// Loads recordings from disk through [`ReaderFactory`]
#[derive(Debug, Clone, Default)]
pub struct FileRecordingSource {
    options: ReaderOptions,
}

impl FileRecordingSource {
    pub fn new(options: ReaderOptions) -> Self {
        Self { options }
    }

    pub fn for_config(config: &AnalysisConfig) -> Self {
        Self::new(config.reader_options())
    }
}

impl RecordingSource for FileRecordingSource {
    fn load(&self, path: &Path) -> Result<Recording> {
        ReaderFactory::read(path, &self.options)
    }
}

pub struct SubjectPipeline<'a> {
    config: &'a AnalysisConfig,
    estimator: &'a dyn SpectralEstimator,
    source: &'a dyn RecordingSource,
}

impl<'a> SubjectPipeline<'a> {
    pub fn new(
        config: &'a AnalysisConfig,
        estimator: &'a dyn SpectralEstimator,
        source: &'a dyn RecordingSource,
    ) -> Self {
        Self {
            config,
            estimator,
            source,
        }
    }

    /// Apply the sampling-rate override and the channel limit.
    fn prepare(&self, recording: Recording) -> Result<Recording> {
        let recording = match self.config.sampling_rate_hz {
            Some(fs) if fs != recording.sampling_rate() => recording.with_sampling_rate(fs)?,
            _ => recording,
        };
        Ok(match self.config.max_channels {
            Some(n) => recording.limit_channels(n),
            None => recording,
        })
    }

    /// Run baseline and window analysis on recordings already in memory.
    ///
    /// `baseline` is ignored when the baseline comes from the task prefix.
    pub fn process_recordings(
        &self,
        subject_id: usize,
        baseline: Option<Recording>,
        task: Recording,
    ) -> SubjectOutcome {
        match self.analyze(subject_id, baseline, task) {
            Ok(outcome) => outcome,
            Err(e) => SubjectOutcome::Skipped {
                reason: SkipReason::AnalysisFailed {
                    message: e.to_string(),
                },
            },
        }
    }

    fn analyze(&self, subject_id: usize, baseline: Option<Recording>, task: Recording) -> Result<SubjectOutcome> {
        let task = self.prepare(task)?;
        let reference = match self.config.baseline.source {
            BaselineSource::TaskPrefix => compute_baseline(&task, self.config, self.estimator)?,
            BaselineSource::SeparateFile => match baseline {
                Some(baseline) => compute_baseline(&self.prepare(baseline)?, self.config, self.estimator)?,
                None => {
                    return Ok(SubjectOutcome::Skipped {
                        reason: SkipReason::MissingBaseline,
                    })
                }
            },
        };

        let pairs = self.config.pairing.pairs();
        match self.config.baseline.on_insufficient {
            InsufficientBaselinePolicy::SkipSubject => {
                if let Err(CogLoadError::InsufficientBaseline {
                    region,
                    band,
                    reason,
                }) = reference.require(&pairs)
                {
                    return Ok(SubjectOutcome::Skipped {
                        reason: SkipReason::InsufficientBaseline {
                            region,
                            band,
                            reason,
                        },
                    });
                }
            }
            InsufficientBaselinePolicy::NanPair => {
                let unusable: Vec<_> = pairs
                    .iter()
                    .filter_map(|&(region, band)| match reference.get(region, band) {
                        ReferenceValue::Insufficient(reason) => Some((region, band, reason)),
                        ReferenceValue::Power(_) => None,
                    })
                    .collect();
                // nothing left to normalize against; every row would be NaN
                if unusable.len() == pairs.len() {
                    if let Some(&(region, band, reason)) = unusable.first() {
                        log::warn!(
                            "Subject {}: no usable baseline for any region/band ({}), skipping",
                            subject_id,
                            reason
                        );
                        return Ok(SubjectOutcome::Skipped {
                            reason: SkipReason::InsufficientBaseline {
                                region,
                                band,
                                reason,
                            },
                        });
                    }
                }
                for (region, band, reason) in unusable {
                    log::warn!(
                        "Subject {}: baseline {}/{} unusable ({}), normalized values will be NaN",
                        subject_id,
                        region,
                        band,
                        reason
                    );
                }
            }
        }

        let engine = WindowIndexEngine::new(self.config, self.estimator, &reference);
        let (rows, stats) = engine.run(subject_id, &task)?;
        Ok(SubjectOutcome::processed(rows, stats))
    }

    fn load(&self, path: &Path) -> std::result::Result<Recording, SkipReason> {
        self.source.load(path).map_err(|e| SkipReason::ReadFailed {
            file: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Load and analyze one subject given explicit file paths.
    pub fn process_files(
        &self,
        subject_id: usize,
        name: &str,
        task: &Path,
        baseline: Option<&Path>,
    ) -> SubjectReport {
        let outcome = self.load_and_analyze(subject_id, task, baseline);
        self.finish(subject_id, name, outcome)
    }

    fn load_and_analyze(&self, subject_id: usize, task: &Path, baseline: Option<&Path>) -> SubjectOutcome {
        let baseline = match (self.config.baseline.source, baseline) {
            (BaselineSource::TaskPrefix, Some(path)) => {
                log::debug!("Ignoring {}, baseline comes from the task recording", path.display());
                None
            }
            (BaselineSource::TaskPrefix, None) => None,
            (BaselineSource::SeparateFile, Some(path)) => match self.load(path) {
                Ok(rec) => Some(rec),
                Err(reason) => return SubjectOutcome::Skipped { reason },
            },
            (BaselineSource::SeparateFile, None) => {
                return SubjectOutcome::Skipped {
                    reason: SkipReason::MissingBaseline,
                }
            }
        };
        match self.load(task) {
            Ok(task) => self.process_recordings(subject_id, baseline, task),
            Err(reason) => SubjectOutcome::Skipped { reason },
        }
    }

    pub fn process_subject(&self, entry: &SubjectEntry) -> SubjectReport {
        let task = match &entry.task {
            FileMatch::Found(path) => path,
            FileMatch::Missing => return self.skip(entry, SkipReason::MissingTask),
            FileMatch::Ambiguous(paths) => {
                return self.skip(
                    entry,
                    SkipReason::AmbiguousTask {
                        candidates: file_names(paths),
                    },
                )
            }
        };
        let baseline = match (&entry.baseline, self.config.baseline.source) {
            (FileMatch::Found(path), _) => Some(path.as_path()),
            (_, BaselineSource::TaskPrefix) => None,
            (FileMatch::Missing, BaselineSource::SeparateFile) => {
                return self.skip(entry, SkipReason::MissingBaseline)
            }
            (FileMatch::Ambiguous(paths), BaselineSource::SeparateFile) => {
                return self.skip(
                    entry,
                    SkipReason::AmbiguousBaseline {
                        candidates: file_names(paths),
                    },
                )
            }
        };
        self.process_files(entry.id, &entry.name, task, baseline)
    }

    fn skip(&self, entry: &SubjectEntry, reason: SkipReason) -> SubjectReport {
        self.finish(entry.id, &entry.name, SubjectOutcome::Skipped { reason })
    }

    fn finish(&self, subject_id: usize, name: &str, outcome: SubjectOutcome) -> SubjectReport {
        match &outcome {
            SubjectOutcome::Processed { windows, .. } => log::info!(
                "Subject {} ({}): {} of {} windows emitted",
                subject_id,
                name,
                windows.emitted,
                windows.total
            ),
            SubjectOutcome::Skipped { reason } => {
                log::warn!("Skipping subject {} ({}): {}", subject_id, name, reason)
            }
        }
        SubjectReport {
            id: subject_id,
            name: name.to_string(),
            outcome,
        }
    }

    /// Process every entry; reports come back in entry order.
    pub fn run_subjects(&self, entries: &[SubjectEntry]) -> RunReport {
        let subjects: Vec<SubjectReport> = if self.config.parallel {
            entries.par_iter().map(|e| self.process_subject(e)).collect()
        } else {
            entries.iter().map(|e| self.process_subject(e)).collect()
        };
        RunReport::new(self.config.clone(), subjects)
    }

    pub fn run_dir(&self, root: &Path) -> Result<RunReport> {
        let entries = discover_subjects(root, &self.config.discovery)?;
        log::info!("Found {} subject directories in {}", entries.len(), root.display());
        Ok(self.run_subjects(&entries))
    }
}

fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect()
}
