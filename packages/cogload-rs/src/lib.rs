pub mod baseline;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod readers;
pub mod report;
pub mod spectral;
pub mod taxonomy;
pub mod types;

pub use baseline::{compute_baseline, BaselineReference, CentralTendency, Insufficiency, ReferenceValue};
pub use channels::{resolve_channels, ChannelResolver, ResolvedRegions};
pub use config::{AnalysisConfig, BaselineSource, BaselineSpan, InsufficientBaselinePolicy};
pub use engine::{partition_windows, CognitiveIndices, WindowIndexEngine, WindowOutcome, WindowStats};
pub use error::{CogLoadError, Result};
pub use pipeline::{
    discover_subjects, FileMatch, FileRecordingSource, RecordingSource, SkipReason, SubjectEntry,
    SubjectOutcome, SubjectPipeline, SubjectReport,
};
pub use readers::{ReaderFactory, ReaderOptions, RecordingMetadata, RecordingReader};
pub use report::{IndexSummary, RunReport};
pub use spectral::{SpectralEstimator, Spectrum, WelchEstimator};
pub use taxonomy::{Band, BandRange, BandTable, IndexPairing, Region, RegionTable};
pub use types::*;
