//! EEGLAB `.set` reader.
//!
//! Supports the two-file layout: scalar metadata (`srate`, `nbchan`, `pnts`,
//! `trials`) as MATLAB v5 variables in the `.set` file and the samples as
//! little-endian float32 in a sibling `.fdt` file, or a `data` matrix stored
//! directly in the `.set` file. Channel labels live inside the EEG struct,
//! which the MAT parser does not expose, so they are taken from a BIDS
//! `*_channels.tsv` sidecar when one exists, then from the configured
//! `channel_labels`, and default to `Ch1..ChN`.

use super::{
    fallback_labels, mmap_file, resolve_sampling_rate, ReaderOptions, RecordingMetadata,
    RecordingReader,
};
use crate::error::{CogLoadError, Result};
use crate::types::Recording;
use matfile::{MatFile, NumericData};
use rayon::prelude::*;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

enum DataSource {
    /// Float32 frames in a `.fdt` sidecar, loaded on `read`
    Fdt(PathBuf),
    /// [channels][samples] decoded from the `.set` file
    Embedded(Vec<Vec<f64>>),
}

#[derive(Debug, Default)]
struct SetHeader {
    srate: Option<f64>,
    nbchan: usize,
    pnts: usize,
    trials: usize,
}

pub struct EeglabReader {
    source: DataSource,
    metadata: RecordingMetadata,
}

impl EeglabReader {
    pub fn open(path: &Path, options: &ReaderOptions) -> Result<Self> {
        if Self::is_hdf5_file(path)? {
            return Err(CogLoadError::UnsupportedFormat(
                "EEGLAB file uses MATLAB v7.3 (HDF5); re-save it with \
                 pop_saveset(EEG, 'savemode', 'twofiles', 'version', '6.5')"
                    .to_string(),
            ));
        }

        let mat = MatFile::parse(File::open(path)?)
            .map_err(|e| CogLoadError::Read(format!("Failed to parse .set file: {:?}", e)))?;
        let header = Self::parse_header(&mat);

        let fdt_path = path.with_extension("fdt");
        let (source, num_channels, num_samples) =
            if fdt_path.exists() && header.nbchan > 0 && header.pnts > 0 {
                let total = header.pnts.checked_mul(header.trials).ok_or_else(|| {
                    CogLoadError::Read(format!(
                        "{} declares {} points × {} trials, which overflows",
                        path.display(),
                        header.pnts,
                        header.trials
                    ))
                })?;
                Self::validate_fdt(&fdt_path, header.nbchan, total)?;
                (DataSource::Fdt(fdt_path), header.nbchan, total)
            } else if let Some(data) = Self::embedded_data(&mat)? {
                let channels = data.len();
                let samples = data.first().map(|c| c.len()).unwrap_or(0);
                (DataSource::Embedded(data), channels, samples)
            } else {
                return Err(CogLoadError::UnsupportedFormat(format!(
                    "No EEG data found in {}; expected a .fdt sidecar or a 'data' matrix",
                    path.display()
                )));
            };

        let mut metadata = RecordingMetadata::new(path, "EEGLAB")?;
        let channels = match find_channels_tsv(path) {
            Some(tsv) => {
                let labels = read_channels_tsv(&tsv)?;
                if labels.len() == num_channels {
                    labels
                } else {
                    log::warn!(
                        "{} lists {} channels, recording has {}; ignoring it",
                        tsv.display(),
                        labels.len(),
                        num_channels
                    );
                    fallback_labels(options, num_channels, &metadata.file_name)?
                }
            }
            None => fallback_labels(options, num_channels, &metadata.file_name)?,
        };
        metadata.channels = channels;
        metadata.num_channels = num_channels;
        metadata.num_samples = num_samples;
        metadata.set_sampling_rate(resolve_sampling_rate(header.srate, options, &metadata.file_name));

        Ok(Self { source, metadata })
    }

    fn is_hdf5_file(path: &Path) -> Result<bool> {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 8];
        if file.read_exact(&mut magic).is_ok() {
            return Ok(magic == [0x89, 0x48, 0x44, 0x46, 0x0d, 0x0a, 0x1a, 0x0a]);
        }
        Ok(false)
    }

    fn parse_header(mat: &MatFile) -> SetHeader {
        let scalar = |name: &str| mat.find_by_name(name).and_then(|arr| extract_scalar(arr.data()));
        let count = |name: &str| scalar(name).filter(|v| *v >= 0.0).map(|v| v as usize);
        SetHeader {
            srate: scalar("srate").filter(|v| *v > 0.0),
            nbchan: count("nbchan").unwrap_or(0),
            pnts: count("pnts").unwrap_or(0),
            trials: count("trials").filter(|&t| t > 0).unwrap_or(1),
        }
    }

    fn validate_fdt(fdt_path: &Path, num_channels: usize, total_samples: usize) -> Result<()> {
        let file_size = std::fs::metadata(fdt_path)?.len();
        let expected = frame_bytes(num_channels, total_samples)? as u64;
        if file_size < expected {
            return Err(CogLoadError::Read(format!(
                ".fdt file has {} bytes, expected {} for {} channels × {} samples",
                file_size, expected, num_channels, total_samples
            )));
        }
        Ok(())
    }

    fn embedded_data(mat: &MatFile) -> Result<Option<Vec<Vec<f64>>>> {
        match mat.find_by_name("data") {
            Some(arr) if arr.size().len() >= 2 => {
                let size = arr.size();
                Ok(Some(extract_matrix(arr.data(), size[0], size[1])?))
            }
            _ => Ok(None),
        }
    }
}

impl RecordingReader for EeglabReader {
    fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    fn read(&self) -> Result<Recording> {
        let fs = self.metadata.sampling_rate.ok_or_else(|| {
            CogLoadError::InvalidParameter(format!(
                "{} has no 'srate'; set sampling_rate_hz",
                self.metadata.file_name
            ))
        })?;
        let rows = match &self.source {
            DataSource::Fdt(fdt_path) => {
                let mmap = mmap_file(fdt_path)?;
                decode_fdt(&mmap, self.metadata.num_channels, self.metadata.num_samples)?
            }
            DataSource::Embedded(data) => data.clone(),
        };
        Recording::from_rows(self.metadata.channels.clone(), rows, fs)
    }

    fn format_name(&self) -> &str {
        "EEGLAB"
    }
}

/// Byte length of `num_channels × num_samples` float32 values.
fn frame_bytes(num_channels: usize, num_samples: usize) -> Result<usize> {
    num_channels
        .checked_mul(num_samples)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            CogLoadError::Read(format!(
                "{} channels × {} samples overflows the addressable size",
                num_channels, num_samples
            ))
        })
}

fn extract_scalar(data: &NumericData) -> Option<f64> {
    match data {
        NumericData::Double { real, .. } => real.first().copied(),
        NumericData::Single { real, .. } => real.first().map(|&v| v as f64),
        NumericData::Int8 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::Int16 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::Int32 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::Int64 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::UInt8 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::UInt16 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::UInt32 { real, .. } => real.first().map(|&v| v as f64),
        NumericData::UInt64 { real, .. } => real.first().map(|&v| v as f64),
    }
}

/// MATLAB matrices are column-major; return [row][col].
fn extract_matrix(data: &NumericData, rows: usize, cols: usize) -> Result<Vec<Vec<f64>>> {
    let flat: Vec<f64> = match data {
        NumericData::Double { real, .. } => real.clone(),
        NumericData::Single { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Int16 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        NumericData::Int32 { real, .. } => real.iter().map(|&v| v as f64).collect(),
        _ => {
            return Err(CogLoadError::Read(
                "Unsupported numeric type for EEG data".to_string(),
            ))
        }
    };
    let expected = rows.checked_mul(cols).ok_or_else(|| {
        CogLoadError::Read(format!("Data matrix of {} × {} overflows", rows, cols))
    })?;
    if flat.len() < expected {
        return Err(CogLoadError::Read(format!(
            "Data matrix has {} elements, expected {}",
            flat.len(),
            expected
        )));
    }
    Ok((0..rows)
        .into_par_iter()
        .map(|row| (0..cols).map(|col| flat[col * rows + row]).collect())
        .collect())
}

/// Decode frame-major float32 samples (ch0_t0, ch1_t0, ..., ch0_t1, ...).
pub(crate) fn decode_fdt(
    bytes: &[u8],
    num_channels: usize,
    num_samples: usize,
) -> Result<Vec<Vec<f64>>> {
    let needed = frame_bytes(num_channels, num_samples)?;
    if bytes.len() < needed {
        return Err(CogLoadError::Read(format!(
            ".fdt data has {} bytes, expected {}",
            bytes.len(),
            needed
        )));
    }
    // every offset below is under `needed`
    Ok((0..num_channels)
        .into_par_iter()
        .map(|ch| {
            (0..num_samples)
                .map(|t| {
                    let at = (t * num_channels + ch) * 4;
                    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as f64
                })
                .collect()
        })
        .collect())
}

/// Candidate sidecars, most specific first: `<stem>_channels.tsv`, the BIDS
/// form with the trailing `_eeg` suffix replaced, then `channels.tsv`.
fn find_channels_tsv(set_path: &Path) -> Option<PathBuf> {
    let dir = set_path.parent()?;
    let stem = set_path.file_stem()?.to_str()?;
    let mut candidates = vec![dir.join(format!("{}_channels.tsv", stem))];
    if let Some(base) = stem.strip_suffix("_eeg") {
        candidates.push(dir.join(format!("{}_channels.tsv", base)));
    }
    candidates.push(dir.join("channels.tsv"));
    candidates.into_iter().find(|p| p.is_file())
}

/// Channel names from the `name` column of a tab-separated sidecar.
pub(crate) fn read_channels_tsv(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)?;
    let column = reader
        .headers()?
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("name"))
        .ok_or_else(|| {
            CogLoadError::Read(format!("{} has no 'name' column", path.display()))
        })?;

    let mut labels = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(name) = record.get(column) {
            labels.push(name.trim().to_string());
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fdt_frame_major() {
        // 2 channels × 3 samples: ch0 = 1,2,3 ; ch1 = -1,-2,-3
        let frames = [1.0f32, -1.0, 2.0, -2.0, 3.0, -3.0];
        let bytes: Vec<u8> = frames.iter().flat_map(|v| v.to_le_bytes()).collect();
        let rows = decode_fdt(&bytes, 2, 3).unwrap();
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]]);
    }

    #[test]
    fn test_decode_fdt_short_buffer() {
        let bytes: Vec<u8> = [1.0f32, -1.0, 2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert!(matches!(decode_fdt(&bytes, 2, 3), Err(CogLoadError::Read(_))));
        assert!(matches!(decode_fdt(&bytes, usize::MAX, 2), Err(CogLoadError::Read(_))));
    }

    #[test]
    fn test_oversized_fdt_header_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.set");
        let mut mat = MatWriter::new();
        mat.scalar("srate", 128.0);
        mat.scalar("nbchan", 4.0);
        mat.scalar("pnts", 1e15);
        mat.scalar("trials", 1e9);
        std::fs::write(&path, mat.finish()).unwrap();
        std::fs::write(path.with_extension("fdt"), [0u8; 64]).unwrap();

        assert!(matches!(
            EeglabReader::open(&path, &ReaderOptions::default()),
            Err(CogLoadError::Read(_))
        ));
    }

    /// Minimal MATLAB v5 writer: uncompressed little-endian double matrices.
    struct MatWriter {
        bytes: Vec<u8>,
    }

    impl MatWriter {
        fn new() -> Self {
            let mut bytes = vec![b' '; 116];
            bytes[..18].copy_from_slice(b"MATLAB 5.0 MAT-fil");
            bytes.extend_from_slice(&[0u8; 8]);
            bytes.extend_from_slice(&0x0100u16.to_le_bytes());
            bytes.extend_from_slice(b"IM");
            Self { bytes }
        }

        fn scalar(&mut self, name: &str, value: f64) {
            self.matrix(name, 1, 1, &[value]);
        }

        /// `column_major` holds `rows × cols` values, column after column.
        fn matrix(&mut self, name: &str, rows: i32, cols: i32, column_major: &[f64]) {
            let mut body = Vec::new();
            // array flags: mxDOUBLE_CLASS
            push_tag(&mut body, 6, 8);
            body.extend_from_slice(&6u32.to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes());
            // dimensions
            push_tag(&mut body, 5, 8);
            body.extend_from_slice(&rows.to_le_bytes());
            body.extend_from_slice(&cols.to_le_bytes());
            // name
            push_tag(&mut body, 1, name.len() as u32);
            body.extend_from_slice(name.as_bytes());
            pad8(&mut body);
            // real part
            push_tag(&mut body, 9, (column_major.len() * 8) as u32);
            for v in column_major {
                body.extend_from_slice(&v.to_le_bytes());
            }

            push_tag(&mut self.bytes, 14, body.len() as u32);
            self.bytes.extend_from_slice(&body);
        }

        fn finish(self) -> Vec<u8> {
            self.bytes
        }
    }

    fn push_tag(out: &mut Vec<u8>, data_type: u32, len: u32) {
        out.extend_from_slice(&data_type.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
    }

    fn pad8(out: &mut Vec<u8>) {
        while out.len() % 8 != 0 {
            out.push(0);
        }
    }

    /// Two channels × four samples stored in the `.set`, no sidecars.
    fn write_embedded_set(dir: &Path) -> PathBuf {
        let path = dir.join("sub-01_task-rest_eeg.set");
        let mut mat = MatWriter::new();
        mat.scalar("srate", 128.0);
        mat.scalar("nbchan", 2.0);
        mat.scalar("pnts", 4.0);
        mat.scalar("trials", 1.0);
        // ch0 = 1,2,3,4 ; ch1 = -1,-2,-3,-4
        mat.matrix("data", 2, 4, &[1.0, -1.0, 2.0, -2.0, 3.0, -3.0, 4.0, -4.0]);
        std::fs::write(&path, mat.finish()).unwrap();
        path
    }

    #[test]
    fn test_embedded_set_without_sidecar_generates_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_embedded_set(dir.path());

        let reader = EeglabReader::open(&path, &ReaderOptions::default()).unwrap();
        assert_eq!(reader.metadata().channels, vec!["Ch1", "Ch2"]);
        assert_eq!(reader.metadata().sampling_rate, Some(128.0));

        let recording = reader.read().unwrap();
        assert_eq!(recording.num_samples(), 4);
        assert_eq!(recording.data()[[0, 3]], 4.0);
        assert_eq!(recording.data()[[1, 1]], -2.0);
    }

    #[test]
    fn test_embedded_set_uses_configured_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_embedded_set(dir.path());
        let options = ReaderOptions {
            channel_labels: Some(vec!["Fz".to_string(), "Pz".to_string()]),
            ..ReaderOptions::default()
        };

        let reader = EeglabReader::open(&path, &options).unwrap();
        assert_eq!(reader.metadata().channels, vec!["Fz", "Pz"]);

        let too_few = ReaderOptions {
            channel_labels: Some(vec!["Fz".to_string()]),
            ..ReaderOptions::default()
        };
        assert!(matches!(
            EeglabReader::open(&path, &too_few),
            Err(CogLoadError::Read(_))
        ));
    }

    #[test]
    fn test_sidecar_labels_win_over_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_embedded_set(dir.path());
        std::fs::write(
            dir.path().join("sub-01_task-rest_channels.tsv"),
            "name\ttype\nF3\tEEG\nP3\tEEG\n",
        )
        .unwrap();
        let options = ReaderOptions {
            channel_labels: Some(vec!["Fz".to_string(), "Pz".to_string()]),
            ..ReaderOptions::default()
        };

        let reader = EeglabReader::open(&path, &options).unwrap();
        assert_eq!(reader.metadata().channels, vec!["F3", "P3"]);
    }

    #[test]
    fn test_channels_tsv_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let set = dir.path().join("sub-01_task-nback_eeg.set");
        assert!(find_channels_tsv(&set).is_none());

        let tsv = dir.path().join("sub-01_task-nback_channels.tsv");
        std::fs::write(&tsv, "name\ttype\tunits\nFz\tEEG\tuV\nPz\tEEG\tuV\nFP1\tEEG\tuV\n").unwrap();
        assert_eq!(find_channels_tsv(&set), Some(tsv.clone()));
        assert_eq!(read_channels_tsv(&tsv).unwrap(), vec!["Fz", "Pz", "FP1"]);
    }

    #[test]
    fn test_channels_tsv_without_name_column() {
        let dir = tempfile::tempdir().unwrap();
        let tsv = dir.path().join("channels.tsv");
        std::fs::write(&tsv, "label\ttype\nFz\tEEG\n").unwrap();
        assert!(read_channels_tsv(&tsv).is_err());
    }

    #[test]
    fn test_hdf5_set_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.set");
        let mut bytes = vec![0x89, 0x48, 0x44, 0x46, 0x0d, 0x0a, 0x1a, 0x0a];
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&path, bytes).unwrap();
        assert!(matches!(
            EeglabReader::open(&path, &ReaderOptions::default()),
            Err(CogLoadError::UnsupportedFormat(_))
        ));
    }
}
