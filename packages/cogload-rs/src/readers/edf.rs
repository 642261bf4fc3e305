// EDF / EDF+ reader
// Format reference: https://www.edfplus.info/specs/edf.html

use super::{mmap_file, resolve_sampling_rate, ReaderOptions, RecordingMetadata, RecordingReader};
use crate::error::{CogLoadError, Result};
use crate::types::Recording;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

const MAIN_HEADER_BYTES: usize = 256;
const SIGNAL_HEADER_BYTES: usize = 256;
const ANNOTATION_LABEL: &str = "EDF Annotations";

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,              // 8 bytes
    pub patient_id: String,           // 80 bytes
    pub recording_id: String,         // 80 bytes
    pub start_date: String,           // 8 bytes: dd.mm.yy
    pub start_time: String,           // 8 bytes: hh.mm.ss
    pub header_bytes: usize,          // 8 bytes
    pub reserved: String,             // 44 bytes: "EDF+C"/"EDF+D" for EDF+
    pub num_data_records: i64,        // 8 bytes: -1 if unknown
    pub duration_of_data_record: f64, // 8 bytes: seconds
    pub num_signals: usize,           // 4 bytes
}

#[derive(Debug, Clone)]
pub struct EdfSignalHeader {
    pub label: String,                 // 16 bytes
    pub transducer_type: String,       // 80 bytes
    pub physical_dimension: String,    // 8 bytes
    pub physical_minimum: f64,         // 8 bytes
    pub physical_maximum: f64,         // 8 bytes
    pub digital_minimum: i64,          // 8 bytes
    pub digital_maximum: i64,          // 8 bytes
    pub prefiltering: String,          // 80 bytes
    pub num_samples_per_record: usize, // 8 bytes
}

impl EdfSignalHeader {
    pub fn sample_frequency(&self, record_duration: f64) -> f64 {
        self.num_samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum)
            / (self.digital_maximum - self.digital_minimum) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }

    pub fn is_annotation(&self) -> bool {
        self.label == ANNOTATION_LABEL
    }
}

/// Cursor over the fixed-width ASCII header fields
struct FieldCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn string(&mut self, size: usize) -> Result<String> {
        let end = self.pos + size;
        let field = self.bytes.get(self.pos..end).ok_or_else(|| {
            CogLoadError::Read(format!("EDF header truncated at byte {}", self.pos))
        })?;
        self.pos = end;
        Ok(String::from_utf8_lossy(field).trim().to_string())
    }

    fn parse<T: std::str::FromStr>(&mut self, size: usize, what: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let s = self.string(size)?;
        s.parse::<T>()
            .map_err(|e| CogLoadError::Read(format!("Invalid {} '{}': {}", what, s, e)))
    }

    fn strings(&mut self, count: usize, size: usize) -> Result<Vec<String>> {
        (0..count).map(|_| self.string(size)).collect()
    }

    fn parsed<T: std::str::FromStr>(&mut self, count: usize, size: usize, what: &str) -> Result<Vec<T>>
    where
        T::Err: std::fmt::Display,
    {
        (0..count).map(|_| self.parse(size, what)).collect()
    }
}

fn parse_header(bytes: &[u8]) -> Result<EdfHeader> {
    let mut cursor = FieldCursor::new(bytes);
    let header = EdfHeader {
        version: cursor.string(8)?,
        patient_id: cursor.string(80)?,
        recording_id: cursor.string(80)?,
        start_date: cursor.string(8)?,
        start_time: cursor.string(8)?,
        header_bytes: cursor.parse(8, "header size")?,
        reserved: cursor.string(44)?,
        num_data_records: cursor.parse(8, "number of data records")?,
        duration_of_data_record: cursor.parse(8, "record duration")?,
        num_signals: cursor.parse(4, "number of signals")?,
    };
    log::debug!(
        "EDF header parsed: num_data_records={}, duration_of_data_record={}, num_signals={}",
        header.num_data_records,
        header.duration_of_data_record,
        header.num_signals
    );
    Ok(header)
}

// Signal header fields are stored field-major: all labels, then all
// transducer types, and so on.
fn parse_signal_headers(bytes: &[u8], ns: usize) -> Result<Vec<EdfSignalHeader>> {
    let mut cursor = FieldCursor::new(bytes);
    let labels = cursor.strings(ns, 16)?;
    let transducers = cursor.strings(ns, 80)?;
    let dimensions = cursor.strings(ns, 8)?;
    let physical_min: Vec<f64> = cursor.parsed(ns, 8, "physical minimum")?;
    let physical_max: Vec<f64> = cursor.parsed(ns, 8, "physical maximum")?;
    let digital_min: Vec<i64> = cursor.parsed(ns, 8, "digital minimum")?;
    let digital_max: Vec<i64> = cursor.parsed(ns, 8, "digital maximum")?;
    let prefiltering = cursor.strings(ns, 80)?;
    let samples: Vec<usize> = cursor.parsed(ns, 8, "samples per record")?;

    let headers = (0..ns)
        .map(|i| EdfSignalHeader {
            label: labels[i].clone(),
            transducer_type: transducers[i].clone(),
            physical_dimension: dimensions[i].clone(),
            physical_minimum: physical_min[i],
            physical_maximum: physical_max[i],
            digital_minimum: digital_min[i],
            digital_maximum: digital_max[i],
            prefiltering: prefiltering[i].clone(),
            num_samples_per_record: samples[i],
        })
        .collect();
    Ok(headers)
}

fn size_overflow(what: &str) -> CogLoadError {
    CogLoadError::Read(format!("EDF {} overflows", what))
}

/// Bytes taken by `num_records` records of `record_size` bytes.
fn data_size(num_records: usize, record_size: usize) -> Result<usize> {
    num_records
        .checked_mul(record_size)
        .ok_or_else(|| size_overflow("data size"))
}

pub struct EdfReader {
    path: PathBuf,
    header: EdfHeader,
    signal_headers: Vec<EdfSignalHeader>,
    /// Indices of the data signals (annotation channels excluded)
    data_signals: Vec<usize>,
    num_records: usize,
    /// Bytes per data record, all signals included
    record_size: usize,
    metadata: RecordingMetadata,
}

impl EdfReader {
    pub fn open(path: &Path, options: &ReaderOptions) -> Result<Self> {
        let mmap = mmap_file(path)?;
        let header = parse_header(&mmap)?;
        if header.duration_of_data_record <= 0.0 {
            return Err(CogLoadError::Read(format!(
                "Invalid record duration {}",
                header.duration_of_data_record
            )));
        }

        if header.header_bytes > mmap.len() {
            return Err(CogLoadError::Read(format!(
                "EDF header size {} exceeds file size {}",
                header.header_bytes,
                mmap.len()
            )));
        }
        let signal_end = header
            .num_signals
            .checked_mul(SIGNAL_HEADER_BYTES)
            .and_then(|n| n.checked_add(MAIN_HEADER_BYTES))
            .ok_or_else(|| size_overflow("signal header size"))?;
        let signal_bytes = mmap
            .get(MAIN_HEADER_BYTES..signal_end)
            .ok_or_else(|| CogLoadError::Read("EDF signal headers truncated".to_string()))?;
        let signal_headers = parse_signal_headers(signal_bytes, header.num_signals)?;

        let data_signals: Vec<usize> = signal_headers
            .iter()
            .enumerate()
            .filter(|(_, sh)| !sh.is_annotation())
            .map(|(i, _)| i)
            .collect();

        let samples_per_record = match data_signals.first() {
            Some(&first) => signal_headers[first].num_samples_per_record,
            None => 0,
        };
        if let Some(&odd) = data_signals
            .iter()
            .find(|&&i| signal_headers[i].num_samples_per_record != samples_per_record)
        {
            return Err(CogLoadError::Read(format!(
                "Channel '{}' has {} samples per record, expected {}; mixed sampling rates are not supported",
                signal_headers[odd].label, signal_headers[odd].num_samples_per_record, samples_per_record
            )));
        }
        for &i in &data_signals {
            if signal_headers[i].digital_maximum == signal_headers[i].digital_minimum {
                return Err(CogLoadError::Read(format!(
                    "Channel '{}' has an empty digital range",
                    signal_headers[i].label
                )));
            }
        }

        // A record count of -1 means the writer never finalized the header
        let record_size = Self::record_size(&signal_headers)?;
        let available = mmap.len() - header.header_bytes;
        let num_records = if header.num_data_records < 0 {
            if record_size == 0 {
                0
            } else {
                available / record_size
            }
        } else {
            header.num_data_records as usize
        };
        let promised = data_size(num_records, record_size)?;
        if promised > available {
            return Err(CogLoadError::Read(format!(
                "EDF file has {} bytes of data, header promises {}",
                available, promised
            )));
        }

        let mut metadata = RecordingMetadata::new(path, "EDF")?;
        metadata.channels = data_signals
            .iter()
            .map(|&i| signal_headers[i].label.clone())
            .collect();
        metadata.num_channels = data_signals.len();
        metadata.num_samples = num_records * samples_per_record;
        metadata.start_time = Some(format!("{} {}", header.start_date, header.start_time));
        let stored = data_signals
            .first()
            .map(|&i| signal_headers[i].sample_frequency(header.duration_of_data_record));
        metadata.set_sampling_rate(resolve_sampling_rate(stored, options, &metadata.file_name));

        Ok(Self {
            path: path.to_path_buf(),
            header,
            signal_headers,
            data_signals,
            num_records,
            record_size,
            metadata,
        })
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    pub fn signal_headers(&self) -> &[EdfSignalHeader] {
        &self.signal_headers
    }

    fn record_size(signal_headers: &[EdfSignalHeader]) -> Result<usize> {
        signal_headers
            .iter()
            .try_fold(0usize, |acc, sh| {
                sh.num_samples_per_record
                    .checked_mul(2)
                    .and_then(|bytes| acc.checked_add(bytes))
            })
            .ok_or_else(|| size_overflow("record size"))
    }
}

impl RecordingReader for EdfReader {
    fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    fn read(&self) -> Result<Recording> {
        let mmap = mmap_file(&self.path)?;
        let data = mmap.get(self.header.header_bytes..).ok_or_else(|| {
            CogLoadError::Read(format!("{} is shorter than its header", self.metadata.file_name))
        })?;
        let record_size = self.record_size;

        // Byte offset of every signal inside a record
        let mut offsets = Vec::with_capacity(self.signal_headers.len());
        let mut acc = 0;
        for sh in &self.signal_headers {
            offsets.push(acc);
            acc += sh.num_samples_per_record * 2;
        }

        let rows: Vec<Vec<f64>> = self
            .data_signals
            .par_iter()
            .map(|&signal| {
                let sh = &self.signal_headers[signal];
                let gain = sh.gain();
                let offset = sh.offset();
                let mut samples = Vec::with_capacity(self.num_records * sh.num_samples_per_record);
                for record in 0..self.num_records {
                    let start = record * record_size + offsets[signal];
                    let bytes = data
                        .get(start..start + sh.num_samples_per_record * 2)
                        .ok_or_else(|| {
                            CogLoadError::Read(format!(
                                "{} truncated in data record {}",
                                self.metadata.file_name, record
                            ))
                        })?;
                    samples.extend(
                        bytes
                            .chunks_exact(2)
                            .map(|b| gain * i16::from_le_bytes([b[0], b[1]]) as f64 + offset),
                    );
                }
                Ok(samples)
            })
            .collect::<Result<_>>()?;

        let fs = self.metadata.sampling_rate.ok_or_else(|| {
            CogLoadError::Read(format!("{} has no data channels", self.metadata.file_name))
        })?;
        Recording::from_rows(self.metadata.channels.clone(), rows, fs)
    }

    fn format_name(&self) -> &str {
        "EDF"
    }
}
