// Text-based recordings (CSV and whitespace-separated ASCII)
//
// - first row holds channel labels when any of its fields is non-numeric
// - one column per channel, one row per sample
// - CSV follows RFC 4180 quoting
// - no sampling rate in the file; it has to come from the options

use super::{fallback_labels, ReaderOptions, RecordingMetadata, RecordingReader};
use crate::error::{CogLoadError, Result};
use crate::types::Recording;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Comma,
    Whitespace,
}

/// Fields of one non-blank row and its 1-based line number
type Row = (u64, Vec<String>);

impl Delimiter {
    fn rows(&self, content: &str) -> Result<Vec<Row>> {
        match self {
            Delimiter::Comma => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .flexible(true)
                    .trim(csv::Trim::All)
                    .from_reader(content.as_bytes());
                let mut rows = Vec::new();
                for record in reader.records() {
                    let record = record?;
                    if record.iter().all(str::is_empty) {
                        continue;
                    }
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    rows.push((line, record.iter().map(str::to_string).collect()));
                }
                Ok(rows)
            }
            Delimiter::Whitespace => Ok(content
                .lines()
                .enumerate()
                .filter(|(_, l)| !l.trim().is_empty())
                .map(|(i, l)| (i as u64 + 1, l.split_whitespace().map(str::to_string).collect()))
                .collect()),
        }
    }
}

pub struct TextReader {
    path: PathBuf,
    delimiter: Delimiter,
    has_header: bool,
    metadata: RecordingMetadata,
}

impl TextReader {
    pub fn csv(path: &Path, options: &ReaderOptions) -> Result<Self> {
        Self::open(path, Delimiter::Comma, "CSV", options)
    }

    pub fn ascii(path: &Path, options: &ReaderOptions) -> Result<Self> {
        Self::open(path, Delimiter::Whitespace, "ASCII", options)
    }

    fn open(path: &Path, delimiter: Delimiter, file_type: &str, options: &ReaderOptions) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let rows = delimiter.rows(&content)?;
        let (_, fields) = rows
            .first()
            .ok_or_else(|| CogLoadError::Read(format!("{} is empty", path.display())))?;

        let mut metadata = RecordingMetadata::new(path, file_type)?;
        let has_header = fields.iter().any(|s| s.parse::<f64>().is_err());
        let channels: Vec<String> = if has_header {
            fields.iter().map(|s| s.trim_matches('"').to_string()).collect()
        } else {
            fallback_labels(options, fields.len(), &metadata.file_name)?
        };
        let num_samples = rows.len() - usize::from(has_header);

        metadata.num_channels = channels.len();
        metadata.channels = channels;
        metadata.num_samples = num_samples;
        metadata.set_sampling_rate(options.sampling_rate_hz);

        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
            has_header,
            metadata,
        })
    }

    fn parse_rows(&self, content: &str) -> Result<Vec<Vec<f64>>> {
        let num_channels = self.metadata.num_channels;
        let rows = self.delimiter.rows(content)?;
        let samples = rows.get(usize::from(self.has_header)..).unwrap_or(&[]);

        let parsed: Vec<Vec<f64>> = samples
            .par_iter()
            .map(|(line, values)| {
                if values.len() != num_channels {
                    return Err(CogLoadError::Read(format!(
                        "Line {} has {} values, expected {} channels",
                        line,
                        values.len(),
                        num_channels
                    )));
                }
                values
                    .iter()
                    .enumerate()
                    .map(|(col, v)| {
                        v.parse::<f64>().map_err(|_| {
                            CogLoadError::Read(format!(
                                "Invalid numeric value '{}' at line {}, column {}",
                                v,
                                line,
                                col + 1
                            ))
                        })
                    })
                    .collect()
            })
            .collect::<Result<_>>()?;

        // rows are samples; transpose to [channel][sample]
        let mut data = vec![Vec::with_capacity(parsed.len()); num_channels];
        for row in parsed {
            for (ch, value) in row.into_iter().enumerate() {
                data[ch].push(value);
            }
        }
        Ok(data)
    }
}

impl RecordingReader for TextReader {
    fn metadata(&self) -> &RecordingMetadata {
        &self.metadata
    }

    fn read(&self) -> Result<Recording> {
        let fs = self.metadata.sampling_rate.ok_or_else(|| {
            CogLoadError::InvalidParameter(format!(
                "{} files carry no sampling rate; set sampling_rate_hz for {}",
                self.metadata.file_type, self.metadata.file_name
            ))
        })?;
        let content = std::fs::read_to_string(&self.path)?;
        let rows = self.parse_rows(&content)?;
        if rows.first().map(|r| r.is_empty()).unwrap_or(true) {
            return Err(CogLoadError::Read(format!(
                "No data rows found in {}",
                self.metadata.file_name
            )));
        }
        Recording::from_rows(self.metadata.channels.clone(), rows, fs)
    }

    fn format_name(&self) -> &str {
        &self.metadata.file_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(fs: f64) -> ReaderOptions {
        ReaderOptions {
            sampling_rate_hz: Some(fs),
            ..ReaderOptions::default()
        }
    }

    #[test]
    fn test_csv_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.csv");
        std::fs::write(&path, "Fz,Pz,FP1\n1.0,2.0,3.0\n4.0,5.0,6.0\n\n").unwrap();

        let reader = TextReader::csv(&path, &options(2.0)).unwrap();
        assert_eq!(reader.metadata().channels, vec!["Fz", "Pz", "FP1"]);
        assert_eq!(reader.metadata().num_samples, 2);
        assert_eq!(reader.metadata().duration_secs, Some(1.0));

        let rec = reader.read().unwrap();
        assert_eq!(rec.data().row(1).to_vec(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_ascii_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.txt");
        std::fs::write(&path, "1 2\n3\t4\n5   6\n").unwrap();

        let rec = TextReader::ascii(&path, &options(10.0)).unwrap().read().unwrap();
        assert_eq!(rec.channels(), &["Ch1".to_string(), "Ch2".to_string()][..]);
        assert_eq!(rec.num_samples(), 3);
        assert_eq!(rec.data()[[0, 2]], 5.0);
    }

    #[test]
    fn test_csv_quoted_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.csv");
        std::fs::write(&path, "\"Fz\", \"Pz\"\n\"1.0\",\"2.0\"\n3.5, \"-4\"\n").unwrap();

        let reader = TextReader::csv(&path, &options(1.0)).unwrap();
        assert_eq!(reader.metadata().channels, vec!["Fz", "Pz"]);
        assert_eq!(reader.metadata().num_samples, 2);

        let rec = reader.read().unwrap();
        assert_eq!(rec.data().row(0).to_vec(), vec![1.0, 3.5]);
        assert_eq!(rec.data().row(1).to_vec(), vec![2.0, -4.0]);
    }

    #[test]
    fn test_headerless_uses_configured_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.txt");
        std::fs::write(&path, "1 2\n3 4\n").unwrap();

        let labelled = ReaderOptions {
            channel_labels: Some(vec!["Fz".to_string(), "Pz".to_string()]),
            ..options(2.0)
        };
        let rec = TextReader::ascii(&path, &labelled).unwrap().read().unwrap();
        assert_eq!(rec.channels(), &["Fz".to_string(), "Pz".to_string()][..]);

        let wrong = ReaderOptions {
            channel_labels: Some(vec!["Fz".to_string()]),
            ..options(2.0)
        };
        assert!(matches!(TextReader::ascii(&path, &wrong), Err(CogLoadError::Read(_))));
    }

    #[test]
    fn test_requires_sampling_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.csv");
        std::fs::write(&path, "Fz\n1.0\n").unwrap();

        let reader = TextReader::csv(&path, &ReaderOptions::default()).unwrap();
        assert_eq!(reader.metadata().sampling_rate, None);
        assert!(matches!(reader.read(), Err(CogLoadError::InvalidParameter(_))));
    }

    #[test]
    fn test_ragged_and_non_numeric_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Fz,Pz\n1.0,2.0\n3.0\n").unwrap();
        assert!(matches!(
            TextReader::csv(&path, &options(1.0)).unwrap().read(),
            Err(CogLoadError::Read(_))
        ));

        std::fs::write(&path, "Fz,Pz\n1.0,2.0\n3.0,oops\n").unwrap();
        assert!(TextReader::csv(&path, &options(1.0)).unwrap().read().is_err());
    }

    #[test]
    fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "\n\n").unwrap();
        assert!(TextReader::csv(&path, &options(1.0)).is_err());
    }
}
