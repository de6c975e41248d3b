//! In-memory recordings: empty containers and delimited-text import.

use std::io::BufRead;

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{EdfError, Result};
use crate::header::EdfHeader;
use crate::reader::Edf;
use crate::record::{Record, RecordLayout};
use crate::store::RecordStore;
use crate::timeline::{RecordTimeline, Timeline, TimelineSpec};

impl Edf<RecordTimeline> {
    /// A plain EDF recording of `record_count` blank records and no channels,
    /// with no backing file.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use edfcore::Edf;
    ///
    /// let mut edf = Edf::empty("demo", 10, 1.0, "01.01.24", "22.00.00");
    /// edf.add_signal("EEG", 128.0, &vec![0.0; 1280])?;
    /// assert_eq!(edf.header().signals[0].samples_per_record, 128);
    /// # Ok::<(), edfcore::EdfError>(())
    /// ```
    pub fn empty(id: &str, record_count: usize, record_duration: f64, start_date: &str, start_time: &str) -> Self {
        let header = EdfHeader::new(record_count, record_duration, start_date, start_time);
        let mut timeline = RecordTimeline::new();
        timeline.rebuild(&TimelineSpec {
            record_count,
            record_duration_tp: header.record_duration_tp,
            onsets: None,
        });
        let records: RecordStore = (0..record_count).map(|r| (r, Record::default())).collect();

        Edf {
            id: id.to_string(),
            path: None,
            layout: RecordLayout::from_header(&header),
            header,
            config: EngineConfig::default(),
            source: None,
            records,
            timeline,
        }
    }

    /// Builds a recording from columns of delimited text, one row per sample.
    ///
    /// Fields are separated by whitespace, commas or tabs. A first line
    /// starting with `#` names the columns; otherwise `labels` does, falling
    /// back to `S1`, `S2`, ... Records last one second, so `sample_rate` must
    /// be a whole number. Samples past the last complete record are dropped
    /// with a warning.
    ///
    /// # Errors
    ///
    /// * `EdfError::InvalidField` - a value is not a number
    /// * `EdfError::InvalidFormat` - rows of unequal width, or no complete record
    /// * `EdfError::NonIntegralSampleCount` - `sample_rate` is not a whole number
    pub fn from_text<R: BufRead>(
        reader: R,
        id: &str,
        sample_rate: f64,
        labels: &[&str],
        start_date: &str,
        start_time: &str,
    ) -> Result<Self> {
        if sample_rate <= 0.0 || (sample_rate - sample_rate.round()).abs() > 1e-9 {
            return Err(EdfError::NonIntegralSampleCount {
                label: id.to_string(),
                implied: sample_rate,
            });
        }
        let spr = sample_rate.round() as usize;

        let mut header_row: Option<Vec<String>> = None;
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut rows = 0usize;

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(names) = line.strip_prefix('#') {
                if rows == 0 && header_row.is_none() {
                    header_row = Some(fields(names).map(str::to_string).collect());
                }
                continue;
            }

            let values = fields(line)
                .map(|t| {
                    t.parse::<f64>().map_err(|_| EdfError::InvalidField {
                        field: "sample value",
                        raw: t.to_string(),
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            if columns.is_empty() {
                columns = vec![Vec::new(); values.len()];
            }
            if values.len() != columns.len() {
                return Err(EdfError::InvalidFormat(format!(
                    "line {}: expected {} values, found {}",
                    n + 1,
                    columns.len(),
                    values.len()
                )));
            }
            for (c, v) in values.into_iter().enumerate() {
                columns[c].push(v);
            }
            rows += 1;
        }

        let record_count = rows / spr;
        if record_count == 0 {
            return Err(EdfError::InvalidFormat(format!(
                "{} rows do not fill a single {}-sample record",
                rows, spr
            )));
        }
        let kept = record_count * spr;
        if kept < rows {
            warn!("dropping {} trailing samples that do not fill a whole record", rows - kept);
        }

        let names: Vec<String> = match header_row {
            Some(h) if h.len() == columns.len() => h,
            _ if labels.len() == columns.len() => labels.iter().map(|l| l.to_string()).collect(),
            _ => (1..=columns.len()).map(|i| format!("S{}", i)).collect(),
        };

        let mut edf = Edf::empty(id, record_count, 1.0, start_date, start_time);
        for (name, data) in names.iter().zip(columns.iter()) {
            edf.add_signal(name, sample_rate, &data[..kept])?;
        }
        debug!("read {} channels, {} records from text", columns.len(), record_count);
        Ok(edf)
    }
}

fn fields(line: &str) -> impl Iterator<Item = &str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileType;

    #[test]
    fn test_empty_recording() {
        let edf = Edf::empty("e", 4, 2.0, "01.01.20", "00.00.00");
        assert_eq!(edf.header().ns(), 0);
        assert_eq!(edf.records().len(), 4);
        assert_eq!(edf.timeline().total_duration(), 8 * crate::EDF_TIME_DIMENSION);
        assert_eq!(edf.header().file_type, FileType::Edf);
    }

    #[test]
    fn test_from_text_with_header_row() {
        let text = "# A B\n1 10\n2,20\n3\t30\n4 40\n5 50\n";
        let edf = Edf::from_text(text.as_bytes(), "txt", 2.0, &[], "01.01.20", "00.00.00").unwrap();
        assert_eq!(edf.header().ns(), 2);
        assert_eq!(edf.header().signals[1].label, "B");
        assert_eq!(edf.header().record_count, 2);
        assert_eq!(edf.header().file_type, FileType::Edf);
        assert!(edf.header().time_track().is_none());
    }

    #[test]
    fn test_from_text_default_labels() {
        let text = "1 2 3\n4 5 6\n";
        let edf = Edf::from_text(text.as_bytes(), "txt", 1.0, &[], "01.01.20", "00.00.00").unwrap();
        let labels: Vec<&str> = edf.header().signals.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["S1", "S2", "S3"]);
    }

    #[test]
    fn test_from_text_rejects_ragged_rows() {
        let text = "1 2\n3\n";
        let err = Edf::from_text(text.as_bytes(), "txt", 1.0, &[], "01.01.20", "00.00.00").err().unwrap();
        assert!(matches!(err, EdfError::InvalidFormat(_)));
    }
}
