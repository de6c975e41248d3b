use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::compressed::{is_compressed_path, CompressedSource};
use crate::config::EngineConfig;
use crate::error::{EdfError, Result};
use crate::header::{EdfHeader, HEADER_BLOCK};
use crate::labels::Selection;
use crate::record::{ChannelData, Record, RecordLayout};
use crate::source::{FileSource, RecordSource};
use crate::store::RecordStore;
use crate::timeline::{Interval, RecordTimeline, Timeline, TimelineSpec};
use crate::utils::{advance_start, format_duration, parse_edf_time, tp_to_seconds};
use crate::EDF_TIME_DIMENSION;

/// An attached EDF/EDF+ recording.
///
/// The header is parsed once at attach time; records are decoded lazily, on
/// first access, and cached. All record/time mapping goes through the
/// timeline `T`.
///
/// # Examples
///
/// ```rust
/// use edfcore::Edf;
///
/// # edfcore::doctest_utils::create_simple_test_file("recording.edf")?;
/// let mut edf = Edf::open("recording.edf", "subject-1", &[])?;
///
/// println!("{} signals, {} records", edf.header().ns(), edf.header().record_count);
///
/// // first two seconds of the first channel, in physical units
/// let samples = edf.read_physical_slice(0, 2 * edfcore::EDF_TIME_DIMENSION, 0, 1)?;
/// assert_eq!(samples.len(), 512);
/// # std::fs::remove_file("recording.edf").ok();
/// # Ok::<(), edfcore::EdfError>(())
/// ```
pub struct Edf<T: Timeline = RecordTimeline> {
    pub id: String,
    pub(crate) path: Option<PathBuf>,
    pub(crate) header: EdfHeader,
    pub(crate) config: EngineConfig,
    pub(crate) layout: RecordLayout,
    pub(crate) source: Option<Box<dyn RecordSource>>,
    pub(crate) records: RecordStore,
    pub(crate) timeline: T,
}

/// Physical samples together with their time-points and record indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slice {
    pub data: Vec<f64>,
    pub time_points: Vec<u64>,
    pub records: Vec<usize>,
}

impl Edf<RecordTimeline> {
    /// Attaches a file with the default configuration and timeline.
    ///
    /// `signals` is an allow-list of channel labels (exact, `|`-separated
    /// alternatives, or wildcards); an empty slice selects every channel.
    ///
    /// # Errors
    ///
    /// * `EdfError::OpenFailure` - the file (or a compressed stream's index) cannot be opened
    /// * `EdfError::InvalidField` / `EdfError::InvalidFormat` - the header does not parse
    /// * `EdfError::SizeMismatch` - the file size disagrees with the header
    pub fn open<P: AsRef<Path>>(path: P, id: &str, signals: &[&str]) -> Result<Self> {
        Edf::open_with(path, id, signals, EngineConfig::default(), RecordTimeline::new())
    }
}

impl<T: Timeline> Edf<T> {
    /// Attaches a file with an explicit configuration and timeline.
    ///
    /// Paths ending in `.edfz` are read as a compressed stream with its
    /// `.idx` side index.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        id: &str,
        signals: &[&str],
        config: EngineConfig,
        timeline: T,
    ) -> Result<Self> {
        let path = path.as_ref();
        let selection = Selection::new(signals);
        let selection = if selection.is_empty() { None } else { Some(&selection) };

        let (header, layout, source): (EdfHeader, RecordLayout, Box<dyn RecordSource>) =
            if is_compressed_path(path) {
                // 压缩流: 头部和记录位置都来自 .idx 索引
                let mut stream = CompressedSource::open(path)?;
                let bytes = stream.header_bytes()?;
                let header = EdfHeader::read(&mut bytes.as_slice(), selection, &config)?;
                let layout = RecordLayout::from_header(&header);
                if layout.record_size != stream.record_size() {
                    return Err(EdfError::CompressedIndex(format!(
                        "record size {} in header but {} in index",
                        layout.record_size,
                        stream.record_size()
                    )));
                }
                if stream.record_count() < header.record_count_all {
                    return Err(EdfError::CompressedIndex(format!(
                        "index lists {} records, header declares {}",
                        stream.record_count(),
                        header.record_count_all
                    )));
                }
                (header, layout, Box::new(stream) as Box<dyn RecordSource>)
            } else {
                let file = File::open(path).map_err(|e| EdfError::open_failure(path, e))?;
                let file_size = file
                    .metadata()
                    .map_err(|e| EdfError::open_failure(path, e))?
                    .len();
                if file_size < HEADER_BLOCK as u64 {
                    return Err(EdfError::open_failure(
                        path,
                        format!("corrupt EDF, file < header size ({} bytes)", HEADER_BLOCK),
                    ));
                }

                // 读取并解析头部, 然后验证文件大小
                let mut reader = BufReader::new(file);
                let header = EdfHeader::read(&mut reader, selection, &config)?;
                let layout = RecordLayout::from_header(&header);
                check_file_size(&header, &layout, file_size)?;
                let count = header.record_count_all;
                (header, layout.clone(), Box::new(FileSource::new(reader, layout, count)) as Box<dyn RecordSource>)
            };

        let mut edf = Edf {
            id: id.to_string(),
            path: Some(path.to_path_buf()),
            header,
            config,
            layout,
            source: Some(source),
            records: RecordStore::new(),
            timeline,
        };

        // EDF+D 的时间轴需要读取每个记录的起点
        edf.init_timeline()?;

        if edf.header.file_type.is_plus() && edf.header.time_track().is_none() {
            if !edf.header.file_type.is_continuous() && edf.header.time_track_origin.is_none() {
                return Err(EdfError::MissingTimeTrack);
            }
            if edf.header.file_type.is_continuous() {
                debug!("EDF+ {} did not contain any time-track: adding", path.display());
                edf.add_continuous_time_track()?;
            }
        }

        info!(
            "attached {} [{}]: {} of {} signals in {} file, {} records of {}s, duration {}s",
            path.display(),
            edf.id,
            edf.header.ns(),
            edf.header.channel_count_all,
            if edf.header.file_type.is_plus() { "an EDF+" } else { "a standard EDF" },
            edf.header.record_count,
            edf.header.record_duration,
            tp_to_seconds(edf.timeline.total_duration())
        );

        Ok(edf)
    }

    /// Builds the timeline from the header, reading per-record onsets from the
    /// time-track of a discontinuous file.
    fn init_timeline(&mut self) -> Result<()> {
        let onsets = if self.header.file_type.is_continuous() {
            None
        } else {
            let mut onsets = Vec::with_capacity(self.header.record_count_all);
            for r in 0..self.header.record_count_all {
                onsets.push(self.timepoint_from_edf(r)?);
            }
            Some(onsets)
        };
        self.timeline.rebuild(&TimelineSpec {
            record_count: self.header.record_count_all,
            record_duration_tp: self.header.record_duration_tp,
            onsets,
        });
        Ok(())
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut EdfHeader {
        &mut self.header
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut T {
        &mut self.timeline
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn loaded(&self, r: usize) -> bool {
        self.records.contains(r)
    }

    /// Loads record `r` unless it is already cached.
    ///
    /// # Errors
    ///
    /// `EdfError::RecordUnavailable` if the record is not cached and there is
    /// no backing file to read it from.
    pub fn ensure_loaded(&mut self, r: usize) -> Result<()> {
        if self.records.contains(r) {
            return Ok(());
        }
        let source = self.source.as_mut().ok_or(EdfError::RecordUnavailable(r))?;
        let bytes = source.read_record(r)?;
        let mut record = Record::decode(&bytes, &self.header, &self.layout, self.config.endianness);

        // a time-track added in memory has no bytes on disk
        if let Some(t) = self.header.time_track() {
            let signal = &self.header.signals[t];
            if signal.origin.is_none() {
                let onset = self
                    .timeline
                    .record2interval(r)
                    .map_or(r as f64 * self.header.record_duration, |i| tp_to_seconds(i.start));
                record.channels[t] = ChannelData::Annotation(crate::continuity::time_track_payload(
                    onset,
                    signal.record_bytes(),
                ));
            }
        }

        debug!("loaded record {}", r);
        self.records.insert(r, record);
        Ok(())
    }

    /// Loads every retained, not yet cached record in `r1..=r2`.
    ///
    /// Bounds are clamped to the records of the backing file and an inverted
    /// range collapses to `r1`.
    pub fn read_records(&mut self, r1: usize, r2: usize) -> Result<()> {
        let nr_all = self.header.record_count_all;
        if nr_all == 0 {
            return Ok(());
        }
        let r1 = r1.min(nr_all - 1);
        let r2 = r2.max(r1).min(nr_all - 1);
        for r in r1..=r2 {
            if self.timeline.retained(r) && !self.records.contains(r) {
                self.ensure_loaded(r)?;
            }
        }
        Ok(())
    }

    /// Loads every retained record.
    pub fn load_all(&mut self) -> Result<()> {
        for r in self.timeline.records() {
            self.ensure_loaded(r)?;
        }
        Ok(())
    }

    /// Onset of record `r` of a discontinuous file, parsed from its
    /// time-track.
    ///
    /// # Errors
    ///
    /// * `EdfError::InvalidArgument` - the recording is not EDF+D
    /// * `EdfError::MissingTimeTrack` - the file has no time-track channel
    /// * `EdfError::InvalidFormat` - the onset text does not parse
    pub fn timepoint_from_edf(&mut self, r: usize) -> Result<u64> {
        if self.header.file_type.is_continuous() {
            return Err(EdfError::InvalidArgument(
                "record onsets are only stored in EDF+D files".to_string(),
            ));
        }
        let (offset, width) = self.header.time_track_offset().ok_or(EdfError::MissingTimeTrack)?;
        let source = self.source.as_mut().ok_or(EdfError::RecordUnavailable(r))?;
        let bytes = source.read_record(r)?;
        let track = &bytes[offset.min(bytes.len())..(offset + width).min(bytes.len())];

        let end = track
            .iter()
            .position(|&b| b == 0x14 || b == 0x15)
            .unwrap_or(track.len());
        let text = String::from_utf8_lossy(&track[..end]);
        let tp = parse_edf_time(&text).map_err(|_| {
            EdfError::InvalidFormat(format!("problem converting time-track [{}] in record {}", text, r))
        })?;
        u64::try_from(tp)
            .map_err(|_| EdfError::InvalidFormat(format!("negative record onset [{}] in record {}", text, r)))
    }

    /// Short description of the recording: source, clock times, duration
    /// and the channels held, with their sampling rates.
    pub fn description(&self) -> String {
        let h = &self.header;
        let duration_tp = (h.record_count as f64 * h.record_duration * EDF_TIME_DIMENSION as f64).round() as u64;
        let last = advance_start(&h.start_date, &h.start_time, self.timeline.last_time_point())
            .map_or_else(|| h.start_time.clone(), |(_, time)| time);
        let counts = h.channel_counts();

        let mut ss = String::new();
        let filename = self
            .path
            .as_ref()
            .map_or_else(|| "(in memory)".to_string(), |p| p.display().to_string());
        let _ = writeln!(ss, "EDF filename      : {}", filename);
        let _ = writeln!(ss, "ID                : {}", self.id);
        if h.file_type.is_plus() {
            let _ = writeln!(ss, "Header start time : {}", h.start_time);
            let _ = writeln!(ss, "Last observed time: {}", last);
        } else {
            let _ = writeln!(ss, "Clock time        : {} - {}", h.start_time, last);
        }
        let _ = writeln!(ss, "Duration          : {}", format_duration(duration_tp));

        if counts.data < counts.data_all {
            let _ = writeln!(ss, "# signals         : {} selected (of {})", counts.data, counts.data_all);
        } else {
            let _ = writeln!(ss, "# signals         : {}", counts.data);
        }
        if counts.annotation_all > 0 {
            if counts.annotation < counts.annotation_all {
                let _ = writeln!(
                    ss,
                    "# EDF annotations : {} selected (of {})",
                    counts.annotation, counts.annotation_all
                );
            } else {
                let _ = writeln!(ss, "# EDF annotations : {}", counts.annotation);
            }
        }

        let _ = write!(ss, "Signals           :");
        let data = (0..h.ns()).filter(|&s| h.is_data_channel(s));
        for (i, s) in data.enumerate() {
            if i > 0 && i % 6 == 0 {
                let _ = write!(ss, "\n                   ");
            }
            let _ = write!(ss, " {}[{}]", h.signals[s].label, h.signals[s].sampling_freq(h.record_duration));
        }
        let _ = writeln!(ss);
        ss
    }

    pub(crate) fn check_channel(&self, s: usize) -> Result<()> {
        let signal = self.header.signals.get(s).ok_or(EdfError::InvalidSignalIndex(s))?;
        if signal.annotation {
            return Err(EdfError::AnnotationChannel(signal.label.clone()));
        }
        Ok(())
    }

    /// Physical values of channel `s` between two time-points.
    ///
    /// Every `downsample`-th sample of each record is returned. A range that
    /// covers no sample gives an empty vector and a warning.
    pub fn read_physical_slice(&mut self, start: u64, stop: u64, s: usize, downsample: usize) -> Result<Vec<f64>> {
        Ok(self.fixedrate_signal(start, stop, s, downsample, false)?.data)
    }

    /// Like [`read_physical_slice`](Self::read_physical_slice), also returning
    /// the time-point and record of every sample.
    pub fn slice(&mut self, start: u64, stop: u64, s: usize, downsample: usize) -> Result<Slice> {
        self.fixedrate_signal(start, stop, s, downsample, true)
    }

    fn fixedrate_signal(&mut self, start: u64, stop: u64, s: usize, downsample: usize, track: bool) -> Result<Slice> {
        self.check_channel(s)?;
        let mut out = Slice::default();

        let stop = stop.min(self.timeline.last_time_point().saturating_add(1));
        let spr = self.header.signals[s].samples_per_record;

        let Some(span) = self.timeline.interval2records(Interval::new(start, stop), spr) else {
            warn!("empty interval returned for {} (check intervals/sampling rates)", self.header.signals[s].label);
            return Ok(out);
        };

        self.read_records(span.start_record, span.stop_record)?;

        // 逐记录转换为物理值
        let step = downsample.max(1);
        let signal = &self.header.signals[s];
        let mut r = Some(span.start_record);
        while let Some(rec) = r {
            if rec > span.stop_record {
                break;
            }
            let record = self.records.get(rec).ok_or(EdfError::RecordUnavailable(rec))?;
            let data = record.digital(s).ok_or(EdfError::RecordUnavailable(rec))?;
            let first = if rec == span.start_record { span.start_sample } else { 0 };
            let last = if rec == span.stop_record { span.stop_sample } else { spr - 1 };
            for j in (first..=last.min(data.len().saturating_sub(1))).step_by(step) {
                out.data.push(signal.to_physical(data[j]));
                if track {
                    out.time_points.push(self.timeline.timepoint(rec, j, spr).unwrap_or(0));
                    out.records.push(rec);
                }
            }
            r = self.timeline.next_record(rec);
        }
        Ok(out)
    }

    /// The whole physical signal of channel `s`, across all retained records.
    pub fn physical_signal(&mut self, s: usize) -> Result<Vec<f64>> {
        self.check_channel(s)?;
        let records = self.timeline.records();
        let mut out = Vec::with_capacity(records.len() * self.header.signals[s].samples_per_record);
        for r in records {
            self.ensure_loaded(r)?;
            let data = self
                .records
                .get(r)
                .and_then(|rec| rec.digital(s))
                .ok_or(EdfError::RecordUnavailable(r))?;
            let signal = &self.header.signals[s];
            out.extend(data.iter().map(|&d| signal.to_physical(d)));
        }
        Ok(out)
    }
}

fn check_file_size(header: &EdfHeader, layout: &RecordLayout, observed: u64) -> Result<()> {
    let expected = layout.header_size as u64 + header.record_count_all as u64 * layout.record_size as u64;
    if observed == expected {
        return Ok(());
    }
    let record_discrepancy = if layout.record_size == 0 {
        0.0
    } else {
        (observed as f64 - expected as f64) / layout.record_size as f64
    };
    Err(EdfError::SizeMismatch {
        expected,
        observed,
        record_discrepancy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch_reports_records() {
        let mut header = EdfHeader::new(2, 1.0, "01.01.20", "00.00.00");
        header.channel_count_all = 1;
        header.samples_per_record_all = vec![4];
        let layout = RecordLayout::from_header(&header);
        assert!(check_file_size(&header, &layout, 512 + 16).is_ok());

        match check_file_size(&header, &layout, 512 + 24) {
            Err(EdfError::SizeMismatch {
                expected,
                observed,
                record_discrepancy,
            }) => {
                assert_eq!(expected, 528);
                assert_eq!(observed, 536);
                assert!((record_discrepancy - 1.0).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn test_open_missing_file() {
        let err = Edf::open("/nonexistent/path/recording.edf", "x", &[]).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Open);
    }
}
