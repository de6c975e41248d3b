//! File-level header and per-channel metadata blocks.
//!
//! The on-disk header is 256 bytes followed by 256 bytes per channel, the
//! channel fields being stored column-wise (all labels, then all
//! transducers, and so on). Channels outside the allow-list are skipped but
//! their sample counts are kept, since they still occupy space in every
//! record.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::io::{ErrorKind as IoErrorKind, Read, Write};

use log::{debug, warn};

use crate::codec::{ascii7, put_double, put_int, put_str, FieldReader};
use crate::config::EngineConfig;
use crate::error::{EdfError, Result};
use crate::labels::{is_annotation_label, split_spec, uniquify, LabelAliases, Selection};
use crate::scaling::Scaling;
use crate::types::{FileType, SignalParam};
use crate::utils::seconds_to_tp;

/// Size of the fixed file-level block, and of each per-channel block.
pub const HEADER_BLOCK: usize = 256;

/// Upper bound accepted for the `number of signals` field.
pub const MAX_SIGNALS: i64 = 4096;

const RESERVED_BYTES: usize = 44;

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_info: String,
    pub start_date: String,
    pub start_time: String,
    pub header_bytes: usize,
    pub reserved: Vec<u8>,
    pub file_type: FileType,
    /// Records currently held by the recording
    pub record_count: usize,
    /// Records in the backing file; unchanged by restructuring
    pub record_count_all: usize,
    pub record_duration: f64,
    pub record_duration_tp: u64,
    /// Channels in the backing file, selected or not
    pub channel_count_all: usize,
    pub samples_per_record_all: Vec<usize>,
    pub signals: Vec<SignalParam>,
    /// De-duplicated on-disk label to on-disk channel index
    pub label_all: BTreeMap<String, usize>,
    pub time_track: Option<usize>,
    /// On-disk channel holding the time-track, selected or not
    pub time_track_origin: Option<usize>,
    /// Canonical label to the label it replaced
    pub aliasing: BTreeMap<String, String>,
    pub(crate) aliases: LabelAliases,
}

impl EdfHeader {
    /// Header of an in-memory recording with no channels.
    pub fn new(record_count: usize, record_duration: f64, start_date: &str, start_time: &str) -> Self {
        EdfHeader {
            version: "0".to_string(),
            patient_id: ".".to_string(),
            recording_info: ".".to_string(),
            start_date: start_date.to_string(),
            start_time: start_time.to_string(),
            header_bytes: HEADER_BLOCK,
            reserved: vec![b' '; RESERVED_BYTES],
            file_type: FileType::Edf,
            record_count,
            record_count_all: record_count,
            record_duration,
            record_duration_tp: seconds_to_tp(record_duration),
            channel_count_all: 0,
            samples_per_record_all: Vec::new(),
            signals: Vec::new(),
            label_all: BTreeMap::new(),
            time_track: None,
            time_track_origin: None,
            aliasing: BTreeMap::new(),
            aliases: LabelAliases::new(),
        }
    }

    /// Parses the header from `reader`, materializing only the channels that
    /// `selection` admits (all of them when `None`).
    ///
    /// # Errors
    ///
    /// * `EdfError::InvalidFormat` - the header is truncated
    /// * `EdfError::InvalidField` - a numeric field does not parse
    /// * `EdfError::InvalidSignalCount` - signal count outside `1..=4096`
    /// * `EdfError::DigitalRange` - `digital max <= digital min` on a data channel
    /// * `EdfError::AliasCollision` - two channels resolve to the same alias
    pub fn read<R: Read>(reader: &mut R, selection: Option<&Selection>, config: &EngineConfig) -> Result<Self> {
        let mut fixed = vec![0u8; HEADER_BLOCK];
        read_block(reader, &mut fixed)?;

        // 解析主头部 (256字节)
        let mut q = FieldReader::new(&fixed);
        let version = q.string(8)?;
        let patient_id = q.string(80)?;
        let recording_info = q.string(80)?;
        let start_date = q.string(8)?;
        let start_time = q.string(8)?;
        let header_bytes = non_negative(q.int("header bytes", 8)?, "header bytes")?;
        let mut reserved = q.bytes(RESERVED_BYTES)?;
        ascii7(&mut reserved, b' ');

        let mut file_type = FileType::from_reserved(&reserved);
        if config.force_edf {
            debug!("forcing read as EDF");
            file_type = FileType::Edf;
            reserved[..5].copy_from_slice(FileType::Edf.marker());
        }

        let record_count = non_negative(q.int("number of records", 8)?, "number of records")?;
        let record_duration = q.double("record duration", 8)?;
        if record_duration < 0.0 {
            return Err(EdfError::InvalidField {
                field: "record duration",
                raw: record_duration.to_string(),
            });
        }
        let ns_all = q.int("number of signals", 4)?;
        if !(1..=MAX_SIGNALS).contains(&ns_all) {
            return Err(EdfError::InvalidSignalCount(ns_all));
        }
        let ns_all = ns_all as usize;

        let mut block = vec![0u8; HEADER_BLOCK * ns_all];
        read_block(reader, &mut block)?;
        let mut p = FieldReader::new(&block);

        // 标签 (16字节), 重复的标签加后缀
        let mut labels = Vec::with_capacity(ns_all);
        let mut taken = BTreeSet::new();
        let mut label_all = BTreeMap::new();
        for s in 0..ns_all {
            let mut l = p.string(16)?.trim().to_string();
            if let Some(c) = config.space_replacement {
                l = l.replace(' ', &c.to_string());
            }
            let unique = uniquify(&l, &taken);
            if unique != l {
                debug!("uniquifying {} to {}", l, unique);
            }
            taken.insert(unique.clone());
            label_all.insert(unique.clone(), s);
            labels.push(unique);
        }

        let mut included = vec![false; ns_all];
        let mut annotation = vec![false; ns_all];
        let mut time_track_origin = None;
        for s in 0..ns_all {
            let l = &labels[s];
            annotation[s] = is_annotation_label(l);
            let mut include = match selection {
                Some(sel) if !sel.is_empty() => sel.matches(l, &taken, &config.aliases)?,
                _ => true,
            };
            if annotation[s] && (config.skip_annotations || config.force_edf) {
                include = false;
            }
            if include && annotation[s] && !file_type.is_plus() {
                warn!("detected an annotation channel in EDF: will treat as EDF+");
                file_type = FileType::EdfPlusC;
                reserved[..5].copy_from_slice(FileType::EdfPlusC.marker());
            }
            if annotation[s] && time_track_origin.is_none() && file_type.is_plus() {
                time_track_origin = Some(s);
                // EDF+D 的记录起点只存在于 time-track 中, 必须保留
                if !file_type.is_continuous() && !include {
                    debug!("keeping time-track {} of an EDF+D file", l);
                    include = true;
                }
            }
            included[s] = include;
        }

        // 未选中的通道只跳过字段, 每记录样本数除外
        let transducer = string_column(&mut p, &included, 80)?;
        let dimension = string_column(&mut p, &included, 8)?;
        let physical_min = double_column(&mut p, &included, "physical min")?;
        let physical_max = double_column(&mut p, &included, "physical max")?;
        let digital_min = int_column(&mut p, &included, "digital min")?;
        let digital_max = int_column(&mut p, &included, "digital max")?;
        let prefilter = string_column(&mut p, &included, 80)?;

        let mut samples_per_record_all = Vec::with_capacity(ns_all);
        for _ in 0..ns_all {
            let n = non_negative(p.int("samples per record", 8)?, "samples per record")?;
            samples_per_record_all.push(n);
        }

        let signal_reserved = string_column(&mut p, &included, 32)?;

        let mut signals = Vec::new();
        let mut time_track = None;
        for s in (0..ns_all).filter(|&s| included[s]) {
            let (dmin, dmax) = (digital_min[s] as i32, digital_max[s] as i32);
            if !annotation[s] && dmax <= dmin {
                return Err(EdfError::DigitalRange {
                    label: labels[s].clone(),
                    min: dmin,
                    max: dmax,
                });
            }
            if annotation[s] && time_track.is_none() {
                time_track = Some(signals.len());
            }
            let mut signal = SignalParam {
                label: labels[s].clone(),
                transducer: transducer[s].clone(),
                physical_dimension: dimension[s].clone(),
                physical_min: physical_min[s],
                physical_max: physical_max[s],
                digital_min: dmin,
                digital_max: dmax,
                orig_physical_min: physical_min[s],
                orig_physical_max: physical_max[s],
                orig_digital_min: dmin,
                orig_digital_max: dmax,
                prefilter: prefilter[s].clone(),
                samples_per_record: samples_per_record_all[s],
                reserved: signal_reserved[s].clone(),
                annotation: annotation[s],
                scaling: Scaling::identity(),
                origin: Some(s),
            };
            if !signal.annotation {
                signal.update_scaling();
            }
            signals.push(signal);
        }

        let mut header = EdfHeader {
            version,
            patient_id,
            recording_info,
            start_date,
            start_time,
            header_bytes,
            reserved,
            file_type,
            record_count,
            record_count_all: record_count,
            record_duration,
            record_duration_tp: seconds_to_tp(record_duration),
            channel_count_all: ns_all,
            samples_per_record_all,
            signals,
            label_all,
            time_track,
            time_track_origin,
            aliasing: BTreeMap::new(),
            aliases: config.aliases.clone(),
        };

        header.check_channels()?;
        header.swap_in_aliases();

        debug!(
            "header: {} of {} signals selected, {} records of {}s",
            header.ns(),
            ns_all,
            record_count,
            record_duration
        );

        Ok(header)
    }

    /// Serializes the header for the current channel set.
    pub fn write<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let bytes = self.to_bytes();
        out.write_all(&bytes)?;
        Ok(())
    }

    /// Renders the header bytes, updating `header_bytes` to match.
    pub fn to_bytes(&mut self) -> Vec<u8> {
        let ns = self.ns();
        self.header_bytes = HEADER_BLOCK + ns * HEADER_BLOCK;

        let mut out = Vec::with_capacity(self.header_bytes);
        put_str(&mut out, &self.version, 8);
        put_str(&mut out, &self.patient_id, 80);
        put_str(&mut out, &self.recording_info, 80);
        put_str(&mut out, &self.start_date, 8);
        put_str(&mut out, &self.start_time, 8);
        put_int(&mut out, self.header_bytes as i64, 8);
        let mut reserved = self.reserved.clone();
        reserved.resize(RESERVED_BYTES, b' ');
        out.extend_from_slice(&reserved);
        put_int(&mut out, self.record_count as i64, 8);
        put_double(&mut out, self.record_duration, 8);
        put_int(&mut out, ns as i64, 4);

        for s in &self.signals {
            put_str(&mut out, &s.label, 16);
        }
        for s in &self.signals {
            put_str(&mut out, &s.transducer, 80);
        }
        for s in &self.signals {
            put_str(&mut out, &s.physical_dimension, 8);
        }
        for s in &self.signals {
            put_double(&mut out, s.physical_min, 8);
        }
        for s in &self.signals {
            put_double(&mut out, s.physical_max, 8);
        }
        for s in &self.signals {
            put_int(&mut out, s.digital_min as i64, 8);
        }
        for s in &self.signals {
            put_int(&mut out, s.digital_max as i64, 8);
        }
        for s in &self.signals {
            put_str(&mut out, &s.prefilter, 80);
        }
        for s in &self.signals {
            put_int(&mut out, s.samples_per_record as i64, 8);
        }
        for s in &self.signals {
            put_str(&mut out, &s.reserved, 32);
        }
        out
    }

    pub fn ns(&self) -> usize {
        self.signals.len()
    }

    /// Size of the header of the backing file.
    pub fn header_size_all(&self) -> usize {
        HEADER_BLOCK + self.channel_count_all * HEADER_BLOCK
    }

    /// Size of one record in the backing file.
    pub fn record_size_all(&self) -> usize {
        self.samples_per_record_all.iter().map(|n| 2 * n).sum()
    }

    /// Size of one record for the current channel set.
    pub fn record_size(&self) -> usize {
        self.signals.iter().map(SignalParam::record_bytes).sum()
    }

    pub fn is_annotation_channel(&self, s: usize) -> bool {
        self.signals.get(s).map_or(false, |x| x.annotation)
    }

    pub fn is_data_channel(&self, s: usize) -> bool {
        self.signals.get(s).map_or(false, |x| !x.annotation)
    }

    pub fn time_track(&self) -> Option<usize> {
        self.time_track
    }

    /// Byte offset and width of the on-disk time-track within a record of
    /// the backing file.
    pub fn time_track_offset(&self) -> Option<(usize, usize)> {
        let origin = self.time_track_origin?;
        let offset = self.samples_per_record_all[..origin].iter().map(|n| 2 * n).sum();
        Some((offset, 2 * self.samples_per_record_all[origin]))
    }

    pub fn sampling_freq(&self, s: usize) -> Option<f64> {
        self.signals
            .get(s)
            .map(|x| x.sampling_freq(self.record_duration))
    }

    /// Index of the data channel labelled `label`. Channels named like an
    /// annotation channel are never found here.
    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.signals
            .iter()
            .position(|x| !x.annotation && !is_annotation_label(&x.label) && x.label == label)
    }

    /// Index of any channel, annotation or not, labelled `label`.
    pub fn channel_index(&self, label: &str) -> Option<usize> {
        self.signals.iter().position(|x| x.label == label)
    }

    /// Resolves one data channel from a label, `|`-separated alternatives or
    /// an alias.
    ///
    /// # Errors
    ///
    /// `EdfError::UnknownSignal` unless exactly one channel matches.
    pub fn signal(&self, spec: &str) -> Result<usize> {
        let mut found = Vec::new();
        for entry in split_spec(spec, ',') {
            if let Some((s, _)) = self.resolve(&entry)? {
                if !found.contains(&s) {
                    found.push(s);
                }
            }
        }
        match found.as_slice() {
            [s] => Ok(*s),
            _ => Err(EdfError::UnknownSignal(spec.to_string())),
        }
    }

    pub fn has_signal(&self, spec: &str) -> bool {
        split_spec(spec, '|').iter().any(|token| {
            self.label_index(token).is_some()
                || self.aliases.canonical(token).is_some()
                || self.aliasing.contains_key(token)
        })
    }

    /// Resolves a comma-separated list of channel specifications, or `*`
    /// for every channel. Unknown entries are skipped.
    ///
    /// An entry that matched on a non-first alternative relabels that channel
    /// to the first alternative.
    pub fn signal_list(&mut self, spec: &str, skip_annotations: bool) -> Result<Vec<usize>> {
        if spec.trim() == "*" {
            self.swap_in_aliases();
            return Ok((0..self.ns())
                .filter(|&s| !(skip_annotations && self.is_annotation_channel(s)))
                .collect());
        }

        let mut list = Vec::new();
        for entry in split_spec(spec, ',') {
            match self.resolve(&entry)? {
                Some((s, relabel)) => {
                    if let Some(label) = relabel {
                        debug!("relabelling {} to {}", self.signals[s].label, label);
                        self.signals[s].label = label;
                    }
                    if !list.contains(&s) {
                        list.push(s);
                    }
                }
                None => debug!("could not find signal [{}]", entry),
            }
        }
        Ok(list)
    }

    /// First data channel matching one `|`-separated entry, and the label it
    /// should carry if it matched on a non-first alternative.
    fn resolve(&self, entry: &str) -> Result<Option<(usize, Option<String>)>> {
        let tokens = self.aliases.expand(&split_spec(entry, '|'))?;
        for (t, token) in tokens.iter().enumerate() {
            if let Some(s) = self.label_index(token) {
                let relabel = if t > 0 { Some(tokens[0].clone()) } else { None };
                return Ok(Some((s, relabel)));
            }
        }
        Ok(None)
    }

    /// On-disk channel index for `label`, looking through aliases.
    pub fn original_signal(&self, label: &str) -> Option<usize> {
        if let Some(&s) = self.label_all.get(label) {
            return Some(s);
        }
        if let Some(original) = self.aliasing.get(label) {
            if let Some(&s) = self.label_all.get(original) {
                return Some(s);
            }
        }
        if let Some(canonical) = self.aliases.canonical(label) {
            if let Some(&s) = self.label_all.get(canonical) {
                return Some(s);
            }
        }
        self.aliases
            .alternates(label)?
            .iter()
            .find_map(|alt| self.label_all.get(alt).copied())
    }

    pub fn rename_channel(&mut self, old_label: &str, new_label: &str) {
        for s in self.signals.iter_mut().filter(|s| s.label == old_label) {
            s.label = new_label.to_string();
        }
        if let Some(&s) = self.label_all.get(old_label) {
            self.label_all.insert(new_label.to_string(), s);
        }
    }

    /// Fails if two distinct on-disk channels resolve to the same canonical
    /// alias.
    pub fn check_channels(&self) -> Result<()> {
        for (canonical, alternates) in self.aliases.iter() {
            let mut observed: Vec<&str> = alternates
                .iter()
                .filter(|a| self.label_all.contains_key(a.as_str()))
                .map(String::as_str)
                .collect();
            if self.label_all.contains_key(canonical) && !observed.is_empty() {
                observed.insert(0, canonical);
            }
            if observed.len() > 1 {
                return Err(EdfError::AliasCollision {
                    alias: canonical.to_string(),
                    labels: observed.join(" | "),
                });
            }
        }
        Ok(())
    }

    /// Replaces every label that is a registered alternate by its canonical
    /// form.
    pub(crate) fn swap_in_aliases(&mut self) {
        for s in 0..self.signals.len() {
            if self.signals[s].annotation {
                continue;
            }
            let label = self.signals[s].label.clone();
            if let Some(canonical) = self.aliases.canonical(&label) {
                self.aliasing.insert(canonical.to_string(), label);
                self.signals[s].label = canonical.to_string();
            }
        }
    }

    /// Data and annotation channels held now versus present on disk.
    pub fn channel_counts(&self) -> ChannelCounts {
        let annotation = self.signals.iter().filter(|s| s.annotation).count();
        let data = self.ns() - annotation;
        let annotation_on_disk = self.label_all.keys().filter(|l| is_annotation_label(l)).count();
        let data_on_disk = self.label_all.len() - annotation_on_disk;
        ChannelCounts {
            data,
            data_all: data_on_disk.max(data),
            annotation,
            annotation_all: annotation_on_disk.max(annotation),
        }
    }

    /// Every alias applied at read time, with the on-disk label it replaced.
    pub fn report_aliases(&self) -> Vec<(&str, &str)> {
        self.aliasing
            .iter()
            .map(|(alias, original)| (alias.as_str(), original.as_str()))
            .collect()
    }

    /// Human-readable description of the header.
    pub fn summary(&self) -> String {
        let mut ss = String::new();
        let _ = writeln!(ss, "Patient ID     : {}", self.patient_id);
        let _ = writeln!(ss, "Recording info : {}", self.recording_info);
        let _ = writeln!(ss, "Start date     : {}", self.start_date);
        let _ = writeln!(ss, "Start time     : {}", self.start_time);
        let _ = writeln!(ss);
        let _ = writeln!(ss, "# signals      : {}", self.ns());
        let _ = writeln!(ss, "# records      : {}", self.record_count);
        let _ = writeln!(ss, "Rec. dur. (s)  : {}", self.record_duration);
        let _ = writeln!(ss);

        for (i, s) in self.signals.iter().enumerate() {
            let _ = writeln!(ss, "Signal {} : [{}]", i + 1, s.label);
            if let Some(original) = self.aliasing.get(&s.label) {
                let _ = writeln!(ss, "\taliased from         : {}", original);
            }
            if s.annotation {
                let _ = writeln!(ss, "\tannotation channel");
                continue;
            }
            let _ = writeln!(ss, "\t# samples per record : {}", s.samples_per_record);
            let _ = writeln!(ss, "\ttransducer type      : {}", s.transducer);
            let _ = writeln!(ss, "\tphysical dimension   : {}", s.physical_dimension);
            let _ = writeln!(ss, "\tmin/max (phys)       : {}/{}", s.physical_min, s.physical_max);
            let _ = writeln!(ss, "\tEDF min/max (phys)   : {}/{}", s.orig_physical_min, s.orig_physical_max);
            let _ = writeln!(ss, "\tmin/max (digital)    : {}/{}", s.digital_min, s.digital_max);
            let _ = writeln!(ss, "\tEDF min/max (digital): {}/{}", s.orig_digital_min, s.orig_digital_max);
            let _ = writeln!(ss, "\tpre-filtering        : {}", s.prefilter);
            let _ = writeln!(ss);
        }
        ss
    }
}

/// See [`EdfHeader::channel_counts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCounts {
    pub data: usize,
    pub data_all: usize,
    pub annotation: usize,
    pub annotation_all: usize,
}

fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        IoErrorKind::UnexpectedEof => {
            EdfError::InvalidFormat(format!("file too short for a {}-byte header block", buf.len()))
        }
        _ => EdfError::Io(e),
    })
}

fn non_negative(value: i64, field: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| EdfError::InvalidField {
        field,
        raw: value.to_string(),
    })
}

fn string_column(p: &mut FieldReader, included: &[bool], width: usize) -> Result<Vec<String>> {
    let mut column = Vec::with_capacity(included.len());
    for &inc in included {
        if inc {
            column.push(p.string(width)?);
        } else {
            p.skip(width)?;
            column.push(String::new());
        }
    }
    Ok(column)
}

fn double_column(p: &mut FieldReader, included: &[bool], field: &'static str) -> Result<Vec<f64>> {
    let mut column = Vec::with_capacity(included.len());
    for &inc in included {
        if inc {
            column.push(p.double(field, 8)?);
        } else {
            p.skip(8)?;
            column.push(0.0);
        }
    }
    Ok(column)
}

fn int_column(p: &mut FieldReader, included: &[bool], field: &'static str) -> Result<Vec<i64>> {
    let mut column = Vec::with_capacity(included.len());
    for &inc in included {
        if inc {
            column.push(p.int(field, 8)?);
        } else {
            p.skip(8)?;
            column.push(0);
        }
    }
    Ok(column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_channel_header() -> EdfHeader {
        let mut header = EdfHeader::new(3, 1.0, "01.01.20", "10.00.00");
        header.file_type = FileType::EdfPlusC;
        header.reserved[..5].copy_from_slice(FileType::EdfPlusC.marker());
        let mut eeg = SignalParam::data("EEG C4", 4, -200.0, 200.0);
        eeg.physical_dimension = "uV".to_string();
        eeg.origin = Some(0);
        let mut emg = SignalParam::data("EMG", 2, -1.0, 1.0);
        emg.origin = Some(1);
        header.signals = vec![eeg, emg];
        header.channel_count_all = 2;
        header.samples_per_record_all = vec![4, 2];
        header.label_all.insert("EEG C4".to_string(), 0);
        header.label_all.insert("EMG".to_string(), 1);
        header
    }

    #[test]
    fn test_header_round_trip() {
        let mut header = two_channel_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 256 + 2 * 256);
        assert_eq!(&bytes[192..197], b"EDF+C");

        let parsed = EdfHeader::read(&mut bytes.as_slice(), None, &EngineConfig::default()).unwrap();
        assert_eq!(parsed.ns(), 2);
        assert_eq!(parsed.record_count, 3);
        assert_eq!(parsed.signals[0].label, "EEG C4");
        assert_eq!(parsed.signals[0].physical_dimension, "uV");
        assert_eq!(parsed.signals[1].samples_per_record, 2);
        assert_eq!(parsed.record_size_all(), 12);
        assert_eq!(parsed.file_type, FileType::EdfPlusC);
    }

    #[test]
    fn test_selection_keeps_layout_of_skipped_channels() {
        let mut header = two_channel_header();
        let bytes = header.to_bytes();
        let selection = Selection::new(&["EMG"]);
        let parsed = EdfHeader::read(&mut bytes.as_slice(), Some(&selection), &EngineConfig::default()).unwrap();
        assert_eq!(parsed.ns(), 1);
        assert_eq!(parsed.signals[0].origin, Some(1));
        assert_eq!(parsed.channel_count_all, 2);
        assert_eq!(parsed.record_size_all(), 12);
    }

    #[test]
    fn test_bad_numeric_field_is_fatal() {
        let mut header = two_channel_header();
        let mut bytes = header.to_bytes();
        // first digital max field
        let at = 256 + 2 * (16 + 80 + 8 + 8 + 8 + 8);
        bytes[at..at + 8].copy_from_slice(b"12x4    ");
        let err = EdfHeader::read(&mut bytes.as_slice(), None, &EngineConfig::default()).unwrap_err();
        match err {
            EdfError::InvalidField { field, raw } => {
                assert_eq!(field, "digital max");
                assert_eq!(raw, "12x4");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_labels_are_uniquified() {
        let mut header = two_channel_header();
        header.signals[1].label = "EEG C4".to_string();
        let bytes = header.to_bytes();
        let parsed = EdfHeader::read(&mut bytes.as_slice(), None, &EngineConfig::default()).unwrap();
        assert_eq!(parsed.signals[1].label, "EEG C4.1");
        assert_eq!(parsed.label_all.get("EEG C4.1"), Some(&1));
    }

    #[test]
    fn test_aliases_swapped_at_read() {
        let mut header = two_channel_header();
        let bytes = header.to_bytes();
        let mut aliases = LabelAliases::new();
        aliases.add("C4", &["EEG C4", "C4-M1"]).unwrap();
        let config = EngineConfig::default().with_aliases(aliases);
        let parsed = EdfHeader::read(&mut bytes.as_slice(), None, &config).unwrap();
        assert_eq!(parsed.signals[0].label, "C4");
        assert_eq!(parsed.original_signal("C4"), Some(0));
        assert_eq!(parsed.signal("EEG C4").unwrap(), 0);
        assert!(parsed.summary().contains("aliased from         : EEG C4"));
        assert_eq!(parsed.report_aliases(), vec![("C4", "EEG C4")]);
    }

    #[test]
    fn test_channel_counts_after_selection() {
        let mut header = two_channel_header();
        header.signals.push(SignalParam::annotation("EDF Annotations", 15));
        header.channel_count_all = 3;
        header.samples_per_record_all.push(15);
        header.label_all.insert("EDF Annotations".to_string(), 2);
        let bytes = header.to_bytes();

        let parsed = EdfHeader::read(&mut bytes.as_slice(), None, &EngineConfig::default()).unwrap();
        let counts = parsed.channel_counts();
        assert_eq!((counts.data, counts.data_all), (2, 2));
        assert_eq!((counts.annotation, counts.annotation_all), (1, 1));
        assert!(parsed.report_aliases().is_empty());

        let selection = Selection::new(&["EMG"]);
        let config = EngineConfig::default().with_skip_annotations(true);
        let parsed = EdfHeader::read(&mut bytes.as_slice(), Some(&selection), &config).unwrap();
        let counts = parsed.channel_counts();
        assert_eq!((counts.data, counts.data_all), (1, 2));
        assert_eq!((counts.annotation, counts.annotation_all), (0, 1));
    }

    #[test]
    fn test_alias_collision_is_fatal() {
        let mut header = two_channel_header();
        header.signals[1].label = "C4-M1".to_string();
        let bytes = header.to_bytes();
        let mut aliases = LabelAliases::new();
        aliases.add("C4", &["EEG C4", "C4-M1"]).unwrap();
        let config = EngineConfig::default().with_aliases(aliases);
        let err = EdfHeader::read(&mut bytes.as_slice(), None, &config).unwrap_err();
        assert!(matches!(err, EdfError::AliasCollision { .. }));
    }

    #[test]
    fn test_signal_count_bounds() {
        let mut header = two_channel_header();
        let mut bytes = header.to_bytes();
        bytes[252..256].copy_from_slice(b"0   ");
        let err = EdfHeader::read(&mut bytes.as_slice(), None, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EdfError::InvalidSignalCount(0)));
    }

    #[test]
    fn test_signal_list_relabels_non_first_match() {
        let mut header = two_channel_header();
        let list = header.signal_list("C4|EEG C4,EMG,missing", false).unwrap();
        assert_eq!(list, vec![0, 1]);
        assert_eq!(header.signals[0].label, "C4");
        assert_eq!(header.signal_list("*", false).unwrap(), vec![0, 1]);
    }
}
