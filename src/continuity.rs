//! EDF / EDF+C / EDF+D transitions and the synthesized time-track.

use log::{debug, info};

use crate::error::{EdfError, Result};
use crate::labels::{is_annotation_label, TIME_TRACK_LABEL};
use crate::reader::Edf;
use crate::record::ChannelData;
use crate::timeline::Timeline;
use crate::types::{FileType, SignalParam};
use crate::utils::{format_onset, parse_edf_time, tp_to_seconds};
use crate::EDF_TIME_DIMENSION;

/// Time-track payload for a record starting `onset` seconds into the
/// recording: `+<onset>`, two field separators and a terminator, padded with
/// zero bytes to `width`.
pub fn time_track_payload(onset: f64, width: usize) -> Vec<u8> {
    let mut payload = format_onset(onset).into_bytes();
    payload.extend_from_slice(&[0x14, 0x14, 0x00]);
    payload.resize(width, 0);
    payload
}

/// Moves every onset in a time-track payload `shift` time points earlier.
///
/// Entries whose onset does not parse are copied unchanged. The result keeps
/// the width of `payload`.
pub fn rebase_time_track_payload(payload: &[u8], shift: u64) -> Vec<u8> {
    let shift = i64::try_from(shift).unwrap_or(i64::MAX);
    let mut out = Vec::with_capacity(payload.len());
    for tal in payload.split(|&b| b == 0).filter(|tal| !tal.is_empty()) {
        let end = tal
            .iter()
            .position(|&b| b == 0x14 || b == 0x15)
            .unwrap_or(tal.len());
        let onset = std::str::from_utf8(&tal[..end])
            .ok()
            .and_then(|text| parse_edf_time(text).ok());
        match onset {
            Some(tp) => {
                let moved = tp.saturating_sub(shift);
                let seconds = moved as f64 / EDF_TIME_DIMENSION as f64;
                let text = if moved < 0 {
                    seconds.to_string()
                } else {
                    format_onset(seconds)
                };
                out.extend_from_slice(text.as_bytes());
                out.extend_from_slice(&tal[end..]);
            }
            None => out.extend_from_slice(tal),
        }
        out.push(0);
    }
    out.resize(payload.len(), 0);
    out
}

impl<T: Timeline> Edf<T> {
    /// Moves the onsets held in every cached record's time-track `shift`
    /// time points earlier.
    pub(crate) fn rebase_time_track(&mut self, shift: u64) {
        let Some(t) = self.header.time_track() else {
            return;
        };
        self.records.for_each_mut(|record| {
            if let Some(ChannelData::Annotation(bytes)) = record.channels.get_mut(t) {
                *bytes = rebase_time_track_payload(bytes, shift);
            }
        });
    }

    fn set_file_type(&mut self, file_type: FileType) {
        self.header.file_type = file_type;
        if self.header.reserved.len() < 5 {
            self.header.reserved.resize(5, b' ');
        }
        self.header.reserved[..5].copy_from_slice(file_type.marker());
    }

    /// Marks the recording as continuous, keeping its EDF/EDF+ flavour.
    pub fn set_continuous(&mut self) {
        if self.header.file_type == FileType::EdfPlusD {
            self.set_file_type(FileType::EdfPlusC);
        }
    }

    /// Marks an EDF+ recording as discontinuous. Plain EDF is left as is.
    pub fn set_discontinuous(&mut self) {
        if self.header.file_type.is_plus() {
            self.set_file_type(FileType::EdfPlusD);
        }
    }

    /// Appends a time-track channel holding each record's onset.
    ///
    /// Promotes a plain EDF recording to EDF+C. Does nothing if a time-track
    /// is already present.
    ///
    /// # Errors
    ///
    /// `EdfError::DiscontinuousFile` unless the recording is continuous.
    pub fn add_continuous_time_track(&mut self) -> Result<()> {
        if !self.header.file_type.is_continuous() {
            return Err(EdfError::DiscontinuousFile);
        }
        if self.header.time_track().is_some() {
            return Ok(());
        }
        if !self.header.file_type.is_plus() {
            self.set_file_type(FileType::EdfPlusC);
        }

        let existing = self
            .header
            .signals
            .iter()
            .filter(|s| s.annotation || is_annotation_label(&s.label))
            .count();
        let label = if existing == 0 {
            TIME_TRACK_LABEL.to_string()
        } else {
            format!("{}{}", TIME_TRACK_LABEL, existing)
        };

        let signal = SignalParam::annotation(&label, self.config.time_track_samples);
        let width = signal.record_bytes();
        self.header.signals.push(signal);
        let t = self.header.ns() - 1;
        self.header.time_track = Some(t);

        // uncached records get their payload when loaded
        let record_duration = self.header.record_duration;
        for (&r, record) in self.records.iter_mut() {
            let onset = self
                .timeline
                .record2interval(r)
                .map_or(r as f64 * record_duration, |i| tp_to_seconds(i.start));
            record.add_annot(&time_track_payload(onset, width), width, None);
        }

        debug!("added time-track [{}] as channel {}", label, t);
        Ok(())
    }

    /// Flags the recording as EDF+C and makes sure it carries a time-track.
    pub fn set_edfplus(&mut self) -> Result<()> {
        if self.header.file_type.is_plus() {
            return Ok(());
        }
        info!("setting {} as EDF+C", self.id);
        self.set_file_type(FileType::EdfPlusC);
        self.add_continuous_time_track()
    }

    /// Downgrades to plain EDF: blanks the marker, marks the recording as
    /// continuous and drops the time-track.
    pub fn set_edf(&mut self) -> Result<()> {
        info!("setting {} as standard EDF", self.id);
        self.set_file_type(FileType::Edf);
        self.drop_time_track()
    }

    /// Drops the time-track channel, if any, leaving the recording continuous.
    pub fn drop_time_track(&mut self) -> Result<()> {
        self.set_continuous();
        match self.header.time_track() {
            Some(t) => self.drop_signal(t),
            None => Ok(()),
        }
    }
}
