use log::{debug, info};

use crate::error::{EdfError, Result};
use crate::reader::Edf;
use crate::record::{ChannelData, Record};
use crate::store::RecordStore;
use crate::timeline::{Timeline, TimelineSpec};
use crate::utils::seconds_to_tp;

const RATIO_TOLERANCE: f64 = 1e-6;

impl<T: Timeline> Edf<T> {
    /// Re-chunks every channel onto records of `duration` seconds.
    ///
    /// All records are loaded and regrouped in order; a trailing stretch
    /// shorter than one new record is dropped. The recording no longer reads
    /// from its backing file afterwards. A time-track is regenerated for the
    /// new records.
    ///
    /// # Errors
    ///
    /// * `EdfError::DiscontinuousFile` - the recording is EDF+D
    /// * `EdfError::AnnotationChannel` - an annotation channel other than the time-track is present
    /// * `EdfError::NonIntegralSampleCount` - a channel would get a fractional number of samples per record
    pub fn reset_record_size(&mut self, duration: f64) -> Result<()> {
        if !self.header.file_type.is_continuous() {
            return Err(EdfError::DiscontinuousFile);
        }
        if duration <= 0.0 {
            return Err(EdfError::InvalidArgument(format!("bad record duration {}", duration)));
        }
        if (self.header.record_duration - duration).abs() < f64::EPSILON {
            return Ok(());
        }

        // 先检查所有通道, 出错时不修改任何状态
        let time_track = self.header.time_track();
        let mut new_spr = Vec::with_capacity(self.header.ns());
        for (s, signal) in self.header.signals.iter().enumerate() {
            if Some(s) == time_track {
                continue;
            }
            if signal.annotation {
                return Err(EdfError::AnnotationChannel(format!(
                    "{} (drop it before changing the record size)",
                    signal.label
                )));
            }
            let implied = signal.sampling_freq(self.header.record_duration) * duration;
            if (implied - implied.round()).abs() > RATIO_TOLERANCE {
                return Err(EdfError::NonIntegralSampleCount {
                    label: signal.label.clone(),
                    implied,
                });
            }
            new_spr.push(implied.round() as usize);
        }
        if let Some(t) = time_track {
            self.drop_signal(t)?;
        }

        let total = self.header.record_count as f64 * self.header.record_duration;
        let new_nr = (total / duration + 1e-9).floor() as usize;

        let blank = Record {
            channels: new_spr.iter().map(|&n| ChannelData::Digital(vec![0; n])).collect(),
        };
        let mut regridded: Vec<Record> = vec![blank; new_nr];

        // per-channel write cursor: (record, sample)
        let mut cursor = vec![(0usize, 0usize); new_spr.len()];
        for r in self.timeline.records() {
            self.ensure_loaded(r)?;
            let record = self.records.get(r).ok_or(EdfError::RecordUnavailable(r))?;
            for (s, &n) in new_spr.iter().enumerate() {
                let samples = record.digital(s).unwrap_or(&[]);
                for &x in samples {
                    let (rec, smp) = &mut cursor[s];
                    if *smp == n {
                        *rec += 1;
                        *smp = 0;
                    }
                    if *rec >= new_nr {
                        break;
                    }
                    if let Some(slot) = regridded[*rec].digital_mut(s) {
                        slot[*smp] = x;
                    }
                    *smp += 1;
                }
            }
        }

        // 替换记录缓存并更新头部
        self.records = regridded.into_iter().enumerate().collect::<RecordStore>();
        for (signal, &n) in self.header.signals.iter_mut().zip(&new_spr) {
            signal.samples_per_record = n;
            signal.origin = None;
        }
        self.header.record_count = new_nr;
        self.header.record_count_all = new_nr;
        self.header.record_duration = duration;
        self.header.record_duration_tp = seconds_to_tp(duration);
        self.header.time_track_origin = None;
        self.layout.record_size = new_spr.iter().map(|n| 2 * n).sum();
        self.source = None;

        self.timeline.rebuild(&TimelineSpec {
            record_count: new_nr,
            record_duration_tp: self.header.record_duration_tp,
            onsets: None,
        });

        if time_track.is_some() {
            self.add_continuous_time_track()?;
        }

        info!("reset record size to {}s: {} records", duration, new_nr);
        debug!("new samples per record: {:?}", new_spr);
        Ok(())
    }
}
