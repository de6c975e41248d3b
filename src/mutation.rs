//! Channel-level edits: add, drop, update, copy, rescale, shift and
//! re-reference.
//!
//! Every edit keeps the header's channel list and the channel slots of every
//! cached record in step. Edits that rewrite a whole signal load every
//! retained record first, so nothing is decoded from disk afterwards with a
//! stale layout.

use log::{debug, info, warn};

use crate::dsp;
use crate::error::{EdfError, Result};
use crate::reader::Edf;
use crate::scaling::{check_finite, physical_range, symmetric_range};
use crate::timeline::Timeline;
use crate::types::SignalParam;

/// How [`Edf::reference`] combines signals with their reference set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceOptions {
    /// Write the result into a new channel with this label instead of
    /// modifying the signal in place
    pub new_channel: Option<String>,
    /// Sample rate of the new channel; only used with `new_channel`
    pub new_rate: Option<f64>,
    /// Add the reference back instead of subtracting it
    pub dereference: bool,
}

impl ReferenceOptions {
    pub fn new() -> Self {
        ReferenceOptions::default()
    }

    pub fn with_new_channel(mut self, label: &str, rate: Option<f64>) -> Self {
        self.new_channel = Some(label.to_string());
        self.new_rate = rate;
        self
    }

    pub fn with_dereference(mut self, dereference: bool) -> Self {
        self.dereference = dereference;
        self
    }
}

fn samples_per_record(label: &str, rate: f64, record_duration: f64) -> Result<usize> {
    let implied = rate * record_duration;
    if (implied - implied.round()).abs() > 1e-6 || implied.round() < 1.0 {
        return Err(EdfError::NonIntegralSampleCount {
            label: label.to_string(),
            implied,
        });
    }
    Ok(implied.round() as usize)
}

impl<T: Timeline> Edf<T> {
    /// Appends a data channel sampled at `sample_rate` Hz.
    ///
    /// The physical range is taken from `data` and the digital range spans
    /// the full 16 bits. An empty buffer is ignored with a warning.
    ///
    /// # Errors
    ///
    /// * `EdfError::NonIntegralSampleCount` - `sample_rate * record duration` is not a whole number
    /// * `EdfError::SampleCountMismatch` - `data` does not hold exactly `records * samples per record` values
    /// * `EdfError::DuplicateSignal` - a data channel already carries `label`
    pub fn add_signal(&mut self, label: &str, sample_rate: f64, data: &[f64]) -> Result<()> {
        if data.is_empty() {
            warn!("empty data for {}: signal not added", label);
            return Ok(());
        }
        let spr = samples_per_record(label, sample_rate, self.header.record_duration)?;
        let expected = self.header.record_count * spr;
        if data.len() != expected {
            return Err(EdfError::SampleCountMismatch {
                label: label.to_string(),
                expected,
                got: data.len(),
            });
        }
        if self.header.label_index(label).is_some() {
            return Err(EdfError::DuplicateSignal(label.to_string()));
        }

        let records = self.timeline.records();
        for &r in &records {
            self.ensure_loaded(r)?;
        }

        // 物理范围取自数据, 数字范围使用完整的 16 位
        let (pmin, pmax) = physical_range(data)?;
        let signal = SignalParam::data(label, spr, pmin, pmax);

        for (&r, chunk) in records.iter().zip(data.chunks(spr)) {
            let samples = chunk.iter().map(|&x| signal.to_digital(x)).collect();
            self.records
                .get_mut(r)
                .ok_or(EdfError::RecordUnavailable(r))?
                .add_data(samples);
        }

        self.header.signals.push(signal);
        debug!("added signal {} ({} samples per record)", label, spr);
        Ok(())
    }

    /// Removes channel `s` from the header and from every cached record.
    pub fn drop_signal(&mut self, s: usize) -> Result<()> {
        if s >= self.header.ns() {
            return Err(EdfError::InvalidSignalIndex(s));
        }
        let removed = self.header.signals.remove(s);
        self.records.for_each_mut(|record| record.drop_channel(s));

        self.header.time_track = match self.header.time_track {
            Some(t) if t == s => None,
            Some(t) if t > s => Some(t - 1),
            other => other,
        };
        debug!("dropped signal {}", removed.label);
        Ok(())
    }

    /// Drops every channel matched by a comma-separated label list.
    pub fn drop_signals(&mut self, spec: &str) -> Result<()> {
        let mut list = self.header.signal_list(spec, false)?;
        list.sort_unstable();
        for s in list.into_iter().rev() {
            self.drop_signal(s)?;
        }
        Ok(())
    }

    /// Replaces the whole of channel `s` with `data`, re-deriving its
    /// physical range (optionally made symmetric around zero) over the full
    /// 16-bit digital span.
    ///
    /// Per-record arrays are resized to the channel's current samples per
    /// record.
    pub fn update_signal(&mut self, s: usize, data: &[f64], force_symmetric: bool) -> Result<()> {
        self.check_channel(s)?;
        let spr = self.header.signals[s].samples_per_record;
        let expected = self.header.record_count * spr;
        if data.len() != expected {
            return Err(EdfError::SampleCountMismatch {
                label: self.header.signals[s].label.clone(),
                expected,
                got: data.len(),
            });
        }
        if data.is_empty() {
            return Ok(());
        }

        let records = self.timeline.records();
        for &r in &records {
            self.ensure_loaded(r)?;
        }

        let (mut pmin, mut pmax) = physical_range(data)?;
        if force_symmetric {
            (pmin, pmax) = symmetric_range(pmin, pmax);
        }
        self.header.signals[s].set_physical_range(pmin, pmax);
        let signal = &self.header.signals[s];

        for (&r, chunk) in records.iter().zip(data.chunks(spr)) {
            let digital = self
                .records
                .get_mut(r)
                .and_then(|record| record.digital_mut(s))
                .ok_or(EdfError::RecordUnavailable(r))?;
            digital.clear();
            digital.extend(chunk.iter().map(|&x| signal.to_digital(x)));
        }
        Ok(())
    }

    /// Overwrites channel `s` in records `lo..=hi`, keeping its current
    /// scaling. Values outside the physical range are clipped, with a
    /// warning.
    ///
    /// # Errors
    ///
    /// * `EdfError::InvalidRecordRange` - bad bounds
    /// * `EdfError::SampleCountMismatch` - `data` does not cover the retained records in range
    /// * `EdfError::RateMismatch` - a record holds a different number of samples than the header declares
    pub fn update_records(&mut self, lo: usize, hi: usize, s: usize, data: &[f64]) -> Result<()> {
        self.check_channel(s)?;
        let count = self.header.record_count_all;
        if lo > hi || hi >= count {
            return Err(EdfError::InvalidRecordRange { lo, hi, count });
        }

        let spr = self.header.signals[s].samples_per_record;
        let span: Vec<usize> = (lo..=hi).filter(|&r| self.timeline.retained(r)).collect();
        let expected = span.len() * spr;
        if data.len() != expected {
            return Err(EdfError::SampleCountMismatch {
                label: self.header.signals[s].label.clone(),
                expected,
                got: data.len(),
            });
        }

        check_finite(data)?;
        self.read_records(lo, hi)?;

        let signal = &self.header.signals[s];
        let mut clipped = 0usize;
        for (&r, chunk) in span.iter().zip(data.chunks(spr.max(1))) {
            let digital = self
                .records
                .get_mut(r)
                .and_then(|record| record.digital_mut(s))
                .ok_or(EdfError::RecordUnavailable(r))?;
            if digital.len() != spr {
                return Err(EdfError::RateMismatch(format!(
                    "record {} of {} holds {} samples, expected {}",
                    r,
                    signal.label,
                    digital.len(),
                    spr
                )));
            }
            for (d, &x) in digital.iter_mut().zip(chunk) {
                if signal.out_of_range(x) {
                    clipped += 1;
                }
                *d = signal.to_digital(x);
            }
        }
        if clipped > 0 {
            warn!(
                "{} values of {} clipped to [{}, {}]",
                clipped, signal.label, signal.physical_min, signal.physical_max
            );
        }
        Ok(())
    }

    /// Duplicates channel `from` under the label `to`, including transducer,
    /// physical dimension and prefiltering.
    pub fn copy_signal(&mut self, from: &str, to: &str) -> Result<()> {
        let s1 = self.header.signal(from)?;
        if self.header.has_signal(to) {
            return Err(EdfError::DuplicateSignal(to.to_string()));
        }

        let data = self.physical_signal(s1)?;
        let rate = self.header.signals[s1].sampling_freq(self.header.record_duration);
        self.add_signal(to, rate, &data)?;

        let s2 = self
            .header
            .label_index(to)
            .ok_or_else(|| EdfError::UnknownSignal(to.to_string()))?;
        let source = self.header.signals[s1].clone();
        let target = &mut self.header.signals[s2];
        target.transducer = source.transducer;
        target.physical_dimension = source.physical_dimension;
        target.prefilter = source.prefilter;
        Ok(())
    }

    /// Converts channel `s` between `V`, `mV` and `uV`.
    ///
    /// Only mV to uV, uV to mV, V to uV and V to mV are recognized; any other
    /// pair leaves the channel untouched.
    pub fn rescale(&mut self, s: usize, unit: &str) -> Result<()> {
        if self.header.is_annotation_channel(s) {
            return Ok(());
        }
        self.check_channel(s)?;

        let factor = match (self.header.signals[s].physical_dimension.as_str(), unit) {
            ("mV", "uV") => 1e3,
            ("uV", "mV") => 1e-3,
            ("V", "uV") => 1e6,
            ("V", "mV") => 1e3,
            _ => return Ok(()),
        };

        let data: Vec<f64> = self.physical_signal(s)?.into_iter().map(|x| x * factor).collect();
        self.update_signal(s, &data, false)?;
        self.header.signals[s].physical_dimension = unit.to_string();
        info!("rescaled {} to {}", self.header.signals[s].label, unit);
        Ok(())
    }

    /// Negates channel `s`.
    pub fn flip(&mut self, s: usize) -> Result<()> {
        if self.header.is_annotation_channel(s) {
            return Ok(());
        }
        self.check_channel(s)?;
        info!("flipping polarity of {}", self.header.signals[s].label);
        let data: Vec<f64> = self.physical_signal(s)?.into_iter().map(|x| -x).collect();
        self.update_signal(s, &data, false)
    }

    /// Shifts channel `s` by `offset` samples; positive values push the
    /// signal later in time.
    ///
    /// Vacated samples are zero, or the samples pushed off the other end when
    /// `wrap` is set. A shift as long as the signal does nothing.
    pub fn shift(&mut self, s: usize, offset: i64, wrap: bool) -> Result<()> {
        self.check_channel(s)?;
        if offset == 0 {
            return Ok(());
        }
        let data = self.physical_signal(s)?;
        let np = data.len() as i64;
        if offset.abs() >= np {
            return Ok(());
        }

        let mut shifted = vec![0.0; data.len()];
        for (i, &x) in data.iter().enumerate() {
            let j = i as i64 + offset;
            if (0..np).contains(&j) {
                shifted[j as usize] = x;
            } else if wrap {
                shifted[j.rem_euclid(np) as usize] = x;
            }
        }
        self.update_signal(s, &shifted, false)
    }

    /// Resamples channel `s` to `rate` Hz (band-limited, see [`dsp::resample`]).
    pub fn resample_signal(&mut self, s: usize, rate: f64) -> Result<()> {
        self.check_channel(s)?;
        let label = self.header.signals[s].label.clone();
        let new_spr = samples_per_record(&label, rate, self.header.record_duration)?;
        let old_rate = self.header.signals[s].sampling_freq(self.header.record_duration);
        if new_spr == self.header.signals[s].samples_per_record {
            return Ok(());
        }

        let data = self.physical_signal(s)?;
        let mut resampled = dsp::resample(&data, old_rate, rate);
        let n = self.header.record_count * new_spr;
        let pad = resampled.last().copied().unwrap_or(0.0);
        resampled.resize(n, pad);

        self.header.signals[s].samples_per_record = new_spr;
        debug!("resampling {} from {} to {} Hz", label, old_rate, rate);
        self.update_signal(s, &resampled, false)
    }

    /// Re-references each of `signals` against the mean of `refs`.
    ///
    /// With [`ReferenceOptions::new_channel`] set, the single signal is first
    /// copied to a new channel (resampled to `new_rate` if given) and only
    /// the copy is modified; the reference set is then resampled to the same
    /// rate. Otherwise every signal and reference must share one sample rate.
    /// A signal referenced against itself alone is skipped with a warning.
    pub fn reference(&mut self, signals: &[usize], refs: &[usize], options: &ReferenceOptions) -> Result<()> {
        if signals.is_empty() {
            return Err(EdfError::InvalidArgument("no signals to reference".to_string()));
        }
        if options.new_channel.is_some() && signals.len() > 1 {
            return Err(EdfError::InvalidArgument(
                "can only re-reference a single channel into a new one".to_string(),
            ));
        }
        for &s in signals.iter().chain(refs) {
            self.check_channel(s)?;
        }

        let mut signals = signals.to_vec();
        let mut resampling = None;
        if let Some(label) = &options.new_channel {
            let from = self.header.signals[signals[0]].label.clone();
            self.copy_signal(&from, label)?;
            let s2 = self
                .header
                .label_index(label)
                .ok_or_else(|| EdfError::UnknownSignal(label.clone()))?;
            if let Some(rate) = options.new_rate {
                self.resample_signal(s2, rate)?;
                resampling = Some(rate);
            }
            signals = vec![s2];
        }

        if refs.is_empty() {
            return Ok(());
        }

        let np_sig = self.header.signals[signals[0]].samples_per_record;
        let np_ref = self.header.signals[refs[0]].samples_per_record;
        let rate_mismatch = |what: &str| EdfError::RateMismatch(format!("all {} must have similar sampling rates", what));
        if resampling.is_none() {
            if signals
                .iter()
                .chain(refs)
                .any(|&s| self.header.signals[s].samples_per_record != np_sig)
            {
                return Err(rate_mismatch("signals/references"));
            }
        } else if refs.iter().any(|&r| self.header.signals[r].samples_per_record != np_ref) {
            return Err(rate_mismatch("references"));
        }

        info!(
            "{} {} with respect to {}",
            if options.dereference { "dereferencing" } else { "referencing" },
            signals.iter().map(|&s| self.header.signals[s].label.as_str()).collect::<Vec<_>>().join(","),
            refs.iter().map(|&s| self.header.signals[s].label.as_str()).collect::<Vec<_>>().join(",")
        );

        let mut reference: Vec<f64> = Vec::new();
        for &r in refs {
            let data = self.physical_signal(r)?;
            if reference.is_empty() {
                reference = data;
            } else {
                for (acc, x) in reference.iter_mut().zip(data) {
                    *acc += x;
                }
            }
        }
        let n_refs = refs.len() as f64;
        reference.iter_mut().for_each(|x| *x /= n_refs);

        if let Some(rate) = resampling {
            let ref_rate = self.header.signals[refs[0]].sampling_freq(self.header.record_duration);
            if (ref_rate - rate).abs() > f64::EPSILON {
                reference = dsp::resample(&reference, ref_rate, rate);
                let pad = reference.last().copied().unwrap_or(0.0);
                reference.resize(self.header.record_count * np_sig, pad);
            }
        }

        for &s in &signals {
            if refs.len() == 1 && refs[0] == s {
                warn!("skipping {} to not re-reference to self", self.header.signals[s].label);
                continue;
            }
            let mut data = self.physical_signal(s)?;
            if data.len() != reference.len() {
                return Err(EdfError::RateMismatch(format!(
                    "{} holds {} samples but the reference {}",
                    self.header.signals[s].label,
                    data.len(),
                    reference.len()
                )));
            }
            for (x, r) in data.iter_mut().zip(&reference) {
                if options.dereference {
                    *x += r;
                } else {
                    *x -= r;
                }
            }
            self.update_signal(s, &data, false)?;
        }
        Ok(())
    }

    /// [`reference`](Self::reference) with channels given as label lists.
    pub fn reference_by_label(&mut self, signals: &str, refs: &str, options: &ReferenceOptions) -> Result<()> {
        let signals = self.header.signal_list(signals, true)?;
        let refs = self.header.signal_list(refs, true)?;
        self.reference(&signals, &refs, options)
    }

    /// Gives each of `signals` a physical range symmetric around zero.
    pub fn minmax(&mut self, signals: &[usize]) -> Result<()> {
        for &s in signals {
            if self.header.is_annotation_channel(s) {
                continue;
            }
            let data = self.physical_signal(s)?;
            self.update_signal(s, &data, true)?;
        }
        Ok(())
    }

    /// Refreshes the physical range and scaling of channel `s` from its
    /// current values, leaving the stored digital samples as they are.
    pub fn update_physical_minmax(&mut self, s: usize) -> Result<()> {
        self.check_channel(s)?;
        let data = self.physical_signal(s)?;
        if data.is_empty() {
            return Ok(());
        }
        let (pmin, pmax) = physical_range(&data)?;
        let signal = &mut self.header.signals[s];
        signal.physical_min = pmin;
        signal.physical_max = pmax;
        signal.update_scaling();
        Ok(())
    }
}
