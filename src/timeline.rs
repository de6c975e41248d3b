//! Mapping between record indices, samples and absolute time.
//!
//! The engine only talks to a timeline through the [`Timeline`] trait.
//! [`RecordTimeline`] is a record-granular implementation: every record is
//! either retained or not, and a retained record may be masked.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound::{Excluded, Unbounded};

/// Half-open time range `[start, stop)` in time points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u64,
    pub stop: u64,
}

impl Interval {
    pub fn new(start: u64, stop: u64) -> Self {
        Interval { start, stop }
    }

    pub fn duration(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }
}

/// Inclusive record/sample coordinates covering a time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordSpan {
    pub start_record: usize,
    pub start_sample: usize,
    pub stop_record: usize,
    pub stop_sample: usize,
}

/// What a timeline needs to (re)build its record index.
#[derive(Debug, Clone)]
pub struct TimelineSpec {
    pub record_count: usize,
    pub record_duration_tp: u64,
    /// Explicit onsets for a discontinuous recording, one per record
    pub onsets: Option<Vec<u64>>,
}

pub trait Timeline {
    /// Discards all state and indexes `spec.record_count` records.
    fn rebuild(&mut self, spec: &TimelineSpec);

    /// Keeps only the `retained` records, with their existing onsets, and
    /// clears any mask.
    fn restructure(&mut self, retained: &BTreeSet<usize>);

    /// Moves every onset `offset` time points earlier, saturating at zero.
    fn rebase(&mut self, offset: u64);

    fn first_record(&self) -> Option<usize>;
    fn next_record(&self, r: usize) -> Option<usize>;
    fn retained(&self, r: usize) -> bool;
    fn masked_record(&self, r: usize) -> bool;
    fn has_mask(&self) -> bool;

    fn interval2records(&self, interval: Interval, samples_per_record: usize) -> Option<RecordSpan>;
    fn record2interval(&self, r: usize) -> Option<Interval>;
    fn timepoint(&self, r: usize, sample: usize, samples_per_record: usize) -> Option<u64>;

    /// Summed duration of the retained records.
    fn total_duration(&self) -> u64;
    fn last_time_point(&self) -> u64;
    fn wholetrace(&self) -> Interval;

    /// Retained records in order.
    fn records(&self) -> Vec<usize> {
        let mut out = Vec::new();
        let mut r = self.first_record();
        while let Some(x) = r {
            out.push(x);
            r = self.next_record(x);
        }
        out
    }
}

/// Default record-granular timeline.
#[derive(Debug, Clone, Default)]
pub struct RecordTimeline {
    onsets: BTreeMap<usize, u64>,
    masked: BTreeSet<usize>,
    record_duration_tp: u64,
}

impl RecordTimeline {
    pub fn new() -> Self {
        RecordTimeline::default()
    }

    /// Masks or unmasks one retained record.
    pub fn set_mask(&mut self, r: usize, masked: bool) {
        if !self.onsets.contains_key(&r) {
            return;
        }
        if masked {
            self.masked.insert(r);
        } else {
            self.masked.remove(&r);
        }
    }

    pub fn mask_records<I: IntoIterator<Item = usize>>(&mut self, records: I) {
        for r in records {
            self.set_mask(r, true);
        }
    }

    pub fn clear_mask(&mut self) {
        self.masked.clear();
    }

    pub fn onset(&self, r: usize) -> Option<u64> {
        self.onsets.get(&r).copied()
    }

    /// Time point of `sample` within a record starting at `onset`.
    fn sample_tp(&self, onset: u64, sample: usize, samples_per_record: usize) -> u64 {
        if samples_per_record == 0 {
            return onset;
        }
        onset + ((sample as u128 * self.record_duration_tp as u128) / samples_per_record as u128) as u64
    }

    /// Index of the first sample at or after `tp` in a record starting at
    /// `onset`, possibly equal to `samples_per_record`.
    fn first_sample_from(&self, onset: u64, tp: u64, samples_per_record: usize) -> usize {
        if tp <= onset || self.record_duration_tp == 0 {
            return 0;
        }
        let num = (tp - onset) as u128 * samples_per_record as u128;
        let den = self.record_duration_tp as u128;
        num.div_ceil(den) as usize
    }
}

impl Timeline for RecordTimeline {
    fn rebuild(&mut self, spec: &TimelineSpec) {
        self.record_duration_tp = spec.record_duration_tp;
        self.masked.clear();
        self.onsets = (0..spec.record_count)
            .map(|r| {
                let onset = match &spec.onsets {
                    Some(onsets) => onsets.get(r).copied().unwrap_or(r as u64 * spec.record_duration_tp),
                    None => r as u64 * spec.record_duration_tp,
                };
                (r, onset)
            })
            .collect();
    }

    fn restructure(&mut self, retained: &BTreeSet<usize>) {
        self.onsets.retain(|r, _| retained.contains(r));
        self.masked.clear();
    }

    fn rebase(&mut self, offset: u64) {
        for onset in self.onsets.values_mut() {
            *onset = onset.saturating_sub(offset);
        }
    }

    fn first_record(&self) -> Option<usize> {
        self.onsets.keys().next().copied()
    }

    fn next_record(&self, r: usize) -> Option<usize> {
        self.onsets.range((Excluded(r), Unbounded)).next().map(|(&k, _)| k)
    }

    fn retained(&self, r: usize) -> bool {
        self.onsets.contains_key(&r)
    }

    fn masked_record(&self, r: usize) -> bool {
        self.masked.contains(&r)
    }

    fn has_mask(&self) -> bool {
        !self.masked.is_empty()
    }

    fn interval2records(&self, interval: Interval, samples_per_record: usize) -> Option<RecordSpan> {
        if interval.stop <= interval.start || samples_per_record == 0 {
            return None;
        }
        let dur = self.record_duration_tp;

        let mut start = None;
        for (&r, &onset) in &self.onsets {
            if onset + dur <= interval.start {
                continue;
            }
            if onset >= interval.stop {
                break;
            }
            let j = self.first_sample_from(onset, interval.start, samples_per_record);
            if j < samples_per_record && self.sample_tp(onset, j, samples_per_record) < interval.stop {
                start = Some((r, j));
                break;
            }
        }
        let (start_record, start_sample) = start?;

        let (mut stop_record, mut stop_sample) = (start_record, start_sample);
        for (&r, &onset) in self.onsets.range(start_record..) {
            if onset >= interval.stop {
                break;
            }
            // last sample strictly before the stop time
            let past = self.first_sample_from(onset, interval.stop, samples_per_record);
            if past == 0 {
                break;
            }
            let last = (past - 1).min(samples_per_record - 1);
            if r == start_record && last < start_sample {
                break;
            }
            stop_record = r;
            stop_sample = last;
        }

        Some(RecordSpan {
            start_record,
            start_sample,
            stop_record,
            stop_sample,
        })
    }

    fn record2interval(&self, r: usize) -> Option<Interval> {
        let onset = self.onset(r)?;
        Some(Interval::new(onset, onset + self.record_duration_tp))
    }

    fn timepoint(&self, r: usize, sample: usize, samples_per_record: usize) -> Option<u64> {
        let onset = self.onset(r)?;
        Some(self.sample_tp(onset, sample, samples_per_record))
    }

    fn total_duration(&self) -> u64 {
        self.onsets.len() as u64 * self.record_duration_tp
    }

    fn last_time_point(&self) -> u64 {
        self.onsets
            .values()
            .max()
            .map_or(0, |&onset| (onset + self.record_duration_tp).saturating_sub(1))
    }

    fn wholetrace(&self) -> Interval {
        if self.onsets.is_empty() {
            return Interval::new(0, 0);
        }
        Interval::new(0, self.last_time_point() + 1)
    }
}
