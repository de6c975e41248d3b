use std::collections::BTreeSet;

use log::{info, warn};

use crate::error::Result;
use crate::reader::Edf;
use crate::timeline::Timeline;

/// Record counts and durations (seconds) around a [`Edf::restructure`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestructureReport {
    pub records_before: usize,
    pub records_after: usize,
    pub duration_before: f64,
    pub duration_after: f64,
    /// Whether any record was dropped
    pub changed: bool,
    /// No record is left
    pub degenerate: bool,
}

impl<T: Timeline> Edf<T> {
    /// Permanently drops the records the timeline has masked.
    ///
    /// With nothing masked this changes nothing. Otherwise the recording
    /// becomes EDF+D (gaining a time-track first if it has none), every kept
    /// record is loaded, and the store keeps only those records under their
    /// original indices.
    pub fn restructure(&mut self) -> Result<RestructureReport> {
        let retained = self.timeline.records();
        let records_before = retained.len();
        let duration_before = records_before as f64 * self.header.record_duration;

        let unchanged = RestructureReport {
            records_before,
            records_after: records_before,
            duration_before,
            duration_after: duration_before,
            changed: false,
            degenerate: records_before == 0,
        };
        if !self.timeline.has_mask() || !retained.iter().any(|&r| self.timeline.masked_record(r)) {
            return Ok(unchanged);
        }

        // 转为 EDF+D, 必要时先添加 time-track
        if !self.header.file_type.is_plus() {
            info!("restructuring {} as an EDF+", self.id);
            self.set_edfplus()?;
        }
        if self.header.time_track().is_none() && self.header.file_type.is_continuous() {
            self.add_continuous_time_track()?;
        }
        self.set_discontinuous();

        let mut include = BTreeSet::new();
        for r in retained {
            if !self.timeline.masked_record(r) {
                self.ensure_loaded(r)?;
                include.insert(r);
            }
        }

        // 保留原记录编号, 不重新编号
        self.records.retain_indices(&include);
        self.header.record_count = include.len();
        self.timeline.restructure(&include);

        let records_after = include.len();
        let report = RestructureReport {
            records_before,
            records_after,
            duration_before,
            duration_after: records_after as f64 * self.header.record_duration,
            changed: true,
            degenerate: records_after == 0,
        };

        info!(
            "restructured {}: {} -> {} records, {}s -> {}s",
            self.id, records_before, records_after, report.duration_before, report.duration_after
        );
        if report.degenerate {
            warn!("no unmasked records left in {}", self.id);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::types::FileType;
    use crate::Edf;

    #[test]
    fn test_restructure_without_mask_is_noop() {
        let mut edf = Edf::empty("r", 3, 1.0, "01.01.20", "00.00.00");
        edf.add_signal("A", 2.0, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let report = edf.restructure().unwrap();
        assert!(!report.changed);
        assert_eq!(report.records_after, 3);
        assert_eq!(edf.header().file_type, FileType::Edf);
        assert_eq!(edf.header().ns(), 1);
    }

    #[test]
    fn test_restructure_all_masked_is_degenerate() {
        let mut edf = Edf::empty("r", 2, 1.0, "01.01.20", "00.00.00");
        edf.add_signal("A", 1.0, &[1.0, 2.0]).unwrap();
        edf.timeline_mut().mask_records([0, 1]);
        let report = edf.restructure().unwrap();
        assert!(report.changed);
        assert!(report.degenerate);
        assert_eq!(edf.header().record_count, 0);
        assert_eq!(edf.header().file_type, FileType::EdfPlusD);
    }
}
