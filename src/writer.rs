use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::compressed::CompressedWriter;
use crate::error::{EdfError, Result};
use crate::reader::Edf;
use crate::timeline::Timeline;
use crate::utils::advance_start;
use crate::EDF_TIME_DIMENSION;

impl<T: Timeline> Edf<T> {
    /// Moves the header start date/time forward to the onset of the first
    /// retained record, in whole seconds.
    ///
    /// Record onsets and time-track entries are moved back by the same
    /// amount, so absolute times are unchanged and a second call does nothing.
    /// Every retained record is loaded first.
    pub fn reset_start_time(&mut self) -> Result<()> {
        let Some(onset) = self
            .timeline
            .first_record()
            .and_then(|r| self.timeline.record2interval(r))
            .map(|i| i.start)
        else {
            return Ok(());
        };
        // 头部只记录整秒
        let shift = onset - onset % EDF_TIME_DIMENSION;
        if shift == 0 {
            return Ok(());
        }
        let Some((date, time)) = advance_start(&self.header.start_date, &self.header.start_time, shift) else {
            warn!("could not parse start time [{}]: left as is", self.header.start_time);
            return Ok(());
        };

        self.load_all()?;
        debug!("resetting start time from {} to {}", self.header.start_time, time);
        self.header.start_date = date;
        self.header.start_time = time;
        self.timeline.rebase(shift);
        self.rebase_time_track(shift);
        Ok(())
    }

    /// Writes the recording as it currently stands.
    ///
    /// The header carries the current channel set and record count; records
    /// follow in timeline order, loaded from the backing file as needed. With
    /// `as_compressed` the output is an LZ4 stream plus a `.idx` side index.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use edfcore::Edf;
    ///
    /// let mut edf = Edf::empty("demo", 2, 1.0, "01.01.24", "10.00.00");
    /// edf.add_signal("EEG", 4.0, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0])?;
    /// edf.write("demo_write.edf", false)?;
    ///
    /// let reopened = Edf::open("demo_write.edf", "demo", &[])?;
    /// assert_eq!(reopened.header().record_count, 2);
    /// # std::fs::remove_file("demo_write.edf").ok();
    /// # Ok::<(), edfcore::EdfError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// `EdfError::OpenFailure` if the output cannot be created.
    pub fn write<P: AsRef<Path>>(&mut self, path: P, as_compressed: bool) -> Result<()> {
        let path = path.as_ref();
        // 先调整开始时间, 再生成头部
        self.reset_start_time()?;
        let header = self.header.to_bytes();
        let endianness = self.config.endianness;

        if as_compressed {
            let mut out = CompressedWriter::create(path)?;
            out.write_header(&header)?;
            let mut buf = Vec::with_capacity(self.header.record_size());
            for r in self.timeline.records() {
                self.ensure_loaded(r)?;
                let record = self.records.get(r).ok_or(EdfError::RecordUnavailable(r))?;
                buf.clear();
                record.encode(&self.header, endianness, &mut buf);
                out.write_record(&buf)?;
            }
            out.finish(self.header.record_size())?;
        } else {
            let file = File::create(path).map_err(|e| EdfError::open_failure(path, e))?;
            let mut out = BufWriter::new(file);
            out.write_all(&header)?;
            // 按时间轴顺序写入记录, 未加载的记录先从源文件读取
            let mut buf = Vec::with_capacity(self.header.record_size());
            for r in self.timeline.records() {
                self.ensure_loaded(r)?;
                let record = self.records.get(r).ok_or(EdfError::RecordUnavailable(r))?;
                buf.clear();
                record.encode(&self.header, endianness, &mut buf);
                out.write_all(&buf)?;
            }
            out.flush()?;
        }

        info!(
            "wrote {} ({} signals, {} records{})",
            path.display(),
            self.header.ns(),
            self.header.record_count,
            if as_compressed { ", compressed" } else { "" }
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::timeline::Timeline;
    use crate::Edf;

    #[test]
    fn test_reset_start_time_uses_first_retained_onset() {
        let mut edf = Edf::empty("w", 5, 1.0, "31.12.19", "23.59.58");
        edf.add_signal("A", 1.0, &[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        edf.timeline_mut().mask_records([0, 1, 2]);
        edf.restructure().unwrap();
        edf.reset_start_time().unwrap();
        assert_eq!(edf.header().start_time, "00.00.01");
        assert_eq!(edf.header().start_date, "01.01.20");

        // onsets now count from the new start
        assert_eq!(edf.timeline().record2interval(3).unwrap().start, 0);
        let t = edf.header().time_track().unwrap();
        let payload = edf.records().get(4).unwrap().channels[t].annotation().unwrap();
        assert_eq!(&payload[..5], b"+1\x14\x14\x00");

        edf.reset_start_time().unwrap();
        assert_eq!(edf.header().start_time, "00.00.01");
    }

    #[test]
    fn test_write_header_size_matches_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.edf");
        let mut edf = Edf::empty("w", 2, 1.0, "01.01.20", "00.00.00");
        edf.add_signal("A", 2.0, &[0.0, 1.0, 2.0, 3.0]).unwrap();
        edf.add_signal("B", 1.0, &[5.0, 6.0]).unwrap();
        edf.write(&path, false).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 256 * 3 + 2 * (4 + 2));
        assert_eq!(&bytes[184..187], b"768");
    }
}
