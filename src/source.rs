use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{EdfError, Result};
use crate::record::RecordLayout;

/// Positional access to the raw bytes of on-disk records.
pub trait RecordSource {
    /// Reads exactly one record's worth of bytes for record `r`.
    fn read_record(&mut self, r: usize) -> Result<Vec<u8>>;

    /// Number of records the source can serve.
    fn record_count(&self) -> usize;
}

/// Plain EDF file: record `r` lives at `header_size + r * record_size`.
pub struct FileSource {
    file: BufReader<File>,
    layout: RecordLayout,
    record_count: usize,
}

impl FileSource {
    pub fn new(file: BufReader<File>, layout: RecordLayout, record_count: usize) -> Self {
        FileSource {
            file,
            layout,
            record_count,
        }
    }
}

impl RecordSource for FileSource {
    fn read_record(&mut self, r: usize) -> Result<Vec<u8>> {
        if r >= self.record_count {
            return Err(EdfError::RecordUnavailable(r));
        }
        self.file.seek(SeekFrom::Start(self.layout.record_offset(r)))?;
        let mut buf = vec![0u8; self.layout.record_size];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn record_count(&self) -> usize {
        self.record_count
    }
}
