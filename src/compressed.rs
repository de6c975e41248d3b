//! Compressed stream encoding (`.edfz`) with a binary side index (`.idx`).
//!
//! The stream holds the same header and records as a plain file, each
//! written as one LZ4 block (size-prepended). The index records where every
//! block starts so that single records can be read back without scanning.
//!
//! Index layout, little-endian:
//!
//! ```text
//! magic "EDFZIDX1" | record_size u64 | header offset u64 | header length u64
//! | record count u64 | (offset u64, length u64) per record
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::error::{EdfError, Result};
use crate::source::RecordSource;

const INDEX_MAGIC: &[u8; 8] = b"EDFZIDX1";

/// Largest possible header: the fixed block plus 4096 channel blocks.
const MAX_HEADER_BYTES: usize = 256 * (4096 + 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    offset: u64,
    length: u64,
}

/// Path of the side index for a compressed stream.
pub fn index_path(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".idx");
    PathBuf::from(p)
}

pub fn is_compressed_path(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("edfz"))
}

/// Sequential writer for a compressed stream and its index.
pub struct CompressedWriter {
    out: BufWriter<File>,
    index: PathBuf,
    position: u64,
    header: Option<Block>,
    records: Vec<Block>,
}

impl CompressedWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| EdfError::open_failure(path, e))?;
        Ok(CompressedWriter {
            out: BufWriter::new(file),
            index: index_path(path),
            position: 0,
            header: None,
            records: Vec::new(),
        })
    }

    fn write_block(&mut self, bytes: &[u8]) -> Result<Block> {
        let compressed = lz4_flex::compress_prepend_size(bytes);
        self.out.write_all(&compressed)?;
        let block = Block {
            offset: self.position,
            length: compressed.len() as u64,
        };
        self.position += block.length;
        Ok(block)
    }

    pub fn write_header(&mut self, bytes: &[u8]) -> Result<()> {
        let block = self.write_block(bytes)?;
        self.header = Some(block);
        Ok(())
    }

    pub fn write_record(&mut self, bytes: &[u8]) -> Result<()> {
        let block = self.write_block(bytes)?;
        self.records.push(block);
        Ok(())
    }

    /// Flushes the stream and writes the side index.
    pub fn finish(mut self, record_size: usize) -> Result<()> {
        self.out.flush()?;
        let header = self
            .header
            .ok_or_else(|| EdfError::CompressedIndex("no header written".to_string()))?;

        debug!("writing compressed index to {}", self.index.display());
        let file = File::create(&self.index).map_err(|e| EdfError::open_failure(&self.index, e))?;
        let mut idx = BufWriter::new(file);
        idx.write_all(INDEX_MAGIC)?;
        idx.write_u64::<LittleEndian>(record_size as u64)?;
        idx.write_u64::<LittleEndian>(header.offset)?;
        idx.write_u64::<LittleEndian>(header.length)?;
        idx.write_u64::<LittleEndian>(self.records.len() as u64)?;
        for block in &self.records {
            idx.write_u64::<LittleEndian>(block.offset)?;
            idx.write_u64::<LittleEndian>(block.length)?;
        }
        idx.flush()?;
        Ok(())
    }
}

/// Index-addressed reader over a compressed stream.
pub struct CompressedSource {
    file: BufReader<File>,
    record_size: usize,
    header: Block,
    records: Vec<Block>,
}

impl CompressedSource {
    /// Opens the stream and its `.idx`.
    ///
    /// # Errors
    ///
    /// `OpenFailure` if either file is missing, `CompressedIndex` if the index
    /// is malformed.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| EdfError::open_failure(path, e))?;
        let index = index_path(path);
        let idx_file = File::open(&index).map_err(|e| EdfError::open_failure(&index, e))?;
        let mut idx = BufReader::new(idx_file);

        let bad = |e: std::io::Error| EdfError::CompressedIndex(format!("{}: {}", index.display(), e));

        let mut magic = [0u8; 8];
        idx.read_exact(&mut magic).map_err(bad)?;
        if &magic != INDEX_MAGIC {
            return Err(EdfError::CompressedIndex(format!("{}: bad magic", index.display())));
        }
        let record_size = idx.read_u64::<LittleEndian>().map_err(bad)? as usize;
        let header = Block {
            offset: idx.read_u64::<LittleEndian>().map_err(bad)?,
            length: idx.read_u64::<LittleEndian>().map_err(bad)?,
        };
        let count = idx.read_u64::<LittleEndian>().map_err(bad)? as usize;
        let mut records = Vec::with_capacity(count.min(1 << 20));
        for _ in 0..count {
            records.push(Block {
                offset: idx.read_u64::<LittleEndian>().map_err(bad)?,
                length: idx.read_u64::<LittleEndian>().map_err(bad)?,
            });
        }

        // 索引中的每个块都必须落在数据文件内
        let data_len = file.metadata()?.len();
        for (i, block) in std::iter::once(&header).chain(&records).enumerate() {
            let inside = block
                .offset
                .checked_add(block.length)
                .map_or(false, |end| end <= data_len);
            if !inside || block.length < 4 {
                return Err(EdfError::CompressedIndex(format!(
                    "{}: block {} ({} bytes at {}) outside the {} byte stream",
                    index.display(),
                    i,
                    block.length,
                    block.offset,
                    data_len
                )));
            }
        }

        Ok(CompressedSource {
            file: BufReader::new(file),
            record_size,
            header,
            records,
        })
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Reads and decompresses one block whose declared size may not exceed
    /// `max_size`.
    fn read_block(&mut self, block: Block, max_size: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(block.offset))?;
        let mut buf = vec![0u8; block.length as usize];
        self.file.read_exact(&mut buf)?;
        let declared = (&buf[..]).read_u32::<LittleEndian>()? as usize;
        if declared > max_size {
            return Err(EdfError::CompressedIndex(format!(
                "block at {} declares {} bytes, at most {} expected",
                block.offset, declared, max_size
            )));
        }
        lz4_flex::decompress_size_prepended(&buf)
            .map_err(|e| EdfError::CompressedIndex(format!("LZ4 decompression failed: {e}")))
    }

    /// Decompressed header bytes.
    pub fn header_bytes(&mut self) -> Result<Vec<u8>> {
        let block = self.header;
        self.read_block(block, MAX_HEADER_BYTES)
    }
}

impl RecordSource for CompressedSource {
    fn read_record(&mut self, r: usize) -> Result<Vec<u8>> {
        let block = *self.records.get(r).ok_or(EdfError::RecordUnavailable(r))?;
        let bytes = self.read_block(block, self.record_size)?;
        if bytes.len() != self.record_size {
            return Err(EdfError::CompressedIndex(format!(
                "record {} holds {} bytes, expected {}",
                r,
                bytes.len(),
                self.record_size
            )));
        }
        Ok(bytes)
    }

    fn record_count(&self) -> usize {
        self.records.len()
    }
}
