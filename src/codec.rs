//! Fixed-width ASCII header fields and 16-bit sample encoding.
//!
//! Every EDF header field occupies an exact number of bytes. Text is stored
//! left-aligned and space padded; numbers are stored as ASCII decimal text in
//! the same way. Sample data is two's complement 16-bit.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::config::Endianness;
use crate::error::{EdfError, Result};

/// Cursor over a header buffer that consumes one fixed-width field at a time.
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, width: usize) -> Result<&'a [u8]> {
        let end = self.pos + width;
        if end > self.buf.len() {
            return Err(EdfError::InvalidFormat(format!(
                "header truncated: need {} bytes at offset {}, have {}",
                width,
                self.pos,
                self.buf.len()
            )));
        }
        let field = &self.buf[self.pos..end];
        self.pos = end;
        Ok(field)
    }

    /// Reads a text field, mapping non-printable bytes to `?` and trimming
    /// trailing whitespace.
    pub fn string(&mut self, width: usize) -> Result<String> {
        let raw = self.take(width)?;
        let text: String = raw
            .iter()
            .map(|&b| if (32..=126).contains(&b) { b as char } else { '?' })
            .collect();
        Ok(text.trim_end().to_string())
    }

    pub fn int(&mut self, field: &'static str, width: usize) -> Result<i64> {
        let text = self.string(width)?;
        text.trim()
            .parse::<i64>()
            .map_err(|_| EdfError::InvalidField { field, raw: text })
    }

    /// Reads a real-valued field. An entirely blank field reads as `-1`.
    pub fn double(&mut self, field: &'static str, width: usize) -> Result<f64> {
        let text = self.string(width)?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(-1.0);
        }
        trimmed
            .parse::<f64>()
            .map_err(|_| EdfError::InvalidField { field, raw: text })
    }

    pub fn bytes(&mut self, width: usize) -> Result<Vec<u8>> {
        Ok(self.take(width)?.to_vec())
    }

    pub fn skip(&mut self, width: usize) -> Result<()> {
        self.take(width).map(|_| ())
    }
}

/// Appends `text` as exactly `width` bytes: non-ASCII characters become `_`,
/// longer text is truncated, shorter text is space padded.
pub fn put_str(out: &mut Vec<u8>, text: &str, width: usize) {
    let mut field: Vec<u8> = text
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'_' })
        .take(width)
        .collect();
    field.resize(width, b' ');
    out.extend_from_slice(&field);
}

pub fn put_int(out: &mut Vec<u8>, value: i64, width: usize) {
    put_str(out, &value.to_string(), width);
}

pub fn put_double(out: &mut Vec<u8>, value: f64, width: usize) {
    put_str(out, &format_number(value, width), width);
}

/// Renders `value` in the most precise decimal form that fits in `width`
/// characters.
pub fn format_number(value: f64, width: usize) -> String {
    let plain = format!("{}", value);
    if plain.len() <= width {
        return plain;
    }
    for decimals in (0..width).rev() {
        let text = trim_fraction(format!("{:.*}", decimals, value));
        if text.len() <= width {
            return text;
        }
    }
    // integral part alone does not fit; nothing sensible left to do
    format!("{:.0}", value).chars().take(width).collect()
}

fn trim_fraction(text: String) -> String {
    if !text.contains('.') {
        return text;
    }
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Replaces every byte outside printable 7-bit ASCII with `fill`.
pub fn ascii7(bytes: &mut [u8], fill: u8) {
    for b in bytes.iter_mut() {
        if !(32..=126).contains(b) {
            *b = fill;
        }
    }
}

pub fn decode_samples(bytes: &[u8], endianness: Endianness) -> Vec<i16> {
    let mut samples = vec![0i16; bytes.len() / 2];
    let bytes = &bytes[..samples.len() * 2];
    match endianness {
        Endianness::Little => LittleEndian::read_i16_into(bytes, &mut samples),
        Endianness::Big => BigEndian::read_i16_into(bytes, &mut samples),
    }
    samples
}

pub fn encode_samples(samples: &[i16], endianness: Endianness, out: &mut Vec<u8>) {
    let start = out.len();
    out.resize(start + samples.len() * 2, 0);
    let dst = &mut out[start..];
    match endianness {
        Endianness::Little => LittleEndian::write_i16_into(samples, dst),
        Endianness::Big => BigEndian::write_i16_into(samples, dst),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_field_trims_and_sanitizes() {
        let raw = b"EEG\x01C4   ";
        let mut reader = FieldReader::new(raw);
        assert_eq!(reader.string(9).unwrap(), "EEG?C4");
        assert_eq!(reader.position(), 9);
    }

    #[test]
    fn test_numeric_fields() {
        let raw = b"256     -200    abc     ";
        let mut reader = FieldReader::new(raw);
        assert_eq!(reader.int("samples", 8).unwrap(), 256);
        assert_eq!(reader.double("physical min", 8).unwrap(), -200.0);
        match reader.int("digital max", 8) {
            Err(EdfError::InvalidField { field, raw }) => {
                assert_eq!(field, "digital max");
                assert_eq!(raw, "abc");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_blank_double_reads_as_minus_one() {
        let mut reader = FieldReader::new(b"        ");
        assert_eq!(reader.double("physical max", 8).unwrap(), -1.0);
    }

    #[test]
    fn test_truncated_header() {
        let mut reader = FieldReader::new(b"abc");
        assert!(reader.string(8).is_err());
    }

    #[test]
    fn test_put_str_pads_and_truncates() {
        let mut out = Vec::new();
        put_str(&mut out, "EEG", 8);
        put_str(&mut out, "0123456789", 4);
        put_str(&mut out, "µV", 4);
        assert_eq!(&out, b"EEG     0123_V  ");
    }

    #[test]
    fn test_format_number_fits_width() {
        assert_eq!(format_number(-200.0, 8), "-200");
        assert_eq!(format_number(0.5, 8), "0.5");
        assert_eq!(format_number(-3.141592653589793, 8), "-3.14159");
        assert_eq!(format_number(123456.789, 8), "123456.8");
        assert_eq!(format_number(-0.00001, 4), "0");
        for v in [1.0 / 3.0, -98765.4321, 1e-9, 32767.0] {
            assert!(format_number(v, 8).len() <= 8);
        }
    }

    #[test]
    fn test_sample_codec_endianness() {
        let samples = [1i16, -2, 32767, -32768];
        let mut le = Vec::new();
        encode_samples(&samples, Endianness::Little, &mut le);
        assert_eq!(&le[..4], &[0x01, 0x00, 0xFE, 0xFF]);
        assert_eq!(decode_samples(&le, Endianness::Little), samples);

        let mut be = Vec::new();
        encode_samples(&samples, Endianness::Big, &mut be);
        assert_eq!(&be[..4], &[0x00, 0x01, 0xFF, 0xFE]);
        assert_eq!(decode_samples(&be, Endianness::Big), samples);
    }

    #[test]
    fn test_ascii7() {
        let mut bytes = b"EDF+C\x00\xff ".to_vec();
        ascii7(&mut bytes, b' ');
        assert_eq!(&bytes, b"EDF+C   ");
    }
}
