use crate::codec::{decode_samples, encode_samples};
use crate::config::Endianness;
use crate::header::EdfHeader;

/// Samples of one channel within one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelData {
    Digital(Vec<i16>),
    /// Raw annotation payload, `2 * samples_per_record` bytes
    Annotation(Vec<u8>),
}

impl ChannelData {
    pub fn digital(&self) -> Option<&[i16]> {
        match self {
            ChannelData::Digital(d) => Some(d),
            ChannelData::Annotation(_) => None,
        }
    }

    pub fn digital_mut(&mut self) -> Option<&mut Vec<i16>> {
        match self {
            ChannelData::Digital(d) => Some(d),
            ChannelData::Annotation(_) => None,
        }
    }

    pub fn annotation(&self) -> Option<&[u8]> {
        match self {
            ChannelData::Annotation(a) => Some(a),
            ChannelData::Digital(_) => None,
        }
    }

    /// Number of 16-bit slots the data occupies.
    pub fn slots(&self) -> usize {
        match self {
            ChannelData::Digital(d) => d.len(),
            ChannelData::Annotation(a) => a.len().div_ceil(2),
        }
    }
}

/// One data record: a slot per channel, in header order.
///
/// A record does not point back to its header; operations that need channel
/// metadata take the header as an argument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub channels: Vec<ChannelData>,
}

/// Byte layout of a record in the backing file.
#[derive(Debug, Clone, Default)]
pub struct RecordLayout {
    pub header_size: usize,
    pub record_size: usize,
    /// Byte offset of each on-disk channel within a record
    pub offsets: Vec<usize>,
}

impl RecordLayout {
    pub fn from_header(header: &EdfHeader) -> Self {
        let mut offsets = Vec::with_capacity(header.samples_per_record_all.len());
        let mut at = 0;
        for n in &header.samples_per_record_all {
            offsets.push(at);
            at += 2 * n;
        }
        RecordLayout {
            header_size: header.header_size_all(),
            record_size: at,
            offsets,
        }
    }

    /// Position of record `r` in the backing file.
    pub fn record_offset(&self, r: usize) -> u64 {
        self.header_size as u64 + self.record_size as u64 * r as u64
    }
}

impl Record {
    /// A record of zeroed data and blank annotation payloads.
    pub fn blank(header: &EdfHeader) -> Self {
        let channels = header
            .signals
            .iter()
            .map(|s| {
                if s.annotation {
                    ChannelData::Annotation(vec![0u8; s.record_bytes()])
                } else {
                    ChannelData::Digital(vec![0i16; s.samples_per_record])
                }
            })
            .collect();
        Record { channels }
    }

    /// Decodes the selected channels from the raw bytes of one on-disk record.
    ///
    /// Channels excluded at header selection are never visited; their bytes
    /// are simply not addressed. Channels that have no on-disk origin are
    /// zero-filled.
    pub fn decode(bytes: &[u8], header: &EdfHeader, layout: &RecordLayout, endianness: Endianness) -> Self {
        let channels = header
            .signals
            .iter()
            .map(|s| {
                let Some(origin) = s.origin else {
                    return if s.annotation {
                        ChannelData::Annotation(vec![0u8; s.record_bytes()])
                    } else {
                        ChannelData::Digital(vec![0i16; s.samples_per_record])
                    };
                };
                // 按原始通道在记录中的偏移定位
                let start = layout.offsets[origin];
                let width = 2 * header.samples_per_record_all[origin];
                let end = (start + width).min(bytes.len());
                let raw = &bytes[start.min(end)..end];
                if s.annotation {
                    ChannelData::Annotation(raw.to_vec())
                } else {
                    let mut samples = decode_samples(raw, endianness);
                    samples.resize(s.samples_per_record, 0);
                    ChannelData::Digital(samples)
                }
            })
            .collect();
        Record { channels }
    }

    /// Encodes the record for the current channel set, padding or truncating
    /// every slot to its declared width.
    pub fn encode(&self, header: &EdfHeader, endianness: Endianness, out: &mut Vec<u8>) {
        for (s, signal) in header.signals.iter().enumerate() {
            let width = signal.record_bytes();
            match self.channels.get(s) {
                Some(ChannelData::Digital(d)) => {
                    let mut samples = d.clone();
                    samples.resize(signal.samples_per_record, 0);
                    encode_samples(&samples, endianness, out);
                }
                Some(ChannelData::Annotation(a)) => {
                    let mut payload = a.clone();
                    payload.resize(width, 0);
                    out.extend_from_slice(&payload);
                }
                None => out.resize(out.len() + width, 0),
            }
        }
    }

    /// Appends a data channel.
    pub fn add_data(&mut self, samples: Vec<i16>) {
        self.channels.push(ChannelData::Digital(samples));
    }

    /// Writes `text` into an annotation slot of `width` bytes, appending a new
    /// channel when `at` is `None`.
    pub fn add_annot(&mut self, text: &[u8], width: usize, at: Option<usize>) {
        let mut payload = text.to_vec();
        payload.resize(width, 0);
        match at {
            Some(s) if s < self.channels.len() => self.channels[s] = ChannelData::Annotation(payload),
            _ => self.channels.push(ChannelData::Annotation(payload)),
        }
    }

    pub fn drop_channel(&mut self, s: usize) {
        if s < self.channels.len() {
            self.channels.remove(s);
        }
    }

    pub fn digital(&self, s: usize) -> Option<&[i16]> {
        self.channels.get(s)?.digital()
    }

    pub fn digital_mut(&mut self, s: usize) -> Option<&mut Vec<i16>> {
        self.channels.get_mut(s)?.digital_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalParam;

    fn header() -> EdfHeader {
        let mut header = EdfHeader::new(1, 1.0, "01.01.20", "00.00.00");
        let mut a = SignalParam::data("A", 2, -1.0, 1.0);
        a.origin = Some(0);
        let mut b = SignalParam::data("B", 3, -1.0, 1.0);
        b.origin = Some(2);
        let mut t = SignalParam::annotation("EDF Annotations", 2);
        t.origin = Some(3);
        header.signals = vec![a, b, t];
        header.channel_count_all = 4;
        header.samples_per_record_all = vec![2, 1, 3, 2];
        header
    }

    #[test]
    fn test_layout_offsets() {
        let layout = RecordLayout::from_header(&header());
        assert_eq!(layout.offsets, vec![0, 4, 6, 12]);
        assert_eq!(layout.record_size, 16);
        assert_eq!(layout.header_size, 256 + 4 * 256);
        assert_eq!(layout.record_offset(2), 1280 + 32);
    }

    #[test]
    fn test_decode_skips_unselected_channels() {
        let header = header();
        let layout = RecordLayout::from_header(&header);
        let mut raw = Vec::new();
        encode_samples(&[1, 2], Endianness::Little, &mut raw);
        encode_samples(&[99], Endianness::Little, &mut raw);
        encode_samples(&[3, 4, 5], Endianness::Little, &mut raw);
        raw.extend_from_slice(b"+0\x14\x14");

        let record = Record::decode(&raw, &header, &layout, Endianness::Little);
        assert_eq!(record.digital(0), Some(&[1i16, 2][..]));
        assert_eq!(record.digital(1), Some(&[3i16, 4, 5][..]));
        assert_eq!(record.channels[2].annotation(), Some(&b"+0\x14\x14"[..]));

        let mut out = Vec::new();
        record.encode(&header, Endianness::Little, &mut out);
        assert_eq!(out.len(), header.record_size());
    }

    #[test]
    fn test_add_annot_pads() {
        let mut record = Record::default();
        record.add_annot(b"+1\x14\x14\x00", 8, None);
        assert_eq!(record.channels[0].annotation().unwrap().len(), 8);
        assert_eq!(record.channels[0].slots(), 4);
    }
}
