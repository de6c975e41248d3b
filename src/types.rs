use crate::scaling::{Scaling, DIGITAL_MAX, DIGITAL_MIN};

/// Format and continuity of a recording.
///
/// Legacy EDF is always continuous; only EDF+ can be discontinuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Plain EDF, no marker in the reserved field
    Edf,
    /// EDF+ continuous (`EDF+C`)
    EdfPlusC,
    /// EDF+ discontinuous (`EDF+D`)
    EdfPlusD,
}

impl FileType {
    /// Decodes the marker at the start of the 44-byte reserved field.
    pub fn from_reserved(reserved: &[u8]) -> Self {
        if reserved.len() >= 5 && &reserved[..4] == b"EDF+" {
            match reserved[4] {
                b'C' => return FileType::EdfPlusC,
                b'D' => return FileType::EdfPlusD,
                _ => {}
            }
        }
        FileType::Edf
    }

    pub fn is_plus(self) -> bool {
        self != FileType::Edf
    }

    pub fn is_continuous(self) -> bool {
        self != FileType::EdfPlusD
    }

    pub fn marker(self) -> &'static [u8] {
        match self {
            FileType::Edf => b"     ",
            FileType::EdfPlusC => b"EDF+C",
            FileType::EdfPlusD => b"EDF+D",
        }
    }
}

/// Per-channel header entry.
///
/// Besides the fields stored on disk, each entry keeps the ranges as they
/// were first read (`orig_*`), the derived scaling pair, and the index of
/// the on-disk channel it is decoded from. Channels created in memory have
/// no on-disk origin.
#[derive(Debug, Clone)]
pub struct SignalParam {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub orig_physical_min: f64,
    pub orig_physical_max: f64,
    pub orig_digital_min: i32,
    pub orig_digital_max: i32,
    pub prefilter: String,
    pub samples_per_record: usize,
    pub reserved: String,
    pub annotation: bool,
    pub scaling: Scaling,
    pub origin: Option<usize>,
}

impl SignalParam {
    /// A synthesized data channel spanning the full 16-bit digital range.
    pub fn data(label: &str, samples_per_record: usize, physical_min: f64, physical_max: f64) -> Self {
        let mut signal = SignalParam {
            label: label.to_string(),
            transducer: String::new(),
            physical_dimension: String::new(),
            physical_min,
            physical_max,
            digital_min: DIGITAL_MIN,
            digital_max: DIGITAL_MAX,
            orig_physical_min: physical_min,
            orig_physical_max: physical_max,
            orig_digital_min: DIGITAL_MIN,
            orig_digital_max: DIGITAL_MAX,
            prefilter: String::new(),
            samples_per_record,
            reserved: String::new(),
            annotation: false,
            scaling: Scaling::identity(),
            origin: None,
        };
        signal.update_scaling();
        signal
    }

    /// A synthesized annotation channel holding `2 * samples_per_record` bytes
    /// per record.
    pub fn annotation(label: &str, samples_per_record: usize) -> Self {
        let mut signal = SignalParam::data(label, samples_per_record, -1.0, 1.0);
        signal.annotation = true;
        signal.scaling = Scaling::identity();
        signal
    }

    /// Re-derives `bitvalue`/`offset` from the current ranges.
    pub fn update_scaling(&mut self) {
        self.scaling = if self.digital_max > self.digital_min {
            Scaling::from_ranges(
                self.physical_min,
                self.physical_max,
                self.digital_min,
                self.digital_max,
            )
        } else {
            Scaling::identity()
        };
    }

    /// Sets a new physical range over the full 16-bit digital span.
    pub fn set_physical_range(&mut self, physical_min: f64, physical_max: f64) {
        self.physical_min = physical_min;
        self.physical_max = physical_max;
        self.digital_min = DIGITAL_MIN;
        self.digital_max = DIGITAL_MAX;
        self.update_scaling();
    }

    pub fn to_physical(&self, digital: i16) -> f64 {
        self.scaling.dig2phys(digital)
    }

    /// Clamps to the channel's physical range, then quantizes. The range may
    /// be inverted (`physical_min > physical_max`) for reversed polarity.
    pub fn to_digital(&self, physical: f64) -> i16 {
        let lo = self.physical_min.min(self.physical_max);
        let hi = self.physical_min.max(self.physical_max);
        // 反极性通道: 按实际上下界截断
        let clamped = if physical < lo {
            lo
        } else if physical > hi {
            hi
        } else {
            physical
        };
        self.scaling.phys2dig(clamped)
    }

    /// Whether `physical` falls outside the channel's physical range.
    pub fn out_of_range(&self, physical: f64) -> bool {
        let lo = self.physical_min.min(self.physical_max);
        let hi = self.physical_min.max(self.physical_max);
        physical < lo || physical > hi
    }

    /// Bytes this channel occupies in one record.
    pub fn record_bytes(&self) -> usize {
        2 * self.samples_per_record
    }

    pub fn sampling_freq(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_marker() {
        assert_eq!(FileType::from_reserved(b"EDF+C      "), FileType::EdfPlusC);
        assert_eq!(FileType::from_reserved(b"EDF+D"), FileType::EdfPlusD);
        assert_eq!(FileType::from_reserved(b"EDF+X"), FileType::Edf);
        assert_eq!(FileType::from_reserved(b"    "), FileType::Edf);
        assert!(FileType::Edf.is_continuous());
        assert!(!FileType::EdfPlusD.is_continuous());
    }

    #[test]
    fn test_to_digital_clamps() {
        let signal = SignalParam::data("X", 10, -100.0, 100.0);
        assert_eq!(signal.to_digital(1e6), 32767);
        assert_eq!(signal.to_digital(-1e6), -32768);
        assert!((signal.to_physical(signal.to_digital(12.5)) - 12.5).abs() < 0.01);
    }

    #[test]
    fn test_to_digital_inverted_polarity() {
        let mut signal = SignalParam::data("X", 10, -100.0, 100.0);
        signal.physical_min = 100.0;
        signal.physical_max = -100.0;
        signal.update_scaling();

        // 100 maps to the lowest code, -100 to the highest
        assert_eq!(signal.to_digital(100.0), -32768);
        assert_eq!(signal.to_digital(-100.0), 32767);
        assert_eq!(signal.to_digital(1e6), -32768);
        assert!((signal.to_physical(signal.to_digital(12.5)) - 12.5).abs() < 0.01);
        assert!(signal.out_of_range(150.0));
        assert!(!signal.out_of_range(-50.0));
    }
}
