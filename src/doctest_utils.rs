// Helpers that build small recordings for documentation examples and tests

use std::f64::consts::PI;
use std::path::Path;

use crate::{Edf, Result};

/// `n` samples of a `freq` Hz sine of amplitude `amp`, sampled at `fs` Hz.
pub fn sine(n: usize, fs: f64, freq: f64, amp: f64) -> Vec<f64> {
    (0..n)
        .map(|i| amp * (2.0 * PI * freq * i as f64 / fs).sin())
        .collect()
}

/// Writes a plain EDF file with one 256 Hz EEG channel, ten 1-second records.
pub fn create_simple_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let mut edf = Edf::empty("DOC001", 10, 1.0, "01.01.24", "22.00.00");
    edf.add_signal("EEG Fp1", 256.0, &sine(2560, 256.0, 10.0, 50.0))?;
    let s = edf.header().signal("EEG Fp1")?;
    let signal = &mut edf.header_mut().signals[s];
    signal.physical_dimension = "uV".to_string();
    signal.transducer = "AgAgCl cup electrodes".to_string();
    signal.prefilter = "HP:0.1Hz LP:70Hz".to_string();
    edf.write(path, false)
}

/// Writes a plain EDF file with channels `C4`, `M1`, `M2` at 128 Hz and `EMG`
/// at 256 Hz, `records` 1-second records.
pub fn create_multi_channel_test_file<P: AsRef<Path>>(path: P, records: usize) -> Result<()> {
    let mut edf = Edf::empty("DOC002", records, 1.0, "15.03.24", "23.30.00");
    let n = records * 128;
    edf.add_signal("C4", 128.0, &sine(n, 128.0, 10.0, 80.0))?;
    edf.add_signal("M1", 128.0, &sine(n, 128.0, 1.0, 20.0))?;
    edf.add_signal("M2", 128.0, &sine(n, 128.0, 3.0, 10.0))?;
    edf.add_signal("EMG", 256.0, &sine(2 * n, 256.0, 40.0, 5.0))?;
    for signal in edf.header_mut().signals.iter_mut() {
        signal.physical_dimension = "uV".to_string();
    }
    edf.write(path, false)
}
