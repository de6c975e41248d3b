//! Sample-rate conversion for derived channels.
//!
//! Resampling is done in the frequency domain: the spectrum of the whole
//! signal is truncated (or zero-padded) to the new length and transformed
//! back. Truncation acts as an ideal low-pass at the new Nyquist frequency,
//! so downsampling does not alias.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

/// Resamples `data`, sampled at `from_rate`, to `to_rate`.
///
/// The output holds `round(len * to_rate / from_rate)` samples. The signal is
/// treated as periodic over its length.
pub fn resample(data: &[f64], from_rate: f64, to_rate: f64) -> Vec<f64> {
    if data.is_empty() || from_rate <= 0.0 || to_rate <= 0.0 {
        return Vec::new();
    }
    if (from_rate - to_rate).abs() < f64::EPSILON {
        return data.to_vec();
    }

    let n = data.len();
    let m = (n as f64 * to_rate / from_rate).round() as usize;
    if m == 0 {
        return Vec::new();
    }
    if m == n {
        return data.to_vec();
    }

    let mut planner = FftPlanner::<f64>::new();
    let mut spectrum: Vec<Complex<f64>> = data.iter().map(|&x| Complex::new(x, 0.0)).collect();
    planner.plan_fft_forward(n).process(&mut spectrum);

    // 正频率 0..=half, 负频率 1..(nmin+1)/2
    let nmin = n.min(m);
    let half = nmin / 2;
    let mut out = vec![Complex::new(0.0, 0.0); m];
    out[..=half].copy_from_slice(&spectrum[..=half]);
    for k in 1..(nmin + 1) / 2 {
        out[m - k] = spectrum[n - k];
    }
    if nmin % 2 == 0 {
        if m < n {
            // fold the discarded mirror bin into the new Nyquist bin
            out[half] += spectrum[n - half];
        } else {
            // split the old Nyquist bin between both halves
            out[half] *= 0.5;
            out[m - half] = out[half];
        }
    }

    planner.plan_fft_inverse(m).process(&mut out);
    let scale = 1.0 / n as f64;
    out.iter().map(|c| c.re * scale).collect()
}
