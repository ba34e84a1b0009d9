//! Positional uncertainty estimation
//!
//! The static error of a centroid position is driven by background noise
//! leaking into the masked center of mass. The background statistics are
//! measured on the pixels the bandpass classifies as non-signal, and the
//! error itself is first-order propagation of uncorrelated pixel noise
//! through the centroid sum.

use ndarray::ArrayD;

use crate::masks::MaskSet;
use crate::preprocess::bandpass;

/// Mean (black level) and standard deviation (noise) of the background.
///
/// Background pixels are those a bandpass at the feature scale zeroes out.
/// Returns `(0, 0)` when nothing is classified as background.
pub fn measure_noise(
    raw: &ArrayD<f64>,
    diameter: &[usize],
    threshold: f64,
) -> (f64, f64) {
    let noise_size = vec![1.0; raw.ndim()];
    let Ok(signal) = bandpass(raw, &noise_size, diameter, threshold) else {
        return (0.0, 0.0);
    };

    let mut count = 0_usize;
    let mut sum = 0.0;
    for (&v, &s) in raw.iter().zip(signal.iter()) {
        if s == 0.0 {
            count += 1;
            sum += v;
        }
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let mut var = 0.0;
    for (&v, &s) in raw.iter().zip(signal.iter()) {
        if s == 0.0 {
            var += (v - mean) * (v - mean);
        }
    }
    (mean, (var / count as f64).sqrt())
}

/// Static positional error of one feature.
///
/// First-order propagation of i.i.d. pixel noise with standard deviation
/// `noise` through the masked centroid: the variance per axis is
/// `noise² · Σ R² / ndim`, normalized by the feature mass.
pub fn static_error(mass: f64, noise: f64, masks: &MaskSet) -> f64 {
    if mass <= 0.0 {
        return f64::NAN;
    }
    let r2_sum = masks.r2.sum();
    let ndim = masks.binary.ndim() as f64;
    noise * (r2_sum / ndim).sqrt() / mass
}
