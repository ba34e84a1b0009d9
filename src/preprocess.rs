//! Image preprocessing: bandpass filtering, inversion, and gamut rescaling
//!
//! The bandpass subtracts a boxcar-smoothed background from a Gaussian-blurred
//! image, suppressing both pixel noise and long-wavelength illumination
//! variations. Both filters extend the image with zeros. The result is
//! floored and rescaled to fill the gamut of an integer type, which is what
//! the peak detector requires.

use ndarray::{ArrayD, Axis, Zip};
use num_traits::{AsPrimitive, PrimInt, Unsigned};

use crate::error::{LocateError, LocateResult};

/// Unsigned integer type a processed image is stored as.
///
/// The detector compares pixels for exact equality against a grayscale
/// dilation, which is only meaningful on integer samples.
pub trait ProcessedInt:
    PrimInt + Unsigned + AsPrimitive<f64> + Send + Sync + 'static
{
    /// Truncating conversion from a non-negative float, saturating at the
    /// type maximum.
    fn from_f64(v: f64) -> Self;
}

impl ProcessedInt for u8 {
    fn from_f64(v: f64) -> u8 {
        v as u8
    }
}

impl ProcessedInt for u16 {
    fn from_f64(v: f64) -> u16 {
        v as u16
    }
}

/// Scalar sample type accepted by [`crate::locate`]
///
/// Unsigned integer samples keep their own gamut through the pipeline.
/// Floating samples are assumed to lie in `[0, 1]` and are processed in the
/// `u8` gamut.
pub trait Sample: Copy + PartialOrd + Send + Sync + 'static {
    /// Integer type the processed image is rescaled to
    type Processed: ProcessedInt;

    /// Floor applied to the bandpass when none is configured
    const DEFAULT_BANDPASS_FLOOR: f64;

    fn to_f64(self) -> f64;

    /// The complementary brightness: bitwise complement for integers,
    /// `1 − x` for floats.
    fn invert(self) -> Self;
}

impl Sample for u8 {
    type Processed = u8;
    const DEFAULT_BANDPASS_FLOOR: f64 = 1.0;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn invert(self) -> u8 {
        !self
    }
}

impl Sample for u16 {
    type Processed = u16;
    const DEFAULT_BANDPASS_FLOOR: f64 = 1.0;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn invert(self) -> u16 {
        !self
    }
}

impl Sample for f32 {
    type Processed = u8;
    const DEFAULT_BANDPASS_FLOOR: f64 = 1.0 / 255.0;

    fn to_f64(self) -> f64 {
        f64::from(self)
    }

    fn invert(self) -> f32 {
        1.0 - self
    }
}

impl Sample for f64 {
    type Processed = u8;
    const DEFAULT_BANDPASS_FLOOR: f64 = 1.0 / 255.0;

    fn to_f64(self) -> f64 {
        self
    }

    fn invert(self) -> f64 {
        1.0 - self
    }
}

/// Correlate one axis with a short kernel, extending the image with zeros.
fn correlate1d(image: &ArrayD<f64>, weights: &[f64], axis: Axis) -> ArrayD<f64> {
    let mut out = ArrayD::zeros(image.raw_dim());
    let half = weights.len() as isize / 2;
    Zip::from(out.lanes_mut(axis))
        .and(image.lanes(axis))
        .for_each(|mut o, lane| {
            let n = lane.len() as isize;
            for x in 0..n {
                let mut acc = 0.0;
                for (k, &w) in weights.iter().enumerate() {
                    let j = x + k as isize - half;
                    if (0..n).contains(&j) {
                        acc += w * lane[j as usize];
                    }
                }
                o[x as usize] = acc;
            }
        });
    out
}

/// Normalized Gaussian kernel truncated at four standard deviations.
fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as usize;
    let mut weights: Vec<f64> = (0..=2 * radius)
        .map(|k| {
            let d = k as f64 - radius as f64;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    for w in &mut weights {
        *w /= total;
    }
    weights
}

/// Gaussian blur with per-axis standard deviations and zero boundary.
pub fn gaussian_blur(image: &ArrayD<f64>, sigma: &[f64]) -> ArrayD<f64> {
    let mut out = image.clone();
    for (axis, &s) in sigma.iter().enumerate() {
        out = correlate1d(&out, &gaussian_kernel(s), Axis(axis));
    }
    out
}

/// Boxcar (uniform) smoothing with per-axis window widths and zero boundary.
pub fn boxcar(image: &ArrayD<f64>, size: &[usize]) -> ArrayD<f64> {
    let mut out = image.clone();
    for (axis, &w) in size.iter().enumerate() {
        let weights = vec![1.0 / w as f64; w];
        out = correlate1d(&out, &weights, Axis(axis));
    }
    out
}

/// Bandpass: Gaussian blur minus boxcar background, floored at `threshold`.
///
/// Values below the floor become zero, which also clips the negative lobes
/// of the subtraction. Fails if any size is not positive.
pub fn bandpass(
    image: &ArrayD<f64>,
    noise_size: &[f64],
    smoothing_size: &[usize],
    threshold: f64,
) -> LocateResult<ArrayD<f64>> {
    if noise_size.iter().any(|&s| s <= 0.0) {
        return Err(LocateError::invalid_parameter("noise size must be positive"));
    }
    if smoothing_size.iter().any(|&s| s == 0) {
        return Err(LocateError::invalid_parameter(
            "smoothing size must be positive",
        ));
    }
    let blurred = gaussian_blur(image, noise_size);
    let background = boxcar(image, smoothing_size);
    let mut out = blurred;
    Zip::from(&mut out).and(&background).for_each(|v, &b| {
        let d = *v - b;
        *v = if d >= threshold { d } else { 0.0 };
    });
    Ok(out)
}

/// The image with inverted brightness, for dark-on-light features.
///
/// Always returns a new array; the input is left untouched.
pub fn invert_image<T: Sample>(image: &ArrayD<T>) -> ArrayD<T> {
    image.mapv(Sample::invert)
}

/// Rescale a non-negative float image to fill the gamut of `P`.
///
/// An all-zero image stays all zero.
pub fn scale_to_gamut<P: ProcessedInt>(image: &ArrayD<f64>) -> ArrayD<P> {
    let max = image.fold(0.0_f64, |m, &v| m.max(v));
    if max <= 0.0 {
        return ArrayD::zeros(image.raw_dim());
    }
    let gamut: f64 = P::max_value().as_();
    image.mapv(|v| P::from_f64(v / max * gamut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn impulse(shape: &[usize], at: &[usize]) -> ArrayD<f64> {
        let mut a = ArrayD::zeros(IxDyn(shape));
        a[at] = 1.0;
        a
    }

    #[test]
    fn gaussian_blur_preserves_total_intensity_away_from_edges() {
        let img = impulse(&[21, 21], &[10, 10]);
        let blurred = gaussian_blur(&img, &[1.5, 1.5]);
        assert!((blurred.sum() - 1.0).abs() < 1e-9);
        // Symmetric response around the impulse.
        assert_eq!(blurred[[9, 10]], blurred[[11, 10]]);
        assert_eq!(blurred[[10, 9]], blurred[[10, 11]]);
    }

    #[test]
    fn boxcar_is_a_flat_window() {
        let img = impulse(&[11, 11], &[5, 5]);
        let smoothed = boxcar(&img, &[3, 3]);
        for i in 4..=6 {
            for j in 4..=6 {
                assert!((smoothed[[i, j]] - 1.0 / 9.0).abs() < 1e-12);
            }
        }
        assert_eq!(smoothed[[5, 8]], 0.0);
    }

    #[test]
    fn bandpass_floors_the_background() {
        let img = ArrayD::from_elem(IxDyn(&[15, 15]), 10.0);
        // Uniform image: blur equals background in the interior, so the
        // difference is below any positive floor.
        let out = bandpass(&img, &[1.0, 1.0], &[5, 5], 1.0).unwrap();
        assert_eq!(out[[7, 7]], 0.0);
    }

    #[test]
    fn bandpass_rejects_nonpositive_sizes() {
        let img = ArrayD::zeros(IxDyn(&[5, 5]));
        assert!(bandpass(&img, &[0.0, 1.0], &[3, 3], 1.0).is_err());
        assert!(bandpass(&img, &[1.0, 1.0], &[0, 3], 1.0).is_err());
    }

    #[test]
    fn invert_complements_integer_samples() {
        let img = ArrayD::from_elem(IxDyn(&[2, 2]), 10_u8);
        let inverted = invert_image(&img);
        assert_eq!(inverted[[0, 0]], 245);
        // Input untouched.
        assert_eq!(img[[0, 0]], 10);

        let img = ArrayD::from_elem(IxDyn(&[2, 2]), 0.25_f32);
        assert_eq!(invert_image(&img)[[0, 0]], 0.75);
    }

    #[test]
    fn scale_to_gamut_stretches_to_the_type_maximum() {
        let mut img = ArrayD::zeros(IxDyn(&[3, 3]));
        img[[1, 1]] = 50.0;
        img[[0, 0]] = 25.0;
        let scaled: ArrayD<u8> = scale_to_gamut(&img);
        assert_eq!(scaled[[1, 1]], 255);
        assert_eq!(scaled[[0, 0]], 127);

        let black: ArrayD<u8> = scale_to_gamut(&ArrayD::zeros(IxDyn(&[3, 3])));
        assert!(black.iter().all(|&v| v == 0));
    }
}
