//! Integer-grid local maximum detection
//!
//! A pixel is a candidate when it equals the grayscale dilation of the image
//! by the disk footprint (it is the brightest pixel of its neighborhood) and
//! exceeds a percentile of the nonzero gray values. Candidates too close to
//! an edge are rejected so that every later stage sees complete
//! neighborhoods.

use ndarray::{ArrayD, Slice, Zip};

use crate::masks::MaskSet;
use crate::preprocess::ProcessedInt;

/// Candidate position on the integer grid, in image-axis order.
pub type Candidate = Vec<usize>;

/// Grayscale threshold at a percentile of the nonzero pixel values.
///
/// Linear interpolation between ranks. `None` when the image is entirely
/// black.
pub fn percentile_threshold<P: ProcessedInt>(image: &ArrayD<P>, percentile: f64) -> Option<f64> {
    let mut not_black: Vec<f64> = image
        .iter()
        .filter(|v| !v.is_zero())
        .map(|v| v.as_())
        .collect();
    if not_black.is_empty() {
        return None;
    }
    not_black.sort_by(f64::total_cmp);
    let rank = percentile / 100.0 * (not_black.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(not_black[lo] * (1.0 - frac) + not_black[hi] * frac)
}

/// Grayscale dilation by an arbitrary footprint with constant-zero boundary.
///
/// Each output pixel is the maximum input value over the footprint centered
/// there; neighborhoods reaching past an edge treat the outside as zero.
pub fn grey_dilation<P: ProcessedInt>(image: &ArrayD<P>, footprint: &ArrayD<bool>) -> ArrayD<P> {
    let ndim = image.ndim();
    let center: Vec<isize> = footprint.shape().iter().map(|&s| (s / 2) as isize).collect();
    let mut out = ArrayD::zeros(image.raw_dim());

    for (idx, &inside) in footprint.indexed_iter() {
        if !inside {
            continue;
        }
        let offset: Vec<isize> = (0..ndim).map(|k| idx[k] as isize - center[k]).collect();
        if offset.iter().enumerate().any(|(k, &o)| {
            let len = image.shape()[k] as isize;
            o.abs() >= len
        }) {
            continue;
        }
        // For offset o the source pixel is x + o; restrict both views to
        // where that stays in bounds.
        let shifted = image.slice_each_axis(|ad| {
            let o = offset[ad.axis.index()];
            let len = ad.len as isize;
            if o >= 0 {
                Slice::from(o..len)
            } else {
                Slice::from(0..len + o)
            }
        });
        let mut region = out.slice_each_axis_mut(|ad| {
            let o = offset[ad.axis.index()];
            let len = ad.len as isize;
            if o >= 0 {
                Slice::from(0..len - o)
            } else {
                Slice::from(-o..len)
            }
        });
        Zip::from(&mut region).and(&shifted).for_each(|d, &s| {
            if s > *d {
                *d = s;
            }
        });
    }
    out
}

/// Local maxima brighter than the `percentile` gate, at least `margin` away
/// from every edge, in the natural scan order of the array.
pub fn local_maxima<P: ProcessedInt>(
    image: &ArrayD<P>,
    masks: &MaskSet,
    percentile: f64,
    margin: &[usize],
) -> Vec<Candidate> {
    let Some(threshold) = percentile_threshold(image, percentile) else {
        log::warn!("image is completely black");
        return Vec::new();
    };

    let dilation = grey_dilation(image, &masks.binary);
    let mut maxima: Vec<Candidate> = Vec::new();
    for ((idx, &v), &d) in image.indexed_iter().zip(dilation.iter()) {
        if v == d && v.as_() > threshold {
            maxima.push((0..image.ndim()).map(|k| idx[k]).collect());
        }
    }
    if maxima.is_empty() {
        log::warn!("image contains no local maxima");
        return maxima;
    }

    let shape = image.shape();
    maxima.retain(|coord| {
        coord.iter().zip(margin).zip(shape).all(|((&x, &m), &len)| {
            x >= m && x + m + 1 <= len
        })
    });
    if maxima.is_empty() {
        log::warn!("all local maxima were in the margins");
    }
    maxima
}

/// Total brightness in the masked neighborhood of a candidate.
pub fn estimate_mass<P: ProcessedInt>(
    image: &ArrayD<P>,
    masks: &MaskSet,
    radius: &[usize],
    coord: &[usize],
) -> f64 {
    let neighborhood = image.slice_each_axis(|ad| {
        let k = ad.axis.index();
        Slice::from((coord[k] - radius[k]) as isize..(coord[k] + radius[k] + 1) as isize)
    });
    Zip::from(&neighborhood)
        .and(&masks.binary)
        .fold(0.0, |acc, &v, &m| if m { acc + v.as_() } else { acc })
}

/// Radius of gyration of the masked neighborhood, from the mass estimate.
pub fn estimate_size<P: ProcessedInt>(
    image: &ArrayD<P>,
    masks: &MaskSet,
    radius: &[usize],
    coord: &[usize],
    estimated_mass: f64,
) -> f64 {
    let neighborhood = image.slice_each_axis(|ad| {
        let k = ad.axis.index();
        Slice::from((coord[k] - radius[k]) as isize..(coord[k] + radius[k] + 1) as isize)
    });
    let second_moment = Zip::from(&neighborhood)
        .and(&masks.r2)
        .fold(0.0, |acc, &v, &r2| acc + r2 * v.as_());
    (second_moment / estimated_mass).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn image_from(shape: &[usize], points: &[(&[usize], u8)]) -> ArrayD<u8> {
        let mut a = ArrayD::from_elem(IxDyn(shape), 1_u8);
        for &(at, v) in points {
            a[at] = v;
        }
        a
    }

    #[test]
    fn percentile_ignores_zero_pixels() {
        let mut a = ArrayD::<u8>::zeros(IxDyn(&[3, 3]));
        a[[0, 0]] = 10;
        a[[0, 1]] = 20;
        a[[0, 2]] = 30;
        assert_eq!(percentile_threshold(&a, 50.0), Some(20.0));
        assert_eq!(percentile_threshold(&a, 100.0), Some(30.0));
        assert_eq!(
            percentile_threshold(&ArrayD::<u8>::zeros(IxDyn(&[3, 3])), 64.0),
            None
        );
    }

    #[test]
    fn dilation_spreads_the_maximum_over_the_disk() {
        let a = image_from(&[9, 9], &[(&[4, 4], 100)]);
        let masks = MaskSet::get(&[2, 2]);
        let d = grey_dilation(&a, &masks.binary);
        assert_eq!(d[[4, 4]], 100);
        assert_eq!(d[[2, 4]], 100);
        assert_eq!(d[[4, 6]], 100);
        assert_eq!(d[[3, 3]], 100);
        // Corners of the bounding square are outside the disk.
        assert_eq!(d[[2, 2]], 1);
        assert_eq!(d[[8, 8]], 1);
    }

    #[test]
    fn single_peak_is_found() {
        let a = image_from(&[21, 23], &[(&[11, 13], 100)]);
        let masks = MaskSet::get(&[2, 2]);
        let maxima = local_maxima(&a, &masks, 64.0, &[2, 2]);
        assert_eq!(maxima, vec![vec![11, 13]]);
    }

    #[test]
    fn peaks_in_the_margin_are_rejected() {
        let a = image_from(&[21, 23], &[(&[1, 1], 100)]);
        let masks = MaskSet::get(&[2, 2]);
        let maxima = local_maxima(&a, &masks, 64.0, &[2, 2]);
        assert!(maxima.is_empty());
    }

    #[test]
    fn mass_and_size_estimates() {
        let a = image_from(&[21, 23], &[(&[11, 13], 101)]);
        let masks = MaskSet::get(&[2, 2]);
        let mass = estimate_mass(&a, &masks, &[2, 2], &[11, 13]);
        // Peak plus one count for every other disk pixel.
        assert_eq!(mass, 100.0 + masks.disk_area() as f64);
        let size = estimate_size(&a, &masks, &[2, 2], &[11, 13], mass);
        assert!(size > 0.0 && size < 2.0);
    }
}
