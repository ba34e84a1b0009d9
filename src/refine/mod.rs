//! Iterative sub-pixel centroid refinement
//!
//! Starting from an integer candidate, each feature is honed in on by
//! alternating two regimes. While the masked center of mass is off by more
//! than [`SHIFT_THRESH`] the whole neighborhood window walks one pixel per
//! axis toward it. Once the offset drops below that, the neighborhood is
//! shifted by the fractional offset with spline interpolation, after which
//! whole-pixel moves stay disabled so the two regimes cannot oscillate.
//! Refinement ends when the offset falls below the convergence threshold or
//! the iteration cap is reached, and the final neighborhood is characterized.

mod fast;
mod interp;

pub(crate) use fast::refine_fast;

use ndarray::{ArrayD, Slice, Zip};

use crate::masks::MaskSet;
use crate::preprocess::ProcessedInt;

/// Largest acceptable offset between window center and center of mass.
const SHIFT_THRESH: f64 = 0.6;
/// Convergence threshold of the refinement loop.
const GOOD_ENOUGH_THRESH: f64 = 0.005;

/// A refined feature, prior to table assembly
///
/// `pos` is in image-axis order with the origin at the center of pixel
/// `(0, …, 0)`. The characterization fields are `None` when characterization
/// is off, and `ecc` additionally requires a 2-D isotropic mask.
#[derive(Debug, Clone)]
pub(crate) struct Refined {
    pub pos: Vec<f64>,
    pub mass: f64,
    pub size: Option<f64>,
    pub ecc: Option<f64>,
    pub signal: Option<f64>,
}

/// The neighborhood of `anchor` restricted to the disk, as floats.
fn masked_neighborhood<P: ProcessedInt>(
    image: &ArrayD<P>,
    masks: &MaskSet,
    radius: &[usize],
    anchor: &[usize],
) -> ArrayD<f64> {
    let window = image.slice_each_axis(|ad| {
        let k = ad.axis.index();
        Slice::from((anchor[k] - radius[k]) as isize..(anchor[k] + radius[k] + 1) as isize)
    });
    let mut out = ArrayD::zeros(masks.binary.raw_dim());
    Zip::from(&mut out)
        .and(&window)
        .and(&masks.binary)
        .for_each(|o, &v, &m| {
            if m {
                *o = v.as_();
            }
        });
    out
}

/// Center of mass of a neighborhood, in window coordinates.
///
/// A zero-mass neighborhood has no defined centroid and reports the window
/// center.
fn center_of_mass(neighborhood: &ArrayD<f64>, radius: &[usize]) -> Vec<f64> {
    let total = neighborhood.sum();
    if total == 0.0 {
        return radius.iter().map(|&r| r as f64).collect();
    }
    let mut acc = vec![0.0; neighborhood.ndim()];
    for (idx, &v) in neighborhood.indexed_iter() {
        for (k, c) in acc.iter_mut().enumerate() {
            *c += v * idx[k] as f64;
        }
    }
    for c in &mut acc {
        *c /= total;
    }
    acc
}

/// Refine a single candidate on the dimension-generic path.
///
/// `raw` is the unprocessed image used for the `signal` field; `image` is
/// the processed image the centroid is computed on.
pub(crate) fn refine_scalar<P: ProcessedInt>(
    raw: &ArrayD<f64>,
    image: &ArrayD<P>,
    masks: &MaskSet,
    radius: &[usize],
    candidate: &[usize],
    max_iterations: usize,
    characterize: bool,
) -> Refined {
    let ndim = radius.len();
    let shape = image.shape().to_vec();

    let mut anchor: Vec<usize> = candidate.to_vec();
    let mut center: Vec<f64> = anchor.iter().map(|&c| c as f64).collect();
    let mut neighborhood = masked_neighborhood(image, masks, radius, &anchor);
    let mut cm = center_of_mass(&neighborhood, radius);
    let mut pos: Vec<f64> = (0..ndim)
        .map(|k| cm[k] - radius[k] as f64 + center[k])
        .collect();
    let mut allow_moves = true;

    for _ in 0..max_iterations {
        let off: Vec<f64> = (0..ndim).map(|k| cm[k] - radius[k] as f64).collect();
        if off.iter().all(|o| o.abs() < GOOD_ENOUGH_THRESH) {
            break;
        }

        if allow_moves && off.iter().any(|o| o.abs() > SHIFT_THRESH) {
            // Walk the window one whole pixel per offending axis, staying
            // inside the image.
            for k in 0..ndim {
                let mut a = anchor[k] as isize;
                if off[k] > SHIFT_THRESH {
                    a += 1;
                } else if off[k] < -SHIFT_THRESH {
                    a -= 1;
                }
                let upper = (shape[k] - radius[k] - 1) as isize;
                anchor[k] = a.clamp(radius[k] as isize, upper) as usize;
                center[k] = anchor[k] as f64;
            }
            neighborhood = masked_neighborhood(image, masks, radius, &anchor);
        } else {
            // Interpolate the neighborhood onto the off-grid center and stop
            // walking for good.
            let back_shift: Vec<f64> = off.iter().map(|o| -o).collect();
            neighborhood = interp::shift_spline2(&neighborhood, &back_shift);
            for k in 0..ndim {
                center[k] += off[k];
            }
            allow_moves = false;
        }

        cm = center_of_mass(&neighborhood, radius);
        for k in 0..ndim {
            pos[k] = cm[k] - radius[k] as f64 + center[k];
        }
    }

    let mass = neighborhood.sum();
    if !characterize {
        return Refined {
            pos,
            mass,
            size: None,
            ecc: None,
            signal: None,
        };
    }

    let second_moment = Zip::from(&neighborhood)
        .and(&masks.r2)
        .fold(0.0, |acc, &v, &r2| acc + r2 * v);
    let size = (second_moment / mass).sqrt();

    let ecc = masks.angular.as_ref().map(|angular| {
        let center_idx: Vec<usize> = radius.to_vec();
        let mut cos_sum = 0.0;
        let mut sin_sum = 0.0;
        for (&v, (&c2, &s2)) in neighborhood
            .iter()
            .zip(angular.cos2t.iter().zip(angular.sin2t.iter()))
        {
            cos_sum += v * c2;
            sin_sum += v * s2;
        }
        (cos_sum * cos_sum + sin_sum * sin_sum).sqrt()
            / (mass - neighborhood[&center_idx[..]] + 1e-6)
    });

    let window = raw.slice_each_axis(|ad| {
        let k = ad.axis.index();
        Slice::from((anchor[k] - radius[k]) as isize..(anchor[k] + radius[k] + 1) as isize)
    });
    let signal = Zip::from(&window)
        .and(&masks.binary)
        .fold(0.0_f64, |acc, &v, &m| if m { acc.max(v) } else { acc });

    Refined {
        pos,
        mass,
        size: Some(size),
        ecc,
        signal: Some(signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn gaussian_image(shape: &[usize], center: &[f64], sigma: f64, max: f64) -> ArrayD<u8> {
        let mut img = ArrayD::from_elem(IxDyn(shape), 1_u8);
        for (idx, v) in img.indexed_iter_mut() {
            let d2: f64 = (0..shape.len())
                .map(|k| (idx[k] as f64 - center[k]).powi(2))
                .sum();
            let g = max * (-d2 / (2.0 * sigma * sigma)).exp();
            *v = (f64::from(*v) + g).min(255.0) as u8;
        }
        img
    }

    #[test]
    fn walk_converges_from_one_pixel_off() {
        let img = gaussian_image(&[21, 23], &[7.0, 13.0], 2.0, 200.0);
        let raw = img.mapv(f64::from);
        let masks = MaskSet::get(&[6, 6]);
        for guess in [[6, 13], [7, 12], [7, 14], [6, 12], [8, 14]] {
            let refined = refine_scalar(&raw, &img, &masks, &[6, 6], &guess, 10, false);
            assert!((refined.pos[0] - 7.0).abs() < 0.1, "guess {guess:?}");
            assert!((refined.pos[1] - 13.0).abs() < 0.1, "guess {guess:?}");
        }
    }

    #[test]
    fn zero_mass_neighborhood_stays_put() {
        let img = ArrayD::<u8>::zeros(IxDyn(&[15, 15]));
        let raw = img.mapv(f64::from);
        let masks = MaskSet::get(&[2, 2]);
        let refined = refine_scalar(&raw, &img, &masks, &[2, 2], &[7, 7], 10, false);
        assert_eq!(refined.pos, vec![7.0, 7.0]);
        assert_eq!(refined.mass, 0.0);
    }

    #[test]
    fn characterization_reports_the_raw_peak() {
        let img = gaussian_image(&[21, 23], &[10.0, 11.0], 1.5, 180.0);
        let raw = img.mapv(f64::from);
        let masks = MaskSet::get(&[4, 4]);
        let refined = refine_scalar(&raw, &img, &masks, &[4, 4], &[10, 11], 10, true);
        assert_eq!(refined.signal, Some(f64::from(img[[10, 11]])));
        assert!(refined.size.unwrap() > 0.0);
        // A circular spot has no anisotropy.
        assert!(refined.ecc.unwrap() < 0.05);
    }
}
