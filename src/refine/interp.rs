//! Sub-pixel shift of a neighborhood by quadratic B-spline interpolation
//!
//! The shift runs in two passes: a recursive prefilter per axis turns the
//! samples into B-spline coefficients, then every output pixel is evaluated
//! from the 3-tap tensor-product kernel at its shifted source position.
//! Source positions outside the array read as zero.

use ndarray::{ArrayD, Axis, Zip};

/// Pole of the quadratic B-spline prefilter.
const POLE: f64 = -0.171_572_875_253_809_9; // sqrt(8) - 3

/// In-place recursive prefilter along one axis (constant-zero boundary,
/// matching the zero fill of the sampling pass).
fn prefilter_axis(coeffs: &mut ArrayD<f64>, axis: Axis) {
    let gain = (1.0 - POLE) * (1.0 - 1.0 / POLE);
    Zip::from(coeffs.lanes_mut(axis)).for_each(|mut lane| {
        let n = lane.len();
        if n < 2 {
            return;
        }
        for v in lane.iter_mut() {
            *v *= gain;
        }
        // Causal sweep; the zero extension contributes nothing to the first
        // coefficient.
        for k in 1..n {
            lane[k] = lane[k] + POLE * lane[k - 1];
        }
        // Anti-causal init sums the geometric tail of the causal output over
        // the zero-extended region, then the sweep runs back.
        lane[n - 1] *= POLE / (POLE * POLE - 1.0);
        for k in (0..n - 1).rev() {
            lane[k] = POLE * (lane[k + 1] - lane[k]);
        }
    });
}

/// Per-position sampling plan along one axis: nearest coefficient index and
/// the three quadratic kernel weights around it.
fn axis_taps(len: usize, shift: f64) -> Vec<(isize, [f64; 3])> {
    (0..len)
        .map(|i| {
            let x = i as f64 - shift;
            let base = (x + 0.5).floor() as isize;
            let t = x - base as f64; // in [-0.5, 0.5]
            let w = [
                0.5 * (0.5 - t) * (0.5 - t),
                0.75 - t * t,
                0.5 * (0.5 + t) * (0.5 + t),
            ];
            (base, w)
        })
        .collect()
}

/// The array translated by `shift` (output pixel `i` reads from `i − shift`),
/// interpolated with an order-2 spline and zero fill outside the array.
pub(crate) fn shift_spline2(input: &ArrayD<f64>, shift: &[f64]) -> ArrayD<f64> {
    let ndim = input.ndim();
    let shape = input.shape().to_vec();

    let mut coeffs = input.clone();
    for axis in 0..ndim {
        prefilter_axis(&mut coeffs, Axis(axis));
    }

    let taps: Vec<Vec<(isize, [f64; 3])>> = (0..ndim)
        .map(|k| axis_taps(shape[k], shift[k]))
        .collect();

    let combos = 3_usize.pow(ndim as u32);
    let mut out = ArrayD::zeros(input.raw_dim());
    let mut src = vec![0_usize; ndim];
    for (idx, o) in out.indexed_iter_mut() {
        let mut acc = 0.0;
        'combo: for c in 0..combos {
            let mut weight = 1.0;
            let mut digits = c;
            for k in 0..ndim {
                let (base, w) = taps[k][idx[k]];
                let tap = digits % 3;
                digits /= 3;
                let j = base + tap as isize - 1;
                if j < 0 || j as usize >= shape[k] {
                    continue 'combo;
                }
                weight *= w[tap];
                src[k] = j as usize;
            }
            acc += weight * coeffs[&src[..]];
        }
        *o = acc;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn centroid(a: &ArrayD<f64>) -> Vec<f64> {
        let total = a.sum();
        let mut acc = vec![0.0; a.ndim()];
        for (idx, &v) in a.indexed_iter() {
            for (k, c) in acc.iter_mut().enumerate() {
                *c += v * idx[k] as f64;
            }
        }
        acc.iter().map(|c| c / total).collect()
    }

    #[test]
    fn integer_shift_moves_the_peak() {
        let mut a = ArrayD::zeros(IxDyn(&[9, 9]));
        a[[4, 4]] = 1.0;
        let shifted = shift_spline2(&a, &[1.0, 0.0]);
        let peak = shifted
            .indexed_iter()
            .max_by(|x, y| x.1.total_cmp(y.1))
            .map(|(idx, _)| vec![idx[0], idx[1]])
            .unwrap();
        assert_eq!(peak, vec![5, 4]);
    }

    #[test]
    fn fractional_shift_moves_the_centroid() {
        // A broad bump keeps the interpolation error away from the edges.
        let mut a = ArrayD::zeros(IxDyn(&[15, 15]));
        for i in 0..15_usize {
            for j in 0..15_usize {
                let dy = i as f64 - 7.0;
                let dx = j as f64 - 7.0;
                a[[i, j]] = (-(dy * dy + dx * dx) / 8.0).exp();
            }
        }
        let before = centroid(&a);
        let shifted = shift_spline2(&a, &[0.3, -0.2]);
        let after = centroid(&shifted);
        assert!((after[0] - before[0] - 0.3).abs() < 0.02);
        assert!((after[1] - before[1] + 0.2).abs() < 0.02);
    }

    #[test]
    fn zero_shift_reproduces_the_interior() {
        let mut a = ArrayD::zeros(IxDyn(&[7, 7]));
        a[[3, 3]] = 2.0;
        a[[2, 4]] = 1.0;
        let shifted = shift_spline2(&a, &[0.0, 0.0]);
        // Zero fill costs a little accuracy in the outermost ring.
        for i in 1..6_usize {
            for j in 1..6_usize {
                assert!((a[[i, j]] - shifted[[i, j]]).abs() < 1e-4);
            }
        }
    }
}
