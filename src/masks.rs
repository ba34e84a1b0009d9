//! Masks for circular neighborhoods
//!
//! Every stage of the pipeline reduces over an ellipsoidal disk of the
//! feature radius: the detector uses it as a dilation footprint, the refiner
//! as the neighborhood weighting, and characterization as the domain of the
//! radius-of-gyration and angular moments. The masks are pure functions of
//! the radius vector and are memoized process-wide.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ndarray::{Array2, ArrayD, IxDyn};
use once_cell::sync::Lazy;

static MASK_CACHE: Lazy<Mutex<HashMap<Vec<usize>, Arc<MaskSet>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// `cos(2θ)` and `sin(2θ)` moments over the disk, for 2-D eccentricity
#[derive(Debug, Clone)]
pub struct AngularMasks {
    pub cos2t: Array2<f64>,
    pub sin2t: Array2<f64>,
}

/// The mask set for one feature radius
///
/// All arrays share the shape `(2·r₀+1, …, 2·r_{d−1}+1)`. `binary` is the
/// ellipsoidal disk, `r2` the squared distance from the center restricted to
/// the disk, and `angular` the 2θ moments, present only for a 2-D isotropic
/// radius. The center pixel satisfies `binary = true`, `r2 = 0`, and
/// `cos2t = sin2t = 0`.
#[derive(Debug, Clone)]
pub struct MaskSet {
    pub binary: ArrayD<bool>,
    pub r2: ArrayD<f64>,
    pub angular: Option<AngularMasks>,
}

impl MaskSet {
    /// The cached mask set for a radius vector.
    pub fn get(radius: &[usize]) -> Arc<MaskSet> {
        let mut cache = MASK_CACHE.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(masks) = cache.get(radius) {
            return Arc::clone(masks);
        }
        let masks = Arc::new(MaskSet::build(radius));
        cache.insert(radius.to_vec(), Arc::clone(&masks));
        masks
    }

    fn build(radius: &[usize]) -> MaskSet {
        let shape: Vec<usize> = radius.iter().map(|&r| 2 * r + 1).collect();
        let ndim = radius.len();

        let binary = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
            (0..ndim)
                .map(|k| {
                    let d = idx[k] as f64 - radius[k] as f64;
                    (d / radius[k] as f64).powi(2)
                })
                .sum::<f64>()
                <= 1.0
        });

        let r2 = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
            if binary[&idx] {
                (0..ndim)
                    .map(|k| (idx[k] as f64 - radius[k] as f64).powi(2))
                    .sum()
            } else {
                0.0
            }
        });

        let angular = (ndim == 2 && radius[0] == radius[1]).then(|| {
            let r = radius[0];
            let side = 2 * r + 1;
            let mut cos2t = Array2::zeros((side, side));
            let mut sin2t = Array2::zeros((side, side));
            for i in 0..side {
                for j in 0..side {
                    if !binary[[i, j]] {
                        continue;
                    }
                    let theta = (j as f64 - r as f64).atan2(i as f64 - r as f64);
                    cos2t[[i, j]] = (2.0 * theta).cos();
                    sin2t[[i, j]] = (2.0 * theta).sin();
                }
            }
            // The center pixel has no defined angle; it must not contribute
            // to the anisotropy moments.
            cos2t[[r, r]] = 0.0;
            sin2t[[r, r]] = 0.0;
            AngularMasks { cos2t, sin2t }
        });

        MaskSet {
            binary,
            r2,
            angular,
        }
    }

    /// Number of pixels inside the disk.
    pub fn disk_area(&self) -> usize {
        self.binary.iter().filter(|&&m| m).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pixel_invariants() {
        let masks = MaskSet::get(&[2, 2]);
        assert!(masks.binary[[2, 2]]);
        assert_eq!(masks.r2[[2, 2]], 0.0);
        let angular = masks.angular.as_ref().unwrap();
        assert_eq!(angular.cos2t[[2, 2]], 0.0);
        assert_eq!(angular.sin2t[[2, 2]], 0.0);
    }

    #[test]
    fn disk_shape_and_extent() {
        let masks = MaskSet::get(&[3, 2]);
        assert_eq!(masks.binary.shape(), &[7, 5]);
        assert!(masks.disk_area() > 0);
        // Axis extremes lie on the ellipse boundary and are included.
        assert!(masks.binary[[0, 2]]);
        assert!(masks.binary[[3, 0]]);
        // Corners lie outside.
        assert!(!masks.binary[[0, 0]]);
        assert_eq!(masks.r2[[0, 0]], 0.0);
        // Anisotropic radius has no angular masks.
        assert!(masks.angular.is_none());
    }

    #[test]
    fn three_dimensional_disk() {
        let masks = MaskSet::get(&[2, 2, 2]);
        assert_eq!(masks.binary.shape(), &[5, 5, 5]);
        assert!(masks.binary[[2, 2, 2]]);
        assert!(!masks.binary[[0, 0, 0]]);
        assert!(masks.angular.is_none());
    }

    #[test]
    fn cache_returns_shared_instances() {
        let a = MaskSet::get(&[4, 4]);
        let b = MaskSet::get(&[4, 4]);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
