//! Hand-tuned 2-D isotropic refinement path
//!
//! Flat scalar loops over the square window, no intermediate neighborhood
//! allocation, and no interpolation regime: detection hands over guesses
//! within one pixel of the true center, so whole-pixel walking alone brings
//! the offset inside the convergence threshold. That threshold is 0.01 here,
//! coarser than the scalar path's 0.005, and the omitted interpolation step
//! means results can differ from the scalar path at the second decimal.

use ndarray::ArrayD;

use crate::masks::MaskSet;
use crate::preprocess::ProcessedInt;
use crate::refine::{Refined, SHIFT_THRESH};

/// Convergence threshold of the fast loop.
const GOOD_ENOUGH_THRESH: f64 = 0.01;

/// Refine a single candidate on the optimized 2-D path.
///
/// Requires a 2-D image and an isotropic mask; the orchestrator guarantees
/// both before dispatching here.
pub(crate) fn refine_fast<P: ProcessedInt>(
    raw: &ArrayD<f64>,
    image: &ArrayD<P>,
    masks: &MaskSet,
    radius: usize,
    candidate: (usize, usize),
    max_iterations: usize,
    characterize: bool,
) -> Refined {
    let side = 2 * radius + 1;
    let shape = (image.shape()[0], image.shape()[1]);
    let rad = radius as f64;

    let mut anchor = (candidate.0 as isize, candidate.1 as isize);
    let mut corner = (anchor.0 - radius as isize, anchor.1 - radius as isize);

    // Masked center of mass over the window at `corner`.
    let window_com = |corner: (isize, isize)| -> (f64, f64, f64) {
        let mut mass = 0.0;
        let mut cm = (0.0, 0.0);
        for i in 0..side {
            for j in 0..side {
                if !masks.binary[[i, j]] {
                    continue;
                }
                let px: f64 = image[[
                    (corner.0 + i as isize) as usize,
                    (corner.1 + j as isize) as usize,
                ]]
                .as_();
                cm.0 += px * i as f64;
                cm.1 += px * j as f64;
                mass += px;
            }
        }
        if mass == 0.0 {
            (rad, rad, 0.0)
        } else {
            (cm.0 / mass, cm.1 / mass, mass)
        }
    };

    let (mut cm_i, mut cm_j, _) = window_com(corner);
    for _ in 0..max_iterations {
        let off = (cm_i - rad, cm_j - rad);
        if off.0.abs() < GOOD_ENOUGH_THRESH && off.1.abs() < GOOD_ENOUGH_THRESH {
            break;
        }
        if off.0.abs() <= SHIFT_THRESH && off.1.abs() <= SHIFT_THRESH {
            // Sub-pixel regime; this path does not interpolate.
            break;
        }

        let mut a0 = anchor.0;
        let mut a1 = anchor.1;
        if off.0 > SHIFT_THRESH {
            a0 += 1;
        } else if off.0 < -SHIFT_THRESH {
            a0 -= 1;
        }
        if off.1 > SHIFT_THRESH {
            a1 += 1;
        } else if off.1 < -SHIFT_THRESH {
            a1 -= 1;
        }
        anchor.0 = a0.clamp(radius as isize, (shape.0 - radius - 1) as isize);
        anchor.1 = a1.clamp(radius as isize, (shape.1 - radius - 1) as isize);
        corner = (anchor.0 - radius as isize, anchor.1 - radius as isize);
        let (i, j, _) = window_com(corner);
        cm_i = i;
        cm_j = j;
    }

    let pos = vec![
        cm_i - rad + anchor.0 as f64,
        cm_j - rad + anchor.1 as f64,
    ];

    // Characterize the window at the final anchor.
    let mut mass = 0.0;
    let mut second_moment = 0.0;
    let mut cos_sum = 0.0;
    let mut sin_sum = 0.0;
    let mut signal = 0.0_f64;
    let angular = masks.angular.as_ref();
    for i in 0..side {
        for j in 0..side {
            if !masks.binary[[i, j]] {
                continue;
            }
            let y = (corner.0 + i as isize) as usize;
            let x = (corner.1 + j as isize) as usize;
            let px: f64 = image[[y, x]].as_();
            mass += px;
            if !characterize {
                continue;
            }
            second_moment += masks.r2[[i, j]] * px;
            if let Some(angular) = angular {
                cos_sum += angular.cos2t[[i, j]] * px;
                sin_sum += angular.sin2t[[i, j]] * px;
            }
            // The brightest unprocessed pixel inside the disk.
            signal = signal.max(raw[[y, x]]);
        }
    }

    if !characterize {
        return Refined {
            pos,
            mass,
            size: None,
            ecc: None,
            signal: None,
        };
    }

    let center_px: f64 = image[[anchor.0 as usize, anchor.1 as usize]].as_();
    let ecc = (cos_sum * cos_sum + sin_sum * sin_sum).sqrt() / (mass - center_px + 1e-6);
    Refined {
        pos,
        mass,
        size: Some((second_moment / mass).sqrt()),
        ecc: Some(ecc),
        signal: Some(signal),
    }
}
