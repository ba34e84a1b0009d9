//! Duplicate suppression for refined features
//!
//! Flat peaks hand several nearby maxima to the refiner, which then converge
//! onto almost the same position. Features closer than the separation vector
//! are collapsed pairwise, keeping the brighter one. All decisions derive
//! from feature attributes, never from traversal order, so the surviving set
//! does not depend on how candidates were enumerated.

use kiddo::{KdTree, SquaredEuclidean};

use crate::refine::Refined;

/// Drop the dimmer of every feature pair closer than `separation`.
///
/// Positions are rescaled by the per-axis separation so that duplicates are
/// exactly the pairs at scaled distance below one. Each pass drops one
/// member per close pair; passes repeat on the survivors until no close
/// pair remains. A tie on mass drops the feature with the smaller
/// coordinate sum, and identical positions fall back to input order.
pub(crate) fn remove_duplicates(features: &mut Vec<Refined>, separation: &[f64]) {
    if features.is_empty() || separation.iter().any(|&s| s <= 0.0) {
        return;
    }

    loop {
        let scaled: Vec<Vec<f64>> = features
            .iter()
            .map(|f| {
                f.pos
                    .iter()
                    .zip(separation)
                    .map(|(&p, &s)| p / s)
                    .collect()
            })
            .collect();
        let pairs = close_pairs(&scaled);
        if pairs.is_empty() {
            break;
        }

        let mut drop = vec![false; features.len()];
        for (i, j) in pairs {
            let a = &features[i];
            let b = &features[j];
            let dimmer = if a.mass < b.mass {
                i
            } else if b.mass < a.mass {
                j
            } else {
                let sum_a: f64 = a.pos.iter().sum();
                let sum_b: f64 = b.pos.iter().sum();
                if sum_a <= sum_b {
                    i
                } else {
                    j
                }
            };
            drop[dimmer] = true;
        }

        let mut index = 0;
        features.retain(|_| {
            let keep = !drop[index];
            index += 1;
            keep
        });
    }
}

/// All index pairs `(i, j)`, `i < j`, at Euclidean distance strictly below
/// one.
fn close_pairs(positions: &[Vec<f64>]) -> Vec<(usize, usize)> {
    match positions[0].len() {
        1 => kd_pairs::<1>(positions),
        2 => kd_pairs::<2>(positions),
        3 => kd_pairs::<3>(positions),
        4 => kd_pairs::<4>(positions),
        _ => brute_pairs(positions),
    }
}

fn kd_pairs<const K: usize>(positions: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let mut tree: KdTree<f64, K> = KdTree::new();
    let points: Vec<[f64; K]> = positions
        .iter()
        .map(|p| {
            let mut point = [0.0; K];
            point.copy_from_slice(p);
            point
        })
        .collect();
    for (i, point) in points.iter().enumerate() {
        tree.add(point, i as u64);
    }

    let mut pairs = Vec::new();
    for (i, point) in points.iter().enumerate() {
        for neighbor in tree.within_unsorted::<SquaredEuclidean>(point, 1.0) {
            let j = neighbor.item as usize;
            if j > i && neighbor.distance < 1.0 {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Quadratic fallback for dimensionalities beyond the monomorphized trees.
fn brute_pairs(positions: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..positions.len() {
        for j in i + 1..positions.len() {
            let d2: f64 = positions[i]
                .iter()
                .zip(&positions[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if d2 < 1.0 {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(pos: &[f64], mass: f64) -> Refined {
        Refined {
            pos: pos.to_vec(),
            mass,
            size: None,
            ecc: None,
            signal: None,
        }
    }

    #[test]
    fn dimmer_neighbor_is_dropped() {
        let mut features = vec![
            feature(&[10.0, 10.0], 500.0),
            feature(&[12.0, 10.0], 400.0),
            feature(&[40.0, 40.0], 300.0),
        ];
        remove_duplicates(&mut features, &[6.0, 6.0]);
        let masses: Vec<f64> = features.iter().map(|f| f.mass).collect();
        assert_eq!(masses, vec![500.0, 300.0]);
    }

    #[test]
    fn tie_drops_the_smaller_coordinate_sum() {
        for flipped in [false, true] {
            let mut features = vec![
                feature(&[10.0, 10.0], 500.0),
                feature(&[10.0, 14.0], 500.0),
            ];
            if flipped {
                features.reverse();
            }
            remove_duplicates(&mut features, &[6.0, 6.0]);
            assert_eq!(features.len(), 1);
            assert_eq!(features[0].pos, vec![10.0, 14.0]);
        }
    }

    #[test]
    fn separated_features_survive() {
        let mut features = vec![
            feature(&[10.0, 10.0], 500.0),
            feature(&[10.0, 16.0], 400.0),
        ];
        // Scaled distance exactly one is not a duplicate.
        remove_duplicates(&mut features, &[6.0, 6.0]);
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn chains_collapse_to_the_brightest() {
        let mut features = vec![
            feature(&[10.0, 10.0], 300.0),
            feature(&[10.0, 13.0], 400.0),
            feature(&[10.0, 16.0], 500.0),
        ];
        remove_duplicates(&mut features, &[6.0, 6.0]);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].mass, 500.0);
    }

    #[test]
    fn zero_separation_disables_deduplication() {
        let mut features = vec![
            feature(&[10.0, 10.0], 500.0),
            feature(&[10.0, 10.5], 400.0),
        ];
        remove_duplicates(&mut features, &[0.0, 0.0]);
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn five_dimensional_positions_use_the_fallback() {
        let mut features = vec![
            feature(&[1.0, 1.0, 1.0, 1.0, 1.0], 100.0),
            feature(&[1.1, 1.0, 1.0, 1.0, 1.0], 200.0),
        ];
        remove_duplicates(&mut features, &[2.0; 5]);
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].mass, 200.0);
    }
}
