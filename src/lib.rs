//! # spotfind
//!
//! Sub-pixel localization of Gaussian-like bright features in 2-D and N-D
//! grayscale images, after Crocker & Grier's centroid algorithm. The
//! pipeline bandpasses the image, detects integer-grid local maxima above a
//! percentile gate, refines each candidate to sub-pixel precision with a
//! two-regime centroid loop, collapses duplicates, and reports a table of
//! positions with integrated brightness, size, eccentricity, signal, and an
//! estimated positional uncertainty.
//!
//! ```no_run
//! use ndarray::Array2;
//! use spotfind::{locate, LocateConfig};
//!
//! let frame: Array2<u8> = Array2::zeros((512, 512));
//! let table = locate(&frame, &LocateConfig::new(9).with_minmass(250.0))?;
//! for feature in &table {
//!     println!("({:.2}, {:.2}) mass {:.0}", feature.x(), feature.y(), feature.mass);
//! }
//! # Ok::<(), spotfind::LocateError>(())
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod features;
pub mod image_utils;
pub mod masks;
pub mod preprocess;
pub mod uncertainty;

mod dedup;
mod refine;


// Re-export main types for convenience
pub use config::{Engine, Extent, LocateConfig};
pub use error::{LocateError, LocateResult};
pub use features::{Feature, FeatureTable};
pub use masks::MaskSet;
pub use preprocess::{ProcessedInt, Sample};

use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};

use crate::refine::Refined;

/// Locate Gaussian-like bright features of some approximate size in an image.
///
/// The coordinate system has its origin at the center of pixel `(0, 0)`; the
/// first image axis points down (reported as `y`), the second right
/// (reported as `x`). Reported positions are in `x, y[, z]` order.
///
/// Recoverable conditions (an entirely black image, no maxima, no features
/// surviving the filters) log a warning and yield an empty table with the
/// full column schema.
///
/// # Errors
/// Returns [`LocateError`] for an even or too-small diameter, non-positive
/// filter sizes, per-axis parameter lists not matching the image
/// dimensionality, or the optimized engine requested outside its 2-D
/// isotropic domain.
pub fn locate<S, D>(image: &ArrayBase<S, D>, config: &LocateConfig) -> LocateResult<FeatureTable>
where
    S: Data,
    S::Elem: Sample,
    D: Dimension,
{
    locate_inner(image, config, None)
}

/// Like [`locate`], additionally tagging every feature with a frame index
/// and appending the `frame` column.
pub fn locate_frame<S, D>(
    image: &ArrayBase<S, D>,
    config: &LocateConfig,
    frame: usize,
) -> LocateResult<FeatureTable>
where
    S: Data,
    S::Elem: Sample,
    D: Dimension,
{
    locate_inner(image, config, Some(frame))
}

fn locate_inner<S, D>(
    image: &ArrayBase<S, D>,
    config: &LocateConfig,
    frame: Option<usize>,
) -> LocateResult<FeatureTable>
where
    S: Data,
    S::Elem: Sample,
    D: Dimension,
{
    // Squeeze singleton axes so a stack-of-one behaves like a plain image.
    let shape: Vec<usize> = image.shape().iter().copied().filter(|&s| s != 1).collect();
    if shape.is_empty() {
        return Err(LocateError::invalid_parameter(
            "image must have at least one axis longer than 1",
        ));
    }
    let ndim = shape.len();
    let params = config.resolve(ndim)?;

    log::debug!(
        "locating features in a {shape:?} image, radius {:?}",
        params.radius
    );

    if ndim >= 3 && shape.iter().any(|&s| s == 3 || s == 4) {
        log::warn!(
            "interpreting the image as {ndim}-dimensional; if it is actually a \
             {}-dimensional color image, convert it to grayscale first",
            ndim - 1
        );
    }

    // The raw image drives signal and noise measurements; inversion happens
    // before anything reads it.
    let invert = config.preprocess && config.invert;
    let raw_values: Vec<f64> = image
        .iter()
        .map(|&v| if invert { v.invert().to_f64() } else { v.to_f64() })
        .collect();
    let raw = ArrayD::from_shape_vec(IxDyn(&shape), raw_values)
        .map_err(|e| LocateError::invalid_parameter(e.to_string()))?;

    let floor = config
        .threshold
        .unwrap_or(<S::Elem as Sample>::DEFAULT_BANDPASS_FLOOR);
    let bandpassed = if config.preprocess {
        preprocess::bandpass(&raw, &params.noise_size, &params.smoothing_size, floor)?
    } else {
        raw.clone()
    };
    // The detector needs exact integer data; fill the sample type's gamut.
    let processed: ArrayD<<S::Elem as Sample>::Processed> =
        preprocess::scale_to_gamut(&bandpassed);

    let masks = MaskSet::get(&params.radius);
    let empty = || FeatureTable::empty(ndim, params.characterize, frame.is_some());

    let mut candidates =
        detect::local_maxima(&processed, &masks, config.percentile, &params.margin);
    if candidates.is_empty() {
        return Ok(empty());
    }

    // Cheap mass/size gates ahead of the expensive refinement.
    if config.filter_before {
        candidates.retain(|coord| {
            let mass = detect::estimate_mass(&processed, &masks, &params.radius, coord);
            if mass <= config.minmass {
                return false;
            }
            match config.maxsize {
                Some(maxsize) => {
                    detect::estimate_size(&processed, &masks, &params.radius, coord, mass)
                        < maxsize
                }
                None => true,
            }
        });
        if candidates.is_empty() {
            log::warn!("no maxima survived mass- and size-based prefiltering");
            return Ok(empty());
        }
    }

    let mut refined: Vec<Refined> = if params.use_fast_path {
        candidates
            .iter()
            .map(|coord| {
                refine::refine_fast(
                    &raw,
                    &processed,
                    &masks,
                    params.radius[0],
                    (coord[0], coord[1]),
                    config.max_iterations,
                    params.characterize,
                )
            })
            .collect()
    } else {
        candidates
            .iter()
            .map(|coord| {
                refine::refine_scalar(
                    &raw,
                    &processed,
                    &masks,
                    &params.radius,
                    coord,
                    config.max_iterations,
                    params.characterize,
                )
            })
            .collect()
    };

    dedup::remove_duplicates(&mut refined, &params.separation);

    // Filter again on the exact values.
    if config.filter_after {
        refined.retain(|f| {
            f.mass > config.minmass
                && match (config.maxsize, f.size) {
                    (Some(maxsize), Some(size)) => size < maxsize,
                    _ => true,
                }
        });
    }
    if refined.is_empty() {
        log::warn!("no maxima survived mass- and size-based filtering");
        return Ok(empty());
    }

    if let Some(topn) = config.topn {
        if refined.len() > topn {
            keep_brightest(&mut refined, topn);
        }
    }

    let (black_level, noise) = if params.characterize {
        uncertainty::measure_noise(&raw, &params.diameter, floor)
    } else {
        (0.0, 0.0)
    };

    let mut table = empty();
    for f in refined {
        let mut pos = f.pos;
        pos.reverse();
        let ep = params
            .characterize
            .then(|| uncertainty::static_error(f.mass, noise, &masks));
        table.push(Feature {
            pos,
            mass: f.mass,
            size: f.size,
            ecc: f.ecc,
            signal: f.signal.map(|s| s - black_level),
            ep,
            frame,
        });
    }
    Ok(table)
}

/// Keep the `topn` features with the largest mass, ties broken by input
/// order; survivors stay in input order.
fn keep_brightest(refined: &mut Vec<Refined>, topn: usize) {
    let mut selected = vec![false; refined.len()];
    if topn == 1 {
        let mut best = 0;
        for (i, f) in refined.iter().enumerate() {
            if f.mass > refined[best].mass {
                best = i;
            }
        }
        selected[best] = true;
    } else {
        let mut order: Vec<usize> = (0..refined.len()).collect();
        order.sort_by(|&a, &b| refined[b].mass.total_cmp(&refined[a].mass).then(a.cmp(&b)));
        for &i in order.iter().take(topn) {
            selected[i] = true;
        }
    }
    let mut index = 0;
    refined.retain(|_| {
        let keep = selected[index];
        index += 1;
        keep
    });
}
