//! Configuration for the feature localization pipeline
//!
//! [`LocateConfig`] mirrors the parameters of [`crate::locate`]: the required
//! feature diameter plus the filtering, preprocessing, and refinement knobs.
//! Per-axis parameters accept either a single value (broadcast over all image
//! axes) or one value per axis via [`Extent`].

use serde::{Deserialize, Serialize};

use crate::error::{LocateError, LocateResult};

/// A per-axis quantity; a single value is broadcast over all image axes.
///
/// Axis order matches the image shape, conventionally `(z, y, x)` or `(y, x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extent<T> {
    /// One value for every axis
    Iso(T),
    /// One value per axis, in image-axis order
    PerAxis(Vec<T>),
}

impl<T: Copy> Extent<T> {
    /// Broadcast to a per-axis vector of length `ndim`.
    pub fn resolve(&self, ndim: usize) -> LocateResult<Vec<T>> {
        match self {
            Extent::Iso(v) => Ok(vec![*v; ndim]),
            Extent::PerAxis(v) if v.len() == ndim => Ok(v.clone()),
            Extent::PerAxis(v) => Err(LocateError::invalid_parameter(format!(
                "expected {} per-axis values, got {}",
                ndim,
                v.len()
            ))),
        }
    }
}

impl<T> From<T> for Extent<T> {
    fn from(v: T) -> Self {
        Extent::Iso(v)
    }
}

impl<T> From<Vec<T>> for Extent<T> {
    fn from(v: Vec<T>) -> Self {
        Extent::PerAxis(v)
    }
}

/// Selects the refinement implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Use the optimized path when the image is 2-D with isotropic radius,
    /// the scalar path otherwise
    #[default]
    Auto,
    /// Dimension-generic path with the sub-pixel interpolation regime
    Scalar,
    /// Hand-tuned 2-D isotropic path; whole-pixel walking only
    Optimized,
}

/// Configuration for [`crate::locate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateConfig {
    /// Feature extent in pixels; must be an odd integer of at least 3 per axis
    pub diameter: Extent<usize>,
    /// Minimum integrated brightness. A crucial parameter for eliminating
    /// spurious features; a good value is often much higher than the default.
    pub minmass: f64,
    /// Maximum radius of gyration of brightness
    pub maxsize: Option<f64>,
    /// Minimum separation between features; defaults to `diameter + 1`
    pub separation: Option<Extent<f64>>,
    /// Width of the Gaussian blurring kernel of the bandpass
    pub noise_size: Extent<f64>,
    /// Width of the boxcar smoothing of the bandpass; defaults to `diameter`
    pub smoothing_size: Option<Extent<usize>>,
    /// Floor applied to the bandpass result; defaults to 1 for integer
    /// samples and 1/255 for floating samples
    pub threshold: Option<f64>,
    /// Set when features are darker than the background
    pub invert: bool,
    /// Features must have a peak brighter than pixels in this percentile
    pub percentile: f64,
    /// Keep only the N brightest features above `minmass`
    pub topn: Option<usize>,
    /// Enable bandpass preprocessing
    pub preprocess: bool,
    /// Iteration cap of the centroid refinement loop
    pub max_iterations: usize,
    /// Filter candidates on estimated mass/size before refinement
    pub filter_before: bool,
    /// Filter features on refined mass/size after refinement
    pub filter_after: bool,
    /// Compute size, eccentricity, signal, and positional uncertainty
    pub characterize: bool,
    /// Refinement implementation
    pub engine: Engine,
}

impl LocateConfig {
    /// Configuration with the given feature diameter and default settings
    /// for everything else.
    pub fn new(diameter: impl Into<Extent<usize>>) -> Self {
        Self {
            diameter: diameter.into(),
            minmass: 100.0,
            maxsize: None,
            separation: None,
            noise_size: Extent::Iso(1.0),
            smoothing_size: None,
            threshold: None,
            invert: false,
            percentile: 64.0,
            topn: None,
            preprocess: true,
            max_iterations: 10,
            filter_before: true,
            filter_after: true,
            characterize: true,
            engine: Engine::Auto,
        }
    }

    /// Set the minimum integrated brightness.
    pub fn with_minmass(mut self, minmass: f64) -> Self {
        self.minmass = minmass;
        self
    }

    /// Set the maximum radius of gyration.
    pub fn with_maxsize(mut self, maxsize: f64) -> Self {
        self.maxsize = Some(maxsize);
        self
    }

    /// Set the minimum feature separation.
    pub fn with_separation(mut self, separation: impl Into<Extent<f64>>) -> Self {
        self.separation = Some(separation.into());
        self
    }

    /// Keep only the N brightest features.
    pub fn with_topn(mut self, topn: usize) -> Self {
        self.topn = Some(topn);
        self
    }

    /// Enable or disable bandpass preprocessing.
    pub fn with_preprocess(mut self, preprocess: bool) -> Self {
        self.preprocess = preprocess;
        self
    }

    /// Enable or disable characterization.
    pub fn with_characterize(mut self, characterize: bool) -> Self {
        self.characterize = characterize;
        self
    }

    /// Select the refinement engine.
    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    /// Validate against an image dimensionality and resolve all per-axis
    /// defaults.
    pub(crate) fn resolve(&self, ndim: usize) -> LocateResult<ResolvedParams> {
        let diameter = self.diameter.resolve(ndim)?;
        for &d in &diameter {
            if d % 2 == 0 || d < 3 {
                return Err(LocateError::invalid_parameter(format!(
                    "feature diameter must be an odd integer of at least 3, got {d}; round up"
                )));
            }
        }
        let radius: Vec<usize> = diameter.iter().map(|&d| d / 2).collect();

        let separation = match &self.separation {
            Some(s) => s.resolve(ndim)?,
            None => diameter.iter().map(|&d| (d + 1) as f64).collect(),
        };
        if separation.iter().any(|&s| s < 0.0) {
            return Err(LocateError::invalid_parameter(
                "separation must not be negative",
            ));
        }

        let smoothing_size = match &self.smoothing_size {
            Some(s) => s.resolve(ndim)?,
            None => diameter.clone(),
        };
        if smoothing_size.iter().any(|&s| s == 0) {
            return Err(LocateError::invalid_parameter(
                "smoothing size must be positive",
            ));
        }

        let noise_size = self.noise_size.resolve(ndim)?;
        if noise_size.iter().any(|&s| s <= 0.0) {
            return Err(LocateError::invalid_parameter("noise size must be positive"));
        }

        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(LocateError::invalid_parameter(format!(
                "percentile must lie in [0, 100], got {}",
                self.percentile
            )));
        }

        // Zone of exclusion at the image edges, wide enough for complete
        // neighborhoods, sub-pixel exploration, and valid bandpass output.
        let margin: Vec<usize> = radius
            .iter()
            .zip(&separation)
            .zip(&smoothing_size)
            .map(|((&rad, &sep), &sm)| {
                let sep_term = (sep / 2.0).floor() as i64 - 1;
                (rad as i64).max(sep_term).max((sm / 2) as i64).max(0) as usize
            })
            .collect();

        let isotropic = diameter.windows(2).all(|w| w[0] == w[1]);
        let use_fast_path = match self.engine {
            Engine::Auto => ndim == 2 && isotropic,
            Engine::Scalar => false,
            Engine::Optimized => {
                if ndim != 2 {
                    return Err(LocateError::unsupported_engine(
                        "optimized",
                        format!("{ndim}-dimensional images; it is 2-D only"),
                    ));
                }
                if !isotropic {
                    return Err(LocateError::unsupported_engine(
                        "optimized",
                        "anisotropic feature finding",
                    ));
                }
                true
            }
        };

        Ok(ResolvedParams {
            diameter,
            radius,
            separation,
            smoothing_size,
            noise_size,
            margin,
            // Rectangular pixels make size and eccentricity ill-defined.
            characterize: self.characterize && isotropic,
            use_fast_path,
        })
    }
}

/// Per-axis parameters after validation and default resolution
#[derive(Debug, Clone)]
pub(crate) struct ResolvedParams {
    pub diameter: Vec<usize>,
    pub radius: Vec<usize>,
    pub separation: Vec<f64>,
    pub smoothing_size: Vec<usize>,
    pub noise_size: Vec<f64>,
    pub margin: Vec<usize>,
    pub characterize: bool,
    pub use_fast_path: bool,
}
