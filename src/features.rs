//! Result records of the localization pipeline

use serde::{Deserialize, Serialize};

/// A single located feature
///
/// `pos` is in reported column order (`x, y[, z]`, i.e. reversed image-axis
/// order) with the origin at the center of pixel `(0, 0)`. The
/// characterization fields are present iff characterization ran; `ecc`
/// additionally requires a 2-D image with isotropic radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Sub-pixel position in column order `x, y[, z]`
    pub pos: Vec<f64>,
    /// Integrated brightness of the neighborhood
    pub mass: f64,
    /// Radius of gyration of the Gaussian-like profile
    pub size: Option<f64>,
    /// Eccentricity: 0 is circular
    pub ecc: Option<f64>,
    /// Peak raw pixel value within the mask, above the black level
    pub signal: Option<f64>,
    /// Estimated static error of the position
    pub ep: Option<f64>,
    /// Frame index, when the image carries one
    pub frame: Option<usize>,
}

impl Feature {
    /// Position along the reported x axis (the last image axis).
    pub fn x(&self) -> f64 {
        self.pos[0]
    }

    /// Position along the reported y axis.
    pub fn y(&self) -> f64 {
        self.pos[1]
    }
}

/// The per-image result table
///
/// An ordered collection of [`Feature`] with a fixed column schema. The
/// schema reflects the dimensionality and configuration of the call that
/// produced the table, whether or not any feature survived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    features: Vec<Feature>,
}

impl FeatureTable {
    pub(crate) fn empty(ndim: usize, characterize: bool, with_frame: bool) -> Self {
        let mut columns: Vec<String> = if ndim <= 3 {
            ["x", "y", "z"][..ndim].iter().map(|s| s.to_string()).collect()
        } else {
            (0..ndim).map(|i| format!("x{i}")).collect()
        };
        columns.push("mass".to_string());
        if characterize {
            for c in ["size", "ecc", "signal", "ep"] {
                columns.push(c.to_string());
            }
        }
        if with_frame {
            columns.push("frame".to_string());
        }
        FeatureTable {
            columns,
            features: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Column names, in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The located features, in order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate over the features.
    pub fn iter(&self) -> std::slice::Iter<'_, Feature> {
        self.features.iter()
    }
}

impl<'a> IntoIterator for &'a FeatureTable {
    type Item = &'a Feature;
    type IntoIter = std::slice::Iter<'a, Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_follows_dimensionality_and_configuration() {
        let table = FeatureTable::empty(2, true, false);
        assert_eq!(
            table.columns(),
            &["x", "y", "mass", "size", "ecc", "signal", "ep"]
        );

        let table = FeatureTable::empty(3, false, true);
        assert_eq!(table.columns(), &["x", "y", "z", "mass", "frame"]);

        let table = FeatureTable::empty(5, false, false);
        assert_eq!(table.columns()[..2], ["x0".to_string(), "x1".to_string()]);
        assert!(table.is_empty());
    }
}
