use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data::model::SpatialSelection;
use crate::error::{Error, Result};

/// Geometry of the aperture sequence used by the variance comparison.
///
/// Defaults describe a 50×50 cube with 0.5-unit pixels, centred at grid
/// index 24.5, and fifteen apertures of radius 0.5, 1.0, … 7.5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparatorConfig {
    /// Spatial pixels per axis expected in the cube.
    pub grid_size: usize,
    /// Spatial units per pixel.
    pub pixel_scale: f64,
    /// Grid index of the aperture centre, in both axes.
    pub center: f64,
    pub n_apertures: usize,
    /// Aperture `k` has radius `radius_step * (k + 1)`.
    pub radius_step: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            grid_size: 50,
            pixel_scale: 0.5,
            center: 24.5,
            n_apertures: 15,
            radius_step: 0.5,
        }
    }
}

impl ComparatorConfig {
    /// Parse and validate a JSON configuration. Missing fields take their
    /// defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.grid_size == 0 {
            return Err(Error::Config("grid_size must be positive".into()));
        }
        if self.n_apertures == 0 {
            return Err(Error::Config("n_apertures must be positive".into()));
        }
        if !(self.pixel_scale.is_finite() && self.pixel_scale > 0.0) {
            return Err(Error::Config(format!(
                "pixel_scale must be positive and finite, got {}",
                self.pixel_scale
            )));
        }
        if !(self.radius_step.is_finite() && self.radius_step > 0.0) {
            return Err(Error::Config(format!(
                "radius_step must be positive and finite, got {}",
                self.radius_step
            )));
        }
        if !self.center.is_finite() {
            return Err(Error::Config("center must be finite".into()));
        }
        Ok(())
    }

    /// Radii of every aperture, smallest first.
    pub fn aperture_radii(&self) -> Vec<f64> {
        (0..self.n_apertures)
            .map(|k| self.radius_step * (k + 1) as f64)
            .collect()
    }

    /// Spaxels whose centre lies strictly inside `radius` of the grid centre.
    pub fn circular_aperture(&self, radius: f64) -> SpatialSelection {
        let offset = |i: usize| self.pixel_scale * (i as f64 - self.center);
        let mask = Array2::from_shape_fn((self.grid_size, self.grid_size), |(i, j)| {
            offset(i).powi(2) + offset(j).powi(2) < radius.powi(2)
        });
        SpatialSelection::from_mask(mask.view())
    }

    /// One circular aperture per radius in [`Self::aperture_radii`].
    pub fn apertures(&self) -> Vec<SpatialSelection> {
        self.aperture_radii()
            .into_iter()
            .map(|r| self.circular_aperture(r))
            .collect()
    }
}
