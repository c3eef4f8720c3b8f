//! Naive vs covariance-aware variance over growing circular apertures.
//!
//! The naive estimate treats every spaxel as independent; the correct one
//! runs the full covariance pipeline. On real cubes the gap between the two
//! grows with aperture size.

use ndarray::{Array1, ArrayView3, ArrayView5};
use serde::Serialize;

use crate::binning::SpectralBinner;
use crate::config::ComparatorConfig;
use crate::covariance::absolute_from_parts;
use crate::data::model::{IfuCubes, SpatialSelection};
use crate::data::source::{load_compressed_covariance, load_cubes, DataSource};
use crate::error::{Error, Result};
use crate::stats::{median, nan_sum};

/// Median variance per aperture, with and without covariance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarianceComparison {
    pub radii: Vec<f64>,
    /// Covariance-aware estimate.
    pub correct: Vec<f64>,
    /// Independent-spaxel estimate.
    pub naive: Vec<f64>,
}

impl VarianceComparison {
    /// `correct / naive` per aperture.
    pub fn ratio(&self) -> Vec<f64> {
        self.correct
            .iter()
            .zip(&self.naive)
            .map(|(c, n)| c / n)
            .collect()
    }
}

/// Variance of a selection assuming independent spaxels:
/// `Σ V·W² / (Σ W)²` per wavelength, NaN entries skipped.
pub fn naive_variance(
    variance: ArrayView3<'_, f64>,
    weight: ArrayView3<'_, f64>,
    selection: &SpatialSelection,
) -> Result<Array1<f64>> {
    if weight.shape() != variance.shape() {
        return Err(Error::shape("weight cube", variance.shape(), weight.shape()));
    }
    let (n_wave, n_x, n_y) = variance.dim();
    if !selection.fits_within(n_x, n_y) {
        let (max_x, max_y) = selection.extent();
        return Err(Error::shape("selection extent", &[n_x, n_y], &[max_x, max_y]));
    }

    Ok((0..n_wave)
        .map(|w| {
            let coords = selection.coords().iter();
            let var_sum = nan_sum(
                coords
                    .clone()
                    .map(|&(x, y)| variance[[w, x, y]] * weight[[w, x, y]].powi(2)),
            );
            let weight_sum = nan_sum(coords.map(|&(x, y)| weight[[w, x, y]]));
            var_sum / weight_sum.powi(2)
        })
        .collect())
}

/// Compare both estimates for cubes whose absolute covariance is known.
pub fn compare_cubes<'a>(
    cubes: &'a IfuCubes,
    covar: ArrayView5<'a, f64>,
    config: &ComparatorConfig,
) -> Result<VarianceComparison> {
    config.validate()?;
    let (n_x, n_y) = cubes.spatial_dims();
    if (n_x, n_y) != (config.grid_size, config.grid_size) {
        return Err(Error::shape(
            "aperture grid",
            &[config.grid_size, config.grid_size],
            &[n_x, n_y],
        ));
    }

    let radii = config.aperture_radii();
    let apertures = config.apertures();
    let binner = SpectralBinner::new(cubes.data(), covar, cubes.weight())?;

    let correct = binner
        .bin_many(&apertures)?
        .iter()
        .map(|binned| median(&binned.variance.to_vec()))
        .collect::<Vec<_>>();
    let naive = apertures
        .iter()
        .map(|sel| {
            let naive = naive_variance(cubes.variance(), cubes.weight(), sel)?;
            Ok(median(&naive.to_vec()))
        })
        .collect::<Result<Vec<_>>>()?;

    for ((r, c), n) in radii.iter().zip(&correct).zip(&naive) {
        log::debug!("aperture r={r}: correct={c:e} naive={n:e}");
    }
    Ok(VarianceComparison {
        radii,
        correct,
        naive,
    })
}

/// Load one cube set and compare both variance estimates across apertures.
pub fn compare_variance<S: DataSource + ?Sized>(
    source: &S,
    config: &ComparatorConfig,
) -> Result<VarianceComparison> {
    let cubes = load_cubes(source)?;
    let compressed = load_compressed_covariance(source)?;
    let covar = absolute_from_parts(&cubes, &compressed)?;
    compare_cubes(&cubes, covar.view(), config)
}

/// [`compare_variance`] for each source of each pair, e.g. the two arms of
/// one observation.
pub fn compare_variance_list<S: DataSource>(
    pairs: &[(S, S)],
    config: &ComparatorConfig,
) -> Result<Vec<(VarianceComparison, VarianceComparison)>> {
    pairs
        .iter()
        .enumerate()
        .map(|(i, (first, second))| {
            log::info!("comparing variance for pair {} of {}", i + 1, pairs.len());
            Ok((
                compare_variance(first, config)?,
                compare_variance(second, config)?,
            ))
        })
        .collect()
}
