/// Covariance layer: compressed → normalised → absolute.
///
/// ```text
///  COVAR block + COVARLOC_n cards
///        │
///        ▼
///   ┌─────────────┐
///   │ reconstruct  │  per-cell linear interpolation in wavelength
///   └─────────────┘
///        │  normalised [n_wave, 5, 5, n_x, n_y]
///        ▼
///   ┌─────────────┐
///   │    scale     │  × variance × weight² of the base pixel
///   └─────────────┘
///        │  absolute [n_wave, 5, 5, n_x, n_y]
///        ▼
///    binning
/// ```

pub mod reconstruct;
pub mod scale;

use ndarray::Array5;

use crate::data::model::{CompressedCovariance, IfuCubes};
use crate::data::source::{load_compressed_covariance, load_cubes, DataSource};
use crate::error::Result;

pub use reconstruct::{read_norm_covariance, reconstruct};
pub use scale::absolute_covariance;

/// Absolute covariance for already-loaded cubes.
pub fn absolute_from_parts(
    cubes: &IfuCubes,
    compressed: &CompressedCovariance,
) -> Result<Array5<f64>> {
    let norm = reconstruct(compressed);
    absolute_covariance(norm.view(), cubes.variance(), cubes.weight())
}

/// Reconstruct and scale the covariance stored in `source`.
pub fn full_covariance<S: DataSource + ?Sized>(source: &S) -> Result<Array5<f64>> {
    let cubes = load_cubes(source)?;
    let compressed = load_compressed_covariance(source)?;
    absolute_from_parts(&cubes, &compressed)
}
