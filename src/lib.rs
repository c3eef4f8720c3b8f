//! Covariance-aware binning of integral-field spectrograph cubes.
//!
//! Neighbouring spaxels of a resampled IFU cube are correlated, so summing
//! their variances underestimates the variance of a binned spectrum. This
//! crate rebuilds the per-wavelength covariance stored in compressed form,
//! scales it to absolute units, and propagates it through spatial bins.
//!
//! ```
//! use ifu_covar::{bin_source, data::synthetic::SyntheticCube, SpatialSelection};
//!
//! let source = SyntheticCube::new(6, 6, 8).build();
//! let selection = SpatialSelection::from_coords([(2, 2), (2, 3), (3, 2), (3, 3)]);
//! let binned = bin_source(&source, &selection).unwrap();
//! assert_eq!(binned.variance.len(), 8);
//! ```

pub mod binning;
pub mod compare;
pub mod config;
pub mod covariance;
pub mod data;
pub mod error;
pub mod stats;

pub use binning::{bin_source, bin_source_multi, SpectralBinner};
pub use compare::{compare_variance, compare_variance_list, naive_variance, VarianceComparison};
pub use config::ComparatorConfig;
pub use covariance::{absolute_covariance, full_covariance, read_norm_covariance, reconstruct};
pub use data::model::{BinnedSpectrum, CompressedCovariance, HeaderValue, IfuCubes, SpatialSelection};
pub use data::source::{DataSource, MemorySource};
pub use error::{Error, Result};
