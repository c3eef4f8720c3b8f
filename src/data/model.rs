use std::collections::BTreeSet;
use std::fmt;

use ndarray::{Array1, Array3, Array5, ArrayView2, ArrayView3, ArrayView5};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Block names and the covariance window
// ---------------------------------------------------------------------------

/// Flux cube block.
pub const PRIMARY: &str = "PRIMARY";
/// Per-pixel variance cube block.
pub const VARIANCE: &str = "VARIANCE";
/// Per-pixel combination weight cube block.
pub const WEIGHT: &str = "WEIGHT";
/// Compressed normalised covariance block.
pub const COVAR: &str = "COVAR";

/// Side length of the covariance window (offsets −2..=+2 in each axis).
pub const WINDOW: usize = 5;
/// Largest spatial offset with non-zero covariance.
pub const HALF_WINDOW: usize = 2;

// ---------------------------------------------------------------------------
// HeaderValue – a single header card value
// ---------------------------------------------------------------------------

/// A dynamically-typed header value as supplied by the data source.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Integer(i) => write!(f, "{i}"),
            HeaderValue::Float(v) => write!(f, "{v}"),
            HeaderValue::String(s) => write!(f, "'{s}'"),
            HeaderValue::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
        }
    }
}

impl HeaderValue {
    /// Interpret the value as an `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(v) => Some(*v),
            HeaderValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Interpret the value as a non-negative index or count.
    ///
    /// Floats are accepted only when they hold an exact integer, since some
    /// writers store integral header cards as reals.
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            HeaderValue::Integer(i) => usize::try_from(*i).ok(),
            HeaderValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 && v.is_finite() => {
                Some(*v as usize)
            }
            _ => None,
        }
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        HeaderValue::Integer(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        HeaderValue::Float(v)
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::String(v.to_string())
    }
}

// ---------------------------------------------------------------------------
// CompressedCovariance – sparse-in-wavelength normalised covariance
// ---------------------------------------------------------------------------

/// Normalised covariance sampled at a few wavelength anchors.
///
/// The cube has shape `[n_covar, 5, 5, n_x, n_y]`: element
/// `[k, dx, dy, x, y]` is the covariance between pixel `(x, y)` and pixel
/// `(x + dx - 2, y + dy - 2)` at wavelength index `covar_loc[k]`.
#[derive(Debug, Clone)]
pub struct CompressedCovariance {
    cube: Array5<f64>,
    covar_loc: Vec<usize>,
    n_wave_out: usize,
}

impl CompressedCovariance {
    /// Validate and assemble a compressed covariance record.
    pub fn new(cube: Array5<f64>, covar_loc: Vec<usize>, n_wave_out: usize) -> Result<Self> {
        let n_covar = covar_loc.len();
        if n_covar < 2 {
            return Err(Error::InsufficientCovarianceSamples(n_covar));
        }
        let (n_k, n_dx, n_dy, n_x, n_y) = cube.dim();
        let expected = [n_covar, WINDOW, WINDOW, n_x, n_y];
        if n_k != n_covar || n_dx != WINDOW || n_dy != WINDOW {
            return Err(Error::shape("compressed covariance", &expected, cube.shape()));
        }
        if let Some(pair) = covar_loc.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidHeaderValue {
                block: COVAR.to_string(),
                key: "COVARLOC".to_string(),
                reason: format!(
                    "anchor positions must be strictly ascending ({} then {})",
                    pair[0], pair[1]
                ),
            });
        }
        Ok(Self {
            cube,
            covar_loc,
            n_wave_out,
        })
    }

    pub fn cube(&self) -> ArrayView5<'_, f64> {
        self.cube.view()
    }

    /// Wavelength indices at which the covariance was sampled.
    pub fn covar_loc(&self) -> &[usize] {
        &self.covar_loc
    }

    pub fn n_covar(&self) -> usize {
        self.covar_loc.len()
    }

    /// Number of wavelength indices in the reconstructed cube.
    pub fn n_wave_out(&self) -> usize {
        self.n_wave_out
    }

    /// Spatial extent `(n_x, n_y)`.
    pub fn spatial_dims(&self) -> (usize, usize) {
        let (_, _, _, n_x, n_y) = self.cube.dim();
        (n_x, n_y)
    }
}

// ---------------------------------------------------------------------------
// IfuCubes – flux, variance and weight, wavelength-aligned
// ---------------------------------------------------------------------------

/// Flux, variance and weight cubes, each `[n_wave, n_x, n_y]`.
#[derive(Debug, Clone)]
pub struct IfuCubes {
    data: Array3<f64>,
    variance: Array3<f64>,
    weight: Array3<f64>,
}

impl IfuCubes {
    /// Validate that all three cubes share one shape.
    pub fn new(data: Array3<f64>, variance: Array3<f64>, weight: Array3<f64>) -> Result<Self> {
        if variance.shape() != data.shape() {
            return Err(Error::shape("variance cube", data.shape(), variance.shape()));
        }
        if weight.shape() != data.shape() {
            return Err(Error::shape("weight cube", data.shape(), weight.shape()));
        }
        Ok(Self {
            data,
            variance,
            weight,
        })
    }

    pub fn data(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    pub fn variance(&self) -> ArrayView3<'_, f64> {
        self.variance.view()
    }

    pub fn weight(&self) -> ArrayView3<'_, f64> {
        self.weight.view()
    }

    pub fn n_wave(&self) -> usize {
        self.data.dim().0
    }

    /// Spatial extent `(n_x, n_y)`.
    pub fn spatial_dims(&self) -> (usize, usize) {
        let (_, n_x, n_y) = self.data.dim();
        (n_x, n_y)
    }
}

// ---------------------------------------------------------------------------
// SpatialSelection – the spaxels combined into one bin
// ---------------------------------------------------------------------------

/// A set of `(x, y)` spaxel coordinates, held in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpatialSelection {
    coords: Vec<(usize, usize)>,
}

impl SpatialSelection {
    /// Every `true` pixel of `mask`, in row-major order.
    pub fn from_mask(mask: ArrayView2<'_, bool>) -> Self {
        let coords = mask
            .indexed_iter()
            .filter(|&(_, &keep)| keep)
            .map(|(idx, _)| idx)
            .collect();
        Self { coords }
    }

    /// Deduplicate arbitrary coordinates into a selection.
    pub fn from_coords<I>(coords: I) -> Self
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let unique: BTreeSet<(usize, usize)> = coords.into_iter().collect();
        Self {
            coords: unique.into_iter().collect(),
        }
    }

    pub fn coords(&self) -> &[(usize, usize)] {
        &self.coords
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    /// Whether every coordinate lies inside an `n_x × n_y` grid.
    pub fn fits_within(&self, n_x: usize, n_y: usize) -> bool {
        self.coords.iter().all(|&(x, y)| x < n_x && y < n_y)
    }

    /// Smallest `(n_x, n_y)` grid that holds every coordinate.
    pub fn extent(&self) -> (usize, usize) {
        self.coords
            .iter()
            .fold((0, 0), |(mx, my), &(x, y)| (mx.max(x + 1), my.max(y + 1)))
    }
}

// ---------------------------------------------------------------------------
// BinnedSpectrum – output of one bin
// ---------------------------------------------------------------------------

/// Combined flux and its covariance-aware variance, one value per wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct BinnedSpectrum {
    pub flux: Array1<f64>,
    pub variance: Array1<f64>,
}

impl BinnedSpectrum {
    /// Number of wavelengths where the variance is not finite (zero or
    /// missing total weight).
    pub fn degenerate_count(&self) -> usize {
        self.variance.iter().filter(|v| !v.is_finite()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array5};

    #[test]
    fn header_value_accessors() {
        assert_eq!(HeaderValue::Integer(2048).as_usize(), Some(2048));
        assert_eq!(HeaderValue::Float(12.0).as_usize(), Some(12));
        assert_eq!(HeaderValue::Float(12.5).as_usize(), None);
        assert_eq!(HeaderValue::Integer(-1).as_usize(), None);
        assert_eq!(HeaderValue::from("x").as_f64(), None);
        assert_eq!(HeaderValue::Integer(3).as_f64(), Some(3.0));
    }

    #[test]
    fn header_value_display() {
        assert_eq!(HeaderValue::Bool(true).to_string(), "T");
        assert_eq!(HeaderValue::from("COVAR").to_string(), "'COVAR'");
    }

    #[test]
    fn compressed_covariance_requires_two_anchors() {
        let cube = Array5::<f64>::zeros((1, 5, 5, 2, 2));
        let err = CompressedCovariance::new(cube, vec![0], 10).unwrap_err();
        assert!(matches!(err, Error::InsufficientCovarianceSamples(1)));
    }

    #[test]
    fn compressed_covariance_rejects_unordered_anchors() {
        let cube = Array5::<f64>::zeros((2, 5, 5, 2, 2));
        let err = CompressedCovariance::new(cube, vec![4, 4], 10).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderValue { .. }));
    }

    #[test]
    fn compressed_covariance_checks_window() {
        let cube = Array5::<f64>::zeros((2, 3, 3, 2, 2));
        let err = CompressedCovariance::new(cube, vec![0, 5], 10).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn ifu_cubes_reject_mismatched_weight() {
        let data = Array3::<f64>::zeros((4, 3, 3));
        let err = IfuCubes::new(
            data.clone(),
            data.clone(),
            Array3::<f64>::zeros((4, 3, 2)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("weight cube"));
    }

    #[test]
    fn selection_from_mask_is_row_major() {
        let mask = array![[false, true, false], [true, true, true], [false, false, false]];
        let sel = SpatialSelection::from_mask(mask.view());
        assert_eq!(sel.coords(), &[(0, 1), (1, 0), (1, 1), (1, 2)]);
        assert!(sel.fits_within(3, 3));
        assert!(!sel.fits_within(1, 3));
        assert_eq!(sel.extent(), (2, 3));
        assert_eq!(SpatialSelection::default().extent(), (0, 0));
    }

    #[test]
    fn selection_from_coords_deduplicates() {
        let sel = SpatialSelection::from_coords([(2, 1), (0, 0), (2, 1)]);
        assert_eq!(sel.coords(), &[(0, 0), (2, 1)]);
        assert_eq!(sel.len(), 2);
    }
}
