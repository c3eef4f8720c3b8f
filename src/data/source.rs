use std::collections::BTreeMap;

use ndarray::{Array5, ArrayD, Dimension};

use super::model::{CompressedCovariance, HeaderValue, IfuCubes, COVAR, PRIMARY, VARIANCE, WEIGHT};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// DataSource – the container collaborator
// ---------------------------------------------------------------------------

/// Named data blocks and their header cards.
///
/// Implementations own whatever backs the blocks (an open file, a memory
/// map, plain vectors); dropping the source releases it, so a source held
/// in a local is released on every exit path including `?` returns.
pub trait DataSource {
    /// The numeric array stored in `block`.
    fn get_array(&self, block: &str) -> Result<ArrayD<f64>>;

    /// The header card `key` of `block`.
    fn get_header_value(&self, block: &str, key: &str) -> Result<HeaderValue>;
}

impl<S: DataSource + ?Sized> DataSource for &S {
    fn get_array(&self, block: &str) -> Result<ArrayD<f64>> {
        (**self).get_array(block)
    }

    fn get_header_value(&self, block: &str, key: &str) -> Result<HeaderValue> {
        (**self).get_header_value(block, key)
    }
}

// ---------------------------------------------------------------------------
// MemorySource – in-memory container
// ---------------------------------------------------------------------------

/// A [`DataSource`] whose blocks live in memory.
///
/// ```
/// use ifu_covar::data::source::{DataSource, MemorySource};
/// use ndarray::Array3;
///
/// let source = MemorySource::new()
///     .with_array("PRIMARY", Array3::<f64>::zeros((4, 2, 2)))
///     .with_header("PRIMARY", "NAXIS3", 4_i64);
/// assert_eq!(source.get_array("PRIMARY").unwrap().shape(), &[4, 2, 2]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    arrays: BTreeMap<String, ArrayD<f64>>,
    headers: BTreeMap<String, BTreeMap<String, HeaderValue>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a data block.
    pub fn with_array<D: Dimension>(
        mut self,
        block: &str,
        array: ndarray::Array<f64, D>,
    ) -> Self {
        self.arrays.insert(block.to_string(), array.into_dyn());
        self
    }

    /// Add (or replace) a header card.
    pub fn with_header(mut self, block: &str, key: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers
            .entry(block.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Remove a data block and its header.
    pub fn without_block(mut self, block: &str) -> Self {
        self.arrays.remove(block);
        self.headers.remove(block);
        self
    }

    fn has_block(&self, block: &str) -> bool {
        self.arrays.contains_key(block) || self.headers.contains_key(block)
    }
}

impl DataSource for MemorySource {
    fn get_array(&self, block: &str) -> Result<ArrayD<f64>> {
        self.arrays
            .get(block)
            .cloned()
            .ok_or_else(|| Error::MissingExtension(block.to_string()))
    }

    fn get_header_value(&self, block: &str, key: &str) -> Result<HeaderValue> {
        if !self.has_block(block) {
            return Err(Error::MissingExtension(block.to_string()));
        }
        self.headers
            .get(block)
            .and_then(|cards| cards.get(key))
            .cloned()
            .ok_or_else(|| Error::MissingHeaderKey {
                block: block.to_string(),
                key: key.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

/// Load flux, variance and weight cubes.
pub fn load_cubes<S: DataSource + ?Sized>(source: &S) -> Result<IfuCubes> {
    let data = load_array::<_, ndarray::Ix3>(source, PRIMARY, "flux cube")?;
    let variance = load_array::<_, ndarray::Ix3>(source, VARIANCE, "variance cube")?;
    let weight = load_array::<_, ndarray::Ix3>(source, WEIGHT, "weight cube")?;
    IfuCubes::new(data, variance, weight)
}

/// Load the compressed covariance block and its anchor metadata.
///
/// The output wavelength count comes from `PRIMARY/NAXIS3`; the anchor
/// count from `COVAR/COVAR_N`; the anchors themselves from the 1-based
/// cards `COVAR/COVARLOC_1 ..= COVARLOC_n`.
pub fn load_compressed_covariance<S: DataSource + ?Sized>(
    source: &S,
) -> Result<CompressedCovariance> {
    let n_wave_out = header_usize(source, PRIMARY, "NAXIS3")?;
    let n_covar = header_usize(source, COVAR, "COVAR_N")?;
    let covar_loc = (1..=n_covar)
        .map(|i| header_usize(source, COVAR, &format!("COVARLOC_{i}")))
        .collect::<Result<Vec<_>>>()?;
    let cube: Array5<f64> = load_array(source, COVAR, "compressed covariance")?;

    log::debug!(
        "compressed covariance: {n_covar} anchors, {n_wave_out} output wavelengths, shape {:?}",
        cube.shape()
    );
    CompressedCovariance::new(cube, covar_loc, n_wave_out)
}

/// Read a header card that must be a non-negative integer.
pub fn header_usize<S: DataSource + ?Sized>(source: &S, block: &str, key: &str) -> Result<usize> {
    let value = source.get_header_value(block, key)?;
    value.as_usize().ok_or_else(|| Error::InvalidHeaderValue {
        block: block.to_string(),
        key: key.to_string(),
        reason: format!("expected a non-negative integer, got {value}"),
    })
}

fn load_array<S, D>(source: &S, block: &str, what: &str) -> Result<ndarray::Array<f64, D>>
where
    S: DataSource + ?Sized,
    D: Dimension,
{
    let array = source.get_array(block)?;
    let actual = array.shape().to_vec();
    array.into_dimensionality::<D>().map_err(|_| Error::ShapeMismatch {
        what: format!("{what} ({} axes required)", D::NDIM.unwrap_or(0)),
        expected: Vec::new(),
        actual,
    })
}
