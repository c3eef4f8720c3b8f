//! Covariance-aware spectral binning.
//!
//! A bin's variance is the sum of the absolute covariance over every ordered
//! pair of included spaxels that lie within the 5×5 covariance window of
//! each other (the self pair included), normalised by the squared total
//! weight. Pairs farther apart contribute nothing.

use ndarray::{s, Array1, Array2, Array3, ArrayView3, ArrayView5, Zip};

use crate::covariance::absolute_from_parts;
use crate::data::model::{BinnedSpectrum, SpatialSelection, HALF_WINDOW, WINDOW};
use crate::data::source::{load_compressed_covariance, load_cubes, DataSource};
use crate::error::{Error, Result};
use crate::stats::NanSum;

/// Bins selections of one set of cubes.
///
/// The weighted flux `D * W` is computed once on construction and shared by
/// every selection passed to [`SpectralBinner::bin`] or
/// [`SpectralBinner::bin_many`].
#[derive(Debug, Clone)]
pub struct SpectralBinner<'a> {
    weighted_data: Array3<f64>,
    covar: ArrayView5<'a, f64>,
    weight: ArrayView3<'a, f64>,
}

impl<'a> SpectralBinner<'a> {
    /// `data` and `weight` are `[n_wave, n_x, n_y]`; `covar` is the absolute
    /// covariance `[n_wave, 5, 5, n_x, n_y]`.
    pub fn new(
        data: ArrayView3<'_, f64>,
        covar: ArrayView5<'a, f64>,
        weight: ArrayView3<'a, f64>,
    ) -> Result<Self> {
        if weight.shape() != data.shape() {
            return Err(Error::shape("weight cube", data.shape(), weight.shape()));
        }
        let (n_wave, n_x, n_y) = data.dim();
        let expected = [n_wave, WINDOW, WINDOW, n_x, n_y];
        if covar.shape() != &expected[..] {
            return Err(Error::shape("absolute covariance", &expected, covar.shape()));
        }

        let mut weighted_data = Array3::<f64>::zeros(data.raw_dim());
        Zip::from(&mut weighted_data)
            .and(&data)
            .and(&weight)
            .for_each(|dw, &d, &w| *dw = d * w);

        Ok(Self {
            weighted_data,
            covar,
            weight,
        })
    }

    pub fn n_wave(&self) -> usize {
        self.weighted_data.dim().0
    }

    /// Combined spectrum and variance of one selection.
    ///
    /// Wavelengths whose total weight is zero or entirely missing come out
    /// as NaN or infinite; that is reported, not treated as an error.
    pub fn bin(&self, selection: &SpatialSelection) -> Result<BinnedSpectrum> {
        let (n_wave, n_x, n_y) = self.weighted_data.dim();
        if !selection.fits_within(n_x, n_y) {
            let (max_x, max_y) = selection.extent();
            return Err(Error::shape("selection extent", &[n_x, n_y], &[max_x, max_y]));
        }

        let mut member = Array2::<bool>::from_elem((n_x, n_y), false);
        for &(x, y) in selection.coords() {
            member[[x, y]] = true;
        }

        let mut flux_sum = vec![NanSum::default(); n_wave];
        let mut var_sum = vec![NanSum::default(); n_wave];
        let mut weight_sum = vec![NanSum::default(); n_wave];

        for &(x, y) in selection.coords() {
            let flux = self.weighted_data.slice(s![.., x, y]);
            let weight = self.weight.slice(s![.., x, y]);
            for (acc, &f) in flux_sum.iter_mut().zip(flux.iter()) {
                acc.push(f);
            }
            for (acc, &wt) in weight_sum.iter_mut().zip(weight.iter()) {
                acc.push(wt);
            }

            for (dx, tx) in window_targets(x, n_x) {
                for (dy, ty) in window_targets(y, n_y) {
                    if !member[[tx, ty]] {
                        continue;
                    }
                    let pair = self.covar.slice(s![.., dx, dy, x, y]);
                    for (acc, &c) in var_sum.iter_mut().zip(pair.iter()) {
                        acc.push(c);
                    }
                }
            }
        }

        let flux: Array1<f64> = flux_sum
            .iter()
            .zip(&weight_sum)
            .map(|(f, w)| f.value() / w.value())
            .collect();
        let variance: Array1<f64> = var_sum
            .iter()
            .zip(&weight_sum)
            .map(|(v, w)| v.value() / w.value().powi(2))
            .collect();
        let binned = BinnedSpectrum { flux, variance };

        let degenerate = binned.degenerate_count();
        if degenerate > 0 {
            log::warn!(
                "{degenerate} of {n_wave} wavelengths have zero or missing total weight \
                 for a {}-spaxel bin",
                selection.len()
            );
        }
        log::debug!("binned {} spaxels over {n_wave} wavelengths", selection.len());
        Ok(binned)
    }

    /// Bin several selections against the same cubes.
    pub fn bin_many(&self, selections: &[SpatialSelection]) -> Result<Vec<BinnedSpectrum>> {
        selections.iter().map(|sel| self.bin(sel)).collect()
    }
}

/// Window offsets `d` (0..5) whose target `pos + d - 2` lies on `0..n`,
/// paired with that target.
fn window_targets(pos: usize, n: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..WINDOW).filter_map(move |d| {
        (pos + d)
            .checked_sub(HALF_WINDOW)
            .filter(|&t| t < n)
            .map(|t| (d, t))
    })
}

/// Load everything from `source` and bin one selection.
pub fn bin_source<S: DataSource + ?Sized>(
    source: &S,
    selection: &SpatialSelection,
) -> Result<BinnedSpectrum> {
    let mut binned = bin_source_multi(source, std::slice::from_ref(selection))?;
    Ok(binned.remove(0))
}

/// Load everything from `source` once and bin each selection.
pub fn bin_source_multi<S: DataSource + ?Sized>(
    source: &S,
    selections: &[SpatialSelection],
) -> Result<Vec<BinnedSpectrum>> {
    let cubes = load_cubes(source)?;
    let compressed = load_compressed_covariance(source)?;
    let covar = absolute_from_parts(&cubes, &compressed)?;
    let binner = SpectralBinner::new(cubes.data(), covar.view(), cubes.weight())?;
    binner.bin_many(selections)
}
