use ndarray::{Array5, Axis, Zip};

use crate::data::model::{CompressedCovariance, WINDOW};
use crate::data::source::{load_compressed_covariance, DataSource};
use crate::error::Result;

/// How one output wavelength is obtained from the anchors.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Stencil {
    /// Copy anchor `k` (exact hit, or clamped outside the anchor range).
    Anchor(usize),
    /// Linear blend between anchor `lo` and `lo + 1`.
    Between { lo: usize, offset: f64, span: f64 },
}

/// One stencil per output wavelength index. Shared by every cell, so the
/// anchor search runs once per wavelength rather than once per cell.
fn stencils(covar_loc: &[usize], n_wave_out: usize) -> Vec<Stencil> {
    let last = covar_loc.len() - 1;
    (0..n_wave_out)
        .map(|w| {
            // Index of the first anchor strictly greater than `w`.
            let upper = covar_loc.partition_point(|&loc| loc <= w);
            if upper == 0 {
                Stencil::Anchor(0)
            } else if upper > last {
                Stencil::Anchor(last)
            } else if covar_loc[upper - 1] == w {
                Stencil::Anchor(upper - 1)
            } else {
                let lo = upper - 1;
                Stencil::Between {
                    lo,
                    offset: (w - covar_loc[lo]) as f64,
                    span: (covar_loc[upper] - covar_loc[lo]) as f64,
                }
            }
        })
        .collect()
}

/// Expand compressed covariance to every output wavelength.
///
/// Each `(dx, dy, x, y)` cell is interpolated linearly in wavelength,
/// independently of every other cell. Wavelengths before the first or after
/// the last anchor take that anchor's value. Missing (NaN) anchors stay
/// missing in the segments that touch them.
pub fn reconstruct(compressed: &CompressedCovariance) -> Array5<f64> {
    let cube = compressed.cube();
    let (n_x, n_y) = compressed.spatial_dims();
    let n_wave_out = compressed.n_wave_out();
    let mut full = Array5::<f64>::zeros((n_wave_out, WINDOW, WINDOW, n_x, n_y));

    log::debug!(
        "reconstructing covariance: {} anchors -> {} wavelengths on {}x{} grid",
        compressed.n_covar(),
        n_wave_out,
        n_x,
        n_y
    );

    let plan = stencils(compressed.covar_loc(), n_wave_out);
    for (mut out, stencil) in full.axis_iter_mut(Axis(0)).zip(plan) {
        match stencil {
            Stencil::Anchor(k) => out.assign(&cube.index_axis(Axis(0), k)),
            Stencil::Between { lo, offset, span } => {
                Zip::from(&mut out)
                    .and(cube.index_axis(Axis(0), lo))
                    .and(cube.index_axis(Axis(0), lo + 1))
                    .for_each(|o, &a, &b| *o = (b - a) / span * offset + a);
            }
        }
    }
    full
}

/// Load the compressed covariance from `source` and expand it.
pub fn read_norm_covariance<S: DataSource + ?Sized>(source: &S) -> Result<Array5<f64>> {
    let compressed = load_compressed_covariance(source)?;
    Ok(reconstruct(&compressed))
}
