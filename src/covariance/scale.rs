use ndarray::{Array5, ArrayView3, ArrayView5, Axis, Zip};

use crate::data::model::WINDOW;
use crate::error::{Error, Result};

/// Convert normalised covariance into absolute (weighted variance) units.
///
/// `A[w, dx, dy, x, y] = V[w, x, y] * C[w, dx, dy, x, y] * W[w, x, y]^2`
///
/// Variance and weight are taken from the base pixel `(x, y)` only, never
/// from the offset pixel, so `A` is not symmetric under swapping base and
/// target.
pub fn absolute_covariance(
    norm_covar: ArrayView5<'_, f64>,
    variance: ArrayView3<'_, f64>,
    weight: ArrayView3<'_, f64>,
) -> Result<Array5<f64>> {
    let (n_wave, n_dx, n_dy, n_x, n_y) = norm_covar.dim();
    if n_dx != WINDOW || n_dy != WINDOW {
        return Err(Error::shape(
            "normalised covariance",
            &[n_wave, WINDOW, WINDOW, n_x, n_y],
            norm_covar.shape(),
        ));
    }
    let cube_shape = [n_wave, n_x, n_y];
    if variance.shape() != &cube_shape[..] {
        return Err(Error::shape("variance cube", &cube_shape, variance.shape()));
    }
    if weight.shape() != &cube_shape[..] {
        return Err(Error::shape("weight cube", &cube_shape, weight.shape()));
    }

    log::debug!("scaling covariance of shape {:?}", norm_covar.shape());

    let mut covar = norm_covar.to_owned();
    for (w, mut plane) in covar.axis_iter_mut(Axis(0)).enumerate() {
        let var_w = variance.index_axis(Axis(0), w);
        let weight_w = weight.index_axis(Axis(0), w);
        for mut offset_row in plane.outer_iter_mut() {
            for mut cell in offset_row.outer_iter_mut() {
                Zip::from(&mut cell)
                    .and(&var_w)
                    .and(&weight_w)
                    .for_each(|c, &v, &wt| *c = v * *c * wt.powi(2));
            }
        }
    }
    Ok(covar)
}
