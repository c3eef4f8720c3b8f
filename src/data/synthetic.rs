//! Deterministic synthetic IFU cubes.
//!
//! Produces a [`MemorySource`] with every block the pipeline reads: a
//! Gaussian point source on a flat continuum plus noise, constant variance,
//! unit weights inside the field of view, and a compressed covariance whose
//! correlation length drifts linearly from the first to the last anchor.

use ndarray::{Array3, Array5};

use super::model::{COVAR, HALF_WINDOW, PRIMARY, VARIANCE, WEIGHT, WINDOW};
use super::source::MemorySource;

/// Seeded xoshiro256** generator for the synthetic noise. The same seed
/// always yields the same cube.
#[derive(Debug, Clone)]
pub(crate) struct NoiseRng {
    state: [u64; 4],
}

impl NoiseRng {
    /// Spread `seed` over the four state words with an LCG step.
    pub(crate) fn seeded(seed: u64) -> Self {
        let mut state = [0u64; 4];
        let mut x = seed;
        for word in &mut state {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *word = x;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let out = self.state[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        out
    }

    /// Uniform in `[0, 1)` from the top 53 bits.
    pub(crate) fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Normal deviate with standard deviation `sigma` around `mean`.
    pub(crate) fn normal(&mut self, mean: f64, sigma: f64) -> f64 {
        // Box-Muller; keep u1 off zero so ln stays finite.
        let u1 = self.uniform().max(1e-15);
        let u2 = self.uniform();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        mean + sigma * z
    }
}

/// Builder for a synthetic cube.
#[derive(Debug, Clone)]
pub struct SyntheticCube {
    pub n_x: usize,
    pub n_y: usize,
    pub n_wave: usize,
    /// Spacing between covariance anchors, in wavelength indices.
    pub anchor_step: usize,
    /// Nearest-neighbour correlation at the first and last anchor.
    pub correlation: (f64, f64),
    pub noise: f64,
    pub seed: u64,
    /// Spaxels farther than this (in pixels) from the grid centre carry no
    /// data: NaN flux, variance, weight and covariance.
    pub field_radius: Option<f64>,
}

impl Default for SyntheticCube {
    fn default() -> Self {
        Self {
            n_x: 50,
            n_y: 50,
            n_wave: 64,
            anchor_step: 16,
            correlation: (0.4, 0.2),
            noise: 0.1,
            seed: 42,
            field_radius: None,
        }
    }
}

impl SyntheticCube {
    pub fn new(n_x: usize, n_y: usize, n_wave: usize) -> Self {
        Self {
            n_x,
            n_y,
            n_wave,
            ..Self::default()
        }
    }

    /// Wavelength anchor positions: every `anchor_step` indices, always
    /// including the last wavelength.
    pub fn anchors(&self) -> Vec<usize> {
        let last = self.n_wave.saturating_sub(1);
        let step = self.anchor_step.max(1);
        let mut anchors: Vec<usize> = (0..last).step_by(step).collect();
        anchors.push(last);
        anchors
    }

    fn in_field(&self, x: usize, y: usize) -> bool {
        match self.field_radius {
            None => true,
            Some(radius) => {
                let cx = 0.5 * (self.n_x as f64 - 1.0);
                let cy = 0.5 * (self.n_y as f64 - 1.0);
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                dx * dx + dy * dy <= radius * radius
            }
        }
    }

    /// Normalised covariance of a `(dx, dy)` window offset for correlation `rho`.
    fn profile(rho: f64, dx: usize, dy: usize) -> f64 {
        let manhattan = dx.abs_diff(HALF_WINDOW) + dy.abs_diff(HALF_WINDOW);
        rho.powi(manhattan as i32)
    }

    /// Assemble every block the pipeline reads.
    pub fn build(&self) -> MemorySource {
        let mut rng = NoiseRng::seeded(self.seed);
        let (n_x, n_y, n_wave) = (self.n_x, self.n_y, self.n_wave);
        let cx = 0.5 * (n_x as f64 - 1.0);
        let cy = 0.5 * (n_y as f64 - 1.0);
        let sigma = 0.1 * n_x.min(n_y).max(1) as f64;

        let mut data = Array3::<f64>::zeros((n_wave, n_x, n_y));
        let mut variance = Array3::<f64>::zeros((n_wave, n_x, n_y));
        let mut weight = Array3::<f64>::zeros((n_wave, n_x, n_y));
        for ((w, x, y), value) in data.indexed_iter_mut() {
            if !self.in_field(x, y) {
                *value = f64::NAN;
                variance[[w, x, y]] = f64::NAN;
                weight[[w, x, y]] = f64::NAN;
                continue;
            }
            let r2 = (x as f64 - cx).powi(2) + (y as f64 - cy).powi(2);
            let continuum = 1.0 + 0.5 * (w as f64 / n_wave.max(1) as f64);
            let signal = continuum * (-r2 / (2.0 * sigma * sigma)).exp();
            *value = signal + rng.normal(0.0, self.noise);
            variance[[w, x, y]] = self.noise * self.noise;
            weight[[w, x, y]] = 1.0;
        }

        let anchors = self.anchors();
        let n_covar = anchors.len();
        let (rho_first, rho_last) = self.correlation;
        let mut covar = Array5::<f64>::zeros((n_covar, WINDOW, WINDOW, n_x, n_y));
        for ((k, dx, dy, x, y), value) in covar.indexed_iter_mut() {
            let tx = (x + dx).checked_sub(HALF_WINDOW).filter(|&t| t < n_x);
            let ty = (y + dy).checked_sub(HALF_WINDOW).filter(|&t| t < n_y);
            let neighbour_in_field = match (tx, ty) {
                (Some(tx), Some(ty)) => self.in_field(tx, ty),
                _ => false,
            };
            *value = if self.in_field(x, y) && neighbour_in_field {
                let frac = if n_covar > 1 {
                    k as f64 / (n_covar - 1) as f64
                } else {
                    0.0
                };
                Self::profile(rho_first + (rho_last - rho_first) * frac, dx, dy)
            } else {
                f64::NAN
            };
        }

        let mut source = MemorySource::new()
            .with_array(PRIMARY, data)
            .with_array(VARIANCE, variance)
            .with_array(WEIGHT, weight)
            .with_array(COVAR, covar)
            .with_header(PRIMARY, "NAXIS3", n_wave as i64)
            .with_header(COVAR, "COVAR_N", n_covar as i64);
        for (i, &loc) in anchors.iter().enumerate() {
            source = source.with_header(COVAR, &format!("COVARLOC_{}", i + 1), loc as i64);
        }
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::{load_compressed_covariance, load_cubes};

    #[test]
    fn rng_is_deterministic() {
        let mut a = NoiseRng::seeded(7);
        let mut b = NoiseRng::seeded(7);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
        let u = NoiseRng::seeded(3).uniform();
        assert!((0.0..1.0).contains(&u));
    }

    #[test]
    fn anchors_cover_both_ends() {
        let cube = SyntheticCube {
            n_wave: 50,
            anchor_step: 16,
            ..SyntheticCube::default()
        };
        assert_eq!(cube.anchors(), vec![0, 16, 32, 48, 49]);
    }

    #[test]
    fn built_source_loads_cleanly() {
        let source = SyntheticCube::new(6, 5, 20).build();
        let cubes = load_cubes(&source).unwrap();
        assert_eq!(cubes.spatial_dims(), (6, 5));
        assert_eq!(cubes.n_wave(), 20);
        let covar = load_compressed_covariance(&source).unwrap();
        assert_eq!(covar.n_wave_out(), 20);
        assert_eq!(covar.spatial_dims(), (6, 5));
        // Self term is always 1.
        assert_eq!(covar.cube()[[0, 2, 2, 3, 3]], 1.0);
        // Neighbours off the grid carry no covariance.
        assert!(covar.cube()[[0, 0, 2, 0, 3]].is_nan());
    }

    #[test]
    fn outside_field_is_nan() {
        let source = SyntheticCube {
            field_radius: Some(1.5),
            ..SyntheticCube::new(7, 7, 4)
        }
        .build();
        let cubes = load_cubes(&source).unwrap();
        assert!(cubes.weight()[[0, 0, 0]].is_nan());
        assert_eq!(cubes.weight()[[0, 3, 3]], 1.0);
    }
}
