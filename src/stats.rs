//! Reductions that honour the "NaN means no contribution" convention.
//!
//! Every sum in the pipeline goes through [`nan_sum`] or [`NanSum`] so the
//! convention is applied in one place instead of relying on how NaN happens
//! to propagate through arithmetic.

/// `true` when a value carries a contribution (i.e. is not the NaN sentinel).
///
/// Infinities are contributions: they propagate, only NaN is skipped.
#[inline]
pub fn is_present(value: f64) -> bool {
    !value.is_nan()
}

/// Sum of all present values; NaN entries contribute zero.
pub fn nan_sum<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().filter(|v| is_present(*v)).sum()
}

/// Running accumulator with the same semantics as [`nan_sum`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NanSum(f64);

impl NanSum {
    #[inline]
    pub fn push(&mut self, value: f64) {
        if is_present(value) {
            self.0 += value;
        }
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

/// Median of a sequence.
///
/// Even lengths average the two middle values. Any NaN in the input yields
/// NaN, as does an empty input, so degenerate wavelengths stay visible.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}
