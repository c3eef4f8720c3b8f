use thiserror::Error;

/// Errors produced while loading cubes or propagating covariance.
///
/// Zero or all-NaN combination weights are *not* represented here: they
/// surface in-band as NaN/Inf in the binned output so that callers can
/// detect unusable apertures.
#[derive(Debug, Error)]
pub enum Error {
    /// A required named data block is absent from the source.
    #[error("missing extension '{0}'")]
    MissingExtension(String),

    /// A required header key is absent from a data block.
    #[error("missing header key '{key}' in extension '{block}'")]
    MissingHeaderKey { block: String, key: String },

    /// A header value exists but cannot be used (wrong type, out of range).
    #[error("invalid header value for '{key}' in extension '{block}': {reason}")]
    InvalidHeaderValue {
        block: String,
        key: String,
        reason: String,
    },

    /// Arrays that must line up have inconsistent dimensions.
    #[error("shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Fewer than two wavelength anchors; interpolation is undefined.
    #[error("insufficient covariance samples: need at least 2 anchors, got {0}")]
    InsufficientCovarianceSamples(usize),

    /// Malformed comparator configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration text is not valid JSON for the expected schema.
    #[error("parsing configuration: {0}")]
    ConfigJson(#[from] serde_json::Error),
}

/// Result alias for covariance operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape(what: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Error::ShapeMismatch {
            what: what.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
