//! Error taxonomy shared by synthesis and evaluation.
//!
//! Synthesis failures (`SingularCostMatrix`, `RiccatiUnsolvable`,
//! `UnstableClosedLoop`) abort the whole synthesis and no partial result is
//! returned. `DimensionMismatch` from a feedback evaluation only fails that
//! call; the gain stays valid for correctly shaped states.

use ndarray_linalg::error::LinalgError;
use thiserror::Error;

/// Root error type for every fallible operation in the crate.
#[derive(Error, Debug)]
pub enum LqrError {
    /// The input weighting matrix R cannot be inverted.
    #[error("singular cost matrix R: {reason}")]
    SingularCostMatrix { reason: String },

    /// The stable invariant subspace of the Hamiltonian could not be
    /// extracted (not stabilizable/detectable, or ill-conditioned).
    #[error("Riccati equation unsolvable: {reason}")]
    RiccatiUnsolvable { reason: String },

    /// A closed-loop eigenvalue lies within the tolerance of the imaginary
    /// axis. Only raised when the caller asks for asymptotic stability.
    #[error("marginal closed-loop stability: max Re(λ) = {max_real:e} within ±{tolerance:e}")]
    MarginalStability { max_real: f64, tolerance: f64 },

    /// A closed-loop eigenvalue has a positive real part.
    #[error("unstable closed loop: max Re(λ) = {max_real:e}")]
    UnstableClosedLoop { max_real: f64 },

    /// A vector or matrix does not have the shape the operation needs.
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    /// A state vector carries NaN or infinite components.
    #[error("state component {index} is not finite ({value})")]
    NonFiniteState { index: usize, value: f64 },

    /// A feedback gain matrix carries NaN or infinite entries.
    #[error("gain entry K[{row}, {col}] is not finite ({value})")]
    NonFiniteGain { row: usize, col: usize, value: f64 },

    /// Q or R is not symmetric within tolerance.
    #[error("cost matrix {name} is not symmetric (max |M - Mᵗ| = {deviation:e})")]
    AsymmetricCostMatrix { name: &'static str, deviation: f64 },

    /// A physical constant is outside its valid range.
    #[error("invalid physical constant {name} = {value} (must be finite and > 0)")]
    InvalidConstants { name: &'static str, value: f64 },

    /// A configured tolerance is not a positive finite number.
    #[error("tolerance must be finite and > 0, got {0}")]
    InvalidTolerance(f64),

    /// Actuator clamp bounds are empty or non-finite.
    #[error("invalid actuator limits [{low}, {high}]")]
    InvalidActuatorLimits { low: f64, high: f64 },

    /// A discrete action index outside the plant's alphabet.
    #[error("action index {0} is not in the binary alphabet {{0, 1}}")]
    InvalidAction(usize),

    /// The LAPACK backend reported a failure.
    #[error("linear algebra backend error: {0}")]
    Linalg(#[from] LinalgError),
}

impl LqrError {
    pub(crate) fn shape(what: &'static str, expected: (usize, usize), found: &[usize]) -> Self {
        LqrError::DimensionMismatch {
            what,
            expected: format!("{}×{}", expected.0, expected.1),
            found: format_shape(found),
        }
    }

    pub(crate) fn length(what: &'static str, expected: usize, found: usize) -> Self {
        LqrError::DimensionMismatch {
            what,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    pub(crate) fn unsolvable(reason: impl Into<String>) -> Self {
        LqrError::RiccatiUnsolvable {
            reason: reason.into(),
        }
    }
}

fn format_shape(shape: &[usize]) -> String {
    shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("×")
}

pub type Result<T> = std::result::Result<T, LqrError>;
