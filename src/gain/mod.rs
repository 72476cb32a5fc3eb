//! Gain Synthesis
//!
//! Derives the state-feedback gain K = R⁻¹BᵗS from a Riccati solution and
//! certifies the resulting closed loop A − BK from its eigenvalues.

use ndarray::{Array1, Array2};
use ndarray_linalg::{Eig, OperationNorm};
use num_complex::Complex;

use crate::error::{LqrError, Result};
use crate::riccati::{default_tolerance, invert_cost_matrix};

/// Immutable m×n state-feedback gain, u = −K·x.
#[derive(Clone, Debug, PartialEq)]
pub struct FeedbackGain {
    k: Array2<f64>,
}

impl FeedbackGain {
    /// Wrap an m×n gain matrix. Entries must be finite.
    pub fn new(k: Array2<f64>) -> Result<Self> {
        if k.nrows() == 0 {
            return Err(LqrError::shape("K", (1, k.ncols()), k.shape()));
        }
        if let Some(((row, col), &value)) = k.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(LqrError::NonFiniteGain { row, col, value });
        }
        Ok(Self { k })
    }

    pub fn matrix(&self) -> &Array2<f64> {
        &self.k
    }

    /// Number of states n the gain expects.
    pub fn state_dim(&self) -> usize {
        self.k.ncols()
    }

    /// Number of control channels m the gain produces.
    pub fn input_dim(&self) -> usize {
        self.k.nrows()
    }

    /// Continuous control signal u = −K·x.
    ///
    /// The length of `x` is checked on every call; a mismatch fails only
    /// this evaluation.
    ///
    /// # Examples
    ///
    /// ```
    /// use lqr_rs::gain::FeedbackGain;
    /// use ndarray::{arr1, arr2};
    ///
    /// let gain = FeedbackGain::new(arr2(&[[1.0, 2.0]])).unwrap();
    /// let u = gain.control(&arr1(&[0.5, -1.0])).unwrap();
    /// assert_eq!(u, arr1(&[1.5]));
    /// assert!(gain.control(&arr1(&[0.5])).is_err());
    /// ```
    pub fn control(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        if x.len() != self.state_dim() {
            return Err(LqrError::length("state vector", self.state_dim(), x.len()));
        }
        if let Some((index, &value)) = x.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(LqrError::NonFiniteState { index, value });
        }
        Ok(-self.k.dot(x))
    }
}

/// Stability verdict for a closed loop whose eigenvalues are all in the
/// closed left half-plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Stability {
    /// Every eigenvalue has Re(λ) < −tol. `margin` is −max Re(λ).
    Asymptotic { margin: f64 },
    /// The largest real part lies within ±tol of zero.
    Marginal { max_real: f64, tolerance: f64 },
}

impl Stability {
    pub fn is_marginal(&self) -> bool {
        matches!(self, Stability::Marginal { .. })
    }
}

/// Compute K = R⁻¹·Bᵗ·S
///
/// # Arguments
///
/// * `b` - N×M input matrix
/// * `r` - M×M input weighting (invertible)
/// * `s` - N×N Riccati solution
///
/// # Returns
///
/// The M×N gain wrapped in a [`FeedbackGain`].
pub fn gain_from_riccati(
    b: &Array2<f64>,
    r: &Array2<f64>,
    s: &Array2<f64>,
) -> Result<FeedbackGain> {
    let n = b.nrows();
    let m = b.ncols();
    if r.shape() != [m, m] {
        return Err(LqrError::shape("R", (m, m), r.shape()));
    }
    if s.shape() != [n, n] {
        return Err(LqrError::shape("S", (n, n), s.shape()));
    }
    let r_inv = invert_cost_matrix(r)?;
    FeedbackGain::new(r_inv.dot(&b.t()).dot(s))
}

/// Closed-loop matrix A − B·K.
pub fn closed_loop_matrix(
    a: &Array2<f64>,
    b: &Array2<f64>,
    gain: &FeedbackGain,
) -> Result<Array2<f64>> {
    let n = a.nrows();
    let k = gain.matrix();
    if a.ncols() != n {
        return Err(LqrError::shape("A", (n, n), a.shape()));
    }
    if b.nrows() != n || b.ncols() != k.nrows() {
        return Err(LqrError::shape("B", (n, k.nrows()), b.shape()));
    }
    if k.ncols() != n {
        return Err(LqrError::shape("K", (k.nrows(), n), k.shape()));
    }
    Ok(a - &b.dot(k))
}

/// Eigenvalues of A − B·K (LAPACK DGEEV), complex pairs included.
pub fn closed_loop_eigenvalues(
    a: &Array2<f64>,
    b: &Array2<f64>,
    gain: &FeedbackGain,
) -> Result<Array1<Complex<f64>>> {
    let acl = closed_loop_matrix(a, b, gain)?;
    if acl.is_empty() {
        return Ok(Array1::zeros(0));
    }
    let (eigenvalues, _) = acl.eig()?;
    Ok(eigenvalues)
}

/// Classify closed-loop eigenvalues.
///
/// * all Re(λ) < −tol → `Stability::Asymptotic`
/// * max Re(λ) within ±tol → `Stability::Marginal` (non-fatal, logged)
/// * any Re(λ) > tol → `LqrError::UnstableClosedLoop`
///
/// An eigenvalue exactly on the imaginary axis is always marginal, never
/// silently accepted.
pub fn certify(eigenvalues: &Array1<Complex<f64>>, tol: f64) -> Result<Stability> {
    if !tol.is_finite() || tol <= 0.0 {
        return Err(LqrError::InvalidTolerance(tol));
    }
    let max_real = eigenvalues
        .iter()
        .map(|l| l.re)
        .fold(f64::NEG_INFINITY, f64::max);

    if eigenvalues.is_empty() {
        return Ok(Stability::Asymptotic {
            margin: f64::INFINITY,
        });
    }
    if max_real.is_nan() || eigenvalues.iter().any(|l| l.re.is_nan()) {
        return Err(LqrError::unsolvable("closed-loop spectrum contains NaN"));
    }
    if max_real > tol {
        return Err(LqrError::UnstableClosedLoop { max_real });
    }
    if max_real >= -tol {
        log::warn!(
            "closed loop is marginally stable: max Re(λ) = {max_real:e} (tolerance {tol:e})"
        );
        return Ok(Stability::Marginal {
            max_real,
            tolerance: tol,
        });
    }
    Ok(Stability::Asymptotic { margin: -max_real })
}

/// Outcome of [`synthesize_gain`].
#[derive(Clone, Debug)]
pub struct GainSynthesis {
    pub gain: FeedbackGain,
    pub eigenvalues: Array1<Complex<f64>>,
    pub stability: Stability,
}

/// Derive K from S and certify A − BK in one call
///
/// # Arguments
///
/// * `a` - N×N state matrix
/// * `b` - N×M input matrix
/// * `r` - M×M input weighting
/// * `s` - N×N Riccati solution
/// * `tol` - Optional marginality tolerance ε; None uses
///   `1e3 · n · ε_mach · max(‖A − BK‖_F, 1)`
///
/// Pure and deterministic: identical inputs give identical outputs.
pub fn synthesize_gain(
    a: &Array2<f64>,
    b: &Array2<f64>,
    r: &Array2<f64>,
    s: &Array2<f64>,
    tol: Option<f64>,
) -> Result<GainSynthesis> {
    let gain = gain_from_riccati(b, r, s)?;
    let acl = closed_loop_matrix(a, b, &gain)?;
    let toldef = match tol {
        Some(t) => t,
        None if acl.is_empty() => default_tolerance(0, 0.0),
        None => default_tolerance(acl.nrows(), acl.opnorm_fro()?),
    };
    let eigenvalues = if acl.is_empty() {
        Array1::zeros(0)
    } else {
        acl.eig()?.0
    };
    let stability = certify(&eigenvalues, toldef)?;
    Ok(GainSynthesis {
        gain,
        eigenvalues,
        stability,
    })
}
