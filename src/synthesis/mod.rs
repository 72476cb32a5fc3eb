//! LQR Synthesis Sessions
//!
//! Ties the pieces together: a [`LinearModel`] is linearized once, the
//! Riccati equation is solved once, and the resulting gain is published as
//! an immutable value that every subsequent control step reuses.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use num_complex::Complex;

use crate::error::{LqrError, Result};
use crate::gain::{synthesize_gain, FeedbackGain, Stability};
use crate::model::{LinearModel, StateSpace};
use crate::policy::{ActionMap, FeedbackPolicy};
use crate::riccati::{care_residual, solve_care};

/// Operator-chosen synthesis parameters.
///
/// `q` and `r` default to identity matrices of the right dimension (equal
/// penalty weighting). `tolerance` is the stability ε: a closed-loop
/// eigenvalue with |Re(λ)| ≤ ε is marginal. `solver_tolerance` governs the
/// Riccati solver's symmetry checks and imaginary-axis test. Either one
/// left at None gets a small norm-scaled default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SynthesisConfig {
    pub q: Option<Array2<f64>>,
    pub r: Option<Array2<f64>>,
    pub tolerance: Option<f64>,
    pub solver_tolerance: Option<f64>,
}

impl SynthesisConfig {
    pub fn with_q(mut self, q: Array2<f64>) -> Self {
        self.q = Some(q);
        self
    }

    pub fn with_r(mut self, r: Array2<f64>) -> Self {
        self.r = Some(r);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn with_solver_tolerance(mut self, tolerance: f64) -> Self {
        self.solver_tolerance = Some(tolerance);
        self
    }

    /// Diagonal Q from per-state weights.
    pub fn with_state_weights(self, weights: &[f64]) -> Self {
        self.with_q(Array2::from_diag(&Array1::from(weights.to_vec())))
    }

    pub fn validate(&self) -> Result<()> {
        for t in [self.tolerance, self.solver_tolerance].into_iter().flatten() {
            if !t.is_finite() || t <= 0.0 {
                return Err(LqrError::InvalidTolerance(t));
            }
        }
        Ok(())
    }

    /// Q and R resolved against the model dimensions.
    fn weights(&self, n: usize, m: usize) -> Result<(Array2<f64>, Array2<f64>)> {
        let q = self.q.clone().unwrap_or_else(|| Array2::eye(n));
        let r = self.r.clone().unwrap_or_else(|| Array2::eye(m));
        if q.shape() != [n, n] {
            return Err(LqrError::shape("Q", (n, n), q.shape()));
        }
        if r.shape() != [m, m] {
            return Err(LqrError::shape("R", (m, m), r.shape()));
        }
        Ok((q, r))
    }
}

/// Everything one synthesis produces. Read-only after return.
#[derive(Clone, Debug)]
pub struct SynthesisResult {
    system: StateSpace,
    q: Array2<f64>,
    r: Array2<f64>,
    riccati: Array2<f64>,
    gain: Arc<FeedbackGain>,
    eigenvalues: Array1<Complex<f64>>,
    stability: Stability,
    residual: f64,
}

impl SynthesisResult {
    /// Linear model the gain was designed for.
    pub fn system(&self) -> &StateSpace {
        &self.system
    }

    pub fn q(&self) -> &Array2<f64> {
        &self.q
    }

    pub fn r(&self) -> &Array2<f64> {
        &self.r
    }

    /// Stabilizing Riccati solution S.
    pub fn riccati(&self) -> &Array2<f64> {
        &self.riccati
    }

    /// Feedback gain K, shareable across evaluators.
    pub fn gain(&self) -> &Arc<FeedbackGain> {
        &self.gain
    }

    /// Closed-loop eigenvalues of A − BK.
    pub fn eigenvalues(&self) -> &Array1<Complex<f64>> {
        &self.eigenvalues
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }

    /// Frobenius norm of the ARE residual at S.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Reject a marginal verdict.
    ///
    /// Marginal stability is a warning by default; callers that only accept
    /// asymptotically stable designs turn it into `MarginalStability` here.
    pub fn require_asymptotic(self) -> Result<Self> {
        match self.stability {
            Stability::Marginal {
                max_real,
                tolerance,
            } => Err(LqrError::MarginalStability {
                max_real,
                tolerance,
            }),
            Stability::Asymptotic { .. } => Ok(self),
        }
    }

    /// Feedback policy over this result's gain.
    pub fn policy<M: ActionMap>(&self, map: M) -> FeedbackPolicy<M> {
        FeedbackPolicy::new(Arc::clone(&self.gain), map)
    }
}

/// Synthesize an LQR controller for any [`LinearModel`]
///
/// Linearizes the model, solves the Riccati equation, derives K and
/// certifies A − BK.
///
/// # Examples
///
/// ```
/// use lqr_rs::model::CartPole;
/// use lqr_rs::synthesis::{synthesize, SynthesisConfig};
///
/// let result = synthesize(&CartPole::default(), &SynthesisConfig::default()).unwrap();
/// assert_eq!(result.gain().matrix().shape(), &[1, 4]);
/// assert!(result.eigenvalues().iter().all(|l| l.re < 0.0));
/// ```
pub fn synthesize<L: LinearModel + ?Sized>(
    model: &L,
    config: &SynthesisConfig,
) -> Result<SynthesisResult> {
    let system = model.linearize()?;
    synthesize_state_space(&system, config)
}

/// Synthesize an LQR controller for an explicit (A, B) pair
///
/// # Errors
///
/// * `InvalidTolerance` - configured ε is not a positive finite number
/// * `DimensionMismatch` - configured Q or R do not match the model
/// * `SingularCostMatrix`, `AsymmetricCostMatrix`, `RiccatiUnsolvable` -
///   from [`solve_care`]
/// * `UnstableClosedLoop` - the certified closed loop has Re(λ) > ε
///
/// No partial result is returned on error.
pub fn synthesize_state_space(
    system: &StateSpace,
    config: &SynthesisConfig,
) -> Result<SynthesisResult> {
    config.validate()?;
    let (n, m) = (system.state_dim(), system.input_dim());
    let (q, r) = config.weights(n, m)?;

    let s = solve_care(system.a(), system.b(), &q, &r, config.solver_tolerance)?;
    let residual = care_residual(system.a(), system.b(), &q, &r, &s)?;
    let out = synthesize_gain(system.a(), system.b(), &r, &s, config.tolerance)?;

    log::debug!(
        "LQR synthesis done: n = {n}, m = {m}, residual = {residual:e}, stability = {:?}",
        out.stability
    );

    Ok(SynthesisResult {
        system: system.clone(),
        q,
        r,
        riccati: s,
        gain: Arc::new(out.gain),
        eigenvalues: out.eigenvalues,
        stability: out.stability,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CartPole;
    use ndarray::arr2;

    #[test]
    fn test_default_weights_are_identity() {
        let (q, r) = SynthesisConfig::default().weights(4, 1).unwrap();
        assert_eq!(q, Array2::eye(4));
        assert_eq!(r, Array2::eye(1));
    }

    #[test]
    fn test_weights_shape_checked() {
        let config = SynthesisConfig::default().with_q(Array2::eye(3));
        assert!(matches!(
            config.weights(4, 1),
            Err(LqrError::DimensionMismatch { what: "Q", .. })
        ));
        let result = synthesize(&CartPole::default(), &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_state_weights_diagonal() {
        let config = SynthesisConfig::default().with_state_weights(&[1.0, 2.0, 3.0]);
        let q = config.q.unwrap();
        assert_eq!(q[(1, 1)], 2.0);
        assert_eq!(q[(0, 1)], 0.0);
    }

    #[test]
    fn test_validate_tolerance() {
        assert!(SynthesisConfig::default().with_tolerance(-1.0).validate().is_err());
        assert!(SynthesisConfig::default()
            .with_solver_tolerance(0.0)
            .validate()
            .is_err());
        assert!(SynthesisConfig::default().with_tolerance(1e-9).validate().is_ok());
    }

    #[test]
    fn test_cartpole_result_is_consistent() {
        let result = synthesize(&CartPole::default(), &SynthesisConfig::default()).unwrap();
        assert_eq!(result.riccati().shape(), &[4, 4]);
        assert_eq!(result.eigenvalues().len(), 4);
        assert!(result.residual() < 1e-8);
        assert!(!result.stability().is_marginal());
        assert!(result.clone().require_asymptotic().is_ok());
    }

    #[test]
    fn test_zero_r_aborts_synthesis() {
        let config = SynthesisConfig::default().with_r(arr2(&[[0.0]]));
        let result = synthesize(&CartPole::default(), &config);
        assert!(matches!(result, Err(LqrError::SingularCostMatrix { .. })));
    }

    #[test]
    fn test_marginal_rejected_on_request() {
        // Closed-loop eigenvalues of the double integrator are −√3/2 ± i/2;
        // a generous ε classifies them as marginal.
        let system =
            StateSpace::new(arr2(&[[0.0, 1.0], [0.0, 0.0]]), arr2(&[[0.0], [1.0]])).unwrap();
        let config = SynthesisConfig::default().with_tolerance(0.9);
        let result = synthesize_state_space(&system, &config).unwrap();
        assert!(result.stability().is_marginal());
        assert!(matches!(
            result.require_asymptotic(),
            Err(LqrError::MarginalStability { .. })
        ));
    }
}
