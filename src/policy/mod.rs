//! Feedback Policy
//!
//! Per-step evaluation of a synthesized gain: u = −K·x, followed by the
//! mapping of u onto the plant's actuation alphabet. The gain lives in a
//! [`GainCell`] so that it can be shared read-only across evaluators and
//! replaced atomically when Q/R are re-tuned.

use std::sync::Arc;

use ndarray::Array1;
use parking_lot::RwLock;

use crate::error::{LqrError, Result};
use crate::gain::FeedbackGain;

/// Two-symbol actuation alphabet, `Low = 0`, `High = 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryAction {
    Low,
    High,
}

impl BinaryAction {
    /// Index in the plant's `{0, 1}` alphabet.
    pub fn index(self) -> usize {
        match self {
            BinaryAction::Low => 0,
            BinaryAction::High => 1,
        }
    }

    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(BinaryAction::Low),
            1 => Ok(BinaryAction::High),
            other => Err(LqrError::InvalidAction(other)),
        }
    }

    /// Sign of the corresponding actuation: −1 for `Low`, +1 for `High`.
    pub fn sign(self) -> f64 {
        match self {
            BinaryAction::Low => -1.0,
            BinaryAction::High => 1.0,
        }
    }
}

/// Maps the continuous control signal onto what a plant accepts.
pub trait ActionMap {
    type Action;

    fn map(&self, u: &Array1<f64>) -> Result<Self::Action>;
}

/// `High` if u ≥ 0, else `Low`.
///
/// A tie at exactly zero resolves to `High`. The rule depends only on the
/// sign of the scalar signal, never on Q or R.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinaryThreshold;

impl ActionMap for BinaryThreshold {
    type Action = BinaryAction;

    fn map(&self, u: &Array1<f64>) -> Result<BinaryAction> {
        if u.len() != 1 {
            return Err(LqrError::length("control signal", 1, u.len()));
        }
        Ok(if u[0] >= 0.0 {
            BinaryAction::High
        } else {
            BinaryAction::Low
        })
    }
}

/// Closed interval an actuator can realize.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActuatorLimits {
    low: f64,
    high: f64,
}

impl ActuatorLimits {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(LqrError::InvalidActuatorLimits { low, high });
        }
        Ok(Self { low, high })
    }

    /// Limits symmetric about zero, `[−bound, bound]`.
    pub fn symmetric(bound: f64) -> Result<Self> {
        Self::new(-bound.abs(), bound.abs())
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }
}

/// Continuous actuation: u is passed through unchanged, or clamped
/// elementwise when limits are configured. Clamping is never implicit.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PassThrough {
    pub clamp: Option<ActuatorLimits>,
}

impl PassThrough {
    pub fn clamped(limits: ActuatorLimits) -> Self {
        Self {
            clamp: Some(limits),
        }
    }
}

impl ActionMap for PassThrough {
    type Action = Array1<f64>;

    fn map(&self, u: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(match self.clamp {
            Some(limits) => u.mapv(|v| v.clamp(limits.low, limits.high)),
            None => u.clone(),
        })
    }
}

/// Shared, atomically replaceable gain.
///
/// Readers take an `Arc` snapshot; [`GainCell::publish`] swaps the whole
/// `Arc`, so no reader observes a partially updated matrix.
#[derive(Debug)]
pub struct GainCell {
    current: RwLock<Arc<FeedbackGain>>,
}

impl GainCell {
    pub fn new(gain: impl Into<Arc<FeedbackGain>>) -> Self {
        Self {
            current: RwLock::new(gain.into()),
        }
    }

    /// Snapshot of the gain in effect right now.
    pub fn load(&self) -> Arc<FeedbackGain> {
        Arc::clone(&self.current.read())
    }

    /// Replace the gain and return the previous one.
    ///
    /// The new gain must have the same shape; a plant's state and action
    /// dimensions do not change under re-tuning.
    pub fn publish(&self, gain: impl Into<Arc<FeedbackGain>>) -> Result<Arc<FeedbackGain>> {
        let gain = gain.into();
        let mut slot = self.current.write();
        if gain.matrix().shape() != slot.matrix().shape() {
            return Err(LqrError::shape(
                "published gain",
                (slot.input_dim(), slot.state_dim()),
                gain.matrix().shape(),
            ));
        }
        log::debug!("publishing new {}×{} feedback gain", gain.input_dim(), gain.state_dim());
        Ok(std::mem::replace(&mut *slot, gain))
    }
}

/// State-feedback policy: a shared gain plus an action map.
///
/// # Examples
///
/// ```
/// use lqr_rs::gain::FeedbackGain;
/// use lqr_rs::policy::{BinaryAction, BinaryThreshold, FeedbackPolicy};
/// use ndarray::{arr1, arr2};
///
/// let gain = FeedbackGain::new(arr2(&[[1.0, 0.0]])).unwrap();
/// let policy = FeedbackPolicy::new(gain, BinaryThreshold);
///
/// // u = −K·x = 0 resolves to High
/// assert_eq!(policy.evaluate(&arr1(&[0.0, 3.0])).unwrap(), BinaryAction::High);
/// assert_eq!(policy.evaluate(&arr1(&[1e-9, 0.0])).unwrap(), BinaryAction::Low);
/// ```
#[derive(Debug, Clone)]
pub struct FeedbackPolicy<M> {
    gain: Arc<GainCell>,
    map: M,
}

impl<M: ActionMap> FeedbackPolicy<M> {
    pub fn new(gain: impl Into<Arc<FeedbackGain>>, map: M) -> Self {
        Self {
            gain: Arc::new(GainCell::new(gain)),
            map,
        }
    }

    /// Build a policy reading from an existing shared cell.
    pub fn with_cell(gain: Arc<GainCell>, map: M) -> Self {
        Self { gain, map }
    }

    /// Handle to the shared gain, e.g. to publish a re-tuned one.
    pub fn cell(&self) -> &Arc<GainCell> {
        &self.gain
    }

    pub fn action_map(&self) -> &M {
        &self.map
    }

    pub fn state_dim(&self) -> usize {
        self.gain.load().state_dim()
    }

    /// Continuous control signal u = −K·x.
    pub fn control(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        self.gain.load().control(x)
    }

    /// Control signal mapped onto the plant's action type.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when `x` does not have n entries, or when the
    /// action map needs a scalar signal and K has more than one row.
    pub fn evaluate(&self, x: &Array1<f64>) -> Result<M::Action> {
        let u = self.control(x)?;
        self.map.map(&u)
    }
}
