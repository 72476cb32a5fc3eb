//! lqr-rs: continuous-time LQR synthesis and state feedback
//!
//! Designs a linear-quadratic regulator for a plant linearized about an
//! equilibrium and evaluates it as a state-feedback policy. The gain is
//! synthesized once from the continuous algebraic Riccati equation and then
//! reused, read-only, at every control step.
//!
//! # Organization
//!
//! - `model`: physical constants → linear state-space model (A, B)
//! - `riccati`: CARE solver via the stable invariant subspace of the Hamiltonian
//! - `gain`: K = R⁻¹BᵗS and closed-loop stability certification
//! - `policy`: u = −K·x mapped onto the plant's actuation alphabet
//! - `synthesis`: one-shot orchestration and its configuration
//! - `plant`: plant interface plus linearized and nonlinear cart-pole plants
//! - `driver`: episode loop and the fallback controller
//!
//! # Example
//!
//! ```
//! use lqr_rs::model::CartPole;
//! use lqr_rs::policy::{BinaryAction, BinaryThreshold};
//! use lqr_rs::synthesis::{synthesize, SynthesisConfig};
//! use ndarray::arr1;
//!
//! let result = synthesize(&CartPole::default(), &SynthesisConfig::default()).unwrap();
//! let policy = result.policy(BinaryThreshold);
//!
//! // Pole leaning right: push the cart right
//! let action = policy.evaluate(&arr1(&[0.0, 0.0, 0.05, 0.0])).unwrap();
//! assert_eq!(action, BinaryAction::High);
//! ```

pub mod driver;
pub mod error;
pub mod gain;
pub mod model;
pub mod plant;
pub mod policy;
pub mod riccati;
pub mod synthesis;

pub use error::{LqrError, Result};
pub use gain::{FeedbackGain, Stability};
pub use model::{CartPole, LinearModel, StateSpace};
pub use synthesis::{synthesize, SynthesisConfig, SynthesisResult};
