//! Linear Models
//!
//! This module turns physical constants into the continuous-time
//! state-space pair (A, B) obtained by linearizing a plant about an
//! equilibrium point. The Riccati solver and the gain synthesizer only ever
//! see a [`StateSpace`]; the plant-specific formula lives behind the
//! [`LinearModel`] trait so any plant can supply its own.

use ndarray::{arr2, Array2};

use crate::error::{LqrError, Result};

/// Continuous-time linear model dx/dt = A·x + B·u.
///
/// A is n×n, B is n×m. Both are fixed once constructed; a change to the
/// underlying constants means building a new `StateSpace`.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSpace {
    a: Array2<f64>,
    b: Array2<f64>,
}

impl StateSpace {
    /// Validate and wrap a state matrix A (n×n) and an input matrix B (n×m).
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when A is not square, when B does not have n rows
    /// or has no columns, and `InvalidConstants` when an entry is not finite.
    ///
    /// # Examples
    ///
    /// ```
    /// use lqr_rs::model::StateSpace;
    /// use ndarray::arr2;
    ///
    /// let sys = StateSpace::new(arr2(&[[0.0, 1.0], [0.0, 0.0]]), arr2(&[[0.0], [1.0]])).unwrap();
    /// assert_eq!(sys.state_dim(), 2);
    /// assert_eq!(sys.input_dim(), 1);
    /// ```
    pub fn new(a: Array2<f64>, b: Array2<f64>) -> Result<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LqrError::shape("A", (n, n), a.shape()));
        }
        if b.nrows() != n || b.ncols() == 0 {
            return Err(LqrError::shape("B", (n, b.ncols().max(1)), b.shape()));
        }
        if let Some(bad) = a.iter().chain(b.iter()).find(|v| !v.is_finite()) {
            return Err(LqrError::InvalidConstants {
                name: "state-space entry",
                value: *bad,
            });
        }
        Ok(Self { a, b })
    }

    /// State matrix A.
    pub fn a(&self) -> &Array2<f64> {
        &self.a
    }

    /// Input matrix B.
    pub fn b(&self) -> &Array2<f64> {
        &self.b
    }

    /// Number of states n.
    pub fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    /// Number of inputs m.
    pub fn input_dim(&self) -> usize {
        self.b.ncols()
    }
}

/// Capability: "given constants, produce a linear model".
pub trait LinearModel {
    /// Linearize about the equilibrium this model describes.
    fn linearize(&self) -> Result<StateSpace>;

    fn state_dim(&self) -> usize;

    fn input_dim(&self) -> usize;
}

/// Physical constants of a cart carrying an inverted point-mass pendulum.
///
/// The default values are the canonical constants used throughout the
/// test suite: M = 1.0 kg, m = 0.1 kg, l = 0.5 m, g = 9.8 m/s².
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CartPole {
    /// Cart mass M [kg]
    pub cart_mass: f64,
    /// Pole (tip) mass m [kg]
    pub pole_mass: f64,
    /// Pole length l [m]
    pub pole_length: f64,
    /// Gravitational acceleration g [m/s²]
    pub gravity: f64,
}

impl Default for CartPole {
    fn default() -> Self {
        Self {
            cart_mass: 1.0,
            pole_mass: 0.1,
            pole_length: 0.5,
            gravity: 9.8,
        }
    }
}

impl CartPole {
    pub fn new(cart_mass: f64, pole_mass: f64, pole_length: f64, gravity: f64) -> Result<Self> {
        let cp = Self {
            cart_mass,
            pole_mass,
            pole_length,
            gravity,
        };
        cp.validate()?;
        Ok(cp)
    }

    /// Every constant must be finite and strictly positive.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("cart_mass", self.cart_mass),
            ("pole_mass", self.pole_mass),
            ("pole_length", self.pole_length),
            ("gravity", self.gravity),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(LqrError::InvalidConstants { name, value });
            }
        }
        Ok(())
    }
}

impl LinearModel for CartPole {
    /// Linearization about the upright equilibrium (zero angle, zero
    /// velocities). State ordering: position, velocity, angle, angular
    /// velocity; the single input is the horizontal force on the cart.
    ///
    /// ```text
    /// A = [[0, 1, 0,              0],
    ///      [0, 0, -m·g/M,         0],
    ///      [0, 0, 0,              1],
    ///      [0, 0, (M+m)·g/(l·M),  0]]
    /// B = [[0], [1/M], [0], [-1/(l·M)]]
    /// ```
    fn linearize(&self) -> Result<StateSpace> {
        self.validate()?;
        let CartPole {
            cart_mass: big_m,
            pole_mass: m,
            pole_length: l,
            gravity: g,
        } = *self;

        let a = arr2(&[
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, -(m * g) / big_m, 0.0],
            [0.0, 0.0, 0.0, 1.0],
            [0.0, 0.0, ((big_m + m) * g) / (l * big_m), 0.0],
        ]);
        let b = arr2(&[[0.0], [1.0 / big_m], [0.0], [-1.0 / (l * big_m)]]);
        StateSpace::new(a, b)
    }

    fn state_dim(&self) -> usize {
        4
    }

    fn input_dim(&self) -> usize {
        1
    }
}
