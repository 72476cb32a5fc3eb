//! Plants
//!
//! The interface a control loop drives (`reset`, `step`) and two reference
//! implementations: the linearized model integrated explicitly, and the
//! nonlinear cart-pole whose linearization is [`CartPole::linearize`].
//!
//! [`CartPole::linearize`]: crate::model::LinearModel::linearize

use ndarray::{arr1, Array1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LqrError, Result};
use crate::model::{CartPole, StateSpace};
use crate::policy::BinaryAction;

/// Result of advancing a plant by one step.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Array1<f64>,
    pub terminated: bool,
}

/// A controllable plant with full state observation.
pub trait Plant {
    /// Exactly what the plant's actuator accepts.
    type Action;

    fn state_dim(&self) -> usize;

    /// Start a new trajectory and return the initial state x₀.
    fn reset(&mut self) -> Array1<f64>;

    /// Apply one action and advance by one time step.
    fn step(&mut self, action: &Self::Action) -> Result<Transition>;
}

/// How `reset` chooses x₀.
#[derive(Clone, Debug)]
pub enum InitialState {
    Fixed(Array1<f64>),
    /// Every component drawn from U(−half_width, half_width).
    Uniform { half_width: f64, rng: StdRng },
}

impl InitialState {
    pub fn uniform(half_width: f64, seed: u64) -> Self {
        InitialState::Uniform {
            half_width: half_width.abs(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample(&mut self, n: usize) -> Array1<f64> {
        match self {
            InitialState::Fixed(x0) => x0.clone(),
            InitialState::Uniform { half_width, rng } => {
                let w = *half_width;
                if w == 0.0 {
                    return Array1::zeros(n);
                }
                Array1::from_iter((0..n).map(|_| rng.gen_range(-w..=w)))
            }
        }
    }

    fn check(&self, n: usize) -> Result<()> {
        match self {
            InitialState::Fixed(x0) if x0.len() != n => {
                Err(LqrError::length("initial state", n, x0.len()))
            }
            InitialState::Uniform { half_width, .. } if !half_width.is_finite() => {
                Err(LqrError::InvalidConstants {
                    name: "initial half-width",
                    value: *half_width,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Converts a plant action into the force vector u applied through B.
pub trait Actuator {
    type Action;

    fn force(&self, action: &Self::Action, inputs: usize) -> Result<Array1<f64>>;
}

/// Two-symbol actuator: `Low` pushes with −magnitude, `High` with
/// +magnitude on the single input channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BangBang {
    pub magnitude: f64,
}

impl Default for BangBang {
    fn default() -> Self {
        Self { magnitude: 10.0 }
    }
}

impl Actuator for BangBang {
    type Action = BinaryAction;

    fn force(&self, action: &BinaryAction, inputs: usize) -> Result<Array1<f64>> {
        if inputs != 1 {
            return Err(LqrError::length("bang-bang input channels", 1, inputs));
        }
        Ok(arr1(&[action.sign() * self.magnitude]))
    }
}

/// Continuous actuator: the action is the force vector itself.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DirectForce;

impl Actuator for DirectForce {
    type Action = Array1<f64>;

    fn force(&self, action: &Array1<f64>, inputs: usize) -> Result<Array1<f64>> {
        if action.len() != inputs {
            return Err(LqrError::length("force vector", inputs, action.len()));
        }
        Ok(action.clone())
    }
}

/// dx/dt = A·x + B·u integrated with explicit Euler steps of `dt`.
///
/// Termination is optional: with bounds configured, a step that leaves
/// |xᵢ| ≤ boundᵢ for any i reports `terminated`.
#[derive(Clone, Debug)]
pub struct LinearizedPlant<Act> {
    system: StateSpace,
    actuator: Act,
    dt: f64,
    initial: InitialState,
    bounds: Option<Array1<f64>>,
    state: Array1<f64>,
}

impl<Act: Actuator> LinearizedPlant<Act> {
    pub const DEFAULT_DT: f64 = 0.02;

    pub fn new(system: StateSpace, actuator: Act, initial: InitialState) -> Result<Self> {
        let n = system.state_dim();
        initial.check(n)?;
        Ok(Self {
            system,
            actuator,
            dt: Self::DEFAULT_DT,
            initial,
            bounds: None,
            state: Array1::zeros(n),
        })
    }

    pub fn with_dt(mut self, dt: f64) -> Result<Self> {
        self.dt = positive("dt", dt)?;
        Ok(self)
    }

    /// Per-component bounds; +∞ leaves a component unbounded.
    pub fn with_termination_bounds(mut self, bounds: Array1<f64>) -> Result<Self> {
        let n = self.system.state_dim();
        if bounds.len() != n {
            return Err(LqrError::length("termination bounds", n, bounds.len()));
        }
        if let Some(&bad) = bounds.iter().find(|b| b.is_nan() || **b <= 0.0) {
            return Err(LqrError::InvalidConstants {
                name: "termination bound",
                value: bad,
            });
        }
        self.bounds = Some(bounds);
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        positive("dt", self.dt)?;
        if let Some(bounds) = &self.bounds {
            if let Some(&bad) = bounds.iter().find(|b| b.is_nan() || **b <= 0.0) {
                return Err(LqrError::InvalidConstants {
                    name: "termination bound",
                    value: bad,
                });
            }
        }
        self.initial.check(self.system.state_dim())
    }

    pub fn state(&self) -> &Array1<f64> {
        &self.state
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }
}

impl<Act: Actuator> Plant for LinearizedPlant<Act> {
    type Action = Act::Action;

    fn state_dim(&self) -> usize {
        self.system.state_dim()
    }

    fn reset(&mut self) -> Array1<f64> {
        self.state = self.initial.sample(self.system.state_dim());
        self.state.clone()
    }

    fn step(&mut self, action: &Act::Action) -> Result<Transition> {
        let u = self.actuator.force(action, self.system.input_dim())?;
        let dx = self.system.a().dot(&self.state) + self.system.b().dot(&u);
        self.state.scaled_add(self.dt, &dx);

        let terminated = match &self.bounds {
            Some(bounds) => self
                .state
                .iter()
                .zip(bounds.iter())
                .any(|(x, b)| x.abs() > *b || !x.is_finite()),
            None => self.state.iter().any(|x| !x.is_finite()),
        };
        Ok(Transition {
            state: self.state.clone(),
            terminated,
        })
    }
}

/// Nonlinear cart with an inverted point-mass pendulum.
///
/// State: position x, velocity ẋ, angle θ (from upright), angular velocity
/// θ̇. Equations of motion for horizontal force F:
///
/// ```text
/// ẍ = (F + m·l·θ̇²·sinθ − m·g·sinθ·cosθ) / (M + m − m·cos²θ)
/// θ̈ = (g·sinθ − ẍ·cosθ) / l
/// ```
///
/// which linearize to the (A, B) of [`CartPole`]. Integration is explicit
/// Euler with `dt`, actuation is bang-bang, and an episode ends once
/// |x| > `x_limit` or |θ| > `angle_limit`.
#[derive(Clone, Debug)]
pub struct CartPolePlant {
    constants: CartPole,
    force_magnitude: f64,
    dt: f64,
    x_limit: f64,
    angle_limit: f64,
    initial: InitialState,
    state: Array1<f64>,
}

impl CartPolePlant {
    pub const DEFAULT_FORCE: f64 = 10.0;
    pub const DEFAULT_DT: f64 = 0.02;
    pub const DEFAULT_X_LIMIT: f64 = 2.4;
    /// 12° in radians.
    pub const DEFAULT_ANGLE_LIMIT: f64 = 12.0 * std::f64::consts::PI / 180.0;

    pub fn new(constants: CartPole, initial: InitialState) -> Result<Self> {
        constants.validate()?;
        initial.check(4)?;
        Ok(Self {
            constants,
            force_magnitude: Self::DEFAULT_FORCE,
            dt: Self::DEFAULT_DT,
            x_limit: Self::DEFAULT_X_LIMIT,
            angle_limit: Self::DEFAULT_ANGLE_LIMIT,
            initial,
            state: Array1::zeros(4),
        })
    }

    pub fn with_force_magnitude(mut self, force: f64) -> Result<Self> {
        self.force_magnitude = positive("force magnitude", force)?;
        Ok(self)
    }

    pub fn with_dt(mut self, dt: f64) -> Result<Self> {
        self.dt = positive("dt", dt)?;
        Ok(self)
    }

    /// Termination thresholds on |x| [m] and |θ| [rad].
    pub fn with_limits(mut self, x_limit: f64, angle_limit: f64) -> Result<Self> {
        self.x_limit = positive("x limit", x_limit)?;
        self.angle_limit = positive("angle limit", angle_limit)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.constants.validate()?;
        positive("force magnitude", self.force_magnitude)?;
        positive("dt", self.dt)?;
        positive("x limit", self.x_limit)?;
        positive("angle limit", self.angle_limit)?;
        self.initial.check(4)
    }

    pub fn constants(&self) -> &CartPole {
        &self.constants
    }

    pub fn force_magnitude(&self) -> f64 {
        self.force_magnitude
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn x_limit(&self) -> f64 {
        self.x_limit
    }

    pub fn angle_limit(&self) -> f64 {
        self.angle_limit
    }

    pub fn state(&self) -> &Array1<f64> {
        &self.state
    }

    fn derivatives(&self, force: f64) -> Array1<f64> {
        let CartPole {
            cart_mass: big_m,
            pole_mass: m,
            pole_length: l,
            gravity: g,
        } = self.constants;
        let (theta, omega) = (self.state[2], self.state[3]);
        let (sin, cos) = theta.sin_cos();

        let x_acc =
            (force + m * l * omega * omega * sin - m * g * sin * cos) / (big_m + m - m * cos * cos);
        let theta_acc = (g * sin - x_acc * cos) / l;
        arr1(&[self.state[1], x_acc, omega, theta_acc])
    }
}

impl Plant for CartPolePlant {
    type Action = BinaryAction;

    fn state_dim(&self) -> usize {
        4
    }

    fn reset(&mut self) -> Array1<f64> {
        self.state = self.initial.sample(4);
        self.state.clone()
    }

    fn step(&mut self, action: &BinaryAction) -> Result<Transition> {
        let dx = self.derivatives(action.sign() * self.force_magnitude);
        self.state.scaled_add(self.dt, &dx);

        let terminated = self.state[0].abs() > self.x_limit
            || self.state[2].abs() > self.angle_limit
            || self.state.iter().any(|v| !v.is_finite());
        Ok(Transition {
            state: self.state.clone(),
            terminated,
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(LqrError::InvalidConstants { name, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearModel;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linearized_step_is_euler() {
        let system = CartPole::default().linearize().unwrap();
        let x0 = arr1(&[0.0, 0.0, 0.1, 0.0]);
        let mut plant = LinearizedPlant::new(system, DirectForce, InitialState::Fixed(x0)).unwrap();
        plant.reset();

        let t = plant.step(&arr1(&[1.0])).unwrap();
        // ẋ = [0, −0.098 + 1, 0, 2.156 − 2]
        assert_abs_diff_eq!(t.state[1], 0.02 * 0.902, epsilon = 1e-12);
        assert_abs_diff_eq!(t.state[2], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(t.state[3], 0.02 * 0.156, epsilon = 1e-12);
        assert!(!t.terminated);
    }

    #[test]
    fn test_bang_bang_force_sign() {
        let act = BangBang::default();
        assert_eq!(act.force(&BinaryAction::High, 1).unwrap(), arr1(&[10.0]));
        assert_eq!(act.force(&BinaryAction::Low, 1).unwrap(), arr1(&[-10.0]));
        assert!(act.force(&BinaryAction::Low, 2).is_err());
    }

    #[test]
    fn test_direct_force_length_checked() {
        let system = CartPole::default().linearize().unwrap();
        let initial = InitialState::Fixed(Array1::zeros(4));
        let mut plant = LinearizedPlant::new(system, DirectForce, initial).unwrap();
        plant.reset();
        assert!(plant.step(&arr1(&[1.0, 2.0])).is_err());
    }

    #[test]
    fn test_termination_bounds() {
        let system = CartPole::default().linearize().unwrap();
        let x0 = arr1(&[2.39, 1.0, 0.0, 0.0]);
        let mut plant = LinearizedPlant::new(system, BangBang::default(), InitialState::Fixed(x0))
            .unwrap()
            .with_termination_bounds(arr1(&[2.4, f64::INFINITY, 0.21, f64::INFINITY]))
            .unwrap();
        plant.reset();
        let t = plant.step(&BinaryAction::High).unwrap();
        assert!(t.terminated);
    }

    #[test]
    fn test_fixed_initial_state_shape_checked() {
        let system = CartPole::default().linearize().unwrap();
        let short = InitialState::Fixed(Array1::zeros(3));
        assert!(LinearizedPlant::new(system, DirectForce, short).is_err());
        let short = InitialState::Fixed(Array1::zeros(2));
        assert!(CartPolePlant::new(CartPole::default(), short).is_err());
    }

    #[test]
    fn test_uniform_reset_is_seeded_and_bounded() {
        let mut a = InitialState::uniform(0.05, 7);
        let mut b = InitialState::uniform(0.05, 7);
        for _ in 0..20 {
            let xa = a.sample(4);
            assert_eq!(xa, b.sample(4));
            assert!(xa.iter().all(|v| v.abs() <= 0.05));
        }
    }

    #[test]
    fn test_cartpole_upright_is_equilibrium_without_net_force() {
        let initial = InitialState::Fixed(Array1::zeros(4));
        let mut plant = CartPolePlant::new(CartPole::default(), initial).unwrap();
        plant.reset();
        let d = plant.derivatives(0.0);
        assert_eq!(d, Array1::zeros(4));
    }

    #[test]
    fn test_cartpole_matches_linearization_near_upright() {
        let cp = CartPole::default();
        let system = cp.linearize().unwrap();
        let x0 = arr1(&[0.0, 0.0, 1e-4, 0.0]);
        let mut plant = CartPolePlant::new(cp, InitialState::Fixed(x0.clone())).unwrap();
        plant.reset();

        let nonlinear = plant.derivatives(0.5);
        let linear = system.a().dot(&x0) + system.b().dot(&arr1(&[0.5]));
        for (n, l) in nonlinear.iter().zip(linear.iter()) {
            assert_abs_diff_eq!(n, l, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_cartpole_terminates_past_angle_limit() {
        let x0 = arr1(&[0.0, 0.0, 0.6, 0.0]);
        let mut plant = CartPolePlant::new(CartPole::default(), InitialState::Fixed(x0)).unwrap();
        plant.reset();
        assert!(plant.step(&BinaryAction::High).unwrap().terminated);
    }

    #[test]
    fn test_cartpole_settings_are_checked() {
        let plant =
            || CartPolePlant::new(CartPole::default(), InitialState::Fixed(Array1::zeros(4)));
        for bad in [0.0, -0.02, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                plant().unwrap().with_dt(bad),
                Err(LqrError::InvalidConstants { name: "dt", .. })
            ));
            assert!(plant().unwrap().with_force_magnitude(bad).is_err());
            assert!(plant().unwrap().with_limits(bad, 0.2).is_err());
            assert!(plant().unwrap().with_limits(2.4, bad).is_err());
        }

        let tuned = plant()
            .unwrap()
            .with_dt(0.01)
            .unwrap()
            .with_force_magnitude(5.0)
            .unwrap()
            .with_limits(1.0, 0.5)
            .unwrap();
        assert!(tuned.validate().is_ok());
        assert_eq!((tuned.dt(), tuned.force_magnitude()), (0.01, 5.0));
        assert_eq!((tuned.x_limit(), tuned.angle_limit()), (1.0, 0.5));
    }

    #[test]
    fn test_cartpole_wider_angle_limit_keeps_running() {
        let x0 = arr1(&[0.0, 0.0, 0.6, 0.0]);
        let mut plant = CartPolePlant::new(CartPole::default(), InitialState::Fixed(x0))
            .unwrap()
            .with_limits(2.4, 1.0)
            .unwrap();
        plant.reset();
        assert!(!plant.step(&BinaryAction::High).unwrap().terminated);
    }

    #[test]
    fn test_linearized_bounds_are_checked() {
        let system = CartPole::default().linearize().unwrap();
        let plant = LinearizedPlant::new(system, DirectForce, InitialState::Fixed(Array1::zeros(4)))
            .unwrap();
        assert!(plant.validate().is_ok());
        let bounds = arr1(&[2.4, f64::NAN, 0.2, f64::INFINITY]);
        assert!(plant.clone().with_termination_bounds(bounds).is_err());
        let bounds = arr1(&[2.4, 0.0, 0.2, f64::INFINITY]);
        assert!(plant.clone().with_termination_bounds(bounds).is_err());
        assert!(plant.with_dt(-1.0).is_err());
    }
}
