//! End-to-end closed-loop runs: synthesize once, then drive linearized and
//! nonlinear cart-pole plants for 500 steps from near-equilibrium starts.

use lqr_rs::driver::{run_episode, Controller, Episode};
use lqr_rs::model::{CartPole, LinearModel};
use lqr_rs::plant::{BangBang, CartPolePlant, DirectForce, InitialState, LinearizedPlant};
use lqr_rs::policy::{ActuatorLimits, BinaryThreshold, PassThrough};
use lqr_rs::synthesis::{synthesize, SynthesisConfig, SynthesisResult};
use ndarray::{arr1, Array1};
use ndarray_linalg::Norm;

const STEPS: usize = 500;
const SEEDS: std::ops::Range<u64> = 0..40;

fn canonical() -> SynthesisResult {
    synthesize(&CartPole::default(), &SynthesisConfig::default()).unwrap()
}

fn cartpole_bounds() -> Array1<f64> {
    arr1(&[2.4, f64::INFINITY, 12.0_f64.to_radians(), f64::INFINITY])
}

fn assert_balanced(episode: &Episode, max_norm: f64) {
    assert!(!episode.terminated, "terminated after {} steps", episode.steps());
    assert_eq!(episode.steps(), STEPS);
    assert!(
        episode.max_norm() < max_norm,
        "max state norm {} exceeds {max_norm}",
        episode.max_norm()
    );
}

// ===== Linearized Plant =====

#[test]
fn test_continuous_actuation_decays() {
    let result = canonical();
    let system = CartPole::default().linearize().unwrap();

    for seed in SEEDS {
        let initial = InitialState::uniform(0.05, seed);
        let mut plant = LinearizedPlant::new(system.clone(), DirectForce, initial).unwrap();
        let mut policy = result.policy(PassThrough::default());
        let episode = run_episode(&mut plant, &mut policy, STEPS).unwrap();

        assert_balanced(&episode, 1.0);
        let initial = episode.states[0].norm_l2();
        let last = episode.final_state().unwrap().norm_l2();
        assert!(last <= 0.05 * initial, "seed {seed}: {initial} -> {last}");
    }
}

#[test]
fn test_clamped_continuous_actuation_decays() {
    let result = canonical();
    let system = CartPole::default().linearize().unwrap();
    // Saturates for the first steps of this start
    let clamp = PassThrough::clamped(ActuatorLimits::symmetric(0.5).unwrap());

    let initial = InitialState::Fixed(arr1(&[0.05, -0.05, 0.05, -0.05]));
    let mut plant = LinearizedPlant::new(system, DirectForce, initial).unwrap();
    let mut policy = result.policy(clamp);
    let episode = run_episode(&mut plant, &mut policy, STEPS).unwrap();

    assert_balanced(&episode, 1.0);
    assert!(episode.final_state().unwrap().norm_l2() < 0.05 * episode.states[0].norm_l2());
}

#[test]
fn test_bang_bang_linearized_never_terminates() {
    let result = canonical();
    let system = CartPole::default().linearize().unwrap();

    for seed in SEEDS {
        let initial = InitialState::uniform(0.05, seed);
        let mut plant = LinearizedPlant::new(system.clone(), BangBang::default(), initial)
            .unwrap()
            .with_termination_bounds(cartpole_bounds())
            .unwrap();
        let mut policy = result.policy(BinaryThreshold);
        let episode = run_episode(&mut plant, &mut policy, STEPS).unwrap();
        assert_balanced(&episode, 2.0);
    }
}

// ===== Nonlinear Plant =====

#[test]
fn test_bang_bang_nonlinear_never_terminates() {
    let result = canonical();

    for seed in SEEDS {
        let initial = InitialState::uniform(0.05, seed);
        let mut plant = CartPolePlant::new(CartPole::default(), initial).unwrap();
        let mut controller = Controller::from_synthesis(Ok(result.clone()), BinaryThreshold, seed);
        assert!(controller.is_feedback());
        let episode = run_episode(&mut plant, &mut controller, STEPS).unwrap();
        assert_balanced(&episode, 2.0);
    }
}

#[test]
fn test_large_angle_ends_episode_early() {
    // 0.6 rad is already past the 12° termination threshold
    let result = canonical();
    let initial = InitialState::Fixed(arr1(&[0.0, 0.0, 0.6, 0.0]));
    let mut plant = CartPolePlant::new(CartPole::default(), initial).unwrap();
    let mut policy = result.policy(BinaryThreshold);
    let episode = run_episode(&mut plant, &mut policy, STEPS).unwrap();

    assert!(episode.terminated);
    assert!(episode.steps() < STEPS);
}

#[test]
fn test_random_fallback_still_runs_episode() {
    let config = SynthesisConfig::default().with_tolerance(-1.0);
    let result = synthesize(&CartPole::default(), &config);
    let mut controller = Controller::from_synthesis(result, BinaryThreshold, 5);
    assert!(!controller.is_feedback());

    let initial = InitialState::uniform(0.05, 5);
    let mut plant = CartPolePlant::new(CartPole::default(), initial).unwrap();
    let episode = run_episode(&mut plant, &mut controller, STEPS).unwrap();
    assert!(episode.steps() >= 1);
    assert!(episode.steps() <= STEPS);
}
