//! Control Loop Driver
//!
//! Sequential orchestration of one plant: reset, then evaluate the policy
//! and step the plant until it terminates or the step budget runs out.
//! The driver, not the synthesis core, decides what to do when synthesis
//! fails; [`Controller::from_synthesis`] falls back to random actuation.

use ndarray::Array1;
use ndarray_linalg::Norm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Result;
use crate::plant::Plant;
use crate::policy::{ActionMap, BinaryAction, FeedbackPolicy};
use crate::synthesis::SynthesisResult;

/// Anything that picks an action from an observed state.
pub trait Policy {
    type Action;

    fn act(&mut self, x: &Array1<f64>) -> Result<Self::Action>;
}

impl<M: ActionMap> Policy for FeedbackPolicy<M> {
    type Action = M::Action;

    fn act(&mut self, x: &Array1<f64>) -> Result<M::Action> {
        self.evaluate(x)
    }
}

/// Uniformly random binary actuation, seeded for reproducibility.
#[derive(Clone, Debug)]
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Policy for RandomPolicy {
    type Action = BinaryAction;

    fn act(&mut self, _x: &Array1<f64>) -> Result<BinaryAction> {
        Ok(if self.rng.gen_bool(0.5) {
            BinaryAction::High
        } else {
            BinaryAction::Low
        })
    }
}

/// What actually drives a binary-actuated plant.
#[derive(Debug)]
pub enum Controller<M> {
    Feedback(FeedbackPolicy<M>),
    Random(RandomPolicy),
}

impl<M: ActionMap<Action = BinaryAction>> Controller<M> {
    /// Feedback control when synthesis succeeded, random actuation
    /// otherwise. The synthesis error is logged, not returned.
    pub fn from_synthesis(result: Result<SynthesisResult>, map: M, seed: u64) -> Self {
        match result {
            Ok(result) => Controller::Feedback(result.policy(map)),
            Err(e) => {
                log::warn!("LQR synthesis failed ({e}); falling back to random actuation");
                Controller::Random(RandomPolicy::new(seed))
            }
        }
    }

    pub fn is_feedback(&self) -> bool {
        matches!(self, Controller::Feedback(_))
    }
}

impl<M: ActionMap<Action = BinaryAction>> Policy for Controller<M> {
    type Action = BinaryAction;

    fn act(&mut self, x: &Array1<f64>) -> Result<BinaryAction> {
        match self {
            Controller::Feedback(policy) => policy.act(x),
            Controller::Random(policy) => policy.act(x),
        }
    }
}

/// Trajectory of one episode, initial state included.
#[derive(Clone, Debug, PartialEq)]
pub struct Episode {
    pub states: Vec<Array1<f64>>,
    pub terminated: bool,
}

impl Episode {
    /// Number of plant steps taken.
    pub fn steps(&self) -> usize {
        self.states.len().saturating_sub(1)
    }

    pub fn final_state(&self) -> Option<&Array1<f64>> {
        self.states.last()
    }

    /// Largest Euclidean state norm along the trajectory.
    pub fn max_norm(&self) -> f64 {
        self.states.iter().map(|x| x.norm_l2()).fold(0.0, f64::max)
    }
}

/// Upper bound on the trajectory storage reserved before the first step.
const PREALLOCATED_STEPS: usize = 4096;

/// Run one episode of at most `max_steps` steps.
///
/// Stops early on the first transition that reports `terminated`. Errors
/// from the policy or the plant abort the episode.
pub fn run_episode<P, C>(plant: &mut P, policy: &mut C, max_steps: usize) -> Result<Episode>
where
    P: Plant + ?Sized,
    C: Policy<Action = P::Action> + ?Sized,
{
    let mut x = plant.reset();
    let mut states = Vec::with_capacity(max_steps.min(PREALLOCATED_STEPS) + 1);
    states.push(x.clone());

    for step in 0..max_steps {
        let action = policy.act(&x)?;
        let transition = plant.step(&action)?;
        log::trace!("step {step}: x = {}", transition.state);
        x = transition.state;
        states.push(x.clone());
        if transition.terminated {
            log::debug!("episode terminated after {} steps", step + 1);
            return Ok(Episode {
                states,
                terminated: true,
            });
        }
    }

    Ok(Episode {
        states,
        terminated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LqrError;
    use crate::model::CartPole;
    use crate::plant::{CartPolePlant, InitialState};
    use crate::policy::BinaryThreshold;
    use crate::synthesis::{synthesize, SynthesisConfig};
    use ndarray::{arr1, arr2};

    #[test]
    fn test_random_policy_is_seeded() {
        let x = Array1::zeros(4);
        let mut a = RandomPolicy::new(11);
        let mut b = RandomPolicy::new(11);
        let seq_a: Vec<_> = (0..32).map(|_| a.act(&x).unwrap()).collect();
        let seq_b: Vec<_> = (0..32).map(|_| b.act(&x).unwrap()).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.contains(&BinaryAction::High));
        assert!(seq_a.contains(&BinaryAction::Low));
    }

    #[test]
    fn test_failed_synthesis_falls_back_to_random() {
        let config = SynthesisConfig::default().with_r(arr2(&[[0.0]]));
        let result = synthesize(&CartPole::default(), &config);
        assert!(matches!(result, Err(LqrError::SingularCostMatrix { .. })));
        let controller = Controller::from_synthesis(result, BinaryThreshold, 3);
        assert!(!controller.is_feedback());
    }

    #[test]
    fn test_successful_synthesis_gives_feedback() {
        let result = synthesize(&CartPole::default(), &SynthesisConfig::default());
        let controller = Controller::from_synthesis(result, BinaryThreshold, 3);
        assert!(controller.is_feedback());
    }

    #[test]
    fn test_episode_respects_step_budget() {
        let result = synthesize(&CartPole::default(), &SynthesisConfig::default()).unwrap();
        let mut policy = result.policy(BinaryThreshold);
        let x0 = arr1(&[0.01, 0.0, 0.01, 0.0]);
        let mut plant =
            CartPolePlant::new(CartPole::default(), InitialState::Fixed(x0.clone())).unwrap();

        let episode = run_episode(&mut plant, &mut policy, 25).unwrap();
        assert_eq!(episode.steps(), 25);
        assert_eq!(episode.states[0], x0);
        assert!(!episode.terminated);
    }

    #[test]
    fn test_episode_stops_on_termination() {
        let x0 = arr1(&[0.0, 0.0, 0.6, 0.0]);
        let mut plant = CartPolePlant::new(CartPole::default(), InitialState::Fixed(x0)).unwrap();
        let mut policy = RandomPolicy::new(0);
        let episode = run_episode(&mut plant, &mut policy, 100).unwrap();
        assert!(episode.terminated);
        assert_eq!(episode.steps(), 1);
    }

    #[test]
    fn test_unbounded_step_budget_stops_on_termination() {
        let x0 = arr1(&[0.0, 0.0, 0.6, 0.0]);
        let mut plant = CartPolePlant::new(CartPole::default(), InitialState::Fixed(x0)).unwrap();
        let mut policy = RandomPolicy::new(0);
        let episode = run_episode(&mut plant, &mut policy, usize::MAX).unwrap();
        assert!(episode.terminated);
        assert_eq!(episode.steps(), 1);
    }

    #[test]
    fn test_max_norm_over_trajectory() {
        let episode = Episode {
            states: vec![arr1(&[3.0, 4.0]), arr1(&[0.0, 1.0])],
            terminated: false,
        };
        assert_eq!(episode.max_norm(), 5.0);
        assert_eq!(episode.steps(), 1);
    }

    #[test]
    fn test_empty_episode() {
        let initial = InitialState::Fixed(Array1::zeros(4));
        let mut plant = CartPolePlant::new(CartPole::default(), initial).unwrap();
        let mut policy = RandomPolicy::new(0);
        let episode = run_episode(&mut plant, &mut policy, 0).unwrap();
        assert_eq!(episode.steps(), 0);
        assert_eq!(episode.max_norm(), 0.0);
        assert_eq!(episode.final_state(), Some(&Array1::zeros(4)));
    }
}
