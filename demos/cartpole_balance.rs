//! Balancing the nonlinear cart-pole with a bang-bang LQR policy
//!
//! Synthesizes K once for the canonical constants with Q = I, R = I, then
//! runs a handful of 500-step episodes from random near-upright starts.
//! Pass a seed as the first argument to change the starts.

use lqr_rs::driver::{run_episode, Controller};
use lqr_rs::model::CartPole;
use lqr_rs::plant::{CartPolePlant, InitialState};
use lqr_rs::policy::BinaryThreshold;
use lqr_rs::synthesis::{synthesize, SynthesisConfig};

fn main() {
    println!("=== Cart-Pole Balancing Demonstration ===\n");

    let seed: u64 = std::env::args().nth(1).and_then(|s| s.parse().ok()).unwrap_or(0);
    let model = CartPole::default();
    println!("Constants: {:?}", model);

    let result = synthesize(&model, &SynthesisConfig::default());
    match &result {
        Ok(r) => {
            println!("\nK = {}", r.gain().matrix());
            println!("Closed-loop eigenvalues:");
            for l in r.eigenvalues().iter() {
                println!("  λ = {:.4} {:+.4}i", l.re, l.im);
            }
            println!("Stability: {:?}", r.stability());
        }
        Err(e) => println!("\nSynthesis failed: {e}"),
    }

    let mut controller = Controller::from_synthesis(result, BinaryThreshold, seed);
    let mut plant = match CartPolePlant::new(model, InitialState::uniform(0.05, seed)) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid plant: {e}");
            return;
        }
    };

    println!("\n{:>8} {:>6} {:>11} {:>12}", "episode", "steps", "terminated", "max ‖x‖");
    for ep in 0..5 {
        match run_episode(&mut plant, &mut controller, 500) {
            Ok(episode) => println!(
                "{:>8} {:>6} {:>11} {:>12.4}",
                ep,
                episode.steps(),
                episode.terminated,
                episode.max_norm()
            ),
            Err(e) => println!("{ep:>8} error: {e}"),
        }
    }
}
