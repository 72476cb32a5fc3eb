//! Demonstration of the CARE solver on small systems
//!
//! Solves AᵗS + SA − SBR⁻¹BᵗS + Q = 0 for a double integrator and shows
//! how the solver reports an unstabilizable pair and a singular R.

use lqr_rs::gain::synthesize_gain;
use lqr_rs::riccati::{care_residual, is_stabilizable, solve_care};
use ndarray::{arr2, Array2};

fn main() {
    println!("=== Riccati Solver Demonstration ===\n");

    // Double integrator: ẍ = u
    let a = arr2(&[[0.0, 1.0], [0.0, 0.0]]);
    let b = arr2(&[[0.0], [1.0]]);
    let q = Array2::eye(2);
    let r = Array2::eye(1);

    println!("A = \n{}", a);
    println!("B = \n{}", b);

    match solve_care(&a, &b, &q, &r, None) {
        Ok(s) => {
            println!("\nS = \n{:.6}", s);
            println!("Expected [[√3, 1], [1, √3]]");
            if let Ok(res) = care_residual(&a, &b, &q, &r, &s) {
                println!("Residual ‖·‖_F = {:e}", res);
            }
            match synthesize_gain(&a, &b, &r, &s, None) {
                Ok(out) => {
                    println!("K = {}", out.gain.matrix());
                    for l in out.eigenvalues.iter() {
                        println!("  λ = {:.4} {:+.4}i", l.re, l.im);
                    }
                }
                Err(e) => println!("Gain synthesis failed: {e}"),
            }
        }
        Err(e) => println!("Solver failed: {e}"),
    }

    // Unstable mode that the input cannot reach
    println!("\n--- Unstabilizable pair ---");
    let a_bad = arr2(&[[1.0, 0.0], [0.0, -1.0]]);
    println!("stabilizable: {:?}", is_stabilizable(&a_bad, &b, None));
    println!("solve_care: {:?}", solve_care(&a_bad, &b, &q, &r, None).map(|_| ()));

    println!("\n--- Singular R ---");
    let r_zero = Array2::zeros((1, 1));
    println!("solve_care: {:?}", solve_care(&a, &b, &q, &r_zero, None).map(|_| ()));
}
