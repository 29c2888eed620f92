//! Forward and normalised inverse transform of a random real field.
//!
//! Run with
//!
//! cargo mpirun --np 4 --example forward_inverse
use num_complex::Complex;
use pencilfft::{initialize, Communicator, DistArray, Plan, Transform, TransposeMethod};
use rand::Rng;

fn main() {
    let universe = initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 4, "run with mpirun -np 4");

    let shape = [41, 21, 16];
    let mut plan: Plan<f64, 3> = Plan::new(
        &world,
        shape,
        [Transform::Fft, Transform::Fft, Transform::Rfft],
        &[2, 2],
        TransposeMethod::Pairwise,
    )
    .unwrap();
    assert_eq!(plan.scale_factor(), 41 * 21 * 16);

    let mut x: DistArray<f64, 3> = plan.allocate_input().unwrap();
    let mut rng = rand::thread_rng();
    for v in x.as_mut_slice() {
        *v = rng.gen::<f64>() - 0.5;
    }

    let y: DistArray<Complex<f64>, 3> = plan.forward(&x).unwrap();
    let x2: DistArray<f64, 3> = plan.inverse(&y).unwrap();

    let err = x
        .as_slice()
        .iter()
        .zip(x2.as_slice())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    assert!(err <= 1e-10, "round-trip error {err}");

    plan.topology().barrier();
    if world.rank() == 0 {
        println!("forward/inverse round trip on {shape:?}: max error {err:.3e}");
    }
}
