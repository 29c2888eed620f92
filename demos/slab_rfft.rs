//! Slab-decomposed real transform, normalised by hand through the
//! unnormalised backward direction.
//!
//! Run with any process count, e.g.
//!
//! cargo mpirun --np 4 --example slab_rfft
use num_complex::Complex;
use pencilfft::{initialize, Communicator, DistArray, Plan, Transform, TransposeMethod};

fn main() {
    let universe = initialize().unwrap();
    let world = universe.world();
    let nproc = world.size() as usize;

    let shape = [64, 40, 32];
    let mut plan: Plan<f64, 3> = Plan::new(
        &world,
        shape,
        [Transform::Fft, Transform::Fft, Transform::Rfft],
        &[nproc],
        TransposeMethod::AllToAllV,
    )
    .unwrap();

    let mut x: DistArray<f64, 3> = plan.allocate_input().unwrap();
    let ranges = plan.input_range();
    {
        let mut gv = x.global_view_mut();
        for i in ranges[0].clone() {
            for j in ranges[1].clone() {
                for k in ranges[2].clone() {
                    *gv.get_mut([i, j, k]).unwrap() =
                        (i as f64).sin() + (j as f64).cos() + 0.1 * k as f64;
                }
            }
        }
    }

    let y: DistArray<Complex<f64>, 3> = plan.forward(&x).unwrap();
    let mut x2: DistArray<f64, 3> = plan.allocate_input().unwrap();
    plan.apply_backward(&mut x2, &y).unwrap();
    // rfft . brfft is the identity times the transformed volume
    x2.scale_by(1.0 / (64.0 * 40.0 * 32.0));

    let err = x
        .as_slice()
        .iter()
        .zip(x2.as_slice())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    assert!(err <= 1e-10, "round-trip error {err}");

    plan.topology().barrier();
    if world.rank() == 0 {
        println!("slab rfft/brfft identity on {nproc} ranks: max error {err:.3e}");
    }
}
