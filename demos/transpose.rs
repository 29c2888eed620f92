//! Chained pencil transpositions and their round trip.
//!
//! Run with
//!
//! cargo mpirun --np 4 --example transpose
use pencilfft::{
    initialize, transpose_into, Communicator, DistArray, Pencil, PencilError, Permutation,
    Topology, TransposeMethod,
};

fn value(idx: [usize; 3]) -> f64 {
    (idx[0] * 10_000 + idx[1] * 100 + idx[2]) as f64
}

fn filled(pen: &Pencil<3>) -> DistArray<f64, 3> {
    let mut a = DistArray::zeros(pen);
    let ranges = pen.local_ranges();
    let mut gv = a.global_view_mut();
    for i in ranges[0].clone() {
        for j in ranges[1].clone() {
            for k in ranges[2].clone() {
                *gv.get_mut([i, j, k]).unwrap() = value([i, j, k]);
            }
        }
    }
    a
}

fn main() {
    let universe = initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 4, "run with mpirun -np 4");
    let topo = Topology::new(&world, &[2, 2]).unwrap();
    let shape = [7, 8, 9];

    let pen1 = Pencil::new(topo.mesh(), shape, &[0, 1]).unwrap();
    let pen2 = pen1
        .derive(&[0, 2], Permutation::axis_fastest(1))
        .unwrap();
    let pen3 = pen1
        .derive(&[1, 2], Permutation::axis_fastest(0))
        .unwrap();

    let x1 = filled(&pen1);
    let mut x2 = DistArray::zeros(&pen2);
    let mut x3 = DistArray::zeros(&pen3);

    for method in [TransposeMethod::Pairwise, TransposeMethod::AllToAllV] {
        // forward chain: every hop lands the data where the target
        // pencil expects it
        transpose_into(&mut x2, &x1, &topo, method).unwrap();
        transpose_into(&mut x3, &x2, &topo, method).unwrap();
        let gv = x3.global_view();
        let r = pen3.local_ranges();
        for i in r[0].clone() {
            for j in r[1].clone() {
                for k in r[2].clone() {
                    assert_eq!(*gv.get([i, j, k]).unwrap(), value([i, j, k]));
                }
            }
        }
        // and back again
        let mut back2 = DistArray::zeros(&pen2);
        let mut back1 = DistArray::zeros(&pen1);
        transpose_into(&mut back2, &x3, &topo, method).unwrap();
        transpose_into(&mut back1, &back2, &topo, method).unwrap();
        assert_eq!(back1.as_slice(), x1.as_slice());
    }

    // two decomposition slots apart: rejected, nothing is exchanged
    let mut bad = DistArray::zeros(&pen3);
    match transpose_into(&mut bad, &x1, &topo, TransposeMethod::Pairwise) {
        Err(PencilError::Config(_)) => {}
        other => panic!("expected a configuration error, got {other:?}"),
    }

    topo.barrier();
    if world.rank() == 0 {
        println!("transpose round trips verified on 4 ranks");
    }
}
