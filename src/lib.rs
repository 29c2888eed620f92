//! # pencilfft
//!
//! Fast Fourier transforms of N-dimensional arrays distributed across
//! MPI processes by pencil decomposition.
//!
//! A global grid is split along `M < N` of its axes over an
//! M-dimensional Cartesian process mesh, leaving at least one axis
//! fully local everywhere. Serial 1-d transforms run along the local
//! axis; global transpositions within per-axis sub-communicators rotate
//! the next axis into local, memory-fastest position until all axes are
//! transformed. `M = 1` is the classic slab decomposition, `M = 2` on a
//! three-dimensional grid the pencil decomposition proper.
//!
//! ## Example
//! Forward and normalised inverse real transform of a `16x21x64` grid
//! on a `2x2` pencil mesh (run with `cargo mpirun --np 4 ...`):
//! ```no_run
//! use num_complex::Complex;
//! use pencilfft::{initialize, DistArray, Plan, Transform, TransposeMethod};
//!
//! let universe = initialize().unwrap();
//! let mut plan: Plan<f64, 3> = Plan::new(
//!     &universe.world(),
//!     [16, 21, 64],
//!     [Transform::Fft, Transform::Fft, Transform::Rfft],
//!     &[2, 2],
//!     TransposeMethod::Pairwise,
//! )
//! .unwrap();
//! let mut x: DistArray<f64, 3> = plan.allocate_input().unwrap();
//! x.fill(1.0);
//! let y: DistArray<Complex<f64>, 3> = plan.forward(&x).unwrap();
//! let x2: DistArray<f64, 3> = plan.inverse(&y).unwrap();
//! ```
//!
//! ## Modules
//! - [`permutation`]: axis permutation algebra.
//! - [`topology`]: Cartesian process mesh and sub-communicators.
//! - [`pencil`]: pencil descriptors and local ownership ranges.
//! - [`array`]: process-local storage with global-index views.
//! - [`transpose`]: the collective pencil-to-pencil reshuffle.
//! - [`transform`]: the 1-d transform catalogue and lane kernels.
//! - [`plan`]: the stage compiler and forward/backward executor.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_arguments)]

pub mod array;
pub mod error;
pub mod pencil;
pub mod permutation;
pub mod plan;
pub mod topology;
pub mod transform;
pub mod transpose;
pub mod types;

pub use array::{DistArray, GlobalView, GlobalViewMut};
pub use error::{PencilError, Result};
pub use pencil::{balanced_range, Pencil};
pub use permutation::Permutation;
pub use plan::Plan;
pub use topology::{balanced_dims, ProcMesh, Topology};
pub use transform::{R2rKind, Transform};
pub use transpose::{transpose_into, TransposeMethod};
pub use types::{ElemKind, Element, FloatNum, Scalar};

// Re-export the message-passing entry points so downstream drivers need
// no direct `mpi` dependency for the common path.
pub use mpi::environment::Universe;
pub use mpi::initialize;
pub use mpi::traits::Communicator;
pub use num_complex::Complex;
