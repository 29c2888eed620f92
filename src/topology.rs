//! Cartesian process mesh and its communicators.
//!
//! `ProcMesh` carries the pure geometry of the M-dimensional process
//! grid: dimensions, the Cartesian coordinates of each rank (row-major
//! decoding) and the rank lists of the per-axis sub-groups. It holds no
//! communicator, so pencils and unit tests can reason about ownership
//! ranges without a running message-passing environment.
//!
//! `Topology` pairs a `ProcMesh` with live communicators: a duplicate of
//! the caller's communicator plus one sub-communicator per mesh axis,
//! split so that the rank inside sub-communicator `k` equals the local
//! Cartesian coordinate along axis `k`. That rank/coordinate agreement
//! lets both sides of a transposition derive identical block layouts
//! without exchanging any sizes.
use crate::error::{PencilError, Result};
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::*;

/// Pure geometry of an M-dimensional Cartesian process grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcMesh {
    dims: Vec<usize>,
    coords: Vec<usize>,
    rank: usize,
    size: usize,
}

impl ProcMesh {
    /// Mesh of the given dimensions, seen from `rank`.
    ///
    /// # Errors
    /// `Config` if `rank` does not fit the grid or a dimension is zero.
    pub fn new(dims: Vec<usize>, rank: usize) -> Result<Self> {
        if dims.is_empty() || dims.iter().any(|&d| d == 0) {
            return Err(PencilError::Config(format!(
                "invalid process grid {dims:?}"
            )));
        }
        let size = dims.iter().product();
        if rank >= size {
            return Err(PencilError::Config(format!(
                "rank {rank} outside process grid {dims:?}"
            )));
        }
        let coords = Self::decode(&dims, rank);
        Ok(Self {
            dims,
            coords,
            rank,
            size,
        })
    }

    fn decode(dims: &[usize], rank: usize) -> Vec<usize> {
        let mut coords = vec![0; dims.len()];
        let mut rest = rank;
        for (c, &d) in coords.iter_mut().zip(dims.iter()).rev() {
            *c = rest % d;
            rest /= d;
        }
        coords
    }

    /// Number of mesh dimensions (the `M` of the decomposition).
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Grid dimensions.
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Cartesian coordinates of the local rank.
    #[must_use]
    pub fn coords(&self) -> &[usize] {
        &self.coords
    }

    /// Local rank in the flat communicator.
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of processes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Cartesian coordinates of an arbitrary rank.
    #[must_use]
    pub fn coords_of(&self, rank: usize) -> Vec<usize> {
        Self::decode(&self.dims, rank)
    }

    /// Flat rank of the given Cartesian coordinates.
    #[must_use]
    pub fn rank_of(&self, coords: &[usize]) -> usize {
        debug_assert_eq!(coords.len(), self.dims.len());
        let mut rank = 0;
        for (&c, &d) in coords.iter().zip(self.dims.iter()) {
            rank = rank * d + c;
        }
        rank
    }

    /// Local coordinates with the entry along axis `k` replaced by `c`.
    #[must_use]
    pub fn coords_with(&self, k: usize, c: usize) -> Vec<usize> {
        let mut coords = self.coords.clone();
        coords[k] = c;
        coords
    }

    /// Ordered world ranks of the sub-group along mesh axis `k`, i.e. the
    /// processes sharing all coordinates of the local rank except `k`.
    #[must_use]
    pub fn axis_group_ranks(&self, k: usize) -> Vec<usize> {
        (0..self.dims[k])
            .map(|c| self.rank_of(&self.coords_with(k, c)))
            .collect()
    }

    /// Color identifying the sub-group along axis `k`: the linear index
    /// of the local coordinates with axis `k` removed.
    fn axis_group_color(&self, k: usize) -> usize {
        let mut color = 0;
        for (j, (&c, &d)) in self.coords.iter().zip(self.dims.iter()).enumerate() {
            if j != k {
                color = color * d + c;
            }
        }
        color
    }
}

/// Balanced factorisation of `size` into `m` grid dimensions, largest
/// first, in the manner of `MPI_Dims_create`.
#[must_use]
pub fn balanced_dims(size: usize, m: usize) -> Vec<usize> {
    let mut dims = vec![1usize; m.max(1)];
    let mut factors = Vec::new();
    let mut rest = size.max(1);
    let mut f = 2;
    while f * f <= rest {
        while rest % f == 0 {
            factors.push(f);
            rest /= f;
        }
        f += 1;
    }
    if rest > 1 {
        factors.push(rest);
    }
    // Largest factors first onto the currently smallest dimension.
    factors.sort_unstable_by(|a, b| b.cmp(a));
    for f in factors {
        let target = dims
            .iter()
            .enumerate()
            .min_by_key(|(_, &d)| d)
            .map(|(i, _)| i)
            .unwrap();
        dims[target] *= f;
    }
    dims.sort_unstable_by(|a, b| b.cmp(a));
    dims
}

/// Process mesh together with its live communicators.
pub struct Topology {
    mesh: ProcMesh,
    comm: SimpleCommunicator,
    subcomms: Vec<SimpleCommunicator>,
}

impl Topology {
    /// Collective construction of the Cartesian arrangement over `comm`.
    ///
    /// # Errors
    /// `Config` if the grid does not factor the communicator size,
    /// `Comm` if a sub-communicator split fails.
    pub fn new<C: Communicator>(comm: &C, dims: &[usize]) -> Result<Self> {
        let size = comm.size() as usize;
        let prod: usize = dims.iter().product();
        if prod != size {
            return Err(PencilError::Config(format!(
                "process grid {dims:?} does not factor communicator size {size}"
            )));
        }
        let rank = comm.rank() as usize;
        let mesh = ProcMesh::new(dims.to_vec(), rank)?;
        let dup = comm.duplicate();
        let mut subcomms = Vec::with_capacity(mesh.ndim());
        for k in 0..mesh.ndim() {
            let color = Color::with_value(mesh.axis_group_color(k) as i32);
            let key = mesh.coords()[k] as i32;
            let sub = dup.split_by_color_with_key(color, key).ok_or_else(|| {
                PencilError::Comm(format!("sub-communicator split failed on axis {k}"))
            })?;
            subcomms.push(sub);
        }
        Ok(Self {
            mesh,
            comm: dup,
            subcomms,
        })
    }

    /// Mesh geometry.
    #[must_use]
    pub fn mesh(&self) -> &ProcMesh {
        &self.mesh
    }

    /// The duplicated flat communicator spanning the whole mesh.
    #[must_use]
    pub fn comm(&self) -> &SimpleCommunicator {
        &self.comm
    }

    /// Sub-communicator of mesh axis `k`. Its local rank equals
    /// `mesh().coords()[k]`.
    #[must_use]
    pub fn sub_comm(&self, k: usize) -> &SimpleCommunicator {
        &self.subcomms[k]
    }

    /// Synchronise all processes of the mesh.
    pub fn barrier(&self) {
        self.comm.barrier();
    }
}

impl std::fmt::Debug for Topology {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Topology").field("mesh", &self.mesh).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rank_coord_round_trip() {
        let mesh = ProcMesh::new(vec![2, 3], 5).unwrap();
        assert_eq!(mesh.coords(), &[1, 2]);
        for r in 0..6 {
            let c = mesh.coords_of(r);
            assert_eq!(mesh.rank_of(&c), r);
        }
    }

    #[test]
    fn axis_groups_cover_the_mesh() {
        let mesh = ProcMesh::new(vec![2, 3], 4).unwrap();
        // coords (1, 1): row group varies axis 0, column group axis 1
        assert_eq!(mesh.axis_group_ranks(0), vec![1, 4]);
        assert_eq!(mesh.axis_group_ranks(1), vec![3, 4, 5]);
        let sum: usize = (0..2).map(|k| mesh.axis_group_ranks(k).len()).sum();
        assert_eq!(sum, 2 + 3);
    }

    #[test]
    fn group_colors_partition_ranks() {
        let mesh0 = ProcMesh::new(vec![2, 3], 0).unwrap();
        for k in 0..2 {
            for r in 0..6 {
                let other = ProcMesh::new(vec![2, 3], r).unwrap();
                let same_group = mesh0.axis_group_ranks(k).contains(&r);
                assert_eq!(
                    other.axis_group_color(k) == mesh0.axis_group_color(k),
                    same_group
                );
            }
        }
    }

    #[test]
    fn mismatched_grid_is_rejected() {
        assert!(ProcMesh::new(vec![2, 0], 0).is_err());
        assert!(ProcMesh::new(vec![2, 2], 4).is_err());
    }

    #[test]
    fn balanced_dims_factorises() {
        assert_eq!(balanced_dims(8, 2), vec![4, 2]);
        assert_eq!(balanced_dims(12, 2), vec![4, 3]);
        assert_eq!(balanced_dims(7, 2), vec![7, 1]);
        assert_eq!(balanced_dims(16, 1), vec![16]);
        let d = balanced_dims(60, 3);
        assert_eq!(d.iter().product::<usize>(), 60);
        assert!(d.windows(2).all(|w| w[0] >= w[1]));
    }
}
