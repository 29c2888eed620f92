//! Pencil descriptors.
//!
//! A pencil is one distribution of an N-dimensional global grid over the
//! process mesh: `M` logical axes are partitioned, one per mesh axis,
//! and the remaining axes are fully local on every process. The memory
//! permutation records which logical axis varies fastest in the local
//! buffer, so a plan can keep the transform axis contiguous.
//!
//! Pencils are purely geometric. Element types are carried by
//! [`DistArray`](crate::array::DistArray) and the plan stages, and all
//! ownership ranges derive from the deterministic balanced partition
//! below, identical on every process.
use crate::error::{PencilError, Result};
use crate::permutation::Permutation;
use crate::topology::ProcMesh;
use std::ops::Range;

/// Balanced partition of a length-`len` axis over `nproc` processes:
/// the share of process `p`, exact cover, sizes differing by at most 1.
#[must_use]
pub fn balanced_range(len: usize, nproc: usize, p: usize) -> Range<usize> {
    debug_assert!(p < nproc);
    (p * len) / nproc..((p + 1) * len) / nproc
}

/// One pencil distribution of an N-dimensional grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pencil<const N: usize> {
    shape: [usize; N],
    decomp: Vec<usize>,
    perm: Permutation<N>,
    mesh: ProcMesh,
}

impl<const N: usize> Pencil<N> {
    /// Pencil with identity memory order.
    ///
    /// `decomp[k]` names the logical axis partitioned by mesh axis `k`.
    ///
    /// # Errors
    /// `Config` on duplicate or out-of-range decomposed axes, or when
    /// the mesh dimensionality leaves no local axis.
    pub fn new(mesh: &ProcMesh, shape: [usize; N], decomp: &[usize]) -> Result<Self> {
        Self::with_perm(mesh, shape, decomp, Permutation::identity())
    }

    /// Pencil with an explicit memory permutation.
    pub fn with_perm(
        mesh: &ProcMesh,
        shape: [usize; N],
        decomp: &[usize],
        perm: Permutation<N>,
    ) -> Result<Self> {
        if decomp.len() != mesh.ndim() {
            return Err(PencilError::Config(format!(
                "{} decomposed axes for a {}-dimensional process mesh",
                decomp.len(),
                mesh.ndim()
            )));
        }
        if decomp.len() > N.saturating_sub(1) {
            return Err(PencilError::Config(format!(
                "{} decomposed axes leave no local axis in {N} dimensions",
                decomp.len()
            )));
        }
        for (k, &axis) in decomp.iter().enumerate() {
            if axis >= N {
                return Err(PencilError::Config(format!(
                    "decomposed axis {axis} out of range for {N} dimensions"
                )));
            }
            if decomp[..k].contains(&axis) {
                return Err(PencilError::Config(format!(
                    "axis {axis} decomposed more than once in {decomp:?}"
                )));
            }
        }
        Ok(Self {
            shape,
            decomp: decomp.to_vec(),
            perm,
            mesh: mesh.clone(),
        })
    }

    /// Pencil sharing this mesh with a different set of decomposed axes
    /// and memory order.
    pub fn derive(&self, decomp: &[usize], perm: Permutation<N>) -> Result<Self> {
        Self::with_perm(&self.mesh, self.shape, decomp, perm)
    }

    /// Copy of this pencil with the global length of `axis` replaced.
    #[must_use]
    pub fn with_axis_len(&self, axis: usize, len: usize) -> Self {
        let mut out = self.clone();
        out.shape[axis] = len;
        out
    }

    /// Copy of this pencil with a different memory permutation.
    #[must_use]
    pub fn with_permutation(&self, perm: Permutation<N>) -> Self {
        let mut out = self.clone();
        out.perm = perm;
        out
    }

    /// Global shape in logical axis order.
    #[must_use]
    pub fn global_shape(&self) -> [usize; N] {
        self.shape
    }

    /// Total number of grid points.
    #[must_use]
    pub fn global_len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Memory permutation.
    #[must_use]
    pub fn perm(&self) -> Permutation<N> {
        self.perm
    }

    /// Owning mesh geometry.
    #[must_use]
    pub fn mesh(&self) -> &ProcMesh {
        &self.mesh
    }

    /// Decomposed logical axis per mesh slot.
    #[must_use]
    pub fn decomp(&self) -> &[usize] {
        &self.decomp
    }

    /// Whether `axis` is partitioned across the mesh.
    #[must_use]
    pub fn is_decomposed(&self, axis: usize) -> bool {
        self.decomp.contains(&axis)
    }

    /// Mesh slot partitioning `axis`, if any.
    #[must_use]
    pub fn decomp_slot(&self, axis: usize) -> Option<usize> {
        self.decomp.iter().position(|&a| a == axis)
    }

    /// Global index range owned along `axis` by the rank at `coords`.
    #[must_use]
    pub fn local_range_of(&self, coords: &[usize], axis: usize) -> Range<usize> {
        match self.decomp_slot(axis) {
            Some(k) => balanced_range(self.shape[axis], self.mesh.dims()[k], coords[k]),
            None => 0..self.shape[axis],
        }
    }

    /// Global index range owned locally along `axis`.
    #[must_use]
    pub fn local_range(&self, axis: usize) -> Range<usize> {
        self.local_range_of(self.mesh.coords(), axis)
    }

    /// All local ranges in logical order.
    #[must_use]
    pub fn local_ranges(&self) -> [Range<usize>; N] {
        std::array::from_fn(|axis| self.local_range(axis))
    }

    /// First owned global index per axis.
    #[must_use]
    pub fn local_start(&self) -> [usize; N] {
        std::array::from_fn(|axis| self.local_range(axis).start)
    }

    /// Local axis lengths in logical order.
    #[must_use]
    pub fn local_shape(&self) -> [usize; N] {
        std::array::from_fn(|axis| self.local_range(axis).len())
    }

    /// Local axis lengths of the rank at `coords`, logical order.
    #[must_use]
    pub fn local_shape_of(&self, coords: &[usize]) -> [usize; N] {
        std::array::from_fn(|axis| self.local_range_of(coords, axis).len())
    }

    /// Number of locally owned grid points.
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local_shape().iter().product()
    }

    /// Local shape in memory order (slowest to fastest).
    #[must_use]
    pub fn mem_shape(&self) -> [usize; N] {
        self.perm.apply(self.local_shape())
    }

    /// Whether both pencils describe the same grid over the same mesh,
    /// regardless of memory order.
    #[must_use]
    pub fn same_distribution(&self, other: &Self) -> bool {
        self.shape == other.shape && self.decomp == other.decomp && self.mesh == other.mesh
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn balanced_partition_covers_exactly() {
        for &(len, nproc) in &[(7usize, 4usize), (16, 2), (21, 2), (41, 4), (5, 7)] {
            let mut total = 0;
            let mut prev_end = 0;
            for p in 0..nproc {
                let r = balanced_range(len, nproc, p);
                assert_eq!(r.start, prev_end);
                prev_end = r.end;
                total += r.len();
            }
            assert_eq!(prev_end, len);
            assert_eq!(total, len);
        }
    }

    #[test]
    fn every_global_index_has_one_owner() {
        let shape = [16usize, 21, 41];
        let dims = vec![2usize, 2];
        let size: usize = dims.iter().product();
        for axis in 0..3 {
            for g in 0..shape[axis] {
                let mut owners = 0;
                for rank in 0..size {
                    let mesh = ProcMesh::new(dims.clone(), rank).unwrap();
                    let pen = Pencil::new(&mesh, shape, &[1, 2]).unwrap();
                    if pen.local_range(axis).contains(&g) {
                        owners += 1;
                    }
                }
                // local axes are owned by every rank, decomposed axes by
                // exactly one row or column of the mesh
                let expected = match axis {
                    0 => size,
                    _ => size / 2,
                };
                assert_eq!(owners, expected, "axis {axis} index {g}");
            }
        }
    }

    #[test]
    fn local_and_mem_shapes_follow_the_permutation() {
        let mesh = ProcMesh::new(vec![2, 2], 3).unwrap();
        let pen = Pencil::with_perm(
            &mesh,
            [16, 21, 41],
            &[1, 2],
            Permutation::new([1, 2, 0]).unwrap(),
        )
        .unwrap();
        // coords (1, 1): axis 1 -> [10, 21), axis 2 -> [20, 41)
        assert_eq!(pen.local_range(0), 0..16);
        assert_eq!(pen.local_range(1), 10..21);
        assert_eq!(pen.local_range(2), 20..41);
        assert_eq!(pen.local_shape(), [16, 11, 21]);
        assert_eq!(pen.mem_shape(), [11, 21, 16]);
        assert_eq!(pen.local_len(), 16 * 11 * 21);
    }

    #[test]
    fn invalid_decompositions_are_rejected() {
        let mesh = ProcMesh::new(vec![2, 2], 0).unwrap();
        assert!(Pencil::new(&mesh, [8, 8, 8], &[1, 1]).is_err());
        assert!(Pencil::new(&mesh, [8, 8, 8], &[1, 3]).is_err());
        assert!(Pencil::new(&mesh, [8, 8, 8], &[1]).is_err());
        assert!(Pencil::<2>::new(&mesh, [8, 8], &[0, 1]).is_err());
    }
}
