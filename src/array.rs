//! Process-local storage of a distributed field.
//!
//! A `DistArray` owns the dense, contiguous block of one pencil: the
//! locally owned grid points laid out row-major in the pencil's memory
//! order (the permutation's last axis varies fastest). Optional extra
//! component axes (never decomposed, never permuted) are stored
//! slowest-varying, so every grid block stays contiguous and transform
//! lanes remain cache-friendly.
//!
//! The recommended high-throughput pattern is to iterate [`view`] in
//! memory order and recover the logical coordinate through the pencil's
//! permutation; [`global_view`] is the convenience adapter for
//! addressing by global indices, restricted to the locally owned range.
//!
//! [`view`]: DistArray::view
//! [`global_view`]: DistArray::global_view
use crate::error::{PencilError, Result};
use crate::pencil::Pencil;
use crate::types::Scalar;
use ndarray::{ArrayView, ArrayViewMut, IxDyn};
use std::ops::{AddAssign, MulAssign, SubAssign};

/// Dense local block of a pencil-distributed N-dimensional field.
#[derive(Debug, Clone)]
pub struct DistArray<T, const N: usize> {
    data: Vec<T>,
    pencil: Pencil<N>,
    extra: Vec<usize>,
}

impl<T: Scalar, const N: usize> DistArray<T, N> {
    /// Zero-initialised array on `pencil`.
    #[must_use]
    pub fn zeros(pencil: &Pencil<N>) -> Self {
        Self::zeros_with_extra(pencil, &[])
    }

    /// Zero-initialised array with extra component axes.
    #[must_use]
    pub fn zeros_with_extra(pencil: &Pencil<N>, extra: &[usize]) -> Self {
        let len = pencil.local_len() * extra.iter().product::<usize>().max(1);
        Self {
            data: vec![T::zero(); len],
            pencil: pencil.clone(),
            extra: extra.to_vec(),
        }
    }

    /// Wrap an existing buffer.
    ///
    /// # Errors
    /// `Shape` if the buffer length does not match the pencil.
    pub fn from_vec(pencil: &Pencil<N>, data: Vec<T>) -> Result<Self> {
        let expected = pencil.local_len();
        if data.len() != expected {
            return Err(PencilError::Shape(format!(
                "buffer of {} elements for a pencil holding {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            pencil: pencil.clone(),
            extra: Vec::new(),
        })
    }

    /// The owning pencil.
    #[must_use]
    pub fn pencil(&self) -> &Pencil<N> {
        &self.pencil
    }

    /// Extra component axes.
    #[must_use]
    pub fn extra(&self) -> &[usize] {
        &self.extra
    }

    /// Flattened length of the extra axes (1 when there are none).
    #[must_use]
    pub fn extra_len(&self) -> usize {
        self.extra.iter().product::<usize>().max(1)
    }

    /// Total number of local elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the local block is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical local shape: extra axes followed by the per-axis lengths
    /// of the owned grid block in logical order.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        let mut s = self.extra.clone();
        s.extend_from_slice(&self.pencil.local_shape());
        s
    }

    /// Raw local storage in memory order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable raw local storage in memory order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    fn mem_dims(&self) -> Vec<usize> {
        let mut s = self.extra.clone();
        s.extend_from_slice(&self.pencil.mem_shape());
        s
    }

    fn logical_axes(&self) -> Vec<usize> {
        let e = self.extra.len();
        let inv = self.pencil.perm().inverse().as_array();
        let mut axes: Vec<usize> = (0..e).collect();
        axes.extend(inv.iter().map(|&p| e + p));
        axes
    }

    /// View in memory order: extra axes first (slowest), then the grid
    /// axes from slowest to fastest as given by the pencil permutation.
    #[must_use]
    pub fn view(&self) -> ArrayView<'_, T, IxDyn> {
        ArrayView::from_shape(IxDyn(&self.mem_dims()), &self.data).unwrap()
    }

    /// Mutable view in memory order.
    pub fn view_mut(&mut self) -> ArrayViewMut<'_, T, IxDyn> {
        let dims = self.mem_dims();
        ArrayViewMut::from_shape(IxDyn(&dims), &mut self.data).unwrap()
    }

    /// View with the grid axes permuted back to logical order (strided).
    #[must_use]
    pub fn logical_view(&self) -> ArrayView<'_, T, IxDyn> {
        let axes = self.logical_axes();
        self.view().permuted_axes(axes)
    }

    /// Mutable view in logical order.
    pub fn logical_view_mut(&mut self) -> ArrayViewMut<'_, T, IxDyn> {
        let axes = self.logical_axes();
        self.view_mut().permuted_axes(axes)
    }

    /// Fresh zeroed array on the same pencil with the same extra axes.
    #[must_use]
    pub fn similar(&self) -> Self {
        Self::zeros_with_extra(&self.pencil, &self.extra)
    }

    /// Set every element.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Copy all elements from a layout-identical array.
    ///
    /// # Errors
    /// `Shape` if the pencils or extra axes differ.
    pub fn assign(&mut self, other: &Self) -> Result<()> {
        if self.pencil != other.pencil || self.extra != other.extra {
            return Err(PencilError::Shape(
                "assign between arrays on different pencils".into(),
            ));
        }
        self.data.copy_from_slice(&other.data);
        Ok(())
    }

    /// Multiply every element by a scalar factor.
    pub fn scale_by<F>(&mut self, factor: F)
    where
        T: MulAssign<F>,
        F: Copy,
    {
        for v in &mut self.data {
            *v *= factor;
        }
    }

    fn offset_of(&self, idx: [usize; N], comp: usize) -> Result<usize> {
        if comp >= self.extra_len() {
            return Err(PencilError::Index(format!(
                "component {comp} outside the {} extra elements",
                self.extra_len()
            )));
        }
        let start = self.pencil.local_start();
        let perm = self.pencil.perm().as_array();
        let mem_shape = self.pencil.mem_shape();
        let mut offset = 0;
        for (p, &axis) in perm.iter().enumerate() {
            let range = self.pencil.local_range(axis);
            if !range.contains(&idx[axis]) {
                return Err(PencilError::Index(format!(
                    "global index {} on axis {axis} outside local range {range:?}",
                    idx[axis]
                )));
            }
            offset = offset * mem_shape[p] + (idx[axis] - start[axis]);
        }
        Ok(comp * self.pencil.local_len() + offset)
    }

    /// Global-index accessor over the locally owned block.
    #[must_use]
    pub fn global_view(&self) -> GlobalView<'_, T, N> {
        GlobalView { array: self }
    }

    /// Mutable global-index accessor over the locally owned block.
    pub fn global_view_mut(&mut self) -> GlobalViewMut<'_, T, N> {
        GlobalViewMut { array: self }
    }
}

impl<T: Scalar + AddAssign, const N: usize> AddAssign<&DistArray<T, N>> for DistArray<T, N> {
    fn add_assign(&mut self, rhs: &DistArray<T, N>) {
        assert_eq!(self.pencil, rhs.pencil, "pencil mismatch in +=");
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += *b;
        }
    }
}

impl<T: Scalar + SubAssign, const N: usize> SubAssign<&DistArray<T, N>> for DistArray<T, N> {
    fn sub_assign(&mut self, rhs: &DistArray<T, N>) {
        assert_eq!(self.pencil, rhs.pencil, "pencil mismatch in -=");
        for (a, b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a -= *b;
        }
    }
}

/// Read adapter addressing a [`DistArray`] by global logical indices.
pub struct GlobalView<'a, T, const N: usize> {
    array: &'a DistArray<T, N>,
}

impl<T: Scalar, const N: usize> GlobalView<'_, T, N> {
    /// Element at a global index (first component when extra axes are
    /// present).
    ///
    /// # Errors
    /// `Index` outside the locally owned range.
    pub fn get(&self, idx: [usize; N]) -> Result<&T> {
        self.get_at(idx, 0)
    }

    /// Element at a global index and flattened component index.
    pub fn get_at(&self, idx: [usize; N], comp: usize) -> Result<&T> {
        let offset = self.array.offset_of(idx, comp)?;
        Ok(&self.array.data[offset])
    }
}

/// Write adapter addressing a [`DistArray`] by global logical indices.
pub struct GlobalViewMut<'a, T, const N: usize> {
    array: &'a mut DistArray<T, N>,
}

impl<T: Scalar, const N: usize> GlobalViewMut<'_, T, N> {
    /// Mutable element at a global index.
    ///
    /// # Errors
    /// `Index` outside the locally owned range.
    pub fn get_mut(&mut self, idx: [usize; N]) -> Result<&mut T> {
        self.get_at_mut(idx, 0)
    }

    /// Mutable element at a global index and flattened component index.
    pub fn get_at_mut(&mut self, idx: [usize; N], comp: usize) -> Result<&mut T> {
        let offset = self.array.offset_of(idx, comp)?;
        Ok(&mut self.array.data[offset])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::permutation::Permutation;
    use crate::topology::ProcMesh;

    fn pencil_2x2() -> Pencil<3> {
        let mesh = ProcMesh::new(vec![2, 2], 3).unwrap();
        Pencil::with_perm(
            &mesh,
            [4, 6, 8],
            &[1, 2],
            Permutation::new([1, 2, 0]).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn wrapping_checks_length() {
        let pen = pencil_2x2();
        assert_eq!(pen.local_len(), 4 * 3 * 4);
        assert!(DistArray::from_vec(&pen, vec![0.0f64; 48]).is_ok());
        assert!(DistArray::from_vec(&pen, vec![0.0f64; 47]).is_err());
    }

    #[test]
    fn global_view_translates_and_checks() {
        let pen = pencil_2x2();
        let mut a = DistArray::<f64, 3>::zeros(&pen);
        // coords (1, 1): axis 1 owns [3, 6), axis 2 owns [4, 8)
        *a.global_view_mut().get_mut([2, 3, 4]).unwrap() = 7.5;
        assert_eq!(*a.global_view().get([2, 3, 4]).unwrap(), 7.5);
        // first element in memory order is the block origin
        assert_eq!(a.as_slice()[0], 7.5);
        assert!(a.global_view().get([2, 2, 4]).is_err());
        assert!(a.global_view().get([4, 3, 4]).is_err());
    }

    #[test]
    fn views_agree_with_global_indexing() {
        let pen = pencil_2x2();
        let mut a = DistArray::<f64, 3>::zeros(&pen);
        let start = pen.local_start();
        {
            let mut gv = a.global_view_mut();
            for i in pen.local_range(0) {
                for j in pen.local_range(1) {
                    for k in pen.local_range(2) {
                        *gv.get_mut([i, j, k]).unwrap() = (i * 100 + j * 10 + k) as f64;
                    }
                }
            }
        }
        // memory order is (axis1, axis2, axis0)
        let v = a.view();
        assert_eq!(v.shape(), &[3, 4, 4]);
        assert_eq!(v[[0, 0, 2]], (2. * 100.) + (start[1] * 10 + start[2]) as f64);
        let lv = a.logical_view();
        assert_eq!(lv.shape(), &[4, 3, 4]);
        assert_eq!(lv[[2, 0, 1]], 200. + (start[1] * 10) as f64 + (start[2] + 1) as f64);
    }

    #[test]
    fn extra_axes_extend_the_buffer() {
        let pen = pencil_2x2();
        let a = DistArray::<f64, 3>::zeros_with_extra(&pen, &[3]);
        assert_eq!(a.len(), 3 * pen.local_len());
        assert_eq!(a.view().shape(), &[3, 3, 4, 4]);
        assert_eq!(a.shape(), vec![3, 4, 3, 4]);
    }

    #[test]
    fn arithmetic_and_scaling() {
        let pen = pencil_2x2();
        let mut a = DistArray::<f64, 3>::zeros(&pen);
        let mut b = a.similar();
        a.fill(2.0);
        b.fill(0.5);
        a += &b;
        a.scale_by(2.0);
        assert!(a.as_slice().iter().all(|&v| v == 5.0));
        a -= &b;
        assert!(a.as_slice().iter().all(|&v| v == 4.5));
    }
}
