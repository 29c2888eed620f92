//! Axis permutation algebra.
//!
//! A `Permutation<N>` describes the memory order of the `N` logical axes
//! of a pencil: `perm[p]` is the logical axis stored at memory position
//! `p`, positions running from slowest- to fastest-varying. The identity
//! permutation is the row-major layout with the last logical axis
//! fastest.
//!
//! All operations are pure and total on valid inputs; construction
//! validates bijectivity once so the algebra never re-checks.
use crate::error::{PencilError, Result};

/// Bijective reordering of the axes `0..N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permutation<const N: usize> {
    map: [usize; N],
}

impl<const N: usize> Permutation<N> {
    /// Identity permutation (logical order).
    #[must_use]
    pub fn identity() -> Self {
        Self {
            map: std::array::from_fn(|i| i),
        }
    }

    /// Validated construction from an axis map.
    ///
    /// # Errors
    /// `Config` if `map` is not a permutation of `0..N`.
    pub fn new(map: [usize; N]) -> Result<Self> {
        let mut seen = [false; N];
        for &m in &map {
            if m >= N || seen[m] {
                return Err(PencilError::Config(format!(
                    "{map:?} is not a permutation of 0..{N}"
                )));
            }
            seen[m] = true;
        }
        Ok(Self { map })
    }

    /// Permutation that moves `axis` to the fastest (last) memory
    /// position, keeping the remaining axes in logical order.
    #[must_use]
    pub fn axis_fastest(axis: usize) -> Self {
        debug_assert!(axis < N);
        let mut map = [0; N];
        let mut p = 0;
        for ax in 0..N {
            if ax != axis {
                map[p] = ax;
                p += 1;
            }
        }
        map[N - 1] = axis;
        Self { map }
    }

    /// Whether this is the identity permutation.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.map.iter().enumerate().all(|(i, &m)| i == m)
    }

    /// The underlying axis map.
    #[must_use]
    pub fn as_array(&self) -> [usize; N] {
        self.map
    }

    /// Logical axis stored at memory position `p`.
    #[must_use]
    pub fn axis_at(&self, p: usize) -> usize {
        self.map[p]
    }

    /// Memory position of logical `axis`.
    #[must_use]
    pub fn position_of(&self, axis: usize) -> usize {
        self.inverse().map[axis]
    }

    /// Reorder a logical tuple into this memory order.
    #[must_use]
    pub fn apply<T: Copy>(&self, t: [T; N]) -> [T; N] {
        std::array::from_fn(|i| t[self.map[i]])
    }

    /// Reorder a tuple in this memory order back to logical order.
    #[must_use]
    pub fn apply_inverse<T: Copy>(&self, t: [T; N]) -> [T; N] {
        let mut out = t;
        for (i, &m) in self.map.iter().enumerate() {
            out[m] = t[i];
        }
        out
    }

    /// Composition such that
    /// `compose(p, q).apply(t) == q.apply(p.apply(t))`.
    #[must_use]
    pub fn compose(&self, then: &Self) -> Self {
        Self {
            map: std::array::from_fn(|i| self.map[then.map[i]]),
        }
    }

    /// Inverse permutation.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let mut map = [0; N];
        for (i, &m) in self.map.iter().enumerate() {
            map[m] = i;
        }
        Self { map }
    }

    /// Relative permutation from `self`-order to `to`-order:
    /// `self.relative(to).apply(self.apply(t)) == to.apply(t)`.
    #[must_use]
    pub fn relative(&self, to: &Self) -> Self {
        self.inverse().compose(to)
    }
}

impl<const N: usize> Default for Permutation<N> {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_non_bijective() {
        assert!(Permutation::new([0, 0, 2]).is_err());
        assert!(Permutation::new([0, 1, 3]).is_err());
        assert!(Permutation::new([2, 0, 1]).is_ok());
    }

    #[test]
    fn apply_and_inverse_round_trip() {
        let p = Permutation::new([2, 0, 1]).unwrap();
        let t = [10, 20, 30];
        assert_eq!(p.apply(t), [30, 10, 20]);
        assert_eq!(p.apply_inverse(p.apply(t)), t);
        assert_eq!(p.inverse().apply(p.apply(t)), t);
    }

    #[test]
    fn compose_matches_sequential_application() {
        let p = Permutation::new([1, 2, 0]).unwrap();
        let q = Permutation::new([2, 1, 0]).unwrap();
        let t = [4, 5, 6];
        assert_eq!(p.compose(&q).apply(t), q.apply(p.apply(t)));
    }

    #[test]
    fn relative_translates_orders() {
        let p = Permutation::new([1, 2, 0]).unwrap();
        let q = Permutation::new([2, 0, 1]).unwrap();
        let t = [7, 8, 9];
        assert_eq!(p.relative(&q).apply(p.apply(t)), q.apply(t));
    }

    #[test]
    fn axis_fastest_layout() {
        let p = Permutation::<3>::axis_fastest(0);
        assert_eq!(p.as_array(), [1, 2, 0]);
        assert_eq!(p.position_of(0), 2);
        assert!(Permutation::<3>::axis_fastest(2).is_identity());
    }

    #[test]
    fn equal_iff_same_mapping() {
        let p = Permutation::new([1, 0, 2]).unwrap();
        let q = Permutation::new([1, 0, 2]).unwrap();
        assert_eq!(p, q);
        assert_ne!(p, Permutation::identity());
    }
}
