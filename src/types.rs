//! Scalar traits shared across the crate.
//!
//! `FloatNum` is the real floating-point type driving the 1-d transform
//! plans. `Element` covers the array element types that may live on a
//! pencil, i.e. `A` itself and `Complex<A>`, and carries the runtime tag
//! the plan compiler uses to track element-type evolution across stages.
use bytemuck::Pod;
use num_complex::Complex;
use num_traits::{Float, FloatConst, NumAssign, Zero};
use rustfft::FftNum;
use std::fmt::Debug;
use std::ops::{Mul, MulAssign};

/// Generic floating point trait, implemented for `f32` and `f64`.
pub trait FloatNum: FftNum + Float + FloatConst + NumAssign + Pod {}

impl FloatNum for f32 {}
impl FloatNum for f64 {}

/// Elementary bound for data that can live in a distributed array and
/// cross the byte-level scratch and communication buffers.
pub trait Scalar: Pod + Zero + PartialEq + Debug + Send + Sync + 'static {}

impl<T> Scalar for T where T: Pod + Zero + PartialEq + Debug + Send + Sync + 'static {}

/// Runtime tag of a pencil element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemKind {
    /// Real scalars (`A`)
    Real,
    /// Complex scalars (`Complex<A>`)
    Complex,
}

impl ElemKind {
    /// Size in bytes of one element of this kind for base float `A`.
    #[must_use]
    pub fn bytes<A: FloatNum>(self) -> usize {
        match self {
            ElemKind::Real => std::mem::size_of::<A>(),
            ElemKind::Complex => 2 * std::mem::size_of::<A>(),
        }
    }

    /// Number of `Complex<A>` units needed to hold `n` elements of this
    /// kind (real elements pack two per unit).
    #[must_use]
    pub fn complex_units(self, n: usize) -> usize {
        match self {
            ElemKind::Real => n.div_ceil(2),
            ElemKind::Complex => n,
        }
    }
}

impl std::fmt::Display for ElemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            ElemKind::Real => write!(f, "real"),
            ElemKind::Complex => write!(f, "complex"),
        }
    }
}

/// Element types admissible on a pencil over base float `A`.
pub trait Element<A: FloatNum>: Scalar + MulAssign<A> + Mul<A, Output = Self> {
    /// Runtime tag of this element type.
    const KIND: ElemKind;
}

impl<A: FloatNum> Element<A> for A {
    const KIND: ElemKind = ElemKind::Real;
}

impl<A: FloatNum> Element<A> for Complex<A> {
    const KIND: ElemKind = ElemKind::Complex;
}
