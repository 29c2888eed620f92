//! 1-d transform registry and lane kernels.
//!
//! [`Transform`] is the value-level catalogue of the separable 1-d
//! transforms a plan can place on an axis: it declares input/output
//! element kinds, the output-length rule, the unnormalised inverse
//! pairing and the round-trip scale factor. [`StageKernel`] is the
//! prepared executor for one plan stage: rustfft plans plus a lane
//! buffer, applied out-of-place along the memory-fastest axis.
//!
//! Real-to-complex, complex-to-real and cosine transforms are built on
//! the full-length complex plan: the half spectrum is packed out of the
//! forward transform, reconstructed Hermitian for the backward one, and
//! DCT-I goes through the even extension of length `2(n-1)`.
use crate::error::{PencilError, Result};
use crate::types::{ElemKind, FloatNum};
use num_complex::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Real-to-real transform kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R2rKind {
    /// Cosine transform of the first kind, self-paired with round-trip
    /// scale `2(n-1)`.
    Dct1,
}

/// Catalogue of 1-d transforms assignable to a plan axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Pass-through, any element kind.
    Identity,
    /// Complex forward Fourier transform.
    Fft,
    /// Normalised complex inverse Fourier transform.
    Ifft,
    /// Unnormalised complex backward Fourier transform.
    Bfft,
    /// Real-to-complex forward transform, output length `n/2 + 1`.
    Rfft,
    /// Normalised complex-to-real inverse, output length `2(n-1)`.
    Irfft,
    /// Unnormalised complex-to-real backward, output length `2(n-1)`.
    Brfft,
    /// Real-to-real transform of the given kind.
    R2r(R2rKind),
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            Transform::Identity => write!(f, "identity"),
            Transform::Fft => write!(f, "fft"),
            Transform::Ifft => write!(f, "ifft"),
            Transform::Bfft => write!(f, "bfft"),
            Transform::Rfft => write!(f, "rfft"),
            Transform::Irfft => write!(f, "irfft"),
            Transform::Brfft => write!(f, "brfft"),
            Transform::R2r(R2rKind::Dct1) => write!(f, "dct1"),
        }
    }
}

impl Transform {
    /// Element kind this transform consumes; `None` for the
    /// kind-agnostic identity.
    #[must_use]
    pub fn input_kind(self) -> Option<ElemKind> {
        match self {
            Transform::Identity => None,
            Transform::Rfft | Transform::R2r(_) => Some(ElemKind::Real),
            Transform::Fft | Transform::Ifft | Transform::Bfft | Transform::Irfft
            | Transform::Brfft => Some(ElemKind::Complex),
        }
    }

    /// Element kind produced when fed `input`.
    ///
    /// # Errors
    /// `Type` if the transform does not accept `input`.
    pub fn output_kind_of(self, input: ElemKind) -> Result<ElemKind> {
        if let Some(expected) = self.input_kind() {
            if expected != input {
                return Err(PencilError::Type(format!(
                    "{self} expects {expected} input, got {input}"
                )));
            }
        }
        Ok(match self {
            Transform::Rfft => ElemKind::Complex,
            Transform::Irfft | Transform::Brfft => ElemKind::Real,
            _ => input,
        })
    }

    /// Output length along the transformed axis for input length `n`.
    #[must_use]
    pub fn output_len(self, n: usize) -> usize {
        match self {
            Transform::Rfft => n / 2 + 1,
            Transform::Irfft | Transform::Brfft => 2 * (n - 1),
            _ => n,
        }
    }

    /// The unnormalised inverse transform.
    #[must_use]
    pub fn inverse(self) -> Self {
        match self {
            Transform::Identity => Transform::Identity,
            Transform::Fft => Transform::Bfft,
            Transform::Ifft | Transform::Bfft => Transform::Fft,
            Transform::Rfft => Transform::Brfft,
            Transform::Irfft | Transform::Brfft => Transform::Rfft,
            Transform::R2r(kind) => Transform::R2r(kind),
        }
    }

    /// Divisor contributed to the normalisation of the round trip
    /// `inverse . forward` for input length `n`.
    #[must_use]
    pub fn scale_factor(self, n: usize) -> usize {
        match self {
            Transform::Fft | Transform::Bfft | Transform::Rfft => n,
            Transform::Brfft => 2 * (n - 1),
            Transform::R2r(R2rKind::Dct1) => 2 * (n - 1),
            Transform::Identity | Transform::Ifft | Transform::Irfft => 1,
        }
    }

    /// Check the transform against an axis length.
    ///
    /// # Errors
    /// `Config` for odd lengths on the real transform (the even-length
    /// requirement) and for lengths too short to transform.
    pub fn validate_len(self, n: usize) -> Result<()> {
        match self {
            Transform::Rfft if n % 2 != 0 => Err(PencilError::Config(format!(
                "rfft requires an even axis length, got {n}"
            ))),
            Transform::Rfft | Transform::Fft | Transform::Ifft | Transform::Bfft if n == 0 => {
                Err(PencilError::Config("cannot transform an empty axis".into()))
            }
            Transform::Irfft | Transform::Brfft | Transform::R2r(_) if n < 2 => {
                Err(PencilError::Config(format!(
                    "{self} requires an axis length of at least 2, got {n}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Complex plans and lane buffer for the fft-family kernels.
struct Fft1d<A: FloatNum> {
    n: usize,
    m: usize,
    fwd: Arc<dyn Fft<A>>,
    bwd: Arc<dyn Fft<A>>,
    buf: Vec<Complex<A>>,
}

impl<A: FloatNum> Fft1d<A> {
    fn new(n: usize) -> Self {
        let mut planner = FftPlanner::<A>::new();
        let fwd = planner.plan_fft_forward(n);
        let bwd = planner.plan_fft_inverse(n);
        Self {
            n,
            m: n / 2 + 1,
            fwd,
            bwd,
            buf: vec![Complex::zero(); n],
        }
    }

    fn norm(&self) -> A {
        A::from_f64(1.0 / self.n as f64).unwrap()
    }

    fn fft_lane(&self, x: &[Complex<A>], y: &mut [Complex<A>]) {
        y.copy_from_slice(x);
        self.fwd.process(y);
    }

    fn bfft_lane(&self, x: &[Complex<A>], y: &mut [Complex<A>]) {
        y.copy_from_slice(x);
        self.bwd.process(y);
    }

    fn ifft_lane(&self, x: &[Complex<A>], y: &mut [Complex<A>]) {
        self.bfft_lane(x, y);
        let s = self.norm();
        for v in y.iter_mut() {
            *v = *v * s;
        }
    }

    fn r2c_lane(&mut self, x: &[A], y: &mut [Complex<A>]) {
        for (b, &d) in self.buf.iter_mut().zip(x.iter()) {
            *b = Complex::new(d, A::zero());
        }
        self.fwd.process(&mut self.buf);
        y.copy_from_slice(&self.buf[..self.m]);
    }

    /// Hermitian reconstruction followed by the backward transform;
    /// `normalize` divides by `n` for the rounded-trip inverse.
    fn c2r_lane(&mut self, x: &[Complex<A>], y: &mut [A], normalize: bool) {
        let m = x.len();
        for (b, &d) in self.buf[..m].iter_mut().zip(x.iter()) {
            *b = d;
        }
        for (b, d) in self.buf[m..].iter_mut().rev().zip(x[1..].iter()) {
            *b = d.conj();
        }
        self.bwd.process(&mut self.buf);
        if normalize {
            let s = self.norm();
            for (v, b) in y.iter_mut().zip(self.buf.iter()) {
                *v = b.re * s;
            }
        } else {
            for (v, b) in y.iter_mut().zip(self.buf.iter()) {
                *v = b.re;
            }
        }
    }
}

/// DCT-I through the even extension of length `2(n-1)`.
struct Dct1d<A: FloatNum> {
    n: usize,
    plan: Arc<dyn Fft<A>>,
    buf: Vec<Complex<A>>,
}

impl<A: FloatNum> Dct1d<A> {
    fn new(n: usize) -> Self {
        let m = 2 * (n - 1);
        let mut planner = FftPlanner::<A>::new();
        let plan = planner.plan_fft_forward(m);
        Self {
            n,
            plan,
            buf: vec![Complex::zero(); m],
        }
    }

    /// Unnormalised DCT-I: `(a,b,c,d) -> fft(a,b,c,d,c,b)` truncated to
    /// the real first half.
    fn dct1_lane(&mut self, x: &[A], y: &mut [A]) {
        let m = self.buf.len();
        self.buf[0] = Complex::new(x[0], A::zero());
        for (i, &d) in x[1..].iter().enumerate() {
            self.buf[i + 1] = Complex::new(d, A::zero());
            if i + 1 < self.n - 1 {
                self.buf[m - i - 1] = Complex::new(d, A::zero());
            }
        }
        self.plan.process(&mut self.buf);
        for (v, b) in y.iter_mut().zip(self.buf[..self.n].iter()) {
            *v = b.re;
        }
    }
}

/// Typed lane input handed to a stage kernel.
pub(crate) enum LaneIn<'a, A: FloatNum> {
    Real(&'a [A]),
    Cplx(&'a [Complex<A>]),
}

/// Typed lane output handed to a stage kernel.
pub(crate) enum LaneOut<'a, A: FloatNum> {
    Real(&'a mut [A]),
    Cplx(&'a mut [Complex<A>]),
}

/// Prepared 1-d executor of one plan stage.
pub(crate) struct StageKernel<A: FloatNum> {
    transform: Transform,
    n_in: usize,
    n_out: usize,
    fft: Option<Fft1d<A>>,
    dct: Option<Dct1d<A>>,
}

impl<A: FloatNum> StageKernel<A> {
    pub fn new(transform: Transform, n_in: usize) -> Result<Self> {
        transform.validate_len(n_in)?;
        let n_out = transform.output_len(n_in);
        let (fft, dct) = match transform {
            Transform::Identity => (None, None),
            Transform::Fft | Transform::Ifft | Transform::Bfft | Transform::Rfft => {
                (Some(Fft1d::new(n_in)), None)
            }
            Transform::Irfft | Transform::Brfft => (Some(Fft1d::new(n_out)), None),
            Transform::R2r(R2rKind::Dct1) => (None, Some(Dct1d::new(n_in))),
        };
        Ok(Self {
            transform,
            n_in,
            n_out,
            fft,
            dct,
        })
    }

    /// Apply the stage transform (or its unnormalised inverse) to every
    /// lane of the input, writing the output lanes out-of-place.
    pub fn apply(&mut self, forward: bool, input: LaneIn<'_, A>, output: LaneOut<'_, A>) {
        let eff = if forward {
            self.transform
        } else {
            self.transform.inverse()
        };
        let (n_x, n_y) = if forward {
            (self.n_in, self.n_out)
        } else {
            (self.n_out, self.n_in)
        };
        match (eff, input, output) {
            (Transform::Identity, LaneIn::Real(x), LaneOut::Real(y)) => {
                y.copy_from_slice(x);
            }
            (Transform::Identity, LaneIn::Cplx(x), LaneOut::Cplx(y)) => {
                y.copy_from_slice(x);
            }
            (Transform::Fft, LaneIn::Cplx(x), LaneOut::Cplx(y)) => {
                let h = self.fft.as_ref().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.fft_lane(xl, yl);
                }
            }
            (Transform::Ifft, LaneIn::Cplx(x), LaneOut::Cplx(y)) => {
                let h = self.fft.as_ref().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.ifft_lane(xl, yl);
                }
            }
            (Transform::Bfft, LaneIn::Cplx(x), LaneOut::Cplx(y)) => {
                let h = self.fft.as_ref().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.bfft_lane(xl, yl);
                }
            }
            (Transform::Rfft, LaneIn::Real(x), LaneOut::Cplx(y)) => {
                let h = self.fft.as_mut().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.r2c_lane(xl, yl);
                }
            }
            (Transform::Irfft, LaneIn::Cplx(x), LaneOut::Real(y)) => {
                let h = self.fft.as_mut().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.c2r_lane(xl, yl, true);
                }
            }
            (Transform::Brfft, LaneIn::Cplx(x), LaneOut::Real(y)) => {
                let h = self.fft.as_mut().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.c2r_lane(xl, yl, false);
                }
            }
            (Transform::R2r(R2rKind::Dct1), LaneIn::Real(x), LaneOut::Real(y)) => {
                let h = self.dct.as_mut().unwrap();
                for (xl, yl) in x.chunks_exact(n_x).zip(y.chunks_exact_mut(n_y)) {
                    h.dct1_lane(xl, yl);
                }
            }
            _ => unreachable!("lane element kinds do not match the stage transform"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn approx_eq(a: &[f64], b: &[f64]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-10, "{x} != {y} in {a:?} vs {b:?}");
        }
    }

    fn approx_eq_c(a: &[Complex<f64>], b: &[Complex<f64>]) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(
                (x.re - y.re).abs() < 1e-10 && (x.im - y.im).abs() < 1e-10,
                "{x} != {y}"
            );
        }
    }

    #[test]
    fn inverse_pairing() {
        assert_eq!(Transform::Fft.inverse(), Transform::Bfft);
        assert_eq!(Transform::Bfft.inverse(), Transform::Fft);
        assert_eq!(Transform::Ifft.inverse(), Transform::Fft);
        assert_eq!(Transform::Rfft.inverse(), Transform::Brfft);
        assert_eq!(Transform::Brfft.inverse(), Transform::Rfft);
        assert_eq!(Transform::Irfft.inverse(), Transform::Rfft);
        assert_eq!(Transform::Identity.inverse(), Transform::Identity);
    }

    #[test]
    fn length_and_scale_rules() {
        assert_eq!(Transform::Rfft.output_len(64), 33);
        assert_eq!(Transform::Brfft.output_len(33), 64);
        assert_eq!(Transform::Fft.output_len(21), 21);
        assert_eq!(Transform::Fft.scale_factor(21), 21);
        assert_eq!(Transform::Rfft.scale_factor(64), 64);
        assert_eq!(Transform::Brfft.scale_factor(33), 64);
        assert_eq!(Transform::Ifft.scale_factor(21), 1);
        assert_eq!(Transform::R2r(R2rKind::Dct1).scale_factor(5), 8);
    }

    #[test]
    fn odd_real_lengths_are_rejected() {
        assert!(Transform::Rfft.validate_len(21).is_err());
        assert!(Transform::Rfft.validate_len(64).is_ok());
        assert!(Transform::Fft.validate_len(21).is_ok());
        assert!(Transform::Brfft.validate_len(1).is_err());
    }

    #[test]
    fn fft_lane_against_reference() {
        let mut k = StageKernel::<f64>::new(Transform::Fft, 4).unwrap();
        let x: Vec<Complex<f64>> = [1., 2., 3., 4.]
            .iter()
            .map(|&r| Complex::new(r, 0.))
            .collect();
        let mut y = vec![Complex::new(0., 0.); 4];
        k.apply(true, LaneIn::Cplx(&x), LaneOut::Cplx(&mut y));
        approx_eq_c(
            &y,
            &[
                Complex::new(10., 0.),
                Complex::new(-2., 2.),
                Complex::new(-2., 0.),
                Complex::new(-2., -2.),
            ],
        );
        // the unnormalised backward transform recovers n * x
        let mut z = vec![Complex::new(0., 0.); 4];
        k.apply(false, LaneIn::Cplx(&y), LaneOut::Cplx(&mut z));
        let nx: Vec<Complex<f64>> = x.iter().map(|&v| v * 4.).collect();
        approx_eq_c(&z, &nx);
    }

    #[test]
    fn normalised_inverse_round_trip() {
        let mut f = StageKernel::<f64>::new(Transform::Fft, 6).unwrap();
        let mut i = StageKernel::<f64>::new(Transform::Ifft, 6).unwrap();
        let x: Vec<Complex<f64>> = (0..6).map(|v| Complex::new(v as f64, -0.5)).collect();
        let mut y = vec![Complex::new(0., 0.); 6];
        let mut z = vec![Complex::new(0., 0.); 6];
        f.apply(true, LaneIn::Cplx(&x), LaneOut::Cplx(&mut y));
        i.apply(true, LaneIn::Cplx(&y), LaneOut::Cplx(&mut z));
        approx_eq_c(&z, &x);
    }

    #[test]
    fn r2c_lane_against_reference() {
        let mut k = StageKernel::<f64>::new(Transform::Rfft, 4).unwrap();
        let x = [1.0f64, 2., 3., 4.];
        let mut y = vec![Complex::new(0., 0.); 3];
        k.apply(true, LaneIn::Real(&x), LaneOut::Cplx(&mut y));
        approx_eq_c(
            &y,
            &[
                Complex::new(10., 0.),
                Complex::new(-2., 2.),
                Complex::new(-2., 0.),
            ],
        );
        let mut z = [0.0f64; 4];
        k.apply(false, LaneIn::Cplx(&y), LaneOut::Real(&mut z));
        approx_eq(&z, &[4., 8., 12., 16.]);
    }

    #[test]
    fn dct1_lane_against_reference() {
        let mut k = StageKernel::<f64>::new(Transform::R2r(R2rKind::Dct1), 3).unwrap();
        let x = [1.0f64, 2., 3.];
        let mut y = [0.0f64; 3];
        k.apply(true, LaneIn::Real(&x), LaneOut::Real(&mut y));
        approx_eq(&y, &[8., -2., 0.]);
        let mut z = [0.0f64; 3];
        k.apply(false, LaneIn::Real(&y), LaneOut::Real(&mut z));
        // self-paired up to the 2(n-1) scale
        approx_eq(&z, &[4., 8., 12.]);
    }

    #[test]
    fn kernels_process_many_lanes() {
        let mut k = StageKernel::<f64>::new(Transform::Rfft, 4).unwrap();
        let x = [1.0f64, 2., 3., 4., 1., 2., 3., 4.];
        let mut y = vec![Complex::new(0., 0.); 6];
        k.apply(true, LaneIn::Real(&x), LaneOut::Cplx(&mut y));
        approx_eq_c(&y[..3], &y[3..]);
    }
}
