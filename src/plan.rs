//! Plan compiler and executor for N-dimensional transforms.
//!
//! A plan chains one 1-d transform per logical axis with the
//! transpositions that rotate each axis into local, memory-fastest
//! position. Stages run over the axes from fastest to slowest: the
//! initial pencil decomposes the first `M` logical axes with identity
//! memory order, so the last axis is immediately transformable, and
//! every following stage frees its axis by shifting one decomposition
//! slot, which keeps adjacent pencils one transposition apart.
//!
//! Element types evolve along the chain (real-to-complex stages change
//! both kind and axis length); the plan tracks them as runtime tags and
//! reinterprets its two scratch buffers accordingly, so a single pair of
//! buffers serves all stages. Scratch is shared, hence `apply` takes
//! `&mut self` and concurrent applications of one plan are ruled out at
//! compile time.
use crate::array::DistArray;
use crate::error::{PencilError, Result};
use crate::pencil::Pencil;
use crate::permutation::Permutation;
use crate::topology::{balanced_dims, ProcMesh, Topology};
use crate::transform::{LaneIn, LaneOut, StageKernel, Transform};
use crate::transpose::{
    exchange, pack_blocks, plan_exchange, repermute, unpack_blocks, TransposeMethod,
};
use crate::types::{ElemKind, Element, FloatNum};
use mpi::traits::Communicator;
use num_complex::Complex;
use num_traits::Zero;
use std::ops::Range;

/// How a stage receives its input from the previous stage's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Link {
    /// First stage, or layouts already agree.
    None,
    /// Same distribution, different memory order: local copy.
    Permute,
    /// One decomposition slot changed: collective transposition.
    Transpose,
}

/// Geometry of one stage, derived without any communication.
#[derive(Debug, Clone)]
pub(crate) struct StageGeom<const N: usize> {
    pub axis: usize,
    pub transform: Transform,
    pub pen_in: Pencil<N>,
    pub pen_out: Pencil<N>,
    pub kind_in: ElemKind,
    pub kind_out: ElemKind,
    pub link: Link,
}

/// Derive the stage chain for a mesh, shape and transform list.
///
/// `first_out_len` acknowledges the real output length of a chain whose
/// first transform is `Brfft`/`Irfft`; such chains are rejected without
/// it because the real length cannot be inferred from the complex input
/// alone.
pub(crate) fn compile_stages<const N: usize>(
    mesh: &ProcMesh,
    shape: [usize; N],
    transforms: &[Transform; N],
    first_out_len: Option<usize>,
) -> Result<Vec<StageGeom<N>>> {
    if mesh.ndim() >= N {
        return Err(PencilError::Config(format!(
            "a {}-dimensional process mesh leaves no local axis in {N} dimensions",
            mesh.ndim()
        )));
    }
    let first = transforms[N - 1];
    let c2r_first = matches!(first, Transform::Brfft | Transform::Irfft);
    match (c2r_first, first_out_len) {
        (true, None) => {
            return Err(PencilError::Config(format!(
                "a plan starting with {first} cannot infer its real output \
                 length; pass it explicitly"
            )))
        }
        (true, Some(len)) if len != first.output_len(shape[N - 1]) => {
            return Err(PencilError::Config(format!(
                "output length {len} does not match {first} of a length-{} axis",
                shape[N - 1]
            )))
        }
        (false, Some(_)) => {
            return Err(PencilError::Config(
                "an output length can only be given for brfft/irfft-initial plans".into(),
            ))
        }
        _ => {}
    }

    let mut kind = (0..N)
        .rev()
        .find_map(|a| transforms[a].input_kind())
        .unwrap_or(ElemKind::Real);
    let mut decomp: Vec<usize> = (0..mesh.ndim()).collect();
    let mut run_shape = shape;
    let mut prev_out: Option<Pencil<N>> = None;
    let mut stages = Vec::with_capacity(N);
    for a in (0..N).rev() {
        let t = transforms[a];
        t.validate_len(run_shape[a])?;
        if let Some(k) = decomp.iter().position(|&ax| ax == a) {
            let freed = a + 1;
            if decomp.contains(&freed) {
                return Err(PencilError::Config(format!(
                    "axis {freed} is already decomposed while freeing axis {a}"
                )));
            }
            decomp[k] = freed;
        }
        debug_assert!(!decomp.contains(&a));
        let perm = Permutation::axis_fastest(a);
        let pen_in = Pencil::with_perm(mesh, run_shape, &decomp, perm)?;
        let kind_in = kind;
        let kind_out = t.output_kind_of(kind_in)?;
        run_shape[a] = t.output_len(run_shape[a]);
        let pen_out = pen_in.with_axis_len(a, run_shape[a]);
        let link = match &prev_out {
            None => Link::None,
            Some(prev) if prev.decomp() != pen_in.decomp() => Link::Transpose,
            Some(prev) if prev.perm() != pen_in.perm() => Link::Permute,
            Some(_) => Link::None,
        };
        prev_out = Some(pen_out.clone());
        kind = kind_out;
        stages.push(StageGeom {
            axis: a,
            transform: t,
            pen_in,
            pen_out,
            kind_in,
            kind_out,
            link,
        });
    }
    Ok(stages)
}

struct Stage<A: FloatNum, const N: usize> {
    geom: StageGeom<N>,
    kernel: StageKernel<A>,
}

/// Compiled N-dimensional transform over a pencil decomposition.
pub struct Plan<A: FloatNum, const N: usize> {
    topo: Topology,
    method: TransposeMethod,
    stages: Vec<Stage<A, N>>,
    input_kind: ElemKind,
    output_kind: ElemKind,
    scale: usize,
    base_units: usize,
    ibuf: Vec<Complex<A>>,
    obuf: Vec<Complex<A>>,
}

fn scratch_in<A: FloatNum>(buf: &[Complex<A>], kind: ElemKind, n: usize) -> LaneIn<'_, A> {
    match kind {
        ElemKind::Real => LaneIn::Real(&bytemuck::cast_slice(buf)[..n]),
        ElemKind::Complex => LaneIn::Cplx(&buf[..n]),
    }
}

fn scratch_out<A: FloatNum>(buf: &mut [Complex<A>], kind: ElemKind, n: usize) -> LaneOut<'_, A> {
    match kind {
        ElemKind::Real => LaneOut::Real(&mut bytemuck::cast_slice_mut(buf)[..n]),
        ElemKind::Complex => LaneOut::Cplx(&mut buf[..n]),
    }
}

fn user_in<A: FloatNum, T: Element<A>>(data: &[T]) -> LaneIn<'_, A> {
    match T::KIND {
        ElemKind::Real => LaneIn::Real(bytemuck::cast_slice(data)),
        ElemKind::Complex => LaneIn::Cplx(bytemuck::cast_slice(data)),
    }
}

fn user_out<A: FloatNum, T: Element<A>>(data: &mut [T]) -> LaneOut<'_, A> {
    match T::KIND {
        ElemKind::Real => LaneOut::Real(bytemuck::cast_slice_mut(data)),
        ElemKind::Complex => LaneOut::Cplx(bytemuck::cast_slice_mut(data)),
    }
}

/// Local repermutation of a scratch-resident field, typed per `kind`.
fn link_permute<A: FloatNum, const N: usize>(
    kind: ElemKind,
    from: &Pencil<N>,
    to: &Pencil<N>,
    src: &[Complex<A>],
    dst: &mut [Complex<A>],
    extra: usize,
) {
    let vol = from.local_len() * extra;
    match kind {
        ElemKind::Real => repermute(
            from,
            &bytemuck::cast_slice::<Complex<A>, A>(src)[..vol],
            to,
            &mut bytemuck::cast_slice_mut::<Complex<A>, A>(dst)[..vol],
            extra,
        ),
        ElemKind::Complex => repermute(from, &src[..vol], to, &mut dst[..vol], extra),
    }
}

/// Transposition of a scratch-resident field: pack `a` into `b`,
/// exchange `b` back into `a`, unpack `a` into `b`. The field enters in
/// buffer `a` (layout `from`) and leaves in buffer `b` (layout `to`).
fn link_transpose<A: FloatNum, const N: usize>(
    kind: ElemKind,
    topo: &Topology,
    method: TransposeMethod,
    from: &Pencil<N>,
    to: &Pencil<N>,
    a: &mut [Complex<A>],
    b: &mut [Complex<A>],
    extra: usize,
) -> Result<()> {
    let xp = plan_exchange(from, to, extra)?;
    match kind {
        ElemKind::Real => {
            pack_blocks(
                &xp,
                from,
                to,
                &bytemuck::cast_slice::<Complex<A>, A>(&*a)[..xp.send_total],
                &mut bytemuck::cast_slice_mut::<Complex<A>, A>(&mut *b)[..xp.send_total],
            );
            exchange(
                topo,
                &xp,
                &bytemuck::cast_slice::<Complex<A>, A>(&*b)[..xp.send_total],
                &mut bytemuck::cast_slice_mut::<Complex<A>, A>(&mut *a)[..xp.recv_total],
                method,
            )?;
            unpack_blocks(
                &xp,
                to,
                &bytemuck::cast_slice::<Complex<A>, A>(&*a)[..xp.recv_total],
                &mut bytemuck::cast_slice_mut::<Complex<A>, A>(&mut *b)[..xp.recv_total],
            );
        }
        ElemKind::Complex => {
            pack_blocks(&xp, from, to, &a[..xp.send_total], &mut b[..xp.send_total]);
            exchange(
                topo,
                &xp,
                &b[..xp.send_total],
                &mut a[..xp.recv_total],
                method,
            )?;
            unpack_blocks(&xp, to, &a[..xp.recv_total], &mut b[..xp.recv_total]);
        }
    }
    Ok(())
}

impl<A: FloatNum, const N: usize> Plan<A, N> {
    /// Compile a plan over `comm` for a global `shape`, one transform
    /// per logical axis, and a process grid of the given dimensions.
    ///
    /// Collective: every rank of `comm` must construct the plan with
    /// identical arguments.
    ///
    /// # Errors
    /// `Config` on invalid grids, axis lengths or transform chains,
    /// `Comm` if the topology cannot be built.
    pub fn new<C: Communicator>(
        comm: &C,
        shape: [usize; N],
        transforms: [Transform; N],
        mesh_dims: &[usize],
        method: TransposeMethod,
    ) -> Result<Self> {
        Self::with_options(comm, shape, transforms, mesh_dims, method, None)
    }

    /// Like [`new`](Self::new) with a balanced process grid of `m`
    /// dimensions derived from the communicator size.
    pub fn new_balanced<C: Communicator>(
        comm: &C,
        shape: [usize; N],
        transforms: [Transform; N],
        m: usize,
        method: TransposeMethod,
    ) -> Result<Self> {
        let dims = balanced_dims(comm.size() as usize, m);
        Self::with_options(comm, shape, transforms, &dims, method, None)
    }

    /// Compile a `Brfft`/`Irfft`-initial plan, acknowledging the real
    /// output length of the first stage explicitly.
    pub fn new_with_output_len<C: Communicator>(
        comm: &C,
        shape: [usize; N],
        transforms: [Transform; N],
        mesh_dims: &[usize],
        method: TransposeMethod,
        out_len: usize,
    ) -> Result<Self> {
        Self::with_options(comm, shape, transforms, mesh_dims, method, Some(out_len))
    }

    fn with_options<C: Communicator>(
        comm: &C,
        shape: [usize; N],
        transforms: [Transform; N],
        mesh_dims: &[usize],
        method: TransposeMethod,
        first_out_len: Option<usize>,
    ) -> Result<Self> {
        let topo = Topology::new(comm, mesh_dims)?;
        let geoms = compile_stages(topo.mesh(), shape, &transforms, first_out_len)?;
        let mut stages = Vec::with_capacity(N);
        let mut scale = 1usize;
        let mut base_units = 0usize;
        for geom in geoms {
            let n_in = geom.pen_in.global_shape()[geom.axis];
            scale *= geom.transform.scale_factor(n_in);
            base_units = base_units
                .max(geom.kind_in.complex_units(geom.pen_in.local_len()))
                .max(geom.kind_out.complex_units(geom.pen_out.local_len()));
            let kernel = StageKernel::new(geom.transform, n_in)?;
            stages.push(Stage { geom, kernel });
        }
        let input_kind = stages.first().map_or(ElemKind::Real, |s| s.geom.kind_in);
        let output_kind = stages.last().map_or(ElemKind::Real, |s| s.geom.kind_out);
        let ibuf = vec![Complex::zero(); base_units];
        let obuf = vec![Complex::zero(); base_units];
        Ok(Self {
            topo,
            method,
            stages,
            input_kind,
            output_kind,
            scale,
            base_units,
            ibuf,
            obuf,
        })
    }

    /// The pencil of plan input arrays.
    #[must_use]
    pub fn input_pencil(&self) -> &Pencil<N> {
        &self.stages[0].geom.pen_in
    }

    /// The pencil of plan output arrays.
    #[must_use]
    pub fn output_pencil(&self) -> &Pencil<N> {
        &self.stages[N - 1].geom.pen_out
    }

    /// Globally owned index ranges of input arrays, logical order.
    #[must_use]
    pub fn input_range(&self) -> [Range<usize>; N] {
        self.input_pencil().local_ranges()
    }

    /// Globally owned index ranges of output arrays, logical order.
    #[must_use]
    pub fn output_range(&self) -> [Range<usize>; N] {
        self.output_pencil().local_ranges()
    }

    /// Global shape of the input side.
    #[must_use]
    pub fn global_shape_in(&self) -> [usize; N] {
        self.input_pencil().global_shape()
    }

    /// Global shape of the output side.
    #[must_use]
    pub fn global_shape_out(&self) -> [usize; N] {
        self.output_pencil().global_shape()
    }

    /// Element kind consumed by the forward direction.
    #[must_use]
    pub fn input_kind(&self) -> ElemKind {
        self.input_kind
    }

    /// Element kind produced by the forward direction.
    #[must_use]
    pub fn output_kind(&self) -> ElemKind {
        self.output_kind
    }

    /// Normalisation divisor of the round trip, the product of the
    /// transformed axis lengths.
    #[must_use]
    pub fn scale_factor(&self) -> usize {
        self.scale
    }

    /// The topology the plan communicates over.
    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// The configured transposition strategy.
    #[must_use]
    pub fn transpose_method(&self) -> TransposeMethod {
        self.method
    }

    fn check_kind(&self, kind: ElemKind, expected: ElemKind, side: &str) -> Result<()> {
        if kind != expected {
            return Err(PencilError::Type(format!(
                "plan {side} is {expected}, got a {kind} array"
            )));
        }
        Ok(())
    }

    /// Fresh zeroed array on the input pencil.
    ///
    /// # Errors
    /// `Type` if `T` is not the plan's input element type.
    pub fn allocate_input<T: Element<A>>(&self) -> Result<DistArray<T, N>> {
        self.allocate_input_with_extra(&[])
    }

    /// Fresh zeroed input array with extra component axes.
    pub fn allocate_input_with_extra<T: Element<A>>(
        &self,
        extra: &[usize],
    ) -> Result<DistArray<T, N>> {
        self.check_kind(T::KIND, self.input_kind, "input")?;
        Ok(DistArray::zeros_with_extra(self.input_pencil(), extra))
    }

    /// Fresh zeroed array on the output pencil.
    ///
    /// # Errors
    /// `Type` if `T` is not the plan's output element type.
    pub fn allocate_output<T: Element<A>>(&self) -> Result<DistArray<T, N>> {
        self.allocate_output_with_extra(&[])
    }

    /// Fresh zeroed output array with extra component axes.
    pub fn allocate_output_with_extra<T: Element<A>>(
        &self,
        extra: &[usize],
    ) -> Result<DistArray<T, N>> {
        self.check_kind(T::KIND, self.output_kind, "output")?;
        Ok(DistArray::zeros_with_extra(self.output_pencil(), extra))
    }

    fn ensure_scratch(&mut self, extra: usize) -> Result<()> {
        let needed = self.base_units * extra;
        for buf in [&mut self.ibuf, &mut self.obuf] {
            if buf.len() < needed {
                buf.try_reserve_exact(needed - buf.len())
                    .map_err(|e| PencilError::Oom(e.to_string()))?;
                buf.resize(needed, Complex::zero());
            }
        }
        Ok(())
    }

    fn check_io<Ti: Element<A>, To: Element<A>>(
        &self,
        x: &DistArray<Ti, N>,
        y: &DistArray<To, N>,
    ) -> Result<()> {
        self.check_kind(Ti::KIND, self.input_kind, "input")?;
        self.check_kind(To::KIND, self.output_kind, "output")?;
        if x.pencil() != self.input_pencil() {
            return Err(PencilError::Shape(
                "source array does not live on the plan's input pencil".into(),
            ));
        }
        if y.pencil() != self.output_pencil() {
            return Err(PencilError::Shape(
                "destination array does not live on the plan's output pencil".into(),
            ));
        }
        if x.extra() != y.extra() {
            return Err(PencilError::Shape(format!(
                "extra axes differ between input {:?} and output {:?}",
                x.extra(),
                y.extra()
            )));
        }
        Ok(())
    }

    /// Forward transform of `src` into `dst`.
    ///
    /// Collective over the plan's topology.
    ///
    /// # Errors
    /// `Shape`/`Type` on arrays that do not match the plan end pencils,
    /// `Comm` from the transpositions, `Oom` if scratch growth fails.
    pub fn apply_forward<Ti: Element<A>, To: Element<A>>(
        &mut self,
        dst: &mut DistArray<To, N>,
        src: &DistArray<Ti, N>,
    ) -> Result<()> {
        self.check_io(src, dst)?;
        let extra = src.extra_len();
        self.ensure_scratch(extra)?;
        let Self {
            topo,
            method,
            stages,
            ibuf,
            obuf,
            ..
        } = self;
        let n = stages.len();
        for i in 0..n {
            let prev_pen = (i > 0).then(|| stages[i - 1].geom.pen_out.clone());
            let stage = &mut stages[i];
            let g = &stage.geom;
            match g.link {
                Link::None => {}
                Link::Permute => {
                    let prev = prev_pen.as_ref().unwrap();
                    link_permute(g.kind_in, prev, &g.pen_in, ibuf, obuf, extra);
                }
                Link::Transpose => {
                    let prev = prev_pen.as_ref().unwrap();
                    link_transpose(g.kind_in, topo, *method, prev, &g.pen_in, ibuf, obuf, extra)?;
                }
            }
            let vol_in = g.pen_in.local_len() * extra;
            let vol_out = g.pen_out.local_len() * extra;
            let input = if i == 0 {
                user_in::<A, Ti>(src.as_slice())
            } else {
                scratch_in(obuf, g.kind_in, vol_in)
            };
            let output = if i == n - 1 {
                user_out::<A, To>(dst.as_mut_slice())
            } else {
                scratch_out(ibuf, g.kind_out, vol_out)
            };
            stage.kernel.apply(true, input, output);
        }
        Ok(())
    }

    /// Unnormalised backward transform of `src` into `dst`, traversing
    /// the stages in reverse with each transform's unnormalised inverse.
    ///
    /// Collective over the plan's topology.
    ///
    /// # Errors
    /// As [`apply_forward`](Self::apply_forward).
    pub fn apply_backward<Ti: Element<A>, To: Element<A>>(
        &mut self,
        dst: &mut DistArray<Ti, N>,
        src: &DistArray<To, N>,
    ) -> Result<()> {
        self.check_io(dst, src)?;
        let extra = src.extra_len();
        self.ensure_scratch(extra)?;
        let Self {
            topo,
            method,
            stages,
            ibuf,
            obuf,
            ..
        } = self;
        let n = stages.len();
        for i in (0..n).rev() {
            let stage = &mut stages[i];
            let g = &stage.geom;
            let vol_in = g.pen_in.local_len() * extra;
            let vol_out = g.pen_out.local_len() * extra;
            let input = if i == n - 1 {
                user_in::<A, To>(src.as_slice())
            } else {
                scratch_in(obuf, g.kind_out, vol_out)
            };
            let output = if i == 0 {
                user_out::<A, Ti>(dst.as_mut_slice())
            } else {
                scratch_out(ibuf, g.kind_in, vol_in)
            };
            stage.kernel.apply(false, input, output);
            if i > 0 {
                let prev_pen = stages[i - 1].geom.pen_out.clone();
                let stage = &stages[i];
                let g = &stage.geom;
                match g.link {
                    Link::None => {}
                    Link::Permute => {
                        link_permute(g.kind_in, &g.pen_in, &prev_pen, ibuf, obuf, extra);
                    }
                    Link::Transpose => {
                        link_transpose(
                            g.kind_in, topo, *method, &g.pen_in, &prev_pen, ibuf, obuf, extra,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Normalised inverse: the backward transform divided by
    /// [`scale_factor`](Self::scale_factor), recovering the forward
    /// input exactly.
    ///
    /// # Errors
    /// As [`apply_backward`](Self::apply_backward).
    pub fn apply_inverse<Ti: Element<A>, To: Element<A>>(
        &mut self,
        dst: &mut DistArray<Ti, N>,
        src: &DistArray<To, N>,
    ) -> Result<()> {
        self.apply_backward(dst, src)?;
        let norm = A::from_f64(1.0 / self.scale as f64).unwrap();
        dst.scale_by(norm);
        Ok(())
    }

    /// Allocating forward transform.
    pub fn forward<Ti: Element<A>, To: Element<A>>(
        &mut self,
        src: &DistArray<Ti, N>,
    ) -> Result<DistArray<To, N>> {
        let mut dst = self.allocate_output_with_extra::<To>(src.extra())?;
        self.apply_forward(&mut dst, src)?;
        Ok(dst)
    }

    /// Allocating normalised inverse transform.
    pub fn inverse<Ti: Element<A>, To: Element<A>>(
        &mut self,
        src: &DistArray<To, N>,
    ) -> Result<DistArray<Ti, N>> {
        let mut dst = self.allocate_input_with_extra::<Ti>(src.extra())?;
        self.apply_inverse(&mut dst, src)?;
        Ok(dst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mesh(dims: &[usize], rank: usize) -> ProcMesh {
        ProcMesh::new(dims.to_vec(), rank).unwrap()
    }

    #[test]
    fn pencil_chain_shifts_one_slot_per_stage() {
        let m = mesh(&[2, 2], 0);
        let t = [Transform::Fft, Transform::Fft, Transform::Fft];
        let stages = compile_stages(&m, [8, 12, 16], &t, None).unwrap();
        assert_eq!(stages.len(), 3);
        assert_eq!(stages[0].axis, 2);
        assert_eq!(stages[0].pen_in.decomp(), &[0, 1]);
        assert!(stages[0].pen_in.perm().is_identity());
        assert_eq!(stages[0].link, Link::None);
        assert_eq!(stages[1].axis, 1);
        assert_eq!(stages[1].pen_in.decomp(), &[0, 2]);
        assert_eq!(stages[1].pen_in.perm().as_array(), [0, 2, 1]);
        assert_eq!(stages[1].link, Link::Transpose);
        assert_eq!(stages[2].axis, 0);
        assert_eq!(stages[2].pen_in.decomp(), &[1, 2]);
        assert_eq!(stages[2].pen_in.perm().as_array(), [1, 2, 0]);
        assert_eq!(stages[2].link, Link::Transpose);
        // every stage axis is local on both of its pencils
        for s in &stages {
            assert!(!s.pen_in.is_decomposed(s.axis));
            assert!(!s.pen_out.is_decomposed(s.axis));
        }
    }

    #[test]
    fn slab_chain_uses_a_local_repermutation() {
        let m = mesh(&[4], 1);
        let t = [Transform::Fft, Transform::Fft, Transform::Fft];
        let stages = compile_stages(&m, [8, 12, 16], &t, None).unwrap();
        assert_eq!(stages[0].pen_in.decomp(), &[0]);
        assert_eq!(stages[1].pen_in.decomp(), &[0]);
        assert_eq!(stages[1].link, Link::Permute);
        assert_eq!(stages[2].pen_in.decomp(), &[1]);
        assert_eq!(stages[2].link, Link::Transpose);
    }

    #[test]
    fn kinds_and_shapes_evolve_through_a_real_chain() {
        let m = mesh(&[2, 2], 2);
        let t = [Transform::Fft, Transform::Fft, Transform::Rfft];
        let stages = compile_stages(&m, [16, 21, 64], &t, None).unwrap();
        assert_eq!(stages[0].kind_in, ElemKind::Real);
        assert_eq!(stages[0].kind_out, ElemKind::Complex);
        assert_eq!(stages[0].pen_in.global_shape(), [16, 21, 64]);
        assert_eq!(stages[0].pen_out.global_shape(), [16, 21, 33]);
        assert_eq!(stages[1].kind_in, ElemKind::Complex);
        assert_eq!(stages[2].pen_out.global_shape(), [16, 21, 33]);
    }

    #[test]
    fn odd_real_lengths_fail_at_compile() {
        let m = mesh(&[2, 2], 0);
        let t = [Transform::Fft, Transform::Fft, Transform::Rfft];
        assert!(matches!(
            compile_stages(&m, [16, 21, 41], &t, None),
            Err(PencilError::Config(_))
        ));
    }

    #[test]
    fn mismatched_kind_chain_fails() {
        let m = mesh(&[2], 0);
        // complex input reaches the real transform on axis 0
        let t = [Transform::Rfft, Transform::Fft, Transform::Fft];
        assert!(matches!(
            compile_stages(&m, [16, 20, 24], &t, None),
            Err(PencilError::Type(_))
        ));
    }

    #[test]
    fn c2r_initial_chains_need_an_explicit_length() {
        let m = mesh(&[2], 0);
        let t = [Transform::Identity, Transform::Identity, Transform::Brfft];
        assert!(compile_stages(&m, [16, 20, 33], &t, None).is_err());
        assert!(compile_stages(&m, [16, 20, 33], &t, Some(64)).is_ok());
        assert!(compile_stages(&m, [16, 20, 33], &t, Some(63)).is_err());
        // the acknowledgement is rejected elsewhere
        let f = [Transform::Fft, Transform::Fft, Transform::Fft];
        assert!(compile_stages(&m, [16, 20, 33], &f, Some(64)).is_err());
        // a trailing complex-to-real stage infers its length on its own
        let g = [Transform::Brfft, Transform::Fft, Transform::Fft];
        let stages = compile_stages(&m, [33, 20, 16], &g, None).unwrap();
        assert_eq!(stages[2].pen_out.global_shape(), [64, 20, 16]);
    }

    #[test]
    fn full_mesh_leaves_no_local_axis() {
        let m = mesh(&[2, 2, 2], 0);
        let t = [Transform::Fft, Transform::Fft, Transform::Fft];
        assert!(compile_stages(&m, [8, 8, 8], &t, None).is_err());
    }
}
