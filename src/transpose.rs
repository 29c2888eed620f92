//! Collective transposition between pencils.
//!
//! A transposition moves a distributed field between two pencils that
//! differ in exactly one decomposed axis. The exchange is scoped to the
//! sub-communicator of the changed mesh slot: every peer owns a
//! rectangular block of the data this process holds, and both sides
//! derive all block extents from the deterministic balanced partition,
//! so no sizes are ever communicated.
//!
//! Send blocks are packed in the *destination* memory order, which folds
//! the relative axis permutation into the packing copy and makes the
//! unpack a plain strided write. Buffers cross the message layer as raw
//! bytes, so one scratch pair serves every element type.
use crate::array::DistArray;
use crate::error::{PencilError, Result};
use crate::pencil::Pencil;
use crate::topology::Topology;
use crate::types::Scalar;
use mpi::datatype::{Partition, PartitionMut};
use mpi::traits::*;
use ndarray::{ArrayView, ArrayViewMut, IxDyn, Slice};
use std::ops::Range;

/// Communication strategy of a transposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransposeMethod {
    /// One non-blocking receive and send per peer, waited together;
    /// the self block is a straight copy.
    Pairwise,
    /// A single vectored all-to-all with per-peer counts and
    /// displacements.
    AllToAllV,
}

/// Per-peer block layout of one transposition, derived without
/// communication.
#[derive(Debug, Clone)]
pub(crate) struct ExchangePlan<const N: usize> {
    pub slot: usize,
    pub nproc: usize,
    pub me: usize,
    pub extra: usize,
    pub send_blocks: Vec<[Range<usize>; N]>,
    pub send_counts: Vec<usize>,
    pub send_displs: Vec<usize>,
    pub recv_blocks: Vec<[Range<usize>; N]>,
    pub recv_counts: Vec<usize>,
    pub recv_displs: Vec<usize>,
    pub send_total: usize,
    pub recv_total: usize,
}

fn block_len<const N: usize>(block: &[Range<usize>; N]) -> usize {
    block.iter().map(|r| r.len()).product()
}

/// Derive the block layout of the exchange from `src` to `dst`.
///
/// # Errors
/// `Config` if the pencils do not share mesh and global shape, or if
/// their decompositions do not differ in exactly one slot.
pub(crate) fn plan_exchange<const N: usize>(
    src: &Pencil<N>,
    dst: &Pencil<N>,
    extra: usize,
) -> Result<ExchangePlan<N>> {
    if src.mesh() != dst.mesh() {
        return Err(PencilError::Config(
            "transpose between pencils on different process meshes".into(),
        ));
    }
    if src.global_shape() != dst.global_shape() {
        return Err(PencilError::Config(format!(
            "transpose between global shapes {:?} and {:?}",
            src.global_shape(),
            dst.global_shape()
        )));
    }
    let changed: Vec<usize> = (0..src.decomp().len())
        .filter(|&k| src.decomp()[k] != dst.decomp()[k])
        .collect();
    let &[slot] = changed.as_slice() else {
        return Err(PencilError::Config(format!(
            "transpose requires exactly one changed decomposed axis, \
             {:?} -> {:?} changes {}",
            src.decomp(),
            dst.decomp(),
            changed.len()
        )));
    };
    let mesh = src.mesh();
    let nproc = mesh.dims()[slot];
    let me = mesh.coords()[slot];
    let axis_in = src.decomp()[slot];
    let axis_out = dst.decomp()[slot];

    let mut send_blocks = Vec::with_capacity(nproc);
    let mut recv_blocks = Vec::with_capacity(nproc);
    for q in 0..nproc {
        let peer = mesh.coords_with(slot, q);
        send_blocks.push(std::array::from_fn(|axis| {
            if axis == axis_out {
                dst.local_range_of(&peer, axis)
            } else {
                src.local_range(axis)
            }
        }));
        recv_blocks.push(std::array::from_fn(|axis| {
            if axis == axis_in {
                src.local_range_of(&peer, axis)
            } else {
                dst.local_range(axis)
            }
        }));
    }
    let send_counts: Vec<usize> = send_blocks.iter().map(|b| block_len(b) * extra).collect();
    let recv_counts: Vec<usize> = recv_blocks.iter().map(|b| block_len(b) * extra).collect();
    let mut send_displs = Vec::with_capacity(nproc);
    let mut recv_displs = Vec::with_capacity(nproc);
    let mut send_total = 0;
    let mut recv_total = 0;
    for q in 0..nproc {
        send_displs.push(send_total);
        recv_displs.push(recv_total);
        send_total += send_counts[q];
        recv_total += recv_counts[q];
    }
    debug_assert_eq!(send_total, src.local_len() * extra);
    debug_assert_eq!(recv_total, dst.local_len() * extra);
    Ok(ExchangePlan {
        slot,
        nproc,
        me,
        extra,
        send_blocks,
        send_counts,
        send_displs,
        recv_blocks,
        recv_counts,
        recv_displs,
        send_total,
        recv_total,
    })
}

fn full_mem_dims<const N: usize>(pen: &Pencil<N>, extra: usize) -> Vec<usize> {
    let mut dims = Vec::with_capacity(N + 1);
    dims.push(extra);
    dims.extend_from_slice(&pen.mem_shape());
    dims
}

/// Axes that reorder a view in `from` memory order (extra axis leading)
/// into `to` memory order.
fn relative_axes<const N: usize>(from: &Pencil<N>, to: &Pencil<N>) -> Vec<usize> {
    let inv_from = from.perm().inverse().as_array();
    let to_perm = to.perm().as_array();
    let mut axes = Vec::with_capacity(N + 1);
    axes.push(0);
    axes.extend(to_perm.iter().map(|&axis| 1 + inv_from[axis]));
    axes
}

/// Pack every send block of `src` into `ibuf`, peer by peer, each block
/// laid out in the destination pencil's memory order.
pub(crate) fn pack_blocks<T: Scalar, const N: usize>(
    plan: &ExchangePlan<N>,
    src_pen: &Pencil<N>,
    dst_pen: &Pencil<N>,
    src: &[T],
    ibuf: &mut [T],
) {
    let start = src_pen.local_start();
    let src_perm = src_pen.perm().as_array();
    let axes = relative_axes(src_pen, dst_pen);
    let view = ArrayView::from_shape(IxDyn(&full_mem_dims(src_pen, plan.extra)), src).unwrap();
    for q in 0..plan.nproc {
        let block = &plan.send_blocks[q];
        let sub = view.slice_each_axis(|ad| {
            let p = ad.axis.index();
            if p == 0 {
                Slice::from(..)
            } else {
                let axis = src_perm[p - 1];
                let r = &block[axis];
                Slice::from((r.start - start[axis]) as isize..(r.end - start[axis]) as isize)
            }
        });
        let sub = sub.permuted_axes(axes.clone());
        let out = &mut ibuf[plan.send_displs[q]..plan.send_displs[q] + plan.send_counts[q]];
        debug_assert_eq!(out.len(), sub.len());
        for (o, &v) in out.iter_mut().zip(sub.iter()) {
            *o = v;
        }
    }
}

/// Scatter every received block of `obuf` into the destination buffer.
/// Blocks arrive in the destination memory order, so this is a plain
/// strided write.
pub(crate) fn unpack_blocks<T: Scalar, const N: usize>(
    plan: &ExchangePlan<N>,
    dst_pen: &Pencil<N>,
    obuf: &[T],
    dst: &mut [T],
) {
    let start = dst_pen.local_start();
    let dst_perm = dst_pen.perm().as_array();
    let dims = full_mem_dims(dst_pen, plan.extra);
    let mut view = ArrayViewMut::from_shape(IxDyn(&dims), dst).unwrap();
    for q in 0..plan.nproc {
        let block = &plan.recv_blocks[q];
        let mut sub = view.slice_each_axis_mut(|ad| {
            let p = ad.axis.index();
            if p == 0 {
                Slice::from(..)
            } else {
                let axis = dst_perm[p - 1];
                let r = &block[axis];
                Slice::from((r.start - start[axis]) as isize..(r.end - start[axis]) as isize)
            }
        });
        let chunk = &obuf[plan.recv_displs[q]..plan.recv_displs[q] + plan.recv_counts[q]];
        debug_assert_eq!(chunk.len(), sub.len());
        for (o, &v) in sub.iter_mut().zip(chunk.iter()) {
            *o = v;
        }
    }
}

/// Run the collective exchange of packed blocks over the slot's
/// sub-communicator.
///
/// # Errors
/// `Comm` on failures surfaced by the message layer.
pub(crate) fn exchange<T: Scalar, const N: usize>(
    topo: &Topology,
    plan: &ExchangePlan<N>,
    ibuf: &[T],
    obuf: &mut [T],
    method: TransposeMethod,
) -> Result<()> {
    let comm = topo.sub_comm(plan.slot);
    let elem = std::mem::size_of::<T>();
    match method {
        TransposeMethod::Pairwise => {
            let me = plan.me;
            obuf[plan.recv_displs[me]..plan.recv_displs[me] + plan.recv_counts[me]]
                .copy_from_slice(
                    &ibuf[plan.send_displs[me]..plan.send_displs[me] + plan.send_counts[me]],
                );
            let send_bytes: &[u8] = bytemuck::cast_slice(ibuf);
            let recv_bytes: &mut [u8] = bytemuck::cast_slice_mut(obuf);
            mpi::request::scope(|scope| {
                let mut recvs = Vec::with_capacity(plan.nproc);
                let mut rest = recv_bytes;
                for q in 0..plan.nproc {
                    let nbytes = plan.recv_counts[q] * elem;
                    let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(nbytes);
                    rest = tail;
                    if q != me && nbytes > 0 {
                        recvs
                            .push(comm.process_at_rank(q as i32).immediate_receive_into(scope, chunk));
                    }
                }
                let mut sends = Vec::with_capacity(plan.nproc);
                for q in 0..plan.nproc {
                    let nbytes = plan.send_counts[q] * elem;
                    if q == me || nbytes == 0 {
                        continue;
                    }
                    let offset = plan.send_displs[q] * elem;
                    sends.push(
                        comm.process_at_rank(q as i32)
                            .immediate_send(scope, &send_bytes[offset..offset + nbytes]),
                    );
                }
                for req in recvs {
                    req.wait_without_status();
                }
                for req in sends {
                    req.wait_without_status();
                }
            });
        }
        TransposeMethod::AllToAllV => {
            let to_count = |c: usize| -> i32 { (c * elem) as i32 };
            let send_counts: Vec<i32> = plan.send_counts.iter().map(|&c| to_count(c)).collect();
            let send_displs: Vec<i32> = plan.send_displs.iter().map(|&c| to_count(c)).collect();
            let recv_counts: Vec<i32> = plan.recv_counts.iter().map(|&c| to_count(c)).collect();
            let recv_displs: Vec<i32> = plan.recv_displs.iter().map(|&c| to_count(c)).collect();
            let send = Partition::new(
                bytemuck::cast_slice::<T, u8>(ibuf),
                &send_counts[..],
                &send_displs[..],
            );
            let mut recv = PartitionMut::new(
                bytemuck::cast_slice_mut::<T, u8>(obuf),
                &recv_counts[..],
                &recv_displs[..],
            );
            comm.all_to_all_varcount_into(&send, &mut recv);
        }
    }
    Ok(())
}

/// Local copy between two layouts of the same distribution (no
/// decomposed axis changes, only the memory permutation).
pub(crate) fn repermute<T: Scalar, const N: usize>(
    src_pen: &Pencil<N>,
    src: &[T],
    dst_pen: &Pencil<N>,
    dst: &mut [T],
    extra: usize,
) {
    debug_assert!(src_pen.same_distribution(dst_pen));
    let view = ArrayView::from_shape(IxDyn(&full_mem_dims(src_pen, extra)), src).unwrap();
    let reordered = view.permuted_axes(relative_axes(src_pen, dst_pen));
    for (d, &s) in dst.iter_mut().zip(reordered.iter()) {
        *d = s;
    }
}

/// Collective transposition of `src` into `dst`.
///
/// Both arrays must live on the same mesh and global shape, with
/// decompositions differing in exactly one slot; the call is collective
/// on that slot's sub-communicator and all members must enter it.
///
/// # Errors
/// `Config` on incompatible pencils, `Shape` on mismatched extra axes,
/// `Comm` from the message layer.
pub fn transpose_into<T: Scalar, const N: usize>(
    dst: &mut DistArray<T, N>,
    src: &DistArray<T, N>,
    topo: &Topology,
    method: TransposeMethod,
) -> Result<()> {
    if src.extra() != dst.extra() {
        return Err(PencilError::Shape(format!(
            "transpose between extra axes {:?} and {:?}",
            src.extra(),
            dst.extra()
        )));
    }
    if src.pencil().mesh() != topo.mesh() {
        return Err(PencilError::Config(
            "array does not live on the given topology".into(),
        ));
    }
    let plan = plan_exchange(src.pencil(), dst.pencil(), src.extra_len())?;
    let mut ibuf = vec![T::zero(); plan.send_total];
    let mut obuf = vec![T::zero(); plan.recv_total];
    pack_blocks(&plan, src.pencil(), dst.pencil(), src.as_slice(), &mut ibuf);
    exchange(topo, &plan, &ibuf, &mut obuf, method)?;
    let dst_pencil = dst.pencil().clone();
    unpack_blocks(&plan, &dst_pencil, &obuf, dst.as_mut_slice());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::permutation::Permutation;
    use crate::topology::ProcMesh;

    #[test]
    fn rejects_multi_slot_changes() {
        let mesh = ProcMesh::new(vec![1, 1], 0).unwrap();
        let pen1 = Pencil::new(&mesh, [4, 4, 4], &[0, 1]).unwrap();
        let pen3 = Pencil::new(&mesh, [4, 4, 4], &[1, 2]).unwrap();
        assert!(matches!(
            plan_exchange(&pen1, &pen3, 1),
            Err(PencilError::Config(_))
        ));
        // identical decompositions are not a transposition either
        assert!(plan_exchange(&pen1, &pen1, 1).is_err());
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let mesh = ProcMesh::new(vec![1], 0).unwrap();
        let pen1 = Pencil::new(&mesh, [4, 6], &[0]).unwrap();
        let pen2 = Pencil::new(&mesh, [4, 7], &[1]).unwrap();
        assert!(plan_exchange(&pen1, &pen2, 1).is_err());
    }

    #[test]
    fn counts_agree_between_sender_and_receiver() {
        // 21 points over 2 ranks along the exchanged axes
        let shape = [16usize, 21, 41];
        for rank in 0..4 {
            let mesh = ProcMesh::new(vec![2, 2], rank).unwrap();
            let src = Pencil::new(&mesh, shape, &[0, 1]).unwrap();
            let dst = Pencil::new(&mesh, shape, &[0, 2]).unwrap();
            let plan = plan_exchange(&src, &dst, 1).unwrap();
            assert_eq!(plan.slot, 1);
            assert_eq!(plan.send_total, src.local_len());
            assert_eq!(plan.recv_total, dst.local_len());
            for q in 0..plan.nproc {
                // what this rank sends to q is what q receives from it
                let peer_rank = mesh.rank_of(&mesh.coords_with(plan.slot, q));
                let peer_mesh = ProcMesh::new(vec![2, 2], peer_rank).unwrap();
                let peer_src = Pencil::new(&peer_mesh, shape, &[0, 1]).unwrap();
                let peer_dst = Pencil::new(&peer_mesh, shape, &[0, 2]).unwrap();
                let peer_plan = plan_exchange(&peer_src, &peer_dst, 1).unwrap();
                let me = mesh.coords()[plan.slot];
                assert_eq!(plan.send_counts[q], peer_plan.recv_counts[me]);
                assert_eq!(plan.send_blocks[q], peer_plan.recv_blocks[me]);
            }
        }
    }

    #[test]
    fn pack_then_unpack_is_a_repermutation() {
        // single process: the exchange degenerates to a buffer copy
        let mesh = ProcMesh::new(vec![1], 0).unwrap();
        let src_pen = Pencil::new(&mesh, [3, 4, 5], &[0]).unwrap();
        let dst_pen = Pencil::with_perm(
            &mesh,
            [3, 4, 5],
            &[1],
            Permutation::new([0, 2, 1]).unwrap(),
        )
        .unwrap();
        let src: Vec<f64> = (0..60).map(|v| v as f64).collect();
        let plan = plan_exchange(&src_pen, &dst_pen, 1).unwrap();
        let mut ibuf = vec![0.0; plan.send_total];
        let mut obuf = vec![0.0; plan.recv_total];
        let mut dst = vec![0.0; dst_pen.local_len()];
        pack_blocks(&plan, &src_pen, &dst_pen, &src, &mut ibuf);
        obuf.copy_from_slice(&ibuf);
        unpack_blocks(&plan, &dst_pen, &obuf, &mut dst);

        let mut expected = vec![0.0; dst_pen.local_len()];
        repermute(&src_pen, &src, &dst_pen, &mut expected, 1);
        assert_eq!(dst, expected);
        // spot-check one logical element: (i, j, k) = (1, 2, 3)
        // destination memory order is (0, 2, 1)
        assert_eq!(dst[(1 * 5 + 3) * 4 + 2], (1 * 4 + 2) as f64 * 5. + 3.);
    }

    #[test]
    fn pack_carries_extra_components() {
        let mesh = ProcMesh::new(vec![1], 0).unwrap();
        let src_pen = Pencil::new(&mesh, [2, 3], &[0]).unwrap();
        let dst_pen =
            Pencil::with_perm(&mesh, [2, 3], &[1], Permutation::new([1, 0]).unwrap()).unwrap();
        let src: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let plan = plan_exchange(&src_pen, &dst_pen, 2).unwrap();
        assert_eq!(plan.send_total, 12);
        let mut ibuf = vec![0.0; plan.send_total];
        let mut dst = vec![0.0; 12];
        pack_blocks(&plan, &src_pen, &dst_pen, &src, &mut ibuf);
        unpack_blocks(&plan, &dst_pen, &ibuf, &mut dst);
        // each component transposes independently: component 1 holds the
        // transpose of values 6..12
        assert_eq!(&dst[6..], &[6., 9., 7., 10., 8., 11.]);
    }
}
