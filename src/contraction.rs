//! Contraction of two distributed tensors.
//!
//! [`contract_dense`] is the general algorithm. With `OA` and `OB` the open
//! distributed axes of the operands and `R` the distributed axes paired by
//! wires, it runs in five steps:
//!
//! 1. Both operands are permuted within their distributed axes, so that `A` is
//!    laid out as `[OA, R]` and `B` as `[R, OB]`.
//! 2. `A` is rebroadcast with a stretch of `|OB|` and `B` with `|OA|` cycles,
//!    both starting at the lower of the two offsets. Afterwards the process at
//!    relative rank `(oa * |R| + r) * |OB| + ob` holds `A[oa, r]` and `B[r, ob]`.
//! 3. Every active process contracts its two local buffers over the local wires.
//! 4. If `|R| > 1`, the partial results sharing `(oa, ob)` are summed up.
//! 5. The now redundant `R` coordinate is folded into the stretch of the result:
//!    the summed buffers are first placed as `[OA, R, OB]`, permuted to
//!    `[OA, OB, R]`, and the trailing axis is then reinterpreted as replication.
//!
//! The axes of the result are the open distributed axes of `A`, then those of
//! `B`, then the open local axes of `A`, then those of `B`.
//!
//! [`contract`] dispatches on the storage kinds of the operands. An identity
//! wired over one of its halves only relabels the axes of the other operand;
//! every other pair is materialized to dense storage.

pub(crate) mod local;

use std::ptr;

use log::debug;
use mpi::topology::Color;
use mpi::traits::Communicator;

use crate::error::{ensure, Result};
use crate::indexing::{Indexing, Label};
use crate::mpi::communication::all_reduce_sum;
use crate::tensor::dense::DenseTensor;
use crate::tensor::frame::TensorFrame;
use crate::tensor::structured::IdentityTensor;
use crate::tensor::{Primitives, Tensor};
use crate::types::{PlacementParams, Wire};
use crate::utils::coords::size;

use self::local::{check_wires, contract_local};

/// Checks wires against both operands before any communication.
pub(crate) fn validate(a: &TensorFrame, b: &TensorFrame, wires: &[Wire]) -> Result<()> {
    ensure!(
        ptr::eq(a.env(), b.env()),
        "operands belong to different environments"
    );
    check_wires(&a.total_dims(), &b.total_dims(), wires)?;
    let (a_n_dis, b_n_dis) = (a.dis_dims().len(), b.dis_dims().len());
    for &(i, j) in wires {
        ensure!(
            (i < a_n_dis) == (j < b_n_dis),
            "wire ({i}, {j}) pairs a distributed axis with a local one"
        );
    }
    Ok(())
}

/// Labels the axes of one operand: open distributed axes are `Distributed`,
/// wired distributed axes `Reduced`, open local axes `Local` and wired local
/// axes `Closed`.
fn classify(frame: &TensorFrame, wired: impl Iterator<Item = usize>) -> Result<Indexing> {
    let wired = wired.collect::<Vec<_>>();
    let n_dis = frame.dis_dims().len();
    let labels = (0..frame.order())
        .map(|axis| match (axis < n_dis, wired.contains(&axis)) {
            (true, false) => Label::Distributed,
            (true, true) => Label::Reduced,
            (false, false) => Label::Local,
            (false, true) => Label::Closed,
        })
        .collect::<Vec<_>>();
    Indexing::with_labels(frame.total_dims(), &labels)
}

/// Checks that the dense algorithm finds `|OA| * |R| * |OB|` processes from the
/// lower of the two offsets on. Returns that offset.
fn check_footprint(a: &TensorFrame, b: &TensorFrame, wires: &[Wire]) -> Result<usize> {
    let a_axes = classify(a, wires.iter().map(|w| w.0))?;
    let b_axes = classify(b, wires.iter().map(|w| w.1))?;
    let offset = a.placement().offset().min(b.placement().offset());
    let span = a_axes.count(Label::Distributed)
        * a_axes.count(Label::Reduced)
        * b_axes.count(Label::Distributed);
    let world = a.env().size();
    ensure!(
        offset + span <= world,
        "contraction needs {span} processes from rank {offset}, only {world} available"
    );
    Ok(offset)
}

/// Runs every check [`contract`] performs before its first communication, so
/// callers can keep their operands when the contraction cannot proceed.
pub(crate) fn check_contraction(a: &Tensor, b: &Tensor, wires: &[Wire]) -> Result<()> {
    validate(a.frame(), b.frame(), wires)?;
    match shortcut(a, b, wires) {
        Some(_) => Ok(()),
        None => check_footprint(a.frame(), b.frame(), wires).map(drop),
    }
}

/// Returns the permutation that moves axis `order[p]` to position `p` for the
/// first `order.len()` axes and leaves the remaining `n` axes in place.
fn leading_order(order: &[usize], n: usize) -> Vec<usize> {
    let mut ptup = (0..n).collect::<Vec<_>>();
    for (p, &axis) in order.iter().enumerate() {
        ptup[axis] = p;
    }
    ptup
}

/// Contracts two dense tensors over `wires`, where `(i, j)` pairs axis `i` of
/// `a` with axis `j` of `b`. Paired axes must have equal extents and be both
/// distributed or both local. Collective over the world group.
pub fn contract_dense<'env>(
    a: DenseTensor<'env>,
    b: DenseTensor<'env>,
    wires: &[Wire],
) -> Result<DenseTensor<'env>> {
    validate(a.frame(), b.frame(), wires)?;
    let offset = check_footprint(a.frame(), b.frame(), wires)?;
    let env = a.env();
    let a_dims = a.total_dims();
    let b_dims = b.total_dims();
    let (a_n_dis, b_n_dis) = (a.dis_dims().len(), b.dis_dims().len());
    let a_axes = classify(a.frame(), wires.iter().map(|w| w.0))?;
    let b_axes = classify(b.frame(), wires.iter().map(|w| w.1))?;

    let mut dis_wires = wires
        .iter()
        .copied()
        .filter(|&(i, _)| i < a_n_dis)
        .collect::<Vec<_>>();
    dis_wires.sort_unstable();
    let loc_wires = wires
        .iter()
        .filter(|&&(i, _)| i >= a_n_dis)
        .map(|&(i, j)| (i - a_n_dis, j - b_n_dis))
        .collect::<Vec<_>>();

    let a_open = a_axes.axes(Label::Distributed);
    let b_open = b_axes.axes(Label::Distributed);
    let oa_dims = a_axes.keep(Label::Distributed).dims().to_vec();
    let ob_dims = b_axes.keep(Label::Distributed).dims().to_vec();
    let n_oa = size(&oa_dims);
    let n_ob = size(&ob_dims);
    let n_r = a_axes.count(Label::Reduced);
    debug!(rank = env.rank(), a_dims:?, b_dims:?, wires:?, n_oa, n_r, n_ob, offset; "Contracting");

    // Step 1
    let a_order = a_open
        .iter()
        .copied()
        .chain(dis_wires.iter().map(|w| w.0))
        .collect::<Vec<_>>();
    let b_order = dis_wires
        .iter()
        .map(|w| w.1)
        .chain(b_open.iter().copied())
        .collect::<Vec<_>>();
    let a = a.permute(&leading_order(&a_order, a_dims.len()))?;
    let b = b.permute(&leading_order(&b_order, b_dims.len()))?;

    // Step 2
    let a = a.rebcast(PlacementParams::new(n_ob, 1, offset))?;
    let b = b.rebcast(PlacementParams::new(1, n_oa, offset))?;

    // Step 3
    let rel = a.placement().is_active().then(|| env.rank() - offset);
    let (result_loc_dims, mut data) = if rel.is_some() {
        contract_local(
            a.local_data(),
            a.loc_dims(),
            b.local_data(),
            b.loc_dims(),
            &loc_wires,
        )
    } else {
        let open = a_axes.keep(Label::Local).app(&b_axes.keep(Label::Local));
        (open.dims().to_vec(), Vec::new())
    };
    drop(a);
    drop(b);

    let mut dis_dims = oa_dims;
    if n_r == 1 {
        dis_dims.extend_from_slice(&ob_dims);
        return DenseTensor::new(
            env,
            dis_dims,
            result_loc_dims,
            data,
            PlacementParams::new(1, 1, offset),
        );
    }

    // Step 4
    let (colour, key) = match rel {
        Some(rel) => (
            Color::with_value(((rel / (n_r * n_ob)) * n_ob + rel % n_ob) as i32),
            ((rel / n_ob) % n_r) as i32,
        ),
        None => (Color::undefined(), 0),
    };
    if let Some(group) = env.world().split_by_color_with_key(colour, key) {
        all_reduce_sum(&mut data, &group);
    }

    // Step 5
    let n_oa_axes = dis_dims.len();
    let n_ob_axes = ob_dims.len();
    dis_dims.push(n_r);
    dis_dims.extend_from_slice(&ob_dims);
    let order = dis_dims.len() + result_loc_dims.len();
    let staged = DenseTensor::new(
        env,
        dis_dims,
        result_loc_dims,
        data,
        PlacementParams::new(1, 1, offset),
    )?;
    let mut ptup = (0..order).collect::<Vec<_>>();
    ptup[n_oa_axes] = n_oa_axes + n_ob_axes;
    for k in 0..n_ob_axes {
        ptup[n_oa_axes + 1 + k] = n_oa_axes + k;
    }
    let staged = staged.permute(&ptup)?;

    let (frame, data) = staged.into_parts();
    let (mut dis_dims, loc_dims, placement) = frame.into_parts();
    dis_dims.pop();
    drop(placement);
    let frame = TensorFrame::new(env, dis_dims, loc_dims, PlacementParams::new(n_r, 1, offset))?;
    Ok(DenseTensor::from_parts(frame, data))
}

/// Contracts two tensors of any storage kind. Collective over the world group.
pub fn contract<'env>(a: Tensor<'env>, b: Tensor<'env>, wires: &[Wire]) -> Result<Tensor<'env>> {
    validate(a.frame(), b.frame(), wires)?;
    debug!(rank = a.env().rank(), a:? = a.kind(), b:? = b.kind(); "Dispatching contraction");

    match shortcut(&a, &b, wires) {
        Some(Shortcut::RelabelRight(ptup)) => relabel(b, &ptup),
        Some(Shortcut::RelabelLeft(ptup)) => relabel(a, &ptup),
        None => contract_dense(a.into_dense(), b.into_dense(), wires).map(Tensor::Dense),
    }
}

/// A contraction that needs no numeric work.
enum Shortcut {
    /// The left operand is an identity; permute the right one.
    RelabelRight(Vec<usize>),
    /// The right operand is an identity; permute the left one.
    RelabelLeft(Vec<usize>),
}

fn shortcut(a: &Tensor, b: &Tensor, wires: &[Wire]) -> Option<Shortcut> {
    if let Tensor::Identity(identity) = a {
        if let Some(ptup) = identity_relabelling(identity, b.frame(), wires, true) {
            return Some(Shortcut::RelabelRight(ptup));
        }
    }
    if let Tensor::Identity(identity) = b {
        let flipped = wires.iter().map(|&(i, j)| (j, i)).collect::<Vec<_>>();
        if let Some(ptup) = identity_relabelling(identity, a.frame(), &flipped, false) {
            return Some(Shortcut::RelabelLeft(ptup));
        }
    }
    None
}

fn relabel<'env>(tensor: Tensor<'env>, ptup: &[usize]) -> Result<Tensor<'env>> {
    if ptup.iter().enumerate().all(|(i, &p)| i == p) {
        Ok(tensor)
    } else {
        tensor.permute(ptup)
    }
}

/// If `identity` is local and `wires` (identity axis first) cover exactly one of
/// its halves, returns the permutation of `other` that yields the contraction
/// result. `identity_first` tells whether the identity is the left operand.
fn identity_relabelling(
    identity: &IdentityTensor,
    other: &TensorFrame,
    wires: &[Wire],
    identity_first: bool,
) -> Option<Vec<usize>> {
    let k = identity.half();
    if k == 0 || !identity.frame().dis_dims().is_empty() || wires.len() != k {
        return None;
    }
    let mut partner = vec![None; 2 * k];
    for &(i, x) in wires {
        partner[i] = Some(x);
    }
    let inputs = partner[..k].iter().all(Option::is_some);
    let outputs = partner[k..].iter().all(Option::is_some);
    // The open identity axis `i` of the surviving half takes the place of the
    // axis wired to its counterpart.
    let moved = if inputs {
        &partner[..k]
    } else if outputs {
        &partner[k..]
    } else {
        return None;
    };
    let moved = moved.iter().flatten().copied().collect::<Vec<_>>();

    let n_dis = other.dis_dims().len();
    let n_loc = other.loc_dims().len();
    let (moved_start, rest_start) = if identity_first {
        (n_dis, n_dis + k)
    } else {
        (n_dis + n_loc - k, n_dis)
    };
    let mut ptup = (0..n_dis + n_loc).collect::<Vec<_>>();
    for (j, &axis) in moved.iter().enumerate() {
        ptup[axis] = moved_start + j;
    }
    let rest = (n_dis..n_dis + n_loc).filter(|axis| !moved.contains(axis));
    for (j, axis) in rest.enumerate() {
        ptup[axis] = rest_start + j;
    }
    Some(ptup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_order() {
        assert_eq!(leading_order(&[2, 0, 1], 4), vec![1, 2, 0, 3]);
        assert_eq!(leading_order(&[], 2), vec![0, 1]);
    }
}
