//! Arbitrary axis permutation as a distributed transpose.
//!
//! Axes fall into four classes depending on which partition they occupy before
//! and after the permutation: distributed to distributed (DD), distributed to
//! local (DL), local to distributed (LD) and local to local (LL). A process holding
//! old shard `x` sends data to the holder of new shard `x'` iff both agree on every
//! DD axis; the transferred block spans the LL axes, with the LD axes fixed by `x'`
//! and the DL axes fixed by `x`. Senders and receivers are paired by equal
//! `(cycle, slot)` positions, so the exchange is well defined for any change in
//! the number of shards.

use itertools::Itertools;
use log::debug;
use mpi::Count;
use num_complex::Complex64;

use crate::error::{ensure, Result};
use crate::indexing::{Indexing, Label};
use crate::mpi::communication::all_to_all_varcount;
use crate::placement::{Layout, Placement};
use crate::tensor::dense::DenseTensor;
use crate::tensor::frame::TensorFrame;
use crate::utils::coords::{i_to_idxs, size, strides};

/// Checks that `ptup` is a permutation of `0..order` and returns the permuted
/// dims, where old axis `i` moves to position `ptup[i]`.
pub(crate) fn permuted_dims(dims: &[usize], ptup: &[usize]) -> Result<Vec<usize>> {
    ensure!(
        ptup.len() == dims.len(),
        "permutation {ptup:?} does not cover {} axes",
        dims.len()
    );
    ensure!(
        ptup.iter().all(|&p| p < dims.len()) && ptup.iter().all_unique(),
        "{ptup:?} is not a permutation"
    );
    let mut new_dims = vec![0; dims.len()];
    for (&p, &d) in ptup.iter().zip(dims) {
        new_dims[p] = d;
    }
    Ok(new_dims)
}

/// Reorders the elements of a row-major buffer of `dims` according to `ptup`.
pub(crate) fn transpose(data: &[Complex64], dims: &[usize], ptup: &[usize]) -> Vec<Complex64> {
    let mut new_dims = vec![0; dims.len()];
    for (i, &p) in ptup.iter().enumerate() {
        new_dims[p] = dims[i];
    }
    let new_strides = strides(&new_dims);
    // Stride in the new buffer of every old axis.
    let moved = ptup.iter().map(|&p| new_strides[p]).collect::<Vec<_>>();

    let mut out = vec![Complex64::default(); data.len()];
    let indexing = Indexing::new(dims.to_vec());
    for (coord, value) in indexing.coords(Label::Default, &vec![0; dims.len()]).zip(data) {
        let offset = coord.iter().zip(&moved).map(|(c, s)| c * s).sum::<usize>();
        out[offset] = *value;
    }
    out
}

pub(super) fn permute<'env>(tensor: DenseTensor<'env>, ptup: &[usize]) -> Result<DenseTensor<'env>> {
    let env = tensor.env();
    let dims = tensor.total_dims();
    let new_dims = permuted_dims(&dims, ptup)?;
    let n_dis = tensor.dis_dims().len();
    if ptup.iter().enumerate().all(|(i, &p)| i == p) {
        return Ok(tensor);
    }

    if ptup[..n_dis].iter().enumerate().all(|(i, &p)| i == p) {
        debug!(rank = env.rank(), ptup:?; "Permuting local axes");
        let (frame, data) = tensor.into_parts();
        let local_ptup = ptup[n_dis..].iter().map(|p| p - n_dis).collect::<Vec<_>>();
        let data = if data.is_empty() {
            data
        } else {
            transpose(&data, frame.loc_dims(), &local_ptup)
        };
        let (dis_dims, _, placement) = frame.into_parts();
        let frame = TensorFrame::with_placement(dis_dims, new_dims[n_dis..].to_vec(), placement);
        return Ok(DenseTensor::from_parts(frame, data));
    }

    let old = *tensor.placement().layout();
    let new = Layout::new(size(&new_dims[..n_dis]), old.params());
    new.validate(env.size())?;
    debug!(rank = env.rank(), ptup:?, dims:?, new_dims:?; "Permuting across partitions");

    let plan = Transpose::new(&dims, &new_dims, n_dis, ptup);
    let (frame, data) = tensor.into_parts();
    let (_, _, old_placement) = frame.into_parts();
    let placement = if new == old {
        old_placement
    } else {
        drop(old_placement);
        Placement::new(env, new.base(), new.params())?
    };

    let world_size = env.size();
    let rank = env.rank();

    // Pack one block per target rank, in rank order.
    let mut send_counts = vec![0 as Count; world_size];
    let mut blocks = vec![Vec::new(); world_size];
    if let Some((cycle, shard, slot)) = old.position_of(rank) {
        let x = i_to_idxs(shard, &plan.old_dis);
        for new_shard in 0..new.base() {
            let x_new = i_to_idxs(new_shard, &plan.new_dis);
            if !plan.matches(&x, &x_new) {
                continue;
            }
            let target = new.rank_at(cycle, new_shard, slot);
            let block = &mut blocks[target];
            block.extend(plan.old_offsets(&x_new).map(|offset| data[offset]));
            send_counts[target] = block.len() as Count;
        }
    }
    let send = blocks.concat();
    drop(data);

    // Every source sends a full LL block.
    let mut recv_counts = vec![0 as Count; world_size];
    let mut sources = Vec::new();
    if let Some((cycle, new_shard, slot)) = new.position_of(rank) {
        let x_new = i_to_idxs(new_shard, &plan.new_dis);
        for shard in 0..old.base() {
            let x = i_to_idxs(shard, &plan.old_dis);
            if plan.matches(&x, &x_new) {
                let source = old.rank_at(cycle, shard, slot);
                recv_counts[source] = plan.block_len() as Count;
                sources.push(x);
            }
        }
    }

    let recv = all_to_all_varcount(&send, &send_counts, &recv_counts, env.world());

    let data = match new.position_of(rank) {
        Some((_, new_shard, _)) => {
            let x_new = i_to_idxs(new_shard, &plan.new_dis);
            let mut out = vec![Complex64::default(); size(&new_dims[n_dis..])];
            let mut values = recv.into_iter();
            for x in &sources {
                for offset in plan.new_offsets(x, &x_new) {
                    out[offset] = values.next().expect("received block is complete");
                }
            }
            out
        }
        None => Vec::new(),
    };

    let frame = TensorFrame::with_placement(
        new_dims[..n_dis].to_vec(),
        new_dims[n_dis..].to_vec(),
        placement,
    );
    Ok(DenseTensor::from_parts(frame, data))
}

/// Precomputed axis classes of a permutation.
struct Transpose {
    old_dis: Vec<usize>,
    new_dis: Vec<usize>,
    old_loc: Vec<usize>,
    new_loc_strides: Vec<usize>,
    ptup: Vec<usize>,
    n_dis: usize,
    /// Old local axes, LD fixed and LL open.
    old_local: Indexing,
}

impl Transpose {
    fn new(dims: &[usize], new_dims: &[usize], n_dis: usize, ptup: &[usize]) -> Self {
        let labels = ptup[n_dis..]
            .iter()
            .map(|&p| if p < n_dis { Label::Fixed } else { Label::Open })
            .collect::<Vec<_>>();
        Self {
            old_dis: dims[..n_dis].to_vec(),
            new_dis: new_dims[..n_dis].to_vec(),
            old_loc: dims[n_dis..].to_vec(),
            new_loc_strides: strides(&new_dims[n_dis..]),
            ptup: ptup.to_vec(),
            n_dis,
            old_local: Indexing::with_labels(dims[n_dis..].to_vec(), &labels)
                .expect("one label per local axis"),
        }
    }

    /// Whether old shard `x` and new shard `x_new` agree on all DD axes.
    fn matches(&self, x: &[usize], x_new: &[usize]) -> bool {
        self.ptup[..self.n_dis]
            .iter()
            .enumerate()
            .all(|(i, &p)| p >= self.n_dis || x[i] == x_new[p])
    }

    /// Number of elements exchanged between a matching pair of shards.
    fn block_len(&self) -> usize {
        self.old_local.count(Label::Open)
    }

    /// Old local coordinate with every LD axis set from `x_new`.
    fn start(&self, x_new: &[usize]) -> Vec<usize> {
        self.ptup[self.n_dis..]
            .iter()
            .map(|&p| if p < self.n_dis { x_new[p] } else { 0 })
            .collect()
    }

    /// Offsets in the old local buffer of the block destined for `x_new`.
    fn old_offsets(&self, x_new: &[usize]) -> impl Iterator<Item = usize> + '_ {
        self.old_local.offsets(Label::Open, &self.start(x_new))
    }

    /// Offsets in the new local buffer of the block received from `x`, in the
    /// order it was packed.
    fn new_offsets<'a>(&'a self, x: &'a [usize], x_new: &[usize]) -> impl Iterator<Item = usize> + 'a {
        let n_dis = self.n_dis;
        // Contribution of the DL axes, fixed by the source shard.
        let fixed = self.ptup[..n_dis]
            .iter()
            .enumerate()
            .filter(|&(_, &p)| p >= n_dis)
            .map(|(i, &p)| x[i] * self.new_loc_strides[p - n_dis])
            .sum::<usize>();
        self.old_local
            .coords(Label::Open, &self.start(x_new))
            .map(move |y| {
                fixed
                    + y.iter()
                        .zip(&self.ptup[n_dis..])
                        .filter(|&(_, &p)| p >= n_dis)
                        .map(|(c, &p)| c * self.new_loc_strides[p - n_dis])
                        .sum::<usize>()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(n: usize) -> Vec<Complex64> {
        (0..n).map(|x| Complex64::new(x as f64, 0.0)).collect()
    }

    #[test]
    fn test_permuted_dims() {
        assert_eq!(permuted_dims(&[2, 3, 4], &[2, 0, 1]).unwrap(), vec![3, 4, 2]);
        assert!(permuted_dims(&[2, 3, 4], &[0, 0, 1]).is_err());
        assert!(permuted_dims(&[2, 3, 4], &[0, 1]).is_err());
        assert!(permuted_dims(&[2, 3], &[0, 2]).is_err());
    }

    #[test]
    fn test_transpose_matrix() {
        let out = transpose(&values(6), &[2, 3], &[1, 0]);
        let re = out.iter().map(|c| c.re).collect::<Vec<_>>();
        assert_eq!(re, vec![0.0, 3.0, 1.0, 4.0, 2.0, 5.0]);
    }

    #[test]
    fn test_transpose_round_trip() {
        let dims = [2, 3, 4];
        let ptup = [2, 0, 1];
        let inverse = [1, 2, 0];
        let original = values(24);
        let permuted = transpose(&original, &dims, &ptup);
        let back = transpose(&permuted, &permuted_dims(&dims, &ptup).unwrap(), &inverse);
        assert_eq!(back, original);
    }

    #[test]
    fn test_plan_block_sizes() {
        // {2 | 3, 4} -> {4 | 2, 3}: axis 0 goes local, axis 2 goes distributed
        let dims = [2, 3, 4];
        let ptup = [1, 2, 0];
        let new_dims = permuted_dims(&dims, &ptup).unwrap();
        let plan = Transpose::new(&dims, &new_dims, 1, &ptup);
        assert_eq!(plan.block_len(), 3);
        assert!(plan.matches(&[1], &[3]));

        // The block for new shard 2 holds old local (b, 2) for every b.
        let offsets = plan.old_offsets(&[2]).collect::<Vec<_>>();
        assert_eq!(offsets, vec![2, 6, 10]);

        // Received from old shard 1, it lands at new local (1, b).
        let offsets = plan.new_offsets(&[1], &[2]).collect::<Vec<_>>();
        assert_eq!(offsets, vec![3, 4, 5]);
    }
}
