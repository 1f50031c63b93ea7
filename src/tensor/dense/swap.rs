use log::debug;
use mpi::topology::Color;
use mpi::traits::Communicator;
use num_complex::Complex64;

use crate::error::{ensure, Result};
use crate::indexing::{Indexing, Label};
use crate::mpi::communication::{all_to_all_chunks, exchange_with};
use crate::tensor::dense::DenseTensor;
use crate::utils::coords::{i_to_idxs, idxs_to_i, size, strides};

/// Exchanges two axes of equal extent.
pub(super) fn swap(mut tensor: DenseTensor, idx1: usize, idx2: usize) -> Result<DenseTensor> {
    let dims = tensor.total_dims();
    ensure!(
        idx1 < dims.len() && idx2 < dims.len(),
        "cannot swap axes {idx1} and {idx2} of a tensor with {} axes",
        dims.len()
    );
    ensure!(
        dims[idx1] == dims[idx2],
        "cannot swap axes {idx1} and {idx2} of different extents {} and {}",
        dims[idx1],
        dims[idx2]
    );
    if idx1 == idx2 {
        return Ok(tensor);
    }

    let (i, j) = (idx1.min(idx2), idx1.max(idx2));
    let n_dis = tensor.dis_dims().len();
    debug!(rank = tensor.env().rank(), i, j, n_dis, dims:?; "Swapping axes");
    if !tensor.placement().is_active() {
        return Ok(tensor);
    }

    if i >= n_dis {
        swap_local(&mut tensor.data, tensor.frame.loc_dims(), i - n_dis, j - n_dis);
    } else if j < n_dis {
        swap_distributed(&mut tensor, i, j);
    } else {
        swap_mixed(&mut tensor, i, j - n_dis);
    }
    Ok(tensor)
}

/// Both axes local: exchange the entries of every unordered pair of positions.
fn swap_local(data: &mut [Complex64], loc_dims: &[usize], i: usize, j: usize) {
    let mut labels = vec![Label::Open; loc_dims.len()];
    labels[i] = Label::Closed;
    labels[j] = Label::Closed;
    let indexing = Indexing::with_labels(loc_dims.to_vec(), &labels)
        .expect("one label per local axis");
    let strides = strides(loc_dims);
    let n = loc_dims[i];
    for base in indexing.offsets(Label::Open, &vec![0; loc_dims.len()]) {
        for a in 0..n {
            for b in a + 1..n {
                data.swap(
                    base + a * strides[i] + b * strides[j],
                    base + b * strides[i] + a * strides[j],
                );
            }
        }
    }
}

/// Both axes distributed: trade the whole buffer with the shard whose digits at
/// `i` and `j` are swapped.
fn swap_distributed(tensor: &mut DenseTensor, i: usize, j: usize) {
    let dis_dims = tensor.frame.dis_dims();
    let Some(mut digits) = tensor.frame.shard_coord() else {
        return;
    };
    let shard = idxs_to_i(&digits, dis_dims);
    digits.swap(i, j);
    let partner = idxs_to_i(&digits, dis_dims);
    if partner == shard {
        return;
    }

    let group = tensor
        .frame
        .placement()
        .group()
        .expect("active processes have a group");
    debug!(shard, partner; "Exchanging buffer with partner");
    exchange_with(&mut tensor.data, &group.process_at_rank(partner as i32));
}

/// Distributed axis `i` and local axis `jl`: within the processes that differ only
/// in digit `i`, member `t` receives every member's slice at `jl == t`.
fn swap_mixed(tensor: &mut DenseTensor, i: usize, jl: usize) {
    let dis_dims = tensor.frame.dis_dims().to_vec();
    let loc_dims = tensor.frame.loc_dims().to_vec();
    let Some(shard) = tensor.frame.placement().shard() else {
        return;
    };
    let digit = i_to_idxs(shard, &dis_dims)[i];
    let colour = shard - digit * strides(&dis_dims)[i];
    let group = tensor
        .frame
        .placement()
        .group()
        .expect("active processes have a group");
    let sub = group
        .split_by_color_with_key(Color::with_value(colour as i32), shard as i32)
        .expect("every group member picks a colour");
    debug_assert_eq!(sub.rank() as usize, digit);

    let n = loc_dims[jl];
    let outer = size(&loc_dims[..jl]);
    let block = size(&loc_dims[jl + 1..]);
    let slice = |b: usize, t: usize| (b * n + t) * block..(b * n + t + 1) * block;

    let mut send = Vec::with_capacity(tensor.data.len());
    for t in 0..n {
        for b in 0..outer {
            send.extend_from_slice(&tensor.data[slice(b, t)]);
        }
    }
    debug!(shard, colour, chunk = outer * block; "Redistributing local slices");
    let recv = all_to_all_chunks(&send, &sub);

    for (t, chunk) in recv.chunks_exact(outer * block).enumerate() {
        for (b, part) in chunk.chunks_exact(block).enumerate() {
            tensor.data[slice(b, t)].copy_from_slice(part);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::swap_local;
    use num_complex::Complex64;

    fn values(n: usize) -> Vec<Complex64> {
        (0..n).map(|x| Complex64::new(x as f64, 0.0)).collect()
    }

    #[test]
    fn test_swap_local_transposes_matrix() {
        let mut data = values(4);
        swap_local(&mut data, &[2, 2], 0, 1);
        assert_eq!(data, vec![0.0, 2.0, 1.0, 3.0].into_iter().map(Complex64::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_swap_local_outer_axes() {
        // dims {2, 3, 2}: element (a, b, c) = 6a + 2b + c
        let mut data = values(12);
        swap_local(&mut data, &[2, 3, 2], 0, 2);
        for a in 0..2 {
            for b in 0..3 {
                for c in 0..2 {
                    let expected = (6 * c + 2 * b + a) as f64;
                    assert_eq!(data[6 * a + 2 * b + c].re, expected);
                }
            }
        }
    }

    #[test]
    fn test_swap_local_involution() {
        let original = values(27);
        let mut data = original.clone();
        swap_local(&mut data, &[3, 3, 3], 1, 2);
        assert_ne!(data, original);
        swap_local(&mut data, &[3, 3, 3], 1, 2);
        assert_eq!(data, original);
    }
}
