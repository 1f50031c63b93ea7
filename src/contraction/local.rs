//! The process-local part of a contraction.

use num_complex::Complex64;
use rayon::prelude::*;

use crate::error::{ensure, Result};
use crate::indexing::{AxisFlag, Indexing, Label};
use crate::types::{Dims, Wire};

/// Checks that every wire pairs valid axes of equal extent and that no axis is
/// used twice.
pub(crate) fn check_wires(a_dims: &[usize], b_dims: &[usize], wires: &[Wire]) -> Result<()> {
    let mut used_a = vec![false; a_dims.len()];
    let mut used_b = vec![false; b_dims.len()];
    for &(i, j) in wires {
        ensure!(
            i < a_dims.len() && j < b_dims.len(),
            "wire ({i}, {j}) is out of range for dims {a_dims:?} and {b_dims:?}"
        );
        ensure!(
            a_dims[i] == b_dims[j],
            "wire ({i}, {j}) pairs axes of different extents {} and {}",
            a_dims[i],
            b_dims[j]
        );
        ensure!(
            !used_a[i] && !used_b[j],
            "wire ({i}, {j}) reuses an axis"
        );
        used_a[i] = true;
        used_b[j] = true;
    }
    Ok(())
}

/// Contracts two row-major buffers over `wires`. Returns the dims and elements of
/// the result, whose axes are the open axes of `a` followed by those of `b`.
pub(crate) fn contract_local(
    a: &[Complex64],
    a_dims: &[usize],
    b: &[Complex64],
    b_dims: &[usize],
    wires: &[Wire],
) -> (Dims, Vec<Complex64>) {
    let mut a_flags = vec![AxisFlag::from(Label::Open); a_dims.len()];
    let mut b_flags = vec![AxisFlag::from(Label::Open); b_dims.len()];
    for (tag, &(i, j)) in wires.iter().enumerate() {
        a_flags[i] = AxisFlag::new(Label::Closed, tag);
        b_flags[j] = AxisFlag::new(Label::Closed, tag);
    }
    let a_indexing =
        Indexing::with_flags(a_dims.to_vec(), a_flags).expect("one flag per axis");
    let b_indexing =
        Indexing::with_flags(b_dims.to_vec(), b_flags).expect("one flag per axis");
    let a_start = vec![0; a_dims.len()];
    let b_start = vec![0; b_dims.len()];

    // Closed axes carry matching tags, so both sequences walk the summed
    // coordinates in the same order.
    let a_closed = a_indexing
        .offsets(Label::Closed, &a_start)
        .collect::<Vec<_>>();
    let b_closed = b_indexing
        .offsets(Label::Closed, &b_start)
        .collect::<Vec<_>>();
    let b_open = b_indexing.offsets(Label::Open, &b_start).collect::<Vec<_>>();

    let a_open = a_indexing.offsets(Label::Open, &a_start).collect::<Vec<_>>();

    // One row of the result per open coordinate of `a`, filled on the rayon pool.
    let mut out = vec![Complex64::default(); a_open.len() * b_open.len()];
    out.par_chunks_mut(b_open.len().max(1))
        .zip(a_open.par_iter())
        .for_each(|(row, &a_offset)| {
            for (slot, &b_offset) in row.iter_mut().zip(&b_open) {
                *slot = a_closed
                    .iter()
                    .zip(&b_closed)
                    .map(|(ca, cb)| a[a_offset + ca] * b[b_offset + cb])
                    .sum();
            }
        });

    (open_dims(a_dims, b_dims, wires), out)
}

/// Extents of the axes of `a` and then `b` not paired by any wire.
fn open_dims(a_dims: &[usize], b_dims: &[usize], wires: &[Wire]) -> Dims {
    let a_open = (0..a_dims.len())
        .filter(|&k| wires.iter().all(|w| w.0 != k))
        .map(|k| a_dims[k]);
    let b_open = (0..b_dims.len())
        .filter(|&k| wires.iter().all(|w| w.1 != k))
        .map(|k| b_dims[k]);
    a_open.chain(b_open).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(values: &[f64]) -> Vec<Complex64> {
        values.iter().map(|&x| Complex64::new(x, 0.0)).collect()
    }

    #[test]
    fn test_check_wires() {
        assert!(check_wires(&[2, 2], &[2, 2], &[(1, 0)]).is_ok());
        assert!(check_wires(&[2, 2], &[3], &[(0, 0)]).is_err());
        assert!(check_wires(&[2, 2], &[2, 2], &[(2, 0)]).is_err());
        assert!(check_wires(&[2, 2], &[2, 2], &[(0, 0), (0, 1)]).is_err());
    }

    #[test]
    fn test_inner_product() {
        let v = real(&[1.0, 2.0, 3.0]);
        let (dims, out) = contract_local(&v, &[3], &v, &[3], &[(0, 0)]);
        assert!(dims.is_empty());
        assert_eq!(out, real(&[14.0]));
    }

    #[test]
    fn test_two_wires_in_reverse_order() {
        // sum_ij a(i, j) b(j, i) = trace(a b)
        let a = real(&[1.0, 2.0, 3.0, 4.0]);
        let b = real(&[5.0, 6.0, 7.0, 8.0]);
        let (dims, out) = contract_local(&a, &[2, 2], &b, &[2, 2], &[(0, 1), (1, 0)]);
        assert!(dims.is_empty());
        assert_eq!(out, real(&[1.0 * 5.0 + 2.0 * 7.0 + 3.0 * 6.0 + 4.0 * 8.0]));
    }

    #[test]
    fn test_outer_product() {
        let a = real(&[1.0, 2.0]);
        let b = real(&[3.0, 4.0, 5.0]);
        let (dims, out) = contract_local(&a, &[2], &b, &[3], &[]);
        assert_eq!(dims, vec![2, 3]);
        assert_eq!(out, real(&[3.0, 4.0, 5.0, 6.0, 8.0, 10.0]));
    }
}
