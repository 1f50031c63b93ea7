use float_cmp::{ApproxEq, F64Margin};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::contraction::local::{check_wires, contract_local};
use crate::error::{ensure, Result};
use crate::tensor::dense::permute::{permuted_dims, transpose};
use crate::types::{Dims, Wire};
use crate::utils::coords::{idxs_to_i, is_within, size};

/// A fully materialized, process-local copy of a tensor: its dims and its
/// elements in row-major order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorData {
    dims: Dims,
    data: Vec<Complex64>,
}

impl TensorData {
    /// Creates tensor data from dims and row-major elements.
    pub fn new(dims: Dims, data: Vec<Complex64>) -> Result<Self> {
        ensure!(
            data.len() == size(&dims),
            "got {} elements for dims {dims:?}",
            data.len()
        );
        Ok(Self { dims, data })
    }

    #[inline]
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<Complex64> {
        self.data
    }

    /// The element at `coord`, if valid.
    #[must_use]
    pub fn get(&self, coord: &[usize]) -> Option<Complex64> {
        is_within(coord, &self.dims).then(|| self.data[idxs_to_i(coord, &self.dims)])
    }

    /// Moves axis `i` to position `ptup[i]`.
    pub fn permute(&self, ptup: &[usize]) -> Result<Self> {
        let dims = permuted_dims(&self.dims, ptup)?;
        let data = transpose(&self.data, &self.dims, ptup);
        Ok(Self { dims, data })
    }

    /// Contracts two tensors serially. The result holds the open axes of `self`
    /// followed by the open axes of `other`, both in their original order.
    pub fn contract(&self, other: &Self, wires: &[Wire]) -> Result<Self> {
        check_wires(&self.dims, &other.dims, wires)?;
        let (dims, data) = contract_local(&self.data, &self.dims, &other.data, &other.dims, wires);
        Ok(Self { dims, data })
    }

    /// Like [`TensorData::contract`], but orders the result axes the way a
    /// distributed contraction does when the first `n_dis` and `other_n_dis` axes
    /// of the operands are distributed: open distributed axes of `self`, of
    /// `other`, then open local axes of `self`, of `other`.
    pub fn contract_split(
        &self,
        n_dis: usize,
        other: &Self,
        other_n_dis: usize,
        wires: &[Wire],
    ) -> Result<Self> {
        let result = self.contract(other, wires)?;
        let open = |order: usize, n: usize, side: usize| {
            (0..order)
                .filter(move |&k| {
                    !wires
                        .iter()
                        .any(|w| if side == 0 { w.0 == k } else { w.1 == k })
                })
                .map(move |k| k < n)
        };
        // Distributed flag of every result axis, in result order.
        let flags = open(self.dims.len(), n_dis, 0)
            .chain(open(other.dims.len(), other_n_dis, 1))
            .collect::<Vec<_>>();
        let n_result_dis = flags.iter().filter(|&&d| d).count();
        let (mut next_dis, mut next_loc) = (0, n_result_dis);
        let ptup = flags
            .iter()
            .map(|&d| {
                let slot = if d { &mut next_dis } else { &mut next_loc };
                *slot += 1;
                *slot - 1
            })
            .collect::<Vec<_>>();
        result.permute(&ptup)
    }
}

impl ApproxEq for &TensorData {
    type Margin = F64Margin;

    fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
        let margin = margin.into();
        self.dims == other.dims
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(l, r)| l.re.approx_eq(r.re, margin) && l.im.approx_eq(r.im, margin))
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn real(values: &[f64]) -> Vec<Complex64> {
        values.iter().map(|&x| Complex64::new(x, 0.0)).collect()
    }

    #[test]
    fn test_new_checks_length() {
        assert!(TensorData::new(vec![2, 2], real(&[1.0, 2.0, 3.0])).is_err());
        let t = TensorData::new(vec![2, 2], real(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(t.get(&[1, 0]), Some(Complex64::new(3.0, 0.0)));
        assert_eq!(t.get(&[2, 0]), None);
    }

    #[test]
    fn test_matrix_product() {
        let a = TensorData::new(vec![2, 2], real(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        let c = a.contract(&a, &[(1, 0)]).unwrap();
        assert_eq!(c.dims(), &[2, 2]);
        assert_eq!(c.data(), &real(&[7.0, 10.0, 15.0, 22.0])[..]);
    }

    #[test]
    fn test_contract_split_orders_axes() {
        // A {2 | 3}, B {4 | 5}, no wires: result {2, 4 | 3, 5}
        let a = TensorData::new(vec![2, 3], real(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        let b = TensorData::new(vec![4, 5], real(&(0..20).map(f64::from).collect::<Vec<_>>()))
            .unwrap();
        let c = a.contract_split(1, &b, 1, &[]).unwrap();
        assert_eq!(c.dims(), &[2, 4, 3, 5]);
        // element (i, k, j, l) = a(i, j) * b(k, l)
        let value = c.get(&[1, 2, 0, 3]).unwrap();
        assert_eq!(value.re, 3.0 * 13.0);
    }

    #[test]
    fn test_approx_eq() {
        let a = TensorData::new(vec![2], vec![Complex64::new(0.1, 0.2), Complex64::new(0.3, 0.4)])
            .unwrap();
        let b = TensorData::new(
            vec![2],
            vec![Complex64::new(0.1 + 1e-7, 0.2), Complex64::new(0.3, 0.4 - 1e-7)],
        )
        .unwrap();
        assert_approx_eq!(&TensorData, &a, &b, epsilon = 1e-5);
    }

    #[test]
    #[should_panic(expected = "assertion failed: `(left approx_eq right)`")]
    fn test_approx_eq_different_dims() {
        let a = TensorData::new(vec![2], real(&[1.0, 2.0])).unwrap();
        let b = TensorData::new(vec![1, 2], real(&[1.0, 2.0])).unwrap();
        assert_approx_eq!(&TensorData, &a, &b);
    }

    #[test]
    fn test_deserialize_fixture() {
        let t: TensorData =
            serde_json::from_str(r#"{"dims": [2], "data": [[1.0, 0.5], [-0.25, 0.0]]}"#).unwrap();
        assert_eq!(t.data()[0], Complex64::new(1.0, 0.5));
    }
}
