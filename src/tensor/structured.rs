//! Storage kinds with input/output structure.
//!
//! [`SymmetricTensor`] stores its elements densely but keeps track of its
//! equal-extent input and output halves. The implicit kinds hold no buffer at
//! all: each element is computed from its coordinate by an [`ElementRule`], so
//! they can be read anywhere without communication and are materialized into
//! dense storage only when a primitive needs a buffer.

use std::fmt;

use num_complex::Complex64;

use crate::environment::Environment;
use crate::error::{ensure, Result};
use crate::indexing::{Indexing, Label};
use crate::placement::Placement;
use crate::tensor::dense::DenseTensor;
use crate::tensor::frame::TensorFrame;
use crate::tensor::tensordata::TensorData;
use crate::tensor::{Kind, Primitives, Tensor};
use crate::types::{Dims, PlacementParams};
use crate::utils::coords::{concat, idxs_to_i, size};

/// Checks that `dims` consist of two equal halves and returns the length of one
/// half.
pub(crate) fn check_halves(dims: &[usize]) -> Result<usize> {
    ensure!(
        dims.len() % 2 == 0,
        "dims {dims:?} cannot be split into input and output halves"
    );
    let k = dims.len() / 2;
    ensure!(
        dims[..k] == dims[k..],
        "input dims {:?} differ from output dims {:?}",
        &dims[..k],
        &dims[k..]
    );
    Ok(k)
}

/// Dense storage split into input and output halves of equal extents.
#[derive(Debug)]
pub struct SymmetricTensor<'env> {
    dense: DenseTensor<'env>,
}

impl<'env> SymmetricTensor<'env> {
    /// Same as [`DenseTensor::new`], additionally checking the halves.
    pub fn new(
        env: &'env Environment,
        dis_dims: Dims,
        loc_dims: Dims,
        data: Vec<Complex64>,
        params: PlacementParams,
    ) -> Result<Self> {
        check_halves(&concat(&dis_dims, &loc_dims))?;
        DenseTensor::new(env, dis_dims, loc_dims, data, params).map(|dense| Self { dense })
    }

    pub(crate) fn from_dense(dense: DenseTensor<'env>) -> Result<Self> {
        check_halves(&dense.total_dims())?;
        Ok(Self { dense })
    }

    #[inline]
    pub fn dense(&self) -> &DenseTensor<'env> {
        &self.dense
    }

    #[inline]
    pub fn into_dense(self) -> DenseTensor<'env> {
        self.dense
    }

    /// Number of input axes.
    #[inline]
    pub fn half(&self) -> usize {
        (self.dense.dis_dims().len() + self.dense.loc_dims().len()) / 2
    }

    /// Swaps inputs `i` and `j`, then outputs `i` and `j`.
    pub fn swap_io(self, i: usize, j: usize) -> Result<Self> {
        let k = self.half();
        ensure!(
            i < k && j < k,
            "input axes ({i}, {j}) out of range for {k} inputs"
        );
        let dense = self.dense.swap(i, j)?.swap(k + i, k + j)?;
        Ok(Self { dense })
    }
}

impl<'env> Primitives<'env> for SymmetricTensor<'env> {
    type Output = Tensor<'env>;

    fn swap(self, idx1: usize, idx2: usize) -> Result<Self::Output> {
        self.dense.swap(idx1, idx2).map(Tensor::Dense)
    }

    fn rebcast(self, params: PlacementParams) -> Result<Self::Output> {
        let dense = self.dense.rebcast(params)?;
        Ok(Tensor::Symmetric(Self { dense }))
    }

    fn rescatter(self, offset: isize) -> Result<Self::Output> {
        self.dense.rescatter(offset).map(Tensor::Dense)
    }

    fn permute(self, ptup: &[usize]) -> Result<Self::Output> {
        self.dense.permute(ptup).map(Tensor::Dense)
    }
}

/// Computes the element of an implicit tensor from its total coordinate.
pub trait ElementRule: fmt::Debug + Sized {
    const KIND: Kind;

    fn element(&self, dims: &[usize], coord: &[usize]) -> Complex64;

    fn into_tensor(tensor: ImplicitTensor<'_, Self>) -> Tensor<'_>;
}

/// `diagonal[flat(in)]` where the input coordinate equals the output
/// coordinate, zero elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalRule {
    diagonal: Vec<Complex64>,
}

impl ElementRule for DiagonalRule {
    const KIND: Kind = Kind::Diagonal;

    fn element(&self, dims: &[usize], coord: &[usize]) -> Complex64 {
        let k = dims.len() / 2;
        if coord[..k] == coord[k..] {
            self.diagonal[idxs_to_i(&coord[..k], &dims[..k])]
        } else {
            Complex64::default()
        }
    }

    fn into_tensor(tensor: ImplicitTensor<'_, Self>) -> Tensor<'_> {
        Tensor::Diagonal(tensor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRule;

impl ElementRule for IdentityRule {
    const KIND: Kind = Kind::Identity;

    fn element(&self, dims: &[usize], coord: &[usize]) -> Complex64 {
        let k = dims.len() / 2;
        if coord[..k] == coord[k..] {
            Complex64::new(1.0, 0.0)
        } else {
            Complex64::default()
        }
    }

    fn into_tensor(tensor: ImplicitTensor<'_, Self>) -> Tensor<'_> {
        Tensor::Identity(tensor)
    }
}

/// Exchanges two axes of extent `n`: one where `(i0, i1) == (i3, i2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapRule;

impl ElementRule for SwapRule {
    const KIND: Kind = Kind::Swap;

    fn element(&self, _dims: &[usize], coord: &[usize]) -> Complex64 {
        if coord[0] == coord[3] && coord[1] == coord[2] {
            Complex64::new(1.0, 0.0)
        } else {
            Complex64::default()
        }
    }

    fn into_tensor(tensor: ImplicitTensor<'_, Self>) -> Tensor<'_> {
        Tensor::Swap(tensor)
    }
}

/// A tensor whose elements are computed on demand.
pub struct ImplicitTensor<'env, R> {
    frame: TensorFrame<'env>,
    rule: R,
}

pub type DiagonalTensor<'env> = ImplicitTensor<'env, DiagonalRule>;
pub type IdentityTensor<'env> = ImplicitTensor<'env, IdentityRule>;
pub type SwapTensor<'env> = ImplicitTensor<'env, SwapRule>;

impl<'env> DiagonalTensor<'env> {
    /// Creates a diagonal tensor. `diagonal` holds one element per input
    /// coordinate and is passed in full by every process. Collective over the
    /// world group.
    pub fn new(
        env: &'env Environment,
        dis_dims: Dims,
        loc_dims: Dims,
        diagonal: Vec<Complex64>,
        params: PlacementParams,
    ) -> Result<Self> {
        let dims = concat(&dis_dims, &loc_dims);
        let k = check_halves(&dims)?;
        ensure!(
            diagonal.len() == size(&dims[..k]),
            "got {} diagonal elements for input dims {:?}",
            diagonal.len(),
            &dims[..k]
        );
        let frame = TensorFrame::new(env, dis_dims, loc_dims, params)?;
        Ok(Self {
            frame,
            rule: DiagonalRule { diagonal },
        })
    }

    pub fn diagonal(&self) -> &[Complex64] {
        &self.rule.diagonal
    }
}

impl<'env> IdentityTensor<'env> {
    /// Creates an identity over the input half. Collective over the world group.
    pub fn new(
        env: &'env Environment,
        dis_dims: Dims,
        loc_dims: Dims,
        params: PlacementParams,
    ) -> Result<Self> {
        check_halves(&concat(&dis_dims, &loc_dims))?;
        let frame = TensorFrame::new(env, dis_dims, loc_dims, params)?;
        Ok(Self {
            frame,
            rule: IdentityRule,
        })
    }
}

impl<'env> SwapTensor<'env> {
    /// Creates the `{n, n, n, n}` tensor exchanging two axes of extent `n`, with
    /// its first `n_dis` axes distributed. Collective over the world group.
    pub fn new(env: &'env Environment, n: usize, n_dis: usize, params: PlacementParams) -> Result<Self> {
        ensure!(n_dis <= 4, "a swap tensor has 4 axes, cannot distribute {n_dis}");
        let dims = vec![n; 4];
        let (dis_dims, loc_dims) = dims.split_at(n_dis);
        let frame = TensorFrame::new(env, dis_dims.to_vec(), loc_dims.to_vec(), params)?;
        Ok(Self {
            frame,
            rule: SwapRule,
        })
    }
}

impl<'env, R: ElementRule> ImplicitTensor<'env, R> {
    #[inline]
    pub fn frame(&self) -> &TensorFrame<'env> {
        &self.frame
    }

    #[inline]
    pub fn rule(&self) -> &R {
        &self.rule
    }

    #[inline]
    pub fn placement(&self) -> &Placement<'env> {
        self.frame.placement()
    }

    /// Number of input axes.
    #[inline]
    pub fn half(&self) -> usize {
        self.frame.order() / 2
    }

    /// Returns the element at `coord` if the calling process holds it.
    pub fn at(&self, coord: &[usize]) -> Result<Complex64> {
        self.frame.local_offset(coord)?;
        Ok(self.rule.element(&self.frame.total_dims(), coord))
    }

    /// Returns the element at `coord`. Needs no communication.
    pub fn fetch(&self, coord: &[usize]) -> Result<Complex64> {
        self.frame.split_coord(coord)?;
        Ok(self.rule.element(&self.frame.total_dims(), coord))
    }

    /// Evaluates the full logical tensor locally.
    pub fn gather(&self) -> Result<TensorData> {
        let dims = self.frame.total_dims();
        let zeros = vec![0; dims.len()];
        let elements = Indexing::new(dims.clone())
            .coords(Label::Default, &zeros)
            .map(|coord| self.rule.element(&dims, &coord))
            .collect();
        TensorData::new(dims, elements)
    }

    /// Evaluates the shard of the calling process into dense storage.
    pub fn into_dense(self) -> DenseTensor<'env> {
        let Self { frame, rule } = self;
        let data = match frame.shard_coord() {
            Some(dis) => {
                let dims = frame.total_dims();
                let loc_dims = frame.loc_dims().to_vec();
                let zeros = vec![0; loc_dims.len()];
                Indexing::new(loc_dims)
                    .coords(Label::Default, &zeros)
                    .map(|loc| rule.element(&dims, &concat(&dis, &loc)))
                    .collect()
            }
            None => Vec::new(),
        };
        DenseTensor::from_parts(frame, data)
    }
}

impl<'env, R: ElementRule> Primitives<'env> for ImplicitTensor<'env, R> {
    type Output = Tensor<'env>;

    fn swap(self, idx1: usize, idx2: usize) -> Result<Self::Output> {
        self.into_dense().swap(idx1, idx2).map(Tensor::Dense)
    }

    /// Keeps the kind and replaces only the placement.
    fn rebcast(self, params: PlacementParams) -> Result<Self::Output> {
        let Self { frame, rule } = self;
        let (dis_dims, loc_dims, placement) = frame.into_parts();
        let env = placement.env();
        TensorFrame::would_be_active(env, &dis_dims, &loc_dims, params)?;
        drop(placement);
        let frame = TensorFrame::new(env, dis_dims, loc_dims, params)?;
        Ok(R::into_tensor(Self { frame, rule }))
    }

    fn rescatter(self, offset: isize) -> Result<Self::Output> {
        self.into_dense().rescatter(offset).map(Tensor::Dense)
    }

    fn permute(self, ptup: &[usize]) -> Result<Self::Output> {
        self.into_dense().permute(ptup).map(Tensor::Dense)
    }
}

impl<R: ElementRule> fmt::Debug for ImplicitTensor<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImplicitTensor")
            .field("kind", &R::KIND)
            .field("frame", &self.frame)
            .field("rule", &self.rule)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;

    fn evaluate<R: ElementRule>(rule: &R, dims: &[usize]) -> Vec<Complex64> {
        let zeros = vec![0; dims.len()];
        Indexing::new(dims.to_vec())
            .coords(Label::Default, &zeros)
            .map(|coord| rule.element(dims, &coord))
            .collect()
    }

    fn real(values: &[f64]) -> Vec<Complex64> {
        values.iter().map(|&re| Complex64::new(re, 0.0)).collect()
    }

    #[test]
    fn test_check_halves() {
        assert_eq!(check_halves(&[2, 3, 2, 3]), Ok(2));
        assert_eq!(check_halves(&[]), Ok(0));
        assert!(matches!(
            check_halves(&[2, 3, 3, 2]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            check_halves(&[2, 2, 2]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_swap_rule() {
        assert_eq!(
            evaluate(&SwapRule, &[2, 2, 2, 2]),
            real(&[1., 0., 0., 0., 0., 0., 1., 0., 0., 1., 0., 0., 0., 0., 0., 1.])
        );
    }

    #[test]
    fn test_identity_rule() {
        assert_eq!(
            evaluate(&IdentityRule, &[3, 3]),
            real(&[1., 0., 0., 0., 1., 0., 0., 0., 1.])
        );
    }

    #[test]
    fn test_diagonal_rule() {
        let rule = DiagonalRule {
            diagonal: real(&[1., 2., 3., 4.]),
        };
        let values = evaluate(&rule, &[2, 2, 2, 2]);
        assert_eq!(values.len(), 16);
        for (i, value) in values.iter().enumerate() {
            let expected = match i {
                0 => 1.,
                5 => 2.,
                10 => 3.,
                15 => 4.,
                _ => 0.,
            };
            assert_eq!(value.re, expected, "element {i}");
        }
    }
}
