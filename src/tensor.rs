//! Distributed tensors.
//!
//! A tensor splits its axes into a distributed prefix, which selects the shard
//! and hence the process holding an element, and a local suffix, which is stored
//! row-major in a flat buffer on that process. [`Tensor`] is the closed set of
//! storage kinds; all of them share a [`TensorFrame`](frame::TensorFrame) and
//! implement the four structural [`Primitives`]. Kinds that cannot transform
//! themselves directly are materialized to [`DenseTensor`] first.

pub mod dense;
pub mod frame;
pub mod structured;
pub mod tensordata;

use num_complex::Complex64;

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::placement::Placement;
use crate::tensor::dense::DenseTensor;
use crate::tensor::frame::TensorFrame;
use crate::tensor::structured::{DiagonalTensor, IdentityTensor, SwapTensor, SymmetricTensor};
use crate::tensor::tensordata::TensorData;
use crate::types::{Dims, PlacementParams};

/// The structural transformations every storage kind supports. Each consumes
/// the tensor and returns a logically equivalent replacement.
///
/// All of them are collective: every process of the world must call the same
/// primitive with the same arguments. Argument errors are raised on all
/// processes alike before any communication.
pub trait Primitives<'env>: Sized {
    type Output;

    /// Exchanges the axes `idx1` and `idx2`, which must have equal extent.
    fn swap(self, idx1: usize, idx2: usize) -> Result<Self::Output>;

    /// Changes how shards are replicated across processes.
    fn rebcast(self, params: PlacementParams) -> Result<Self::Output>;

    /// Moves `-offset` trailing distributed axes into the local axes if negative,
    /// or `offset` leading local axes into the distributed axes if positive.
    fn rescatter(self, offset: isize) -> Result<Self::Output>;

    /// Moves axis `i` to position `ptup[i]`.
    fn permute(self, ptup: &[usize]) -> Result<Self::Output>;
}

/// Storage kind of a [`Tensor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Dense,
    Symmetric,
    Diagonal,
    Identity,
    Swap,
}

#[derive(Debug)]
pub enum Tensor<'env> {
    Dense(DenseTensor<'env>),
    Symmetric(SymmetricTensor<'env>),
    Diagonal(DiagonalTensor<'env>),
    Identity(IdentityTensor<'env>),
    Swap(SwapTensor<'env>),
}

impl<'env> Tensor<'env> {
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Tensor::Dense(_) => Kind::Dense,
            Tensor::Symmetric(_) => Kind::Symmetric,
            Tensor::Diagonal(_) => Kind::Diagonal,
            Tensor::Identity(_) => Kind::Identity,
            Tensor::Swap(_) => Kind::Swap,
        }
    }

    #[must_use]
    pub fn frame(&self) -> &TensorFrame<'env> {
        match self {
            Tensor::Dense(t) => t.frame(),
            Tensor::Symmetric(t) => t.dense().frame(),
            Tensor::Diagonal(t) => t.frame(),
            Tensor::Identity(t) => t.frame(),
            Tensor::Swap(t) => t.frame(),
        }
    }

    #[must_use]
    pub fn env(&self) -> &'env Environment {
        self.frame().env()
    }

    #[must_use]
    pub fn dis_dims(&self) -> &[usize] {
        self.frame().dis_dims()
    }

    #[must_use]
    pub fn loc_dims(&self) -> &[usize] {
        self.frame().loc_dims()
    }

    #[must_use]
    pub fn total_dims(&self) -> Dims {
        self.frame().total_dims()
    }

    #[must_use]
    pub fn placement(&self) -> &Placement<'env> {
        self.frame().placement()
    }

    /// Returns the element at `coord` if the calling process holds it.
    pub fn at(&self, coord: &[usize]) -> Result<Complex64> {
        match self {
            Tensor::Dense(t) => t.at(coord),
            Tensor::Symmetric(t) => t.dense().at(coord),
            Tensor::Diagonal(t) => t.at(coord),
            Tensor::Identity(t) => t.at(coord),
            Tensor::Swap(t) => t.at(coord),
        }
    }

    /// Returns the element at `coord` on every process. Collective over the world
    /// group for stored kinds.
    pub fn fetch(&self, coord: &[usize]) -> Result<Complex64> {
        match self {
            Tensor::Dense(t) => t.fetch(coord),
            Tensor::Symmetric(t) => t.dense().fetch(coord),
            Tensor::Diagonal(t) => t.fetch(coord),
            Tensor::Identity(t) => t.fetch(coord),
            Tensor::Swap(t) => t.fetch(coord),
        }
    }

    /// Collects the full logical tensor on every process.
    pub fn gather(&self) -> Result<TensorData> {
        match self {
            Tensor::Dense(t) => t.gather(),
            Tensor::Symmetric(t) => t.dense().gather(),
            Tensor::Diagonal(t) => t.gather(),
            Tensor::Identity(t) => t.gather(),
            Tensor::Swap(t) => t.gather(),
        }
    }

    /// Converts to the general dense form.
    #[must_use]
    pub fn into_dense(self) -> DenseTensor<'env> {
        match self {
            Tensor::Dense(t) => t,
            Tensor::Symmetric(t) => t.into_dense(),
            Tensor::Diagonal(t) => t.into_dense(),
            Tensor::Identity(t) => t.into_dense(),
            Tensor::Swap(t) => t.into_dense(),
        }
    }

    /// Swaps inputs `i` and `j` together with outputs `i` and `j`. Only kinds with
    /// an input/output structure support it; they end up symmetric.
    pub fn swap_io(self, i: usize, j: usize) -> Result<Self> {
        let symmetric = match self {
            Tensor::Dense(_) => {
                return Err(Error::Unimplemented(
                    "input/output swap of dense storage without declared halves",
                ))
            }
            Tensor::Symmetric(t) => t,
            other => SymmetricTensor::from_dense(other.into_dense())?,
        };
        symmetric.swap_io(i, j).map(Tensor::Symmetric)
    }
}

impl<'env> Primitives<'env> for Tensor<'env> {
    type Output = Tensor<'env>;

    fn swap(self, idx1: usize, idx2: usize) -> Result<Self::Output> {
        match self {
            Tensor::Dense(t) => t.swap(idx1, idx2).map(Tensor::Dense),
            Tensor::Symmetric(t) => t.swap(idx1, idx2),
            Tensor::Diagonal(t) => t.swap(idx1, idx2),
            Tensor::Identity(t) => t.swap(idx1, idx2),
            Tensor::Swap(t) => t.swap(idx1, idx2),
        }
    }

    fn rebcast(self, params: PlacementParams) -> Result<Self::Output> {
        match self {
            Tensor::Dense(t) => t.rebcast(params).map(Tensor::Dense),
            Tensor::Symmetric(t) => t.rebcast(params),
            Tensor::Diagonal(t) => t.rebcast(params),
            Tensor::Identity(t) => t.rebcast(params),
            Tensor::Swap(t) => t.rebcast(params),
        }
    }

    fn rescatter(self, offset: isize) -> Result<Self::Output> {
        match self {
            Tensor::Dense(t) => t.rescatter(offset).map(Tensor::Dense),
            Tensor::Symmetric(t) => t.rescatter(offset),
            Tensor::Diagonal(t) => t.rescatter(offset),
            Tensor::Identity(t) => t.rescatter(offset),
            Tensor::Swap(t) => t.rescatter(offset),
        }
    }

    fn permute(self, ptup: &[usize]) -> Result<Self::Output> {
        match self {
            Tensor::Dense(t) => t.permute(ptup).map(Tensor::Dense),
            Tensor::Symmetric(t) => t.permute(ptup),
            Tensor::Diagonal(t) => t.permute(ptup),
            Tensor::Identity(t) => t.permute(ptup),
            Tensor::Swap(t) => t.permute(ptup),
        }
    }
}

impl<'env> From<DenseTensor<'env>> for Tensor<'env> {
    fn from(value: DenseTensor<'env>) -> Self {
        Tensor::Dense(value)
    }
}

impl<'env> From<SymmetricTensor<'env>> for Tensor<'env> {
    fn from(value: SymmetricTensor<'env>) -> Self {
        Tensor::Symmetric(value)
    }
}

impl<'env> From<DiagonalTensor<'env>> for Tensor<'env> {
    fn from(value: DiagonalTensor<'env>) -> Self {
        Tensor::Diagonal(value)
    }
}

impl<'env> From<IdentityTensor<'env>> for Tensor<'env> {
    fn from(value: IdentityTensor<'env>) -> Self {
        Tensor::Identity(value)
    }
}

impl<'env> From<SwapTensor<'env>> for Tensor<'env> {
    fn from(value: SwapTensor<'env>) -> Self {
        Tensor::Swap(value)
    }
}
