//! Dense storage: one flat row-major buffer of the local axes per active process.

pub(crate) mod permute;
mod rebcast;
mod rescatter;
mod swap;

use log::debug;
use mpi::traits::{Communicator, Root};
use num_complex::Complex64;

use crate::environment::Environment;
use crate::error::{ensure, Error, Result};
use crate::placement::Placement;
use crate::tensor::frame::TensorFrame;
use crate::tensor::tensordata::TensorData;
use crate::tensor::Primitives;
use crate::types::{Dims, PlacementParams};
use crate::utils::coords::{idxs_to_i, is_within, size};

#[derive(Debug)]
pub struct DenseTensor<'env> {
    frame: TensorFrame<'env>,
    /// Local elements; empty on inactive processes.
    data: Vec<Complex64>,
}

impl<'env> DenseTensor<'env> {
    /// Creates a tensor from the local buffer of the calling process. Inactive
    /// processes may pass an empty buffer; whatever they pass is dropped.
    /// Collective over the world group.
    pub fn new(
        env: &'env Environment,
        dis_dims: Dims,
        loc_dims: Dims,
        data: Vec<Complex64>,
        params: PlacementParams,
    ) -> Result<Self> {
        let active = TensorFrame::would_be_active(env, &dis_dims, &loc_dims, params)?.is_some();
        if active {
            ensure!(
                data.len() == size(&loc_dims),
                "got {} local elements for local dims {loc_dims:?}",
                data.len()
            );
        }
        let frame = TensorFrame::new(env, dis_dims, loc_dims, params)?;
        let data = if active { data } else { Vec::new() };
        Ok(Self { frame, data })
    }

    /// Creates a tensor from the full row-major element list, which every process
    /// passes. The first `n_dis` axes of `dims` are distributed and each active
    /// process keeps its shard. Collective over the world group.
    pub fn distribute(
        env: &'env Environment,
        dims: &[usize],
        n_dis: usize,
        elements: &[Complex64],
        params: PlacementParams,
    ) -> Result<Self> {
        ensure!(
            n_dis <= dims.len(),
            "cannot distribute {n_dis} axes of a tensor with {} axes",
            dims.len()
        );
        ensure!(
            elements.len() == size(dims),
            "got {} elements for dims {dims:?}",
            elements.len()
        );
        let (dis_dims, loc_dims) = dims.split_at(n_dis);
        let shard = TensorFrame::would_be_active(env, dis_dims, loc_dims, params)?;
        let loc_size = size(loc_dims);
        let data = shard
            .map(|s| elements[s * loc_size..(s + 1) * loc_size].to_vec())
            .unwrap_or_default();
        let frame = TensorFrame::new(env, dis_dims.to_vec(), loc_dims.to_vec(), params)?;
        debug!(rank = env.rank(), dims:?, n_dis, shard:?; "Distributed dense tensor");
        Ok(Self { frame, data })
    }

    /// Creates a fully local tensor replicated on every process of the world.
    pub fn replicated(env: &'env Environment, dims: &[usize], elements: &[Complex64]) -> Result<Self> {
        Self::distribute(env, dims, 0, elements, PlacementParams::new(env.size(), 1, 0))
    }

    pub(crate) fn from_parts(frame: TensorFrame<'env>, data: Vec<Complex64>) -> Self {
        debug_assert_eq!(
            data.len(),
            if frame.placement().is_active() {
                frame.loc_size()
            } else {
                0
            }
        );
        Self { frame, data }
    }

    pub(crate) fn into_parts(self) -> (TensorFrame<'env>, Vec<Complex64>) {
        (self.frame, self.data)
    }

    #[inline]
    pub fn frame(&self) -> &TensorFrame<'env> {
        &self.frame
    }

    #[inline]
    pub fn env(&self) -> &'env Environment {
        self.frame.env()
    }

    #[inline]
    pub fn dis_dims(&self) -> &[usize] {
        self.frame.dis_dims()
    }

    #[inline]
    pub fn loc_dims(&self) -> &[usize] {
        self.frame.loc_dims()
    }

    #[inline]
    pub fn total_dims(&self) -> Dims {
        self.frame.total_dims()
    }

    #[inline]
    pub fn placement(&self) -> &Placement<'env> {
        self.frame.placement()
    }

    /// The local buffer of the calling process; empty if inactive.
    #[inline]
    pub fn local_data(&self) -> &[Complex64] {
        &self.data
    }

    /// Returns the element at the total coordinate `coord` if the calling process
    /// holds it.
    pub fn at(&self, coord: &[usize]) -> Result<Complex64> {
        let offset = self.frame.local_offset(coord)?;
        Ok(self.data[offset])
    }

    /// Returns the element at the local coordinate `coord` of the calling
    /// process' shard.
    pub fn local_at(&self, coord: &[usize]) -> Result<Complex64> {
        if !self.placement().is_active() {
            return Err(Error::Ownership {
                rank: self.env().rank(),
                coordinate: coord.to_vec(),
            });
        }
        ensure!(
            is_within(coord, self.loc_dims()),
            "local coordinate {coord:?} is not valid for dims {:?}",
            self.loc_dims()
        );
        Ok(self.data[idxs_to_i(coord, self.loc_dims())])
    }

    /// Returns the element at `coord` on every process. Collective over the world
    /// group, so avoid it in loops.
    pub fn fetch(&self, coord: &[usize]) -> Result<Complex64> {
        self.frame
            .broadcast_element(coord, |offset| self.data[offset])
    }

    /// Collects the full logical tensor on every process. Each shard is broadcast
    /// from its primary holder. Collective over the world group.
    pub fn gather(&self) -> Result<TensorData> {
        let world = self.env().world();
        let loc_size = self.frame.loc_size();
        let mut elements = Vec::with_capacity(self.frame.dis_size() * loc_size);
        let mut shard_data = vec![Complex64::default(); loc_size];
        for shard in 0..self.frame.dis_size() {
            let root = self.placement().primary(shard);
            if root == self.env().rank() {
                shard_data.copy_from_slice(&self.data);
            }
            world
                .process_at_rank(root as i32)
                .broadcast_into(&mut shard_data[..]);
            elements.extend_from_slice(&shard_data);
        }
        TensorData::new(self.total_dims(), elements)
    }
}

impl<'env> Primitives<'env> for DenseTensor<'env> {
    type Output = DenseTensor<'env>;

    fn swap(self, idx1: usize, idx2: usize) -> Result<Self::Output> {
        swap::swap(self, idx1, idx2)
    }

    fn rebcast(self, params: PlacementParams) -> Result<Self::Output> {
        rebcast::rebcast(self, params)
    }

    fn rescatter(self, offset: isize) -> Result<Self::Output> {
        rescatter::rescatter(self, offset)
    }

    fn permute(self, ptup: &[usize]) -> Result<Self::Output> {
        permute::permute(self, ptup)
    }
}
