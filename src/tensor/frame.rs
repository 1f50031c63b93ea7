use std::fmt;

use mpi::traits::{Communicator, Root};
use num_complex::Complex64;

use crate::environment::Environment;
use crate::error::{ensure, Error, Result};
use crate::placement::{Layout, Placement};
use crate::types::{Coord, Dims, PlacementParams};
use crate::utils::coords::{concat, i_to_idxs, idxs_to_i, is_within, size};

/// Shape and placement shared by every storage kind: the extents of the
/// distributed and the local axes, and where the shards live.
pub struct TensorFrame<'env> {
    dis_dims: Dims,
    loc_dims: Dims,
    placement: Placement<'env>,
}

impl<'env> TensorFrame<'env> {
    /// Builds the frame and its placement. Collective over the world group.
    pub(crate) fn new(
        env: &'env Environment,
        dis_dims: Dims,
        loc_dims: Dims,
        params: PlacementParams,
    ) -> Result<Self> {
        Self::check_dims(&dis_dims, &loc_dims)?;
        let placement = Placement::new(env, size(&dis_dims), params)?;
        Ok(Self::with_placement(dis_dims, loc_dims, placement))
    }

    pub(crate) fn with_placement(dis_dims: Dims, loc_dims: Dims, placement: Placement<'env>) -> Self {
        debug_assert_eq!(size(&dis_dims), placement.base());
        Self {
            dis_dims,
            loc_dims,
            placement,
        }
    }

    /// Rejects zero extents.
    pub(crate) fn check_dims(dis_dims: &[usize], loc_dims: &[usize]) -> Result<()> {
        ensure!(
            dis_dims.iter().chain(loc_dims).all(|&d| d > 0),
            "extents must be positive, got {dis_dims:?} and {loc_dims:?}"
        );
        Ok(())
    }

    /// Validates a placement for these dims without communicating and returns
    /// whether the calling process would be active.
    pub(crate) fn would_be_active(
        env: &Environment,
        dis_dims: &[usize],
        loc_dims: &[usize],
        params: PlacementParams,
    ) -> Result<Option<usize>> {
        Self::check_dims(dis_dims, loc_dims)?;
        let layout = Layout::new(size(dis_dims), params);
        layout.validate(env.size())?;
        Ok(layout.shard_of(env.rank()))
    }

    pub(crate) fn into_parts(self) -> (Dims, Dims, Placement<'env>) {
        (self.dis_dims, self.loc_dims, self.placement)
    }

    #[inline]
    pub fn env(&self) -> &'env Environment {
        self.placement.env()
    }

    #[inline]
    pub fn dis_dims(&self) -> &[usize] {
        &self.dis_dims
    }

    #[inline]
    pub fn loc_dims(&self) -> &[usize] {
        &self.loc_dims
    }

    pub fn total_dims(&self) -> Dims {
        concat(&self.dis_dims, &self.loc_dims)
    }

    /// Number of axes.
    #[inline]
    pub fn order(&self) -> usize {
        self.dis_dims.len() + self.loc_dims.len()
    }

    #[inline]
    pub fn dis_size(&self) -> usize {
        size(&self.dis_dims)
    }

    #[inline]
    pub fn loc_size(&self) -> usize {
        size(&self.loc_dims)
    }

    #[inline]
    pub fn placement(&self) -> &Placement<'env> {
        &self.placement
    }

    /// Distributed coordinate of the shard held by the calling process.
    pub fn shard_coord(&self) -> Option<Coord> {
        self.placement
            .shard()
            .map(|shard| i_to_idxs(shard, &self.dis_dims))
    }

    /// Splits a total coordinate into its distributed and local parts.
    pub fn split_coord<'c>(&self, coord: &'c [usize]) -> Result<(&'c [usize], &'c [usize])> {
        ensure!(
            is_within(coord, &self.total_dims()),
            "coordinate {coord:?} is not valid for dims {:?}",
            self.total_dims()
        );
        Ok(coord.split_at(self.dis_dims.len()))
    }

    /// Offset of `coord` in the local buffer of the calling process. Fails with
    /// [`Error::Ownership`] if the calling process does not hold the element.
    pub fn local_offset(&self, coord: &[usize]) -> Result<usize> {
        let (dis, loc) = self.split_coord(coord)?;
        match self.placement.shard() {
            Some(shard) if shard == idxs_to_i(dis, &self.dis_dims) => {
                Ok(idxs_to_i(loc, &self.loc_dims))
            }
            _ => Err(Error::Ownership {
                rank: self.env().rank(),
                coordinate: coord.to_vec(),
            }),
        }
    }

    /// Broadcasts the element at `coord` from its primary holder to every
    /// process. `lookup` is only called on the primary holder, with the local
    /// offset of the element. Collective over the world group.
    pub(crate) fn broadcast_element<F>(&self, coord: &[usize], lookup: F) -> Result<Complex64>
    where
        F: FnOnce(usize) -> Complex64,
    {
        let (dis, loc) = self.split_coord(coord)?;
        let root = self.placement.primary(idxs_to_i(dis, &self.dis_dims));
        let env = self.env();
        let mut value = if root == env.rank() {
            lookup(idxs_to_i(loc, &self.loc_dims))
        } else {
            Complex64::default()
        };
        env.world()
            .process_at_rank(root as i32)
            .broadcast_into(&mut value);
        Ok(value)
    }
}

impl fmt::Debug for TensorFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorFrame")
            .field("dis_dims", &self.dis_dims)
            .field("loc_dims", &self.loc_dims)
            .field("placement", &self.placement)
            .finish()
    }
}
