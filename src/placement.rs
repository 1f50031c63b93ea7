//! The replication scheme that maps shards of a tensor onto processes.
//!
//! A placement over `base` shards with parameters `(stretch, cycles, offset)`
//! occupies the ranks `offset..offset + stretch * base * cycles`. Relative to the
//! offset, rank `r` holds shard `(r / stretch) % base`: each shard is held by
//! `stretch` consecutive ranks and the whole pattern repeats `cycles` times.
//!
//! Every active process belongs to a group containing exactly one holder of every
//! shard. The rank of a process within its group equals the shard it holds.

use std::fmt;
use std::ops::Range;

use log::debug;
use mpi::topology::{Color, SimpleCommunicator};
use mpi::traits::Communicator;

use crate::environment::Environment;
use crate::error::{ensure, Result};
use crate::types::PlacementParams;

/// The pure arithmetic of a placement, without any communicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    base: usize,
    params: PlacementParams,
}

impl Layout {
    #[must_use]
    pub const fn new(base: usize, params: PlacementParams) -> Self {
        Self { base, params }
    }

    /// Checks that the layout is well formed and fits into `world_size` processes.
    pub fn validate(&self, world_size: usize) -> Result<()> {
        ensure!(self.base > 0, "placement needs at least one shard");
        ensure!(
            self.params.stretch > 0 && self.params.cycles > 0,
            "stretch and cycles must be positive, got {:?}",
            self.params
        );
        ensure!(
            self.range().end <= world_size,
            "placement of {} shards with {:?} needs {} processes, only {world_size} available",
            self.base,
            self.params,
            self.range().end
        );
        Ok(())
    }

    /// Number of distinct shards.
    #[inline]
    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> PlacementParams {
        self.params
    }

    /// Number of processes touched.
    #[inline]
    #[must_use]
    pub fn span(&self) -> usize {
        self.params.stretch * self.base * self.params.cycles
    }

    /// The world ranks touched.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.params.offset..self.params.offset + self.span()
    }

    /// The shard held by world rank `rank`, if any.
    #[must_use]
    pub fn shard_of(&self, rank: usize) -> Option<usize> {
        self.range()
            .contains(&rank)
            .then(|| ((rank - self.params.offset) / self.params.stretch) % self.base)
    }

    /// The group colour of world rank `rank`, if active.
    #[must_use]
    pub fn colour_of(&self, rank: usize) -> Option<usize> {
        self.range().contains(&rank).then(|| {
            let rel = rank - self.params.offset;
            let stretch = self.params.stretch;
            (rel / (self.base * stretch)) * stretch + rel % stretch
        })
    }

    /// All world ranks holding `shard`, ordered by rank.
    #[must_use]
    pub fn holders(&self, shard: usize) -> Vec<usize> {
        (0..self.params.cycles)
            .flat_map(|k| {
                let first = self.rank_at(k, shard, 0);
                first..first + self.params.stretch
            })
            .collect()
    }

    /// The lowest world rank holding `shard`.
    #[inline]
    #[must_use]
    pub fn primary(&self, shard: usize) -> usize {
        self.rank_at(0, shard, 0)
    }

    /// The world rank holding `shard` in cycle `cycle` at position `slot` of the
    /// stretch.
    #[inline]
    #[must_use]
    pub fn rank_at(&self, cycle: usize, shard: usize, slot: usize) -> usize {
        self.params.offset + (cycle * self.base + shard) * self.params.stretch + slot
    }

    /// Splits world rank `rank` into its `(cycle, shard, slot)` position, if active.
    #[must_use]
    pub fn position_of(&self, rank: usize) -> Option<(usize, usize, usize)> {
        self.range().contains(&rank).then(|| {
            let rel = rank - self.params.offset;
            let stretch = self.params.stretch;
            (
                rel / (self.base * stretch),
                (rel / stretch) % self.base,
                rel % stretch,
            )
        })
    }
}

/// A [`Layout`] together with the group communicator of the calling process.
pub struct Placement<'env> {
    env: &'env Environment,
    layout: Layout,
    /// `None` if the process is inactive.
    group: Option<SimpleCommunicator>,
}

impl<'env> Placement<'env> {
    /// Builds the placement of `base` shards. This is a collective operation over
    /// the world group: every process must call it with the same arguments.
    pub fn new(env: &'env Environment, base: usize, params: PlacementParams) -> Result<Self> {
        let layout = Layout::new(base, params);
        layout.validate(env.size())?;

        let rank = env.rank();
        let (color, key) = match layout.colour_of(rank) {
            Some(colour) => (
                Color::with_value(colour as i32),
                (rank - params.offset) as i32,
            ),
            None => (Color::undefined(), 0),
        };
        let group = env.world().split_by_color_with_key(color, key);
        debug!(rank, base, stretch = params.stretch, cycles = params.cycles, offset = params.offset, active = group.is_some(); "Built placement");

        let placement = Self { env, layout, group };
        debug_assert_eq!(
            placement.group.as_ref().map(|g| g.rank() as usize),
            placement.shard()
        );
        Ok(placement)
    }

    #[inline]
    #[must_use]
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    #[inline]
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub fn base(&self) -> usize {
        self.layout.base()
    }

    #[inline]
    #[must_use]
    pub fn params(&self) -> PlacementParams {
        self.layout.params()
    }

    #[inline]
    #[must_use]
    pub fn stretch(&self) -> usize {
        self.layout.params().stretch
    }

    #[inline]
    #[must_use]
    pub fn cycles(&self) -> usize {
        self.layout.params().cycles
    }

    #[inline]
    #[must_use]
    pub fn offset(&self) -> usize {
        self.layout.params().offset
    }

    #[inline]
    #[must_use]
    pub fn span(&self) -> usize {
        self.layout.span()
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.layout.range()
    }

    /// Whether the calling process holds a shard.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.group.is_some()
    }

    /// The communicator containing one holder of every shard, if active.
    #[inline]
    #[must_use]
    pub fn group(&self) -> Option<&SimpleCommunicator> {
        self.group.as_ref()
    }

    /// The shard held by the calling process, i.e. its rank within the group.
    #[must_use]
    pub fn shard(&self) -> Option<usize> {
        self.layout.shard_of(self.env.rank())
    }

    #[must_use]
    pub fn holders(&self, shard: usize) -> Vec<usize> {
        self.layout.holders(shard)
    }

    #[inline]
    #[must_use]
    pub fn primary(&self, shard: usize) -> usize {
        self.layout.primary(shard)
    }

    /// Whether both placements describe the same layout.
    #[must_use]
    pub fn is_equivalent(&self, other: &Placement) -> bool {
        self.layout == other.layout
    }
}

impl fmt::Debug for Placement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Placement")
            .field("base", &self.base())
            .field("stretch", &self.stretch())
            .field("cycles", &self.cycles())
            .field("offset", &self.offset())
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_span_and_range() {
        let layout = Layout::new(4, PlacementParams::new(2, 3, 1));
        assert_eq!(layout.span(), 24);
        assert_eq!(layout.range(), 1..25);
        assert!(layout.validate(25).is_ok());
        assert!(matches!(
            layout.validate(24),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_params() {
        let layout = Layout::new(2, PlacementParams::new(0, 1, 0));
        assert!(layout.validate(8).is_err());
        let layout = Layout::new(0, PlacementParams::default());
        assert!(layout.validate(8).is_err());
    }

    #[test]
    fn test_shards() {
        // base 2, stretch 2, cycles 2: ranks 0..8 hold 0 0 1 1 0 0 1 1
        let layout = Layout::new(2, PlacementParams::new(2, 2, 0));
        let shards = (0..9).map(|r| layout.shard_of(r)).collect::<Vec<_>>();
        assert_eq!(
            shards,
            vec![
                Some(0),
                Some(0),
                Some(1),
                Some(1),
                Some(0),
                Some(0),
                Some(1),
                Some(1),
                None
            ]
        );
        assert_eq!(layout.holders(1), vec![2, 3, 6, 7]);
        assert_eq!(layout.primary(1), 2);
    }

    #[test]
    fn test_colours_hold_every_shard_once() {
        let layout = Layout::new(3, PlacementParams::new(2, 2, 1));
        for colour in 0..4 {
            let mut shards = layout
                .range()
                .filter(|&r| layout.colour_of(r) == Some(colour))
                .map(|r| layout.shard_of(r).unwrap())
                .collect::<Vec<_>>();
            shards.sort_unstable();
            assert_eq!(shards, vec![0, 1, 2]);
        }
        assert_eq!(layout.colour_of(0), None);
    }

    #[test]
    fn test_positions_round_trip() {
        let layout = Layout::new(3, PlacementParams::new(2, 2, 1));
        for rank in layout.range() {
            let (cycle, shard, slot) = layout.position_of(rank).unwrap();
            assert_eq!(layout.rank_at(cycle, shard, slot), rank);
        }
        assert_eq!(layout.position_of(13), None);
    }
}
