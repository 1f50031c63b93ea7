//! Navigation of coordinate tuples over labelled subsets of tensor axes.
//!
//! An [`Indexing`] is a pure value: extents plus one [`AxisFlag`] per axis. All
//! navigation methods take the coordinate tuple to work on, and only the axes
//! carrying the requested [`Label`] are touched. Iteration over a label is
//! row-major among the matching axes, ordered by `(tag, position)`, so two
//! indexings whose matching axes carry the same tags advance in lockstep.

use crate::error::{ensure, Error, Result};
use crate::types::{Coord, Dims};
use crate::utils::coords::{idxs_to_i, is_within, strides};

/// Role of an axis during an operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    #[default]
    Default,
    Distributed,
    Local,
    /// Survives a contraction.
    Open,
    /// Summed over by the local kernel of a contraction.
    Closed,
    /// Summed over across processes.
    Reduced,
    /// Held at a fixed value.
    Fixed,
}

/// Label and ordering tag of one axis.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisFlag {
    pub label: Label,
    pub tag: usize,
}

impl AxisFlag {
    #[must_use]
    pub const fn new(label: Label, tag: usize) -> Self {
        Self { label, tag }
    }
}

impl From<Label> for AxisFlag {
    fn from(label: Label) -> Self {
        Self::new(label, 0)
    }
}

/// An index space over `dims` with one flag per axis.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Indexing {
    dims: Dims,
    flags: Vec<AxisFlag>,
}

impl Indexing {
    /// Creates an indexing with every axis labelled [`Label::Default`].
    #[must_use]
    pub fn new(dims: Dims) -> Self {
        let flags = vec![AxisFlag::default(); dims.len()];
        Self { dims, flags }
    }

    /// Creates an indexing with explicit flags.
    pub fn with_flags(dims: Dims, flags: Vec<AxisFlag>) -> Result<Self> {
        ensure!(
            dims.len() == flags.len(),
            "got {} flags for {} axes",
            flags.len(),
            dims.len()
        );
        Ok(Self { dims, flags })
    }

    /// Creates an indexing with explicit labels, all tags zero.
    pub fn with_labels(dims: Dims, labels: &[Label]) -> Result<Self> {
        Self::with_flags(dims, labels.iter().map(|&l| l.into()).collect())
    }

    #[inline]
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> &[AxisFlag] {
        &self.flags
    }

    /// Replaces the flag of axis `axis`.
    pub fn set_flag(&mut self, axis: usize, flag: AxisFlag) -> Result<()> {
        ensure!(
            axis < self.flags.len(),
            "axis {axis} is out of range for {} axes",
            self.flags.len()
        );
        self.flags[axis] = flag;
        Ok(())
    }

    /// Positions of the axes labelled `label`, ascending.
    #[must_use]
    pub fn axes(&self, label: Label) -> Vec<usize> {
        self.matching(label).collect()
    }

    /// Number of coordinate tuples spanned by the axes labelled `label`.
    #[must_use]
    pub fn count(&self, label: Label) -> usize {
        self.matching(label).map(|k| self.dims[k]).product()
    }

    /// Whether `idxs` addresses an element of this index space.
    #[must_use]
    pub fn is_valid(&self, idxs: &[usize]) -> bool {
        is_within(idxs, &self.dims)
    }

    /// Whether `a` and `b` agree on every axis labelled `label`. Both tuples
    /// must be valid.
    pub fn is_equal(&self, a: &[usize], b: &[usize], label: Label) -> Result<bool> {
        self.check(a)?;
        self.check(b)?;
        Ok(self.matching(label).all(|k| a[k] == b[k]))
    }

    /// Whether `idxs` is the last tuple in the iteration order of `label`.
    pub fn is_last(&self, idxs: &[usize], label: Label) -> Result<bool> {
        self.check(idxs)?;
        Ok(self.last_of(idxs, label))
    }

    /// Advances `idxs` to the next tuple of `label`.
    ///
    /// Fails without modifying `idxs` if it already is the last tuple.
    pub fn next(&self, idxs: &mut [usize], label: Label) -> Result<()> {
        self.check(idxs)?;
        if self.last_of(idxs, label) {
            return Err(Error::InvalidArgument(format!(
                "cannot advance past last index {idxs:?}"
            )));
        }
        for k in self.order(label).into_iter().rev() {
            if idxs[k] + 1 < self.dims[k] {
                idxs[k] += 1;
                return Ok(());
            }
            idxs[k] = 0;
        }
        Ok(())
    }

    /// Steps `idxs` back to the previous tuple of `label`.
    ///
    /// Fails without modifying `idxs` if it already is the first tuple.
    pub fn prev(&self, idxs: &mut [usize], label: Label) -> Result<()> {
        self.check(idxs)?;
        if self.matching(label).all(|k| idxs[k] == 0) {
            return Err(Error::InvalidArgument(format!(
                "cannot step before first index {idxs:?}"
            )));
        }
        for k in self.order(label).into_iter().rev() {
            if idxs[k] > 0 {
                idxs[k] -= 1;
                return Ok(());
            }
            idxs[k] = self.dims[k] - 1;
        }
        Ok(())
    }

    /// Resets every axis labelled `label` to zero.
    pub fn reset(&self, idxs: &mut [usize], label: Label) {
        for k in self.matching(label) {
            idxs[k] = 0;
        }
    }

    /// Removes all axes labelled `label`.
    #[must_use]
    pub fn cut(&self, label: Label) -> Self {
        self.filter(|flag| flag.label != label)
    }

    /// Keeps only the axes labelled `label`.
    #[must_use]
    pub fn keep(&self, label: Label) -> Self {
        self.filter(|flag| flag.label == label)
    }

    /// Concatenates two index spaces.
    #[must_use]
    pub fn app(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.dims.extend_from_slice(&other.dims);
        out.flags.extend_from_slice(&other.flags);
        out
    }

    /// Iterates over all tuples of `label`. The axes not labelled `label` are held
    /// at their value in `start`.
    #[must_use]
    pub fn coords(&self, label: Label, start: &[usize]) -> Coords<'_> {
        let mut idxs = start.to_vec();
        self.reset(&mut idxs, label);
        let remaining = if self.is_valid(&idxs) {
            self.count(label)
        } else {
            0
        };
        Coords {
            dims: &self.dims,
            order: self.order(label),
            idxs,
            remaining,
        }
    }

    /// Like [`Indexing::coords`], but yields the row-major offset of each tuple
    /// within a buffer of extents `dims`.
    #[must_use]
    pub fn offsets(&self, label: Label, start: &[usize]) -> Offsets<'_> {
        let mut idxs = start.to_vec();
        self.reset(&mut idxs, label);
        let (remaining, offset) = if self.is_valid(&idxs) {
            (self.count(label), idxs_to_i(&idxs, &self.dims))
        } else {
            (0, 0)
        };
        Offsets {
            dims: &self.dims,
            strides: strides(&self.dims),
            order: self.order(label),
            idxs,
            offset,
            remaining,
        }
    }

    fn check(&self, idxs: &[usize]) -> Result<()> {
        ensure!(
            self.is_valid(idxs),
            "index {idxs:?} is not valid for dims {:?}",
            self.dims
        );
        Ok(())
    }

    fn last_of(&self, idxs: &[usize], label: Label) -> bool {
        self.matching(label).all(|k| idxs[k] + 1 == self.dims[k])
    }

    fn matching(&self, label: Label) -> impl Iterator<Item = usize> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(move |(_, flag)| flag.label == label)
            .map(|(k, _)| k)
    }

    /// Matching axes, slowest first.
    fn order(&self, label: Label) -> Vec<usize> {
        let mut order = self.matching(label).collect::<Vec<_>>();
        order.sort_by_key(|&k| (self.flags[k].tag, k));
        order
    }

    fn filter(&self, keep: impl Fn(&AxisFlag) -> bool) -> Self {
        let (dims, flags) = self
            .dims
            .iter()
            .zip(&self.flags)
            .filter(|(_, flag)| keep(flag))
            .map(|(d, f)| (*d, *f))
            .unzip();
        Self { dims, flags }
    }
}

/// Iterator over coordinate tuples, see [`Indexing::coords`].
#[derive(Debug, Clone)]
pub struct Coords<'a> {
    dims: &'a [usize],
    order: Vec<usize>,
    idxs: Coord,
    remaining: usize,
}

impl Iterator for Coords<'_> {
    type Item = Coord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.idxs.clone();
        if self.remaining > 0 {
            for &k in self.order.iter().rev() {
                if self.idxs[k] + 1 < self.dims[k] {
                    self.idxs[k] += 1;
                    break;
                }
                self.idxs[k] = 0;
            }
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Coords<'_> {}

/// Iterator over buffer offsets, see [`Indexing::offsets`].
#[derive(Debug, Clone)]
pub struct Offsets<'a> {
    dims: &'a [usize],
    strides: Vec<usize>,
    order: Vec<usize>,
    idxs: Coord,
    offset: usize,
    remaining: usize,
}

impl Iterator for Offsets<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.offset;
        if self.remaining > 0 {
            for &k in self.order.iter().rev() {
                if self.idxs[k] + 1 < self.dims[k] {
                    self.idxs[k] += 1;
                    self.offset += self.strides[k];
                    break;
                }
                self.offset -= self.idxs[k] * self.strides[k];
                self.idxs[k] = 0;
            }
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Offsets<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_closed() -> Indexing {
        Indexing::with_labels(
            vec![2, 3, 4, 5],
            &[Label::Open, Label::Closed, Label::Open, Label::Open],
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_flags() {
        let res = Indexing::with_labels(vec![2, 3], &[Label::Open; 3]);
        assert!(matches!(res, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_next_prev() {
        let ti = Indexing::new(vec![2, 3, 4, 5]);
        let mut idxs = vec![0, 0, 0, 0];
        ti.next(&mut idxs, Label::Default).unwrap();
        assert_eq!(idxs, vec![0, 0, 0, 1]);
        ti.prev(&mut idxs, Label::Default).unwrap();
        assert_eq!(idxs, vec![0, 0, 0, 0]);
        assert!(ti.prev(&mut idxs, Label::Default).is_err());

        let mut idxs = vec![1, 2, 3, 4];
        assert!(ti.is_last(&idxs, Label::Default).unwrap());
        assert!(ti.next(&mut idxs, Label::Default).is_err());
        assert_eq!(idxs, vec![1, 2, 3, 4]);
        ti.prev(&mut idxs, Label::Default).unwrap();
        assert_eq!(idxs, vec![1, 2, 3, 3]);
    }

    #[test]
    fn test_next_carries() {
        let ti = Indexing::new(vec![2, 3]);
        let mut idxs = vec![0, 2];
        ti.next(&mut idxs, Label::Default).unwrap();
        assert_eq!(idxs, vec![1, 0]);
        ti.prev(&mut idxs, Label::Default).unwrap();
        assert_eq!(idxs, vec![0, 2]);
    }

    #[test]
    fn test_next_restricted_to_label() {
        let ti = open_closed();
        let mut idxs = vec![0, 1, 3, 4];
        ti.next(&mut idxs, Label::Open).unwrap();
        assert_eq!(idxs, vec![1, 1, 0, 0]);
        ti.next(&mut idxs, Label::Closed).unwrap();
        assert_eq!(idxs, vec![1, 2, 0, 0]);
        assert!(ti.is_last(&idxs, Label::Closed).unwrap());
        assert!(ti.next(&mut idxs, Label::Closed).is_err());
    }

    #[test]
    fn test_next_invalid_index() {
        let ti = Indexing::new(vec![2, 2]);
        let mut idxs = vec![2, 0];
        assert!(ti.next(&mut idxs, Label::Default).is_err());
    }

    #[test]
    fn test_reset_and_equal() {
        let ti = open_closed();
        let mut idxs = vec![1, 2, 3, 4];
        ti.reset(&mut idxs, Label::Open);
        assert_eq!(idxs, vec![0, 2, 0, 0]);
        assert!(ti.is_equal(&idxs, &[0, 1, 0, 0], Label::Open).unwrap());
        assert!(!ti.is_equal(&idxs, &[0, 1, 0, 0], Label::Closed).unwrap());
    }

    #[test]
    fn test_short_tuples_are_rejected() {
        let ti = open_closed();
        assert!(matches!(ti.is_last(&[1, 2], Label::Open), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            ti.is_equal(&[0, 0, 0, 0], &[0, 0], Label::Open),
            Err(Error::InvalidArgument(_))
        ));
        assert!(ti.is_equal(&[0, 0, 0, 0], &[0, 2, 0, 0], Label::Open).unwrap());
    }

    #[test]
    fn test_set_flag_and_axes() {
        let mut ti = Indexing::new(vec![2, 3, 4]);
        ti.set_flag(1, AxisFlag::new(Label::Reduced, 0)).unwrap();
        ti.set_flag(2, Label::Local.into()).unwrap();
        assert_eq!(ti.axes(Label::Reduced), vec![1]);
        assert_eq!(ti.axes(Label::Local), vec![2]);
        assert_eq!(ti.axes(Label::Default), vec![0]);
        assert_eq!(ti.count(Label::Reduced), 3);
        assert!(ti.set_flag(3, Label::Open.into()).is_err());
    }

    #[test]
    fn test_cut_keep_app() {
        let ti = open_closed();
        let cut = ti.cut(Label::Closed);
        assert_eq!(cut.dims(), &[2, 4, 5]);
        let kept = ti.keep(Label::Closed);
        assert_eq!(kept.dims(), &[3]);
        assert_eq!(kept.flags()[0].label, Label::Closed);

        let joined = cut.app(&kept);
        assert_eq!(joined.dims(), &[2, 4, 5, 3]);
        assert_eq!(joined.count(Label::Open), 40);
    }

    #[test]
    fn test_coords_row_major() {
        let ti = Indexing::new(vec![2, 2]);
        let all = ti.coords(Label::Default, &[0, 0]).collect::<Vec<_>>();
        assert_eq!(all, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn test_coords_hold_other_axes() {
        let ti = Indexing::with_labels(vec![2, 3, 2], &[Label::Open, Label::Fixed, Label::Open])
            .unwrap();
        let all = ti.coords(Label::Open, &[1, 2, 1]).collect::<Vec<_>>();
        assert_eq!(
            all,
            vec![vec![0, 2, 0], vec![0, 2, 1], vec![1, 2, 0], vec![1, 2, 1]]
        );
    }

    #[test]
    fn test_coords_follow_tags() {
        let flags = vec![
            AxisFlag::new(Label::Closed, 1),
            AxisFlag::new(Label::Closed, 0),
        ];
        let ti = Indexing::with_flags(vec![2, 3], flags).unwrap();
        let first = ti.coords(Label::Closed, &[0, 0]).take(3).collect::<Vec<_>>();
        assert_eq!(first, vec![vec![0, 0], vec![1, 0], vec![0, 1]]);
    }

    #[test]
    fn test_offsets_match_coords() {
        let ti = open_closed();
        let start = [0, 2, 0, 0];
        let offsets = ti.offsets(Label::Open, &start).collect::<Vec<_>>();
        let expected = ti
            .coords(Label::Open, &start)
            .map(|c| idxs_to_i(&c, ti.dims()))
            .collect::<Vec<_>>();
        assert_eq!(offsets.len(), 40);
        assert_eq!(offsets, expected);
    }

    #[test]
    fn test_empty_label_yields_start_once() {
        let ti = Indexing::new(vec![2, 2]);
        let all = ti.coords(Label::Closed, &[1, 0]).collect::<Vec<_>>();
        assert_eq!(all, vec![vec![1, 0]]);
        let scalar = Indexing::new(vec![]);
        assert_eq!(scalar.offsets(Label::Default, &[]).collect::<Vec<_>>(), vec![0]);
    }
}
