use serde::{Deserialize, Serialize};

/// Extents of a set of tensor axes.
pub type Dims = Vec<usize>;

/// A coordinate tuple addressing one element (or one shard).
pub type Coord = Vec<usize>;

/// A pairing of axis positions, the first on the left and the second on the right
/// operand of a contraction. Paired axes are summed over.
pub type Wire = (usize, usize);

/// Handle of a tensor stored in a [`crate::network::TensorNetwork`].
pub type TensorId = usize;

/// Handle of a bond stored in a [`crate::network::TensorNetwork`].
pub type BondId = usize;

/// Replication parameters of a tensor placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementParams {
    /// Number of consecutive processes that hold the same shard.
    pub stretch: usize,
    /// Number of times the whole pattern repeats.
    pub cycles: usize,
    /// First rank used by the placement.
    pub offset: usize,
}

impl PlacementParams {
    #[must_use]
    pub const fn new(stretch: usize, cycles: usize, offset: usize) -> Self {
        Self {
            stretch,
            cycles,
            offset,
        }
    }
}

impl Default for PlacementParams {
    fn default() -> Self {
        Self::new(1, 1, 0)
    }
}

impl From<(usize, usize, usize)> for PlacementParams {
    fn from(value: (usize, usize, usize)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

/// Builds a list of [`Wire`]s.
///
/// # Examples
/// ```
/// # use dtensor::wires;
/// let w = wires![(1, 0), (2, 3)];
/// assert_eq!(w, vec![(1, 0), (2, 3)]);
/// ```
#[macro_export]
macro_rules! wires {
    () => {
        Vec::<$crate::types::Wire>::new()
    };
    ($(($l:expr, $r:expr)),+ $(,)?) => {
        vec![$(($l, $r)),+]
    };
}

#[cfg(test)]
mod tests {
    use super::PlacementParams;

    #[test]
    fn test_wires_macro() {
        assert_eq!(wires![], Vec::<(usize, usize)>::new());
        assert_eq!(wires![(0, 1)], vec![(0, 1)]);
        assert_eq!(wires![(1, 0), (2, 2),], vec![(1, 0), (2, 2)]);
    }

    #[test]
    fn test_default_params() {
        assert_eq!(PlacementParams::default(), PlacementParams::new(1, 1, 0));
        assert_eq!(PlacementParams::from((2, 3, 1)).cycles, 3);
    }
}
