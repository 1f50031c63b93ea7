/// Serializes data to a byte array.
pub(crate) fn serialize<S>(value: &S) -> Vec<u8>
where
    S: serde::Serialize,
{
    bincode::serialize(value).expect("in-memory serialization cannot fail")
}

/// Deserializes data from a byte array.
///
/// # Panics
/// Panics if `data` was not produced by [`serialize`] for the same type.
pub(crate) fn deserialize<D>(data: &[u8]) -> D
where
    D: serde::de::DeserializeOwned,
{
    bincode::deserialize(data).expect("received malformed payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlacementParams;

    #[test]
    fn test_serialize_params() {
        let params = PlacementParams::new(2, 3, 1);
        let data = serialize(&params);
        let back: PlacementParams = deserialize(&data);
        assert_eq!(back, params);
    }

    #[test]
    fn test_serialize_wires() {
        let wires = vec![(1usize, 0usize), (3, 2)];
        let back: Vec<(usize, usize)> = deserialize(&serialize(&wires));
        assert_eq!(back, wires);
    }
}
