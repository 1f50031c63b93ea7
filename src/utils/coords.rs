//! Row-major encoding of coordinate tuples.

use crate::types::Coord;

/// Number of elements spanned by `dims`. The empty product is 1.
#[inline]
#[must_use]
pub fn size(dims: &[usize]) -> usize {
    dims.iter().product()
}

/// Encodes `idxs` as a row-major offset within `dims`.
#[must_use]
pub fn idxs_to_i(idxs: &[usize], dims: &[usize]) -> usize {
    debug_assert_eq!(idxs.len(), dims.len());
    idxs.iter().zip(dims).fold(0, |acc, (i, d)| acc * d + i)
}

/// Decodes the row-major offset `i` into a coordinate tuple within `dims`.
#[must_use]
pub fn i_to_idxs(mut i: usize, dims: &[usize]) -> Coord {
    let mut idxs = vec![0; dims.len()];
    for (idx, d) in idxs.iter_mut().zip(dims).rev() {
        *idx = i % d;
        i /= d;
    }
    idxs
}

/// Row-major strides of `dims`.
#[must_use]
pub fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for k in (0..dims.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * dims[k + 1];
    }
    strides
}

/// Whether `idxs` lies within `dims`.
#[must_use]
pub fn is_within(idxs: &[usize], dims: &[usize]) -> bool {
    idxs.len() == dims.len() && idxs.iter().zip(dims).all(|(i, d)| i < d)
}

/// Concatenates two tuples.
#[must_use]
pub fn concat(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idxs_to_i() {
        assert_eq!(idxs_to_i(&[], &[]), 0);
        assert_eq!(idxs_to_i(&[1, 0, 1], &[2, 2, 2]), 5);
        assert_eq!(idxs_to_i(&[2, 3], &[3, 4]), 11);
    }

    #[test]
    fn test_i_to_idxs() {
        assert_eq!(i_to_idxs(5, &[2, 2, 2]), vec![1, 0, 1]);
        assert_eq!(i_to_idxs(11, &[3, 4]), vec![2, 3]);
        assert_eq!(i_to_idxs(0, &[]), Vec::<usize>::new());
    }

    #[test]
    fn test_offsets_cover_range() {
        let dims = [3, 1, 4, 2];
        for i in 0..size(&dims) {
            assert_eq!(idxs_to_i(&i_to_idxs(i, &dims), &dims), i);
        }
    }

    #[test]
    fn test_strides() {
        assert_eq!(strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(strides(&[5]), vec![1]);
        assert!(strides(&[]).is_empty());
    }

    #[test]
    fn test_is_within() {
        assert!(is_within(&[1, 2], &[2, 3]));
        assert!(!is_within(&[2, 0], &[2, 3]));
        assert!(!is_within(&[0], &[2, 3]));
    }
}
