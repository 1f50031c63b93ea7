use thiserror::Error;

use crate::types::Coord;

/// Errors raised by tensor operations. All of them are detected locally on the
/// process that raises them and are never propagated to other processes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An argument does not fit the tensor it is applied to, e.g. a wire pairing
    /// axes of different extent or a buffer of the wrong length.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The requested element is not stored on the calling process.
    #[error("element {coordinate:?} is not owned by rank {rank}")]
    Ownership { rank: usize, coordinate: Coord },
    /// The operation is not available for this kind of tensor.
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns early with an [`Error::InvalidArgument`] built from a format string.
macro_rules! invalid {
    ($($arg:tt)*) => {
        return Err($crate::error::Error::InvalidArgument(format!($($arg)*)))
    };
}

/// Returns early with an [`Error::InvalidArgument`] if the condition does not hold.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::error::invalid!($($arg)*);
        }
    };
}

pub(crate) use ensure;
pub(crate) use invalid;

#[cfg(test)]
mod tests {
    use super::*;

    fn check_positive(x: i32) -> Result<i32> {
        ensure!(x > 0, "expected a positive value, got {x}");
        Ok(x)
    }

    #[test]
    fn test_ensure() {
        assert_eq!(check_positive(3), Ok(3));
        assert_eq!(
            check_positive(-1),
            Err(Error::InvalidArgument(
                "expected a positive value, got -1".into()
            ))
        );
    }

    #[test]
    fn test_display() {
        let err = Error::Ownership {
            rank: 2,
            coordinate: vec![1, 0],
        };
        assert_eq!(err.to_string(), "element [1, 0] is not owned by rank 2");
    }
}
