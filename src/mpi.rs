//! Methods for MPI interaction, i.e., the collective and point-to-point patterns the
//! tensor primitives are built from.

pub mod communication;
mod serialization;
#[doc(hidden)]
pub mod testing;
