//! Distributed dense tensor algebra over MPI.
//!
//! Tensors are sharded over the processes of an [`environment::Environment`]
//! following a [`placement::Placement`]. They are transformed by the four
//! [`tensor::Primitives`] and combined by [`contraction::contract`]; a
//! [`network::TensorNetwork`] keeps track of many tensors and the bonds
//! between them.

pub mod contraction;
pub mod environment;
pub mod error;
pub mod indexing;
pub mod mpi;
pub mod network;
pub mod placement;
pub mod tensor;
pub mod types;
mod utils;

#[doc(hidden)]
pub use paste::paste as __paste;
