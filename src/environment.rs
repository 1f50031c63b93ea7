//! The per-process handle on the messaging runtime.

use log::debug;
use mpi::environment::Universe;
use mpi::topology::SimpleCommunicator;
use mpi::traits::Communicator;

/// Process environment shared by all tensors of a program. It must outlive every
/// tensor created from it; the runtime is finalized when it is dropped.
pub struct Environment {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
    threads: usize,
    // Dropped last, finalizes MPI.
    _universe: Universe,
}

impl Environment {
    /// Initializes MPI and returns the environment, or `None` if MPI has already
    /// been initialized in this process.
    #[must_use]
    pub fn initialize() -> Option<Self> {
        mpi::initialize().map(Self::from_universe)
    }

    /// Wraps an already initialized MPI universe.
    #[must_use]
    pub fn from_universe(universe: Universe) -> Self {
        let world = universe.world();
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        let threads = rayon::current_num_threads();
        debug!(rank, size, threads; "Initialized environment");
        Self {
            world,
            rank,
            size,
            threads,
            _universe: universe,
        }
    }

    /// Rank of the calling process in the world group.
    #[inline]
    #[must_use]
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Total number of processes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of worker threads available to this process.
    #[inline]
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// The global communication group.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &SimpleCommunicator {
        &self.world
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}
