pub mod arena;
pub mod coords;
