//! The per-phase pipeline: sparsify, stall, exponentiate, choose, integrate,
//! and finally finish.

pub mod exponentiate;
pub mod finish;
pub mod integrate;
pub mod local_mis;
pub mod sparsify;
pub mod stall;
