//! Transformation passes over weft IR.
//!
//! - [`effects`]: memory-effect queries used to decide whether operations
//!   may be moved across parallel region boundaries.
//! - [`omp_opt`]: merges adjacent `omp.parallel` regions and hoists them
//!   out of loops and conditionals.

pub mod effects;
pub mod omp_opt;

// Re-exports
pub use effects::is_read_only;
pub use omp_opt::{OmpOptPass, run_omp_opt};
