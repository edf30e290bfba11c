//! weft: OpenMP region optimization and GPU module serialization.
//!
//! The IR lives in [`weft_ir`], the OpenMP rewrites in [`weft_passes`] and
//! the device code path in [`weft_nvptx`]. This crate strings them
//! together in [`pipeline`] and backs the `weftc` binary.

pub mod pipeline;

pub use pipeline::{Compilation, PipelineConfig, PipelineError, compile};
