//! Weft IR crate.
//!
//! An arena-allocated, region-based IR: operations own regions, regions own
//! blocks, blocks own operations. Values carry explicit use-chains so that
//! rewrites can mutate the IR in place and redirect uses (RAUW).
//!
//! The crate also provides the dialects used by the OpenMP and GPU
//! pipelines, a text printer and parser, structural validation, and the
//! greedy pattern-rewrite driver.

// === Core arena ===
pub mod context;
pub mod refs;
pub mod symbol;
pub mod types;

// === Dialect modules ===
pub mod dialect;

// === IR infrastructure ===
pub mod op_interface;
pub mod ops;
pub mod parser;
pub mod printer;
pub mod rewrite;
pub mod validation;
pub mod walk;

// Re-export inventory for `register_op_interface!` in downstream crates
#[doc(hidden)]
pub use inventory;

// Re-export smallvec for use in macros and external crates
pub use smallvec;

pub use context::{
    BlockArgData, BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use,
    ValueData,
};
pub use op_interface::{MemoryEffect, OpInterfaces, OpTraits};
pub use ops::{ConversionError, DialectOp};
pub use refs::{BlockRef, OpRef, PathRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use symbol::Symbol;
pub use types::{Attribute, Location, PathInterner, Span, TypeData, TypeDataBuilder, TypeInterner};
pub use walk::WalkAction;
