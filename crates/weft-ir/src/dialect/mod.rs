//! Dialect definitions.
//!
//! Each module defines typed wrappers, constructors and accessors for its
//! operations, and registers their traits with the op-interface registry.

pub mod arith;
pub mod core;
pub mod func;
pub mod gpu;
pub mod mem;
pub mod omp;
pub mod scf;

use smallvec::smallvec;

use crate::context::{BlockArgData, BlockData, IrContext, RegionData};
use crate::refs::{BlockRef, RegionRef, TypeRef};
use crate::types::Location;

/// Create a region holding one empty block with the given argument types.
pub fn single_block_region(
    ctx: &mut IrContext,
    location: Location,
    arg_types: &[TypeRef],
) -> (RegionRef, BlockRef) {
    let block = ctx.create_block(BlockData {
        location,
        args: arg_types.iter().map(|&ty| BlockArgData::new(ty)).collect(),
        ops: Default::default(),
        parent_region: None,
    });
    let region = ctx.create_region(RegionData {
        location,
        blocks: smallvec![block],
        parent_op: None,
    });
    (region, block)
}
