//! Memory-effect classification.

use weft_ir::{IrContext, MemoryEffect, OpInterfaces, OpRef};

/// Whether `op` at most reads memory.
///
/// An operation is read-only if it has recursive effects and everything
/// nested in its regions is read-only, or if it declares memory effects
/// and all of them are reads. When both apply, both must hold. An
/// operation with neither is not read-only.
pub fn is_read_only(ctx: &IrContext, op: OpRef) -> bool {
    let recursive = OpInterfaces::has_recursive_effects(ctx, op);
    if recursive {
        for &region in &ctx.op(op).regions {
            for &block in &ctx.region(region).blocks {
                for &nested in &ctx.block(block).ops {
                    if !is_read_only(ctx, nested) {
                        return false;
                    }
                }
            }
        }
    }

    if let Some(effects) = OpInterfaces::memory_effects(ctx, op) {
        return effects.iter().all(|&effect| effect == MemoryEffect::Read);
    }

    recursive
}
