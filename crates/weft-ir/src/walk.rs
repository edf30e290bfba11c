//! Recursive operation traversal utilities.

use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::ops::DialectOp;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into nested regions.
    Advance,
    /// Skip the nested regions of the current operation.
    Skip,
}

/// Walk all operations in a region recursively.
pub fn walk_region<B>(
    ctx: &IrContext,
    region: RegionRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &block in &ctx.region(region).blocks {
        walk_block(ctx, block, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk all operations in a block recursively.
pub fn walk_block<B>(
    ctx: &IrContext,
    block: BlockRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &op in &ctx.block(block).ops {
        walk_op(ctx, op, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk an operation and its nested regions recursively (pre-order).
pub fn walk_op<B>(
    ctx: &IrContext,
    op: OpRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(op) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    for &region in &ctx.op(op).regions {
        walk_region(ctx, region, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk operations of a specific dialect type nested under `op`, including `op`.
pub fn walk_typed<T, B>(
    ctx: &IrContext,
    op: OpRef,
    f: &mut dyn FnMut(T) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()>
where
    T: DialectOp,
{
    walk_op(ctx, op, &mut |op| {
        if let Ok(typed) = T::from_op(ctx, op) {
            f(typed)
        } else {
            ControlFlow::Continue(WalkAction::Advance)
        }
    })
}

/// Every operation strictly nested inside `root`, in pre-order.
pub fn nested_ops(ctx: &IrContext, root: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    for &region in &ctx.op(root).regions {
        let _ = walk_region::<()>(ctx, region, &mut |op| {
            out.push(op);
            ControlFlow::Continue(WalkAction::Advance)
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{arith, core, omp, single_block_region};
    use crate::types::{Attribute, Location, Span};

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.mlir".to_owned());
        let loc = Location::new(path, Span::new(0, 0));
        (ctx, loc)
    }

    /// `omp.parallel { arith.const; omp.terminator }` preceded by a const.
    fn nested_fixture(ctx: &mut IrContext, loc: Location) -> (RegionRef, OpRef, OpRef, OpRef) {
        let i32_ty = core::i32(ctx);
        let (outer, outer_block) = single_block_region(ctx, loc, &[]);
        let c0 = arith::r#const(ctx, loc, i32_ty, Attribute::IntBits(0)).op_ref();
        ctx.push_op(outer_block, c0);

        let (body, body_block) = single_block_region(ctx, loc, &[]);
        let c1 = arith::r#const(ctx, loc, i32_ty, Attribute::IntBits(1)).op_ref();
        ctx.push_op(body_block, c1);
        let term = omp::terminator(ctx, loc).op_ref();
        ctx.push_op(body_block, term);
        let par = omp::parallel(ctx, loc, body).op_ref();
        ctx.push_op(outer_block, par);
        (outer, c0, par, c1)
    }

    #[test]
    fn walk_region_visits_in_preorder() {
        let (mut ctx, loc) = test_ctx();
        let (region, c0, par, c1) = nested_fixture(&mut ctx, loc);

        let mut seen = Vec::new();
        let _ = walk_region::<()>(&ctx, region, &mut |op| {
            seen.push(op);
            ControlFlow::Continue(WalkAction::Advance)
        });
        assert_eq!(seen.len(), 4);
        assert_eq!(&seen[..3], &[c0, par, c1]);
    }

    #[test]
    fn walk_with_early_exit() {
        let (mut ctx, loc) = test_ctx();
        let (region, ..) = nested_fixture(&mut ctx, loc);

        let mut visited = 0;
        let result = walk_region::<()>(&ctx, region, &mut |_op| {
            visited += 1;
            ControlFlow::Break(())
        });

        assert!(result.is_break());
        assert_eq!(visited, 1);
    }

    #[test]
    fn walk_skip_nested_regions() {
        let (mut ctx, loc) = test_ctx();
        let (region, _, par, c1) = nested_fixture(&mut ctx, loc);

        let mut seen = Vec::new();
        let _ = walk_region::<()>(&ctx, region, &mut |op| {
            seen.push(op);
            if op == par {
                ControlFlow::Continue(WalkAction::Skip)
            } else {
                ControlFlow::Continue(WalkAction::Advance)
            }
        });
        assert_eq!(seen.len(), 2);
        assert!(!seen.contains(&c1));
    }

    #[test]
    fn walk_typed_finds_parallels() {
        let (mut ctx, loc) = test_ctx();
        let (region, ..) = nested_fixture(&mut ctx, loc);
        let name = crate::Symbol::new("m");
        let module = core::module(&mut ctx, loc, name, region).op_ref();

        let mut count = 0;
        let _ = walk_typed::<omp::Parallel, ()>(&ctx, module, &mut |_p| {
            count += 1;
            ControlFlow::Continue(WalkAction::Advance)
        });
        assert_eq!(count, 1);
        assert_eq!(nested_ops(&ctx, module).len(), 4);
    }
}
