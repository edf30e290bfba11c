//! Swap an `omp.parallel` with the loop or conditional around it.
//!
//! ```text
//! scf.for %i {                 omp.parallel {
//!   omp.parallel {               scf.for %i {
//!     body(%i)          ==>        body(%i)
//!     omp.terminator               omp.barrier
//!   }                              scf.yield
//!   scf.yield                    }
//! }                              omp.terminator
//!                              }
//! ```
//!
//! The parallel region must be the only operation besides the terminator
//! of the enclosing body, and the enclosing construct must not produce
//! values. Loops get a barrier at the end of each iteration; conditionals
//! run once and need none.

use tracing::debug;
use weft_ir::dialect::{omp, scf};
use weft_ir::rewrite::{PatternRewriter, RewritePattern};
use weft_ir::{BlockRef, DialectOp, IrContext, OpRef, Symbol};

/// Hoist a parallel region out of a result-less `scf.for`.
pub struct InterchangeIntoLoop;

/// Hoist a parallel region out of the `then` branch of a result-less `scf.if`.
pub struct InterchangeIntoConditional;

/// Common shape check: `op` is an `omp.parallel` sharing its block only with
/// the terminator, inside an operation without results.
///
/// Returns the parallel op and the enclosing operation.
fn match_sole_parallel(ctx: &IrContext, op: OpRef) -> Option<(omp::Parallel, OpRef)> {
    let parallel = omp::Parallel::from_op(ctx, op).ok()?;
    let block = ctx.op(op).parent_block?;
    if ctx.block(block).ops.len() != 2 {
        return None;
    }
    let parent = ctx.parent_op(op)?;
    if !ctx.op_results(parent).is_empty() {
        return None;
    }
    Some((parallel, parent))
}

/// Move `parallel` in front of `outer`, pour the parallel body into
/// `outer_block`, and move `outer` into the parallel body.
fn swap_nesting(
    ctx: &mut IrContext,
    rewriter: &mut PatternRewriter,
    parallel: omp::Parallel,
    outer: OpRef,
    outer_block: BlockRef,
    with_barrier: bool,
) {
    let op = parallel.op_ref();
    rewriter.move_op_before(ctx, op, outer);

    let body = parallel.body_block(ctx);
    let Some(terminator) = ctx.block_terminator(body) else {
        return;
    };
    let contents: Vec<OpRef> = ctx
        .block(body)
        .ops
        .iter()
        .copied()
        .filter(|&o| o != terminator)
        .collect();
    rewriter.move_ops_to_block_start(ctx, &contents, outer_block);

    if with_barrier && let Some(outer_terminator) = ctx.block_terminator(outer_block) {
        let location = ctx.op(op).location;
        let barrier = omp::barrier(ctx, location).op_ref();
        rewriter.insert_op_before(ctx, outer_terminator, barrier);
    }

    rewriter.move_op_before(ctx, outer, terminator);
}

impl RewritePattern for InterchangeIntoLoop {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Some((parallel, parent)) = match_sole_parallel(ctx, op) else {
            return false;
        };
        let Ok(for_op) = scf::For::from_op(ctx, parent) else {
            return false;
        };
        if ctx.block_terminator(parallel.body_block(ctx)).is_none() {
            return false;
        }

        let body = for_op.body_block(ctx);
        swap_nesting(ctx, rewriter, parallel, parent, body, true);
        debug!("hoisted parallel region out of scf.for");
        true
    }

    fn root_kind(&self) -> Option<(Symbol, Symbol)> {
        Some(omp::Parallel::kind())
    }
}

impl RewritePattern for InterchangeIntoConditional {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Some((parallel, parent)) = match_sole_parallel(ctx, op) else {
            return false;
        };
        let Ok(if_op) = scf::If::from_op(ctx, parent) else {
            return false;
        };
        let then_block = if_op.then_block(ctx);
        if ctx.op(op).parent_block != Some(then_block) {
            return false;
        }
        if ctx.block_terminator(parallel.body_block(ctx)).is_none() {
            return false;
        }

        swap_nesting(ctx, rewriter, parallel, parent, then_block, false);
        debug!("hoisted parallel region out of scf.if");
        true
    }

    fn root_kind(&self) -> Option<(Symbol, Symbol)> {
        Some(omp::Parallel::kind())
    }
}
