//! Merge an `omp.parallel` into the parallel region preceding it.
//!
//! ```text
//! omp.parallel {            omp.parallel {
//!   codeA                     codeA
//!   omp.terminator            omp.barrier
//! }                  ==>      %c = arith.const
//! %c = arith.const            codeB(%c)
//! omp.parallel {              omp.terminator
//!   codeB(%c)               }
//!   omp.terminator
//! }
//! ```
//!
//! Read-only operations between the two regions whose results are only
//! used inside the second region are hoisted into it first.

use std::ops::ControlFlow;

use tracing::debug;
use weft_ir::dialect::omp;
use weft_ir::rewrite::{PatternRewriter, RewritePattern};
use weft_ir::walk::{WalkAction, walk_typed};
use weft_ir::{DialectOp, IrContext, OpRef, Symbol};

use crate::effects::is_read_only;

pub struct CombineAdjacentParallel;

/// The function enclosing `op`, or the outermost ancestor when there is none.
fn enclosing_scope(ctx: &IrContext, op: OpRef) -> OpRef {
    if let Some(func) = ctx.enclosing_op(op, |data| data.is("func", "func")) {
        return func;
    }
    let mut top = op;
    while let Some(parent) = ctx.parent_op(top) {
        top = parent;
    }
    top
}

/// Whether the scope of `op` holds a parallel region outside `op`.
fn has_other_parallel(ctx: &IrContext, op: OpRef) -> bool {
    let scope = enclosing_scope(ctx, op);
    walk_typed::<omp::Parallel, ()>(ctx, scope, &mut |other| {
        if ctx.is_ancestor(op, other.op_ref()) {
            ControlFlow::Continue(WalkAction::Skip)
        } else {
            ControlFlow::Break(())
        }
    })
    .is_break()
}

/// Whether every use of every result of `candidate` sits inside `region_op`.
fn only_used_inside(ctx: &IrContext, candidate: OpRef, region_op: OpRef) -> bool {
    ctx.op_results(candidate).iter().all(|&v| {
        ctx.uses(v)
            .iter()
            .all(|u| ctx.is_ancestor(region_op, u.user))
    })
}

impl RewritePattern for CombineAdjacentParallel {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(next) = omp::Parallel::from_op(ctx, op) else {
            return false;
        };
        let Some(block) = ctx.op(op).parent_block else {
            return false;
        };
        if ctx.block(block).ops.first() == Some(&op) {
            return false;
        }
        if !has_other_parallel(ctx, op) {
            return false;
        }

        let mut hoisted = 0usize;
        let prev_parallel = loop {
            let Some(prev) = ctx.prev_op(op) else {
                // Reached the front of the block.
                return hoisted > 0;
            };
            if let Ok(prev_parallel) = omp::Parallel::from_op(ctx, prev) {
                break prev_parallel;
            }
            if !is_read_only(ctx, prev) || !only_used_inside(ctx, prev, op) {
                return hoisted > 0;
            }
            let body = next.body_block(ctx);
            let clone = rewriter.clone_op_at_start(ctx, prev, body);
            let replacements = ctx.op_results(clone).to_vec();
            rewriter.replace_op_with_values(ctx, prev, &replacements);
            hoisted += 1;
        };

        let location = ctx.op(op).location;
        let target = prev_parallel.body_block(ctx);
        let barrier = omp::barrier(ctx, location).op_ref();
        rewriter.replace_terminator(ctx, target, barrier);

        let source = next.body_block(ctx);
        let moved = ctx.block(source).ops.to_vec();
        rewriter.move_ops_to_block_end(ctx, &moved, target);
        rewriter.erase_op(ctx, op);

        debug!(hoisted, "merged adjacent parallel regions");
        true
    }

    fn root_kind(&self) -> Option<(Symbol, Symbol)> {
        Some(omp::Parallel::kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::parser::parse_module;
    use weft_ir::printer::print_op;
    use weft_ir::walk::nested_ops;

    fn parallels(ctx: &IrContext, root: OpRef) -> Vec<OpRef> {
        nested_ops(ctx, root)
            .into_iter()
            .filter(|&op| omp::Parallel::matches(ctx, op))
            .collect()
    }

    fn apply_once(source: &str, index: usize) -> (bool, String) {
        let mut ctx = IrContext::new();
        let root = parse_module(&mut ctx, source).expect("parse");
        let target = parallels(&ctx, root)[index];
        let mut rewriter = PatternRewriter::new();
        let changed = CombineAdjacentParallel.match_and_rewrite(&mut ctx, target, &mut rewriter);
        (changed, print_op(&ctx, root))
    }

    #[test]
    fn merges_with_barrier() {
        let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    omp.parallel {
      %1 = mem.load %0 : core.f32
      omp.terminator
    }
    omp.parallel {
      %2 = mem.load %0 : core.f32
      mem.store %2, %0
      omp.terminator
    }
    func.return
}
";
        let (changed, text) = apply_once(source, 1);
        assert!(changed);
        insta::assert_snapshot!(text, @r"
        func.func @f {type = func.fn(core.nil, core.ptr)} {
          ^bb0(%0: core.ptr):
            omp.parallel {
              %1 = mem.load %0 : core.f32
              omp.barrier
              %2 = mem.load %0 : core.f32
              mem.store %2, %0
              omp.terminator
            }
            func.return
        }
        ");
    }

    #[test]
    fn hoists_read_only_ops_before_merging() {
        let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    omp.parallel {
      omp.terminator
    }
    %1 = arith.const {value = 1.0} : core.f32
    omp.parallel {
      mem.store %1, %0
      omp.terminator
    }
    func.return
}
";
        let (changed, text) = apply_once(source, 1);
        assert!(changed);
        insta::assert_snapshot!(text, @r"
        func.func @f {type = func.fn(core.nil, core.ptr)} {
          ^bb0(%0: core.ptr):
            omp.parallel {
              omp.barrier
              %1 = arith.const {value = 1.0} : core.f32
              mem.store %1, %0
              omp.terminator
            }
            func.return
        }
        ");
    }

    #[test]
    fn stops_at_write_between_regions() {
        let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    omp.parallel {
      omp.terminator
    }
    %1 = arith.const {value = 1.0} : core.f32
    mem.store %1, %0
    omp.parallel {
      omp.terminator
    }
    func.return
}
";
        let (changed, text) = apply_once(source, 1);
        assert!(!changed);
        assert_eq!(text, source);
    }

    #[test]
    fn value_used_after_region_is_not_hoisted() {
        let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    omp.parallel {
      omp.terminator
    }
    %1 = mem.load %0 : core.f32
    omp.parallel {
      mem.store %1, %0
      omp.terminator
    }
    mem.store %1, %0
    func.return
}
";
        let (changed, text) = apply_once(source, 1);
        assert!(!changed);
        assert_eq!(text, source);
    }

    #[test]
    fn first_in_block_does_not_match() {
        let source = "\
func.func @f {type = func.fn(core.nil)} {
  omp.parallel {
    omp.terminator
  }
  omp.parallel {
    omp.terminator
  }
  func.return
}
";
        let (changed, _) = apply_once(source, 0);
        assert!(!changed);
    }

    #[test]
    fn region_in_other_function_does_not_count() {
        let source = "\
core.module @m {
  func.func @other {type = func.fn(core.nil)} {
    omp.parallel {
      omp.terminator
    }
    func.return
  }
  func.func @f {type = func.fn(core.nil, core.ptr)} {
    ^bb0(%0: core.ptr):
      %1 = mem.load %0 : core.f32
      omp.parallel {
        mem.store %1, %0
        omp.terminator
      }
      func.return
  }
}
";
        // The only other region lives in another function.
        let (changed, text) = apply_once(source, 1);
        assert!(!changed);
        assert_eq!(text, source);
    }

    #[test]
    fn hoists_to_block_front_with_other_region_in_scope() {
        let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    %1 = mem.load %0 : core.f32
    omp.parallel {
      mem.store %1, %0
      omp.terminator
    }
    omp.parallel {
      omp.terminator
    }
    func.return
}
";
        let (changed, text) = apply_once(source, 0);
        assert!(changed);
        insta::assert_snapshot!(text, @r"
        func.func @f {type = func.fn(core.nil, core.ptr)} {
          ^bb0(%0: core.ptr):
            omp.parallel {
              %1 = mem.load %0 : core.f32
              mem.store %1, %0
              omp.terminator
            }
            omp.parallel {
              omp.terminator
            }
            func.return
        }
        ");
    }
}
