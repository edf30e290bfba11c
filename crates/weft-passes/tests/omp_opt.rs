//! End-to-end behavior of the OpenMP optimization pass.

use weft_ir::dialect::{omp, scf};
use weft_ir::parser::parse_module;
use weft_ir::printer::print_op;
use weft_ir::validation::validate_all;
use weft_ir::walk::nested_ops;
use weft_ir::{DialectOp, IrContext, OpRef};
use weft_passes::{OmpOptPass, run_omp_opt};

fn parse(source: &str) -> (IrContext, OpRef) {
    let mut ctx = IrContext::new();
    let root = parse_module(&mut ctx, source).expect("parse");
    (ctx, root)
}

fn count(ctx: &IrContext, root: OpRef, dialect: &str, name: &str) -> usize {
    nested_ops(ctx, root)
        .into_iter()
        .filter(|&op| ctx.op(op).is(dialect, name))
        .count()
}

fn assert_valid(ctx: &IrContext, root: OpRef) {
    let result = validate_all(ctx, root);
    assert!(result.is_ok(), "{result}");
}

const THREE_REGIONS: &str = "\
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
    %3 = arith.const {value = 2.0} : core.f32
    omp.parallel {
      mem.store %3, %0
      omp.terminator
    }
    func.return
}
";

#[test]
fn adjacent_regions_collapse_into_one() {
    let (mut ctx, root) = parse(THREE_REGIONS);
    let result = run_omp_opt(&mut ctx, root);

    assert!(result.reached_fixpoint);
    assert_eq!(count(&ctx, root, "omp", "parallel"), 1);
    assert_eq!(count(&ctx, root, "omp", "barrier"), 2);
    assert_eq!(count(&ctx, root, "omp", "terminator"), 1);
    assert_valid(&ctx, root);

    // The constant now lives inside the surviving region.
    let parallel = nested_ops(&ctx, root)
        .into_iter()
        .find(|&op| omp::Parallel::matches(&ctx, op))
        .expect("parallel");
    let constant = nested_ops(&ctx, root)
        .into_iter()
        .find(|&op| ctx.op(op).is("arith", "const"))
        .expect("const");
    assert!(ctx.is_ancestor(parallel, constant));
}

#[test]
fn second_run_changes_nothing() {
    let (mut ctx, root) = parse(THREE_REGIONS);
    let first = run_omp_opt(&mut ctx, root);
    assert!(first.total_changes > 0);
    let after_first = print_op(&ctx, root);

    let second = run_omp_opt(&mut ctx, root);
    assert_eq!(second.total_changes, 0);
    assert_eq!(second.iterations, 1);
    assert_eq!(print_op(&ctx, root), after_first);
}

#[test]
fn hoist_then_merge_adds_one_barrier() {
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
    let (mut ctx, root) = parse(source);
    let result = run_omp_opt(&mut ctx, root);

    assert!(result.reached_fixpoint);
    // The load is hoisted into the first region, then the second region
    // merges into it.
    assert_eq!(count(&ctx, root, "omp", "parallel"), 1);
    assert_eq!(count(&ctx, root, "omp", "barrier"), 1);
    assert_valid(&ctx, root);
}

#[test]
fn merge_keeps_barrier_when_everything_between_is_hoisted() {
    let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    omp.parallel {
      %1 = mem.load %0 : core.f32
      mem.store %1, %0
      omp.terminator
    }
    %2 = mem.load %0 : core.f32
    omp.parallel {
      mem.store %2, %0
      omp.terminator
    }
    func.return
}
";
    let (mut ctx, root) = parse(source);
    let result = run_omp_opt(&mut ctx, root);

    assert!(result.reached_fixpoint);
    assert_eq!(count(&ctx, root, "omp", "parallel"), 1);
    assert_eq!(count(&ctx, root, "omp", "barrier"), 1);
    assert_valid(&ctx, root);
}

#[test]
fn lone_region_with_hoistable_prefix_is_untouched() {
    let source = "\
func.func @f {type = func.fn(core.nil, core.ptr)} {
  ^bb0(%0: core.ptr):
    %1 = mem.load %0 : core.f32
    omp.parallel {
      mem.store %1, %0
      omp.terminator
    }
    func.return
}
";
    let (mut ctx, root) = parse(source);
    let result = run_omp_opt(&mut ctx, root);
    assert_eq!(result.total_changes, 0);
    assert_eq!(print_op(&ctx, root), source);
}

#[test]
fn loop_interchange_adds_exactly_one_op() {
    let source = "\
func.func @f {type = func.fn(core.nil, core.ptr, core.i32)} {
  ^bb0(%0: core.ptr, %1: core.i32):
    %2 = arith.const {value = 0} : core.i32
    %3 = arith.const {value = 1} : core.i32
    scf.for %2, %1, %3 {
      ^bb1(%4: core.i32):
        omp.parallel {
          %5 = mem.offset %0, %4 {elem_type = core.f32} : core.ptr
          %6 = mem.load %5 : core.f32
          mem.store %6, %5
          omp.terminator
        }
        scf.yield
    }
    func.return
}
";
    let (mut ctx, root) = parse(source);
    let before = nested_ops(&ctx, root).len();
    let result = run_omp_opt(&mut ctx, root);

    assert_eq!(result.total_changes, 1);
    assert_eq!(nested_ops(&ctx, root).len(), before + 1);
    assert_eq!(count(&ctx, root, "omp", "barrier"), 1);
    assert_valid(&ctx, root);

    let parallel = nested_ops(&ctx, root)
        .into_iter()
        .find(|&op| omp::Parallel::matches(&ctx, op))
        .expect("parallel");
    let body = omp::Parallel::from_op(&ctx, parallel)
        .expect("parallel")
        .body_block(&ctx);
    let first = ctx.block(body).ops[0];
    assert!(scf::For::matches(&ctx, first));
}

#[test]
fn interchange_then_merge() {
    let source = "\
func.func @f {type = func.fn(core.nil, core.ptr, core.i32)} {
  ^bb0(%0: core.ptr, %1: core.i32):
    %2 = arith.const {value = 0} : core.i32
    %3 = arith.const {value = 1} : core.i32
    omp.parallel {
      %4 = mem.load %0 : core.f32
      omp.terminator
    }
    scf.for %2, %1, %3 {
      ^bb1(%5: core.i32):
        omp.parallel {
          %6 = mem.offset %0, %5 {elem_type = core.f32} : core.ptr
          %7 = mem.load %6 : core.f32
          mem.store %7, %6
          omp.terminator
        }
        scf.yield
    }
    func.return
}
";
    let (mut ctx, root) = parse(source);
    let result = run_omp_opt(&mut ctx, root);

    assert!(result.reached_fixpoint);
    assert_eq!(result.total_changes, 2);
    assert_eq!(count(&ctx, root, "omp", "parallel"), 1);
    // One barrier from the merge, one at the end of each loop iteration.
    assert_eq!(count(&ctx, root, "omp", "barrier"), 2);
    assert_valid(&ctx, root);
}

#[test]
fn region_climbs_out_of_conditional_and_loop() {
    let source = "\
func.func @f {type = func.fn(core.nil, core.ptr, core.i32, core.i1)} {
  ^bb0(%0: core.ptr, %1: core.i32, %2: core.i1):
    %3 = arith.const {value = 0} : core.i32
    %4 = arith.const {value = 1} : core.i32
    scf.for %3, %1, %4 {
      ^bb1(%5: core.i32):
        scf.if %2 {
          omp.parallel {
            %6 = mem.offset %0, %5 {elem_type = core.f32} : core.ptr
            %7 = mem.load %6 : core.f32
            mem.store %7, %6
            omp.terminator
          }
          scf.yield
        } {
          scf.yield
        }
        scf.yield
    }
    func.return
}
";
    let (mut ctx, root) = parse(source);
    let result = run_omp_opt(&mut ctx, root);

    assert!(result.reached_fixpoint);
    assert_eq!(result.total_changes, 2);
    assert_valid(&ctx, root);

    let parallel = nested_ops(&ctx, root)
        .into_iter()
        .find(|&op| omp::Parallel::matches(&ctx, op))
        .expect("parallel");
    assert_eq!(ctx.parent_op(parallel), Some(root));

    let ops = nested_ops(&ctx, parallel);
    let for_op = ops
        .iter()
        .copied()
        .find(|&op| scf::For::matches(&ctx, op))
        .expect("scf.for");
    let if_op = ops
        .iter()
        .copied()
        .find(|&op| scf::If::matches(&ctx, op))
        .expect("scf.if");
    assert_eq!(ctx.parent_op(for_op), Some(parallel));
    assert_eq!(ctx.parent_op(if_op), Some(for_op));
    assert_eq!(count(&ctx, root, "omp", "barrier"), 1);
}

#[test]
fn refused_shapes_are_left_alone() {
    let source = "\
func.func @f {type = func.fn(core.nil, core.i32, core.i1)} {
  ^bb0(%0: core.i32, %1: core.i1):
    %2 = scf.for %0, %0, %0, %0 : core.i32 {
      ^bb1(%3: core.i32, %4: core.i32):
        omp.parallel {
          omp.terminator
        }
        scf.yield %4
    }
    scf.if %1 {
      scf.yield
    } {
      omp.parallel {
        omp.terminator
      }
      scf.yield
    }
    func.return
}
";
    let (mut ctx, root) = parse(source);
    let result = run_omp_opt(&mut ctx, root);
    assert_eq!(result.total_changes, 0);
    assert_eq!(print_op(&ctx, root), source);
}

#[test]
fn iteration_cap_limits_progress() {
    let (mut ctx, root) = parse(THREE_REGIONS);
    let result = OmpOptPass::new().with_max_iterations(1).run(&mut ctx, root);
    assert_eq!(result.iterations, 1);
    assert!(result.total_changes > 0);
    assert!(!result.reached_fixpoint);
    assert_valid(&ctx, root);
}
