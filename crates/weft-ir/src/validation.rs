//! Structural validation for arena IR.
//!
//! 1. **Use-chain consistency**: the use-chain stored in `IrContext` matches
//!    the actual operands of every operation in both directions.
//! 2. **Terminators**: every block owned by a terminator-requiring operation
//!    ends with exactly one terminator.
//! 3. **Parent links**: regions, blocks and operations point back at their
//!    owners.
//! 4. **Scoping**: every operand is defined earlier in the same block or in
//!    a block enclosing its user. Hoisting rewrites break this first.
//! 5. **Shapes**: known operations carry the operands, results, regions,
//!    blocks and attributes their typed wrappers index into, so text that
//!    parses but is malformed is rejected here rather than panicking later.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::dialect::gpu::Dimension;
use crate::op_interface::OpInterfaces;
use crate::refs::{BlockRef, OpRef, RegionRef, ValueDef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;
use crate::walk::{self, WalkAction};

/// A single validation failure.
#[derive(Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl fmt::Debug for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Result of validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub use_chain_errors: Vec<ValidationError>,
    pub terminator_errors: Vec<ValidationError>,
    pub structure_errors: Vec<ValidationError>,
    pub scoping_errors: Vec<ValidationError>,
    pub shape_errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.use_chain_errors.is_empty()
            && self.terminator_errors.is_empty()
            && self.structure_errors.is_empty()
            && self.scoping_errors.is_empty()
            && self.shape_errors.is_empty()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "validation passed");
        }
        let groups = [
            ("use-chain", &self.use_chain_errors),
            ("terminator", &self.terminator_errors),
            ("structure", &self.structure_errors),
            ("scoping", &self.scoping_errors),
            ("shape", &self.shape_errors),
        ];
        for (label, errors) in groups {
            if errors.is_empty() {
                continue;
            }
            writeln!(f, "{} {label} error(s) found:", errors.len())?;
            for err in errors {
                writeln!(f, "  - {err}")?;
            }
        }
        Ok(())
    }
}

fn op_name(ctx: &IrContext, op: OpRef) -> String {
    let data = ctx.op(op);
    format!("{}.{}", data.dialect, data.name)
}

/// Operations whose every block must end with a terminator.
fn requires_terminator(ctx: &IrContext, op: OpRef) -> bool {
    let data = ctx.op(op);
    data.is("omp", "parallel")
        || data.is("scf", "for")
        || data.is("scf", "if")
        || data.is("func", "func")
}

// ============================================================================
// Use-chain consistency validation
// ============================================================================

/// Validate that the use-chain stored in `IrContext` matches the actual
/// operands of every operation nested under `root`, `root` included.
pub fn validate_use_chains(ctx: &IrContext, root: OpRef) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut actual_uses: HashSet<(ValueRef, OpRef, u32)> = HashSet::new();
    let mut defined: HashSet<ValueRef> = HashSet::new();

    let _ = walk::walk_op::<()>(ctx, root, &mut |op| {
        for (idx, &operand) in ctx.op_operands(op).iter().enumerate() {
            actual_uses.insert((operand, op, idx as u32));
        }
        defined.extend(ctx.op_results(op).iter().copied());
        for &region in &ctx.op(op).regions {
            for &block in &ctx.region(region).blocks {
                defined.extend(ctx.block_args(block).iter().copied());
            }
        }
        ControlFlow::Continue(WalkAction::Advance)
    });

    // Direction 1: actual operand -> use-chain entry must exist
    for &(val, op, idx) in &actual_uses {
        let found = ctx
            .uses(val)
            .iter()
            .any(|u| u.user == op && u.operand_index == idx);
        if !found {
            errors.push(ValidationError {
                message: format!(
                    "operand #{idx} of {} ({op}) uses {val} but no use-chain entry exists",
                    op_name(ctx, op),
                ),
            });
        }
    }

    // Direction 2: use-chain entry -> actual operand must exist
    let checked: HashSet<ValueRef> = defined
        .into_iter()
        .chain(actual_uses.iter().map(|&(v, _, _)| v))
        .collect();
    for &val in &checked {
        for u in ctx.uses(val) {
            if ctx.is_erased(u.user) {
                errors.push(ValidationError {
                    message: format!("{val} is still used by erased operation {}", u.user),
                });
            } else if ctx.is_ancestor(root, u.user)
                && !actual_uses.contains(&(val, u.user, u.operand_index))
            {
                errors.push(ValidationError {
                    message: format!(
                        "use-chain entry for {val} claims use by {} operand #{}, \
                         but no such operand exists",
                        u.user, u.operand_index,
                    ),
                });
            }
        }
    }

    errors
}

// ============================================================================
// Terminator validation
// ============================================================================

/// Validate that every block of a terminator-requiring operation ends with
/// exactly one terminator.
pub fn validate_terminators(ctx: &IrContext, root: OpRef) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let _ = walk::walk_op::<()>(ctx, root, &mut |op| {
        if requires_terminator(ctx, op) {
            for &region in &ctx.op(op).regions {
                for &block in &ctx.region(region).blocks {
                    let ops = &ctx.block(block).ops;
                    let terminators = ops
                        .iter()
                        .filter(|&&o| OpInterfaces::is_terminator(ctx, o))
                        .count();
                    let ends_with_terminator = ops
                        .last()
                        .is_some_and(|&last| OpInterfaces::is_terminator(ctx, last));
                    if !ends_with_terminator || terminators != 1 {
                        errors.push(ValidationError {
                            message: format!(
                                "{block} in {} ({op}) must end with exactly one terminator, \
                                 found {terminators}",
                                op_name(ctx, op),
                            ),
                        });
                    }
                }
            }
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    errors
}

// ============================================================================
// Parent-link validation
// ============================================================================

fn check_region_links(
    ctx: &IrContext,
    owner: OpRef,
    region: RegionRef,
    errors: &mut Vec<ValidationError>,
) {
    if ctx.region(region).parent_op != Some(owner) {
        errors.push(ValidationError {
            message: format!(
                "{region} is owned by {owner} but records parent {:?}",
                ctx.region(region).parent_op
            ),
        });
    }
    for &block in &ctx.region(region).blocks {
        if ctx.block(block).parent_region != Some(region) {
            errors.push(ValidationError {
                message: format!(
                    "{block} is listed in {region} but records parent {:?}",
                    ctx.block(block).parent_region
                ),
            });
        }
        for &op in &ctx.block(block).ops {
            if ctx.op(op).parent_block != Some(block) {
                errors.push(ValidationError {
                    message: format!(
                        "{} ({op}) is listed in {block} but records parent {:?}",
                        op_name(ctx, op),
                        ctx.op(op).parent_block
                    ),
                });
            }
            if ctx.is_erased(op) {
                errors.push(ValidationError {
                    message: format!("erased operation {op} is still listed in {block}"),
                });
            }
        }
    }
}

/// Validate parent links for every region, block and operation under `root`.
pub fn validate_structure(ctx: &IrContext, root: OpRef) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let _ = walk::walk_op::<()>(ctx, root, &mut |op| {
        for &region in &ctx.op(op).regions {
            check_region_links(ctx, op, region, &mut errors);
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    errors
}

// ============================================================================
// Scoping validation
// ============================================================================

/// Whether a value living in `block` after position `after` is visible at
/// `user`. Block arguments pass `None`.
fn visible_at(ctx: &IrContext, block: BlockRef, after: Option<usize>, user: OpRef) -> bool {
    let mut current = Some(user);
    while let Some(op) = current {
        if ctx.op(op).parent_block == Some(block) {
            let Some(def_pos) = after else {
                return true;
            };
            let ops = &ctx.block(block).ops;
            return ops.iter().position(|&o| o == op).is_some_and(|pos| pos > def_pos);
        }
        current = ctx.parent_op(op);
    }
    false
}

/// Validate that every operand under `root` is in scope at its use.
pub fn validate_scoping(ctx: &IrContext, root: OpRef) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let _ = walk::walk_op::<()>(ctx, root, &mut |op| {
        for (idx, &operand) in ctx.op_operands(op).iter().enumerate() {
            let def = ctx.value_def(operand);
            let visible = match def {
                ValueDef::OpResult(def_op, _) => ctx.op(def_op).parent_block.is_some_and(|block| {
                    let pos = ctx.block(block).ops.iter().position(|&o| o == def_op);
                    pos.is_some_and(|pos| visible_at(ctx, block, Some(pos), op))
                }),
                ValueDef::BlockArg(block, _) => visible_at(ctx, block, None, op),
            };
            if !visible {
                errors.push(ValidationError {
                    message: format!(
                        "operand #{idx} of {} ({op}) is {operand}, {def}, which is not in scope",
                        op_name(ctx, op),
                    ),
                });
            }
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    errors
}

// ============================================================================
// Shape validation
// ============================================================================

/// How many blocks one region of an operation may hold.
#[derive(Clone, Copy)]
enum Blocks {
    One,
    AtMostOne,
    Any,
}

impl Blocks {
    fn admits(self, count: usize) -> bool {
        match self {
            Blocks::One => count == 1,
            Blocks::AtMostOne => count <= 1,
            Blocks::Any => true,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Blocks::One => "exactly one block",
            Blocks::AtMostOne => "at most one block",
            Blocks::Any => "any number of blocks",
        }
    }
}

#[derive(Clone, Copy)]
enum AttrKind {
    Any,
    Symbol,
    Type,
    Dimension,
}

impl AttrKind {
    fn admits(self, attr: &Attribute) -> bool {
        match self {
            AttrKind::Any => true,
            AttrKind::Symbol => attr.as_symbol().is_some(),
            AttrKind::Type => attr.as_type().is_some(),
            AttrKind::Dimension => attr.as_symbol().and_then(Dimension::from_symbol).is_some(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            AttrKind::Any => "a value",
            AttrKind::Symbol => "a symbol",
            AttrKind::Type => "a type",
            AttrKind::Dimension => "one of @x, @y, @z",
        }
    }
}

/// The operands, results, regions and attributes the typed accessors of an
/// operation index into.
struct OpShape {
    min_operands: usize,
    max_operands: Option<usize>,
    results: Option<usize>,
    regions: &'static [Blocks],
    attrs: &'static [(&'static str, AttrKind)],
}

impl OpShape {
    fn fixed(operands: usize, results: usize) -> Self {
        Self {
            min_operands: operands,
            max_operands: Some(operands),
            results: Some(results),
            regions: &[],
            attrs: &[],
        }
    }

    fn variadic(min_operands: usize) -> Self {
        Self {
            min_operands,
            max_operands: None,
            results: None,
            regions: &[],
            attrs: &[],
        }
    }

    fn any_results(mut self) -> Self {
        self.results = None;
        self
    }

    fn regions(mut self, regions: &'static [Blocks]) -> Self {
        self.regions = regions;
        self
    }

    fn attrs(mut self, attrs: &'static [(&'static str, AttrKind)]) -> Self {
        self.attrs = attrs;
        self
    }
}

fn shape_of(dialect: &str, name: &str) -> Option<OpShape> {
    let shape = match (dialect, name) {
        ("core", "module") => OpShape::fixed(0, 0).regions(&[Blocks::One]),
        ("func", "func") => OpShape::fixed(0, 0)
            .regions(&[Blocks::Any])
            .attrs(&[("sym_name", AttrKind::Symbol), ("type", AttrKind::Type)]),
        ("func", "call") => OpShape::variadic(0).attrs(&[("callee", AttrKind::Symbol)]),
        ("gpu", "module") => OpShape::fixed(0, 0)
            .regions(&[Blocks::One])
            .attrs(&[("sym_name", AttrKind::Symbol)]),
        ("gpu", "thread_id" | "block_id" | "block_dim") => {
            OpShape::fixed(0, 1).attrs(&[("dimension", AttrKind::Dimension)])
        }
        ("omp", "parallel") => OpShape::fixed(0, 0).regions(&[Blocks::One]),
        ("scf", "for") => OpShape::variadic(3).regions(&[Blocks::One]),
        ("scf", "if") => OpShape::fixed(1, 0)
            .any_results()
            .regions(&[Blocks::One, Blocks::AtMostOne]),
        ("arith", "const") => OpShape::fixed(0, 1).attrs(&[("value", AttrKind::Any)]),
        (
            "arith",
            "add" | "sub" | "mul" | "div" | "rem" | "cmp_eq" | "cmp_ne" | "cmp_lt" | "cmp_le"
            | "cmp_gt" | "cmp_ge" | "powi",
        ) => OpShape::fixed(2, 1),
        ("mem", "alloca") => OpShape::fixed(0, 1).attrs(&[("elem_type", AttrKind::Type)]),
        ("mem", "load") => OpShape::fixed(1, 1),
        ("mem", "store") => OpShape::fixed(2, 0),
        ("mem", "offset") => OpShape::fixed(2, 1).attrs(&[("elem_type", AttrKind::Type)]),
        _ => return None,
    };
    Some(shape)
}

fn check_shape(ctx: &IrContext, op: OpRef, shape: &OpShape, errors: &mut Vec<ValidationError>) {
    let data = ctx.op(op);
    let mut report = |detail: String| {
        errors.push(ValidationError {
            message: format!("{} ({op}) {detail}", op_name(ctx, op)),
        });
    };

    let operands = ctx.op_operands(op).len();
    match shape.max_operands {
        Some(expected) if operands != expected => {
            report(format!("takes {expected} operand(s), found {operands}"));
        }
        None if operands < shape.min_operands => {
            report(format!("takes at least {} operand(s), found {operands}", shape.min_operands));
        }
        _ => {}
    }

    if let Some(expected) = shape.results {
        let results = ctx.op_results(op).len();
        if results != expected {
            report(format!("produces {expected} result(s), found {results}"));
        }
    }

    if data.regions.len() != shape.regions.len() {
        report(format!(
            "needs {} region(s), found {}",
            shape.regions.len(),
            data.regions.len()
        ));
    } else {
        for (idx, (&region, blocks)) in data.regions.iter().zip(shape.regions).enumerate() {
            let count = ctx.region(region).blocks.len();
            if !blocks.admits(count) {
                report(format!(
                    "region #{idx} needs {}, found {count}",
                    blocks.describe()
                ));
            }
        }
    }

    for &(key, kind) in shape.attrs {
        match data.attributes.get(&Symbol::new(key)) {
            None => report(format!("is missing attribute `{key}`")),
            Some(attr) if !kind.admits(attr) => {
                report(format!("attribute `{key}` must be {}", kind.describe()));
            }
            Some(_) => {}
        }
    }
}

/// Validate that every known operation under `root` carries the operands,
/// results, regions, blocks and attributes its typed wrapper reads.
pub fn validate_shapes(ctx: &IrContext, root: OpRef) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let _ = walk::walk_op::<()>(ctx, root, &mut |op| {
        let data = ctx.op(op);
        let shape = data
            .dialect
            .with_str(|dialect| data.name.with_str(|name| shape_of(dialect, name)));
        if let Some(shape) = shape {
            check_shape(ctx, op, &shape, &mut errors);
        }
        // scf.for reads its induction variable from the first body argument.
        if data.is("scf", "for") {
            let entry = data.regions.first().and_then(|&r| ctx.region_entry(r));
            if entry.is_some_and(|block| ctx.block_args(block).is_empty()) {
                errors.push(ValidationError {
                    message: format!("scf.for ({op}) body has no induction variable"),
                });
            }
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    errors
}

/// Run every validation and combine the results.
pub fn validate_all(ctx: &IrContext, root: OpRef) -> ValidationResult {
    ValidationResult {
        use_chain_errors: validate_use_chains(ctx, root),
        terminator_errors: validate_terminators(ctx, root),
        structure_errors: validate_structure(ctx, root),
        scoping_errors: validate_scoping(ctx, root),
        shape_errors: validate_shapes(ctx, root),
    }
}

/// Debug-only validation that panics on any error.
///
/// Only runs under `cfg!(debug_assertions)`. Useful for checkpoints after
/// IR transformation passes.
pub fn debug_assert_valid(ctx: &IrContext, root: OpRef, pass_name: &str) {
    if !cfg!(debug_assertions) {
        return;
    }
    let result = validate_all(ctx, root);
    if !result.is_ok() {
        panic!("IR validation failed after `{pass_name}`:\n{result}");
    }
}
