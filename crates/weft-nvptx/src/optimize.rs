//! Module-level optimization.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info_span};

use crate::errors::{SerializeError, SerializeErrorKind, SerializeResult};
use crate::llvm::{
    BinaryOp, CastOp, FloatPredicate, Function, InstKind, IntPredicate, Linkage, LlvmModule,
    MetadataId, MetadataNode, MetadataOperand, Operand, Ty, verify_module,
};
use crate::target::TargetMachine;

/// A whole-module optimization pipeline.
pub trait OptimizingTransform {
    /// Optimize `module` in place, reporting failures as messages.
    fn run(&self, module: &mut LlvmModule) -> Result<(), Vec<String>>;
}

/// The default pipeline for a given optimization level.
///
/// | level | passes |
/// |-------|--------|
/// | 0 | verification |
/// | 1 | + dead instruction elimination |
/// | 2 | + constant folding |
/// | 3 | + dead internal function elimination |
#[derive(Clone, Debug)]
pub struct StandardPipeline {
    opt_level: u32,
    size_level: u32,
    triple: String,
}

impl StandardPipeline {
    pub fn new(opt_level: u32, size_level: u32, target: &TargetMachine) -> Self {
        Self {
            opt_level,
            size_level,
            triple: target.triple.clone(),
        }
    }
}

impl OptimizingTransform for StandardPipeline {
    fn run(&self, module: &mut LlvmModule) -> Result<(), Vec<String>> {
        let _span = info_span!("optimize", level = self.opt_level, size = self.size_level).entered();
        verify_module(module).map_err(|err| err.messages)?;

        if self.opt_level >= 2 {
            let folded: usize = module.functions.iter_mut().map(fold_constants).sum();
            debug!(folded, "folded constants");
        }
        if self.opt_level >= 1 {
            let removed: usize = module
                .functions
                .iter_mut()
                .map(eliminate_dead_instructions)
                .sum();
            debug!(removed, "removed dead instructions");
        }
        if self.opt_level >= 3 || self.size_level > 0 {
            let removed = eliminate_dead_functions(module);
            debug!(removed, triple = %self.triple, "removed dead functions");
        }

        verify_module(module).map_err(|err| err.messages)
    }
}

/// Optimize `module` with the standard pipeline for `opt_level`.
pub fn optimize_llvm(
    module: &mut LlvmModule,
    opt_level: i32,
    target: &TargetMachine,
) -> SerializeResult<()> {
    let level = check_opt_level(opt_level)?;
    optimize_llvm_with(module, opt_level, &StandardPipeline::new(level, 0, target))
}

/// Run `transform` on `module`, then apply the fixed device cleanups.
///
/// `opt_level` is validated before `transform` runs. After optimization
/// every address computation is marked `inbounds`, every floating-point
/// operation allows contraction, and debug info is removed.
pub fn optimize_llvm_with(
    module: &mut LlvmModule,
    opt_level: i32,
    transform: &dyn OptimizingTransform,
) -> SerializeResult<()> {
    check_opt_level(opt_level)?;
    transform.run(module).map_err(|messages| {
        let report = messages
            .iter()
            .map(|message| format!("Could not optimize LLVM IR: {message}\n"))
            .collect::<String>();
        SerializeError::from(SerializeErrorKind::Optimization(report))
    })?;
    mark_inbounds(module);
    mark_contract(module);
    strip_debug_info(module);
    Ok(())
}

pub fn check_opt_level(opt_level: i32) -> SerializeResult<u32> {
    match u32::try_from(opt_level) {
        Ok(level) if level <= 3 => Ok(level),
        _ => Err(SerializeErrorKind::InvalidOptLevel(opt_level).into()),
    }
}

pub fn mark_inbounds(module: &mut LlvmModule) {
    for function in &mut module.functions {
        for inst in function.instructions_mut() {
            if let InstKind::Gep { inbounds, .. } = &mut inst.kind {
                *inbounds = true;
            }
        }
    }
}

pub fn mark_contract(module: &mut LlvmModule) {
    for function in &mut module.functions {
        for inst in function.instructions_mut() {
            if inst.is_fp_math() {
                inst.contract = true;
            }
        }
    }
}

/// Remove debug attachments, debug intrinsics and debug metadata.
pub fn strip_debug_info(module: &mut LlvmModule) {
    let is_debug = |name: &str| name.starts_with("llvm.dbg.");

    module.functions.retain(|f| !(f.is_declaration() && is_debug(&f.name)));
    for function in &mut module.functions {
        function.dbg = None;
        for block in &mut function.blocks {
            block
                .instructions
                .retain(|inst| !inst.callee().is_some_and(is_debug));
            for inst in &mut block.instructions {
                inst.dbg = None;
            }
        }
    }
    module.named_metadata.retain(|nm| !is_debug(&nm.name));

    // Drop nodes that only debug attachments kept alive.
    let mut live: BTreeSet<MetadataId> = BTreeSet::new();
    let mut stack: Vec<MetadataId> = module
        .named_metadata
        .iter()
        .flat_map(|nm| nm.nodes.iter().copied())
        .collect();
    while let Some(id) = stack.pop() {
        if live.insert(id)
            && let Some(node) = module.metadata_node(id)
        {
            stack.extend(node.references());
        }
    }
    let before = module.metadata.len();
    module.metadata.retain(|id, _| live.contains(id));
    debug!(removed = before - module.metadata.len(), "stripped debug metadata");
}

fn replace_local_uses(function: &mut Function, local: &str, replacement: &Operand) {
    for inst in function.instructions_mut() {
        for operand in inst.operands_mut() {
            if operand.as_local() == Some(local) {
                *operand = replacement.clone();
            }
        }
    }
}

/// Truncate a folded integer to the width of `ty`, sign-extended.
fn normalize_int(ty: Ty, value: i64) -> i64 {
    match ty {
        Ty::I1 => value & 1,
        Ty::I32 => i64::from(value as i32),
        _ => value,
    }
}

fn normalize_float(ty: Ty, value: f64) -> f64 {
    if ty == Ty::F32 {
        f64::from(value as f32)
    } else {
        value
    }
}

fn fold_instruction(kind: &InstKind) -> Option<Operand> {
    match kind {
        InstKind::Binary {
            op,
            ty,
            lhs: Operand::Int(a),
            rhs: Operand::Int(b),
        } => {
            let (a, b) = (*a, *b);
            let value = match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::SDiv if b != 0 => a.checked_div(b)?,
                BinaryOp::SRem if b != 0 => a.checked_rem(b)?,
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
                _ => return None,
            };
            Some(Operand::Int(normalize_int(*ty, value)))
        }
        InstKind::Binary {
            op,
            ty,
            lhs: Operand::Float(a),
            rhs: Operand::Float(b),
        } => {
            let value = match op {
                BinaryOp::FAdd => a + b,
                BinaryOp::FSub => a - b,
                BinaryOp::FMul => a * b,
                BinaryOp::FDiv => a / b,
                BinaryOp::FRem => a % b,
                _ => return None,
            };
            Some(Operand::Float(normalize_float(*ty, value)))
        }
        InstKind::FNeg {
            ty,
            value: Operand::Float(a),
        } => Some(Operand::Float(normalize_float(*ty, -a))),
        InstKind::ICmp {
            pred,
            lhs: Operand::Int(a),
            rhs: Operand::Int(b),
            ..
        } => {
            let holds = match pred {
                IntPredicate::Eq => a == b,
                IntPredicate::Ne => a != b,
                IntPredicate::Slt => a < b,
                IntPredicate::Sle => a <= b,
                IntPredicate::Sgt => a > b,
                IntPredicate::Sge => a >= b,
            };
            Some(Operand::Int(i64::from(holds)))
        }
        InstKind::FCmp {
            pred,
            lhs: Operand::Float(a),
            rhs: Operand::Float(b),
            ..
        } => {
            let holds = match pred {
                FloatPredicate::Oeq => a == b,
                FloatPredicate::One => !a.is_nan() && !b.is_nan() && a != b,
                FloatPredicate::Olt => a < b,
                FloatPredicate::Ole => a <= b,
                FloatPredicate::Ogt => a > b,
                FloatPredicate::Oge => a >= b,
            };
            Some(Operand::Int(i64::from(holds)))
        }
        InstKind::Cast {
            op,
            from,
            value,
            to,
        } => match (op, value) {
            (CastOp::ZExt, Operand::Int(v)) => Some(Operand::Int(match from {
                Ty::I1 => v & 1,
                Ty::I32 => i64::from(*v as u32),
                _ => *v,
            })),
            (CastOp::SExt, Operand::Int(v)) => Some(Operand::Int(if *from == Ty::I1 {
                -(v & 1)
            } else {
                *v
            })),
            (CastOp::Trunc, Operand::Int(v)) => Some(Operand::Int(normalize_int(*to, *v))),
            (CastOp::SIToFP, Operand::Int(v)) => {
                Some(Operand::Float(normalize_float(*to, *v as f64)))
            }
            (CastOp::FPToSI, Operand::Float(v)) if v.is_finite() => {
                Some(Operand::Int(normalize_int(*to, *v as i64)))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Fold instructions whose operands are all constants.
fn fold_constants(function: &mut Function) -> usize {
    let mut folded = 0;
    loop {
        let found = function.blocks.iter().enumerate().find_map(|(b, block)| {
            block.instructions.iter().enumerate().find_map(|(i, inst)| {
                let result = inst.result.clone()?;
                fold_instruction(&inst.kind).map(|constant| (b, i, result, constant))
            })
        });
        let Some((block, index, result, constant)) = found else {
            return folded;
        };
        function.blocks[block].instructions.remove(index);
        replace_local_uses(function, &result, &constant);
        folded += 1;
    }
}

/// Remove side-effect-free instructions whose results are unused.
fn eliminate_dead_instructions(function: &mut Function) -> usize {
    let mut removed = 0;
    loop {
        let used: HashSet<String> = function
            .instructions()
            .flat_map(|inst| inst.operands())
            .filter_map(|operand| operand.as_local().map(str::to_owned))
            .collect();
        let mut changed = false;
        for block in &mut function.blocks {
            let before = block.instructions.len();
            block.instructions.retain(|inst| {
                !inst.is_trivially_dead_if_unused()
                    || inst.result.as_ref().is_some_and(|r| used.contains(r))
            });
            let gone = before - block.instructions.len();
            removed += gone;
            changed |= gone > 0;
        }
        if !changed {
            return removed;
        }
    }
}

/// Remove internal functions nothing refers to.
fn eliminate_dead_functions(module: &mut LlvmModule) -> usize {
    let mut removed = 0;
    loop {
        let mut referenced: HashSet<String> = HashSet::new();
        for function in &module.functions {
            for inst in function.instructions() {
                if let Some(callee) = inst.callee()
                    && callee != function.name
                {
                    referenced.insert(callee.to_owned());
                }
                for operand in inst.operands() {
                    if let Operand::Global(name) = operand {
                        referenced.insert(name.clone());
                    }
                }
            }
        }
        for def in module.metadata.values() {
            if let MetadataNode::Tuple(ops) = &def.node {
                for op in ops {
                    if let MetadataOperand::Function(name) = op {
                        referenced.insert(name.clone());
                    }
                }
            }
        }

        let before = module.functions.len();
        module.functions.retain(|f| {
            f.linkage != Linkage::Internal || f.is_declaration() || referenced.contains(&f.name)
        });
        let gone = before - module.functions.len();
        if gone == 0 {
            return removed;
        }
        removed += gone;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llvm::parse_module;

    fn target() -> TargetMachine {
        TargetMachine::new("nvptx64-nvidia-cuda", "sm_35", "+ptx60")
    }

    const SOURCE: &str = "\
define void @k(ptr %p, i32 %i) !dbg !1 {
entry:
  %two = add i32 1, 1
  %q = getelementptr float, ptr %p, i32 %two
  %unused = mul i32 %i, %i
  %v = load float, ptr %q, !dbg !2
  %w = fmul float %v, 2.0
  call void @llvm.dbg.value(ptr %p)
  store float %w, ptr %q
  ret void
}

define internal float @orphan(float %x) {
entry:
  ret float %x
}

declare void @llvm.dbg.value(ptr)

!nvvm.annotations = !{!0}
!llvm.dbg.cu = !{!3}

!0 = !{ptr @k, !\"kernel\", i32 1}
!1 = distinct !DISubprogram(name: \"k\", unit: !3)
!2 = !DILocation(line: 4, scope: !1)
!3 = distinct !DICompileUnit(language: DW_LANG_C)
";

    #[test]
    fn level_three_pipeline() {
        let mut module = parse_module("k", SOURCE).unwrap();
        optimize_llvm(&mut module, 3, &target()).expect("optimize");
        insta::assert_snapshot!(module.to_string(), @r#"
        ; ModuleID = 'k'

        define void @k(ptr %p, i32 %i) {
        entry:
          %q = getelementptr inbounds float, ptr %p, i32 2
          %v = load float, ptr %q
          %w = fmul contract float %v, 2.0
          store float %w, ptr %q
          ret void
        }

        !nvvm.annotations = !{!0}

        !0 = !{ptr @k, !"kernel", i32 1}
        "#);
    }

    #[test]
    fn level_zero_only_cleans_up() {
        let mut module = parse_module("k", SOURCE).unwrap();
        optimize_llvm(&mut module, 0, &target()).expect("optimize");
        let k = module.function("k").unwrap();
        assert_eq!(k.blocks[0].instructions.len(), 7);
        assert!(module.function("orphan").is_some());
        assert!(module.function("llvm.dbg.value").is_none());
        assert!(module.metadata.keys().eq([MetadataId(0)].iter()));
    }

    #[test]
    fn out_of_range_levels_are_rejected() {
        for level in [-1, 4] {
            let mut module = parse_module("k", SOURCE).unwrap();
            let before = module.clone();
            let err = optimize_llvm(&mut module, level, &target()).unwrap_err();
            assert_eq!(err.kind(), &SerializeErrorKind::InvalidOptLevel(level));
            assert_eq!(module, before);
        }
    }

    struct Failing {
        runs: std::cell::Cell<usize>,
        messages: Vec<&'static str>,
    }

    impl Failing {
        fn with(messages: &[&'static str]) -> Self {
            Self {
                runs: Default::default(),
                messages: messages.to_vec(),
            }
        }
    }

    impl OptimizingTransform for Failing {
        fn run(&self, _module: &mut LlvmModule) -> Result<(), Vec<String>> {
            self.runs.set(self.runs.get() + 1);
            Err(self.messages.iter().map(|m| m.to_string()).collect())
        }
    }

    #[test]
    fn transform_failure_is_reported() {
        let mut module = parse_module("k", SOURCE).unwrap();
        let failing = Failing::with(&["pass exploded"]);
        let err = optimize_llvm_with(&mut module, 2, &failing).unwrap_err();
        assert_eq!(err.to_string(), "Could not optimize LLVM IR: pass exploded\n");
        assert_eq!(failing.runs.get(), 1);
    }

    #[test]
    fn every_failure_message_gets_its_own_line() {
        let mut module = parse_module("k", SOURCE).unwrap();
        let failing = Failing::with(&["pass exploded", "verifier unhappy"]);
        let err = optimize_llvm_with(&mut module, 3, &failing).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not optimize LLVM IR: pass exploded\n\
             Could not optimize LLVM IR: verifier unhappy\n"
        );
    }

    #[test]
    fn invalid_level_skips_transform() {
        let mut module = parse_module("k", SOURCE).unwrap();
        let failing = Failing::with(&["never reached"]);
        let err = optimize_llvm_with(&mut module, 4, &failing).unwrap_err();
        assert_eq!(err.kind(), &SerializeErrorKind::InvalidOptLevel(4));
        assert_eq!(failing.runs.get(), 0);
    }

    #[test]
    fn folding_respects_width() {
        let mut function = parse_module(
            "m",
            "\
define i32 @f() {
entry:
  %a = mul i32 65536, 65536
  %b = sdiv i32 %a, 0
  %c = icmp eq i32 %a, 0
  %d = zext i1 %c to i32
  ret i32 %d
}
",
        )
        .unwrap()
        .functions
        .remove(0);
        assert_eq!(fold_constants(&mut function), 3);
        let text: Vec<String> = function.instructions().map(ToString::to_string).collect();
        assert_eq!(text, vec!["%b = sdiv i32 0, 0", "ret i32 1"]);
    }
}
