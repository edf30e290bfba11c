//! Translation of `gpu.module` contents into lowered IR.
//!
//! Supports straight-line device functions over the `arith`, `mem`,
//! `func` and `gpu` dialects. Functions carrying `gpu.kernel` are listed
//! in `nvvm.annotations`.

use std::collections::HashMap;

use derive_more::Display;
use tracing::{debug, error};
use weft_ir::dialect::{arith, core, func, gpu, mem};
use weft_ir::{Attribute, DialectOp, IrContext, OpRef, TypeRef, ValueRef};

use crate::llvm::{
    BasicBlock, BinaryOp, CastOp, FloatPredicate, Function, InstKind, Instruction, IntPredicate,
    Linkage, LlvmModule, Operand, Param, Ty,
};

/// Produces lowered IR for one `gpu.module`.
pub trait ModuleTranslator {
    /// Translate `module`, or `None` when it cannot be expressed.
    fn translate(&self, ctx: &IrContext, module: gpu::Module, name: &str) -> Option<LlvmModule>;
}

/// Translator for modules built from the in-tree dialects.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArenaTranslator;

impl ModuleTranslator for ArenaTranslator {
    fn translate(&self, ctx: &IrContext, module: gpu::Module, name: &str) -> Option<LlvmModule> {
        match translate_module(ctx, module, name) {
            Ok(translated) => Some(translated),
            Err(err) => {
                error!(module = name, %err, "cannot translate gpu module");
                None
            }
        }
    }
}

#[derive(Clone, Debug, Display, PartialEq)]
pub enum TranslateError {
    #[display("unsupported operation {_0}")]
    UnsupportedOp(String),
    #[display("unsupported type in {_0}")]
    UnsupportedType(String),
    #[display("function @{_0} has more than one block")]
    MultipleBlocks(String),
    #[display("value used before its definition in @{_0}")]
    UndefinedValue(String),
}

impl std::error::Error for TranslateError {}

fn full_name(ctx: &IrContext, op: OpRef) -> String {
    let data = ctx.op(op);
    format!("{}.{}", data.dialect, data.name)
}

/// Map a `core` type to a lowered type.
fn lower_type(ctx: &IrContext, ty: TypeRef) -> Option<Ty> {
    if let Some(width) = core::int_width(ctx, ty) {
        return match width {
            1 => Some(Ty::I1),
            32 => Some(Ty::I32),
            64 => Some(Ty::I64),
            _ => None,
        };
    }
    if let Some(width) = core::float_width(ctx, ty) {
        return match width {
            32 => Some(Ty::F32),
            64 => Some(Ty::F64),
            _ => None,
        };
    }
    if ctx.types.is_dialect(ty, "core", "ptr") {
        return Some(Ty::Ptr);
    }
    if ctx.types.is_dialect(ty, "core", "nil") {
        return Some(Ty::Void);
    }
    None
}

/// Translate every function of `module`.
pub fn translate_module(
    ctx: &IrContext,
    module: gpu::Module,
    name: &str,
) -> Result<LlvmModule, TranslateError> {
    let mut out = LlvmModule::new(name);
    let mut intrinsics: Vec<Function> = Vec::new();

    for &op in &ctx.block(module.body_block(ctx)).ops {
        let Ok(function) = func::Func::from_op(ctx, op) else {
            return Err(TranslateError::UnsupportedOp(full_name(ctx, op)));
        };
        let symbol = function.sym_name(ctx).to_string();
        let fn_ty = function.fn_type(ctx);
        let ret = func::fn_type_result(ctx, fn_ty)
            .and_then(|ty| lower_type(ctx, ty))
            .ok_or_else(|| TranslateError::UnsupportedType(format!("@{symbol}")))?;
        let params = func::fn_type_params(ctx, fn_ty)
            .iter()
            .map(|&ty| lower_type(ctx, ty))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TranslateError::UnsupportedType(format!("@{symbol}")))?;

        if function.is_declaration(ctx) {
            out.functions
                .push(Function::declaration(symbol, ret, &params));
            continue;
        }
        if ctx.region(function.body(ctx)).blocks.len() != 1 {
            return Err(TranslateError::MultipleBlocks(symbol));
        }

        let mut builder = FunctionBuilder::new(ctx, symbol.clone());
        let entry = ctx.region(function.body(ctx)).blocks[0];
        let mut lowered_params = Vec::with_capacity(params.len());
        for (&arg, &ty) in ctx.block_args(entry).iter().zip(&params) {
            let local = builder.fresh();
            builder.values.insert(arg, Operand::local(local.clone()));
            lowered_params.push(Param {
                ty,
                name: Some(local),
            });
        }
        for &op in &ctx.block(entry).ops {
            builder.translate_op(op)?;
        }

        debug!(function = %symbol, instructions = builder.instructions.len(), "translated function");
        let kernel = function.is_kernel(ctx);
        out.functions.push(Function {
            name: symbol.clone(),
            linkage: Linkage::External,
            ret,
            params: lowered_params,
            blocks: vec![BasicBlock {
                label: "entry".to_owned(),
                instructions: builder.instructions,
            }],
            dbg: None,
        });
        intrinsics.extend(builder.intrinsics);
        if kernel {
            out.annotate_kernel(&symbol);
        }
    }

    for intrinsic in intrinsics {
        let params: Vec<Ty> = intrinsic.param_types().collect();
        out.get_or_insert_declaration(&intrinsic.name, intrinsic.ret, &params);
    }
    Ok(out)
}

struct FunctionBuilder<'a> {
    ctx: &'a IrContext,
    function: String,
    values: HashMap<ValueRef, Operand>,
    next_local: u32,
    instructions: Vec<Instruction>,
    intrinsics: Vec<Function>,
}

impl<'a> FunctionBuilder<'a> {
    fn new(ctx: &'a IrContext, function: String) -> Self {
        Self {
            ctx,
            function,
            values: HashMap::new(),
            next_local: 0,
            instructions: Vec::new(),
            intrinsics: Vec::new(),
        }
    }

    fn fresh(&mut self) -> String {
        let name = self.next_local.to_string();
        self.next_local += 1;
        name
    }

    fn operand(&self, value: ValueRef) -> Result<Operand, TranslateError> {
        self.values
            .get(&value)
            .cloned()
            .ok_or_else(|| TranslateError::UndefinedValue(self.function.clone()))
    }

    fn value_ty(&self, value: ValueRef, op: OpRef) -> Result<Ty, TranslateError> {
        lower_type(self.ctx, self.ctx.value_ty(value))
            .ok_or_else(|| TranslateError::UnsupportedType(full_name(self.ctx, op)))
    }

    /// Append an instruction defining `result`.
    fn define(&mut self, result: ValueRef, kind: InstKind) {
        let local = self.fresh();
        self.values.insert(result, Operand::local(local.clone()));
        self.instructions.push(Instruction::named(local, kind));
    }

    fn require_intrinsic(&mut self, name: &str, ret: Ty, params: &[Ty]) {
        if !self.intrinsics.iter().any(|f| f.name == name) {
            self.intrinsics
                .push(Function::declaration(name, ret, params));
        }
    }

    fn translate_op(&mut self, op: OpRef) -> Result<(), TranslateError> {
        let ctx = self.ctx;
        let data = ctx.op(op);
        let unsupported = || TranslateError::UnsupportedOp(full_name(ctx, op));
        if !data.regions.is_empty() {
            return Err(unsupported());
        }

        let dialect = data.dialect.to_string();
        let name = data.name.to_string();
        match (dialect.as_str(), name.as_str()) {
            ("arith", "const") => {
                let c = arith::Const::from_op(ctx, op).map_err(|_| unsupported())?;
                let result = c.result(ctx);
                let ty = self.value_ty(result, op)?;
                let constant = match (c.value(ctx), ty) {
                    (Attribute::Bool(b), _) => Operand::Int(i64::from(b)),
                    (Attribute::IntBits(bits), Ty::I1) => Operand::Int((bits & 1) as i64),
                    (Attribute::IntBits(bits), Ty::I32) => Operand::Int(i64::from(bits as u32 as i32)),
                    (Attribute::IntBits(bits), Ty::I64) => Operand::Int(bits as i64),
                    (Attribute::FloatBits(bits), Ty::F32 | Ty::F64) => {
                        Operand::Float(f64::from_bits(bits))
                    }
                    _ => return Err(TranslateError::UnsupportedType(full_name(ctx, op))),
                };
                self.values.insert(result, constant);
            }
            ("arith", "add" | "sub" | "mul" | "div" | "rem") => {
                let (lhs, rhs) = (ctx.op_operands(op)[0], ctx.op_operands(op)[1]);
                let result = ctx.op_result(op, 0);
                let ty = self.value_ty(result, op)?;
                let op_kind = match (name.as_str(), ty.is_float()) {
                    ("add", false) => BinaryOp::Add,
                    ("sub", false) => BinaryOp::Sub,
                    ("mul", false) => BinaryOp::Mul,
                    ("div", false) => BinaryOp::SDiv,
                    ("rem", false) => BinaryOp::SRem,
                    ("add", true) => BinaryOp::FAdd,
                    ("sub", true) => BinaryOp::FSub,
                    ("mul", true) => BinaryOp::FMul,
                    ("div", true) => BinaryOp::FDiv,
                    _ => BinaryOp::FRem,
                };
                let kind = InstKind::Binary {
                    op: op_kind,
                    ty,
                    lhs: self.operand(lhs)?,
                    rhs: self.operand(rhs)?,
                };
                self.define(result, kind);
            }
            ("arith", cmp) if cmp.starts_with("cmp_") => {
                let (lhs, rhs) = (ctx.op_operands(op)[0], ctx.op_operands(op)[1]);
                let ty = self.value_ty(lhs, op)?;
                let (lhs, rhs) = (self.operand(lhs)?, self.operand(rhs)?);
                let suffix = &cmp["cmp_".len()..];
                let kind = if ty.is_float() {
                    let pred = match suffix {
                        "eq" => FloatPredicate::Oeq,
                        "ne" => FloatPredicate::One,
                        "lt" => FloatPredicate::Olt,
                        "le" => FloatPredicate::Ole,
                        "gt" => FloatPredicate::Ogt,
                        "ge" => FloatPredicate::Oge,
                        _ => return Err(unsupported()),
                    };
                    InstKind::FCmp { pred, ty, lhs, rhs }
                } else {
                    let pred = match suffix {
                        "eq" => IntPredicate::Eq,
                        "ne" => IntPredicate::Ne,
                        "lt" => IntPredicate::Slt,
                        "le" => IntPredicate::Sle,
                        "gt" => IntPredicate::Sgt,
                        "ge" => IntPredicate::Sge,
                        _ => return Err(unsupported()),
                    };
                    InstKind::ICmp { pred, ty, lhs, rhs }
                };
                self.define(ctx.op_result(op, 0), kind);
            }
            ("arith", "powi") => {
                let powi = arith::Powi::from_op(ctx, op).map_err(|_| unsupported())?;
                let base_ty = self.value_ty(powi.lhs(ctx), op)?;
                let exp_ty = self.value_ty(powi.rhs(ctx), op)?;
                let suffix = match base_ty {
                    Ty::F32 => "f32",
                    Ty::F64 => "f64",
                    _ => return Err(TranslateError::UnsupportedType(full_name(ctx, op))),
                };
                if exp_ty != Ty::I32 {
                    return Err(TranslateError::UnsupportedType(full_name(ctx, op)));
                }
                let callee = format!("llvm.powi.{suffix}.i32");
                self.require_intrinsic(&callee, base_ty, &[base_ty, Ty::I32]);
                let kind = InstKind::Call {
                    ret: base_ty,
                    callee,
                    args: vec![
                        (base_ty, self.operand(powi.lhs(ctx))?),
                        (Ty::I32, self.operand(powi.rhs(ctx))?),
                    ],
                };
                self.define(powi.result(ctx), kind);
            }
            ("mem", "load") => {
                let load = mem::Load::from_op(ctx, op).map_err(|_| unsupported())?;
                let ty = self.value_ty(load.result(ctx), op)?;
                let kind = InstKind::Load {
                    ty,
                    ptr: self.operand(load.ptr(ctx))?,
                };
                self.define(load.result(ctx), kind);
            }
            ("mem", "store") => {
                let store = mem::Store::from_op(ctx, op).map_err(|_| unsupported())?;
                let ty = self.value_ty(store.value(ctx), op)?;
                self.instructions.push(Instruction::new(InstKind::Store {
                    ty,
                    value: self.operand(store.value(ctx))?,
                    ptr: self.operand(store.ptr(ctx))?,
                }));
            }
            ("mem", "alloca") => {
                let alloca = mem::Alloca::from_op(ctx, op).map_err(|_| unsupported())?;
                let ty = lower_type(ctx, alloca.elem_type(ctx))
                    .ok_or_else(|| TranslateError::UnsupportedType(full_name(ctx, op)))?;
                self.define(alloca.result(ctx), InstKind::Alloca { ty });
            }
            ("mem", "offset") => {
                let offset = mem::Offset::from_op(ctx, op).map_err(|_| unsupported())?;
                let elem = lower_type(ctx, offset.elem_type(ctx))
                    .ok_or_else(|| TranslateError::UnsupportedType(full_name(ctx, op)))?;
                let index_ty = self.value_ty(offset.index(ctx), op)?;
                let kind = InstKind::Gep {
                    inbounds: false,
                    elem,
                    base: self.operand(offset.base(ctx))?,
                    index_ty,
                    index: self.operand(offset.index(ctx))?,
                };
                self.define(offset.result(ctx), kind);
            }
            ("func", "call") => {
                let call = func::Call::from_op(ctx, op).map_err(|_| unsupported())?;
                let mut args = Vec::new();
                for &arg in call.args(ctx) {
                    args.push((self.value_ty(arg, op)?, self.operand(arg)?));
                }
                let callee = call.callee(ctx).to_string();
                match call.results(ctx) {
                    [] => self.instructions.push(Instruction::new(InstKind::Call {
                        ret: Ty::Void,
                        callee,
                        args,
                    })),
                    &[result] => {
                        let ret = self.value_ty(result, op)?;
                        self.define(result, InstKind::Call { ret, callee, args });
                    }
                    _ => return Err(unsupported()),
                }
            }
            ("func", "return") => {
                let value = match ctx.op_operands(op) {
                    [] => None,
                    &[value] => Some((self.value_ty(value, op)?, self.operand(value)?)),
                    _ => return Err(unsupported()),
                };
                self.instructions
                    .push(Instruction::new(InstKind::Ret(value)));
            }
            ("gpu", "thread_id" | "block_id" | "block_dim") => {
                let (register, dim) = if let Ok(t) = gpu::ThreadId::from_op(ctx, op) {
                    ("tid", t.dimension(ctx))
                } else if let Ok(b) = gpu::BlockId::from_op(ctx, op) {
                    ("ctaid", b.dimension(ctx))
                } else {
                    let d = gpu::BlockDim::from_op(ctx, op).map_err(|_| unsupported())?;
                    ("ntid", d.dimension(ctx))
                };
                let callee = format!("llvm.nvvm.read.ptx.sreg.{register}.{}", dim.as_str());
                self.require_intrinsic(&callee, Ty::I32, &[]);
                let result = ctx.op_result(op, 0);
                let call = InstKind::Call {
                    ret: Ty::I32,
                    callee,
                    args: Vec::new(),
                };
                match self.value_ty(result, op)? {
                    Ty::I32 => self.define(result, call),
                    Ty::I64 => {
                        let raw = self.fresh();
                        self.instructions.push(Instruction::named(raw.clone(), call));
                        self.define(
                            result,
                            InstKind::Cast {
                                op: CastOp::ZExt,
                                from: Ty::I32,
                                value: Operand::Local(raw),
                                to: Ty::I64,
                            },
                        );
                    }
                    _ => return Err(TranslateError::UnsupportedType(full_name(ctx, op))),
                }
            }
            ("gpu", "barrier") => {
                self.require_intrinsic("llvm.nvvm.barrier0", Ty::Void, &[]);
                self.instructions.push(Instruction::new(InstKind::Call {
                    ret: Ty::Void,
                    callee: "llvm.nvvm.barrier0".to_owned(),
                    args: Vec::new(),
                }));
            }
            _ => return Err(unsupported()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_ir::parser::parse_module;

    fn translate_text(source: &str) -> Result<LlvmModule, TranslateError> {
        let mut ctx = IrContext::new();
        let op = parse_module(&mut ctx, source).expect("parse");
        let module = gpu::Module::from_op(&ctx, op).expect("gpu.module");
        translate_module(&ctx, module, "kernels")
    }

    #[test]
    fn translates_kernel() {
        let source = "\
gpu.module @kernels {
  func.func @saxpy {gpu.kernel = unit, type = func.fn(core.nil, core.ptr, core.f32)} {
    ^bb0(%0: core.ptr, %1: core.f32):
      %2 = gpu.thread_id {dimension = @x} : core.i32
      %3 = mem.offset %0, %2 {elem_type = core.f32} : core.ptr
      %4 = mem.load %3 : core.f32
      %5 = arith.mul %4, %1 : core.f32
      mem.store %5, %3
      func.return
  }
}
";
        let module = translate_text(source).expect("translate");
        insta::assert_snapshot!(module.to_string(), @r#"
        ; ModuleID = 'kernels'

        define void @saxpy(ptr %0, float %1) {
        entry:
          %2 = call i32 @llvm.nvvm.read.ptx.sreg.tid.x()
          %3 = getelementptr float, ptr %0, i32 %2
          %4 = load float, ptr %3
          %5 = fmul float %4, %1
          store float %5, ptr %3
          ret void
        }

        declare i32 @llvm.nvvm.read.ptx.sreg.tid.x()

        !nvvm.annotations = !{!0}

        !0 = !{ptr @saxpy, !"kernel", i32 1}
        "#);
    }

    #[test]
    fn constants_become_immediates() {
        let source = "\
gpu.module @kernels {
  func.func @scale {type = func.fn(core.f32, core.f32)} {
    ^bb0(%0: core.f32):
      %1 = arith.const {value = 2.0} : core.f32
      %2 = arith.mul %0, %1 : core.f32
      func.return %2
  }
}
";
        let module = translate_text(source).expect("translate");
        let scale = module.function("scale").expect("scale");
        assert_eq!(scale.blocks[0].instructions[0].to_string(), "%1 = fmul float %0, 2.0");
        assert!(module.kernel_names().is_empty());
    }

    #[test]
    fn powi_becomes_intrinsic_call() {
        let source = "\
gpu.module @kernels {
  func.func @cube {type = func.fn(core.f64, core.f64)} {
    ^bb0(%0: core.f64):
      %1 = arith.const {value = 3} : core.i32
      %2 = arith.powi %0, %1 : core.f64
      func.return %2
  }
}
";
        let module = translate_text(source).expect("translate");
        let cube = module.function("cube").expect("cube");
        assert_eq!(
            cube.blocks[0].instructions[0].to_string(),
            "%1 = call double @llvm.powi.f64.i32(double %0, i32 3)"
        );
        assert!(module.function("llvm.powi.f64.i32").unwrap().is_declaration());
    }

    #[test]
    fn wide_thread_index_is_extended() {
        let source = "\
gpu.module @kernels {
  func.func @f {type = func.fn(core.i64)} {
    %0 = gpu.block_id {dimension = @y} : core.i64
    func.return %0
  }
}
";
        let module = translate_text(source).expect("translate");
        let text: Vec<String> = module.function("f").unwrap().blocks[0]
            .instructions
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            text,
            vec![
                "%0 = call i32 @llvm.nvvm.read.ptx.sreg.ctaid.y()",
                "%1 = zext i32 %0 to i64",
                "ret i64 %1",
            ]
        );
    }

    #[test]
    fn structured_control_flow_is_rejected() {
        let source = "\
gpu.module @kernels {
  func.func @f {type = func.fn(core.nil, core.i32)} {
    ^bb0(%0: core.i32):
      scf.for %0, %0, %0 {
        ^bb1(%1: core.i32):
          scf.yield
      }
      func.return
  }
}
";
        assert_eq!(
            translate_text(source),
            Err(TranslateError::UnsupportedOp("scf.for".into()))
        );
    }

    #[test]
    fn translator_trait_reports_failure_as_none() {
        let mut ctx = IrContext::new();
        let op = parse_module(&mut ctx, "gpu.module @m {\n  gpu.barrier\n}\n").expect("parse");
        let module = gpu::Module::from_op(&ctx, op).expect("gpu.module");
        assert!(ArenaTranslator.translate(&ctx, module, "m").is_none());
    }
}
