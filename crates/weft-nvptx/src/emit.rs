//! PTX assembly emission.

use std::collections::HashMap;
use std::fmt::Write;

use tracing::debug;

use crate::errors::{SerializeError, SerializeResult};
use crate::llvm::{
    BinaryOp, CastOp, FloatPredicate, Function, InstKind, Instruction, IntPredicate, Linkage,
    LlvmModule, Operand, Ty,
};
use crate::target::{TargetMachine, ptx_version};

/// PTX ISA version used when the target features do not request one.
pub const DEFAULT_PTX_VERSION: (u32, u32) = (6, 0);

/// Produces target assembly text for a lowered module.
pub trait TargetEmitter {
    fn emit(&self, module: &LlvmModule, target: &TargetMachine) -> SerializeResult<String>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PtxEmitter;

impl TargetEmitter for PtxEmitter {
    fn emit(&self, module: &LlvmModule, target: &TargetMachine) -> SerializeResult<String> {
        emit_ptx(module, target)
    }
}

/// Render `module` as a PTX translation unit.
pub fn emit_ptx(module: &LlvmModule, target: &TargetMachine) -> SerializeResult<String> {
    let (major, minor) = ptx_version(&target.features).unwrap_or(DEFAULT_PTX_VERSION);
    let mut out = String::new();
    out.push_str("//\n// Generated by weft\n//\n\n");
    let _ = writeln!(out, ".version {major}.{minor}");
    let _ = writeln!(out, ".target {}", target.chip);
    let _ = writeln!(out, ".address_size {}", target.pointer_bytes() * 8);

    let kernels = module.kernel_names();
    for function in &module.functions {
        if function.name.starts_with("llvm.") {
            continue;
        }
        if function.is_declaration() {
            out.push('\n');
            out.push_str(".extern ");
            write_signature(&mut out, function, false, target);
            out.push_str(";\n");
        }
    }
    // Device functions are prototyped up front so call order does not matter.
    for function in &module.functions {
        if !function.is_declaration() && !kernels.contains(&function.name.as_str()) {
            out.push('\n');
            if function.linkage == Linkage::External {
                out.push_str(".visible ");
            }
            write_signature(&mut out, function, false, target);
            out.push_str(";\n");
        }
    }
    for function in &module.functions {
        if function.is_declaration() {
            continue;
        }
        let kernel = kernels.contains(&function.name.as_str());
        out.push('\n');
        if kernel || function.linkage == Linkage::External {
            out.push_str(".visible ");
        }
        write_signature(&mut out, function, kernel, target);
        out.push('\n');
        out.push_str(&FunctionEmitter::new(module, function, kernel, target).emit()?);
    }
    debug!(bytes = out.len(), "emitted PTX");
    Ok(out)
}

/// PTX symbols may not contain `.`.
pub fn sanitize_name(name: &str) -> String {
    name.replace('.', "_$_")
}

fn param_space_type(ty: Ty, kernel: bool, target: &TargetMachine) -> &'static str {
    match (ty, kernel) {
        (Ty::F32, true) => ".f32",
        (Ty::F64, true) => ".f64",
        (Ty::I1 | Ty::I32, true) => ".u32",
        (Ty::I64, true) => ".u64",
        (Ty::Ptr, true) if target.is_64_bit() => ".u64",
        (Ty::Ptr, true) => ".u32",
        (Ty::I1 | Ty::I32 | Ty::F32, false) => ".b32",
        (Ty::Ptr, false) if !target.is_64_bit() => ".b32",
        _ => ".b64",
    }
}

fn write_signature(out: &mut String, function: &Function, kernel: bool, target: &TargetMachine) {
    let name = sanitize_name(&function.name);
    if kernel {
        out.push_str(".entry ");
    } else {
        out.push_str(".func ");
        if function.ret != Ty::Void {
            let _ = write!(
                out,
                "(.param {} func_retval0) ",
                param_space_type(function.ret, false, target)
            );
        }
    }
    out.push_str(&name);
    out.push('(');
    for (i, ty) in function.param_types().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(
            out,
            "\n\t.param {} {name}_param_{i}",
            param_space_type(ty, kernel, target)
        );
    }
    if function.params.is_empty() {
        out.push(')');
    } else {
        out.push_str("\n)");
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RegClass {
    Pred,
    B32,
    B64,
    F32,
    F64,
}

impl RegClass {
    const ALL: [RegClass; 5] = [
        RegClass::Pred,
        RegClass::B32,
        RegClass::B64,
        RegClass::F32,
        RegClass::F64,
    ];

    fn prefix(self) -> &'static str {
        match self {
            RegClass::Pred => "%p",
            RegClass::B32 => "%r",
            RegClass::B64 => "%rd",
            RegClass::F32 => "%f",
            RegClass::F64 => "%fd",
        }
    }

    fn decl(self) -> &'static str {
        match self {
            RegClass::Pred => ".pred",
            RegClass::B32 => ".b32",
            RegClass::B64 => ".b64",
            RegClass::F32 => ".f32",
            RegClass::F64 => ".f64",
        }
    }
}

struct FunctionEmitter<'a> {
    module: &'a LlvmModule,
    function: &'a Function,
    kernel: bool,
    target: &'a TargetMachine,
    registers: HashMap<&'a str, String>,
    counters: [u32; 5],
    depots: Vec<u64>,
    body: String,
}

impl<'a> FunctionEmitter<'a> {
    fn new(
        module: &'a LlvmModule,
        function: &'a Function,
        kernel: bool,
        target: &'a TargetMachine,
    ) -> Self {
        Self {
            module,
            function,
            kernel,
            target,
            registers: HashMap::new(),
            counters: [0; 5],
            depots: Vec::new(),
            body: String::new(),
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> SerializeError {
        SerializeError::emission(format!("@{}: {message}", self.function.name))
    }

    fn class(&self, ty: Ty) -> SerializeResult<RegClass> {
        Ok(match ty {
            Ty::I1 => RegClass::Pred,
            Ty::I32 => RegClass::B32,
            Ty::I64 => RegClass::B64,
            Ty::F32 => RegClass::F32,
            Ty::F64 => RegClass::F64,
            Ty::Ptr if self.target.is_64_bit() => RegClass::B64,
            Ty::Ptr => RegClass::B32,
            Ty::Void => return Err(self.error("void value in register")),
        })
    }

    /// Suffix for moves, loads and stores of `ty`.
    fn data_type(&self, ty: Ty) -> SerializeResult<&'static str> {
        Ok(match self.class(ty)? {
            RegClass::Pred => return Err(self.error("i1 values cannot be moved through memory")),
            RegClass::B32 => "u32",
            RegClass::B64 => "u64",
            RegClass::F32 => "f32",
            RegClass::F64 => "f64",
        })
    }

    fn int_type(&self, ty: Ty) -> &'static str {
        if self.class(ty).ok() == Some(RegClass::B64) {
            "s64"
        } else {
            "s32"
        }
    }

    fn fresh(&mut self, class: RegClass) -> String {
        let slot = &mut self.counters[class as usize];
        *slot += 1;
        format!("{}{}", class.prefix(), slot)
    }

    fn define(&mut self, inst: &'a Instruction) -> SerializeResult<String> {
        let Some(name) = inst.result.as_deref() else {
            return Err(self.error("instruction without a result"));
        };
        let reg = self.fresh(self.class(inst.result_ty())?);
        self.registers.insert(name, reg.clone());
        Ok(reg)
    }

    fn line(&mut self, text: impl std::fmt::Display) {
        let _ = writeln!(self.body, "\t{text};");
    }

    /// Render `operand` as a register or immediate.
    fn value(&self, operand: &Operand, ty: Ty) -> SerializeResult<String> {
        match operand {
            Operand::Local(name) => self
                .registers
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| self.error(format!("%{name} has no register"))),
            Operand::Global(name) => Ok(sanitize_name(name)),
            Operand::Int(v) => Ok(v.to_string()),
            Operand::Float(v) if ty == Ty::F32 => Ok(format!("0f{:08X}", (*v as f32).to_bits())),
            Operand::Float(v) => Ok(format!("0d{:016X}", v.to_bits())),
        }
    }

    /// Like [`Self::value`], but materializes immediates into a register.
    fn register(&mut self, operand: &Operand, ty: Ty) -> SerializeResult<String> {
        let value = self.value(operand, ty)?;
        if !operand.is_constant() {
            return Ok(value);
        }
        let class = self.class(ty)?;
        let reg = self.fresh(class);
        if class == RegClass::Pred {
            let truth = if value == "0" { "0" } else { "1" };
            self.line(format_args!("setp.ne.u32 {reg}, {truth}, 0"));
        } else {
            let ty = self.data_type(ty)?;
            self.line(format_args!("mov.{ty} {reg}, {value}"));
        }
        Ok(reg)
    }

    fn label(&self, block: &str) -> String {
        format!("$L__{}_{}", sanitize_name(&self.function.name), sanitize_name(block))
    }

    fn emit(mut self) -> SerializeResult<String> {
        let function = self.function;
        let name = sanitize_name(&function.name);
        for (i, param) in function.params.iter().enumerate() {
            let Some(local) = param.name.as_deref() else {
                return Err(self.error("unnamed parameter"));
            };
            let reg = self.fresh(self.class(param.ty)?);
            if param.ty == Ty::I1 {
                let raw = self.fresh(RegClass::B32);
                self.line(format_args!("ld.param.u32 {raw}, [{name}_param_{i}]"));
                self.line(format_args!("setp.ne.u32 {reg}, {raw}, 0"));
            } else {
                let ty = self.data_type(param.ty)?;
                self.line(format_args!("ld.param.{ty} {reg}, [{name}_param_{i}]"));
            }
            self.registers.insert(local, reg);
        }

        for block in &function.blocks {
            let label = self.label(&block.label);
            let _ = writeln!(self.body, "{label}:");
            for inst in &block.instructions {
                self.instruction(inst)?;
            }
        }

        let mut out = String::from("{\n");
        for class in RegClass::ALL {
            let count = self.counters[class as usize];
            if count > 0 {
                let _ = writeln!(out, "\t.reg {} {}<{}>;", class.decl(), class.prefix(), count + 1);
            }
        }
        for (i, size) in self.depots.iter().enumerate() {
            let _ = writeln!(out, "\t.local .align 8 .b8 __local_depot_{name}_{i}[{size}];");
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push_str("}\n");
        Ok(out)
    }

    fn instruction(&mut self, inst: &'a Instruction) -> SerializeResult<()> {
        match &inst.kind {
            InstKind::Binary { op, ty, lhs, rhs } => {
                let lhs = self.value(lhs, *ty)?;
                let rhs = self.value(rhs, *ty)?;
                let dst = self.define(inst)?;
                let opcode = if op.is_float() {
                    let fty = self.data_type(*ty)?;
                    let rounding = if inst.contract { "" } else { ".rn" };
                    match op {
                        BinaryOp::FAdd => format!("add{rounding}.{fty}"),
                        BinaryOp::FSub => format!("sub{rounding}.{fty}"),
                        BinaryOp::FMul => format!("mul{rounding}.{fty}"),
                        BinaryOp::FDiv => format!("div.rn.{fty}"),
                        _ => return Err(self.error(format!("{op} has no PTX equivalent"))),
                    }
                } else if *ty == Ty::I1 {
                    match op {
                        BinaryOp::And => "and.pred".to_owned(),
                        BinaryOp::Or => "or.pred".to_owned(),
                        BinaryOp::Xor => "xor.pred".to_owned(),
                        _ => return Err(self.error(format!("{op} on i1"))),
                    }
                } else {
                    let ity = self.int_type(*ty);
                    let bits = &ity[1..];
                    match op {
                        BinaryOp::Add => format!("add.{ity}"),
                        BinaryOp::Sub => format!("sub.{ity}"),
                        BinaryOp::Mul => format!("mul.lo.{ity}"),
                        BinaryOp::SDiv => format!("div.{ity}"),
                        BinaryOp::SRem => format!("rem.{ity}"),
                        BinaryOp::And => format!("and.b{bits}"),
                        BinaryOp::Or => format!("or.b{bits}"),
                        BinaryOp::Xor => format!("xor.b{bits}"),
                        _ => return Err(self.error(format!("{op} on integers"))),
                    }
                };
                self.line(format_args!("{opcode} {dst}, {lhs}, {rhs}"));
            }
            InstKind::FNeg { ty, value } => {
                let value = self.register(value, *ty)?;
                let fty = self.data_type(*ty)?;
                let dst = self.define(inst)?;
                self.line(format_args!("neg.{fty} {dst}, {value}"));
            }
            InstKind::ICmp { pred, ty, lhs, rhs } => {
                let lhs = self.register(lhs, *ty)?;
                let rhs = self.value(rhs, *ty)?;
                let cmp = match pred {
                    IntPredicate::Eq => "eq",
                    IntPredicate::Ne => "ne",
                    IntPredicate::Slt => "lt",
                    IntPredicate::Sle => "le",
                    IntPredicate::Sgt => "gt",
                    IntPredicate::Sge => "ge",
                };
                let ity = self.int_type(*ty);
                let dst = self.define(inst)?;
                self.line(format_args!("setp.{cmp}.{ity} {dst}, {lhs}, {rhs}"));
            }
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                let lhs = self.register(lhs, *ty)?;
                let rhs = self.value(rhs, *ty)?;
                let cmp = match pred {
                    FloatPredicate::Oeq => "eq",
                    FloatPredicate::One => "ne",
                    FloatPredicate::Olt => "lt",
                    FloatPredicate::Ole => "le",
                    FloatPredicate::Ogt => "gt",
                    FloatPredicate::Oge => "ge",
                };
                let fty = self.data_type(*ty)?;
                let dst = self.define(inst)?;
                self.line(format_args!("setp.{cmp}.{fty} {dst}, {lhs}, {rhs}"));
            }
            InstKind::Cast {
                op,
                from,
                value,
                to,
            } => self.cast(inst, *op, *from, value, *to)?,
            InstKind::Load { ty, ptr } => {
                let ptr = self.register(ptr, Ty::Ptr)?;
                let dty = self.data_type(*ty)?;
                let dst = self.define(inst)?;
                self.line(format_args!("ld.{dty} {dst}, [{ptr}]"));
            }
            InstKind::Store { ty, value, ptr } => {
                let value = self.register(value, *ty)?;
                let ptr = self.register(ptr, Ty::Ptr)?;
                let dty = self.data_type(*ty)?;
                self.line(format_args!("st.{dty} [{ptr}], {value}"));
            }
            InstKind::Alloca { ty } => {
                let size = ty.store_size(self.target.pointer_bytes()).max(1);
                let depot = format!(
                    "__local_depot_{}_{}",
                    sanitize_name(&self.function.name),
                    self.depots.len()
                );
                self.depots.push(size);
                let pty = self.data_type(Ty::Ptr)?;
                let dst = self.define(inst)?;
                self.line(format_args!("mov.{pty} {dst}, {depot}"));
                self.line(format_args!("cvta.local.{pty} {dst}, {dst}"));
            }
            InstKind::Gep {
                elem,
                base,
                index_ty,
                index,
                ..
            } => {
                let stride = elem.store_size(self.target.pointer_bytes());
                let base = self.register(base, Ty::Ptr)?;
                let wide = self.target.is_64_bit();
                let dst = self.define(inst)?;
                let pint = if wide { "s64" } else { "s32" };
                match index {
                    Operand::Int(i) => {
                        let offset = i.wrapping_mul(stride as i64);
                        self.line(format_args!("add.{pint} {dst}, {base}, {offset}"));
                    }
                    _ => {
                        let index = self.value(index, *index_ty)?;
                        if wide && *index_ty != Ty::I64 {
                            self.line(format_args!("mad.wide.s32 {dst}, {index}, {stride}, {base}"));
                        } else {
                            self.line(format_args!("mad.lo.{pint} {dst}, {index}, {stride}, {base}"));
                        }
                    }
                }
            }
            InstKind::Call { ret, callee, args } => self.call(inst, *ret, callee, args)?,
            InstKind::Ret(value) => {
                if let Some((ty, value)) = value {
                    if self.kernel {
                        return Err(self.error("kernels cannot return a value"));
                    }
                    let value = self.register(value, *ty)?;
                    let pty = param_space_type(*ty, false, self.target);
                    self.line(format_args!("st.param{pty} [func_retval0], {value}"));
                }
                self.line("ret");
            }
            InstKind::Br(dest) => {
                let label = self.label(dest);
                self.line(format_args!("bra.uni {label}"));
            }
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            } => {
                let (then_label, else_label) = (self.label(then_dest), self.label(else_dest));
                match cond {
                    Operand::Int(v) => {
                        let target = if *v & 1 == 1 { then_label } else { else_label };
                        self.line(format_args!("bra.uni {target}"));
                    }
                    _ => {
                        let cond = self.value(cond, Ty::I1)?;
                        self.line(format_args!("@{cond} bra {then_label}"));
                        self.line(format_args!("bra.uni {else_label}"));
                    }
                }
            }
        }
        Ok(())
    }

    fn cast(
        &mut self,
        inst: &'a Instruction,
        op: CastOp,
        from: Ty,
        value: &Operand,
        to: Ty,
    ) -> SerializeResult<()> {
        let src = self.register(value, from)?;
        let dst = self.define(inst)?;
        match (op, from, to) {
            (CastOp::ZExt, Ty::I1, _) => {
                let dty = self.data_type(to)?;
                self.line(format_args!("selp.{dty} {dst}, 1, 0, {src}"));
            }
            (CastOp::SExt, Ty::I1, _) => {
                let ity = self.int_type(to);
                self.line(format_args!("selp.{ity} {dst}, -1, 0, {src}"));
            }
            (CastOp::ZExt, Ty::I32, Ty::I64) => self.line(format_args!("cvt.u64.u32 {dst}, {src}")),
            (CastOp::SExt, Ty::I32, Ty::I64) => self.line(format_args!("cvt.s64.s32 {dst}, {src}")),
            (CastOp::Trunc, Ty::I64, Ty::I32) => self.line(format_args!("cvt.u32.u64 {dst}, {src}")),
            (CastOp::Trunc, _, Ty::I1) => {
                let bits = if from == Ty::I64 { "b64" } else { "b32" };
                let low = self.fresh(self.class(from)?);
                self.line(format_args!("and.{bits} {low}, {src}, 1"));
                self.line(format_args!("setp.ne.{bits} {dst}, {low}, 0"));
            }
            (CastOp::SIToFP, Ty::I32 | Ty::I64, Ty::F32 | Ty::F64) => {
                let (fty, ity) = (self.data_type(to)?, self.int_type(from));
                self.line(format_args!("cvt.rn.{fty}.{ity} {dst}, {src}"));
            }
            (CastOp::FPToSI, Ty::F32 | Ty::F64, Ty::I32 | Ty::I64) => {
                let (ity, fty) = (self.int_type(to), self.data_type(from)?);
                self.line(format_args!("cvt.rzi.{ity}.{fty} {dst}, {src}"));
            }
            _ => return Err(self.error(format!("unsupported cast {op} {from} to {to}"))),
        }
        Ok(())
    }

    fn call(
        &mut self,
        inst: &'a Instruction,
        ret: Ty,
        callee: &str,
        args: &[(Ty, Operand)],
    ) -> SerializeResult<()> {
        if let Some(intrinsic) = callee.strip_prefix("llvm.") {
            if intrinsic == "nvvm.barrier0" {
                self.line("bar.sync 0");
                return Ok(());
            }
            if let Some(sreg) = intrinsic.strip_prefix("nvvm.read.ptx.sreg.") {
                let dst = self.define(inst)?;
                self.line(format_args!("mov.u32 {dst}, %{sreg}"));
                return Ok(());
            }
            return Err(self.error(format!("no PTX lowering for @{callee}")));
        }
        if self.module.function(callee).is_none() {
            return Err(self.error(format!("call to unknown function @{callee}")));
        }

        let mut values = Vec::with_capacity(args.len());
        for (ty, arg) in args {
            values.push((*ty, self.register(arg, *ty)?));
        }
        self.body.push_str("\t{\n");
        let mut params = Vec::with_capacity(args.len());
        for (i, (ty, value)) in values.iter().enumerate() {
            let pty = param_space_type(*ty, false, self.target);
            self.line(format_args!(".param {pty} param{i}"));
            self.line(format_args!("st.param{pty} [param{i}], {value}"));
            params.push(format!("param{i}"));
        }
        let callee = sanitize_name(callee);
        let params = params.join(", ");
        if ret == Ty::Void {
            self.line(format_args!("call.uni {callee}, ({params})"));
        } else {
            let pty = param_space_type(ret, false, self.target);
            self.line(format_args!(".param {pty} retval0"));
            self.line(format_args!("call.uni (retval0), {callee}, ({params})"));
            let dst = self.define(inst)?;
            let dty = self.data_type(ret)?;
            self.line(format_args!("ld.param.{dty} {dst}, [retval0]"));
        }
        self.body.push_str("\t}\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SerializeErrorKind;
    use crate::llvm::parse_module;

    fn target() -> TargetMachine {
        TargetMachine::new("nvptx64-nvidia-cuda", "sm_70", "+ptx75")
    }

    #[test]
    fn emits_kernel_and_device_function() {
        let module = parse_module(
            "k",
            "\
define void @saxpy(ptr %x, float %a) {
entry:
  %i = call i32 @llvm.nvvm.read.ptx.sreg.tid.x()
  %p = getelementptr inbounds float, ptr %x, i32 %i
  %v = load float, ptr %p
  %w = call contract float @scale(float %v, float %a)
  store float %w, ptr %p
  ret void
}

define internal float @scale(float %v, float %a) {
entry:
  %r = fmul contract float %v, %a
  %s = fadd float %r, 1.0
  ret float %s
}

declare i32 @llvm.nvvm.read.ptx.sreg.tid.x()

!nvvm.annotations = !{!0}

!0 = !{ptr @saxpy, !\"kernel\", i32 1}
",
        )
        .unwrap();
        let ptx = emit_ptx(&module, &target()).expect("emit");
        insta::assert_snapshot!(ptx, @r"
        //
        // Generated by weft
        //

        .version 7.5
        .target sm_70
        .address_size 64

        .func (.param .b32 func_retval0) scale(
        	.param .b32 scale_param_0,
        	.param .b32 scale_param_1
        );

        .visible .entry saxpy(
        	.param .u64 saxpy_param_0,
        	.param .f32 saxpy_param_1
        )
        {
        	.reg .b32 %r<2>;
        	.reg .b64 %rd<3>;
        	.reg .f32 %f<4>;

        	ld.param.u64 %rd1, [saxpy_param_0];
        	ld.param.f32 %f1, [saxpy_param_1];
        $L__saxpy_entry:
        	mov.u32 %r1, %tid.x;
        	mad.wide.s32 %rd2, %r1, 4, %rd1;
        	ld.f32 %f2, [%rd2];
        	{
        	.param .b32 param0;
        	st.param.b32 [param0], %f2;
        	.param .b32 param1;
        	st.param.b32 [param1], %f1;
        	.param .b32 retval0;
        	call.uni (retval0), scale, (param0, param1);
        	ld.param.f32 %f3, [retval0];
        	}
        	st.f32 [%rd2], %f3;
        	ret;
        }

        .func (.param .b32 func_retval0) scale(
        	.param .b32 scale_param_0,
        	.param .b32 scale_param_1
        )
        {
        	.reg .f32 %f<5>;

        	ld.param.f32 %f1, [scale_param_0];
        	ld.param.f32 %f2, [scale_param_1];
        $L__scale_entry:
        	mul.f32 %f3, %f1, %f2;
        	add.rn.f32 %f4, %f3, 0f3F800000;
        	st.param.b32 [func_retval0], %f4;
        	ret;
        }
        ");
    }

    #[test]
    fn header_follows_target() {
        let module = LlvmModule::new("empty");
        let target = TargetMachine::new("nvptx-nvidia-cuda", "sm_35", "");
        let ptx = emit_ptx(&module, &target).unwrap();
        assert!(ptx.contains(".version 6.0\n.target sm_35\n.address_size 32\n"), "{ptx}");
    }

    #[test]
    fn branches_and_comparisons() {
        let module = parse_module(
            "m",
            "\
define i32 @clamp(i32 %x) {
entry:
  %c = icmp slt i32 %x, 0
  br i1 %c, label %neg, label %done
neg:
  ret i32 0
done:
  ret i32 %x
}
",
        )
        .unwrap();
        let ptx = emit_ptx(&module, &target()).unwrap();
        assert!(ptx.contains("\tsetp.lt.s32 %p1, %r1, 0;\n"), "{ptx}");
        assert!(ptx.contains("\t@%p1 bra $L__clamp_neg;\n\tbra.uni $L__clamp_done;\n"), "{ptx}");
        assert!(ptx.contains(".visible .func (.param .b32 func_retval0) clamp("), "{ptx}");
    }

    #[test]
    fn unsupported_operations_are_errors() {
        for (body, needle) in [
            ("%y = frem float %x, %x\n  ret void", "frem"),
            ("%y = call float @llvm.sqrt.f32(float %x)\n  ret void", "llvm.sqrt.f32"),
        ] {
            let text = format!(
                "define void @f(float %x) {{\nentry:\n  {body}\n}}\n\ndeclare float @llvm.sqrt.f32(float)\n"
            );
            let module = parse_module("m", &text).unwrap();
            let err = emit_ptx(&module, &target()).unwrap_err();
            assert!(matches!(err.kind(), SerializeErrorKind::Emission(_)));
            assert!(err.to_string().contains(needle), "{err}");
        }
    }

    #[test]
    fn dotted_names_are_sanitized() {
        assert_eq!(sanitize_name("helper.1"), "helper_$_1");
    }
}
