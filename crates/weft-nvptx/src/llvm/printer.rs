//! Textual form of lowered IR, in LLVM assembly syntax.

use std::fmt::{self, Display, Formatter, Write};

use super::module::{
    BasicBlock, Function, InstKind, Instruction, Linkage, LlvmModule, MetadataDef, MetadataNode,
    MetadataOperand, Operand,
};

/// Format a float so it always reads back as a float.
pub(crate) fn format_float(value: f64) -> String {
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E', 'i', 'N']) {
        text
    } else {
        format!("{text}.0")
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Local(name) => write!(f, "%{name}"),
            Operand::Global(name) => write!(f, "@{name}"),
            Operand::Int(v) => write!(f, "{v}"),
            Operand::Float(v) => f.write_str(&format_float(*v)),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            write!(f, "%{result} = ")?;
        }
        let flags = if self.contract { " contract" } else { "" };
        match &self.kind {
            InstKind::Binary { op, ty, lhs, rhs } => write!(f, "{op}{flags} {ty} {lhs}, {rhs}")?,
            InstKind::FNeg { ty, value } => write!(f, "fneg{flags} {ty} {value}")?,
            InstKind::ICmp { pred, ty, lhs, rhs } => write!(f, "icmp {pred} {ty} {lhs}, {rhs}")?,
            InstKind::FCmp { pred, ty, lhs, rhs } => {
                write!(f, "fcmp{flags} {pred} {ty} {lhs}, {rhs}")?
            }
            InstKind::Cast {
                op,
                from,
                value,
                to,
            } => write!(f, "{op} {from} {value} to {to}")?,
            InstKind::Load { ty, ptr } => write!(f, "load {ty}, ptr {ptr}")?,
            InstKind::Store { ty, value, ptr } => write!(f, "store {ty} {value}, ptr {ptr}")?,
            InstKind::Alloca { ty } => write!(f, "alloca {ty}")?,
            InstKind::Gep {
                inbounds,
                elem,
                base,
                index_ty,
                index,
            } => {
                let inbounds = if *inbounds { " inbounds" } else { "" };
                write!(
                    f,
                    "getelementptr{inbounds} {elem}, ptr {base}, {index_ty} {index}"
                )?
            }
            InstKind::Call { ret, callee, args } => {
                write!(f, "call{flags} {ret} @{callee}(")?;
                for (i, (ty, arg)) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{ty} {arg}")?;
                }
                f.write_char(')')?
            }
            InstKind::Ret(None) => f.write_str("ret void")?,
            InstKind::Ret(Some((ty, value))) => write!(f, "ret {ty} {value}")?,
            InstKind::Br(dest) => write!(f, "br label %{dest}")?,
            InstKind::CondBr {
                cond,
                then_dest,
                else_dest,
            } => write!(f, "br i1 {cond}, label %{then_dest}, label %{else_dest}")?,
        }
        if let Some(dbg) = self.dbg {
            write!(f, ", !dbg {dbg}")?;
        }
        Ok(())
    }
}

impl Display for BasicBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.instructions {
            writeln!(f, "  {inst}")?;
        }
        Ok(())
    }
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_declaration() {
            write!(f, "declare {} @{}(", self.ret, self.name)?;
            for (i, param) in self.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", param.ty)?;
            }
            return writeln!(f, ")");
        }

        f.write_str("define ")?;
        if self.linkage == Linkage::Internal {
            f.write_str("internal ")?;
        }
        write!(f, "{} @{}(", self.ret, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param.ty)?;
            if let Some(name) = &param.name {
                write!(f, " %{name}")?;
            }
        }
        f.write_char(')')?;
        if let Some(dbg) = self.dbg {
            write!(f, " !dbg {dbg}")?;
        }
        writeln!(f, " {{")?;
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{block}")?;
        }
        writeln!(f, "}}")
    }
}

impl Display for MetadataOperand {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MetadataOperand::Null => f.write_str("null"),
            MetadataOperand::String(s) => write!(f, "!\"{}\"", escape(s)),
            MetadataOperand::Int(ty, v) => write!(f, "{ty} {v}"),
            MetadataOperand::Function(name) => write!(f, "ptr @{name}"),
            MetadataOperand::Node(id) => write!(f, "{id}"),
        }
    }
}

impl Display for MetadataDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.distinct {
            f.write_str("distinct ")?;
        }
        match &self.node {
            MetadataNode::Tuple(ops) => {
                f.write_str("!{")?;
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{op}")?;
                }
                f.write_char('}')
            }
            MetadataNode::Specialized { name, fields } => {
                write!(f, "!{name}(")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_char(')')
            }
        }
    }
}

impl Display for LlvmModule {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        if let Some(layout) = &self.data_layout {
            writeln!(f, "target datalayout = \"{}\"", escape(layout))?;
        }
        if let Some(triple) = &self.triple {
            writeln!(f, "target triple = \"{}\"", escape(triple))?;
        }

        for function in &self.functions {
            writeln!(f)?;
            write!(f, "{function}")?;
        }

        if !self.named_metadata.is_empty() {
            writeln!(f)?;
            for named in &self.named_metadata {
                write!(f, "!{} = !{{", named.name)?;
                for (i, id) in named.nodes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{id}")?;
                }
                writeln!(f, "}}")?;
            }
        }

        if !self.metadata.is_empty() {
            writeln!(f)?;
            for (id, def) in &self.metadata {
                writeln!(f, "{id} = {def}")?;
            }
        }
        Ok(())
    }
}

/// Escape `"` and `\` the way LLVM string literals do.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\22"),
            '\\' => out.push_str("\\5C"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llvm::module::{BinaryOp, Param, Ty};

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(-0.5), "-0.5");
        assert_eq!(format_float(1e20), "1e20");
    }

    #[test]
    fn prints_module() {
        let mut module = LlvmModule::new("kernels");
        module.triple = Some("nvptx64-nvidia-cuda".into());
        let mut entry = BasicBlock::new("entry");
        let mut add = Instruction::named(
            "2",
            InstKind::Binary {
                op: BinaryOp::FAdd,
                ty: Ty::F32,
                lhs: Operand::local("1"),
                rhs: Operand::Float(2.0),
            },
        );
        add.contract = true;
        entry.instructions.push(add);
        entry.instructions.push(Instruction::new(InstKind::Store {
            ty: Ty::F32,
            value: Operand::local("2"),
            ptr: Operand::local("0"),
        }));
        entry.instructions.push(Instruction::new(InstKind::Ret(None)));
        module.functions.push(Function {
            name: "k".into(),
            linkage: Linkage::External,
            ret: Ty::Void,
            params: vec![
                Param {
                    ty: Ty::Ptr,
                    name: Some("0".into()),
                },
                Param {
                    ty: Ty::F32,
                    name: Some("1".into()),
                },
            ],
            blocks: vec![entry],
            dbg: None,
        });
        module
            .functions
            .push(Function::declaration("__nv_powif", Ty::F32, &[Ty::F32, Ty::I32]));
        module.annotate_kernel("k");

        insta::assert_snapshot!(module.to_string(), @r#"
        ; ModuleID = 'kernels'
        target triple = "nvptx64-nvidia-cuda"

        define void @k(ptr %0, float %1) {
        entry:
          %2 = fadd contract float %1, 2.0
          store float %2, ptr %0
          ret void
        }

        declare float @__nv_powif(float, i32)

        !nvvm.annotations = !{!0}

        !0 = !{ptr @k, !"kernel", i32 1}
        "#);
    }
}
