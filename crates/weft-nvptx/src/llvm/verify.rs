//! Structural checks on lowered modules.

use std::collections::HashSet;

use derive_more::Display;

use super::module::{InstKind, LlvmModule, MetadataId, MetadataNode, MetadataOperand, Operand, Ty};

#[derive(Clone, Debug, Display, PartialEq)]
#[display("{}", messages.join("; "))]
pub struct VerifyError {
    pub messages: Vec<String>,
}

impl std::error::Error for VerifyError {}

/// Check that `module` is well formed.
///
/// Every defined function must consist of blocks ending in exactly one
/// terminator, define each local once, use only defined locals, branch
/// to existing blocks and return its declared type. Calls must target
/// functions of the module with matching arity, and metadata references
/// must resolve.
pub fn verify_module(module: &LlvmModule) -> Result<(), VerifyError> {
    let mut messages = Vec::new();
    let mut seen = HashSet::new();
    for function in &module.functions {
        if !seen.insert(function.name.as_str()) {
            messages.push(format!("function @{} is defined twice", function.name));
        }
    }

    for function in &module.functions {
        let name = &function.name;
        if let Some(dbg) = function.dbg {
            check_metadata(module, dbg, &mut messages);
        }
        if function.is_declaration() {
            continue;
        }

        let labels: HashSet<&str> = function.blocks.iter().map(|b| b.label.as_str()).collect();
        if labels.len() != function.blocks.len() {
            messages.push(format!("@{name}: duplicate block label"));
        }

        let mut defined: HashSet<&str> = HashSet::new();
        for param in &function.params {
            match &param.name {
                Some(p) if !defined.insert(p) => {
                    messages.push(format!("@{name}: %{p} is defined twice"));
                }
                Some(_) => {}
                None => messages.push(format!("@{name}: unnamed parameter in definition")),
            }
        }
        for inst in function.instructions() {
            if let Some(result) = &inst.result {
                if inst.result_ty() == Ty::Void {
                    messages.push(format!("@{name}: %{result} names a void value"));
                }
                if !defined.insert(result) {
                    messages.push(format!("@{name}: %{result} is defined twice"));
                }
            }
        }

        for block in &function.blocks {
            let label = &block.label;
            match block.instructions.last() {
                Some(last) if last.is_terminator() => {}
                _ => messages.push(format!("@{name}: block {label} has no terminator")),
            }
            let count = block.instructions.len();
            for (i, inst) in block.instructions.iter().enumerate() {
                if inst.is_terminator() && i + 1 != count {
                    messages.push(format!("@{name}: terminator in the middle of block {label}"));
                }
                for operand in inst.operands() {
                    if let Operand::Local(local) = operand
                        && !defined.contains(local.as_str())
                    {
                        messages.push(format!("@{name}: use of undefined value %{local}"));
                    }
                }
                if let Some(dbg) = inst.dbg {
                    check_metadata(module, dbg, &mut messages);
                }

                match &inst.kind {
                    InstKind::Ret(value) => {
                        let ty = value.as_ref().map_or(Ty::Void, |(ty, _)| *ty);
                        if ty != function.ret {
                            messages.push(format!(
                                "@{name}: returns {ty}, declared {}",
                                function.ret
                            ));
                        }
                    }
                    InstKind::Br(dest) => {
                        if !labels.contains(dest.as_str()) {
                            messages.push(format!("@{name}: branch to unknown block {dest}"));
                        }
                    }
                    InstKind::CondBr {
                        then_dest,
                        else_dest,
                        ..
                    } => {
                        for dest in [then_dest, else_dest] {
                            if !labels.contains(dest.as_str()) {
                                messages.push(format!("@{name}: branch to unknown block {dest}"));
                            }
                        }
                    }
                    InstKind::Call { callee, args, ret } => match module.function(callee) {
                        None => messages.push(format!("@{name}: call to unknown function @{callee}")),
                        Some(target) => {
                            if target.params.len() != args.len() {
                                messages.push(format!(
                                    "@{name}: @{callee} expects {} arguments, got {}",
                                    target.params.len(),
                                    args.len()
                                ));
                            }
                            if target.ret != *ret {
                                messages.push(format!(
                                    "@{name}: @{callee} returns {}, called as {ret}",
                                    target.ret
                                ));
                            }
                        }
                    },
                    _ => {}
                }
            }
        }
    }

    for named in &module.named_metadata {
        for &id in &named.nodes {
            check_metadata(module, id, &mut messages);
        }
    }
    for def in module.metadata.values() {
        for id in def.node.references() {
            check_metadata(module, id, &mut messages);
        }
        if let MetadataNode::Tuple(ops) = &def.node {
            for op in ops {
                if let MetadataOperand::Function(f) = op
                    && module.function(f).is_none()
                {
                    messages.push(format!("metadata refers to unknown function @{f}"));
                }
            }
        }
    }

    if messages.is_empty() {
        Ok(())
    } else {
        Err(VerifyError { messages })
    }
}

fn check_metadata(module: &LlvmModule, id: MetadataId, messages: &mut Vec<String>) {
    if !module.metadata.contains_key(&id) {
        messages.push(format!("reference to undefined metadata {id}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llvm::parse_module;

    #[test]
    fn accepts_well_formed_module() {
        let src = "\
define float @f(float %x, i32 %n) {
entry:
  %c = icmp sgt i32 %n, 0
  br i1 %c, label %pos, label %neg
pos:
  %y = fmul float %x, %x
  ret float %y
neg:
  ret float %x
}
";
        let module = parse_module("m", src).expect("parse");
        assert_eq!(verify_module(&module), Ok(()));
    }

    #[test]
    fn reports_structural_problems() {
        let src = "\
define float @f(float %x) {
entry:
  %y = fadd float %x, %z
  %y = fadd float %x, %x
  call void @missing()
}
";
        let module = parse_module("m", src).expect("parse");
        let err = verify_module(&module).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("undefined value %z"), "{text}");
        assert!(text.contains("%y is defined twice"), "{text}");
        assert!(text.contains("no terminator"), "{text}");
        assert!(text.contains("unknown function @missing"), "{text}");
    }

    #[test]
    fn reports_dangling_metadata() {
        let src = "\
define void @f() !dbg !7 {
entry:
  ret void
}

!nvvm.annotations = !{!0}
!0 = !{ptr @g, !\"kernel\", i32 1}
";
        let module = parse_module("m", src).expect("parse");
        let text = verify_module(&module).unwrap_err().to_string();
        assert!(text.contains("undefined metadata !7"), "{text}");
        assert!(text.contains("unknown function @g"), "{text}");
    }

    #[test]
    fn return_type_must_match() {
        let src = "define i32 @f() {\nentry:\n  ret void\n}\n";
        let module = parse_module("m", src).expect("parse");
        assert!(verify_module(&module).is_err());
    }
}
