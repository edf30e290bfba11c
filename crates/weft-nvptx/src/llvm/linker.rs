//! Module linking.

use std::collections::{HashMap, HashSet};

use derive_more::Display;

use super::module::{InstKind, Linkage, LlvmModule, MetadataId, MetadataNode, MetadataOperand, Operand};

#[derive(Clone, Debug, Display, PartialEq)]
pub enum LinkError {
    #[display("symbol @{_0} is defined in both modules")]
    DuplicateDefinition(String),
    #[display("symbol @{_0} has conflicting signatures")]
    SignatureMismatch(String),
}

impl std::error::Error for LinkError {}

/// Link `src` into `dest`.
///
/// Functions merge by name: a definition replaces a declaration, and a
/// declaration of an existing symbol is dropped. Internal functions of
/// `src` that clash with a `dest` symbol are renamed. Metadata of `src`
/// is renumbered after the metadata of `dest`, and named metadata lists
/// are concatenated. On error `dest` is left unchanged.
pub fn link_modules(dest: &mut LlvmModule, mut src: LlvmModule) -> Result<(), LinkError> {
    for function in &src.functions {
        let Some(existing) = dest.function(&function.name) else {
            continue;
        };
        if function.linkage == Linkage::Internal && !function.is_declaration() {
            continue;
        }
        if existing.ret != function.ret
            || !existing.param_types().eq(function.param_types())
        {
            return Err(LinkError::SignatureMismatch(function.name.clone()));
        }
        if !existing.is_declaration() && !function.is_declaration() {
            return Err(LinkError::DuplicateDefinition(function.name.clone()));
        }
    }

    rename_clashing_internals(dest, &mut src);
    renumber_metadata(dest, &mut src);

    for function in src.functions {
        match dest.functions.iter().position(|f| f.name == function.name) {
            Some(index) => {
                if dest.functions[index].is_declaration() && !function.is_declaration() {
                    dest.functions[index] = function;
                }
            }
            None => dest.functions.push(function),
        }
    }

    for named in src.named_metadata {
        dest.get_or_insert_named_metadata(&named.name)
            .nodes
            .extend(named.nodes);
    }
    dest.metadata.extend(src.metadata);
    if dest.triple.is_none() {
        dest.triple = src.triple;
    }
    if dest.data_layout.is_none() {
        dest.data_layout = src.data_layout;
    }
    Ok(())
}

fn rename_clashing_internals(dest: &LlvmModule, src: &mut LlvmModule) {
    let mut taken: HashSet<String> = dest
        .functions
        .iter()
        .chain(&src.functions)
        .map(|f| f.name.clone())
        .collect();
    let mut renames: HashMap<String, String> = HashMap::new();
    for function in &src.functions {
        if function.linkage != Linkage::Internal
            || function.is_declaration()
            || dest.function(&function.name).is_none()
        {
            continue;
        }
        let mut suffix = 1;
        let fresh = loop {
            let candidate = format!("{}.{suffix}", function.name);
            if !taken.contains(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        taken.insert(fresh.clone());
        renames.insert(function.name.clone(), fresh);
    }
    if renames.is_empty() {
        return;
    }

    for function in &mut src.functions {
        if function.linkage == Linkage::Internal
            && let Some(new) = renames.get(&function.name)
        {
            function.name = new.clone();
        }
        for inst in function.instructions_mut() {
            if let InstKind::Call { callee, .. } = &mut inst.kind
                && let Some(new) = renames.get(callee.as_str())
            {
                *callee = new.clone();
            }
            for operand in inst.operands_mut() {
                if let Operand::Global(name) = operand
                    && let Some(new) = renames.get(name.as_str())
                {
                    *name = new.clone();
                }
            }
        }
    }
    for def in src.metadata.values_mut() {
        if let MetadataNode::Tuple(ops) = &mut def.node {
            for op in ops {
                if let MetadataOperand::Function(name) = op
                    && let Some(new) = renames.get(name.as_str())
                {
                    *name = new.clone();
                }
            }
        }
    }
}

fn renumber_metadata(dest: &LlvmModule, src: &mut LlvmModule) {
    let base = dest.next_metadata_id().0;
    if base == 0 {
        return;
    }
    let shift = move |id: MetadataId| MetadataId(id.0 + base);

    src.metadata = std::mem::take(&mut src.metadata)
        .into_iter()
        .map(|(id, mut def)| {
            def.node.remap_references(shift);
            (shift(id), def)
        })
        .collect();
    for named in &mut src.named_metadata {
        for id in &mut named.nodes {
            *id = shift(*id);
        }
    }
    for function in &mut src.functions {
        function.dbg = function.dbg.map(shift);
        for inst in function.instructions_mut() {
            inst.dbg = inst.dbg.map(shift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llvm::{parse_module, verify_module};

    const KERNEL: &str = "\
define void @k(ptr %p) {
entry:
  %v = load float, ptr %p
  %w = call float @__nv_expf(float %v)
  store float %w, ptr %p
  ret void
}

declare float @__nv_expf(float)

!nvvm.annotations = !{!0}

!0 = !{ptr @k, !\"kernel\", i32 1}
";

    const LIBRARY: &str = "\
define float @__nv_expf(float %x) {
entry:
  %y = call float @helper(float %x)
  ret float %y
}

define internal float @helper(float %x) {
entry:
  ret float %x
}

declare float @__nv_unused(float)

!llvm.ident = !{!0}

!0 = !{!\"libdevice\"}
";

    #[test]
    fn definition_replaces_declaration() {
        let mut dest = parse_module("k", KERNEL).unwrap();
        let src = parse_module("libdevice", LIBRARY).unwrap();
        link_modules(&mut dest, src).expect("link");

        assert!(!dest.function("__nv_expf").unwrap().is_declaration());
        assert!(dest.function("helper").is_some());
        assert!(dest.function("__nv_unused").is_some());
        // Library metadata is renumbered after the kernel's.
        assert_eq!(dest.named_metadata("llvm.ident").unwrap().nodes, vec![MetadataId(1)]);
        assert_eq!(dest.kernel_names(), vec!["k"]);
        assert_eq!(verify_module(&dest), Ok(()));
    }

    #[test]
    fn duplicate_definition_leaves_dest_unchanged() {
        let mut dest = parse_module("a", "define void @f() {\nentry:\n  ret void\n}\n").unwrap();
        let before = dest.clone();
        let src = parse_module("b", "define void @f() {\nentry:\n  ret void\n}\n").unwrap();
        assert_eq!(
            link_modules(&mut dest, src),
            Err(LinkError::DuplicateDefinition("f".into()))
        );
        assert_eq!(dest, before);
    }

    #[test]
    fn signature_mismatch_is_rejected() {
        let mut dest = parse_module("a", "declare float @f(float)\n").unwrap();
        let src = parse_module("b", "declare double @f(double)\n").unwrap();
        assert_eq!(
            link_modules(&mut dest, src),
            Err(LinkError::SignatureMismatch("f".into()))
        );
    }

    #[test]
    fn clashing_internal_function_is_renamed() {
        let mut dest =
            parse_module("a", "define internal void @helper() {\nentry:\n  ret void\n}\n").unwrap();
        let src = parse_module(
            "b",
            "\
define void @api() {
entry:
  call void @helper()
  ret void
}

define internal void @helper() {
entry:
  ret void
}
",
        )
        .unwrap();
        link_modules(&mut dest, src).expect("link");
        let api = dest.function("api").unwrap();
        assert_eq!(api.blocks[0].instructions[0].callee(), Some("helper.1"));
        assert!(dest.function("helper.1").is_some());
        assert_eq!(verify_module(&dest), Ok(()));
    }
}
