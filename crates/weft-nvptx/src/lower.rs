//! Device-library linking and device-specific lowering.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use derive_more::Display;
use tracing::{debug, error};

use crate::llvm::{InstKind, Linkage, LlvmModule, Ty, link_modules, parse_module, verify_module};

/// Single-precision integer power in the device library.
pub const POWI_F32: &str = "__nv_powif";
/// Double-precision integer power in the device library.
pub const POWI_F64: &str = "__nv_powi";

const POWI_INTRINSIC_PREFIX: &str = "llvm.powi.";

#[derive(Debug, Display)]
pub enum SupportLibraryError {
    #[display("could not read {}: {_1}", _0.display())]
    Io(PathBuf, std::io::Error),
    #[display("could not parse {}: {_1}", _0.display())]
    Parse(PathBuf, crate::llvm::ParseError),
    #[display("{} is malformed: {_1}", _0.display())]
    Verify(PathBuf, crate::llvm::VerifyError),
}

impl std::error::Error for SupportLibraryError {}

/// Read, parse and verify the device library at `path`.
pub fn load_support_library(path: &Path) -> Result<LlvmModule, SupportLibraryError> {
    let source = std::fs::read_to_string(path)
        .map_err(|err| SupportLibraryError::Io(path.to_path_buf(), err))?;
    let name = path.display().to_string();
    let library = parse_module(&name, &source)
        .map_err(|err| SupportLibraryError::Parse(path.to_path_buf(), err))?;
    verify_module(&library).map_err(|err| SupportLibraryError::Verify(path.to_path_buf(), err))?;
    Ok(library)
}

/// Link the device library into `module` and prepare it for the device.
///
/// When the library cannot be loaded or linked the module is returned as
/// it was, without internalization or intrinsic rewriting.
pub fn lower_for_device(mut module: LlvmModule, libdevice_path: &Path) -> LlvmModule {
    let library = match load_support_library(libdevice_path) {
        Ok(library) => library,
        Err(err) => {
            error!(%err, "could not load device library");
            return module;
        }
    };
    if let Err(err) = link_modules(&mut module, library) {
        error!(%err, "could not link device library");
        return module;
    }
    internalize(&mut module);
    rewrite_powi(&mut module);
    module
}

/// Give every function definition that is not a kernel internal linkage.
pub fn internalize(module: &mut LlvmModule) {
    let kernels: Vec<String> = module
        .kernel_names()
        .into_iter()
        .map(str::to_owned)
        .collect();
    let mut count = 0usize;
    for function in &mut module.functions {
        if function.is_declaration() || kernels.contains(&function.name) {
            continue;
        }
        if function.linkage != Linkage::Internal {
            function.linkage = Linkage::Internal;
            count += 1;
        }
    }
    debug!(count, "internalized functions");
}

/// Replace calls to the `llvm.powi.*` intrinsics with device library calls.
///
/// # Panics
///
/// Panics on a `powi` whose base is neither `float` nor `double`.
pub fn rewrite_powi(module: &mut LlvmModule) {
    let mut needed: Vec<(&'static str, Ty)> = Vec::new();
    for function in &mut module.functions {
        for inst in function.instructions_mut() {
            let InstKind::Call { ret, callee, .. } = &mut inst.kind else {
                continue;
            };
            if !callee.starts_with(POWI_INTRINSIC_PREFIX) {
                continue;
            }
            let replacement = match *ret {
                Ty::F32 => POWI_F32,
                Ty::F64 => POWI_F64,
                other => panic!("powi on unsupported type {other}"),
            };
            *callee = replacement.to_owned();
            if !needed.iter().any(|(name, _)| *name == replacement) {
                needed.push((replacement, *ret));
            }
        }
    }

    let called: HashSet<&str> = module
        .functions
        .iter()
        .flat_map(|f| f.instructions())
        .filter_map(|inst| inst.callee())
        .collect();
    let stale: Vec<String> = module
        .functions
        .iter()
        .filter(|f| f.is_declaration() && f.name.starts_with(POWI_INTRINSIC_PREFIX))
        .filter(|f| !called.contains(f.name.as_str()))
        .map(|f| f.name.clone())
        .collect();
    module.functions.retain(|f| !stale.contains(&f.name));

    for (name, ty) in needed {
        module.get_or_insert_declaration(name, ty, &[ty, Ty::I32]);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::llvm::{parse_module, verify_module};

    const KERNEL: &str = "\
define void @k(ptr %p, i32 %n) {
entry:
  %v = load float, ptr %p
  %w = call float @llvm.powi.f32.i32(float %v, i32 %n)
  %x = call float @scale(float %w)
  store float %x, ptr %p
  ret void
}

define float @scale(float %a) {
entry:
  %b = call float @__nv_fabsf(float %a)
  ret float %b
}

declare float @llvm.powi.f32.i32(float, i32)

declare float @__nv_fabsf(float)

!nvvm.annotations = !{!0}

!0 = !{ptr @k, !\"kernel\", i32 1}
";

    const LIBDEVICE: &str = "\
define float @__nv_fabsf(float %x) {
entry:
  %c = fcmp olt float %x, 0.0
  br i1 %c, label %neg, label %pos
neg:
  %y = fneg float %x
  ret float %y
pos:
  ret float %x
}

define float @__nv_powif(float %x, i32 %n) {
entry:
  ret float %x
}
";

    fn library_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn links_internalizes_and_rewrites() {
        let library = library_file(LIBDEVICE);
        let module = parse_module("k", KERNEL).unwrap();
        let lowered = lower_for_device(module, library.path());

        assert_eq!(lowered.function("k").unwrap().linkage, Linkage::External);
        assert_eq!(lowered.function("scale").unwrap().linkage, Linkage::Internal);
        assert_eq!(lowered.function("__nv_fabsf").unwrap().linkage, Linkage::Internal);
        assert!(lowered.function("llvm.powi.f32.i32").is_none());
        let k = lowered.function("k").unwrap();
        assert_eq!(k.blocks[0].instructions[1].callee(), Some(POWI_F32));
        assert_eq!(verify_module(&lowered), Ok(()));
    }

    #[test]
    fn unreadable_library_returns_module_untouched() {
        let module = parse_module("k", KERNEL).unwrap();
        let lowered = lower_for_device(module.clone(), Path::new("/nonexistent/libdevice.ll"));
        assert_eq!(lowered, module);
    }

    #[test]
    fn malformed_library_returns_module_untouched() {
        let library = library_file("define float @f( {\n");
        let module = parse_module("k", KERNEL).unwrap();
        let lowered = lower_for_device(module.clone(), library.path());
        assert_eq!(lowered, module);
        assert!(matches!(
            load_support_library(library.path()),
            Err(SupportLibraryError::Parse(..))
        ));
    }

    #[test]
    fn double_powi_uses_double_routine() {
        let mut module = parse_module(
            "m",
            "\
define double @f(double %x) {
entry:
  %y = call double @llvm.powi.f64.i32(double %x, i32 2)
  ret double %y
}

declare double @llvm.powi.f64.i32(double, i32)
",
        )
        .unwrap();
        rewrite_powi(&mut module);
        assert_eq!(module.function("f").unwrap().blocks[0].instructions[0].callee(), Some(POWI_F64));
        assert!(module.function(POWI_F64).unwrap().is_declaration());
        assert_eq!(verify_module(&module), Ok(()));
    }

    #[test]
    #[should_panic(expected = "powi on unsupported type")]
    fn integer_powi_panics() {
        let mut module = parse_module(
            "m",
            "\
define i32 @f(i32 %x) {
entry:
  %y = call i32 @llvm.powi.i32.i32(i32 %x, i32 2)
  ret i32 %y
}

declare i32 @llvm.powi.i32.i32(i32, i32)
",
        )
        .unwrap();
        rewrite_powi(&mut module);
    }
}
