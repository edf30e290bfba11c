//! End-to-end tests of the serialize-to-cubin pass.

use std::path::{Path, PathBuf};

use weft_ir::dialect::gpu;
use weft_ir::parser::parse_module;
use weft_ir::walk::nested_ops;
use weft_ir::{DialectOp, IrContext, OpRef};
use weft_nvptx::emit::{TargetEmitter, emit_ptx};
use weft_nvptx::llvm::LlvmModule;
use weft_nvptx::lower::lower_for_device;
use weft_nvptx::optimize::optimize_llvm;
use weft_nvptx::target::TargetMachine;
use weft_nvptx::translate::{ArenaTranslator, ModuleTranslator};
use weft_nvptx::{SerializeErrorKind, SerializeOptions, SerializeResult, SerializeToCubin};

const LIBDEVICE: &str = "\
define float @__nv_powif(float %x, i32 %n) {
entry:
  %y = fmul float %x, %x
  ret float %y
}

define float @__nv_unused(float %x) {
entry:
  ret float %x
}
";

const HOST: &str = "\
core.module @host {
  gpu.module @kernels {
    func.func @square {gpu.kernel = unit, type = func.fn(core.nil, core.ptr)} {
      ^bb0(%0: core.ptr):
        %1 = gpu.thread_id {dimension = @x} : core.i32
        %2 = mem.offset %0, %1 {elem_type = core.f32} : core.ptr
        %3 = mem.load %2 : core.f32
        %4 = arith.const {value = 2} : core.i32
        %5 = arith.powi %3, %4 : core.f32
        mem.store %5, %2
        func.return
    }
  }
}
";

struct Fixture {
    /// Holds the stub assembler and the device library.
    tools: tempfile::TempDir,
    /// Scratch directory handed to the pass.
    scratch: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let tools = tempfile::tempdir().unwrap();
        std::fs::write(tools.path().join("libdevice.ll"), LIBDEVICE).unwrap();
        Self {
            tools,
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    fn libdevice(&self) -> PathBuf {
        self.tools.path().join("libdevice.ll")
    }

    /// An assembler that copies its input to `--output-file`.
    #[cfg(unix)]
    fn copying_assembler(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.tools.path().join("ptxas");
        std::fs::write(
            &path,
            "#!/bin/sh\n\
             out=\"\"\n\
             src=\"\"\n\
             while [ $# -gt 0 ]; do\n\
             \x20 case \"$1\" in\n\
             \x20   --output-file) out=\"$2\"; shift 2 ;;\n\
             \x20   *) src=\"$1\"; shift ;;\n\
             \x20 esac\n\
             done\n\
             cp \"$src\" \"$out\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn options(&self, ptxas: &Path) -> SerializeOptions {
        SerializeOptions {
            ptxas_path: ptxas.to_path_buf(),
            libdevice_path: self.libdevice(),
            temp_dir: Some(self.scratch.path().to_path_buf()),
            ..SerializeOptions::default()
        }
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
    }
}

fn gpu_modules(ctx: &IrContext, root: OpRef) -> Vec<gpu::Module> {
    nested_ops(ctx, root)
        .into_iter()
        .filter_map(|op| gpu::Module::from_op(ctx, op).ok())
        .collect()
}

#[cfg(unix)]
#[test]
fn blob_is_the_assembled_ptx() {
    let fixture = Fixture::new();
    let options = fixture.options(&fixture.copying_assembler());
    let mut ctx = IrContext::new();
    let root = parse_module(&mut ctx, HOST).unwrap();

    let pass = SerializeToCubin::new(options.clone());
    let expected = {
        let module = gpu_modules(&ctx, root)[0];
        let mut llvm = ArenaTranslator.translate(&ctx, module, "kernels").unwrap();
        llvm.triple = Some(options.triple.clone());
        let mut llvm = lower_for_device(llvm, &options.libdevice_path);
        optimize_llvm(&mut llvm, options.llvm_opt_level, &pass.target_machine()).unwrap();
        emit_ptx(&llvm, &pass.target_machine()).unwrap() + "\n"
    };

    assert_eq!(pass.run(&mut ctx, root), Ok(1));
    let module = gpu_modules(&ctx, root)[0];
    let blob = module.binary(&ctx).expect("gpu.binary attached");
    assert_eq!(blob, expected.as_bytes());

    let text = String::from_utf8(blob.to_vec()).unwrap();
    assert!(text.contains(".visible .entry square("), "{text}");
    assert!(text.contains("call.uni (retval0), __nv_powif,"), "{text}");
    assert!(!text.contains("__nv_unused"), "{text}");
    assert!(fixture.scratch_is_empty());
}

#[test]
fn out_of_range_level_attaches_nothing() {
    let fixture = Fixture::new();
    for level in [4, -1] {
        let options = SerializeOptions {
            llvm_opt_level: level,
            ..fixture.options(Path::new("ptxas-is-never-run"))
        };
        let mut ctx = IrContext::new();
        let root = parse_module(&mut ctx, HOST).unwrap();
        let module = gpu_modules(&ctx, root)[0];

        let err = SerializeToCubin::new(options)
            .run(&mut ctx, root)
            .unwrap_err();
        assert_eq!(err.kind(), &SerializeErrorKind::InvalidOptLevel(level));
        assert_eq!(err.location(), Some(ctx.op(module.op_ref()).location));
        assert!(module.binary(&ctx).is_none());
    }
    assert!(fixture.scratch_is_empty());
}

#[test]
fn untranslatable_module_is_reported() {
    let fixture = Fixture::new();
    let mut ctx = IrContext::new();
    let root = parse_module(
        &mut ctx,
        "\
gpu.module @loops {
  func.func @k {gpu.kernel = unit, type = func.fn(core.nil, core.i32)} {
    ^bb0(%0: core.i32):
      scf.for %0, %0, %0 {
        ^bb1(%1: core.i32):
          scf.yield
      }
      func.return
  }
}
",
    )
    .unwrap();

    let err = SerializeToCubin::new(fixture.options(Path::new("ptxas-is-never-run")))
        .run(&mut ctx, root)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not translate module to LLVM IR: loops"
    );
    let module = gpu::Module::from_op(&ctx, root).unwrap();
    assert!(module.binary(&ctx).is_none());
}

#[cfg(unix)]
#[test]
fn missing_device_library_still_serializes() {
    let fixture = Fixture::new();
    let options = SerializeOptions {
        libdevice_path: fixture.tools.path().join("missing.ll"),
        ..fixture.options(&fixture.copying_assembler())
    };
    let mut ctx = IrContext::new();
    let root = parse_module(
        &mut ctx,
        "\
gpu.module @plain {
  func.func @k {gpu.kernel = unit, type = func.fn(core.nil)} {
    gpu.barrier
    func.return
  }
}
",
    )
    .unwrap();

    assert_eq!(SerializeToCubin::new(options).run(&mut ctx, root), Ok(1));
    let blob = gpu::Module::from_op(&ctx, root).unwrap().binary(&ctx).unwrap().to_vec();
    let text = String::from_utf8(blob).unwrap();
    assert!(text.contains("\tbar.sync 0;\n"), "{text}");
}

#[cfg(unix)]
#[test]
fn every_nested_module_is_serialized() {
    let fixture = Fixture::new();
    let options = fixture.options(&fixture.copying_assembler());
    let mut ctx = IrContext::new();
    let root = parse_module(
        &mut ctx,
        "\
core.module @host {
  gpu.module @a {
    func.func @ka {gpu.kernel = unit, type = func.fn(core.nil)} {
      func.return
    }
  }
  gpu.module @b {
    func.func @kb {gpu.kernel = unit, type = func.fn(core.nil)} {
      func.return
    }
  }
}
",
    )
    .unwrap();

    assert_eq!(SerializeToCubin::new(options).run(&mut ctx, root), Ok(2));
    for module in gpu_modules(&ctx, root) {
        assert!(module.binary(&ctx).is_some());
    }
    assert!(fixture.scratch_is_empty());
}

struct EmptyTranslator;

impl ModuleTranslator for EmptyTranslator {
    fn translate(&self, _ctx: &IrContext, _module: gpu::Module, name: &str) -> Option<LlvmModule> {
        Some(LlvmModule::new(name))
    }
}

struct RefusingTranslator;

impl ModuleTranslator for RefusingTranslator {
    fn translate(&self, _ctx: &IrContext, _module: gpu::Module, _name: &str) -> Option<LlvmModule> {
        None
    }
}

/// Emits one line naming the module, the chip and the surviving functions.
struct SummaryEmitter;

impl TargetEmitter for SummaryEmitter {
    fn emit(&self, module: &LlvmModule, target: &TargetMachine) -> SerializeResult<String> {
        let functions: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        Ok(format!("{} {} [{}]", module.name, target.chip, functions.join(",")))
    }
}

#[cfg(unix)]
#[test]
fn injected_collaborators_replace_the_defaults() {
    let fixture = Fixture::new();
    let options = SerializeOptions {
        chip: "sm_80".to_owned(),
        ..fixture.options(&fixture.copying_assembler())
    };
    let mut ctx = IrContext::new();
    let root = parse_module(&mut ctx, HOST).unwrap();

    let pass = SerializeToCubin::new(options)
        .with_translator(EmptyTranslator)
        .with_emitter(SummaryEmitter);
    assert_eq!(pass.run(&mut ctx, root), Ok(1));

    // Nothing references the device library, so O3 drops all of it.
    let blob = gpu_modules(&ctx, root)[0].binary(&ctx).unwrap().to_vec();
    assert_eq!(String::from_utf8(blob).unwrap(), "kernels sm_80 []\n");
    assert!(fixture.scratch_is_empty());
}

#[test]
fn refusing_translator_is_a_translation_error() {
    let fixture = Fixture::new();
    let mut ctx = IrContext::new();
    let root = parse_module(&mut ctx, HOST).unwrap();

    let err = SerializeToCubin::new(fixture.options(Path::new("ptxas-is-never-run")))
        .with_translator(RefusingTranslator)
        .run(&mut ctx, root)
        .unwrap_err();
    assert_eq!(
        err.kind(),
        &SerializeErrorKind::Translation("kernels".to_owned())
    );
    assert!(gpu_modules(&ctx, root)[0].binary(&ctx).is_none());
}
