//! Whole-pipeline tests: parse, optimize parallel regions, serialize.

use weft::{PipelineConfig, PipelineError, compile};
use weft_ir::dialect::gpu;
use weft_ir::walk::nested_ops;
use weft_ir::{Attribute, DialectOp};
use weft_nvptx::{SerializeErrorKind, SerializeOptions};

const PROGRAM: &str = "\
core.module @program {
  func.func @host {type = func.fn(core.nil, core.ptr, core.i32)} {
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
  gpu.module @device {
    func.func @fill {gpu.kernel = unit, type = func.fn(core.nil, core.ptr, core.f32)} {
      ^bb0(%7: core.ptr, %8: core.f32):
        %9 = gpu.block_id {dimension = @x} : core.i32
        %10 = gpu.block_dim {dimension = @x} : core.i32
        %11 = gpu.thread_id {dimension = @x} : core.i32
        %12 = arith.mul %9, %10 : core.i32
        %13 = arith.add %12, %11 : core.i32
        %14 = mem.offset %7, %13 {elem_type = core.f32} : core.ptr
        mem.store %8, %14
        func.return
    }
  }
}
";

#[test]
fn loop_interchange_without_serialization() {
    let compilation = compile(PROGRAM, "program.weft", &PipelineConfig::default()).unwrap();
    let result = compilation.omp_opt.unwrap();
    assert_eq!(result.total_changes, 1);
    assert!(result.reached_fixpoint);

    let printed = compilation.print();
    let parallel = printed.find("omp.parallel").unwrap();
    let for_loop = printed.find("scf.for").unwrap();
    assert!(parallel < for_loop, "{printed}");
    assert!(!printed.contains("gpu.binary"));
}

#[cfg(unix)]
#[test]
fn serialization_attaches_binary() {
    let scratch = tempfile::tempdir().unwrap();
    let libdevice = scratch.path().join("libdevice.ll");
    std::fs::write(&libdevice, "declare float @__nv_sqrtf(float)\n").unwrap();
    let temp_dir = tempfile::tempdir().unwrap();

    let config = PipelineConfig {
        omp_opt: None,
        serialize: Some(SerializeOptions {
            ptxas_path: copying_assembler(scratch.path()),
            libdevice_path: libdevice,
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..SerializeOptions::default()
        }),
    };
    let compilation = compile(PROGRAM, "program.weft", &config).unwrap();
    assert_eq!(compilation.serialized, 1);

    let ctx = &compilation.ctx;
    let module = nested_ops(ctx, compilation.root)
        .into_iter()
        .find_map(|op| gpu::Module::from_op(ctx, op).ok())
        .unwrap();
    let blob = String::from_utf8(module.binary(ctx).unwrap().to_vec()).unwrap();
    assert!(blob.contains(".visible .entry fill("), "{blob}");
    assert!(blob.contains("mov.u32 %r1, %ctaid.x;"), "{blob}");
    assert!(blob.contains("mov.u32 %r3, %tid.x;"), "{blob}");
    assert!(matches!(
        ctx.op(module.op_ref()).attributes.get(&gpu::ATTR_BINARY()),
        Some(Attribute::Bytes(_))
    ));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn serialization_errors_carry_the_module_location() {
    let config = PipelineConfig {
        omp_opt: None,
        serialize: Some(SerializeOptions {
            llvm_opt_level: 7,
            ..SerializeOptions::default()
        }),
    };
    let Err(PipelineError::Serialize(err)) = compile(PROGRAM, "program.weft", &config) else {
        panic!("expected a serialization error");
    };
    assert_eq!(err.kind(), &SerializeErrorKind::InvalidOptLevel(7));
    assert!(err.location().is_some());
}

#[test]
fn malformed_parallel_regions_are_rejected_before_rewriting() {
    let sources = [
        "\
func.func @f {type = func.fn(core.nil)} {
  omp.parallel
  omp.parallel
  func.return
}
",
        "\
func.func @f {type = func.fn(core.nil)} {
  omp.parallel {
  }
  func.return
}
",
    ];
    for source in sources {
        let Err(PipelineError::Invalid { stage, report }) =
            compile(source, "malformed.weft", &PipelineConfig::default())
        else {
            panic!("expected a validation error for:\n{source}");
        };
        assert_eq!(stage, "parse");
        assert!(report.contains("shape error(s) found"), "{report}");
        assert!(report.contains("omp.parallel"), "{report}");
    }
}

#[cfg(unix)]
fn copying_assembler(dir: &std::path::Path) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ptxas");
    std::fs::write(
        &path,
        "#!/bin/sh\nfor last; do :; done\nwhile [ \"$1\" != --output-file ]; do shift; done\ncp \"$last\" \"$2\"\n",
    )
    .unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
