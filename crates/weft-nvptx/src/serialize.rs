//! The serialize-to-cubin pass.

use tracing::{debug, info, info_span};
use weft_ir::dialect::gpu;
use weft_ir::walk::nested_ops;
use weft_ir::{DialectOp, IrContext, OpRef};

use crate::assembler::serialize_isa;
use crate::emit::{PtxEmitter, TargetEmitter};
use crate::errors::{SerializeError, SerializeResult};
use crate::llvm::LlvmModule;
use crate::lower::lower_for_device;
use crate::optimize::optimize_llvm;
use crate::options::SerializeOptions;
use crate::target::TargetMachine;
use crate::translate::{ArenaTranslator, ModuleTranslator};

/// Compiles every `gpu.module` to a device binary and attaches it as
/// `gpu.binary`.
pub struct SerializeToCubin {
    pub options: SerializeOptions,
    translator: Box<dyn ModuleTranslator>,
    emitter: Box<dyn TargetEmitter>,
}

impl SerializeToCubin {
    pub fn new(options: SerializeOptions) -> Self {
        Self {
            options,
            translator: Box::new(ArenaTranslator),
            emitter: Box::new(PtxEmitter),
        }
    }

    pub fn with_translator(mut self, translator: impl ModuleTranslator + 'static) -> Self {
        self.translator = Box::new(translator);
        self
    }

    pub fn with_emitter(mut self, emitter: impl TargetEmitter + 'static) -> Self {
        self.emitter = Box::new(emitter);
        self
    }

    pub fn target_machine(&self) -> TargetMachine {
        TargetMachine::new(
            self.options.triple.as_str(),
            self.options.chip.as_str(),
            self.options.features.as_str(),
        )
    }

    /// Serialize `root` if it is a `gpu.module`, and every `gpu.module`
    /// nested in it. Returns the number of modules serialized.
    ///
    /// Stops at the first failing module, which is left without a binary.
    pub fn run(&self, ctx: &mut IrContext, root: OpRef) -> SerializeResult<usize> {
        let modules: Vec<gpu::Module> = std::iter::once(root)
            .chain(nested_ops(ctx, root))
            .filter_map(|op| gpu::Module::from_op(ctx, op).ok())
            .collect();
        for &module in &modules {
            self.serialize_module(ctx, module)?;
        }
        Ok(modules.len())
    }

    pub fn serialize_module(&self, ctx: &mut IrContext, module: gpu::Module) -> SerializeResult<()> {
        let name = module.sym_name(ctx).to_string();
        let _span = info_span!("serialize_to_cubin", module = %name).entered();
        let location = ctx.op(module.op_ref()).location;

        let blob = self
            .translate_to_isa(ctx, module, &name)
            .and_then(|isa| serialize_isa(&isa, &name, &self.options))
            .map_err(|err| err.at(location))?;
        info!(bytes = blob.len(), "attached device binary");
        module.set_binary(ctx, blob);
        Ok(())
    }

    fn translate_to_isa(
        &self,
        ctx: &IrContext,
        module: gpu::Module,
        name: &str,
    ) -> SerializeResult<String> {
        let target = self.target_machine();
        let mut llvm = self
            .translator
            .translate(ctx, module, name)
            .ok_or_else(|| SerializeError::translation(name))?;
        llvm.triple = Some(target.triple.clone());

        let mut llvm = lower_for_device(llvm, &self.options.libdevice_path);
        self.dump("Unoptimized GPU LLVM module for: ", name, &llvm);
        optimize_llvm(&mut llvm, self.options.llvm_opt_level, &target)?;
        self.dump("Optimized GPU LLVM module for: ", name, &llvm);

        self.emitter.emit(&llvm, &target)
    }

    fn dump(&self, banner: &str, name: &str, module: &LlvmModule) {
        if self.options.output_intermediate {
            println!("{banner}{name}\n{module}");
        }
        debug!("{banner}{name}\n{module}");
    }
}
