//! Compilation pipeline for weft IR.
//!
//! ```text
//! source text
//!     │
//!     ▼
//! parse ─► validate
//!     │
//!     ├─► [omp_opt] ─► merge and hoist omp.parallel regions ─► validate
//!     │
//!     └─► [serialize] ─► gpu.module ─► lowered IR ─► PTX ─► gpu.binary
//! ```
//!
//! Stages run in place on one [`IrContext`]. Structural validation runs
//! after parsing and after every stage that rewrites the IR.

use derive_more::Display;
use tracing::{debug, info_span};
use weft_ir::parser::{ParseError, parse_module_with_path};
use weft_ir::printer::print_op;
use weft_ir::rewrite::{ApplyResult, DEFAULT_MAX_ITERATIONS};
use weft_ir::validation::validate_all;
use weft_ir::{IrContext, OpRef};
use weft_nvptx::{SerializeError, SerializeOptions, SerializeToCubin};
use weft_passes::OmpOptPass;

/// Which stages to run.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Run the OpenMP region optimization with this pass cap.
    pub omp_opt: Option<usize>,
    /// Serialize gpu modules with these options.
    pub serialize: Option<SerializeOptions>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            omp_opt: Some(DEFAULT_MAX_ITERATIONS),
            serialize: None,
        }
    }
}

#[derive(Debug, Display)]
pub enum PipelineError {
    #[display("{_0}")]
    Parse(ParseError),
    #[display("IR is malformed after {stage}:\n{report}")]
    Invalid { stage: &'static str, report: String },
    #[display("{_0}")]
    Serialize(SerializeError),
}

impl std::error::Error for PipelineError {}

impl From<ParseError> for PipelineError {
    fn from(err: ParseError) -> Self {
        PipelineError::Parse(err)
    }
}

impl From<SerializeError> for PipelineError {
    fn from(err: SerializeError) -> Self {
        PipelineError::Serialize(err)
    }
}

/// The IR after the pipeline ran, with per-stage results.
pub struct Compilation {
    pub ctx: IrContext,
    pub root: OpRef,
    pub omp_opt: Option<ApplyResult>,
    pub serialized: usize,
}

impl std::fmt::Debug for Compilation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compilation")
            .field("root", &self.root)
            .field("serialized", &self.serialized)
            .finish_non_exhaustive()
    }
}

impl Compilation {
    pub fn print(&self) -> String {
        print_op(&self.ctx, self.root)
    }
}

fn check(ctx: &IrContext, root: OpRef, stage: &'static str) -> Result<(), PipelineError> {
    let result = validate_all(ctx, root);
    if result.is_ok() {
        Ok(())
    } else {
        Err(PipelineError::Invalid {
            stage,
            report: result.to_string(),
        })
    }
}

/// Parse `source` and run the stages selected by `config`.
pub fn compile(
    source: &str,
    path: &str,
    config: &PipelineConfig,
) -> Result<Compilation, PipelineError> {
    let _span = info_span!("compile", path).entered();
    let mut ctx = IrContext::new();
    let root = parse_module_with_path(&mut ctx, path, source)?;
    check(&ctx, root, "parse")?;

    let omp_opt = config.omp_opt.map(|cap| {
        let result = OmpOptPass::new().with_max_iterations(cap).run(&mut ctx, root);
        debug!(?result, "omp_opt stage done");
        result
    });
    if omp_opt.is_some() {
        check(&ctx, root, "omp_opt")?;
    }

    let serialized = match &config.serialize {
        Some(options) => SerializeToCubin::new(options.clone()).run(&mut ctx, root)?,
        None => 0,
    };

    Ok(Compilation {
        ctx,
        root,
        omp_opt,
        serialized,
    })
}
