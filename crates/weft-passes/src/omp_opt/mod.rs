//! OpenMP region optimization.
//!
//! Fuses adjacent `omp.parallel` regions and swaps parallel regions with
//! the loops and conditionals that immediately enclose them, so that one
//! team of workers is launched where several used to be.

pub mod combine;
pub mod interchange;

use tracing::info;
use weft_ir::rewrite::{ApplyResult, DEFAULT_MAX_ITERATIONS, GreedyRewriteDriver};
use weft_ir::validation::debug_assert_valid;
use weft_ir::{IrContext, OpRef};

pub use combine::CombineAdjacentParallel;
pub use interchange::{InterchangeIntoConditional, InterchangeIntoLoop};

/// Configuration for the OpenMP optimization pass.
#[derive(Debug, Clone)]
pub struct OmpOptPass {
    /// Maximum number of driver passes. Default: 47.
    pub max_iterations: usize,
}

impl Default for OmpOptPass {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl OmpOptPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    /// The rewrite driver carrying all OpenMP patterns.
    pub fn driver(&self) -> GreedyRewriteDriver {
        GreedyRewriteDriver::new()
            .add_pattern(CombineAdjacentParallel)
            .add_pattern(InterchangeIntoLoop)
            .add_pattern(InterchangeIntoConditional)
            .with_max_iterations(self.max_iterations)
    }

    /// Run the pass on everything nested under `root`.
    pub fn run(&self, ctx: &mut IrContext, root: OpRef) -> ApplyResult {
        let _span = tracing::info_span!("omp_opt").entered();
        let result = self.driver().apply(ctx, root);
        info!(
            iterations = result.iterations,
            changes = result.total_changes,
            fixpoint = result.reached_fixpoint,
            "omp_opt finished"
        );
        debug_assert_valid(ctx, root, "omp_opt");
        result
    }
}

/// Run the OpenMP optimization pass with default settings.
pub fn run_omp_opt(ctx: &mut IrContext, root: OpRef) -> ApplyResult {
    OmpOptPass::default().run(ctx, root)
}
