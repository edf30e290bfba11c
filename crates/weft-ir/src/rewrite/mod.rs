//! In-place rewrite infrastructure.
//!
//! Patterns mutate the `IrContext` directly through a `PatternRewriter`,
//! which records every operation it touches. The `GreedyRewriteDriver`
//! uses those records to revisit affected operations until no pattern
//! applies anymore.

pub mod driver;
pub mod pattern;
pub mod rewriter;

pub use driver::{ApplyResult, DEFAULT_MAX_ITERATIONS, GreedyRewriteDriver};
pub use pattern::RewritePattern;
pub use rewriter::PatternRewriter;
