//! Rewrite pattern trait.

use super::rewriter::PatternRewriter;
use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;

/// A pattern that can match and transform an operation in place.
///
/// Patterns are stateless. All structural changes must go through the
/// `rewriter` so the driver learns which operations to revisit.
///
/// # Return Value
///
/// Return `true` if the IR was changed. Return `false` if the pattern does
/// not apply; in that case the IR must be left untouched.
pub trait RewritePattern {
    /// Attempt to match and rewrite an operation.
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        rewriter: &mut PatternRewriter,
    ) -> bool;

    /// The `(dialect, name)` of the operations this pattern is rooted at,
    /// or `None` to be tried on every operation.
    fn root_kind(&self) -> Option<(Symbol, Symbol)> {
        None
    }

    /// Optional: return a human-readable name for debugging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
