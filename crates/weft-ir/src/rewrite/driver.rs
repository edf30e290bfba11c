//! Greedy fixed-point driver.
//!
//! Each pass seeds a FIFO worklist with every operation nested under the
//! root, then tries the patterns registered for each operation's kind.
//! Operations touched by a successful rewrite, and their ancestors, are
//! queued again within the same pass. An operation rewritten in a pass is
//! not queued again until the next pass, so every pass terminates. The
//! driver stops after a pass with no successful rewrite or after
//! `max_iterations` passes.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use super::pattern::RewritePattern;
use super::rewriter::PatternRewriter;
use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;
use crate::walk::nested_ops;

/// Default cap on the number of passes.
pub const DEFAULT_MAX_ITERATIONS: usize = 47;

/// Result of applying rewrite patterns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApplyResult {
    /// Number of passes performed.
    pub iterations: usize,
    /// Total number of successful rewrites.
    pub total_changes: usize,
    /// Whether the last pass made no change.
    pub reached_fixpoint: bool,
}

/// Applies rewrite patterns to all operations nested under a root until
/// a fixed point is reached.
pub struct GreedyRewriteDriver {
    patterns: Vec<Box<dyn RewritePattern>>,
    by_kind: HashMap<(Symbol, Symbol), Vec<usize>>,
    generic: Vec<usize>,
    max_iterations: usize,
}

impl Default for GreedyRewriteDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl GreedyRewriteDriver {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            by_kind: HashMap::new(),
            generic: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Add a rewrite pattern. Patterns are tried in insertion order.
    pub fn add_pattern(mut self, pattern: impl RewritePattern + 'static) -> Self {
        let index = self.patterns.len();
        match pattern.root_kind() {
            Some(kind) => self.by_kind.entry(kind).or_default().push(index),
            None => self.generic.push(index),
        }
        self.patterns.push(Box::new(pattern));
        self
    }

    /// Set the maximum number of passes.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Apply the patterns to every operation nested under `root`.
    ///
    /// `root` itself is never rewritten.
    pub fn apply(&self, ctx: &mut IrContext, root: OpRef) -> ApplyResult {
        let _span = tracing::info_span!("greedy_rewrite", patterns = self.patterns.len()).entered();

        let mut total_changes = 0;
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let changes = self.run_one_pass(ctx, root);
            debug!(iteration = iterations, changes, "rewrite pass finished");
            total_changes += changes;
            if changes == 0 {
                return ApplyResult {
                    iterations,
                    total_changes,
                    reached_fixpoint: true,
                };
            }
        }

        debug!(
            max_iterations = self.max_iterations,
            "rewrite driver stopped before reaching a fixed point"
        );
        ApplyResult {
            iterations,
            total_changes,
            reached_fixpoint: false,
        }
    }

    /// Indices of the patterns applicable to `op`, in insertion order.
    fn candidates(&self, ctx: &IrContext, op: OpRef) -> Vec<usize> {
        let data = ctx.op(op);
        let mut out: Vec<usize> = self
            .by_kind
            .get(&(data.dialect, data.name))
            .cloned()
            .unwrap_or_default();
        if !self.generic.is_empty() {
            out.extend(&self.generic);
            out.sort_unstable();
        }
        out
    }

    fn run_one_pass(&self, ctx: &mut IrContext, root: OpRef) -> usize {
        let mut worklist: VecDeque<OpRef> = nested_ops(ctx, root).into();
        let mut queued: HashSet<OpRef> = worklist.iter().copied().collect();
        let mut rewritten: HashSet<OpRef> = HashSet::new();
        let mut changes = 0;

        while let Some(op) = worklist.pop_front() {
            queued.remove(&op);
            if ctx.is_erased(op) || op == root || !ctx.is_ancestor(root, op) {
                continue;
            }

            for index in self.candidates(ctx, op) {
                let pattern = &self.patterns[index];
                let mut rewriter = PatternRewriter::new();
                if !pattern.match_and_rewrite(ctx, op, &mut rewriter) {
                    continue;
                }
                trace!(pattern = pattern.name(), "pattern applied");
                changes += 1;
                rewritten.insert(op);

                for &touched in rewriter.touched() {
                    let mut current = Some(touched);
                    while let Some(o) = current {
                        if o == root {
                            break;
                        }
                        if !ctx.is_erased(o) && !rewritten.contains(&o) && queued.insert(o) {
                            worklist.push_back(o);
                        }
                        current = ctx.parent_op(o);
                    }
                }
                // The op may have been erased or restructured; revisit it
                // later instead of trying more patterns now.
                break;
            }
        }

        changes
    }
}
