//! PatternRewriter: the mutation handle passed to rewrite patterns.
//!
//! Every mutation is applied to the context immediately. The rewriter only
//! remembers which operations were created, moved or modified, and which
//! were erased, so the driver can refresh its worklist.

use std::collections::HashMap;

use crate::context::{IrContext, OperationData};
use crate::refs::{BlockRef, OpRef, ValueRef};

/// Mutation handle for rewrite patterns.
#[derive(Debug, Default)]
pub struct PatternRewriter {
    touched: Vec<OpRef>,
    erased: Vec<OpRef>,
}

impl PatternRewriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&mut self, op: OpRef) {
        if !self.touched.contains(&op) {
            self.touched.push(op);
        }
    }

    /// Record an in-place modification made without the rewriter's help,
    /// e.g. an attribute update through `ctx.op_mut`.
    pub fn notify_modified(&mut self, op: OpRef) {
        self.touch(op);
    }

    // === Creation ===

    /// Create a detached operation. Attach it with one of the `insert_*`
    /// methods.
    pub fn create_op(&mut self, ctx: &mut IrContext, data: OperationData) -> OpRef {
        let op = ctx.create_op(data);
        self.touch(op);
        op
    }

    /// Insert a detached operation right before `before`.
    pub fn insert_op_before(&mut self, ctx: &mut IrContext, before: OpRef, op: OpRef) {
        ctx.move_op_before(op, before);
        self.touch(op);
    }

    /// Insert a detached operation at the start of `block`.
    pub fn insert_op_at_start(&mut self, ctx: &mut IrContext, block: BlockRef, op: OpRef) {
        ctx.insert_op_at(block, 0, op);
        self.touch(op);
    }

    /// Insert a detached operation at the end of `block`.
    pub fn insert_op_at_end(&mut self, ctx: &mut IrContext, block: BlockRef, op: OpRef) {
        ctx.push_op(block, op);
        self.touch(op);
    }

    /// Deep-clone `op` and place the copy at the start of `block`.
    ///
    /// Returns the clone. The original is left in place.
    pub fn clone_op_at_start(&mut self, ctx: &mut IrContext, op: OpRef, block: BlockRef) -> OpRef {
        let mut mapping = HashMap::new();
        let clone = ctx.clone_op(op, &mut mapping);
        self.insert_op_at_start(ctx, block, clone);
        clone
    }

    // === Replacement / erasure ===

    /// Redirect every use of `op`'s results to `values`, then erase `op`.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not match the result count.
    pub fn replace_op_with_values(&mut self, ctx: &mut IrContext, op: OpRef, values: &[ValueRef]) {
        let results: Vec<ValueRef> = ctx.op_results(op).to_vec();
        assert_eq!(
            results.len(),
            values.len(),
            "replace_op_with_values: result count mismatch ({} vs {})",
            results.len(),
            values.len()
        );
        for (&old, &new) in results.iter().zip(values) {
            let users: Vec<OpRef> = ctx.uses(old).iter().map(|u| u.user).collect();
            ctx.replace_all_uses(old, new);
            for user in users {
                self.touch(user);
            }
        }
        self.erase_op(ctx, op);
    }

    /// Detach and destroy `op` together with everything nested in it.
    ///
    /// The results of `op` must be unused.
    pub fn erase_op(&mut self, ctx: &mut IrContext, op: OpRef) {
        if let Some(parent) = ctx.parent_op(op) {
            self.touch(parent);
        }
        ctx.detach_op(op);
        ctx.remove_op(op);
        self.touched.retain(|&o| o != op);
        self.erased.push(op);
    }

    // === Movement ===

    /// Move `op` (attached or detached) right before `before`.
    pub fn move_op_before(&mut self, ctx: &mut IrContext, op: OpRef, before: OpRef) {
        ctx.move_op_before(op, before);
        self.touch(op);
    }

    /// Move `ops` to the start of `block`, keeping their relative order.
    pub fn move_ops_to_block_start(&mut self, ctx: &mut IrContext, ops: &[OpRef], block: BlockRef) {
        for (index, &op) in ops.iter().enumerate() {
            ctx.detach_op(op);
            ctx.insert_op_at(block, index, op);
            self.touch(op);
        }
    }

    /// Move `ops` to the end of `block`, keeping their relative order.
    pub fn move_ops_to_block_end(&mut self, ctx: &mut IrContext, ops: &[OpRef], block: BlockRef) {
        for &op in ops {
            ctx.detach_op(op);
            ctx.push_op(block, op);
            self.touch(op);
        }
    }

    /// Erase the last operation of `block` and append `new_op` in its place.
    ///
    /// # Panics
    ///
    /// Panics if the block is empty.
    pub fn replace_terminator(&mut self, ctx: &mut IrContext, block: BlockRef, new_op: OpRef) {
        let old = ctx
            .block_terminator(block)
            .expect("replace_terminator: block has no operations");
        self.erase_op(ctx, old);
        self.insert_op_at_end(ctx, block, new_op);
    }

    // === Query ===

    /// Whether any mutation was recorded.
    pub fn has_changes(&self) -> bool {
        !self.touched.is_empty() || !self.erased.is_empty()
    }

    /// Operations created, moved or modified, in first-touch order.
    pub fn touched(&self) -> &[OpRef] {
        &self.touched
    }

    /// Operations erased by this rewriter.
    pub fn erased(&self) -> &[OpRef] {
        &self.erased
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{arith, core, omp, single_block_region};
    use crate::types::{Attribute, Location, Span};

    fn test_ctx() -> (IrContext, Location) {
        let mut ctx = IrContext::new();
        let path = ctx.paths.intern("test.mlir".to_owned());
        (ctx, Location::new(path, Span::new(0, 0)))
    }

    #[test]
    fn move_ops_to_block_start_keeps_order() {
        let (mut ctx, loc) = test_ctx();
        let i32_ty = core::i32(&mut ctx);
        let (_, src) = single_block_region(&mut ctx, loc, &[]);
        let (_, dst) = single_block_region(&mut ctx, loc, &[]);
        let a = arith::r#const(&mut ctx, loc, i32_ty, Attribute::IntBits(1)).op_ref();
        let b = arith::r#const(&mut ctx, loc, i32_ty, Attribute::IntBits(2)).op_ref();
        let existing = omp::terminator(&mut ctx, loc).op_ref();
        ctx.push_op(src, a);
        ctx.push_op(src, b);
        ctx.push_op(dst, existing);

        let mut rw = PatternRewriter::new();
        rw.move_ops_to_block_start(&mut ctx, &[a, b], dst);

        assert!(ctx.block(src).ops.is_empty());
        assert_eq!(ctx.block(dst).ops.as_slice(), &[a, b, existing]);
        assert_eq!(rw.touched(), &[a, b]);
    }

    #[test]
    fn replace_op_with_values_rewires_users() {
        let (mut ctx, loc) = test_ctx();
        let i32_ty = core::i32(&mut ctx);
        let (_, block) = single_block_region(&mut ctx, loc, &[]);
        let keep = arith::r#const(&mut ctx, loc, i32_ty, Attribute::IntBits(1));
        let dup = arith::r#const(&mut ctx, loc, i32_ty, Attribute::IntBits(1));
        ctx.push_op(block, keep.op_ref());
        ctx.push_op(block, dup.op_ref());
        let (k, d) = (keep.result(&ctx), dup.result(&ctx));
        let add = arith::add(&mut ctx, loc, d, d, i32_ty);
        ctx.push_op(block, add.op_ref());

        let mut rw = PatternRewriter::new();
        rw.replace_op_with_values(&mut ctx, dup.op_ref(), &[k]);

        assert!(ctx.is_erased(dup.op_ref()));
        assert_eq!(ctx.op_operands(add.op_ref()), &[k, k]);
        assert_eq!(ctx.uses(k).len(), 2);
        assert!(rw.touched().contains(&add.op_ref()));
        assert_eq!(rw.erased(), &[dup.op_ref()]);
    }

    #[test]
    fn replace_terminator_swaps_last_op() {
        let (mut ctx, loc) = test_ctx();
        let (_, block) = single_block_region(&mut ctx, loc, &[]);
        let term = omp::terminator(&mut ctx, loc).op_ref();
        ctx.push_op(block, term);

        let mut rw = PatternRewriter::new();
        let barrier = omp::barrier(&mut ctx, loc).op_ref();
        rw.replace_terminator(&mut ctx, block, barrier);

        assert!(ctx.is_erased(term));
        assert_eq!(ctx.block(block).ops.as_slice(), &[barrier]);
    }

    #[test]
    fn clone_op_at_start_leaves_original() {
        let (mut ctx, loc) = test_ctx();
        let i32_ty = core::i32(&mut ctx);
        let (_, src) = single_block_region(&mut ctx, loc, &[]);
        let (_, dst) = single_block_region(&mut ctx, loc, &[]);
        let c = arith::r#const(&mut ctx, loc, i32_ty, Attribute::IntBits(7)).op_ref();
        ctx.push_op(src, c);

        let mut rw = PatternRewriter::new();
        let clone = rw.clone_op_at_start(&mut ctx, c, dst);

        assert_ne!(clone, c);
        assert_eq!(ctx.block(src).ops.as_slice(), &[c]);
        assert_eq!(ctx.block(dst).ops.as_slice(), &[clone]);
        assert!(rw.has_changes());
    }
}
