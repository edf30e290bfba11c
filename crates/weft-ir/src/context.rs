//! IrContext: arena-based mutable IR storage.
//!
//! All IR entities (operations, values, blocks, regions) are stored in
//! `PrimaryMap`s owned by `IrContext`. Entity lists (operands, results)
//! use `EntityList + ListPool` for compact 4-byte per-field storage.

use std::collections::{BTreeMap, HashMap};

use cranelift_entity::{EntityList, ListPool, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

// ============================================================================
// Use-chain
// ============================================================================

/// A single use of a value: which operation uses it, at which operand index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: OpRef,
    pub operand_index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// Data for a single operation in the arena.
pub struct OperationData {
    pub location: Location,
    pub dialect: Symbol,
    pub name: Symbol,
    pub operands: EntityList<ValueRef>,
    pub results: EntityList<TypeRef>,
    pub attributes: BTreeMap<Symbol, Attribute>,
    pub regions: SmallVec<[RegionRef; 4]>,
    pub parent_block: Option<BlockRef>,
}

impl OperationData {
    /// Check whether this operation is `dialect.name`.
    pub fn is(&self, dialect: &str, name: &str) -> bool {
        self.dialect == dialect && self.name == name
    }
}

/// Data for a single SSA value.
pub struct ValueData {
    pub def: ValueDef,
    pub ty: TypeRef,
}

/// A block argument. Region entry blocks bind induction variables and
/// function parameters through these.
#[derive(Clone, Copy, Debug)]
pub struct BlockArgData {
    pub ty: TypeRef,
}

impl BlockArgData {
    pub fn new(ty: TypeRef) -> Self {
        Self { ty }
    }
}

/// Data for a block.
pub struct BlockData {
    pub location: Location,
    pub args: Vec<BlockArgData>,
    pub ops: SmallVec<[OpRef; 4]>,
    pub parent_region: Option<RegionRef>,
}

impl BlockData {
    /// An empty, detached block without arguments.
    pub fn empty(location: Location) -> Self {
        Self {
            location,
            args: vec![],
            ops: SmallVec::new(),
            parent_region: None,
        }
    }
}

/// Data for a region (list of blocks).
pub struct RegionData {
    pub location: Location,
    pub blocks: SmallVec<[BlockRef; 4]>,
    pub parent_op: Option<OpRef>,
}

// ============================================================================
// IrContext
// ============================================================================

/// Arena-based mutable IR context.
///
/// Owns all IR entities and provides methods for creating, querying,
/// and mutating them. Use-chains are maintained on every mutation.
pub struct IrContext {
    ops: PrimaryMap<OpRef, OperationData>,
    values: PrimaryMap<ValueRef, ValueData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    regions: PrimaryMap<RegionRef, RegionData>,

    /// Use-chain: for each value, the list of operations that use it.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,
    /// Operations destroyed by `remove_op`. Their slots stay allocated.
    erased: SecondaryMap<OpRef, bool>,

    pub types: TypeInterner,
    pub paths: PathInterner,

    /// Backing pools for EntityList storage.
    value_pool: ListPool<ValueRef>,
    type_pool: ListPool<TypeRef>,

    /// Mapping from operation to its result ValueRefs.
    result_values: SecondaryMap<OpRef, EntityList<ValueRef>>,
    /// Mapping from block to its argument ValueRefs.
    block_arg_values: SecondaryMap<BlockRef, EntityList<ValueRef>>,
}

impl IrContext {
    /// Create a new empty IR context.
    pub fn new() -> Self {
        Self {
            ops: PrimaryMap::new(),
            values: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            regions: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            erased: SecondaryMap::new(),
            types: TypeInterner::new(),
            paths: PathInterner::new(),
            value_pool: ListPool::new(),
            type_pool: ListPool::new(),
            result_values: SecondaryMap::new(),
            block_arg_values: SecondaryMap::new(),
        }
    }

    // ========================================================================
    // Operation
    // ========================================================================

    /// Create a new operation and allocate result values for it.
    ///
    /// The operation's operands are registered in the use-chain.
    /// The operation must not have a `parent_block` set; use `push_op` to
    /// attach it to a block after creation.
    ///
    /// # Panics
    ///
    /// Panics if `data.parent_block` is `Some`, or if any region in
    /// `data.regions` already belongs to another operation.
    pub fn create_op(&mut self, data: OperationData) -> OpRef {
        assert!(
            data.parent_block.is_none(),
            "create_op: operation must not have parent_block set; \
             use push_op to attach to a block after creation",
        );

        let operand_slice: SmallVec<[ValueRef; 8]> =
            data.operands.as_slice(&self.value_pool).into();
        let result_types: SmallVec<[TypeRef; 4]> = data.results.as_slice(&self.type_pool).into();
        let regions: SmallVec<[RegionRef; 4]> = data.regions.clone();

        let op = self.ops.push(data);

        // Back-link owned regions to this operation
        for &r in &regions {
            if let Some(existing) = self.regions[r].parent_op {
                panic!(
                    "create_op: region {r} already belongs to operation {existing}; \
                     cannot reassign to {op}",
                );
            }
            self.regions[r].parent_op = Some(op);
        }

        for (idx, &val) in operand_slice.iter().enumerate() {
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }

        let mut result_value_list = EntityList::new();
        for (idx, &ty) in result_types.iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::OpResult(op, idx as u32),
                ty,
            });
            result_value_list.push(v, &mut self.value_pool);
        }
        self.result_values[op] = result_value_list;

        op
    }

    /// Get immutable reference to operation data.
    pub fn op(&self, op: OpRef) -> &OperationData {
        &self.ops[op]
    }

    /// Get mutable reference to operation data.
    ///
    /// **Warning**: Modifying operands directly will desync the use-chain.
    /// Prefer `replace_all_uses` or re-creating the operation.
    pub fn op_mut(&mut self, op: OpRef) -> &mut OperationData {
        &mut self.ops[op]
    }

    /// Get the operands of an operation as a slice.
    pub fn op_operands(&self, op: OpRef) -> &[ValueRef] {
        self.ops[op].operands.as_slice(&self.value_pool)
    }

    /// Get the result types of an operation as a slice.
    pub fn op_result_types(&self, op: OpRef) -> &[TypeRef] {
        self.ops[op].results.as_slice(&self.type_pool)
    }

    /// Get the i-th result value of an operation.
    pub fn op_result(&self, op: OpRef, index: u32) -> ValueRef {
        self.result_values[op].as_slice(&self.value_pool)[index as usize]
    }

    /// Get all result values of an operation.
    pub fn op_results(&self, op: OpRef) -> &[ValueRef] {
        self.result_values[op].as_slice(&self.value_pool)
    }

    /// Whether the operation was destroyed by `remove_op`.
    pub fn is_erased(&self, op: OpRef) -> bool {
        self.erased[op]
    }

    /// Remove an operation and everything nested in its regions, clearing
    /// their use-chain entries.
    ///
    /// Does NOT remove it from its parent block. Use `detach_op` first.
    ///
    /// # Panics
    ///
    /// Panics if the operation is still attached to a block, or if a result
    /// of the operation (or of a nested operation) is still used from
    /// outside the removed tree.
    pub fn remove_op(&mut self, op: OpRef) {
        assert!(
            self.ops[op].parent_block.is_none(),
            "remove_op: operation {op} is still attached to block {:?}; \
             call detach_op first",
            self.ops[op].parent_block,
        );

        let mut tree = Vec::new();
        self.collect_op_tree(op, &mut tree);

        // Drop operand uses of the whole tree first so that uses between
        // ops inside the tree don't trip the dangling-use check.
        for &o in &tree {
            let operands: SmallVec<[ValueRef; 8]> =
                self.ops[o].operands.as_slice(&self.value_pool).into();
            for (idx, &val) in operands.iter().enumerate() {
                self.uses[val].retain(|u| !(u.user == o && u.operand_index == idx as u32));
            }
        }

        for &o in &tree {
            let results: SmallVec<[ValueRef; 4]> =
                self.result_values[o].as_slice(&self.value_pool).into();
            for &val in &results {
                assert!(
                    self.uses[val].is_empty(),
                    "remove_op: result value {val} still has {} use(s); \
                     replace all uses before removing the operation",
                    self.uses[val].len()
                );
            }
            self.erased[o] = true;
        }
    }

    fn collect_op_tree(&self, op: OpRef, out: &mut Vec<OpRef>) {
        out.push(op);
        for &region in &self.ops[op].regions {
            for &block in &self.regions[region].blocks {
                for &nested in &self.blocks[block].ops {
                    self.collect_op_tree(nested, out);
                }
            }
        }
    }

    /// Detach an operation from its parent block, if any.
    pub fn detach_op(&mut self, op: OpRef) {
        if let Some(block) = self.ops[op].parent_block {
            self.remove_op_from_block(block, op);
        }
    }

    /// Get the operation owning the block that contains `op`.
    pub fn parent_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        let region = self.blocks[block].parent_region?;
        self.regions[region].parent_op
    }

    /// Check whether `ancestor` is `op` itself or transitively contains it.
    pub fn is_ancestor(&self, ancestor: OpRef, op: OpRef) -> bool {
        let mut current = Some(op);
        while let Some(o) = current {
            if o == ancestor {
                return true;
            }
            current = self.parent_op(o);
        }
        false
    }

    /// Find the closest enclosing operation (not `op` itself) matching `pred`.
    pub fn enclosing_op(&self, op: OpRef, pred: impl Fn(&OperationData) -> bool) -> Option<OpRef> {
        let mut current = self.parent_op(op);
        while let Some(o) = current {
            if pred(&self.ops[o]) {
                return Some(o);
            }
            current = self.parent_op(o);
        }
        None
    }

    /// The operation immediately preceding `op` in its block.
    pub fn prev_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        let ops = &self.blocks[block].ops;
        let pos = ops.iter().position(|&o| o == op)?;
        pos.checked_sub(1).map(|p| ops[p])
    }

    // ========================================================================
    // Value
    // ========================================================================

    /// Get the type of a value.
    pub fn value_ty(&self, v: ValueRef) -> TypeRef {
        self.values[v].ty
    }

    /// Get the definition of a value.
    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Create a new block and allocate argument values for it.
    pub fn create_block(&mut self, data: BlockData) -> BlockRef {
        let arg_types: Vec<TypeRef> = data.args.iter().map(|a| a.ty).collect();
        let ops: SmallVec<[OpRef; 4]> = data.ops.clone();
        let block = self.blocks.push(data);

        for &op in &ops {
            self.ops[op].parent_block = Some(block);
        }

        let mut arg_value_list = EntityList::new();
        for (idx, ty) in arg_types.into_iter().enumerate() {
            let v = self.values.push(ValueData {
                def: ValueDef::BlockArg(block, idx as u32),
                ty,
            });
            arg_value_list.push(v, &mut self.value_pool);
        }
        self.block_arg_values[block] = arg_value_list;

        block
    }

    /// Get immutable reference to block data.
    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    /// Get the i-th block argument value.
    pub fn block_arg(&self, b: BlockRef, index: u32) -> ValueRef {
        self.block_arg_values[b].as_slice(&self.value_pool)[index as usize]
    }

    /// Get all block argument values.
    pub fn block_args(&self, b: BlockRef) -> &[ValueRef] {
        self.block_arg_values[b].as_slice(&self.value_pool)
    }

    /// The last operation of a block, which is its terminator in valid IR.
    pub fn block_terminator(&self, b: BlockRef) -> Option<OpRef> {
        self.blocks[b].ops.last().copied()
    }

    /// Append an operation to the end of a block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block.
    pub fn push_op(&mut self, block: BlockRef, op: OpRef) {
        assert!(
            self.ops[op].parent_block.is_none(),
            "push_op: operation {op} already belongs to block {:?}; \
             remove it from the old block first",
            self.ops[op].parent_block,
        );
        self.ops[op].parent_block = Some(block);
        self.blocks[block].ops.push(op);
    }

    /// Insert an operation at `index` in the given block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block.
    pub fn insert_op_at(&mut self, block: BlockRef, index: usize, op: OpRef) {
        assert!(
            self.ops[op].parent_block.is_none(),
            "insert_op_at: operation {op} already belongs to block {:?}; \
             remove it from the old block first",
            self.ops[op].parent_block,
        );
        self.blocks[block].ops.insert(index, op);
        self.ops[op].parent_block = Some(block);
    }

    /// Insert an operation before `before` in the given block.
    ///
    /// # Panics
    ///
    /// Panics if the operation already belongs to a block, or if `before`
    /// is not found in the block.
    pub fn insert_op_before(&mut self, block: BlockRef, before: OpRef, op: OpRef) {
        let pos = self.blocks[block]
            .ops
            .iter()
            .position(|&o| o == before)
            .expect("insert_op_before: `before` op not found in block");
        self.insert_op_at(block, pos, op);
    }

    /// Move an attached or detached operation so it sits right before `before`.
    ///
    /// # Panics
    ///
    /// Panics if `before` is not attached to a block.
    pub fn move_op_before(&mut self, op: OpRef, before: OpRef) {
        let block = self.ops[before]
            .parent_block
            .expect("move_op_before: `before` op is not attached to a block");
        self.detach_op(op);
        self.insert_op_before(block, before, op);
    }

    /// Remove an operation from a block (does not destroy the operation).
    ///
    /// Only clears the operation's `parent_block` if it matches the given block.
    pub fn remove_op_from_block(&mut self, block: BlockRef, op: OpRef) {
        self.blocks[block].ops.retain(|o| *o != op);
        if self.ops[op].parent_block == Some(block) {
            self.ops[op].parent_block = None;
        }
    }

    // ========================================================================
    // Region
    // ========================================================================

    /// Create a new region.
    ///
    /// # Panics
    ///
    /// Panics if any block in `data.blocks` already belongs to another region.
    pub fn create_region(&mut self, data: RegionData) -> RegionRef {
        let region = self.regions.push(data);

        let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
        for &b in &blocks {
            if let Some(existing) = self.blocks[b].parent_region {
                panic!(
                    "create_region: block {b} already belongs to region {existing}; \
                     cannot reassign to {region}",
                );
            }
            self.blocks[b].parent_region = Some(region);
        }

        region
    }

    /// Get immutable reference to region data.
    pub fn region(&self, r: RegionRef) -> &RegionData {
        &self.regions[r]
    }

    /// First block of a region, if any.
    pub fn region_entry(&self, r: RegionRef) -> Option<BlockRef> {
        self.regions[r].blocks.first().copied()
    }

    // ========================================================================
    // Use-chain
    // ========================================================================

    /// Get all uses of a value.
    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    /// Check if a value has any uses.
    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }

    // ========================================================================
    // RAUW (Replace All Uses With)
    // ========================================================================

    /// Replace all uses of `old` with `new` in all operations.
    ///
    /// Updates both operand lists and the use-chain.
    pub fn replace_all_uses(&mut self, old: ValueRef, new: ValueRef) {
        if old == new {
            return;
        }
        let old_uses = std::mem::take(&mut self.uses[old]);

        for u in &old_uses {
            let operands = &mut self.ops[u.user].operands;
            let slice = operands.as_mut_slice(&mut self.value_pool);
            debug_assert_eq!(slice[u.operand_index as usize], old);
            slice[u.operand_index as usize] = new;

            self.uses[new].push(Use {
                user: u.user,
                operand_index: u.operand_index,
            });
        }
    }

    // ========================================================================
    // Cloning
    // ========================================================================

    /// Deep-clone an operation, including all nested regions.
    ///
    /// Operands found in `mapping` are remapped; all other operands are
    /// shared with the original. Every result and block argument of the
    /// clone is recorded in `mapping` so nested uses refer to the copy.
    /// The clone is detached.
    pub fn clone_op(&mut self, op: OpRef, mapping: &mut HashMap<ValueRef, ValueRef>) -> OpRef {
        let src = &self.ops[op];
        let location = src.location;
        let dialect = src.dialect;
        let name = src.name;
        let attributes = src.attributes.clone();
        let src_regions: SmallVec<[RegionRef; 4]> = src.regions.clone();
        let operands: Vec<ValueRef> = self
            .op_operands(op)
            .iter()
            .map(|v| *mapping.get(v).unwrap_or(v))
            .collect();
        let result_types: Vec<TypeRef> = self.op_result_types(op).to_vec();

        let regions: SmallVec<[RegionRef; 4]> = src_regions
            .iter()
            .map(|&r| self.clone_region(r, mapping))
            .collect();

        let mut builder = OperationDataBuilder::new(location, dialect, name)
            .operands(operands)
            .results(result_types);
        for (k, v) in attributes {
            builder = builder.attr(k, v);
        }
        for r in regions {
            builder = builder.region(r);
        }
        let data = builder.build(self);
        let new_op = self.create_op(data);

        let old_results: SmallVec<[ValueRef; 4]> = self.op_results(op).into();
        let new_results: SmallVec<[ValueRef; 4]> = self.op_results(new_op).into();
        for (old, new) in old_results.into_iter().zip(new_results) {
            mapping.insert(old, new);
        }
        new_op
    }

    fn clone_region(&mut self, region: RegionRef, mapping: &mut HashMap<ValueRef, ValueRef>) -> RegionRef {
        let location = self.regions[region].location;
        let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
        let mut new_blocks = SmallVec::new();
        for block in blocks {
            let data = BlockData {
                location: self.blocks[block].location,
                args: self.blocks[block].args.clone(),
                ops: SmallVec::new(),
                parent_region: None,
            };
            let new_block = self.create_block(data);
            let old_args: SmallVec<[ValueRef; 4]> = self.block_args(block).into();
            let new_args: SmallVec<[ValueRef; 4]> = self.block_args(new_block).into();
            for (old, new) in old_args.into_iter().zip(new_args) {
                mapping.insert(old, new);
            }
            let ops: SmallVec<[OpRef; 4]> = self.blocks[block].ops.clone();
            for op in ops {
                let cloned = self.clone_op(op, mapping);
                self.push_op(new_block, cloned);
            }
            new_blocks.push(new_block);
        }
        self.create_region(RegionData {
            location,
            blocks: new_blocks,
            parent_op: None,
        })
    }
}

impl Default for IrContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing `OperationData` with pool-backed lists.
///
/// Collects operands and result types into `Vec`s, then packs them
/// into `EntityList`s on `build()`.
pub struct OperationDataBuilder {
    location: Location,
    dialect: Symbol,
    name: Symbol,
    operands: Vec<ValueRef>,
    results: Vec<TypeRef>,
    attributes: BTreeMap<Symbol, Attribute>,
    regions: SmallVec<[RegionRef; 4]>,
}

impl OperationDataBuilder {
    pub fn new(location: Location, dialect: Symbol, name: Symbol) -> Self {
        Self {
            location,
            dialect,
            name,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: BTreeMap::new(),
            regions: SmallVec::new(),
        }
    }

    pub fn operand(mut self, v: ValueRef) -> Self {
        self.operands.push(v);
        self
    }

    pub fn operands(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.operands.extend(vs);
        self
    }

    pub fn result(mut self, ty: TypeRef) -> Self {
        self.results.push(ty);
        self
    }

    pub fn results(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.results.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attributes.insert(key.into(), val);
        self
    }

    pub fn region(mut self, r: RegionRef) -> Self {
        self.regions.push(r);
        self
    }

    /// Build the `OperationData`, packing vecs into `EntityList`s using
    /// the context's pools.
    pub fn build(self, ctx: &mut IrContext) -> OperationData {
        let mut operands = EntityList::new();
        for v in self.operands {
            operands.push(v, &mut ctx.value_pool);
        }
        let mut results = EntityList::new();
        for ty in self.results {
            results.push(ty, &mut ctx.type_pool);
        }
        OperationData {
            location: self.location,
            dialect: self.dialect,
            name: self.name,
            operands,
            results,
            attributes: self.attributes,
            regions: self.regions,
            parent_block: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn test_location(ctx: &mut IrContext) -> Location {
        let path = ctx.paths.intern("file:///kernel.mlir".to_owned());
        Location::new(path, Span::new(0, 0))
    }

    fn f32_type(ctx: &mut IrContext) -> TypeRef {
        ctx.types
            .intern(TypeDataBuilder::new(Symbol::new("core"), Symbol::new("f32")).build())
    }

    fn mk_op(ctx: &mut IrContext, loc: Location, name: &'static str, operands: &[ValueRef]) -> OpRef {
        let ty = f32_type(ctx);
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new(name))
            .operands(operands.iter().copied())
            .result(ty)
            .build(ctx);
        ctx.create_op(data)
    }

    fn wrap_in_region(ctx: &mut IrContext, loc: Location, ops: &[OpRef]) -> (RegionRef, BlockRef) {
        let block = ctx.create_block(BlockData::empty(loc));
        for &op in ops {
            ctx.push_op(block, op);
        }
        let region = ctx.create_region(RegionData {
            location: loc,
            blocks: smallvec![block],
            parent_op: None,
        });
        (region, block)
    }

    #[test]
    fn use_chain_tracking() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let op1 = mk_op(&mut ctx, loc, "a", &[]);
        let v1 = ctx.op_result(op1, 0);
        assert!(!ctx.has_uses(v1));

        let op2 = mk_op(&mut ctx, loc, "b", &[v1]);
        let uses = ctx.uses(v1);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].user, op2);
        assert_eq!(uses[0].operand_index, 0);
    }

    #[test]
    fn rauw() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let op1 = mk_op(&mut ctx, loc, "a", &[]);
        let v_old = ctx.op_result(op1, 0);
        let op2 = mk_op(&mut ctx, loc, "b", &[]);
        let v_new = ctx.op_result(op2, 0);
        let op3 = mk_op(&mut ctx, loc, "add", &[v_old, v_old]);

        ctx.replace_all_uses(v_old, v_new);

        assert!(!ctx.has_uses(v_old));
        assert_eq!(ctx.uses(v_new).len(), 2);
        assert_eq!(ctx.op_operands(op3), &[v_new, v_new]);
    }

    #[test]
    fn parent_and_ancestor_queries() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let inner = mk_op(&mut ctx, loc, "inner", &[]);
        let (region, _) = wrap_in_region(&mut ctx, loc, &[inner]);
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("outer"))
            .region(region)
            .build(&mut ctx);
        let outer = ctx.create_op(data);

        assert_eq!(ctx.parent_op(inner), Some(outer));
        assert!(ctx.is_ancestor(outer, inner));
        assert!(ctx.is_ancestor(outer, outer));
        assert!(!ctx.is_ancestor(inner, outer));
        assert_eq!(
            ctx.enclosing_op(inner, |d| d.is("test", "outer")),
            Some(outer)
        );
    }

    #[test]
    fn prev_op_and_move_before() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let a = mk_op(&mut ctx, loc, "a", &[]);
        let b = mk_op(&mut ctx, loc, "b", &[]);
        let c = mk_op(&mut ctx, loc, "c", &[]);
        let (_, block) = wrap_in_region(&mut ctx, loc, &[a, b, c]);

        assert_eq!(ctx.prev_op(a), None);
        assert_eq!(ctx.prev_op(c), Some(b));

        ctx.move_op_before(c, a);
        assert_eq!(ctx.block(block).ops.as_slice(), &[c, a, b]);
        assert_eq!(ctx.op(c).parent_block, Some(block));
    }

    #[test]
    fn clone_op_remaps_nested_uses() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let outer_val_op = mk_op(&mut ctx, loc, "x", &[]);
        let outer_val = ctx.op_result(outer_val_op, 0);

        let first = mk_op(&mut ctx, loc, "first", &[outer_val]);
        let first_val = ctx.op_result(first, 0);
        let second = mk_op(&mut ctx, loc, "second", &[first_val]);
        let (region, _) = wrap_in_region(&mut ctx, loc, &[first, second]);
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("wrapper"))
            .region(region)
            .build(&mut ctx);
        let wrapper = ctx.create_op(data);

        let mut mapping = HashMap::new();
        let copy = ctx.clone_op(wrapper, &mut mapping);

        let copy_block = ctx.region_entry(ctx.op(copy).regions[0]).unwrap();
        let copied_ops = ctx.block(copy_block).ops.to_vec();
        assert_eq!(copied_ops.len(), 2);
        assert_ne!(copied_ops[0], first);
        // Outer value is shared, inner value is remapped to the copy.
        assert_eq!(ctx.op_operands(copied_ops[0]), &[outer_val]);
        assert_eq!(
            ctx.op_operands(copied_ops[1]),
            &[ctx.op_result(copied_ops[0], 0)]
        );
        assert_eq!(ctx.uses(outer_val).len(), 2);
    }

    #[test]
    fn remove_op_drops_nested_uses() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let outer_val_op = mk_op(&mut ctx, loc, "x", &[]);
        let outer_val = ctx.op_result(outer_val_op, 0);
        let a = mk_op(&mut ctx, loc, "a", &[outer_val]);
        let a_val = ctx.op_result(a, 0);
        let b = mk_op(&mut ctx, loc, "b", &[a_val]);
        let (region, _) = wrap_in_region(&mut ctx, loc, &[a, b]);
        let data = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("wrapper"))
            .region(region)
            .build(&mut ctx);
        let wrapper = ctx.create_op(data);

        ctx.remove_op(wrapper);
        assert!(ctx.is_erased(wrapper));
        assert!(ctx.is_erased(a));
        assert!(ctx.is_erased(b));
        assert!(!ctx.has_uses(outer_val));
    }

    #[test]
    #[should_panic(expected = "still has")]
    fn remove_op_panics_when_result_has_uses() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);

        let op1 = mk_op(&mut ctx, loc, "a", &[]);
        let v1 = ctx.op_result(op1, 0);
        let _op2 = mk_op(&mut ctx, loc, "b", &[v1]);

        ctx.remove_op(op1);
    }

    #[test]
    #[should_panic(expected = "already belongs to operation")]
    fn create_op_panics_when_region_already_owned() {
        let mut ctx = IrContext::new();
        let loc = test_location(&mut ctx);
        let (region, _) = wrap_in_region(&mut ctx, loc, &[]);

        let data1 = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("a"))
            .region(region)
            .build(&mut ctx);
        let _op1 = ctx.create_op(data1);

        let data2 = OperationDataBuilder::new(loc, Symbol::new("test"), Symbol::new("b"))
            .region(region)
            .build(&mut ctx);
        ctx.create_op(data2);
    }

    #[test]
    fn entity_ref_display() {
        use cranelift_entity::EntityRef;

        assert_eq!(format!("{}", OpRef::new(0)), "op0");
        assert_eq!(format!("{}", ValueRef::new(5)), "v5");
        assert_eq!(format!("{}", BlockRef::new(2)), "block2");
        assert_eq!(format!("{}", RegionRef::new(1)), "region1");
    }
}
