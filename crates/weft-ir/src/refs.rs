//! Handles into [`IrContext`](crate::IrContext) storage.
//!
//! A handle is only meaningful for the context that issued it. Handles of
//! erased operations stay valid for lookups; see
//! [`IrContext::is_erased`](crate::IrContext::is_erased).

use std::fmt;

use cranelift_entity::entity_impl;

/// An operation: `omp.parallel`, `func.func`, `gpu.module`, ...
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpRef(u32);
entity_impl!(OpRef, "op");

/// An SSA value, defined by exactly one [`ValueDef`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(u32);
entity_impl!(ValueRef, "v");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "block");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionRef(u32);
entity_impl!(RegionRef, "region");

/// A hash-consed type. Equal handles mean structurally equal types.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(u32);
entity_impl!(TypeRef, "ty");

/// A source file path shared by many [`Location`](crate::Location)s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathRef(u32);
entity_impl!(PathRef, "path");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// The `n`th result of an operation.
    OpResult(OpRef, u32),
    /// The `n`th argument of a block, such as a loop induction variable.
    BlockArg(BlockRef, u32),
}

impl fmt::Display for ValueDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDef::OpResult(op, n) => write!(f, "result {n} of {op}"),
            ValueDef::BlockArg(block, n) => write!(f, "argument {n} of {block}"),
        }
    }
}
