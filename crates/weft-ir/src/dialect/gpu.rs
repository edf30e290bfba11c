//! gpu dialect: device modules, thread indexing and block-level barriers.

use crate::context::{IrContext, OperationDataBuilder};
use crate::op_interface::OpTraits;
use crate::refs::{BlockRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location};

crate::symbols! {
    DIALECT_NAME => "gpu",
    ATTR_SYM_NAME => "sym_name",
    ATTR_DIMENSION => "dimension",
    /// Unit attribute marking a `func.func` as a device entry point.
    ATTR_KERNEL => "gpu.kernel",
    /// Bytes attribute holding the assembled device binary.
    ATTR_BINARY => "gpu.binary",
}

crate::define_op!(
    /// `gpu.module`: container for device code compiled as one unit.
    Module, "gpu", "module"
);
crate::define_op!(ThreadId, "gpu", "thread_id");
crate::define_op!(BlockId, "gpu", "block_id");
crate::define_op!(BlockDim, "gpu", "block_dim");
crate::define_op!(Barrier, "gpu", "barrier");

crate::register_op_interface!("gpu", "thread_id", OpTraits::PURE);
crate::register_op_interface!("gpu", "block_id", OpTraits::PURE);
crate::register_op_interface!("gpu", "block_dim", OpTraits::PURE);
crate::register_op_interface!("gpu", "barrier", OpTraits::UNKNOWN);

/// One of the three launch-grid axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dimension {
    X,
    Y,
    Z,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::X => "x",
            Dimension::Y => "y",
            Dimension::Z => "z",
        }
    }

    pub fn from_symbol(sym: Symbol) -> Option<Self> {
        sym.with_str(|s| match s {
            "x" => Some(Dimension::X),
            "y" => Some(Dimension::Y),
            "z" => Some(Dimension::Z),
            _ => None,
        })
    }
}

pub fn module(ctx: &mut IrContext, location: Location, name: Symbol, body: RegionRef) -> Module {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("module"))
        .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
        .region(body)
        .build(ctx);
    Module(ctx.create_op(data))
}

impl Module {
    pub fn sym_name(&self, ctx: &IrContext) -> Symbol {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_SYM_NAME())
            .and_then(Attribute::as_symbol)
            .expect("gpu.module without sym_name")
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn body_block(&self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.body(ctx)).blocks[0]
    }

    /// The serialized device binary, once attached.
    pub fn binary<'a>(&self, ctx: &'a IrContext) -> Option<&'a [u8]> {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_BINARY())
            .and_then(Attribute::as_bytes)
    }

    pub fn set_binary(&self, ctx: &mut IrContext, blob: Vec<u8>) {
        ctx.op_mut(self.0)
            .attributes
            .insert(ATTR_BINARY(), Attribute::from(blob));
    }
}

fn index_op(
    ctx: &mut IrContext,
    location: Location,
    name: &'static str,
    dim: Dimension,
    ty: TypeRef,
) -> crate::OpRef {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new(name))
        .attr(ATTR_DIMENSION(), Attribute::Symbol(Symbol::new(dim.as_str())))
        .result(ty)
        .build(ctx);
    ctx.create_op(data)
}

fn dimension_of(ctx: &IrContext, op: crate::OpRef) -> Dimension {
    ctx.op(op)
        .attributes
        .get(&ATTR_DIMENSION())
        .and_then(Attribute::as_symbol)
        .and_then(Dimension::from_symbol)
        .expect("missing attribute: dimension")
}

pub fn thread_id(ctx: &mut IrContext, location: Location, dim: Dimension, ty: TypeRef) -> ThreadId {
    ThreadId(index_op(ctx, location, "thread_id", dim, ty))
}

pub fn block_id(ctx: &mut IrContext, location: Location, dim: Dimension, ty: TypeRef) -> BlockId {
    BlockId(index_op(ctx, location, "block_id", dim, ty))
}

pub fn block_dim(ctx: &mut IrContext, location: Location, dim: Dimension, ty: TypeRef) -> BlockDim {
    BlockDim(index_op(ctx, location, "block_dim", dim, ty))
}

impl ThreadId {
    pub fn dimension(&self, ctx: &IrContext) -> Dimension {
        dimension_of(ctx, self.0)
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl BlockId {
    pub fn dimension(&self, ctx: &IrContext) -> Dimension {
        dimension_of(ctx, self.0)
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl BlockDim {
    pub fn dimension(&self, ctx: &IrContext) -> Dimension {
        dimension_of(ctx, self.0)
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

pub fn barrier(ctx: &mut IrContext, location: Location) -> Barrier {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("barrier")).build(ctx);
    Barrier(ctx.create_op(data))
}
