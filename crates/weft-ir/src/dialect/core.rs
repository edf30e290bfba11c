//! Core dialect operations and types.
//!
//! Types:
//! - `core.i{bits}` - integer type (`core.i1`, `core.i32`, `core.i64`)
//! - `core.f{bits}` - floating-point type (`core.f32`, `core.f64`)
//! - `core.ptr` - raw pointer type
//! - `core.nil` - unit type

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{BlockRef, RegionRef, TypeRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location, TypeDataBuilder};

crate::symbols! {
    DIALECT_NAME => "core",
    ATTR_SYM_NAME => "sym_name",
}

crate::define_op!(
    /// `core.module` operation: top-level module container.
    Module, "core", "module"
);

pub fn module(ctx: &mut IrContext, location: Location, name: Symbol, body: RegionRef) -> Module {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("module"))
        .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
        .region(body)
        .build(ctx);
    Module(ctx.create_op(data))
}

impl Module {
    pub fn sym_name(&self, ctx: &IrContext) -> Option<Symbol> {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_SYM_NAME())
            .and_then(Attribute::as_symbol)
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    /// The module's single block.
    pub fn body_block(&self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.body(ctx)).blocks[0]
    }
}

fn scalar(ctx: &mut IrContext, name: &'static str) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(DIALECT_NAME(), Symbol::new(name)).build())
}

pub fn i1(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "i1")
}

pub fn i32(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "i32")
}

pub fn i64(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "i64")
}

pub fn f32(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "f32")
}

pub fn f64(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "f64")
}

pub fn ptr(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "ptr")
}

pub fn nil(ctx: &mut IrContext) -> TypeRef {
    scalar(ctx, "nil")
}

/// Bit width of a `core` integer type, if `ty` is one.
pub fn int_width(ctx: &IrContext, ty: TypeRef) -> Option<u32> {
    let data = ctx.types.get(ty);
    if data.dialect != DIALECT_NAME() {
        return None;
    }
    data.name.with_str(|s| match s {
        "i1" => Some(1),
        "i32" => Some(32),
        "i64" => Some(64),
        _ => None,
    })
}

/// Bit width of a `core` float type, if `ty` is one.
pub fn float_width(ctx: &IrContext, ty: TypeRef) -> Option<u32> {
    let data = ctx.types.get(ty);
    if data.dialect != DIALECT_NAME() {
        return None;
    }
    data.name.with_str(|s| match s {
        "f32" => Some(32),
        "f64" => Some(64),
        _ => None,
    })
}
