//! mem dialect: stack allocation, loads, stores and pointer offsets.

use crate::context::{IrContext, OperationDataBuilder};
use crate::op_interface::{MemoryEffect, OpTraits};
use crate::refs::{TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location};

crate::symbols! {
    DIALECT_NAME => "mem",
    ATTR_ELEM_TYPE => "elem_type",
}

crate::define_op!(
    /// `mem.alloca`: reserve stack storage for one `elem_type`.
    Alloca, "mem", "alloca"
);
crate::define_op!(Load, "mem", "load");
crate::define_op!(Store, "mem", "store");
crate::define_op!(
    /// `mem.offset`: address of element `index` counted in `elem_type` units.
    Offset, "mem", "offset"
);

crate::register_op_interface!("mem", "alloca", OpTraits::effects(&[MemoryEffect::Allocate]));
crate::register_op_interface!("mem", "load", OpTraits::effects(&[MemoryEffect::Read]));
crate::register_op_interface!("mem", "store", OpTraits::effects(&[MemoryEffect::Write]));
crate::register_op_interface!("mem", "offset", OpTraits::PURE);

fn elem_type_of(ctx: &IrContext, op: crate::OpRef) -> TypeRef {
    ctx.op(op)
        .attributes
        .get(&ATTR_ELEM_TYPE())
        .and_then(Attribute::as_type)
        .expect("missing attribute: elem_type")
}

pub fn alloca(ctx: &mut IrContext, location: Location, elem_type: TypeRef, ptr_ty: TypeRef) -> Alloca {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("alloca"))
        .result(ptr_ty)
        .attr(ATTR_ELEM_TYPE(), Attribute::Type(elem_type))
        .build(ctx);
    Alloca(ctx.create_op(data))
}

impl Alloca {
    pub fn elem_type(&self, ctx: &IrContext) -> TypeRef {
        elem_type_of(ctx, self.0)
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

pub fn load(ctx: &mut IrContext, location: Location, ptr: ValueRef, ty: TypeRef) -> Load {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("load"))
        .operand(ptr)
        .result(ty)
        .build(ctx);
    Load(ctx.create_op(data))
}

impl Load {
    pub fn ptr(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

pub fn store(ctx: &mut IrContext, location: Location, value: ValueRef, ptr: ValueRef) -> Store {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("store"))
        .operand(value)
        .operand(ptr)
        .build(ctx);
    Store(ctx.create_op(data))
}

impl Store {
    pub fn value(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn ptr(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[1]
    }
}

pub fn offset(
    ctx: &mut IrContext,
    location: Location,
    base: ValueRef,
    index: ValueRef,
    elem_type: TypeRef,
    ptr_ty: TypeRef,
) -> Offset {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("offset"))
        .operand(base)
        .operand(index)
        .result(ptr_ty)
        .attr(ATTR_ELEM_TYPE(), Attribute::Type(elem_type))
        .build(ctx);
    Offset(ctx.create_op(data))
}

impl Offset {
    pub fn base(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn index(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[1]
    }

    pub fn elem_type(&self, ctx: &IrContext) -> TypeRef {
        elem_type_of(ctx, self.0)
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}
