//! func dialect: functions, calls and returns.
//!
//! A function type is `func.fn(ret, params...)`. Device entry points carry
//! the unit attribute `gpu.kernel`.

use crate::context::{IrContext, OperationDataBuilder};
use crate::op_interface::OpTraits;
use crate::refs::{BlockRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location, TypeDataBuilder};

crate::symbols! {
    DIALECT_NAME => "func",
    ATTR_SYM_NAME => "sym_name",
    ATTR_TYPE => "type",
    ATTR_CALLEE => "callee",
}

crate::define_op!(Func, "func", "func");
crate::define_op!(Call, "func", "call");
crate::define_op!(Return, "func", "return");

crate::register_op_interface!("func", "return", OpTraits::TERMINATOR);

/// Intern `func.fn(ret, params...)`.
pub fn fn_type(ctx: &mut IrContext, ret: TypeRef, params: &[TypeRef]) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(DIALECT_NAME(), Symbol::new("fn"))
            .param(ret)
            .params(params.iter().copied())
            .build(),
    )
}

/// Return type of a function type.
pub fn fn_type_result(ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
    if !ctx.types.is_dialect(ty, "func", "fn") {
        return None;
    }
    ctx.types.get(ty).params.first().copied()
}

/// Parameter types of a function type.
pub fn fn_type_params(ctx: &IrContext, ty: TypeRef) -> &[TypeRef] {
    if !ctx.types.is_dialect(ty, "func", "fn") {
        return &[];
    }
    ctx.types.get(ty).params.get(1..).unwrap_or(&[])
}

pub fn func(
    ctx: &mut IrContext,
    location: Location,
    name: Symbol,
    ty: TypeRef,
    body: RegionRef,
) -> Func {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("func"))
        .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
        .attr(ATTR_TYPE(), Attribute::Type(ty))
        .region(body)
        .build(ctx);
    Func(ctx.create_op(data))
}

impl Func {
    pub fn sym_name(&self, ctx: &IrContext) -> Symbol {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_SYM_NAME())
            .and_then(Attribute::as_symbol)
            .expect("func.func without sym_name")
    }

    pub fn fn_type(&self, ctx: &IrContext) -> TypeRef {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_TYPE())
            .and_then(Attribute::as_type)
            .expect("func.func without type")
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn entry_block(&self, ctx: &IrContext) -> Option<BlockRef> {
        ctx.region_entry(self.body(ctx))
    }

    /// A function without blocks is a declaration.
    pub fn is_declaration(&self, ctx: &IrContext) -> bool {
        ctx.region(self.body(ctx)).blocks.is_empty()
    }

    pub fn is_kernel(&self, ctx: &IrContext) -> bool {
        ctx.op(self.0)
            .attributes
            .contains_key(&super::gpu::ATTR_KERNEL())
    }

    pub fn mark_kernel(&self, ctx: &mut IrContext) {
        ctx.op_mut(self.0)
            .attributes
            .insert(super::gpu::ATTR_KERNEL(), Attribute::Unit);
    }
}

pub fn call(
    ctx: &mut IrContext,
    location: Location,
    args: impl IntoIterator<Item = ValueRef>,
    results: impl IntoIterator<Item = TypeRef>,
    callee: Symbol,
) -> Call {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("call"))
        .operands(args)
        .results(results)
        .attr(ATTR_CALLEE(), Attribute::Symbol(callee))
        .build(ctx);
    Call(ctx.create_op(data))
}

impl Call {
    pub fn callee(&self, ctx: &IrContext) -> Symbol {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_CALLEE())
            .and_then(Attribute::as_symbol)
            .expect("func.call without callee")
    }

    pub fn args<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        ctx.op_operands(self.0)
    }

    pub fn results<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        ctx.op_results(self.0)
    }
}

pub fn r#return(
    ctx: &mut IrContext,
    location: Location,
    values: impl IntoIterator<Item = ValueRef>,
) -> Return {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("return"))
        .operands(values)
        .build(ctx);
    Return(ctx.create_op(data))
}

impl Return {
    pub fn values<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        ctx.op_operands(self.0)
    }
}
