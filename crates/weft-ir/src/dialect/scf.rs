//! scf dialect: structured loops and conditionals.

use crate::context::{IrContext, OperationDataBuilder};
use crate::op_interface::OpTraits;
use crate::refs::{BlockRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Location;

crate::symbols! {
    DIALECT_NAME => "scf",
}

crate::define_op!(
    /// `scf.for`: counted loop `lower..upper` by `step`. The body block takes
    /// the induction variable followed by the loop-carried values.
    For, "scf", "for"
);
crate::define_op!(
    /// `scf.if`: two-way conditional with `then` and `else` regions.
    If, "scf", "if"
);
crate::define_op!(Yield, "scf", "yield");

crate::register_op_interface!("scf", "for", OpTraits::RECURSIVE);
crate::register_op_interface!("scf", "if", OpTraits::RECURSIVE);
crate::register_op_interface!("scf", "yield", OpTraits::TERMINATOR);

pub fn r#for(
    ctx: &mut IrContext,
    location: Location,
    lower: ValueRef,
    upper: ValueRef,
    step: ValueRef,
    init: impl IntoIterator<Item = ValueRef>,
    body: RegionRef,
) -> For {
    let init: Vec<ValueRef> = init.into_iter().collect();
    let result_types: Vec<TypeRef> = init.iter().map(|&v| ctx.value_ty(v)).collect();
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("for"))
        .operand(lower)
        .operand(upper)
        .operand(step)
        .operands(init)
        .results(result_types)
        .region(body)
        .build(ctx);
    For(ctx.create_op(data))
}

impl For {
    pub fn lower(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn upper(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[1]
    }

    pub fn step(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[2]
    }

    pub fn init<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        &ctx.op_operands(self.0)[3..]
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn body_block(&self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.body(ctx)).blocks[0]
    }

    pub fn induction_var(&self, ctx: &IrContext) -> ValueRef {
        ctx.block_arg(self.body_block(ctx), 0)
    }
}

pub fn r#if(
    ctx: &mut IrContext,
    location: Location,
    cond: ValueRef,
    results: impl IntoIterator<Item = TypeRef>,
    then_region: RegionRef,
    else_region: RegionRef,
) -> If {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("if"))
        .operand(cond)
        .results(results)
        .region(then_region)
        .region(else_region)
        .build(ctx);
    If(ctx.create_op(data))
}

impl If {
    pub fn cond(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn then_region(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn else_region(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[1]
    }

    pub fn then_block(&self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.then_region(ctx)).blocks[0]
    }
}

pub fn r#yield(
    ctx: &mut IrContext,
    location: Location,
    values: impl IntoIterator<Item = ValueRef>,
) -> Yield {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("yield"))
        .operands(values)
        .build(ctx);
    Yield(ctx.create_op(data))
}

impl Yield {
    pub fn values<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        ctx.op_operands(self.0)
    }
}
