//! arith dialect: constants and scalar arithmetic. Every operation is pure.

use crate::context::{IrContext, OperationDataBuilder};
use crate::op_interface::OpTraits;
use crate::refs::{TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location};

crate::symbols! {
    DIALECT_NAME => "arith",
    ATTR_VALUE => "value",
}

crate::define_op!(Const, "arith", "const");

crate::register_op_interface!("arith", "const", OpTraits::PURE);

pub fn r#const(ctx: &mut IrContext, location: Location, ty: TypeRef, value: Attribute) -> Const {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("const"))
        .result(ty)
        .attr(ATTR_VALUE(), value)
        .build(ctx);
    Const(ctx.create_op(data))
}

impl Const {
    pub fn value(&self, ctx: &IrContext) -> Attribute {
        ctx.op(self.0)
            .attributes
            .get(&ATTR_VALUE())
            .cloned()
            .expect("missing attribute: value")
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

/// Two operands, one result.
macro_rules! binary_ops {
    ($($name:ident, $ctor:ident, $op:literal;)*) => {
        $(
            crate::define_op!($name, "arith", $op);

            crate::register_op_interface!("arith", $op, OpTraits::PURE);

            pub fn $ctor(
                ctx: &mut IrContext,
                location: Location,
                lhs: ValueRef,
                rhs: ValueRef,
                ty: TypeRef,
            ) -> $name {
                let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new($op))
                    .operand(lhs)
                    .operand(rhs)
                    .result(ty)
                    .build(ctx);
                $name(ctx.create_op(data))
            }

            impl $name {
                pub fn lhs(&self, ctx: &IrContext) -> ValueRef {
                    ctx.op_operands(self.0)[0]
                }

                pub fn rhs(&self, ctx: &IrContext) -> ValueRef {
                    ctx.op_operands(self.0)[1]
                }

                pub fn result(&self, ctx: &IrContext) -> ValueRef {
                    ctx.op_result(self.0, 0)
                }
            }
        )*
    };
}

binary_ops! {
    Add, add, "add";
    Sub, sub, "sub";
    Mul, mul, "mul";
    Div, div, "div";
    Rem, rem, "rem";
    CmpEq, cmp_eq, "cmp_eq";
    CmpNe, cmp_ne, "cmp_ne";
    CmpLt, cmp_lt, "cmp_lt";
    CmpLe, cmp_le, "cmp_le";
    CmpGt, cmp_gt, "cmp_gt";
    CmpGe, cmp_ge, "cmp_ge";
    Powi, powi, "powi";
}
