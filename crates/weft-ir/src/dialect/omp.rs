//! omp dialect: parallel regions executed by a team of workers.

use crate::context::{IrContext, OperationDataBuilder};
use crate::op_interface::OpTraits;
use crate::refs::{BlockRef, RegionRef};
use crate::symbol::Symbol;
use crate::types::Location;

crate::symbols! {
    DIALECT_NAME => "omp",
}

crate::define_op!(
    /// `omp.parallel`: run the body on every worker, joining at the end.
    Parallel, "omp", "parallel"
);
crate::define_op!(
    /// `omp.barrier`: wait until every worker of the team arrives.
    Barrier, "omp", "barrier"
);
crate::define_op!(Terminator, "omp", "terminator");

crate::register_op_interface!("omp", "parallel", OpTraits::RECURSIVE);
crate::register_op_interface!("omp", "barrier", OpTraits::UNKNOWN);
crate::register_op_interface!("omp", "terminator", OpTraits::TERMINATOR);

pub fn parallel(ctx: &mut IrContext, location: Location, body: RegionRef) -> Parallel {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("parallel"))
        .region(body)
        .build(ctx);
    Parallel(ctx.create_op(data))
}

impl Parallel {
    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn body_block(&self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.body(ctx)).blocks[0]
    }
}

pub fn barrier(ctx: &mut IrContext, location: Location) -> Barrier {
    let data = OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("barrier")).build(ctx);
    Barrier(ctx.create_op(data))
}

pub fn terminator(ctx: &mut IrContext, location: Location) -> Terminator {
    let data =
        OperationDataBuilder::new(location, DIALECT_NAME(), Symbol::new("terminator")).build(ctx);
    Terminator(ctx.create_op(data))
}
