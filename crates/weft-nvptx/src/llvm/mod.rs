//! Lowered, LLVM-style IR: model, text format, verifier and linker.

mod linker;
mod module;
mod parser;
mod printer;
mod verify;

pub use linker::{LinkError, link_modules};
pub use module::{
    BasicBlock, BinaryOp, CastOp, FloatPredicate, Function, InstKind, Instruction, IntPredicate,
    Linkage, LlvmModule, MetadataDef, MetadataId, MetadataNode, MetadataOperand, NVVM_ANNOTATIONS,
    NamedMetadata, Operand, Param, Ty,
};
pub use parser::{ParseError, parse_module};
pub use verify::{VerifyError, verify_module};
