//! Typed wrappers over arena operations.
//!
//! Provides the `DialectOp` trait and the `define_op!` macro used by the
//! dialect modules. Constructors and accessors are written per dialect.

use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;

/// Error when converting an `OpRef` to a dialect-specific wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// Operation name doesn't match expected dialect.operation.
    WrongOperation {
        expected: &'static str,
        actual: String,
    },
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversionError::WrongOperation { expected, actual } => {
                write!(f, "expected operation {expected}, found {actual}")
            }
        }
    }
}

impl std::error::Error for ConversionError {}

/// Trait for dialect operation wrappers.
pub trait DialectOp: Sized + Copy {
    const DIALECT_NAME: &'static str;
    const OP_NAME: &'static str;
    /// `dialect.op` spelled out, for diagnostics.
    const FULL_NAME: &'static str;

    #[doc(hidden)]
    fn wrap(op: OpRef) -> Self;

    fn op_ref(&self) -> OpRef;

    fn matches(ctx: &IrContext, op: OpRef) -> bool {
        ctx.op(op).is(Self::DIALECT_NAME, Self::OP_NAME)
    }

    fn from_op(ctx: &IrContext, op: OpRef) -> Result<Self, ConversionError> {
        if !Self::matches(ctx, op) {
            let data = ctx.op(op);
            return Err(ConversionError::WrongOperation {
                expected: Self::FULL_NAME,
                actual: format!("{}.{}", data.dialect, data.name),
            });
        }
        Ok(Self::wrap(op))
    }

    /// The dialect and operation name as interned symbols.
    fn kind() -> (Symbol, Symbol) {
        (Symbol::new(Self::DIALECT_NAME), Symbol::new(Self::OP_NAME))
    }
}

/// Define a wrapper struct for `dialect.op`.
///
/// ```
/// weft_ir::define_op!(
///     /// A test operation.
///     Probe, "test", "probe"
/// );
/// use weft_ir::DialectOp;
/// assert_eq!(Probe::FULL_NAME, "test.probe");
/// ```
#[macro_export]
macro_rules! define_op {
    ($(#[$meta:meta])* $name:ident, $dialect:literal, $op:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name($crate::OpRef);

        impl $crate::ops::DialectOp for $name {
            const DIALECT_NAME: &'static str = $dialect;
            const OP_NAME: &'static str = $op;
            const FULL_NAME: &'static str = concat!($dialect, ".", $op);

            fn wrap(op: $crate::OpRef) -> Self {
                Self(op)
            }

            fn op_ref(&self) -> $crate::OpRef {
                self.0
            }
        }

        impl $name {
            /// Get the underlying OpRef.
            pub fn op_ref(&self) -> $crate::OpRef {
                self.0
            }
        }
    };
}
