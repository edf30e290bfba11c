//! Operation interface system for querying operation properties.
//!
//! Dialects register the traits of their operations with `inventory`; the
//! registry is assembled lazily on first query. Unregistered operations
//! have no traits at all, which every query treats conservatively.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;

/// A memory side effect an operation may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryEffect {
    Read,
    Write,
    Allocate,
    Free,
}

/// Static properties of an operation kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpTraits {
    /// The operation ends a block.
    pub is_terminator: bool,
    /// The effects of the operation are the union of the effects of the
    /// operations nested in its regions.
    pub recursive_effects: bool,
    /// Declared memory effects. `None` means the operation does not expose
    /// a memory-effects interface (its effects are unknown).
    pub memory_effects: Option<&'static [MemoryEffect]>,
}

impl OpTraits {
    /// No interface at all: effects unknown.
    pub const UNKNOWN: OpTraits = OpTraits {
        is_terminator: false,
        recursive_effects: false,
        memory_effects: None,
    };

    /// Declares an empty effect list.
    pub const PURE: OpTraits = OpTraits {
        is_terminator: false,
        recursive_effects: false,
        memory_effects: Some(&[]),
    };

    /// A side-effect-free block terminator.
    pub const TERMINATOR: OpTraits = OpTraits {
        is_terminator: true,
        recursive_effects: false,
        memory_effects: Some(&[]),
    };

    /// Effects come from the nested regions.
    pub const RECURSIVE: OpTraits = OpTraits {
        is_terminator: false,
        recursive_effects: true,
        memory_effects: None,
    };

    pub const fn effects(effects: &'static [MemoryEffect]) -> OpTraits {
        OpTraits {
            is_terminator: false,
            recursive_effects: false,
            memory_effects: Some(effects),
        }
    }
}

/// Registration entry for operation traits.
///
/// Use `register_op_interface!` at the dialect definition site.
pub struct OpInterfaceRegistration {
    /// Dialect name (e.g., "arith", "omp")
    pub dialect: &'static str,
    /// Operation name within the dialect (e.g., "add", "parallel")
    pub op_name: &'static str,
    pub traits: OpTraits,
}

inventory::collect!(OpInterfaceRegistration);

/// Global registry, lazily built from inventory on first access.
static REGISTRY: LazyLock<HashMap<(Symbol, Symbol), OpTraits>> = LazyLock::new(|| {
    let mut registry = HashMap::new();
    for reg in inventory::iter::<OpInterfaceRegistration> {
        let dialect = Symbol::from_dynamic(reg.dialect);
        let op_name = Symbol::from_dynamic(reg.op_name);
        registry.insert((dialect, op_name), reg.traits);
    }
    registry
});

/// Interface for querying registered operation traits.
pub struct OpInterfaces;

impl OpInterfaces {
    /// Build a registration entry (internal use by macro).
    #[doc(hidden)]
    pub const fn register(
        dialect: &'static str,
        op_name: &'static str,
        traits: OpTraits,
    ) -> OpInterfaceRegistration {
        OpInterfaceRegistration {
            dialect,
            op_name,
            traits,
        }
    }

    /// Look up the traits registered for `dialect.op_name`.
    pub fn lookup(dialect: Symbol, op_name: Symbol) -> Option<OpTraits> {
        REGISTRY.get(&(dialect, op_name)).copied()
    }

    /// Traits of an operation, or `None` if its kind is unregistered.
    pub fn traits(ctx: &IrContext, op: OpRef) -> Option<OpTraits> {
        let data = ctx.op(op);
        Self::lookup(data.dialect, data.name)
    }

    pub fn is_terminator(ctx: &IrContext, op: OpRef) -> bool {
        Self::traits(ctx, op).is_some_and(|t| t.is_terminator)
    }

    pub fn has_recursive_effects(ctx: &IrContext, op: OpRef) -> bool {
        Self::traits(ctx, op).is_some_and(|t| t.recursive_effects)
    }

    /// Declared memory effects, or `None` if the operation exposes no
    /// memory-effects interface.
    pub fn memory_effects(ctx: &IrContext, op: OpRef) -> Option<&'static [MemoryEffect]> {
        Self::traits(ctx, op).and_then(|t| t.memory_effects)
    }
}

/// Register operation traits.
///
/// # Example
/// ```text
/// register_op_interface!("arith", "add", OpTraits::PURE);
/// register_op_interface!("mem", "load", OpTraits::effects(&[MemoryEffect::Read]));
/// ```
#[macro_export]
macro_rules! register_op_interface {
    ($dialect:literal, $op_name:literal, $traits:expr) => {
        $crate::inventory::submit! {
            $crate::op_interface::OpInterfaces::register($dialect, $op_name, $traits)
        }
    };
}
