//! Text format printer for arena IR.
//!
//! Every operation is printed in one generic form; operations carrying a
//! `sym_name` symbol show it right after the operation name:
//!
//! ```text
//! gpu.module @kernels {
//!   func.func @scale {gpu.kernel = unit, type = func.fn(core.nil, core.ptr)} {
//!     ^bb0(%0: core.ptr):
//!       %1 = mem.load %0 : core.f32
//!       func.return
//!   }
//! }
//! ```
//!
//! Attribute dictionaries are sorted by key so output is independent of
//! symbol interning order. The output is accepted by `parser::parse_module`.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use crate::context::IrContext;
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

/// Print state for value numbering.
struct PrintState<'a> {
    ctx: &'a IrContext,
    value_names: HashMap<ValueRef, String>,
    next_value_num: usize,
    next_block_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(ctx: &'a IrContext) -> Self {
        Self {
            ctx,
            value_names: HashMap::new(),
            next_value_num: 0,
            next_block_num: 0,
        }
    }

    fn assign_value_name(&mut self, v: ValueRef) -> String {
        let name = format!("%{}", self.next_value_num);
        self.next_value_num += 1;
        self.value_names.insert(v, name.clone());
        name
    }

    fn get_value_name(&self, v: ValueRef) -> &str {
        self.value_names.get(&v).map(|s| s.as_str()).unwrap_or("%?")
    }

    fn next_block_label(&mut self) -> String {
        let label = format!("^bb{}", self.next_block_num);
        self.next_block_num += 1;
        label
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print an operation (and everything nested in it) as IR text.
pub fn print_op(ctx: &IrContext, op: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_operation(&mut state, &mut out, op, 0).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Type printing
// ============================================================================

fn write_type(ctx: &IrContext, f: &mut impl Write, ty: TypeRef) -> fmt::Result {
    let data = ctx.types.get(ty);
    write!(f, "{}.{}", data.dialect, data.name)?;
    if !data.params.is_empty() {
        f.write_char('(')?;
        for (i, &param) in data.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(ctx, f, param)?;
        }
        f.write_char(')')?;
    } else if !data.attrs.is_empty() {
        // Empty parens signal that attrs follow
        f.write_str("()")?;
    }
    if !data.attrs.is_empty() {
        write_attr_dict(ctx, f, data.attrs.iter())?;
    }
    Ok(())
}

// ============================================================================
// Attribute printing
// ============================================================================

fn write_attr_dict<'a>(
    ctx: &IrContext,
    f: &mut impl Write,
    attrs: impl Iterator<Item = (&'a Symbol, &'a Attribute)>,
) -> fmt::Result {
    let mut sorted: Vec<(String, &Attribute)> = attrs.map(|(k, v)| (k.to_string(), v)).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    f.write_str(" {")?;
    for (i, (key, val)) in sorted.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key} = ")?;
        write_attribute(ctx, f, val)?;
    }
    f.write_char('}')
}

fn write_attribute(ctx: &IrContext, f: &mut impl Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Unit => f.write_str("unit"),
        Attribute::Bool(b) => write!(f, "{b}"),
        Attribute::IntBits(v) => write!(f, "{v}"),
        Attribute::FloatBits(bits) => {
            let v = f64::from_bits(*bits);
            let s = format!("{v}");
            f.write_str(&s)?;
            // Ensure decimal point for finite whole numbers (don't corrupt inf/NaN)
            if v.is_finite() && !s.contains('.') && !s.contains('e') && !s.contains('E') {
                f.write_str(".0")?;
            }
            Ok(())
        }
        Attribute::String(s) => {
            f.write_char('"')?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        }
        Attribute::Bytes(bytes) => {
            f.write_str("bytes(")?;
            for (i, b) in bytes.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{b}")?;
            }
            f.write_char(')')
        }
        Attribute::Symbol(sym) => write_symbol(f, *sym),
        Attribute::Type(ty) => write_type(ctx, f, *ty),
        Attribute::List(list) => {
            f.write_char('[')?;
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_attribute(ctx, f, item)?;
            }
            f.write_char(']')
        }
        Attribute::Location(loc) => {
            let path_str = ctx.paths.get(loc.path);
            f.write_str("loc(\"")?;
            write_escaped_string(f, path_str)?;
            write!(f, "\" {}:{})", loc.span.start, loc.span.end)
        }
    }
}

fn write_escaped_string(f: &mut impl Write, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\0' => f.write_str("\\0")?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_symbol(f: &mut impl Write, sym: Symbol) -> fmt::Result {
    sym.with_str(|s| {
        let needs_quoting = s.is_empty() || !s.chars().all(|c| c.is_alphanumeric() || c == '_');
        if needs_quoting {
            f.write_str("@\"")?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        } else {
            write!(f, "@{s}")
        }
    })
}

// ============================================================================
// Operation printing
// ============================================================================

fn print_operation(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let ctx = state.ctx;
    let indent_str = " ".repeat(indent);
    write!(f, "{indent_str}")?;

    // Results
    let results = ctx.op_results(op);
    if !results.is_empty() {
        for (i, &v) in results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let name = state.assign_value_name(v);
            f.write_str(&name)?;
        }
        f.write_str(" = ")?;
    }

    let data = ctx.op(op);
    write!(f, "{}.{}", data.dialect, data.name)?;

    // Symbol name sugar
    let sym_key = Symbol::new("sym_name");
    let sym_name = data.attributes.get(&sym_key).and_then(Attribute::as_symbol);
    if let Some(name) = sym_name {
        f.write_char(' ')?;
        write_symbol(f, name)?;
    }

    // Operands
    let operands = ctx.op_operands(op);
    if !operands.is_empty() {
        f.write_char(' ')?;
        for (i, &v) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.get_value_name(v))?;
        }
    }

    // Attributes
    let mut attrs = data
        .attributes
        .iter()
        .filter(|(k, _)| sym_name.is_none() || **k != sym_key)
        .peekable();
    if attrs.peek().is_some() {
        write_attr_dict(ctx, f, attrs)?;
    }

    // Result types
    let result_types = ctx.op_result_types(op);
    if !result_types.is_empty() {
        f.write_str(" : ")?;
        for (i, &ty) in result_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write_type(ctx, f, ty)?;
        }
    }

    // Regions
    for &region in data.regions.iter() {
        f.write_str(" {\n")?;
        print_region(state, f, region, indent)?;
        write!(f, "{indent_str}}}")?;
    }

    f.write_char('\n')
}

// ============================================================================
// Region / Block printing
// ============================================================================

fn print_region(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    region: RegionRef,
    indent: usize,
) -> fmt::Result {
    let ctx = state.ctx;
    let blocks = &ctx.region(region).blocks;

    let can_elide_label = blocks.len() == 1 && ctx.block_args(blocks[0]).is_empty();
    let op_indent = if can_elide_label { indent + 2 } else { indent + 4 };

    for &block in blocks {
        if !can_elide_label {
            let label = state.next_block_label();
            write!(f, "{}{label}", " ".repeat(indent + 2))?;
            let args = ctx.block_args(block);
            if !args.is_empty() {
                f.write_char('(')?;
                for (j, &arg) in args.iter().enumerate() {
                    if j > 0 {
                        f.write_str(", ")?;
                    }
                    let arg_name = state.assign_value_name(arg);
                    write!(f, "{arg_name}: ")?;
                    write_type(ctx, f, ctx.value_ty(arg))?;
                }
                f.write_char(')')?;
            }
            f.write_str(":\n")?;
        }

        for &op in ctx.block(block).ops.iter() {
            print_operation(state, f, op, op_indent)?;
        }
    }

    Ok(())
}
