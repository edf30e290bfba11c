//! Text format parser for arena IR.
//!
//! Parses the output of `printer::print_op` back into an `IrContext`.
//! Parsing happens in two stages: winnow combinators produce `Raw*`
//! structures, then a builder resolves value names and creates the entities.

use std::collections::HashMap;

use smallvec::SmallVec;
use winnow::ascii;
use winnow::combinator::{alt, delimited, opt, preceded, separated};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

use crate::context::{BlockArgData, BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::refs::{OpRef, PathRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::{Attribute, Location, Span, TypeDataBuilder};

// ============================================================================
// Error type
// ============================================================================

/// Parse error for IR text format.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at offset {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ParseError {}

// ============================================================================
// Raw (unresolved) structures
// ============================================================================

#[derive(Debug, Clone)]
struct RawOperation<'a> {
    results: Vec<&'a str>,
    dialect: &'a str,
    op_name: &'a str,
    sym_name: Option<String>,
    operands: Vec<&'a str>,
    attributes: Vec<(&'a str, RawAttribute<'a>)>,
    result_types: Vec<RawType<'a>>,
    regions: Vec<RawRegion<'a>>,
    /// Remaining input length where the operation starts and ends.
    start_rest: usize,
    end_rest: usize,
}

#[derive(Debug, Clone)]
struct RawRegion<'a> {
    blocks: Vec<RawBlock<'a>>,
}

#[derive(Debug, Clone)]
struct RawBlock<'a> {
    args: Vec<(&'a str, RawType<'a>)>,
    ops: Vec<RawOperation<'a>>,
}

#[derive(Debug, Clone)]
struct RawType<'a> {
    dialect: &'a str,
    name: &'a str,
    params: Vec<RawType<'a>>,
    attrs: Vec<(&'a str, RawAttribute<'a>)>,
}

#[derive(Debug, Clone)]
enum RawAttribute<'a> {
    Bool(bool),
    Int(u64),
    Float(f64),
    String(String),
    Symbol(String),
    Type(RawType<'a>),
    List(Vec<RawAttribute<'a>>),
    Unit,
    Location(String, usize, usize),
    Bytes(Vec<u8>),
}

// ============================================================================
// Winnow parsers
// ============================================================================

/// Skip whitespace, including newlines.
fn ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c.is_ascii_whitespace())
        .void()
        .parse_next(input)
}

/// Skip spaces and tabs. Operations never span lines.
fn hs(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)
}

/// Parse an identifier: [a-zA-Z_][a-zA-Z0-9_]*
fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Parse an attribute key, which may be dotted: `gpu.kernel`
fn attr_key<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    )
        .take()
        .parse_next(input)
}

/// Parse a value reference: %name or %number
fn value_ref<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '%',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

/// Parse a symbol reference: @name or @"quoted name"
fn symbol_ref(input: &mut &str) -> ModalResult<String> {
    '@'.parse_next(input)?;
    if input.starts_with('"') {
        string_lit.parse_next(input)
    } else {
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_')
            .map(|s: &str| s.to_owned())
            .parse_next(input)
    }
}

/// Parse a block label: ^bbN or ^name
fn block_label<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        '^',
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
    .parse_next(input)
}

/// Parse a dialect-qualified name: dialect.name
fn qualified_name<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    (ident, '.', ident)
        .map(|(d, _, n)| (d, n))
        .parse_next(input)
}

/// Parse an integer literal (unsigned or negative via two's complement).
fn integer_lit(input: &mut &str) -> ModalResult<u64> {
    let negative = opt('-').parse_next(input)?.is_some();
    let value: u64 = ascii::dec_uint(input)?;
    if negative {
        let i64_min_magnitude = i64::MAX as u64 + 1;
        if value > i64_min_magnitude {
            return Err(winnow::error::ErrMode::Backtrack(
                winnow::error::ContextError::new(),
            ));
        }
        Ok(value.wrapping_neg())
    } else {
        Ok(value)
    }
}

/// Parse a float literal that MUST contain a decimal point, or one of the
/// non-finite spellings `inf`, `-inf`, `NaN`.
fn float_lit(input: &mut &str) -> ModalResult<f64> {
    let s = alt((
        (
            opt('-'),
            take_while(1.., |c: char| c.is_ascii_digit()),
            '.',
            take_while(1.., |c: char| c.is_ascii_digit()),
            opt((
                one_of(['e', 'E']),
                opt(one_of(['+', '-'])),
                take_while(1.., |c: char| c.is_ascii_digit()),
            )),
        )
            .take(),
        "-inf",
        "inf",
        "NaN",
    ))
    .parse_next(input)?;
    s.parse::<f64>()
        .map_err(|_| winnow::error::ErrMode::Backtrack(winnow::error::ContextError::new()))
}

/// Parse a string literal: "content"
fn string_lit(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let mut result = String::new();
    loop {
        let c = any.parse_next(input)?;
        match c {
            '"' => break,
            '\\' => {
                let escaped = any.parse_next(input)?;
                match escaped {
                    '"' => result.push('"'),
                    '\\' => result.push('\\'),
                    'n' => result.push('\n'),
                    't' => result.push('\t'),
                    'r' => result.push('\r'),
                    '0' => result.push('\0'),
                    'x' => {
                        let h1 = any.parse_next(input)?;
                        let h2 = any.parse_next(input)?;
                        let hex_str = format!("{h1}{h2}");
                        match u8::from_str_radix(&hex_str, 16) {
                            Ok(code) => result.push(code as char),
                            Err(_) => {
                                result.push_str("\\x");
                                result.push_str(&hex_str);
                            }
                        }
                    }
                    _ => {
                        result.push('\\');
                        result.push(escaped);
                    }
                }
            }
            _ => result.push(c),
        }
    }
    Ok(result)
}

/// Parse a type: `dialect.name`, `dialect.name(params)`, or
/// `dialect.name(params) {key = value, ...}`.
///
/// Type attributes are only parsed after explicit parentheses to avoid
/// ambiguity with the opening `{` of a region.
fn raw_type<'a>(input: &mut &'a str) -> ModalResult<RawType<'a>> {
    let (dialect, name) = qualified_name.parse_next(input)?;

    let opt_params = opt(delimited(
        ('(', ws),
        separated(0.., (ws, raw_type, ws).map(|(_, t, _)| t), ','),
        (ws, ')'),
    ))
    .parse_next(input)?;
    let has_parens = opt_params.is_some();
    let params = opt_params.unwrap_or_default();

    let attrs = if has_parens {
        opt(preceded(hs, raw_attr_dict))
            .parse_next(input)?
            .unwrap_or_default()
    } else {
        vec![]
    };

    Ok(RawType {
        dialect,
        name,
        params,
        attrs,
    })
}

/// Parse an attribute value.
fn raw_attr_value<'a>(input: &mut &'a str) -> ModalResult<RawAttribute<'a>> {
    alt((
        "true".value(RawAttribute::Bool(true)),
        "false".value(RawAttribute::Bool(false)),
        "unit".value(RawAttribute::Unit),
        raw_location_attr,
        raw_bytes_attr,
        string_lit.map(RawAttribute::String),
        symbol_ref.map(RawAttribute::Symbol),
        delimited(
            ('[', ws),
            separated(0.., (ws, raw_attr_value, ws).map(|(_, a, _)| a), ','),
            (ws, ']'),
        )
        .map(RawAttribute::List),
        float_lit.map(RawAttribute::Float),
        integer_lit.map(RawAttribute::Int),
        raw_type.map(RawAttribute::Type),
    ))
    .parse_next(input)
}

/// Parse loc("path" start:end)
fn raw_location_attr<'a>(input: &mut &'a str) -> ModalResult<RawAttribute<'a>> {
    "loc(".parse_next(input)?;
    ws.parse_next(input)?;
    let path = string_lit.parse_next(input)?;
    ws.parse_next(input)?;
    let start: usize = ascii::dec_uint(input)?;
    ':'.parse_next(input)?;
    let end: usize = ascii::dec_uint(input)?;
    ws.parse_next(input)?;
    ')'.parse_next(input)?;
    Ok(RawAttribute::Location(path, start, end))
}

/// Parse bytes(1, 2, 3)
fn raw_bytes_attr<'a>(input: &mut &'a str) -> ModalResult<RawAttribute<'a>> {
    "bytes".parse_next(input)?;
    let bytes: Vec<u8> = delimited(
        ('(', ws),
        separated(
            0..,
            (ws, ascii::dec_uint::<_, u8, _>, ws).map(|(_, b, _)| b),
            ',',
        ),
        (ws, ')'),
    )
    .parse_next(input)?;
    Ok(RawAttribute::Bytes(bytes))
}

/// Parse a non-empty attribute dict: {key = value, ...}
fn raw_attr_dict<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, RawAttribute<'a>)>> {
    delimited(
        ('{', ws),
        separated(
            1..,
            (ws, attr_key, ws, '=', ws, raw_attr_value, ws).map(|(_, k, _, _, _, v, _)| (k, v)),
            ',',
        ),
        (ws, '}'),
    )
    .parse_next(input)
}

/// Parse result list: %0 = or %0, %1 =
fn result_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    let results: Vec<&str> =
        separated(1.., (hs, value_ref, hs).map(|(_, v, _)| v), ',').parse_next(input)?;
    '='.parse_next(input)?;
    Ok(results)
}

/// Parse operand list: %a, %b, ...
fn operand_list<'a>(input: &mut &'a str) -> ModalResult<Vec<&'a str>> {
    separated(1.., (hs, value_ref, hs).map(|(_, v, _)| v), ',').parse_next(input)
}

/// Parse type annotation: : type1, type2
fn type_annotation<'a>(input: &mut &'a str) -> ModalResult<Vec<RawType<'a>>> {
    preceded(
        (hs, ':', hs),
        separated(1.., (hs, raw_type, hs).map(|(_, t, _)| t), ','),
    )
    .parse_next(input)
}

/// Parse a single operation.
///
/// Grammar:
/// ```text
/// [results =] dialect.op [@symbol] [operands] [{attrs}] [: types] [regions]
/// ```
fn raw_operation<'a>(input: &mut &'a str) -> ModalResult<RawOperation<'a>> {
    ws.parse_next(input)?;
    let start_rest = input.len();

    let results = opt(result_list).parse_next(input)?.unwrap_or_default();
    hs.parse_next(input)?;

    let (dialect, op_name) = qualified_name.parse_next(input)?;
    let sym_name = opt(preceded(hs, symbol_ref)).parse_next(input)?;
    let operands = opt(preceded(hs, operand_list))
        .parse_next(input)?
        .unwrap_or_default();
    let attributes = opt(preceded(hs, raw_attr_dict))
        .parse_next(input)?
        .unwrap_or_default();
    let result_types = opt(type_annotation).parse_next(input)?.unwrap_or_default();

    let mut regions = Vec::new();
    loop {
        hs.parse_next(input)?;
        if input.starts_with('{') {
            regions.push(raw_region.parse_next(input)?);
        } else {
            break;
        }
    }

    Ok(RawOperation {
        results,
        dialect,
        op_name,
        sym_name,
        operands,
        attributes,
        result_types,
        regions,
        start_rest,
        end_rest: input.len(),
    })
}

fn raw_ops_until_block_end<'a>(input: &mut &'a str) -> ModalResult<Vec<RawOperation<'a>>> {
    let mut ops = Vec::new();
    loop {
        ws.parse_next(input)?;
        if input.starts_with('^') || input.starts_with('}') || input.is_empty() {
            break;
        }
        ops.push(raw_operation.parse_next(input)?);
    }
    Ok(ops)
}

/// Parse a block: ^label(args): ops...
fn raw_block<'a>(input: &mut &'a str) -> ModalResult<RawBlock<'a>> {
    ws.parse_next(input)?;
    block_label.parse_next(input)?;

    let args = opt(delimited(
        ('(', ws),
        separated(
            0..,
            (ws, value_ref, ws, ':', ws, raw_type, ws).map(|(_, name, _, _, _, ty, _)| (name, ty)),
            ',',
        ),
        (ws, ')'),
    ))
    .parse_next(input)?
    .unwrap_or_default();

    hs.parse_next(input)?;
    ':'.parse_next(input)?;

    let ops = raw_ops_until_block_end.parse_next(input)?;
    Ok(RawBlock { args, ops })
}

/// Parse a region: { blocks... } or { ops... } (single implicit block)
fn raw_region<'a>(input: &mut &'a str) -> ModalResult<RawRegion<'a>> {
    '{'.parse_next(input)?;
    ws.parse_next(input)?;

    let mut blocks = Vec::new();
    if input.starts_with('^') {
        loop {
            ws.parse_next(input)?;
            if input.starts_with('}') {
                break;
            }
            blocks.push(raw_block.parse_next(input)?);
        }
    } else if !input.starts_with('}') {
        let ops = raw_ops_until_block_end.parse_next(input)?;
        blocks.push(RawBlock { args: vec![], ops });
    }

    ws.parse_next(input)?;
    '}'.parse_next(input)?;
    Ok(RawRegion { blocks })
}

// ============================================================================
// Builder
// ============================================================================

struct Builder<'s> {
    source_len: usize,
    path: PathRef,
    values: HashMap<&'s str, ValueRef>,
}

impl<'s> Builder<'s> {
    fn error(&self, rest: usize, message: String) -> ParseError {
        ParseError {
            message,
            offset: self.source_len - rest,
        }
    }

    fn build_type(&self, ctx: &mut IrContext, raw: &RawType<'_>) -> Result<TypeRef, ParseError> {
        let params = raw
            .params
            .iter()
            .map(|p| self.build_type(ctx, p))
            .collect::<Result<Vec<_>, _>>()?;
        let mut builder = TypeDataBuilder::new(
            Symbol::from_dynamic(raw.dialect),
            Symbol::from_dynamic(raw.name),
        )
        .params(params);
        for (key, value) in &raw.attrs {
            let attr = self.build_attr(ctx, value)?;
            builder = builder.attr(Symbol::from_dynamic(key), attr);
        }
        Ok(ctx.types.intern(builder.build()))
    }

    fn build_attr(
        &self,
        ctx: &mut IrContext,
        raw: &RawAttribute<'_>,
    ) -> Result<Attribute, ParseError> {
        Ok(match raw {
            RawAttribute::Bool(b) => Attribute::Bool(*b),
            RawAttribute::Int(v) => Attribute::IntBits(*v),
            RawAttribute::Float(v) => Attribute::FloatBits(v.to_bits()),
            RawAttribute::String(s) => Attribute::String(s.clone()),
            RawAttribute::Symbol(s) => Attribute::Symbol(Symbol::from_dynamic(s)),
            RawAttribute::Type(t) => Attribute::Type(self.build_type(ctx, t)?),
            RawAttribute::List(items) => Attribute::List(
                items
                    .iter()
                    .map(|item| self.build_attr(ctx, item))
                    .collect::<Result<_, _>>()?,
            ),
            RawAttribute::Unit => Attribute::Unit,
            RawAttribute::Location(path, start, end) => {
                let path = ctx.paths.intern(path.clone());
                Attribute::Location(Location::new(path, Span::new(*start, *end)))
            }
            RawAttribute::Bytes(bytes) => Attribute::Bytes(SmallVec::from_slice(bytes)),
        })
    }

    fn build_region(
        &mut self,
        ctx: &mut IrContext,
        raw: &RawRegion<'s>,
        location: Location,
    ) -> Result<RegionRef, ParseError> {
        let mut blocks = SmallVec::new();
        for raw_block in &raw.blocks {
            let mut args = Vec::with_capacity(raw_block.args.len());
            for (_, ty) in &raw_block.args {
                args.push(BlockArgData::new(self.build_type(ctx, ty)?));
            }
            let block = ctx.create_block(BlockData {
                location,
                args,
                ops: Default::default(),
                parent_region: None,
            });
            for (idx, (name, _)) in raw_block.args.iter().enumerate() {
                let value = ctx.block_arg(block, idx as u32);
                self.values.insert(*name, value);
            }
            for raw_op in &raw_block.ops {
                let op = self.build_op(ctx, raw_op)?;
                ctx.push_op(block, op);
            }
            blocks.push(block);
        }
        Ok(ctx.create_region(RegionData {
            location,
            blocks,
            parent_op: None,
        }))
    }

    fn build_op(&mut self, ctx: &mut IrContext, raw: &RawOperation<'s>) -> Result<OpRef, ParseError> {
        let start = self.source_len - raw.start_rest;
        let end = self.source_len - raw.end_rest;
        let location = Location::new(self.path, Span::new(start, end));

        if raw.results.len() != raw.result_types.len() {
            return Err(self.error(
                raw.start_rest,
                format!(
                    "{}.{} names {} result(s) but declares {} type(s)",
                    raw.dialect,
                    raw.op_name,
                    raw.results.len(),
                    raw.result_types.len()
                ),
            ));
        }

        let mut operands = Vec::with_capacity(raw.operands.len());
        for name in &raw.operands {
            let value = self.values.get(name).copied().ok_or_else(|| {
                self.error(raw.start_rest, format!("use of undefined value %{name}"))
            })?;
            operands.push(value);
        }

        let mut builder = OperationDataBuilder::new(
            location,
            Symbol::from_dynamic(raw.dialect),
            Symbol::from_dynamic(raw.op_name),
        )
        .operands(operands);

        if let Some(sym) = &raw.sym_name {
            builder = builder.attr("sym_name", Attribute::Symbol(Symbol::from_dynamic(sym)));
        }
        for (key, value) in &raw.attributes {
            let attr = self.build_attr(ctx, value)?;
            builder = builder.attr(Symbol::from_dynamic(key), attr);
        }
        for ty in &raw.result_types {
            builder = builder.result(self.build_type(ctx, ty)?);
        }
        for region in &raw.regions {
            builder = builder.region(self.build_region(ctx, region, location)?);
        }

        let data = builder.build(ctx);
        let op = ctx.create_op(data);
        for (idx, name) in raw.results.iter().enumerate() {
            let value = ctx.op_result(op, idx as u32);
            self.values.insert(*name, value);
        }
        Ok(op)
    }
}


// ============================================================================
// Public API
// ============================================================================

/// Parse one top-level operation from IR text.
pub fn parse_module(ctx: &mut IrContext, source: &str) -> Result<OpRef, ParseError> {
    parse_module_with_path(ctx, "<input>", source)
}

/// Parse one top-level operation, attributing locations to `path`.
pub fn parse_module_with_path(
    ctx: &mut IrContext,
    path: &str,
    source: &str,
) -> Result<OpRef, ParseError> {
    let mut input = source;
    let raw = raw_operation.parse_next(&mut input).map_err(|e| ParseError {
        message: format!("expected operation: {e}"),
        offset: source.len() - input.len(),
    })?;
    let _ = ws.parse_next(&mut input);
    if !input.is_empty() {
        return Err(ParseError {
            message: "unexpected trailing input".to_owned(),
            offset: source.len() - input.len(),
        });
    }

    let path = ctx.paths.intern(path.to_owned());
    let mut builder = Builder {
        source_len: source.len(),
        path,
        values: HashMap::new(),
    };
    builder.build_op(ctx, &raw)
}
