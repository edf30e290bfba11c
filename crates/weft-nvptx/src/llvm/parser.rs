//! Parser for the textual form of lowered IR.
//!
//! The format is line oriented: every top-level entity, block label and
//! instruction sits on its own line. Each line is parsed with winnow
//! combinators and must be consumed entirely. Comments start with `;`.
//! `attributes` groups and `source_filename` lines are accepted and
//! dropped.

use derive_more::Display;
use winnow::ascii;
use winnow::combinator::{alt, opt, preceded, separated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::module::{
    BasicBlock, BinaryOp, CastOp, FloatPredicate, Function, InstKind, Instruction, IntPredicate,
    Linkage, LlvmModule, MetadataDef, MetadataId, MetadataNode, MetadataOperand, NamedMetadata,
    Operand, Param, Ty,
};

#[derive(Clone, Debug, Display, PartialEq)]
#[display("line {line}: {message}")]
pub struct ParseError {
    pub message: String,
    /// 1-based line number.
    pub line: usize,
}

impl std::error::Error for ParseError {}

// ============================================================================
// Tokens
// ============================================================================

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn hs(input: &mut &str) -> ModalResult<()> {
    take_while(0.., |c: char| c == ' ' || c == '\t')
        .void()
        .parse_next(input)
}

/// A keyword-like token: letters, digits, `_` and `.`.
fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        .parse_next(input)
}

fn keyword(kw: &'static str) -> impl FnMut(&mut &str) -> ModalResult<()> {
    move |input: &mut &str| {
        let checkpoint = *input;
        let w = word.parse_next(input)?;
        if w == kw {
            Ok(())
        } else {
            *input = checkpoint;
            backtrack()
        }
    }
}

fn name_chars<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')
    })
    .parse_next(input)
}

fn local_name(input: &mut &str) -> ModalResult<String> {
    preceded('%', name_chars)
        .map(str::to_owned)
        .parse_next(input)
}

fn global_name(input: &mut &str) -> ModalResult<String> {
    preceded('@', name_chars)
        .map(str::to_owned)
        .parse_next(input)
}

fn ty(input: &mut &str) -> ModalResult<Ty> {
    let checkpoint = *input;
    let w = word.parse_next(input)?;
    match Ty::from_keyword(w) {
        Some(ty) => Ok(ty),
        None => {
            *input = checkpoint;
            backtrack()
        }
    }
}

fn int_lit(input: &mut &str) -> ModalResult<i64> {
    ascii::dec_int.parse_next(input)
}

fn float_lit(input: &mut &str) -> ModalResult<f64> {
    let text = alt((
        (
            opt('-'),
            take_while(1.., |c: char| c.is_ascii_digit()),
            opt(('.', take_while(0.., |c: char| c.is_ascii_digit()))),
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
    match text.parse::<f64>() {
        Ok(v) => Ok(v),
        Err(_) => backtrack(),
    }
}

/// A quoted string with LLVM `\XX` hex escapes.
fn string_lit(input: &mut &str) -> ModalResult<String> {
    '"'.parse_next(input)?;
    let text: &str = *input;
    let mut out = String::new();
    let mut chars = text.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                *input = &text[i + 1..];
                return Ok(out);
            }
            '\\' => {
                let hex: String = chars.by_ref().take(2).map(|(_, c)| c).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(b) => out.push(char::from(b)),
                    Err(_) => return backtrack(),
                }
            }
            c => out.push(c),
        }
    }
    backtrack()
}

/// An operand whose type is already known.
fn operand(input: &mut &str, ty: Ty) -> ModalResult<Operand> {
    if input.starts_with('%') {
        return local_name.map(Operand::Local).parse_next(input);
    }
    if input.starts_with('@') {
        return global_name.map(Operand::Global).parse_next(input);
    }
    if ty.is_float() {
        return float_lit.map(Operand::Float).parse_next(input);
    }
    let checkpoint = *input;
    if let Ok(w) = word.parse_next(input) {
        match w {
            "true" => return Ok(Operand::Int(1)),
            "false" => return Ok(Operand::Int(0)),
            _ => *input = checkpoint,
        }
    }
    int_lit.map(Operand::Int).parse_next(input)
}

fn typed_operand(input: &mut &str) -> ModalResult<(Ty, Operand)> {
    let t = ty.parse_next(input)?;
    hs.parse_next(input)?;
    let v = operand(input, t)?;
    Ok((t, v))
}

fn comma(input: &mut &str) -> ModalResult<()> {
    (hs, ',', hs).void().parse_next(input)
}

fn metadata_id(input: &mut &str) -> ModalResult<MetadataId> {
    preceded('!', ascii::dec_uint)
        .map(MetadataId)
        .parse_next(input)
}

// ============================================================================
// Instructions
// ============================================================================

/// Fast-math flags. Only `contract` is kept; `fast` implies it.
fn fast_math_flags(input: &mut &str) -> ModalResult<bool> {
    let mut contract = false;
    loop {
        let checkpoint = *input;
        hs.parse_next(input)?;
        match word.parse_next(input) {
            Ok("contract" | "fast") => contract = true,
            Ok("nnan" | "ninf" | "nsz" | "arcp" | "afn" | "reassoc") => {}
            _ => {
                *input = checkpoint;
                return Ok(contract);
            }
        }
    }
}

fn label_ref(input: &mut &str) -> ModalResult<String> {
    (keyword("label"), hs, local_name)
        .map(|(_, _, name)| name)
        .parse_next(input)
}

fn call_args(input: &mut &str) -> ModalResult<Vec<(Ty, Operand)>> {
    '('.parse_next(input)?;
    hs.parse_next(input)?;
    let args: Vec<(Ty, Operand)> = separated(0.., typed_operand, comma).parse_next(input)?;
    hs.parse_next(input)?;
    ')'.parse_next(input)?;
    Ok(args)
}

fn instruction(input: &mut &str) -> ModalResult<Instruction> {
    let result = opt((local_name, hs, '=', hs).map(|(name, ..)| name)).parse_next(input)?;
    let opcode = word.parse_next(input)?;
    let mut contract = false;

    let kind = if let Some(op) = BinaryOp::from_keyword(opcode) {
        contract = fast_math_flags(input)?;
        // Integer wrap flags carry no meaning here.
        loop {
            let checkpoint = *input;
            hs.parse_next(input)?;
            match word.parse_next(input) {
                Ok("nsw" | "nuw" | "exact") => {}
                _ => {
                    *input = checkpoint;
                    break;
                }
            }
        }
        hs.parse_next(input)?;
        let (t, lhs) = typed_operand(input)?;
        comma(input)?;
        let rhs = operand(input, t)?;
        InstKind::Binary {
            op,
            ty: t,
            lhs,
            rhs,
        }
    } else if let Some(op) = CastOp::from_keyword(opcode) {
        hs.parse_next(input)?;
        let (from, value) = typed_operand(input)?;
        (hs, keyword("to"), hs).parse_next(input)?;
        let to = ty(input)?;
        InstKind::Cast {
            op,
            from,
            value,
            to,
        }
    } else {
        match opcode {
            "fneg" => {
                contract = fast_math_flags(input)?;
                hs.parse_next(input)?;
                let (t, value) = typed_operand(input)?;
                InstKind::FNeg { ty: t, value }
            }
            "icmp" => {
                hs.parse_next(input)?;
                let pred = word.parse_next(input)?;
                let Some(pred) = IntPredicate::from_keyword(pred) else {
                    return backtrack();
                };
                hs.parse_next(input)?;
                let (t, lhs) = typed_operand(input)?;
                comma(input)?;
                let rhs = operand(input, t)?;
                InstKind::ICmp {
                    pred,
                    ty: t,
                    lhs,
                    rhs,
                }
            }
            "fcmp" => {
                contract = fast_math_flags(input)?;
                hs.parse_next(input)?;
                let pred = word.parse_next(input)?;
                let Some(pred) = FloatPredicate::from_keyword(pred) else {
                    return backtrack();
                };
                hs.parse_next(input)?;
                let (t, lhs) = typed_operand(input)?;
                comma(input)?;
                let rhs = operand(input, t)?;
                InstKind::FCmp {
                    pred,
                    ty: t,
                    lhs,
                    rhs,
                }
            }
            "load" => {
                hs.parse_next(input)?;
                let t = ty(input)?;
                comma(input)?;
                let (_, ptr) = typed_operand(input)?;
                InstKind::Load { ty: t, ptr }
            }
            "store" => {
                hs.parse_next(input)?;
                let (t, value) = typed_operand(input)?;
                comma(input)?;
                let (_, ptr) = typed_operand(input)?;
                InstKind::Store { ty: t, value, ptr }
            }
            "alloca" => {
                hs.parse_next(input)?;
                InstKind::Alloca { ty: ty(input)? }
            }
            "getelementptr" => {
                let inbounds = opt(preceded(hs, keyword("inbounds")))
                    .parse_next(input)?
                    .is_some();
                hs.parse_next(input)?;
                let elem = ty(input)?;
                comma(input)?;
                let (_, base) = typed_operand(input)?;
                comma(input)?;
                let (index_ty, index) = typed_operand(input)?;
                InstKind::Gep {
                    inbounds,
                    elem,
                    base,
                    index_ty,
                    index,
                }
            }
            "call" | "tail" => {
                if opcode == "tail" {
                    (hs, keyword("call")).parse_next(input)?;
                }
                contract = fast_math_flags(input)?;
                hs.parse_next(input)?;
                let ret = ty(input)?;
                hs.parse_next(input)?;
                let callee = global_name(input)?;
                let args = call_args(input)?;
                InstKind::Call { ret, callee, args }
            }
            "ret" => {
                hs.parse_next(input)?;
                let checkpoint = *input;
                if keyword("void").parse_next(input).is_ok() {
                    InstKind::Ret(None)
                } else {
                    *input = checkpoint;
                    InstKind::Ret(Some(typed_operand(input)?))
                }
            }
            "br" => {
                hs.parse_next(input)?;
                if input.starts_with("label") {
                    InstKind::Br(label_ref(input)?)
                } else {
                    let (_, cond) = typed_operand(input)?;
                    comma(input)?;
                    let then_dest = label_ref(input)?;
                    comma(input)?;
                    let else_dest = label_ref(input)?;
                    InstKind::CondBr {
                        cond,
                        then_dest,
                        else_dest,
                    }
                }
            }
            _ => return backtrack(),
        }
    };

    let dbg = opt(preceded((comma, "!dbg", hs), metadata_id)).parse_next(input)?;
    Ok(Instruction {
        result,
        kind,
        contract,
        dbg,
    })
}

// ============================================================================
// Top-level entities
// ============================================================================

/// `define [internal] <ty> @name(<ty> %a, ...) [!dbg !N] {`
/// or `declare <ty> @name(<ty>, ...)`.
fn function_header(input: &mut &str) -> ModalResult<Function> {
    let is_definition = alt((keyword("define").value(true), keyword("declare").value(false)))
        .parse_next(input)?;
    hs.parse_next(input)?;
    let mut linkage = Linkage::External;
    let checkpoint = *input;
    match word.parse_next(input) {
        Ok("internal" | "private") => {
            linkage = Linkage::Internal;
            hs.parse_next(input)?;
        }
        Ok("external" | "dso_local") => hs.parse_next(input)?,
        _ => *input = checkpoint,
    }
    let ret = ty(input)?;
    hs.parse_next(input)?;
    let name = global_name(input)?;
    '('.parse_next(input)?;
    hs.parse_next(input)?;
    let params: Vec<Param> = separated(
        0..,
        (ty, opt(preceded(hs, local_name))).map(|(ty, name)| Param { ty, name }),
        comma,
    )
    .parse_next(input)?;
    hs.parse_next(input)?;
    ')'.parse_next(input)?;
    // Function attribute group references.
    let _ = opt(preceded(hs, ('#', ascii::digit1))).parse_next(input)?;
    let dbg = opt(preceded((hs, "!dbg", hs), metadata_id)).parse_next(input)?;
    if is_definition {
        (hs, '{').parse_next(input)?;
    }
    Ok(Function {
        name,
        linkage,
        ret,
        params,
        blocks: Vec::new(),
        dbg,
    })
}

fn metadata_operand(input: &mut &str) -> ModalResult<MetadataOperand> {
    if input.starts_with("!\"") {
        return preceded('!', string_lit)
            .map(MetadataOperand::String)
            .parse_next(input);
    }
    if input.starts_with('!') {
        return metadata_id.map(MetadataOperand::Node).parse_next(input);
    }
    if keyword("null").parse_next(input).is_ok() {
        return Ok(MetadataOperand::Null);
    }
    let t = ty.parse_next(input)?;
    hs.parse_next(input)?;
    if t == Ty::Ptr {
        return global_name.map(MetadataOperand::Function).parse_next(input);
    }
    int_lit.map(|v| MetadataOperand::Int(t, v)).parse_next(input)
}

/// Value of a specialized node field, kept as written.
fn field_value(input: &mut &str) -> ModalResult<String> {
    if input.starts_with('"') {
        let start = *input;
        string_lit.parse_next(input)?;
        let consumed = start.len() - input.len();
        return Ok(start[..consumed].to_owned());
    }
    take_while(1.., |c: char| c != ',' && c != ')')
        .map(|s: &str| s.trim_end().to_owned())
        .parse_next(input)
}

fn metadata_def(input: &mut &str) -> ModalResult<(MetadataId, MetadataDef)> {
    let id = metadata_id(input)?;
    (hs, '=', hs).parse_next(input)?;
    let distinct = opt((keyword("distinct"), hs)).parse_next(input)?.is_some();
    let node = if input.starts_with("!{") {
        "!{".parse_next(input)?;
        hs.parse_next(input)?;
        let ops: Vec<MetadataOperand> =
            separated(0.., metadata_operand, comma).parse_next(input)?;
        (hs, '}').parse_next(input)?;
        MetadataNode::Tuple(ops)
    } else {
        '!'.parse_next(input)?;
        let name = word.parse_next(input)?.to_owned();
        '('.parse_next(input)?;
        hs.parse_next(input)?;
        let fields: Vec<(String, String)> = separated(
            0..,
            (word, hs, ':', hs, field_value).map(|(k, _, _, _, v)| (k.to_owned(), v)),
            comma,
        )
        .parse_next(input)?;
        (hs, ')').parse_next(input)?;
        MetadataNode::Specialized { name, fields }
    };
    Ok((id, MetadataDef { distinct, node }))
}

fn named_metadata(input: &mut &str) -> ModalResult<NamedMetadata> {
    '!'.parse_next(input)?;
    let name = (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '.'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')),
    )
        .take()
        .parse_next(input)?
        .to_owned();
    (hs, '=', hs, "!{", hs).parse_next(input)?;
    let nodes: Vec<MetadataId> = separated(0.., metadata_id, comma).parse_next(input)?;
    (hs, '}').parse_next(input)?;
    Ok(NamedMetadata { name, nodes })
}

fn target_line(input: &mut &str) -> ModalResult<(&'static str, String)> {
    (keyword("target"), hs).parse_next(input)?;
    let which = alt((
        keyword("triple").value("triple"),
        keyword("datalayout").value("datalayout"),
    ))
    .parse_next(input)?;
    (hs, '=', hs).parse_next(input)?;
    let value = string_lit(input)?;
    Ok((which, value))
}

// ============================================================================
// Driver
// ============================================================================

/// Cut a trailing `;` comment, ignoring `;` inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_line<'a, O>(
    line: &'a str,
    line_no: usize,
    what: &str,
    mut parser: impl FnMut(&mut &'a str) -> ModalResult<O>,
) -> Result<O, ParseError> {
    let mut input = line;
    let out = parser(&mut input).map_err(|_| ParseError {
        message: format!("malformed {what}: `{line}`"),
        line: line_no,
    })?;
    let rest = input.trim();
    if !rest.is_empty() {
        return Err(ParseError {
            message: format!("unexpected `{rest}` after {what}"),
            line: line_no,
        });
    }
    Ok(out)
}

/// Parse a module named `name` from its textual form.
pub fn parse_module(name: &str, source: &str) -> Result<LlvmModule, ParseError> {
    let mut module = LlvmModule::new(name);
    let mut current: Option<Function> = None;

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if current.is_some() && line == "}" {
            module.functions.extend(current.take());
            continue;
        }
        if let Some(function) = current.as_mut() {
            if let Some(label) = line.strip_suffix(':')
                && !label.is_empty()
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-'))
            {
                function.blocks.push(BasicBlock::new(label));
                continue;
            }
            let inst = parse_line(line, line_no, "instruction", instruction)?;
            if function.blocks.is_empty() {
                function.blocks.push(BasicBlock::new("entry"));
            }
            if let Some(block) = function.blocks.last_mut() {
                block.instructions.push(inst);
            }
            continue;
        }

        if line.starts_with("define") || line.starts_with("declare") {
            let function = parse_line(line, line_no, "function header", function_header)?;
            if line.starts_with("define") {
                current = Some(function);
            } else {
                module.functions.push(function);
            }
        } else if line.starts_with("target") {
            let (which, value) = parse_line(line, line_no, "target line", target_line)?;
            match which {
                "triple" => module.triple = Some(value),
                _ => module.data_layout = Some(value),
            }
        } else if line.starts_with("source_filename") || line.starts_with("attributes") {
            continue;
        } else if line.starts_with('!')
            && line[1..].starts_with(|c: char| c.is_ascii_digit())
        {
            let (id, def) = parse_line(line, line_no, "metadata node", metadata_def)?;
            if module.metadata.insert(id, def).is_some() {
                return Err(ParseError {
                    message: format!("metadata {id} defined twice"),
                    line: line_no,
                });
            }
        } else if line.starts_with('!') {
            let named = parse_line(line, line_no, "named metadata", named_metadata)?;
            module.named_metadata.push(named);
        } else {
            return Err(ParseError {
                message: format!("unexpected `{line}`"),
                line: line_no,
            });
        }
    }

    if let Some(function) = current {
        return Err(ParseError {
            message: format!("function @{} is not closed", function.name),
            line: source.lines().count(),
        });
    }
    Ok(module)
}
