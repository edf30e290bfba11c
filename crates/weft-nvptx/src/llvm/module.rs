//! In-memory model of lowered, LLVM-style IR.
//!
//! Values are named SSA locals (`%name`) scoped to a function. Functions
//! are the only global values. Metadata nodes are numbered (`!N`) and
//! owned by the module.

use std::collections::BTreeMap;

use derive_more::Display;

// ============================================================================
// Types and operands
// ============================================================================

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Ty {
    #[display("void")]
    Void,
    #[display("i1")]
    I1,
    #[display("i32")]
    I32,
    #[display("i64")]
    I64,
    #[display("float")]
    F32,
    #[display("double")]
    F64,
    #[display("ptr")]
    Ptr,
}

impl Ty {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "void" => Ty::Void,
            "i1" => Ty::I1,
            "i32" => Ty::I32,
            "i64" => Ty::I64,
            "float" => Ty::F32,
            "double" => Ty::F64,
            "ptr" => Ty::Ptr,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(self, Ty::F32 | Ty::F64)
    }

    /// Bit width of integer and float types.
    pub fn bits(self) -> Option<u32> {
        match self {
            Ty::I1 => Some(1),
            Ty::I32 | Ty::F32 => Some(32),
            Ty::I64 | Ty::F64 => Some(64),
            Ty::Void | Ty::Ptr => None,
        }
    }

    /// Store size in bytes, with pointers of `pointer_bytes`.
    pub fn store_size(self, pointer_bytes: u64) -> u64 {
        match self {
            Ty::Void => 0,
            Ty::I1 => 1,
            Ty::I32 | Ty::F32 => 4,
            Ty::I64 | Ty::F64 => 8,
            Ty::Ptr => pointer_bytes,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// `%name`
    Local(String),
    /// `@name`
    Global(String),
    Int(i64),
    Float(f64),
}

impl Operand {
    pub fn local(name: impl Into<String>) -> Self {
        Operand::Local(name.into())
    }

    pub fn as_local(&self) -> Option<&str> {
        match self {
            Operand::Local(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Int(_) | Operand::Float(_))
    }
}

// ============================================================================
// Instructions
// ============================================================================

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    #[display("add")]
    Add,
    #[display("sub")]
    Sub,
    #[display("mul")]
    Mul,
    #[display("sdiv")]
    SDiv,
    #[display("srem")]
    SRem,
    #[display("and")]
    And,
    #[display("or")]
    Or,
    #[display("xor")]
    Xor,
    #[display("fadd")]
    FAdd,
    #[display("fsub")]
    FSub,
    #[display("fmul")]
    FMul,
    #[display("fdiv")]
    FDiv,
    #[display("frem")]
    FRem,
}

impl BinaryOp {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "add" => BinaryOp::Add,
            "sub" => BinaryOp::Sub,
            "mul" => BinaryOp::Mul,
            "sdiv" => BinaryOp::SDiv,
            "srem" => BinaryOp::SRem,
            "and" => BinaryOp::And,
            "or" => BinaryOp::Or,
            "xor" => BinaryOp::Xor,
            "fadd" => BinaryOp::FAdd,
            "fsub" => BinaryOp::FSub,
            "fmul" => BinaryOp::FMul,
            "fdiv" => BinaryOp::FDiv,
            "frem" => BinaryOp::FRem,
            _ => return None,
        })
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            BinaryOp::FAdd | BinaryOp::FSub | BinaryOp::FMul | BinaryOp::FDiv | BinaryOp::FRem
        )
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum IntPredicate {
    #[display("eq")]
    Eq,
    #[display("ne")]
    Ne,
    #[display("slt")]
    Slt,
    #[display("sle")]
    Sle,
    #[display("sgt")]
    Sgt,
    #[display("sge")]
    Sge,
}

impl IntPredicate {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "eq" => IntPredicate::Eq,
            "ne" => IntPredicate::Ne,
            "slt" => IntPredicate::Slt,
            "sle" => IntPredicate::Sle,
            "sgt" => IntPredicate::Sgt,
            "sge" => IntPredicate::Sge,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum FloatPredicate {
    #[display("oeq")]
    Oeq,
    #[display("one")]
    One,
    #[display("olt")]
    Olt,
    #[display("ole")]
    Ole,
    #[display("ogt")]
    Ogt,
    #[display("oge")]
    Oge,
}

impl FloatPredicate {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "oeq" => FloatPredicate::Oeq,
            "one" => FloatPredicate::One,
            "olt" => FloatPredicate::Olt,
            "ole" => FloatPredicate::Ole,
            "ogt" => FloatPredicate::Ogt,
            "oge" => FloatPredicate::Oge,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum CastOp {
    #[display("zext")]
    ZExt,
    #[display("sext")]
    SExt,
    #[display("trunc")]
    Trunc,
    #[display("sitofp")]
    SIToFP,
    #[display("fptosi")]
    FPToSI,
}

impl CastOp {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "zext" => CastOp::ZExt,
            "sext" => CastOp::SExt,
            "trunc" => CastOp::Trunc,
            "sitofp" => CastOp::SIToFP,
            "fptosi" => CastOp::FPToSI,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Binary {
        op: BinaryOp,
        ty: Ty,
        lhs: Operand,
        rhs: Operand,
    },
    FNeg {
        ty: Ty,
        value: Operand,
    },
    ICmp {
        pred: IntPredicate,
        ty: Ty,
        lhs: Operand,
        rhs: Operand,
    },
    FCmp {
        pred: FloatPredicate,
        ty: Ty,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        op: CastOp,
        from: Ty,
        value: Operand,
        to: Ty,
    },
    Load {
        ty: Ty,
        ptr: Operand,
    },
    Store {
        ty: Ty,
        value: Operand,
        ptr: Operand,
    },
    Alloca {
        ty: Ty,
    },
    /// `getelementptr [inbounds] elem, ptr base, index_ty index`
    Gep {
        inbounds: bool,
        elem: Ty,
        base: Operand,
        index_ty: Ty,
        index: Operand,
    },
    Call {
        ret: Ty,
        callee: String,
        args: Vec<(Ty, Operand)>,
    },
    Ret(Option<(Ty, Operand)>),
    Br(String),
    CondBr {
        cond: Operand,
        then_dest: String,
        else_dest: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    /// Name of the produced value, without the `%`.
    pub result: Option<String>,
    pub kind: InstKind,
    /// The `contract` fast-math flag.
    pub contract: bool,
    /// `!dbg` attachment.
    pub dbg: Option<MetadataId>,
}

impl Instruction {
    pub fn new(kind: InstKind) -> Self {
        Self {
            result: None,
            kind,
            contract: false,
            dbg: None,
        }
    }

    pub fn named(result: impl Into<String>, kind: InstKind) -> Self {
        Self {
            result: Some(result.into()),
            ..Self::new(kind)
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Ret(_) | InstKind::Br(_) | InstKind::CondBr { .. }
        )
    }

    /// Whether the instruction computes a floating-point value the way
    /// an FP math operator does.
    pub fn is_fp_math(&self) -> bool {
        match &self.kind {
            InstKind::Binary { op, .. } => op.is_float(),
            InstKind::FNeg { .. } | InstKind::FCmp { .. } => true,
            InstKind::Call { ret, .. } => ret.is_float(),
            _ => false,
        }
    }

    /// Whether removing the instruction when its result is unused is safe.
    pub fn is_trivially_dead_if_unused(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Binary { .. }
                | InstKind::FNeg { .. }
                | InstKind::ICmp { .. }
                | InstKind::FCmp { .. }
                | InstKind::Cast { .. }
                | InstKind::Load { .. }
                | InstKind::Alloca { .. }
                | InstKind::Gep { .. }
        )
    }

    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::FNeg { value, .. } | InstKind::Cast { value, .. } => vec![value],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { value, ptr, .. } => vec![value, ptr],
            InstKind::Alloca { .. } | InstKind::Br(_) => vec![],
            InstKind::Gep { base, index, .. } => vec![base, index],
            InstKind::Call { args, .. } => args.iter().map(|(_, a)| a).collect(),
            InstKind::Ret(value) => value.iter().map(|(_, v)| v).collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match &mut self.kind {
            InstKind::Binary { lhs, rhs, .. }
            | InstKind::ICmp { lhs, rhs, .. }
            | InstKind::FCmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::FNeg { value, .. } | InstKind::Cast { value, .. } => vec![value],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { value, ptr, .. } => vec![value, ptr],
            InstKind::Alloca { .. } | InstKind::Br(_) => vec![],
            InstKind::Gep { base, index, .. } => vec![base, index],
            InstKind::Call { args, .. } => args.iter_mut().map(|(_, a)| a).collect(),
            InstKind::Ret(value) => value.iter_mut().map(|(_, v)| v).collect(),
            InstKind::CondBr { cond, .. } => vec![cond],
        }
    }

    /// Type of the produced value.
    pub fn result_ty(&self) -> Ty {
        match &self.kind {
            InstKind::Binary { ty, .. } | InstKind::FNeg { ty, .. } | InstKind::Load { ty, .. } => {
                *ty
            }
            InstKind::ICmp { .. } | InstKind::FCmp { .. } => Ty::I1,
            InstKind::Cast { to, .. } => *to,
            InstKind::Alloca { .. } | InstKind::Gep { .. } => Ty::Ptr,
            InstKind::Call { ret, .. } => *ret,
            InstKind::Store { .. }
            | InstKind::Ret(_)
            | InstKind::Br(_)
            | InstKind::CondBr { .. } => Ty::Void,
        }
    }

    /// Callee of a call instruction.
    pub fn callee(&self) -> Option<&str> {
        match &self.kind {
            InstKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

#[derive(Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash)]
pub enum Linkage {
    #[default]
    #[display("external")]
    External,
    #[display("internal")]
    Internal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub ty: Ty,
    /// Local name, absent in declarations.
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub linkage: Linkage,
    pub ret: Ty,
    pub params: Vec<Param>,
    /// Empty for declarations.
    pub blocks: Vec<BasicBlock>,
    pub dbg: Option<MetadataId>,
}

impl Function {
    pub fn declaration(name: impl Into<String>, ret: Ty, params: &[Ty]) -> Self {
        Self {
            name: name.into(),
            linkage: Linkage::External,
            ret,
            params: params.iter().map(|&ty| Param { ty, name: None }).collect(),
            blocks: Vec::new(),
            dbg: None,
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn param_types(&self) -> impl Iterator<Item = Ty> + '_ {
        self.params.iter().map(|p| p.ty)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    pub fn instructions_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.blocks.iter_mut().flat_map(|b| b.instructions.iter_mut())
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Number of a metadata node, printed as `!N`.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("!{_0}")]
pub struct MetadataId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataOperand {
    Null,
    /// `!"text"`
    String(String),
    Int(Ty, i64),
    /// `ptr @name`
    Function(String),
    Node(MetadataId),
}

#[derive(Clone, Debug, PartialEq)]
pub enum MetadataNode {
    /// `!{...}`
    Tuple(Vec<MetadataOperand>),
    /// `!DIName(key: value, ...)`, with values kept as written.
    Specialized {
        name: String,
        fields: Vec<(String, String)>,
    },
}

impl MetadataNode {
    /// Every node referenced by this node.
    pub fn references(&self) -> Vec<MetadataId> {
        match self {
            MetadataNode::Tuple(ops) => ops
                .iter()
                .filter_map(|op| match op {
                    MetadataOperand::Node(id) => Some(*id),
                    _ => None,
                })
                .collect(),
            MetadataNode::Specialized { fields, .. } => fields
                .iter()
                .filter_map(|(_, value)| parse_node_ref(value))
                .collect(),
        }
    }

    /// Rewrite every node reference through `f`.
    pub fn remap_references(&mut self, mut f: impl FnMut(MetadataId) -> MetadataId) {
        match self {
            MetadataNode::Tuple(ops) => {
                for op in ops {
                    if let MetadataOperand::Node(id) = op {
                        *id = f(*id);
                    }
                }
            }
            MetadataNode::Specialized { fields, .. } => {
                for (_, value) in fields {
                    if let Some(id) = parse_node_ref(value) {
                        *value = f(id).to_string();
                    }
                }
            }
        }
    }
}

/// Parse `!N`.
pub(crate) fn parse_node_ref(text: &str) -> Option<MetadataId> {
    let digits = text.strip_prefix('!')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(MetadataId)
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetadataDef {
    pub distinct: bool,
    pub node: MetadataNode,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NamedMetadata {
    pub name: String,
    pub nodes: Vec<MetadataId>,
}

// ============================================================================
// Module
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LlvmModule {
    pub name: String,
    pub triple: Option<String>,
    pub data_layout: Option<String>,
    pub functions: Vec<Function>,
    pub named_metadata: Vec<NamedMetadata>,
    pub metadata: BTreeMap<MetadataId, MetadataDef>,
}

/// Named metadata listing kernel entry points.
pub const NVVM_ANNOTATIONS: &str = "nvvm.annotations";

impl LlvmModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Add a declaration for `name` unless the module already has the symbol.
    pub fn get_or_insert_declaration(&mut self, name: &str, ret: Ty, params: &[Ty]) {
        if self.function(name).is_none() {
            self.functions.push(Function::declaration(name, ret, params));
        }
    }

    pub fn named_metadata(&self, name: &str) -> Option<&NamedMetadata> {
        self.named_metadata.iter().find(|nm| nm.name == name)
    }

    pub fn get_or_insert_named_metadata(&mut self, name: &str) -> &mut NamedMetadata {
        let index = match self.named_metadata.iter().position(|nm| nm.name == name) {
            Some(index) => index,
            None => {
                self.named_metadata.push(NamedMetadata {
                    name: name.to_owned(),
                    nodes: Vec::new(),
                });
                self.named_metadata.len() - 1
            }
        };
        &mut self.named_metadata[index]
    }

    /// The first unused metadata number.
    pub fn next_metadata_id(&self) -> MetadataId {
        self.metadata
            .keys()
            .next_back()
            .map_or(MetadataId(0), |id| MetadataId(id.0 + 1))
    }

    pub fn add_metadata(&mut self, node: MetadataNode) -> MetadataId {
        let id = self.next_metadata_id();
        self.metadata.insert(
            id,
            MetadataDef {
                distinct: false,
                node,
            },
        );
        id
    }

    pub fn metadata_node(&self, id: MetadataId) -> Option<&MetadataNode> {
        self.metadata.get(&id).map(|def| &def.node)
    }

    /// Record `function` as a kernel entry point in `nvvm.annotations`.
    pub fn annotate_kernel(&mut self, function: &str) {
        let node = self.add_metadata(MetadataNode::Tuple(vec![
            MetadataOperand::Function(function.to_owned()),
            MetadataOperand::String("kernel".to_owned()),
            MetadataOperand::Int(Ty::I32, 1),
        ]));
        self.get_or_insert_named_metadata(NVVM_ANNOTATIONS)
            .nodes
            .push(node);
    }

    /// Names of the functions marked as kernels by `nvvm.annotations`.
    ///
    /// An annotation marks its first operand when its second operand is
    /// missing, not a string, or the string `kernel`.
    pub fn kernel_names(&self) -> Vec<&str> {
        let Some(annotations) = self.named_metadata(NVVM_ANNOTATIONS) else {
            return Vec::new();
        };
        annotations
            .nodes
            .iter()
            .filter_map(|&id| match self.metadata_node(id)? {
                MetadataNode::Tuple(ops) => {
                    let marks_kernel = match ops.get(1) {
                        Some(MetadataOperand::String(kind)) => kind == "kernel",
                        _ => true,
                    };
                    match ops.first() {
                        Some(MetadataOperand::Function(name)) if marks_kernel => {
                            Some(name.as_str())
                        }
                        _ => None,
                    }
                }
                MetadataNode::Specialized { .. } => None,
            })
            .collect()
    }
}
