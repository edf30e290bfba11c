//! Locations, attributes, and type/path interning.

use std::collections::{BTreeMap, HashMap};

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::refs::{PathRef, TypeRef};
use crate::symbol::Symbol;

// ============================================================================
// Location
// ============================================================================

/// A span of source text, as byte offsets.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Source location attached to IR entities. Copy-able, no lifetime parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: PathRef,
    pub span: Span,
}

impl Location {
    pub const fn new(path: PathRef, span: Span) -> Self {
        Self { path, span }
    }
}

// ============================================================================
// Attribute
// ============================================================================

/// IR attribute values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Unit/nil value. Used for marker attributes such as `gpu.kernel`.
    Unit,
    Bool(bool),
    /// Integer constant stored as raw bits (signless).
    IntBits(u64),
    /// Float constant stored as raw bits.
    FloatBits(u64),
    String(String),
    Bytes(SmallVec<[u8; 16]>),
    Type(TypeRef),
    Symbol(Symbol),
    List(Vec<Attribute>),
    Location(Location),
}

impl Attribute {
    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Attribute::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeRef> {
        match self {
            Attribute::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_int_bits(&self) -> Option<u64> {
        match self {
            Attribute::IntBits(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Attribute::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::IntBits(u64::from_ne_bytes(value.to_ne_bytes()))
    }
}

impl From<u64> for Attribute {
    fn from(value: u64) -> Self {
        Attribute::IntBits(value)
    }
}

impl From<f64> for Attribute {
    fn from(value: f64) -> Self {
        Attribute::FloatBits(value.to_bits())
    }
}

impl From<bool> for Attribute {
    fn from(value: bool) -> Self {
        Attribute::Bool(value)
    }
}

impl From<Vec<Attribute>> for Attribute {
    fn from(value: Vec<Attribute>) -> Self {
        Attribute::List(value)
    }
}

impl From<Symbol> for Attribute {
    fn from(value: Symbol) -> Self {
        Attribute::Symbol(value)
    }
}

impl From<String> for Attribute {
    fn from(value: String) -> Self {
        Attribute::String(value)
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_string())
    }
}

impl From<Vec<u8>> for Attribute {
    fn from(value: Vec<u8>) -> Self {
        Attribute::Bytes(SmallVec::from_vec(value))
    }
}

// ============================================================================
// TypeData
// ============================================================================

/// Data for a single interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeData {
    pub dialect: Symbol,
    pub name: Symbol,
    pub params: SmallVec<[TypeRef; 4]>,
    pub attrs: BTreeMap<Symbol, Attribute>,
}

/// Builder for constructing `TypeData` with a fluent API.
pub struct TypeDataBuilder {
    dialect: Symbol,
    name: Symbol,
    params: SmallVec<[TypeRef; 4]>,
    attrs: BTreeMap<Symbol, Attribute>,
}

impl TypeDataBuilder {
    pub fn new(dialect: Symbol, name: Symbol) -> Self {
        Self {
            dialect,
            name,
            params: SmallVec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.params.push(ty);
        self
    }

    pub fn params(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.params.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attrs.insert(key.into(), val);
        self
    }

    pub fn build(self) -> TypeData {
        TypeData {
            dialect: self.dialect,
            name: self.name,
            params: self.params,
            attrs: self.attrs,
        }
    }
}

// ============================================================================
// TypeInterner
// ============================================================================

/// Deduplicating type interner. Same `TypeData` always yields the same `TypeRef`.
pub struct TypeInterner {
    types: PrimaryMap<TypeRef, TypeData>,
    dedup: HashMap<TypeData, TypeRef>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self {
            types: PrimaryMap::new(),
            dedup: HashMap::default(),
        }
    }

    /// Intern a type, returning an existing ref if the data matches.
    pub fn intern(&mut self, data: TypeData) -> TypeRef {
        if let Some(&existing) = self.dedup.get(&data) {
            return existing;
        }
        let r = self.types.push(data.clone());
        self.dedup.insert(data, r);
        r
    }

    /// Look up type data by reference.
    pub fn get(&self, r: TypeRef) -> &TypeData {
        &self.types[r]
    }

    /// Check if this type matches the given dialect and name.
    pub fn is_dialect(&self, r: TypeRef, dialect: &str, name: &str) -> bool {
        let data = &self.types[r];
        data.dialect == dialect && data.name == name
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PathInterner
// ============================================================================

/// Deduplicating path (URI string) interner.
pub struct PathInterner {
    paths: PrimaryMap<PathRef, String>,
    dedup: HashMap<String, PathRef>,
}

impl PathInterner {
    pub fn new() -> Self {
        Self {
            paths: PrimaryMap::new(),
            dedup: HashMap::default(),
        }
    }

    /// Intern a path string, returning an existing ref if the string matches.
    pub fn intern(&mut self, path: String) -> PathRef {
        if let Some(&existing) = self.dedup.get(&path) {
            return existing;
        }
        let r = self.paths.push(path.clone());
        self.dedup.insert(path, r);
        r
    }

    /// Look up path string by reference.
    pub fn get(&self, r: PathRef) -> &str {
        &self.paths[r]
    }
}

impl Default for PathInterner {
    fn default() -> Self {
        Self::new()
    }
}
