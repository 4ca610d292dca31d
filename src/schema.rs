//! The schema data model: the decoded shape of a Cap'n Proto
//! `CodeGeneratorRequest`, as handed to the differ by the (out-of-scope)
//! schema loader. Everything here is owned and lifetime-free except the
//! pointer-typed [`Value`] payloads, which borrow into a [`crate::message::Message`]
//! via a cheap `Arc` handle rather than being decoded eagerly - see
//! `crate::message` for why.

use crate::message::PointerRef;

/// The kind of entity a [`Node`] declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Struct,
    Enum,
    Interface,
    Const,
    Annotation,
}

/// An entry in a node's `nestedNodes` list: a short name visible in the
/// declaring scope, and the node it refers to.
#[derive(Debug, Clone)]
pub struct NestedNode {
    pub name: String,
    pub node_id: u64,
}

/// A generic-parameter binding on a referenced struct or interface type.
/// A non-empty list of these on a [`Type::Struct`] or [`Type::Interface`]
/// means the reference is generic, which this crate does not support.
#[derive(Debug, Clone)]
pub struct BrandScope {
    pub scope_id: u64,
    pub bindings: Vec<Type>,
}

/// A Cap'n Proto type as it appears on a field, const, or method parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Text,
    Data,
    List(Box<Type>),
    Enum(u64),
    Struct(u64, Vec<BrandScope>),
    Interface(u64, Vec<BrandScope>),
    AnyPointer,
}

// `BrandScope` only ever participates in equality through "is this list
// empty", so `Type`'s derived `PartialEq` would otherwise require one on
// `BrandScope` too; a structural one is fine, nothing compares scopes by
// content.
impl PartialEq for BrandScope {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Type {
    /// Non-empty brand scopes mean a generic instantiation, which `compat`
    /// rejects with `CompatError::UnsupportedGenerics`.
    #[must_use]
    pub fn brand_scopes(&self) -> &[BrandScope] {
        match self {
            Self::Struct(_, scopes) | Self::Interface(_, scopes) => scopes,
            _ => &[],
        }
    }
}

/// A Cap'n Proto value, as found in a field's default or a const's value.
/// Pointer-typed variants hold a handle into the owning message's segments
/// rather than a decoded Rust value - see `crate::message`.
#[derive(Debug, Clone)]
pub enum Value {
    Void,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    /// The enumerant's integer code. Kept distinct from `UInt16` so
    /// `value_eq` can special-case the enum-vs-uint16 cross-kind comparison
    /// the compatibility table allows.
    Enum(u16),
    Text(PointerRef),
    Data(PointerRef),
    List(PointerRef),
    Struct(PointerRef),
    Interface(PointerRef),
    AnyPointer(PointerRef),
}

/// An explicit-or-implicit wire ordinal, per §3 / GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ordinal {
    /// Assigned by declaration order; no `@N` was written.
    Implicit(u16),
    /// Written explicitly as `@N` in source.
    Explicit(u16),
}

impl Ordinal {
    #[must_use]
    pub fn value(&self) -> u16 {
        match self {
            Self::Implicit(v) | Self::Explicit(v) => *v,
        }
    }
}

/// A struct field. Named `slot` when it carries a type and default value
/// directly, or `group` when it's a named union of an anonymous nested
/// struct's fields.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Slot { type_: Type, default_value: Value },
    Group { type_id: u64 },
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ordinal: Ordinal,
    pub kind: FieldKind,
}

/// An enum variant. Enumerants have no `@N` syntax of their own; their
/// ordinal is purely positional.
#[derive(Debug, Clone)]
pub struct Enumerant {
    pub name: String,
    pub ordinal: u16,
}

/// An interface method. Non-zero `generic_param_count` or
/// `implicit_param_count` means the method cannot be diffed - see
/// `DifferError::UnsupportedGenericMethod` / `UnsupportedImplicitParams`.
#[derive(Debug, Clone)]
pub struct Method {
    pub name: String,
    pub ordinal: u16,
    pub param_struct_type: u64,
    pub result_struct_type: u64,
    pub generic_param_count: u16,
    pub implicit_param_count: u16,
}

/// The twelve targets an annotation can declare itself applicable to, per
/// `schema.capnp`'s `Annotation.targets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationTarget {
    File,
    Const,
    Enum,
    Enumerant,
    Struct,
    Field,
    Union,
    Group,
    Interface,
    Method,
    Param,
    Annotation,
}

impl AnnotationTarget {
    pub const ALL: [Self; 12] = [
        Self::File,
        Self::Const,
        Self::Enum,
        Self::Enumerant,
        Self::Struct,
        Self::Field,
        Self::Union,
        Self::Group,
        Self::Interface,
        Self::Method,
        Self::Param,
        Self::Annotation,
    ];
}

/// Which of the twelve `AnnotationTarget`s an annotation node declares
/// itself applicable to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationTargets {
    pub file: bool,
    pub const_: bool,
    pub enum_: bool,
    pub enumerant: bool,
    pub struct_: bool,
    pub field: bool,
    pub union_: bool,
    pub group: bool,
    pub interface: bool,
    pub method: bool,
    pub param: bool,
    pub annotation: bool,
}

impl AnnotationTargets {
    #[must_use]
    pub fn get(&self, target: AnnotationTarget) -> bool {
        match target {
            AnnotationTarget::File => self.file,
            AnnotationTarget::Const => self.const_,
            AnnotationTarget::Enum => self.enum_,
            AnnotationTarget::Enumerant => self.enumerant,
            AnnotationTarget::Struct => self.struct_,
            AnnotationTarget::Field => self.field,
            AnnotationTarget::Union => self.union_,
            AnnotationTarget::Group => self.group,
            AnnotationTarget::Interface => self.interface,
            AnnotationTarget::Method => self.method,
            AnnotationTarget::Param => self.param,
            AnnotationTarget::Annotation => self.annotation,
        }
    }
}

/// The kind-specific payload of a [`Node`].
#[derive(Debug, Clone)]
pub enum NodePayload {
    File,
    Struct { fields: Vec<Field> },
    Enum { enumerants: Vec<Enumerant> },
    Interface { methods: Vec<Method> },
    Const { type_: Type, value: Value },
    Annotation { type_: Type, targets: AnnotationTargets },
}

impl NodePayload {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::File => NodeKind::File,
            Self::Struct { .. } => NodeKind::Struct,
            Self::Enum { .. } => NodeKind::Enum,
            Self::Interface { .. } => NodeKind::Interface,
            Self::Const { .. } => NodeKind::Const,
            Self::Annotation { .. } => NodeKind::Annotation,
        }
    }
}

/// A schema node: the unit of declaration (file, struct, enum, interface,
/// const, annotation), uniquely identified by `node_id`.
#[derive(Debug, Clone)]
pub struct Node {
    pub node_id: u64,
    pub display_name: String,
    pub display_name_prefix_len: u32,
    pub scope_id: u64,
    pub nested_nodes: Vec<NestedNode>,
    pub payload: NodePayload,
    /// Inline byte range. For annotations this may be wrong - per §4.2, the
    /// side table in `SourceLocationIndex` always takes precedence.
    pub start_byte: u32,
    pub end_byte: u32,
}

impl Node {
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    /// The node's display name with its scope prefix stripped.
    #[must_use]
    pub fn short_name(&self) -> &str {
        &self.display_name[self.display_name_prefix_len as usize..]
    }

    /// For a file node, the display name *is* its path.
    #[must_use]
    pub fn file_path(&self) -> Option<&str> {
        matches!(self.kind(), NodeKind::File).then(|| self.display_name.as_str())
    }
}

/// A `(start_byte, end_byte)` entry in a `CodeGeneratorRequest`'s
/// `sourceInfo` table: the node's own range, plus one range per direct
/// member (field, enumerant, or method), addressed positionally by ordinal.
#[derive(Debug, Clone)]
pub struct SourceInfoEntry {
    pub node_id: u64,
    pub start_byte: u32,
    pub end_byte: u32,
    /// `(ordinal, start_byte, end_byte)`; a member entry with `start_byte ==
    /// end_byte == 0` is treated as absent (§4.2).
    pub members: Vec<(u16, u32, u32)>,
}

/// One parsed schema request: a flat node list plus the source-info side
/// table the compiler emits alongside it.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub nodes: Vec<Node>,
    pub source_info: Vec<SourceInfoEntry>,
}
