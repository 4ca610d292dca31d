//! Type Compatibility (component 3, §4.3): classifies a type change as
//! `Same`, `Equivalent`, `Compatible` (wire-safe but source-breaking), or
//! `Incompatible`.

use std::fmt;

use crate::index::NodeIndex;
use crate::message::ElementSize;
use crate::schema::{NodePayload, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compat {
    Same,
    /// Reserved for future generic-type handling; never produced today; see
    /// the open question recorded for this crate.
    Equivalent,
    Compatible,
    Incompatible,
}

/// A type pair `compat` recognizes but cannot fully analyze: the soft,
/// recoverable half of the error duality described for this crate. The
/// differ converts this into an `unsupported` change record rather than
/// aborting.
///
/// `MissingNode` is the exception: a struct-upgrade check that dereferences
/// a dangling type id into the new schema's node index is not an
/// unanalyzable *type pair*, it's the same "caller handed us a malformed
/// tree" programmer error `NodeIndex::get` reports everywhere else (§4.1),
/// so the differ re-raises it as `DifferError::MissingNode` rather than
/// emitting a soft `unsupported` change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatError {
    /// Either side referenced a struct or interface with a non-empty brand
    /// scope (a generic instantiation), which this crate does not compare.
    UnsupportedGenerics,
    /// A `List(struct S)` upgrade check needed to resolve `S` in the new
    /// schema's node index, and `S`'s id had no entry there.
    MissingNode(u64),
}

impl fmt::Display for CompatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedGenerics => {
                write!(f, "generic struct or interface instantiation is not supported")
            }
            Self::MissingNode(id) => write!(f, "no node with id {id:#x} in the node index"),
        }
    }
}

impl std::error::Error for CompatError {}

/// Classifies the change from `old` to `new`. `new_index` resolves struct,
/// interface, and enum identifiers on the new side for kind/identifier
/// comparisons (the old side's identifiers are compared directly, not
/// resolved, since only equality of the raw id matters here).
pub fn compat(old: &Type, new: &Type, new_index: &NodeIndex<'_>) -> Result<Compat, CompatError> {
    // Struct/interface brand scopes must reject *before* the `old == new`
    // fast path below: `BrandScope`'s `PartialEq` is trivially-true (see its
    // impl in `schema.rs`), so two equal-length non-empty scope lists would
    // otherwise make `old == new` hold and short-circuit straight to `Same`,
    // silently accepting a generic instantiation the rest of this function
    // is supposed to reject unconditionally.
    match (old, new) {
        (Type::Struct(old_id, old_scopes), Type::Struct(new_id, new_scopes)) => {
            if !old_scopes.is_empty() || !new_scopes.is_empty() {
                return Err(CompatError::UnsupportedGenerics);
            }
            return Ok(if old_id == new_id { Compat::Same } else { Compat::Incompatible });
        }
        (Type::Interface(old_id, old_scopes), Type::Interface(new_id, new_scopes)) => {
            if !old_scopes.is_empty() || !new_scopes.is_empty() {
                return Err(CompatError::UnsupportedGenerics);
            }
            return Ok(if old_id == new_id { Compat::Same } else { Compat::Incompatible });
        }
        _ => {}
    }

    if old == new {
        return Ok(Compat::Same);
    }

    match (old, new) {
        // Any-pointer upgrade: new widens to AnyPointer from any pointer-typed old.
        (Type::Text | Type::Data | Type::List(_) | Type::Struct(..) | Type::Interface(..), Type::AnyPointer) => {
            Ok(Compat::Compatible)
        }
        // Enums encode as unsigned 16-bit integers on the wire.
        (Type::Enum(_), Type::UInt16) => Ok(Compat::Compatible),
        // data <-> text and data <-> List(UInt8) share the same blob layout.
        (Type::Text, Type::Data) => Ok(Compat::Compatible),
        (Type::List(elem), Type::Data) if is_u8_list(elem) => Ok(Compat::Compatible),
        (Type::Data, Type::List(elem)) if is_u8_list(elem) => Ok(Compat::Compatible),
        // Struct-upgrade rule: List(primitive-other-than-bool | text | data | list)
        // can be reinterpreted as List(struct) when the struct's first field
        // matches the element kind.
        (Type::List(old_elem), Type::List(new_elem)) => {
            if let Type::Struct(new_id, new_scopes) = new_elem.as_ref() {
                if new_scopes.is_empty()
                    && struct_upgrade_matches(old_elem)
                    && struct_first_field_matches(old_elem, *new_id, new_index)?
                {
                    return Ok(Compat::Compatible);
                }
            }
            compat(old_elem, new_elem, new_index)
        }
        (Type::Enum(old_id), Type::Enum(new_id)) => {
            Ok(if old_id == new_id { Compat::Same } else { Compat::Incompatible })
        }
        _ => Ok(Compat::Incompatible),
    }
}

/// Whether `elem` is a primitive (other than bool), text, data, or list -
/// the set of element kinds the struct-upgrade rule allows promoting from.
fn struct_upgrade_matches(elem: &Type) -> bool {
    match elem {
        Type::Bool => false,
        Type::Void
        | Type::Int8
        | Type::Int16
        | Type::Int32
        | Type::Int64
        | Type::UInt8
        | Type::UInt16
        | Type::UInt32
        | Type::UInt64
        | Type::Float32
        | Type::Float64
        | Type::Text
        | Type::Data
        | Type::List(_) => true,
        Type::Enum(_) | Type::Struct(..) | Type::Interface(..) | Type::AnyPointer => false,
    }
}

fn is_u8_list(elem: &Type) -> bool {
    matches!(elem, Type::UInt8)
}

/// Whether `elem` (a `List` element type already known eligible by
/// [`struct_upgrade_matches`]) has the same wire representation as `new_id`'s
/// first field, which is what actually makes `List(elem)` and
/// `List(struct)` layout-compatible: the struct's first field must start at
/// offset zero with the same size class as the bare element it replaces. A
/// struct with no fields, or whose first field is a group rather than a
/// slot, never matches.
fn struct_first_field_matches(elem: &Type, new_id: u64, new_index: &NodeIndex<'_>) -> Result<bool, CompatError> {
    let node = new_index.get(new_id).map_err(|_| CompatError::MissingNode(new_id))?;
    let NodePayload::Struct { fields } = &node.payload else {
        return Ok(false);
    };
    let Some(first) = fields.iter().min_by_key(|f| f.ordinal.value()) else {
        return Ok(false);
    };
    let crate::schema::FieldKind::Slot { type_: first_type, .. } = &first.kind else {
        return Ok(false);
    };
    Ok(element_size_of(elem) == element_size_of(first_type))
}

/// The wire size class of a type as it would appear as a list element or a
/// struct's first field - i.e. `crate::message::ElementSize`, reused here
/// since the struct-upgrade rule is exactly the "does this fit in the same
/// slot" question that enum already models.
fn element_size_of(t: &Type) -> ElementSize {
    match t {
        Type::Void => ElementSize::Void,
        Type::Bool => ElementSize::Bit,
        Type::Int8 | Type::UInt8 => ElementSize::Byte,
        Type::Int16 | Type::UInt16 | Type::Enum(_) => ElementSize::TwoBytes,
        Type::Int32 | Type::UInt32 | Type::Float32 => ElementSize::FourBytes,
        Type::Int64 | Type::UInt64 | Type::Float64 => ElementSize::EightBytes,
        Type::Text | Type::Data | Type::List(_) | Type::Struct(..) | Type::Interface(..) | Type::AnyPointer => {
            ElementSize::Pointer
        }
    }
}
