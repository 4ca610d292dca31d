//! Hard-abort errors. These are the "implementation errors" population from
//! §7: inputs the differ recognizes as unsupported by construction, or
//! invariant violations in the input trees themselves. They abort the whole
//! diff, unlike the soft `unsupported` change records `compat`/`value_eq`
//! can also produce (see `CompatError` and `ValueEqError`).

use std::fmt;

use crate::message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifferError {
    /// A node identifier referenced by a parent/type/value had no entry in
    /// the node index it was looked up in.
    MissingNode(u64),
    /// A far pointer surfaced while reading a default or const value; the
    /// schema loader is expected to have already flattened these.
    UnresolvedFarPointer,
    /// An interface (capability) pointer surfaced inside a value default;
    /// the only legal interface-typed default is null.
    NonNullInterfacePointer,
    /// An interface method declared generic parameters, which this crate
    /// does not support diffing.
    UnsupportedGenericMethod { interface_id: u64, method_ordinal: u16 },
    /// An interface method declared implicit parameters, which this crate
    /// does not support diffing.
    UnsupportedImplicitParams { interface_id: u64, method_ordinal: u16 },
    /// A malformed pointer (out-of-range segment/word offset, unknown
    /// element-size tag, ...) while reading a value's payload.
    ReadPointer(message::Error),
}

impl fmt::Display for DifferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNode(id) => write!(f, "no node with id {id:#x} in the node index"),
            Self::UnresolvedFarPointer => {
                write!(f, "unresolved far pointer in a default or const value")
            }
            Self::NonNullInterfacePointer => {
                write!(f, "non-null interface pointer in a default or const value")
            }
            Self::UnsupportedGenericMethod {
                interface_id,
                method_ordinal,
            } => write!(
                f,
                "method @{method_ordinal} on interface {interface_id:#x} declares generic parameters, which is unsupported"
            ),
            Self::UnsupportedImplicitParams {
                interface_id,
                method_ordinal,
            } => write!(
                f,
                "method @{method_ordinal} on interface {interface_id:#x} declares implicit parameters, which is unsupported"
            ),
            Self::ReadPointer(err) => write!(f, "reading value payload: {err}"),
        }
    }
}

impl std::error::Error for DifferError {}

impl From<message::Error> for DifferError {
    fn from(err: message::Error) -> Self {
        match err {
            message::Error::FarPointer => Self::UnresolvedFarPointer,
            other => Self::ReadPointer(other),
        }
    }
}
