//! Semantic differ for Cap'n Proto schemas.
//!
//! Given two decoded `CodeGeneratorRequest`s, [`diff`] classifies every
//! addition, removal, rename, and type change between them as source- or
//! wire-breaking (or neither), and returns a sorted, packaged change list.

pub mod change;
pub mod compat;
mod differ;
pub mod error;
pub mod index;
pub mod location;
pub mod message;
pub mod schema;
pub mod value_eq;

pub use self::change::{Breakage, Change, ChangeKind, FileEntry, NodeRef, RefKind, SchemaDiff, TypedRef, TypedRefKind};
pub use self::compat::{compat, Compat, CompatError};
pub use self::differ::diff;
pub use self::error::DifferError;
pub use self::index::NodeIndex;
pub use self::location::{SourceLocation, SourceLocationIndex};
pub use self::schema::Schema;
pub use self::value_eq::{value_eq, ValueEqError};
