//! Change records and the output packaging step (component 6, §4.6 and §6).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::schema::NodeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Breakage {
    None,
    Code,
    Wire,
}

/// Which kind of schema entity a [`NodeRef`] names. Mirrors [`NodeKind`] but
/// is its own type since a future node kind shouldn't silently widen the
/// wire-facing change-kind union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefKind {
    File,
    Struct,
    Enum,
    Interface,
    Const,
    Annotation,
    Field,
    Enumerant,
    Method,
}

impl From<NodeKind> for RefKind {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::File => Self::File,
            NodeKind::Struct => Self::Struct,
            NodeKind::Enum => Self::Enum,
            NodeKind::Interface => Self::Interface,
            NodeKind::Const => Self::Const,
            NodeKind::Annotation => Self::Annotation,
        }
    }
}

/// A reference to the node or member a change is about. Non-member refs
/// carry just the entity's own id; member refs additionally carry an
/// ordinal and reuse `id` as the *parent* node's id (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRef {
    pub kind: RefKind,
    pub id: u64,
    pub short_name: String,
    pub ordinal: Option<u16>,
}

impl NodeRef {
    #[must_use]
    pub fn node(kind: RefKind, id: u64, short_name: impl Into<String>) -> Self {
        Self { kind, id, short_name: short_name.into(), ordinal: None }
    }

    #[must_use]
    pub fn member(kind: RefKind, parent_id: u64, short_name: impl Into<String>, ordinal: u16) -> Self {
        Self { kind, id: parent_id, short_name: short_name.into(), ordinal: Some(ordinal) }
    }
}

/// The reduced kind set used for type-change events, per §6: a type change
/// can happen on a const, an annotation, a field, or one side of a method
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TypedRefKind {
    Const,
    Annotation,
    Field,
    MethodInput,
    MethodOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedRef {
    pub kind: TypedRefKind,
    pub parent_id: u64,
    pub short_name: String,
    pub ordinal: Option<u16>,
}

/// The tagged union of change kinds the differ can emit. 11 of the 28
/// ordinals the wire schema reserves are in use; the rest are left for
/// future extension and have no corresponding variant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeKind {
    NodeAdded { node: NodeRef },
    NodeRemoved { node: NodeRef },
    NodeRenamed { node: NodeRef, old_name: String },
    NodeIdChanged { node: NodeRef, old_id: u64 },
    MemberOrdinalChanged { node: NodeRef, old_ordinal: u16 },
    NodeTypeChanged { node: TypedRef },
    FieldDefaultValueChanged { node: NodeRef },
    ConstValueChanged { node: NodeRef },
    AnnotationTargetAdded { node: NodeRef, target: String },
    AnnotationTargetRemoved { node: NodeRef, target: String },
    Unsupported { node: NodeRef, reason: String },
}

/// A single classified schema difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub breakage: Breakage,
    pub file_id: u64,
    pub start_byte: u32,
    pub end_byte: u32,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: u64,
    pub path: String,
}

/// The packaged output of a diff: a sorted change list plus the file table
/// needed to resolve each change's `file_id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    pub changes: Vec<Change>,
    pub files: Vec<FileEntry>,
}

/// Sorts changes by `(file path, start byte)` and builds the file table
/// from exactly the files referenced by at least one change - §4.6's
/// "file-set closure" invariant, which keeps the output table from growing
/// with every file in the compilation unit regardless of relevance.
///
/// `file_path` resolves a file id to its path, for both sides of the diff
/// (a path for a file removed entirely still needs to be in the table).
pub fn package(mut changes: Vec<Change>, file_path: impl Fn(u64) -> Option<String>) -> SchemaDiff {
    changes.sort_by(|a, b| {
        let a_path = file_path(a.file_id).unwrap_or_default();
        let b_path = file_path(b.file_id).unwrap_or_default();
        a_path.cmp(&b_path).then(a.start_byte.cmp(&b.start_byte))
    });

    let mut seen = BTreeSet::new();
    let mut files = Vec::new();
    for change in &changes {
        if seen.insert(change.file_id) {
            if let Some(path) = file_path(change.file_id) {
                files.push(FileEntry { id: change.file_id, path });
            }
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));

    SchemaDiff { changes, files }
}
