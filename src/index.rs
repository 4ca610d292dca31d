//! Node Index (component 1, §4.1): lookup of schema nodes by their stable
//! identifier, and derivation of the file a node lives in.

use std::collections::HashMap;

use crate::error::DifferError;
use crate::schema::{Node, NodeKind, Schema};

/// Flat `node_id -> Node` lookup over one side of a diff, plus the derived
/// "which file is this node in" relationship.
pub struct NodeIndex<'schema> {
    by_id: HashMap<u64, &'schema Node>,
}

impl<'schema> NodeIndex<'schema> {
    #[must_use]
    pub fn build(schema: &'schema Schema) -> Self {
        let by_id = schema.nodes.iter().map(|n| (n.node_id, n)).collect();
        Self { by_id }
    }

    /// Looks up a node. Per §4.1, an unknown identifier is a programmer
    /// error: the caller handed the differ a schema with a dangling
    /// reference.
    pub fn get(&self, node_id: u64) -> Result<&'schema Node, DifferError> {
        self.by_id.get(&node_id).copied().ok_or(DifferError::MissingNode(node_id))
    }

    /// The id of the file node containing `node_id`, walking the `scope_id`
    /// chain. Returns `None` for synthetic nodes (`scope_id == 0` and not
    /// itself a file) such as an auto-generated method parameter struct.
    pub fn containing_file(&self, node_id: u64) -> Result<Option<u64>, DifferError> {
        let mut current = self.get(node_id)?;
        loop {
            if current.kind() == NodeKind::File {
                return Ok(Some(current.node_id));
            }
            if current.scope_id == 0 {
                return Ok(None);
            }
            current = self.get(current.scope_id)?;
        }
    }

    /// A node with `scope_id == 0` that is not itself a file: an
    /// auto-generated anonymous struct (e.g. a method's parameter or result
    /// struct), diffed transparently at the enclosing method's level.
    #[must_use]
    pub fn is_synthetic(&self, node: &Node) -> bool {
        node.scope_id == 0 && node.kind() != NodeKind::File
    }
}
