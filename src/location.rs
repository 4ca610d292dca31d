//! Source-Location Index (component 2, §4.2): per-side lookup of the byte
//! range a node, or a specific member of a node, occupies in its source
//! file. Backed by the `CodeGeneratorRequest`'s `sourceInfo` side table
//! rather than the node's own inline range, which annotations get wrong.

use std::collections::HashMap;

use crate::schema::{Node, Schema};

/// A half-open `[start, end)` byte range within a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub start_byte: u32,
    pub end_byte: u32,
}

impl SourceLocation {
    #[must_use]
    pub fn new(start_byte: u32, end_byte: u32) -> Self {
        Self { start_byte, end_byte }
    }

    /// A present-but-empty entry in the `sourceInfo` table: both ends zero.
    /// Such entries are treated as if absent (§4.2).
    #[must_use]
    fn is_absent(&self) -> bool {
        self.start_byte == 0 && self.end_byte == 0
    }
}

/// Resolves node and member locations for one side of a diff.
pub struct SourceLocationIndex {
    nodes: HashMap<u64, SourceLocation>,
    members: HashMap<(u64, u16), SourceLocation>,
}

impl SourceLocationIndex {
    #[must_use]
    pub fn build(schema: &Schema) -> Self {
        let mut nodes = HashMap::new();
        let mut members = HashMap::new();

        for entry in &schema.source_info {
            let range = SourceLocation::new(entry.start_byte, entry.end_byte);
            if !range.is_absent() {
                nodes.insert(entry.node_id, range);
            }
            for &(ordinal, start, end) in &entry.members {
                let range = SourceLocation::new(start, end);
                if !range.is_absent() {
                    members.insert((entry.node_id, ordinal), range);
                }
            }
        }

        Self { nodes, members }
    }

    /// The range for a node itself. Falls back to the node's inline range
    /// when the side table has no entry (or none at all, as `sourceInfo` is
    /// optional); for annotations the side table always wins when present,
    /// since `Node::start_byte`/`end_byte` for an annotation node names the
    /// annotation *declaration*, not its use site.
    #[must_use]
    pub fn node_location(&self, node: &Node) -> SourceLocation {
        self.nodes
            .get(&node.node_id)
            .copied()
            .unwrap_or_else(|| SourceLocation::new(node.start_byte, node.end_byte))
    }

    /// The range for a specific member (field, enumerant, or method) of
    /// `node`, addressed by its ordinal. Falls back to the node's own range
    /// when no member-specific entry exists.
    #[must_use]
    pub fn member_location(&self, node: &Node, ordinal: u16) -> SourceLocation {
        self.members
            .get(&(node.node_id, ordinal))
            .copied()
            .unwrap_or_else(|| self.node_location(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{NodePayload, SourceInfoEntry};

    fn file_node() -> Node {
        Node {
            node_id: 1,
            display_name: "a.capnp".to_string(),
            display_name_prefix_len: 0,
            scope_id: 0,
            nested_nodes: vec![],
            payload: NodePayload::File,
            start_byte: 0,
            end_byte: 100,
        }
    }

    #[test]
    fn falls_back_to_inline_range_when_no_side_table_entry() {
        let node = file_node();
        let schema = Schema { nodes: vec![node.clone()], source_info: vec![] };
        let index = SourceLocationIndex::build(&schema);
        assert_eq!(index.node_location(&node), SourceLocation::new(0, 100));
    }

    #[test]
    fn side_table_entry_takes_precedence() {
        let node = file_node();
        let schema = Schema {
            nodes: vec![node.clone()],
            source_info: vec![SourceInfoEntry {
                node_id: 1,
                start_byte: 10,
                end_byte: 20,
                members: vec![(0, 12, 15), (1, 0, 0)],
            }],
        };
        let index = SourceLocationIndex::build(&schema);
        assert_eq!(index.node_location(&node), SourceLocation::new(10, 20));
        assert_eq!(index.member_location(&node, 0), SourceLocation::new(12, 15));
        // Ordinal 1's entry is present but zero-width, so it's treated as
        // absent and falls back to the node's own range.
        assert_eq!(index.member_location(&node, 1), SourceLocation::new(10, 20));
        // No entry at all for ordinal 2.
        assert_eq!(index.member_location(&node, 2), SourceLocation::new(10, 20));
    }
}
