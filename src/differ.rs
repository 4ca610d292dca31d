//! Schema Differ (component 5, §4.5): the top-level algorithm that walks two
//! schemas in lockstep, pairs nodes, detects lifecycle events, recurses into
//! struct/enum/interface/const/annotation bodies, and emits [`Change`]
//! records with breakage levels. Everything upstream of this module (the
//! node index, source-location index, `compat`, `value_eq`) is a pure leaf;
//! this is where their results get turned into the output change stream.

use log::{debug, warn};

use crate::change::{
    package, Breakage, Change, ChangeKind, NodeRef, RefKind, SchemaDiff, TypedRef, TypedRefKind,
};
use crate::compat::{compat, Compat, CompatError};
use crate::error::DifferError;
use crate::index::NodeIndex;
use crate::location::SourceLocationIndex;
use crate::schema::{
    AnnotationTarget, AnnotationTargets, Enumerant, Field, FieldKind, Method, Node, NodeKind,
    NodePayload, Schema, Type, Value,
};
use crate::value_eq::{value_eq, ValueEqError};

/// Diffs `old` against `new`, producing a sorted, packaged [`SchemaDiff`].
///
/// Per §5, this is a pure function of its two inputs: it allocates its own
/// indices, walks both trees exhaustively, and returns a fully materialized
/// result without retaining any reference into either schema.
pub fn diff(old: &Schema, new: &Schema) -> Result<SchemaDiff, DifferError> {
    let old_index = NodeIndex::build(old);
    let new_index = NodeIndex::build(new);
    let old_loc = SourceLocationIndex::build(old);
    let new_loc = SourceLocationIndex::build(new);

    let mut ctx = Ctx {
        old_index: &old_index,
        new_index: &new_index,
        old_loc: &old_loc,
        new_loc: &new_loc,
        changes: Vec::new(),
    };
    ctx.diff_files(old, new)?;
    let changes = ctx.changes;

    Ok(package(changes, |file_id| {
        new_index
            .get(file_id)
            .ok()
            .and_then(Node::file_path)
            .or_else(|| old_index.get(file_id).ok().and_then(Node::file_path))
            .map(str::to_string)
    }))
}

/// Per-invocation state: the two node/location indices and the change
/// records emitted so far. Dropped at the end of [`diff`]; nothing here
/// outlives a single call.
struct Ctx<'a> {
    old_index: &'a NodeIndex<'a>,
    new_index: &'a NodeIndex<'a>,
    old_loc: &'a SourceLocationIndex,
    new_loc: &'a SourceLocationIndex,
    changes: Vec<Change>,
}

/// A struct field, enum enumerant, or interface method: the three kinds
/// that flow through the generic member-diffing algorithm of §4.5.
trait MemberItem {
    fn member_name(&self) -> &str;
    fn member_ordinal(&self) -> u16;
}

impl MemberItem for Field {
    fn member_name(&self) -> &str {
        &self.name
    }

    fn member_ordinal(&self) -> u16 {
        self.ordinal.value()
    }
}

impl MemberItem for Enumerant {
    fn member_name(&self) -> &str {
        &self.name
    }

    fn member_ordinal(&self) -> u16 {
        self.ordinal
    }
}

impl MemberItem for Method {
    fn member_name(&self) -> &str {
        &self.name
    }

    fn member_ordinal(&self) -> u16 {
        self.ordinal
    }
}

/// The outcome of pairing one old member position against the new list, per
/// the member-diffing algorithm in §4.5.
enum MemberAction {
    Same { old_idx: usize, new_idx: usize },
    Renamed { old_idx: usize, new_idx: usize },
    OrdinalChanged { old_idx: usize, new_idx: usize },
    Removed { old_idx: usize },
    Added { new_idx: usize },
}

/// Pairs `old` members against `new` members by position within the common
/// prefix, falling back to a name search for reorderings and renames.
/// Ties among multiple same-named candidates go to the lowest new index.
fn pair_members<T: MemberItem>(old: &[T], new: &[T]) -> Vec<MemberAction> {
    let common = old.len().min(new.len());
    let mut consumed_new = vec![false; new.len()];
    let mut actions = Vec::with_capacity(old.len().max(new.len()));

    for i in 0..common {
        if old[i].member_name() == new[i].member_name() {
            actions.push(MemberAction::Same { old_idx: i, new_idx: i });
            consumed_new[i] = true;
            continue;
        }
        let fallback = new.iter().enumerate().find_map(|(idx, m)| {
            (!consumed_new[idx] && m.member_name() == old[i].member_name()).then_some(idx)
        });
        match fallback {
            Some(j) => {
                actions.push(MemberAction::OrdinalChanged { old_idx: i, new_idx: j });
                consumed_new[j] = true;
            }
            None => {
                actions.push(MemberAction::Renamed { old_idx: i, new_idx: i });
                consumed_new[i] = true;
            }
        }
    }
    for i in common..old.len() {
        actions.push(MemberAction::Removed { old_idx: i });
    }
    for (j, consumed) in consumed_new.into_iter().enumerate() {
        if !consumed {
            actions.push(MemberAction::Added { new_idx: j });
        }
    }
    actions
}

fn target_name(target: AnnotationTarget) -> &'static str {
    match target {
        AnnotationTarget::File => "file",
        AnnotationTarget::Const => "const",
        AnnotationTarget::Enum => "enum",
        AnnotationTarget::Enumerant => "enumerant",
        AnnotationTarget::Struct => "struct",
        AnnotationTarget::Field => "field",
        AnnotationTarget::Union => "union",
        AnnotationTarget::Group => "group",
        AnnotationTarget::Interface => "interface",
        AnnotationTarget::Method => "method",
        AnnotationTarget::Param => "param",
        AnnotationTarget::Annotation => "annotation",
    }
}

/// Reason string for a `CompatError::UnsupportedGenerics`, shared across the
/// three call sites (field, const, annotation) that surface it as an
/// `unsupported` change rather than aborting.
const UNSUPPORTED_GENERICS_REASON: &str =
    "generic struct or interface instantiation is not supported";

impl<'a> Ctx<'a> {
    /// File pairing (§4.5 "File pairing"): files are matched by stable
    /// identifier only, never by path heuristics (see the crate's
    /// non-goals). Paired files recurse through the ordinary node-pairing
    /// machinery; unpaired ones get a single added/removed change apiece.
    fn diff_files(&mut self, old: &Schema, new: &Schema) -> Result<(), DifferError> {
        let old_files: Vec<&Node> =
            old.nodes.iter().filter(|n| n.kind() == NodeKind::File).collect();
        let new_files: Vec<&Node> =
            new.nodes.iter().filter(|n| n.kind() == NodeKind::File).collect();

        for old_file in &old_files {
            if !new_files.iter().any(|n| n.node_id == old_file.node_id) {
                self.emit_removed_node(old_file, old_file.node_id);
            }
        }
        for new_file in &new_files {
            if !old_files.iter().any(|n| n.node_id == new_file.node_id) {
                self.emit_added_node(new_file, new_file.node_id);
            }
        }
        for old_file in &old_files {
            if let Some(new_file) = new_files.iter().find(|n| n.node_id == old_file.node_id) {
                self.diff_node_pair(old_file, new_file, old_file.node_id)?;
            }
        }
        Ok(())
    }

    /// Node pairing (§4.5 "Node pairing"): `old_node`/`new_node` share a
    /// stable identifier (established by the caller, whether that was file
    /// pairing, nested-node id matching, or a name fallback). Dispatches by
    /// kind, then recurses into nested declarations regardless of whether
    /// the kinds matched, since sub-trees can persist under a changed
    /// parent kind.
    fn diff_node_pair(
        &mut self,
        old_node: &Node,
        new_node: &Node,
        file_id: u64,
    ) -> Result<(), DifferError> {
        if old_node.kind() != new_node.kind() {
            debug!(
                "node {:#x} changed kind from {:?} to {:?}",
                old_node.node_id,
                old_node.kind(),
                new_node.kind()
            );
            self.emit_removed_node(old_node, file_id);
            self.emit_added_node(new_node, file_id);
            return self.diff_nested(old_node, new_node, file_id);
        }

        if old_node.short_name() != new_node.short_name() {
            let loc = self.new_loc.node_location(new_node);
            self.changes.push(Change {
                breakage: Breakage::Code,
                file_id,
                start_byte: loc.start_byte,
                end_byte: loc.end_byte,
                kind: ChangeKind::NodeRenamed {
                    node: NodeRef::node(new_node.kind().into(), new_node.node_id, new_node.short_name()),
                    old_name: old_node.short_name().to_string(),
                },
            });
        }

        match (&old_node.payload, &new_node.payload) {
            (NodePayload::File, NodePayload::File) => {}
            (NodePayload::Struct { fields: old_fields }, NodePayload::Struct { fields: new_fields }) => {
                self.diff_struct(old_node, old_fields, new_node, new_fields, file_id)?;
            }
            (NodePayload::Enum { enumerants: old_e }, NodePayload::Enum { enumerants: new_e }) => {
                self.diff_enum(old_node, old_e, new_node, new_e, file_id);
            }
            (NodePayload::Interface { methods: old_m }, NodePayload::Interface { methods: new_m }) => {
                self.diff_interface(old_node, old_m, new_node, new_m, file_id)?;
            }
            (
                NodePayload::Const { type_: old_t, value: old_v },
                NodePayload::Const { type_: new_t, value: new_v },
            ) => {
                self.diff_const(new_node, old_t, old_v, new_t, new_v, file_id)?;
            }
            (
                NodePayload::Annotation { type_: old_t, targets: old_tg },
                NodePayload::Annotation { type_: new_t, targets: new_tg },
            ) => {
                self.diff_annotation(new_node, old_t, old_tg, new_t, new_tg, file_id)?;
            }
            _ => unreachable!("kinds were checked equal above"),
        }

        self.diff_nested(old_node, new_node, file_id)
    }

    /// Nested-node handling (§4.5): matches `old_node`'s and `new_node`'s
    /// `nestedNodes` entries by identifier, falls back to a same-kind
    /// same-name match on failure, and emits id-changed/added/removed for
    /// whatever's left. Unlike member diffing, these entries name whole
    /// declarations (struct/enum/interface/const/annotation), never fields
    /// or enumerants, so added/removed breakage here is always none/code.
    fn diff_nested(&mut self, old_node: &Node, new_node: &Node, file_id: u64) -> Result<(), DifferError> {
        let mut consumed_new = vec![false; new_node.nested_nodes.len()];

        for old_entry in &old_node.nested_nodes {
            let old_child = self.old_index.get(old_entry.node_id)?;

            if let Some((j, new_entry)) = new_node
                .nested_nodes
                .iter()
                .enumerate()
                .find(|(_, e)| e.node_id == old_entry.node_id)
            {
                consumed_new[j] = true;
                let new_child = self.new_index.get(new_entry.node_id)?;
                self.diff_node_pair(old_child, new_child, file_id)?;
                continue;
            }

            let fallback = new_node.nested_nodes.iter().enumerate().find(|(idx, e)| {
                !consumed_new[*idx] && e.name == old_entry.name
            });
            let fallback = match fallback {
                Some((j, e)) => {
                    let candidate = self.new_index.get(e.node_id)?;
                    (candidate.kind() == old_child.kind()).then_some((j, candidate))
                }
                None => None,
            };

            if let Some((j, candidate)) = fallback {
                consumed_new[j] = true;
                debug!(
                    "nested node {:?} matched by name fallback: {:#x} -> {:#x}",
                    old_entry.name, old_entry.node_id, candidate.node_id
                );
                let loc = self.new_loc.node_location(candidate);
                self.changes.push(Change {
                    breakage: Breakage::Wire,
                    file_id,
                    start_byte: loc.start_byte,
                    end_byte: loc.end_byte,
                    kind: ChangeKind::NodeIdChanged {
                        node: NodeRef::node(candidate.kind().into(), candidate.node_id, candidate.short_name()),
                        old_id: old_entry.node_id,
                    },
                });
                self.diff_node_pair(old_child, candidate, file_id)?;
                continue;
            }

            self.emit_removed_node(old_child, file_id);
        }

        for (j, new_entry) in new_node.nested_nodes.iter().enumerate() {
            if consumed_new[j] {
                continue;
            }
            let new_child = self.new_index.get(new_entry.node_id)?;
            self.emit_added_node(new_child, file_id);
        }

        Ok(())
    }

    /// Struct diffing (§4.5 "Struct diffing"): delegates to the generic
    /// member-diffing algorithm over the field lists.
    fn diff_struct(
        &mut self,
        old_parent: &Node,
        old_fields: &[Field],
        new_parent: &Node,
        new_fields: &[Field],
        file_id: u64,
    ) -> Result<(), DifferError> {
        for action in pair_members(old_fields, new_fields) {
            match action {
                MemberAction::Same { old_idx, new_idx } => {
                    self.diff_field_body(new_parent, &old_fields[old_idx], &new_fields[new_idx], file_id)?;
                }
                MemberAction::Renamed { old_idx, new_idx } => {
                    self.emit_member_renamed(
                        new_parent,
                        &new_fields[new_idx],
                        &old_fields[old_idx].name,
                        RefKind::Field,
                        file_id,
                    );
                    self.diff_field_body(new_parent, &old_fields[old_idx], &new_fields[new_idx], file_id)?;
                }
                MemberAction::OrdinalChanged { old_idx, new_idx } => {
                    debug!(
                        "field {:?} matched {:?} by name after an ordinal change",
                        old_fields[old_idx].name, new_fields[new_idx].name
                    );
                    self.emit_member_ordinal_changed(
                        new_parent,
                        &new_fields[new_idx],
                        old_fields[old_idx].ordinal.value(),
                        RefKind::Field,
                        file_id,
                    );
                    self.diff_field_body(new_parent, &old_fields[old_idx], &new_fields[new_idx], file_id)?;
                }
                MemberAction::Removed { old_idx } => {
                    self.emit_member_removed(old_parent, &old_fields[old_idx], RefKind::Field, file_id);
                }
                MemberAction::Added { new_idx } => {
                    self.emit_member_added(new_parent, &new_fields[new_idx], RefKind::Field, file_id);
                }
            }
        }
        Ok(())
    }

    /// Per-field body diff (§4.5 step 1-3 of "Struct diffing").
    fn diff_field_body(
        &mut self,
        new_parent: &Node,
        old_field: &Field,
        new_field: &Field,
        file_id: u64,
    ) -> Result<(), DifferError> {
        match (&old_field.kind, &new_field.kind) {
            (FieldKind::Slot { .. }, FieldKind::Group { .. })
            | (FieldKind::Group { .. }, FieldKind::Slot { .. }) => {
                self.emit_field_type_changed(new_parent, new_field, Breakage::Wire, file_id);
                Ok(())
            }
            (
                FieldKind::Slot { type_: old_type, default_value: old_value },
                FieldKind::Slot { type_: new_type, default_value: new_value },
            ) => {
                self.diff_slot_field(new_parent, new_field, old_type, old_value, new_type, new_value, file_id)
            }
            (FieldKind::Group { type_id: old_type_id }, FieldKind::Group { type_id: new_type_id }) => {
                let old_group = self.old_index.get(*old_type_id)?;
                let new_group = self.new_index.get(*new_type_id)?;
                self.diff_node_pair(old_group, new_group, file_id)
            }
        }
    }

    fn diff_slot_field(
        &mut self,
        new_parent: &Node,
        new_field: &Field,
        old_type: &Type,
        old_value: &Value,
        new_type: &Type,
        new_value: &Value,
        file_id: u64,
    ) -> Result<(), DifferError> {
        match compat(old_type, new_type, self.new_index) {
            Ok(Compat::Same | Compat::Equivalent) => match value_eq(old_value, new_value) {
                Ok(true) => {}
                Ok(false) => self.emit_field_default_value_changed(new_parent, new_field, file_id),
                Err(ValueEqError::Unsupported(reason)) => {
                    warn!("cannot compare defaults of field {:?}: {reason}", new_field.name);
                    self.emit_field_unsupported(new_parent, new_field, reason, file_id);
                }
                Err(ValueEqError::Fatal(_err)) => {
                    warn!(
                        "malformed default value on field {:?}; reporting as unsupported rather than aborting the whole diff",
                        new_field.name
                    );
                    self.emit_field_unsupported(
                        new_parent,
                        new_field,
                        "malformed default-value pointer".to_string(),
                        file_id,
                    );
                }
            },
            Ok(Compat::Compatible) => self.emit_field_type_changed(new_parent, new_field, Breakage::Code, file_id),
            Ok(Compat::Incompatible) => {
                self.emit_field_type_changed(new_parent, new_field, Breakage::Wire, file_id);
            }
            Err(CompatError::UnsupportedGenerics) => {
                warn!(
                    "cannot compare types of field {:?}: {UNSUPPORTED_GENERICS_REASON}",
                    new_field.name
                );
                self.emit_field_unsupported(
                    new_parent,
                    new_field,
                    UNSUPPORTED_GENERICS_REASON.to_string(),
                    file_id,
                );
            }
            Err(CompatError::MissingNode(id)) => return Err(DifferError::MissingNode(id)),
        }
        Ok(())
    }

    /// Enum diffing (§4.5 "Enum diffing"): purely positional up to the
    /// common prefix, no name-fallback reordering (unlike fields/methods).
    fn diff_enum(
        &mut self,
        old_parent: &Node,
        old_enumerants: &[Enumerant],
        new_parent: &Node,
        new_enumerants: &[Enumerant],
        file_id: u64,
    ) {
        let common = old_enumerants.len().min(new_enumerants.len());
        for i in 0..common {
            if old_enumerants[i].name != new_enumerants[i].name {
                self.emit_member_renamed(
                    new_parent,
                    &new_enumerants[i],
                    &old_enumerants[i].name,
                    RefKind::Enumerant,
                    file_id,
                );
            }
        }
        for old_e in &old_enumerants[common..] {
            self.emit_member_removed(old_parent, old_e, RefKind::Enumerant, file_id);
        }
        for new_e in &new_enumerants[common..] {
            self.emit_member_added(new_parent, new_e, RefKind::Enumerant, file_id);
        }
    }

    /// Interface diffing (§4.5 "Interface diffing"). Generic/implicit
    /// parameters abort the whole diff (§7's hard-error population): this
    /// crate does not attempt to analyze them.
    fn diff_interface(
        &mut self,
        old_parent: &Node,
        old_methods: &[Method],
        new_parent: &Node,
        new_methods: &[Method],
        file_id: u64,
    ) -> Result<(), DifferError> {
        for method in old_methods.iter().chain(new_methods.iter()) {
            if method.generic_param_count != 0 {
                return Err(DifferError::UnsupportedGenericMethod {
                    interface_id: new_parent.node_id,
                    method_ordinal: method.ordinal,
                });
            }
            if method.implicit_param_count != 0 {
                return Err(DifferError::UnsupportedImplicitParams {
                    interface_id: new_parent.node_id,
                    method_ordinal: method.ordinal,
                });
            }
        }

        for action in pair_members(old_methods, new_methods) {
            match action {
                MemberAction::Same { old_idx, new_idx } => {
                    self.diff_method_body(new_parent, &old_methods[old_idx], &new_methods[new_idx], file_id)?;
                }
                MemberAction::Renamed { old_idx, new_idx } => {
                    self.emit_member_renamed(
                        new_parent,
                        &new_methods[new_idx],
                        &old_methods[old_idx].name,
                        RefKind::Method,
                        file_id,
                    );
                    self.diff_method_body(new_parent, &old_methods[old_idx], &new_methods[new_idx], file_id)?;
                }
                MemberAction::OrdinalChanged { old_idx, new_idx } => {
                    self.emit_member_ordinal_changed(
                        new_parent,
                        &new_methods[new_idx],
                        old_methods[old_idx].ordinal,
                        RefKind::Method,
                        file_id,
                    );
                    self.diff_method_body(new_parent, &old_methods[old_idx], &new_methods[new_idx], file_id)?;
                }
                MemberAction::Removed { old_idx } => {
                    let method = &old_methods[old_idx];
                    self.emit_member_removed(old_parent, method, RefKind::Method, file_id);
                    self.cascade_struct_members_removed(method.param_struct_type, file_id)?;
                    self.cascade_struct_members_removed(method.result_struct_type, file_id)?;
                }
                MemberAction::Added { new_idx } => {
                    let method = &new_methods[new_idx];
                    self.emit_member_added(new_parent, method, RefKind::Method, file_id);
                    self.cascade_struct_members_added(method.param_struct_type, file_id)?;
                    self.cascade_struct_members_added(method.result_struct_type, file_id)?;
                }
            }
        }
        Ok(())
    }

    /// Compares a matched method's parameter- and result-struct types "as
    /// struct-typed fields" (§4.5), then recurses into each synthetic
    /// struct's own fields regardless of whether its type id moved, since
    /// those fields are the method's actual named parameters/return values.
    fn diff_method_body(
        &mut self,
        interface: &Node,
        old_method: &Method,
        new_method: &Method,
        file_id: u64,
    ) -> Result<(), DifferError> {
        self.diff_method_param(
            interface,
            new_method,
            TypedRefKind::MethodInput,
            old_method.param_struct_type,
            new_method.param_struct_type,
            file_id,
        )?;
        self.diff_method_param(
            interface,
            new_method,
            TypedRefKind::MethodOutput,
            old_method.result_struct_type,
            new_method.result_struct_type,
            file_id,
        )
    }

    fn diff_method_param(
        &mut self,
        interface: &Node,
        new_method: &Method,
        which: TypedRefKind,
        old_type_id: u64,
        new_type_id: u64,
        file_id: u64,
    ) -> Result<(), DifferError> {
        if old_type_id != new_type_id {
            let loc = self.new_loc.member_location(interface, new_method.ordinal);
            self.changes.push(Change {
                breakage: Breakage::Wire,
                file_id,
                start_byte: loc.start_byte,
                end_byte: loc.end_byte,
                kind: ChangeKind::NodeTypeChanged {
                    node: TypedRef {
                        kind: which,
                        parent_id: interface.node_id,
                        short_name: new_method.name.clone(),
                        ordinal: Some(new_method.ordinal),
                    },
                },
            });
        }

        let old_struct = self.old_index.get(old_type_id)?;
        let new_struct = self.new_index.get(new_type_id)?;
        let (NodePayload::Struct { fields: old_fields }, NodePayload::Struct { fields: new_fields }) =
            (&old_struct.payload, &new_struct.payload)
        else {
            return Ok(());
        };
        self.diff_struct(old_struct, old_fields, new_struct, new_fields, file_id)
    }

    fn cascade_struct_members_removed(&mut self, struct_type_id: u64, file_id: u64) -> Result<(), DifferError> {
        let node = self.old_index.get(struct_type_id)?;
        if let NodePayload::Struct { fields } = &node.payload {
            for field in fields {
                self.emit_member_removed(node, field, RefKind::Field, file_id);
            }
        }
        Ok(())
    }

    fn cascade_struct_members_added(&mut self, struct_type_id: u64, file_id: u64) -> Result<(), DifferError> {
        let node = self.new_index.get(struct_type_id)?;
        if let NodePayload::Struct { fields } = &node.payload {
            for field in fields {
                self.emit_member_added(node, field, RefKind::Field, file_id);
            }
        }
        Ok(())
    }

    /// Const diffing (§4.5 "Const diffing").
    fn diff_const(
        &mut self,
        new_node: &Node,
        old_type: &Type,
        old_value: &Value,
        new_type: &Type,
        new_value: &Value,
        file_id: u64,
    ) -> Result<(), DifferError> {
        match compat(old_type, new_type, self.new_index) {
            Ok(Compat::Same | Compat::Equivalent) => match value_eq(old_value, new_value) {
                Ok(true) => {}
                Ok(false) => self.emit_const_value_changed(new_node, file_id),
                Err(ValueEqError::Unsupported(reason)) => {
                    warn!("cannot compare values of const {:?}: {reason}", new_node.short_name());
                    self.emit_node_unsupported(new_node, RefKind::Const, reason, file_id);
                }
                Err(ValueEqError::Fatal(_err)) => {
                    warn!(
                        "malformed value on const {:?}; reporting as unsupported rather than aborting the whole diff",
                        new_node.short_name()
                    );
                    self.emit_node_unsupported(
                        new_node,
                        RefKind::Const,
                        "malformed const-value pointer".to_string(),
                        file_id,
                    );
                }
            },
            Ok(Compat::Compatible) => self.emit_const_type_changed(new_node, Breakage::Code, file_id),
            Ok(Compat::Incompatible) => self.emit_const_type_changed(new_node, Breakage::Wire, file_id),
            Err(CompatError::UnsupportedGenerics) => {
                warn!(
                    "cannot compare types of const {:?}: {UNSUPPORTED_GENERICS_REASON}",
                    new_node.short_name()
                );
                self.emit_node_unsupported(new_node, RefKind::Const, UNSUPPORTED_GENERICS_REASON.to_string(), file_id);
            }
            Err(CompatError::MissingNode(id)) => return Err(DifferError::MissingNode(id)),
        }
        Ok(())
    }

    /// Annotation diffing (§4.5 "Annotation diffing").
    fn diff_annotation(
        &mut self,
        new_node: &Node,
        old_type: &Type,
        old_targets: &AnnotationTargets,
        new_type: &Type,
        new_targets: &AnnotationTargets,
        file_id: u64,
    ) -> Result<(), DifferError> {
        match compat(old_type, new_type, self.new_index) {
            Ok(Compat::Same | Compat::Equivalent) => {}
            Ok(Compat::Compatible) => self.emit_annotation_type_changed(new_node, Breakage::Code, file_id),
            Ok(Compat::Incompatible) => self.emit_annotation_type_changed(new_node, Breakage::Wire, file_id),
            Err(CompatError::UnsupportedGenerics) => {
                warn!(
                    "cannot compare types of annotation {:?}: {UNSUPPORTED_GENERICS_REASON}",
                    new_node.short_name()
                );
                self.emit_node_unsupported(
                    new_node,
                    RefKind::Annotation,
                    UNSUPPORTED_GENERICS_REASON.to_string(),
                    file_id,
                );
            }
            Err(CompatError::MissingNode(id)) => return Err(DifferError::MissingNode(id)),
        }

        for target in AnnotationTarget::ALL {
            match (old_targets.get(target), new_targets.get(target)) {
                (true, false) => self.emit_annotation_target_removed(new_node, target, file_id),
                (false, true) => self.emit_annotation_target_added(new_node, target, file_id),
                _ => {}
            }
        }
        Ok(())
    }

    // -- emission helpers -------------------------------------------------

    fn emit_removed_node(&mut self, node: &Node, file_id: u64) {
        let loc = self.old_loc.node_location(node);
        self.changes.push(Change {
            breakage: Breakage::Code,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeRemoved { node: NodeRef::node(node.kind().into(), node.node_id, node.short_name()) },
        });
    }

    fn emit_added_node(&mut self, node: &Node, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage: Breakage::None,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeAdded { node: NodeRef::node(node.kind().into(), node.node_id, node.short_name()) },
        });
    }

    fn emit_member_added(&mut self, parent: &Node, member: &impl MemberItem, kind: RefKind, file_id: u64) {
        let loc = self.new_loc.member_location(parent, member.member_ordinal());
        self.changes.push(Change {
            breakage: Breakage::None,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeAdded {
                node: NodeRef::member(kind, parent.node_id, member.member_name(), member.member_ordinal()),
            },
        });
    }

    fn emit_member_removed(&mut self, parent: &Node, member: &impl MemberItem, kind: RefKind, file_id: u64) {
        let loc = self.old_loc.member_location(parent, member.member_ordinal());
        self.changes.push(Change {
            breakage: Breakage::Wire,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeRemoved {
                node: NodeRef::member(kind, parent.node_id, member.member_name(), member.member_ordinal()),
            },
        });
    }

    fn emit_member_renamed(
        &mut self,
        new_parent: &Node,
        new_member: &impl MemberItem,
        old_name: &str,
        kind: RefKind,
        file_id: u64,
    ) {
        let loc = self.new_loc.member_location(new_parent, new_member.member_ordinal());
        self.changes.push(Change {
            breakage: Breakage::Code,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeRenamed {
                node: NodeRef::member(kind, new_parent.node_id, new_member.member_name(), new_member.member_ordinal()),
                old_name: old_name.to_string(),
            },
        });
    }

    fn emit_member_ordinal_changed(
        &mut self,
        new_parent: &Node,
        new_member: &impl MemberItem,
        old_ordinal: u16,
        kind: RefKind,
        file_id: u64,
    ) {
        let loc = self.new_loc.member_location(new_parent, new_member.member_ordinal());
        self.changes.push(Change {
            breakage: Breakage::Wire,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::MemberOrdinalChanged {
                node: NodeRef::member(kind, new_parent.node_id, new_member.member_name(), new_member.member_ordinal()),
                old_ordinal,
            },
        });
    }

    fn emit_field_type_changed(&mut self, new_parent: &Node, new_field: &Field, breakage: Breakage, file_id: u64) {
        let loc = self.new_loc.member_location(new_parent, new_field.ordinal.value());
        self.changes.push(Change {
            breakage,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeTypeChanged {
                node: TypedRef {
                    kind: TypedRefKind::Field,
                    parent_id: new_parent.node_id,
                    short_name: new_field.name.clone(),
                    ordinal: Some(new_field.ordinal.value()),
                },
            },
        });
    }

    fn emit_field_default_value_changed(&mut self, new_parent: &Node, new_field: &Field, file_id: u64) {
        let loc = self.new_loc.member_location(new_parent, new_field.ordinal.value());
        self.changes.push(Change {
            breakage: Breakage::Wire,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::FieldDefaultValueChanged {
                node: NodeRef::member(RefKind::Field, new_parent.node_id, new_field.name.clone(), new_field.ordinal.value()),
            },
        });
    }

    fn emit_field_unsupported(&mut self, new_parent: &Node, new_field: &Field, reason: String, file_id: u64) {
        let loc = self.new_loc.member_location(new_parent, new_field.ordinal.value());
        self.changes.push(Change {
            breakage: Breakage::Wire,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::Unsupported {
                node: NodeRef::member(RefKind::Field, new_parent.node_id, new_field.name.clone(), new_field.ordinal.value()),
                reason,
            },
        });
    }

    fn emit_const_value_changed(&mut self, node: &Node, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage: Breakage::Code,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::ConstValueChanged { node: NodeRef::node(RefKind::Const, node.node_id, node.short_name()) },
        });
    }

    fn emit_const_type_changed(&mut self, node: &Node, breakage: Breakage, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeTypeChanged {
                node: TypedRef {
                    kind: TypedRefKind::Const,
                    parent_id: node.node_id,
                    short_name: node.short_name().to_string(),
                    ordinal: None,
                },
            },
        });
    }

    fn emit_annotation_type_changed(&mut self, node: &Node, breakage: Breakage, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::NodeTypeChanged {
                node: TypedRef {
                    kind: TypedRefKind::Annotation,
                    parent_id: node.node_id,
                    short_name: node.short_name().to_string(),
                    ordinal: None,
                },
            },
        });
    }

    fn emit_annotation_target_added(&mut self, node: &Node, target: AnnotationTarget, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage: Breakage::None,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::AnnotationTargetAdded {
                node: NodeRef::node(RefKind::Annotation, node.node_id, node.short_name()),
                target: target_name(target).to_string(),
            },
        });
    }

    fn emit_annotation_target_removed(&mut self, node: &Node, target: AnnotationTarget, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage: Breakage::Code,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::AnnotationTargetRemoved {
                node: NodeRef::node(RefKind::Annotation, node.node_id, node.short_name()),
                target: target_name(target).to_string(),
            },
        });
    }

    fn emit_node_unsupported(&mut self, node: &Node, kind: RefKind, reason: String, file_id: u64) {
        let loc = self.new_loc.node_location(node);
        self.changes.push(Change {
            breakage: Breakage::Wire,
            file_id,
            start_byte: loc.start_byte,
            end_byte: loc.end_byte,
            kind: ChangeKind::Unsupported { node: NodeRef::node(kind, node.node_id, node.short_name()), reason },
        });
    }
}
