use capnp_diff::schema::{
    AnnotationTarget, AnnotationTargets, Enumerant, Field, FieldKind, Method, NestedNode, Node,
    NodePayload, Ordinal, Schema, Type, Value,
};
use capnp_diff::{diff, Breakage, ChangeKind, RefKind, TypedRefKind};

fn file(id: u64, path: &str, nested: Vec<NestedNode>) -> Node {
    Node {
        node_id: id,
        display_name: path.to_string(),
        display_name_prefix_len: 0,
        scope_id: 0,
        nested_nodes: nested,
        payload: NodePayload::File,
        start_byte: 0,
        end_byte: 0,
    }
}

fn nested(name: &str, node_id: u64) -> NestedNode {
    NestedNode { name: name.to_string(), node_id }
}

fn struct_node(id: u64, scope_id: u64, short_name: &str, fields: Vec<Field>) -> Node {
    Node {
        node_id: id,
        display_name: format!("a.capnp:{short_name}"),
        display_name_prefix_len: 8,
        scope_id,
        nested_nodes: vec![],
        payload: NodePayload::Struct { fields },
        start_byte: 0,
        end_byte: 0,
    }
}

fn enum_node(id: u64, scope_id: u64, short_name: &str, enumerants: Vec<Enumerant>) -> Node {
    Node {
        node_id: id,
        display_name: format!("a.capnp:{short_name}"),
        display_name_prefix_len: 8,
        scope_id,
        nested_nodes: vec![],
        payload: NodePayload::Enum { enumerants },
        start_byte: 0,
        end_byte: 0,
    }
}

fn interface_node(id: u64, scope_id: u64, short_name: &str, methods: Vec<Method>) -> Node {
    Node {
        node_id: id,
        display_name: format!("a.capnp:{short_name}"),
        display_name_prefix_len: 8,
        scope_id,
        nested_nodes: vec![],
        payload: NodePayload::Interface { methods },
        start_byte: 0,
        end_byte: 0,
    }
}

fn slot(name: &str, ordinal: u16, type_: Type) -> Field {
    Field { name: name.to_string(), ordinal: Ordinal::Explicit(ordinal), kind: FieldKind::Slot { type_, default_value: Value::Void } }
}

fn method(name: &str, ordinal: u16, params: u64, results: u64) -> Method {
    Method {
        name: name.to_string(),
        ordinal,
        param_struct_type: params,
        result_struct_type: results,
        generic_param_count: 0,
        implicit_param_count: 0,
    }
}

/// A brand-new struct added to a file produces a single `none`-breakage
/// `node_added` change and nothing else.
#[test]
fn add_struct() {
    let other = struct_node(2, 1, "Other", vec![]);
    let old = Schema { nodes: vec![file(1, "a.capnp", vec![nested("Other", 2)]), other.clone()], source_info: vec![] };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("Other", 2), nested("Person", 3)]),
            other,
            struct_node(3, 1, "Person", vec![slot("id", 0, Type::UInt32)]),
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::None);
    match &result.changes[0].kind {
        ChangeKind::NodeAdded { node } => {
            assert_eq!(node.kind, RefKind::Struct);
            assert_eq!(node.short_name, "Person");
        }
        other => panic!("expected node_added, got {other:?}"),
    }
}

/// Removing a struct is the mirror image: one `code`-breakage `node_removed`.
#[test]
fn remove_struct() {
    let other = struct_node(2, 1, "Other", vec![]);
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("Other", 2), nested("Person", 3)]),
            other.clone(),
            struct_node(3, 1, "Person", vec![]),
        ],
        source_info: vec![],
    };
    let new = Schema { nodes: vec![file(1, "a.capnp", vec![nested("Other", 2)]), other], source_info: vec![] };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::Code);
    match &result.changes[0].kind {
        ChangeKind::NodeRemoved { node } => assert_eq!(node.short_name, "Person"),
        other => panic!("expected node_removed, got {other:?}"),
    }
}

/// Widening a field's wire representation from `UInt16` to `UInt32` is a
/// wire break even though no value can actually be lost going forward: the
/// representation itself changed, and old readers can't decode the new
/// encoding.
#[test]
fn widen_uint16_to_uint32_is_wire_breaking() {
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("Person", 2)]),
            struct_node(2, 1, "Person", vec![slot("age", 0, Type::UInt16)]),
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("Person", 2)]),
            struct_node(2, 1, "Person", vec![slot("age", 0, Type::UInt32)]),
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::Wire);
    match &result.changes[0].kind {
        ChangeKind::NodeTypeChanged { node } => {
            assert_eq!(node.kind, TypedRefKind::Field);
            assert_eq!(node.short_name, "age");
        }
        other => panic!("expected node_type_changed, got {other:?}"),
    }
}

/// The breakage matrix for a handful of representative type changes: enum
/// widening to its wire integer is code-breaking only, the reverse is wire
/// breaking, and two same-width-but-different-kind primitives are always
/// wire breaking.
#[test]
fn type_change_breakage_matrix() {
    let cases: [(Type, Type, Breakage); 4] = [
        (Type::Enum(9), Type::UInt16, Breakage::Code),
        (Type::UInt16, Type::Enum(9), Breakage::Wire),
        (Type::Text, Type::AnyPointer, Breakage::Code),
        (Type::UInt8, Type::Int8, Breakage::Wire),
    ];

    for (i, (old_type, new_type, expected)) in cases.into_iter().enumerate() {
        let old = Schema {
            nodes: vec![file(1, "a.capnp", vec![nested("S", 2)]), struct_node(2, 1, "S", vec![slot("f", 0, old_type)])],
            source_info: vec![],
        };
        let new = Schema {
            nodes: vec![file(1, "a.capnp", vec![nested("S", 2)]), struct_node(2, 1, "S", vec![slot("f", 0, new_type)])],
            source_info: vec![],
        };
        let result = diff(&old, &new).unwrap();
        assert_eq!(result.changes.len(), 1, "case {i}");
        assert_eq!(result.changes[0].breakage, expected, "case {i}");
    }
}

/// Removing a field, an enumerant, and a method together produces five
/// wire-breaking removals: the method's two synthetic parameter/result
/// fields are reported individually alongside the method itself, since a
/// reader built against the old schema can no longer exchange any of them.
#[test]
fn remove_member_cascades_into_method_parameters() {
    let params = struct_node(10, 0, "method1_params", vec![slot("in1", 0, Type::UInt32)]);
    let results = struct_node(11, 0, "method1_results", vec![slot("out1", 0, Type::UInt32)]);

    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2), nested("E", 3), nested("I", 4)]),
            struct_node(2, 1, "S", vec![slot("field1", 0, Type::UInt32)]),
            enum_node(3, 1, "E", vec![Enumerant { name: "enumerant1".to_string(), ordinal: 0 }]),
            interface_node(4, 1, "I", vec![method("method1", 0, 10, 11)]),
            params,
            results,
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2), nested("E", 3), nested("I", 4)]),
            struct_node(2, 1, "S", vec![]),
            enum_node(3, 1, "E", vec![]),
            interface_node(4, 1, "I", vec![]),
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 5);
    for change in &result.changes {
        assert_eq!(change.breakage, Breakage::Wire);
        assert!(matches!(change.kind, ChangeKind::NodeRemoved { .. }));
    }
}

/// Changing a field's default value is a wire break when the type stayed
/// the same (old readers decode the raw default bits, not "whatever the
/// schema currently says"), even though no type-level incompatibility
/// exists.
#[test]
fn default_value_change_is_wire_breaking() {
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2)]),
            struct_node(
                2,
                1,
                "S",
                vec![Field {
                    name: "count".to_string(),
                    ordinal: Ordinal::Explicit(0),
                    kind: FieldKind::Slot { type_: Type::UInt32, default_value: Value::UInt32(0) },
                }],
            ),
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2)]),
            struct_node(
                2,
                1,
                "S",
                vec![Field {
                    name: "count".to_string(),
                    ordinal: Ordinal::Explicit(0),
                    kind: FieldKind::Slot { type_: Type::UInt32, default_value: Value::UInt32(7) },
                }],
            ),
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::Wire);
    assert!(matches!(result.changes[0].kind, ChangeKind::FieldDefaultValueChanged { .. }));
}

/// A const whose value changed, with its type held fixed, is a source
/// (code) break: generated code embeds the constant at compile time, so
/// callers linking against the old constant silently keep the stale value.
#[test]
fn const_value_change_is_code_breaking() {
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("MAX", 2)]),
            Node {
                node_id: 2,
                display_name: "a.capnp:MAX".to_string(),
                display_name_prefix_len: 8,
                scope_id: 1,
                nested_nodes: vec![],
                payload: NodePayload::Const { type_: Type::UInt32, value: Value::UInt32(10) },
                start_byte: 0,
                end_byte: 0,
            },
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("MAX", 2)]),
            Node {
                payload: NodePayload::Const { type_: Type::UInt32, value: Value::UInt32(20) },
                ..old.nodes[1].clone()
            },
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::Code);
    assert!(matches!(result.changes[0].kind, ChangeKind::ConstValueChanged { .. }));
}

/// Annotations gaining or losing a legal target surface as paired
/// added/removed events, one per target name, rather than a single opaque
/// "annotation changed" record.
#[test]
fn annotation_target_changes_are_itemized() {
    let mut old_targets = AnnotationTargets::default();
    old_targets.field = true;
    old_targets.struct_ = true;
    let mut new_targets = AnnotationTargets::default();
    new_targets.field = true;
    new_targets.enum_ = true;

    let old_node = Node {
        node_id: 2,
        display_name: "a.capnp:pii".to_string(),
        display_name_prefix_len: 8,
        scope_id: 1,
        nested_nodes: vec![],
        payload: NodePayload::Annotation { type_: Type::Void, targets: old_targets },
        start_byte: 0,
        end_byte: 0,
    };
    let new_node = Node { payload: NodePayload::Annotation { type_: Type::Void, targets: new_targets }, ..old_node.clone() };

    let old = Schema { nodes: vec![file(1, "a.capnp", vec![nested("pii", 2)]), old_node], source_info: vec![] };
    let new = Schema { nodes: vec![file(1, "a.capnp", vec![nested("pii", 2)]), new_node], source_info: vec![] };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 2);
    let targets_seen: Vec<(&str, Breakage)> = result
        .changes
        .iter()
        .map(|c| match &c.kind {
            ChangeKind::AnnotationTargetAdded { target, .. } => (target.as_str(), c.breakage),
            ChangeKind::AnnotationTargetRemoved { target, .. } => (target.as_str(), c.breakage),
            other => panic!("unexpected change {other:?}"),
        })
        .collect();
    assert!(targets_seen.contains(&("struct", Breakage::Code)));
    assert!(targets_seen.contains(&("enum", Breakage::None)));
}

/// Swapping two adjacent fields' names (a reorder, not a rename) resolves
/// to two `member_ordinal_changed` events rather than an unrelated
/// add/remove pair.
#[test]
fn swapped_adjacent_fields_resolve_to_ordinal_changes() {
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2)]),
            struct_node(2, 1, "S", vec![slot("a", 0, Type::UInt32), slot("b", 1, Type::UInt32)]),
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2)]),
            struct_node(2, 1, "S", vec![slot("b", 0, Type::UInt32), slot("a", 1, Type::UInt32)]),
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 2);
    assert!(result.changes.iter().all(|c| matches!(c.kind, ChangeKind::MemberOrdinalChanged { .. })));
}

/// Diffing a schema against an identical copy of itself yields no changes
/// and an empty file table.
#[test]
fn identical_schemas_produce_no_changes() {
    let s = struct_node(2, 1, "Person", vec![slot("id", 0, Type::UInt32)]);
    let schema = Schema { nodes: vec![file(1, "a.capnp", vec![nested("Person", 2)]), s], source_info: vec![] };
    let result = diff(&schema, &schema).unwrap();
    assert!(result.changes.is_empty());
    assert!(result.files.is_empty());
}

/// The struct-upgrade rule: `List(UInt32)` can be reinterpreted as
/// `List(struct)` when the struct's first field is itself a `UInt32` slot,
/// since the two share the same four-byte-per-element wire layout. This is
/// wire-safe but still changes the generated type on each side, hence
/// `code` rather than `none`.
#[test]
fn list_of_primitive_upgrades_to_list_of_matching_struct() {
    let upgraded = struct_node(3, 1, "Point", vec![slot("x", 0, Type::UInt32)]);
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2), nested("Point", 3)]),
            struct_node(2, 1, "S", vec![slot("coords", 0, Type::List(Box::new(Type::UInt32)))]),
            upgraded.clone(),
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2), nested("Point", 3)]),
            struct_node(2, 1, "S", vec![slot("coords", 0, Type::List(Box::new(Type::Struct(3, vec![]))))]),
            upgraded,
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::Code);
    match &result.changes[0].kind {
        ChangeKind::NodeTypeChanged { node } => assert_eq!(node.short_name, "coords"),
        other => panic!("expected node_type_changed, got {other:?}"),
    }
}

/// The struct-upgrade rule requires the *first* field of the new struct to
/// match the old element's wire size; a struct whose first field is a
/// wider type (`UInt64`, eight bytes) doesn't fit in the four-byte slots a
/// `List(UInt32)` laid down, so this is an ordinary incompatible type
/// change, not a silent wire-safe upgrade.
#[test]
fn list_upgrade_rejects_mismatched_first_field_size() {
    let mismatched = struct_node(3, 1, "Wide", vec![slot("big", 0, Type::UInt64)]);
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2), nested("Wide", 3)]),
            struct_node(2, 1, "S", vec![slot("coords", 0, Type::List(Box::new(Type::UInt32)))]),
            mismatched.clone(),
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("S", 2), nested("Wide", 3)]),
            struct_node(2, 1, "S", vec![slot("coords", 0, Type::List(Box::new(Type::Struct(3, vec![]))))]),
            mismatched,
        ],
        source_info: vec![],
    };

    let result = diff(&old, &new).unwrap();
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].breakage, Breakage::Wire);
    assert!(matches!(result.changes[0].kind, ChangeKind::NodeTypeChanged { .. }));
}

/// An interface method declaring generic parameters aborts the whole diff
/// rather than silently skipping it: this crate does not attempt to reason
/// about generic instantiations.
#[test]
fn generic_method_aborts_the_diff() {
    let mut generic_method = method("call", 0, 10, 11);
    generic_method.generic_param_count = 1;

    let params = struct_node(10, 0, "call_params", vec![]);
    let results = struct_node(11, 0, "call_results", vec![]);
    let old = Schema {
        nodes: vec![
            file(1, "a.capnp", vec![nested("I", 2)]),
            interface_node(2, 1, "I", vec![generic_method.clone()]),
            params.clone(),
            results.clone(),
        ],
        source_info: vec![],
    };
    let new = Schema {
        nodes: vec![file(1, "a.capnp", vec![nested("I", 2)]), interface_node(2, 1, "I", vec![generic_method]), params, results],
        source_info: vec![],
    };

    let err = diff(&old, &new).unwrap_err();
    assert!(matches!(err, capnp_diff::DifferError::UnsupportedGenericMethod { .. }));
}
