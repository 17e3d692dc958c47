// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Event-stream scenarios: declarations, bodies, scoping, load filtering,
//! USE restrictions, ROUTE/IMPORT/EXPORT and Script interfaces.

#![allow(missing_docs)]

use x3d_proto::{
    AccessType, BuilderConfig, FieldType, LoadRequirements, LoadState, NodeCategory, Phase,
    ProtoBuilder, ProtoError, RawValue, StandardNodeFactory, Template, TypedValue,
};

fn builder(version: &str) -> ProtoBuilder {
    let mut b = ProtoBuilder::new(StandardNodeFactory::new());
    b.start_document(Some("file:///scene.wrl"), None, "utf8", version)
        .unwrap();
    b
}

fn open_body(b: &mut ProtoBuilder, name: &str) {
    b.start_proto_decl(name).unwrap();
    b.end_proto_decl().unwrap();
    b.start_proto_body().unwrap();
}

fn is_sequencing<T: std::fmt::Debug>(result: Result<T, ProtoError>) -> bool {
    matches!(result, Err(ProtoError::Sequencing { .. }))
}

// =============================================================================
// Declarations
// =============================================================================

#[test]
fn interface_default_is_decoded() {
    let mut b = builder("3.0");
    b.start_proto_decl("TestProto").unwrap();
    b.proto_field_decl(
        AccessType::Field,
        FieldType::SFInt32,
        "intField",
        Some(RawValue::from("42")),
    )
    .unwrap();
    b.end_proto_decl().unwrap();
    b.start_proto_body().unwrap();
    b.end_proto_body().unwrap();
    b.end_document().unwrap();

    let proto = b.prototype().unwrap();
    assert_eq!(proto.name(), "TestProto");
    assert_eq!(proto.field_count(), 2);
    let index = proto.field_index("intField").unwrap();
    let value = proto.field_value(index).unwrap().unwrap();
    assert_eq!(value.as_i32(), Some(42));
    assert_eq!(value.num_elements(), 1);
}

#[test]
fn empty_declaration_has_no_body_children() {
    let mut b = builder("3.0");
    open_body(&mut b, "Empty");
    b.end_proto_body().unwrap();
    let proto = b.prototype().unwrap();
    assert_eq!(proto.body().child_count(), 0);
    assert!(proto.body().is_setup_finished());
}

#[test]
fn interface_without_body_completes_on_next_event() {
    let mut b = builder("3.0");
    b.start_proto_decl("Bare").unwrap();
    b.end_proto_decl().unwrap();
    b.start_proto_decl("Next").unwrap();
    assert!(b.resolve_template("Bare").is_some());
    assert_eq!(b.phase(), Phase::ProtoDecl);
}

#[test]
fn vector_defaults_count_elements() {
    let mut b = builder("3.0");
    b.start_proto_decl("Vectors").unwrap();
    b.proto_field_decl(
        AccessType::Field,
        FieldType::SFVec3f,
        "one",
        Some("1 1 1".into()),
    )
    .unwrap();
    b.proto_field_decl(
        AccessType::Field,
        FieldType::MFVec3f,
        "two",
        Some(RawValue::from(&["1 1 1", "2 2 2"][..])),
    )
    .unwrap();
    b.end_proto_decl().unwrap();

    let proto = b.prototype().unwrap();
    let one = proto.field_value(1).unwrap().map(TypedValue::num_elements);
    let two = proto.field_value(2).unwrap().map(TypedValue::num_elements);
    assert_eq!((one, two), (Some(1), Some(2)));
}

#[test]
fn bad_default_is_invalid_field_value() {
    let mut b = builder("3.0");
    b.start_proto_decl("Bad").unwrap();
    let result = b.proto_field_decl(
        AccessType::Field,
        FieldType::SFVec3f,
        "v",
        Some("1 2".into()),
    );
    assert!(matches!(result, Err(ProtoError::InvalidFieldValue { .. })));
}

#[test]
fn node_valued_interface_default() {
    let mut b = builder("3.0");
    b.start_proto_decl("WithNode").unwrap();
    b.proto_field_decl(AccessType::Field, FieldType::SFNode, "shape", None)
        .unwrap();
    b.start_node("Box", None).unwrap();
    b.start_field("size").unwrap();
    b.field_value("2 2 2").unwrap();
    b.end_field().unwrap();
    b.end_node().unwrap();
    b.end_proto_decl().unwrap();

    let proto = b.prototype().unwrap();
    let nodes = proto.field_value(1).unwrap().unwrap().nodes();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].type_name(), "Box");
}

#[test]
fn extern_declaration_records_uris() {
    let mut b = builder("3.0");
    b.start_extern_proto_decl("Remote").unwrap();
    b.proto_field_decl(
        AccessType::Field,
        FieldType::SFVec3f,
        "size",
        Some("1 1 1".into()),
    )
    .unwrap();
    b.end_extern_proto_decl().unwrap();
    b.extern_proto_uri(&["remote.wrl#Remote", "http://example.org/remote.x3d"])
        .unwrap();

    let Some(Template::Extern(ext)) = b.resolve_template("Remote") else {
        panic!("Remote should be an EXTERNPROTO");
    };
    assert_eq!(ext.uri_list().len(), 2);
    assert_eq!(ext.field_count(), 2);
    assert_eq!(ext.load_state(), LoadState::NotLoaded);
}

#[test]
fn sequencing_violations() {
    let mut b = builder("3.0");
    assert!(is_sequencing(b.end_proto_decl()));
    assert!(is_sequencing(b.start_node("Group", None)));
    assert!(is_sequencing(b.proto_field_decl(
        AccessType::Field,
        FieldType::SFBool,
        "loose",
        None
    )));

    b.start_extern_proto_decl("E").unwrap();
    assert!(is_sequencing(b.start_proto_decl("Inside")));
    assert!(is_sequencing(b.end_node()));
}

#[test]
fn errors_carry_location() {
    let mut b = builder("3.0");
    b.set_location(12, 7);
    match b.end_proto_body() {
        Err(ProtoError::Sequencing { line, column, .. }) => assert_eq!((line, column), (12, 7)),
        other => panic!("unexpected {other:?}"),
    }
}

// =============================================================================
// Scoping
// =============================================================================

#[test]
fn nested_declaration_visible_only_inside_parent_body() {
    let mut b = builder("3.0");
    open_body(&mut b, "Outer");
    open_body(&mut b, "Inner");
    b.start_node("Sphere", None).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    assert!(b.resolve_template("Inner").is_some());
    b.start_node("Inner", Some("I")).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    assert!(b.resolve_template("Outer").is_some());
    assert!(b.resolve_template("Inner").is_none());

    let outer = b.prototype().unwrap();
    assert_eq!(outer.nested().len(), 1);
    let instance = &outer.body().children()[0];
    assert!(instance.is_placeholder());
    assert_eq!(instance.type_name(), "Inner");
    assert_eq!(instance.traits().category, NodeCategory::ProtoInstance);
    assert!(outer.defs().contains_key("I"));
}

#[test]
fn def_names_do_not_leak_between_bodies() {
    let mut b = builder("3.0");
    open_body(&mut b, "A");
    b.start_node("Transform", Some("T")).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    open_body(&mut b, "B");
    b.start_node("Group", None).unwrap();
    b.start_field("children").unwrap();
    assert!(is_sequencing(b.use_decl("T")));
    b.end_field().unwrap();
    b.end_node().unwrap();
    assert!(matches!(
        b.route_decl("T", "translation", "T", "translation"),
        Err(ProtoError::InvalidConnection(_))
    ));
}

#[test]
fn duplicate_def_in_x3d_body_rejected() {
    let mut b = builder("3.0");
    open_body(&mut b, "Dup");
    b.start_node("Group", Some("G")).unwrap();
    b.end_node().unwrap();
    assert!(is_sequencing(b.start_node("Group", Some("G"))));
}

#[test]
fn use_shares_the_node() {
    let mut b = builder("3.0");
    open_body(&mut b, "Shared");
    b.start_node("Shape", Some("S")).unwrap();
    b.end_node().unwrap();
    b.start_node("Transform", None).unwrap();
    b.start_field("children").unwrap();
    b.use_decl("S").unwrap();
    b.end_field().unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    let proto = b.prototype().unwrap();
    let shape = &proto.body().children()[0];
    let transform = &proto.body().children()[1];
    let kids = transform.child_nodes();
    assert_eq!(kids.len(), 1);
    assert!(kids[0].ptr_eq(shape));
    assert!(shape.is_def());
    assert!(shape.is_setup_finished());
}

#[test]
fn reset_keeps_globals() {
    let mut b = builder("3.0");
    open_body(&mut b, "Global");
    b.end_proto_body().unwrap();
    let templates = b
        .templates()
        .iter()
        .map(|t| (t.name().to_owned(), t.clone()))
        .collect();
    b.set_globals(Default::default(), templates);
    b.reset();
    b.start_document(None, None, "utf8", "3.0").unwrap();
    assert!(b.resolve_template("Global").is_some());
    assert!(b.templates().is_empty());
}

// =============================================================================
// Load filtering
// =============================================================================

fn without_backgrounds() -> ProtoBuilder {
    let config = BuilderConfig {
        load: LoadRequirements {
            backgrounds: false,
            ..LoadRequirements::default()
        },
        ..BuilderConfig::default()
    };
    let mut b = ProtoBuilder::with_config(StandardNodeFactory::new(), config);
    b.start_document(None, None, "utf8", "3.0").unwrap();
    b
}

#[test]
fn disabled_category_skips_subtree_uses_and_routes() {
    let mut b = without_backgrounds();
    open_body(&mut b, "Sky");

    b.start_node("Background", Some("BG")).unwrap();
    b.start_field("skyColor").unwrap();
    b.field_value("0 0 1").unwrap();
    b.end_field().unwrap();
    b.start_node("Group", Some("Hidden")).unwrap();
    b.end_node().unwrap();
    b.end_node().unwrap();

    b.start_node("Group", Some("Kept")).unwrap();
    b.start_field("children").unwrap();
    b.use_decl("BG").unwrap();
    b.use_decl("Hidden").unwrap();
    b.end_field().unwrap();
    b.end_node().unwrap();
    b.route_decl("BG", "isBound", "Kept", "addChildren").unwrap();
    b.end_proto_body().unwrap();

    let proto = b.prototype().unwrap();
    assert_eq!(proto.body().child_count(), 1);
    assert!(proto.body().children()[0].child_nodes().is_empty());
    assert!(proto.routes().is_empty());
    assert!(!proto.defs().contains_key("BG"));
}

#[test]
fn skipped_def_does_not_leak_into_sibling_body() {
    let mut b = without_backgrounds();
    open_body(&mut b, "A");
    b.start_node("Background", Some("BG")).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    open_body(&mut b, "B");
    b.start_node("Group", Some("Kept")).unwrap();
    b.start_field("children").unwrap();
    assert!(is_sequencing(b.use_decl("BG")));
    b.end_field().unwrap();
    b.end_node().unwrap();
    assert!(matches!(
        b.route_decl("BG", "isBound", "Kept", "addChildren"),
        Err(ProtoError::InvalidConnection(_))
    ));
}

#[test]
fn skipped_def_in_nested_body_is_invisible_outside() {
    let mut b = without_backgrounds();
    open_body(&mut b, "Outer");
    open_body(&mut b, "Inner");
    b.start_node("Background", Some("BG")).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    b.start_node("Group", Some("Kept")).unwrap();
    b.start_field("children").unwrap();
    assert!(is_sequencing(b.use_decl("BG")));
    b.end_field().unwrap();
    b.end_node().unwrap();
    assert!(matches!(
        b.route_decl("Kept", "children_changed", "BG", "set_bind"),
        Err(ProtoError::InvalidConnection(_))
    ));
}

#[test]
fn unknown_node_type_is_skipped() {
    let mut b = builder("3.0");
    open_body(&mut b, "Mystery");
    b.start_node("NoSuchNode", Some("N")).unwrap();
    b.start_field("whatever").unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();
    assert_eq!(b.prototype().unwrap().body().child_count(), 0);
}

// =============================================================================
// USE restrictions
// =============================================================================

fn body_with_viewpoint_group(b: &mut ProtoBuilder) {
    b.start_node("Group", Some("G")).unwrap();
    b.start_field("children").unwrap();
    b.start_node("Viewpoint", Some("VP")).unwrap();
    b.end_node().unwrap();
    b.end_field().unwrap();
    b.end_node().unwrap();
}

#[test]
fn bindable_use_rejected_outside_scripts() {
    let mut b = builder("3.0");
    open_body(&mut b, "Views");
    body_with_viewpoint_group(&mut b);
    b.start_node("Transform", None).unwrap();
    b.start_field("children").unwrap();
    assert!(is_sequencing(b.use_decl("VP")));
    assert!(is_sequencing(b.use_decl("G")));
}

#[test]
fn bindable_use_allowed_in_script_fields() {
    let mut b = builder("3.0");
    open_body(&mut b, "Views");
    body_with_viewpoint_group(&mut b);
    b.start_node("Script", None).unwrap();
    b.start_script_decl().unwrap();
    b.script_field_decl(AccessType::Field, FieldType::SFNode, "view", None)
        .unwrap();
    b.use_decl("VP").unwrap();
    b.end_script_decl().unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    let proto = b.prototype().unwrap();
    let script = &proto.body().children()[1];
    let index = script.field_index("view").unwrap();
    let held = script.field_value(index).unwrap().nodes();
    assert_eq!(held.len(), 1);
    assert_eq!(held[0].type_name(), "Viewpoint");
}

// =============================================================================
// IS, ROUTE, IMPORT, EXPORT
// =============================================================================

#[test]
fn is_binding_from_event_stream() {
    let mut b = builder("3.0");
    b.start_proto_decl("Mover").unwrap();
    b.proto_field_decl(
        AccessType::ExposedField,
        FieldType::SFVec3f,
        "position",
        Some("0 1 0".into()),
    )
    .unwrap();
    b.end_proto_decl().unwrap();
    b.start_proto_body().unwrap();
    b.start_node("Transform", None).unwrap();
    b.start_field("translation").unwrap();
    b.proto_is_decl("position").unwrap();
    b.end_field().unwrap();
    b.start_field("scale").unwrap();
    assert!(matches!(
        b.proto_is_decl("nothing"),
        Err(ProtoError::UnknownField { .. })
    ));
    b.end_field().unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();

    let proto = b.prototype().unwrap();
    let targets = &proto.is_bindings()[&1];
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].node.type_name(), "Transform");
    assert_eq!(Some(targets[0].field), targets[0].node.field_index("translation"));
}

#[test]
fn route_types_are_checked() {
    let mut b = builder("3.0");
    open_body(&mut b, "Anim");
    for (ty, def) in [
        ("TimeSensor", "Clock"),
        ("PositionInterpolator", "Path"),
        ("Transform", "Mover"),
    ] {
        b.start_node(ty, Some(def)).unwrap();
        b.end_node().unwrap();
    }
    b.route_decl("Clock", "fraction_changed", "Path", "set_fraction")
        .unwrap();
    b.route_decl("Path", "value_changed", "Mover", "translation")
        .unwrap();
    assert!(matches!(
        b.route_decl("Clock", "fraction_changed", "Mover", "translation"),
        Err(ProtoError::InvalidConnection(_))
    ));
    assert!(matches!(
        b.route_decl("Clock", "nope", "Path", "set_fraction"),
        Err(ProtoError::InvalidConnection(_))
    ));
    b.end_proto_body().unwrap();
    assert_eq!(b.prototype().unwrap().routes().len(), 2);
}

#[test]
fn route_outside_body_rejected() {
    let mut b = builder("3.0");
    assert!(is_sequencing(b.route_decl("A", "a", "B", "b")));
}

#[test]
fn import_creates_routable_proxy() {
    let mut b = builder("3.1");
    open_body(&mut b, "Importer");
    b.start_node("Inline", Some("Lib")).unwrap();
    b.end_node().unwrap();
    b.start_node("Transform", Some("T")).unwrap();
    b.end_node().unwrap();
    b.import_decl("Lib", "Door", "LocalDoor").unwrap();
    b.route_decl("LocalDoor", "position_changed", "T", "translation")
        .unwrap();
    assert!(is_sequencing(b.use_decl("LocalDoor")));
    assert!(is_sequencing(b.import_decl("T", "X", "Y")));
    b.end_proto_body().unwrap();

    let proto = b.prototype().unwrap();
    let proxy = &proto.imports()["LocalDoor"];
    assert_eq!(proxy.inline_def(), "Lib");
    assert_eq!(proxy.exported_name(), "Door");
    assert!(proto.routes()[0].source().is_import());
}

#[test]
fn export_is_never_allowed() {
    let mut b = builder("3.0");
    open_body(&mut b, "Exporter");
    match b.export_decl("T", "Out") {
        Err(ProtoError::Sequencing { message, .. }) => {
            assert!(message.starts_with("Protos cannot contain EXPORT"));
        }
        other => panic!("unexpected {other:?}"),
    }

    let mut legacy = builder("V2.0");
    open_body(&mut legacy, "Old");
    match legacy.export_decl("T", "Out") {
        Err(ProtoError::Sequencing { message, .. }) => {
            assert!(message.contains("VRML97"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(is_sequencing(legacy.import_decl("I", "E", "L")));
}

// =============================================================================
// Script interfaces
// =============================================================================

#[test]
fn script_fields_decode_defaults() {
    let mut b = builder("3.0");
    open_body(&mut b, "Scripted");
    b.start_node("Script", Some("S")).unwrap();
    b.start_script_decl().unwrap();
    b.script_field_decl(
        AccessType::Field,
        FieldType::SFFloat,
        "speed",
        Some("2.5".into()),
    )
    .unwrap();
    b.script_field_decl(
        AccessType::EventIn,
        FieldType::SFFloat,
        "set_speed",
        Some("9".into()),
    )
    .unwrap();
    b.end_script_decl().unwrap();
    b.end_node().unwrap();

    let script = b.lookup_def("S").unwrap();
    let speed = script.field_index("speed").unwrap();
    let set_speed = script.field_index("set_speed").unwrap();
    assert_eq!(script.field_value(speed).and_then(|v| v.as_f32()), Some(2.5));
    assert!(script.field_value(set_speed).is_none());
}

#[test]
fn vrml97_script_rejects_x3d_types() {
    let mut b = builder("V2.0");
    open_body(&mut b, "OldScript");
    b.start_node("Script", None).unwrap();
    b.start_script_decl().unwrap();
    assert!(matches!(
        b.script_field_decl(AccessType::Field, FieldType::SFDouble, "d", None),
        Err(ProtoError::InvalidField { .. })
    ));
    b.script_field_decl(AccessType::Field, FieldType::SFTime, "t", None)
        .unwrap();
}

#[test]
fn script_decl_requires_script_node() {
    let mut b = builder("3.0");
    open_body(&mut b, "NotScript");
    b.start_node("Group", None).unwrap();
    assert!(is_sequencing(b.start_script_decl()));
}
