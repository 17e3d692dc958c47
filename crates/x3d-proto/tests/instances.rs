// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Instantiation: placeholders, layer reference counts, EXTERNPROTO
//! resolution, and delegation to an installed instance creator.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;
use x3d_proto::{
    AccessType, CreatorHandle, ExternPrototypeDeclaration, FieldDeclaration, FieldType,
    InstanceCreator, InstancePlaceholder, LanguageMode, LoadState, NodeCategory, NodeFactory,
    NodeRef, ProtoBuilder, ProtoError, PrototypeDeclaration, RefCountError, SceneNode,
    SpecVersion, StandardNodeFactory, Template, TypedValue,
};

#[derive(Default)]
struct CountingCreator {
    calls: AtomicUsize,
}

impl InstanceCreator for CountingCreator {
    fn new_instance(
        &self,
        template: &Template,
        _root: &NodeRef,
        version: SpecVersion,
        is_static: bool,
    ) -> x3d_proto::Result<NodeRef> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(NodeRef::placeholder(InstancePlaceholder::new(
            template.clone(),
            version,
            is_static,
        )))
    }
}

fn world() -> NodeRef {
    NodeRef::scene(SceneNode::world_root(LanguageMode::X3d))
}

fn build_with_creator(creator: CreatorHandle) -> Template {
    let mut b = ProtoBuilder::new(StandardNodeFactory::new());
    b.start_document(None, None, "utf8", "3.0").unwrap();
    b.new_proto(Some(creator));
    b.start_proto_decl("Lamp").unwrap();
    b.proto_field_decl(
        AccessType::ExposedField,
        FieldType::SFFloat,
        "intensity",
        Some("0.5".into()),
    )
    .unwrap();
    b.end_proto_decl().unwrap();
    b.start_proto_body().unwrap();
    b.start_node("PointLight", None).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();
    b.templates()[0].clone()
}

// =============================================================================
// Creator delegation
// =============================================================================

#[test]
fn creator_is_invoked_for_world_roots() {
    let creator = Arc::new(CountingCreator::default());
    let handle = CreatorHandle::from(Arc::clone(&creator) as Arc<dyn InstanceCreator>);
    let template = build_with_creator(handle);

    let instance = template.create_new_instance(&world(), true).unwrap().unwrap();
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(instance.type_name(), "Lamp");

    // A prototype instance is an acceptable root as well.
    template.create_new_instance(&instance, false).unwrap();
    assert_eq!(creator.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn other_roots_are_rejected() {
    let creator = Arc::new(CountingCreator::default());
    let handle = CreatorHandle::from(Arc::clone(&creator) as Arc<dyn InstanceCreator>);
    let template = build_with_creator(handle);

    let mut factory = StandardNodeFactory::new();
    let group = NodeRef::scene(factory.create_node("Group").unwrap());
    assert!(matches!(
        template.create_new_instance(&group, false),
        Err(ProtoError::InvalidRootType(name)) if name == "Group"
    ));
    assert_eq!(creator.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn no_creator_yields_nothing() {
    let proto = Arc::new(PrototypeDeclaration::new("Plain", SpecVersion::X3D_3_0));
    assert_eq!(proto.create_new_instance(&world(), false), Ok(None));
}

// =============================================================================
// Placeholders
// =============================================================================

#[test]
fn placeholder_reflects_implementation_traits() {
    let template = build_with_creator(CreatorHandle::new(CountingCreator::default()));
    let placeholder = InstancePlaceholder::new(template, SpecVersion::X3D_3_0, false);

    assert_eq!(placeholder.traits().category, NodeCategory::ProtoInstance);
    assert_eq!(
        placeholder.implementation_traits().map(|t| t.category),
        Some(NodeCategory::Light)
    );
    let intensity = placeholder.fields().index_of("intensity").unwrap();
    assert_eq!(
        placeholder.field_value(intensity).and_then(TypedValue::as_f32),
        Some(0.5)
    );
}

#[test]
fn disabled_implementation_skips_instances() {
    let template = build_with_creator(CreatorHandle::new(CountingCreator::default()));
    let Template::Proto(lamp) = template else {
        panic!("Lamp is a PROTO");
    };

    let config = x3d_proto::BuilderConfig {
        load: x3d_proto::LoadRequirements {
            lights: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut b = ProtoBuilder::with_config(StandardNodeFactory::new(), config);
    let globals = [("Lamp".to_owned(), Template::Proto(lamp))].into_iter().collect();
    b.set_globals(Default::default(), globals);
    b.start_document(None, None, "utf8", "3.0").unwrap();
    b.start_proto_decl("Room").unwrap();
    b.end_proto_decl().unwrap();
    b.start_proto_body().unwrap();
    b.start_node("Lamp", Some("L")).unwrap();
    b.end_node().unwrap();
    b.end_proto_body().unwrap();
    assert_eq!(b.prototype().unwrap().body().child_count(), 0);
}

// =============================================================================
// EXTERNPROTO resolution
// =============================================================================

#[test]
fn resolved_extern_projects_body_defaults() {
    let mut body = PrototypeDeclaration::new("Remote", SpecVersion::X3D_3_0);
    body.append_field(FieldDeclaration::new("extra", FieldType::SFBool, AccessType::Field))
        .unwrap();
    let size = body
        .append_field(FieldDeclaration::new("size", FieldType::SFFloat, AccessType::Field))
        .unwrap();
    let decl = body.field_declaration(size).unwrap().clone();
    body.set_field_value(
        size,
        TypedValue::for_field(&decl, x3d_proto::FieldValue::Float(3.0)).unwrap(),
    )
    .unwrap();

    let mut ext = ExternPrototypeDeclaration::new("Local", SpecVersion::X3D_3_0);
    ext.append_field(decl).unwrap();
    ext.resolve(Arc::new(body)).unwrap();
    assert_eq!(ext.load_state(), LoadState::Loaded);

    let placeholder =
        InstancePlaceholder::new(Template::Extern(Arc::new(ext)), SpecVersion::X3D_3_0, false);
    assert_eq!(placeholder.field_value(1).and_then(TypedValue::as_f32), Some(3.0));
}

// =============================================================================
// Layer reference counts
// =============================================================================

#[test]
fn ref_count_sequence() {
    let placeholder = InstancePlaceholder::new(
        Template::Proto(Arc::new(PrototypeDeclaration::new("P", SpecVersion::X3D_3_0))),
        SpecVersion::X3D_3_0,
        false,
    );
    placeholder.update_ref_count(1, true).unwrap();
    placeholder.update_ref_count(1, true).unwrap();
    placeholder.update_ref_count(2, true).unwrap();
    assert_eq!(placeholder.layer_ids(), Some(vec![1, 2]));
    assert_eq!(placeholder.ref_count(1), 2);

    placeholder.update_ref_count(1, false).unwrap();
    placeholder.update_ref_count(1, false).unwrap();
    assert_eq!(placeholder.ref_count(1), 0);
    assert_eq!(placeholder.layer_ids(), Some(vec![2]));

    placeholder.update_ref_count(2, false).unwrap();
    assert_eq!(placeholder.layer_ids(), None);
    assert_eq!(
        placeholder.update_ref_count(7, false),
        Err(RefCountError::UntrackedLayer(7))
    );
}

proptest! {
    #[test]
    fn ref_counts_match_a_simple_model(ops in prop::collection::vec((0u32..4, any::<bool>()), 0..60)) {
        let placeholder = InstancePlaceholder::new(
            Template::Proto(Arc::new(PrototypeDeclaration::new("P", SpecVersion::X3D_3_0))),
            SpecVersion::X3D_3_0,
            false,
        );
        let mut model: Vec<(u32, u32)> = Vec::new();
        for (layer, add) in ops {
            let slot = model.iter().position(|(id, _)| *id == layer);
            let result = placeholder.update_ref_count(layer, add);
            match (slot, add) {
                (None, false) => {
                    prop_assert_eq!(result, Err(RefCountError::UntrackedLayer(layer)));
                }
                (None, true) => {
                    prop_assert!(result.is_ok());
                    model.push((layer, 1));
                }
                (Some(i), true) => {
                    prop_assert!(result.is_ok());
                    model[i].1 += 1;
                }
                (Some(i), false) => {
                    prop_assert!(result.is_ok());
                    model[i].1 -= 1;
                    if model[i].1 == 0 {
                        model.remove(i);
                    }
                }
            }
            for (id, count) in &model {
                prop_assert_eq!(placeholder.ref_count(*id), *count);
            }
            let expected: Option<Vec<u32>> =
                (!model.is_empty()).then(|| model.iter().map(|(id, _)| *id).collect());
            prop_assert_eq!(placeholder.layer_ids(), expected);
        }
    }
}
