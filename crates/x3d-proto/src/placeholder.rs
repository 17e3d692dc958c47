// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Placeholders standing in for prototype instances that are not expanded
//! yet, with per-layer reference counts.
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{ProtoError, RefCountError, Result};
use crate::field::{FieldType, SpecVersion};
use crate::field_table::FieldTable;
use crate::node::{check_fits, NodeCategory, NodeRef, NodeTraits};
use crate::template::Template;
use crate::value::{FieldValue, TypedValue};

/// Identifier of an independent reference-counting partition.
pub type LayerId = u32;

/// Ordered `(layer, count)` pairs; every stored count is non-zero.
#[derive(Debug, Default)]
struct LayerCounts(Vec<(LayerId, u32)>);

impl LayerCounts {
    fn position(&self, layer: LayerId) -> Option<usize> {
        self.0.iter().position(|(id, _)| *id == layer)
    }

    fn update(&mut self, layer: LayerId, add: bool) -> std::result::Result<(), RefCountError> {
        match (self.position(layer), add) {
            (None, true) => self.0.push((layer, 1)),
            (None, false) => return Err(RefCountError::UntrackedLayer(layer)),
            (Some(i), true) => self.0[i].1 += 1,
            (Some(i), false) => {
                self.0[i].1 -= 1;
                if self.0[i].1 == 0 {
                    self.0.remove(i);
                }
            }
        }
        Ok(())
    }
}

/// A prototype instance awaiting expansion.
///
/// It carries the template's interface and a value for every non-event
/// field: the template's recorded default when one exists, otherwise the
/// canonical default of the field type.
#[derive(Debug)]
pub struct InstancePlaceholder {
    template: Template,
    version: SpecVersion,
    is_static: bool,
    fields: FieldTable,
    values: BTreeMap<usize, TypedValue>,
    node_fields: Vec<usize>,
    implementation: Option<NodeRef>,
    implementation_traits: Option<NodeTraits>,
    is_def: bool,
    in_setup: bool,
    layers: Mutex<LayerCounts>,
}

impl InstancePlaceholder {
    /// Creates a placeholder for `template`.
    ///
    /// An unresolved EXTERNPROTO yields type defaults only and has no
    /// implementation node.
    pub fn new(template: Template, version: SpecVersion, is_static: bool) -> Self {
        let fields = template.fields().clone();
        let mut values = BTreeMap::new();
        let mut node_fields = Vec::new();
        for (index, decl) in fields.iter() {
            if decl.access().is_event() {
                continue;
            }
            if decl.field_type().is_node() {
                node_fields.push(index);
            }
            let value = template
                .recorded_value(index)
                .cloned()
                .unwrap_or_else(|| TypedValue::default_for(decl.field_type()));
            values.insert(index, value);
        }
        let implementation = template
            .resolved()
            .and_then(|proto| proto.body().first_child().cloned());
        let implementation_traits = implementation.as_ref().map(NodeRef::traits);
        Self {
            template,
            version,
            is_static,
            fields,
            values,
            node_fields,
            implementation,
            implementation_traits,
            is_def: false,
            in_setup: true,
            layers: Mutex::new(LayerCounts::default()),
        }
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.template.name()
    }

    /// The template this placeholder instantiates.
    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Version the instance was created under.
    #[must_use]
    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Whether the instance may never change after load.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Instance traits: a prototype instance that is bindable or grouping
    /// when its implementation node is.
    #[must_use]
    pub fn traits(&self) -> NodeTraits {
        let inner = self.implementation_traits;
        NodeTraits {
            category: NodeCategory::ProtoInstance,
            bindable: inner.is_some_and(|t| t.bindable),
            grouping: inner.is_some_and(|t| t.grouping),
        }
    }

    /// First body node of the resolved template.
    #[must_use]
    pub fn implementation(&self) -> Option<&NodeRef> {
        self.implementation.as_ref()
    }

    /// Traits of [`implementation`](Self::implementation).
    #[must_use]
    pub fn implementation_traits(&self) -> Option<NodeTraits> {
        self.implementation_traits
    }

    /// Interface copied from the template.
    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Indices of `SFNode`/`MFNode` fields that hold a value; event
    /// fields are excluded.
    #[must_use]
    pub fn node_field_indices(&self) -> &[usize] {
        &self.node_fields
    }

    /// Current value of the field at `index`.
    #[must_use]
    pub fn field_value(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(&index)
    }

    /// Writes the field at `index`.
    ///
    /// # Errors
    /// [`ProtoError::UnknownField`] for an unknown index, or, once setup has
    /// finished, for a field that holds no value.
    pub fn set_value(&mut self, index: usize, value: TypedValue) -> Result<()> {
        let decl = self
            .fields
            .declaration(index)
            .ok_or_else(|| ProtoError::unknown_field(self.template.name(), index))?;
        if !self.in_setup && !self.values.contains_key(&index) {
            return Err(ProtoError::unknown_field(self.template.name(), decl.name()));
        }
        check_fits(decl, &value)?;
        self.values.insert(index, value);
        Ok(())
    }

    /// Adds a node to a node-typed field: replaces an `SFNode`, appends to an
    /// `MFNode`.
    pub fn add_node_value(&mut self, index: usize, node: NodeRef) -> Result<()> {
        let decl = self
            .fields
            .declaration(index)
            .ok_or_else(|| ProtoError::unknown_field(self.template.name(), index))?;
        match decl.field_type() {
            FieldType::SFNode => {
                let value = TypedValue::for_field(decl, FieldValue::Node(Some(node)))?;
                self.set_value(index, value)
            }
            FieldType::MFNode => {
                if !self.in_setup && !self.values.contains_key(&index) {
                    return Err(ProtoError::unknown_field(self.template.name(), decl.name()));
                }
                self.values
                    .entry(index)
                    .or_insert_with(|| TypedValue::default_for(FieldType::MFNode))
                    .push_node(node);
                Ok(())
            }
            other => Err(ProtoError::invalid_value(
                decl.name(),
                other,
                "field does not hold nodes",
            )),
        }
    }

    pub(crate) fn set_def(&mut self) {
        self.is_def = true;
    }

    /// Whether the instance was named by a DEF.
    #[must_use]
    pub fn is_def(&self) -> bool {
        self.is_def
    }

    pub(crate) fn setup_finished(&mut self) {
        self.in_setup = false;
    }

    /// Whether setup has completed.
    #[must_use]
    pub fn is_setup_finished(&self) -> bool {
        !self.in_setup
    }

    /// A placeholder never produces an instance itself.
    pub fn create_new_instance(&self, _root: &NodeRef, _is_static: bool) -> Result<Option<NodeRef>> {
        Ok(None)
    }

    // ── Layer reference counts ──────────────────────────────────────

    /// Adds (`add == true`) or drops one reference from `layer`. A layer
    /// whose count reaches zero stops being tracked.
    ///
    /// # Errors
    /// [`RefCountError::UntrackedLayer`] when dropping from a layer that
    /// holds no references.
    pub fn update_ref_count(
        &self,
        layer: LayerId,
        add: bool,
    ) -> std::result::Result<(), RefCountError> {
        self.layers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .update(layer, add)
    }

    /// References held by `layer`; zero when untracked.
    #[must_use]
    pub fn ref_count(&self, layer: LayerId) -> u32 {
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers
            .position(layer)
            .map_or(0, |i| layers.0[i].1)
    }

    /// Tracked layers in first-reference order; `None` when there are none.
    #[must_use]
    pub fn layer_ids(&self) -> Option<Vec<LayerId>> {
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        if layers.0.is_empty() {
            None
        } else {
            Some(layers.0.iter().map(|(id, _)| *id).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::extern_proto::ExternPrototypeDeclaration;
    use crate::field::{AccessType, FieldDeclaration};
    use crate::proto::PrototypeDeclaration;

    fn declared() -> Template {
        let mut p = PrototypeDeclaration::new("TestProto", SpecVersion::X3D_3_0);
        let i = p
            .append_field(FieldDeclaration::new("intField", FieldType::SFInt32, AccessType::Field))
            .unwrap();
        p.append_field(FieldDeclaration::new("f", FieldType::SFFloat, AccessType::ExposedField))
            .unwrap();
        p.append_field(FieldDeclaration::new("kids", FieldType::MFNode, AccessType::Field))
            .unwrap();
        p.append_field(FieldDeclaration::new("go", FieldType::SFBool, AccessType::EventIn))
            .unwrap();
        let v = TypedValue::for_field(p.field_declaration(i).unwrap(), FieldValue::Int32(42))
            .unwrap();
        p.set_field_value(i, v).unwrap();
        Template::Proto(Arc::new(p))
    }

    #[test]
    fn copies_recorded_values_and_synthesizes_defaults() {
        let ph = InstancePlaceholder::new(declared(), SpecVersion::X3D_3_0, false);
        assert_eq!(ph.field_value(1).and_then(TypedValue::as_i32), Some(42));
        assert_eq!(ph.field_value(2).and_then(TypedValue::as_f32), Some(0.0));
        assert!(ph.field_value(4).is_none());
        assert_eq!(ph.node_field_indices(), &[0, 3]);
        assert!(ph.implementation().is_none());
    }

    #[test]
    fn node_events_are_not_node_fields() {
        let mut p = PrototypeDeclaration::new("Relay", SpecVersion::X3D_3_0);
        p.append_field(FieldDeclaration::new("set_target", FieldType::SFNode, AccessType::EventIn))
            .unwrap();
        p.append_field(FieldDeclaration::new("picked", FieldType::MFNode, AccessType::EventOut))
            .unwrap();
        let held = p
            .append_field(FieldDeclaration::new("target", FieldType::SFNode, AccessType::ExposedField))
            .unwrap();
        let ph = InstancePlaceholder::new(Template::Proto(Arc::new(p)), SpecVersion::X3D_3_0, false);
        assert_eq!(ph.node_field_indices(), &[0, held]);
        assert!(ph.field_value(1).is_none());
        assert!(ph.field_value(held).is_some());
    }

    #[test]
    fn extern_placeholders_use_defaults() {
        let mut ext = ExternPrototypeDeclaration::new("Ext", SpecVersion::X3D_3_0);
        ext.append_field(FieldDeclaration::new("s", FieldType::SFString, AccessType::Field))
            .unwrap();
        let ph = InstancePlaceholder::new(Template::Extern(Arc::new(ext)), SpecVersion::X3D_3_0, false);
        assert_eq!(ph.field_value(1).and_then(TypedValue::as_str), Some(""));
    }

    #[test]
    fn writes_after_setup_need_existing_values() {
        let mut ph = InstancePlaceholder::new(declared(), SpecVersion::X3D_3_0, false);
        let decl = ph.fields().declaration(1).unwrap().clone();
        ph.setup_finished();
        let v = TypedValue::for_field(&decl, FieldValue::Int32(7)).unwrap();
        ph.set_value(1, v.clone()).unwrap();
        assert!(matches!(ph.set_value(4, v), Err(ProtoError::UnknownField { .. })));
    }

    #[test]
    fn ref_count_contract() {
        let ph = InstancePlaceholder::new(declared(), SpecVersion::X3D_3_0, false);
        assert_eq!(ph.layer_ids(), None);
        ph.update_ref_count(1, true).unwrap();
        ph.update_ref_count(1, true).unwrap();
        assert_eq!(ph.ref_count(1), 2);
        ph.update_ref_count(1, false).unwrap();
        ph.update_ref_count(1, false).unwrap();
        assert_eq!(ph.ref_count(1), 0);
        assert_eq!(ph.layer_ids(), None);
        assert_eq!(
            ph.update_ref_count(1, false),
            Err(RefCountError::UntrackedLayer(1))
        );
    }

    #[test]
    fn placeholder_never_instantiates() {
        let ph = InstancePlaceholder::new(declared(), SpecVersion::X3D_3_0, false);
        let root = NodeRef::scene(crate::node::SceneNode::world_root(crate::LanguageMode::X3d));
        assert_eq!(ph.create_new_instance(&root, false), Ok(None));
    }
}
