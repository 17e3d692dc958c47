// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node handles used inside declarations.
//!
//! Nodes are shared (DEF/USE) rather than copied, so every node lives behind
//! a [`NodeRef`]: an `Arc` with an interior `RwLock`. Capabilities are carried
//! as plain data in [`NodeTraits`] instead of being discovered by type tests.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, Result};
use crate::field::{AccessType, FieldDeclaration, FieldType, LanguageMode};
use crate::field_table::FieldTable;
use crate::placeholder::InstancePlaceholder;
use crate::value::{FieldValue, TypedValue};

/// Coarse node classification used for load filtering and root checks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Nodes with a `children` list.
    Grouping,
    /// Renderable shapes.
    Shape,
    /// Geometry nodes.
    Geometry,
    /// Appearance, material and texture nodes.
    Appearance,
    /// Coordinate, normal and color data nodes.
    GeometricProperty,
    /// Viewpoints.
    Viewpoint,
    /// Navigation info.
    Navigation,
    /// Backgrounds.
    Background,
    /// Fog.
    Fog,
    /// Light sources.
    Light,
    /// Sound and audio clips.
    Audio,
    /// Inline (external file) nodes.
    Inline,
    /// Script nodes.
    Script,
    /// Sensors.
    Sensor,
    /// Interpolators.
    Interpolator,
    /// World info and similar descriptive nodes.
    Info,
    /// Metadata nodes.
    Metadata,
    /// The root of a world; instances may be created against it.
    WorldRoot,
    /// A prototype instance (placeholder or expanded).
    ProtoInstance,
}

/// Capability tags of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeTraits {
    /// Classification.
    pub category: NodeCategory,
    /// At most one node of the type is active at a time.
    pub bindable: bool,
    /// Holds child nodes that may themselves be bindable.
    pub grouping: bool,
}

impl NodeTraits {
    /// Non-bindable, non-grouping traits for `category`.
    #[must_use]
    pub const fn plain(category: NodeCategory) -> Self {
        Self {
            category,
            bindable: false,
            grouping: false,
        }
    }
}

/// A concrete (non-prototype) node produced by a [`NodeFactory`](crate::NodeFactory).
#[derive(Debug, Clone)]
pub struct SceneNode {
    type_name: String,
    traits: NodeTraits,
    fields: Arc<FieldTable>,
    values: BTreeMap<usize, TypedValue>,
    is_def: bool,
    setup_finished: bool,
}

impl SceneNode {
    /// Creates a node of `type_name` with the shared field table `fields`.
    pub fn new(type_name: impl Into<String>, traits: NodeTraits, fields: Arc<FieldTable>) -> Self {
        Self {
            type_name: type_name.into(),
            traits,
            fields,
            values: BTreeMap::new(),
            is_def: false,
            setup_finished: false,
        }
    }

    /// A world root node; instances may be created against it.
    #[must_use]
    pub fn world_root(mode: LanguageMode) -> Self {
        let fields = FieldTable::builtin(
            mode,
            [FieldDeclaration::new(
                "children",
                FieldType::MFNode,
                AccessType::ExposedField,
            )],
        );
        Self::new(
            "WorldRoot",
            NodeTraits {
                category: NodeCategory::WorldRoot,
                bindable: false,
                grouping: true,
            },
            Arc::new(fields),
        )
    }

    /// Node type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Capability tags.
    #[must_use]
    pub fn traits(&self) -> NodeTraits {
        self.traits
    }

    /// Field table.
    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Value stored for `index`, if any.
    #[must_use]
    pub fn field_value(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(&index)
    }

    /// Appends a dynamic field (Script nodes). The table is copied on first
    /// write so nodes sharing a catalogue table are unaffected.
    pub fn append_field(&mut self, decl: FieldDeclaration) -> Result<usize> {
        Arc::make_mut(&mut self.fields).append(decl)
    }

    /// Stores `value` for the field at `index`.
    pub fn set_value(&mut self, index: usize, value: TypedValue) -> Result<()> {
        let decl = self
            .fields
            .declaration(index)
            .ok_or_else(|| ProtoError::unknown_field(&self.type_name, index))?;
        check_fits(decl, &value)?;
        self.values.insert(index, value);
        Ok(())
    }

    /// Adds `node` to the node-typed field at `index`: appends for `MFNode`,
    /// replaces for `SFNode`.
    pub fn add_node_value(&mut self, index: usize, node: NodeRef) -> Result<()> {
        let decl = self
            .fields
            .declaration(index)
            .ok_or_else(|| ProtoError::unknown_field(&self.type_name, index))?;
        let field_type = decl.field_type();
        match field_type {
            FieldType::SFNode => {
                let value = TypedValue::for_field(decl, FieldValue::Node(Some(node)))?;
                self.values.insert(index, value);
            }
            FieldType::MFNode => {
                self.values
                    .entry(index)
                    .or_insert_with(|| TypedValue::default_for(field_type))
                    .push_node(node);
            }
            _ => {
                return Err(ProtoError::invalid_value(
                    decl.name(),
                    field_type,
                    "field does not hold nodes",
                ))
            }
        }
        Ok(())
    }
}

pub(crate) fn check_fits(decl: &FieldDeclaration, value: &TypedValue) -> Result<()> {
    if value.value().fits(decl.field_type()) {
        Ok(())
    } else {
        Err(ProtoError::invalid_value(
            decl.name(),
            decl.field_type(),
            "value representation does not match the field type",
        ))
    }
}

/// What a [`NodeRef`] points at.
#[derive(Debug)]
pub enum NodeKind {
    /// A concrete node.
    Scene(SceneNode),
    /// A stand-in for a not yet expanded prototype instance.
    Placeholder(InstancePlaceholder),
}

impl NodeKind {
    /// Type name (the template name for placeholders).
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Scene(n) => n.type_name(),
            Self::Placeholder(p) => p.name(),
        }
    }

    /// Capability tags.
    #[must_use]
    pub fn traits(&self) -> NodeTraits {
        match self {
            Self::Scene(n) => n.traits(),
            Self::Placeholder(p) => p.traits(),
        }
    }

    /// Field table.
    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        match self {
            Self::Scene(n) => n.fields(),
            Self::Placeholder(p) => p.fields(),
        }
    }

    /// Value stored for `index`, if any.
    #[must_use]
    pub fn field_value(&self, index: usize) -> Option<&TypedValue> {
        match self {
            Self::Scene(n) => n.field_value(index),
            Self::Placeholder(p) => p.field_value(index),
        }
    }

    /// Every node referenced from a node-typed field, in field order.
    #[must_use]
    pub fn child_nodes(&self) -> Vec<NodeRef> {
        let fields = self.fields();
        fields
            .iter()
            .filter(|(_, d)| d.field_type().is_node())
            .filter_map(|(i, _)| self.field_value(i))
            .flat_map(TypedValue::nodes)
            .collect()
    }
}

/// Shared handle to a node.
#[derive(Clone)]
pub struct NodeRef(Arc<RwLock<NodeKind>>);

impl NodeRef {
    /// Wraps `kind` in a fresh handle.
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self(Arc::new(RwLock::new(kind)))
    }

    /// Wraps a concrete node.
    #[must_use]
    pub fn scene(node: SceneNode) -> Self {
        Self::new(NodeKind::Scene(node))
    }

    /// Wraps a placeholder.
    #[must_use]
    pub fn placeholder(placeholder: InstancePlaceholder) -> Self {
        Self::new(NodeKind::Placeholder(placeholder))
    }

    /// Shared access to the node.
    pub fn read(&self) -> RwLockReadGuard<'_, NodeKind> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Exclusive access to the node.
    pub fn write(&self) -> RwLockWriteGuard<'_, NodeKind> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn identity(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }

    /// Type name (the template name for placeholders).
    #[must_use]
    pub fn type_name(&self) -> String {
        self.read().type_name().to_owned()
    }

    /// Capability tags.
    #[must_use]
    pub fn traits(&self) -> NodeTraits {
        self.read().traits()
    }

    /// `true` when the handle points at a placeholder.
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(&*self.read(), NodeKind::Placeholder(_))
    }

    /// Index of the field called `name`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.read().fields().index_of(name)
    }

    /// Declaration of the field at `index`.
    #[must_use]
    pub fn field_declaration(&self, index: usize) -> Option<FieldDeclaration> {
        self.read().fields().declaration(index).cloned()
    }

    /// Copy of the value stored for `index`.
    #[must_use]
    pub fn field_value(&self, index: usize) -> Option<TypedValue> {
        self.read().field_value(index).cloned()
    }

    /// Stores `value` for the field at `index`.
    pub fn set_value(&self, index: usize, value: TypedValue) -> Result<()> {
        match &mut *self.write() {
            NodeKind::Scene(n) => n.set_value(index, value),
            NodeKind::Placeholder(p) => p.set_value(index, value),
        }
    }

    /// Adds `node` to the node-typed field at `index`.
    pub fn add_node_value(&self, index: usize, node: NodeRef) -> Result<()> {
        match &mut *self.write() {
            NodeKind::Scene(n) => n.add_node_value(index, node),
            NodeKind::Placeholder(p) => p.add_node_value(index, node),
        }
    }

    /// Appends a dynamic field; only concrete nodes accept new fields.
    pub fn append_field(&self, decl: FieldDeclaration) -> Result<usize> {
        match &mut *self.write() {
            NodeKind::Scene(n) => n.append_field(decl),
            NodeKind::Placeholder(p) => Err(ProtoError::InvalidField {
                name: decl.name().to_owned(),
                reason: format!("prototype instance `{}` has a fixed interface", p.name()),
            }),
        }
    }

    /// Marks the node as the target of a DEF.
    pub fn set_def(&self) {
        match &mut *self.write() {
            NodeKind::Scene(n) => n.is_def = true,
            NodeKind::Placeholder(p) => p.set_def(),
        }
    }

    /// Whether the node was named by a DEF.
    #[must_use]
    pub fn is_def(&self) -> bool {
        match &*self.read() {
            NodeKind::Scene(n) => n.is_def,
            NodeKind::Placeholder(p) => p.is_def(),
        }
    }

    /// Completes setup of this node and every node reachable through its
    /// node-typed fields.
    pub fn setup_finished(&self) {
        let mut seen = HashSet::new();
        let mut pending = vec![self.clone()];
        while let Some(node) = pending.pop() {
            if !seen.insert(node.identity()) {
                continue;
            }
            let children = {
                let mut guard = node.write();
                match &mut *guard {
                    NodeKind::Scene(n) => n.setup_finished = true,
                    NodeKind::Placeholder(p) => p.setup_finished(),
                }
                guard.child_nodes()
            };
            pending.extend(children);
        }
    }

    /// Whether setup has completed.
    #[must_use]
    pub fn is_setup_finished(&self) -> bool {
        match &*self.read() {
            NodeKind::Scene(n) => n.setup_finished,
            NodeKind::Placeholder(p) => p.is_setup_finished(),
        }
    }

    /// Every node referenced from a node-typed field.
    #[must_use]
    pub fn child_nodes(&self) -> Vec<NodeRef> {
        self.read().child_nodes()
    }

    /// Bindable itself, or a grouping node with a bindable anywhere below it.
    #[must_use]
    pub fn is_bindable_hazard(&self) -> bool {
        let traits = self.traits();
        traits.bindable || (traits.grouping && self.contains_bindables())
    }

    /// Whether any node reachable below this one is bindable.
    #[must_use]
    pub fn contains_bindables(&self) -> bool {
        let mut seen = HashSet::from([self.identity()]);
        let mut pending = self.child_nodes();
        while let Some(node) = pending.pop() {
            if !seen.insert(node.identity()) {
                continue;
            }
            if node.traits().bindable {
                return true;
            }
            pending.extend(node.child_nodes());
        }
        false
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(guard) => write!(f, "NodeRef({})", guard.type_name()),
            Err(_) => f.write_str("NodeRef(<locked>)"),
        }
    }
}
