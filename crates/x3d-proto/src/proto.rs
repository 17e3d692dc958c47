// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! PROTO declarations: public interface, body, IS bindings, and ROUTEs.
//!
//! A declaration is mutable only while the builder owns it; once its body
//! closes it is frozen behind an `Arc` and shared read-only.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::body::BodyContainer;
use crate::error::{ProtoError, Result};
use crate::field::{AccessType, FieldDeclaration, LanguageMode, SpecVersion};
use crate::field_table::FieldTable;
use crate::import::ImportProxy;
use crate::node::{check_fits, NodeRef, NodeTraits};
use crate::route::{RouteEdge, RouteEndpoint};
use crate::template::{CreatorHandle, Template};
use crate::value::TypedValue;

/// One IS target: a field of a body node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsDestination {
    /// Body node owning the field.
    pub node: NodeRef,
    /// Field index on `node`.
    pub field: usize,
}

/// Access pairs an IS binding may join, as `(interface, body node)`.
///
/// exposedField binds only to exposedField; field, eventIn and eventOut bind
/// to their own kind or to exposedField.
#[must_use]
pub fn is_access_allowed(interface: AccessType, node: AccessType) -> bool {
    use AccessType::{EventIn, EventOut, ExposedField, Field};
    match interface {
        ExposedField => node == ExposedField,
        Field => matches!(node, Field | ExposedField),
        EventIn => matches!(node, EventIn | ExposedField),
        EventOut => matches!(node, EventOut | ExposedField),
    }
}

/// The VRML97 access table, applied on top of [`is_access_allowed`] in
/// legacy mode. Returns the reason when the pair is rejected.
#[must_use]
pub fn legacy_is_violation(interface: AccessType, node: AccessType) -> Option<&'static str> {
    use AccessType::{EventIn, EventOut, ExposedField, Field};
    match (interface, node) {
        (ExposedField, n) if n != ExposedField => {
            Some("interface exposedField must bind to an exposedField")
        }
        (Field, EventIn | EventOut) => Some("interface field must bind to a field or exposedField"),
        (EventIn, Field | EventOut) => {
            Some("interface eventIn must not bind to a field or eventOut")
        }
        (EventOut, Field | EventIn) => {
            Some("interface eventOut must not bind to a field or eventIn")
        }
        _ => None,
    }
}

/// A PROTO: named template with a typed public interface and a body.
#[derive(Debug)]
pub struct PrototypeDeclaration {
    name: String,
    version: SpecVersion,
    fields: FieldTable,
    values: BTreeMap<usize, TypedValue>,
    body: BodyContainer,
    is_bindings: BTreeMap<usize, Vec<IsDestination>>,
    routes: Vec<RouteEdge>,
    nested: Vec<Template>,
    defs: BTreeMap<String, NodeRef>,
    imports: BTreeMap<String, Arc<ImportProxy>>,
    creator: Option<CreatorHandle>,
}

impl PrototypeDeclaration {
    /// Creates an empty declaration called `name`.
    pub fn new(name: impl Into<String>, version: SpecVersion) -> Self {
        Self {
            name: name.into(),
            version,
            fields: FieldTable::new(version.mode()),
            values: BTreeMap::new(),
            body: BodyContainer::new(),
            is_bindings: BTreeMap::new(),
            routes: Vec::new(),
            nested: Vec::new(),
            defs: BTreeMap::new(),
            imports: BTreeMap::new(),
            creator: None,
        }
    }

    /// Installs the creator later used by
    /// [`create_new_instance`](Self::create_new_instance).
    pub fn set_creator(&mut self, creator: Option<CreatorHandle>) {
        self.creator = creator;
    }

    pub(crate) fn creator(&self) -> Option<&CreatorHandle> {
        self.creator.as_ref()
    }

    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version the declaration was authored under.
    #[must_use]
    pub fn version(&self) -> SpecVersion {
        self.version
    }

    /// Language mode derived from [`version`](Self::version).
    #[must_use]
    pub fn mode(&self) -> LanguageMode {
        self.version.mode()
    }

    // ── Interface ───────────────────────────────────────────────────

    /// Public interface table.
    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Number of interface slots, the implicit `metadata` included.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Index of the interface field called `name`.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.index_of(name)
    }

    /// Interface declaration at `index`.
    #[must_use]
    pub fn field_declaration(&self, index: usize) -> Option<&FieldDeclaration> {
        self.fields.declaration(index)
    }

    /// Live interface declarations in order.
    #[must_use]
    pub fn field_declarations(&self) -> Vec<&FieldDeclaration> {
        self.fields.live_declarations()
    }

    /// Adds an interface field; see [`FieldTable::append`].
    pub fn append_field(&mut self, decl: FieldDeclaration) -> Result<usize> {
        self.fields.append(decl)
    }

    /// Removes an interface field and its recorded value.
    pub fn delete_field(&mut self, index: usize) -> Option<FieldDeclaration> {
        self.values.remove(&index);
        self.is_bindings.remove(&index);
        self.fields.delete(index)
    }

    fn stored_declaration(&self, index: usize) -> Result<&FieldDeclaration> {
        self.fields
            .declaration(index)
            .ok_or_else(|| ProtoError::unknown_field(&self.name, index))
    }

    /// Records the default value of the field at `index`.
    ///
    /// # Errors
    /// - [`ProtoError::UnknownField`] for an unknown index.
    /// - [`ProtoError::InvalidField`] for eventIn/eventOut fields, which
    ///   carry no value.
    /// - [`ProtoError::InvalidFieldValue`] when `value` does not fit the type.
    pub fn set_field_value(&mut self, index: usize, value: TypedValue) -> Result<()> {
        let decl = self.stored_declaration(index)?;
        if decl.access().is_event() {
            return Err(ProtoError::InvalidField {
                name: decl.name().to_owned(),
                reason: format!("{} fields carry no value", decl.access()),
            });
        }
        check_fits(decl, &value)?;
        self.values.insert(index, value);
        Ok(())
    }

    /// Adds `node` to the default of a node-typed field. An `SFNode` keeps
    /// the first node it receives; an `MFNode` keeps them all, in order.
    pub fn add_field_node_value(&mut self, index: usize, node: NodeRef) -> Result<()> {
        let decl = self.stored_declaration(index)?;
        let field_type = decl.field_type();
        if !field_type.is_node() {
            return Err(ProtoError::invalid_value(
                decl.name(),
                field_type,
                "field does not hold nodes",
            ));
        }
        let value = self
            .values
            .entry(index)
            .or_insert_with(|| TypedValue::default_for(field_type));
        if !value.push_node(node) {
            trace!(index, "SFNode default already set; extra node dropped");
        }
        Ok(())
    }

    /// Recorded default of the field at `index`, if one was given.
    ///
    /// # Errors
    /// [`ProtoError::UnknownField`] for an unknown index;
    /// [`ProtoError::InvalidField`] for an eventIn, which cannot be read.
    pub fn field_value(&self, index: usize) -> Result<Option<&TypedValue>> {
        let decl = self.stored_declaration(index)?;
        if decl.access() == AccessType::EventIn {
            return Err(ProtoError::InvalidField {
                name: decl.name().to_owned(),
                reason: "cannot read the value of an eventIn".into(),
            });
        }
        Ok(self.values.get(&index))
    }

    pub(crate) fn recorded_value(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(&index)
    }

    // ── Body ────────────────────────────────────────────────────────

    /// The body container.
    #[must_use]
    pub fn body(&self) -> &BodyContainer {
        &self.body
    }

    pub(crate) fn body_mut(&mut self) -> &mut BodyContainer {
        &mut self.body
    }

    /// Traits of the first body node, which an instance takes on.
    #[must_use]
    pub fn primary_traits(&self) -> Option<NodeTraits> {
        self.body.primary_traits()
    }

    // ── IS bindings ─────────────────────────────────────────────────

    /// Exposes field `destination_field` of body node `destination` through
    /// the interface field called `source`.
    ///
    /// One interface field may fan out to several body fields.
    ///
    /// # Errors
    /// - [`ProtoError::UnknownField`] when either side does not exist.
    /// - [`ProtoError::InvalidConnection`] when types differ or the access
    ///   pair is not allowed (stricter rules apply in VRML97 mode).
    pub fn bind_is(
        &mut self,
        source: &str,
        destination: &NodeRef,
        destination_field: usize,
    ) -> Result<()> {
        let index = self
            .fields
            .index_of(source)
            .ok_or_else(|| ProtoError::unknown_field(&self.name, source))?;
        let src = self.stored_declaration(index)?;
        let dst = destination
            .field_declaration(destination_field)
            .ok_or_else(|| ProtoError::unknown_field(destination.type_name(), destination_field))?;
        if src.field_type() != dst.field_type() {
            return Err(ProtoError::InvalidConnection(format!(
                "IS joins `{}` ({}) to `{}` ({})",
                src.name(),
                src.field_type(),
                dst.name(),
                dst.field_type()
            )));
        }
        let mode = self.mode();
        if !is_access_allowed(src.access(), dst.access()) {
            return Err(ProtoError::InvalidConnection(format!(
                "IS access mismatch: `{}` is {} and `{}` is {}",
                src.name(),
                src.access().name(mode),
                dst.name(),
                dst.access().name(mode)
            )));
        }
        if mode == LanguageMode::Vrml97 {
            if let Some(reason) = legacy_is_violation(src.access(), dst.access()) {
                return Err(ProtoError::InvalidConnection(reason.to_owned()));
            }
        }
        self.is_bindings
            .entry(index)
            .or_default()
            .push(IsDestination {
                node: destination.clone(),
                field: destination_field,
            });
        Ok(())
    }

    /// IS targets keyed by interface field index.
    #[must_use]
    pub fn is_bindings(&self) -> &BTreeMap<usize, Vec<IsDestination>> {
        &self.is_bindings
    }

    // ── Routes, nesting, names ──────────────────────────────────────

    /// Stores `edge`; a duplicate of an existing edge is ignored. Returns
    /// whether the edge was new.
    pub fn add_route(&mut self, edge: RouteEdge) -> bool {
        if self.routes.contains(&edge) {
            return false;
        }
        self.routes.push(edge);
        true
    }

    /// Builds and stores an edge between two body endpoints by field index.
    /// See [`RouteEdge::connect`].
    pub fn connect(
        &mut self,
        source: &NodeRef,
        source_field: usize,
        destination: &NodeRef,
        destination_field: usize,
    ) -> Result<()> {
        let edge = RouteEdge::connect(
            RouteEndpoint::Node(source.clone()),
            source_field,
            RouteEndpoint::Node(destination.clone()),
            destination_field,
        )?;
        self.add_route(edge);
        Ok(())
    }

    /// ROUTEs declared in the body.
    #[must_use]
    pub fn routes(&self) -> &[RouteEdge] {
        &self.routes
    }

    pub(crate) fn add_nested(&mut self, template: Template) {
        self.nested.push(template);
    }

    /// Templates declared inside this body, in completion order.
    #[must_use]
    pub fn nested(&self) -> &[Template] {
        &self.nested
    }

    pub(crate) fn set_defs(&mut self, defs: BTreeMap<String, NodeRef>) {
        self.defs = defs;
    }

    /// DEF names declared directly in the body.
    #[must_use]
    pub fn defs(&self) -> &BTreeMap<String, NodeRef> {
        &self.defs
    }

    pub(crate) fn add_import(&mut self, proxy: Arc<ImportProxy>) {
        self.imports.insert(proxy.local_name().to_owned(), proxy);
    }

    /// IMPORT proxies keyed by local name.
    #[must_use]
    pub fn imports(&self) -> &BTreeMap<String, Arc<ImportProxy>> {
        &self.imports
    }

    /// Instantiates this declaration under `root`; see
    /// [`Template::create_new_instance`].
    pub fn create_new_instance(
        self: &Arc<Self>,
        root: &NodeRef,
        is_static: bool,
    ) -> Result<Option<NodeRef>> {
        Template::Proto(Arc::clone(self)).create_new_instance(root, is_static)
    }
}
