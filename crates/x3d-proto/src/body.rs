// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The ordered node list forming a prototype's body.
use crate::error::{ProtoError, Result};
use crate::field::{AccessType, FieldDeclaration, FieldType};
use crate::node::{NodeRef, NodeTraits};

/// Name of the body's only field.
pub const CHILDREN_FIELD: &str = "children";

/// Index of [`CHILDREN_FIELD`].
pub const CHILDREN_INDEX: usize = 0;

/// Container holding a prototype body's top-level nodes.
///
/// It exposes exactly one field, `children`, so node events can target the
/// body the same way they target a node's `MFNode` field.
#[derive(Debug, Clone, Default)]
pub struct BodyContainer {
    children: Vec<NodeRef>,
    share_count: usize,
    setup_finished: bool,
}

impl BodyContainer {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `name`; only `children` exists.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        (name == CHILDREN_FIELD).then_some(CHILDREN_INDEX)
    }

    /// Declaration of the `children` slot.
    #[must_use]
    pub fn field_declaration(&self, index: usize) -> Option<FieldDeclaration> {
        (index == CHILDREN_INDEX)
            .then(|| FieldDeclaration::new(CHILDREN_FIELD, FieldType::MFNode, AccessType::Field))
    }

    /// Appends `node` to the children.
    pub fn add_child(&mut self, node: NodeRef) {
        self.children.push(node);
    }

    /// Appends `node` through the field interface.
    pub fn add_node_value(&mut self, index: usize, node: NodeRef) -> Result<()> {
        if index != CHILDREN_INDEX {
            return Err(ProtoError::unknown_field("prototype body", index));
        }
        self.add_child(node);
        Ok(())
    }

    /// Top-level body nodes in declaration order.
    #[must_use]
    pub fn children(&self) -> &[NodeRef] {
        &self.children
    }

    /// Number of top-level nodes.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// The first node; it determines what an instance "is".
    #[must_use]
    pub fn first_child(&self) -> Option<&NodeRef> {
        self.children.first()
    }

    /// Traits of the first node, if any.
    #[must_use]
    pub fn primary_traits(&self) -> Option<NodeTraits> {
        self.first_child().map(NodeRef::traits)
    }

    /// Number of places this body is shared from.
    #[must_use]
    pub fn share_count(&self) -> usize {
        self.share_count
    }

    /// Adjusts the share counter, saturating at zero.
    pub fn update_share_count(&mut self, add: bool) {
        if add {
            self.share_count += 1;
        } else {
            self.share_count = self.share_count.saturating_sub(1);
        }
    }

    /// Completes setup of the body and forwards it to every child.
    pub fn setup_finished(&mut self) {
        if self.setup_finished {
            return;
        }
        self.setup_finished = true;
        for child in &self.children {
            child.setup_finished();
        }
    }

    /// Whether [`setup_finished`](Self::setup_finished) ran.
    #[must_use]
    pub fn is_setup_finished(&self) -> bool {
        self.setup_finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{NodeFactory, StandardNodeFactory};
    use crate::node::NodeCategory;

    #[test]
    fn only_children_resolves() {
        let body = BodyContainer::new();
        assert_eq!(body.field_index("children"), Some(CHILDREN_INDEX));
        assert_eq!(body.field_index("metadata"), None);
        assert_eq!(
            body.field_declaration(CHILDREN_INDEX).map(|d| d.field_type()),
            Some(FieldType::MFNode)
        );
    }

    #[test]
    fn primary_type_follows_first_child() {
        let mut factory = StandardNodeFactory::new();
        let mut body = BodyContainer::new();
        assert!(body.primary_traits().is_none());
        body.add_child(NodeRef::scene(factory.create_node("Script").unwrap()));
        body.add_child(NodeRef::scene(factory.create_node("Group").unwrap()));
        assert_eq!(
            body.primary_traits().map(|t| t.category),
            Some(NodeCategory::Script)
        );
    }

    #[test]
    fn setup_is_forwarded() {
        let mut factory = StandardNodeFactory::new();
        let mut body = BodyContainer::new();
        let shape = NodeRef::scene(factory.create_node("Shape").unwrap());
        body.add_node_value(CHILDREN_INDEX, shape.clone()).unwrap();
        body.setup_finished();
        assert!(shape.is_setup_finished());
        assert!(body.add_node_value(3, shape).is_err());
    }

    #[test]
    fn share_count_saturates() {
        let mut body = BodyContainer::new();
        body.update_share_count(true);
        body.update_share_count(false);
        body.update_share_count(false);
        assert_eq!(body.share_count(), 0);
    }
}
