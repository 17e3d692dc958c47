// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! ROUTE edges between fields of body nodes or import proxies.
use std::sync::Arc;

use crate::error::{ProtoError, Result};
use crate::field::FieldDeclaration;
use crate::import::ImportProxy;
use crate::node::NodeRef;

/// One end of a ROUTE.
#[derive(Debug, Clone)]
pub enum RouteEndpoint {
    /// A node declared in the body.
    Node(NodeRef),
    /// A node imported from an Inline; its fields are untyped.
    Import(Arc<ImportProxy>),
}

impl RouteEndpoint {
    /// Resolves `name` to a field index. Import proxies accept any name.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        match self {
            Self::Node(node) => node.field_index(name),
            Self::Import(proxy) => Some(proxy.field_index(name)),
        }
    }

    /// Declaration at `index`; `None` for import proxies.
    #[must_use]
    pub fn field_declaration(&self, index: usize) -> Option<FieldDeclaration> {
        match self {
            Self::Node(node) => node.field_declaration(index),
            Self::Import(_) => None,
        }
    }

    /// `true` for import proxies.
    #[must_use]
    pub fn is_import(&self) -> bool {
        matches!(self, Self::Import(_))
    }

    /// Label used in diagnostics.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Node(node) => node.type_name(),
            Self::Import(proxy) => proxy.local_name().to_owned(),
        }
    }
}

impl PartialEq for RouteEndpoint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Node(a), Self::Node(b)) => a.ptr_eq(b),
            (Self::Import(a), Self::Import(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for RouteEndpoint {}

/// Directed dataflow edge between two same-typed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEdge {
    source: RouteEndpoint,
    source_field: usize,
    destination: RouteEndpoint,
    destination_field: usize,
}

impl RouteEdge {
    /// Builds an edge, checking that both field indices exist and, unless an
    /// import proxy is involved, that the field types match.
    ///
    /// # Errors
    /// [`ProtoError::InvalidConnection`] on a missing field or type mismatch.
    pub fn connect(
        source: RouteEndpoint,
        source_field: usize,
        destination: RouteEndpoint,
        destination_field: usize,
    ) -> Result<Self> {
        if !source.is_import() && !destination.is_import() {
            let src = source.field_declaration(source_field).ok_or_else(|| {
                ProtoError::InvalidConnection(format!(
                    "no field {source_field} on source {}",
                    source.label()
                ))
            })?;
            let dst = destination
                .field_declaration(destination_field)
                .ok_or_else(|| {
                    ProtoError::InvalidConnection(format!(
                        "no field {destination_field} on destination {}",
                        destination.label()
                    ))
                })?;
            if src.field_type() != dst.field_type() {
                return Err(ProtoError::InvalidConnection(format!(
                    "ROUTE from {}.{} ({}) to {}.{} ({}) joins different types",
                    source.label(),
                    src.name(),
                    src.field_type(),
                    destination.label(),
                    dst.name(),
                    dst.field_type()
                )));
            }
        }
        Ok(Self {
            source,
            source_field,
            destination,
            destination_field,
        })
    }

    /// Source endpoint.
    #[must_use]
    pub fn source(&self) -> &RouteEndpoint {
        &self.source
    }

    /// Source field index.
    #[must_use]
    pub fn source_field(&self) -> usize {
        self.source_field
    }

    /// Destination endpoint.
    #[must_use]
    pub fn destination(&self) -> &RouteEndpoint {
        &self.destination
    }

    /// Destination field index.
    #[must_use]
    pub fn destination_field(&self) -> usize {
        self.destination_field
    }
}
