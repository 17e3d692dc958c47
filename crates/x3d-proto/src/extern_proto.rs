// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! EXTERNPROTO declarations: a local interface plus URIs naming the body.
use std::sync::{Arc, OnceLock};

use tracing::debug;

use crate::error::{ProtoError, Result};
use crate::field::{FieldDeclaration, SpecVersion};
use crate::field_table::FieldTable;
use crate::proto::PrototypeDeclaration;
use crate::template::CreatorHandle;

/// Whether the external body has been attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Only the interface is known.
    NotLoaded,
    /// [`ExternPrototypeDeclaration::resolve`] succeeded.
    Loaded,
}

/// An EXTERNPROTO.
///
/// Resolution happens after the declaration is frozen (the body arrives from
/// a loader), so the resolved body sits in a `OnceLock`.
#[derive(Debug)]
pub struct ExternPrototypeDeclaration {
    name: String,
    version: SpecVersion,
    fields: FieldTable,
    uri_list: Vec<String>,
    resolved: OnceLock<Arc<PrototypeDeclaration>>,
    creator: Option<CreatorHandle>,
}

impl ExternPrototypeDeclaration {
    /// Creates an interface-only declaration called `name`.
    pub fn new(name: impl Into<String>, version: SpecVersion) -> Self {
        Self {
            name: name.into(),
            version,
            fields: FieldTable::new(version.mode()),
            uri_list: Vec::new(),
            resolved: OnceLock::new(),
            creator: None,
        }
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

    /// Local interface.
    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Number of interface slots, the implicit `metadata` included.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Adds a local interface field; see [`FieldTable::append`].
    pub fn append_field(&mut self, decl: FieldDeclaration) -> Result<usize> {
        self.fields.append(decl)
    }

    /// Candidate locations of the body, in preference order.
    #[must_use]
    pub fn uri_list(&self) -> &[String] {
        &self.uri_list
    }

    /// Replaces the URI list.
    pub fn set_uri_list(&mut self, uris: Vec<String>) {
        self.uri_list = uris;
    }

    /// Installs the instance creator.
    pub fn set_creator(&mut self, creator: Option<CreatorHandle>) {
        self.creator = creator;
    }

    pub(crate) fn creator(&self) -> Option<&CreatorHandle> {
        self.creator.as_ref()
    }

    /// Whether a body has been attached.
    #[must_use]
    pub fn load_state(&self) -> LoadState {
        if self.resolved.get().is_some() {
            LoadState::Loaded
        } else {
            LoadState::NotLoaded
        }
    }

    /// The attached body, if any.
    #[must_use]
    pub fn resolved(&self) -> Option<&Arc<PrototypeDeclaration>> {
        self.resolved.get()
    }

    /// Attaches `body` after checking that every local field exists on it
    /// with the same type and access. The body may declare more fields than
    /// the local interface.
    ///
    /// Resolving an already resolved declaration with the same body is a
    /// no-op; a different body is refused.
    ///
    /// # Errors
    /// - [`ProtoError::UnknownField`] when a local field is missing on `body`.
    /// - [`ProtoError::FieldClash`] on a type or access mismatch.
    /// - [`ProtoError::InvalidConnection`] when already resolved elsewhere.
    pub fn resolve(&self, body: Arc<PrototypeDeclaration>) -> Result<()> {
        for (_, local) in self.fields.iter() {
            let remote = body
                .fields()
                .declaration_by_name(local.name())
                .ok_or_else(|| ProtoError::unknown_field(body.name(), local.name()))?;
            if remote.field_type() != local.field_type() || remote.access() != local.access() {
                return Err(ProtoError::FieldClash {
                    name: local.name().to_owned(),
                    existing_type: local.field_type(),
                    existing_access: local.access(),
                    requested_type: remote.field_type(),
                    requested_access: remote.access(),
                });
            }
        }
        let stored = self.resolved.get_or_init(|| Arc::clone(&body));
        if !Arc::ptr_eq(stored, &body) {
            return Err(ProtoError::InvalidConnection(format!(
                "EXTERNPROTO `{}` is already resolved to `{}`",
                self.name,
                stored.name()
            )));
        }
        debug!(name = %self.name, body = %body.name(), "EXTERNPROTO resolved");
        Ok(())
    }
}
