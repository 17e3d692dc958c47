// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! A completed declaration of either kind, plus the instance-creation port.
use std::fmt;
use std::sync::Arc;

use crate::error::{ProtoError, Result};
use crate::extern_proto::ExternPrototypeDeclaration;
use crate::field::SpecVersion;
use crate::field_table::FieldTable;
use crate::node::{NodeCategory, NodeRef};
use crate::proto::PrototypeDeclaration;
use crate::value::TypedValue;

/// Port that turns a template into a runtime instance.
///
/// Implementations live outside this crate; the builder only hands the
/// creator to every declaration it produces.
pub trait InstanceCreator: Send + Sync {
    /// Creates an instance of `template` under `root`.
    fn new_instance(
        &self,
        template: &Template,
        root: &NodeRef,
        version: SpecVersion,
        is_static: bool,
    ) -> Result<NodeRef>;
}

/// Cloneable, debuggable handle to an [`InstanceCreator`].
#[derive(Clone)]
pub struct CreatorHandle(Arc<dyn InstanceCreator>);

impl CreatorHandle {
    /// Wraps `creator`.
    pub fn new(creator: impl InstanceCreator + 'static) -> Self {
        Self(Arc::new(creator))
    }

    /// The wrapped creator.
    #[must_use]
    pub fn creator(&self) -> &dyn InstanceCreator {
        self.0.as_ref()
    }
}

impl From<Arc<dyn InstanceCreator>> for CreatorHandle {
    fn from(creator: Arc<dyn InstanceCreator>) -> Self {
        Self(creator)
    }
}

impl fmt::Debug for CreatorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CreatorHandle(..)")
    }
}

/// A completed PROTO or EXTERNPROTO.
#[derive(Debug, Clone)]
pub enum Template {
    /// Inline declaration with a body.
    Proto(Arc<PrototypeDeclaration>),
    /// Interface whose body is loaded elsewhere.
    Extern(Arc<ExternPrototypeDeclaration>),
}

impl Template {
    /// Template name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Proto(p) => p.name(),
            Self::Extern(e) => e.name(),
        }
    }

    /// Public interface.
    #[must_use]
    pub fn fields(&self) -> &FieldTable {
        match self {
            Self::Proto(p) => p.fields(),
            Self::Extern(e) => e.fields(),
        }
    }

    /// Language version the template was declared under.
    #[must_use]
    pub fn version(&self) -> SpecVersion {
        match self {
            Self::Proto(p) => p.version(),
            Self::Extern(e) => e.version(),
        }
    }

    /// `true` for EXTERNPROTOs.
    #[must_use]
    pub fn is_extern(&self) -> bool {
        matches!(self, Self::Extern(_))
    }

    /// The declaration with a body: the PROTO itself, or a resolved
    /// EXTERNPROTO's body.
    #[must_use]
    pub fn resolved(&self) -> Option<&Arc<PrototypeDeclaration>> {
        match self {
            Self::Proto(p) => Some(p),
            Self::Extern(e) => e.resolved(),
        }
    }

    /// Recorded value of the field at `index` on the resolved body, looked up
    /// by name so EXTERNPROTO interfaces project onto it.
    #[must_use]
    pub fn recorded_value(&self, index: usize) -> Option<&TypedValue> {
        let proto = self.resolved()?;
        match self {
            Self::Proto(_) => proto.recorded_value(index),
            Self::Extern(e) => {
                let name = e.fields().declaration(index)?.name();
                proto.recorded_value(proto.fields().index_of(name)?)
            }
        }
    }

    /// `true` when both handles share the same declaration.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Proto(a), Self::Proto(b)) => Arc::ptr_eq(a, b),
            (Self::Extern(a), Self::Extern(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn creator(&self) -> Option<&CreatorHandle> {
        match self {
            Self::Proto(p) => p.creator(),
            Self::Extern(e) => e.creator(),
        }
    }

    /// Asks the installed [`InstanceCreator`] for an instance under `root`.
    ///
    /// Returns `Ok(None)` when no creator was installed.
    ///
    /// # Errors
    /// [`ProtoError::InvalidRootType`] unless `root` is a world root or a
    /// prototype instance; otherwise whatever the creator reports.
    pub fn create_new_instance(&self, root: &NodeRef, is_static: bool) -> Result<Option<NodeRef>> {
        let traits = root.traits();
        let acceptable = matches!(
            traits.category,
            NodeCategory::WorldRoot | NodeCategory::ProtoInstance
        );
        if !acceptable {
            return Err(ProtoError::InvalidRootType(root.type_name()));
        }
        match self.creator() {
            Some(handle) => handle
                .creator()
                .new_instance(self, root, self.version(), is_static)
                .map(Some),
            None => Ok(None),
        }
    }
}
