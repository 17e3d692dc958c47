// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Error taxonomy shared by every declaration and builder operation.
//!
//! Every [`ProtoError`] is fatal to the document currently being built; the
//! builder must be [`reset`](crate::ProtoBuilder::reset) before it is reused.
//! Unknown or disabled node types are never errors: they are skipped.

use thiserror::Error;

use crate::field::{AccessType, FieldType};
use crate::placeholder::LayerId;

/// Convenience alias used throughout the crate.
pub type Result<T, E = ProtoError> = std::result::Result<T, E>;

/// Failures raised while declaring, binding, or building prototypes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// A field name was redeclared with a different type or access mode.
    #[error("field `{name}` redeclared as {requested_access} {requested_type}; already {existing_access} {existing_type}")]
    FieldClash {
        /// Name shared by both declarations.
        name: String,
        /// Type of the declaration already in the table.
        existing_type: FieldType,
        /// Access of the declaration already in the table.
        existing_access: AccessType,
        /// Type of the rejected declaration.
        requested_type: FieldType,
        /// Access of the rejected declaration.
        requested_access: AccessType,
    },
    /// A field name or index did not resolve on its owner.
    #[error("unknown field `{field}` on {owner}")]
    UnknownField {
        /// Name of the declaration or node type that was searched.
        owner: String,
        /// Field name, or the index rendered as text.
        field: String,
    },
    /// A declaration is not legal in the current language mode, or a field
    /// cannot be read the way it was asked for.
    #[error("invalid field `{name}`: {reason}")]
    InvalidField {
        /// Field name.
        name: String,
        /// Human readable cause.
        reason: String,
    },
    /// A value could not be decoded for, or stored into, a field.
    #[error("invalid value for {field_type} field `{field}`: {reason}")]
    InvalidFieldValue {
        /// Field name.
        field: String,
        /// Declared type of the field.
        field_type: FieldType,
        /// Human readable cause.
        reason: String,
    },
    /// An IS binding or ROUTE joined incompatible endpoints, or named an
    /// endpoint that does not exist.
    #[error("invalid connection: {0}")]
    InvalidConnection(String),
    /// Instances may only be created against a world root or another
    /// prototype instance.
    #[error("cannot create an instance under a `{0}` node; expected a world root or prototype instance")]
    InvalidRootType(String),
    /// An event arrived in a builder phase that does not accept it.
    #[error("{line}:{column}: {message}")]
    Sequencing {
        /// Source line reported by the event producer.
        line: u32,
        /// Source column reported by the event producer.
        column: u32,
        /// Human readable cause.
        message: String,
    },
}

impl ProtoError {
    pub(crate) fn unknown_field(owner: impl Into<String>, field: impl ToString) -> Self {
        Self::UnknownField {
            owner: owner.into(),
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid_value(
        field: impl Into<String>,
        field_type: FieldType,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            field_type,
            reason: reason.into(),
        }
    }
}

/// Failures of the per-layer reference counting contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefCountError {
    /// A decrement was requested for a layer that holds no references.
    #[error("layer {0} holds no references")]
    UntrackedLayer(LayerId),
}
