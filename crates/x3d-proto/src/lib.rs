// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! x3d-proto: PROTO and EXTERNPROTO declarations for VRML97/X3D scene graphs.
//!
//! A parser drives a [`ProtoBuilder`] with one event per syntactic element.
//! The builder assembles [`PrototypeDeclaration`]s (interface, body, IS
//! bindings, ROUTEs, nested declarations) and [`ExternPrototypeDeclaration`]s
//! (interface plus URI list), handling DEF/USE scoping, IMPORT proxies and
//! load filtering along the way. Completed declarations are frozen as
//! [`Template`]s; using a template as a node type yields an
//! [`InstancePlaceholder`] until a runtime expands it through an
//! [`InstanceCreator`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]
#![warn(missing_docs)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

mod body;
mod builder;
mod codec;
mod config;
mod error;
mod extern_proto;
mod factory;
mod field;
mod field_table;
mod import;
mod node;
mod placeholder;
mod proto;
mod route;
mod scope;
mod template;
mod value;

pub use body::{BodyContainer, CHILDREN_FIELD, CHILDREN_INDEX};
pub use builder::{DocumentInfo, Location, Phase, ProtoBuilder, VRML97_PROFILE};
pub use codec::{FieldCodec, RawValue};
pub use config::{BuilderConfig, ConfigError, LoadRequirements};
pub use error::{ProtoError, RefCountError, Result};
pub use extern_proto::{ExternPrototypeDeclaration, LoadState};
pub use factory::{NodeFactory, StandardNodeFactory};
pub use field::{AccessType, FieldDeclaration, FieldType, LanguageMode, ScalarKind, SpecVersion};
pub use field_table::{FieldTable, METADATA_FIELD, METADATA_INDEX};
pub use import::ImportProxy;
pub use node::{NodeCategory, NodeKind, NodeRef, NodeTraits, SceneNode};
pub use placeholder::{InstancePlaceholder, LayerId};
pub use proto::{is_access_allowed, legacy_is_violation, IsDestination, PrototypeDeclaration};
pub use route::{RouteEdge, RouteEndpoint};
pub use scope::Scope;
pub use template::{CreatorHandle, InstanceCreator, Template};
pub use value::{element_count, FieldValue, TypedValue};
