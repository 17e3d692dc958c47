// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Streaming construction of prototype declarations from authoring events.
//!
//! [`ProtoBuilder`] consumes one event per method call, in document order,
//! without lookahead. All mutable construction state lives in a single
//! `BuildState`:
//!
//! - a stack of open declarations (a PROTO interface or body, or an
//!   EXTERNPROTO interface or URI list);
//! - a stack of frames, one per nesting depth, each naming what node events
//!   attach to (a declaration interface, a body, or a node) and which field
//!   of it is current;
//! - a stack of [`Scope`]s, one per open body, above the document scope;
//! - the subtree-skipping counter and the set of DEF names it hid.
//!
//! A declaration becomes visible by name once it is complete: at the end of
//! its body, at the end of its URI list, or, for a PROTO whose interface
//! closed without a body, when the next event arrives.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::body::{BodyContainer, CHILDREN_INDEX};
use crate::codec::{FieldCodec, RawValue};
use crate::config::{BuilderConfig, LoadRequirements};
use crate::error::{ProtoError, Result};
use crate::extern_proto::ExternPrototypeDeclaration;
use crate::factory::{NodeFactory, StandardNodeFactory};
use crate::field::{AccessType, FieldDeclaration, FieldType, LanguageMode, SpecVersion};
use crate::import::ImportProxy;
use crate::node::{NodeCategory, NodeRef};
use crate::placeholder::InstancePlaceholder;
use crate::proto::PrototypeDeclaration;
use crate::route::{RouteEdge, RouteEndpoint};
use crate::scope::Scope;
use crate::template::{CreatorHandle, Template};

/// Profile announced to the factory for VRML97 documents.
pub const VRML97_PROFILE: &str = "VRML97";

/// Builder state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No document started.
    Idle,
    /// Between declarations.
    Ready,
    /// Inside a PROTO interface.
    ProtoDecl,
    /// Inside a PROTO body.
    ProtoBody,
    /// Inside an EXTERNPROTO interface.
    ExternProtoDecl,
    /// Waiting for an EXTERNPROTO URI list.
    ExternProtoUri,
}

/// Source position reported by the event producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl Location {
    fn error(self, message: impl Into<String>) -> ProtoError {
        ProtoError::Sequencing {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }
}

/// Header information of the document being built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Document URI, if known.
    pub uri: Option<String>,
    /// Base URL relative references resolve against.
    pub base_url: Option<String>,
    /// Encoding name (`utf8`, `xml`, ...).
    pub encoding: String,
    /// Declared version.
    pub version: SpecVersion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtoStage {
    Interface,
    AwaitingBody,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExternStage {
    Interface,
    Uri,
}

#[derive(Debug)]
enum OpenDecl {
    Proto {
        decl: PrototypeDeclaration,
        stage: ProtoStage,
    },
    Extern {
        decl: ExternPrototypeDeclaration,
        stage: ExternStage,
    },
}

#[derive(Debug)]
enum Target {
    Interface,
    Body,
    Node(NodeRef),
}

#[derive(Debug)]
struct Frame {
    target: Target,
    field: Option<usize>,
}

#[derive(Debug, Default)]
struct BuildState {
    started: bool,
    document: DocumentInfo,
    codec: Option<FieldCodec>,
    ignore_depth: usize,
    root_scope: Scope,
    body_scopes: Vec<Scope>,
    decls: Vec<OpenDecl>,
    frames: Vec<Frame>,
    scripts: Vec<NodeRef>,
    completed: Vec<Template>,
}

impl BuildState {
    fn version(&self) -> SpecVersion {
        self.document.version
    }

    fn mode(&self) -> LanguageMode {
        self.document.version.mode()
    }

    fn codec(&self) -> FieldCodec {
        self.codec
            .unwrap_or_else(|| FieldCodec::new(self.document.version.mode()))
    }

    fn current_scope(&self) -> &Scope {
        self.body_scopes.last().unwrap_or(&self.root_scope)
    }

    fn current_scope_mut(&mut self) -> &mut Scope {
        self.body_scopes.last_mut().unwrap_or(&mut self.root_scope)
    }

    fn ignoring(&self) -> bool {
        self.ignore_depth > 0
    }

    fn ignore_def(&mut self, name: &str) {
        let scope = self.current_scope_mut();
        scope.defs.remove(name);
        scope.ignored_defs.insert(name.to_owned());
    }

    /// Innermost PROTO, when it is accepting body content.
    fn body_decl_mut(&mut self) -> Option<&mut PrototypeDeclaration> {
        match self.decls.last_mut() {
            Some(OpenDecl::Proto {
                decl,
                stage: ProtoStage::Body,
            }) => Some(decl),
            _ => None,
        }
    }
}

/// Event-driven builder of PROTO and EXTERNPROTO declarations.
#[derive(Debug)]
pub struct ProtoBuilder<F = StandardNodeFactory> {
    factory: F,
    config: BuilderConfig,
    creator: Option<CreatorHandle>,
    globals: Scope,
    location: Location,
    state: BuildState,
}

impl<F: NodeFactory> ProtoBuilder<F> {
    /// Creates a builder creating nodes through `factory`.
    pub fn new(factory: F) -> Self {
        Self::with_config(factory, BuilderConfig::default())
    }

    /// Creates a builder with an explicit configuration.
    pub fn with_config(factory: F, config: BuilderConfig) -> Self {
        Self {
            factory,
            config,
            creator: None,
            globals: Scope::new(),
            location: Location::default(),
            state: BuildState::default(),
        }
    }

    // ── Configuration & queries ─────────────────────────────────────

    /// The node factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Active configuration.
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Replaces the category load switches.
    pub fn set_load_requirements(&mut self, load: LoadRequirements) {
        self.config.load = load;
    }

    /// Installs the outer document's DEF names and templates. They are
    /// consulted after every local scope, and kept across [`reset`](Self::reset).
    pub fn set_globals(
        &mut self,
        defs: BTreeMap<String, NodeRef>,
        templates: BTreeMap<String, Template>,
    ) {
        self.globals = Scope::with_globals(defs, templates);
    }

    /// Records the position of the next event, for error reports.
    pub fn set_location(&mut self, line: u32, column: u32) {
        self.location = Location { line, column };
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        if !self.state.started {
            return Phase::Idle;
        }
        let nested = self.state.decls.len() > 1;
        match self.state.decls.last() {
            None => Phase::Ready,
            Some(OpenDecl::Proto { stage, .. }) => match stage {
                ProtoStage::Interface => Phase::ProtoDecl,
                ProtoStage::Body => Phase::ProtoBody,
                ProtoStage::AwaitingBody if nested => Phase::ProtoBody,
                ProtoStage::AwaitingBody => Phase::Ready,
            },
            Some(OpenDecl::Extern { stage, .. }) => match stage {
                ExternStage::Interface => Phase::ExternProtoDecl,
                ExternStage::Uri => Phase::ExternProtoUri,
            },
        }
    }

    /// Header of the current document.
    pub fn document(&self) -> &DocumentInfo {
        &self.state.document
    }

    /// The first top-level PROTO, finished or still under construction.
    pub fn prototype(&self) -> Option<&PrototypeDeclaration> {
        let finished = self.state.completed.iter().find_map(|t| match t {
            Template::Proto(p) => Some(p.as_ref()),
            Template::Extern(_) => None,
        });
        finished.or_else(|| match self.state.decls.first() {
            Some(OpenDecl::Proto { decl, .. }) => Some(decl),
            _ => None,
        })
    }

    /// Completed top-level templates, in completion order.
    pub fn templates(&self) -> &[Template] {
        &self.state.completed
    }

    /// Looks `name` up through the open body scopes (innermost first), the
    /// document scope, and finally the globals.
    pub fn resolve_template(&self, name: &str) -> Option<Template> {
        self.state
            .body_scopes
            .iter()
            .rev()
            .chain(std::iter::once(&self.state.root_scope))
            .chain(std::iter::once(&self.globals))
            .find_map(|scope| scope.templates.get(name).cloned())
    }

    /// Node DEF'd as `name` in the nearest scope.
    pub fn lookup_def(&self, name: &str) -> Option<NodeRef> {
        self.state.current_scope().defs.get(name).cloned()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Discards everything under construction. Globals, configuration and
    /// the factory are kept; the instance creator is dropped.
    pub fn reset(&mut self) {
        debug!("builder reset");
        self.state = BuildState::default();
        self.creator = None;
    }

    /// Starts a fresh root declaration, handing `creator` to everything
    /// built from now on.
    pub fn new_proto(&mut self, creator: Option<CreatorHandle>) {
        self.creator = creator;
        let state = &mut self.state;
        state.decls.clear();
        state.frames.clear();
        state.scripts.clear();
        state.body_scopes.clear();
        state.completed.clear();
        state.ignore_depth = 0;
        state.root_scope.ignored_defs.clear();
    }

    /// Starts a document. `version` is the header version, e.g. `"V2.0"` or
    /// `"3.1"`; `"2.x"` selects VRML97.
    #[instrument(level = "debug", skip(self))]
    pub fn start_document(
        &mut self,
        uri: Option<&str>,
        base_url: Option<&str>,
        encoding: &str,
        version: &str,
    ) -> Result<()> {
        let location = self.location;
        let spec = SpecVersion::parse(version).ok_or_else(|| {
            location.error(format!("unsupported specification version `{version}`"))
        })?;
        if self.config.load.vrml97_only && spec.mode() != LanguageMode::Vrml97 {
            return Err(location.error(format!(
                "only VRML97 documents are accepted, got version {spec}"
            )));
        }
        self.factory.set_spec_version(spec);
        if spec.mode() == LanguageMode::Vrml97 {
            self.factory.set_profile(VRML97_PROFILE);
        }
        self.state = BuildState {
            started: true,
            document: DocumentInfo {
                uri: uri.map(str::to_owned),
                base_url: base_url.map(str::to_owned),
                encoding: encoding.to_owned(),
                version: spec,
            },
            codec: Some(FieldCodec::new(spec.mode())),
            ..BuildState::default()
        };
        debug!(%spec, "document started");
        Ok(())
    }

    /// Selects the document profile.
    pub fn profile_decl(&mut self, name: &str) -> Result<()> {
        self.enter("profile_decl")?;
        self.factory.set_profile(name);
        Ok(())
    }

    /// Declares a component requirement written as `Name:level`.
    pub fn component_decl(&mut self, component: &str) -> Result<()> {
        self.enter("component_decl")?;
        let location = self.location;
        let parsed = component
            .split_once(':')
            .and_then(|(name, level)| Some((name.trim(), level.trim().parse::<u32>().ok()?)))
            .filter(|(name, _)| !name.is_empty());
        let (name, level) = parsed.ok_or_else(|| {
            location.error(format!(
                "malformed component declaration `{component}`; expected Name:level"
            ))
        })?;
        self.factory.add_component(name, level);
        Ok(())
    }

    /// Document metadata; accepted and ignored.
    pub fn meta_decl(&mut self, key: &str, value: &str) -> Result<()> {
        self.enter("meta_decl")?;
        trace!(key, value, "meta ignored");
        Ok(())
    }

    /// Ends the document. Interface-only PROTOs still pending are completed;
    /// anything left half-open is discarded.
    #[instrument(level = "debug", skip(self))]
    pub fn end_document(&mut self) -> Result<()> {
        self.enter("end_document")?;
        if !self.state.decls.is_empty() {
            warn!(
                open = self.state.decls.len(),
                "document ended inside a declaration; discarding it"
            );
            self.state.decls.clear();
        }
        self.state.frames.clear();
        self.state.scripts.clear();
        self.state.body_scopes.clear();
        self.state.started = false;
        debug!(templates = self.state.completed.len(), "document ended");
        Ok(())
    }

    // ── PROTO ───────────────────────────────────────────────────────

    /// Opens a PROTO interface.
    pub fn start_proto_decl(&mut self, name: &str) -> Result<()> {
        self.enter("start_proto_decl")?;
        self.check_declaration_allowed("PROTO")?;
        let mut decl = PrototypeDeclaration::new(name, self.state.version());
        decl.set_creator(self.creator.clone());
        self.state.decls.push(OpenDecl::Proto {
            decl,
            stage: ProtoStage::Interface,
        });
        self.state.frames.push(Frame {
            target: Target::Interface,
            field: None,
        });
        debug!(name, depth = self.state.decls.len(), "PROTO interface opened");
        Ok(())
    }

    /// Declares an interface field of the innermost PROTO or EXTERNPROTO.
    ///
    /// `default` is decoded for PROTO fields; EXTERNPROTO interfaces carry
    /// no values.
    pub fn proto_field_decl(
        &mut self,
        access: AccessType,
        field_type: FieldType,
        name: &str,
        default: Option<RawValue>,
    ) -> Result<()> {
        self.enter("proto_field_decl")?;
        let location = self.location;
        let codec = self.state.codec();
        let field = FieldDeclaration::new(name, field_type, access);
        let index = match self.state.decls.last_mut() {
            Some(OpenDecl::Proto {
                decl,
                stage: ProtoStage::Interface,
            }) => {
                let index = decl.append_field(field.clone())?;
                if let Some(raw) = default {
                    if let Some(value) = codec.decode(&field, &raw)? {
                        decl.set_field_value(index, value)?;
                    }
                }
                index
            }
            Some(OpenDecl::Extern {
                decl,
                stage: ExternStage::Interface,
            }) => {
                decl.append_field(field)?;
                return Ok(());
            }
            _ => {
                return Err(location.error(format!(
                    "field `{name}` declared outside a PROTO or EXTERNPROTO interface"
                )))
            }
        };
        if let Some(frame) = self.state.frames.last_mut() {
            frame.field = Some(index);
        }
        Ok(())
    }

    /// Binds the current node field to the interface field `field_name` of
    /// the innermost PROTO.
    pub fn proto_is_decl(&mut self, field_name: &str) -> Result<()> {
        self.enter("proto_is_decl")?;
        if self.state.ignoring() {
            return Ok(());
        }
        let location = self.location;
        let (node, index) = match self.state.frames.last() {
            Some(Frame {
                target: Target::Node(node),
                field: Some(index),
            }) => (node.clone(), *index),
            _ => return Err(location.error("IS declaration outside a node field")),
        };
        let decl = self
            .state
            .body_decl_mut()
            .ok_or_else(|| location.error("IS declaration outside a PROTO body"))?;
        decl.bind_is(field_name, &node, index)
    }

    /// Closes the innermost PROTO interface.
    pub fn end_proto_decl(&mut self) -> Result<()> {
        self.enter("end_proto_decl")?;
        let location = self.location;
        if !matches!(
            self.state.frames.last(),
            Some(Frame {
                target: Target::Interface,
                ..
            })
        ) {
            return Err(location.error("end of PROTO interface with unclosed nodes"));
        }
        match self.state.decls.last_mut() {
            Some(OpenDecl::Proto { stage, .. }) if *stage == ProtoStage::Interface => {
                *stage = ProtoStage::AwaitingBody;
            }
            _ => return Err(location.error("end of PROTO interface without a PROTO")),
        }
        self.state.frames.pop();
        Ok(())
    }

    /// Opens the body of the PROTO whose interface just closed.
    pub fn start_proto_body(&mut self) -> Result<()> {
        let location = self.location;
        if !self.state.started {
            return Err(location.error("start_proto_body before start_document"));
        }
        match self.state.decls.last_mut() {
            Some(OpenDecl::Proto { stage, .. }) if *stage == ProtoStage::AwaitingBody => {
                *stage = ProtoStage::Body;
            }
            Some(OpenDecl::Proto {
                stage: ProtoStage::Interface,
                ..
            }) => {
                return Err(location.error("Starting proto body while still in declaration"))
            }
            _ => return Err(location.error("PROTO body without a PROTO declaration")),
        }
        self.state.frames.push(Frame {
            target: Target::Body,
            field: Some(CHILDREN_INDEX),
        });
        self.state.body_scopes.push(Scope::new());
        trace!(depth = self.state.body_scopes.len(), "PROTO body opened");
        Ok(())
    }

    /// Closes the innermost PROTO body and completes the declaration.
    pub fn end_proto_body(&mut self) -> Result<()> {
        self.enter("end_proto_body")?;
        let location = self.location;
        if !matches!(
            self.state.frames.last(),
            Some(Frame {
                target: Target::Body,
                ..
            })
        ) {
            return Err(location.error("end of PROTO body with unclosed nodes"));
        }
        if self.state.body_decl_mut().is_none() {
            return Err(location.error("end of PROTO body without an open body"));
        }
        let scope = self.state.body_scopes.pop().unwrap_or_default();
        if let Some(decl) = self.state.body_decl_mut() {
            decl.body_mut().setup_finished();
            decl.set_defs(scope.defs);
        }
        self.state.frames.pop();
        self.complete_top();
        Ok(())
    }

    // ── EXTERNPROTO ─────────────────────────────────────────────────

    /// Opens an EXTERNPROTO interface.
    pub fn start_extern_proto_decl(&mut self, name: &str) -> Result<()> {
        self.enter("start_extern_proto_decl")?;
        self.check_declaration_allowed("EXTERNPROTO")?;
        let mut decl = ExternPrototypeDeclaration::new(name, self.state.version());
        decl.set_creator(self.creator.clone());
        self.state.decls.push(OpenDecl::Extern {
            decl,
            stage: ExternStage::Interface,
        });
        debug!(name, "EXTERNPROTO interface opened");
        Ok(())
    }

    /// Closes the EXTERNPROTO interface; the URI list comes next.
    pub fn end_extern_proto_decl(&mut self) -> Result<()> {
        self.enter("end_extern_proto_decl")?;
        match self.state.decls.last_mut() {
            Some(OpenDecl::Extern { stage, .. }) if *stage == ExternStage::Interface => {
                *stage = ExternStage::Uri;
                Ok(())
            }
            _ => Err(self
                .location
                .error("end of EXTERNPROTO interface without an EXTERNPROTO")),
        }
    }

    /// Supplies the EXTERNPROTO URI list and completes the declaration.
    pub fn extern_proto_uri<S: AsRef<str>>(&mut self, uris: &[S]) -> Result<()> {
        self.enter("extern_proto_uri")?;
        match self.state.decls.last_mut() {
            Some(OpenDecl::Extern {
                decl,
                stage: ExternStage::Uri,
            }) => {
                decl.set_uri_list(uris.iter().map(|u| u.as_ref().to_owned()).collect());
            }
            _ => {
                return Err(self
                    .location
                    .error("EXTERNPROTO URI declaration not allowed here"))
            }
        }
        self.complete_top();
        Ok(())
    }

    // ── Nodes & fields ──────────────────────────────────────────────

    /// Starts a node of `type_name`, optionally naming it `def`.
    ///
    /// Unknown types and disabled categories skip the node and its whole
    /// subtree; DEF names inside it are hidden from later USE and ROUTE.
    pub fn start_node(&mut self, type_name: &str, def: Option<&str>) -> Result<()> {
        self.enter("start_node")?;
        let location = self.location;
        if matches!(self.state.decls.last(), Some(OpenDecl::Extern { .. })) {
            return Err(location.error("Node declaration in externproto decl"));
        }
        if self.state.frames.is_empty() {
            return Err(location.error(format!(
                "node `{type_name}` outside a PROTO interface or body"
            )));
        }
        if self.state.ignoring() {
            self.state.ignore_depth += 1;
            if let Some(name) = def {
                self.state.ignore_def(name);
            }
            return Ok(());
        }
        let Some(node) = self.instantiate(type_name) else {
            warn!(type_name, line = location.line, "skipping unknown or disabled node");
            self.state.ignore_depth = 1;
            if let Some(name) = def {
                self.state.ignore_def(name);
            }
            return Ok(());
        };
        if let Some(name) = def {
            let mode = self.state.mode();
            let scope = self.state.current_scope_mut();
            if mode == LanguageMode::X3d && scope.defs.contains_key(name) {
                return Err(location.error(format!(
                    "DEF name `{name}` already declared in this scope"
                )));
            }
            node.set_def();
            scope.defs.insert(name.to_owned(), node.clone());
            scope.ignored_defs.remove(name);
        }
        self.attach(node.clone())?;
        trace!(type_name, def, "node started");
        self.state.frames.push(Frame {
            target: Target::Node(node),
            field: None,
        });
        Ok(())
    }

    /// Ends the current node.
    pub fn end_node(&mut self) -> Result<()> {
        self.enter("end_node")?;
        let location = self.location;
        if matches!(self.state.decls.last(), Some(OpenDecl::Extern { .. })) {
            return Err(location.error("End node declaration in externproto decl"));
        }
        if self.state.ignoring() {
            self.state.ignore_depth -= 1;
            return Ok(());
        }
        match self.state.frames.last() {
            Some(Frame {
                target: Target::Node(_),
                ..
            }) => {
                self.state.frames.pop();
                Ok(())
            }
            _ => Err(location.error("end of node without a matching start")),
        }
    }

    /// Selects field `name` of the current node (or `children` of a body).
    pub fn start_field(&mut self, name: &str) -> Result<()> {
        self.enter("start_field")?;
        if self.state.ignoring() {
            return Ok(());
        }
        let location = self.location;
        let frame = self
            .state
            .frames
            .last_mut()
            .ok_or_else(|| location.error(format!("field `{name}` outside a node")))?;
        let index = match &frame.target {
            Target::Node(node) => node
                .field_index(name)
                .ok_or_else(|| ProtoError::unknown_field(node.type_name(), name))?,
            Target::Body => BodyContainer::new()
                .field_index(name)
                .ok_or_else(|| ProtoError::unknown_field("prototype body", name))?,
            Target::Interface => {
                return Err(location.error(format!(
                    "field `{name}` started directly inside a PROTO interface"
                )))
            }
        };
        frame.field = Some(index);
        Ok(())
    }

    /// Supplies the current field's value as one unsplit string.
    pub fn field_value(&mut self, raw: &str) -> Result<()> {
        self.apply_value(RawValue::Text(raw.to_owned()))
    }

    /// Supplies the current field's value as pre-split items.
    pub fn field_values<S: AsRef<str>>(&mut self, items: &[S]) -> Result<()> {
        self.apply_value(RawValue::from(items))
    }

    /// Marks the end of a field; values are already applied.
    pub fn end_field(&mut self) -> Result<()> {
        self.enter("end_field")
    }

    /// References the node DEF'd as `name` in the current field.
    ///
    /// While a PROTO interface is open the globals are searched first. A
    /// bindable node, or a grouping node holding one, may only be USEd as a
    /// field of a Script node.
    pub fn use_decl(&mut self, name: &str) -> Result<()> {
        self.enter("use_decl")?;
        let location = self.location;
        if self.state.ignoring() || self.state.current_scope().is_ignored(name) {
            debug!(name, "USE of a skipped node ignored");
            return Ok(());
        }
        if self.state.current_scope().imports.contains_key(name) {
            return Err(location.error(format!("Illegal to USE an IMPORTed node: {name}")));
        }
        let filling_default = self.phase() == Phase::ProtoDecl;
        let local = self.state.current_scope().defs.get(name);
        let found = if filling_default {
            self.globals.defs.get(name).or(local)
        } else {
            local
        };
        let node = found.cloned().ok_or_else(|| {
            location.error(format!("USE declares an unknown source node DEF \"{name}\""))
        })?;
        let script_context = match self.state.frames.last() {
            Some(Frame {
                target: Target::Node(parent),
                ..
            }) => parent.traits().category == NodeCategory::Script,
            Some(Frame {
                target: Target::Interface,
                ..
            }) => matches!(
                self.state.decls.last(),
                Some(OpenDecl::Proto { decl, .. })
                    if decl.primary_traits().map(|t| t.category) == Some(NodeCategory::Script)
            ),
            _ => false,
        };
        if !script_context {
            if node.traits().bindable {
                return Err(location.error(format!(
                    "USE references a bindable node \"{name}\""
                )));
            }
            if node.is_bindable_hazard() {
                return Err(location.error(format!(
                    "USE references a grouping node that contains bindable node(s) \"{name}\""
                )));
            }
        }
        self.attach(node)
    }

    // ── ROUTE / IMPORT / EXPORT ─────────────────────────────────────

    /// Declares a ROUTE inside the innermost PROTO body.
    pub fn route_decl(
        &mut self,
        source: &str,
        source_field: &str,
        destination: &str,
        destination_field: &str,
    ) -> Result<()> {
        self.enter("route_decl")?;
        if self.state.ignoring()
            || self.state.current_scope().is_ignored(source)
            || self.state.current_scope().is_ignored(destination)
        {
            debug!(source, destination, "ROUTE through a skipped node dropped");
            return Ok(());
        }
        let location = self.location;
        if self.state.body_decl_mut().is_none() {
            return Err(location.error("ROUTE outside a PROTO body"));
        }
        let src = self.route_endpoint(source, "source")?;
        let dst = self.route_endpoint(destination, "destination")?;
        let src_index = src.field_index(source_field).ok_or_else(|| {
            ProtoError::InvalidConnection(format!(
                "ROUTE source field {source}.{source_field} does not exist"
            ))
        })?;
        let dst_index = dst.field_index(destination_field).ok_or_else(|| {
            ProtoError::InvalidConnection(format!(
                "ROUTE destination field {destination}.{destination_field} does not exist"
            ))
        })?;
        let edge = RouteEdge::connect(src, src_index, dst, dst_index)?;
        if let Some(decl) = self.state.body_decl_mut() {
            if !decl.add_route(edge) {
                trace!(source, destination, "duplicate ROUTE ignored");
            }
        }
        Ok(())
    }

    /// IMPORTs `exported` from the Inline DEF'd as `inline`, naming it
    /// `local` in the current scope. Not available in VRML97.
    pub fn import_decl(&mut self, inline: &str, exported: &str, local: &str) -> Result<()> {
        self.enter("import_decl")?;
        let location = self.location;
        if self.state.mode() == LanguageMode::Vrml97 {
            return Err(location.error("IMPORT statements are not permitted in VRML97 files"));
        }
        let node = self
            .state
            .current_scope()
            .defs
            .get(inline)
            .cloned()
            .ok_or_else(|| {
                location.error(format!("DEF name `{inline}` not known for IMPORT"))
            })?;
        if node.traits().category != NodeCategory::Inline {
            return Err(location.error(format!(
                "IMPORT source `{inline}` is a {}, not an Inline",
                node.type_name()
            )));
        }
        let proxy = Arc::new(ImportProxy::new(local, inline, exported));
        let decl = self
            .state
            .body_decl_mut()
            .ok_or_else(|| location.error("IMPORT outside a PROTO body"))?;
        decl.add_import(Arc::clone(&proxy));
        self.state.current_scope_mut().register_import(proxy);
        Ok(())
    }

    /// EXPORT is never legal inside a prototype.
    pub fn export_decl(&mut self, local: &str, exported: &str) -> Result<()> {
        self.enter("export_decl")?;
        let message = if self.state.mode() == LanguageMode::Vrml97 {
            "EXPORT statements are not permitted in VRML97 files".to_owned()
        } else {
            format!("Protos cannot contain EXPORT statements ({local} AS {exported})")
        };
        Err(self.location.error(message))
    }

    // ── Script interfaces ───────────────────────────────────────────

    /// Opens the dynamic interface of the current Script node.
    pub fn start_script_decl(&mut self) -> Result<()> {
        self.enter("start_script_decl")?;
        if self.state.ignoring() {
            return Ok(());
        }
        match self.state.frames.last() {
            Some(Frame {
                target: Target::Node(node),
                ..
            }) if node.traits().category == NodeCategory::Script => {
                let node = node.clone();
                self.state.scripts.push(node);
                Ok(())
            }
            _ => Err(self
                .location
                .error("script declaration outside a Script node")),
        }
    }

    /// Closes the current Script interface.
    pub fn end_script_decl(&mut self) -> Result<()> {
        self.enter("end_script_decl")?;
        if self.state.ignoring() {
            return Ok(());
        }
        match self.state.scripts.pop() {
            Some(_) => Ok(()),
            None => Err(self.location.error("end of script declaration without a Script")),
        }
    }

    /// Adds a dynamic field to the current Script node. Defaults are decoded
    /// for non-node field/exposedField declarations only.
    pub fn script_field_decl(
        &mut self,
        access: AccessType,
        field_type: FieldType,
        name: &str,
        default: Option<RawValue>,
    ) -> Result<()> {
        self.enter("script_field_decl")?;
        if self.state.ignoring() {
            return Ok(());
        }
        let location = self.location;
        let script = self
            .state
            .scripts
            .last()
            .cloned()
            .ok_or_else(|| location.error("Script declaration not in script!"))?;
        if self.state.mode() == LanguageMode::Vrml97 && !field_type.is_legacy_supported() {
            return Err(ProtoError::InvalidField {
                name: name.to_owned(),
                reason: format!("{field_type} is not a VRML97 field type"),
            });
        }
        let field = FieldDeclaration::new(name, field_type, access);
        let index = script.append_field(field.clone())?;
        if let Some(raw) = default.filter(|_| !field_type.is_node() && !access.is_event()) {
            if let Some(value) = self.state.codec().decode(&field, &raw)? {
                script.set_value(index, value)?;
            }
        }
        if let Some(frame) = self.state.frames.last_mut() {
            if matches!(&frame.target, Target::Node(n) if n.ptr_eq(&script)) {
                frame.field = Some(index);
            }
        }
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Common entry for every event except `start_proto_body`: requires a
    /// started document and completes any interface-only PROTO waiting for
    /// a body that is not coming.
    fn enter(&mut self, event: &'static str) -> Result<()> {
        if !self.state.started {
            return Err(self
                .location
                .error(format!("{event} before start_document")));
        }
        trace!(
            event,
            line = self.location.line,
            column = self.location.column,
            "event"
        );
        while matches!(
            self.state.decls.last(),
            Some(OpenDecl::Proto {
                stage: ProtoStage::AwaitingBody,
                ..
            })
        ) {
            self.complete_top();
        }
        Ok(())
    }

    fn check_declaration_allowed(&self, kind: &str) -> Result<()> {
        let location = self.location;
        match self.state.decls.last() {
            Some(OpenDecl::Proto {
                stage: ProtoStage::Interface,
                ..
            })
            | Some(OpenDecl::Extern { .. }) => {
                return Err(location.error(format!(
                    "Nested {kind} declarations not allowed inside a declaration"
                )))
            }
            _ => {}
        }
        if self.state.ignoring()
            || matches!(
                self.state.frames.last(),
                Some(Frame {
                    target: Target::Node(_) | Target::Interface,
                    ..
                })
            )
        {
            return Err(location.error(format!("{kind} declaration inside a node")));
        }
        Ok(())
    }

    /// Freezes the innermost declaration and publishes it in the enclosing
    /// declaration and scope.
    fn complete_top(&mut self) {
        let Some(open) = self.state.decls.pop() else {
            return;
        };
        let template = match open {
            OpenDecl::Proto { decl, .. } => Template::Proto(Arc::new(decl)),
            OpenDecl::Extern { decl, .. } => Template::Extern(Arc::new(decl)),
        };
        debug!(
            name = template.name(),
            extern_proto = template.is_extern(),
            depth = self.state.decls.len(),
            "template complete"
        );
        match self.state.decls.last_mut() {
            Some(OpenDecl::Proto { decl, .. }) => decl.add_nested(template.clone()),
            Some(OpenDecl::Extern { .. }) => {}
            None => self.state.completed.push(template.clone()),
        }
        self.state
            .current_scope_mut()
            .templates
            .insert(template.name().to_owned(), template);
    }

    fn instantiate(&mut self, type_name: &str) -> Option<NodeRef> {
        if let Some(template) = self.resolve_template(type_name) {
            let placeholder = InstancePlaceholder::new(template, self.state.version(), false);
            let disabled = placeholder
                .implementation_traits()
                .is_some_and(|t| self.config.is_disabled(t.category));
            return (!disabled).then(|| NodeRef::placeholder(placeholder));
        }
        let node = self.factory.create_node(type_name)?;
        if self.config.is_disabled(node.traits().category) {
            return None;
        }
        Some(NodeRef::scene(node))
    }

    /// Adds `node` to whatever the top frame targets.
    fn attach(&mut self, node: NodeRef) -> Result<()> {
        let location = self.location;
        let (parent, field) = match self.state.frames.last() {
            Some(Frame {
                target: Target::Node(parent),
                field,
            }) => (Some(parent.clone()), *field),
            Some(Frame { field, .. }) => (None, *field),
            None => return Err(location.error("node outside a PROTO interface or body")),
        };
        if let Some(parent) = parent {
            let index = field.ok_or_else(|| {
                location.error(format!(
                    "node value for `{}` given without a field",
                    parent.type_name()
                ))
            })?;
            return parent.add_node_value(index, node);
        }
        let in_interface = matches!(
            self.state.frames.last(),
            Some(Frame {
                target: Target::Interface,
                ..
            })
        );
        match self.state.decls.last_mut() {
            Some(OpenDecl::Proto { decl, .. }) if in_interface => {
                let index = field.ok_or_else(|| {
                    location.error("node value in a PROTO interface without a field")
                })?;
                decl.add_field_node_value(index, node)
            }
            Some(OpenDecl::Proto {
                decl,
                stage: ProtoStage::Body,
            }) => decl
                .body_mut()
                .add_node_value(field.unwrap_or(CHILDREN_INDEX), node),
            _ => Err(location.error("node outside a PROTO interface or body")),
        }
    }

    fn apply_value(&mut self, raw: RawValue) -> Result<()> {
        self.enter("field_value")?;
        if self.state.ignoring() {
            return Ok(());
        }
        let location = self.location;
        let codec = self.state.codec();
        match self.state.frames.last() {
            Some(Frame {
                target: Target::Node(node),
                field: Some(index),
            }) => {
                let (node, index) = (node.clone(), *index);
                let decl = node
                    .field_declaration(index)
                    .ok_or_else(|| ProtoError::unknown_field(node.type_name(), index))?;
                if let Some(value) = codec.decode(&decl, &raw)? {
                    node.set_value(index, value)?;
                }
                Ok(())
            }
            Some(Frame {
                target: Target::Interface,
                field: Some(index),
            }) => {
                let index = *index;
                let Some(OpenDecl::Proto { decl, .. }) = self.state.decls.last_mut() else {
                    return Err(location.error("field value outside a PROTO interface"));
                };
                let field = decl
                    .field_declaration(index)
                    .cloned()
                    .ok_or_else(|| ProtoError::unknown_field(decl.name(), index))?;
                if let Some(value) = codec.decode(&field, &raw)? {
                    decl.set_field_value(index, value)?;
                }
                Ok(())
            }
            _ => Err(location.error("field value without a current field")),
        }
    }

    fn route_endpoint(&self, name: &str, role: &str) -> Result<RouteEndpoint> {
        let scope = self.state.current_scope();
        if let Some(node) = scope.defs.get(name) {
            return Ok(RouteEndpoint::Node(node.clone()));
        }
        if self.state.mode() == LanguageMode::X3d {
            if let Some(proxy) = scope.imports.get(name) {
                return Ok(RouteEndpoint::Import(Arc::clone(proxy)));
            }
        }
        Err(ProtoError::InvalidConnection(format!(
            "ROUTE declares an unknown {role} node DEF \"{name}\""
        )))
    }
}
