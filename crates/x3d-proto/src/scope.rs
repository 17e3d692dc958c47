// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lexical naming scopes, pushed and popped as a unit.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::import::ImportProxy;
use crate::node::NodeRef;
use crate::template::Template;

/// Names visible at one nesting level: the document top level or one
/// prototype body.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    /// DEF name → node.
    pub defs: BTreeMap<String, NodeRef>,
    /// PROTO/EXTERNPROTO name → completed template.
    pub templates: BTreeMap<String, Template>,
    /// IMPORT local name → proxy.
    pub imports: BTreeMap<String, Arc<ImportProxy>>,
    /// Inline DEF name → exported name → proxy.
    pub exports: BTreeMap<String, BTreeMap<String, Arc<ImportProxy>>>,
    /// DEF names whose nodes were skipped; USE and ROUTE through them are
    /// dropped silently.
    pub ignored_defs: BTreeSet<String>,
}

impl Scope {
    /// Creates an empty scope.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scope pre-populated with an outer document's DEFs and templates.
    #[must_use]
    pub fn with_globals(
        defs: BTreeMap<String, NodeRef>,
        templates: BTreeMap<String, Template>,
    ) -> Self {
        Self {
            defs,
            templates,
            ..Self::default()
        }
    }

    /// Registers an IMPORT in both the import and the export tables.
    pub fn register_import(&mut self, proxy: Arc<ImportProxy>) {
        self.exports
            .entry(proxy.inline_def().to_owned())
            .or_default()
            .insert(proxy.exported_name().to_owned(), Arc::clone(&proxy));
        self.imports.insert(proxy.local_name().to_owned(), proxy);
    }

    /// Whether `name` was DEF'd on a skipped node in this scope.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored_defs.contains(name)
    }
}
