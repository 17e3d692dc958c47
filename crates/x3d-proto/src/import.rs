// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! IMPORT proxies: local stand-ins for nodes exported by an Inline.
use std::sync::Mutex;

/// Stand-in for a node that will only exist once an Inline loads.
///
/// Field types are unknown until then, so fields are assigned indices by
/// name on first use and ROUTEs through a proxy skip type checking.
#[derive(Debug)]
pub struct ImportProxy {
    local_name: String,
    inline_def: String,
    exported_name: String,
    fields: Mutex<Vec<String>>,
}

impl ImportProxy {
    /// Creates a proxy for `exported_name` of the Inline called `inline_def`,
    /// known locally as `local_name`.
    pub fn new(
        local_name: impl Into<String>,
        inline_def: impl Into<String>,
        exported_name: impl Into<String>,
    ) -> Self {
        Self {
            local_name: local_name.into(),
            inline_def: inline_def.into(),
            exported_name: exported_name.into(),
            fields: Mutex::new(Vec::new()),
        }
    }

    /// Name the proxy is referenced by in this document.
    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// DEF name of the Inline node providing the export.
    #[must_use]
    pub fn inline_def(&self) -> &str {
        &self.inline_def
    }

    /// Name the Inline's document exports the node under.
    #[must_use]
    pub fn exported_name(&self) -> &str {
        &self.exported_name
    }

    /// Index for `name`, assigned on first use.
    pub fn field_index(&self, name: &str) -> usize {
        let mut fields = self.fields.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = fields.iter().position(|f| f == name) {
            return index;
        }
        fields.push(name.to_owned());
        fields.len() - 1
    }

    /// Name previously assigned to `index`.
    #[must_use]
    pub fn field_name(&self, index: usize) -> Option<String> {
        self.fields
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(index)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_stable_per_name() {
        let proxy = ImportProxy::new("Door", "House", "FrontDoor");
        let a = proxy.field_index("set_open");
        let b = proxy.field_index("isOpen");
        assert_eq!(proxy.field_index("set_open"), a);
        assert_ne!(a, b);
        assert_eq!(proxy.field_name(b).as_deref(), Some("isOpen"));
        assert_eq!(proxy.inline_def(), "House");
    }
}
