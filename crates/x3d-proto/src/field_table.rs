// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ordered, index-stable field tables.
use rustc_hash::FxHashMap;

use crate::error::{ProtoError, Result};
use crate::field::{AccessType, FieldDeclaration, FieldType, LanguageMode};

/// Name of the implicit field every table starts with.
pub const METADATA_FIELD: &str = "metadata";

/// Index of the implicit [`METADATA_FIELD`].
pub const METADATA_INDEX: usize = 0;

/// Ordered list of field declarations plus a name index.
///
/// Deleted slots become holes and are never reused, so an index handed out
/// once stays valid for the lifetime of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTable {
    mode: LanguageMode,
    slots: Vec<Option<FieldDeclaration>>,
    by_name: FxHashMap<String, usize>,
}

impl FieldTable {
    /// Creates a table holding only the implicit `metadata` field.
    #[must_use]
    pub fn new(mode: LanguageMode) -> Self {
        let metadata =
            FieldDeclaration::new(METADATA_FIELD, FieldType::SFNode, AccessType::ExposedField);
        let mut by_name = FxHashMap::default();
        by_name.insert(METADATA_FIELD.to_owned(), METADATA_INDEX);
        Self {
            mode,
            slots: vec![Some(metadata)],
            by_name,
        }
    }

    /// Table for a built-in node type: `metadata` followed by `decls`.
    ///
    /// Built-in declarations are trusted; a repeated name keeps its first
    /// declaration.
    pub(crate) fn builtin(
        mode: LanguageMode,
        decls: impl IntoIterator<Item = FieldDeclaration>,
    ) -> Self {
        let mut table = Self::new(mode);
        for decl in decls {
            if !table.by_name.contains_key(decl.name()) {
                table.by_name.insert(decl.name().to_owned(), table.slots.len());
                table.slots.push(Some(decl));
            }
        }
        table
    }

    /// Language mode the table validates against.
    #[must_use]
    pub fn mode(&self) -> LanguageMode {
        self.mode
    }

    /// Appends `decl`, returning its index.
    ///
    /// Re-appending an identical declaration returns the existing index.
    ///
    /// # Errors
    /// - [`ProtoError::InvalidField`] when the type does not exist in VRML97
    ///   and the table runs in that mode.
    /// - [`ProtoError::FieldClash`] when the name is taken by a declaration
    ///   with a different type or access.
    pub fn append(&mut self, decl: FieldDeclaration) -> Result<usize> {
        if self.mode == LanguageMode::Vrml97 && !decl.field_type().is_legacy_supported() {
            return Err(ProtoError::InvalidField {
                name: decl.name().to_owned(),
                reason: format!("{} is not a VRML97 field type", decl.field_type()),
            });
        }
        if let Some(&index) = self.by_name.get(decl.name()) {
            if let Some(existing) = self.slots[index].as_ref() {
                if existing.field_type() == decl.field_type() && existing.access() == decl.access()
                {
                    return Ok(index);
                }
                return Err(ProtoError::FieldClash {
                    name: decl.name().to_owned(),
                    existing_type: existing.field_type(),
                    existing_access: existing.access(),
                    requested_type: decl.field_type(),
                    requested_access: decl.access(),
                });
            }
        }
        let index = self.slots.len();
        self.by_name.insert(decl.name().to_owned(), index);
        self.slots.push(Some(decl));
        Ok(index)
    }

    /// Removes the declaration at `index`, leaving a hole. Returns it.
    pub fn delete(&mut self, index: usize) -> Option<FieldDeclaration> {
        let removed = self.slots.get_mut(index)?.take()?;
        self.by_name.remove(removed.name());
        Some(removed)
    }

    /// Removes the declaration called `name`, leaving a hole. Returns it.
    pub fn delete_by_name(&mut self, name: &str) -> Option<FieldDeclaration> {
        let index = *self.by_name.get(name)?;
        self.delete(index)
    }

    /// Returns the index of the live declaration called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Returns the live declaration at `index`.
    #[must_use]
    pub fn declaration(&self, index: usize) -> Option<&FieldDeclaration> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Returns the live declaration called `name`.
    #[must_use]
    pub fn declaration_by_name(&self, name: &str) -> Option<&FieldDeclaration> {
        self.index_of(name).and_then(|i| self.declaration(i))
    }

    /// Iterates `(index, declaration)` over live slots in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &FieldDeclaration)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|d| (i, d)))
    }

    /// Live declarations in insertion order.
    #[must_use]
    pub fn live_declarations(&self) -> Vec<&FieldDeclaration> {
        self.iter().map(|(_, d)| d).collect()
    }

    /// Number of slots, holes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// A table always carries `metadata`; this is `false` unless it was
    /// deleted and nothing else remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Number of live declarations.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.by_name.len()
    }
}
