// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Builder configuration: which node categories to load.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::NodeCategory;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error while reading.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Per-category load switches. Everything loads by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadRequirements {
    /// Refuse documents that are not VRML97.
    pub vrml97_only: bool,
    /// Load Background nodes.
    pub backgrounds: bool,
    /// Load Fog nodes.
    pub fogs: bool,
    /// Load light sources.
    pub lights: bool,
    /// Load Sound/AudioClip nodes.
    pub audio: bool,
    /// Load Viewpoints.
    pub viewpoints: bool,
    /// Load Inline nodes.
    pub externals: bool,
}

impl Default for LoadRequirements {
    fn default() -> Self {
        Self {
            vrml97_only: false,
            backgrounds: true,
            fogs: true,
            lights: true,
            audio: true,
            viewpoints: true,
            externals: true,
        }
    }
}

impl LoadRequirements {
    /// Categories switched off by these requirements.
    #[must_use]
    pub fn disabled_categories(&self) -> BTreeSet<NodeCategory> {
        [
            (self.backgrounds, NodeCategory::Background),
            (self.fogs, NodeCategory::Fog),
            (self.lights, NodeCategory::Light),
            (self.audio, NodeCategory::Audio),
            (self.viewpoints, NodeCategory::Viewpoint),
            (self.externals, NodeCategory::Inline),
        ]
        .into_iter()
        .filter(|(enabled, _)| !enabled)
        .map(|(_, category)| category)
        .collect()
    }
}

/// Settings consumed by [`ProtoBuilder`](crate::ProtoBuilder).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Category switches.
    pub load: LoadRequirements,
    /// Further categories to skip.
    pub disabled_categories: BTreeSet<NodeCategory>,
}

impl BuilderConfig {
    /// Parses a JSON document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Reads and parses the JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }

    /// Whether nodes of `category` are skipped.
    #[must_use]
    pub fn is_disabled(&self, category: NodeCategory) -> bool {
        self.disabled_categories.contains(&category)
            || self.load.disabled_categories().contains(&category)
    }
}
