// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field vocabulary: language modes, the closed set of field types, access
//! modes, and the immutable field declaration triple.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Language variant a document or declaration is authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    /// VRML97: reduced type set, stricter IS rules, no IMPORT/EXPORT.
    Vrml97,
    /// X3D 3.x.
    #[default]
    X3d,
}

/// Specification version announced by a document header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecVersion {
    /// Major version; `2` selects VRML97.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
}

impl SpecVersion {
    /// VRML97 (`V2.0`).
    pub const VRML97: Self = Self { major: 2, minor: 0 };
    /// X3D 3.0.
    pub const X3D_3_0: Self = Self { major: 3, minor: 0 };

    /// Parses a header version such as `"V2.0"`, `"2.0"`, `"3.1"` or `"V3.3"`.
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix('V')
            .or_else(|| trimmed.strip_prefix('v'))
            .unwrap_or(trimmed);
        let (major, minor) = digits.split_once('.')?;
        let major: u32 = major.parse().ok()?;
        let minor: u32 = minor.parse().ok()?;
        match major {
            2 if minor == 0 => Some(Self::VRML97),
            3 => Some(Self { major, minor }),
            _ => None,
        }
    }

    /// Language mode selected by this version.
    #[must_use]
    pub fn mode(self) -> LanguageMode {
        if self.major == 2 {
            LanguageMode::Vrml97
        } else {
            LanguageMode::X3d
        }
    }
}

impl Default for SpecVersion {
    fn default() -> Self {
        Self::X3D_3_0
    }
}

impl fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Scalar representation backing a field type's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `bool`
    Bool,
    /// `i32`
    Int32,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `i64`
    Long,
    /// UTF-8 string.
    String,
    /// Node reference.
    Node,
}

macro_rules! field_types {
    ($( $variant:ident => $name:literal, $scalar:ident, $width:expr, $array:literal, $legacy:literal; )*) => {
        /// Every value type a field may carry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum FieldType {
            $(
                #[doc = concat!("`", $name, "`")]
                $variant,
            )*
        }

        impl FieldType {
            /// All field types in declaration order.
            pub const ALL: &'static [FieldType] = &[$(FieldType::$variant,)*];

            /// Canonical spelling, e.g. `"SFVec3f"`.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(FieldType::$variant => $name,)*
                }
            }

            /// Looks a type up by its canonical spelling.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(FieldType::$variant),)*
                    _ => None,
                }
            }

            /// Scalar representation of each component.
            #[must_use]
            pub fn scalar(self) -> ScalarKind {
                match self {
                    $(FieldType::$variant => ScalarKind::$scalar,)*
                }
            }

            /// Number of scalars making up one element; `None` for images,
            /// whose elements are variable length.
            #[must_use]
            pub fn components(self) -> Option<usize> {
                match self {
                    $(FieldType::$variant => $width,)*
                }
            }

            /// Whether values are stored as an array of scalars.
            #[must_use]
            pub fn is_array_backed(self) -> bool {
                match self {
                    $(FieldType::$variant => $array,)*
                }
            }

            /// Whether the type exists in VRML97.
            #[must_use]
            pub fn is_legacy_supported(self) -> bool {
                match self {
                    $(FieldType::$variant => $legacy,)*
                }
            }
        }
    };
}

field_types! {
    SFBool => "SFBool", Bool, Some(1), false, true;
    MFBool => "MFBool", Bool, Some(1), true, false;
    SFInt32 => "SFInt32", Int32, Some(1), false, true;
    MFInt32 => "MFInt32", Int32, Some(1), true, true;
    SFFloat => "SFFloat", Float, Some(1), false, true;
    MFFloat => "MFFloat", Float, Some(1), true, true;
    SFDouble => "SFDouble", Double, Some(1), false, false;
    MFDouble => "MFDouble", Double, Some(1), true, false;
    SFTime => "SFTime", Double, Some(1), false, true;
    MFTime => "MFTime", Double, Some(1), true, true;
    SFLong => "SFLong", Long, Some(1), false, false;
    MFLong => "MFLong", Long, Some(1), true, false;
    SFString => "SFString", String, Some(1), false, true;
    MFString => "MFString", String, Some(1), true, true;
    SFVec2f => "SFVec2f", Float, Some(2), true, true;
    MFVec2f => "MFVec2f", Float, Some(2), true, true;
    SFVec3f => "SFVec3f", Float, Some(3), true, true;
    MFVec3f => "MFVec3f", Float, Some(3), true, true;
    SFVec4f => "SFVec4f", Float, Some(4), true, false;
    MFVec4f => "MFVec4f", Float, Some(4), true, false;
    SFVec2d => "SFVec2d", Double, Some(2), true, false;
    MFVec2d => "MFVec2d", Double, Some(2), true, false;
    SFVec3d => "SFVec3d", Double, Some(3), true, false;
    MFVec3d => "MFVec3d", Double, Some(3), true, false;
    SFVec4d => "SFVec4d", Double, Some(4), true, false;
    MFVec4d => "MFVec4d", Double, Some(4), true, false;
    SFRotation => "SFRotation", Float, Some(4), true, true;
    MFRotation => "MFRotation", Float, Some(4), true, true;
    SFColor => "SFColor", Float, Some(3), true, true;
    MFColor => "MFColor", Float, Some(3), true, true;
    SFColorRGBA => "SFColorRGBA", Float, Some(4), true, false;
    MFColorRGBA => "MFColorRGBA", Float, Some(4), true, false;
    SFMatrix3f => "SFMatrix3f", Float, Some(9), true, false;
    MFMatrix3f => "MFMatrix3f", Float, Some(9), true, false;
    SFMatrix4f => "SFMatrix4f", Float, Some(16), true, false;
    MFMatrix4f => "MFMatrix4f", Float, Some(16), true, false;
    SFMatrix3d => "SFMatrix3d", Double, Some(9), true, false;
    MFMatrix3d => "MFMatrix3d", Double, Some(9), true, false;
    SFMatrix4d => "SFMatrix4d", Double, Some(16), true, false;
    MFMatrix4d => "MFMatrix4d", Double, Some(16), true, false;
    SFImage => "SFImage", Int32, None, true, true;
    MFImage => "MFImage", Int32, None, true, false;
    SFNode => "SFNode", Node, Some(1), false, true;
    MFNode => "MFNode", Node, Some(1), false, true;
}

impl FieldType {
    /// `true` for the `MF*` kinds.
    #[must_use]
    pub fn is_multi(self) -> bool {
        self.name().starts_with("MF")
    }

    /// `true` for `SFNode` and `MFNode`.
    #[must_use]
    pub fn is_node(self) -> bool {
        self.scalar() == ScalarKind::Node
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ProtoError::InvalidField {
            name: s.to_owned(),
            reason: "not a field type".into(),
        })
    }
}

/// How a field participates in the event model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessType {
    /// Initialization only (`field` / `initializeOnly`).
    Field,
    /// Readable and writable (`exposedField` / `inputOutput`).
    ExposedField,
    /// Input event (`eventIn` / `inputOnly`).
    EventIn,
    /// Output event (`eventOut` / `outputOnly`).
    EventOut,
}

impl AccessType {
    /// Accepts both the VRML97 and the X3D spelling.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "field" | "initializeOnly" => Some(Self::Field),
            "exposedField" | "inputOutput" => Some(Self::ExposedField),
            "eventIn" | "inputOnly" => Some(Self::EventIn),
            "eventOut" | "outputOnly" => Some(Self::EventOut),
            _ => None,
        }
    }

    /// Spelling used by documents of `mode`.
    #[must_use]
    pub fn name(self, mode: LanguageMode) -> &'static str {
        match (mode, self) {
            (LanguageMode::Vrml97, Self::Field) => "field",
            (LanguageMode::Vrml97, Self::ExposedField) => "exposedField",
            (LanguageMode::Vrml97, Self::EventIn) => "eventIn",
            (LanguageMode::Vrml97, Self::EventOut) => "eventOut",
            (LanguageMode::X3d, Self::Field) => "initializeOnly",
            (LanguageMode::X3d, Self::ExposedField) => "inputOutput",
            (LanguageMode::X3d, Self::EventIn) => "inputOnly",
            (LanguageMode::X3d, Self::EventOut) => "outputOnly",
        }
    }

    /// `true` for the two pure event kinds, which carry no stored value.
    #[must_use]
    pub fn is_event(self) -> bool {
        matches!(self, Self::EventIn | Self::EventOut)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name(LanguageMode::Vrml97))
    }
}

impl FromStr for AccessType {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| ProtoError::InvalidField {
            name: s.to_owned(),
            reason: "not an access type".into(),
        })
    }
}

/// Immutable `(name, type, access)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDeclaration {
    name: String,
    field_type: FieldType,
    access: AccessType,
}

impl FieldDeclaration {
    /// Creates a declaration.
    pub fn new(name: impl Into<String>, field_type: FieldType, access: AccessType) -> Self {
        Self {
            name: name.into(),
            field_type,
            access,
        }
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Access mode.
    #[must_use]
    pub fn access(&self) -> AccessType {
        self.access
    }
}
