// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Node factory port and a catalogue-backed default implementation.
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::field::{AccessType, FieldDeclaration, FieldType, LanguageMode, SpecVersion};
use crate::field_table::FieldTable;
use crate::node::{NodeCategory, NodeTraits, SceneNode};

/// Port through which the builder creates concrete nodes.
///
/// Returning `None` from [`create_node`](Self::create_node) is not an error:
/// the builder skips the node and its whole subtree.
pub trait NodeFactory {
    /// Creates a fresh node of `type_name`, or `None` when the type is not
    /// available under the current version/profile.
    fn create_node(&mut self, type_name: &str) -> Option<SceneNode>;

    /// Selects the language version of the document being built.
    fn set_spec_version(&mut self, version: SpecVersion);

    /// Selects the document profile.
    fn set_profile(&mut self, profile: &str);

    /// Declares a component requirement.
    fn add_component(&mut self, name: &str, level: u32);
}

const F: AccessType = AccessType::Field;
const X: AccessType = AccessType::ExposedField;
const IN: AccessType = AccessType::EventIn;
const OUT: AccessType = AccessType::EventOut;

type FieldSpec = (AccessType, FieldType, &'static str);

struct NodeSpec {
    name: &'static str,
    traits: NodeTraits,
    grouping_fields: bool,
    x3d_only: bool,
    fields: &'static [FieldSpec],
}

const GROUPING_FIELDS: &[FieldSpec] = &[
    (IN, FieldType::MFNode, "addChildren"),
    (IN, FieldType::MFNode, "removeChildren"),
    (X, FieldType::MFNode, "children"),
    (F, FieldType::SFVec3f, "bboxCenter"),
    (F, FieldType::SFVec3f, "bboxSize"),
];

const BIND_FIELDS: &[FieldSpec] = &[
    (IN, FieldType::SFBool, "set_bind"),
    (OUT, FieldType::SFBool, "isBound"),
    (OUT, FieldType::SFTime, "bindTime"),
];

const fn plain(
    name: &'static str,
    category: NodeCategory,
    fields: &'static [FieldSpec],
) -> NodeSpec {
    NodeSpec {
        name,
        traits: NodeTraits::plain(category),
        grouping_fields: false,
        x3d_only: false,
        fields,
    }
}

const fn group(name: &'static str, fields: &'static [FieldSpec]) -> NodeSpec {
    NodeSpec {
        name,
        traits: NodeTraits {
            category: NodeCategory::Grouping,
            bindable: false,
            grouping: true,
        },
        grouping_fields: true,
        x3d_only: false,
        fields,
    }
}

const fn bindable(
    name: &'static str,
    category: NodeCategory,
    fields: &'static [FieldSpec],
) -> NodeSpec {
    NodeSpec {
        name,
        traits: NodeTraits {
            category,
            bindable: true,
            grouping: false,
        },
        grouping_fields: false,
        x3d_only: false,
        fields,
    }
}

const fn x3d(spec: NodeSpec) -> NodeSpec {
    NodeSpec {
        name: spec.name,
        traits: spec.traits,
        grouping_fields: spec.grouping_fields,
        x3d_only: true,
        fields: spec.fields,
    }
}

static CATALOGUE: &[NodeSpec] = &[
    group("Group", &[]),
    group(
        "Transform",
        &[
            (X, FieldType::SFVec3f, "center"),
            (X, FieldType::SFRotation, "rotation"),
            (X, FieldType::SFVec3f, "scale"),
            (X, FieldType::SFRotation, "scaleOrientation"),
            (X, FieldType::SFVec3f, "translation"),
        ],
    ),
    group(
        "Switch",
        &[
            (X, FieldType::MFNode, "choice"),
            (X, FieldType::SFInt32, "whichChoice"),
        ],
    ),
    group(
        "Anchor",
        &[
            (X, FieldType::SFString, "description"),
            (X, FieldType::MFString, "parameter"),
            (X, FieldType::MFString, "url"),
        ],
    ),
    group("Billboard", &[(X, FieldType::SFVec3f, "axisOfRotation")]),
    group("Collision", &[(X, FieldType::SFBool, "collide"), (F, FieldType::SFNode, "proxy")]),
    plain(
        "Shape",
        NodeCategory::Shape,
        &[
            (X, FieldType::SFNode, "appearance"),
            (X, FieldType::SFNode, "geometry"),
        ],
    ),
    plain(
        "Appearance",
        NodeCategory::Appearance,
        &[
            (X, FieldType::SFNode, "material"),
            (X, FieldType::SFNode, "texture"),
            (X, FieldType::SFNode, "textureTransform"),
        ],
    ),
    plain(
        "Material",
        NodeCategory::Appearance,
        &[
            (X, FieldType::SFFloat, "ambientIntensity"),
            (X, FieldType::SFColor, "diffuseColor"),
            (X, FieldType::SFColor, "emissiveColor"),
            (X, FieldType::SFFloat, "shininess"),
            (X, FieldType::SFColor, "specularColor"),
            (X, FieldType::SFFloat, "transparency"),
        ],
    ),
    plain(
        "ImageTexture",
        NodeCategory::Appearance,
        &[
            (X, FieldType::MFString, "url"),
            (F, FieldType::SFBool, "repeatS"),
            (F, FieldType::SFBool, "repeatT"),
        ],
    ),
    plain(
        "PixelTexture",
        NodeCategory::Appearance,
        &[
            (X, FieldType::SFImage, "image"),
            (F, FieldType::SFBool, "repeatS"),
            (F, FieldType::SFBool, "repeatT"),
        ],
    ),
    plain("Box", NodeCategory::Geometry, &[(F, FieldType::SFVec3f, "size")]),
    plain("Sphere", NodeCategory::Geometry, &[(F, FieldType::SFFloat, "radius")]),
    plain(
        "Cone",
        NodeCategory::Geometry,
        &[
            (F, FieldType::SFFloat, "bottomRadius"),
            (F, FieldType::SFFloat, "height"),
        ],
    ),
    plain(
        "IndexedFaceSet",
        NodeCategory::Geometry,
        &[
            (IN, FieldType::MFInt32, "set_coordIndex"),
            (X, FieldType::SFNode, "coord"),
            (F, FieldType::MFInt32, "coordIndex"),
            (F, FieldType::SFBool, "solid"),
        ],
    ),
    plain(
        "Coordinate",
        NodeCategory::GeometricProperty,
        &[(X, FieldType::MFVec3f, "point")],
    ),
    plain(
        "Color",
        NodeCategory::GeometricProperty,
        &[(X, FieldType::MFColor, "color")],
    ),
    bindable(
        "Viewpoint",
        NodeCategory::Viewpoint,
        &[
            (X, FieldType::SFFloat, "fieldOfView"),
            (X, FieldType::SFBool, "jump"),
            (X, FieldType::SFRotation, "orientation"),
            (X, FieldType::SFVec3f, "position"),
            (F, FieldType::SFString, "description"),
        ],
    ),
    bindable(
        "NavigationInfo",
        NodeCategory::Navigation,
        &[
            (X, FieldType::MFFloat, "avatarSize"),
            (X, FieldType::SFBool, "headlight"),
            (X, FieldType::SFFloat, "speed"),
            (X, FieldType::MFString, "type"),
        ],
    ),
    bindable(
        "Background",
        NodeCategory::Background,
        &[
            (X, FieldType::MFFloat, "groundAngle"),
            (X, FieldType::MFColor, "groundColor"),
            (X, FieldType::MFFloat, "skyAngle"),
            (X, FieldType::MFColor, "skyColor"),
        ],
    ),
    bindable(
        "Fog",
        NodeCategory::Fog,
        &[
            (X, FieldType::SFColor, "color"),
            (X, FieldType::SFString, "fogType"),
            (X, FieldType::SFFloat, "visibilityRange"),
        ],
    ),
    plain(
        "DirectionalLight",
        NodeCategory::Light,
        &[
            (X, FieldType::SFFloat, "ambientIntensity"),
            (X, FieldType::SFColor, "color"),
            (X, FieldType::SFVec3f, "direction"),
            (X, FieldType::SFFloat, "intensity"),
            (X, FieldType::SFBool, "on"),
        ],
    ),
    plain(
        "PointLight",
        NodeCategory::Light,
        &[
            (X, FieldType::SFVec3f, "attenuation"),
            (X, FieldType::SFColor, "color"),
            (X, FieldType::SFFloat, "intensity"),
            (X, FieldType::SFVec3f, "location"),
            (X, FieldType::SFBool, "on"),
            (X, FieldType::SFFloat, "radius"),
        ],
    ),
    plain(
        "Sound",
        NodeCategory::Audio,
        &[
            (X, FieldType::SFFloat, "intensity"),
            (X, FieldType::SFVec3f, "location"),
            (X, FieldType::SFNode, "source"),
        ],
    ),
    plain(
        "AudioClip",
        NodeCategory::Audio,
        &[
            (X, FieldType::SFString, "description"),
            (X, FieldType::SFBool, "loop"),
            (X, FieldType::SFTime, "startTime"),
            (X, FieldType::MFString, "url"),
            (OUT, FieldType::SFTime, "duration_changed"),
        ],
    ),
    plain(
        "Inline",
        NodeCategory::Inline,
        &[
            (X, FieldType::MFString, "url"),
            (F, FieldType::SFVec3f, "bboxCenter"),
            (F, FieldType::SFVec3f, "bboxSize"),
        ],
    ),
    plain(
        "Script",
        NodeCategory::Script,
        &[
            (X, FieldType::MFString, "url"),
            (F, FieldType::SFBool, "directOutput"),
            (F, FieldType::SFBool, "mustEvaluate"),
        ],
    ),
    plain(
        "TimeSensor",
        NodeCategory::Sensor,
        &[
            (X, FieldType::SFTime, "cycleInterval"),
            (X, FieldType::SFBool, "enabled"),
            (X, FieldType::SFBool, "loop"),
            (X, FieldType::SFTime, "startTime"),
            (X, FieldType::SFTime, "stopTime"),
            (OUT, FieldType::SFTime, "cycleTime"),
            (OUT, FieldType::SFFloat, "fraction_changed"),
            (OUT, FieldType::SFBool, "isActive"),
            (OUT, FieldType::SFTime, "time"),
        ],
    ),
    plain(
        "TouchSensor",
        NodeCategory::Sensor,
        &[
            (X, FieldType::SFBool, "enabled"),
            (OUT, FieldType::SFBool, "isActive"),
            (OUT, FieldType::SFBool, "isOver"),
            (OUT, FieldType::SFTime, "touchTime"),
        ],
    ),
    plain(
        "PositionInterpolator",
        NodeCategory::Interpolator,
        &[
            (IN, FieldType::SFFloat, "set_fraction"),
            (X, FieldType::MFFloat, "key"),
            (X, FieldType::MFVec3f, "keyValue"),
            (OUT, FieldType::SFVec3f, "value_changed"),
        ],
    ),
    plain(
        "OrientationInterpolator",
        NodeCategory::Interpolator,
        &[
            (IN, FieldType::SFFloat, "set_fraction"),
            (X, FieldType::MFFloat, "key"),
            (X, FieldType::MFRotation, "keyValue"),
            (OUT, FieldType::SFRotation, "value_changed"),
        ],
    ),
    plain(
        "ScalarInterpolator",
        NodeCategory::Interpolator,
        &[
            (IN, FieldType::SFFloat, "set_fraction"),
            (X, FieldType::MFFloat, "key"),
            (X, FieldType::MFFloat, "keyValue"),
            (OUT, FieldType::SFFloat, "value_changed"),
        ],
    ),
    plain(
        "WorldInfo",
        NodeCategory::Info,
        &[
            (F, FieldType::MFString, "info"),
            (F, FieldType::SFString, "title"),
        ],
    ),
    x3d(plain(
        "MetadataString",
        NodeCategory::Metadata,
        &[
            (X, FieldType::SFString, "name"),
            (X, FieldType::SFString, "reference"),
            (X, FieldType::MFString, "value"),
        ],
    )),
    x3d(plain(
        "MetadataDouble",
        NodeCategory::Metadata,
        &[
            (X, FieldType::SFString, "name"),
            (X, FieldType::SFString, "reference"),
            (X, FieldType::MFDouble, "value"),
        ],
    )),
    x3d(plain(
        "TextureTransformMatrix3D",
        NodeCategory::Appearance,
        &[(X, FieldType::SFMatrix4f, "matrix")],
    )),
];

#[derive(Debug, Clone)]
struct Definition {
    traits: NodeTraits,
    x3d_only: bool,
    fields: Arc<FieldTable>,
}

/// Catalogue of common VRML97/X3D node types.
///
/// Field tables are built once per type and shared by every node of that
/// type until one of them appends a dynamic field.
#[derive(Debug, Clone, Default)]
pub struct StandardNodeFactory {
    version: Option<SpecVersion>,
    profile: Option<String>,
    components: BTreeMap<String, u32>,
    definitions: BTreeMap<&'static str, Definition>,
}

impl StandardNodeFactory {
    /// Creates a factory with no version selected (X3D rules apply).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every type in the catalogue.
    pub fn type_names() -> impl Iterator<Item = &'static str> {
        CATALOGUE.iter().map(|spec| spec.name)
    }

    /// Selected version, if any.
    #[must_use]
    pub fn spec_version(&self) -> Option<SpecVersion> {
        self.version
    }

    /// Selected profile, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Declared component levels.
    #[must_use]
    pub fn components(&self) -> &BTreeMap<String, u32> {
        &self.components
    }

    fn definition(&mut self, type_name: &str) -> Option<&Definition> {
        let spec = CATALOGUE.iter().find(|spec| spec.name == type_name)?;
        Some(self.definitions.entry(spec.name).or_insert_with(|| {
            let grouping: &[FieldSpec] = if spec.grouping_fields {
                GROUPING_FIELDS
            } else {
                &[]
            };
            let binding: &[FieldSpec] = if spec.traits.bindable { BIND_FIELDS } else { &[] };
            let table = FieldTable::builtin(
                LanguageMode::X3d,
                grouping
                    .iter()
                    .chain(spec.fields)
                    .chain(binding)
                    .map(|&(access, field_type, name)| FieldDeclaration::new(name, field_type, access)),
            );
            Definition {
                traits: spec.traits,
                x3d_only: spec.x3d_only,
                fields: Arc::new(table),
            }
        }))
    }
}

impl NodeFactory for StandardNodeFactory {
    fn create_node(&mut self, type_name: &str) -> Option<SceneNode> {
        let legacy = self
            .version
            .is_some_and(|v| v.mode() == LanguageMode::Vrml97);
        let def = self.definition(type_name)?;
        if legacy && def.x3d_only {
            debug!(type_name, "node type not available in VRML97");
            return None;
        }
        Some(SceneNode::new(type_name, def.traits, Arc::clone(&def.fields)))
    }

    fn set_spec_version(&mut self, version: SpecVersion) {
        self.version = Some(version);
    }

    fn set_profile(&mut self, profile: &str) {
        self.profile = Some(profile.to_owned());
    }

    fn add_component(&mut self, name: &str, level: u32) {
        let entry = self.components.entry(name.to_owned()).or_insert(level);
        *entry = (*entry).max(level);
    }
}
