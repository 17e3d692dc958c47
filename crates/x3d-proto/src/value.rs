// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Field values: a genuine sum type plus the element count the runtime needs.

use crate::error::{ProtoError, Result};
use crate::field::{FieldDeclaration, FieldType, ScalarKind};
use crate::node::NodeRef;

/// Initial capacity of a synthesized `MFNode` default.
const MFNODE_DEFAULT_CAPACITY: usize = 5;

/// Exactly one payload per value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Single boolean.
    Bool(bool),
    /// Single 32-bit integer.
    Int32(i32),
    /// Single float.
    Float(f32),
    /// Single double (also `SFTime`).
    Double(f64),
    /// Single 64-bit integer.
    Long(i64),
    /// Single string.
    String(String),
    /// Flattened booleans.
    BoolArray(Vec<bool>),
    /// Flattened integers (also image data).
    Int32Array(Vec<i32>),
    /// Flattened floats (vectors, colors, rotations, matrices).
    FloatArray(Vec<f32>),
    /// Flattened doubles.
    DoubleArray(Vec<f64>),
    /// Flattened 64-bit integers.
    LongArray(Vec<i64>),
    /// Strings.
    StringArray(Vec<String>),
    /// Optional single node.
    Node(Option<NodeRef>),
    /// Node list.
    NodeArray(Vec<NodeRef>),
}

impl FieldValue {
    /// Canonical default for `field_type`: zero/false scalars, empty string,
    /// empty arrays, no node, and an empty node list with spare capacity.
    #[must_use]
    pub fn default_for(field_type: FieldType) -> Self {
        match (field_type.scalar(), field_type.is_array_backed()) {
            (ScalarKind::Node, _) if field_type.is_multi() => {
                Self::NodeArray(Vec::with_capacity(MFNODE_DEFAULT_CAPACITY))
            }
            (ScalarKind::Node, _) => Self::Node(None),
            (ScalarKind::Bool, false) => Self::Bool(false),
            (ScalarKind::Int32, false) => Self::Int32(0),
            (ScalarKind::Float, false) => Self::Float(0.0),
            (ScalarKind::Double, false) => Self::Double(0.0),
            (ScalarKind::Long, false) => Self::Long(0),
            (ScalarKind::String, false) => Self::String(String::new()),
            (ScalarKind::Bool, true) => Self::BoolArray(Vec::new()),
            (ScalarKind::Int32, true) => Self::Int32Array(Vec::new()),
            (ScalarKind::Float, true) => Self::FloatArray(Vec::new()),
            (ScalarKind::Double, true) => Self::DoubleArray(Vec::new()),
            (ScalarKind::Long, true) => Self::LongArray(Vec::new()),
            (ScalarKind::String, true) => Self::StringArray(Vec::new()),
        }
    }

    /// Whether this payload is the representation `field_type` uses.
    #[must_use]
    pub fn fits(&self, field_type: FieldType) -> bool {
        let array = field_type.is_array_backed();
        match self {
            Self::Bool(_) => field_type.scalar() == ScalarKind::Bool && !array,
            Self::Int32(_) => field_type.scalar() == ScalarKind::Int32 && !array,
            Self::Float(_) => field_type.scalar() == ScalarKind::Float && !array,
            Self::Double(_) => field_type.scalar() == ScalarKind::Double && !array,
            Self::Long(_) => field_type.scalar() == ScalarKind::Long && !array,
            Self::String(_) => field_type == FieldType::SFString,
            Self::BoolArray(_) => field_type.scalar() == ScalarKind::Bool && array,
            Self::Int32Array(_) => field_type.scalar() == ScalarKind::Int32 && array,
            Self::FloatArray(_) => field_type.scalar() == ScalarKind::Float && array,
            Self::DoubleArray(_) => field_type.scalar() == ScalarKind::Double && array,
            Self::LongArray(_) => field_type.scalar() == ScalarKind::Long && array,
            Self::StringArray(_) => field_type == FieldType::MFString,
            Self::Node(_) => field_type == FieldType::SFNode,
            Self::NodeArray(_) => field_type == FieldType::MFNode,
        }
    }

    /// Number of scalars held (nodes count one each, `None` counts zero).
    #[must_use]
    pub fn scalar_len(&self) -> usize {
        match self {
            Self::Bool(_)
            | Self::Int32(_)
            | Self::Float(_)
            | Self::Double(_)
            | Self::Long(_)
            | Self::String(_) => 1,
            Self::BoolArray(v) => v.len(),
            Self::Int32Array(v) => v.len(),
            Self::FloatArray(v) => v.len(),
            Self::DoubleArray(v) => v.len(),
            Self::LongArray(v) => v.len(),
            Self::StringArray(v) => v.len(),
            Self::Node(n) => usize::from(n.is_some()),
            Self::NodeArray(v) => v.len(),
        }
    }
}

/// A value paired with its logical element count.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    value: FieldValue,
    num_elements: usize,
}

impl TypedValue {
    /// Canonical default value for `field_type`.
    #[must_use]
    pub fn default_for(field_type: FieldType) -> Self {
        let value = FieldValue::default_for(field_type);
        let num_elements = usize::from(!field_type.is_array_backed() && !field_type.is_node());
        Self {
            value,
            num_elements,
        }
    }

    /// Wraps `value` for the field `decl`, computing the element count.
    ///
    /// # Errors
    /// [`ProtoError::InvalidFieldValue`] when the payload is not the type's
    /// representation, or the scalar count is not a whole number of elements.
    pub fn for_field(decl: &FieldDeclaration, value: FieldValue) -> Result<Self> {
        let field_type = decl.field_type();
        if !value.fits(field_type) {
            return Err(ProtoError::invalid_value(
                decl.name(),
                field_type,
                "value representation does not match the field type",
            ));
        }
        let num_elements = element_count(field_type, &value)
            .map_err(|reason| ProtoError::invalid_value(decl.name(), field_type, reason))?;
        Ok(Self {
            value,
            num_elements,
        })
    }

    /// The payload.
    #[must_use]
    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Consumes `self`, returning the payload.
    #[must_use]
    pub fn into_value(self) -> FieldValue {
        self.value
    }

    /// Logical element count (3 floats of an `SFVec3f` are one element).
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Appends a node to an `MFNode` value, or fills an empty `SFNode`.
    /// Returns `false` when the value is not node-typed or already holds a
    /// single node.
    pub(crate) fn push_node(&mut self, node: NodeRef) -> bool {
        match &mut self.value {
            FieldValue::NodeArray(nodes) => {
                nodes.push(node);
                self.num_elements = nodes.len();
                true
            }
            FieldValue::Node(slot @ None) => {
                *slot = Some(node);
                self.num_elements = 1;
                true
            }
            _ => false,
        }
    }

    /// Integer payload of an `SFInt32` value.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self.value {
            FieldValue::Int32(v) => Some(v),
            _ => None,
        }
    }

    /// Float payload of an `SFFloat` value.
    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self.value {
            FieldValue::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean payload of an `SFBool` value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            FieldValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// String payload of an `SFString` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            FieldValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Node payload(s) of an `SFNode`/`MFNode` value.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeRef> {
        match &self.value {
            FieldValue::Node(n) => n.iter().cloned().collect(),
            FieldValue::NodeArray(v) => v.clone(),
            _ => Vec::new(),
        }
    }
}

/// Number of logical elements `value` holds for `field_type`.
///
/// Plain scalars count one; flattened arrays divide by the per-element width;
/// image data is scanned header by header (`width height components` followed
/// by `width * height` pixels).
pub fn element_count(field_type: FieldType, value: &FieldValue) -> Result<usize, String> {
    if field_type.is_node() || !field_type.is_array_backed() {
        return Ok(value.scalar_len());
    }
    if let FieldValue::Int32Array(ints) = value {
        if matches!(field_type, FieldType::SFImage | FieldType::MFImage) {
            let images = count_images(ints)?;
            if field_type == FieldType::SFImage && images > 1 {
                return Err(format!("SFImage holds {images} images"));
            }
            return Ok(images);
        }
    }
    let width = field_type.components().unwrap_or(1);
    let scalars = value.scalar_len();
    if scalars % width != 0 {
        return Err(format!(
            "{scalars} values is not a multiple of {width} for {field_type}"
        ));
    }
    if !field_type.is_multi() && scalars != 0 && scalars != width {
        return Err(format!("{field_type} takes exactly {width} values, got {scalars}"));
    }
    Ok(scalars / width)
}

fn count_images(ints: &[i32]) -> Result<usize, String> {
    let mut cursor = 0;
    let mut images = 0;
    while cursor < ints.len() {
        let header = ints
            .get(cursor..cursor + 3)
            .ok_or_else(|| format!("truncated image header at value {cursor}"))?;
        let width = usize::try_from(header[0]).map_err(|_| "negative image width".to_owned())?;
        let height = usize::try_from(header[1]).map_err(|_| "negative image height".to_owned())?;
        if !(0..=4).contains(&header[2]) {
            return Err(format!("image component count {} out of range", header[2]));
        }
        let pixels = width
            .checked_mul(height)
            .ok_or_else(|| "image dimensions overflow".to_owned())?;
        cursor += 3 + pixels;
        if cursor > ints.len() {
            return Err(format!(
                "image declares {pixels} pixels but only {} values remain",
                ints.len() + pixels - cursor
            ));
        }
        images += 1;
    }
    Ok(images)
}
