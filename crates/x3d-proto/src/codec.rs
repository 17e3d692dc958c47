// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Text → [`TypedValue`] decoding for field values as they arrive from a
//! tokenizer, either as one raw string or as a pre-split list.
//!
//! Node-typed fields are never decoded here; their values arrive as node
//! events.

use serde::{Deserialize, Serialize};

use crate::error::{ProtoError, Result};
use crate::field::{FieldDeclaration, FieldType, LanguageMode, ScalarKind};
use crate::value::{FieldValue, TypedValue};

/// A field value as supplied by the event producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// One unsplit string, e.g. `"1 0 0"` or `"\"a\" \"b\""`.
    Text(String),
    /// Already split items; each numeric item may still contain several
    /// whitespace separated scalars, string items are taken verbatim.
    List(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl<S: AsRef<str>> From<&[S]> for RawValue {
    fn from(items: &[S]) -> Self {
        Self::List(items.iter().map(|s| s.as_ref().to_owned()).collect())
    }
}

/// Decoder configured for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCodec {
    mode: LanguageMode,
}

impl FieldCodec {
    /// Creates a codec for documents of `mode`.
    #[must_use]
    pub fn new(mode: LanguageMode) -> Self {
        Self { mode }
    }

    /// Language mode of the document being decoded.
    #[must_use]
    pub fn mode(&self) -> LanguageMode {
        self.mode
    }

    /// Decodes `raw` for `decl`.
    ///
    /// Returns `Ok(None)` for node-typed fields and for blank input to a
    /// non-string field; the field then keeps whatever value it had.
    ///
    /// # Errors
    /// [`ProtoError::InvalidFieldValue`] when the text does not parse or does
    /// not form a whole number of elements.
    pub fn decode(&self, decl: &FieldDeclaration, raw: &RawValue) -> Result<Option<TypedValue>> {
        let field_type = decl.field_type();
        if field_type.is_node() {
            return Ok(None);
        }
        let value = match field_type.scalar() {
            ScalarKind::String => Some(decode_strings(field_type, raw)),
            _ => {
                let tokens = numeric_tokens(raw);
                if tokens.is_empty() && !field_type.is_multi() {
                    None
                } else {
                    Some(decode_scalars(decl, &tokens)?)
                }
            }
        };
        value.map(|v| TypedValue::for_field(decl, v)).transpose()
    }
}

fn numeric_tokens(raw: &RawValue) -> Vec<&str> {
    match raw {
        RawValue::Text(text) => split_scalars(text).collect(),
        RawValue::List(items) => items.iter().flat_map(|item| split_scalars(item)).collect(),
    }
}

/// Whitespace, commas and brackets all separate scalars.
fn split_scalars(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | '[' | ']'))
        .filter(|t| !t.is_empty())
}

fn decode_strings(field_type: FieldType, raw: &RawValue) -> FieldValue {
    match (field_type, raw) {
        (FieldType::SFString, RawValue::Text(text)) => FieldValue::String(unquote_single(text)),
        (FieldType::SFString, RawValue::List(items)) => {
            FieldValue::String(items.first().cloned().unwrap_or_default())
        }
        (_, RawValue::Text(text)) => FieldValue::StringArray(split_quoted(text)),
        (_, RawValue::List(items)) => FieldValue::StringArray(items.clone()),
    }
}

fn unquote_single(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        unescape(&trimmed[1..trimmed.len() - 1])
    } else {
        text.to_owned()
    }
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Splits `"a" "b c"` into `["a", "b c"]`; unquoted text is one string.
fn split_quoted(text: &str) -> Vec<String> {
    let trimmed = text
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if !trimmed.contains('"') {
        return vec![trimmed.to_owned()];
    }
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut escaped = false;
    for c in trimmed.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if quoted && c == '\\' {
            escaped = true;
        } else if c == '"' {
            if quoted {
                out.push(std::mem::take(&mut current));
            }
            quoted = !quoted;
        } else if quoted {
            current.push(c);
        }
    }
    out
}

fn decode_scalars(decl: &FieldDeclaration, tokens: &[&str]) -> Result<FieldValue> {
    let field_type = decl.field_type();
    let bad = |token: &str| {
        ProtoError::invalid_value(
            decl.name(),
            field_type,
            format!("cannot parse `{token}` as {:?}", field_type.scalar()),
        )
    };
    let single = !field_type.is_array_backed();
    if single && tokens.len() != 1 {
        return Err(ProtoError::invalid_value(
            decl.name(),
            field_type,
            format!("expected one value, got {}", tokens.len()),
        ));
    }
    let value = match field_type.scalar() {
        ScalarKind::Bool => {
            let values = parse_all(tokens, parse_bool, bad)?;
            wrap(single, values, FieldValue::Bool, FieldValue::BoolArray)
        }
        ScalarKind::Int32 => {
            let values = parse_all(tokens, parse_i32, bad)?;
            wrap(single, values, FieldValue::Int32, FieldValue::Int32Array)
        }
        ScalarKind::Float => {
            let values = parse_all(tokens, |t| t.parse::<f32>().ok(), bad)?;
            wrap(single, values, FieldValue::Float, FieldValue::FloatArray)
        }
        ScalarKind::Double => {
            let values = parse_all(tokens, |t| t.parse::<f64>().ok(), bad)?;
            wrap(single, values, FieldValue::Double, FieldValue::DoubleArray)
        }
        ScalarKind::Long => {
            let values = parse_all(tokens, |t| t.parse::<i64>().ok(), bad)?;
            wrap(single, values, FieldValue::Long, FieldValue::LongArray)
        }
        ScalarKind::String | ScalarKind::Node => {
            return Err(ProtoError::invalid_value(
                decl.name(),
                field_type,
                "not a numeric field",
            ))
        }
    };
    Ok(value)
}

fn parse_all<T>(
    tokens: &[&str],
    parse: impl Fn(&str) -> Option<T>,
    bad: impl Fn(&str) -> ProtoError,
) -> Result<Vec<T>> {
    tokens
        .iter()
        .map(|t| parse(t).ok_or_else(|| bad(t)))
        .collect()
}

fn wrap<T>(
    single: bool,
    mut values: Vec<T>,
    one: fn(T) -> FieldValue,
    many: fn(Vec<T>) -> FieldValue,
) -> FieldValue {
    match values.pop() {
        Some(v) if single => one(v),
        Some(v) => {
            values.push(v);
            many(values)
        }
        None => many(values),
    }
}

/// Booleans are accepted in any case.
fn parse_bool(token: &str) -> Option<bool> {
    match token.to_ascii_uppercase().as_str() {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Decimal or `0x` hexadecimal; hex pixels may use the full 32 bits.
fn parse_i32(token: &str) -> Option<i32> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let bits = u32::from_str_radix(hex, 16).ok()?;
        let value = i32::from_ne_bytes(bits.to_ne_bytes());
        return Some(if negative { value.wrapping_neg() } else { value });
    }
    token.parse().ok()
}
