// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON-lines event traces and their replay through a [`ProtoBuilder`].

use serde::Deserialize;
use x3d_proto::{AccessType, FieldType, NodeFactory, ProtoBuilder, RawValue};

/// One trace line: an event plus the source position it came from.
#[derive(Debug, Deserialize)]
pub struct TraceLine {
    /// 1-based source line; the trace line number is used when absent.
    #[serde(default)]
    pub line: Option<u32>,
    /// 1-based source column.
    #[serde(default)]
    pub column: Option<u32>,
    /// The event itself.
    #[serde(flatten)]
    pub event: Event,
}

fn default_encoding() -> String {
    "utf8".to_owned()
}

/// Builder events, tagged by `"event"`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    StartDocument {
        #[serde(default)]
        uri: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default = "default_encoding")]
        encoding: String,
        version: String,
    },
    Profile {
        name: String,
    },
    Component {
        component: String,
    },
    Meta {
        key: String,
        value: String,
    },
    StartProtoDecl {
        name: String,
    },
    ProtoFieldDecl {
        access: String,
        field_type: String,
        name: String,
        #[serde(default)]
        default: Option<RawValue>,
    },
    ProtoIsDecl {
        field: String,
    },
    EndProtoDecl,
    StartProtoBody,
    EndProtoBody,
    StartExternProtoDecl {
        name: String,
    },
    EndExternProtoDecl,
    ExternProtoUri {
        uris: Vec<String>,
    },
    StartNode {
        type_name: String,
        #[serde(default)]
        def: Option<String>,
    },
    EndNode,
    StartField {
        name: String,
    },
    FieldValue {
        value: RawValue,
    },
    EndField,
    UseDecl {
        name: String,
    },
    RouteDecl {
        source: String,
        source_field: String,
        destination: String,
        destination_field: String,
    },
    ImportDecl {
        inline: String,
        exported: String,
        local: String,
    },
    ExportDecl {
        local: String,
        exported: String,
    },
    StartScriptDecl,
    EndScriptDecl,
    ScriptFieldDecl {
        access: String,
        field_type: String,
        name: String,
        #[serde(default)]
        default: Option<RawValue>,
    },
    EndDocument,
}

impl Event {
    /// Event name as written in traces.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartDocument { .. } => "start_document",
            Self::Profile { .. } => "profile",
            Self::Component { .. } => "component",
            Self::Meta { .. } => "meta",
            Self::StartProtoDecl { .. } => "start_proto_decl",
            Self::ProtoFieldDecl { .. } => "proto_field_decl",
            Self::ProtoIsDecl { .. } => "proto_is_decl",
            Self::EndProtoDecl => "end_proto_decl",
            Self::StartProtoBody => "start_proto_body",
            Self::EndProtoBody => "end_proto_body",
            Self::StartExternProtoDecl { .. } => "start_extern_proto_decl",
            Self::EndExternProtoDecl => "end_extern_proto_decl",
            Self::ExternProtoUri { .. } => "extern_proto_uri",
            Self::StartNode { .. } => "start_node",
            Self::EndNode => "end_node",
            Self::StartField { .. } => "start_field",
            Self::FieldValue { .. } => "field_value",
            Self::EndField => "end_field",
            Self::UseDecl { .. } => "use_decl",
            Self::RouteDecl { .. } => "route_decl",
            Self::ImportDecl { .. } => "import_decl",
            Self::ExportDecl { .. } => "export_decl",
            Self::StartScriptDecl => "start_script_decl",
            Self::EndScriptDecl => "end_script_decl",
            Self::ScriptFieldDecl { .. } => "script_field_decl",
            Self::EndDocument => "end_document",
        }
    }

    /// Feeds this event to `builder`.
    pub fn apply<F: NodeFactory>(self, builder: &mut ProtoBuilder<F>) -> x3d_proto::Result<()> {
        match self {
            Self::StartDocument {
                uri,
                base_url,
                encoding,
                version,
            } => builder.start_document(uri.as_deref(), base_url.as_deref(), &encoding, &version),
            Self::Profile { name } => builder.profile_decl(&name),
            Self::Component { component } => builder.component_decl(&component),
            Self::Meta { key, value } => builder.meta_decl(&key, &value),
            Self::StartProtoDecl { name } => builder.start_proto_decl(&name),
            Self::ProtoFieldDecl {
                access,
                field_type,
                name,
                default,
            } => builder.proto_field_decl(access.parse()?, field_type.parse()?, &name, default),
            Self::ProtoIsDecl { field } => builder.proto_is_decl(&field),
            Self::EndProtoDecl => builder.end_proto_decl(),
            Self::StartProtoBody => builder.start_proto_body(),
            Self::EndProtoBody => builder.end_proto_body(),
            Self::StartExternProtoDecl { name } => builder.start_extern_proto_decl(&name),
            Self::EndExternProtoDecl => builder.end_extern_proto_decl(),
            Self::ExternProtoUri { uris } => builder.extern_proto_uri(uris.as_slice()),
            Self::StartNode { type_name, def } => builder.start_node(&type_name, def.as_deref()),
            Self::EndNode => builder.end_node(),
            Self::StartField { name } => builder.start_field(&name),
            Self::FieldValue { value } => match value {
                RawValue::Text(text) => builder.field_value(&text),
                RawValue::List(items) => builder.field_values(items.as_slice()),
            },
            Self::EndField => builder.end_field(),
            Self::UseDecl { name } => builder.use_decl(&name),
            Self::RouteDecl {
                source,
                source_field,
                destination,
                destination_field,
            } => builder.route_decl(&source, &source_field, &destination, &destination_field),
            Self::ImportDecl {
                inline,
                exported,
                local,
            } => builder.import_decl(&inline, &exported, &local),
            Self::ExportDecl { local, exported } => builder.export_decl(&local, &exported),
            Self::StartScriptDecl => builder.start_script_decl(),
            Self::EndScriptDecl => builder.end_script_decl(),
            Self::ScriptFieldDecl {
                access,
                field_type,
                name,
                default,
            } => {
                let access: AccessType = access.parse()?;
                let field_type: FieldType = field_type.parse()?;
                builder.script_field_decl(access, field_type, &name, default)
            }
            Self::EndDocument => builder.end_document(),
        }
    }
}
