//! Conversions from provider types to protocol messages

use crate::provider::{Attribute, AttributeKind, Diagnostic, Diagnostics, Schema, Severity};
use crate::server::proto::tfplugin6;
use tfplugin6::attribute_path::{step::Selector, Step};
use tfplugin6::schema::object::NestingMode;

pub fn schema_to_proto(schema: &Schema) -> tfplugin6::Schema {
    tfplugin6::Schema {
        version: schema.version,
        block: Some(tfplugin6::schema::Block {
            version: schema.version,
            attributes: schema.attributes.iter().map(attribute_to_proto).collect(),
            block_types: Vec::new(),
            description: schema.description.clone(),
            description_kind: tfplugin6::StringKind::Plain as i32,
            deprecated: false,
        }),
    }
}

fn attribute_to_proto(attribute: &Attribute) -> tfplugin6::schema::Attribute {
    let (r#type, nested_type) = match &attribute.kind {
        AttributeKind::Primitive(ty) => (ty.cty_json(), None),
        AttributeKind::NestedList(nested) => (
            Vec::new(),
            Some(tfplugin6::schema::Object {
                attributes: nested.attributes.iter().map(attribute_to_proto).collect(),
                nesting: NestingMode::List as i32,
                ..Default::default()
            }),
        ),
    };

    tfplugin6::schema::Attribute {
        name: attribute.name.clone(),
        r#type,
        nested_type,
        description: attribute.description.clone(),
        required: attribute.required,
        optional: attribute.optional,
        computed: attribute.computed,
        sensitive: attribute.sensitive,
        description_kind: tfplugin6::StringKind::Plain as i32,
        deprecated: false,
    }
}

pub fn diagnostic_to_proto(diagnostic: &Diagnostic) -> tfplugin6::Diagnostic {
    let severity = match diagnostic.severity {
        Severity::Error => tfplugin6::diagnostic::Severity::Error,
        Severity::Warning => tfplugin6::diagnostic::Severity::Warning,
    };
    tfplugin6::Diagnostic {
        severity: severity as i32,
        summary: diagnostic.summary.clone(),
        detail: diagnostic.detail.clone(),
        attribute: diagnostic
            .attribute
            .as_ref()
            .map(|name| tfplugin6::AttributePath {
                steps: vec![Step {
                    selector: Some(Selector::AttributeName(name.clone())),
                }],
            }),
    }
}

pub fn diagnostics_to_proto(diagnostics: &Diagnostics) -> Vec<tfplugin6::Diagnostic> {
    diagnostics.iter().map(diagnostic_to_proto).collect()
}
