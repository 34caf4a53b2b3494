//! Schemas of the provider block, the resource, and the data source

use serde_json::json;

/// Attribute type, encoded as cty type JSON on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    String,
    Number,
}

impl AttributeType {
    pub fn cty_json(&self) -> Vec<u8> {
        let ty = match self {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
        };
        ty.to_string().into_bytes()
    }
}

/// A list of objects declared as a nested attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedList {
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    Primitive(AttributeType),
    NestedList(NestedList),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
}

impl Attribute {
    fn new(name: &str, kind: AttributeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: String::new(),
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, AttributeKind::Primitive(AttributeType::String))
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, AttributeKind::Primitive(AttributeType::Number))
    }

    pub fn nested_list(name: &str, attributes: Vec<Attribute>) -> Self {
        Self::new(name, AttributeKind::NestedList(NestedList { attributes }))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// Schema of a provider block, resource, or data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub version: i64,
    pub description: String,
    pub attributes: Vec<Attribute>,
}

impl Schema {
    pub fn new(description: &str, attributes: Vec<Attribute>) -> Self {
        Self {
            version: 0,
            description: description.to_string(),
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.name.as_str())
    }
}

/// Provider block: connection settings
pub fn provider_schema() -> Schema {
    Schema::new(
        "Manages Cloud SQL audit log rules stored in the mysql schema",
        vec![
            Attribute::string("endpoint")
                .required()
                .description("Database endpoint, host:port"),
            Attribute::string("username").required(),
            Attribute::string("password")
                .optional()
                .sensitive()
                .description("May be empty, e.g. behind cloud-sql-proxy"),
            Attribute::string("engine")
                .required()
                .description("Database engine: mysql or postgresql (not implemented)"),
            Attribute::string("tls").optional().description(
                "TLS mode: false, true, skip-verify, preferred, or a TLS profile name",
            ),
        ],
    )
}

/// Attribute names of the five rule fields
pub const RULE_FIELDS: [&str; 5] = ["username", "dbname", "object", "operation", "op_result"];

pub fn audit_log_rule_schema() -> Schema {
    let mut attributes = vec![Attribute::string("id")
        .computed()
        .description("Rule id assigned by the database")];
    attributes.extend(
        RULE_FIELDS
            .into_iter()
            .map(|name| Attribute::string(name).required()),
    );
    Schema::new("An audit log rule", attributes)
}

pub fn audit_log_rules_schema() -> Schema {
    let mut element = vec![Attribute::number("id").computed()];
    element.extend(
        RULE_FIELDS
            .into_iter()
            .map(|name| Attribute::string(name).computed()),
    );
    Schema::new(
        "All audit log rules",
        vec![Attribute::nested_list("audit_log_rules", element).computed()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cty_json() {
        assert_eq!(AttributeType::String.cty_json(), b"\"string\"".to_vec());
        assert_eq!(AttributeType::Number.cty_json(), b"\"number\"".to_vec());
    }

    #[test]
    fn test_provider_schema() {
        let schema = provider_schema();
        assert!(schema.attribute("endpoint").unwrap().required);
        assert!(schema.attribute("password").unwrap().sensitive);
        assert!(schema.attribute("password").unwrap().optional);
        assert!(schema.attribute("tls").unwrap().optional);
        assert!(schema.attribute("engine").unwrap().required);
    }

    #[test]
    fn test_resource_schema() {
        let schema = audit_log_rule_schema();
        let names: Vec<&str> = schema.attribute_names().collect();
        assert_eq!(
            names,
            vec!["id", "username", "dbname", "object", "operation", "op_result"]
        );
        let id = schema.attribute("id").unwrap();
        assert!(id.computed && !id.required);
        assert!(schema.attribute("op_result").unwrap().required);
    }

    #[test]
    fn test_data_source_schema() {
        let schema = audit_log_rules_schema();
        let list = schema.attribute("audit_log_rules").unwrap();
        assert!(list.computed);
        match &list.kind {
            AttributeKind::NestedList(nested) => {
                assert_eq!(nested.attributes.len(), 6);
                assert_eq!(
                    nested.attributes[0].kind,
                    AttributeKind::Primitive(AttributeType::Number)
                );
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }
}
