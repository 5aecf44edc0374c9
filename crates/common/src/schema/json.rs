use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Schema, Sensitivity, ANY_SEGMENT, DEFAULT_VARIANT};
use crate::error::Error;
use crate::key::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    Object,
    Array,
    String,
    Integer,
    Number,
    Boolean,
    Null,
}

impl JsonType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonType::Object => value.is_object(),
            JsonType::Array => value.is_array(),
            JsonType::String => value.is_string(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Number => value.is_number(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Null => value.is_null(),
        }
    }

    fn is_scalar(&self) -> bool {
        !matches!(self, JsonType::Object | JsonType::Array)
    }
}

/// `additionalProperties`: either allowed/forbidden, or a schema for extra members
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Additional {
    Allowed(bool),
    Schema(Box<JsonNode>),
}

/// The subset of JSON Schema the engine understands.
///
/// A node without `type` accepts any value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<JsonType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, JsonNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(
        rename = "additionalProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Additional>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonNode>>,
    #[serde(
        rename = "x-sensitivity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sensitivity: Option<Sensitivity>,
}

impl JsonNode {
    fn child(&self, segment: &str, at: &str) -> Result<JsonNode, Error> {
        match self.kind {
            Some(kind) if kind.is_scalar() => Err(Error::NotSelectable(at.to_string())),
            Some(JsonType::Array) => match &self.items {
                _ if segment.parse::<usize>().is_err() => Err(Error::NotFound(at.to_string())),
                Some(items) => Ok((**items).clone()),
                None => Ok(JsonNode::default()),
            },
            _ => {
                if let Some(property) = self.properties.get(segment) {
                    return Ok(property.clone());
                }
                match &self.additional_properties {
                    Some(Additional::Schema(schema)) => Ok((**schema).clone()),
                    Some(Additional::Allowed(false)) => Err(Error::NotFound(at.to_string())),
                    _ => Ok(JsonNode::default()),
                }
            }
        }
    }

    pub fn resolve(&self, path: &[String]) -> Result<JsonNode, Error> {
        let mut node = self.clone();
        for (i, segment) in path.iter().enumerate() {
            node = node.child(segment, &path[..=i].join("/"))?;
        }
        Ok(node)
    }

    pub fn check(&self, value: &Value, at: &str) -> Result<(), String> {
        if let Some(kind) = self.kind {
            if !kind.matches(value) {
                return Err(format!("{}: expected {:?}", display_path(at), kind));
            }
        }

        if let Value::Object(members) = value {
            for required in &self.required {
                if !members.contains_key(required) {
                    return Err(format!(
                        "{}: missing required member {}",
                        display_path(at),
                        required
                    ));
                }
            }
            for (name, member) in members {
                let member_at = format!("{}/{}", at, name);
                match self.properties.get(name) {
                    Some(schema) => schema.check(member, &member_at)?,
                    None => match &self.additional_properties {
                        Some(Additional::Allowed(false)) => {
                            return Err(format!("{}: unexpected member", member_at))
                        }
                        Some(Additional::Schema(schema)) => schema.check(member, &member_at)?,
                        _ => {}
                    },
                }
            }
        }

        if let (Value::Array(elements), Some(items)) = (value, &self.items) {
            for (i, element) in elements.iter().enumerate() {
                items.check(element, &format!("{}/{}", at, i))?;
            }
        }

        Ok(())
    }

    fn collect_sensitivities(
        &self,
        at: &mut Vec<String>,
        out: &mut Vec<(Vec<String>, Sensitivity)>,
    ) {
        if let Some(sensitivity) = self.sensitivity {
            out.push((at.clone(), sensitivity));
        }
        for (name, property) in &self.properties {
            at.push(name.clone());
            property.collect_sensitivities(at, out);
            at.pop();
        }
        let any = match (&self.additional_properties, &self.items) {
            (Some(Additional::Schema(schema)), _) => Some(schema),
            (_, Some(items)) => Some(items),
            _ => None,
        };
        if let Some(any) = any {
            at.push(ANY_SEGMENT.to_string());
            any.collect_sensitivities(at, out);
            at.pop();
        }
    }
}

fn display_path(at: &str) -> &str {
    if at.is_empty() {
        "/"
    } else {
        at
    }
}

fn default_variant() -> String {
    DEFAULT_VARIANT.to_string()
}

/// A structural JSON schema with a variant name and version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default)]
    pub version: Version,
    pub schema: JsonNode,
}

impl JsonSchema {
    pub fn new(variant: impl Into<String>, version: Version, schema: JsonNode) -> Self {
        Self {
            variant: variant.into(),
            version,
            schema,
        }
    }

    /// A schema accepting anything, at the default variant
    pub fn permissive() -> Self {
        Self::new(DEFAULT_VARIANT, Version::unspecified(), JsonNode::default())
    }

    pub fn from_value(value: Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }
}

impl Schema for JsonSchema {
    fn variant(&self) -> &str {
        &self.variant
    }

    fn version(&self) -> &Version {
        &self.version
    }

    fn validate(&self, path: &[String], value: &Value) -> Result<(), Error> {
        self.schema
            .resolve(path)?
            .check(value, &path.join("/"))
            .map_err(Error::Validation)
    }

    fn subschema(&self, path: &[String]) -> Result<Box<dyn Schema>, Error> {
        Ok(Box::new(JsonSchema {
            variant: self.variant.clone(),
            version: self.version.clone(),
            schema: self.schema.resolve(path)?,
        }))
    }

    fn sensitivities(&self) -> Vec<(Vec<String>, Sensitivity)> {
        let mut out = Vec::new();
        self.schema.collect_sensitivities(&mut Vec::new(), &mut out);
        out
    }

    fn document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn person() -> JsonSchema {
        JsonSchema::from_value(json!({
            "version": "1.0",
            "schema": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "x-sensitivity": "eid"},
                    "age": {"type": "integer", "x-sensitivity": "qid"},
                    "visits": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {"date": {"type": "string", "x-sensitivity": "qid"}}
                        }
                    }
                },
                "required": ["name"],
                "additionalProperties": false
            }
        }))
        .unwrap()
    }

    fn path(p: &str) -> Vec<String> {
        p.split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_validate_root() {
        let schema = person();
        assert_eq!(schema.variant(), DEFAULT_VARIANT);
        assert!(schema.validate(&[], &json!({"name": "ann", "age": 3})).is_ok());
        assert!(matches!(
            schema.validate(&[], &json!({"age": 3})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            schema.validate(&[], &json!({"name": "ann", "extra": 1})),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            schema.validate(&[], &json!({"name": 7})),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_validate_sub_path() {
        let schema = person();
        assert!(schema.validate(&path("age"), &json!(41)).is_ok());
        assert!(schema.validate(&path("age"), &json!("41")).is_err());
        assert!(schema
            .validate(&path("visits/0"), &json!({"date": "2024-01-01"}))
            .is_ok());
    }

    #[test]
    fn test_subschema_errors() {
        let schema = person();
        assert!(matches!(
            schema.subschema(&path("unknown")),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            schema.subschema(&path("name/first")),
            Err(Error::NotSelectable(_))
        ));
        assert!(matches!(
            schema.subschema(&path("visits/first")),
            Err(Error::NotFound(_))
        ));
        assert!(schema.subschema(&path("visits/3/date")).is_ok());
    }

    #[test]
    fn test_sensitivities() {
        let found = person().sensitivities();
        assert!(found.contains(&(path("name"), Sensitivity::Eid)));
        assert!(found.contains(&(path("age"), Sensitivity::Qid)));
        assert!(found.contains(&(path("visits/*/date"), Sensitivity::Qid)));

        let visits = person().subschema(&path("visits")).unwrap().sensitivities();
        assert_eq!(visits, vec![(path("*/date"), Sensitivity::Qid)]);
    }

    #[test]
    fn test_permissive_accepts_anything() {
        let schema = JsonSchema::permissive();
        assert!(schema.validate(&path("a/b/c"), &json!([1, "x"])).is_ok());
        assert!(schema.sensitivities().is_empty());
    }

    #[test]
    fn test_document_round_trip() {
        let schema = person();
        assert_eq!(JsonSchema::from_value(schema.document()).unwrap(), schema);
    }
}
