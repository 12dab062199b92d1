//! Schema and function-declaration types shared by the LLM gateway and the
//! tool registry.
//!
//! A [`Schema`] is a recursive, tagged-variant description of a JSON-shaped
//! value — the same shape used both to describe a tool's parameters and its
//! structured response. It intentionally mirrors the JSON Schema subset most
//! LLM function-calling APIs accept, not the full specification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The primitive kind a [`Schema`] node describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

/// Recursive description of a JSON-shaped value.
///
/// # Examples
///
/// ```
/// use chainforge::schema::{Schema, SchemaType};
///
/// let path = Schema::new(SchemaType::String, "relative file path")
///     .with_min_length(1);
/// assert_eq!(path.schema_type, SchemaType::String);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub schema_type: SchemaType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Present when `schema_type == Object`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, Schema>,
    /// Present when `schema_type == Array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
}

impl Schema {
    pub fn new(schema_type: SchemaType, description: impl Into<String>) -> Self {
        Self {
            schema_type,
            description: description.into(),
            min_length: None,
            max_length: None,
            min_items: None,
            max_items: None,
            min_value: None,
            max_value: None,
            pattern: None,
            enum_values: Vec::new(),
            required: Vec::new(),
            properties: HashMap::new(),
            items: None,
        }
    }

    pub fn with_min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn with_max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_enum(mut self, values: Vec<String>) -> Self {
        self.enum_values = values;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn with_required(mut self, names: Vec<String>) -> Self {
        self.required = names;
        self
    }

    pub fn with_min_value(mut self, n: f64) -> Self {
        self.min_value = Some(n);
        self
    }

    pub fn with_max_value(mut self, n: f64) -> Self {
        self.max_value = Some(n);
        self
    }

    pub fn with_items(mut self, item_schema: Schema) -> Self {
        self.items = Some(Box::new(item_schema));
        self
    }

    /// Validate a JSON value against this schema's type and constraints.
    /// This is a shallow structural check, not a full JSON Schema validator.
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        match (self.schema_type, value) {
            (SchemaType::String, serde_json::Value::String(s)) => {
                if let Some(min) = self.min_length {
                    if s.len() < min {
                        return Err(format!("string shorter than min_length {}", min));
                    }
                }
                if let Some(max) = self.max_length {
                    if s.len() > max {
                        return Err(format!("string longer than max_length {}", max));
                    }
                }
                if !self.enum_values.is_empty() && !self.enum_values.contains(s) {
                    return Err(format!("value {:?} not in enum {:?}", s, self.enum_values));
                }
                Ok(())
            }
            (SchemaType::Integer, serde_json::Value::Number(n)) => {
                if n.as_i64().is_none() && n.as_u64().is_none() {
                    return Err(format!("expected integer, got {}", n));
                }
                self.validate_numeric_bounds(n.as_f64().unwrap_or_default())
            }
            (SchemaType::Number, serde_json::Value::Number(n)) => {
                self.validate_numeric_bounds(n.as_f64().unwrap_or_default())
            }
            (SchemaType::Boolean, serde_json::Value::Bool(_)) => Ok(()),
            (SchemaType::Array, serde_json::Value::Array(items)) => {
                if let Some(min) = self.min_items {
                    if items.len() < min {
                        return Err(format!("array shorter than min_items {}", min));
                    }
                }
                if let Some(max) = self.max_items {
                    if items.len() > max {
                        return Err(format!("array longer than max_items {}", max));
                    }
                }
                Ok(())
            }
            (SchemaType::Object, serde_json::Value::Object(map)) => {
                for key in &self.required {
                    if !map.contains_key(key) {
                        return Err(format!("missing required property {:?}", key));
                    }
                }
                for (name, property_schema) in &self.properties {
                    if let Some(value) = map.get(name) {
                        property_schema
                            .validate(value)
                            .map_err(|e| format!("property {:?}: {}", name, e))?;
                    }
                }
                Ok(())
            }
            (expected, got) => Err(format!("expected {:?}, got {}", expected, got)),
        }
    }

    fn validate_numeric_bounds(&self, n: f64) -> Result<(), String> {
        if let Some(min) = self.min_value {
            if n < min {
                return Err(format!("value {} below min_value {}", n, min));
            }
        }
        if let Some(max) = self.max_value {
            if n > max {
                return Err(format!("value {} above max_value {}", n, max));
            }
        }
        Ok(())
    }
}

/// A `(key, value)` string pair used to parameterize prompt rendering.
/// Attr lists and string maps are interconvertible; order is not significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

impl Attr {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn list_to_map(attrs: &[Attr]) -> HashMap<String, String> {
        attrs
            .iter()
            .map(|a| (a.key.clone(), a.value.clone()))
            .collect()
    }

    pub fn map_to_list(map: &HashMap<String, String>) -> Vec<Attr> {
        map.iter()
            .map(|(k, v)| Attr::new(k.clone(), v.clone()))
            .collect()
    }
}

/// A named, schema-typed function exposed to the LLM for function calling.
/// Unique by name within a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Schema,
    pub response: Schema,
}

impl FunctionDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Schema,
        response: Schema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_list_map_round_trip() {
        let attrs = vec![Attr::new("a", "1"), Attr::new("b", "2")];
        let map = Attr::list_to_map(&attrs);
        assert_eq!(map.get("a"), Some(&"1".to_string()));
        let back = Attr::map_to_list(&map);
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn schema_validates_required_object_properties() {
        let schema = Schema::new(SchemaType::Object, "request")
            .with_required(vec!["path".to_string()])
            .with_property(
                "path",
                Schema::new(SchemaType::String, "file path").with_min_length(1),
            );
        let ok = serde_json::json!({"path": "a.txt"});
        assert!(schema.validate(&ok).is_ok());
        let missing = serde_json::json!({});
        assert!(schema.validate(&missing).is_err());
    }

    #[test]
    fn schema_rejects_wrong_type() {
        let schema = Schema::new(SchemaType::String, "x");
        assert!(schema.validate(&serde_json::json!(42)).is_err());
    }

    #[test]
    fn object_validation_descends_into_properties() {
        let schema = Schema::new(SchemaType::Object, "request").with_property(
            "name",
            Schema::new(SchemaType::String, "name").with_min_length(1),
        );
        let empty_name = serde_json::json!({"name": ""});
        assert!(schema.validate(&empty_name).is_err());

        let enum_schema = Schema::new(SchemaType::Object, "request").with_property(
            "color",
            Schema::new(SchemaType::String, "color").with_enum(vec!["red".to_string(), "blue".to_string()]),
        );
        let off_list = serde_json::json!({"color": "green"});
        assert!(enum_schema.validate(&off_list).is_err());
        let on_list = serde_json::json!({"color": "red"});
        assert!(enum_schema.validate(&on_list).is_ok());
    }

    #[test]
    fn object_validation_skips_absent_optional_properties() {
        let schema = Schema::new(SchemaType::Object, "request").with_property(
            "name",
            Schema::new(SchemaType::String, "name").with_min_length(1),
        );
        assert!(schema.validate(&serde_json::json!({})).is_ok());
    }

    #[test]
    fn integer_schema_rejects_fractional_numbers() {
        let schema = Schema::new(SchemaType::Integer, "count");
        assert!(schema.validate(&serde_json::json!(3)).is_ok());
        assert!(schema.validate(&serde_json::json!(3.5)).is_err());
    }

    #[test]
    fn numeric_schema_enforces_min_and_max_value() {
        let schema = Schema::new(SchemaType::Number, "ratio")
            .with_min_value(0.0)
            .with_max_value(1.0);
        assert!(schema.validate(&serde_json::json!(0.5)).is_ok());
        assert!(schema.validate(&serde_json::json!(-0.1)).is_err());
        assert!(schema.validate(&serde_json::json!(1.1)).is_err());

        let int_schema = Schema::new(SchemaType::Integer, "count")
            .with_min_value(1.0)
            .with_max_value(10.0);
        assert!(int_schema.validate(&serde_json::json!(0)).is_err());
        assert!(int_schema.validate(&serde_json::json!(11)).is_err());
        assert!(int_schema.validate(&serde_json::json!(5)).is_ok());
    }
}
