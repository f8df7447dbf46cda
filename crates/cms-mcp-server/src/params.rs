//! Typed tool parameters
//!
//! A [`ParamSchema`] is declared once per parameter struct. It checks the raw JSON arguments
//! field by field, collecting every [`Violation`] instead of stopping at the first, and renders
//! the JSON Schema advertised by `tools/list`.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use cms_mcp_protocol::{McpError, McpResult};

/// Name reported for violations that concern the whole arguments object
const ROOT_FIELD: &str = "(arguments)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Joins violations into the `Invalid params` detail string
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    /// Array whose items are all of the given kind
    Array(Box<FieldKind>),
    /// String restricted to a fixed set of values
    Enum(Vec<String>),
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String | FieldKind::Enum(_) => "string",
            FieldKind::Integer => "integer",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Object => "object",
            FieldKind::Array(_) => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            FieldKind::String | FieldKind::Enum(_) => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Number => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array(_) => value.is_array(),
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldKind::Enum(values) => json!({ "type": "string", "enum": values }),
            FieldKind::Array(item) => json!({ "type": "array", "items": item.to_json_schema() }),
            other => json!({ "type": other.type_name() }),
        }
    }
}

/// One named field of a parameter object
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub description: Option<String>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
            min_length: None,
            max_length: None,
            minimum: None,
            maximum: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Object)
    }

    pub fn array(name: impl Into<String>, items: FieldKind) -> Self {
        Self::new(name, FieldKind::Array(Box::new(items)))
    }

    pub fn one_of<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FieldKind::Enum(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Minimum string length or array size
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Maximum string length or array size
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn minimum(mut self, min: impl Into<f64>) -> Self {
        self.minimum = Some(min.into());
        self
    }

    pub fn maximum(mut self, max: impl Into<f64>) -> Self {
        self.maximum = Some(max.into());
        self
    }

    fn check(&self, value: &Value, violations: &mut Vec<Violation>) {
        if !self.kind.matches(value) {
            violations.push(Violation::new(
                &self.name,
                format!("expected {}", self.kind.type_name()),
            ));
            return;
        }

        match (&self.kind, value) {
            (FieldKind::Enum(allowed), Value::String(s)) if !allowed.contains(s) => {
                violations.push(Violation::new(
                    &self.name,
                    format!("must be one of: {}", allowed.join(", ")),
                ));
            }
            (FieldKind::Array(item), Value::Array(items)) => {
                for (index, element) in items.iter().enumerate() {
                    if !item.matches(element) {
                        violations.push(Violation::new(
                            format!("{}[{}]", self.name, index),
                            format!("expected {}", item.type_name()),
                        ));
                    }
                }
            }
            _ => {}
        }

        let length = match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            _ => None,
        };
        if let Some(length) = length {
            if let Some(min) = self.min_length
                && length < min
            {
                violations.push(Violation::new(
                    &self.name,
                    format!("must have at least {} characters or items", min),
                ));
            }
            if let Some(max) = self.max_length
                && length > max
            {
                violations.push(Violation::new(
                    &self.name,
                    format!("must have at most {} characters or items", max),
                ));
            }
        }

        if let Some(n) = value.as_f64() {
            if let Some(min) = self.minimum
                && n < min
            {
                violations.push(Violation::new(&self.name, format!("must be >= {}", min)));
            }
            if let Some(max) = self.maximum
                && n > max
            {
                violations.push(Violation::new(&self.name, format!("must be <= {}", max)));
            }
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = self.kind.to_json_schema();
        if let Some(object) = schema.as_object_mut() {
            if let Some(description) = &self.description {
                object.insert("description".into(), json!(description));
            }
            let (min_key, max_key) = match self.kind {
                FieldKind::Array(_) => ("minItems", "maxItems"),
                _ => ("minLength", "maxLength"),
            };
            if let Some(min) = self.min_length {
                object.insert(min_key.into(), json!(min));
            }
            if let Some(max) = self.max_length {
                object.insert(max_key.into(), json!(max));
            }
            if let Some(min) = self.minimum {
                object.insert("minimum".into(), json!(min));
            }
            if let Some(max) = self.maximum {
                object.insert("maximum".into(), json!(max));
            }
        }
        schema
    }
}

/// Declarative description of a tool's arguments object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    fields: Vec<FieldSchema>,
    deny_unknown: bool,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Reject argument names the schema does not declare
    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Every violation in `args`, in field declaration order
    pub fn validate(&self, args: &Value) -> Vec<Violation> {
        let Some(object) = args.as_object() else {
            return vec![Violation::new(ROOT_FIELD, "expected an object")];
        };

        let mut violations = Vec::new();
        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    violations.push(Violation::new(&field.name, "is required"));
                }
                None | Some(Value::Null) => {}
                Some(value) => field.check(value, &mut violations),
            }
        }

        if self.deny_unknown {
            for key in object.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    violations.push(Violation::new(key, "is not a known parameter"));
                }
            }
        }
        violations
    }

    /// JSON Schema for `tools/list`
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        if self.deny_unknown {
            schema["additionalProperties"] = json!(false);
        }
        schema
    }
}

/// Typed argument struct of a tool
pub trait ToolParams: DeserializeOwned + Send + 'static {
    fn schema() -> ParamSchema;

    /// Cross-field rules the schema cannot express
    fn validate(&self) -> Vec<Violation> {
        Vec::new()
    }
}

/// For tools that take no arguments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoParams {}

impl ToolParams for NoParams {
    fn schema() -> ParamSchema {
        ParamSchema::new()
    }
}

/// Validate raw arguments against `P`'s schema and decode them.
///
/// Missing arguments are treated as an empty object. Any violation becomes
/// [`McpError::InvalidParameters`] carrying every violation found.
pub fn decode_params<P: ToolParams>(args: Option<Value>) -> McpResult<P> {
    let args = match args {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => value,
    };

    let violations = P::schema().validate(&args);
    if !violations.is_empty() {
        return Err(McpError::InvalidParameters(describe(&violations)));
    }

    let params: P = serde_json::from_value(args)
        .map_err(|e| McpError::InvalidParameters(format!("{}: {}", ROOT_FIELD, e)))?;

    let violations = params.validate();
    if !violations.is_empty() {
        return Err(McpError::InvalidParameters(describe(&violations)));
    }
    Ok(params)
}
