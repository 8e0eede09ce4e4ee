//! Method descriptors and the process-wide method registry
//!
//! A [`MethodRegistry`] is assembled once at startup through
//! [`MethodRegistryBuilder`] and is read-only afterwards.

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::Arc,
};

use async_trait::async_trait;
use schemars::{gen::SchemaSettings, JsonSchema};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::errors::AppError;

pub const INITIALIZE_METHOD: &str = "initialize";

/// The work behind a registered method.
#[async_trait]
pub trait Action: Send + Sync {
    async fn call(&self, params: Map<String, Value>) -> Result<Value, AppError>;
}

#[async_trait]
impl<F, Fut> Action for F
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    async fn call(&self, params: Map<String, Value>) -> Result<Value, AppError> {
        (self)(params).await
    }
}

#[derive(Clone)]
pub struct MethodDescriptor {
    name: String,
    description: String,
    parameters: Value,
    required: BTreeSet<String>,
    action: Arc<dyn Action>,
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl MethodDescriptor {
    /// Creates a descriptor that takes no parameters.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        action: impl Action + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: json!({ "type": "object", "properties": {} }),
            required: BTreeSet::new(),
            action: Arc::new(action),
        }
    }

    pub fn with_schema<I, S>(mut self, parameters: Value, required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters;
        self.required = required.into_iter().map(Into::into).collect();
        self
    }

    /// Derives the parameter schema and required list from a parameter type.
    ///
    /// Non-`Option` fields of `P` become required parameters.
    pub fn with_params<P: JsonSchema>(self) -> Self {
        let root = SchemaSettings::draft07()
            .with(|settings| settings.inline_subschemas = true)
            .into_generator()
            .into_root_schema_for::<P>();

        let (properties, required) = match root.schema.object {
            Some(object) => (
                serde_json::to_value(&object.properties).expect("parameter schema serialization"),
                object.required,
            ),
            None => (json!({}), BTreeSet::new()),
        };

        let mut parameters = json!({ "type": "object", "properties": properties });
        if let Some(description) = root
            .schema
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.description.clone())
        {
            parameters["description"] = Value::String(description);
        }

        self.with_schema(parameters, required)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    /// Required parameter names absent or `null` in `params`, in sorted order.
    pub fn missing_params(&self, params: &Map<String, Value>) -> Vec<&str> {
        self.required
            .iter()
            .filter(|name| params.get(name.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect()
    }

    /// Supplied parameters whose value does not match the declared property
    /// type, as `name (expected type)` in sorted order.
    pub fn mistyped_params(&self, params: &Map<String, Value>) -> Vec<String> {
        let Some(properties) = self.parameters.get("properties").and_then(Value::as_object)
        else {
            return Vec::new();
        };

        let mut mistyped: Vec<String> = params
            .iter()
            .filter_map(|(name, value)| {
                let schema = properties.get(name)?;
                (!schema_accepts(schema, value))
                    .then(|| format!("{name} (expected {})", expected_type(schema)))
            })
            .collect();
        mistyped.sort();
        mistyped
    }

    fn capability(&self) -> Value {
        json!({
            "description": self.description,
            "parameters": self.parameters,
            "required": self.required,
        })
    }
}

fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(kind)) => vec![kind.as_str()],
        Some(Value::Array(kinds)) => kinds.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Shallow check of `value` against a property schema's `type`, `minimum`
/// and array `items`. Properties without a declared type accept anything.
fn schema_accepts(schema: &Value, value: &Value) -> bool {
    let types = declared_types(schema);
    if !types.is_empty()
        && !types.iter().any(|kind| match *kind {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            "null" => value.is_null(),
            _ => true,
        })
    {
        return false;
    }

    if let (Some(minimum), Some(number)) = (
        schema.get("minimum").and_then(Value::as_f64),
        value.as_f64(),
    ) {
        if number < minimum {
            return false;
        }
    }

    match (schema.get("items"), value) {
        (Some(items), Value::Array(values)) => values.iter().all(|item| schema_accepts(items, item)),
        _ => true,
    }
}

fn expected_type(schema: &Value) -> String {
    let types: Vec<&str> = declared_types(schema)
        .into_iter()
        .filter(|kind| *kind != "null")
        .collect();
    let base = if types.is_empty() {
        "valid value".to_string()
    } else {
        types.join(" or ")
    };

    match schema.get("items").map(declared_types) {
        Some(items) if base == "array" && !items.is_empty() => {
            format!("array of {}", items.join(" or "))
        }
        _ if schema.get("minimum").is_some() && base == "integer" => {
            "non-negative integer".to_string()
        }
        _ => base,
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("method {0:?} is registered more than once")]
    Duplicate(String),
    #[error("method name {0:?} is reserved")]
    Reserved(String),
    #[error("method name must not be empty")]
    EmptyName,
}

#[derive(Debug, Default)]
pub struct MethodRegistryBuilder {
    methods: BTreeMap<String, MethodDescriptor>,
}

impl MethodRegistryBuilder {
    pub fn register(mut self, descriptor: MethodDescriptor) -> Result<Self, RegistryError> {
        let name = descriptor.name.clone();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if name == INITIALIZE_METHOD {
            return Err(RegistryError::Reserved(name));
        }
        if self.methods.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }

        self.methods.insert(name, descriptor);
        Ok(self)
    }

    pub fn register_all(
        self,
        descriptors: impl IntoIterator<Item = MethodDescriptor>,
    ) -> Result<Self, RegistryError> {
        descriptors
            .into_iter()
            .try_fold(self, |builder, descriptor| builder.register(descriptor))
    }

    pub fn build(self) -> MethodRegistry {
        MethodRegistry {
            methods: self.methods,
        }
    }
}

#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, MethodDescriptor>,
}

impl MethodRegistry {
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Capability map keyed by method name, as advertised by `initialize`.
    pub fn capabilities(&self) -> Value {
        Value::Object(
            self.methods
                .iter()
                .map(|(name, descriptor)| (name.clone(), descriptor.capability()))
                .collect(),
        )
    }
}
