//! Application parameters.
//!
//! A [`ParameterSet`] binds names to leaf [`Value`] nodes. Overrides arrive
//! as JSON, either as one object or as `name=value` assignments, and are
//! applied with [`Value::set`], so they cascade staleness like any other
//! change.

use std::any::{type_name, Any};
use std::fmt;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::eval::{Value, VALUE_OUTPUT};
use crate::graph::NodeRef;

/// A value type that can be used as a parameter.
pub trait ParameterValue:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> ParameterValue for T where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Description of one parameter, as reported by [`ParameterSet::schema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Type-erased access to one parameter.
trait ParameterBinding: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn current(&self) -> serde_json::Value;

    fn description(&self) -> Option<&str>;

    /// Check that `value` parses, without applying it.
    fn check(&self, name: &str, value: &serde_json::Value) -> GraphResult<()>;

    /// Apply `value`. Returns `false` if it equals the current value.
    fn apply(&self, name: &str, value: &serde_json::Value) -> GraphResult<bool>;

    fn node(&self) -> NodeRef;

    fn as_any(&self) -> &dyn Any;
}

struct Parameter<T: ParameterValue> {
    value: Value<T>,
    description: Option<String>,
}

impl<T: ParameterValue> Parameter<T> {
    fn parse(name: &str, value: &serde_json::Value) -> GraphResult<T> {
        serde_json::from_value::<T>(value.clone()).map_err(|e| GraphError::InvalidParameter {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

impl<T: ParameterValue> ParameterBinding for Parameter<T> {
    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn current(&self) -> serde_json::Value {
        serde_json::to_value(self.value.get()).unwrap_or(serde_json::Value::Null)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn check(&self, name: &str, value: &serde_json::Value) -> GraphResult<()> {
        Self::parse(name, value).map(|_| ())
    }

    fn apply(&self, name: &str, value: &serde_json::Value) -> GraphResult<bool> {
        let parsed = Self::parse(name, value)?;
        if parsed == self.value.get() {
            return Ok(false);
        }
        self.value.set(parsed);
        Ok(true)
    }

    fn node(&self) -> NodeRef {
        self.value.node()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Named parameters, in definition order.
#[derive(Default)]
pub struct ParameterSet {
    params: IndexMap<String, Box<dyn ParameterBinding>>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a parameter with its default value.
    ///
    /// Returns the value node; wire its port into the graph.
    pub fn define<T: ParameterValue>(
        &mut self,
        name: impl Into<String>,
        default: T,
    ) -> GraphResult<Value<T>> {
        self.insert(name.into(), default, None)
    }

    pub fn define_with_description<T: ParameterValue>(
        &mut self,
        name: impl Into<String>,
        default: T,
        description: impl Into<String>,
    ) -> GraphResult<Value<T>> {
        self.insert(name.into(), default, Some(description.into()))
    }

    fn insert<T: ParameterValue>(
        &mut self,
        name: String,
        default: T,
        description: Option<String>,
    ) -> GraphResult<Value<T>> {
        if self.params.contains_key(&name) {
            return Err(GraphError::DuplicateParameter { name });
        }
        let value = Value::named(name.clone(), default);
        self.params.insert(
            name,
            Box::new(Parameter {
                value: value.clone(),
                description,
            }),
        );
        Ok(value)
    }

    /// The value node behind `name`.
    pub fn get<T: ParameterValue>(&self, name: &str) -> GraphResult<Value<T>> {
        let binding = self
            .params
            .get(name)
            .ok_or_else(|| GraphError::UnknownParameter(name.to_string()))?;

        binding
            .as_any()
            .downcast_ref::<Parameter<T>>()
            .map(|param| param.value.clone())
            .ok_or_else(|| GraphError::TypeMismatch {
                node: name.to_string(),
                port: VALUE_OUTPUT.to_string(),
                expected: type_name::<T>(),
                actual: binding.type_name(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.params.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Leaf nodes of every parameter.
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.params.values().map(|param| param.node()).collect()
    }

    /// Apply a JSON object of overrides.
    ///
    /// Every entry is checked before any is applied, so a bad override
    /// leaves all parameters untouched. Returns the number of parameters
    /// whose value changed.
    pub fn apply_json(&self, overrides: &serde_json::Value) -> GraphResult<usize> {
        let object = overrides.as_object().ok_or_else(|| {
            GraphError::Config(format!("parameter overrides must be an object, got {overrides}"))
        })?;

        let mut staged = Vec::with_capacity(object.len());
        for (name, value) in object {
            let binding = self
                .params
                .get(name)
                .ok_or_else(|| GraphError::UnknownParameter(name.clone()))?;
            binding.check(name, value)?;
            staged.push((name, binding, value));
        }

        let mut changed = 0;
        for (name, binding, value) in staged {
            if binding.apply(name, value)? {
                debug!(parameter = %name, %value, "parameter overridden");
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Apply overrides from JSON text.
    pub fn apply_str(&self, json: &str) -> GraphResult<usize> {
        let overrides: serde_json::Value =
            serde_json::from_str(json).map_err(|e| GraphError::Config(e.to_string()))?;
        self.apply_json(&overrides)
    }

    /// Apply one `name=value` assignment. The value is read as JSON, falling
    /// back to a plain string, so `label=hello` and `times=3` both work.
    pub fn apply_assignment(&self, assignment: &str) -> GraphResult<bool> {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            GraphError::Config(format!("expected name=value, got '{assignment}'"))
        })?;
        let name = name.trim();
        let value = serde_json::from_str(raw.trim())
            .unwrap_or_else(|_| serde_json::Value::String(raw.trim().to_string()));

        let mut overrides = serde_json::Map::new();
        overrides.insert(name.to_string(), value);
        Ok(self.apply_json(&serde_json::Value::Object(overrides))? > 0)
    }

    /// Names, types and current values of every parameter.
    pub fn schema(&self) -> Vec<ParameterInfo> {
        self.params
            .iter()
            .map(|(name, param)| ParameterInfo {
                name: name.clone(),
                type_name: param.type_name(),
                value: param.current(),
                description: param.description().map(str::to_string),
            })
            .collect()
    }
}

impl fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.params.iter().map(|(name, param)| (name, param.current())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> ParameterSet {
        let mut params = ParameterSet::new();
        params.define("times", 5_u32).unwrap();
        params
            .define_with_description("label", "cube".to_string(), "mesh name")
            .unwrap();
        params
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut params = params();
        let err = params.define("times", 1_u32).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateParameter { ref name } if name == "times"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn get_checks_the_type() {
        let params = params();
        assert_eq!(params.get::<u32>("times").unwrap().get(), 5);
        assert!(matches!(
            params.get::<String>("times"),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert!(matches!(
            params.get::<u32>("scale"),
            Err(GraphError::UnknownParameter(_))
        ));
    }

    #[test]
    fn overrides_skip_equal_values() {
        let params = params();
        let times = params.get::<u32>("times").unwrap();

        assert_eq!(params.apply_json(&json!({ "times": 3, "label": "cube" })).unwrap(), 1);
        assert_eq!(times.get(), 3);
        assert_eq!(times.version(), 1);

        assert_eq!(params.apply_str(r#"{ "times": 3 }"#).unwrap(), 0);
        assert_eq!(times.version(), 1);
    }

    #[test]
    fn bad_override_applies_nothing() {
        let params = params();
        let times = params.get::<u32>("times").unwrap();

        let err = params
            .apply_json(&json!({ "times": 7, "label": 12 }))
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { ref name, .. } if name == "label"));
        assert_eq!(times.get(), 5);

        let err = params.apply_json(&json!({ "scale": 2.0 })).unwrap_err();
        assert!(matches!(err, GraphError::UnknownParameter(ref name) if name == "scale"));

        assert!(matches!(params.apply_json(&json!([1, 2])), Err(GraphError::Config(_))));
    }

    #[test]
    fn assignments_fall_back_to_strings() {
        let params = params();
        assert!(params.apply_assignment("times=8").unwrap());
        assert!(params.apply_assignment("label = sphere").unwrap());
        assert!(!params.apply_assignment("label=sphere").unwrap());

        assert_eq!(params.get::<u32>("times").unwrap().get(), 8);
        assert_eq!(params.get::<String>("label").unwrap().get(), "sphere");
        assert!(matches!(params.apply_assignment("times"), Err(GraphError::Config(_))));
    }

    #[test]
    fn schema_lists_parameters_in_order() {
        let schema = params().schema();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema[0].name, "times");
        assert_eq!(schema[0].type_name, "u32");
        assert_eq!(schema[0].value, json!(5));
        assert_eq!(schema[1].description.as_deref(), Some("mesh name"));

        let encoded = serde_json::to_value(&schema[0]).unwrap();
        assert_eq!(encoded, json!({ "name": "times", "type": "u32", "value": 5 }));
    }
}
