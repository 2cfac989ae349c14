//! Generates a narrow JSON-Schema-shaped object from an action's parameters
//! and validates a bound input map against it (spec §4.3).

use serde_json::{json, Value};

use crate::action::manifest::{ParamType, Parameter};
use crate::action::Input;
use crate::error::{Error, Result, Violation};

pub struct Schema {
    parameters: Vec<Parameter>,
}

impl Schema {
    pub fn from_parameters<'a>(params: impl Iterator<Item = &'a Parameter>) -> Self {
        Self {
            parameters: params.cloned().collect(),
        }
    }

    /// `{type:object, properties:{name:{type, enum?, default?}, …},
    /// required:[…], additionalProperties:false}`
    pub fn to_json(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let mut prop = serde_json::Map::new();
            prop.insert("type".into(), json!(type_name(p.param_type)));
            if let Some(enum_values) = &p.enum_values {
                prop.insert("enum".into(), json!(enum_values));
            }
            if let Some(default) = &p.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(json!(p.name));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    /// Validates `input`'s bound values and returns every violation found
    /// (not just the first).
    pub fn validate_input(&self, input: &Input) -> Result<()> {
        let mut violations = Vec::new();
        for p in &self.parameters {
            let pointer = format!("/options/{}", p.name);
            match input.get(&p.name) {
                Some(v) => {
                    if let Some(msg) = type_mismatch(p.param_type, v) {
                        violations.push(Violation { pointer: pointer.clone(), message: msg });
                        continue;
                    }
                    if let Some(allowed) = &p.enum_values {
                        if !allowed.contains(v) {
                            violations.push(Violation {
                                pointer,
                                message: format!("value {v} is not one of the allowed enum values"),
                            });
                        }
                    }
                }
                None if p.required => {
                    violations.push(Violation { pointer, message: "required value is missing".into() });
                }
                None => {}
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ValidationFailure { violations })
        }
    }

    /// Validates a raw `name -> Value` map, e.g. the persistent flag group,
    /// which has no [`Input`] wrapper.
    pub fn validate_map(&self, values: &indexmap::IndexMap<String, Value>) -> Result<()> {
        let mut violations = Vec::new();
        for p in &self.parameters {
            let pointer = format!("/options/{}", p.name);
            match values.get(&p.name) {
                Some(v) => {
                    if let Some(msg) = type_mismatch(p.param_type, v) {
                        violations.push(Violation { pointer, message: msg });
                    }
                }
                None if p.required => {
                    violations.push(Violation { pointer, message: "required value is missing".into() });
                }
                None => {}
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Error::ValidationFailure { violations })
        }
    }
}

fn type_name(t: ParamType) -> &'static str {
    match t {
        ParamType::String => "string",
        ParamType::Integer => "integer",
        ParamType::Number => "number",
        ParamType::Boolean => "boolean",
        ParamType::Array => "array",
    }
}

fn type_mismatch(expected: ParamType, v: &Value) -> Option<String> {
    let ok = match expected {
        ParamType::String => v.is_string(),
        ParamType::Integer => v.is_i64() || v.is_u64(),
        ParamType::Number => v.is_number(),
        ParamType::Boolean => v.is_boolean(),
        ParamType::Array => v.is_array(),
    };
    if ok {
        None
    } else {
        Some(format!("expected {} but got {}", type_name(expected), value_kind(v)))
    }
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::manifest::ActionManifest;
    use indexmap::IndexMap;

    fn boolean_option_manifest() -> ActionManifest {
        serde_yaml::from_str(
            r#"
action:
  title: T
  options:
    - name: FLAG
      type: boolean
runtime: { type: shell, command: [echo] }
"#,
        )
        .unwrap()
    }

    #[test]
    fn boolean_option_rejects_string_value() {
        let manifest = boolean_option_manifest();
        let schema = Schema::from_parameters(manifest.all_parameters());
        let mut opts = IndexMap::new();
        opts.insert("FLAG".to_string(), Value::String("yes".into()));
        let input = Input::bind(&manifest, IndexMap::new(), opts);
        let err = schema.validate_input(&input).unwrap_err();
        match err {
            Error::ValidationFailure { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].pointer, "/options/FLAG");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn schema_json_shape() {
        let manifest = boolean_option_manifest();
        let schema = Schema::from_parameters(manifest.all_parameters());
        let json = schema.to_json();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["FLAG"]["type"], "boolean");
        assert_eq!(json["additionalProperties"], false);
    }
}
