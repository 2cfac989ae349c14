//! Bound input: `arg_name -> value` and `option_name -> value`, with a
//! per-parameter "changed" bit so templates can tell explicit user input
//! from a filled-in default.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde_json::Value;

use super::manifest::ActionManifest;

#[derive(Debug, Clone, Default)]
pub struct Input {
    values: IndexMap<String, Value>,
    changed: HashSet<String>,
    pub persistent: IndexMap<String, Value>,
}

impl Input {
    /// Binds raw user-provided arguments/options against a manifest,
    /// filling defaults for anything not explicitly given.
    pub fn bind(
        manifest: &ActionManifest,
        mut user_args: IndexMap<String, Value>,
        mut user_opts: IndexMap<String, Value>,
    ) -> Self {
        let mut values = IndexMap::new();
        let mut changed = HashSet::new();

        for param in manifest.all_parameters() {
            if let Some(v) = user_args.remove(&param.name).or_else(|| user_opts.remove(&param.name)) {
                changed.insert(param.name.clone());
                values.insert(param.name.clone(), v);
            } else if let Some(default) = &param.default {
                values.insert(param.name.clone(), default.clone());
            }
        }

        Self {
            values,
            changed,
            persistent: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn is_arg_changed(&self, name: &str) -> bool {
        self.changed.contains(name)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Template data map: every declared parameter keyed by name, mirrored
    /// with dashes replaced by underscores.
    pub fn template_data(&self) -> HashMap<String, Value> {
        let mut data = HashMap::new();
        for (k, v) in &self.values {
            data.insert(k.clone(), v.clone());
            if k.contains('-') {
                data.insert(k.replace('-', "_"), v.clone());
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::manifest::*;

    fn manifest_with(opt_name: &str, default: Option<Value>) -> ActionManifest {
        ActionManifest {
            version: None,
            action: ActionSection {
                title: "t".into(),
                description: None,
                aliases: vec![],
                arguments: vec![],
                options: vec![Parameter {
                    name: opt_name.into(),
                    title: None,
                    description: None,
                    param_type: ParamType::String,
                    required: false,
                    default,
                    enum_values: None,
                }],
            },
            runtime: RuntimeManifest::Shell(ShellRuntimeManifest::default()),
        }
    }

    #[test]
    fn default_fills_unchanged_value() {
        let m = manifest_with("NAME", Some(Value::String("world".into())));
        let input = Input::bind(&m, IndexMap::new(), IndexMap::new());
        assert_eq!(input.get("NAME"), Some(&Value::String("world".into())));
        assert!(!input.is_arg_changed("NAME"));
    }

    #[test]
    fn explicit_value_marks_changed() {
        let m = manifest_with("NAME", Some(Value::String("world".into())));
        let mut opts = IndexMap::new();
        opts.insert("NAME".to_string(), Value::String("there".into()));
        let input = Input::bind(&m, IndexMap::new(), opts);
        assert_eq!(input.get("NAME"), Some(&Value::String("there".into())));
        assert!(input.is_arg_changed("NAME"));
    }

    #[test]
    fn dash_names_are_mirrored_with_underscores() {
        let m = manifest_with("my-opt", Some(Value::String("v".into())));
        let input = Input::bind(&m, IndexMap::new(), IndexMap::new());
        let data = input.template_data();
        assert_eq!(data.get("my-opt"), Some(&Value::String("v".into())));
        assert_eq!(data.get("my_opt"), Some(&Value::String("v".into())));
    }
}
