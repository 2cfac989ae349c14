//! Two-phase loader: raw parse (template-safe), then env-substitute ->
//! template-substitute -> YAML parse -> JSON-schema validate (spec §4.4).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::input::Input;
use super::manifest::ActionManifest;
use crate::error::{Error, Result};

/// Per-invocation data the templating and env-substitution steps need.
pub struct TemplateContext {
    pub input: Input,
    pub cwd: PathBuf,
    pub action_dir: PathBuf,
    pub actions_root: PathBuf,
    /// Template functions merged in by plugins; invoked as `{{ fnname .arg }}`.
    /// Values are rendered by calling the function with the space-joined
    /// string form of every following bare token on the same line — launchr
    /// only needs this for simple formatting helpers, not a general
    /// expression evaluator.
    pub functions: HashMap<String, Arc<dyn Fn(&str) -> String + Send + Sync>>,
}

impl TemplateContext {
    pub fn new(input: Input, cwd: PathBuf, action_dir: PathBuf, actions_root: PathBuf) -> Self {
        Self {
            input,
            cwd,
            action_dir,
            actions_root,
            functions: HashMap::new(),
        }
    }
}

/// Guards the action's file content and raw-definition memoization so
/// parallel loads are safe (spec §4.4 concurrency).
pub struct Loader {
    content: Vec<u8>,
    raw: Mutex<Option<Arc<ActionManifest>>>,
}

static FIELD_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*\.([A-Za-z0-9_-]+)\s*\}\}").expect("static"));
static KEY_POSITION_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*\{\{.*\}\}\s*:").expect("static"));
static FLOW_ARRAY_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\[\]]*\{\{[^\[\]]*\}\}[^\[\]]*\]").expect("static"));
static ENV_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(-([^}]*))?\}").expect("static"));

impl Loader {
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            content,
            raw: Mutex::new(None),
        }
    }

    /// Strips `#` comments that appear outside quoted strings, so a stray
    /// `#` inside a template expression doesn't corrupt YAML parsing.
    fn strip_inline_comments(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let mut in_single = false;
            let mut in_double = false;
            let mut cut_at = None;
            for (i, c) in line.char_indices() {
                match c {
                    '\'' if !in_double => in_single = !in_single,
                    '"' if !in_single => in_double = !in_double,
                    '#' if !in_single && !in_double => {
                        let preceded_by_space =
                            i == 0 || line[..i].ends_with(' ') || line[..i].ends_with('\t');
                        if preceded_by_space {
                            cut_at = Some(i);
                            break;
                        }
                    }
                    _ => {}
                }
            }
            match cut_at {
                Some(i) => {
                    out.push_str(line[..i].trim_end_matches([' ', '\t']));
                    if line.ends_with('\n') {
                        out.push('\n');
                    }
                }
                None => out.push_str(line),
            }
        }
        out
    }

    fn check_template_safety(text: &str) -> Result<()> {
        if KEY_POSITION_TOKEN.is_match(text) {
            return Err(Error::MalformedDefinition {
                path: String::new(),
                message: "unsupported escape: template tokens are not allowed in YAML key position".into(),
            });
        }
        if FLOW_ARRAY_TOKEN.is_match(text) {
            return Err(Error::MalformedDefinition {
                path: String::new(),
                message: "unsupported escape: template tokens are not allowed inside a flow array".into(),
            });
        }
        Ok(())
    }

    fn check_dash_vars(text: &str) -> Result<()> {
        for caps in FIELD_TOKEN.captures_iter(text) {
            let name = &caps[1];
            if name.contains('-') {
                return Err(Error::DashInTemplateVar {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn env_substitute(text: &str, ctx: &TemplateContext) -> String {
        let predefined: HashMap<&str, String> = HashMap::from([
            ("CWD", ctx.cwd.display().to_string()),
            ("ACTION_DIR", ctx.action_dir.display().to_string()),
            ("ACTIONS_ROOT", ctx.actions_root.display().to_string()),
        ]);
        ENV_TOKEN
            .replace_all(text, |caps: &regex::Captures| {
                let name = &caps[1];
                let default = caps.get(3).map(|m| m.as_str());
                if let Ok(v) = std::env::var(name) {
                    v
                } else if let Some(v) = predefined.get(name) {
                    v.clone()
                } else if let Some(default) = default {
                    default.to_string()
                } else {
                    String::new()
                }
            })
            .into_owned()
    }

    fn format_value(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
            // Open question (spec §9): array rendering as bare `{{ .name }}`
            // joins elements with a single space; structured access needs a
            // `range` construct launchr doesn't implement.
            Value::Array(items) => items.iter().map(Self::format_value).collect::<Vec<_>>().join(" "),
            Value::Object(_) => v.to_string(),
        }
    }

    fn template_substitute(text: &str, data: &HashMap<String, Value>) -> (String, Vec<String>) {
        let mut missing = Vec::new();
        let rendered = FIELD_TOKEN
            .replace_all(text, |caps: &regex::Captures| {
                let name = &caps[1];
                match data.get(name) {
                    Some(v) => Self::format_value(v),
                    None => {
                        missing.push(name.to_string());
                        "<no value>".to_string()
                    }
                }
            })
            .into_owned();
        missing.sort();
        missing.dedup();
        (rendered, missing)
    }

    /// Raw YAML parse with template-safe preprocessing, memoized: repeated
    /// calls return the same `Arc` without re-parsing.
    pub fn load_raw(&self) -> Result<Arc<ActionManifest>> {
        let mut guard = self.raw.lock().expect("loader raw mutex poisoned");
        if let Some(cached) = guard.as_ref() {
            return Ok(cached.clone());
        }

        let text = String::from_utf8_lossy(&self.content).into_owned();
        let cleaned = Self::strip_inline_comments(&text);
        Self::check_template_safety(&cleaned)?;

        let manifest: ActionManifest = serde_yaml::from_str(&cleaned).map_err(|e| Error::MalformedDefinition {
            path: String::new(),
            message: e.to_string(),
        })?;
        manifest.validate()?;

        let arc = Arc::new(manifest);
        *guard = Some(arc.clone());
        Ok(arc)
    }

    /// Full pipeline: env-substitute -> template-substitute -> YAML parse ->
    /// JSON-schema validate. Not memoized here; `Action::resolved_manifest`
    /// caches the result once per action.
    pub fn load(&self, ctx: &TemplateContext) -> Result<Arc<ActionManifest>> {
        let text = String::from_utf8_lossy(&self.content).into_owned();
        let cleaned = Self::strip_inline_comments(&text);

        let env_expanded = Self::env_substitute(&cleaned, ctx);
        Self::check_dash_vars(&env_expanded)?;

        let data = ctx.input.template_data();
        let (templated, missing) = Self::template_substitute(&env_expanded, &data);
        if !missing.is_empty() {
            return Err(Error::MissingTemplateVariable { names: missing });
        }

        let manifest: ActionManifest = serde_yaml::from_str(&templated).map_err(|e| Error::MalformedDefinition {
            path: String::new(),
            message: e.to_string(),
        })?;
        manifest.validate()?;

        let schema = crate::schema::Schema::from_parameters(manifest.all_parameters());
        schema.validate_input(&ctx.input)?;

        Ok(Arc::new(manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn ctx(input: Input) -> TemplateContext {
        TemplateContext::new(input, PathBuf::from("/cwd"), PathBuf::from("/cwd/actions/echo"), PathBuf::from("/cwd/actions"))
    }

    fn yaml_action(cmd: &str) -> Vec<u8> {
        format!(
            "action:\n  title: Echo\n  options:\n    - name: NAME\n      default: world\nruntime:\n  type: shell\n  command: [sh, -c, \"{cmd}\"]\n"
        )
        .into_bytes()
    }

    #[test]
    fn load_raw_keeps_templates_literal_and_memoizes() {
        let loader = Loader::new(yaml_action("echo hi {{ .NAME }}"));
        let raw1 = loader.load_raw().unwrap();
        let raw2 = loader.load_raw().unwrap();
        assert!(Arc::ptr_eq(&raw1, &raw2));
        if let crate::action::manifest::RuntimeManifest::Shell(s) = &raw1.runtime {
            assert!(s.command.iter().any(|c| c.contains("{{ .NAME }}")));
        } else {
            panic!("expected shell runtime");
        }
    }

    #[test]
    fn load_replaces_template_with_default() {
        let loader = Loader::new(yaml_action("echo hi {{ .NAME }}"));
        use crate::action::manifest::ActionManifest;
        let raw: Arc<ActionManifest> = loader.load_raw().unwrap();
        let input = Input::bind(&raw, IndexMap::new(), IndexMap::new());
        let resolved = loader.load(&ctx(input)).unwrap();
        if let crate::action::manifest::RuntimeManifest::Shell(s) = &resolved.runtime {
            assert!(s.command.iter().any(|c| c.contains("echo hi world")));
        } else {
            panic!("expected shell runtime");
        }
    }

    #[test]
    fn missing_template_variable_is_reported() {
        let loader = Loader::new(yaml_action("echo {{ .nope }}"));
        let input = Input::default();
        let err = loader.load(&ctx(input)).unwrap_err();
        match err {
            Error::MissingTemplateVariable { names } => assert_eq!(names, vec!["nope".to_string()]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn dash_in_template_var_is_a_targeted_error() {
        let loader = Loader::new(yaml_action("echo {{ .my-opt }}"));
        let input = Input::default();
        let err = loader.load(&ctx(input)).unwrap_err();
        assert!(matches!(err, Error::DashInTemplateVar { name } if name == "my-opt"));
    }

    #[test]
    fn env_expansion_uses_default_when_unset() {
        std::env::remove_var("LAUNCHR_TEST_VAR_UNSET");
        let loader = Loader::new(
            b"action:\n  title: T\nruntime:\n  type: shell\n  command: [sh, -c, \"echo ${LAUNCHR_TEST_VAR_UNSET-/tmp}\"]\n".to_vec(),
        );
        let input = Input::default();
        let resolved = loader.load(&ctx(input)).unwrap();
        if let crate::action::manifest::RuntimeManifest::Shell(s) = &resolved.runtime {
            assert!(s.command.iter().any(|c| c.contains("/tmp")));
        } else {
            panic!("expected shell runtime");
        }
    }

    #[test]
    fn env_expansion_uses_process_env_when_set() {
        std::env::set_var("LAUNCHR_TEST_VAR_SET", "present");
        let loader = Loader::new(
            b"action:\n  title: T\nruntime:\n  type: shell\n  command: [sh, -c, \"echo ${LAUNCHR_TEST_VAR_SET}\"]\n".to_vec(),
        );
        let input = Input::default();
        let resolved = loader.load(&ctx(input)).unwrap();
        if let crate::action::manifest::RuntimeManifest::Shell(s) = &resolved.runtime {
            assert!(s.command.iter().any(|c| c.contains("present")));
        } else {
            panic!("expected shell runtime");
        }
        std::env::remove_var("LAUNCHR_TEST_VAR_SET");
    }

    #[test]
    fn concurrent_loads_observe_identical_results() {
        use std::thread;
        let loader = Arc::new(Loader::new(yaml_action("echo hi {{ .NAME }}")));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = loader.clone();
            handles.push(thread::spawn(move || {
                let raw = loader.load_raw().unwrap();
                let input = Input::bind(&raw, IndexMap::new(), IndexMap::new());
                loader
                    .load(&ctx(input))
                    .unwrap()
                    .as_ref()
                    .version_or_default()
                    .to_string()
            }));
        }
        let results: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| r == "1"));
    }
}
