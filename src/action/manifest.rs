//! The `action.yaml` shape: parameters, runtime variants, and the version
//! invariant. A single struct serves both the raw (pre-template) and
//! resolved (post-template) forms — see [`crate::action::Definition`].

use std::collections::HashSet;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
}

impl Default for ParamType {
    fn default() -> Self {
        ParamType::String
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Parameter {
    pub name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    pub default: Option<serde_json::Value>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<serde_json::Value>>,
}

impl Parameter {
    pub fn validate_name(&self) -> Result<()> {
        if NAME_RE.is_match(&self.name) {
            Ok(())
        } else {
            Err(Error::MalformedDefinition {
                path: String::new(),
                message: format!(
                    "parameter name {:?} must match ^[A-Za-z][A-Za-z0-9_]*$",
                    self.name
                ),
            })
        }
    }
}

/// Accepts either a map `{K: V}` or a sequence of `K=V` strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvSlice(pub Vec<(String, String)>);

impl EnvSlice {
    pub fn as_kv_strings(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("{k}={v}")).collect()
    }
}

impl<'de> Deserialize<'de> for EnvSlice {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Map(IndexMap<String, String>),
            Seq(Vec<String>),
        }
        let repr = Repr::deserialize(deserializer)?;
        let pairs = match repr {
            Repr::Map(m) => m.into_iter().collect(),
            Repr::Seq(s) => s
                .into_iter()
                .filter_map(|line| {
                    line.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                })
                .collect(),
        };
        Ok(EnvSlice(pairs))
    }
}

/// Accepts a bare string (build context) or a full object.
#[derive(Debug, Clone, Serialize)]
pub struct BuildDefinition {
    pub context: String,
    pub buildfile: Option<String>,
    #[serde(default)]
    pub args: IndexMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl<'de> Deserialize<'de> for BuildDefinition {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bare(String),
            Full {
                context: String,
                #[serde(default)]
                buildfile: Option<String>,
                #[serde(default)]
                args: IndexMap<String, String>,
                #[serde(default)]
                tags: Vec<String>,
            },
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bare(context) => BuildDefinition {
                context,
                buildfile: None,
                args: IndexMap::new(),
                tags: Vec::new(),
            },
            Repr::Full { context, buildfile, args, tags } => BuildDefinition {
                context,
                buildfile,
                args,
                tags,
            },
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VolumeSpec {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContainerRuntimeManifest {
    pub image: Option<String>,
    pub build: Option<BuildDefinition>,
    #[serde(default)]
    pub command: Vec<String>,
    pub entrypoint: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
    #[serde(default)]
    pub env: EnvSlice,
    #[serde(default)]
    pub extra_hosts: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeSpec>,
    pub network_mode: Option<String>,
}

impl ContainerRuntimeManifest {
    pub fn validate(&self) -> Result<()> {
        if self.image.is_none() && self.build.is_none() {
            return Err(Error::MalformedDefinition {
                path: String::new(),
                message: "container action needs a non-empty image or a build context".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ShellRuntimeManifest {
    #[serde(default)]
    pub command: Vec<String>,
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: EnvSlice,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PluginRuntimeManifest {
    /// Opaque function handle, registered by a plugin under this ID.
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuntimeManifest {
    Container(ContainerRuntimeManifest),
    Shell(ShellRuntimeManifest),
    Plugin(PluginRuntimeManifest),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionSection {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<Parameter>,
    #[serde(default)]
    pub options: Vec<Parameter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionManifest {
    #[serde(default)]
    pub version: Option<String>,
    pub action: ActionSection,
    pub runtime: RuntimeManifest,
}

impl ActionManifest {
    pub fn version_or_default(&self) -> &str {
        self.version.as_deref().unwrap_or("1")
    }

    /// Validates the version invariant, argument/option name rules, and the
    /// container-image invariant. Does not validate template content; that
    /// happens during [`crate::action::Loader::load`].
    pub fn validate(&self) -> Result<()> {
        let version = self.version_or_default();
        if version != "1" {
            return Err(Error::UnsupportedVersion {
                version: version.to_string(),
            });
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for param in self.action.arguments.iter().chain(self.action.options.iter()) {
            param.validate_name()?;
            if !seen.insert(param.name.as_str()) {
                return Err(Error::MalformedDefinition {
                    path: String::new(),
                    message: format!("duplicate parameter name {:?}", param.name),
                });
            }
        }

        if let RuntimeManifest::Container(c) = &self.runtime {
            c.validate()?;
        }

        Ok(())
    }

    pub fn all_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.action.arguments.iter().chain(self.action.options.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(yaml: &str) -> Result<ActionManifest> {
        serde_yaml::from_str(yaml).map_err(|e| Error::MalformedDefinition {
            path: String::new(),
            message: e.to_string(),
        })
    }

    #[test]
    fn rejects_unsupported_version() {
        let m = manifest(
            r#"
version: "2"
action: { title: Echo }
runtime: { type: shell, command: [echo, hi] }
"#,
        )
        .unwrap();
        let err = m.validate().unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { version } if version == "2"));
    }

    #[test]
    fn missing_version_defaults_to_one() {
        let m = manifest(
            r#"
action: { title: Echo }
runtime: { type: shell, command: [echo, hi] }
"#,
        )
        .unwrap();
        assert!(m.validate().is_ok());
        assert_eq!(m.version_or_default(), "1");
    }

    #[test]
    fn container_requires_image_or_build() {
        let m = manifest(
            r#"
action: { title: Echo }
runtime: { type: container, command: [ls] }
"#,
        )
        .unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn duplicate_parameter_names_rejected() {
        let m = manifest(
            r#"
action:
  title: Echo
  arguments: [{name: foo}]
  options: [{name: foo}]
runtime: { type: shell, command: [echo, hi] }
"#,
        )
        .unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn env_slice_accepts_map_or_seq() {
        let m = manifest(
            r#"
action: { title: Echo }
runtime: { type: shell, command: [echo], env: { FOO: bar } }
"#,
        )
        .unwrap();
        if let RuntimeManifest::Shell(s) = &m.runtime {
            assert_eq!(s.env.0, vec![("FOO".to_string(), "bar".to_string())]);
        } else {
            panic!("expected shell runtime");
        }

        let m2 = manifest(
            r#"
action: { title: Echo }
runtime: { type: shell, command: [echo], env: ["FOO=bar"] }
"#,
        )
        .unwrap();
        if let RuntimeManifest::Shell(s) = &m2.runtime {
            assert_eq!(s.env.0, vec![("FOO".to_string(), "bar".to_string())]);
        } else {
            panic!("expected shell runtime");
        }
    }

    #[test]
    fn build_definition_accepts_bare_string() {
        let m = manifest(
            r#"
action: { title: Echo }
runtime: { type: container, command: [ls], build: "./ctx" }
"#,
        )
        .unwrap();
        if let RuntimeManifest::Container(c) = &m.runtime {
            assert_eq!(c.build.as_ref().unwrap().context, "./ctx");
        } else {
            panic!("expected container runtime");
        }
    }
}
