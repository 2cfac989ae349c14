//! Action Manager: registry, ID provider, decorators, persistent flag group
//! (spec §4.6).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use serde_json::Value;

use crate::action::manifest::Parameter;
use crate::action::Action;
use crate::error::{Error, Result};
use crate::schema::Schema;

/// Derives a stable ID from an action's filesystem path (relative to the
/// discovery root).
pub trait IdProvider: Send + Sync {
    fn id_for(&self, rel_dir: &Path) -> String;
}

/// Splits on the rightmost `/actions/`; prefix and suffix are each
/// dot-joined, joined by `:` (spec §4.7).
pub struct DefaultIdProvider;

impl IdProvider for DefaultIdProvider {
    fn id_for(&self, rel_dir: &Path) -> String {
        let s = rel_dir.to_string_lossy().replace('\\', "/");
        let marker = "/actions/";
        let anchored = if s.starts_with("actions/") {
            format!("/{s}")
        } else {
            s.clone()
        };
        match anchored.rfind(marker) {
            Some(idx) => {
                let prefix = &anchored[..idx];
                let suffix = &anchored[idx + marker.len()..];
                let dot = |part: &str| -> String {
                    part.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join(".")
                };
                let prefix_dot = dot(prefix);
                let suffix_dot = dot(suffix);
                if prefix_dot.is_empty() {
                    suffix_dot
                } else {
                    format!("{prefix_dot}:{suffix_dot}")
                }
            }
            None => s.split('/').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("."),
        }
    }
}

/// Composes the default provider with `actions_naming` literal-substring
/// rewrites (spec §6, §8 S6), applied in list order after the base ID.
pub struct ConfiguredIdProvider {
    base: Box<dyn IdProvider>,
    rules: Vec<crate::config::NamingRule>,
}

impl ConfiguredIdProvider {
    pub fn new(base: Box<dyn IdProvider>, rules: Vec<crate::config::NamingRule>) -> Self {
        Self { base, rules }
    }
}

impl IdProvider for ConfiguredIdProvider {
    fn id_for(&self, rel_dir: &Path) -> String {
        let mut id = self.base.id_for(rel_dir);
        for rule in &self.rules {
            id = id.replace(&rule.search, &rule.replace);
        }
        id
    }
}

pub type Decorator = Arc<dyn Fn(&Action) -> Result<()> + Send + Sync>;

/// A discovery/load failure kept reachable under its would-be action ID, so
/// invoking it surfaces the stored error and exit code instead of the
/// action simply vanishing from the command tree (spec §7 propagation
/// policy).
#[derive(Debug, Clone)]
pub struct BrokenAction {
    pub path: String,
    pub error: String,
    pub exit_code: i32,
}

/// Named bucket of globally-available parameter definitions plus current
/// values, contributing to every action's input validation (spec §4.6).
pub struct FlagGroup {
    name: String,
    parameters: IndexMap<String, Parameter>,
    values: IndexMap<String, Value>,
}

impl FlagGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: IndexMap::new(),
            values: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Panics on a duplicate name — a programmer error (spec §4.6).
    pub fn add_definition(&mut self, param: Parameter) {
        if self.parameters.contains_key(&param.name) {
            panic!("persistent flag {:?} already registered", param.name);
        }
        if let Some(default) = param.default.clone() {
            self.values.insert(param.name.clone(), default);
        }
        self.parameters.insert(param.name.clone(), param);
    }

    pub fn set_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    pub fn json_schema(&self) -> Value {
        Schema::from_parameters(self.parameters.values()).to_json()
    }

    pub fn validate_flags(&self, input: &IndexMap<String, Value>) -> Result<()> {
        Schema::from_parameters(self.parameters.values()).validate_map(input)
    }
}

pub struct Manager {
    actions: Mutex<IndexMap<String, Arc<Action>>>,
    /// Each registered action's discovery-relative directory, kept so
    /// `set_id_provider` can re-derive every ID.
    rel_dirs: Mutex<IndexMap<String, std::path::PathBuf>>,
    id_provider: Mutex<Arc<dyn IdProvider>>,
    decorators: Mutex<Vec<Decorator>>,
    persistent_flags: Mutex<FlagGroup>,
    broken: Mutex<IndexMap<String, BrokenAction>>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            actions: Mutex::new(IndexMap::new()),
            rel_dirs: Mutex::new(IndexMap::new()),
            id_provider: Mutex::new(Arc::new(DefaultIdProvider)),
            decorators: Mutex::new(Vec::new()),
            persistent_flags: Mutex::new(FlagGroup::new("persistent")),
            broken: Mutex::new(IndexMap::new()),
        }
    }

    /// Registers a broken-action marker under `id`, overwriting any
    /// previous entry with the same ID.
    pub fn add_broken(&self, id: String, broken: BrokenAction) {
        self.broken.lock().expect("broken poisoned").insert(id, broken);
    }

    pub fn broken(&self, id: &str) -> Option<BrokenAction> {
        self.broken.lock().expect("broken poisoned").get(id).cloned()
    }

    pub fn all_broken(&self) -> Vec<(String, BrokenAction)> {
        self.broken.lock().expect("broken poisoned").iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn id_provider(&self) -> Arc<dyn IdProvider> {
        self.id_provider.lock().expect("id_provider poisoned").clone()
    }

    /// Inserts a newly-discovered action keyed by its current ID.
    /// `rel_dir` is the directory the ID was derived from, relative to the
    /// discovery root, so a later `set_id_provider` can recompute it.
    pub fn add(&self, action: Arc<Action>, rel_dir: std::path::PathBuf) -> Result<()> {
        let id = action.id();
        let mut actions = self.actions.lock().expect("actions poisoned");
        if actions.contains_key(&id) {
            return Err(Error::DuplicateAction(id));
        }
        self.rel_dirs.lock().expect("rel_dirs poisoned").insert(id.clone(), rel_dir);
        actions.insert(id, action);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<Action>> {
        self.actions.lock().expect("actions poisoned").get(id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Action>> {
        self.actions.lock().expect("actions poisoned").values().cloned().collect()
    }

    /// Replaces the ID provider and re-keys every already-registered action.
    pub fn set_id_provider(&self, provider: Arc<dyn IdProvider>) {
        let mut actions = self.actions.lock().expect("actions poisoned");
        let rel_dirs = self.rel_dirs.lock().expect("rel_dirs poisoned");
        let mut rekeyed = IndexMap::new();
        let mut new_rel_dirs = IndexMap::new();
        for (old_id, action) in actions.drain(..) {
            let rel_dir = rel_dirs.get(&old_id).cloned().unwrap_or_default();
            let new_id = provider.id_for(&rel_dir);
            action.set_id(new_id.clone());
            rekeyed.insert(new_id.clone(), action);
            new_rel_dirs.insert(new_id, rel_dir);
        }
        *actions = rekeyed;
        drop(rel_dirs);
        *self.rel_dirs.lock().expect("rel_dirs poisoned") = new_rel_dirs;
        *self.id_provider.lock().expect("id_provider poisoned") = provider;
    }

    pub fn add_decorators(&self, fns: impl IntoIterator<Item = Decorator>) {
        self.decorators.lock().expect("decorators poisoned").extend(fns);
    }

    /// Runs every decorator exactly once against `action`, in registration
    /// order (spec §4.6: "after the runtime is chosen and input is
    /// validated").
    pub fn run_decorators(&self, action: &Action) -> Result<()> {
        let decorators = self.decorators.lock().expect("decorators poisoned").clone();
        for d in decorators {
            d(action)?;
        }
        Ok(())
    }

    pub fn persistent_flags(&self) -> MutexGuard<'_, FlagGroup> {
        self.persistent_flags.lock().expect("persistent_flags poisoned")
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn id_provider_table() {
        let p = DefaultIdProvider;
        assert_eq!(p.id_for(Path::new("path/to/my/actions/verb")), "path.to.my:verb");
        assert_eq!(p.id_for(Path::new("actions/verb")), "verb");
        assert_eq!(p.id_for(Path::new("1/2/3/actions/4/5/6")), "1.2.3:4.5.6");
    }

    #[test]
    fn configured_provider_applies_naming_rewrite_in_order() {
        let base = Box::new(DefaultIdProvider);
        let rules = vec![crate::config::NamingRule {
            search: ".".to_string(),
            replace: "/".to_string(),
        }];
        let p = ConfiguredIdProvider::new(base, rules);
        assert_eq!(p.id_for(Path::new("a/b/actions/x")), "a/b:x");
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let manager = Manager::new();
        let a1 = Arc::new(Action::new(
            "dup".into(),
            PathBuf::from("/a/action.yaml"),
            PathBuf::from("/a"),
            PathBuf::from("/"),
            b"action: {title: T}\nruntime: {type: shell, command: [echo]}\n".to_vec(),
        ));
        let a2 = Arc::new(Action::new(
            "dup".into(),
            PathBuf::from("/b/action.yaml"),
            PathBuf::from("/b"),
            PathBuf::from("/"),
            b"action: {title: T}\nruntime: {type: shell, command: [echo]}\n".to_vec(),
        ));
        manager.add(a1, PathBuf::from("a")).unwrap();
        assert!(manager.add(a2, PathBuf::from("b")).is_err());
    }

    #[test]
    fn broken_action_is_reachable_by_id() {
        let manager = Manager::new();
        assert!(manager.broken("too-new").is_none());
        manager.add_broken(
            "too-new".into(),
            BrokenAction { path: "/a/action.yaml".into(), error: "unsupported version \"2\"".into(), exit_code: 125 },
        );
        let broken = manager.broken("too-new").expect("just registered");
        assert_eq!(broken.exit_code, 125);
        assert_eq!(manager.all_broken().len(), 1);
    }

    #[test]
    #[should_panic]
    fn flag_group_panics_on_duplicate_definition() {
        let mut group = FlagGroup::new("persistent");
        let param = Parameter {
            name: "quiet".into(),
            title: None,
            description: None,
            param_type: crate::action::manifest::ParamType::Boolean,
            required: false,
            default: None,
            enum_values: None,
        };
        group.add_definition(param.clone());
        group.add_definition(param);
    }
}
