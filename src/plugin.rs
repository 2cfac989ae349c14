//! Plugin architecture: weight-ordered init, typed hooks, and a
//! singleton-per-type service registry (spec §4.11).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::action::Definition;
use crate::error::Result;
use crate::manager::Manager;

/// Static identity of a plugin, used to detect duplicate registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginInfo {
    pub name: &'static str,
}

/// Runs once, after services are registered and before discovery — the
/// hook most plugins use to register persistent flags or decorators.
pub trait OnAppInitPlugin: Send + Sync {
    fn on_app_init(&self, services: &ServiceRegistry) -> Result<()>;
}

/// Contributes additional `clap` subcommands alongside the discovered
/// actions.
pub trait CliPlugin: Send + Sync {
    fn register_commands(&self, app: clap::Command) -> clap::Command;
}

/// Supplies extra action definitions outside the filesystem walk (spec
/// §4.5's "discovery plugin" path — e.g. actions synthesized from a remote
/// registry).
pub trait ActionDiscoveryPlugin: Send + Sync {
    fn discover(&self) -> Result<Vec<Definition>>;
}

/// Observes (and may mutate) the full set of discovered actions before the
/// command tree is built.
pub trait ActionsAlterPlugin: Send + Sync {
    fn alter(&self, manager: &Manager) -> Result<()>;
}

/// Runs immediately before the selected action's runtime executes, after
/// input binding and schema validation.
pub trait PersistentPreRunPlugin: Send + Sync {
    fn pre_run(&self, action: &crate::action::Action) -> Result<()>;
}

/// Hook for the `launchr generate` family of commands, contributing
/// generated file content from live action metadata.
pub trait GeneratePlugin: Send + Sync {
    fn generate(&self, manager: &Manager) -> Result<Vec<(std::path::PathBuf, Vec<u8>)>>;
}

struct RegisteredPlugin {
    info: PluginInfo,
    weight: i32,
    on_app_init: Option<Arc<dyn OnAppInitPlugin>>,
    cli: Option<Arc<dyn CliPlugin>>,
    discovery: Option<Arc<dyn ActionDiscoveryPlugin>>,
    alter: Option<Arc<dyn ActionsAlterPlugin>>,
    pre_run: Option<Arc<dyn PersistentPreRunPlugin>>,
    generate: Option<Arc<dyn GeneratePlugin>>,
}

/// Global plugin registry. Plugins are registered once at startup by
/// `app::run`, ordered by ascending weight, then have their typed hooks
/// invoked in that order.
#[derive(Default)]
pub struct PluginManager {
    plugins: Mutex<Vec<RegisteredPlugin>>,
}

pub struct PluginBuilder {
    info: PluginInfo,
    weight: i32,
    on_app_init: Option<Arc<dyn OnAppInitPlugin>>,
    cli: Option<Arc<dyn CliPlugin>>,
    discovery: Option<Arc<dyn ActionDiscoveryPlugin>>,
    alter: Option<Arc<dyn ActionsAlterPlugin>>,
    pre_run: Option<Arc<dyn PersistentPreRunPlugin>>,
    generate: Option<Arc<dyn GeneratePlugin>>,
}

impl PluginBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            info: PluginInfo { name },
            weight: 0,
            on_app_init: None,
            cli: None,
            discovery: None,
            alter: None,
            pre_run: None,
            generate: None,
        }
    }

    pub fn weight(mut self, weight: i32) -> Self {
        self.weight = weight;
        self
    }

    pub fn on_app_init(mut self, hook: Arc<dyn OnAppInitPlugin>) -> Self {
        self.on_app_init = Some(hook);
        self
    }

    pub fn cli(mut self, hook: Arc<dyn CliPlugin>) -> Self {
        self.cli = Some(hook);
        self
    }

    pub fn discovery(mut self, hook: Arc<dyn ActionDiscoveryPlugin>) -> Self {
        self.discovery = Some(hook);
        self
    }

    pub fn alter(mut self, hook: Arc<dyn ActionsAlterPlugin>) -> Self {
        self.alter = Some(hook);
        self
    }

    pub fn pre_run(mut self, hook: Arc<dyn PersistentPreRunPlugin>) -> Self {
        self.pre_run = Some(hook);
        self
    }

    pub fn generate(mut self, hook: Arc<dyn GeneratePlugin>) -> Self {
        self.generate = Some(hook);
        self
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics on a duplicate `PluginInfo` — two plugins registering under
    /// the same name is a programmer error, caught at startup.
    pub fn register(&self, builder: PluginBuilder) {
        let mut plugins = self.plugins.lock().expect("plugins poisoned");
        if plugins.iter().any(|p| p.info == builder.info) {
            panic!("plugin {:?} already registered", builder.info.name);
        }
        plugins.push(RegisteredPlugin {
            info: builder.info,
            weight: builder.weight,
            on_app_init: builder.on_app_init,
            cli: builder.cli,
            discovery: builder.discovery,
            alter: builder.alter,
            pre_run: builder.pre_run,
            generate: builder.generate,
        });
        plugins.sort_by_key(|p| p.weight);
    }

    pub fn run_on_app_init(&self, services: &ServiceRegistry) -> Result<()> {
        let hooks: Vec<_> = self
            .plugins
            .lock()
            .expect("plugins poisoned")
            .iter()
            .filter_map(|p| p.on_app_init.clone())
            .collect();
        for hook in hooks {
            hook.on_app_init(services)?;
        }
        Ok(())
    }

    pub fn register_commands(&self, mut app: clap::Command) -> clap::Command {
        let hooks: Vec<_> = self.plugins.lock().expect("plugins poisoned").iter().filter_map(|p| p.cli.clone()).collect();
        for hook in hooks {
            app = hook.register_commands(app);
        }
        app
    }

    pub fn run_discovery(&self) -> Result<Vec<Definition>> {
        let hooks: Vec<_> = self.plugins.lock().expect("plugins poisoned").iter().filter_map(|p| p.discovery.clone()).collect();
        let mut found = Vec::new();
        for hook in hooks {
            found.extend(hook.discover()?);
        }
        Ok(found)
    }

    pub fn run_alter(&self, manager: &Manager) -> Result<()> {
        let hooks: Vec<_> = self.plugins.lock().expect("plugins poisoned").iter().filter_map(|p| p.alter.clone()).collect();
        for hook in hooks {
            hook.alter(manager)?;
        }
        Ok(())
    }

    pub fn run_pre_run(&self, action: &crate::action::Action) -> Result<()> {
        let hooks: Vec<_> = self.plugins.lock().expect("plugins poisoned").iter().filter_map(|p| p.pre_run.clone()).collect();
        for hook in hooks {
            hook.pre_run(action)?;
        }
        Ok(())
    }
}

/// Singleton-per-interface-type service lookup, the mechanism plugins use
/// to find the `Manager`, `Config`, `Streams`, and each other.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if a service of this type is already registered.
    pub fn register<T: Any + Send + Sync>(&self, value: Arc<T>) {
        let mut services = self.services.lock().expect("services poisoned");
        let id = TypeId::of::<T>();
        if services.contains_key(&id) {
            panic!("service {} already registered", std::any::type_name::<T>());
        }
        services.insert(id, value);
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let services = self.services.lock().expect("services poisoned");
        services.get(&TypeId::of::<T>()).and_then(|v| v.clone().downcast::<T>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct Recorder(Arc<AtomicI32>, i32);
    impl OnAppInitPlugin for Recorder {
        fn on_app_init(&self, _services: &ServiceRegistry) -> Result<()> {
            self.0.store(self.1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn hooks_run_in_weight_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        struct Push(Arc<Mutex<Vec<i32>>>, i32);
        impl OnAppInitPlugin for Push {
            fn on_app_init(&self, _services: &ServiceRegistry) -> Result<()> {
                self.0.lock().unwrap().push(self.1);
                Ok(())
            }
        }
        let manager = PluginManager::new();
        manager.register(PluginBuilder::new("b").weight(10).on_app_init(Arc::new(Push(order.clone(), 10))));
        manager.register(PluginBuilder::new("a").weight(1).on_app_init(Arc::new(Push(order.clone(), 1))));
        manager.run_on_app_init(&ServiceRegistry::new()).unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 10]);
    }

    #[test]
    #[should_panic]
    fn duplicate_plugin_name_panics() {
        let manager = PluginManager::new();
        let counter = Arc::new(AtomicI32::new(0));
        manager.register(PluginBuilder::new("dup").on_app_init(Arc::new(Recorder(counter.clone(), 1))));
        manager.register(PluginBuilder::new("dup").on_app_init(Arc::new(Recorder(counter, 2))));
    }

    #[test]
    fn service_registry_roundtrips_by_type() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(Manager::new()));
        assert!(registry.get::<Manager>().is_some());
    }

    #[test]
    #[should_panic]
    fn service_registry_rejects_duplicate_type() {
        let registry = ServiceRegistry::new();
        registry.register(Arc::new(Manager::new()));
        registry.register(Arc::new(Manager::new()));
    }
}
