//! The Action entity: definition + bound input + selected runtime + working
//! directory (spec §4.5, §3 Action).

pub mod input;
pub mod loader;
pub mod manifest;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock};

pub use input::Input;
pub use manifest::ActionManifest;

use crate::error::{Error, Result};
use loader::Loader;

/// An in-process callback a plugin registers to back a `Plugin` runtime
/// action, or to override an action's runtime entirely (spec §4.5:
/// "Actions produced by plugin discovery may substitute SetRuntime(fn)").
pub type FnHandler = Arc<
    dyn Fn(Arc<Action>) -> Pin<Box<dyn Future<Output = anyhow::Result<i32>> + Send>> + Send + Sync,
>;

/// Either a fully-formed action or a discovery/load failure kept around as
/// a "broken" marker (spec §7 propagation policy).
pub enum Definition {
    Action(Box<Action>),
    Broken { path: String, error: String },
}

pub struct Action {
    id: Mutex<String>,
    file_path: PathBuf,
    dir: PathBuf,
    working_dir: Mutex<PathBuf>,
    loader: Loader,
    /// Set once, by `Loader::load`; immutable thereafter.
    resolved: OnceLock<ActionManifest>,
    input: Mutex<Option<Input>>,
    runtime_override: Mutex<Option<FnHandler>>,
    validated: Mutex<bool>,
}

impl Action {
    pub fn new(id: String, file_path: PathBuf, dir: PathBuf, working_dir: PathBuf, content: Vec<u8>) -> Self {
        Self {
            id: Mutex::new(id),
            file_path,
            dir,
            working_dir: Mutex::new(working_dir),
            loader: Loader::new(content),
            resolved: OnceLock::new(),
            input: Mutex::new(None),
            runtime_override: Mutex::new(None),
            validated: Mutex::new(false),
        }
    }

    pub fn id(&self) -> String {
        self.id.lock().expect("id mutex poisoned").clone()
    }

    pub fn set_id(&self, id: String) {
        *self.id.lock().expect("id mutex poisoned") = id;
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn working_dir(&self) -> PathBuf {
        self.working_dir.lock().expect("working_dir poisoned").clone()
    }

    pub fn set_working_dir(&self, dir: PathBuf) {
        *self.working_dir.lock().expect("working_dir poisoned") = dir;
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    /// The raw (pre-template) manifest; memoized by the loader.
    pub fn raw_manifest(&self) -> Result<Arc<ActionManifest>> {
        self.loader.load_raw()
    }

    /// The resolved (post-template) manifest. Computed once; every later
    /// call returns the same value without re-running the pipeline.
    pub fn resolved_manifest(&self, ctx: &loader::TemplateContext) -> Result<&ActionManifest> {
        if let Some(m) = self.resolved.get() {
            return Ok(m);
        }
        let manifest = self.loader.load(ctx)?;
        // Another thread may have won the race; OnceLock::set tolerates that.
        let _ = self.resolved.set((*manifest).clone());
        Ok(self.resolved.get().expect("just set"))
    }

    pub fn bind_input(&self, input: Input) {
        *self.input.lock().expect("input poisoned") = Some(input);
    }

    pub fn input(&self) -> Option<Input> {
        self.input.lock().expect("input poisoned").clone()
    }

    pub fn set_function_override(&self, handler: FnHandler) {
        *self.runtime_override.lock().expect("override poisoned") = Some(handler);
    }

    pub fn function_override(&self) -> Option<FnHandler> {
        self.runtime_override.lock().expect("override poisoned").clone()
    }

    pub fn mark_validated(&self) {
        *self.validated.lock().expect("validated poisoned") = true;
    }

    pub fn is_validated(&self) -> bool {
        *self.validated.lock().expect("validated poisoned")
    }
}

/// Constructs a broken-action marker for a discovery/load failure.
pub fn broken(path: impl Into<String>, err: &Error) -> Definition {
    Definition::Broken {
        path: path.into(),
        error: err.to_string(),
    }
}
