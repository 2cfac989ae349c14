//! Runtime dispatch: a tagged variant over the three execution backends
//! (spec §9 Design Notes — modeled as an enum rather than a trait object,
//! unlike the two container backends one level down).

pub mod container;
pub mod function;
pub mod shell;

use std::sync::Arc;

use crate::action::manifest::RuntimeManifest;
use crate::action::{Action, FnHandler};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::streams::Streams;

use container::{ContainerExecutor, ContainerProvider, ContainerSpec, ProviderKind};
use function::FunctionExecutor;
use shell::ShellExecutor;

pub enum RuntimeInstance {
    Container(ContainerExecutor),
    Shell(ShellExecutor),
    Function(FunctionExecutor),
}

impl RuntimeInstance {
    /// Builds the runtime an action's resolved manifest calls for. A
    /// `Plugin` runtime without a registered handler is a load-time
    /// failure, not a run-time one — [`Action::function_override`] must be
    /// set before this is reached.
    pub fn build(
        manifest: &RuntimeManifest,
        action: &Action,
        provider: Option<(Arc<dyn ContainerProvider>, ProviderKind)>,
    ) -> Result<Self> {
        match manifest {
            RuntimeManifest::Shell(shell) => Ok(RuntimeInstance::Shell(ShellExecutor::new(shell, action.working_dir()))),
            RuntimeManifest::Container(container) => {
                let (provider, kind) = provider.ok_or_else(|| Error::RuntimeFailure {
                    message: "no container provider available".into(),
                    source: None,
                })?;
                let spec = ContainerSpec::from_manifest(container, &action.working_dir(), &action.dir().to_path_buf());
                Ok(RuntimeInstance::Container(ContainerExecutor {
                    provider,
                    kind,
                    spec,
                    remove_after: true,
                }))
            }
            RuntimeManifest::Plugin(plugin) => {
                let handler: FnHandler = action.function_override().ok_or_else(|| Error::RuntimeFailure {
                    message: format!("no plugin registered a handler for runtime id {:?}", plugin.id),
                    source: None,
                })?;
                Ok(RuntimeInstance::Function(FunctionExecutor::new(handler)))
            }
        }
    }

    pub async fn execute(&self, action: Arc<Action>, streams: &Streams, cancel: CancelToken) -> Result<i32> {
        match self {
            RuntimeInstance::Container(executor) => executor.execute(streams, cancel).await,
            RuntimeInstance::Shell(executor) => executor.execute(cancel).await,
            RuntimeInstance::Function(executor) => executor.execute(action, cancel).await,
        }
    }
}

/// Picks Docker when its socket answers, else Kubernetes; `force_remote`
/// (the `--remote-runtime` flag) always selects Kubernetes (SPEC_FULL
/// §B.3).
pub async fn select_provider(force_remote: bool, namespace: &str) -> Result<(Arc<dyn ContainerProvider>, ProviderKind)> {
    if !force_remote && container::docker::DockerProvider::is_reachable().await {
        let provider = container::docker::DockerProvider::connect()?;
        return Ok((Arc::new(provider), ProviderKind::Docker));
    }
    let provider = container::kubernetes::KubernetesProvider::connect(namespace).await?;
    Ok((Arc::new(provider), ProviderKind::Kubernetes))
}
