//! Assembles the process: early flag parse for logger bring-up, service
//! registration, plugin init, discovery, dynamic command tree, dispatch,
//! and LIFO cleanup (spec §4.12).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Arg, ArgAction, Command};
use indexmap::IndexMap;
use serde_json::Value;

use crate::action::loader::TemplateContext;
use crate::action::manifest::{ParamType, Parameter, RuntimeManifest};
use crate::action::{Definition, Input};
use crate::cancel::{self, CancelHandle};
use crate::config::Config;
use crate::discovery::{self, DiscoveryOutcome};
use crate::error::{Error, Result, EXIT_RUNTIME_FAILURE};
use crate::logger::{self, LogFormat, LogLevel};
use crate::manager::{BrokenAction, ConfiguredIdProvider, DefaultIdProvider, IdProvider, Manager};
use crate::plugin::{PluginManager, ServiceRegistry};
use crate::runtime::{self, RuntimeInstance};
use crate::schema::Schema;
use crate::streams::Streams;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Runs the whole CLI. `argv` excludes the program name (`std::env::args()
/// .skip(1)` at the real entry point, or a fixed vector in tests).
pub async fn run(argv: Vec<String>) -> Result<i32> {
    let early = EarlyFlags::parse(&argv);
    logger::init(early.level, early.format, early.quiet);

    let streams = Arc::new(if early.quiet { Streams::noop() } else { Streams::standard() });
    let actions_root = early.actions_root.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config = Arc::new(Config::load(&early.config_dir(&actions_root))?);
    let manager = Arc::new(Manager::new());
    let plugins = Arc::new(PluginManager::new());
    let services = Arc::new(ServiceRegistry::new());

    services.register(streams.clone());
    services.register(config.clone());
    services.register(manager.clone());

    plugins.run_on_app_init(&services)?;

    let naming_rules = config.naming_rules()?;
    if !naming_rules.is_empty() {
        let provider: Arc<dyn IdProvider> = Arc::new(ConfiguredIdProvider::new(Box::new(DefaultIdProvider), naming_rules));
        manager.set_id_provider(provider);
    }

    register_discovered(&manager, &actions_root).await?;
    for definition in plugins.run_discovery()? {
        register_definition(&manager, definition);
    }
    plugins.run_alter(&manager)?;

    let (cancel_handle, cancel_token) = cancel::channel();
    let cleanups: Arc<Mutex<Vec<CleanupFn>>> = Arc::new(Mutex::new(Vec::new()));
    install_interrupt_handler(cancel_handle);

    let app = build_command(&manager, &plugins);
    let matches = app.try_get_matches_from(std::iter::once("launchr".to_string()).chain(argv)).map_err(|e| Error::ConfigError(e.to_string()))?;

    let code = match matches.subcommand() {
        Some((id, sub)) if manager.get(id).is_some() => {
            dispatch_action(manager.get(id).unwrap(), sub, &manager, &plugins, &actions_root, &streams, cancel_token, early.remote_runtime).await?
        }
        Some((id, _)) if manager.broken(id).is_some() => {
            let broken = manager.broken(id).expect("checked above");
            streams.print_err(&format!("launchr: {}\n", broken.error));
            broken.exit_code
        }
        _ => {
            streams.print_out("launchr: no action selected. Pass --help to list available actions.\n");
            0
        }
    };

    run_cleanups(&cleanups);
    Ok(code)
}

fn run_cleanups(cleanups: &Arc<Mutex<Vec<CleanupFn>>>) {
    let mut guard = cleanups.lock().expect("cleanups poisoned");
    while let Some(f) = guard.pop() {
        f();
    }
}

fn install_interrupt_handler(handle: CancelHandle) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        handle.cancel();
    });
}

async fn register_discovered(manager: &Manager, root: &std::path::Path) -> Result<()> {
    let id_provider = manager.id_provider();
    let outcomes = discovery::discover(root.to_path_buf(), id_provider).await;
    for outcome in outcomes {
        match outcome {
            DiscoveryOutcome::Found { action, rel_dir } => {
                if let Err(e) = manager.add(action, rel_dir) {
                    tracing::warn!(error = %e, "skipping duplicate action id");
                }
            }
            DiscoveryOutcome::Broken { id, path, error, exit_code } => {
                tracing::warn!(%path, %error, "broken action definition");
                manager.add_broken(id, BrokenAction { path, error, exit_code });
            }
        }
    }
    Ok(())
}

fn register_definition(manager: &Manager, definition: Definition) {
    match definition {
        Definition::Action(action) => {
            let rel_dir = action.dir().to_path_buf();
            if let Err(e) = manager.add(Arc::from(*action), rel_dir) {
                tracing::warn!(error = %e, "skipping duplicate plugin-provided action id");
            }
        }
        Definition::Broken { path, error } => {
            tracing::warn!(%path, %error, "broken plugin-provided action");
            manager.add_broken(path.clone(), BrokenAction { path, error, exit_code: crate::error::EXIT_RUNTIME_FAILURE });
        }
    }
}

/// Flags that must be known before the rest of the app can start: logging
/// verbosity/format, quiet mode, and the discovery/config roots. Parsed by
/// hand from the raw args so logging can come up before the full `clap`
/// tree (which needs discovery to already have happened) is built.
struct EarlyFlags {
    level: LogLevel,
    format: LogFormat,
    quiet: bool,
    actions_root: Option<PathBuf>,
    remote_runtime: bool,
}

impl EarlyFlags {
    fn parse(argv: &[String]) -> Self {
        let mut verbosity = 0u8;
        let mut level_override = None;
        let mut format = LogFormat::Pretty;
        let mut quiet = false;
        let mut actions_root = None;
        let mut remote_runtime = false;

        let mut it = argv.iter().peekable();
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-v" => verbosity += 1,
                "-vv" => verbosity += 2,
                "-vvv" => verbosity += 3,
                "--quiet" | "-q" => quiet = true,
                "--remote-runtime" => remote_runtime = true,
                "--log-format" => {
                    if let Some(v) = it.next().and_then(|v| LogFormat::parse(v)) {
                        format = v;
                    }
                }
                "--log-level" => {
                    if let Some(v) = it.next().and_then(|v| LogLevel::parse(v)) {
                        level_override = Some(v);
                    }
                }
                "--actions-dir" => {
                    if let Some(v) = it.next() {
                        actions_root = Some(PathBuf::from(v));
                    }
                }
                _ => {}
            }
        }

        Self {
            level: level_override.unwrap_or_else(|| LogLevel::from_verbosity(verbosity)),
            format,
            quiet,
            actions_root,
            remote_runtime,
        }
    }

    fn config_dir(&self, actions_root: &std::path::Path) -> PathBuf {
        actions_root.to_path_buf()
    }
}

fn build_command(manager: &Manager, plugins: &PluginManager) -> Command {
    let mut app = Command::new("launchr")
        .about("Discovers and runs declarative actions")
        .arg(Arg::new("verbose").short('v').action(ArgAction::Count).global(true))
        .arg(Arg::new("quiet").long("quiet").short('q').action(ArgAction::SetTrue).global(true))
        .arg(Arg::new("log-level").long("log-level").global(true))
        .arg(Arg::new("log-format").long("log-format").global(true))
        .arg(Arg::new("actions-dir").long("actions-dir").global(true))
        .arg(Arg::new("remote-runtime").long("remote-runtime").action(ArgAction::SetTrue).global(true));

    for action in manager.all() {
        if let Ok(manifest) = action.raw_manifest() {
            app = app.subcommand(action_subcommand(&action.id(), &manifest.action, &manifest.runtime));
        }
    }

    for (id, broken) in manager.all_broken() {
        app = app.subcommand(Command::new(id).about(format!("broken action ({})", broken.error)));
    }

    plugins.register_commands(app)
}

fn action_subcommand(id: &str, section: &crate::action::manifest::ActionSection, _runtime: &RuntimeManifest) -> Command {
    let mut cmd = Command::new(id).about(section.title.clone()).visible_aliases(section.aliases.clone());
    for param in &section.arguments {
        cmd = cmd.arg(parameter_arg(param, true));
    }
    for param in &section.options {
        cmd = cmd.arg(parameter_arg(param, false));
    }
    cmd
}

fn parameter_arg(param: &Parameter, positional: bool) -> Arg {
    let mut arg = Arg::new(param.name.clone());
    if positional {
        arg = arg.required(param.required && param.default.is_none());
    } else {
        arg = arg.long(param.name.clone()).required(param.required && param.default.is_none());
    }
    if matches!(param.param_type, ParamType::Boolean) {
        arg = arg.action(ArgAction::SetTrue);
    } else if matches!(param.param_type, ParamType::Array) {
        arg = arg.action(ArgAction::Append);
    }
    if let Some(desc) = &param.description {
        arg = arg.help(desc.clone());
    }
    arg
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_action(
    action: Arc<crate::action::Action>,
    matches: &clap::ArgMatches,
    manager: &Manager,
    plugins: &PluginManager,
    actions_root: &std::path::Path,
    streams: &Streams,
    cancel_token: crate::cancel::CancelToken,
    remote_runtime: bool,
) -> Result<i32> {
    let raw = action.raw_manifest()?;

    let mut user_args = IndexMap::new();
    let mut user_opts = IndexMap::new();
    for param in &raw.action.arguments {
        if let Some(v) = arg_value(matches, &param.param_type, &param.name) {
            user_args.insert(param.name.clone(), v);
        }
    }
    for param in &raw.action.options {
        if let Some(v) = arg_value(matches, &param.param_type, &param.name) {
            user_opts.insert(param.name.clone(), v);
        }
    }

    let input = Input::bind(&raw, user_args, user_opts);
    manager.persistent_flags().validate_flags(input.values())?;
    Schema::from_parameters(raw.all_parameters()).validate_input(&input)?;
    action.bind_input(input.clone());

    let ctx = TemplateContext::new(input, std::env::current_dir().unwrap_or_default(), action.dir().to_path_buf(), actions_root.to_path_buf());
    let resolved = action.resolved_manifest(&ctx)?;

    plugins.run_pre_run(&action)?;
    action.mark_validated();

    let provider = match &resolved.runtime {
        RuntimeManifest::Container(_) => Some(runtime::select_provider(remote_runtime, "default").await?),
        _ => None,
    };

    let instance = RuntimeInstance::build(&resolved.runtime, &action, provider)?;
    match instance.execute(action.clone(), streams, cancel_token).await {
        Ok(code) => Ok(code),
        Err(Error::Cancelled) => Ok(EXIT_RUNTIME_FAILURE),
        Err(e) => Err(e),
    }
}

fn arg_value(matches: &clap::ArgMatches, param_type: &ParamType, name: &str) -> Option<Value> {
    match param_type {
        ParamType::Boolean => matches.get_flag(name).then_some(Value::Bool(true)),
        ParamType::Array => matches
            .get_many::<String>(name)
            .map(|vs| Value::Array(vs.map(|v| Value::String(v.clone())).collect())),
        ParamType::Integer => matches.get_one::<String>(name).and_then(|v| v.parse::<i64>().ok()).map(Value::from),
        ParamType::Number => matches
            .get_one::<String>(name)
            .and_then(|v| v.parse::<f64>().ok())
            .and_then(|f| serde_json::Number::from_f64(f))
            .map(Value::Number),
        ParamType::String => matches.get_one::<String>(name).map(|v| Value::String(v.clone())),
    }
}
