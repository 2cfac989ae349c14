//! Walks an FS tree, constructing Actions from `**/actions/*/action.yaml`
//! (spec §4.7).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::action::Action;
use crate::manager::IdProvider;

/// A file that passed the path-acceptance rules, paired with the directory
/// the ID is derived from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub file_path: PathBuf,
    pub rel_dir: PathBuf,
}

pub enum DiscoveryOutcome {
    Found { action: Arc<Action>, rel_dir: PathBuf },
    /// `id` is derived the same way a valid action's would be, so the
    /// broken entry can still be registered and dispatched to by name
    /// (spec §7 propagation policy: a broken action stays a reachable,
    /// reportable marker rather than vanishing from the command tree).
    Broken { id: String, path: String, error: String, exit_code: i32 },
}

impl DiscoveryOutcome {
    fn sort_key(&self) -> &str {
        match self {
            DiscoveryOutcome::Found { action, .. } => {
                action.file_path().to_str().unwrap_or_default()
            }
            DiscoveryOutcome::Broken { path, .. } => path.as_str(),
        }
    }
}

/// A file is a candidate iff: its name is `action.yaml`/`action.yml`; it is
/// immediately inside a directory named `actions/<name>`, with no deeper
/// subdirectories between `actions` and the file; no path segment starts
/// with `.`. Nested `actions/.../actions` segments are allowed — the
/// rightmost `actions` segment governs.
pub fn find_candidates(root: &Path) -> Vec<Candidate> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if file_name != "action.yaml" && file_name != "action.yml" {
            continue;
        }
        let rel_path = match entry.path().strip_prefix(root) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let components: Vec<&str> = rel_path
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        if components.iter().any(|c| c.starts_with('.')) {
            continue;
        }
        // components = [..., "actions", "<name>", "action.yaml"]
        if components.len() < 3 {
            continue;
        }
        let actions_idx = match components.iter().rposition(|c| *c == "actions") {
            Some(i) => i,
            None => continue,
        };
        // exactly one directory (the action name) between "actions" and the file.
        if actions_idx != components.len() - 3 {
            continue;
        }
        let rel_dir = rel_path.parent().unwrap_or(Path::new("")).to_path_buf();
        out.push(Candidate {
            file_path: entry.path().to_path_buf(),
            rel_dir,
        });
    }
    out.sort_by(|a, b| a.file_path.cmp(&b.file_path));
    out
}

fn build_one(candidate: Candidate, id_provider: &dyn IdProvider) -> DiscoveryOutcome {
    let path_str = candidate.file_path.to_string_lossy().into_owned();
    let id = id_provider.id_for(&candidate.rel_dir);

    let content = match std::fs::read(&candidate.file_path) {
        Ok(c) => c,
        Err(e) => {
            return DiscoveryOutcome::Broken {
                id,
                path: path_str.clone(),
                exit_code: crate::error::EXIT_INIT_FAILURE,
                error: format!("reading {path_str}: {e}"),
            }
        }
    };

    let dir = candidate.file_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let action = Action::new(id.clone(), candidate.file_path.clone(), dir.clone(), dir, content);

    match action.raw_manifest() {
        Ok(_) => DiscoveryOutcome::Found {
            action: Arc::new(action),
            rel_dir: candidate.rel_dir,
        },
        Err(e) => DiscoveryOutcome::Broken {
            id,
            path: path_str,
            exit_code: e.exit_code(),
            error: e.to_string(),
        },
    }
}

/// Discovers every candidate under `root`, parsing raw definitions
/// concurrently, then returns results ordered deterministically by path
/// (spec §8 property 1: discovery determinism).
pub async fn discover(root: PathBuf, id_provider: Arc<dyn IdProvider>) -> Vec<DiscoveryOutcome> {
    let candidates = find_candidates(&root);
    let mut tasks = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let id_provider = id_provider.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            build_one(candidate, id_provider.as_ref())
        }));
    }
    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        results.push(task.await.expect("discovery task panicked"));
    }
    results.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::DefaultIdProvider;
    use std::fs;

    fn write_action(root: &Path, rel_dir: &str, body: &str) {
        let dir = root.join(rel_dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("action.yaml"), body).unwrap();
    }

    const VALID: &str = "action: {title: T}\nruntime: {type: shell, command: [echo]}\n";

    #[test]
    fn accepts_standard_layout() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), "a/actions/verb", VALID);
        let candidates = find_candidates(tmp.path());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].rel_dir, Path::new("a/actions/verb"));
    }

    #[test]
    fn rejects_hidden_segment() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), ".hidden/actions/verb", VALID);
        assert!(find_candidates(tmp.path()).is_empty());
    }

    #[test]
    fn rejects_deeper_subdirectory_under_actions() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), "a/actions/verb/extra", VALID);
        assert!(find_candidates(tmp.path()).is_empty());
    }

    #[test]
    fn rejects_file_not_under_actions() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), "a/notactions/verb", VALID);
        assert!(find_candidates(tmp.path()).is_empty());
    }

    #[test]
    fn rightmost_actions_segment_governs() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), "actions/sub/actions/verb", VALID);
        let candidates = find_candidates(tmp.path());
        assert_eq!(candidates.len(), 1);
        let id = DefaultIdProvider.id_for(&candidates[0].rel_dir);
        assert_eq!(id, "actions.sub:verb");
    }

    #[tokio::test]
    async fn discovery_is_deterministic_and_orders_by_path() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), "b/actions/two", VALID);
        write_action(tmp.path(), "a/actions/one", VALID);
        let provider: Arc<dyn IdProvider> = Arc::new(DefaultIdProvider);
        let first = discover(tmp.path().to_path_buf(), provider.clone()).await;
        let second = discover(tmp.path().to_path_buf(), provider).await;
        let ids = |outcomes: &[DiscoveryOutcome]| -> Vec<String> {
            outcomes
                .iter()
                .filter_map(|o| match o {
                    DiscoveryOutcome::Found { action, .. } => Some(action.id()),
                    DiscoveryOutcome::Broken { .. } => None,
                })
                .collect()
        };
        assert_eq!(first.len(), 2);
        assert_eq!(ids(&first), ids(&second));
        // "a/..." sorts before "b/..." by path
        assert_eq!(ids(&first), vec!["a:one".to_string(), "b:two".to_string()]);
    }

    #[tokio::test]
    async fn broken_action_is_reported_without_aborting_discovery() {
        let tmp = tempfile::tempdir().unwrap();
        write_action(tmp.path(), "a/actions/good", VALID);
        write_action(tmp.path(), "b/actions/bad", "version: \"2\"\naction: {title: T}\nruntime: {type: shell, command: [echo]}\n");
        let provider: Arc<dyn IdProvider> = Arc::new(DefaultIdProvider);
        let results = discover(tmp.path().to_path_buf(), provider).await;
        assert_eq!(results.len(), 2);
        let found = results.iter().any(|o| matches!(o, DiscoveryOutcome::Found { .. }));
        assert!(found);

        let broken = results
            .iter()
            .find_map(|o| match o {
                DiscoveryOutcome::Broken { id, error, exit_code, .. } => Some((id.clone(), error.clone(), *exit_code)),
                DiscoveryOutcome::Found { .. } => None,
            })
            .expect("one broken outcome");
        assert_eq!(broken.0, "b:bad");
        assert!(broken.1.contains("unsupported version"));
        assert_eq!(broken.2, crate::error::EXIT_INIT_FAILURE);
    }
}
