//! Per-subcommand skip list
//!
//! ```yaml
//! exec_list:
//!   _only_: false
//!   prepare: true
//!   cleanup: false
//! ```

use crate::error::Result;
use crate::store::{ConfigStore, GetOptions};
use artifacts::{ArtifactDir, SKIPPED_MARKER};
use serde_yaml::Value;

pub const EXEC_LIST_KEY: &str = "exec_list";

/// When true, only the subcommands explicitly enabled run
pub const ONLY_KEY: &str = "_only_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipDecision {
    Run,
    Skip { reason: String },
}

impl SkipDecision {
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip { .. })
    }
}

/// Decide whether `subcommand` runs. A skip writes the `SKIPPED` marker.
pub fn check(store: &ConfigStore, subcommand: &str, artifacts: &ArtifactDir) -> Result<SkipDecision> {
    log::info!("Currently running the subcommand '{subcommand}'");

    let exec_list = store.get_with(
        EXEC_LIST_KEY,
        GetOptions::quiet().with_default(Value::Null).no_warn(),
    )?;
    let Value::Mapping(exec_list) = exec_list else {
        log::warn!("The exec_list isn't defined in this project.");
        return Ok(SkipDecision::Run);
    };

    let Some(enabled) = exec_list.get(subcommand) else {
        log::info!(
            "Subcommand '{subcommand}' is not defined in the exec list. Executing this command by default."
        );
        return Ok(SkipDecision::Run);
    };

    let only = exec_list.get(ONLY_KEY).and_then(Value::as_bool).unwrap_or(false);

    let reason = match enabled.as_bool() {
        Some(false) => {
            log::warn!(
                "Subcommand '{subcommand}' is disabled in the exec list. Stopping this execution."
            );
            "Skipped because part of the skip list"
        }
        Some(true) => return Ok(SkipDecision::Run),
        None if only => {
            log::warn!(
                "Only flag is set, and subcommand '{subcommand}' is not enabled in the exec list. Stopping this execution."
            );
            "Skipped because not part of the only list"
        }
        None => return Ok(SkipDecision::Run),
    };

    artifacts.write(SKIPPED_MARKER, &format!("{reason}\n"))?;
    Ok(SkipDecision::Skip {
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreOptions;
    use tempfile::TempDir;

    fn store(tmp: &TempDir, doc: &str) -> ConfigStore {
        let artifacts = ArtifactDir::open(tmp.path()).unwrap();
        ConfigStore::from_document(
            tmp.path().join("config.yaml"),
            serde_yaml::from_str(doc).unwrap(),
            StoreOptions::new(artifacts),
        )
    }

    #[test]
    fn test_no_exec_list_runs() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, "a: 1");
        let decision = check(&store, "prepare", store.artifact_dir()).unwrap();
        assert_eq!(decision, SkipDecision::Run);
    }

    #[test]
    fn test_disabled_subcommand_skips() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, "exec_list: {prepare: true, cleanup: false}");

        assert!(!check(&store, "prepare", store.artifact_dir()).unwrap().is_skip());
        assert!(!check(&store, "test", store.artifact_dir()).unwrap().is_skip());
        assert!(!store.artifact_dir().join(SKIPPED_MARKER).exists());

        assert!(check(&store, "cleanup", store.artifact_dir()).unwrap().is_skip());
        assert!(store.artifact_dir().join(SKIPPED_MARKER).exists());
    }

    #[test]
    fn test_only_flag() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp, "exec_list: {_only_: true, prepare: true, test: null}");

        assert!(!check(&store, "prepare", store.artifact_dir()).unwrap().is_skip());
        assert!(check(&store, "test", store.artifact_dir()).unwrap().is_skip());
    }
}
