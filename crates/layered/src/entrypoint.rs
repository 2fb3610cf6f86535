//! Start-up composition of the configuration
//!
//! Seeds the backing file into the artifact directory, loads it, then layers
//! repository overrides, CI presets, pull-request presets and the final
//! override file on top.

use crate::error::{ConfigError, Result};
use crate::overrides::{
    OverrideOptions, VARIABLE_OVERRIDES_FILE, apply_config_overrides, save_config_overrides,
};
use crate::preset::PresetResolver;
use crate::reference::render_value;
use crate::store::{ConfigStore, ENV_SHARED_DIR, GetOptions, SHARED_CONFIG_FILE, StoreOptions, running_in_ci};
use artifacts::ArtifactDir;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Config file to load instead of the project one
pub const ENV_FROM_CONFIG_FILE: &str = "KEEL_FROM_CONFIG_FILE";

/// Set to `true` inside a local-CI multi pod: load only, no layering
pub const ENV_LOCAL_CI_MULTI: &str = "KEEL_LOCAL_CI_MULTI";

/// Name of the project and artifact config files
pub const CONFIG_FILE: &str = "config.yaml";

/// Preset name or list of names applied at start-up
pub const PRESETS_TO_APPLY: &str = "ci_presets.to_apply";

/// Mapping of config path to value applied after the start-up presets
pub const CI_VARIABLE_OVERRIDES: &str = "ci_presets.variable_overrides";

/// Inputs of [`init`]
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Project directory holding the default `config.yaml`
    pub testing_dir: PathBuf,
    /// Repository root, searched for `variable_overrides.yaml`
    pub repo_dir: PathBuf,
    pub artifact_dir: ArtifactDir,
    pub from_config_file: Option<PathBuf>,
    pub shared_dir: Option<PathBuf>,
    pub soft_thread_violations: bool,
    pub local_ci_multi: bool,
    /// When false, the final override file is saved under `overrides` only
    pub apply_config_overrides: bool,
    pub apply_preset_from_pr_args: bool,
}

impl InitOptions {
    /// Options read from the process environment
    pub fn from_env(testing_dir: PathBuf, repo_dir: PathBuf, artifact_dir: ArtifactDir) -> Self {
        Self {
            testing_dir,
            repo_dir,
            artifact_dir,
            from_config_file: std::env::var_os(ENV_FROM_CONFIG_FILE).map(PathBuf::from),
            shared_dir: std::env::var_os(ENV_SHARED_DIR).map(PathBuf::from),
            soft_thread_violations: running_in_ci(),
            local_ci_multi: std::env::var(ENV_LOCAL_CI_MULTI).is_ok_and(|v| v == "true"),
            apply_config_overrides: true,
            apply_preset_from_pr_args: false,
        }
    }

    fn store_options(&self) -> StoreOptions {
        StoreOptions {
            artifact_dir: self.artifact_dir.clone(),
            shared_dir: self.shared_dir.clone(),
            soft_thread_violations: self.soft_thread_violations,
        }
    }
}

/// Copy the source configuration into the artifact directory and return the
/// path of the copy, which becomes the backing file
pub fn seed_config_file(options: &InitOptions) -> Result<PathBuf> {
    let source = if let Some(file) = &options.from_config_file {
        log::info!("Loading the configuration from {ENV_FROM_CONFIG_FILE}={} ...", file.display());
        file.clone()
    } else if let Some(shared) = options
        .shared_dir
        .as_deref()
        .map(|dir| dir.join(SHARED_CONFIG_FILE))
        .filter(|file| file.exists())
    {
        log::info!("Reloading the config file from SHARED_DIR {} ...", shared.display());
        shared
    } else {
        let file = options.testing_dir.join(CONFIG_FILE);
        log::info!("Loading the config file from the project directory {} ...", file.display());
        file
    };

    let destination = options.artifact_dir.join(CONFIG_FILE);
    if same_file(&source, &destination) {
        return Ok(destination);
    }

    if !source.exists() {
        return Err(ConfigError::MissingFile(source));
    }

    log::info!("Copying the configuration from {} to the artifact dir ...", source.display());
    fs::copy(&source, &destination).map_err(|source_err| ConfigError::Write {
        path: destination.clone(),
        source: source_err,
    })?;

    Ok(destination)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Seed, load and layer the configuration.
///
/// The calling thread becomes the owner of the returned store.
pub fn init(options: &InitOptions) -> Result<ConfigStore> {
    let config_path = seed_config_file(options)?;
    let store = ConfigStore::open(config_path, options.store_options())?;

    if options.local_ci_multi {
        log::info!("config init: running in a local-ci multi pod, skipping the overrides and the presets.");
        return Ok(store);
    }

    let final_overrides = options.artifact_dir.join(VARIABLE_OVERRIDES_FILE);
    if !options.apply_config_overrides {
        log::info!("config init: overrides disabled, saving them in the 'overrides' field.");
        save_config_overrides(&store, &final_overrides)?;
        return Ok(store);
    }

    let repo_overrides = options.repo_dir.join(VARIABLE_OVERRIDES_FILE);
    if repo_overrides.exists() {
        log::info!(
            "Found '{}', applying the variable overrides from it.",
            repo_overrides.display()
        );
        apply_config_overrides(
            &store,
            &repo_overrides,
            OverrideOptions {
                ignore_not_found: true,
                log: true,
            },
        )?;
    }

    let presets = PresetResolver::new(&store);
    for name in preset_names(&store.get_with(
        PRESETS_TO_APPLY,
        GetOptions::quiet().with_default(Value::Null).no_warn(),
    )?) {
        presets.apply(&name)?;
    }

    if let Value::Mapping(ci_overrides) = store.get_with(
        CI_VARIABLE_OVERRIDES,
        GetOptions::quiet().with_default(Value::Null).no_warn(),
    )? {
        for (key, value) in ci_overrides {
            store.set(&render_value(&key), value)?;
        }
    }

    if options.apply_preset_from_pr_args {
        presets.apply_from_pr_args()?;
    }

    if repo_overrides.exists() {
        // on top of the presets
        apply_config_overrides(
            &store,
            &repo_overrides,
            OverrideOptions {
                ignore_not_found: false,
                log: false,
            },
        )?;
    }

    apply_config_overrides(&store, &final_overrides, OverrideOptions::default())?;

    Ok(store)
}

fn preset_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(name) => vec![name.clone()],
        Value::Sequence(names) => names.iter().map(render_value).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROJECT_CONFIG: &str = r#"
cluster:
  nodes: 3
tests:
  count: 10
  name: default
ci_presets:
  to_apply: small
  variable_overrides:
    tests.name: from-ci
  small:
    cluster.nodes: 1
  big:
    cluster.nodes: 9
PR_POSITIONAL_ARG_1: big
"#;

    struct Fixture {
        _tmp: TempDir,
        options: InitOptions,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let testing = tmp.path().join("testing");
        let repo = tmp.path().join("repo");
        fs::create_dir_all(&testing).unwrap();
        fs::create_dir_all(&repo).unwrap();
        fs::write(testing.join(CONFIG_FILE), PROJECT_CONFIG).unwrap();

        let options = InitOptions {
            testing_dir: testing,
            repo_dir: repo,
            artifact_dir: ArtifactDir::open(tmp.path().join("artifacts")).unwrap(),
            from_config_file: None,
            shared_dir: None,
            soft_thread_violations: false,
            local_ci_multi: false,
            apply_config_overrides: true,
            apply_preset_from_pr_args: false,
        };
        Fixture { _tmp: tmp, options }
    }

    #[test]
    fn test_seed_copies_into_artifact_dir() {
        let fx = fixture();
        let seeded = seed_config_file(&fx.options).unwrap();
        assert_eq!(seeded, fx.options.artifact_dir.join(CONFIG_FILE));
        assert_eq!(fs::read_to_string(seeded).unwrap(), PROJECT_CONFIG);
    }

    #[test]
    fn test_seed_prefers_explicit_file() {
        let mut fx = fixture();
        let explicit = fx.options.repo_dir.join("other.yaml");
        fs::write(&explicit, "x: 1\n").unwrap();
        fx.options.from_config_file = Some(explicit);

        let seeded = seed_config_file(&fx.options).unwrap();
        assert_eq!(fs::read_to_string(seeded).unwrap(), "x: 1\n");
    }

    #[test]
    fn test_init_composition_order() {
        let fx = fixture();
        fs::write(
            fx.options.repo_dir.join(VARIABLE_OVERRIDES_FILE),
            "tests.count: 5\n",
        )
        .unwrap();
        fx.options
            .artifact_dir
            .write(VARIABLE_OVERRIDES_FILE, "cluster.nodes: 7\n")
            .unwrap();

        let store = init(&fx.options).unwrap();

        assert_eq!(store.get("tests.count").unwrap(), Value::from(5));
        assert_eq!(store.get("tests.name").unwrap(), Value::from("from-ci"));
        // final override wins over the preset
        assert_eq!(store.get("cluster.nodes").unwrap(), Value::from(7));
        assert_eq!(
            store.get_as::<Vec<String>>("ci_presets.names").unwrap(),
            vec!["small"]
        );
    }

    #[test]
    fn test_init_pr_args() {
        let mut fx = fixture();
        fx.options.apply_preset_from_pr_args = true;

        let store = init(&fx.options).unwrap();
        assert_eq!(store.get("cluster.nodes").unwrap(), Value::from(9));
    }

    #[test]
    fn test_init_without_overrides_saves_them() {
        let mut fx = fixture();
        fx.options.apply_config_overrides = false;
        fx.options
            .artifact_dir
            .write(VARIABLE_OVERRIDES_FILE, "cluster.nodes: 7\n")
            .unwrap();

        let store = init(&fx.options).unwrap();
        assert_eq!(store.get("cluster.nodes").unwrap(), Value::from(3));
        assert_eq!(store.get(r#"overrides["cluster.nodes"]"#).unwrap(), Value::from(7));
    }

    #[test]
    fn test_init_local_ci_multi_only_loads() {
        let mut fx = fixture();
        fx.options.local_ci_multi = true;

        let store = init(&fx.options).unwrap();
        assert_eq!(store.get("cluster.nodes").unwrap(), Value::from(3));
        assert!(!store.contains("ci_presets.names"));
    }
}
