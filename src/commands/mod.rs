//! Command implementations and the project context they share

pub mod config;
pub mod parallel;
pub mod run;
pub mod toolbox;

use anyhow::{Context, Result};
use artifacts::{ArtifactDir, ENV_ARTIFACT_DIR};
use layered::entrypoint::{CONFIG_FILE, ENV_FROM_CONFIG_FILE};
use layered::{ConfigStore, InitOptions, SkipDecision, StoreOptions, Value, render_value};
use rolekit::{CommandArgsFile, InvokerSettings};
use std::path::{Path, PathBuf};

use crate::paths;
use crate::ui;

/// Directories of the current run
pub struct Project {
    pub testing_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub artifacts: ArtifactDir,
}

impl Project {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            testing_dir: paths::testing_dir()?,
            repo_dir: paths::repo_dir()?,
            artifacts: paths::artifact_dir()?,
        })
    }

    pub fn init_options(&self) -> InitOptions {
        InitOptions::from_env(
            self.testing_dir.clone(),
            self.repo_dir.clone(),
            self.artifacts.clone(),
        )
    }

    /// The configuration of the run: the copy already seeded in the artifact
    /// dir, or a fresh initialization
    pub fn store(&self) -> Result<ConfigStore> {
        let seeded = self.artifacts.join(CONFIG_FILE);
        if seeded.exists() {
            log::debug!("Reusing the configuration seeded in {}", seeded.display());
            return ConfigStore::open(&seeded, StoreOptions::from_env(self.artifacts.clone()))
                .with_context(|| format!("Failed to load {}", seeded.display()));
        }

        layered::init(&self.init_options()).context("Failed to initialize the configuration")
    }

    /// Invoker settings pointing the roles at this run's artifact dir and
    /// configuration
    pub fn invoker_settings(&self, store: Option<&ConfigStore>) -> InvokerSettings {
        let mut settings = InvokerSettings::from_env(self.repo_dir.clone());
        settings.base_env.insert(
            ENV_ARTIFACT_DIR.to_string(),
            self.artifacts.path().display().to_string(),
        );
        if let Some(store) = store {
            settings.base_env.insert(
                ENV_FROM_CONFIG_FILE.to_string(),
                store.path().display().to_string(),
            );
        }
        settings
    }

    pub fn command_args(&self, explicit: Option<&Path>) -> Result<CommandArgsFile> {
        let path = paths::command_args_file(explicit, &self.testing_dir);
        CommandArgsFile::load(&path)
            .with_context(|| format!("Failed to load the command args from {}", path.display()))
    }
}

/// Whether the exec list skips `subcommand`. The skip is reported and the
/// `SKIPPED` marker written.
pub fn skipped(store: &ConfigStore, subcommand: &str, artifacts: &ArtifactDir) -> Result<bool> {
    match layered::skip::check(store, subcommand, artifacts)? {
        SkipDecision::Run => Ok(false),
        SkipDecision::Skip { reason } => {
            ui::info(&format!("Skipping '{subcommand}': {reason}"));
            Ok(true)
        }
    }
}

/// Parse a command-line value as YAML, falling back to the raw string
pub fn parse_value(text: &str) -> Value {
    serde_yaml::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Text of a value: scalars bare, collections as YAML or JSON
pub fn format_value(value: &Value, json: bool) -> Result<String> {
    if json {
        return serde_json::to_string_pretty(value).context("Failed to serialize the value");
    }
    match value {
        Value::Mapping(_) | Value::Sequence(_) => Ok(serde_yaml::to_string(value)
            .context("Failed to serialize the value")?
            .trim_end()
            .to_string()),
        other => Ok(render_value(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(tmp: &TempDir) -> Project {
        let testing_dir = tmp.path().join("project");
        fs::create_dir_all(&testing_dir).unwrap();
        Project {
            repo_dir: tmp.path().to_path_buf(),
            artifacts: ArtifactDir::open(tmp.path().join("artifacts")).unwrap(),
            testing_dir,
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("3"), Value::from(3));
        assert_eq!(parse_value("true"), Value::from(true));
        assert_eq!(parse_value("plain text"), Value::from("plain text"));
        assert!(parse_value("{a: 1}").is_mapping());
        assert_eq!(parse_value("a: b: c"), Value::from("a: b: c"));
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::from("x"), false).unwrap(), "x");
        assert_eq!(format_value(&Value::from("x"), true).unwrap(), "\"x\"");

        let list = parse_value("[1, 2]");
        assert_eq!(format_value(&list, false).unwrap(), "- 1\n- 2");
    }

    #[test]
    fn test_store_reuses_seeded_copy() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);
        fs::write(project.testing_dir.join(CONFIG_FILE), "mode: source\n").unwrap();
        fs::write(project.artifacts.join(CONFIG_FILE), "mode: seeded\n").unwrap();

        let store = project.store().unwrap();
        assert_eq!(store.get("mode").unwrap(), Value::from("seeded"));
    }

    #[test]
    fn test_invoker_settings_point_at_run() {
        let tmp = TempDir::new().unwrap();
        let project = project(&tmp);
        fs::write(project.artifacts.join(CONFIG_FILE), "{}\n").unwrap();
        let store = project.store().unwrap();

        let settings = project.invoker_settings(Some(&store));
        assert_eq!(
            settings.base_env.get(ENV_ARTIFACT_DIR).map(String::as_str),
            Some(project.artifacts.path().to_str().unwrap())
        );
        assert_eq!(
            settings.base_env.get(ENV_FROM_CONFIG_FILE).map(String::as_str),
            Some(store.path().to_str().unwrap())
        );
    }
}
