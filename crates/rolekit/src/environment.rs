//! Environment preparation for a role run
//!
//! Works on a private copy of the environment: the process environment is
//! never modified. Allocates the invocation's artifact directory, fills in
//! the ansible defaults and records how the role was invoked.

use crate::error::{Result, RoleError};
use crate::invocation::Invocation;
use artifacts::{ArtifactDir, ENV_ARTIFACT_DIR, ENV_BASE_DIR, default_location};
use layered::render_value;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_EXTRA_LOGS_DIR: &str = "ARTIFACT_EXTRA_LOGS_DIR";
pub const ENV_NAME_PREFIX: &str = "ARTIFACT_TOOLBOX_NAME_PREFIX";
pub const ENV_NAME_SUFFIX: &str = "ARTIFACT_TOOLBOX_NAME_SUFFIX";
pub const ENV_REMOTE_HOST: &str = "KEEL_REMOTE_HOST";
pub const ENV_PLAYBOOK_EXTRA_VARS: &str = "KEEL_PLAYBOOK_EXTRA_VARS";
pub const ENV_COLLECTIONS_PATH: &str = "KEEL_COLLECTIONS_PATH";

pub const ENV_ANSIBLE_LOG_PATH: &str = "ANSIBLE_LOG_PATH";
pub const ENV_ANSIBLE_CACHE: &str = "ANSIBLE_CACHE_PLUGIN_CONNECTION";
pub const ENV_ANSIBLE_ROLES_PATH: &str = "ANSIBLE_ROLES_PATH";
pub const ENV_ANSIBLE_COLLECTIONS_PATHS: &str = "ANSIBLE_COLLECTIONS_PATHS";
pub const ENV_ANSIBLE_CONFIG: &str = "ANSIBLE_CONFIG";
pub const ENV_ANSIBLE_JSON_LOG: &str = "ANSIBLE_JSON_TO_LOGFILE";

/// Argv of the invoking process
pub const CMD_FILE: &str = "_keel.cmd";
/// Re-runnable command line of a command-args invocation
pub const GEN_CMD_FILE: &str = "_keel.gen.cmd";
/// Resolved command-args of the invocation
pub const ARGS_FILE: &str = "_keel.args.yaml";
/// Environment handed to the playbook
pub const ENV_DUMP_FILE: &str = "_ansible.env";

const PATH_LIST_SEPARATOR: &str = ":";

/// Process-level inputs of the invoker
#[derive(Debug, Clone)]
pub struct InvokerSettings {
    /// Repository root: `projects/*/toolbox` role directories and
    /// `ansible-config/ansible.cfg`
    pub repo_dir: PathBuf,
    /// Directories searched for an `ansible_collections` sub-directory
    pub collection_roots: Vec<PathBuf>,
    /// Directory receiving the runnable playbook
    pub playbook_dir: PathBuf,
    /// Environment the private copy starts from
    pub base_env: BTreeMap<String, String>,
    /// Argv of the invoking process
    pub argv: Vec<String>,
    /// Name used in generated command lines
    pub program: String,
}

impl InvokerSettings {
    /// Settings for the current process
    pub fn from_env(repo_dir: PathBuf) -> Self {
        let base_env: BTreeMap<String, String> = std::env::vars().collect();
        let collection_roots = base_env
            .get(ENV_COLLECTIONS_PATH)
            .map(|paths| std::env::split_paths(paths).collect())
            .unwrap_or_default();

        Self {
            repo_dir,
            collection_roots,
            playbook_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            base_env,
            argv: std::env::args().collect(),
            program: "keel".to_string(),
        }
    }
}

/// The private environment and artifact locations of one invocation
#[derive(Debug, Clone)]
pub struct PreparedEnvironment {
    pub env: BTreeMap<String, String>,
    pub artifact_dir: ArtifactDir,
    pub extra_logs_dir: ArtifactDir,
    /// Variables handed to the role
    pub vars: Mapping,
    pub remote_host: Option<String>,
}

impl PreparedEnvironment {
    pub fn prepare(invocation: &Invocation, settings: &InvokerSettings) -> Result<Self> {
        let mut vars = invocation.role_vars()?;
        let mut env = settings.base_env.clone();

        let remote_host = env
            .get(ENV_REMOTE_HOST)
            .filter(|host| !host.is_empty())
            .cloned();

        if !env.contains_key(ENV_ARTIFACT_DIR) {
            let base = env
                .get(ENV_BASE_DIR)
                .cloned()
                .unwrap_or_else(|| "/tmp".to_string());
            let default = default_location(Path::new(&base), "%Y%m%d");
            env.insert(ENV_ARTIFACT_DIR.to_string(), default.display().to_string());
        }
        let artifact_dir = ArtifactDir::open(&env[ENV_ARTIFACT_DIR])?;

        let prefix = env.get(ENV_NAME_PREFIX).cloned().unwrap_or_default();
        let suffix = env.get(ENV_NAME_SUFFIX).cloned().unwrap_or_default();

        let extra_logs_dir = match env.get(ENV_EXTRA_LOGS_DIR).cloned() {
            Some(dir) => ArtifactDir::open(dir)?,
            None => {
                let name = format!("{prefix}{}{suffix}", invocation.artifact_dirname());
                let dir = artifact_dir.next_child(&name)?;
                env.insert(
                    ENV_EXTRA_LOGS_DIR.to_string(),
                    dir.path().display().to_string(),
                );
                dir
            }
        };

        log::info!("Using '{}' to store the test artifacts.", artifact_dir.path().display());
        vars.insert(
            Value::from("artifact_dir"),
            Value::from(artifact_dir.path().display().to_string()),
        );

        log::info!("Using '{}' to store extra log files.", extra_logs_dir.path().display());
        vars.insert(
            Value::from("artifact_extra_logs_dir"),
            Value::from(extra_logs_dir.path().display().to_string()),
        );

        let log_path = default_var(&mut env, ENV_ANSIBLE_LOG_PATH, || {
            extra_logs_dir.join("_ansible.log")
        });
        log::info!("Using '{log_path}' to store ansible logs.");
        create_parent(&log_path)?;

        let cache = default_var(&mut env, ENV_ANSIBLE_CACHE, || {
            artifact_dir.join("ansible_facts")
        });
        log::info!("Using '{cache}' to store ansible facts.");
        create_parent(&cache)?;

        let mut roles = existing_list(&env, ENV_ANSIBLE_ROLES_PATH);
        roles.extend(role_dirs(&settings.repo_dir));
        let roles = roles.join(PATH_LIST_SEPARATOR);
        env.insert(ENV_ANSIBLE_ROLES_PATH.to_string(), roles.clone());
        vars.insert(Value::from("roles_path"), Value::from(roles));

        let mut collections = existing_list(&env, ENV_ANSIBLE_COLLECTIONS_PATHS);
        collections.extend(
            settings
                .collection_roots
                .iter()
                .map(|root| root.join("ansible_collections"))
                .filter(|dir| dir.exists())
                .map(|dir| dir.display().to_string()),
        );
        let collections = collections.join(PATH_LIST_SEPARATOR);
        env.insert(ENV_ANSIBLE_COLLECTIONS_PATHS.to_string(), collections.clone());
        vars.insert(Value::from("collections_paths"), Value::from(collections));

        let config = default_var(&mut env, ENV_ANSIBLE_CONFIG, || {
            settings.repo_dir.join("ansible-config").join("ansible.cfg")
        });
        log::info!("Using '{config}' as ansible configuration file.");

        let json_log = default_var(&mut env, ENV_ANSIBLE_JSON_LOG, || {
            extra_logs_dir.join("_ansible.log.json")
        });
        log::info!("Using '{json_log}' as ansible json log file.");

        let prepared = Self {
            env,
            artifact_dir,
            extra_logs_dir,
            vars,
            remote_host,
        };
        prepared.write_records(invocation, settings)?;

        Ok(prepared)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    fn write_records(&self, invocation: &Invocation, settings: &InvokerSettings) -> Result<()> {
        let dir = &self.extra_logs_dir;

        let argv: Vec<String> = settings.argv.iter().map(|a| shell_quote(a)).collect();
        dir.write(CMD_FILE, &format!("{}\n", argv.join(" ")))?;

        let (key, args) = match &invocation.command_args {
            Some(command_args) => (command_args.key.clone(), &command_args.args),
            None => (invocation.command_name("", ""), &invocation.args),
        };

        let mut lines = vec![format!(
            "{} run {} {}",
            settings.program, invocation.group, invocation.command
        )];
        for (name, value) in args {
            lines.push(format!(
                "   --arg {}",
                shell_quote(&format!("{}={}", render_value(name), render_value(value)))
            ));
        }
        dir.write(GEN_CMD_FILE, &format!("{}\n", lines.join(" \\\n")))?;

        let mut dump = Mapping::new();
        dump.insert(Value::from(key), Value::Mapping(args.clone()));
        dir.write(ARGS_FILE, &serde_yaml::to_string(&dump)?)?;

        let env_dump: String = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect();
        dir.write(ENV_DUMP_FILE, &env_dump)?;

        Ok(())
    }
}

/// Set `key` to `default()` unless present; returns the final value
fn default_var(env: &mut BTreeMap<String, String>, key: &str, default: impl FnOnce() -> PathBuf) -> String {
    env.entry(key.to_string())
        .or_insert_with(|| default().display().to_string())
        .clone()
}

fn existing_list(env: &BTreeMap<String, String>, key: &str) -> Vec<String> {
    env.get(key)
        .filter(|value| !value.is_empty())
        .map(|value| vec![value.clone()])
        .unwrap_or_default()
}

/// Every `<repo>/projects/*/toolbox` directory, sorted
fn role_dirs(repo_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(repo_dir.join("projects")) else {
        return Vec::new();
    };

    let mut dirs: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path().join("toolbox"))
        .filter(|dir| dir.is_dir())
        .map(|dir| dir.display().to_string())
        .collect();
    dirs.sort();
    dirs
}

fn create_parent(path: &str) -> Result<()> {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| RoleError::io(format!("failed to create {}", parent.display()), e)),
        _ => Ok(()),
    }
}

/// Quote a word for a POSIX shell, leaving plain words untouched
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::CommandArgs;
    use tempfile::TempDir;

    fn settings(tmp: &TempDir) -> InvokerSettings {
        let repo = tmp.path().join("repo");
        fs::create_dir_all(repo.join("projects/cluster/toolbox")).unwrap();
        fs::create_dir_all(repo.join("projects/notes")).unwrap();
        let collections = tmp.path().join("site");
        fs::create_dir_all(collections.join("ansible_collections")).unwrap();

        let base_env = BTreeMap::from([
            (
                ENV_ARTIFACT_DIR.to_string(),
                tmp.path().join("artifacts").display().to_string(),
            ),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);

        InvokerSettings {
            repo_dir: repo,
            collection_roots: vec![collections, tmp.path().join("missing")],
            playbook_dir: tmp.path().to_path_buf(),
            base_env,
            argv: vec!["keel".into(), "run".into(), "cluster".into(), "capture env".into()],
            program: "keel".into(),
        }
    }

    fn invocation() -> Invocation {
        Invocation::new("cluster_capture_environment", "cluster", "capture_environment")
            .with_arg("namespace", "ns")
            .mapped_params(true)
    }

    #[test]
    fn test_prepare_allocates_and_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);

        let prepared = PreparedEnvironment::prepare(&invocation(), &settings).unwrap();

        assert_eq!(prepared.extra_logs_dir.name(), "000__cluster__capture_environment");
        assert!(prepared.extra_logs_dir.path().is_dir());
        assert_eq!(
            prepared.get(ENV_EXTRA_LOGS_DIR),
            Some(prepared.extra_logs_dir.path().display().to_string().as_str())
        );
        assert!(prepared.get(ENV_ANSIBLE_LOG_PATH).unwrap().ends_with("_ansible.log"));
        assert!(prepared.get(ENV_ANSIBLE_ROLES_PATH).unwrap().ends_with("projects/cluster/toolbox"));
        assert!(prepared.get(ENV_ANSIBLE_COLLECTIONS_PATHS).unwrap().ends_with("site/ansible_collections"));
        assert!(prepared.get(ENV_ANSIBLE_CONFIG).unwrap().ends_with("ansible-config/ansible.cfg"));

        assert_eq!(
            prepared.vars.get("cluster_capture_environment_namespace"),
            Some(&Value::from("ns"))
        );
        assert!(prepared.vars.contains_key("artifact_extra_logs_dir"));
        assert!(prepared.vars.contains_key("roles_path"));
    }

    #[test]
    fn test_prepare_keeps_existing_values() {
        let tmp = TempDir::new().unwrap();
        let mut settings = settings(&tmp);
        settings.base_env.insert(ENV_ANSIBLE_CONFIG.into(), "/etc/ansible.cfg".into());
        settings.base_env.insert(ENV_ANSIBLE_ROLES_PATH.into(), "/roles".into());
        settings.base_env.insert(ENV_NAME_PREFIX.into(), "pre_".into());

        let prepared = PreparedEnvironment::prepare(&invocation(), &settings).unwrap();

        assert_eq!(prepared.get(ENV_ANSIBLE_CONFIG), Some("/etc/ansible.cfg"));
        assert!(prepared.get(ENV_ANSIBLE_ROLES_PATH).unwrap().starts_with("/roles:"));
        assert_eq!(prepared.extra_logs_dir.name(), "000__pre_cluster__capture_environment");
    }

    #[test]
    fn test_prepare_does_not_touch_process_env() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);

        let prepared = PreparedEnvironment::prepare(&invocation(), &settings).unwrap();
        let allocated = prepared.extra_logs_dir.path().display().to_string();
        assert_ne!(std::env::var(ENV_EXTRA_LOGS_DIR).ok(), Some(allocated));
    }

    #[test]
    fn test_records_written() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);
        let mut args = Mapping::new();
        args.insert("namespace".into(), "my ns".into());
        let invocation = invocation().with_command_args(CommandArgs {
            key: "cluster capture_environment".into(),
            args,
        });

        let prepared = PreparedEnvironment::prepare(&invocation, &settings).unwrap();
        let dir = prepared.extra_logs_dir.path();

        assert_eq!(
            fs::read_to_string(dir.join(CMD_FILE)).unwrap(),
            "keel run cluster 'capture env'\n"
        );
        assert_eq!(
            fs::read_to_string(dir.join(GEN_CMD_FILE)).unwrap(),
            "keel run cluster capture_environment \\\n   --arg 'namespace=my ns'\n"
        );
        let args: Value =
            serde_yaml::from_str(&fs::read_to_string(dir.join(ARGS_FILE)).unwrap()).unwrap();
        assert_eq!(
            args["cluster capture_environment"]["namespace"],
            Value::from("my ns")
        );
        assert!(fs::read_to_string(dir.join(ENV_DUMP_FILE)).unwrap().contains("PATH=/usr/bin\n"));
    }

    #[test]
    fn test_records_written_for_direct_runs() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(&tmp);

        let prepared = PreparedEnvironment::prepare(&invocation(), &settings).unwrap();
        let dir = prepared.extra_logs_dir.path();

        assert!(dir.join(CMD_FILE).is_file());
        assert!(dir.join(ENV_DUMP_FILE).is_file());
        assert_eq!(
            fs::read_to_string(dir.join(GEN_CMD_FILE)).unwrap(),
            "keel run cluster capture_environment \\\n   --arg namespace=ns\n"
        );
        let args: Value =
            serde_yaml::from_str(&fs::read_to_string(dir.join(ARGS_FILE)).unwrap()).unwrap();
        assert_eq!(args["cluster capture_environment"]["namespace"], Value::from("ns"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-word_1.yaml"), "plain-word_1.yaml");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
