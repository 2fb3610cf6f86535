//! Single-play, single-role playbook generation

use crate::environment::{ENV_PLAYBOOK_EXTRA_VARS, PreparedEnvironment};
use crate::error::{Result, RoleError};
use serde_yaml::{Mapping, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Archived copy of the generated play
pub const PLAY_FILE: &str = "_ansible.play.yaml";

/// Program running the play
pub const PLAYBOOK_PROGRAM: &str = "ansible-playbook";

/// A generated playbook, ready to run.
///
/// The runnable copy lives next to the roles and is removed when this value
/// is dropped. In remote mode the inventory lives in an unlinked file only
/// reachable through this process's file descriptor table.
#[derive(Debug)]
pub struct GeneratedPlaybook {
    play: Value,
    archived: PathBuf,
    runnable: NamedTempFile,
    inventory: Option<(File, String)>,
}

impl GeneratedPlaybook {
    pub fn generate(role: &str, prepared: &PreparedEnvironment, playbook_dir: &Path) -> Result<Self> {
        let mut play = Mapping::new();
        play.insert("name".into(), format!("Run {role} role").into());
        play.insert("roles".into(), Value::Sequence(vec![role.into()]));

        let mut vars = prepared.vars.clone();
        if let Some(extra) = prepared.get(ENV_PLAYBOOK_EXTRA_VARS).filter(|f| !f.is_empty()) {
            vars.extend(load_extra_vars(Path::new(extra))?);
        }
        play.insert("vars".into(), Value::Mapping(vars));

        let inventory = match &prepared.remote_host {
            Some(host) => {
                // gather only the environment facts
                play.insert("gather_facts".into(), true.into());
                play.insert(
                    "gather_subset".into(),
                    Value::Sequence(vec!["env".into(), "!all".into(), "!min".into()]),
                );
                play.insert("hosts".into(), "remote".into());
                Some(write_inventory(host)?)
            }
            None => {
                play.insert("connection".into(), "local".into());
                play.insert("hosts".into(), "localhost".into());
                play.insert("gather_facts".into(), false.into());
                None
            }
        };

        let play = Value::Sequence(vec![Value::Mapping(play)]);
        let content = serde_yaml::to_string(&play)?;

        let archived = prepared.extra_logs_dir.write(PLAY_FILE, &content)?;

        let mut runnable = tempfile::Builder::new()
            .prefix(&format!("tmp_play_{}_", prepared.extra_logs_dir.name()))
            .suffix(".yaml")
            .tempfile_in(playbook_dir)
            .map_err(|e| RoleError::io(format!("failed to create a playbook in {}", playbook_dir.display()), e))?;
        runnable
            .write_all(content.as_bytes())
            .and_then(|()| runnable.flush())
            .map_err(|e| RoleError::io(format!("failed to write {}", runnable.path().display()), e))?;

        log::debug!("Generated playbook {}", runnable.path().display());

        Ok(Self {
            play,
            archived,
            runnable,
            inventory,
        })
    }

    /// The play document
    pub fn play(&self) -> &Value {
        &self.play
    }

    /// Path of the runnable copy
    pub fn path(&self) -> &Path {
        self.runnable.path()
    }

    pub fn archived(&self) -> &Path {
        &self.archived
    }

    pub fn inventory_path(&self) -> Option<&str> {
        self.inventory.as_ref().map(|(_, path)| path.as_str())
    }

    /// `ansible-playbook -vv <play> [--inventory-file <fd path>]`
    pub fn command(&self) -> Vec<String> {
        let mut argv = vec![
            PLAYBOOK_PROGRAM.to_string(),
            "-vv".to_string(),
            self.path().display().to_string(),
        ];
        if let Some(inventory) = self.inventory_path() {
            argv.push("--inventory-file".to_string());
            argv.push(inventory.to_string());
        }
        argv
    }
}

fn load_extra_vars(path: &Path) -> Result<Mapping> {
    let content = fs::read_to_string(path)
        .map_err(|e| RoleError::io(format!("failed to read {}", path.display()), e))?;

    let value: Value = serde_yaml::from_str(&content).map_err(|source| {
        log::error!(
            "Could not parse file {ENV_PLAYBOOK_EXTRA_VARS}='{}' as yaml ...",
            path.display()
        );
        RoleError::ExtraVars {
            path: path.to_path_buf(),
            source,
        }
    })?;

    match value {
        Value::Mapping(extra) => Ok(extra),
        Value::Null => Ok(Mapping::new()),
        _ => Err(RoleError::NotAMapping {
            what: format!("{ENV_PLAYBOOK_EXTRA_VARS} file {}", path.display()),
        }),
    }
}

/// Inventory of the remote host; `user@host` sets `ansible_user`
pub fn inventory_content(remote_host: &str) -> String {
    let (user, host) = match remote_host.rsplit_once('@') {
        Some((user, host)) => (Some(user), host),
        None => (None, remote_host),
    };
    let properties = user
        .map(|user| format!("ansible_user={user}"))
        .unwrap_or_default();

    format!("\n[all:vars]\n\n[remote]\n{host} {properties}\n")
}

#[cfg(unix)]
fn write_inventory(remote_host: &str) -> Result<(File, String)> {
    use std::os::unix::io::AsRawFd;

    let mut file = tempfile::tempfile()
        .map_err(|e| RoleError::io("failed to create the inventory file", e))?;
    file.write_all(inventory_content(remote_host).as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| RoleError::io("failed to write the inventory file", e))?;

    let path = format!("/proc/{}/fd/{}", std::process::id(), file.as_raw_fd());
    Ok((file, path))
}

#[cfg(not(unix))]
fn write_inventory(_remote_host: &str) -> Result<(File, String)> {
    Err(RoleError::RemoteUnsupported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::InvokerSettings;
    use crate::invocation::Invocation;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn prepare(tmp: &TempDir, extra_env: &[(&str, String)]) -> PreparedEnvironment {
        let mut base_env = BTreeMap::from([(
            artifacts::ENV_ARTIFACT_DIR.to_string(),
            tmp.path().join("artifacts").display().to_string(),
        )]);
        for (key, value) in extra_env {
            base_env.insert((*key).to_string(), value.clone());
        }

        let settings = InvokerSettings {
            repo_dir: tmp.path().join("repo"),
            collection_roots: Vec::new(),
            playbook_dir: tmp.path().to_path_buf(),
            base_env,
            argv: vec!["keel".into()],
            program: "keel".into(),
        };
        let invocation = Invocation::new("my_role", "group", "command").with_arg("x", 1);
        PreparedEnvironment::prepare(&invocation, &settings).unwrap()
    }

    #[test]
    fn test_local_play() {
        let tmp = TempDir::new().unwrap();
        let prepared = prepare(&tmp, &[]);

        let playbook = GeneratedPlaybook::generate("my_role", &prepared, tmp.path()).unwrap();
        let play = &playbook.play()[0];

        assert_eq!(play["name"], Value::from("Run my_role role"));
        assert_eq!(play["roles"][0], Value::from("my_role"));
        assert_eq!(play["hosts"], Value::from("localhost"));
        assert_eq!(play["connection"], Value::from("local"));
        assert_eq!(play["gather_facts"], Value::from(false));
        assert_eq!(play["vars"]["x"], Value::from(1));
        assert!(playbook.inventory_path().is_none());

        assert!(playbook.archived().exists());
        assert_eq!(
            fs::read_to_string(playbook.archived()).unwrap(),
            fs::read_to_string(playbook.path()).unwrap()
        );

        let argv = playbook.command();
        assert_eq!(argv[..2], ["ansible-playbook", "-vv"]);
    }

    #[test]
    fn test_runnable_copy_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let prepared = prepare(&tmp, &[]);

        let playbook = GeneratedPlaybook::generate("my_role", &prepared, tmp.path()).unwrap();
        let path = playbook.path().to_path_buf();
        let archived = playbook.archived().to_path_buf();
        assert!(path.exists());

        drop(playbook);
        assert!(!path.exists());
        assert!(archived.exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_remote_play() {
        let tmp = TempDir::new().unwrap();
        let prepared = prepare(&tmp, &[(crate::environment::ENV_REMOTE_HOST, "core@10.0.0.1".into())]);

        let playbook = GeneratedPlaybook::generate("my_role", &prepared, tmp.path()).unwrap();
        let play = &playbook.play()[0];

        assert_eq!(play["hosts"], Value::from("remote"));
        assert_eq!(play["gather_facts"], Value::from(true));
        assert!(play.get("connection").is_none());

        let inventory = playbook.inventory_path().unwrap();
        assert!(inventory.starts_with("/proc/"));
        assert_eq!(
            fs::read_to_string(inventory).unwrap(),
            inventory_content("core@10.0.0.1")
        );
        assert!(playbook.command().contains(&"--inventory-file".to_string()));
    }

    #[test]
    fn test_extra_vars_merged() {
        let tmp = TempDir::new().unwrap();
        let extra = tmp.path().join("extra.yaml");
        fs::write(&extra, "x: 2\ny: added\n").unwrap();
        let prepared = prepare(&tmp, &[(ENV_PLAYBOOK_EXTRA_VARS, extra.display().to_string())]);

        let playbook = GeneratedPlaybook::generate("my_role", &prepared, tmp.path()).unwrap();
        let vars = &playbook.play()[0]["vars"];
        assert_eq!(vars["x"], Value::from(2));
        assert_eq!(vars["y"], Value::from("added"));
    }

    #[test]
    fn test_extra_vars_parse_error() {
        let tmp = TempDir::new().unwrap();
        let extra = tmp.path().join("extra.yaml");
        fs::write(&extra, "a: [unclosed\n").unwrap();
        let prepared = prepare(&tmp, &[(ENV_PLAYBOOK_EXTRA_VARS, extra.display().to_string())]);

        let err = GeneratedPlaybook::generate("my_role", &prepared, tmp.path()).unwrap_err();
        assert!(matches!(err, RoleError::ExtraVars { .. }));
    }

    #[test]
    fn test_inventory_content() {
        assert_eq!(
            inventory_content("core@host"),
            "\n[all:vars]\n\n[remote]\nhost ansible_user=core\n"
        );
        assert_eq!(inventory_content("host"), "\n[all:vars]\n\n[remote]\nhost \n");
    }
}
