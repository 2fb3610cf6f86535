//! The configuration store
//!
//! One YAML document per process, loaded from a backing file and rewritten in
//! full after every mutation. Reads resolve references and may happen from
//! any thread; writes are confined to the thread that opened the store.

use crate::error::{ConfigError, Result};
use crate::path::ConfigPath;
use crate::reference::{Lookup, MAX_REFERENCE_DEPTH, Reference, ReferenceResolver, render_value};
use artifacts::ArtifactDir;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

/// Marker appended to when a write is attempted from a foreign thread in CI
pub const THREAD_VIOLATION_MARKER: &str = "SET_CONFIG_CALLED_FROM_THREAD";

/// Name of the config file mirrored into the shared directory
pub const SHARED_CONFIG_FILE: &str = "config.yaml";

/// Environment variables identifying a CI run
pub const CI_ENV_VARS: &[&str] = &["OPENSHIFT_CI", "PERFLAB_CI"];

/// Environment variable naming the directory shared between CI steps
pub const ENV_SHARED_DIR: &str = "SHARED_DIR";

/// Where the store writes its side files, and how it reacts to misuse
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Artifact directory receiving marker and audit files
    pub artifact_dir: ArtifactDir,
    /// Directory the document is mirrored into, when it exists
    pub shared_dir: Option<PathBuf>,
    /// Log foreign-thread writes instead of failing
    pub soft_thread_violations: bool,
}

impl StoreOptions {
    pub fn new(artifact_dir: ArtifactDir) -> Self {
        Self {
            artifact_dir,
            shared_dir: None,
            soft_thread_violations: false,
        }
    }

    /// Options for the current process: `SHARED_DIR` mirroring, and soft
    /// thread violations when running in CI
    pub fn from_env(artifact_dir: ArtifactDir) -> Self {
        Self {
            artifact_dir,
            shared_dir: std::env::var_os(ENV_SHARED_DIR).map(PathBuf::from),
            soft_thread_violations: running_in_ci(),
        }
    }
}

/// Whether one of the CI marker variables is set
pub fn running_in_ci() -> bool {
    CI_ENV_VARS
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()))
}

/// Options of a single read
#[derive(Debug, Clone)]
pub struct GetOptions {
    /// Returned, unresolved, when the path is missing
    pub default: Option<Value>,
    /// The caller will not print the value; secret references may resolve
    pub handled_secretly: bool,
    /// Warn when falling back to the default
    pub warn: bool,
    /// Log the resolved value
    pub print: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            default: None,
            handled_secretly: false,
            warn: true,
            print: true,
        }
    }
}

impl GetOptions {
    pub fn quiet() -> Self {
        Self {
            print: false,
            ..Self::default()
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn secretly(mut self) -> Self {
        self.handled_secretly = true;
        self
    }

    pub fn no_warn(mut self) -> Self {
        self.warn = false;
        self
    }
}

/// The process-wide configuration document
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    document: RwLock<Value>,
    owner: ThreadId,
    options: StoreOptions,
}

impl ConfigStore {
    /// Load the backing file. The calling thread becomes the owner.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            log::error!("Configuration file '{}' does not exist", path.display());
            return Err(ConfigError::MissingFile(path));
        }

        log::info!("Loading configuration from {} ...", path.display());
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let document = parse_document(&path, &content)?;

        Ok(Self::from_document(path, document, options))
    }

    /// Wrap an in-memory document. Mutations are still written to `path`.
    pub fn from_document(path: impl Into<PathBuf>, document: Value, options: StoreOptions) -> Self {
        Self {
            path: path.into(),
            document: RwLock::new(document),
            owner: thread::current().id(),
            options,
        }
    }

    /// Backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn artifact_dir(&self) -> &ArtifactDir {
        &self.options.artifact_dir
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn read(&self) -> RwLockReadGuard<'_, Value> {
        match self.document.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Value> {
        match self.document.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Resolved value at `path`
    pub fn get(&self, path: &str) -> Result<Value> {
        self.get_with(path, GetOptions::default())
    }

    pub fn get_with(&self, path: &str, options: GetOptions) -> Result<Value> {
        self.get_at_depth(path, &options, 0)
    }

    /// Resolved value, not logged
    pub fn get_quiet(&self, path: &str) -> Result<Value> {
        self.get_with(path, GetOptions::quiet())
    }

    /// Resolved value, or `default` when the path is missing
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Result<Value> {
        self.get_with(path, GetOptions::default().with_default(default))
    }

    /// Read a value the caller keeps secret; secret references resolve
    pub fn get_secret(&self, path: &str) -> Result<Value> {
        self.get_with(path, GetOptions::quiet().secretly())
    }

    /// Resolved value deserialized into `T`
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.get_quiet(path)?;
        serde_yaml::from_value(value).map_err(|source| ConfigError::Convert {
            path: path.to_string(),
            source,
        })
    }

    /// Stored value, references left as written
    pub fn get_raw(&self, path: &str) -> Result<Value> {
        let parsed = ConfigPath::parse(path)?;
        parsed
            .lookup(&self.read())
            .cloned()
            .ok_or_else(|| self.not_found(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        ConfigPath::parse(path).is_ok_and(|parsed| parsed.lookup(&self.read()).is_some())
    }

    /// Snapshot of the whole document
    pub fn document(&self) -> Value {
        self.read().clone()
    }

    fn get_at_depth(&self, path: &str, options: &GetOptions, depth: usize) -> Result<Value> {
        if depth > MAX_REFERENCE_DEPTH {
            return Err(ConfigError::ReferenceDepth {
                path: path.to_string(),
                limit: MAX_REFERENCE_DEPTH,
            });
        }

        let parsed = ConfigPath::parse(path)?;
        // Clone out so that nested lookups do not hold the lock
        let raw = parsed.lookup(&self.read()).cloned();

        let Some(raw) = raw else {
            if let Some(default) = &options.default {
                if options.warn {
                    log::warn!(
                        "get_config: {path} --> missing. Returning the default value: {}",
                        render_value(default)
                    );
                }
                return Ok(default.clone());
            }
            log::error!("get_config: {path} --> not found");
            return Err(self.not_found(path));
        };

        let value = ReferenceResolver::new(self, options.handled_secretly, depth).resolve(&raw)?;

        if options.print && !options.handled_secretly && !Reference::looks_secret(&raw) {
            log::info!("get_config: {path} --> {}", render_value(&value));
        }

        Ok(value)
    }

    fn not_found(&self, path: &str) -> ConfigError {
        ConfigError::KeyNotFound {
            path: path.to_string(),
            file: Some(self.path.clone()),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Overwrite an existing value and persist the document
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.set_with(path, value, true)
    }

    pub fn set_with(&self, path: &str, value: impl Into<Value>, print: bool) -> Result<()> {
        self.store(path, value.into(), print, false)
    }

    /// Like [`ConfigStore::set_with`], but a missing top-level key or a
    /// missing entry of an existing mapping is created
    pub(crate) fn upsert(&self, path: &str, value: Value, print: bool) -> Result<()> {
        self.store(path, value, print, true)
    }

    fn store(&self, path: &str, value: Value, print: bool, create: bool) -> Result<()> {
        let rendered = render_value(&value);
        if !self.check_owner(path, &rendered)? {
            return Ok(());
        }

        let parsed = ConfigPath::parse(path)?;
        {
            let mut document = self.write();
            match parsed.lookup_mut(&mut document) {
                Some(slot) => *slot = value,
                None if create => parsed.insert(&mut document, value)?,
                None => {
                    log::error!("set_config: {path}={rendered} --> key not found");
                    return Err(self.not_found(path));
                }
            }
        }

        if print {
            log::info!("set_config: {path} --> {rendered}");
        }

        self.persist()
    }

    /// Returns false when the write must be dropped
    fn check_owner(&self, path: &str, rendered: &str) -> Result<bool> {
        if thread::current().id() == self.owner {
            return Ok(true);
        }

        let msg = format!(
            "set_config({path}, {rendered}) cannot be called from a thread, to avoid race conditions."
        );
        if !self.options.soft_thread_violations {
            return Err(ConfigError::ThreadViolation {
                path: path.to_string(),
            });
        }

        log::error!("{msg}");
        self.options
            .artifact_dir
            .append_line(THREAD_VIOLATION_MARKER, &msg)?;
        Ok(false)
    }

    /// Set `path` for the duration of `f`, then restore the previous value,
    /// whether or not `f` succeeded
    pub fn with_temp_value<T, E, F>(&self, path: &str, value: impl Into<Value>, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Self) -> std::result::Result<T, E>,
        E: From<ConfigError>,
    {
        let previous = self.get_raw(path)?;
        self.set(path, value)?;

        let result = f(self);
        let restored = self.set(path, previous);

        match (result, restored) {
            (Ok(_), Err(err)) => Err(err.into()),
            (result, _) => result,
        }
    }

    /// Write the document to the backing file, and to the shared directory
    /// when it exists
    pub fn persist(&self) -> Result<()> {
        let content = {
            let document = self.read();
            serde_yaml::to_string(&*document).map_err(ConfigError::Serialize)?
        };

        write_file(&self.path, &content)?;

        if let Some(shared) = self.options.shared_dir.as_deref().filter(|d| d.is_dir()) {
            write_file(&shared.join(SHARED_CONFIG_FILE), &content)?;
        }
        Ok(())
    }
}

impl Lookup for ConfigStore {
    fn resolve_path(&self, path: &str, depth: usize) -> Result<Value> {
        self.get_at_depth(path, &GetOptions::quiet(), depth)
    }
}

/// Parse a YAML document; an empty file is an empty mapping
pub fn parse_document(path: &Path, content: &str) -> Result<Value> {
    let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(match value {
        Value::Null => Value::Mapping(serde_yaml::Mapping::new()),
        other => other,
    })
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DOC: &str = r#"
a:
  b: 1
  list: [x, y]
name: keel
label: "run-{@name}-{@a.b}"
alias: "@a"
secrets:
  dir:
    env_key: KEEL_TEST_STORE_SECRETS_DIR
  token_file: token
token: "*$@secrets.token_file"
loop: "@loop"
"#;

    fn store(tmp: &TempDir) -> ConfigStore {
        let path = tmp.path().join("config.yaml");
        fs::write(&path, DOC).unwrap();
        let artifacts = ArtifactDir::open(tmp.path().join("artifacts")).unwrap();
        ConfigStore::open(path, StoreOptions::new(artifacts)).unwrap()
    }

    #[test]
    fn test_open_missing_file() {
        let tmp = TempDir::new().unwrap();
        let artifacts = ArtifactDir::open(tmp.path()).unwrap();
        let err = ConfigStore::open(tmp.path().join("nope.yaml"), StoreOptions::new(artifacts))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }

    #[test]
    fn test_open_empty_file_is_mapping() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        fs::write(&path, "").unwrap();
        let artifacts = ArtifactDir::open(tmp.path()).unwrap();
        let store = ConfigStore::open(path, StoreOptions::new(artifacts)).unwrap();
        assert!(store.document().is_mapping());
    }

    #[test]
    fn test_get_and_default() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        assert_eq!(store.get("a.b").unwrap(), Value::from(1));
        assert_eq!(store.get("a.list[1]").unwrap(), Value::from("y"));
        assert_eq!(store.get_or("a.missing", 7).unwrap(), Value::from(7));

        let err = store.get("a.missing").unwrap_err();
        assert!(matches!(err, ConfigError::KeyNotFound { .. }));
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        store.set("a.b", 42).unwrap();
        assert_eq!(store.get("a.b").unwrap(), Value::from(42));

        let reloaded = ConfigStore::open(
            store.path(),
            StoreOptions::new(store.artifact_dir().clone()),
        )
        .unwrap();
        assert_eq!(reloaded.get("a.b").unwrap(), Value::from(42));
    }

    #[test]
    fn test_set_requires_existing_path() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let err = store.set("a.c", 1).unwrap_err();
        assert!(matches!(err, ConfigError::KeyNotFound { .. }));
        assert!(!store.contains("a.c"));
    }

    #[test]
    fn test_references_resolve() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        assert_eq!(store.get("label").unwrap(), Value::from("run-keel-1"));
        assert!(matches!(
            store.get("alias.b").unwrap_err(),
            ConfigError::KeyNotFound { .. }
        ));
        assert_eq!(
            store.get("alias").unwrap(),
            serde_yaml::from_str::<Value>("{b: 1, list: [x, y]}").unwrap()
        );
        assert_eq!(store.get_raw("alias").unwrap(), Value::from("@a"));
    }

    #[test]
    fn test_reference_result_is_not_aliased() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let mut resolved = store.get("alias").unwrap();
        resolved["b"] = Value::from(9);
        assert_eq!(store.get("a.b").unwrap(), Value::from(1));

        store.set("a.b", 5).unwrap();
        assert_eq!(store.get("alias").unwrap()["b"], Value::from(5));
        assert_eq!(store.get_raw("alias").unwrap(), Value::from("@a"));
    }

    #[test]
    fn test_self_reference_is_bounded() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let err = store.get("loop").unwrap_err();
        assert!(matches!(err, ConfigError::ReferenceDepth { .. }));
    }

    #[test]
    fn test_secret_requires_handled_secretly() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let err = store.get("token").unwrap_err();
        assert!(matches!(err, ConfigError::SecretNotHandled { .. }));
    }

    #[test]
    fn test_secret_reads_file() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let secrets = tmp.path().join("secrets");
        fs::create_dir(&secrets).unwrap();
        fs::write(secrets.join("token"), "  s3cr3t\n").unwrap();

        // SAFETY: the variable name is unique to this test
        unsafe { std::env::set_var("KEEL_TEST_STORE_SECRETS_DIR", &secrets) };
        let value = store.get_secret("token").unwrap();
        unsafe { std::env::remove_var("KEEL_TEST_STORE_SECRETS_DIR") };

        assert_eq!(value, Value::from("s3cr3t"));
    }

    #[test]
    fn test_set_from_other_thread_fails() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let before = store.document();

        let result = thread::scope(|s| s.spawn(|| store.set("a.b", 2)).join().unwrap());

        assert!(matches!(result, Err(ConfigError::ThreadViolation { .. })));
        assert_eq!(store.document(), before);
    }

    #[test]
    fn test_set_from_other_thread_soft_mode() {
        let tmp = TempDir::new().unwrap();
        let mut options = StoreOptions::new(ArtifactDir::open(tmp.path().join("art")).unwrap());
        options.soft_thread_violations = true;
        let store = ConfigStore::from_document(
            tmp.path().join("config.yaml"),
            serde_yaml::from_str("a: {b: 1}").unwrap(),
            options,
        );
        let before = store.document();

        thread::scope(|s| s.spawn(|| store.set("a.b", 2).unwrap()).join().unwrap());

        assert_eq!(store.document(), before);
        let marker = store.artifact_dir().join(THREAD_VIOLATION_MARKER);
        assert!(fs::read_to_string(marker).unwrap().contains("set_config(a.b, 2)"));
    }

    #[test]
    fn test_reads_from_other_thread() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let value = thread::scope(|s| s.spawn(|| store.get("label").unwrap()).join().unwrap());
        assert_eq!(value, Value::from("run-keel-1"));
    }

    #[test]
    fn test_shared_dir_mirror() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("shared");
        fs::create_dir(&shared).unwrap();

        let mut options = StoreOptions::new(ArtifactDir::open(tmp.path().join("art")).unwrap());
        options.shared_dir = Some(shared.clone());
        let store = ConfigStore::from_document(
            tmp.path().join("config.yaml"),
            serde_yaml::from_str("a: 1").unwrap(),
            options,
        );

        store.set("a", 2).unwrap();
        let mirrored = fs::read_to_string(shared.join(SHARED_CONFIG_FILE)).unwrap();
        assert!(mirrored.contains("a: 2"));
    }

    #[test]
    fn test_persist_keeps_insertion_order() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.set("name", "other").unwrap();

        let content = fs::read_to_string(store.path()).unwrap();
        let a = content.find("a:").unwrap();
        let name = content.find("name:").unwrap();
        let secrets = content.find("secrets:").unwrap();
        assert!(a < name && name < secrets);
    }

    #[test]
    fn test_with_temp_value_restores() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let seen: Result<Value> = store.with_temp_value("a.b", 9, |s| s.get("a.b"));
        assert_eq!(seen.unwrap(), Value::from(9));
        assert_eq!(store.get("a.b").unwrap(), Value::from(1));

        let failed: Result<()> = store.with_temp_value("a.b", 9, |_| {
            Err(ConfigError::PresetNotFound("x".into()))
        });
        assert!(failed.is_err());
        assert_eq!(store.get("a.b").unwrap(), Value::from(1));
    }

    #[test]
    fn test_get_as() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let list: Vec<String> = store.get_as("a.list").unwrap();
        assert_eq!(list, vec!["x", "y"]);
        assert!(store.get_as::<u32>("name").is_err());
    }
}
