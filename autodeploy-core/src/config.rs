//! Agent configuration.
//!
//! # Layering
//!
//! ```text
//! built-in defaults
//!   < YAML file   (--config, $AUTODEPLOY_CONFIG, or ~/.autodeploy/config.yaml)
//!   < environment (AUTODEPLOY_WORK_DIR, AUTODEPLOY_BRANCH, ...)
//!   < CLI flags   (applied by the binary)
//! ```
//!
//! The merged value is built once at startup and passed by reference to
//! everything that needs it.
//!
//! # API pattern
//!
//! As with the rest of the workspace, functions that touch the home
//! directory come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "AUTODEPLOY_CONFIG";

pub const ENV_WORK_DIR: &str = "AUTODEPLOY_WORK_DIR";
pub const ENV_BRANCH: &str = "AUTODEPLOY_BRANCH";
pub const ENV_REMOTE: &str = "AUTODEPLOY_REMOTE";
pub const ENV_PROCESS_NAME: &str = "AUTODEPLOY_PROCESS_NAME";
pub const ENV_LOG_FILE: &str = "AUTODEPLOY_LOG_FILE";

/// Everything the agent needs to know about the deployment it manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Root of the working copy that is kept in sync and deployed.
    pub work_dir: PathBuf,
    /// Name the supervised process is registered under. Defaults to the
    /// working directory's final component.
    pub process_name: String,
    /// Branch that is tracked and pulled.
    pub branch: String,
    /// Remote the branch is fetched from.
    pub remote: String,
    /// Append-only log file. Defaults to `<work_dir>/logs/auto-deploy.log`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Dependency manifest, relative to `work_dir`.
    pub manifest_file: PathBuf,
    /// Build output directory removed before each build, relative to `work_dir`.
    pub build_output_dir: PathBuf,
    /// Dependency install command, run only when the manifest changed.
    pub install_command: Vec<String>,
    /// Build command, run after every successful sync.
    pub build_command: Vec<String>,
    /// Process supervisor executable.
    pub supervisor: String,
    /// Declarative process definition, relative to `work_dir`.
    pub process_file: PathBuf,
    /// Script started under `process_name` when there is no process file.
    pub entry_point: PathBuf,
    /// Label identifying stashes the agent may restore during recovery.
    pub stash_label: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::new(),
            process_name: String::new(),
            branch: "main".to_string(),
            remote: "origin".to_string(),
            log_file: None,
            manifest_file: PathBuf::from("package.json"),
            build_output_dir: PathBuf::from("dist"),
            install_command: vec![
                "npm".to_string(),
                "install".to_string(),
                "--legacy-peer-deps".to_string(),
            ],
            build_command: vec!["npm".to_string(), "run".to_string(), "build".to_string()],
            supervisor: "pm2".to_string(),
            process_file: PathBuf::from("ecosystem.config.js"),
            entry_point: PathBuf::from("dist/server.js"),
            stash_label: "auto-deploy-preserve".to_string(),
        }
    }
}

impl AgentConfig {
    /// Override fields from environment-style variables.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_WORK_DIR) {
            self.work_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_BRANCH) {
            self.branch = v;
        }
        if let Some(v) = non_empty(ENV_REMOTE) {
            self.remote = v;
        }
        if let Some(v) = non_empty(ENV_PROCESS_NAME) {
            self.process_name = v;
        }
        if let Some(v) = non_empty(ENV_LOG_FILE) {
            self.log_file = Some(PathBuf::from(v));
        }
    }

    /// Fill derived defaults and validate. Call once after all layers are applied.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        if self.work_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "work_dir is not set (config file, ${ENV_WORK_DIR} or --work-dir)"
            )));
        }
        if self.process_name.trim().is_empty() {
            self.process_name = self
                .work_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values that would produce unsafe or meaningless commands.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ref_name(&self.branch, "branch")?;
        validate_ref_name(&self.remote, "remote")?;
        if self.process_name.trim().is_empty() {
            return Err(ConfigError::Invalid("process_name cannot be empty".into()));
        }
        if self.install_command.is_empty() {
            return Err(ConfigError::Invalid("install_command cannot be empty".into()));
        }
        if self.build_command.is_empty() {
            return Err(ConfigError::Invalid("build_command cannot be empty".into()));
        }
        if self.supervisor.trim().is_empty() {
            return Err(ConfigError::Invalid("supervisor cannot be empty".into()));
        }
        if self.stash_label.trim().is_empty() {
            return Err(ConfigError::Invalid("stash_label cannot be empty".into()));
        }
        Ok(())
    }

    /// Resolved log file path.
    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| self.work_dir.join("logs").join("auto-deploy.log"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.work_dir.join(&self.manifest_file)
    }

    pub fn build_output_path(&self) -> PathBuf {
        self.work_dir.join(&self.build_output_dir)
    }

    pub fn process_file_path(&self) -> PathBuf {
        self.work_dir.join(&self.process_file)
    }

    /// `<remote>/<branch>`, the remote-tracking ref compared against HEAD.
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

/// Branch and remote names end up as git arguments; refuse anything that
/// could be read as a flag or a range.
fn validate_ref_name(value: &str, name: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{name} cannot be empty")));
    }
    if value.starts_with('-') {
        return Err(ConfigError::Invalid(format!("{name} cannot start with '-'")));
    }
    if value.contains("..") {
        return Err(ConfigError::Invalid(format!("{name} cannot contain '..'")));
    }
    if value.bytes().any(|b| b < 0x20 || b == b' ') {
        return Err(ConfigError::Invalid(format!(
            "{name} cannot contain whitespace or control characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// `<home>/.autodeploy/config.yaml`. Pure, no I/O.
pub fn default_path_at(home: &Path) -> PathBuf {
    home.join(".autodeploy").join("config.yaml")
}

/// Load a config file. Missing fields take their defaults.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(path: &Path) -> Result<AgentConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(AgentConfig::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Pick the file layer: an explicit path must exist, the default location is
/// optional.
pub fn load_file_layer_at(
    home: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<AgentConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_at(path);
    }
    match home.map(default_path_at) {
        Some(path) if path.exists() => load_at(&path),
        _ => Ok(AgentConfig::default()),
    }
}

/// Build the file + environment layers from the real process environment.
///
/// `explicit` wins over `$AUTODEPLOY_CONFIG`, which wins over the default
/// location under the home directory. CLI overrides and [`AgentConfig::finalize`]
/// are left to the caller.
pub fn load(explicit: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let from_env = std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    let explicit = explicit.map(Path::to_path_buf).or(from_env);
    let home = dirs::home_dir();
    let mut config = load_file_layer_at(home.as_deref(), explicit.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

/// Render the effective configuration as YAML.
pub fn to_yaml(config: &AgentConfig) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(config)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
