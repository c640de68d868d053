//! `kiln.toml` loading and logging setup.
//!
//! Config discovery order for a project root:
//! 1) `KILN_CONFIG` (absolute or relative to the project root)
//! 2) `kiln.toml`
//! 3) `.kiln/config.toml`
//!
//! Environment overrides (`KILN_*`) are applied after the file is read, see
//! [`KilnConfig::apply_env_overrides`].

use std::path::{Path, PathBuf};

use kiln_build::PublicationPolicy;
use kiln_core::{BuildOptions, EnvSource};
use kiln_testing::TestingOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod logging;

pub use logging::{init_tracing, LoggingConfig};

pub const KILN_CONFIG_ENV_VAR: &str = "KILN_CONFIG";

pub const INCREMENTAL_COMPILATION_ENV: &str = "KILN_INCREMENTAL_COMPILATION";
pub const USE_COMPILED_CLASSES_ENV: &str = "KILN_USE_COMPILED_CLASSES";
pub const COMPILED_CLASSES_ARCHIVE_ENV: &str = "KILN_COMPILED_CLASSES_ARCHIVE";
pub const COMPILED_CLASSES_ARCHIVES_METADATA_ENV: &str = "KILN_COMPILED_CLASSES_ARCHIVES_METADATA";
pub const OUTPUT_ROOT_ENV: &str = "KILN_OUTPUT_ROOT";
pub const SKIP_BUILD_STEPS_ENV: &str = "KILN_SKIP_BUILD_STEPS";
pub const JDK_VERSION_ENV: &str = "KILN_JDK_VERSION";
pub const LOG_LEVEL_ENV: &str = "KILN_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("invalid value `{value}` for {key}: {message}")]
    InvalidEnv {
        key: &'static str,
        value: String,
        message: String,
    },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // `Display` includes a source snippet; keep the message only.
        ConfigError::Toml(err.message().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    /// Java feature version of the primary toolchain.
    pub version: u32,
    /// Explicit JDK home; skips convention and env lookup.
    pub home: Option<PathBuf>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            version: 17,
            home: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// `<java> @<argfile>` per invocation.
    #[default]
    Forked,
    /// Hand a JSON request to `execution.task_runner`.
    TaskRunner,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionConfig {
    pub backend: BackendKind,
    /// Program and leading arguments of the external task runner.
    pub task_runner: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilnConfig {
    pub build: BuildOptions,
    pub toolchain: ToolchainConfig,
    pub testing: TestingOptions,
    pub execution: ExecutionConfig,
    pub publication: PublicationPolicy,
    pub logging: LoggingConfig,
}

impl KilnConfig {
    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a config file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_paths(dir);
        }
        Ok(config)
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |path: &mut Option<PathBuf>| {
            if let Some(p) = path.as_mut() {
                if p.is_relative() {
                    *p = base.join(&*p);
                }
            }
        };
        let build = &mut self.build;
        resolve(&mut build.path_to_compiled_classes_archive);
        resolve(&mut build.path_to_compiled_classes_archives_metadata);
        resolve(&mut build.output_root_path);
        resolve(&mut build.log_path);
        resolve(&mut build.jdks_target_dir);
        resolve(&mut build.project_classes_output_directory);
        resolve(&mut self.toolchain.home);
        resolve(&mut self.testing.native_agent);
        resolve(&mut self.logging.file);
    }

    /// Apply `KILN_*` overrides on top of the loaded file.
    pub fn apply_env_overrides(&mut self, env: &dyn EnvSource) -> Result<(), ConfigError> {
        let read = |key: &str| {
            env.var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(value) = read(INCREMENTAL_COMPILATION_ENV) {
            self.build.incremental_compilation = parse_bool(INCREMENTAL_COMPILATION_ENV, &value)?;
        }
        if let Some(value) = read(USE_COMPILED_CLASSES_ENV) {
            self.build.use_compiled_classes_from_project_output =
                parse_bool(USE_COMPILED_CLASSES_ENV, &value)?;
        }
        if let Some(value) = read(COMPILED_CLASSES_ARCHIVE_ENV) {
            self.build.path_to_compiled_classes_archive = Some(PathBuf::from(value));
        }
        if let Some(value) = read(COMPILED_CLASSES_ARCHIVES_METADATA_ENV) {
            self.build.path_to_compiled_classes_archives_metadata = Some(PathBuf::from(value));
        }
        if let Some(value) = read(OUTPUT_ROOT_ENV) {
            self.build.output_root_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read(SKIP_BUILD_STEPS_ENV) {
            self.build.build_steps_to_skip.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(value) = read(JDK_VERSION_ENV) {
            self.toolchain.version = value.parse().map_err(|err: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    key: JDK_VERSION_ENV,
                    value: value.clone(),
                    message: err.to_string(),
                }
            })?;
        }
        if let Some(value) = read(LOG_LEVEL_ENV) {
            self.logging.level = value;
        }
        Ok(())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key,
            value: value.to_string(),
            message: "expected a boolean".to_string(),
        }),
    }
}

/// Find the config file for `project_root`; see the crate docs for the
/// search order.
pub fn discover_config_path(project_root: &Path, env: &dyn EnvSource) -> Option<PathBuf> {
    if let Some(value) = env.var(KILN_CONFIG_ENV_VAR).filter(|v| !v.trim().is_empty()) {
        let candidate = PathBuf::from(value);
        let path = if candidate.is_absolute() {
            candidate
        } else {
            project_root.join(candidate)
        };
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["kiln.toml", ".kiln/config.toml"]
        .into_iter()
        .map(|name| project_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the config for `project_root` and apply environment overrides.
///
/// Without a config file the defaults are used and `None` is returned as the
/// path.
pub fn load_for_project(
    project_root: &Path,
    env: &dyn EnvSource,
) -> Result<(KilnConfig, Option<PathBuf>), ConfigError> {
    let path = discover_config_path(project_root, env);
    let mut config = match &path {
        Some(path) => KilnConfig::load_from_path(path)?,
        None => KilnConfig::default(),
    };
    config.apply_env_overrides(env)?;
    tracing::debug!(
        target: "kiln.config",
        path = ?path.as_ref().map(|p| p.display().to_string()),
        "loaded configuration"
    );
    Ok((config, path))
}
