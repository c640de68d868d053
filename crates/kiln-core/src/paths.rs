use std::path::{Path, PathBuf};

use crate::{BuildOptions, ConfigurationError};

/// Absolute locations used throughout a build. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    pub community_home: PathBuf,
    pub project_home: PathBuf,
    pub build_output_root: PathBuf,
    pub jdk_home: PathBuf,
    pub log_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub temp_dir: PathBuf,
}

impl BuildPaths {
    /// Derive the path set from the homes and options.
    ///
    /// Defaults: output root `<projectHome>/out`, logs `<outputRoot>/log`,
    /// artifacts `<outputRoot>/artifacts`, temp `<outputRoot>/temp`.
    pub fn new(
        community_home: &Path,
        project_home: &Path,
        jdk_home: &Path,
        options: &BuildOptions,
    ) -> Result<Self, ConfigurationError> {
        let community_home = absolutize(community_home)?;
        let project_home = absolutize(project_home)?;
        let build_output_root = match &options.output_root_path {
            Some(path) => absolutize(path)?,
            None => project_home.join("out"),
        };
        let log_dir = match &options.log_path {
            Some(path) => absolutize(path)?,
            None => build_output_root.join("log"),
        };

        Ok(Self {
            community_home,
            project_home,
            jdk_home: absolutize(jdk_home)?,
            log_dir,
            artifacts_dir: build_output_root.join("artifacts"),
            temp_dir: build_output_root.join("temp"),
            build_output_root,
        })
    }

    /// Directory for heap dumps and other per-run diagnostics.
    pub fn snapshots_dir(&self) -> PathBuf {
        self.log_dir.join("snapshots")
    }
}

/// Make `path` absolute (relative to the current directory) and canonicalize
/// it when it exists.
pub fn absolutize(path: &Path) -> Result<PathBuf, ConfigurationError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| ConfigurationError::Io {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    Ok(dunce::canonicalize(&absolute).unwrap_or(absolute))
}
