use std::path::PathBuf;

/// Fatal configuration problems.
///
/// Every variant aborts the pipeline before any build or test work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("project marker `{path}` is missing; `{project_home}` is not a kiln project")]
    MissingProjectMarker { project_home: PathBuf, path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed descriptor {path}: {message}")]
    MalformedDescriptor { path: PathBuf, message: String },

    #[error("module `{name}` is defined more than once")]
    DuplicateModule { name: String },

    #[error(
        "compiled classes from project output were requested but `{path}` does not exist"
    )]
    MissingProjectOutput { path: PathBuf },

    #[error("cannot find module `{name}`")]
    ModuleNotFound { name: String },

    #[error("cannot find library `{name}`")]
    LibraryNotFound { name: String },

    #[error("{kind} output directory for module `{module}` is not set")]
    ModuleOutputNotSet { module: String, kind: &'static str },

    #[error("cannot resolve JDK `{name}`: {reason}")]
    ToolchainNotFound { name: String, reason: String },

    #[error("cannot find run configuration `{name}`")]
    RunConfigurationNotFound { name: String },

    #[error("unsupported remote debug target type `{kind}`; expected `class` or `method`")]
    UnsupportedDebugTarget { kind: String },

    #[error("remote debugging was requested but no target class is set")]
    MissingDebugTarget,

    #[error("invalid test include pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("no test module is selected; set `testing.main_module` or pass `--module`")]
    NoTestModule,
}
