//! Test run orchestration.
//!
//! A test run goes through three phases:
//!
//! 1. **Selection.** [`select_mode`] picks exactly one [`SelectionMode`] from
//!    the configured sources. The precedence is: remote debug signal, run
//!    configurations, batch include glob, patterns, groups, plain module.
//!    Every lower source that is also set is reported as a warning.
//! 2. **Planning.** The [`TestRunOrchestrator`] turns the mode into a list
//!    of invocations. Each invocation carries its classpath, JVM arguments
//!    and target. Batch mode reads compiled test classes statically (see
//!    [`discover_batch_tests`]) and plans one invocation per test method.
//!    Every configuration error is raised in this phase, before any child
//!    is spawned.
//! 3. **Execution.** Each invocation goes to the [`ExecutionBackend`] chosen
//!    at configuration time. That is either a [`TaskRunner`] or a forked JVM
//!    launched as `<java> @<argfile>`. A heap dump left in the snapshots
//!    directory is forwarded to the
//!    [`ArtifactPublisher`](kiln_build::ArtifactPublisher).
//!
//! ## Remote debugging
//!
//! Remote debugging is requested through environment variables:
//!
//! | variable              | meaning                                       |
//! |-----------------------|-----------------------------------------------|
//! | `KILN_DEBUG_TYPE`     | `class` or `method`                           |
//! | `KILN_DEBUG_TARGET`   | `com.acme.FooTest` or `com.acme.FooTest#bar`  |
//! | `KILN_DEBUG_SUSPEND`  | suspend until a debugger attaches (default on) |
//!
//! Only whole classes can be debugged. A `method` target degrades to its
//! class with a warning.

pub mod argfile;
pub mod backend;
pub mod discovery;
pub mod jvm;
pub mod options;
pub mod orchestrator;
pub mod report;
pub mod selection;

pub use backend::{ExecutionBackend, ExternalTaskRunner, TaskRunner, TestTaskRequest};
pub use discovery::{compile_include_glob, discover_batch_tests, normalize_glob, TestTarget};
pub use jvm::{JvmArguments, JvmLayers, NativeAgent};
pub use options::TestingOptions;
pub use orchestrator::{PlannedInvocation, TestRunOrchestrator};
pub use report::{InvocationResult, TestRunReport};
pub use selection::{select_mode, DebugGranularity, DebugRequest, SelectionMode, TestFilter};

use std::path::PathBuf;

use kiln_core::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TestingError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read class file {path}: {source}")]
    ClassFile {
        path: PathBuf,
        #[source]
        source: kiln_classfile::Error,
    },
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode test request: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TestingError>;

impl TestingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the run stopped on a configuration problem rather than while
    /// executing tests.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
