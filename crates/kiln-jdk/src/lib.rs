//! JDK toolchain naming, discovery and registration.
//!
//! Modules name the JDK they compile against (`corretto-17`, `1.8`, ...). The
//! primary toolchain comes from the configured language version; every other
//! referenced name is resolved on a best-effort basis and left unregistered
//! (with a warning) when no installation can be found.

mod manifest;
mod naming;
mod registry;
mod resolve;

pub use manifest::{read_release_manifest, ReleaseManifest};
pub use naming::{env_var_for_toolchain, strip_vendor_prefix, toolchain_name_for_version};
pub use registry::{Toolchain, ToolchainRegistry};
pub use resolve::{ToolchainResolver, ToolchainWarning};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JdkError {
    #[error("could not find JDK `{name}` (tried {})", tried.join(", "))]
    NotFound { name: String, tried: Vec<String> },

    #[error("`{path}` is not a JDK installation (no `bin/` directory or `release` file)")]
    InvalidHome { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<JdkError> for kiln_core::ConfigurationError {
    fn from(err: JdkError) -> Self {
        match err {
            JdkError::NotFound { name, tried } => Self::ToolchainNotFound {
                name,
                reason: format!("tried {}", tried.join(", ")),
            },
            JdkError::InvalidHome { path } => Self::ToolchainNotFound {
                name: path.display().to_string(),
                reason: "not a JDK installation".to_string(),
            },
            JdkError::Io { path, source } => Self::Io { path, source },
        }
    }
}
