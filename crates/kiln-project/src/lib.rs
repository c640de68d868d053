//! Project model loading.
//!
//! A kiln project is described the way JPS describes it: an `.idea` directory
//! with `modules.xml`, one `.iml` file per module, project libraries and
//! `misc.xml`. [`load_project`] turns that into an immutable
//! [`ProjectModel`], merges the module rename history and registers the JDK
//! toolchains modules compile against.

mod loader;
mod model;
mod rename;
mod run_config;
mod url;
mod xml;

pub use loader::{load_project, LoadOptions, LoadedProject, PROJECT_MARKERS};
pub use model::{DependencyScope, Library, Module, OrderEntry, ProjectModel, SdkRef, SourceRoot};
pub use rename::{ModuleRenameMap, RENAME_HISTORY_FILE};
pub use run_config::{
    find_run_configuration, load_run_configurations, split_vm_parameters, RunConfiguration,
};
pub use url::{expand_url, normalize_lexically};
