use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use kiln_core::BuildPaths;
use parking_lot::Mutex;

/// Mutable state of one top-level build, shared by every context derived
/// from it.
#[derive(Debug)]
pub struct CompilationData {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    incremental_cache_dir: PathBuf,
    compilation_log_file: PathBuf,
    debug_log_categories: Vec<String>,
    compiled_modules: BTreeSet<String>,
}

impl CompilationData {
    /// Cache under `<outputRoot>/incremental-cache`, log at
    /// `<logDir>/compilation.log`.
    pub fn new(paths: &BuildPaths) -> Self {
        Self {
            state: Mutex::new(State {
                incremental_cache_dir: paths.build_output_root.join("incremental-cache"),
                compilation_log_file: paths.log_dir.join("compilation.log"),
                debug_log_categories: Vec::new(),
                compiled_modules: BTreeSet::new(),
            }),
        }
    }

    pub fn incremental_cache_dir(&self) -> PathBuf {
        self.state.lock().incremental_cache_dir.clone()
    }

    pub fn set_incremental_cache_dir(&self, dir: &Path) {
        self.state.lock().incremental_cache_dir = dir.to_path_buf();
    }

    pub fn compilation_log_file(&self) -> PathBuf {
        self.state.lock().compilation_log_file.clone()
    }

    pub fn set_compilation_log_file(&self, file: &Path) {
        self.state.lock().compilation_log_file = file.to_path_buf();
    }

    pub fn debug_log_categories(&self) -> Vec<String> {
        self.state.lock().debug_log_categories.clone()
    }

    /// Adds a category unless it is already enabled.
    pub fn add_debug_log_category(&self, category: &str) {
        let mut state = self.state.lock();
        if !state.debug_log_categories.iter().any(|c| c == category) {
            state.debug_log_categories.push(category.to_string());
        }
    }

    /// Returns `false` if the module was already recorded.
    pub fn mark_compiled(&self, module: &str) -> bool {
        self.state.lock().compiled_modules.insert(module.to_string())
    }

    pub fn is_compiled(&self, module: &str) -> bool {
        self.state.lock().compiled_modules.contains(module)
    }

    pub fn compiled_modules(&self) -> BTreeSet<String> {
        self.state.lock().compiled_modules.clone()
    }
}
