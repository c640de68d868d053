use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RUNNER_MAIN_CLASS: &str = "com.intellij.tests.JUnit5TeamCityRunner";
pub const DEFAULT_DEBUG_PORT: u16 = 5005;

/// Selection sources and launch parameters for one test run.
///
/// Several selection sources may be set at once; [`crate::select_mode`]
/// decides which one is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestingOptions {
    /// Module whose tests run when no run configuration is selected.
    pub main_module: Option<String>,
    pub groups: Vec<String>,
    pub patterns: Vec<String>,
    pub run_configurations: Vec<String>,
    /// Glob over test-output-relative class file paths, e.g.
    /// `com/acme/**Test.class`.
    pub batch_includes: Option<String>,
    /// Extra JVM options; these win over every generated option.
    pub jvm_options: Vec<String>,
    /// Replaces the default heap and code cache settings.
    pub memory_options: Vec<String>,
    /// Properties of the build session. Only `pass.<key>` entries reach the
    /// test JVM, as `<key>`.
    pub properties: BTreeMap<String, String>,
    pub runner_main_class: String,
    pub debug_port: u16,
    pub native_agent: Option<PathBuf>,
    pub causal_profiling: bool,
}

impl Default for TestingOptions {
    fn default() -> Self {
        Self {
            main_module: None,
            groups: Vec::new(),
            patterns: Vec::new(),
            run_configurations: Vec::new(),
            batch_includes: None,
            jvm_options: Vec::new(),
            memory_options: Vec::new(),
            properties: BTreeMap::new(),
            runner_main_class: DEFAULT_RUNNER_MAIN_CLASS.to_string(),
            debug_port: DEFAULT_DEBUG_PORT,
            native_agent: None,
            causal_profiling: false,
        }
    }
}
