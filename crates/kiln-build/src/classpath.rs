use std::collections::HashSet;
use std::path::PathBuf;

use kiln_core::ConfigurationError;
use kiln_jdk::ToolchainRegistry;
use kiln_project::{Module, OrderEntry, ProjectModel, SdkRef};

/// Computes the runtime classpath of a module by walking its order entries
/// depth-first.
///
/// Production classpaths contain `COMPILE` and `RUNTIME` dependencies; test
/// classpaths contain every scope plus the test outputs of the module and its
/// dependencies. SDK roots of the root module are only added to production
/// classpaths: a test JVM brings its own runtime.
pub struct RuntimeClasspathBuilder<'a> {
    model: &'a ProjectModel,
    toolchains: &'a ToolchainRegistry,
    for_tests: bool,
    visited: HashSet<&'a str>,
    seen_roots: HashSet<PathBuf>,
    roots: Vec<PathBuf>,
}

impl<'a> RuntimeClasspathBuilder<'a> {
    pub fn new(model: &'a ProjectModel, toolchains: &'a ToolchainRegistry, for_tests: bool) -> Self {
        Self {
            model,
            toolchains,
            for_tests,
            visited: HashSet::new(),
            seen_roots: HashSet::new(),
            roots: Vec::new(),
        }
    }

    pub fn build(mut self, module: &'a Module) -> Result<Vec<PathBuf>, ConfigurationError> {
        self.visit(module, true)?;
        Ok(self.roots)
    }

    fn visit(&mut self, module: &'a Module, is_root: bool) -> Result<(), ConfigurationError> {
        if !self.visited.insert(module.name.as_str()) {
            return Ok(());
        }
        let model = self.model;
        let toolchains = self.toolchains;

        for entry in &module.dependencies {
            match entry {
                OrderEntry::ModuleSource => {
                    if self.for_tests {
                        let test_output = output(module, true)?;
                        self.push(test_output);
                    }
                    let production = output(module, false)?;
                    self.push(production);
                }
                OrderEntry::Sdk(sdk) => {
                    if self.for_tests || !is_root {
                        continue;
                    }
                    let name = match sdk {
                        SdkRef::Named(name) => Some(name.as_str()),
                        SdkRef::Inherited => model.project_sdk(),
                    };
                    match name.and_then(|name| toolchains.get(name)) {
                        Some(toolchain) => {
                            for root in toolchain.class_roots() {
                                self.push(root.clone());
                            }
                        }
                        None => tracing::warn!(
                            target: "kiln.build",
                            module = %module.name,
                            sdk = name.unwrap_or("<none>"),
                            "module SDK is not registered; its roots are not on the classpath"
                        ),
                    }
                }
                OrderEntry::Module { name, scope, .. } => {
                    if !scope.in_runtime_classpath(self.for_tests) {
                        continue;
                    }
                    let dependency = model
                        .module(name)
                        .ok_or_else(|| ConfigurationError::ModuleNotFound { name: name.clone() })?;
                    self.visit(dependency, false)?;
                }
                OrderEntry::Library { name, scope, .. } => {
                    if !scope.in_runtime_classpath(self.for_tests) {
                        continue;
                    }
                    let library = model
                        .library(name)
                        .ok_or_else(|| ConfigurationError::LibraryNotFound { name: name.clone() })?;
                    for root in &library.roots {
                        self.push(root.clone());
                    }
                }
                OrderEntry::ModuleLibrary { library, scope, .. } => {
                    if !scope.in_runtime_classpath(self.for_tests) {
                        continue;
                    }
                    for root in &library.roots {
                        self.push(root.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn push(&mut self, root: PathBuf) {
        if self.seen_roots.insert(root.clone()) {
            self.roots.push(root);
        }
    }
}

/// Output directory of `module`; fails when it was never assigned.
pub(crate) fn output(module: &Module, for_tests: bool) -> Result<PathBuf, ConfigurationError> {
    let dir = if for_tests {
        &module.test_output
    } else {
        &module.output
    };
    dir.clone().ok_or_else(|| ConfigurationError::ModuleOutputNotSet {
        module: module.name.clone(),
        kind: if for_tests { "test" } else { "production" },
    })
}
