use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// JPS dependency scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DependencyScope {
    #[default]
    Compile,
    Test,
    Runtime,
    Provided,
}

impl DependencyScope {
    /// Parse the `scope` attribute; absent or unknown means `COMPILE`.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_uppercase).as_deref() {
            Some("TEST") => Self::Test,
            Some("RUNTIME") => Self::Runtime,
            Some("PROVIDED") => Self::Provided,
            _ => Self::Compile,
        }
    }

    /// Whether a dependency with this scope is on the runtime classpath.
    ///
    /// Production runs see `COMPILE` and `RUNTIME`; test runs see every scope.
    pub fn in_runtime_classpath(self, for_tests: bool) -> bool {
        match self {
            Self::Compile | Self::Runtime => true,
            Self::Test | Self::Provided => for_tests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkRef {
    /// Use the project SDK from `misc.xml`.
    Inherited,
    Named(String),
}

/// A named set of compiled roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    pub path: PathBuf,
    pub is_test: bool,
}

/// One `<orderEntry>`, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEntry {
    /// The module's own output.
    ModuleSource,
    Sdk(SdkRef),
    Module {
        name: String,
        scope: DependencyScope,
        exported: bool,
    },
    /// Reference to a project-level library.
    Library {
        name: String,
        scope: DependencyScope,
        exported: bool,
    },
    /// Library defined inline in the module file.
    ModuleLibrary {
        library: Library,
        scope: DependencyScope,
        exported: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub module_file: PathBuf,
    pub source_roots: Vec<SourceRoot>,
    /// Set when the module declares its own output, or once the compilation
    /// context assigns outputs to modules inheriting the project output.
    pub output: Option<PathBuf>,
    pub test_output: Option<PathBuf>,
    pub inherit_compiler_output: bool,
    pub sdk: SdkRef,
    pub dependencies: Vec<OrderEntry>,
}

impl Module {
    pub fn module_dir(&self) -> Option<&std::path::Path> {
        self.module_file.parent()
    }
}

/// Immutable module/library graph of a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectModel {
    modules: Vec<Module>,
    libraries: Vec<Library>,
    project_sdk: Option<String>,
    project_output: Option<PathBuf>,
    module_index: HashMap<String, usize>,
    library_index: HashMap<String, usize>,
}

impl ProjectModel {
    /// Callers guarantee unique module names; the loader rejects duplicates
    /// before building the model.
    pub fn new(
        modules: Vec<Module>,
        libraries: Vec<Library>,
        project_sdk: Option<String>,
        project_output: Option<PathBuf>,
    ) -> Self {
        let module_index = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        let library_index = libraries
            .iter()
            .enumerate()
            .map(|(i, l)| (l.name.clone(), i))
            .collect();
        Self {
            modules,
            libraries,
            project_sdk,
            project_output,
            module_index,
            library_index,
        }
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.module_index.get(name).map(|&i| &self.modules[i])
    }

    pub fn library(&self, name: &str) -> Option<&Library> {
        self.library_index.get(name).map(|&i| &self.libraries[i])
    }

    pub fn project_sdk(&self) -> Option<&str> {
        self.project_sdk.as_deref()
    }

    /// Project-level compiler output from `misc.xml`.
    pub fn project_output(&self) -> Option<&std::path::Path> {
        self.project_output.as_deref()
    }

    /// The toolchain name `module` compiles against, if any is bound.
    pub fn sdk_name<'a>(&'a self, module: &'a Module) -> Option<&'a str> {
        match &module.sdk {
            SdkRef::Named(name) => Some(name),
            SdkRef::Inherited => self.project_sdk(),
        }
    }

    /// Every distinct toolchain name referenced by a module.
    pub fn referenced_sdk_names(&self) -> BTreeSet<&str> {
        self.modules
            .iter()
            .filter_map(|m| self.sdk_name(m))
            .collect()
    }

    /// Assign production/test outputs for every module that inherits the
    /// project output: `<dir>/production/<name>` and `<dir>/test/<name>`.
    ///
    /// Returns a new model; `self` is left untouched.
    pub fn with_inherited_outputs(&self, classes_dir: &std::path::Path) -> Self {
        let mut model = self.clone();
        for module in &mut model.modules {
            if module.inherit_compiler_output {
                module.output = Some(classes_dir.join("production").join(&module.name));
                module.test_output = Some(classes_dir.join("test").join(&module.name));
            }
        }
        model
    }
}
