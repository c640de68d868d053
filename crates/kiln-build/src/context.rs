use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_core::{
    apply_option_rules, default_option_rules, BuildOptions, BuildPaths, CiMetadata,
    ConfigurationError, OptionConflict, RuleContext,
};
use kiln_jdk::{Toolchain, ToolchainRegistry};
use kiln_project::{Library, LoadedProject, Module, ModuleRenameMap, ProjectModel};

use crate::classpath::{self, RuntimeClasspathBuilder};
use crate::{BuildMessages, CompilationData};

/// Everything a build step needs: the loaded project, paths, reconciled
/// options, shared compilation data and a message sink.
///
/// The project graph is never mutated after construction. Copies made with
/// [`CompilationContext::create_copy`] share the graph and the
/// [`CompilationData`] but carry their own options and messages.
#[derive(Clone)]
pub struct CompilationContext {
    project: Arc<LoadedProject>,
    /// Project model with outputs assigned to modules that inherit them.
    model: Arc<ProjectModel>,
    paths: Arc<BuildPaths>,
    options: BuildOptions,
    ci: CiMetadata,
    data: Arc<CompilationData>,
    messages: Arc<dyn BuildMessages>,
    classes_dir: PathBuf,
}

impl std::fmt::Debug for CompilationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilationContext")
            .field("project_home", &self.project.project_home)
            .field("options", &self.options)
            .field("classes_dir", &self.classes_dir)
            .finish_non_exhaustive()
    }
}

impl CompilationContext {
    /// Reconcile `options` and resolve output directories.
    ///
    /// Fails before any build work when the requested project output is
    /// missing.
    pub fn new(
        project: Arc<LoadedProject>,
        paths: Arc<BuildPaths>,
        options: BuildOptions,
        ci: CiMetadata,
        messages: Arc<dyn BuildMessages>,
    ) -> Result<Self, ConfigurationError> {
        let data = Arc::new(CompilationData::new(&paths));
        Self::with_data(project, paths, options, ci, data, messages)
    }

    fn with_data(
        project: Arc<LoadedProject>,
        paths: Arc<BuildPaths>,
        options: BuildOptions,
        ci: CiMetadata,
        data: Arc<CompilationData>,
        messages: Arc<dyn BuildMessages>,
    ) -> Result<Self, ConfigurationError> {
        let mut context = Self {
            model: Arc::new(project.model.clone()),
            project,
            classes_dir: paths.build_output_root.join("classes"),
            paths,
            options,
            ci,
            data,
            messages,
        };
        context.validate_options();
        context.resolve_output_directory()?;
        Ok(context)
    }

    /// A context for a nested build with its own options and messages. The
    /// project graph and compilation data are shared, not reloaded.
    pub fn create_copy(
        &self,
        options: BuildOptions,
        messages: Arc<dyn BuildMessages>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_data(
            Arc::clone(&self.project),
            Arc::clone(&self.paths),
            options,
            self.ci.clone(),
            Arc::clone(&self.data),
            messages,
        )
    }

    /// Apply the option rules in order. Each demotion is reported as a
    /// warning and returned; validation itself never fails.
    pub fn validate_options(&mut self) -> Vec<OptionConflict> {
        let ctx = RuleContext { ci: &self.ci };
        let (options, conflicts) =
            apply_option_rules(self.options.clone(), default_option_rules(), &ctx);
        for conflict in &conflicts {
            self.messages.warning(&conflict.message);
        }
        self.options = options;
        conflicts
    }

    /// Choose the classes output directory and assign
    /// `<dir>/production/<name>` and `<dir>/test/<name>` to every module
    /// inheriting the project output.
    ///
    /// An explicit `project_classes_output_directory` wins. With
    /// `use_compiled_classes_from_project_output` the project output (from
    /// `misc.xml`, else `<outputRoot>/classes`) must already exist.
    pub fn resolve_output_directory(&mut self) -> Result<&Path, ConfigurationError> {
        let default_dir = self.paths.build_output_root.join("classes");
        let classes_dir = if let Some(dir) = &self.options.project_classes_output_directory {
            dir.clone()
        } else if self.options.use_compiled_classes_from_project_output {
            let dir = self
                .project
                .model
                .project_output()
                .map(Path::to_path_buf)
                .unwrap_or(default_dir);
            if !dir.is_dir() {
                return Err(ConfigurationError::MissingProjectOutput { path: dir });
            }
            self.messages.info(&format!(
                "compiled classes are taken from the project output {}",
                dir.display()
            ));
            dir
        } else {
            default_dir
        };

        tracing::debug!(target: "kiln.build", dir = %classes_dir.display(), "classes output directory");
        self.model = Arc::new(self.project.model.with_inherited_outputs(&classes_dir));
        self.classes_dir = classes_dir;
        Ok(&self.classes_dir)
    }

    pub fn classes_output_dir(&self) -> &Path {
        &self.classes_dir
    }

    pub fn project(&self) -> &LoadedProject {
        &self.project
    }

    pub fn model(&self) -> &ProjectModel {
        &self.model
    }

    pub fn paths(&self) -> &BuildPaths {
        &self.paths
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    pub fn ci(&self) -> &CiMetadata {
        &self.ci
    }

    pub fn data(&self) -> &Arc<CompilationData> {
        &self.data
    }

    pub fn messages(&self) -> &dyn BuildMessages {
        self.messages.as_ref()
    }

    pub fn rename_map(&self) -> &ModuleRenameMap {
        &self.project.rename_map
    }

    pub fn toolchains(&self) -> &ToolchainRegistry {
        &self.project.toolchains
    }

    /// Look up a module, following the rename history. A redirected lookup
    /// emits exactly one warning naming both names.
    pub fn find_module(&self, name: &str) -> Option<&Module> {
        if let Some(current) = self.project.rename_map.new_name(name) {
            self.messages.warning(&format!(
                "module `{name}` was renamed to `{current}`; use the new name"
            ));
            return self.model.module(current);
        }
        self.model.module(name)
    }

    pub fn find_required_module(&self, name: &str) -> Result<&Module, ConfigurationError> {
        self.find_module(name)
            .ok_or_else(|| ConfigurationError::ModuleNotFound {
                name: name.to_string(),
            })
    }

    pub fn find_library(&self, name: &str) -> Option<&Library> {
        self.model.library(name)
    }

    pub fn find_required_library(&self, name: &str) -> Result<&Library, ConfigurationError> {
        self.find_library(name)
            .ok_or_else(|| ConfigurationError::LibraryNotFound {
                name: name.to_string(),
            })
    }

    pub fn module_output_path(
        &self,
        module: &Module,
        for_tests: bool,
    ) -> Result<PathBuf, ConfigurationError> {
        let module = self.resolved(module)?;
        classpath::output(module, for_tests)
    }

    /// Runtime classpath of `module`; see [`RuntimeClasspathBuilder`].
    pub fn module_runtime_classpath(
        &self,
        module: &Module,
        for_tests: bool,
    ) -> Result<Vec<PathBuf>, ConfigurationError> {
        let module = self.resolved(module)?;
        RuntimeClasspathBuilder::new(&self.model, &self.project.toolchains, for_tests).build(module)
    }

    /// Whether `step` is listed in `build_steps_to_skip`.
    pub fn is_step_skipped(&self, step: &str) -> bool {
        self.options.build_steps_to_skip.contains(step)
    }

    /// Run `f` unless `step` is skipped.
    pub fn execute_step<T>(&self, step: &str, f: impl FnOnce() -> T) -> Option<T> {
        if self.is_step_skipped(step) {
            self.messages.info(&format!("skipping step `{step}`"));
            return None;
        }
        let _span = tracing::info_span!(target: "kiln.build", "build_step", step).entered();
        Some(f())
    }

    /// The registered toolchain `module` compiles against.
    pub fn toolchain_for_module(&self, module: &Module) -> Option<&Toolchain> {
        self.model
            .sdk_name(module)
            .and_then(|name| self.project.toolchains.get(name))
    }

    /// `java` of the module's toolchain, falling back to the primary one.
    pub fn java_executable(&self, module: Option<&Module>) -> PathBuf {
        module
            .and_then(|m| self.toolchain_for_module(m))
            .unwrap_or_else(|| self.project.toolchains.primary())
            .java_executable()
    }

    /// Map a module from any model snapshot to this context's copy, which
    /// carries the assigned outputs.
    fn resolved<'m>(&'m self, module: &Module) -> Result<&'m Module, ConfigurationError> {
        self.model
            .module(&module.name)
            .ok_or_else(|| ConfigurationError::ModuleNotFound {
                name: module.name.clone(),
            })
    }
}
