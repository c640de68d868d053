use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_build::{ArtifactPublisher, CompilationContext};
use kiln_core::{ConfigurationError, EnvSource};
use kiln_project::{load_run_configurations, RunConfiguration};

use crate::discovery::{compile_include_glob, discover_batch_tests, TestTarget};
use crate::jvm::{
    DebugAttach, JvmLayers, NativeAgent, BUILD_NUMBER_PROPERTY, CLASSPATH_FILE_PROPERTY,
    CONFIG_PATH_PROPERTY, DEBUG_CATEGORIES_PROPERTY, GROUPS_PROPERTY, HOME_PATH_PROPERTY,
    PATTERNS_PROPERTY, SYSTEM_PATH_PROPERTY,
};
use crate::report::{InvocationResult, TestRunReport};
use crate::selection::{select_mode, DebugRequest, SelectionMode, TestFilter};
use crate::{ExecutionBackend, Result, TestTaskRequest, TestingError, TestingOptions};

const RUN_CONFIGURATIONS_DIR: &str = ".idea/runConfigurations";

/// A fully resolved invocation, ready to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedInvocation {
    pub label: String,
    pub module: String,
    pub classpath: Vec<PathBuf>,
    pub target: Option<TestTarget>,
    /// VM parameters of the run configuration, if any.
    pub vm_parameters: Vec<String>,
    pub properties: Vec<(String, String)>,
    pub env: BTreeMap<String, String>,
    pub debug: Option<DebugAttach>,
}

/// Selects, plans and executes a test run against a [`CompilationContext`].
pub struct TestRunOrchestrator<'a> {
    context: &'a CompilationContext,
    options: TestingOptions,
    backend: ExecutionBackend,
    env: &'a dyn EnvSource,
    publisher: Option<&'a ArtifactPublisher>,
}

impl<'a> TestRunOrchestrator<'a> {
    pub fn new(
        context: &'a CompilationContext,
        options: TestingOptions,
        backend: ExecutionBackend,
        env: &'a dyn EnvSource,
    ) -> Self {
        Self {
            context,
            options,
            backend,
            env,
            publisher: None,
        }
    }

    /// Heap dumps found after an invocation are handed to `publisher`.
    pub fn with_publisher(mut self, publisher: &'a ArtifactPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn options(&self) -> &TestingOptions {
        &self.options
    }

    /// Resolve the selection mode and every invocation. All configuration
    /// errors surface here.
    pub fn plan(&self) -> Result<(SelectionMode, Vec<PlannedInvocation>)> {
        let debug = DebugRequest::from_env(self.env)?;
        let mode = select_mode(&self.options, debug.as_ref(), self.context.messages())?;
        tracing::info!(target: "kiln.testing", mode = mode.name(), "selected test mode");

        let invocations = match &mode {
            SelectionMode::ExplicitRunConfigurations { names } => {
                self.plan_run_configurations(names)?
            }
            SelectionMode::GroupsAndPatterns { module, filter } => {
                let (module, classpath) = self.module_classpath(module)?;
                let properties = match filter {
                    TestFilter::Patterns(patterns) => {
                        vec![(PATTERNS_PROPERTY.to_string(), patterns.join(";"))]
                    }
                    TestFilter::Groups(groups) => {
                        vec![(GROUPS_PROPERTY.to_string(), groups.join(";"))]
                    }
                    TestFilter::All => Vec::new(),
                };
                vec![PlannedInvocation {
                    label: module.clone(),
                    module,
                    classpath,
                    target: None,
                    vm_parameters: Vec::new(),
                    properties,
                    env: BTreeMap::new(),
                    debug: None,
                }]
            }
            SelectionMode::RemoteDebugSingleClass {
                module,
                class_name,
                suspend,
            } => {
                let (module, classpath) = self.module_classpath(module)?;
                vec![PlannedInvocation {
                    label: class_name.clone(),
                    module,
                    classpath,
                    target: Some(TestTarget::class(class_name.clone())),
                    vm_parameters: Vec::new(),
                    properties: Vec::new(),
                    env: BTreeMap::new(),
                    debug: Some(DebugAttach {
                        port: self.options.debug_port,
                        suspend: *suspend,
                    }),
                }]
            }
            SelectionMode::BatchFileDiscovery { module, include } => {
                let include = compile_include_glob(include)?;
                let found = self.context.find_required_module(module)?;
                let test_output = self.context.module_output_path(found, true)?;
                let classpath = self.context.module_runtime_classpath(found, true)?;
                let module = found.name.clone();
                discover_batch_tests(&test_output, &include)?
                    .into_iter()
                    .map(|target| PlannedInvocation {
                        label: target.to_string(),
                        module: module.clone(),
                        classpath: classpath.clone(),
                        target: Some(target),
                        vm_parameters: Vec::new(),
                        properties: Vec::new(),
                        env: BTreeMap::new(),
                        debug: None,
                    })
                    .collect()
            }
        };
        Ok((mode, invocations))
    }

    fn plan_run_configurations(&self, names: &[String]) -> Result<Vec<PlannedInvocation>> {
        let paths = self.context.paths();
        let dirs = [
            paths.project_home.join(RUN_CONFIGURATIONS_DIR),
            paths.community_home.join(RUN_CONFIGURATIONS_DIR),
        ];
        let available = load_run_configurations(&dirs)?;

        let mut planned = Vec::with_capacity(names.len());
        for name in names {
            let configuration = available
                .iter()
                .find(|c| &c.name == name)
                .ok_or_else(|| ConfigurationError::RunConfigurationNotFound { name: name.clone() })?;
            planned.push(self.plan_run_configuration(configuration)?);
        }
        Ok(planned)
    }

    fn plan_run_configuration(&self, configuration: &RunConfiguration) -> Result<PlannedInvocation> {
        if !configuration.required_artifacts.is_empty() {
            self.context.messages().info(&format!(
                "run configuration `{}` expects artifacts to be built first: {}",
                configuration.name,
                configuration.required_artifacts.join(", ")
            ));
        }
        let (module, classpath) = self.module_classpath(&configuration.module_name)?;
        let properties = if configuration.test_class_patterns.is_empty() {
            Vec::new()
        } else {
            vec![(
                PATTERNS_PROPERTY.to_string(),
                configuration.test_class_patterns.join(";"),
            )]
        };
        Ok(PlannedInvocation {
            label: configuration.name.clone(),
            module,
            classpath,
            target: None,
            vm_parameters: configuration.vm_parameters.clone(),
            properties,
            env: configuration.env_variables.clone(),
            debug: None,
        })
    }

    fn module_classpath(&self, name: &str) -> Result<(String, Vec<PathBuf>)> {
        let module = self.context.find_required_module(name)?;
        let classpath = self.context.module_runtime_classpath(module, true)?;
        Ok((module.name.clone(), classpath))
    }

    /// Plan the run, recreate the snapshots directory and execute every
    /// invocation in order. Planning errors abort before anything runs; an
    /// invocation that cannot be started is recorded in the report and the
    /// remaining ones still run.
    pub fn run(&self) -> Result<TestRunReport> {
        let (mode, invocations) = self.plan()?;
        if invocations.is_empty() {
            self.context
                .messages()
                .warning(&format!("no tests were selected in {} mode", mode.name()));
        }

        let paths = self.context.paths();
        let run_dir = paths.temp_dir.join("tests");
        let snapshots_dir = paths.snapshots_dir();
        recreate_dir(&snapshots_dir)?;
        std::fs::create_dir_all(&run_dir).map_err(|source| TestingError::io(&run_dir, source))?;

        let native_agent = self.options.native_agent.as_ref().map(|path| NativeAgent {
            path: path.clone(),
            causal_profiling: self.options.causal_profiling,
        });

        let mut results = Vec::with_capacity(invocations.len());
        for (index, invocation) in invocations.iter().enumerate() {
            let heap_dump = snapshots_dir.join(format!("test-run-{index}.hprof"));
            let _span = tracing::info_span!(target: "kiln.testing", "test_invocation", label = %invocation.label).entered();
            let outcome = self
                .request(
                    index,
                    invocation,
                    &run_dir,
                    &snapshots_dir,
                    &heap_dump,
                    native_agent.as_ref(),
                )
                .and_then(|request| {
                    let argfile = run_dir.join(format!("argfile-{index}.txt"));
                    self.backend.execute(&request, &argfile)
                });
            let (exit_code, error) = match outcome {
                Ok(exit_code) => {
                    tracing::info!(target: "kiln.testing", exit_code, "test invocation finished");
                    (Some(exit_code), None)
                }
                Err(err) => {
                    tracing::error!(target: "kiln.testing", error = %err, "test invocation could not be run");
                    self.context
                        .messages()
                        .warning(&format!("`{}` could not be run: {err}", invocation.label));
                    (None, Some(err.to_string()))
                }
            };

            let heap_dump = heap_dump.is_file().then_some(heap_dump);
            if let Some(dump) = &heap_dump {
                self.context
                    .messages()
                    .warning(&format!("`{}` left a heap dump at {}", invocation.label, dump.display()));
                match self.publisher {
                    Some(publisher) => {
                        publisher.notify_artifact_was_built(dump);
                    }
                    None => tracing::warn!(
                        target: "kiln.testing",
                        dump = %dump.display(),
                        "no artifact publisher configured; heap dump stays local"
                    ),
                }
            }
            results.push(InvocationResult {
                label: invocation.label.clone(),
                exit_code,
                error,
                heap_dump,
            });
        }

        Ok(TestRunReport {
            mode: mode.name().to_string(),
            invocations: results,
        })
    }

    fn request(
        &self,
        index: usize,
        invocation: &PlannedInvocation,
        run_dir: &Path,
        snapshots_dir: &Path,
        heap_dump: &Path,
        native_agent: Option<&NativeAgent>,
    ) -> Result<TestTaskRequest> {
        let classpath_file = run_dir.join(format!("classpath-{index}.txt"));
        let listing: String = invocation
            .classpath
            .iter()
            .map(|p| format!("{}\n", p.display()))
            .collect();
        std::fs::write(&classpath_file, listing)
            .map_err(|source| TestingError::io(&classpath_file, source))?;

        let mut caller_options = invocation.vm_parameters.clone();
        caller_options.extend(self.options.jvm_options.iter().cloned());
        let baseline = self.baseline_properties(&classpath_file, run_dir);
        let arguments = JvmLayers {
            caller_options: &caller_options,
            caller_properties: &invocation.properties,
            heap_dump_path: heap_dump,
            snapshots_dir,
            debug: invocation.debug,
            native_agent,
            memory_options: &self.options.memory_options,
            baseline: &baseline,
            session_properties: &self.options.properties,
        }
        .assemble();

        let module = self.context.find_required_module(&invocation.module)?;
        Ok(TestTaskRequest {
            label: invocation.label.clone(),
            module: invocation.module.clone(),
            java: self.context.java_executable(Some(module)),
            working_dir: self.context.paths().project_home.clone(),
            classpath: invocation.classpath.clone(),
            jvm_options: arguments.options().to_vec(),
            system_properties: arguments.properties().iter().cloned().collect(),
            runner_main_class: self.options.runner_main_class.clone(),
            test_class: invocation.target.as_ref().map(|t| t.class_name.clone()),
            test_method: invocation.target.as_ref().and_then(|t| t.method.clone()),
            env: invocation.env.clone(),
        })
    }

    fn baseline_properties(&self, classpath_file: &Path, run_dir: &Path) -> Vec<(String, String)> {
        let paths = self.context.paths();
        let mut properties = vec![
            (
                CLASSPATH_FILE_PROPERTY.to_string(),
                classpath_file.display().to_string(),
            ),
            (
                HOME_PATH_PROPERTY.to_string(),
                paths.project_home.display().to_string(),
            ),
            (
                CONFIG_PATH_PROPERTY.to_string(),
                run_dir.join("config").display().to_string(),
            ),
            (
                SYSTEM_PATH_PROPERTY.to_string(),
                run_dir.join("system").display().to_string(),
            ),
            ("file.encoding".to_string(), "UTF-8".to_string()),
            ("sun.jnu.encoding".to_string(), "UTF-8".to_string()),
        ];
        let categories = self.context.data().debug_log_categories();
        if !categories.is_empty() {
            properties.push((DEBUG_CATEGORIES_PROPERTY.to_string(), categories.join(",")));
        }
        if let Some(build_number) = &self.context.ci().build_number {
            properties.push((BUILD_NUMBER_PROPERTY.to_string(), build_number.clone()));
        }
        properties
    }
}

fn recreate_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|source| TestingError::io(dir, source))?;
    }
    std::fs::create_dir_all(dir).map_err(|source| TestingError::io(dir, source))
}
