use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use kiln_build::{
    ArtifactPublisher, BuildMessages, CompilationContext, Publication, PublicationCounter,
    RecordingMessages, ServiceMessageSink, TracingMessages,
};
use kiln_config::{init_tracing, load_for_project, BackendKind, ExecutionConfig, KilnConfig};
use kiln_core::{absolutize, BuildOptions, BuildPaths, CiMetadata, ProcessEnv};
use kiln_project::{load_project, LoadOptions};
use kiln_testing::{ExecutionBackend, ExternalTaskRunner, TestRunOrchestrator, TestingOptions};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "kiln", version, about = "Kiln build and test orchestration")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Project root containing `.idea/`
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,
    /// Community checkout (defaults to the project root)
    #[arg(long, global = true)]
    community_home: Option<PathBuf>,
    /// Config file; skips `kiln.toml` discovery
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load the project and report effective options and toolchains
    Validate,
    /// Print the runtime classpath of a module
    Classpath(ClasspathArgs),
    /// Select, plan and run tests
    Test(TestArgs),
    /// Notify the CI server about a built artifact
    Publish(PublishArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Validate => "validate",
            Command::Classpath(_) => "classpath",
            Command::Test(_) => "test",
            Command::Publish(_) => "publish",
        }
    }
}

#[derive(Args)]
struct ClasspathArgs {
    module: String,
    /// Include test outputs and test-scoped dependencies
    #[arg(long)]
    tests: bool,
}

#[derive(Args)]
struct TestArgs {
    /// Module whose tests are run
    #[arg(long)]
    module: Option<String>,
    /// Test class pattern (repeatable)
    #[arg(long = "pattern")]
    patterns: Vec<String>,
    /// Test group (repeatable)
    #[arg(long = "group")]
    groups: Vec<String>,
    /// Named run configuration (repeatable)
    #[arg(long = "run-configuration")]
    run_configurations: Vec<String>,
    /// Glob over compiled test classes; one invocation per test method
    #[arg(long)]
    batch_includes: Option<String>,
    /// Print the planned invocations without running them
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct PublishArgs {
    path: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let env = ProcessEnv;
    let project_home = absolutize(&cli.global.project)?;
    let (config, config_path) = load_config(&project_home, cli.global.config.as_deref())?;
    init_tracing(&config.logging);
    tracing::debug!(
        target: "kiln.cli",
        command = cli.command.name(),
        project = %project_home.display(),
        config = ?config_path.as_ref().map(|p| p.display().to_string()),
        "starting"
    );

    let json = cli.global.json;
    match cli.command {
        Command::Validate => {
            let messages = Arc::new(RecordingMessages::new());
            let session = Session::open(&cli.global, &project_home, &config, messages.clone())?;
            let report = ValidateReport::new(&session, &messages);
            print_output(&report, json, |report| {
                println!("project: {}", report.project_home.display());
                println!("  modules: {}", report.modules);
                println!("  classes: {}", report.classes_output_dir.display());
                for toolchain in &report.toolchains {
                    println!("  toolchain {}: {}", toolchain.name, toolchain.home.display());
                }
                for warning in &report.warnings {
                    println!("warning: {warning}");
                }
            })?;
            Ok(0)
        }
        Command::Classpath(args) => {
            let session = Session::open(&cli.global, &project_home, &config, Arc::new(TracingMessages))?;
            let context = &session.context;
            let module = context.find_required_module(&args.module)?;
            let report = ClasspathReport {
                module: module.name.clone(),
                tests: args.tests,
                output: context.module_output_path(module, args.tests)?,
                classpath: context.module_runtime_classpath(module, args.tests)?,
            };
            print_output(&report, json, |report| {
                for entry in &report.classpath {
                    println!("{}", entry.display());
                }
            })?;
            Ok(0)
        }
        Command::Test(args) => {
            let session = Session::open(&cli.global, &project_home, &config, Arc::new(TracingMessages))?;
            let options = args.apply(config.testing.clone());
            let publisher = session.publisher(&config);
            let orchestrator = TestRunOrchestrator::new(
                &session.context,
                options,
                execution_backend(&config.execution)?,
                &env,
            )
            .with_publisher(&publisher);

            if args.dry_run {
                let (mode, invocations) = orchestrator.plan()?;
                let plan = PlanReport {
                    mode: mode.name().to_string(),
                    invocations: invocations
                        .iter()
                        .map(|invocation| PlannedEntry {
                            label: invocation.label.clone(),
                            module: invocation.module.clone(),
                            target: invocation.target.as_ref().map(ToString::to_string),
                        })
                        .collect(),
                };
                print_output(&plan, json, |plan| {
                    println!("mode: {}", plan.mode);
                    for entry in &plan.invocations {
                        println!("  {} ({})", entry.label, entry.module);
                    }
                })?;
                return Ok(0);
            }

            let report = orchestrator.run()?;
            let success = report.success();
            if !success {
                let failed = report.failures().count();
                tracing::warn!(target: "kiln.cli", failed, "test run failed");
            }
            print_output(&report, json, |report| {
                println!("mode: {}", report.mode);
                for invocation in &report.invocations {
                    let status = if invocation.success() { "ok" } else { "FAILED" };
                    match (invocation.exit_code, &invocation.error) {
                        (Some(code), _) => println!("  {status}: {} (exit {code})", invocation.label),
                        (None, Some(error)) => println!("  {status}: {} ({error})", invocation.label),
                        (None, None) => println!("  {status}: {}", invocation.label),
                    }
                }
            })?;
            Ok(if success { 0 } else { 1 })
        }
        Command::Publish(args) => {
            let session = Session::open(&cli.global, &project_home, &config, Arc::new(TracingMessages))?;
            let path = absolutize(&args.path)?;
            let publication = session.publisher(&config).notify_artifact_was_built(&path);
            let report = PublishReport {
                path,
                published: publication == Publication::Published,
            };
            if !report.published {
                tracing::info!(target: "kiln.cli", path = %report.path.display(), "artifact withheld");
            }
            print_output(&report, json, |report| {
                if !report.published {
                    println!("withheld: {}", report.path.display());
                }
            })?;
            Ok(0)
        }
    }
}

fn load_config(
    project_home: &Path,
    explicit: Option<&Path>,
) -> Result<(KilnConfig, Option<PathBuf>)> {
    match explicit {
        Some(path) => {
            let mut config = KilnConfig::load_from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            config.apply_env_overrides(&ProcessEnv)?;
            Ok((config, Some(path.to_path_buf())))
        }
        None => Ok(load_for_project(project_home, &ProcessEnv)?),
    }
}

fn execution_backend(config: &ExecutionConfig) -> Result<ExecutionBackend> {
    match config.backend {
        BackendKind::Forked => Ok(ExecutionBackend::forked()),
        BackendKind::TaskRunner => {
            let Some((program, args)) = config.task_runner.split_first() else {
                bail!("execution.backend is `task-runner` but execution.task_runner is empty");
            };
            let runner = ExternalTaskRunner::new(Path::new(program), args);
            Ok(ExecutionBackend::in_process(Arc::new(runner)))
        }
    }
}

/// A loaded project with its compilation context.
struct Session {
    context: CompilationContext,
}

impl Session {
    fn open(
        global: &GlobalArgs,
        project_home: &Path,
        config: &KilnConfig,
        messages: Arc<dyn BuildMessages>,
    ) -> Result<Self> {
        let env = ProcessEnv;
        let community_home = match &global.community_home {
            Some(dir) => absolutize(dir)?,
            None => project_home.to_path_buf(),
        };
        let options: BuildOptions = config.build.clone();

        let loaded = load_project(
            project_home,
            &LoadOptions {
                community_home: &community_home,
                jdk_version: config.toolchain.version,
                jdk_home: config.toolchain.home.as_deref(),
                jdks_target_dir: options.jdks_target_dir.as_deref(),
                env: &env,
            },
        )
        .with_context(|| format!("failed to load project at {}", project_home.display()))?;

        let jdk_home = loaded.toolchains.primary().home().to_path_buf();
        let paths = BuildPaths::new(&community_home, project_home, &jdk_home, &options)?;
        let context = CompilationContext::new(
            Arc::new(loaded),
            Arc::new(paths),
            options,
            CiMetadata::from_env(&env),
            messages,
        )?;
        Ok(Self { context })
    }

    fn publisher(&self, config: &KilnConfig) -> ArtifactPublisher {
        ArtifactPublisher::new(
            &self.context.paths().artifacts_dir,
            config.publication,
            Arc::new(PublicationCounter::new()),
            Arc::new(ServiceMessageSink),
        )
    }
}

#[derive(Serialize)]
struct ToolchainEntry {
    name: String,
    home: PathBuf,
}

#[derive(Serialize)]
struct ValidateReport {
    project_home: PathBuf,
    modules: usize,
    classes_output_dir: PathBuf,
    options: BuildOptions,
    toolchains: Vec<ToolchainEntry>,
    warnings: Vec<String>,
}

impl ValidateReport {
    fn new(session: &Session, messages: &RecordingMessages) -> Self {
        let context = &session.context;
        let project = context.project();
        // Unresolved toolchains are already part of the project warnings.
        let mut warnings = project.warnings.clone();
        warnings.extend(messages.warnings());

        Self {
            project_home: project.project_home.clone(),
            modules: context.model().modules().len(),
            classes_output_dir: context.classes_output_dir().to_path_buf(),
            options: context.options().clone(),
            toolchains: context
                .toolchains()
                .iter()
                .map(|toolchain| ToolchainEntry {
                    name: toolchain.name().to_string(),
                    home: toolchain.home().to_path_buf(),
                })
                .collect(),
            warnings,
        }
    }
}

#[derive(Serialize)]
struct ClasspathReport {
    module: String,
    tests: bool,
    output: PathBuf,
    classpath: Vec<PathBuf>,
}

#[derive(Serialize)]
struct PlannedEntry {
    label: String,
    module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
}

#[derive(Serialize)]
struct PlanReport {
    mode: String,
    invocations: Vec<PlannedEntry>,
}

#[derive(Serialize)]
struct PublishReport {
    path: PathBuf,
    published: bool,
}

impl TestArgs {
    /// Command-line selection replaces the matching `[testing]` entries.
    fn apply(&self, mut options: TestingOptions) -> TestingOptions {
        if let Some(module) = &self.module {
            options.main_module = Some(module.clone());
        }
        if !self.patterns.is_empty() {
            options.patterns = self.patterns.clone();
        }
        if !self.groups.is_empty() {
            options.groups = self.groups.clone();
        }
        if !self.run_configurations.is_empty() {
            options.run_configurations = self.run_configurations.clone();
        }
        if let Some(include) = &self.batch_includes {
            options.batch_includes = Some(include.clone());
        }
        options
    }
}

fn print_output<T: Serialize>(value: &T, json: bool, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(value)?;
        println!("{out}");
    } else {
        human(value);
    }
    Ok(())
}
