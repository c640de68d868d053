use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use kiln_build::{ArtifactPublisher, CompilationContext, MemorySink, PublicationCounter, PublicationPolicy, RecordingMessages};
use kiln_core::{BuildOptions, BuildPaths, CiMetadata, MapEnv};
use kiln_project::{load_project, LoadOptions};
use kiln_test_utils::{fake_jdk, write_file, ClassFileBuilder, MethodSpec, ModuleSpec, ProjectFixture, ACC_ABSTRACT, ACC_PUBLIC};
use kiln_testing::{ExecutionBackend, InvocationResult, TaskRunner, TestRunOrchestrator, TestTaskRequest, TestingError, TestingOptions};
use pretty_assertions::assert_eq;

const JUNIT5_TEST: &str = "Lorg/junit/jupiter/api/Test;";
const JUNIT4_TEST: &str = "Lorg/junit/Test;";

/// Records requests instead of running anything. Optionally simulates a
/// JVM that died with an OutOfMemoryError, or one that could not be started.
#[derive(Default)]
struct RecordingRunner {
    requests: Mutex<Vec<TestTaskRequest>>,
    exit_code: i32,
    dump_heap: bool,
    /// Zero-based call that fails to start.
    fail_call: Option<usize>,
}

impl RecordingRunner {
    fn requests(&self) -> Vec<TestTaskRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

impl TaskRunner for RecordingRunner {
    fn run_tests(&self, request: &TestTaskRequest) -> kiln_testing::Result<i32> {
        if self.dump_heap {
            let path = request
                .jvm_options
                .iter()
                .find_map(|o| o.strip_prefix("-XX:HeapDumpPath="))
                .expect("heap dump path");
            write_file(Path::new(path), "hprof");
        }
        let mut requests = self.requests.lock().expect("lock");
        let call = requests.len();
        requests.push(request.clone());
        if self.fail_call == Some(call) {
            return Err(TestingError::Spawn {
                command: "java".to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
            });
        }
        Ok(self.exit_code)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    context: CompilationContext,
    messages: Arc<RecordingMessages>,
}

impl Fixture {
    fn test_output(&self) -> PathBuf {
        self.root.join("out/classes/test/app")
    }

    fn orchestrator<'a>(
        &'a self,
        options: TestingOptions,
        runner: Arc<RecordingRunner>,
        env: &'a MapEnv,
    ) -> TestRunOrchestrator<'a> {
        TestRunOrchestrator::new(
            &self.context,
            options,
            ExecutionBackend::in_process(runner),
            env,
        )
    }
}

fn setup(ci: CiMetadata) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = ProjectFixture::new(&dir.path().join("project"))
        .project_sdk("17")
        .module(ModuleSpec::new("util"))
        .module(
            ModuleSpec::new("app")
                .module_dep("util", "COMPILE")
                .library_dep("junit", "TEST"),
        )
        .library("junit", &["lib/junit.jar"])
        .rename("old.app", "app")
        .run_configuration(
            "Fast_Tests",
            r#"<configuration name="Fast Tests" type="JUnit" factoryName="JUnit">
  <module name="app" />
  <option name="TEST_OBJECT" value="pattern" />
  <option name="VM_PARAMETERS" value="-Xmx1g -Dmode=fast" />
  <envs><env name="LANG" value="C" /></envs>
  <patterns>
    <pattern testClass="com.acme.FooTest" />
    <pattern testClass="com.acme.BarTest" />
  </patterns>
</configuration>"#,
        )
        .write();
    let community = dir.path().join("community");
    let jdk = fake_jdk(&community.join("build/jdks/17"), &["java.base"]);

    let env = MapEnv::new();
    let loaded = load_project(
        &root,
        &LoadOptions {
            community_home: &community,
            jdk_version: 17,
            jdk_home: None,
            jdks_target_dir: None,
            env: &env,
        },
    )
    .expect("load");
    let options = BuildOptions::default();
    let paths = BuildPaths::new(&community, &root, &jdk, &options).expect("paths");
    let root = paths.project_home.clone();
    let messages = Arc::new(RecordingMessages::new());
    let context = CompilationContext::new(
        Arc::new(loaded),
        Arc::new(paths),
        options,
        ci,
        messages.clone(),
    )
    .expect("context");
    Fixture {
        _dir: dir,
        root,
        context,
        messages,
    }
}

fn app_options() -> TestingOptions {
    TestingOptions {
        main_module: Some("app".to_string()),
        ..TestingOptions::default()
    }
}

#[test]
fn batch_glob_schedules_one_invocation_per_test_method() {
    let fixture = setup(CiMetadata::default());
    let out = fixture.test_output();
    ClassFileBuilder::new("com/acme/FooTest")
        .method(MethodSpec::public("testBar").annotated(JUNIT5_TEST))
        .method(MethodSpec::private("helper").annotated(JUNIT5_TEST))
        .method(MethodSpec::public("notATest"))
        .write_to(&out);
    ClassFileBuilder::new("com/acme/util/Helper")
        .method(MethodSpec::public("testLike").annotated(JUNIT5_TEST))
        .write_to(&out);

    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new();
    let options = TestingOptions {
        batch_includes: Some("com/acme/**Test.class".to_string()),
        ..app_options()
    };
    let report = fixture
        .orchestrator(options, runner.clone(), &env)
        .run()
        .expect("run");

    assert_eq!(report.mode, "batch");
    assert!(report.success());
    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].label, "com.acme.FooTest#testBar");
    assert_eq!(requests[0].test_class.as_deref(), Some("com.acme.FooTest"));
    assert_eq!(requests[0].test_method.as_deref(), Some("testBar"));
    assert_eq!(requests[0].module, "app");
}

#[test]
fn invocation_that_cannot_start_is_reported_and_the_rest_still_run() {
    let fixture = setup(CiMetadata::default());
    ClassFileBuilder::new("com/acme/FooTest")
        .method(MethodSpec::public("testA").annotated(JUNIT5_TEST))
        .method(MethodSpec::public("testB").annotated(JUNIT5_TEST))
        .method(MethodSpec::public("testC").annotated(JUNIT5_TEST))
        .write_to(&fixture.test_output());

    let runner = Arc::new(RecordingRunner {
        fail_call: Some(1),
        ..RecordingRunner::default()
    });
    let env = MapEnv::new();
    let options = TestingOptions {
        batch_includes: Some("com/acme/**Test.class".to_string()),
        ..app_options()
    };
    let report = fixture
        .orchestrator(options, runner.clone(), &env)
        .run()
        .expect("run");

    assert_eq!(runner.requests().len(), 3);
    assert!(!report.success());
    let failed: Vec<&InvocationResult> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].label, "com.acme.FooTest#testB");
    assert_eq!(failed[0].exit_code, None);
    assert_eq!(
        failed[0].error.as_deref(),
        Some("failed to run `java`: no such file")
    );
    let codes: Vec<_> = report.invocations.iter().map(|r| r.exit_code).collect();
    assert_eq!(codes, vec![Some(0), None, Some(0)]);
    assert!(fixture
        .messages
        .warnings()
        .iter()
        .any(|w| w.contains("com.acme.FooTest#testB") && w.contains("could not be run")));
}

#[test]
fn batch_discovery_follows_superclasses_and_skips_abstract_classes() {
    let fixture = setup(CiMetadata::default());
    let out = fixture.test_output();
    ClassFileBuilder::new("com/acme/BaseTest")
        .access_flags(ACC_PUBLIC | ACC_ABSTRACT)
        .method(MethodSpec::public("inheritedCheck").annotated(JUNIT4_TEST))
        .write_to(&out);
    ClassFileBuilder::new("com/acme/BarTest")
        .super_class("com/acme/BaseTest")
        .method(MethodSpec::public("ownCase").annotated(JUNIT4_TEST))
        .write_to(&out);
    ClassFileBuilder::new("com/acme/deep/ZedTest")
        .method(MethodSpec::public("works").annotated("Lorg/testng/annotations/Test;"))
        .write_to(&out);

    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new();
    let options = TestingOptions {
        batch_includes: Some("**Test.class".to_string()),
        ..app_options()
    };
    let (_, planned) = fixture
        .orchestrator(options, runner, &env)
        .plan()
        .expect("plan");

    let labels: Vec<_> = planned.iter().map(|p| p.label.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "com.acme.BarTest#inheritedCheck",
            "com.acme.BarTest#ownCase",
            "com.acme.deep.ZedTest#works",
        ]
    );
}

#[test]
fn debug_method_target_runs_the_whole_class() {
    let fixture = setup(CiMetadata::default());
    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new()
        .with("KILN_DEBUG_TYPE", "method")
        .with("KILN_DEBUG_TARGET", "com.acme.FooTest#testBar");
    let options = TestingOptions {
        patterns: vec!["com.acme.*".to_string()],
        ..app_options()
    };
    let report = fixture
        .orchestrator(options, runner.clone(), &env)
        .run()
        .expect("run");

    assert_eq!(report.mode, "remote-debug");
    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].test_class.as_deref(), Some("com.acme.FooTest"));
    assert_eq!(requests[0].test_method, None);
    assert!(requests[0]
        .jvm_options
        .contains(&"-agentlib:jdwp=transport=dt_socket,server=y,suspend=y,address=5005".to_string()));

    let warnings = fixture.messages.warnings();
    assert!(
        warnings.iter().any(|w| w.contains("whole class `com.acme.FooTest`")),
        "{warnings:?}"
    );
    assert!(warnings.iter().any(|w| w.starts_with("test patterns ignored")), "{warnings:?}");
}

#[test]
fn unsupported_debug_granularity_fails_before_any_invocation() {
    let fixture = setup(CiMetadata::default());
    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new()
        .with("KILN_DEBUG_TYPE", "package")
        .with("KILN_DEBUG_TARGET", "com.acme");
    let err = fixture
        .orchestrator(app_options(), runner.clone(), &env)
        .run()
        .unwrap_err();
    assert!(err.is_configuration(), "{err}");
    assert!(runner.requests().is_empty());
}

#[test]
fn run_configuration_supplies_vm_parameters_env_and_patterns() {
    let fixture = setup(CiMetadata::default());
    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new();
    let options = TestingOptions {
        run_configurations: vec!["Fast Tests".to_string()],
        groups: vec!["ALL".to_string()],
        ..app_options()
    };
    let report = fixture
        .orchestrator(options, runner.clone(), &env)
        .run()
        .expect("run");
    assert_eq!(report.mode, "run-configurations");

    let requests = runner.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.label, "Fast Tests");
    assert_eq!(request.jvm_options[0], "-Xmx1g");
    assert!(!request.jvm_options.contains(&"-Xmx1024m".to_string()));
    assert!(request.jvm_options.contains(&"-Xms750m".to_string()));
    assert_eq!(request.system_properties.get("mode").map(String::as_str), Some("fast"));
    assert_eq!(
        request.system_properties.get("kiln.test.patterns").map(String::as_str),
        Some("com.acme.FooTest;com.acme.BarTest")
    );
    assert_eq!(request.env.get("LANG").map(String::as_str), Some("C"));
    assert_eq!(request.test_class, None);
    assert_eq!(
        request.classpath.first(),
        Some(&fixture.root.join("out/classes/test/app"))
    );

    assert_eq!(
        fixture.messages.warnings(),
        vec!["test groups ignored: run configurations take precedence".to_string()]
    );
}

#[test]
fn unknown_run_configuration_is_fatal() {
    let fixture = setup(CiMetadata::default());
    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new();
    let options = TestingOptions {
        run_configurations: vec!["Nope".to_string()],
        ..TestingOptions::default()
    };
    let err = fixture
        .orchestrator(options, runner.clone(), &env)
        .run()
        .unwrap_err();
    assert!(err.to_string().contains("Nope"), "{err}");
    assert!(runner.requests().is_empty());
}

#[test]
fn baseline_and_passthrough_properties_reach_the_test_jvm() {
    let fixture = setup(CiMetadata {
        build_number: Some("242.1".to_string()),
        ..CiMetadata::default()
    });
    fixture.context.data().add_debug_log_category("#com.acme");
    let runner = Arc::new(RecordingRunner::default());
    let env = MapEnv::new();
    let mut options = TestingOptions {
        groups: vec!["FAST".to_string(), "SLOW".to_string()],
        main_module: Some("old.app".to_string()),
        ..TestingOptions::default()
    };
    options
        .properties
        .insert("pass.idea.home.path".to_string(), "/elsewhere".to_string());
    options
        .properties
        .insert("pass.custom.flag".to_string(), "on".to_string());
    options
        .properties
        .insert("not.forwarded".to_string(), "x".to_string());

    fixture
        .orchestrator(options, runner.clone(), &env)
        .run()
        .expect("run");

    let requests = runner.requests();
    let props = &requests[0].system_properties;
    let get = |key: &str| props.get(key).map(String::as_str);
    let home = fixture.root.display().to_string();
    assert_eq!(get("idea.home.path"), Some(home.as_str()));
    assert_eq!(get("custom.flag"), Some("on"));
    assert_eq!(get("not.forwarded"), None);
    assert_eq!(get("build.number"), Some("242.1"));
    assert_eq!(get("file.encoding"), Some("UTF-8"));
    assert_eq!(get("idea.log.debug.categories"), Some("#com.acme"));
    assert_eq!(get("kiln.test.groups"), Some("FAST;SLOW"));
    assert_eq!(requests[0].module, "app");

    let classpath_file = PathBuf::from(get("classpath.file").expect("classpath file"));
    let listed: Vec<PathBuf> = std::fs::read_to_string(&classpath_file)
        .expect("read classpath file")
        .lines()
        .map(PathBuf::from)
        .collect();
    assert_eq!(listed, requests[0].classpath);

    let renamed: Vec<_> = fixture
        .messages
        .warnings()
        .into_iter()
        .filter(|w| w.contains("old.app"))
        .collect();
    assert_eq!(renamed.len(), 1);
}

#[test]
fn heap_dumps_are_forwarded_to_the_publisher() {
    let fixture = setup(CiMetadata::default());
    let snapshots = fixture.context.paths().snapshots_dir();
    write_file(&snapshots.join("stale.hprof"), "old");

    let sink = Arc::new(MemorySink::new());
    let publisher = ArtifactPublisher::new(
        &fixture.context.paths().artifacts_dir,
        PublicationPolicy::default(),
        Arc::new(PublicationCounter::new()),
        sink.clone(),
    );
    let runner = Arc::new(RecordingRunner {
        exit_code: 1,
        dump_heap: true,
        ..RecordingRunner::default()
    });
    let env = MapEnv::new();
    let report = fixture
        .orchestrator(app_options(), runner, &env)
        .with_publisher(&publisher)
        .run()
        .expect("run");

    assert!(!report.success());
    assert_eq!(report.failures().count(), 1);
    let dump = report.invocations[0].heap_dump.clone().expect("heap dump");
    assert!(dump.starts_with(&snapshots));
    assert!(!snapshots.join("stale.hprof").exists());
    assert_eq!(sink.specs(), vec![dump.display().to_string()]);
}
