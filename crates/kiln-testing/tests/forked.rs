//! Forked backend against a stand-in `java` script.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use kiln_build::{CompilationContext, RecordingMessages};
use kiln_core::{BuildOptions, BuildPaths, CiMetadata, MapEnv};
use kiln_process::ProcessSupervisor;
use kiln_project::{load_project, LoadOptions};
use kiln_test_utils::{fake_jdk, write_file, ModuleSpec, ProjectFixture};
use kiln_testing::{ExecutionBackend, TestRunOrchestrator, TestingOptions};
use pretty_assertions::assert_eq;

/// Copies the argfile next to itself and exits with 3.
const FAKE_JAVA: &str = r#"#!/bin/sh
cp "${1#@}" "$(dirname "$0")/captured-argfile"
exit 3
"#;

#[test]
fn forked_jvm_receives_everything_through_the_argfile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = ProjectFixture::new(&dir.path().join("project"))
        .project_sdk("17")
        .module(ModuleSpec::new("app"))
        .write();
    let community = dir.path().join("community");
    let jdk = fake_jdk(&community.join("build/jdks/17"), &["java.base"]);
    let java = jdk.join("bin/java");
    write_file(&java, FAKE_JAVA);
    std::fs::set_permissions(&java, std::fs::Permissions::from_mode(0o755)).expect("chmod");

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
    let context = CompilationContext::new(
        Arc::new(loaded),
        Arc::new(paths),
        options,
        CiMetadata::default(),
        Arc::new(RecordingMessages::new()),
    )
    .expect("context");

    let debug_env = MapEnv::new()
        .with("KILN_DEBUG_TARGET", "com.acme.FooTest")
        .with("KILN_DEBUG_SUSPEND", "false");
    let options = TestingOptions {
        main_module: Some("app".to_string()),
        runner_main_class: "com.acme.Runner".to_string(),
        jvm_options: vec!["-Dgreeting=hello world".to_string()],
        ..TestingOptions::default()
    };
    let report = TestRunOrchestrator::new(
        &context,
        options,
        ExecutionBackend::Forked(ProcessSupervisor::inherit()),
        &debug_env,
    )
    .run()
    .expect("run");

    assert_eq!(report.invocations.len(), 1);
    assert_eq!(report.invocations[0].exit_code, Some(3));

    let captured = std::fs::read_to_string(context.java_executable(None).with_file_name("captured-argfile"))
        .expect("argfile copy");
    let lines: Vec<&str> = captured.lines().collect();
    assert_eq!(lines[0], "-classpath");
    let classes = context.classes_output_dir();
    assert_eq!(
        lines[1],
        format!(
            "{}:{}",
            classes.join("test/app").display(),
            classes.join("production/app").display()
        )
    );
    assert!(lines.contains(&"-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=5005"));
    assert!(lines.contains(&"\"-Dgreeting=hello world\""));
    assert_eq!(
        lines[lines.len() - 2..].to_vec(),
        vec!["com.acme.Runner", "com.acme.FooTest"]
    );
}
