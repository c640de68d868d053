use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiln_process::{CommandSpec, ProcessSupervisor};
use serde::Serialize;

use crate::{argfile, Result, TestingError};

/// Everything needed to run one test invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestTaskRequest {
    pub label: String,
    pub module: String,
    pub java: PathBuf,
    pub working_dir: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub jvm_options: Vec<String>,
    pub system_properties: BTreeMap<String, String>,
    pub runner_main_class: String,
    pub test_class: Option<String>,
    pub test_method: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl TestTaskRequest {
    /// Launcher arguments in argfile order: classpath, JVM options,
    /// properties, runner main class, target class and method.
    pub fn launcher_args(&self) -> Vec<String> {
        let mut args = vec![
            "-classpath".to_string(),
            argfile::join_classpath(&self.classpath),
        ];
        args.extend(self.jvm_options.iter().cloned());
        args.extend(
            self.system_properties
                .iter()
                .map(|(k, v)| format!("-D{k}={v}")),
        );
        args.push(self.runner_main_class.clone());
        args.extend(self.test_class.iter().cloned());
        args.extend(self.test_method.iter().cloned());
        args
    }
}

/// Runs tests without forking a JVM from kiln itself.
pub trait TaskRunner: Send + Sync {
    /// Returns the exit code of the test task.
    fn run_tests(&self, request: &TestTaskRequest) -> Result<i32>;
}

/// Hands each request to an external command as a JSON file appended to
/// its arguments.
pub struct ExternalTaskRunner {
    program: PathBuf,
    args: Vec<String>,
    supervisor: ProcessSupervisor,
    requests: AtomicUsize,
}

impl ExternalTaskRunner {
    pub fn new(program: &Path, args: &[String]) -> Self {
        Self {
            program: program.to_path_buf(),
            args: args.to_vec(),
            supervisor: ProcessSupervisor::inherit(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }
}

impl TaskRunner for ExternalTaskRunner {
    fn run_tests(&self, request: &TestTaskRequest) -> Result<i32> {
        let n = self.requests.fetch_add(1, Ordering::Relaxed);
        let request_file = request.working_dir.join(format!("task-request-{n}.json"));
        let json = serde_json::to_vec_pretty(request)?;
        std::fs::create_dir_all(&request.working_dir)
            .map_err(|source| TestingError::io(&request.working_dir, source))?;
        std::fs::write(&request_file, json).map_err(|source| TestingError::io(&request_file, source))?;

        let mut args = self.args.clone();
        args.push(request_file.display().to_string());
        let command = CommandSpec::new(&request.working_dir, &self.program, &args);
        let outcome = self
            .supervisor
            .run(&command, &request.env)
            .map_err(|source| TestingError::Spawn {
                command: command.to_string(),
                source,
            })?;
        Ok(outcome.exit_code)
    }
}

/// How test invocations are executed; chosen once when the orchestrator is
/// built.
#[derive(Clone)]
pub enum ExecutionBackend {
    InProcess(Arc<dyn TaskRunner>),
    /// `<java> @<argfile>` under a [`ProcessSupervisor`].
    Forked(ProcessSupervisor),
}

impl std::fmt::Debug for ExecutionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProcess(_) => f.write_str("InProcess"),
            Self::Forked(_) => f.write_str("Forked"),
        }
    }
}

impl ExecutionBackend {
    pub fn forked() -> Self {
        Self::Forked(ProcessSupervisor::inherit())
    }

    pub fn in_process(runner: Arc<dyn TaskRunner>) -> Self {
        Self::InProcess(runner)
    }

    /// Run `request`; `argfile_path` is only written by the forked backend.
    pub fn execute(&self, request: &TestTaskRequest, argfile_path: &Path) -> Result<i32> {
        match self {
            Self::InProcess(runner) => runner.run_tests(request),
            Self::Forked(supervisor) => {
                argfile::write(argfile_path, &request.launcher_args())?;
                let command = CommandSpec::new(
                    &request.working_dir,
                    &request.java,
                    &[format!("@{}", argfile_path.display())],
                );
                tracing::info!(target: "kiln.testing", command = %command, label = %request.label, "forking test JVM");
                let outcome = supervisor
                    .run(&command, &request.env)
                    .map_err(|source| TestingError::Spawn {
                        command: command.to_string(),
                        source,
                    })?;
                for log in &outcome.crash_logs {
                    tracing::warn!(
                        target: "kiln.testing",
                        log = %log.display(),
                        "test JVM left a fatal error log"
                    );
                }
                Ok(outcome.exit_code)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn launcher_args_end_with_runner_and_target() {
        let request = TestTaskRequest {
            label: "com.acme.FooTest#testBar".to_string(),
            module: "app".to_string(),
            java: PathBuf::from("/jdk/bin/java"),
            working_dir: PathBuf::from("/work"),
            classpath: vec![PathBuf::from("/a"), PathBuf::from("/b")],
            jvm_options: vec!["-Xmx1g".to_string()],
            system_properties: [("b".to_string(), "2".to_string()), ("a".to_string(), "1".to_string())]
                .into_iter()
                .collect(),
            runner_main_class: "Runner".to_string(),
            test_class: Some("com.acme.FooTest".to_string()),
            test_method: Some("testBar".to_string()),
            env: BTreeMap::new(),
        };
        let separator = if cfg!(windows) { ";" } else { ":" };
        assert_eq!(
            request.launcher_args(),
            vec![
                "-classpath".to_string(),
                format!("/a{separator}/b"),
                "-Xmx1g".to_string(),
                "-Da=1".to_string(),
                "-Db=2".to_string(),
                "Runner".to_string(),
                "com.acme.FooTest".to_string(),
                "testBar".to_string(),
            ]
        );
    }
}
