use std::path::PathBuf;

use serde::Serialize;

/// Outcome of one test invocation. Test-level results stay with the test
/// framework; only the exit code is captured, or the reason the invocation
/// could not be run at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResult {
    pub label: String,
    /// `None` when the invocation failed before the JVM exited.
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heap_dump: Option<PathBuf>,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunReport {
    pub mode: String,
    pub invocations: Vec<InvocationResult>,
}

impl TestRunReport {
    /// True when every invocation exited with 0.
    pub fn success(&self) -> bool {
        self.invocations.iter().all(InvocationResult::success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &InvocationResult> {
        self.invocations.iter().filter(|r| !r.success())
    }
}
