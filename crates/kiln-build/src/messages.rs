use parking_lot::Mutex;

/// Where a build reports progress and non-fatal problems.
///
/// Contexts hold one behind an `Arc`; [`CompilationContext::create_copy`]
/// can swap it for a nested build.
///
/// [`CompilationContext::create_copy`]: crate::CompilationContext::create_copy
pub trait BuildMessages: Send + Sync {
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
}

/// Forwards messages to `tracing` under the `kiln.build` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMessages;

impl BuildMessages for TracingMessages {
    fn info(&self, message: &str) {
        tracing::info!(target: "kiln.build", "{message}");
    }

    fn warning(&self, message: &str) {
        tracing::warn!(target: "kiln.build", "{message}");
    }
}

/// Keeps every message in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingMessages {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingMessages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }
}

impl BuildMessages for RecordingMessages {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn warning(&self, message: &str) {
        self.warnings.lock().push(message.to_string());
    }
}
