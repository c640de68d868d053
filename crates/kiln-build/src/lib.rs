//! Compilation context, runtime classpaths and artifact publication.
//!
//! A [`CompilationContext`] is built once per top-level invocation from a
//! loaded project. It reconciles [`BuildOptions`](kiln_core::BuildOptions),
//! assigns module output directories and answers classpath and module
//! lookups for the test orchestrator. [`ArtifactPublisher`] reports built
//! artifacts to CI, gated by free disk space.

mod classpath;
mod context;
mod data;
mod messages;
mod publish;

pub use classpath::RuntimeClasspathBuilder;
pub use context::CompilationContext;
pub use data::CompilationData;
pub use messages::{BuildMessages, RecordingMessages, TracingMessages};
pub use publish::{
    ArtifactPublisher, ArtifactSink, DiskSpace, Fs2DiskSpace, MemorySink, Publication,
    PublicationCounter, PublicationPolicy, ServiceMessageSink,
};
