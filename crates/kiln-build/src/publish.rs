use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Disk-space admission policy for eager artifact publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublicationPolicy {
    /// Artifacts up to this size are published without any free-space check.
    pub eager_publish_threshold: u64,
    /// Space the artifacts directory is expected to need by the end of the
    /// build.
    pub required_space_for_artifacts: u64,
    /// Safety margin kept free on the volume.
    pub required_additional_space: u64,
}

impl Default for PublicationPolicy {
    fn default() -> Self {
        Self {
            eager_publish_threshold: MIB,
            required_space_for_artifacts: 20 * GIB,
            required_additional_space: 5 * GIB,
        }
    }
}

/// Bytes of large artifacts seen so far in this build session.
#[derive(Debug, Default)]
pub struct PublicationCounter {
    total: AtomicU64,
}

impl PublicationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `bytes` and returns the new total.
    pub fn add(&self, bytes: u64) -> u64 {
        self.total.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// Receives `absolutePath[=>relativeTarget]` publication specs.
pub trait ArtifactSink: Send + Sync {
    fn publish(&self, spec: &str);
}

/// Prints TeamCity `publishArtifacts` service messages to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServiceMessageSink;

impl ArtifactSink for ServiceMessageSink {
    fn publish(&self, spec: &str) {
        println!("##teamcity[publishArtifacts '{}']", escape_service_message(spec));
    }
}

/// Collects specs in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    specs: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn specs(&self) -> Vec<String> {
        self.specs.lock().clone()
    }
}

impl ArtifactSink for MemorySink {
    fn publish(&self, spec: &str) {
        self.specs.lock().push(spec.to_string());
    }
}

pub trait DiskSpace: Send + Sync {
    fn available_space(&self, path: &Path) -> io::Result<u64>;
}

/// Queries the volume through `fs2::available_space`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fs2DiskSpace;

impl DiskSpace for Fs2DiskSpace {
    fn available_space(&self, path: &Path) -> io::Result<u64> {
        fs2::available_space(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publication {
    Published,
    /// Not enough free space; the artifact stays on disk unpublished.
    Withheld,
}

/// Notifies the CI aggregator about built artifacts, holding back large
/// ones while the volume is short on space.
pub struct ArtifactPublisher {
    artifacts_dir: PathBuf,
    policy: PublicationPolicy,
    counter: Arc<PublicationCounter>,
    sink: Arc<dyn ArtifactSink>,
    disk_space: Arc<dyn DiskSpace>,
}

impl ArtifactPublisher {
    pub fn new(
        artifacts_dir: &Path,
        policy: PublicationPolicy,
        counter: Arc<PublicationCounter>,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            artifacts_dir: artifacts_dir.to_path_buf(),
            policy,
            counter,
            sink,
            disk_space: Arc::new(Fs2DiskSpace),
        }
    }

    pub fn with_disk_space(mut self, disk_space: Arc<dyn DiskSpace>) -> Self {
        self.disk_space = disk_space;
        self
    }

    pub fn policy(&self) -> &PublicationPolicy {
        &self.policy
    }

    pub fn notify_artifact_was_built(&self, path: &Path) -> Publication {
        let path = kiln_core::absolutize(path).unwrap_or_else(|_| path.to_path_buf());
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                tracing::warn!(
                    target: "kiln.publish",
                    path = %path.display(),
                    error = %err,
                    "cannot stat artifact"
                );
                None
            }
        };
        let is_file = metadata.as_ref().is_some_and(|m| m.is_file());
        let is_dir = metadata.as_ref().is_some_and(|m| m.is_dir());
        let size = metadata.as_ref().filter(|m| m.is_file()).map_or(0, |m| m.len());

        if size > self.policy.eager_publish_threshold {
            let produced = self.counter.add(size);
            if is_file && path.starts_with(self.artifacts_root()) {
                let required = self
                    .policy
                    .required_additional_space
                    .saturating_add(self.policy.required_space_for_artifacts)
                    .saturating_add(size)
                    .saturating_sub(produced);
                match self.disk_space.available_space(&path) {
                    Ok(available) if available < required => {
                        tracing::info!(
                            target: "kiln.publish",
                            path = %path.display(),
                            size,
                            required,
                            available,
                            "not enough free space; artifact will not be published now"
                        );
                        return Publication::Withheld;
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(
                        target: "kiln.publish",
                        path = %path.display(),
                        error = %err,
                        "cannot query free space; publishing anyway"
                    ),
                }
            }
        }

        self.sink.publish(&self.publication_spec(&path, is_dir));
        Publication::Published
    }

    fn artifacts_root(&self) -> PathBuf {
        kiln_core::absolutize(&self.artifacts_dir).unwrap_or_else(|_| self.artifacts_dir.clone())
    }

    /// `absolutePath[=>relativeTarget]`: the target is the artifact's parent
    /// under the artifacts root, plus its own name for directories.
    fn publication_spec(&self, path: &Path, is_dir: bool) -> String {
        let absolute = path.display().to_string();
        let root = self.artifacts_root();
        let Ok(relative) = path.strip_prefix(&root) else {
            return absolute;
        };
        let target = if is_dir {
            relative
        } else {
            relative.parent().unwrap_or(Path::new(""))
        };
        let target = to_slash(target);
        if target.is_empty() {
            absolute
        } else {
            format!("{absolute}=>{target}")
        }
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn escape_service_message(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '|' => out.push_str("||"),
            '\'' => out.push_str("|'"),
            '[' => out.push_str("|["),
            ']' => out.push_str("|]"),
            '\n' => out.push_str("|n"),
            '\r' => out.push_str("|r"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_service_message_characters() {
        assert_eq!(
            escape_service_message("a|b'c[d]\ne"),
            "a||b|'c|[d|]|ne"
        );
    }

    #[test]
    fn counter_accumulates() {
        let counter = PublicationCounter::new();
        assert_eq!(counter.add(10), 10);
        assert_eq!(counter.add(5), 15);
        assert_eq!(counter.total(), 15);
    }
}
