use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kiln_build::{
    ArtifactPublisher, DiskSpace, MemorySink, Publication, PublicationCounter,
    PublicationPolicy,
};
use kiln_test_utils::write_file;
use pretty_assertions::assert_eq;

/// Reports a fixed amount of free space and counts queries.
struct FixedDiskSpace {
    available: io::Result<u64>,
    queries: AtomicUsize,
}

impl FixedDiskSpace {
    fn new(available: io::Result<u64>) -> Arc<Self> {
        Arc::new(Self {
            available,
            queries: AtomicUsize::new(0),
        })
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl DiskSpace for FixedDiskSpace {
    fn available_space(&self, _path: &Path) -> io::Result<u64> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match &self.available {
            Ok(bytes) => Ok(*bytes),
            Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
        }
    }
}

const POLICY: PublicationPolicy = PublicationPolicy {
    eager_publish_threshold: 16,
    required_space_for_artifacts: 1_000,
    required_additional_space: 100,
};

struct Setup {
    _dir: tempfile::TempDir,
    artifacts: PathBuf,
    sink: Arc<MemorySink>,
    counter: Arc<PublicationCounter>,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().expect("tempdir");
    let artifacts = dir.path().join("artifacts");
    std::fs::create_dir_all(&artifacts).expect("artifacts dir");
    let artifacts = canonical(&artifacts);
    Setup {
        _dir: dir,
        artifacts,
        sink: Arc::new(MemorySink::new()),
        counter: Arc::new(PublicationCounter::new()),
    }
}

fn canonical(path: &Path) -> PathBuf {
    kiln_core::absolutize(path).expect("absolutize")
}

fn publisher(setup: &Setup, disk_space: Arc<FixedDiskSpace>) -> ArtifactPublisher {
    ArtifactPublisher::new(
        &setup.artifacts,
        POLICY,
        setup.counter.clone(),
        setup.sink.clone(),
    )
    .with_disk_space(disk_space)
}

#[test]
fn small_artifacts_publish_without_probing() {
    let setup = setup();
    let disk_space = FixedDiskSpace::new(Ok(0));
    let file = setup.artifacts.join("dist/small.txt");
    write_file(&file, "tiny");

    let outcome = publisher(&setup, disk_space.clone()).notify_artifact_was_built(&file);
    assert_eq!(outcome, Publication::Published);
    assert_eq!(disk_space.queries(), 0);
    assert_eq!(setup.counter.total(), 0);
    assert_eq!(
        setup.sink.specs(),
        vec![format!("{}=>dist", file.display())]
    );
}

#[test]
fn large_artifact_is_withheld_when_space_is_short() {
    let setup = setup();
    let file = setup.artifacts.join("big.zip");
    write_file(&file, vec![0u8; 64]);

    // required = 100 + 1000 - 64 + 64 = 1100
    let disk_space = FixedDiskSpace::new(Ok(1_099));
    let outcome = publisher(&setup, disk_space.clone()).notify_artifact_was_built(&file);
    assert_eq!(outcome, Publication::Withheld);
    assert_eq!(disk_space.queries(), 1);
    assert!(setup.sink.specs().is_empty());
    assert!(file.exists());
}

#[test]
fn large_artifact_is_published_once_with_enough_space() {
    let setup = setup();
    let file = setup.artifacts.join("big.zip");
    write_file(&file, vec![0u8; 64]);

    let disk_space = FixedDiskSpace::new(Ok(1_100));
    let outcome = publisher(&setup, disk_space).notify_artifact_was_built(&file);
    assert_eq!(outcome, Publication::Published);
    assert_eq!(setup.sink.specs(), vec![file.display().to_string()]);
}

#[test]
fn produced_total_reduces_required_space() {
    let setup = setup();
    let first = setup.artifacts.join("a.zip");
    let second = setup.artifacts.join("b.zip");
    write_file(&first, vec![0u8; 500]);
    write_file(&second, vec![0u8; 500]);

    // After both: required = 1100 - 1000 + 500 = 600.
    let disk_space = FixedDiskSpace::new(Ok(700));
    let publisher = publisher(&setup, disk_space);
    assert_eq!(publisher.notify_artifact_was_built(&first), Publication::Withheld);
    assert_eq!(publisher.notify_artifact_was_built(&second), Publication::Published);
    assert_eq!(setup.counter.total(), 1_000);
}

#[test]
fn free_space_query_failure_publishes() {
    let setup = setup();
    let file = setup.artifacts.join("big.zip");
    write_file(&file, vec![0u8; 64]);

    let disk_space = FixedDiskSpace::new(Err(io::Error::new(io::ErrorKind::Other, "statvfs failed")));
    let outcome = publisher(&setup, disk_space.clone()).notify_artifact_was_built(&file);
    assert_eq!(outcome, Publication::Published);
    assert_eq!(disk_space.queries(), 1);
}

#[test]
fn files_outside_the_artifacts_dir_are_not_gated() {
    let setup = setup();
    let outside = canonical(setup._dir.path()).join("elsewhere/big.zip");
    write_file(&outside, vec![0u8; 64]);

    let disk_space = FixedDiskSpace::new(Ok(0));
    let outcome = publisher(&setup, disk_space.clone()).notify_artifact_was_built(&outside);
    assert_eq!(outcome, Publication::Published);
    assert_eq!(disk_space.queries(), 0);
    assert_eq!(setup.counter.total(), 64);
    assert_eq!(setup.sink.specs(), vec![outside.display().to_string()]);
}

#[test]
fn directories_target_their_own_name() {
    let setup = setup();
    let dir = setup.artifacts.join("reports/html");
    std::fs::create_dir_all(&dir).expect("report dir");

    let outcome = publisher(&setup, FixedDiskSpace::new(Ok(0))).notify_artifact_was_built(&dir);
    assert_eq!(outcome, Publication::Published);
    assert_eq!(
        setup.sink.specs(),
        vec![format!("{}=>reports/html", dir.display())]
    );
}
