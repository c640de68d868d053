//! Utilities shared by kiln tests.
//!
//! - [`fake_jdk`]: a directory that passes for a JDK installation.
//! - [`ProjectFixture`]: writes a JPS-style `.idea` project to disk.
//! - [`ClassFileBuilder`]: emits minimal but valid `.class` files carrying
//!   annotations, so test discovery can be exercised without `javac`.

mod classfile;
mod project;

pub use classfile::{ClassFileBuilder, MethodSpec, ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC};
pub use project::{ModuleSpec, ProjectFixture};

use std::fs;
use std::path::{Path, PathBuf};

/// Create a fake JDK at `home` with `bin/java` and a `release` file listing
/// `modules` (no `MODULES` entry when empty). Returns `home`.
pub fn fake_jdk(home: &Path, modules: &[&str]) -> PathBuf {
    let bin = home.join("bin");
    fs::create_dir_all(&bin).expect("create fake JDK bin dir");
    fs::write(bin.join("java"), "#!/bin/sh\n").expect("write fake java");

    let mut release = String::from("JAVA_VERSION=\"17.0.9\"\n");
    if !modules.is_empty() {
        release.push_str(&format!("MODULES=\"{}\"\n", modules.join(" ")));
    }
    fs::write(home.join("release"), release).expect("write fake JDK release file");
    home.to_path_buf()
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(path, contents).expect("write fixture file");
}
