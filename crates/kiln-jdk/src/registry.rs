use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::{read_release_manifest, JdkError};

/// A registered JDK installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    name: String,
    home: PathBuf,
    class_roots: Vec<PathBuf>,
}

impl Toolchain {
    pub fn new(name: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home: home.into(),
            class_roots: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Compiled roots contributed by this installation, in registration order.
    ///
    /// Modular JDKs contribute `jrt:` roots (`<home>!/<module>`), which name a
    /// module inside the runtime image rather than a file on disk.
    pub fn class_roots(&self) -> &[PathBuf] {
        &self.class_roots
    }

    pub fn java_executable(&self) -> PathBuf {
        let exe = if cfg!(windows) { "java.exe" } else { "java" };
        self.home.join("bin").join(exe)
    }

    /// Add `root` unless it is already present. Returns whether it was added.
    pub fn add_class_root(&mut self, root: PathBuf) -> bool {
        if self.class_roots.contains(&root) {
            return false;
        }
        self.class_roots.push(root);
        true
    }

    /// Merge the roots listed by the installation itself.
    ///
    /// Idempotent: entries already present are skipped. Returns the number of
    /// roots added.
    pub fn merge_installation_roots(&mut self) -> Result<usize, JdkError> {
        let mut added = 0;
        let manifest = read_release_manifest(&self.home)?;
        match manifest {
            Some(manifest) if !manifest.modules.is_empty() => {
                for module in &manifest.modules {
                    let root = PathBuf::from(format!("jrt://{}!/{module}", self.home.display()));
                    if self.add_class_root(root) {
                        added += 1;
                    }
                }
            }
            _ => {
                for jar in legacy_runtime_jars(&self.home)? {
                    if self.add_class_root(jar) {
                        added += 1;
                    }
                }
            }
        }
        Ok(added)
    }
}

fn legacy_runtime_jars(home: &Path) -> Result<Vec<PathBuf>, JdkError> {
    let lib = home.join("jre").join("lib");
    let entries = match std::fs::read_dir(&lib) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(JdkError::Io { path: lib, source }),
    };

    let mut jars: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jar"))
        .collect();
    jars.sort();
    Ok(jars)
}

/// All toolchains known to a build, keyed by the name modules reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainRegistry {
    primary: String,
    toolchains: BTreeMap<String, Toolchain>,
}

impl ToolchainRegistry {
    pub fn new(primary: Toolchain) -> Self {
        let name = primary.name().to_string();
        let mut toolchains = BTreeMap::new();
        toolchains.insert(name.clone(), primary);
        Self {
            primary: name,
            toolchains,
        }
    }

    pub fn primary(&self) -> &Toolchain {
        &self.toolchains[&self.primary]
    }

    pub fn get(&self, name: &str) -> Option<&Toolchain> {
        self.toolchains.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.toolchains.contains_key(name)
    }

    pub fn register(&mut self, toolchain: Toolchain) {
        self.toolchains
            .insert(toolchain.name().to_string(), toolchain);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toolchain> {
        self.toolchains.values()
    }
}
