use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use kiln_core::EnvSource;

use crate::{
    env_var_for_toolchain, strip_vendor_prefix, toolchain_name_for_version, JdkError, Toolchain,
    ToolchainRegistry,
};

/// A referenced toolchain that could not be resolved. Modules bound to it
/// cannot be compiled, but loading continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainWarning {
    pub name: String,
    pub message: String,
}

/// Locates JDK installations by explicit directory, naming convention and
/// `JDK_<name>_x64` environment variables.
pub struct ToolchainResolver<'a> {
    /// Explicit home for the primary toolchain.
    pub explicit_home: Option<&'a Path>,
    /// Conventional location: one sub-directory per toolchain name.
    pub jdks_dir: PathBuf,
    pub env: &'a dyn EnvSource,
}

impl<'a> ToolchainResolver<'a> {
    /// Resolve the primary toolchain for `version` and every toolchain named
    /// in `referenced`, merging each installation's own roots.
    ///
    /// Only the primary toolchain is required. A referenced toolchain that
    /// cannot be found, or whose installation cannot be read, is left
    /// unregistered and reported as a warning.
    pub fn resolve_all<'n>(
        &self,
        version: u32,
        referenced: impl IntoIterator<Item = &'n str>,
    ) -> Result<(ToolchainRegistry, Vec<ToolchainWarning>), JdkError> {
        let primary = with_installation_roots(self.resolve_primary(version)?)?;
        let mut registry = ToolchainRegistry::new(primary);
        let mut warnings = Vec::new();

        let pending: BTreeSet<&str> = referenced
            .into_iter()
            .filter(|name| !registry.contains(name))
            .collect();
        for name in pending {
            match self
                .resolve_referenced(name)
                .and_then(with_installation_roots)
            {
                Ok(toolchain) => {
                    tracing::debug!(
                        target: "kiln.jdk",
                        name,
                        home = %toolchain.home().display(),
                        "registered JDK"
                    );
                    registry.register(toolchain);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "kiln.jdk",
                        name,
                        error = %err,
                        "cannot use JDK; modules using it cannot be compiled"
                    );
                    warnings.push(ToolchainWarning {
                        name: name.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok((registry, warnings))
    }

    /// Resolve the toolchain for the configured language version.
    ///
    /// Order: explicit home, `<jdks_dir>/<name>`, `JDK_<name>_x64`.
    pub fn resolve_primary(&self, version: u32) -> Result<Toolchain, JdkError> {
        let name = toolchain_name_for_version(version);
        if let Some(home) = self.explicit_home {
            let home = coerce_to_jdk_home(home).ok_or_else(|| JdkError::InvalidHome {
                path: home.to_path_buf(),
            })?;
            return Ok(Toolchain::new(name, home));
        }

        let home = self.resolve_home(&name)?;
        Ok(Toolchain::new(name, home))
    }

    /// Resolve a toolchain referenced by a module, e.g. `corretto-17`.
    ///
    /// The vendor prefix is dropped for lookup; the toolchain keeps the
    /// referenced name.
    pub fn resolve_referenced(&self, name: &str) -> Result<Toolchain, JdkError> {
        let home = self.resolve_home(strip_vendor_prefix(name))?;
        Ok(Toolchain::new(name, home))
    }

    fn resolve_home(&self, name: &str) -> Result<PathBuf, JdkError> {
        let conventional = self.jdks_dir.join(name);
        if let Some(home) = coerce_to_jdk_home(&conventional) {
            return Ok(home);
        }

        let var = env_var_for_toolchain(name);
        if let Some(value) = self.env.var(&var).filter(|v| !v.trim().is_empty()) {
            let candidate = PathBuf::from(value.trim());
            return coerce_to_jdk_home(&candidate).ok_or(JdkError::InvalidHome { path: candidate });
        }

        Err(JdkError::NotFound {
            name: name.to_string(),
            tried: vec![conventional.display().to_string(), format!("${var}")],
        })
    }
}

fn with_installation_roots(mut toolchain: Toolchain) -> Result<Toolchain, JdkError> {
    let added = toolchain.merge_installation_roots()?;
    tracing::trace!(target: "kiln.jdk", name = toolchain.name(), added, "merged JDK roots");
    Ok(toolchain)
}

/// Accept a JDK home directly or a macOS bundle (`Contents/Home`).
fn coerce_to_jdk_home(candidate: &Path) -> Option<PathBuf> {
    if is_jdk_home(candidate) {
        return Some(candidate.to_path_buf());
    }
    let bundle_home = candidate.join("Contents").join("Home");
    if is_jdk_home(&bundle_home) {
        return Some(bundle_home);
    }
    None
}

fn is_jdk_home(path: &Path) -> bool {
    path.join("bin").is_dir() || path.join("release").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::MapEnv;
    use kiln_test_utils::fake_jdk;
    use pretty_assertions::assert_eq;

    #[test]
    fn explicit_home_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let explicit = fake_jdk(&tmp.path().join("explicit"), &["java.base"]);
        fake_jdk(&tmp.path().join("jdks").join("17"), &["java.base"]);
        let env = MapEnv::new();
        let resolver = ToolchainResolver {
            explicit_home: Some(&explicit),
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        let toolchain = resolver.resolve_primary(17).unwrap();

        assert_eq!(toolchain.name(), "17");
        assert_eq!(toolchain.home(), explicit.as_path());
    }

    #[test]
    fn convention_then_environment() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = fake_jdk(&tmp.path().join("somewhere").join("jdk8"), &[]);
        let env = MapEnv::new().with("JDK_18_x64", legacy.display().to_string());
        let resolver = ToolchainResolver {
            explicit_home: None,
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        let toolchain = resolver.resolve_primary(8).unwrap();
        assert_eq!(toolchain.name(), "1.8");
        assert_eq!(toolchain.home(), legacy.as_path());

        let conventional = fake_jdk(&tmp.path().join("jdks").join("1.8"), &[]);
        let toolchain = resolver.resolve_primary(8).unwrap();
        assert_eq!(toolchain.home(), conventional.as_path());
    }

    #[test]
    fn accepts_macos_bundle_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let home = fake_jdk(
            &tmp.path().join("jdks").join("21").join("Contents").join("Home"),
            &["java.base"],
        );
        let env = MapEnv::new();
        let resolver = ToolchainResolver {
            explicit_home: None,
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        assert_eq!(resolver.resolve_primary(21).unwrap().home(), home.as_path());
    }

    #[test]
    fn unresolved_references_warn_and_keep_going() {
        let tmp = tempfile::tempdir().unwrap();
        fake_jdk(&tmp.path().join("jdks").join("17"), &["java.base", "java.sql"]);
        let env = MapEnv::new();
        let resolver = ToolchainResolver {
            explicit_home: None,
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        let (registry, warnings) = resolver
            .resolve_all(17, ["corretto-17", "17", "zulu-11", "corretto-17"])
            .unwrap();

        assert_eq!(registry.primary().name(), "17");
        assert!(registry.contains("corretto-17"));
        assert_eq!(
            registry.get("corretto-17").unwrap().home(),
            registry.primary().home()
        );
        assert!(!registry.contains("zulu-11"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "zulu-11");
        assert_eq!(registry.primary().class_roots().len(), 2);
    }

    #[test]
    fn missing_primary_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let env = MapEnv::new();
        let resolver = ToolchainResolver {
            explicit_home: None,
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        let err = resolver.resolve_primary(17).unwrap_err();
        assert!(matches!(err, JdkError::NotFound { ref name, .. } if name == "17"));
        assert!(err.to_string().contains("$JDK_17_x64"));
    }

    #[test]
    fn unreadable_referenced_installation_is_a_warning() {
        let tmp = tempfile::tempdir().unwrap();
        fake_jdk(&tmp.path().join("jdks").join("17"), &["java.base"]);
        // A `release` that is a directory cannot be read as a file.
        let broken = tmp.path().join("jdks").join("11");
        std::fs::create_dir_all(broken.join("bin")).unwrap();
        std::fs::create_dir_all(broken.join("release")).unwrap();
        let env = MapEnv::new();
        let resolver = ToolchainResolver {
            explicit_home: None,
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        let (registry, warnings) = resolver.resolve_all(17, ["corretto-11"]).unwrap();

        assert!(!registry.contains("corretto-11"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].name, "corretto-11");
        assert!(warnings[0].message.contains("release"), "{}", warnings[0].message);
    }

    #[test]
    fn unreadable_primary_installation_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("jdks").join("17");
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::create_dir_all(home.join("release")).unwrap();
        let env = MapEnv::new();
        let resolver = ToolchainResolver {
            explicit_home: None,
            jdks_dir: tmp.path().join("jdks"),
            env: &env,
        };

        let err = resolver.resolve_all(17, std::iter::empty::<&str>()).unwrap_err();
        assert!(matches!(err, JdkError::Io { .. }), "{err}");
    }
}
