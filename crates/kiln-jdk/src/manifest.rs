use std::path::Path;

use crate::JdkError;

/// The parts of a JDK's `release` file kiln cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseManifest {
    pub java_version: Option<String>,
    /// Platform modules, in file order. Empty for pre-JPMS installations.
    pub modules: Vec<String>,
}

/// Read `<home>/release`. Returns `Ok(None)` when the file does not exist.
pub fn read_release_manifest(home: &Path) -> Result<Option<ReleaseManifest>, JdkError> {
    let path = home.join("release");
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(JdkError::Io { path, source }),
    };

    let mut manifest = ReleaseManifest::default();
    for line in contents.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            "JAVA_VERSION" => manifest.java_version = Some(value.to_string()),
            "MODULES" => {
                manifest.modules = value.split_whitespace().map(str::to_string).collect();
            }
            _ => {}
        }
    }
    Ok(Some(manifest))
}
