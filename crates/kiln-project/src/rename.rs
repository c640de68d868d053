use std::collections::BTreeMap;
use std::path::Path;

use kiln_core::ConfigurationError;

use crate::xml;

/// Location of the rename history relative to a project home.
pub const RENAME_HISTORY_FILE: &str = ".idea/moduleRenamingHistory.xml";

/// Bidirectional `old name <-> new name` map of renamed modules.
///
/// The inverse is kept exact: every new name is the target of exactly one
/// old name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleRenameMap {
    forward: BTreeMap<String, String>,
    inverse: BTreeMap<String, String>,
}

impl ModuleRenameMap {
    /// Read the rename history of every home in order. Missing files are
    /// skipped; later entries override earlier ones.
    ///
    /// Returns the map together with warnings about evicted entries.
    pub fn load(homes: &[&Path]) -> Result<(Self, Vec<String>), ConfigurationError> {
        let mut entries = Vec::new();
        for home in homes {
            let path = home.join(RENAME_HISTORY_FILE);
            if !path.is_file() {
                continue;
            }
            entries.extend(read_history(&path)?);
        }
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, String)>,
    ) -> (Self, Vec<String>) {
        let mut map = Self::default();
        let mut warnings = Vec::new();
        for (old, new) in entries {
            if let Some(previous) = map.forward.remove(&old) {
                map.inverse.remove(&previous);
            }
            if let Some(evicted) = map.inverse.remove(&new) {
                map.forward.remove(&evicted);
                let message = format!(
                    "module rename `{evicted}` -> `{new}` is superseded by `{old}` -> `{new}`"
                );
                tracing::warn!(target: "kiln.project", "{message}");
                warnings.push(message);
            }
            map.forward.insert(old.clone(), new.clone());
            map.inverse.insert(new, old);
        }
        (map, warnings)
    }

    /// Current name of a module that used to be called `old`.
    pub fn new_name(&self, old: &str) -> Option<&str> {
        self.forward.get(old).map(String::as_str)
    }

    /// Former name of the module now called `new`.
    pub fn old_name(&self, new: &str) -> Option<&str> {
        self.inverse.get(new).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forward.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn read_history(path: &Path) -> Result<Vec<(String, String)>, ConfigurationError> {
    let contents = xml::read(path)?;
    let doc = xml::parse(path, &contents)?;
    let Some(component) = xml::component(&doc, "ModuleRenamingHistory") else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::new();
    for module in xml::child_elements(component, "module") {
        match (module.attribute("old-name"), module.attribute("new-name")) {
            (Some(old), Some(new)) if !old.is_empty() && !new.is_empty() => {
                entries.push((old.to_string(), new.to_string()));
            }
            _ => {
                return Err(ConfigurationError::MalformedDescriptor {
                    path: path.to_path_buf(),
                    message: "`module` entry needs `old-name` and `new-name`".to_string(),
                })
            }
        }
    }
    Ok(entries)
}
