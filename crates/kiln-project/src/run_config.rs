use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_core::ConfigurationError;

use crate::xml;

const JUNIT_TYPE: &str = "JUnit";

/// A JUnit run configuration stored under `.idea/runConfigurations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfiguration {
    pub name: String,
    pub module_name: String,
    /// `Class`, `Class#method`, `package.*` or a raw class pattern.
    pub test_class_patterns: Vec<String>,
    pub vm_parameters: Vec<String>,
    pub env_variables: BTreeMap<String, String>,
    /// Artifacts the configuration asks to build before running.
    pub required_artifacts: Vec<String>,
    pub descriptor: PathBuf,
}

/// Read every JUnit run configuration found in `dirs`.
///
/// Earlier directories win when two configurations share a name.
pub fn load_run_configurations(dirs: &[PathBuf]) -> Result<Vec<RunConfiguration>, ConfigurationError> {
    let mut by_name: BTreeMap<String, RunConfiguration> = BTreeMap::new();
    for dir in dirs {
        for file in descriptor_files(dir)? {
            for configuration in read_descriptor(&file)? {
                by_name.entry(configuration.name.clone()).or_insert(configuration);
            }
        }
    }
    Ok(by_name.into_values().collect())
}

pub fn find_run_configuration(
    dirs: &[PathBuf],
    name: &str,
) -> Result<RunConfiguration, ConfigurationError> {
    load_run_configurations(dirs)?
        .into_iter()
        .find(|c| c.name == name)
        .ok_or_else(|| ConfigurationError::RunConfigurationNotFound {
            name: name.to_string(),
        })
}

fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>, ConfigurationError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigurationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();
    files.sort();
    Ok(files)
}

fn read_descriptor(path: &Path) -> Result<Vec<RunConfiguration>, ConfigurationError> {
    let contents = xml::read(path)?;
    let doc = xml::parse(path, &contents)?;

    let mut configurations = Vec::new();
    for node in doc.descendants().filter(|n| n.has_tag_name("configuration")) {
        let Some(name) = node.attribute("name") else {
            continue;
        };
        if node.attribute("default") == Some("true") {
            continue;
        }
        if node.attribute("type") != Some(JUNIT_TYPE) {
            tracing::debug!(
                target: "kiln.project",
                name,
                kind = node.attribute("type").unwrap_or(""),
                "skipping non-JUnit run configuration"
            );
            continue;
        }

        let options: BTreeMap<&str, &str> = xml::child_elements(node, "option")
            .filter_map(|o| Some((o.attribute("name")?, o.attribute("value")?)))
            .collect();
        let option = |key: &str| options.get(key).copied().filter(|v| !v.is_empty());

        let Some(module_name) = xml::child_element(node, "module").and_then(|m| m.attribute("name"))
        else {
            return Err(ConfigurationError::MalformedDescriptor {
                path: path.to_path_buf(),
                message: format!("run configuration `{name}` does not name a module"),
            });
        };

        let test_class_patterns = match option("TEST_OBJECT").unwrap_or("class") {
            "pattern" => xml::child_element(node, "patterns")
                .map(|patterns| {
                    xml::child_elements(patterns, "pattern")
                        .filter_map(|p| p.attribute("testClass"))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            "package" => option("PACKAGE_NAME")
                .map(|p| vec![format!("{p}.*")])
                .unwrap_or_default(),
            "method" => match (option("MAIN_CLASS_NAME"), option("METHOD_NAME")) {
                (Some(class), Some(method)) => vec![format!("{class}#{method}")],
                (Some(class), None) => vec![class.to_string()],
                _ => Vec::new(),
            },
            _ => option("MAIN_CLASS_NAME")
                .map(|c| vec![c.to_string()])
                .unwrap_or_default(),
        };

        let env_variables = xml::child_element(node, "envs")
            .map(|envs| {
                xml::child_elements(envs, "env")
                    .filter_map(|e| Some((e.attribute("name")?.to_string(), e.attribute("value")?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let required_artifacts = xml::child_elements(node, "method")
            .flat_map(|m| xml::child_elements(m, "option"))
            .filter(|o| o.attribute("name") == Some("BuildArtifacts") && o.attribute("enabled") == Some("true"))
            .flat_map(|o| xml::child_elements(o, "artifact"))
            .filter_map(|a| a.attribute("name"))
            .map(str::to_string)
            .collect();

        configurations.push(RunConfiguration {
            name: name.to_string(),
            module_name: module_name.to_string(),
            test_class_patterns,
            vm_parameters: option("VM_PARAMETERS").map(split_vm_parameters).unwrap_or_default(),
            env_variables,
            required_artifacts,
            descriptor: path.to_path_buf(),
        });
    }
    Ok(configurations)
}

/// Split a VM parameter string on whitespace. Double quotes group words and
/// are removed; `\"` inside quotes is a literal quote.
pub fn split_vm_parameters(raw: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    params.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        params.push(current);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn splits_quoted_vm_parameters() {
        assert_eq!(
            split_vm_parameters(r#"-Xmx2g  -Dname="two words" -Dq="say \"hi\"" """#),
            vec![
                "-Xmx2g".to_string(),
                "-Dname=two words".to_string(),
                r#"-Dq=say "hi""#.to_string(),
                String::new(),
            ]
        );
        assert!(split_vm_parameters("   ").is_empty());
    }
}
