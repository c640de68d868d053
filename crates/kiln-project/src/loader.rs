use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kiln_core::{ConfigurationError, EnvSource};
use kiln_jdk::{ToolchainRegistry, ToolchainResolver, ToolchainWarning};

use crate::model::{DependencyScope, Library, Module, OrderEntry, ProjectModel, SdkRef, SourceRoot};
use crate::rename::ModuleRenameMap;
use crate::url::expand_url;
use crate::xml;

/// Paths (relative to the project home) that must exist for a directory to
/// be loaded as a project.
pub const PROJECT_MARKERS: [&str; 2] = [".idea", ".idea/modules.xml"];

pub struct LoadOptions<'a> {
    pub community_home: &'a Path,
    /// Language version of the primary toolchain.
    pub jdk_version: u32,
    /// Explicit home for the primary toolchain.
    pub jdk_home: Option<&'a Path>,
    /// Defaults to `<community_home>/build/jdks`.
    pub jdks_target_dir: Option<&'a Path>,
    pub env: &'a dyn EnvSource,
}

/// Output of [`load_project`]. Read-only once constructed.
#[derive(Debug)]
pub struct LoadedProject {
    pub project_home: PathBuf,
    pub community_home: PathBuf,
    pub model: ProjectModel,
    pub rename_map: ModuleRenameMap,
    pub toolchains: ToolchainRegistry,
    /// Referenced toolchains that could not be resolved.
    pub unresolved_toolchains: Vec<ToolchainWarning>,
    pub warnings: Vec<String>,
}

/// Load the project at `project_home`.
pub fn load_project(
    project_home: &Path,
    options: &LoadOptions<'_>,
) -> Result<LoadedProject, ConfigurationError> {
    for marker in PROJECT_MARKERS {
        let path = project_home.join(marker);
        if !path.exists() {
            return Err(ConfigurationError::MissingProjectMarker {
                project_home: project_home.to_path_buf(),
                path,
            });
        }
    }

    let idea = project_home.join(".idea");
    let module_files = read_module_list(&idea.join("modules.xml"), project_home)?;

    let mut seen = HashSet::new();
    let mut modules = Vec::with_capacity(module_files.len());
    for file in module_files {
        let module = read_module(&file, project_home)?;
        if !seen.insert(module.name.clone()) {
            return Err(ConfigurationError::DuplicateModule { name: module.name });
        }
        modules.push(module);
    }

    let libraries = read_project_libraries(&idea.join("libraries"), project_home)?;
    let (project_sdk, project_output) = read_misc(&idea.join("misc.xml"), project_home)?;
    let model = ProjectModel::new(modules, libraries, project_sdk, project_output);
    tracing::debug!(
        target: "kiln.project",
        modules = model.modules().len(),
        libraries = model.libraries().len(),
        "loaded project model"
    );

    let (rename_map, mut warnings) =
        ModuleRenameMap::load(&[options.community_home, project_home])?;

    let jdks_dir = options
        .jdks_target_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| options.community_home.join("build").join("jdks"));
    let resolver = ToolchainResolver {
        explicit_home: options.jdk_home,
        jdks_dir,
        env: options.env,
    };
    let (toolchains, unresolved_toolchains) =
        resolver.resolve_all(options.jdk_version, model.referenced_sdk_names())?;
    warnings.extend(unresolved_toolchains.iter().map(|w| w.message.clone()));

    Ok(LoadedProject {
        project_home: project_home.to_path_buf(),
        community_home: options.community_home.to_path_buf(),
        model,
        rename_map,
        toolchains,
        unresolved_toolchains,
        warnings,
    })
}

fn read_module_list(path: &Path, project_home: &Path) -> Result<Vec<PathBuf>, ConfigurationError> {
    let contents = xml::read(path)?;
    let doc = xml::parse(path, &contents)?;
    let Some(component) = xml::component(&doc, "ProjectModuleManager") else {
        return Ok(Vec::new());
    };
    let Some(modules) = xml::child_element(component, "modules") else {
        return Ok(Vec::new());
    };

    let mut files = Vec::new();
    for module in xml::child_elements(modules, "module") {
        let location = module
            .attribute("filepath")
            .or_else(|| module.attribute("fileurl"))
            .ok_or_else(|| ConfigurationError::MalformedDescriptor {
                path: path.to_path_buf(),
                message: "`module` entry without `filepath`".to_string(),
            })?;
        files.push(expand_url(location, project_home, None));
    }
    Ok(files)
}

fn read_module(path: &Path, project_home: &Path) -> Result<Module, ConfigurationError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConfigurationError::MalformedDescriptor {
            path: path.to_path_buf(),
            message: "module file name is not valid UTF-8".to_string(),
        })?
        .to_string();
    let module_dir = path.parent().unwrap_or(project_home);
    let expand = |url: &str| expand_url(url, project_home, Some(module_dir));

    let contents = xml::read(path)?;
    let doc = xml::parse(path, &contents)?;

    let mut module = Module {
        name,
        module_file: path.to_path_buf(),
        source_roots: Vec::new(),
        output: None,
        test_output: None,
        inherit_compiler_output: true,
        sdk: SdkRef::Inherited,
        dependencies: Vec::new(),
    };
    let Some(root) = xml::component(&doc, "NewModuleRootManager") else {
        return Ok(module);
    };

    module.inherit_compiler_output = root.attribute("inherit-compiler-output") == Some("true");
    module.output = xml::child_element(root, "output")
        .and_then(|n| n.attribute("url"))
        .map(expand);
    module.test_output = xml::child_element(root, "output-test")
        .and_then(|n| n.attribute("url"))
        .map(expand);

    for content in xml::child_elements(root, "content") {
        for folder in xml::child_elements(content, "sourceFolder") {
            if let Some(url) = folder.attribute("url") {
                module.source_roots.push(SourceRoot {
                    path: expand(url),
                    is_test: folder.attribute("isTestSource") == Some("true"),
                });
            }
        }
    }

    let mut sdk = None;
    for entry in xml::child_elements(root, "orderEntry") {
        let scope = DependencyScope::parse(entry.attribute("scope"));
        let exported = entry.attribute("exported").is_some();
        let parsed = match entry.attribute("type") {
            Some("sourceFolder") => OrderEntry::ModuleSource,
            Some("inheritedJdk") => OrderEntry::Sdk(SdkRef::Inherited),
            Some("jdk") => match entry.attribute("jdkName") {
                Some(name) => OrderEntry::Sdk(SdkRef::Named(name.to_string())),
                None => return Err(missing_attribute(path, "jdk", "jdkName")),
            },
            Some("module") => match entry.attribute("module-name") {
                Some(name) => OrderEntry::Module {
                    name: name.to_string(),
                    scope,
                    exported,
                },
                None => return Err(missing_attribute(path, "module", "module-name")),
            },
            Some("library") => {
                let Some(name) = entry.attribute("name") else {
                    return Err(missing_attribute(path, "library", "name"));
                };
                if entry.attribute("level").unwrap_or("project") != "project" {
                    tracing::debug!(
                        target: "kiln.project",
                        module = %module.name,
                        library = name,
                        "skipping non-project library"
                    );
                    continue;
                }
                OrderEntry::Library {
                    name: name.to_string(),
                    scope,
                    exported,
                }
            }
            Some("module-library") => {
                let Some(library) = xml::child_element(entry, "library") else {
                    return Err(missing_attribute(path, "module-library", "library"));
                };
                let name = library
                    .attribute("name")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}-module-library", module.name));
                OrderEntry::ModuleLibrary {
                    library: Library {
                        name,
                        roots: class_roots(library, &expand),
                    },
                    scope,
                    exported,
                }
            }
            other => {
                tracing::trace!(
                    target: "kiln.project",
                    module = %module.name,
                    kind = other.unwrap_or(""),
                    "ignoring order entry"
                );
                continue;
            }
        };
        if let (None, OrderEntry::Sdk(sdk_ref)) = (&sdk, &parsed) {
            sdk = Some(sdk_ref.clone());
        }
        module.dependencies.push(parsed);
    }
    module.sdk = sdk.unwrap_or(SdkRef::Inherited);

    Ok(module)
}

fn missing_attribute(path: &Path, entry: &str, attribute: &str) -> ConfigurationError {
    ConfigurationError::MalformedDescriptor {
        path: path.to_path_buf(),
        message: format!("`{entry}` order entry without `{attribute}`"),
    }
}

fn class_roots(library: roxmltree::Node<'_, '_>, expand: &dyn Fn(&str) -> PathBuf) -> Vec<PathBuf> {
    xml::child_element(library, "CLASSES")
        .map(|classes| {
            xml::child_elements(classes, "root")
                .filter_map(|root| root.attribute("url"))
                .map(expand)
                .collect()
        })
        .unwrap_or_default()
}

fn read_project_libraries(dir: &Path, project_home: &Path) -> Result<Vec<Library>, ConfigurationError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigurationError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("xml"))
        .collect();
    files.sort();

    let expand = |url: &str| expand_url(url, project_home, None);
    let mut libraries = Vec::new();
    for file in files {
        let contents = xml::read(&file)?;
        let doc = xml::parse(&file, &contents)?;
        let Some(table) = xml::component(&doc, "libraryTable") else {
            continue;
        };
        for library in xml::child_elements(table, "library") {
            let Some(name) = library.attribute("name") else {
                continue;
            };
            libraries.push(Library {
                name: name.to_string(),
                roots: class_roots(library, &expand),
            });
        }
    }
    Ok(libraries)
}

fn read_misc(
    path: &Path,
    project_home: &Path,
) -> Result<(Option<String>, Option<PathBuf>), ConfigurationError> {
    if !path.is_file() {
        return Ok((None, None));
    }
    let contents = xml::read(path)?;
    let doc = xml::parse(path, &contents)?;
    let Some(manager) = xml::component(&doc, "ProjectRootManager") else {
        return Ok((None, None));
    };
    let sdk = manager.attribute("project-jdk-name").map(str::to_string);
    let output = xml::child_element(manager, "output")
        .and_then(|n| n.attribute("url"))
        .map(|url| expand_url(url, project_home, None));
    Ok((sdk, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::MapEnv;
    use kiln_test_utils::{fake_jdk, write_file};

    #[test]
    fn missing_modules_xml_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".idea")).unwrap();
        let env = MapEnv::new();
        let options = LoadOptions {
            community_home: dir.path(),
            jdk_version: 17,
            jdk_home: None,
            jdks_target_dir: None,
            env: &env,
        };

        let err = load_project(dir.path(), &options).unwrap_err();
        assert!(
            matches!(err, ConfigurationError::MissingProjectMarker { ref path, .. } if path.ends_with("modules.xml")),
            "{err}"
        );
    }

    #[test]
    fn module_library_roots_are_relative_to_the_module() {
        let dir = tempfile::tempdir().unwrap();
        let iml = dir.path().join("core").join("core.iml");
        write_file(
            &iml,
            r#"<module version="4">
  <component name="NewModuleRootManager" inherit-compiler-output="true">
    <orderEntry type="inheritedJdk" />
    <orderEntry type="sourceFolder" forTests="false" />
    <orderEntry type="module-library" exported="" scope="TEST">
      <library>
        <CLASSES><root url="jar://$MODULE_DIR$/lib/a.jar!/" /></CLASSES>
      </library>
    </orderEntry>
    <orderEntry type="library" name="global" level="application" />
  </component>
</module>"#,
        );

        let module = read_module(&iml, dir.path()).unwrap();
        assert_eq!(module.name, "core");
        assert!(module.inherit_compiler_output);
        assert_eq!(module.sdk, SdkRef::Inherited);
        assert_eq!(module.dependencies.len(), 3);
        match &module.dependencies[2] {
            OrderEntry::ModuleLibrary {
                library,
                scope,
                exported,
            } => {
                assert_eq!(library.name, "core-module-library");
                assert_eq!(library.roots, vec![dir.path().join("core/lib/a.jar")]);
                assert_eq!(*scope, DependencyScope::Test);
                assert!(*exported);
            }
            other => panic!("unexpected entry {other:?}"),
        }
    }

    #[test]
    fn explicit_jdk_home_is_used_for_primary() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            &dir.path().join(".idea/modules.xml"),
            r#"<project><component name="ProjectModuleManager"><modules/></component></project>"#,
        );
        let jdk = fake_jdk(&dir.path().join("my-jdk"), &["java.base"]);
        let env = MapEnv::new();
        let options = LoadOptions {
            community_home: dir.path(),
            jdk_version: 8,
            jdk_home: Some(&jdk),
            jdks_target_dir: None,
            env: &env,
        };

        let loaded = load_project(dir.path(), &options).unwrap();
        assert_eq!(loaded.toolchains.primary().name(), "1.8");
        assert!(loaded.model.modules().is_empty());
        assert!(loaded.warnings.is_empty());
    }
}
