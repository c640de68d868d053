use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::write_file;

/// A module to emit as `<root>/<name>/<name>.iml`.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    name: String,
    sdk: Option<String>,
    explicit_output: bool,
    entries: Vec<String>,
}

impl ModuleSpec {
    /// A module with a `src` and `test` source folder that inherits the
    /// project SDK and compiler output.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sdk: None,
            explicit_output: false,
            entries: Vec::new(),
        }
    }

    pub fn sdk(mut self, name: &str) -> Self {
        self.sdk = Some(name.to_string());
        self
    }

    /// Use `<module>/out/production` and `<module>/out/test` instead of the
    /// project output.
    pub fn explicit_output(mut self) -> Self {
        self.explicit_output = true;
        self
    }

    /// `scope` is the JPS scope attribute (`COMPILE`, `TEST`, `RUNTIME`,
    /// `PROVIDED`).
    pub fn module_dep(mut self, name: &str, scope: &str) -> Self {
        self.entries.push(format!(
            r#"<orderEntry type="module" module-name="{name}" scope="{scope}" />"#
        ));
        self
    }

    pub fn exported_module_dep(mut self, name: &str) -> Self {
        self.entries.push(format!(
            r#"<orderEntry type="module" module-name="{name}" exported="" />"#
        ));
        self
    }

    pub fn library_dep(mut self, name: &str, scope: &str) -> Self {
        self.entries.push(format!(
            r#"<orderEntry type="library" name="{name}" level="project" scope="{scope}" />"#
        ));
        self
    }

    /// Inline module library with one jar relative to the module directory.
    pub fn module_library(mut self, name: &str, jar: &str, scope: &str) -> Self {
        self.entries.push(format!(
            r#"<orderEntry type="module-library" scope="{scope}">
      <library name="{name}">
        <CLASSES><root url="jar://$MODULE_DIR$/{jar}!/" /></CLASSES>
        <JAVADOC />
        <SOURCES />
      </library>
    </orderEntry>"#
        ));
        self
    }

    fn render(&self) -> String {
        let inherit = !self.explicit_output;
        let mut xml = String::new();
        let _ = writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        let _ = writeln!(xml, r#"<module type="JAVA_MODULE" version="4">"#);
        let _ = writeln!(
            xml,
            r#"  <component name="NewModuleRootManager" inherit-compiler-output="{inherit}">"#
        );
        if self.explicit_output {
            let _ = writeln!(xml, r#"    <output url="file://$MODULE_DIR$/out/production" />"#);
            let _ = writeln!(xml, r#"    <output-test url="file://$MODULE_DIR$/out/test" />"#);
        }
        let _ = writeln!(xml, r#"    <exclude-output />"#);
        let _ = writeln!(xml, r#"    <content url="file://$MODULE_DIR$">"#);
        let _ = writeln!(
            xml,
            r#"      <sourceFolder url="file://$MODULE_DIR$/src" isTestSource="false" />"#
        );
        let _ = writeln!(
            xml,
            r#"      <sourceFolder url="file://$MODULE_DIR$/test" isTestSource="true" />"#
        );
        let _ = writeln!(xml, r#"    </content>"#);
        match &self.sdk {
            Some(sdk) => {
                let _ = writeln!(
                    xml,
                    r#"    <orderEntry type="jdk" jdkName="{sdk}" jdkType="JavaSDK" />"#
                );
            }
            None => {
                let _ = writeln!(xml, r#"    <orderEntry type="inheritedJdk" />"#);
            }
        }
        let _ = writeln!(xml, r#"    <orderEntry type="sourceFolder" forTests="false" />"#);
        for entry in &self.entries {
            let _ = writeln!(xml, "    {entry}");
        }
        let _ = writeln!(xml, "  </component>");
        let _ = writeln!(xml, "</module>");
        xml
    }
}

/// Writes a JPS-style project (`.idea/modules.xml`, `.iml` files, project
/// libraries, `misc.xml`, rename history and run configurations).
#[derive(Debug, Clone)]
pub struct ProjectFixture {
    root: PathBuf,
    project_sdk: Option<String>,
    modules: Vec<ModuleSpec>,
    libraries: Vec<(String, Vec<String>)>,
    renames: Vec<(String, String)>,
    run_configurations: Vec<(String, String)>,
}

impl ProjectFixture {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            project_sdk: None,
            modules: Vec::new(),
            libraries: Vec::new(),
            renames: Vec::new(),
            run_configurations: Vec::new(),
        }
    }

    pub fn project_sdk(mut self, name: &str) -> Self {
        self.project_sdk = Some(name.to_string());
        self
    }

    pub fn module(mut self, module: ModuleSpec) -> Self {
        self.modules.push(module);
        self
    }

    /// Project library with jars relative to the project root.
    pub fn library(mut self, name: &str, jars: &[&str]) -> Self {
        self.libraries
            .push((name.to_string(), jars.iter().map(|j| j.to_string()).collect()));
        self
    }

    pub fn rename(mut self, old: &str, new: &str) -> Self {
        self.renames.push((old.to_string(), new.to_string()));
        self
    }

    /// Raw `<configuration>` element stored as
    /// `.idea/runConfigurations/<file_stem>.xml`.
    pub fn run_configuration(mut self, file_stem: &str, configuration_xml: &str) -> Self {
        self.run_configurations
            .push((file_stem.to_string(), configuration_xml.to_string()));
        self
    }

    pub fn write(self) -> PathBuf {
        let idea = self.root.join(".idea");

        let mut modules_xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project version=\"4\">\n  <component name=\"ProjectModuleManager\">\n    <modules>\n",
        );
        for module in &self.modules {
            let name = &module.name;
            let _ = writeln!(
                modules_xml,
                r#"      <module fileurl="file://$PROJECT_DIR$/{name}/{name}.iml" filepath="$PROJECT_DIR$/{name}/{name}.iml" />"#
            );
            write_file(
                &self.root.join(name).join(format!("{name}.iml")),
                module.render(),
            );
        }
        modules_xml.push_str("    </modules>\n  </component>\n</project>\n");
        write_file(&idea.join("modules.xml"), modules_xml);

        let mut misc = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project version=\"4\">\n");
        match &self.project_sdk {
            Some(sdk) => {
                let _ = writeln!(
                    misc,
                    r#"  <component name="ProjectRootManager" version="2" project-jdk-name="{sdk}" project-jdk-type="JavaSDK">"#
                );
            }
            None => {
                let _ = writeln!(misc, r#"  <component name="ProjectRootManager" version="2">"#);
            }
        }
        let _ = writeln!(misc, r#"    <output url="file://$PROJECT_DIR$/out/classes" />"#);
        misc.push_str("  </component>\n</project>\n");
        write_file(&idea.join("misc.xml"), misc);

        for (name, jars) in &self.libraries {
            let mut xml = format!(
                "<component name=\"libraryTable\">\n  <library name=\"{name}\">\n    <CLASSES>\n"
            );
            for jar in jars {
                let _ = writeln!(xml, r#"      <root url="jar://$PROJECT_DIR$/{jar}!/" />"#);
            }
            xml.push_str("    </CLASSES>\n    <JAVADOC />\n    <SOURCES />\n  </library>\n</component>\n");
            let file_name = name.replace(['.', '-', ':'], "_");
            write_file(&idea.join("libraries").join(format!("{file_name}.xml")), xml);
        }

        if !self.renames.is_empty() {
            let mut xml = String::from(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project version=\"4\">\n  <component name=\"ModuleRenamingHistory\">\n",
            );
            for (old, new) in &self.renames {
                let _ = writeln!(xml, r#"    <module old-name="{old}" new-name="{new}" />"#);
            }
            xml.push_str("  </component>\n</project>\n");
            write_file(&idea.join("moduleRenamingHistory.xml"), xml);
        }

        for (stem, configuration) in &self.run_configurations {
            let xml = format!(
                "<component name=\"ProjectRunConfigurationManager\">\n{configuration}\n</component>\n"
            );
            write_file(&idea.join("runConfigurations").join(format!("{stem}.xml")), xml);
        }

        self.root
    }
}
