//! Batch test discovery over a compiled test output tree.
//!
//! Class files are read with [`kiln_classfile`]; nothing is loaded into a
//! JVM. Test methods inherited from superclasses count as long as the
//! superclass lives in the same tree.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Component, Path};
use std::rc::Rc;

use globset::{GlobBuilder, GlobMatcher};
use kiln_classfile::ClassSummary;
use kiln_core::ConfigurationError;
use walkdir::WalkDir;

use crate::{Result, TestingError};

const OBJECT: &str = "java/lang/Object";

/// One schedulable unit: a class, optionally narrowed to a single method.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestTarget {
    pub class_name: String,
    pub method: Option<String>,
}

impl TestTarget {
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method: None,
        }
    }

    pub fn method(class_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            method: Some(method.into()),
        }
    }
}

impl fmt::Display for TestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{}#{method}", self.class_name),
            None => f.write_str(&self.class_name),
        }
    }
}

/// Rewrite `**` that is glued to other characters so it only ever spans
/// whole path segments: `**Test.class` becomes `**/*Test.class` and
/// `foo**` becomes `foo*/**`.
pub fn normalize_glob(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 4);
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '*' && chars.get(i + 1) == Some(&'*') {
            let mut end = i + 2;
            while chars.get(end) == Some(&'*') {
                end += 1;
            }
            if i > 0 && chars[i - 1] != '/' {
                out.push_str("*/");
            }
            out.push_str("**");
            if end < chars.len() && chars[end] != '/' {
                out.push_str("/*");
            }
            i = end;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Compile an include glob where `*` stays inside one path segment and
/// `**` crosses segments.
pub fn compile_include_glob(pattern: &str) -> std::result::Result<GlobMatcher, ConfigurationError> {
    let normalized = normalize_glob(pattern.trim());
    let glob = GlobBuilder::new(&normalized)
        .literal_separator(true)
        .build()
        .map_err(|err| ConfigurationError::InvalidPattern {
            pattern: pattern.to_string(),
            message: err.kind().to_string(),
        })?;
    Ok(glob.compile_matcher())
}

/// Find every test method in classes under `root` whose `/`-separated
/// relative path matches `include`.
///
/// Abstract classes and interfaces are skipped. The result holds one
/// target per (class, method) pair, sorted.
pub fn discover_batch_tests(root: &Path, include: &GlobMatcher) -> Result<Vec<TestTarget>> {
    if !root.is_dir() {
        tracing::warn!(
            target: "kiln.testing",
            root = %root.display(),
            "test output directory does not exist; nothing to discover"
        );
        return Ok(Vec::new());
    }

    let mut classes = ClassCache::new(root);
    let mut targets = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            TestingError::io(path, err.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = to_slash(relative);
        let Some(internal_name) = relative.strip_suffix(".class") else {
            continue;
        };
        if !include.is_match(&relative) {
            continue;
        }

        let Some(class) = classes.load(internal_name)? else {
            continue;
        };
        if class.is_interface() || class.is_abstract() {
            tracing::debug!(target: "kiln.testing", class = internal_name, "skipping abstract class");
            continue;
        }

        let class_name = internal_name.replace('/', ".");
        let methods = classes.test_methods(&class)?;
        if methods.is_empty() {
            tracing::debug!(target: "kiln.testing", class = %class_name, "no test methods");
        }
        for method in methods {
            targets.push(TestTarget::method(class_name.clone(), method));
        }
    }

    targets.sort();
    tracing::info!(target: "kiln.testing", count = targets.len(), "discovered batch tests");
    Ok(targets)
}

/// Parsed classes of one output tree, keyed by internal name. `None` marks
/// a class that is not in the tree.
struct ClassCache<'a> {
    root: &'a Path,
    classes: HashMap<String, Option<Rc<ClassSummary>>>,
}

impl<'a> ClassCache<'a> {
    fn new(root: &'a Path) -> Self {
        Self {
            root,
            classes: HashMap::new(),
        }
    }

    fn load(&mut self, internal_name: &str) -> Result<Option<Rc<ClassSummary>>> {
        if let Some(cached) = self.classes.get(internal_name) {
            return Ok(cached.clone());
        }
        let path = self.root.join(format!("{internal_name}.class"));
        let summary = if path.is_file() {
            let bytes = std::fs::read(&path).map_err(|source| TestingError::io(&path, source))?;
            let summary = ClassSummary::parse(&bytes)
                .map_err(|source| TestingError::ClassFile { path, source })?;
            Some(Rc::new(summary))
        } else {
            None
        };
        self.classes
            .insert(internal_name.to_string(), summary.clone());
        Ok(summary)
    }

    /// Test method names declared by `class` or by superclasses in the tree.
    fn test_methods(&mut self, class: &Rc<ClassSummary>) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut current = Rc::clone(class);
        visited.insert(current.this_class.clone());
        loop {
            names.extend(current.test_methods().map(|m| m.name.clone()));
            let Some(parent) = current.super_class.clone() else {
                break;
            };
            if parent == OBJECT || !visited.insert(parent.clone()) {
                break;
            }
            match self.load(&parent)? {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(names)
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn double_star_is_split_into_segments() {
        assert_eq!(normalize_glob("com/acme/**Test.class"), "com/acme/**/*Test.class");
        assert_eq!(normalize_glob("**/*Test.class"), "**/*Test.class");
        assert_eq!(normalize_glob("com/acme**"), "com/acme*/**");
        assert_eq!(normalize_glob("a/***b"), "a/**/*b");
    }

    #[test]
    fn single_star_stays_within_a_segment() {
        let glob = compile_include_glob("com/*Test.class").expect("glob");
        assert!(glob.is_match("com/FooTest.class"));
        assert!(!glob.is_match("com/acme/FooTest.class"));
    }

    #[test]
    fn glued_double_star_crosses_segments() {
        let glob = compile_include_glob("com/**Test.class").expect("glob");
        assert!(glob.is_match("com/FooTest.class"));
        assert!(glob.is_match("com/acme/deep/FooTest.class"));
        assert!(!glob.is_match("org/FooTest.class"));
    }

    #[test]
    fn invalid_glob_is_a_configuration_error() {
        let err = compile_include_glob("com/[Test.class").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidPattern { .. }), "{err}");
    }

    #[test]
    fn target_display() {
        assert_eq!(TestTarget::class("a.B").to_string(), "a.B");
        assert_eq!(TestTarget::method("a.B", "c").to_string(), "a.B#c");
    }
}
