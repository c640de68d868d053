use std::path::{Component, Path, PathBuf};

/// Convert a JPS URL (`file://$MODULE_DIR$/src`, `jar://$PROJECT_DIR$/lib/a.jar!/`)
/// or a bare macro path into a filesystem path.
pub fn expand_url(url: &str, project_dir: &Path, module_dir: Option<&Path>) -> PathBuf {
    let path = url
        .strip_prefix("file://")
        .or_else(|| url.strip_prefix("jar://"))
        .unwrap_or(url);
    let path = path.strip_suffix("!/").unwrap_or(path);

    let expanded = if let Some(rest) = path.strip_prefix("$PROJECT_DIR$") {
        join_relative(project_dir, rest)
    } else if let (Some(rest), Some(module_dir)) = (path.strip_prefix("$MODULE_DIR$"), module_dir)
    {
        join_relative(module_dir, rest)
    } else {
        PathBuf::from(path)
    };
    normalize_lexically(&expanded)
}

fn join_relative(base: &Path, rest: &str) -> PathBuf {
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        base.to_path_buf()
    } else {
        base.join(rest)
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
