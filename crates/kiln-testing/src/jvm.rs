use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const PASSTHROUGH_PREFIX: &str = "pass.";

pub const CLASSPATH_FILE_PROPERTY: &str = "classpath.file";
pub const HOME_PATH_PROPERTY: &str = "idea.home.path";
pub const CONFIG_PATH_PROPERTY: &str = "idea.config.path";
pub const SYSTEM_PATH_PROPERTY: &str = "idea.system.path";
pub const DEBUG_CATEGORIES_PROPERTY: &str = "idea.log.debug.categories";
pub const BUILD_NUMBER_PROPERTY: &str = "build.number";
pub const PATTERNS_PROPERTY: &str = "kiln.test.patterns";
pub const GROUPS_PROPERTY: &str = "kiln.test.groups";

pub const DEFAULT_MEMORY_OPTIONS: &[&str] = &[
    "-Xms750m",
    "-Xmx1024m",
    "-XX:ReservedCodeCacheSize=512m",
];

/// JVM options and system properties where the first value set for a key
/// wins. Later additions with a known key are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JvmArguments {
    options: Vec<String>,
    option_keys: HashSet<String>,
    properties: Vec<(String, String)>,
}

impl JvmArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw JVM option. `-Dkey=value` is routed to the properties.
    pub fn add_option(&mut self, option: &str) -> bool {
        let option = option.trim();
        if option.is_empty() {
            return false;
        }
        if let Some(property) = option.strip_prefix("-D") {
            let (key, value) = property.split_once('=').unwrap_or((property, ""));
            return self.add_property(key, value);
        }
        if !self.option_keys.insert(option_key(option)) {
            return false;
        }
        self.options.push(option.to_string());
        true
    }

    pub fn add_property(&mut self, key: &str, value: &str) -> bool {
        if key.is_empty() || self.property(key).is_some() {
            return false;
        }
        self.properties.push((key.to_string(), value.to_string()));
        true
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.option_keys.contains(key)
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Options followed by `-Dkey=value` flags.
    pub fn to_args(&self) -> Vec<String> {
        self.options
            .iter()
            .cloned()
            .chain(self.properties.iter().map(|(k, v)| format!("-D{k}={v}")))
            .collect()
    }
}

/// Identity of an option for first-wins deduplication: `-Xmx512m` and
/// `-Xmx2g` collide, as do `-XX:+Foo` and `-XX:-Foo`.
fn option_key(option: &str) -> String {
    if let Some(rest) = option.strip_prefix("-XX:") {
        let rest = rest.trim_start_matches(['+', '-']);
        let name = rest.split_once('=').map_or(rest, |(name, _)| name);
        return format!("-XX:{name}");
    }
    for prefix in ["-Xmx", "-Xms", "-Xss", "-Xmn"] {
        if option.starts_with(prefix) {
            return prefix.to_string();
        }
    }
    if option.starts_with("-agentlib:") || option.starts_with("-agentpath:") {
        return option
            .split_once('=')
            .map_or(option, |(key, _)| key)
            .to_string();
    }
    option.to_string()
}

/// A native profiling agent attached with `-agentpath`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAgent {
    pub path: PathBuf,
    pub causal_profiling: bool,
}

impl NativeAgent {
    pub fn option(&self, snapshots_dir: &Path) -> String {
        let mut option = format!(
            "-agentpath:{}=snapshotsDir={}",
            self.path.display(),
            snapshots_dir.display()
        );
        if self.causal_profiling {
            if causal_profiling_supported() {
                option.push_str(",causalProfiling");
            } else {
                tracing::warn!(
                    target: "kiln.testing",
                    os = std::env::consts::OS,
                    "causal profiling is only available on Linux and macOS"
                );
            }
        }
        option
    }
}

fn causal_profiling_supported() -> bool {
    cfg!(any(target_os = "linux", target_os = "macos"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugAttach {
    pub port: u16,
    pub suspend: bool,
}

impl DebugAttach {
    pub fn option(&self) -> String {
        format!(
            "-agentlib:jdwp=transport=dt_socket,server=y,suspend={},address={}",
            if self.suspend { "y" } else { "n" },
            self.port
        )
    }
}

/// Inputs for [`JvmLayers::assemble`], listed in precedence order.
#[derive(Debug, Clone, Copy)]
pub struct JvmLayers<'a> {
    /// Options from run configurations and the caller.
    pub caller_options: &'a [String],
    /// Properties the caller derives itself, e.g. test filters.
    pub caller_properties: &'a [(String, String)],
    pub heap_dump_path: &'a Path,
    pub snapshots_dir: &'a Path,
    pub debug: Option<DebugAttach>,
    pub native_agent: Option<&'a NativeAgent>,
    /// Empty means [`DEFAULT_MEMORY_OPTIONS`].
    pub memory_options: &'a [String],
    pub baseline: &'a [(String, String)],
    /// Session properties; only `pass.<key>` entries are forwarded.
    pub session_properties: &'a BTreeMap<String, String>,
}

impl JvmLayers<'_> {
    pub fn assemble(&self) -> JvmArguments {
        let mut args = JvmArguments::new();

        for option in self.caller_options {
            args.add_option(option);
        }
        for (key, value) in self.caller_properties {
            args.add_property(key, value);
        }
        args.add_option("-XX:+HeapDumpOnOutOfMemoryError");
        args.add_option(&format!("-XX:HeapDumpPath={}", self.heap_dump_path.display()));
        if let Some(debug) = &self.debug {
            args.add_option(&debug.option());
        }
        if let Some(agent) = self.native_agent {
            args.add_option(&agent.option(self.snapshots_dir));
        }

        if self.memory_options.is_empty() {
            for option in DEFAULT_MEMORY_OPTIONS {
                args.add_option(option);
            }
        } else {
            for option in self.memory_options {
                args.add_option(option);
            }
        }

        for (key, value) in self.baseline {
            args.add_property(key, value);
        }

        for (key, value) in self.session_properties {
            if let Some(key) = key.strip_prefix(PASSTHROUGH_PREFIX) {
                args.add_property(key, value);
            }
        }
        args
    }
}
