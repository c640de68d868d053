use kiln_build::BuildMessages;
use kiln_core::{ConfigurationError, EnvSource};

use crate::TestingOptions;

pub const DEBUG_TYPE_ENV: &str = "KILN_DEBUG_TYPE";
pub const DEBUG_TARGET_ENV: &str = "KILN_DEBUG_TARGET";
pub const DEBUG_SUSPEND_ENV: &str = "KILN_DEBUG_SUSPEND";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugGranularity {
    Class,
    Method,
}

/// An external request to run one class under a debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugRequest {
    pub granularity: DebugGranularity,
    pub class_name: String,
    pub method: Option<String>,
    pub suspend: bool,
}

impl DebugRequest {
    /// `None` when neither the type nor the target variable is set.
    pub fn from_env(env: &dyn EnvSource) -> Result<Option<Self>, ConfigurationError> {
        let read = |key: &str| {
            env.var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let kind = read(DEBUG_TYPE_ENV);
        let target = read(DEBUG_TARGET_ENV);
        if kind.is_none() && target.is_none() {
            return Ok(None);
        }

        let granularity = match kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("class") => DebugGranularity::Class,
            Some("method") => DebugGranularity::Method,
            Some(_) => {
                return Err(ConfigurationError::UnsupportedDebugTarget {
                    kind: kind.unwrap_or_default(),
                })
            }
        };
        let target = target.ok_or(ConfigurationError::MissingDebugTarget)?;
        let (class_name, method) = match target.split_once('#') {
            Some((class, method)) => (class.to_string(), Some(method.to_string())),
            None => (target, None),
        };
        if class_name.is_empty() {
            return Err(ConfigurationError::MissingDebugTarget);
        }
        let suspend = !matches!(
            read(DEBUG_SUSPEND_ENV).map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("false" | "0" | "n" | "no")
        );

        Ok(Some(Self {
            granularity,
            class_name,
            method: method.filter(|m| !m.is_empty()),
            suspend,
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestFilter {
    Patterns(Vec<String>),
    Groups(Vec<String>),
    All,
}

/// The single selection source a run uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionMode {
    ExplicitRunConfigurations {
        names: Vec<String>,
    },
    GroupsAndPatterns {
        module: String,
        filter: TestFilter,
    },
    RemoteDebugSingleClass {
        module: String,
        class_name: String,
        suspend: bool,
    },
    BatchFileDiscovery {
        module: String,
        include: String,
    },
}

impl SelectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExplicitRunConfigurations { .. } => "run-configurations",
            Self::GroupsAndPatterns { .. } => "groups-and-patterns",
            Self::RemoteDebugSingleClass { .. } => "remote-debug",
            Self::BatchFileDiscovery { .. } => "batch",
        }
    }
}

/// Selection sources from highest to lowest precedence, below the debug
/// signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    RunConfigurations,
    BatchIncludes,
    Patterns,
    Groups,
}

impl Source {
    fn describe(self) -> &'static str {
        match self {
            Source::RunConfigurations => "run configurations",
            Source::BatchIncludes => "batch include glob",
            Source::Patterns => "test patterns",
            Source::Groups => "test groups",
        }
    }
}

/// Pick the selection mode for `options`, warning about every lower source
/// that is set but ignored.
pub fn select_mode(
    options: &TestingOptions,
    debug: Option<&DebugRequest>,
    messages: &dyn BuildMessages,
) -> Result<SelectionMode, ConfigurationError> {
    let mut present = Vec::new();
    if !options.run_configurations.is_empty() {
        present.push(Source::RunConfigurations);
    }
    if options.batch_includes.as_deref().is_some_and(|g| !g.trim().is_empty()) {
        present.push(Source::BatchIncludes);
    }
    if !options.patterns.is_empty() {
        present.push(Source::Patterns);
    }
    if !options.groups.is_empty() {
        present.push(Source::Groups);
    }

    if let Some(debug) = debug {
        for source in &present {
            messages.warning(&format!(
                "{} ignored: remote debugging takes precedence",
                source.describe()
            ));
        }
        if debug.granularity == DebugGranularity::Method {
            messages.warning(&format!(
                "remote debugging of a single method is not supported; running the whole class `{}`",
                debug.class_name
            ));
        }
        return Ok(SelectionMode::RemoteDebugSingleClass {
            module: main_module(options)?,
            class_name: debug.class_name.clone(),
            suspend: debug.suspend,
        });
    }

    let Some((&primary, ignored)) = present.split_first() else {
        return Ok(SelectionMode::GroupsAndPatterns {
            module: main_module(options)?,
            filter: TestFilter::All,
        });
    };
    for source in ignored {
        messages.warning(&format!(
            "{} ignored: {} take precedence",
            source.describe(),
            primary.describe()
        ));
    }

    Ok(match primary {
        Source::RunConfigurations => SelectionMode::ExplicitRunConfigurations {
            names: options.run_configurations.clone(),
        },
        Source::BatchIncludes => SelectionMode::BatchFileDiscovery {
            module: main_module(options)?,
            include: options.batch_includes.clone().unwrap_or_default(),
        },
        Source::Patterns => SelectionMode::GroupsAndPatterns {
            module: main_module(options)?,
            filter: TestFilter::Patterns(options.patterns.clone()),
        },
        Source::Groups => SelectionMode::GroupsAndPatterns {
            module: main_module(options)?,
            filter: TestFilter::Groups(options.groups.clone()),
        },
    })
}

fn main_module(options: &TestingOptions) -> Result<String, ConfigurationError> {
    options
        .main_module
        .clone()
        .filter(|m| !m.trim().is_empty())
        .ok_or(ConfigurationError::NoTestModule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_build::RecordingMessages;
    use kiln_core::MapEnv;
    use pretty_assertions::assert_eq;

    fn options() -> TestingOptions {
        TestingOptions {
            main_module: Some("app".to_string()),
            ..TestingOptions::default()
        }
    }

    fn env(pairs: &[(&str, &str)]) -> MapEnv {
        pairs.iter().copied().collect()
    }

    #[test]
    fn no_debug_variables_means_no_request() {
        assert_eq!(DebugRequest::from_env(&MapEnv::new()).expect("env"), None);
    }

    #[test]
    fn parses_method_target() {
        let request = DebugRequest::from_env(&env(&[
            (DEBUG_TYPE_ENV, "METHOD"),
            (DEBUG_TARGET_ENV, "com.acme.FooTest#testBar"),
            (DEBUG_SUSPEND_ENV, "no"),
        ]))
        .expect("env")
        .expect("request");
        assert_eq!(
            request,
            DebugRequest {
                granularity: DebugGranularity::Method,
                class_name: "com.acme.FooTest".to_string(),
                method: Some("testBar".to_string()),
                suspend: false,
            }
        );
    }

    #[test]
    fn unknown_granularity_is_fatal() {
        let err = DebugRequest::from_env(&env(&[
            (DEBUG_TYPE_ENV, "package"),
            (DEBUG_TARGET_ENV, "com.acme"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnsupportedDebugTarget { kind } if kind == "package"));
    }

    #[test]
    fn type_without_target_is_fatal() {
        let err = DebugRequest::from_env(&env(&[(DEBUG_TYPE_ENV, "class")])).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingDebugTarget));
    }

    #[test]
    fn run_configurations_win_over_everything_else() {
        let messages = RecordingMessages::new();
        let options = TestingOptions {
            run_configurations: vec!["All Tests".to_string()],
            batch_includes: Some("**Test.class".to_string()),
            groups: vec!["ALL".to_string()],
            ..options()
        };
        let mode = select_mode(&options, None, &messages).expect("mode");
        assert_eq!(
            mode,
            SelectionMode::ExplicitRunConfigurations {
                names: vec!["All Tests".to_string()]
            }
        );
        assert_eq!(
            messages.warnings(),
            vec![
                "batch include glob ignored: run configurations take precedence".to_string(),
                "test groups ignored: run configurations take precedence".to_string(),
            ]
        );
    }

    #[test]
    fn patterns_win_over_groups() {
        let messages = RecordingMessages::new();
        let options = TestingOptions {
            patterns: vec!["com.acme.*".to_string()],
            groups: vec!["ALL".to_string()],
            ..options()
        };
        let mode = select_mode(&options, None, &messages).expect("mode");
        assert_eq!(
            mode,
            SelectionMode::GroupsAndPatterns {
                module: "app".to_string(),
                filter: TestFilter::Patterns(vec!["com.acme.*".to_string()]),
            }
        );
        assert_eq!(messages.warnings().len(), 1);
    }

    #[test]
    fn plain_module_runs_everything_without_warnings() {
        let messages = RecordingMessages::new();
        let mode = select_mode(&options(), None, &messages).expect("mode");
        assert_eq!(
            mode,
            SelectionMode::GroupsAndPatterns {
                module: "app".to_string(),
                filter: TestFilter::All,
            }
        );
        assert!(messages.warnings().is_empty());
    }

    #[test]
    fn debug_method_degrades_to_class_with_warning() {
        let messages = RecordingMessages::new();
        let debug = DebugRequest {
            granularity: DebugGranularity::Method,
            class_name: "com.acme.FooTest".to_string(),
            method: Some("testBar".to_string()),
            suspend: true,
        };
        let options = TestingOptions {
            patterns: vec!["com.acme.*".to_string()],
            ..options()
        };
        let mode = select_mode(&options, Some(&debug), &messages).expect("mode");
        assert_eq!(
            mode,
            SelectionMode::RemoteDebugSingleClass {
                module: "app".to_string(),
                class_name: "com.acme.FooTest".to_string(),
                suspend: true,
            }
        );
        let warnings = messages.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("com.acme.FooTest"), "{}", warnings[1]);
    }

    #[test]
    fn module_based_modes_require_a_module() {
        let messages = RecordingMessages::new();
        let err = select_mode(&TestingOptions::default(), None, &messages).unwrap_err();
        assert!(matches!(err, ConfigurationError::NoTestModule), "{err}");
    }
}
