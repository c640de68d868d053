use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::CiMetadata;

/// Build configuration as requested by the caller.
///
/// Options may contradict each other (e.g. incremental compilation together
/// with precompiled class archives). [`apply_option_rules`] reconciles them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildOptions {
    pub incremental_compilation: bool,
    /// Reuse classes already compiled into the project output directory.
    pub use_compiled_classes_from_project_output: bool,
    pub path_to_compiled_classes_archive: Option<PathBuf>,
    pub path_to_compiled_classes_archives_metadata: Option<PathBuf>,
    pub output_root_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    /// Directory holding downloaded JDKs, one sub-directory per toolchain name.
    pub jdks_target_dir: Option<PathBuf>,
    pub project_classes_output_directory: Option<PathBuf>,
    pub build_steps_to_skip: BTreeSet<String>,
    /// Branch on which incremental compilation caches are trusted.
    pub default_branch: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            incremental_compilation: false,
            use_compiled_classes_from_project_output: false,
            path_to_compiled_classes_archive: None,
            path_to_compiled_classes_archives_metadata: None,
            output_root_path: None,
            log_path: None,
            jdks_target_dir: None,
            project_classes_output_directory: None,
            build_steps_to_skip: BTreeSet::new(),
            default_branch: "master".to_string(),
        }
    }
}

/// A demotion applied by one of the option rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionConflict {
    pub rule: &'static str,
    pub message: String,
}

/// Inputs a rule may consult besides the options themselves.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub ci: &'a CiMetadata,
}

/// A pure option rewrite: takes options, returns the (possibly demoted)
/// options and an optional diagnostic.
#[derive(Clone, Copy)]
pub struct OptionRule {
    pub name: &'static str,
    pub apply: fn(BuildOptions, &RuleContext<'_>) -> (BuildOptions, Option<String>),
}

impl std::fmt::Debug for OptionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionRule").field("name", &self.name).finish()
    }
}

/// The rules in the order they are evaluated.
pub fn default_option_rules() -> &'static [OptionRule] {
    &[
        OptionRule {
            name: "archives-metadata-disables-incremental",
            apply: archives_metadata_disables_incremental,
        },
        OptionRule {
            name: "archive-disables-incremental",
            apply: archive_disables_incremental,
        },
        OptionRule {
            name: "project-output-disables-incremental",
            apply: project_output_disables_incremental,
        },
        OptionRule {
            name: "non-default-branch-disables-incremental",
            apply: non_default_branch_disables_incremental,
        },
    ]
}

/// Run `rules` top to bottom. Never fails; returns the reconciled options and
/// every demotion that was applied.
pub fn apply_option_rules(
    options: BuildOptions,
    rules: &[OptionRule],
    ctx: &RuleContext<'_>,
) -> (BuildOptions, Vec<OptionConflict>) {
    let mut conflicts = Vec::new();
    let options = rules.iter().fold(options, |options, rule| {
        let (options, message) = (rule.apply)(options, ctx);
        if let Some(message) = message {
            conflicts.push(OptionConflict {
                rule: rule.name,
                message,
            });
        }
        options
    });
    (options, conflicts)
}

fn archives_metadata_disables_incremental(
    mut options: BuildOptions,
    _ctx: &RuleContext<'_>,
) -> (BuildOptions, Option<String>) {
    if options.path_to_compiled_classes_archives_metadata.is_none()
        || !options.incremental_compilation
    {
        return (options, None);
    }
    options.incremental_compilation = false;
    (
        options,
        Some(
            "incremental compilation is disabled because compiled class archives metadata is provided"
                .to_string(),
        ),
    )
}

fn archive_disables_incremental(
    mut options: BuildOptions,
    _ctx: &RuleContext<'_>,
) -> (BuildOptions, Option<String>) {
    let Some(archive) = options.path_to_compiled_classes_archive.clone() else {
        return (options, None);
    };

    let mut messages = Vec::new();
    if options.incremental_compilation {
        options.incremental_compilation = false;
        messages.push(format!(
            "incremental compilation is disabled because compiled classes archive `{}` is provided",
            archive.display()
        ));
    }
    if options.use_compiled_classes_from_project_output {
        options.path_to_compiled_classes_archive = None;
        messages.push(format!(
            "compiled classes archive `{}` is ignored because compiled classes from project output are used",
            archive.display()
        ));
    }
    (options, join(messages))
}

fn project_output_disables_incremental(
    mut options: BuildOptions,
    _ctx: &RuleContext<'_>,
) -> (BuildOptions, Option<String>) {
    if !options.use_compiled_classes_from_project_output {
        return (options, None);
    }

    let mut messages = Vec::new();
    if options.incremental_compilation {
        options.incremental_compilation = false;
        messages.push(
            "incremental compilation is disabled because compiled classes from project output are used"
                .to_string(),
        );
    }
    if let Some(metadata) = options.path_to_compiled_classes_archives_metadata.take() {
        messages.push(format!(
            "compiled class archives metadata `{}` is ignored because compiled classes from project output are used",
            metadata.display()
        ));
    }
    (options, join(messages))
}

fn non_default_branch_disables_incremental(
    mut options: BuildOptions,
    ctx: &RuleContext<'_>,
) -> (BuildOptions, Option<String>) {
    if !options.incremental_compilation || !ctx.ci.is_non_default_branch(&options.default_branch)
    {
        return (options, None);
    }
    options.incremental_compilation = false;
    let branch = ctx.ci.branch.as_deref().unwrap_or_default();
    let message = format!(
        "incremental compilation is disabled on branch `{branch}`; caches are only kept for `{}`",
        options.default_branch
    );
    (options, Some(message))
}

fn join(messages: Vec<String>) -> Option<String> {
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn validate(options: BuildOptions) -> (BuildOptions, Vec<OptionConflict>) {
        let ci = CiMetadata::default();
        apply_option_rules(options, default_option_rules(), &RuleContext { ci: &ci })
    }

    #[test]
    fn project_output_disables_incremental_and_nothing_else() {
        let options = BuildOptions {
            incremental_compilation: true,
            use_compiled_classes_from_project_output: true,
            ..BuildOptions::default()
        };

        let (validated, conflicts) = validate(options.clone());

        assert_eq!(
            validated,
            BuildOptions {
                incremental_compilation: false,
                ..options
            }
        );
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].rule, "project-output-disables-incremental");
    }

    #[test]
    fn archive_keeps_path_and_disables_incremental() {
        let options = BuildOptions {
            incremental_compilation: true,
            path_to_compiled_classes_archive: Some(PathBuf::from("a.zip")),
            ..BuildOptions::default()
        };

        let (validated, _) = validate(options);

        assert_eq!(
            validated.path_to_compiled_classes_archive,
            Some(PathBuf::from("a.zip"))
        );
        assert!(!validated.incremental_compilation);
    }

    #[test]
    fn project_output_wins_over_archive_and_metadata() {
        let options = BuildOptions {
            use_compiled_classes_from_project_output: true,
            path_to_compiled_classes_archive: Some(PathBuf::from("a.zip")),
            path_to_compiled_classes_archives_metadata: Some(PathBuf::from("meta.json")),
            ..BuildOptions::default()
        };

        let (validated, conflicts) = validate(options);

        assert!(validated.use_compiled_classes_from_project_output);
        assert_eq!(validated.path_to_compiled_classes_archive, None);
        assert_eq!(validated.path_to_compiled_classes_archives_metadata, None);
        let rules: Vec<_> = conflicts.iter().map(|c| c.rule).collect();
        assert_eq!(
            rules,
            vec![
                "archive-disables-incremental",
                "project-output-disables-incremental"
            ]
        );
    }

    #[test]
    fn non_default_branch_disables_incremental() {
        let ci = CiMetadata {
            branch: Some("feature/x".into()),
            ..CiMetadata::default()
        };
        let options = BuildOptions {
            incremental_compilation: true,
            ..BuildOptions::default()
        };

        let (validated, conflicts) =
            apply_option_rules(options, default_option_rules(), &RuleContext { ci: &ci });

        assert!(!validated.incremental_compilation);
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].message.contains("feature/x"));
    }

    #[test]
    fn consistent_options_pass_through_silently() {
        let options = BuildOptions {
            incremental_compilation: true,
            output_root_path: Some(PathBuf::from("/tmp/out")),
            ..BuildOptions::default()
        };

        let (validated, conflicts) = validate(options.clone());

        assert_eq!(validated, options);
        assert!(conflicts.is_empty());
    }

    #[test]
    fn deserializes_from_toml_with_defaults() {
        let options: BuildOptions = toml::from_str(
            r#"
                incremental_compilation = true
                build_steps_to_skip = ["sources_archive", "searchable_options"]
            "#,
        )
        .unwrap();

        assert!(options.incremental_compilation);
        assert_eq!(options.default_branch, "master");
        assert!(options.build_steps_to_skip.contains("sources_archive"));
    }
}
