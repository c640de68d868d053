use crate::EnvSource;

pub const BUILD_NUMBER_ENV: &str = "BUILD_NUMBER";
pub const BUILD_BRANCH_ENV: &str = "BUILD_BRANCH";
pub const BUILD_CONFIGURATION_NAME_ENV: &str = "BUILD_CONFIGURATION_NAME";

/// Build metadata supplied by the CI server, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiMetadata {
    pub build_number: Option<String>,
    pub branch: Option<String>,
    pub configuration_name: Option<String>,
}

impl CiMetadata {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let read = |key: &str| {
            env.var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            build_number: read(BUILD_NUMBER_ENV),
            branch: read(BUILD_BRANCH_ENV),
            configuration_name: read(BUILD_CONFIGURATION_NAME_ENV),
        }
    }

    pub fn is_ci(&self) -> bool {
        self.build_number.is_some() || self.configuration_name.is_some()
    }

    /// `true` when the CI branch is known and is not `default_branch`.
    ///
    /// `refs/heads/` prefixes are ignored.
    pub fn is_non_default_branch(&self, default_branch: &str) -> bool {
        match &self.branch {
            Some(branch) => {
                let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
                branch != default_branch && branch != "<default>"
            }
            None => false,
        }
    }
}
