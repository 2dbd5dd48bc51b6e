use std::{fmt, path::PathBuf, str::FromStr};

use crate::{config::Config, error::BuildError};

/// One of the two sequential build steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Produces the source package (`.dsc`, `.tar.*`, `_source.changes`) next to the source directory.
    Source,
    /// Produces the binary packages from the source package left behind by [`Phase::Source`].
    Binary,
}

impl Phase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Phase::Source => "source",
            Phase::Binary => "binary",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = BuildError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "source" => Ok(Phase::Source),
            "binary" => Ok(Phase::Binary),
            other => Err(BuildError::UnknownBuildType(other.to_owned())),
        }
    }
}

/// Everything needed to build the packages in one build directory. Assembled once and never mutated.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Host directory mounted read-write at [`crate::config::BUILD_ROOT`] in every build container.
    pub build_dir: PathBuf,
    pub config: Config,
    /// Passed to the image build as `http_proxy` and `https_proxy`. Empty means no proxy.
    pub proxy: String,
    /// Number of parallel jobs for the binary build.
    pub parallel: u32,
    /// When set, the build root is chowned to this uid after the build, whatever its outcome.
    pub build_owner: Option<u32>,
    /// Remove containers of failed builds instead of keeping them for inspection.
    pub force_rm: bool,
    pub build_cache: bool,
    /// Empty `/etc/apt/sources.list` so that only the extra repos are used.
    pub no_default_sources: bool,
    pub include_timestamps: bool,
}

impl BuildRequest {
    pub fn new(build_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            build_dir: build_dir.into(),
            config,
            proxy: String::new(),
            parallel: 1,
            build_owner: None,
            force_rm: false,
            build_cache: true,
            no_default_sources: false,
            include_timestamps: true,
        }
    }
}

/// The optional files in the build directory that turned out to exist, by their name relative to the build directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraFiles {
    /// An apt sources list to install next to the default sources.
    pub repos: Option<String>,
    /// Keys to trust for the extra repos.
    pub repo_keys: Option<String>,
}

impl ExtraFiles {
    /// Checks which of the configured extra files exist in the build directory.
    pub fn probe(request: &BuildRequest) -> Self {
        let existing = |name: &str| {
            let exists = request.build_dir.join(name).exists();
            log::debug!("extra file {name:?} exists: {exists}");
            exists.then(|| name.to_owned())
        };

        Self {
            repos: existing(&request.config.extra_repos_file),
            repo_keys: existing(&request.config.extra_repo_keys_file),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_parses_known_names_only() {
        assert_eq!("source".parse::<Phase>().unwrap(), Phase::Source);
        assert_eq!("binary".parse::<Phase>().unwrap(), Phase::Binary);
        assert!(matches!(
            "Source".parse::<Phase>(),
            Err(BuildError::UnknownBuildType(name)) if name == "Source"
        ));
        assert!(matches!(
            "".parse::<Phase>(),
            Err(BuildError::UnknownBuildType(_))
        ));
    }

    #[test]
    fn probe_reports_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("repos"), "deb http://example.org/ stable main\n").unwrap();

        let request = BuildRequest::new(dir.path(), Config::default());
        assert_eq!(
            ExtraFiles::probe(&request),
            ExtraFiles {
                repos: Some("repos".to_owned()),
                repo_keys: None,
            }
        );
    }
}
