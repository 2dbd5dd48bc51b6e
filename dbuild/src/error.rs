use std::{error::Error, fmt, path::PathBuf};

use crate::{image::ImageBuildFailed, request::Phase};

/// Why a build phase did not succeed.
#[derive(Debug)]
pub enum BuildError {
    /// The requested phase is neither `source` nor `binary`. Raised before any image or container work.
    UnknownBuildType(String),
    /// The build image could not be built, no container was created.
    DockerBuildFailed(ImageBuildFailed),
    SourceBuildFailed(PhaseFailure),
    BinaryBuildFailed(PhaseFailure),
    Other(Box<dyn Error + Send + Sync>),
}

/// Details of a build container that exited with a non-zero code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseFailure {
    pub build_dir: PathBuf,
    pub exit_code: i64,
    /// The id of the container when it was kept for inspection.
    pub retained_container: Option<String>,
}

impl BuildError {
    pub(crate) fn phase_failed(phase: Phase, failure: PhaseFailure) -> Self {
        match phase {
            Phase::Source => BuildError::SourceBuildFailed(failure),
            Phase::Binary => BuildError::BinaryBuildFailed(failure),
        }
    }
}

impl fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build directory {dir} (exit code {code})",
            dir = self.build_dir.display(),
            code = self.exit_code
        )?;
        if let Some(id) = &self.retained_container {
            write!(
                f,
                ", container {id} was kept for inspection, remove it with `docker rm {id}` or `dbuild prune`"
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UnknownBuildType(name) => write!(f, "Unknown build type: {name:?}"),
            BuildError::DockerBuildFailed(error) => write!(f, "Docker image build failed: {error}"),
            BuildError::SourceBuildFailed(failure) => {
                write!(f, "Source build failed for {failure}")
            }
            BuildError::BinaryBuildFailed(failure) => {
                write!(f, "Binary build failed for {failure}")
            }
            BuildError::Other(error) => error.fmt(f),
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BuildError::DockerBuildFailed(error) => Some(error),
            BuildError::Other(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<Box<dyn Error + Send + Sync>> for BuildError {
    fn from(error: Box<dyn Error + Send + Sync>) -> Self {
        BuildError::Other(error)
    }
}

impl From<ImageBuildFailed> for BuildError {
    fn from(error: ImageBuildFailed) -> Self {
        BuildError::DockerBuildFailed(error)
    }
}

impl From<std::io::Error> for BuildError {
    fn from(error: std::io::Error) -> Self {
        BuildError::Other(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_failure_mentions_build_dir_and_container() {
        let failure = PhaseFailure {
            build_dir: "/srv/pkg".into(),
            exit_code: 2,
            retained_container: Some("0123abcd".to_owned()),
        };
        let message = BuildError::phase_failed(Phase::Source, failure.clone()).to_string();
        assert!(message.starts_with("Source build failed for build directory /srv/pkg (exit code 2)"));
        assert!(message.contains("container 0123abcd was kept"));

        let removed = PhaseFailure {
            retained_container: None,
            ..failure
        };
        assert_eq!(
            BuildError::phase_failed(Phase::Binary, removed).to_string(),
            "Binary build failed for build directory /srv/pkg (exit code 2)"
        );
    }
}
