//! Construction of the shell command that performs a build phase inside the build container.

use std::fmt::Write;

use crate::{
    config::BUILD_ROOT,
    error::BuildError,
    request::{BuildRequest, ExtraFiles, Phase},
    shell,
};

/// Where the extra repos file is installed inside the container.
pub const EXTRA_REPOS_LIST: &str = "/etc/apt/sources.list.d/dbuild-extra-repos.list";

/// Scratch directory, inside the build root, into which the source package is unpacked for the binary build.
pub const BINARY_BUILD_DIR: &str = "pkgbuild";

const UPGRADE: &str =
    "export DEBIAN_FRONTEND=noninteractive; apt-get -y update && apt-get -y dist-upgrade && ";

/// The command line and working directory of a build container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub phase: Phase,
    /// Script passed to `bash -c`.
    pub script: String,
    pub working_dir: String,
}

impl BuildCommand {
    /// Computes the command for the named phase. Fails with [`BuildError::UnknownBuildType`] for anything other than
    /// `source` or `binary`.
    pub fn new(
        request: &BuildRequest,
        phase: &str,
        extra_files: &ExtraFiles,
    ) -> Result<Self, BuildError> {
        let phase: Phase = phase.parse()?;
        Ok(Self::for_phase(request, phase, extra_files))
    }

    pub fn for_phase(request: &BuildRequest, phase: Phase, extra_files: &ExtraFiles) -> Self {
        let mut script = String::new();

        // Must come first so that only the sources configured below remain.
        if request.no_default_sources {
            script.push_str("> /etc/apt/sources.list && ");
        }

        if let Some(name) = extra_files.repos.as_deref() {
            let name = shell::quote(name);
            write!(script, "cp {BUILD_ROOT}/{name} {EXTRA_REPOS_LIST} && ").unwrap();
        }

        if let Some(name) = extra_files.repo_keys.as_deref() {
            let name = shell::quote(name);
            write!(script, "apt-key add {BUILD_ROOT}/{name} && ").unwrap();
        }

        script.push_str(UPGRADE);

        let working_dir = match phase {
            Phase::Source => {
                script.push_str("dpkg-buildpackage -S -I -nc -uc -us");
                format!("{BUILD_ROOT}/{}", request.config.source_dir)
            }
            Phase::Binary => {
                write!(
                    script,
                    "dpkg-source -x {BUILD_ROOT}/*.dsc {BUILD_ROOT}/{BINARY_BUILD_DIR}/ && \
                     cd {BUILD_ROOT}/{BINARY_BUILD_DIR} && \
                     /usr/lib/pbuilder/pbuilder-satisfydepends && \
                     dpkg-buildpackage -b -uc -us -j{parallel}",
                    parallel = request.parallel,
                )
                .unwrap();
                BUILD_ROOT.to_owned()
            }
        };

        // Fix up ownership whatever the outcome, then exit with the status of the build.
        if let Some(uid) = request.build_owner {
            write!(script, " ; rv=$? ; chown -R {uid} {BUILD_ROOT} ; exit $rv").unwrap();
        }

        Self {
            phase,
            script,
            working_dir,
        }
    }

    /// The container command.
    pub fn argv(&self) -> Vec<String> {
        vec!["bash".to_owned(), "-c".to_owned(), self.script.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn request() -> BuildRequest {
        BuildRequest::new("/home/user/pkg", Config::default())
    }

    #[test]
    fn source_without_extra_files() {
        let command = BuildCommand::new(&request(), "source", &ExtraFiles::default()).unwrap();

        assert_eq!(command.phase, Phase::Source);
        assert_eq!(command.working_dir, "/build/source");
        assert!(!command.script.contains("cp "));
        assert!(!command.script.contains("apt-key add"));
        assert!(command.script.contains(
            "export DEBIAN_FRONTEND=noninteractive; apt-get -y update && apt-get -y dist-upgrade"
        ));
        assert!(command.script.ends_with("dpkg-buildpackage -S -I -nc -uc -us"));
        assert_eq!(
            command.script,
            "export DEBIAN_FRONTEND=noninteractive; apt-get -y update && apt-get -y dist-upgrade && \
             dpkg-buildpackage -S -I -nc -uc -us"
        );
    }

    #[test]
    fn extra_repos_are_installed_before_upgrading() {
        let extra_files = ExtraFiles {
            repos: Some("repos".to_owned()),
            repo_keys: None,
        };
        let command = BuildCommand::new(&request(), "source", &extra_files).unwrap();

        let cp = command
            .script
            .find("cp /build/repos /etc/apt/sources.list.d/dbuild-extra-repos.list && ")
            .unwrap();
        let upgrade = command.script.find("apt-get -y dist-upgrade").unwrap();
        assert!(cp < upgrade);
        assert!(!command.script.contains("apt-key add"));
    }

    #[test]
    fn extra_keys_are_added_after_repos() {
        let extra_files = ExtraFiles {
            repos: Some("repos".to_owned()),
            repo_keys: Some("my keys".to_owned()),
        };
        let command = BuildCommand::new(&request(), "source", &extra_files).unwrap();

        let cp = command.script.find("cp /build/repos").unwrap();
        let key = command.script.find("apt-key add /build/'my keys' && ").unwrap();
        let upgrade = command.script.find("apt-get -y update").unwrap();
        assert!(cp < key);
        assert!(key < upgrade);
    }

    #[test]
    fn no_default_sources_comes_first() {
        let request = BuildRequest {
            no_default_sources: true,
            ..request()
        };
        let extra_files = ExtraFiles {
            repos: Some("repos".to_owned()),
            repo_keys: None,
        };
        let command = BuildCommand::new(&request, "source", &extra_files).unwrap();
        assert!(command
            .script
            .starts_with("> /etc/apt/sources.list && cp /build/repos "));
    }

    #[test]
    fn binary_uses_parallelism_and_build_root() {
        let request = BuildRequest {
            parallel: 4,
            ..request()
        };
        let command = BuildCommand::new(&request, "binary", &ExtraFiles::default()).unwrap();

        assert_eq!(command.phase, Phase::Binary);
        assert_eq!(command.working_dir, "/build");
        assert!(command
            .script
            .contains("dpkg-source -x /build/*.dsc /build/pkgbuild/ && "));
        assert!(command
            .script
            .contains("/usr/lib/pbuilder/pbuilder-satisfydepends && "));
        assert!(command.script.ends_with("dpkg-buildpackage -b -uc -us -j4"));
    }

    #[test]
    fn build_owner_chowns_and_preserves_exit_code() {
        let request = BuildRequest {
            build_owner: Some(1000),
            ..request()
        };

        for phase in ["source", "binary"] {
            let command = BuildCommand::new(&request, phase, &ExtraFiles::default()).unwrap();
            let (build, suffix) = command.script.split_once(" ; rv=$?").unwrap();
            assert!(build.contains("dpkg-buildpackage"));
            assert_eq!(suffix, " ; chown -R 1000 /build ; exit $rv");
        }
    }

    #[test]
    fn custom_source_dir() {
        let request = BuildRequest {
            config: Config {
                source_dir: "src/pkg".to_owned(),
                ..Config::default()
            },
            ..request()
        };
        let command = BuildCommand::new(&request, "source", &ExtraFiles::default()).unwrap();
        assert_eq!(command.working_dir, "/build/src/pkg");
    }

    #[test]
    fn is_deterministic() {
        let request = BuildRequest {
            build_owner: Some(1000),
            parallel: 8,
            no_default_sources: true,
            ..request()
        };
        let extra_files = ExtraFiles {
            repos: Some("repos".to_owned()),
            repo_keys: Some("keys".to_owned()),
        };
        for phase in ["source", "binary"] {
            let a = BuildCommand::new(&request, phase, &extra_files).unwrap();
            let b = BuildCommand::new(&request, phase, &extra_files).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn unknown_phase_is_rejected() {
        let error = BuildCommand::new(&request(), "docs", &ExtraFiles::default()).unwrap_err();
        assert!(matches!(error, BuildError::UnknownBuildType(ref name) if name == "docs"));
    }

    #[test]
    fn argv_runs_script_through_bash() {
        let command = BuildCommand::new(&request(), "source", &ExtraFiles::default()).unwrap();
        assert_eq!(
            command.argv(),
            vec!["bash".to_owned(), "-c".to_owned(), command.script.clone()]
        );
    }
}
