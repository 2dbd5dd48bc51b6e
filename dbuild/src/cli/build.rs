use std::path::PathBuf;

use clap::Args;
use constcat::concat;
use log::info;

use crate::{
    config::{self, Config},
    docker::DockerCli,
    orchestrator::Orchestrator,
    request::BuildRequest,
    Result,
};

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[arg(required = true, help = concat!("Package build directory, mounted at ", config::BUILD_ROOT, " in the build containers."))]
    pub build_dir: Option<PathBuf>,

    /// Subdirectory of the build directory that contains the package source.
    #[arg(long = "source-dir", default_value = config::DEFAULT_SOURCE_DIR)]
    pub source_dir: String,

    /// Remove the build containers even if the build failed.
    #[arg(long = "force-rm", default_value_t)]
    pub force_rm: bool,

    /// Linux distribution of the build image.
    #[arg(long = "dist", default_value = config::DEFAULT_DIST)]
    pub dist: String,

    /// Release name of the distribution.
    #[arg(long = "release", default_value = config::DEFAULT_RELEASE)]
    pub release: String,

    #[arg(long = "extra-repos-file", default_value = config::DEFAULT_EXTRA_REPOS_FILE, help = concat!("File, relative to the build directory, with apt sources to install as \"", crate::command::EXTRA_REPOS_LIST, "\". Ignored if it does not exist."))]
    pub extra_repos_file: String,

    /// File, relative to the build directory, with the apt keys of the extra repos. Ignored if it does not exist.
    #[arg(long = "extra-repo-keys-file", default_value = config::DEFAULT_EXTRA_REPO_KEYS_FILE)]
    pub extra_repo_keys_file: String,

    /// Do not use the docker build cache for the build image.
    #[arg(long = "no-build-cache", default_value_t)]
    pub no_build_cache: bool,

    /// Proxy url passed to the build image as http_proxy and https_proxy.
    #[arg(long = "proxy", default_value_t)]
    pub proxy: String,

    /// Uid to reassign all files in the build directory to after each build.
    #[arg(long = "build-owner")]
    pub build_owner: Option<u32>,

    /// How many processes to run in parallel during the binary build.
    #[arg(long = "parallel", short = 'j', default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub parallel: u32,

    /// Discard the default apt sources, only use the extra repos.
    #[arg(long = "no-default-sources", default_value_t)]
    pub no_default_sources: bool,

    /// Do not prefix the build output with timestamps.
    #[arg(long = "no-include-timestamps", default_value_t)]
    pub no_include_timestamps: bool,
}

impl BuildArgs {
    fn into_request(self, docker_url: &str) -> Result<BuildRequest> {
        let BuildArgs {
            build_dir,
            source_dir,
            force_rm,
            dist,
            release,
            extra_repos_file,
            extra_repo_keys_file,
            no_build_cache,
            proxy,
            build_owner,
            parallel,
            no_default_sources,
            no_include_timestamps,
        } = self;

        let build_dir = build_dir.ok_or("Please provide the package build directory")?;
        // Docker only accepts absolute paths for bind mounts.
        let build_dir = std::fs::canonicalize(&build_dir).map_err(|error| {
            format!(
                "build directory {path} is not accessible: {error}",
                path = build_dir.display()
            )
        })?;

        let config = Config {
            docker_url: docker_url.to_owned(),
            dist,
            release,
            source_dir,
            extra_repos_file,
            extra_repo_keys_file,
        };

        Ok(BuildRequest {
            proxy,
            parallel,
            build_owner,
            force_rm,
            build_cache: !no_build_cache,
            no_default_sources,
            include_timestamps: !no_include_timestamps,
            ..BuildRequest::new(build_dir, config)
        })
    }
}

pub fn build(docker_url: &str, args: BuildArgs) -> Result<()> {
    let request = args.into_request(docker_url)?;
    let engine = DockerCli::from_config(&request.config);
    if !request.build_dir.join(&request.config.source_dir).is_dir() {
        log::warn!(
            "source directory {dir:?} not found in {build_dir}, the source build will likely fail",
            dir = request.config.source_dir,
            build_dir = request.build_dir.display(),
        );
    }

    Orchestrator::new(&engine, &request).run()?;
    info!(
        "Source and binary packages built in {}",
        request.build_dir.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: BuildArgs,
    }

    fn parse(args: &[&str]) -> BuildArgs {
        Wrapper::try_parse_from(std::iter::once("dbuild").chain(args.iter().copied()))
            .unwrap()
            .args
    }

    #[test]
    fn defaults_match_config() {
        let dir = tempfile::tempdir().unwrap();
        let request = parse(&[dir.path().to_str().unwrap()])
            .into_request(config::DEFAULT_DOCKER_URL)
            .unwrap();

        assert_eq!(request.config, Config::default());
        assert_eq!(request.build_dir, std::fs::canonicalize(dir.path()).unwrap());
        assert_eq!(request.parallel, 1);
        assert_eq!(request.build_owner, None);
        assert_eq!(request.proxy, "");
        assert!(!request.force_rm);
        assert!(request.build_cache);
        assert!(!request.no_default_sources);
        assert!(request.include_timestamps);
    }

    #[test]
    fn every_option_reaches_the_request() {
        let dir = tempfile::tempdir().unwrap();
        let request = parse(&[
            "--source-dir",
            "src",
            "--force-rm",
            "--dist",
            "debian",
            "--release",
            "bookworm",
            "--extra-repos-file",
            "conf/repos",
            "--extra-repo-keys-file",
            "conf/keys",
            "--no-build-cache",
            "--proxy",
            "http://proxy:3128",
            "--build-owner",
            "1000",
            "-j",
            "8",
            "--no-default-sources",
            "--no-include-timestamps",
            dir.path().to_str().unwrap(),
        ])
        .into_request("tcp://builder:2375")
        .unwrap();

        assert_eq!(
            request.config,
            Config {
                docker_url: "tcp://builder:2375".to_owned(),
                dist: "debian".to_owned(),
                release: "bookworm".to_owned(),
                source_dir: "src".to_owned(),
                extra_repos_file: "conf/repos".to_owned(),
                extra_repo_keys_file: "conf/keys".to_owned(),
            }
        );
        assert_eq!(request.parallel, 8);
        assert_eq!(request.build_owner, Some(1000));
        assert_eq!(request.proxy, "http://proxy:3128");
        assert!(request.force_rm);
        assert!(!request.build_cache);
        assert!(request.no_default_sources);
        assert!(!request.include_timestamps);
    }

    #[test]
    fn parallel_must_be_positive() {
        assert!(Wrapper::try_parse_from(["dbuild", "-j", "0", "/tmp"]).is_err());
    }

    #[test]
    fn missing_build_dir_is_reported() {
        let error = parse(&["/nonexistent/dbuild/build/dir"])
            .into_request(config::DEFAULT_DOCKER_URL)
            .unwrap_err();
        assert!(error.to_string().contains("is not accessible"));
    }
}
